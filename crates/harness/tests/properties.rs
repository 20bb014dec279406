use chrono::{DateTime, Utc};
use pomolog_core::StrategyKind;
use pomolog_engine::Clock;
use pomolog_harness::TestClient;
use pomolog_storage::MemoryLog;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Wait(i64),
    Start,
    Stop,
    Seal,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1i64..4000).prop_map(Step::Wait),
        Just(Step::Start),
        Just(Step::Stop),
        Just(Step::Seal),
    ]
}

fn header(line: &str) -> Option<(u64, DateTime<Utc>)> {
    let mut parts = line.splitn(3, ", ");
    let seq = parts.next()?.parse().ok()?;
    let when = DateTime::parse_from_rfc3339(&parts.next()?.replacen(' ', "T", 1)).ok()?;
    Some((seq, when.with_timezone(&Utc)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn live_and_replayed_timers_agree(steps in prop::collection::vec(step(), 1..30)) {
        let log = MemoryLog::new();
        let live = TestClient::on_log(&log).unwrap();
        live.plan("b1", "w1", 12).unwrap();
        for step in &steps {
            // Refusals (starting a ticking timer, nothing left to start) are part of the game.
            let _ = match step {
                Step::Wait(secs) => { live.advance(*secs); Ok(()) }
                Step::Start => live.run(StrategyKind::StartTimer, &["w1"]).map(|_| ()),
                Step::Stop => live.run(StrategyKind::StopTimer, &[]).map(|_| ()),
                Step::Seal => live.source.auto_seal().map(|_| ()),
            };
        }
        // Past the ring margin, so rings applied ahead of a refused command are due for both.
        live.advance(2);
        let now = live.clock.now();
        live.source.auto_seal_at(now).unwrap();

        let headers: Vec<_> = log.lines().iter().map(|l| header(l).unwrap()).collect();
        for (index, pair) in headers.windows(2).enumerate() {
            prop_assert_eq!(pair[1].0, pair[0].0 + 1, "gap after line {}", index + 1);
            prop_assert!(pair[1].1 >= pair[0].1, "time went back after line {}", index + 1);
        }

        let replayed = TestClient::on_log(&log).unwrap();
        replayed.source.auto_seal_at(now).unwrap();
        prop_assert_eq!(replayed.pomodoro_states("w1"), live.pomodoro_states("w1"));
        prop_assert_eq!(replayed.source.last_seq(), live.source.last_seq());
    }
}

//! Offline surgery on a log that no longer replays.
//!
//! One pass over the raw lines drops what cannot be decoded, duplicate creations and deletions of
//! things that never existed, and creates users, backlogs and workitems on their first reference.
//! Then the survivors are renumbered and test-replayed against a fresh model, dropping the first
//! strategy that fails, until a replay goes through cleanly.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use pomolog_core::events::SOURCE_EVENTS;
use pomolog_core::model::Tenant;
use pomolog_core::{
    ADMIN_USER, Codec, CoreError, EventEmitter, ExecContext, Settings, Strategy, StrategyKind,
    generate_uid,
};

use crate::error::EngineError;
use crate::runner;

const REPAIRED_PREFIX: &str = "[Repaired]";

#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    /// Human-readable account of every change, in order.
    pub log: Vec<String>,
    pub changes: usize,
    /// Where the previous log went, if anything was rewritten.
    pub backup: Option<String>,
}

impl RepairReport {
    fn note(&mut self, entry: String) {
        debug!("{entry}");
        self.log.push(entry);
        self.changes += 1;
    }
}

#[derive(Default)]
struct Known {
    /// identity -> backlog uids
    users: HashMap<String, HashSet<String>>,
    /// backlog uid -> workitem uids
    backlogs: HashMap<String, HashSet<String>>,
    workitems: HashSet<String>,
    orphanage: Option<String>,
}

impl Known {
    fn forget_backlog(&mut self, uid: &str) {
        if let Some(workitems) = self.backlogs.remove(uid) {
            for workitem in workitems {
                self.workitems.remove(&workitem);
            }
        }
        for backlogs in self.users.values_mut() {
            backlogs.remove(uid);
        }
    }
}

fn synthetic(
    template: &Strategy,
    kind: StrategyKind,
    params: Vec<String>,
) -> Result<Strategy, EngineError> {
    Ok(Strategy::new(1, template.when(), template.user(), kind, params)?)
}

/// Returns the repaired strategies and the report. `changes == 0` means the log was already sound.
pub fn repair(
    lines: &[String],
    codec: &Codec,
    settings: &dyn Settings,
    now: DateTime<Utc>,
) -> Result<(Vec<Strategy>, RepairReport), EngineError> {
    let mut report = RepairReport::default();
    let mut known = Known::default();
    known.users.insert(ADMIN_USER.to_string(), HashSet::new());
    let mut strategies = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let s = match codec.decode(line) {
            Ok(Some(s)) => s,
            Ok(None) => continue,
            Err(e) => {
                report.note(format!("Dropped undecodable line {} ({e}): {line}", index + 1));
                continue;
            }
        };

        match s.kind() {
            StrategyKind::CreateUser => {
                let identity = s.param(0).to_string();
                if known.users.contains_key(&identity) {
                    report.note(format!("Dropped duplicate creation of user {identity}"));
                    continue;
                }
                known.users.insert(identity, HashSet::new());
            }
            StrategyKind::DeleteUser => {
                let identity = s.param(0);
                let Some(backlogs) = known.users.remove(identity) else {
                    report.note(format!("Dropped deletion of unknown user {identity}"));
                    continue;
                };
                for backlog in backlogs {
                    known.forget_backlog(&backlog);
                }
            }
            StrategyKind::RenameUser => {
                let identity = s.param(0).to_string();
                if !known.users.contains_key(&identity) {
                    let name = format!("{REPAIRED_PREFIX} {identity}");
                    strategies.push(synthetic(
                        &s,
                        StrategyKind::CreateUser,
                        vec![identity.clone(), name],
                    )?);
                    report.note(format!("Created user {identity} on first reference"));
                    known.users.insert(identity, HashSet::new());
                }
            }
            StrategyKind::CreateBacklog => {
                let uid = s.param(0).to_string();
                if known.backlogs.contains_key(&uid) {
                    report.note(format!("Dropped duplicate creation of backlog {uid}"));
                    continue;
                }
                known.backlogs.insert(uid.clone(), HashSet::new());
                known.users.entry(s.user().to_string()).or_default().insert(uid);
            }
            StrategyKind::DeleteBacklog => {
                let uid = s.param(0);
                if !known.backlogs.contains_key(uid) {
                    report.note(format!("Dropped deletion of unknown backlog {uid}"));
                    continue;
                }
                known.forget_backlog(uid);
            }
            StrategyKind::RenameBacklog | StrategyKind::CreateWorkitem => {
                let backlog = if s.kind() == StrategyKind::CreateWorkitem {
                    s.param(1).to_string()
                } else {
                    s.param(0).to_string()
                };
                if !known.backlogs.contains_key(&backlog) {
                    let name = format!("{REPAIRED_PREFIX} {backlog}");
                    strategies.push(synthetic(
                        &s,
                        StrategyKind::CreateBacklog,
                        vec![backlog.clone(), name],
                    )?);
                    report.note(format!("Created backlog {backlog} on first reference"));
                    known.backlogs.insert(backlog.clone(), HashSet::new());
                    known
                        .users
                        .entry(s.user().to_string())
                        .or_default()
                        .insert(backlog.clone());
                }
                if s.kind() == StrategyKind::CreateWorkitem {
                    let uid = s.param(0).to_string();
                    if known.workitems.contains(&uid) {
                        report.note(format!("Dropped duplicate creation of workitem {uid}"));
                        continue;
                    }
                    known.workitems.insert(uid.clone());
                    known.backlogs.entry(backlog).or_default().insert(uid);
                }
            }
            StrategyKind::DeleteWorkitem => {
                let uid = s.param(0);
                if !known.workitems.remove(uid) {
                    report.note(format!("Dropped deletion of unknown workitem {uid}"));
                    continue;
                }
            }
            StrategyKind::RenameWorkitem
            | StrategyKind::CompleteWorkitem
            | StrategyKind::MoveWorkitem
            | StrategyKind::ReorderWorkitem
            | StrategyKind::StartWork
            | StrategyKind::StartTimer
            | StrategyKind::AddPomodoro
            | StrategyKind::RemovePomodoro
            | StrategyKind::AddInterruption
            | StrategyKind::VoidPomodoro
            | StrategyKind::FinishTracking => {
                if let Some(uid) = s.optional(0).map(str::to_string) {
                    if !known.workitems.contains(&uid) {
                        let orphanage = match &known.orphanage {
                            Some(orphanage) => orphanage.clone(),
                            None => {
                                let orphanage = generate_uid();
                                strategies.push(synthetic(
                                    &s,
                                    StrategyKind::CreateBacklog,
                                    vec![
                                        orphanage.clone(),
                                        format!("{REPAIRED_PREFIX} Orphan workitems"),
                                    ],
                                )?);
                                report.note(format!("Created backlog {orphanage} for orphan workitems"));
                                known.backlogs.insert(orphanage.clone(), HashSet::new());
                                known
                                    .users
                                    .entry(s.user().to_string())
                                    .or_default()
                                    .insert(orphanage.clone());
                                known.orphanage = Some(orphanage.clone());
                                orphanage
                            }
                        };
                        strategies.push(synthetic(
                            &s,
                            StrategyKind::CreateWorkitem,
                            vec![
                                uid.clone(),
                                orphanage.clone(),
                                format!("{REPAIRED_PREFIX} {uid}"),
                            ],
                        )?);
                        report.note(format!("Created workitem {uid} on first reference"));
                        known.workitems.insert(uid.clone());
                        known.backlogs.entry(orphanage).or_default().insert(uid);
                    }
                }
            }
            _ => {}
        }
        strategies.push(s);
    }

    loop {
        strategies = renumber(strategies, &mut report);
        match test_replay(&strategies, settings, now) {
            Ok(()) => {
                report.log.push("Test replay succeeded".to_string());
                break;
            }
            Err((index, e)) => {
                let failed = strategies.remove(index);
                report.note(format!("Dropped failing strategy ({e}): {failed}"));
            }
        }
    }

    if report.changes == 0 {
        report.log.push("No changes were needed".to_string());
    } else {
        report.log.push(format!("Made {} changes", report.changes));
    }
    Ok((strategies, report))
}

/// Makes sequence numbers consecutive from the first strategy's.
fn renumber(strategies: Vec<Strategy>, report: &mut RepairReport) -> Vec<Strategy> {
    let Some(first) = strategies.first().map(Strategy::seq) else {
        return strategies;
    };
    let mut renumbered = 0;
    let strategies: Vec<Strategy> = strategies
        .into_iter()
        .zip(first..)
        .map(|(s, seq)| {
            if s.seq() == seq {
                s
            } else {
                renumbered += 1;
                s.with_sequence(seq)
            }
        })
        .collect();
    if renumbered > 0 {
        report.changes += renumbered;
        report.log.push(format!(
            "Renumbered {renumbered} strategies, now {first} to {}",
            first + strategies.len() as u64 - 1
        ));
    }
    strategies
}

/// Replays against a fresh model with nobody listening. On failure, returns the index of the
/// strategy that failed.
fn test_replay(
    strategies: &[Strategy],
    settings: &dyn Settings,
    now: DateTime<Utc>,
) -> Result<(), (usize, CoreError)> {
    let emitter = EventEmitter::new(SOURCE_EVENTS);
    emitter.mute();
    let mut data = Tenant::new(now);
    let mut ctx = ExecContext {
        data: &mut data,
        emitter: &emitter,
        settings,
    };
    for (index, strategy) in strategies.iter().enumerate() {
        runner::run(&mut ctx, strategy, false, false).map_err(|e| (index, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use pomolog_core::{MemorySettings, StrategyRegistry};

    use super::*;

    fn codec() -> Codec {
        Codec::plain(Arc::new(StrategyRegistry::with_defaults()))
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_800_000_000, 0).unwrap()
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    const HEAD: &str = r#"1, 2023-11-14 22:13:20+00:00, admin@local.host: CreateUser("bob@example.com", "Bob")"#;

    #[test]
    fn sound_log_is_left_alone() {
        let log = lines(&[
            HEAD,
            r#"2, 2023-11-14 22:13:21+00:00, bob@example.com: CreateBacklog("b1", "Today")"#,
            r#"3, 2023-11-14 22:13:22+00:00, bob@example.com: CreateWorkitem("w1", "b1", "Write")"#,
        ]);
        let (strategies, report) = repair(&log, &codec(), &MemorySettings::new(), now()).unwrap();
        assert_eq!(report.changes, 0);
        assert_eq!(strategies.len(), 3);
        assert_eq!(report.log.last().unwrap(), "No changes were needed");
    }

    #[test]
    fn garbage_and_duplicates_go_and_gaps_close() {
        let log = lines(&[
            HEAD,
            "this is not a strategy",
            r#"2, 2023-11-14 22:13:21+00:00, bob@example.com: CreateBacklog("b1", "Today")"#,
            r#"3, 2023-11-14 22:13:21+00:00, bob@example.com: CreateBacklog("b1", "Again")"#,
            r#"7, 2023-11-14 22:13:22+00:00, bob@example.com: DeleteBacklog("b9")"#,
            r#"9, 2023-11-14 22:13:23+00:00, bob@example.com: RenameBacklog("b1", "Tomorrow")"#,
        ]);
        let (strategies, report) = repair(&log, &codec(), &MemorySettings::new(), now()).unwrap();
        let seqs: Vec<u64> = strategies.iter().map(Strategy::seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(strategies[2].kind(), StrategyKind::RenameBacklog);
        // garbage, duplicate, unknown deletion, one renumbering
        assert_eq!(report.changes, 4);
    }

    #[test]
    fn orphans_get_a_home() {
        let log = lines(&[
            HEAD,
            r#"2, 2023-11-14 22:13:21+00:00, bob@example.com: AddPomodoro("w1", "2")"#,
            r#"3, 2023-11-14 22:13:22+00:00, bob@example.com: RenameWorkitem("w1", "Orphan")"#,
        ]);
        let (strategies, report) = repair(&log, &codec(), &MemorySettings::new(), now()).unwrap();
        let kinds: Vec<StrategyKind> = strategies.iter().map(Strategy::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StrategyKind::CreateUser,
                StrategyKind::CreateBacklog,
                StrategyKind::CreateWorkitem,
                StrategyKind::AddPomodoro,
                StrategyKind::RenameWorkitem,
            ]
        );
        assert!(strategies[1].param(1).starts_with(REPAIRED_PREFIX));
        assert!(report.changes >= 2);
    }

    #[test]
    fn strategies_that_cannot_run_are_dropped() {
        let log = lines(&[
            HEAD,
            r#"2, 2023-11-14 22:13:21+00:00, bob@example.com: CreateBacklog("b1", "Today")"#,
            r#"3, 2023-11-14 22:13:22+00:00, bob@example.com: CreateWorkitem("w1", "b1", "Write")"#,
            r#"4, 2023-11-14 22:13:23+00:00, bob@example.com: RemovePomodoro("w1", "3")"#,
            r#"5, 2023-11-14 22:13:24+00:00, bob@example.com: RenameWorkitem("w1", "Edit")"#,
        ]);
        let (strategies, report) = repair(&log, &codec(), &MemorySettings::new(), now()).unwrap();
        assert_eq!(strategies.len(), 4);
        assert_eq!(strategies[3].kind(), StrategyKind::RenameWorkitem);
        assert_eq!(strategies[3].seq(), 4);
        assert!(report.log.iter().any(|l| l.starts_with("Dropped failing strategy")));
    }
}

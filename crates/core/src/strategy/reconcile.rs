//! Auto-seal: applying timer transitions that should have happened while nobody was watching.

use chrono::{DateTime, Utc};
use tracing::info;

use super::{ExecContext, Strategy, StrategyKind};
use crate::error::CoreError;
use crate::model::{PomodoroKind, Tenant};

/// One overdue transition, to be executed as `kind [workitem]` at `at` on behalf of `user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealAction {
    pub user: String,
    pub workitem: String,
    pub kind: StrategyKind,
    pub at: DateTime<Utc>,
}

/// Finds running normal pomodoros whose rest (or work) ended more than `tolerance` seconds before
/// `when`. A pomodoro past both phases is finished at its planned end of rest; one past only its
/// work starts resting at its planned end of work.
pub fn plan_auto_seal(data: &Tenant, when: DateTime<Utc>, tolerance: f64) -> Vec<SealAction> {
    let mut actions = Vec::new();
    for user in data.users() {
        for workitem in user.workitems() {
            for pomodoro in workitem.pomodoros() {
                if pomodoro.kind() != PomodoroKind::Normal || !pomodoro.is_running() {
                    continue;
                }
                let total = pomodoro.total_remaining_time(when).unwrap_or(0.0);
                let current = pomodoro.remaining_time_in_current_state(when).unwrap_or(0.0);
                let planned = if total < -tolerance {
                    pomodoro
                        .planned_end_of_rest()
                        .map(|at| (StrategyKind::FinishPomodoroInternal, at))
                } else if pomodoro.is_working() && current < -tolerance {
                    pomodoro
                        .planned_end_of_work()
                        .map(|at| (StrategyKind::StartRestInternal, at))
                } else {
                    None
                };
                if let Some((kind, at)) = planned {
                    actions.push(SealAction {
                        user: user.identity().to_string(),
                        workitem: workitem.uid().to_string(),
                        kind,
                        at,
                    });
                }
            }
        }
    }
    actions
}

/// AutoSealInternal `[tolerance]`: executes the planned transitions and returns how many ran.
pub(super) fn auto_seal(s: &Strategy, ctx: &mut ExecContext<'_>) -> Result<Option<String>, CoreError> {
    let tolerance = s.parse_duration(0, "tolerance")?.unwrap_or(0.0);
    let actions = plan_auto_seal(ctx.data, s.when(), tolerance);
    for action in &actions {
        info!(
            user = %action.user,
            workitem = %action.workitem,
            kind = %action.kind,
            at = %action.at,
            "auto-sealing overdue pomodoro"
        );
        s.derive_with(
            ctx,
            action.kind,
            vec![action.workitem.clone()],
            Some(action.at),
            Some(&action.user),
        )?;
    }
    Ok(Some(actions.len().to_string()))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::ids::ADMIN_USER;
    use crate::model::PomodoroState;

    fn started_at_zero() -> Fixture {
        let mut fx = Fixture::new();
        fx.run(StrategyKind::CreateBacklog, &["b1", "Today"], 0).unwrap();
        fx.run(StrategyKind::CreateWorkitem, &["w1", "b1", "Task"], 0).unwrap();
        fx.run(StrategyKind::AddPomodoro, &["w1", "1"], 0).unwrap();
        fx.run(StrategyKind::StartTimer, &["w1", "1500", "300"], 0).unwrap();
        fx.take_events();
        fx
    }

    fn pomodoro_state(fx: &Fixture) -> PomodoroState {
        fx.alice().find_workitem("w1").unwrap().pomodoro("w1-p1").unwrap().state()
    }

    #[test]
    fn overdue_rest_finishes_at_planned_end() {
        let mut fx = started_at_zero();
        let plan = plan_auto_seal(&fx.data, at(1900), 0.0);
        assert_eq!(
            plan,
            vec![SealAction {
                user: ALICE.into(),
                workitem: "w1".into(),
                kind: StrategyKind::FinishPomodoroInternal,
                at: at(1800),
            }]
        );

        let outcome = fx.run_as(ADMIN_USER, StrategyKind::AutoSealInternal, &[], 1900).unwrap();
        assert_eq!(outcome.result.as_deref(), Some("1"));
        assert_eq!(pomodoro_state(&fx), PomodoroState::Finished);
        let p = fx.alice().find_workitem("w1").unwrap().pomodoro("w1-p1").unwrap();
        assert_eq!(p.date_completed(), Some(at(1800)));
        assert!(fx.alice().timer().is_idling());
    }

    #[test]
    fn overdue_work_starts_rest_at_planned_end() {
        let mut fx = started_at_zero();
        let plan = plan_auto_seal(&fx.data, at(1600), 0.0);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].kind, StrategyKind::StartRestInternal);
        assert_eq!(plan[0].at, at(1500));

        fx.run_as(ADMIN_USER, StrategyKind::AutoSealInternal, &[], 1600).unwrap();
        assert_eq!(pomodoro_state(&fx), PomodoroState::Rest);
        assert_eq!(fx.alice().timer().next_state_change(), Some(at(1800)));
    }

    #[test]
    fn tolerance_spares_almost_finished_timers() {
        let fx = started_at_zero();
        assert!(plan_auto_seal(&fx.data, at(1510), 30.0).is_empty());
        assert!(plan_auto_seal(&fx.data, at(1400), 0.0).is_empty());
        assert_eq!(plan_auto_seal(&fx.data, at(1531), 30.0).len(), 1);
    }

    #[test]
    fn derived_transitions_are_wrapped_in_message_events() {
        let mut fx = started_at_zero();
        fx.run_as(ADMIN_USER, StrategyKind::AutoSealInternal, &["0"], 1900).unwrap();
        let events = fx.take_events();
        assert_eq!(events.first().map(String::as_str), Some("BeforeMessageProcessed"));
        assert_eq!(events.last().map(String::as_str), Some("AfterMessageProcessed"));
        assert!(events.contains(&"AfterPomodoroComplete".to_string()));
    }
}

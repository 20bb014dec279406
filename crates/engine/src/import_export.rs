//! Copies strategies between a running source and a file.
//!
//! Export writes the log as-is, or compressed to the few strategies that rebuild the same end
//! state. Classic import replays another log as the configured user. Smart import replays it into a
//! scratch model first and executes only what the source is missing, so importing the same file
//! twice changes nothing.

use std::io::Write;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use pomolog_core::events::SOURCE_EVENTS;
use pomolog_core::model::{Category, Pomodoro, PomodoroKind, PomodoroState, Stamp, Tenant, Workitem};
use pomolog_core::{ADMIN_USER, CoreError, EventEmitter, ExecContext, Strategy, StrategyKind};
use pomolog_storage::StorageError;

use crate::error::EngineError;
use crate::runner;
use crate::source::EventSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Started { total: usize },
    Advanced { done: usize, total: usize },
    Completed { count: usize },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Only the strategies needed to rebuild the final state, renumbered from 1.
    pub compress: bool,
    /// Keep the source's encryption. Otherwise the copy is plaintext.
    pub encrypt: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Skip lines that cannot be decoded or executed instead of stopping at the first one.
    pub ignore_errors: bool,
}

/// Reports progress about a hundred times over `total` items.
struct Reporter<'a> {
    total: usize,
    every: usize,
    on_progress: &'a mut dyn FnMut(Progress),
}

impl<'a> Reporter<'a> {
    fn start(total: usize, on_progress: &'a mut dyn FnMut(Progress)) -> Self {
        on_progress(Progress::Started { total });
        Self {
            total,
            every: (total / 100).max(1),
            on_progress,
        }
    }

    fn advance(&mut self, done: usize) {
        if done % self.every == 0 {
            debug!(done, total = self.total, "progress");
            (self.on_progress)(Progress::Advanced {
                done,
                total: self.total,
            });
        }
    }

    fn complete(self, count: usize) {
        (self.on_progress)(Progress::Completed { count });
    }
}

/// Writes the source's strategies to `out`, one line each. Returns how many were written.
pub fn export(
    source: &EventSource,
    out: &mut impl Write,
    options: ExportOptions,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<usize, EngineError> {
    let codec = if options.encrypt {
        source.codec().clone()
    } else {
        source.codec().without_encryption()
    };
    let strategies = if options.compress {
        source.with_data(compressed_strategies)?
    } else {
        source.read_strategies()?
    };

    let mut reporter = Reporter::start(strategies.len(), on_progress);
    for (index, strategy) in strategies.iter().enumerate() {
        writeln!(out, "{}", codec.encode(strategy)?).map_err(StorageError::from)?;
        reporter.advance(index + 1);
    }
    out.flush().map_err(StorageError::from)?;
    info!(
        source = %source.name(),
        count = strategies.len(),
        compress = options.compress,
        "exported"
    );
    reporter.complete(strategies.len());
    Ok(strategies.len())
}

/// The strategies that rebuild `data` in an empty log, in time order and numbered from 1.
pub fn compressed_strategies(data: &Tenant) -> Result<Vec<Strategy>, CoreError> {
    let mut strategies = merge_strategies(&Tenant::new(data.stamp().created()), data)?;
    strategies.sort_by_key(Strategy::when);
    Ok(strategies
        .into_iter()
        .zip(1..)
        .map(|(strategy, seq)| strategy.with_sequence(seq))
        .collect())
}

/// The strategies that bring what `imported` holds into `existing` without deleting anything.
///
/// Items are matched by uid. Missing ones are created, and names changed later in `imported` are
/// renamed. A workitem ends with as many pomodoros as the larger side has, and pomodoros are
/// matched by position. Creations come first in model order, then the timed strategies in time
/// order. Sequence numbers are left at 0 for the executing source to assign.
pub fn merge_strategies(existing: &Tenant, imported: &Tenant) -> Result<Vec<Strategy>, CoreError> {
    let mut merged = Vec::new();
    for user in imported.users().filter(|u| !u.is_system()) {
        let identity = user.identity();
        let current = existing.user(identity);
        match current {
            None => merged.push(make(
                user.stamp().created(),
                ADMIN_USER,
                StrategyKind::CreateUser,
                &[identity, user.name()],
            )?),
            Some(c) if renamed_later(user.name(), user.stamp(), c.name(), c.stamp()) => {
                merged.push(make(
                    user.stamp().last_modified(),
                    ADMIN_USER,
                    StrategyKind::RenameUser,
                    &[identity, user.name()],
                )?)
            }
            Some(_) => {}
        }

        merge_categories(
            &mut merged,
            identity,
            user.root_category(),
            current.map(|c| c.root_category()),
        )?;

        let mut timed = Vec::new();
        for backlog in user.backlogs() {
            match existing.users().find_map(|u| u.backlog(backlog.uid())) {
                None => merged.push(make(
                    backlog.stamp().created(),
                    identity,
                    StrategyKind::CreateBacklog,
                    &[backlog.uid(), backlog.name()],
                )?),
                Some(b) if renamed_later(backlog.name(), backlog.stamp(), b.name(), b.stamp()) => {
                    merged.push(make(
                        backlog.stamp().last_modified(),
                        identity,
                        StrategyKind::RenameBacklog,
                        &[backlog.uid(), backlog.name()],
                    )?)
                }
                Some(_) => {}
            }

            for workitem in backlog.workitems() {
                let current = existing.users().find_map(|u| u.find_workitem(workitem.uid()));
                match current {
                    None => merged.push(make(
                        workitem.stamp().created(),
                        identity,
                        StrategyKind::CreateWorkitem,
                        &[workitem.uid(), backlog.uid(), workitem.name()],
                    )?),
                    Some(w)
                        if renamed_later(workitem.name(), workitem.stamp(), w.name(), w.stamp()) =>
                    {
                        merged.push(make(
                            workitem.stamp().last_modified(),
                            identity,
                            StrategyKind::RenameWorkitem,
                            &[workitem.uid(), workitem.name()],
                        )?)
                    }
                    Some(_) => {}
                }
                merge_workitem(&mut merged, &mut timed, identity, workitem, current)?;
            }
        }
        timed.sort_by_key(Strategy::when);
        merged.extend(timed);
    }
    Ok(merged)
}

fn make(
    when: DateTime<Utc>,
    user: &str,
    kind: StrategyKind,
    params: &[&str],
) -> Result<Strategy, CoreError> {
    Strategy::new(0, when, user, kind, params.iter().map(|p| p.to_string()).collect())
}

fn renamed_later(name: &str, stamp: &Stamp, current_name: &str, current_stamp: &Stamp) -> bool {
    name != current_name && stamp.last_modified() > current_stamp.last_modified()
}

fn merge_categories(
    merged: &mut Vec<Strategy>,
    identity: &str,
    parent: &Category,
    current_root: Option<&Category>,
) -> Result<(), CoreError> {
    for category in parent.children() {
        match current_root.and_then(|root| root.find(category.uid())) {
            None => merged.push(make(
                category.stamp().created(),
                identity,
                StrategyKind::CreateCategory,
                &[category.uid(), parent.uid(), category.name()],
            )?),
            Some(c) if renamed_later(category.name(), category.stamp(), c.name(), c.stamp()) => {
                merged.push(make(
                    category.stamp().last_modified(),
                    identity,
                    StrategyKind::RenameCategory,
                    &[category.uid(), category.name()],
                )?)
            }
            Some(_) => {}
        }
        merge_categories(merged, identity, category, current_root)?;
    }
    Ok(())
}

/// Adds the pomodoros `current` lacks right away and queues the timed history of every pomodoro
/// `current` has not lived through yet.
fn merge_workitem(
    merged: &mut Vec<Strategy>,
    timed: &mut Vec<Strategy>,
    identity: &str,
    workitem: &Workitem,
    current: Option<&Workitem>,
) -> Result<(), CoreError> {
    let uid = workitem.uid();
    let before: Vec<&Pomodoro> = current.map(|w| w.pomodoros().collect()).unwrap_or_default();

    for (index, pomodoro) in workitem.pomodoros().enumerate() {
        let previous = before.get(index).copied();
        if previous.is_none() {
            merged.push(make(
                pomodoro.stamp().created(),
                identity,
                StrategyKind::AddPomodoro,
                &[uid, "1", pomodoro.kind().as_str()],
            )?);
        }
        let Some(started) = pomodoro.date_work_started() else {
            continue;
        };

        if previous.and_then(Pomodoro::date_work_started).is_none() {
            let params = match pomodoro.kind() {
                PomodoroKind::Normal => vec![
                    uid.to_string(),
                    pomodoro.planned_work_duration().to_string(),
                    pomodoro.rest_duration().to_string(),
                ],
                _ => vec![uid.to_string()],
            };
            timed.push(Strategy::new(0, started, identity, StrategyKind::StartTimer, params)?);
        }

        for interruption in pomodoro.interruptions().filter(|i| !i.is_void()) {
            let known = previous.is_some_and(|p| {
                p.interruptions().any(|i| {
                    i.stamp().created() == interruption.stamp().created()
                        && i.reason() == interruption.reason()
                })
            });
            if !known {
                let duration = interruption.duration().map(|d| d.to_string()).unwrap_or_default();
                timed.push(make(
                    interruption.stamp().created(),
                    identity,
                    StrategyKind::AddInterruption,
                    &[uid, interruption.reason().unwrap_or_default(), duration.as_str()],
                )?);
            }
        }

        if previous.and_then(Pomodoro::date_completed).is_none() {
            if let Some(stopped) = stopped_at(pomodoro) {
                timed.push(make(stopped, identity, StrategyKind::StopTimer, &[])?);
            }
        }
    }

    if workitem.is_sealed() && !current.is_some_and(Workitem::is_sealed) {
        let when = workitem
            .date_work_ended()
            .unwrap_or_else(|| workitem.stamp().last_modified());
        timed.push(make(
            when,
            identity,
            StrategyKind::CompleteWorkitem,
            &[uid, workitem.state().as_str()],
        )?);
    }
    Ok(())
}

/// When the user stopped the pomodoro by hand. A normal pomodoro that ran its planned course is
/// finished by the timer and needs no stop.
fn stopped_at(pomodoro: &Pomodoro) -> Option<DateTime<Utc>> {
    let completed = pomodoro.date_completed()?;
    match (pomodoro.state(), pomodoro.kind()) {
        (PomodoroState::Finished, PomodoroKind::Normal)
            if pomodoro.planned_end_of_rest() == Some(completed) =>
        {
            None
        }
        (PomodoroState::Finished | PomodoroState::Canceled, _) => Some(completed),
        _ => None,
    }
}

/// Replays `lines` into the source as its configured user, persisting each strategy. CreateUser
/// lines are skipped and sequence numbers ignored, so deletions in `lines` apply and pomodoros on
/// open workitems may be added twice. Returns how many strategies ran.
pub fn import_classic(
    source: &EventSource,
    lines: &[String],
    options: ImportOptions,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<usize, EngineError> {
    let lines: Vec<&String> = lines.iter().filter(|l| !l.trim().is_empty()).collect();
    let mut reporter = Reporter::start(lines.len(), on_progress);
    source.emitter().mute();
    let result = replay_as_user(source, &lines, options, &mut reporter);
    source.emitter().unmute();
    let count = result?;
    info!(source = %source.name(), count, "classic import finished");
    reporter.complete(count);
    Ok(count)
}

fn replay_as_user(
    source: &EventSource,
    lines: &[&String],
    options: ImportOptions,
    reporter: &mut Reporter<'_>,
) -> Result<usize, EngineError> {
    let username = source.settings().username()?;
    let mut count = 0;
    if source.find_user(&username).is_none() {
        let create = make(
            source.clock().now(),
            ADMIN_USER,
            StrategyKind::CreateUser,
            &[username.as_str(), source.settings().fullname()?.as_str()],
        )?;
        if tolerate(source.execute_prepared(&create), options, 0)?.is_some() {
            count += 1;
        }
    }

    for (index, line) in lines.iter().enumerate() {
        let step = source
            .codec()
            .decode(line)
            .map_err(EngineError::from)
            .and_then(|decoded| match decoded {
                Some(s) if s.kind() != StrategyKind::CreateUser => {
                    let s = Strategy::new(0, s.when(), &username, s.kind(), s.params().to_vec())?;
                    source.execute_prepared(&s).map(|_| true)
                }
                _ => Ok(false),
            });
        if tolerate(step, options, index + 1)?.unwrap_or(false) {
            count += 1;
        }
        reporter.advance(index + 1);
    }
    Ok(count)
}

/// Swallows `result`'s error when errors are ignored, logging it against `line`.
fn tolerate<T>(
    result: Result<T, EngineError>,
    options: ImportOptions,
    line: usize,
) -> Result<Option<T>, EngineError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if options.ignore_errors => {
            warn!(line, error = %e, "ignoring a line that failed to import");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Replays `lines` into a scratch model, then executes only the strategies that bring its content
/// into the source. Nothing is deleted or duplicated. Returns how many strategies ran.
pub fn import_smart(
    source: &EventSource,
    lines: &[String],
    options: ImportOptions,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<usize, EngineError> {
    let imported = replay_into_scratch(source, lines, options)?;
    let strategies = source.with_data(|existing| merge_strategies(existing, &imported))?;
    debug!(count = strategies.len(), "merge planned");

    let mut reporter = Reporter::start(strategies.len(), on_progress);
    source.emitter().mute();
    let result = execute_all(source, &strategies, options, &mut reporter);
    source.emitter().unmute();
    let count = result?;
    info!(source = %source.name(), count, "smart import finished");
    reporter.complete(count);
    Ok(count)
}

fn replay_into_scratch(
    source: &EventSource,
    lines: &[String],
    options: ImportOptions,
) -> Result<Tenant, EngineError> {
    let emitter = EventEmitter::new(SOURCE_EVENTS);
    emitter.mute();
    let mut data = Tenant::new(source.clock().now());
    let mut ctx = ExecContext {
        data: &mut data,
        emitter: &emitter,
        settings: source.settings().as_ref(),
    };
    for (index, line) in lines.iter().enumerate() {
        let step = source
            .codec()
            .decode(line)
            .and_then(|decoded| match decoded {
                Some(s) => runner::run(&mut ctx, &s, false, false).map(|_| ()),
                None => Ok(()),
            })
            .map_err(EngineError::from);
        tolerate(step, options, index + 1)?;
    }
    Ok(data)
}

fn execute_all(
    source: &EventSource,
    strategies: &[Strategy],
    options: ImportOptions,
    reporter: &mut Reporter<'_>,
) -> Result<usize, EngineError> {
    let mut count = 0;
    for (index, strategy) in strategies.iter().enumerate() {
        if tolerate(source.execute_prepared(strategy), options, index + 1)?.is_some() {
            count += 1;
        }
        reporter.advance(index + 1);
    }
    Ok(count)
}

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use pomolog_core::events::{
    SOURCE_MESSAGES_PROCESSED, SOURCE_MESSAGES_REQUESTED, WENT_OFFLINE, WENT_ONLINE,
};
use pomolog_core::model::{Backlog, Tag, Tenant, User, Workitem};
use pomolog_core::settings::{
    SOURCE_AUTO_SEAL_TOLERANCE, SOURCE_IGNORE_ERRORS, SOURCE_IGNORE_INVALID_SEQUENCE,
};
use pomolog_core::{
    ADMIN_USER, Codec, codec, EventEmitter, EventParams, ExecContext, Outcome, Settings, Strategy,
    StrategyKind,
};
use pomolog_storage::{LogTransport, Snapshot};

use crate::clock::Clock;
use crate::error::EngineError;
use crate::repair::{self, RepairReport};
use crate::runner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    NotStarted,
    Starting,
    Running,
    Disconnected,
    Faulted,
}

/// A strategy to execute on behalf of the configured user.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: StrategyKind,
    pub params: Vec<String>,
    pub persist: bool,
    pub auto: bool,
    pub when: Option<DateTime<Utc>>,
    pub carry: Option<String>,
}

impl Command {
    pub fn new(kind: StrategyKind, params: &[&str]) -> Self {
        Self {
            kind,
            params: params.iter().map(|p| p.to_string()).collect(),
            persist: true,
            auto: false,
            when: None,
            carry: None,
        }
    }

    /// Backdates (or postdates) the strategy instead of taking the clock's time.
    pub fn at(mut self, when: DateTime<Utc>) -> Self {
        self.when = Some(when);
        self
    }

    /// Executes against the model without appending to the log.
    pub fn local(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn carrying(mut self, carry: &str) -> Self {
        self.carry = Some(carry.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Ingest {
    /// Full replay; lines up to `skip_through` are already in the model.
    Replay { skip_through: u64 },
    /// Lines appended since the last ingest.
    Incremental,
}

struct Inner {
    state: SourceState,
    transport: Box<dyn LogTransport>,
    data: Tenant,
    last_seq: u64,
    executed: usize,
    pending: VecDeque<String>,
    online: bool,
}

/// Owns a log and the model replayed from it.
///
/// All executions, replayed or live, are serialized through one lock around the model. Subscribers
/// are called while that lock is held, so a callback must not call back into the same source.
pub struct EventSource {
    inner: Mutex<Inner>,
    emitter: EventEmitter,
    settings: Arc<dyn Settings>,
    codec: Codec,
    clock: Arc<dyn Clock>,
}

impl EventSource {
    pub fn new(
        transport: Box<dyn LogTransport>,
        settings: Arc<dyn Settings>,
        codec: Codec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let data = Tenant::new(clock.now());
        Self {
            inner: Mutex::new(Inner {
                state: SourceState::NotStarted,
                transport,
                data,
                last_seq: 0,
                executed: 0,
                pending: VecDeque::new(),
                online: false,
            }),
            emitter: EventEmitter::new(pomolog_core::events::SOURCE_EVENTS),
            settings,
            codec,
            clock,
        }
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn settings(&self) -> &Arc<dyn Settings> {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn state(&self) -> SourceState {
        self.inner.lock().state
    }

    /// Source type name of the transport.
    pub fn name(&self) -> String {
        self.inner.lock().transport.name().to_string()
    }

    pub fn id(&self) -> String {
        self.inner.lock().transport.id()
    }

    pub fn last_seq(&self) -> u64 {
        self.inner.lock().last_seq
    }

    /// Strategies executed since the last (re)load, derived ones excluded.
    pub fn executed_count(&self) -> usize {
        self.inner.lock().executed
    }

    pub fn is_online(&self) -> bool {
        self.inner.lock().online
    }

    /// Lines executed locally but not yet accepted by the transport.
    pub fn pending(&self) -> Vec<String> {
        self.inner.lock().pending.iter().cloned().collect()
    }

    // ====================================================================
    // Lifecycle
    // ====================================================================

    /// Replays the whole log with events muted. An empty log is seeded with the configured user.
    pub fn start(&self) -> Result<(), EngineError> {
        self.load(None)
    }

    /// Restores `snapshot` and replays only what the log holds beyond it.
    pub fn start_from(&self, snapshot: Snapshot) -> Result<(), EngineError> {
        self.load(Some(snapshot))
    }

    fn load(&self, snapshot: Option<Snapshot>) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        match inner.state {
            SourceState::NotStarted | SourceState::Faulted => {}
            SourceState::Disconnected => return Err(EngineError::Disconnected),
            SourceState::Starting | SourceState::Running => return Err(EngineError::AlreadyStarted),
        }
        if let Some(snapshot) = &snapshot {
            let id = inner.transport.id();
            if snapshot.source_id != id {
                return Err(EngineError::UnsupportedConfiguration(format!(
                    "snapshot of {} cannot start source {id}",
                    snapshot.source_id
                )));
            }
        }

        inner.state = SourceState::Starting;
        match self.replay_and_announce(&mut inner, snapshot) {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.state = SourceState::Faulted;
                inner.online = false;
                error!(source = %inner.transport.name(), error = %e, "start failed");
                Err(e)
            }
        }
    }

    /// The part of a start that can fail once the source is `Starting`; any error faults it.
    fn replay_and_announce(&self, inner: &mut Inner, snapshot: Option<Snapshot>) -> Result<(), EngineError> {
        let requested = EventParams::new().with("source", inner.transport.name());
        self.emitter.emit(SOURCE_MESSAGES_REQUESTED, requested, None)?;
        self.emitter.mute();
        let result = self.replay(inner, snapshot);
        self.emitter.unmute();
        let count = result?;

        inner.state = SourceState::Running;
        inner.online = true;
        info!(
            source = %inner.transport.name(),
            executed = count,
            last_seq = inner.last_seq,
            "replay finished"
        );
        let processed = EventParams::new()
            .with("source", inner.transport.name())
            .with("count", count)
            .with("last_seq", inner.last_seq);
        self.emitter.emit(SOURCE_MESSAGES_PROCESSED, processed, None)?;
        Ok(())
    }

    fn replay(&self, inner: &mut Inner, snapshot: Option<Snapshot>) -> Result<usize, EngineError> {
        let (data, skip_through) = match snapshot {
            Some(snapshot) => (snapshot.data, snapshot.last_seq),
            None => (Tenant::new(self.clock.now()), 0),
        };
        inner.data = data;
        inner.last_seq = skip_through;
        inner.executed = 0;

        let mut lines = inner.transport.read_lines()?;
        if lines.iter().all(|l| l.trim().is_empty()) {
            let line = self.codec.encode(&self.bootstrap_strategy()?)?;
            inner.transport.append(&line)?;
            info!(source = %inner.transport.name(), "seeded empty log");
            lines = vec![line];
        }
        debug!(lines = lines.len(), skip_through, "replaying log");
        self.ingest(inner, &lines, Ingest::Replay { skip_through })
    }

    fn bootstrap_strategy(&self) -> Result<Strategy, EngineError> {
        let username = self.settings.username()?;
        if !codec::is_identity(&username) {
            return Err(EngineError::UnsupportedConfiguration(format!(
                "username {username:?} is not an email address"
            )));
        }
        Ok(Strategy::new(
            1,
            self.clock.now(),
            ADMIN_USER,
            StrategyKind::CreateUser,
            vec![username, self.settings.fullname()?],
        )?)
    }

    /// Releases the transport. Idempotent; pending lines are dropped.
    pub fn disconnect(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.state == SourceState::Disconnected {
            return Ok(());
        }
        if !inner.pending.is_empty() {
            warn!(pending = inner.pending.len(), "disconnecting with unsent lines");
        }
        inner.state = SourceState::Disconnected;
        inner.online = false;
        inner.transport.close()?;
        info!(source = %inner.transport.name(), "disconnected");
        Ok(())
    }

    /// Drops every subscriber of events matching `pattern`.
    pub fn cancel(&self, pattern: &str) -> Result<(), EngineError> {
        Ok(self.emitter.unsubscribe(pattern)?)
    }

    fn ensure_running(inner: &Inner) -> Result<(), EngineError> {
        match inner.state {
            SourceState::Running => Ok(()),
            SourceState::Disconnected => Err(EngineError::Disconnected),
            _ => Err(EngineError::NotStarted),
        }
    }

    // ====================================================================
    // Execution
    // ====================================================================

    /// Shorthand for a persisted command at the clock's current time.
    pub fn execute(&self, kind: StrategyKind, params: &[&str]) -> Result<Outcome, EngineError> {
        self.execute_strategy(Command::new(kind, params))
    }

    /// Executes against the local model right away, then appends the encoded line. A failed append
    /// keeps the line pending and reports the source offline; the local effect stays.
    ///
    /// Internal kinds never reach the log.
    pub fn execute_strategy(&self, command: Command) -> Result<Outcome, EngineError> {
        let mut inner = self.inner.lock();
        Self::ensure_running(&inner)?;

        let persist = command.persist && !command.kind.is_internal();
        let seq = inner.last_seq + 1;
        let when = command.when.unwrap_or_else(|| self.clock.now());
        let strategy = Strategy::new(
            seq,
            when,
            &self.settings.username()?,
            command.kind,
            command.params,
        )?
        .with_carry(command.carry);
        self.commit(&mut inner, &strategy, command.auto, persist)
    }

    /// Executes a strategy built elsewhere, keeping its user and timestamp but numbering it after
    /// the last strategy of this log. Used to bring in strategies from another log.
    pub fn execute_prepared(&self, strategy: &Strategy) -> Result<Outcome, EngineError> {
        let mut inner = self.inner.lock();
        Self::ensure_running(&inner)?;
        if strategy.kind().is_internal() {
            return Err(EngineError::UnsupportedConfiguration(format!(
                "{} cannot be executed from outside",
                strategy.kind()
            )));
        }
        let strategy = strategy.clone().with_sequence(inner.last_seq + 1);
        self.commit(&mut inner, &strategy, false, true)
    }

    fn commit(
        &self,
        inner: &mut Inner,
        strategy: &Strategy,
        auto: bool,
        persist: bool,
    ) -> Result<Outcome, EngineError> {
        let outcome = self.apply(inner, strategy, auto, persist)?;
        if persist {
            let line = self.codec.encode(strategy)?;
            inner.last_seq = strategy.seq();
            inner.pending.push_back(line);
            match self.flush(inner) {
                Ok(_) | Err(EngineError::Transport(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    fn apply(
        &self,
        inner: &mut Inner,
        strategy: &Strategy,
        auto: bool,
        persist: bool,
    ) -> Result<Outcome, EngineError> {
        let mut ctx = ExecContext {
            data: &mut inner.data,
            emitter: &self.emitter,
            settings: self.settings.as_ref(),
        };
        let outcome = runner::run(&mut ctx, strategy, auto, persist)?;
        inner.executed += 1;
        Ok(outcome)
    }

    /// Decodes and executes `lines` in order, enforcing sequence numbers when the transport asks
    /// for it. Returns how many strategies ran.
    fn ingest(&self, inner: &mut Inner, lines: &[String], mode: Ingest) -> Result<usize, EngineError> {
        let checked = inner.transport.checks_sequence()
            && !self.settings.is_enabled(SOURCE_IGNORE_INVALID_SEQUENCE)?;
        let ignore_errors = self.settings.is_enabled(SOURCE_IGNORE_ERRORS)?;
        let mut prev = match mode {
            Ingest::Replay { .. } => None,
            Ingest::Incremental => Some(inner.last_seq),
        };

        let mut executed = 0;
        for (index, line) in lines.iter().enumerate() {
            let strategy = match self.codec.decode(line) {
                Ok(Some(strategy)) => strategy,
                Ok(None) => continue,
                Err(e) if ignore_errors => {
                    warn!(line = index + 1, error = %e, "skipping undecodable line");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let seq = strategy.seq();
            match (mode, prev) {
                (Ingest::Incremental, Some(p)) if seq <= p => continue,
                (_, Some(p)) if checked && seq != p + 1 => {
                    return Err(EngineError::SequenceViolation {
                        expected: p + 1,
                        received: seq,
                    });
                }
                (_, Some(p)) if seq <= p => {
                    warn!(seq, after = p, "skipping strategy with a regressing sequence");
                    continue;
                }
                _ => {}
            }
            prev = Some(seq);
            if let Ingest::Replay { skip_through } = mode {
                if seq <= skip_through {
                    continue;
                }
            }

            inner.last_seq = seq;
            match self.apply(inner, &strategy, false, false) {
                Ok(_) => executed += 1,
                Err(e) if ignore_errors => {
                    warn!(line = index + 1, seq, error = %e, "ignoring failed strategy");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(executed)
    }

    /// Executes lines another writer appended to the log, skipping those already applied.
    pub fn receive(&self, lines: &[String]) -> Result<usize, EngineError> {
        let mut inner = self.inner.lock();
        Self::ensure_running(&inner)?;
        match self.ingest(&mut inner, lines, Ingest::Incremental) {
            Ok(count) => {
                debug!(count, last_seq = inner.last_seq, "received lines");
                Ok(count)
            }
            Err(e) => {
                inner.state = SourceState::Faulted;
                error!(error = %e, "failed to ingest received lines");
                Err(e)
            }
        }
    }

    /// Decodes the whole log without executing it. Comment lines are skipped.
    pub fn read_strategies(&self) -> Result<Vec<Strategy>, EngineError> {
        let lines = {
            let mut inner = self.inner.lock();
            Self::ensure_running(&inner)?;
            inner.transport.read_lines()?
        };
        let mut strategies = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Some(strategy) = self.codec.decode(line)? {
                strategies.push(strategy);
            }
        }
        Ok(strategies)
    }

    /// Re-reads the transport and executes whatever is new.
    pub fn refresh(&self) -> Result<usize, EngineError> {
        let lines = {
            let mut inner = self.inner.lock();
            Self::ensure_running(&inner)?;
            inner.transport.read_lines()?
        };
        self.receive(&lines)
    }

    // ====================================================================
    // Connectivity
    // ====================================================================

    fn flush(&self, inner: &mut Inner) -> Result<usize, EngineError> {
        let mut sent = 0;
        while let Some(line) = inner.pending.front() {
            if let Err(e) = inner.transport.append(line) {
                warn!(pending = inner.pending.len(), error = %e, "append failed, keeping lines for later");
                self.mark_offline(inner, &e.to_string())?;
                return Err(e.into());
            }
            inner.pending.pop_front();
            sent += 1;
        }
        self.mark_online(inner)?;
        Ok(sent)
    }

    fn mark_online(&self, inner: &mut Inner) -> Result<(), EngineError> {
        if !inner.online {
            inner.online = true;
            info!(source = %inner.transport.name(), "went online");
            self.emitter.emit_forced(WENT_ONLINE, EventParams::new(), None)?;
        }
        Ok(())
    }

    fn mark_offline(&self, inner: &mut Inner, reason: &str) -> Result<(), EngineError> {
        if inner.online {
            inner.online = false;
            let params = EventParams::new()
                .with("reason", reason)
                .with("pending", inner.pending.len());
            self.emitter.emit_forced(WENT_OFFLINE, params, None)?;
        }
        Ok(())
    }

    /// Retries pending appends in order. Stops at the first failure, which is returned.
    pub fn flush_pending(&self) -> Result<usize, EngineError> {
        let mut inner = self.inner.lock();
        Self::ensure_running(&inner)?;
        self.flush(&mut inner)
    }

    /// The transport is reachable again: flushes what piled up meanwhile.
    pub fn went_online(&self) -> Result<usize, EngineError> {
        self.flush_pending()
    }

    pub fn went_offline(&self, reason: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        self.mark_offline(&mut inner, reason)
    }

    // ====================================================================
    // Reconciliation
    // ====================================================================

    /// Auto-seals at the clock's current time.
    pub fn auto_seal(&self) -> Result<usize, EngineError> {
        self.auto_seal_at(self.clock.now())
    }

    /// Applies every timer transition that should have happened before `when`, backdated to the
    /// instant it was due. Returns how many transitions ran.
    pub fn auto_seal_at(&self, when: DateTime<Utc>) -> Result<usize, EngineError> {
        let mut inner = self.inner.lock();
        Self::ensure_running(&inner)?;
        let tolerance = self.settings.get_f64(SOURCE_AUTO_SEAL_TOLERANCE)?;
        let sealant = Strategy::new(
            inner.last_seq,
            when,
            ADMIN_USER,
            StrategyKind::AutoSealInternal,
            vec![tolerance.to_string()],
        )?;
        let outcome = self.apply(&mut inner, &sealant, true, false)?;
        Ok(outcome
            .result
            .and_then(|count| count.parse().ok())
            .unwrap_or(0))
    }

    /// The earliest instant some timer is due to ring, for scheduling the next reconciliation.
    pub fn next_transition(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .data
            .users()
            .filter_map(|u| u.timer().next_state_change())
            .min()
    }

    // ====================================================================
    // Snapshots and repair
    // ====================================================================

    pub fn snapshot(&self) -> Result<Snapshot, EngineError> {
        let inner = self.inner.lock();
        Self::ensure_running(&inner)?;
        Ok(Snapshot {
            source_id: inner.transport.id(),
            last_seq: inner.last_seq,
            taken_at: self.clock.now(),
            data: inner.data.clone(),
        })
    }

    /// Rewrites a damaged log so that it replays cleanly, keeping a backup of the original. A
    /// running source reloads from the repaired log.
    pub fn repair(&self) -> Result<RepairReport, EngineError> {
        let mut inner = self.inner.lock();
        if inner.state == SourceState::Disconnected {
            return Err(EngineError::Disconnected);
        }
        let lines = inner.transport.read_lines()?;
        let (strategies, mut report) =
            repair::repair(&lines, &self.codec, self.settings.as_ref(), self.clock.now())?;
        if report.changes == 0 {
            return Ok(report);
        }

        let encoded = strategies
            .iter()
            .map(|s| self.codec.encode(s))
            .collect::<Result<Vec<_>, _>>()?;
        let backup = inner.transport.overwrite(&encoded)?;
        report.log.push(format!("Rewrote the log, previous content kept at {backup}"));
        report.backup = Some(backup);
        for entry in &report.log {
            info!(source = %inner.transport.name(), "repair: {entry}");
        }

        if inner.state == SourceState::Running {
            self.emitter.mute();
            let reloaded = self.replay(&mut inner, None);
            self.emitter.unmute();
            if let Err(e) = reloaded {
                inner.state = SourceState::Faulted;
                return Err(e);
            }
        }
        Ok(report)
    }

    // ====================================================================
    // Queries
    // ====================================================================

    /// Runs `f` against the model under the execution lock.
    pub fn with_data<R>(&self, f: impl FnOnce(&Tenant) -> R) -> R {
        f(&self.inner.lock().data)
    }

    pub fn find_user(&self, identity: &str) -> Option<User> {
        self.with_data(|data| data.user(identity).cloned())
    }

    pub fn find_backlog(&self, uid: &str) -> Option<Backlog> {
        self.with_data(|data| data.users().find_map(|u| u.backlog(uid)).cloned())
    }

    pub fn find_workitem(&self, uid: &str) -> Option<Workitem> {
        self.with_data(|data| data.users().find_map(|u| u.find_workitem(uid)).cloned())
    }

    pub fn find_tag(&self, uid: &str) -> Option<Tag> {
        self.with_data(|data| {
            data.users()
                .flat_map(|u| u.tags().iter())
                .find(|t| t.uid() == uid)
                .cloned()
        })
    }

    pub fn count_pomodoros(&self) -> usize {
        self.with_data(|data| {
            data.users()
                .flat_map(User::workitems)
                .map(|w| w.pomodoros().count())
                .sum()
        })
    }
}

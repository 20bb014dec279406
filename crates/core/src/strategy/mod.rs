//! Strategies: immutable, timestamped, attributable commands replayed against the [`Tenant`].
//!
//! A [`Strategy`] is plain data. Its behavior lives in the per-domain modules and runs only from
//! [`Strategy::execute`], which mutates the model and publishes domain events through the
//! [`ExecContext`] emitter.

mod backlog;
mod category;
mod pomodoro;
mod reconcile;
mod registry;
mod timer;
mod user;
mod workitem;

pub use pomodoro::MAX_POMODOROS_PER_ADD;
pub use reconcile::{SealAction, plan_auto_seal};
pub use registry::StrategyRegistry;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::codec;
use crate::emitter::{EventEmitter, EventParams};
use crate::error::CoreError;
use crate::events;
use crate::model::{MAX_DURATION_SECONDS, Tenant, User, is_valid_duration};
use crate::settings::Settings;

/// Suffix stripped from a kind's type name to obtain its registry name.
pub const STRATEGY_SUFFIX: &str = "Strategy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    CreateUser,
    DeleteUser,
    RenameUser,
    CreateBacklog,
    DeleteBacklog,
    RenameBacklog,
    ReorderBacklog,
    CreateWorkitem,
    DeleteWorkitem,
    RenameWorkitem,
    CompleteWorkitem,
    MoveWorkitem,
    ReorderWorkitem,
    AddPomodoro,
    RemovePomodoro,
    AddInterruption,
    StartWork,
    StartTimer,
    StopTimer,
    VoidPomodoro,
    FinishTracking,
    CreateCategory,
    DeleteCategory,
    RenameCategory,
    Shutdown,
    StartRestInternal,
    FinishPomodoroInternal,
    TimerRingInternal,
    AutoSealInternal,
}

impl StrategyKind {
    /// Kinds that can appear in a log.
    pub const REGISTERED: &'static [StrategyKind] = &[
        StrategyKind::CreateUser,
        StrategyKind::DeleteUser,
        StrategyKind::RenameUser,
        StrategyKind::CreateBacklog,
        StrategyKind::DeleteBacklog,
        StrategyKind::RenameBacklog,
        StrategyKind::ReorderBacklog,
        StrategyKind::CreateWorkitem,
        StrategyKind::DeleteWorkitem,
        StrategyKind::RenameWorkitem,
        StrategyKind::CompleteWorkitem,
        StrategyKind::MoveWorkitem,
        StrategyKind::ReorderWorkitem,
        StrategyKind::AddPomodoro,
        StrategyKind::RemovePomodoro,
        StrategyKind::AddInterruption,
        StrategyKind::StartWork,
        StrategyKind::StartTimer,
        StrategyKind::StopTimer,
        StrategyKind::VoidPomodoro,
        StrategyKind::FinishTracking,
        StrategyKind::CreateCategory,
        StrategyKind::DeleteCategory,
        StrategyKind::RenameCategory,
        StrategyKind::Shutdown,
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            StrategyKind::CreateUser => "CreateUserStrategy",
            StrategyKind::DeleteUser => "DeleteUserStrategy",
            StrategyKind::RenameUser => "RenameUserStrategy",
            StrategyKind::CreateBacklog => "CreateBacklogStrategy",
            StrategyKind::DeleteBacklog => "DeleteBacklogStrategy",
            StrategyKind::RenameBacklog => "RenameBacklogStrategy",
            StrategyKind::ReorderBacklog => "ReorderBacklogStrategy",
            StrategyKind::CreateWorkitem => "CreateWorkitemStrategy",
            StrategyKind::DeleteWorkitem => "DeleteWorkitemStrategy",
            StrategyKind::RenameWorkitem => "RenameWorkitemStrategy",
            StrategyKind::CompleteWorkitem => "CompleteWorkitemStrategy",
            StrategyKind::MoveWorkitem => "MoveWorkitemStrategy",
            StrategyKind::ReorderWorkitem => "ReorderWorkitemStrategy",
            StrategyKind::AddPomodoro => "AddPomodoroStrategy",
            StrategyKind::RemovePomodoro => "RemovePomodoroStrategy",
            StrategyKind::AddInterruption => "AddInterruptionStrategy",
            StrategyKind::StartWork => "StartWorkStrategy",
            StrategyKind::StartTimer => "StartTimerStrategy",
            StrategyKind::StopTimer => "StopTimerStrategy",
            StrategyKind::VoidPomodoro => "VoidPomodoroStrategy",
            StrategyKind::FinishTracking => "FinishTrackingStrategy",
            StrategyKind::CreateCategory => "CreateCategoryStrategy",
            StrategyKind::DeleteCategory => "DeleteCategoryStrategy",
            StrategyKind::RenameCategory => "RenameCategoryStrategy",
            StrategyKind::Shutdown => "ShutdownStrategy",
            StrategyKind::StartRestInternal => "StartRestInternalStrategy",
            StrategyKind::FinishPomodoroInternal => "FinishPomodoroInternalStrategy",
            StrategyKind::TimerRingInternal => "TimerRingInternalStrategy",
            StrategyKind::AutoSealInternal => "AutoSealInternalStrategy",
        }
    }

    /// The name written to logs: the type name without its suffix.
    pub fn name(&self) -> &'static str {
        let type_name = self.type_name();
        type_name.strip_suffix(STRATEGY_SUFFIX).unwrap_or(type_name)
    }

    /// Administrative kinds stay readable to a server-side authority even under encryption.
    pub fn encryptable(&self) -> bool {
        !matches!(self, StrategyKind::CreateUser | StrategyKind::Shutdown)
    }

    /// Kinds that must see an up-to-date timer, so overdue rings are applied before them.
    pub fn requires_sealing(&self) -> bool {
        matches!(
            self,
            StrategyKind::DeleteUser
                | StrategyKind::StartWork
                | StrategyKind::StartTimer
                | StrategyKind::StopTimer
                | StrategyKind::VoidPomodoro
                | StrategyKind::FinishTracking
        )
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StrategyKind::StartRestInternal
                | StrategyKind::FinishPomodoroInternal
                | StrategyKind::TimerRingInternal
                | StrategyKind::AutoSealInternal
        )
    }

    /// Minimum and maximum number of parameters.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            StrategyKind::StopTimer | StrategyKind::TimerRingInternal => (0, 0),
            StrategyKind::VoidPomodoro
            | StrategyKind::FinishTracking
            | StrategyKind::Shutdown
            | StrategyKind::AutoSealInternal => (0, 1),
            StrategyKind::DeleteUser
            | StrategyKind::DeleteBacklog
            | StrategyKind::DeleteWorkitem
            | StrategyKind::DeleteCategory
            | StrategyKind::StartRestInternal
            | StrategyKind::FinishPomodoroInternal => (1, 1),
            StrategyKind::AddInterruption | StrategyKind::StartTimer => (1, 3),
            StrategyKind::AddPomodoro | StrategyKind::StartWork => (2, 3),
            StrategyKind::CreateWorkitem | StrategyKind::CreateCategory => (3, 3),
            StrategyKind::CreateUser
            | StrategyKind::RenameUser
            | StrategyKind::CreateBacklog
            | StrategyKind::RenameBacklog
            | StrategyKind::ReorderBacklog
            | StrategyKind::RenameWorkitem
            | StrategyKind::CompleteWorkitem
            | StrategyKind::MoveWorkitem
            | StrategyKind::ReorderWorkitem
            | StrategyKind::RemovePomodoro
            | StrategyKind::RenameCategory => (2, 2),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a strategy runs against.
pub struct ExecContext<'a> {
    pub data: &'a mut Tenant,
    pub emitter: &'a EventEmitter,
    pub settings: &'a dyn Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub result: Option<String>,
    pub carry: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    seq: u64,
    when: DateTime<Utc>,
    user: String,
    kind: StrategyKind,
    params: Vec<String>,
    carry: Option<String>,
}

impl Strategy {
    /// Trailing empty parameters beyond the required ones are dropped: optional parameters treat
    /// `""` as absent. The acting user must be an identity a log line can carry.
    pub fn new(
        seq: u64,
        when: DateTime<Utc>,
        user: &str,
        kind: StrategyKind,
        mut params: Vec<String>,
    ) -> Result<Self, CoreError> {
        if !codec::is_identity(user) {
            return Err(CoreError::InvalidParams {
                strategy: kind.name().to_string(),
                reason: format!("acting user {user:?} is not an email address"),
            });
        }
        let (min, max) = kind.arity();
        while params.len() > min && params.last().is_some_and(String::is_empty) {
            params.pop();
        }
        if params.len() < min || params.len() > max {
            return Err(CoreError::InvalidParams {
                strategy: kind.name().to_string(),
                reason: format!(
                    "expected {min}..={max} parameters, got {}",
                    params.len()
                ),
            });
        }
        Ok(Self {
            seq,
            when,
            user: user.to_string(),
            kind,
            params,
            carry: None,
        })
    }

    pub fn with_carry(mut self, carry: Option<String>) -> Self {
        self.carry = carry;
        self
    }

    pub fn with_sequence(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn when(&self) -> DateTime<Utc> {
        self.when
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn carry(&self) -> Option<&str> {
        self.carry.as_deref()
    }

    pub fn encryptable(&self) -> bool {
        self.kind.encryptable()
    }

    pub fn requires_sealing(&self) -> bool {
        self.kind.requires_sealing()
    }

    /// Parameter `index`, or `""` when absent.
    pub fn param(&self, index: usize) -> &str {
        self.params.get(index).map_or("", String::as_str)
    }

    /// Parameter `index` unless absent or empty.
    pub fn optional(&self, index: usize) -> Option<&str> {
        self.params
            .get(index)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> Result<Outcome, CoreError> {
        let result = match self.kind {
            StrategyKind::CreateUser => user::create(self, ctx)?,
            StrategyKind::DeleteUser => user::delete(self, ctx)?,
            StrategyKind::RenameUser => user::rename(self, ctx)?,
            StrategyKind::CreateBacklog => backlog::create(self, ctx)?,
            StrategyKind::DeleteBacklog => backlog::delete(self, ctx)?,
            StrategyKind::RenameBacklog => backlog::rename(self, ctx)?,
            StrategyKind::ReorderBacklog => backlog::reorder(self, ctx)?,
            StrategyKind::CreateWorkitem => workitem::create(self, ctx)?,
            StrategyKind::DeleteWorkitem => workitem::delete(self, ctx)?,
            StrategyKind::RenameWorkitem => workitem::rename(self, ctx)?,
            StrategyKind::CompleteWorkitem => workitem::complete(self, ctx)?,
            StrategyKind::MoveWorkitem => workitem::relocate(self, ctx)?,
            StrategyKind::ReorderWorkitem => workitem::reorder(self, ctx)?,
            StrategyKind::AddPomodoro => pomodoro::add(self, ctx)?,
            StrategyKind::RemovePomodoro => pomodoro::remove(self, ctx)?,
            StrategyKind::AddInterruption => pomodoro::add_interruption(self, ctx)?,
            StrategyKind::StartRestInternal => pomodoro::start_rest(self, ctx)?,
            StrategyKind::FinishPomodoroInternal => pomodoro::finish(self, ctx)?,
            StrategyKind::StartWork => timer::start_work(self, ctx)?,
            StrategyKind::StartTimer => timer::start_timer(self, ctx)?,
            StrategyKind::StopTimer => timer::stop_timer(self, ctx)?,
            StrategyKind::VoidPomodoro | StrategyKind::FinishTracking => timer::stop_running(self, ctx)?,
            StrategyKind::TimerRingInternal => timer::ring(self, ctx)?,
            StrategyKind::AutoSealInternal => reconcile::auto_seal(self, ctx)?,
            StrategyKind::CreateCategory => category::create(self, ctx)?,
            StrategyKind::DeleteCategory => category::delete(self, ctx)?,
            StrategyKind::RenameCategory => category::rename(self, ctx)?,
            StrategyKind::Shutdown => None,
        };
        Ok(Outcome {
            result,
            carry: self.carry.clone(),
        })
    }

    /// Runs a strategy of another kind as if it had been issued alongside this one: same seq, when,
    /// user and carry, wrapped in its own message notifications.
    pub fn derive(
        &self,
        ctx: &mut ExecContext<'_>,
        kind: StrategyKind,
        params: Vec<String>,
    ) -> Result<Outcome, CoreError> {
        self.derive_with(ctx, kind, params, None, None)
    }

    /// `derive` with an overridden timestamp and/or acting user.
    pub fn derive_with(
        &self,
        ctx: &mut ExecContext<'_>,
        kind: StrategyKind,
        params: Vec<String>,
        when: Option<DateTime<Utc>>,
        user: Option<&str>,
    ) -> Result<Outcome, CoreError> {
        let derived = Strategy::new(
            self.seq,
            when.unwrap_or(self.when),
            user.unwrap_or(&self.user),
            kind,
            params,
        )?
        .with_carry(self.carry.clone());
        let params = message_params(&derived, true, false);
        ctx.emitter
            .emit(events::BEFORE_MESSAGE_PROCESSED, params.clone(), derived.carry())?;
        let outcome = derived.execute(ctx)?;
        ctx.emitter.emit(
            events::AFTER_MESSAGE_PROCESSED,
            params.with("result", outcome.result.clone()),
            derived.carry(),
        )?;
        Ok(outcome)
    }

    // ====================================================================
    // Helpers shared by the per-domain modules
    // ====================================================================

    fn emit(&self, emitter: &EventEmitter, event: &str, params: EventParams) -> Result<(), CoreError> {
        emitter.emit(event, params, self.carry())
    }

    fn invalid(&self, reason: impl Into<String>) -> CoreError {
        CoreError::InvalidParams {
            strategy: self.kind.name().to_string(),
            reason: reason.into(),
        }
    }

    fn parse_param<T: FromStr>(&self, index: usize, what: &str) -> Result<T, CoreError> {
        let raw = self.param(index);
        raw.trim()
            .parse()
            .map_err(|_| self.invalid(format!("{what} is not a valid number: {raw:?}")))
    }

    fn parse_optional<T: FromStr>(&self, index: usize, what: &str) -> Result<Option<T>, CoreError> {
        match self.optional(index) {
            Some(_) => self.parse_param(index, what).map(Some),
            None => Ok(None),
        }
    }

    /// An optional duration in seconds, refused unless finite and within [`MAX_DURATION_SECONDS`].
    fn parse_duration(&self, index: usize, what: &str) -> Result<Option<f64>, CoreError> {
        match self.parse_optional::<f64>(index, what)? {
            Some(secs) if !is_valid_duration(secs) => Err(self.invalid(format!(
                "{what} must be between 0 and {MAX_DURATION_SECONDS} seconds, got {}",
                self.param(index)
            ))),
            parsed => Ok(parsed),
        }
    }

    fn acting_user<'d>(&self, data: &'d Tenant) -> Result<&'d User, CoreError> {
        data.get_user(&self.user)
    }

    fn acting_user_mut<'d>(&self, data: &'d mut Tenant) -> Result<&'d mut User, CoreError> {
        data.get_user_mut(&self.user)
    }

    fn require_system_user(&self, data: &Tenant) -> Result<(), CoreError> {
        if data.user(&self.user).is_some_and(User::is_system) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized(format!(
                "{} may not {}",
                self.user,
                self.kind.name()
            )))
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&codec::plaintext(self))
    }
}

/// Parameters of `BeforeMessageProcessed` / `AfterMessageProcessed`.
pub fn message_params(strategy: &Strategy, auto: bool, persist: bool) -> EventParams {
    EventParams::new()
        .with("strategy", strategy.to_string())
        .with("kind", strategy.kind().name())
        .with("seq", strategy.seq())
        .with("user", strategy.user())
        .with("when", strategy.when())
        .with("auto", auto)
        .with("persist", persist)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;

    use super::*;
    use crate::emitter::callback;
    use crate::events::SOURCE_EVENTS;
    use crate::ids::ADMIN_USER;
    use crate::settings::MemorySettings;

    pub const ALICE: &str = "alice@example.com";

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// A tenant with Alice, an emitter that records every event name, and default settings.
    pub struct Fixture {
        pub data: Tenant,
        pub emitter: EventEmitter,
        pub settings: MemorySettings,
        pub seen: Arc<Mutex<Vec<String>>>,
        seq: u64,
    }

    impl Fixture {
        pub fn new() -> Self {
            let emitter = EventEmitter::new(SOURCE_EVENTS);
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            emitter
                .subscribe(
                    "*",
                    callback(move |p| {
                        sink.lock().push(p.event().to_string());
                        Ok(())
                    }),
                    false,
                )
                .unwrap();
            let mut fixture = Self {
                data: Tenant::new(at(0)),
                emitter,
                settings: MemorySettings::new(),
                seen,
                seq: 0,
            };
            fixture
                .run_as(ADMIN_USER, StrategyKind::CreateUser, &[ALICE, "Alice"], 0)
                .unwrap();
            fixture.seen.lock().clear();
            fixture
        }

        pub fn run_as(
            &mut self,
            user: &str,
            kind: StrategyKind,
            params: &[&str],
            secs: i64,
        ) -> Result<Outcome, CoreError> {
            self.seq += 1;
            let params = params.iter().map(|p| p.to_string()).collect();
            let strategy = Strategy::new(self.seq, at(secs), user, kind, params)?;
            let mut ctx = ExecContext {
                data: &mut self.data,
                emitter: &self.emitter,
                settings: &self.settings,
            };
            strategy.execute(&mut ctx)
        }

        pub fn run(&mut self, kind: StrategyKind, params: &[&str], secs: i64) -> Result<Outcome, CoreError> {
            self.run_as(ALICE, kind, params, secs)
        }

        pub fn alice(&self) -> &User {
            self.data.user(ALICE).unwrap()
        }

        pub fn take_events(&self) -> Vec<String> {
            std::mem::take(&mut *self.seen.lock())
        }
    }
}

pub mod clock;
pub mod error;
pub mod factory;
pub mod holder;
pub mod import_export;
pub mod repair;
pub mod runner;
pub mod source;
pub mod ticker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::EngineError;
pub use factory::{Producer, SourceFactory};
pub use holder::EventSourceHolder;
pub use repair::RepairReport;
pub use source::{Command, EventSource, SourceState};
pub use ticker::Ticker;

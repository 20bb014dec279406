pub mod codec;
pub mod crypto;
pub mod emitter;
pub mod error;
pub mod events;
pub mod ids;
pub mod model;
pub mod param_value;
pub mod settings;
pub mod strategy;

pub use codec::Codec;
pub use crypto::{AeadCryptograph, Cryptograph, NoCryptograph};
pub use emitter::{Callback, EventEmitter, EventParams, callback};
pub use error::CoreError;
pub use ids::*;
pub use param_value::ParamValue;
pub use settings::{MemorySettings, Settings};
pub use strategy::{
    ExecContext, Outcome, SealAction, Strategy, StrategyKind, StrategyRegistry, plan_auto_seal,
};

pub mod error;
pub mod file;
pub mod memory;
pub mod schema;
pub mod snapshot;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use file::{FileLog, LOCAL_SOURCE};
pub use memory::{EPHEMERAL_SOURCE, MemoryLog};
pub use snapshot::Snapshot;
pub use sqlite::{SQLITE_SOURCE, SqliteLog, SqliteSettings, SqliteSnapshots};
pub use traits::LogTransport;

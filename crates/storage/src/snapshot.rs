use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pomolog_core::model::Tenant;

use crate::error::StorageError;

/// The model as it stood after replaying every line up to `last_seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub source_id: String,
    pub last_seq: u64,
    pub taken_at: DateTime<Utc>,
    pub data: Tenant,
}

impl Snapshot {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, StorageError> {
        rmp_serde::to_vec_named(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, StorageError> {
        rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

//! Published supply snapshot document.

use crate::aggregator::SupplyValues;
use crate::error::StateError;
use crate::storage::state::decimal_u256;
use crate::storage::write_json_atomic;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    /// Which allocation strategy produced `inPuts`.
    pub allocated_source: String,
    #[serde(with = "decimal_u256")]
    pub invariant_target_wei: U256,
    pub burned_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// RFC 3339, millisecond precision, UTC.
    pub updated_at: String,
    pub decimals: u8,
    pub meta: SnapshotMeta,
    /// Head observed per chain, as decimal strings.
    pub latest_blocks: BTreeMap<String, String>,
    pub values_wei: SupplyValues,
}

impl MetricsSnapshot {
    pub fn timestamp_now() -> String {
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the published document wholesale.
    pub fn publish(&self, snapshot: &MetricsSnapshot) -> Result<(), StateError> {
        write_json_atomic(&self.path, snapshot)
    }

    pub fn read(&self) -> Result<Option<MetricsSnapshot>, StateError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StateError::Corrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })
    }
}

//! Resumable cursors and accumulators.
//!
//! The whole document is loaded once when a run starts and saved once when it ends.
//! Heights and amounts are stored as decimal strings; an uninitialised cursor is `"-1"`.

use crate::config::chains::ChainKey;
use crate::error::StateError;
use crate::storage::write_json_atomic;
use crate::utils::hex::{format_address, to_u256};
use alloy::primitives::{Address, U256};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Last block through which an incremental job has fully scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cursor {
    #[default]
    Uninitialized,
    Checkpoint(u64),
}

impl Cursor {
    const UNINITIALIZED_MARKER: &'static str = "-1";

    pub fn is_initialized(self) -> bool {
        matches!(self, Self::Checkpoint(_))
    }

    /// First block an incremental scan should cover. A job that never ran backfills at
    /// most `lookback_blocks` below the head.
    pub fn resume_from(self, latest_block: u64, lookback_blocks: u64) -> u64 {
        match self {
            Self::Checkpoint(block) => block.saturating_add(1),
            Self::Uninitialized => latest_block.saturating_sub(lookback_blocks),
        }
    }

    /// Cursors never move backwards, even if a lagging endpoint reports an older head.
    pub fn advanced_to(self, block: u64) -> Self {
        match self {
            Self::Checkpoint(prev) => Self::Checkpoint(prev.max(block)),
            Self::Uninitialized => Self::Checkpoint(block),
        }
    }

    fn encode(self) -> String {
        match self {
            Self::Checkpoint(block) => block.to_string(),
            Self::Uninitialized => Self::UNINITIALIZED_MARKER.to_string(),
        }
    }

    fn decode(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if let Some(digits) = trimmed.strip_prefix('-') {
            let numeric = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
            return numeric.then_some(Self::Uninitialized);
        }
        trimmed.parse::<u64>().ok().map(Self::Checkpoint)
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CursorVisitor;

        impl<'de> Visitor<'de> for CursorVisitor {
            type Value = Cursor;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a block height or -1, as string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Cursor, E> {
                Cursor::decode(v).ok_or_else(|| E::custom(format!("invalid cursor `{v}`")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cursor, E> {
                Ok(Cursor::Checkpoint(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cursor, E> {
                Ok(u64::try_from(v).map_or(Cursor::Uninitialized, Cursor::Checkpoint))
            }
        }

        deserializer.deserialize_any(CursorVisitor)
    }
}

/// U256 as a decimal string; integers and 0x-hex strings are accepted on read.
pub mod decimal_u256 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = U256;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer amount")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
                to_u256(v).ok_or_else(|| E::custom(format!("invalid amount `{v}`")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
                Ok(U256::from(v))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

mod address_set {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &BTreeSet<Address>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(value.iter().map(|addr| format_address(*addr)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeSet<Address>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| {
                Address::from_str(s.trim())
                    .map_err(|err| de::Error::custom(format!("invalid address `{s}`: {err}")))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainCursorState {
    #[serde(default)]
    pub last_burn_block: Cursor,
    #[serde(default, with = "decimal_u256")]
    pub burned_wei: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationLedgerState {
    #[serde(default)]
    pub last_block: Cursor,
    #[serde(default, with = "decimal_u256")]
    pub invested_wei: U256,
    #[serde(default, with = "decimal_u256")]
    pub divested_wei: U256,
    #[serde(default, with = "decimal_u256")]
    pub withdrawn_wei: U256,
}

impl AllocationLedgerState {
    /// `invested - divested - withdrawn`, floored at zero.
    pub fn allocated(&self) -> U256 {
        self.invested_wei
            .saturating_sub(self.divested_wei)
            .saturating_sub(self.withdrawn_wei)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRegistryState {
    #[serde(default)]
    pub last_block: Cursor,
    #[serde(default, with = "address_set")]
    pub addresses: BTreeSet<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Keyed by chain document name; entries for chains no longer configured are kept.
    #[serde(default)]
    pub chains: BTreeMap<String, ChainCursorState>,
    #[serde(default)]
    pub vc: AddressRegistryState,
    #[serde(default, rename = "ftAlloc")]
    pub ft_alloc: AllocationLedgerState,
}

impl PersistedState {
    pub fn chain(&self, key: ChainKey) -> ChainCursorState {
        self.chains.get(key.as_str()).cloned().unwrap_or_default()
    }

    pub fn set_chain(&mut self, key: ChainKey, state: ChainCursorState) {
        self.chains.insert(key.as_str().to_string(), state);
    }
}

/// File-backed home of `PersistedState`.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing document means nothing has been indexed yet. An unreadable one is an
    /// error: silently starting over would re-backfill and drop accumulated burns.
    pub fn load(&self) -> Result<PersistedState, StateError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "[STATE] no state document at {}; starting with uninitialised cursors",
                    self.path.display()
                );
                return Ok(PersistedState::default());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|err| StateError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    pub fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        write_json_atomic(&self.path, state)
    }
}

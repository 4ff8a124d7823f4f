use crate::config::chains::ChainKey;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("network error: {0}")]
    Rpc(#[from] RpcError),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{chain} pipeline failed: {source}")]
    Pipeline {
        chain: ChainKey,
        #[source]
        source: Box<IndexerError>,
    },
    #[error("pipeline task aborted: {0}")]
    TaskAborted(String),
}

impl IndexerError {
    pub fn in_chain(self, chain: ChainKey) -> Self {
        match self {
            Self::Pipeline { .. } => self,
            other => Self::Pipeline {
                chain,
                source: Box::new(other),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport failure on `{endpoint}`: {reason}")]
    Transport { endpoint: String, reason: String },
    #[error("HTTP {status} from `{endpoint}`")]
    Http { endpoint: String, status: u16 },
    #[error("JSON-RPC error {code} from `{endpoint}`: {message}")]
    JsonRpc {
        endpoint: String,
        code: i64,
        message: String,
    },
    #[error("could not decode `{method}` result: {reason}")]
    Decode { method: String, reason: String },
    #[error("no RPC endpoints configured for `{method}`")]
    NoEndpoints { method: String },
    #[error("`{method}` failed on all {attempted} endpoint(s); last error: {last}")]
    Unavailable {
        method: String,
        attempted: usize,
        last: Box<RpcError>,
    },
}

impl RpcError {
    /// True when the provider refused the query because the requested history is gone.
    pub fn is_pruned_history(&self) -> bool {
        match self {
            Self::Unavailable { last, .. } => last.is_pruned_history(),
            Self::JsonRpc { message, .. } => message.to_ascii_lowercase().contains("pruned"),
            Self::Transport { reason, .. } => reason.to_ascii_lowercase().contains("pruned"),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{path}` is not a valid state document: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingConfig(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

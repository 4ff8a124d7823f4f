//! Supply Indexer library surface.
//!
//! One call to [`engine::run_once`] scans every configured chain incrementally, resolves
//! the allocated amount, refreshes institutional balances and publishes a supply
//! snapshot next to the resumable state document.

pub mod aggregator;
pub mod allocation;
pub mod burn;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod scanner;
pub mod storage;

pub mod config {
    pub mod chains;
}

pub mod protocols {
    pub mod erc20;
}

pub mod utils {
    pub mod config;
    pub mod constants;
    pub mod error;
    pub mod hex;
    pub mod rpc;
}

// In-memory chain double shared by unit and integration tests.
#[doc(hidden)]
pub mod testing;

pub use engine::{run_once, RunReport};
pub use error::{IndexerError, Result};
pub use utils::config::IndexerConfig;

use crate::config::chains::{ChainDescriptor, ChainKey};
use crate::error::{ConfigError, Result};
use crate::utils::constants::{FT_PUT, FT_TOKEN, MAX_SUPPLY_WEI, MSIG_WALLET, PUT_MANAGER};
use crate::utils::rpc::RPC_CALL_TIMEOUT_MS;
use alloy::primitives::{Address, U256};
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_STATE_PATH: &str = "data/state.json";
pub const DEFAULT_SNAPSHOT_PATH: &str = "public/data/metrics.json";
const MIN_RPC_TIMEOUT_MS: u64 = 250;
const MAX_RPC_TIMEOUT_MS: u64 = 120_000;

/// Contracts and constants describing the tracked token deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenProfile {
    pub token: Address,
    /// Allocation-holding contract (PUT manager).
    pub put_manager: Address,
    /// Holder used by the balance fallback (ftPUT).
    pub ft_put: Address,
    pub msig_wallet: Address,
    pub max_supply_wei: U256,
}

impl Default for TokenProfile {
    fn default() -> Self {
        Self {
            token: FT_TOKEN,
            put_manager: PUT_MANAGER,
            ft_put: FT_PUT,
            msig_wallet: MSIG_WALLET,
            max_supply_wei: U256::from(MAX_SUPPLY_WEI),
        }
    }
}

/// Immutable run configuration, validated once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    pub profile: TokenProfile,
    pub chains: Vec<ChainDescriptor>,
    pub primary: ChainKey,
    pub state_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub rpc_timeout_ms: u64,
}

impl IndexerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut chains = Vec::with_capacity(ChainKey::ALL.len());
        for mut chain in ChainDescriptor::defaults() {
            let prefix = chain.key.env_prefix();
            let urls_var = format!("{prefix}_RPC_URLS");
            if let Some(raw) = var(&urls_var) {
                chain.rpc_urls = parse_url_list(&urls_var, &raw)?;
            }
            let lookback_var = format!("{prefix}_LOOKBACK_BLOCKS");
            if let Some(raw) = var(&lookback_var) {
                chain.lookback_blocks = parse_positive(&lookback_var, &raw)?;
            }
            let chunk_var = format!("{prefix}_SCAN_CHUNK_BLOCKS");
            if let Some(raw) = var(&chunk_var) {
                chain.chunk_blocks = parse_positive(&chunk_var, &raw)?;
            }
            chains.push(chain);
        }

        let rpc_timeout_ms = match var("RPC_CALL_TIMEOUT_MS") {
            Some(raw) => {
                let ms = parse_positive("RPC_CALL_TIMEOUT_MS", &raw)?;
                if !(MIN_RPC_TIMEOUT_MS..=MAX_RPC_TIMEOUT_MS).contains(&ms) {
                    return Err(ConfigError::InvalidConfig(format!(
                        "RPC_CALL_TIMEOUT_MS must be within {MIN_RPC_TIMEOUT_MS}..={MAX_RPC_TIMEOUT_MS}, got {ms}"
                    ))
                    .into());
                }
                ms
            }
            None => RPC_CALL_TIMEOUT_MS,
        };

        let config = Self {
            profile: TokenProfile::default(),
            chains,
            primary: ChainKey::Ethereum,
            state_path: var("SUPPLY_STATE_PATH")
                .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string())
                .into(),
            snapshot_path: var("SUPPLY_SNAPSHOT_PATH")
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string())
                .into(),
            rpc_timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults only, for tests and tooling that build configs by hand.
    pub fn with_chains(chains: Vec<ChainDescriptor>, state_path: PathBuf, snapshot_path: PathBuf) -> Self {
        Self {
            profile: TokenProfile::default(),
            chains,
            primary: ChainKey::Ethereum,
            state_path,
            snapshot_path,
            rpc_timeout_ms: RPC_CALL_TIMEOUT_MS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain(self.primary).is_none() {
            return Err(ConfigError::MissingConfig(format!(
                "primary chain `{}` is not configured",
                self.primary
            ))
            .into());
        }
        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.key) {
                return Err(ConfigError::InvalidConfig(format!(
                    "chain `{}` configured twice",
                    chain.key
                ))
                .into());
            }
            if chain.rpc_urls.is_empty() {
                return Err(ConfigError::MissingConfig(format!(
                    "no RPC endpoints for chain `{}`",
                    chain.key
                ))
                .into());
            }
            if chain.chunk_blocks == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "scan chunk for chain `{}` must be positive",
                    chain.key
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn chain(&self, key: ChainKey) -> Option<&ChainDescriptor> {
        self.chains.iter().find(|c| c.key == key)
    }
}

fn validate_http_url(name: &str, raw: &str) -> Result<()> {
    let parsed = raw.parse::<reqwest::Url>().map_err(|e| {
        ConfigError::InvalidConfig(format!("{name} must be a valid URL, got `{raw}`: {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidConfig(format!(
            "{name} must use http(s) scheme, got `{other}`"
        ))
        .into()),
    }
}

/// Comma-separated endpoint list, order kept, duplicates dropped.
fn parse_url_list(name: &str, raw: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        validate_http_url(name, entry)?;
        if seen.insert(entry.to_string()) {
            urls.push(entry.to_string());
        }
    }
    if urls.is_empty() {
        return Err(ConfigError::InvalidConfig(format!("{name} lists no endpoints")).into());
    }
    Ok(urls)
}

fn parse_positive(name: &str, raw: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::InvalidConfig(format!(
            "{name} must be a positive integer, got `{raw}`"
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexerError;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<IndexerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IndexerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_cover_every_chain_with_ethereum_primary() {
        let config = config_from(&[]).expect("defaults are valid");
        assert_eq!(config.chains.len(), 5);
        assert_eq!(config.primary, ChainKey::Ethereum);
        assert_eq!(config.state_path, PathBuf::from(DEFAULT_STATE_PATH));
        assert_eq!(config.snapshot_path, PathBuf::from(DEFAULT_SNAPSHOT_PATH));
        assert_eq!(config.rpc_timeout_ms, RPC_CALL_TIMEOUT_MS);
        assert_eq!(config.profile, TokenProfile::default());
    }

    #[test]
    fn overrides_replace_endpoints_and_scan_bounds() {
        let config = config_from(&[
            ("BNB_RPC_URLS", " https://a.example , https://b.example,https://a.example "),
            ("BNB_LOOKBACK_BLOCKS", "1000"),
            ("BNB_SCAN_CHUNK_BLOCKS", "50"),
            ("RPC_CALL_TIMEOUT_MS", "2500"),
            ("SUPPLY_STATE_PATH", "/tmp/state.json"),
        ])
        .expect("valid overrides");
        let bnb = config.chain(ChainKey::Bnb).expect("bnb");
        assert_eq!(bnb.rpc_urls, vec!["https://a.example", "https://b.example"]);
        assert_eq!(bnb.lookback_blocks, 1_000);
        assert_eq!(bnb.chunk_blocks, 50);
        assert_eq!(config.rpc_timeout_ms, 2_500);
        assert_eq!(config.state_path, PathBuf::from("/tmp/state.json"));
    }

    #[test]
    fn rejects_bad_values() {
        for vars in [
            vec![("SONIC_RPC_URLS", "wss://ws.example")],
            vec![("SONIC_RPC_URLS", " , ")],
            vec![("BASE_SCAN_CHUNK_BLOCKS", "0")],
            vec![("BASE_LOOKBACK_BLOCKS", "-5")],
            vec![("RPC_CALL_TIMEOUT_MS", "10")],
            vec![("RPC_CALL_TIMEOUT_MS", "999999")],
        ] {
            assert!(
                matches!(config_from(&vars), Err(IndexerError::Config(_))),
                "{vars:?} should be rejected"
            );
        }
    }

    #[test]
    fn validate_requires_primary_and_endpoints() {
        let dir = PathBuf::from("unused");
        let mut chains = vec![ChainDescriptor::sonic()];
        let config = IndexerConfig::with_chains(chains.clone(), dir.clone(), dir.clone());
        assert!(config.validate().is_err());

        let mut eth = ChainDescriptor::ethereum();
        eth.rpc_urls.clear();
        chains.push(eth);
        let config = IndexerConfig::with_chains(chains, dir.clone(), dir);
        assert!(matches!(
            config.validate(),
            Err(IndexerError::Config(ConfigError::MissingConfig(_)))
        ));
    }
}

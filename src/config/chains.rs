use std::fmt;

const ETHEREUM_RPCS: &[&str] = &[
    "https://ethereum-rpc.publicnode.com",
    "https://cloudflare-eth.com",
];

const SONIC_RPCS: &[&str] = &["https://rpc.soniclabs.com"];

const BASE_RPCS: &[&str] = &["https://base-rpc.publicnode.com", "https://mainnet.base.org"];

const BNB_RPCS: &[&str] = &[
    "https://bsc-rpc.publicnode.com",
    "https://bsc-dataseed.binance.org",
];

const AVALANCHE_RPCS: &[&str] = &[
    "https://avalanche-c-chain-rpc.publicnode.com",
    "https://api.avax.network/ext/bc/C/rpc",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChainKey {
    Ethereum,
    Sonic,
    Base,
    Bnb,
    Avalanche,
}

impl ChainKey {
    pub const ALL: [ChainKey; 5] = [
        ChainKey::Ethereum,
        ChainKey::Sonic,
        ChainKey::Base,
        ChainKey::Bnb,
        ChainKey::Avalanche,
    ];

    /// Key used in the state and snapshot documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Sonic => "sonic",
            Self::Base => "base",
            Self::Bnb => "bnb",
            Self::Avalanche => "avalanche",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ethereum" => Some(Self::Ethereum),
            "sonic" => Some(Self::Sonic),
            "base" => Some(Self::Base),
            "bnb" => Some(Self::Bnb),
            "avalanche" => Some(Self::Avalanche),
            _ => None,
        }
    }

    /// Prefix for per-chain environment overrides, e.g. `BNB_RPC_URLS`.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Self::Ethereum => "ETHEREUM",
            Self::Sonic => "SONIC",
            Self::Base => "BASE",
            Self::Bnb => "BNB",
            Self::Avalanche => "AVALANCHE",
        }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub key: ChainKey,
    /// Tried in order by the fallback client.
    pub rpc_urls: Vec<String>,
    /// First-run backfill bound, in blocks.
    pub lookback_blocks: u64,
    /// Maximum number of blocks per `eth_getLogs` query.
    pub chunk_blocks: u64,
}

impl ChainDescriptor {
    pub fn get(key: ChainKey) -> Self {
        match key {
            ChainKey::Ethereum => Self::ethereum(),
            ChainKey::Sonic => Self::sonic(),
            ChainKey::Base => Self::base(),
            ChainKey::Bnb => Self::bnb(),
            ChainKey::Avalanche => Self::avalanche(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        ChainKey::ALL.into_iter().map(Self::get).collect()
    }

    pub fn ethereum() -> Self {
        Self::build(ChainKey::Ethereum, ETHEREUM_RPCS, 220_000, 40_000)
    }

    pub fn sonic() -> Self {
        Self::build(ChainKey::Sonic, SONIC_RPCS, 900_000, 45_000)
    }

    pub fn base() -> Self {
        Self::build(ChainKey::Base, BASE_RPCS, 900_000, 40_000)
    }

    pub fn bnb() -> Self {
        Self::build(ChainKey::Bnb, BNB_RPCS, 80_000, 8_000)
    }

    pub fn avalanche() -> Self {
        Self::build(ChainKey::Avalanche, AVALANCHE_RPCS, 700_000, 40_000)
    }

    fn build(key: ChainKey, rpcs: &[&str], lookback: u64, chunk: u64) -> Self {
        Self {
            key,
            rpc_urls: rpcs.iter().map(|url| (*url).to_string()).collect(),
            lookback_blocks: lookback,
            chunk_blocks: chunk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_round_trips_through_its_document_name() {
        for key in ChainKey::ALL {
            assert_eq!(ChainKey::parse(key.as_str()), Some(key));
            assert_eq!(ChainDescriptor::get(key).key, key);
        }
        assert_eq!(ChainKey::parse("polygon"), None);
    }
}

//! Supply accounting: folds per-chain readings into the published value set.
//!
//! Every subtraction is floor-at-zero. The identity
//! `finalSum == burned + circulating + nonCirculating` holds by construction; how close
//! `finalSum` lands to the max-supply target is left to whoever reads the snapshot.

use crate::config::chains::ChainKey;
use crate::storage::state::decimal_u256;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Published monetary values, in token base units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyValues {
    #[serde(with = "decimal_u256")]
    pub burned: U256,
    #[serde(with = "decimal_u256")]
    pub circulating: U256,
    #[serde(with = "decimal_u256")]
    pub non_circulating: U256,
    #[serde(with = "decimal_u256")]
    pub in_puts: U256,
    #[serde(with = "decimal_u256")]
    pub tradable: U256,
    #[serde(with = "decimal_u256")]
    pub unallocated: U256,
    #[serde(with = "decimal_u256")]
    pub vc_msig: U256,
    #[serde(with = "decimal_u256")]
    pub institutional: U256,
    #[serde(with = "decimal_u256")]
    pub on_ethereum: U256,
    #[serde(with = "decimal_u256")]
    pub on_sonic: U256,
    #[serde(with = "decimal_u256")]
    pub on_bnb: U256,
    #[serde(with = "decimal_u256")]
    pub on_avalanche: U256,
    #[serde(with = "decimal_u256")]
    pub on_base: U256,
    #[serde(with = "decimal_u256")]
    pub final_sum: U256,
}

impl SupplyValues {
    pub fn tradable_on(&self, chain: ChainKey) -> U256 {
        match chain {
            ChainKey::Ethereum => self.on_ethereum,
            ChainKey::Sonic => self.on_sonic,
            ChainKey::Base => self.on_base,
            ChainKey::Bnb => self.on_bnb,
            ChainKey::Avalanche => self.on_avalanche,
        }
    }

    fn tradable_slot(&mut self, chain: ChainKey) -> &mut U256 {
        match chain {
            ChainKey::Ethereum => &mut self.on_ethereum,
            ChainKey::Sonic => &mut self.on_sonic,
            ChainKey::Base => &mut self.on_base,
            ChainKey::Bnb => &mut self.on_bnb,
            ChainKey::Avalanche => &mut self.on_avalanche,
        }
    }
}

/// What one chain pipeline observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReading {
    pub chain: ChainKey,
    pub latest_block: u64,
    pub total_supply: U256,
    pub msig_balance: U256,
    pub burned: U256,
}

/// Primary-chain inputs that only exist once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimaryInputs {
    /// Resolved allocation (`inPuts`).
    pub allocated: U256,
    /// Token balance of the allocation-holding contract.
    pub holding_balance: U256,
    pub institutional: U256,
}

/// Per-chain tradable: supply minus multisig, and on the primary chain also minus
/// everything the PUT-holding contract holds and the institutional total.
///
/// The holding balance covers both `inPuts` and `unallocated`, so neither share of it
/// can reappear as tradable.
pub fn chain_tradable(reading: &ChainReading, primary: ChainKey, inputs: &PrimaryInputs) -> U256 {
    let mut tradable = reading.total_supply.saturating_sub(reading.msig_balance);
    if reading.chain == primary {
        tradable = tradable
            .saturating_sub(inputs.holding_balance)
            .saturating_sub(inputs.institutional);
    }
    tradable
}

pub fn compose(readings: &[ChainReading], primary: ChainKey, inputs: &PrimaryInputs) -> SupplyValues {
    let mut values = SupplyValues {
        in_puts: inputs.allocated,
        institutional: inputs.institutional,
        unallocated: inputs.holding_balance.saturating_sub(inputs.allocated),
        ..SupplyValues::default()
    };

    for reading in readings {
        let tradable = chain_tradable(reading, primary, inputs);
        let slot = values.tradable_slot(reading.chain);
        *slot = slot.saturating_add(tradable);
        values.tradable = values.tradable.saturating_add(tradable);
        values.vc_msig = values.vc_msig.saturating_add(reading.msig_balance);
        values.burned = values.burned.saturating_add(reading.burned);
    }

    values.non_circulating = values
        .unallocated
        .saturating_add(values.vc_msig)
        .saturating_add(values.institutional);
    values.circulating = values.in_puts.saturating_add(values.tradable);
    values.final_sum = values
        .burned
        .saturating_add(values.circulating)
        .saturating_add(values.non_circulating);
    values
}

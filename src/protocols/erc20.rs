//! Minimal ERC-20 reads over the fallback client.

use crate::error::RpcError;
use crate::utils::constants::{BALANCE_OF_SELECTOR, DECIMALS_SELECTOR, TOTAL_SUPPLY_SELECTOR};
use crate::utils::hex::{address_topic, decode_word, encode_call};
use crate::utils::rpc::RpcClient;
use alloy::primitives::{Address, U256};

pub async fn total_supply(client: &RpcClient, token: Address) -> Result<U256, RpcError> {
    call_uint(client, token, encode_call(TOTAL_SUPPLY_SELECTOR, &[]), "totalSupply()").await
}

pub async fn balance_of(client: &RpcClient, token: Address, owner: Address) -> Result<U256, RpcError> {
    call_uint(
        client,
        token,
        encode_call(BALANCE_OF_SELECTOR, &[address_topic(owner)]),
        "balanceOf(address)",
    )
    .await
}

pub async fn decimals(client: &RpcClient, token: Address) -> Result<u8, RpcError> {
    let raw = call_uint(client, token, encode_call(DECIMALS_SELECTOR, &[]), "decimals()").await?;
    u8::try_from(raw).map_err(|_| RpcError::Decode {
        method: "decimals()".to_string(),
        reason: format!("value {raw} does not fit in u8"),
    })
}

/// `eth_call` returning a single uint word. Empty return data is a decode error.
pub async fn call_uint(
    client: &RpcClient,
    to: Address,
    data: String,
    label: &str,
) -> Result<U256, RpcError> {
    let ret = client.eth_call(to, data).await?;
    if ret.is_empty() {
        return Err(RpcError::Decode {
            method: label.to_string(),
            reason: format!("empty return data from {to:#x}"),
        });
    }
    Ok(decode_word(&ret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::chains::ChainKey;
    use crate::testing::MockChain;
    use alloy::primitives::address;

    const TOKEN: Address = address!("5dd1a7a369e8273371d2dbf9d83356057088082c");
    const HOLDER: Address = address!("00000000000000000000000000000000000000aa");

    #[tokio::test]
    async fn reads_supply_balance_and_decimals() {
        let chain = MockChain::new(10);
        chain.set_total_supply(TOKEN, U256::from(1_000u64));
        chain.set_balance(TOKEN, HOLDER, U256::from(25u64));
        chain.set_decimals(TOKEN, 18);
        let client = chain.client(ChainKey::Ethereum, &["https://node"]);

        assert_eq!(total_supply(&client, TOKEN).await.ok(), Some(U256::from(1_000u64)));
        assert_eq!(balance_of(&client, TOKEN, HOLDER).await.ok(), Some(U256::from(25u64)));
        assert_eq!(decimals(&client, TOKEN).await.ok(), Some(18));
    }

    #[tokio::test]
    async fn unknown_holder_reads_zero_and_missing_method_errors() {
        let chain = MockChain::new(10);
        let client = chain.client(ChainKey::Ethereum, &["https://node"]);
        assert_eq!(balance_of(&client, TOKEN, HOLDER).await.ok(), Some(U256::ZERO));
        assert!(total_supply(&client, TOKEN).await.is_err());
    }
}

use alloy::primitives::{address, Address};

/// Token tracked on every chain (same address on all five deployments).
pub const FT_TOKEN: Address = address!("5dd1a7a369e8273371d2dbf9d83356057088082c");

/// PUT manager: holds undistributed allocation and emits the ledger events.
pub const PUT_MANAGER: Address = address!("ba49d0ac42f4fba4e24a8677a22218a4df75ebaa");

/// ftPUT holder used as the last allocation fallback.
pub const FT_PUT: Address = address!("a4215daaf3745e14e96e169e0e7706c479ce04f2");

/// Multisig whose balances are non-circulating and whose outflows seed the institutional registry.
pub const MSIG_WALLET: Address = address!("22246a9183ce2ce6e2c2a9973f94aea91435017c");

/// 10^18
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Published invariant target: 10 billion tokens in base units.
pub const MAX_SUPPLY_WEI: u128 = 10_000_000_000 * WAD;

pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";
pub const INVESTED_EVENT: &str = "Invested(uint256)";
pub const DIVESTED_EVENT: &str = "Divested(uint256)";
pub const WITHDRAW_EVENT: &str = "Withdraw(uint256)";

pub const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67]; // decimals()
pub const TOTAL_SUPPLY_SELECTOR: [u8; 4] = [0x18, 0x16, 0x0d, 0xdd]; // totalSupply()
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31]; // balanceOf(address)
pub const FT_ALLOCATED_SELECTOR: [u8; 4] = [0x70, 0xd8, 0xda, 0x31]; // ftAllocated()
pub const FT_ALLOCATED_SIGNATURE: &str = "ftAllocated()";

pub const BURNED_SOURCE: &str = "event-indexed";

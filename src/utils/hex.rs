use alloy::primitives::{keccak256, Address, B256, U256};

/// Clean a hex string by removing "0x" prefix and whitespace
pub fn clean_hex(s: &str) -> &str {
    let s = s.trim();
    if let Some(stripped) = s.strip_prefix("0x") {
        stripped
    } else {
        s
    }
}

/// Convert a string (0x-hex or decimal) to U256
pub fn to_u256(s: &str) -> Option<U256> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(hex) = s.strip_prefix("0x") {
        if hex.is_empty() {
            return None;
        }
        return U256::from_str_radix(hex, 16).ok();
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        return U256::from_str_radix(s, 10).ok();
    }

    None
}

/// JSON-RPC quantity (`0x1b4`) to u64.
pub fn parse_quantity(s: &str) -> Option<u64> {
    let hex = clean_hex(s);
    if hex.is_empty() {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}

pub fn block_tag(block_number: u64) -> String {
    format!("0x{block_number:x}")
}

/// Leading 32-byte word of ABI-encoded data as U256. Shorter payloads are read as a
/// big-endian quantity.
pub fn decode_word(data: &[u8]) -> U256 {
    let mut word = [0u8; 32];
    if data.len() >= 32 {
        word.copy_from_slice(&data[..32]);
    } else {
        word[32 - data.len()..].copy_from_slice(data);
    }
    U256::from_be_bytes(word)
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Left-padded 32-byte topic form of an address.
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

pub fn address_from_topic(topic: B256) -> Address {
    Address::from_word(topic)
}

/// `0x`-prefixed calldata: selector followed by 32-byte words.
pub fn encode_call(selector: [u8; 4], words: &[B256]) -> String {
    let mut raw = Vec::with_capacity(4 + words.len() * 32);
    raw.extend_from_slice(&selector);
    for word in words {
        raw.extend_from_slice(word.as_slice());
    }
    format!("0x{}", hex::encode(raw))
}

pub fn format_address(address: Address) -> String {
    format!("{address:#x}")
}

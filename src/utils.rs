//! Hex conversion helpers for host environments built from text fixtures.

use anyhow::{anyhow, Result};
use revm::primitives::{Address, U256};

/// Convert a hex string to Address
pub fn hex_to_address(hex_str: &str) -> Result<Address> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    if hex_str.len() != 40 {
        return Err(anyhow!("Invalid address length"));
    }

    let bytes = hex::decode(hex_str)?;
    let mut addr_bytes = [0u8; 20];
    addr_bytes.copy_from_slice(&bytes);
    Ok(Address::from(addr_bytes))
}

/// Convert a hex string to U256. An empty string (`"0x"`) is zero.
pub fn hex_to_u256(hex_str: &str) -> Result<U256> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    if hex_str.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(hex_str, 16).map_err(|e| anyhow!("Invalid U256: {}", e))
}

/// Convert a hex string to raw bytes.
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| anyhow!("Invalid hex data: {}", e))
}

/// Convert U256 to hex string
pub fn u256_to_hex(value: U256) -> String {
    format!("0x{:x}", value)
}

/// Convert Address to hex string
pub fn address_to_hex(addr: Address) -> String {
    format!("0x{:x}", addr)
}

/// Convert bytes to hex string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

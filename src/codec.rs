//! Conversions between host values (`U256`, `Address`, `B256`) and the wire
//! structs in [`crate::ffi`].
//!
//! The ABI carries 256-bit values as 32 big-endian bytes. The host-endian
//! four-word form is kept for engines that still speak the older convention;
//! both round-trip losslessly over the whole `[0, 2^256)` range.

use revm::primitives::{Address, B256, U256};

use crate::ffi::{EvmUint160be, EvmUint256, EvmUint256be};

/// Encode a 256-bit value as 32 big-endian bytes.
pub fn u256_to_be(value: U256) -> EvmUint256be {
    EvmUint256be {
        bytes: value.to_be_bytes(),
    }
}

/// Decode 32 big-endian bytes into a 256-bit value.
pub fn u256_from_be(wire: EvmUint256be) -> U256 {
    U256::from_be_bytes(wire.bytes)
}

/// Encode a 256-bit value as four host-endian words, least significant first.
pub fn u256_to_words(value: U256) -> EvmUint256 {
    EvmUint256 {
        words: *value.as_limbs(),
    }
}

/// Decode four host-endian words, least significant first.
pub fn u256_from_words(wire: EvmUint256) -> U256 {
    U256::from_limbs(wire.words)
}

pub fn address_to_ffi(addr: Address) -> EvmUint160be {
    let mut out = EvmUint160be { bytes: [0u8; 20] };
    out.bytes.copy_from_slice(addr.as_slice());
    out
}

pub fn address_from_ffi(wire: EvmUint160be) -> Address {
    Address::from(wire.bytes)
}

/// Code identities and topics are opaque 32-byte hashes, no numeric meaning.
pub fn hash_to_ffi(hash: B256) -> EvmUint256be {
    EvmUint256be { bytes: hash.0 }
}

pub fn hash_from_ffi(wire: EvmUint256be) -> B256 {
    B256::from(wire.bytes)
}

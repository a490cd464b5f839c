//! `#[repr(C)]` mirror of the native engine ABI (`evm.h`).
//!
//! These types are the only wire format shared between the native engine and
//! Rust. They MUST remain stable – **do not** change their memory layout without
//! bumping [`EVM_ABI_VERSION`] together with the native side.
//!
//! Enumerations travel as plain `c_int` values. Turning them into Rust enums
//! happens in the dispatcher, where an unknown discriminant is a recoverable
//! fault rather than undefined behaviour.

use std::os::raw::{c_char, c_int};

/// ABI version this bridge is built against. The native interface must report
/// exactly this value.
pub const EVM_ABI_VERSION: c_int = 0;

/// Bit 63 of the gas returned by the call callback. Set when the nested call
/// failed; the lower 63 bits still carry the gas count.
pub const FAILURE_FLAG: u64 = 1 << 63;

/// Host-endian 256-bit integer. `words[0]` holds the 64 lowest bits.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EvmUint256 {
    pub words: [u64; 4],
}

/// Big-endian 256-bit integer or hash. This is the convention used across the
/// ABI for values, storage keys and code hashes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EvmUint256be {
    pub bytes: [u8; 32],
}

/// 160-bit account address (20 raw bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EvmUint160be {
    pub bytes: [u8; 20],
}

/// Address member of [`EvmVariant`], right-aligned inside the 32-byte slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvmVariantAddress {
    pub address_padding: [u8; 12],
    pub address: EvmUint160be,
}

/// Memory reference member of [`EvmVariant`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvmVariantData {
    pub data: *const u8,
    pub data_size: usize,
}

/// Tagged-by-context union passed through the query and update callbacks.
///
/// Which member is live depends on the accompanying query or update key.
#[repr(C)]
#[derive(Clone, Copy)]
pub union EvmVariant {
    pub int64: i64,
    pub uint256be: EvmUint256be,
    pub address: EvmVariantAddress,
    pub data: EvmVariantData,
}

impl EvmVariant {
    /// An all-zero variant: zero word, zero address, zero scalar and a null,
    /// empty buffer at the same time.
    pub const fn zeroed() -> Self {
        EvmVariant {
            uint256be: EvmUint256be { bytes: [0u8; 32] },
        }
    }
}

impl Default for EvmVariant {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Raw execution result returned by the engine.
///
/// `output_data` and `internal_memory` are owned by the engine and freed by
/// [`EvmInterface::release_result`].
#[repr(C)]
#[derive(Debug)]
pub struct EvmResult {
    pub code: c_int,
    pub gas_left: i64,
    pub output_data: *const u8,
    pub output_size: usize,
    pub internal_memory: *mut std::ffi::c_void,
}

/// Opaque environment handle as seen by the engine.
#[repr(C)]
pub struct EvmEnv {
    _private: [u8; 0],
}

/// Opaque engine instance.
#[repr(C)]
pub struct EvmInstance {
    _private: [u8; 0],
}

// Query keys.
pub const EVM_SLOAD: c_int = 0;
pub const EVM_ADDRESS: c_int = 1;
pub const EVM_CALLER: c_int = 2;
pub const EVM_ORIGIN: c_int = 3;
pub const EVM_GAS_PRICE: c_int = 4;
pub const EVM_COINBASE: c_int = 5;
pub const EVM_DIFFICULTY: c_int = 6;
pub const EVM_GAS_LIMIT: c_int = 7;
pub const EVM_NUMBER: c_int = 8;
pub const EVM_TIMESTAMP: c_int = 9;
pub const EVM_CODE_BY_ADDRESS: c_int = 10;
pub const EVM_BALANCE: c_int = 11;
pub const EVM_BLOCKHASH: c_int = 12;

// Update keys.
pub const EVM_SSTORE: c_int = 0;
pub const EVM_LOG: c_int = 1;
pub const EVM_SELFDESTRUCT: c_int = 2;

// Call kinds.
pub const EVM_CALL: c_int = 0;
pub const EVM_DELEGATECALL: c_int = 1;
pub const EVM_CALLCODE: c_int = 2;
pub const EVM_CREATE: c_int = 3;

// Modes.
pub const EVM_FRONTIER: c_int = 0;
pub const EVM_HOMESTEAD: c_int = 1;

// Code status.
pub const EVM_UNKNOWN: c_int = 0;
pub const EVM_READY: c_int = 1;
pub const EVM_CACHED: c_int = 2;

// Result codes.
pub const EVM_SUCCESS: c_int = 0;
pub const EVM_FAILURE: c_int = 1;
pub const EVM_OUT_OF_GAS: c_int = 2;
pub const EVM_BAD_INSTRUCTION: c_int = 3;
pub const EVM_BAD_JUMP_DESTINATION: c_int = 4;
pub const EVM_STACK_OVERFLOW: c_int = 5;
pub const EVM_STACK_UNDERFLOW: c_int = 6;

pub type EvmQueryFn =
    unsafe extern "C" fn(env: *mut EvmEnv, key: c_int, arg: EvmVariant) -> EvmVariant;

pub type EvmUpdateFn =
    unsafe extern "C" fn(env: *mut EvmEnv, key: c_int, arg1: EvmVariant, arg2: EvmVariant);

/// Returns gas as described on [`FAILURE_FLAG`].
pub type EvmCallFn = unsafe extern "C" fn(
    env: *mut EvmEnv,
    kind: c_int,
    gas: i64,
    address: EvmUint160be,
    value: EvmUint256be,
    input: *const u8,
    input_size: usize,
    output: *mut u8,
    output_size: usize,
) -> i64;

pub type EvmCreateFn = unsafe extern "C" fn(
    query_fn: EvmQueryFn,
    update_fn: EvmUpdateFn,
    call_fn: EvmCallFn,
) -> *mut EvmInstance;

pub type EvmDestroyFn = unsafe extern "C" fn(instance: *mut EvmInstance);

pub type EvmExecuteFn = unsafe extern "C" fn(
    instance: *mut EvmInstance,
    env: *mut EvmEnv,
    mode: c_int,
    code_hash: EvmUint256be,
    code: *const u8,
    code_size: usize,
    gas: i64,
    input: *const u8,
    input_size: usize,
    value: EvmUint256be,
) -> EvmResult;

pub type EvmReleaseResultFn = unsafe extern "C" fn(result: *const EvmResult);

pub type EvmSetOptionFn = unsafe extern "C" fn(
    instance: *mut EvmInstance,
    name: *const c_char,
    value: *const c_char,
) -> bool;

pub type EvmGetCodeStatusFn =
    unsafe extern "C" fn(instance: *mut EvmInstance, mode: c_int, code_hash: EvmUint256be) -> c_int;

pub type EvmPrepareCodeFn = unsafe extern "C" fn(
    instance: *mut EvmInstance,
    mode: c_int,
    code_hash: EvmUint256be,
    code: *const u8,
    code_size: usize,
);

/// Function table exported by a native engine.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EvmInterface {
    pub abi_version: c_int,
    pub create: EvmCreateFn,
    pub destroy: EvmDestroyFn,
    pub execute: EvmExecuteFn,
    pub release_result: EvmReleaseResultFn,
    pub set_option: EvmSetOptionFn,
    pub get_code_status: EvmGetCodeStatusFn,
    pub prepare_code: EvmPrepareCodeFn,
}

/// Accessor through which an engine hands out its [`EvmInterface`].
pub type EvmGetInterfaceFn = unsafe extern "C" fn() -> EvmInterface;

// ---------------------------------------------------------------------------
//  Layout assertions – these prevent silent ABI breakage.
// ---------------------------------------------------------------------------

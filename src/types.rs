//! Typed views of the engine-level enumerations and identifiers.

use std::fmt;
use std::os::raw::c_int;

use revm::primitives::B256;

use crate::error::BridgeError;
use crate::ffi;

/// EVM compatibility mode aka chain mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    Frontier,
    #[default]
    Homestead,
}

impl Mode {
    pub fn as_raw(self) -> c_int {
        match self {
            Mode::Frontier => ffi::EVM_FRONTIER,
            Mode::Homestead => ffi::EVM_HOMESTEAD,
        }
    }
}

/// Compilation status of a code identity inside the engine cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeStatus {
    Unknown,
    Ready,
    Cached,
}

impl CodeStatus {
    /// Unrecognised values are treated as `Unknown`.
    pub fn from_raw(raw: c_int) -> Self {
        match raw {
            ffi::EVM_READY => CodeStatus::Ready,
            ffi::EVM_CACHED => CodeStatus::Cached,
            _ => CodeStatus::Unknown,
        }
    }
}

/// Status code of a finished execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failure,
    OutOfGas,
    BadInstruction,
    BadJumpDestination,
    StackOverflow,
    StackUnderflow,
    /// A code this bridge does not know about, passed through untouched.
    Other(c_int),
}

impl ExecutionStatus {
    pub fn from_raw(code: c_int) -> Self {
        match code {
            ffi::EVM_SUCCESS => ExecutionStatus::Success,
            ffi::EVM_FAILURE => ExecutionStatus::Failure,
            ffi::EVM_OUT_OF_GAS => ExecutionStatus::OutOfGas,
            ffi::EVM_BAD_INSTRUCTION => ExecutionStatus::BadInstruction,
            ffi::EVM_BAD_JUMP_DESTINATION => ExecutionStatus::BadJumpDestination,
            ffi::EVM_STACK_OVERFLOW => ExecutionStatus::StackOverflow,
            ffi::EVM_STACK_UNDERFLOW => ExecutionStatus::StackUnderflow,
            other => ExecutionStatus::Other(other),
        }
    }

    pub fn is_success(self) -> bool {
        self == ExecutionStatus::Success
    }
}

/// 32-byte content hash identifying a piece of code in the engine's compile
/// cache. The bridge never computes it; callers supply it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeIdentity(B256);

impl CodeIdentity {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; Self::LEN]) -> Self {
        CodeIdentity(B256::from(bytes))
    }

    /// Fails for anything but exactly 32 bytes; a malformed identity is never
    /// padded or truncated.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, BridgeError> {
        let bytes: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| BridgeError::InvalidCodeIdentity(bytes.len()))?;
        Ok(Self::new(bytes))
    }

    pub fn as_b256(&self) -> B256 {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0 .0
    }
}

impl From<B256> for CodeIdentity {
    fn from(hash: B256) -> Self {
        CodeIdentity(hash)
    }
}

impl TryFrom<&[u8]> for CodeIdentity {
    type Error = BridgeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(bytes)
    }
}

impl fmt::Debug for CodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeIdentity(0x{})", hex::encode(self.as_bytes()))
    }
}

impl fmt::Display for CodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.as_bytes()))
    }
}

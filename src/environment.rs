//! Host environment capability interface.
//!
//! The engine delegates every piece of state access to an [`Environment`].
//! Each callback is translated by the dispatcher into one of the typed
//! requests below; implementations never see raw wire values.

use std::os::raw::c_int;

use revm::primitives::{Address, B256, U256};

use crate::ffi;

/// Error an environment may return from any capability.
///
/// The dispatcher turns it into a defined failure for that single callback
/// (zeroed query answer, ignored update, failed call).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvironmentError {
    /// The environment does not serve this query.
    #[error("query {0:?} is not supported by this environment")]
    Unsupported(QueryKind),

    /// Any other host-side failure.
    #[error("environment failure: {0}")]
    Internal(String),
}

/// The query callback key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    StorageValue,
    OwnAddress,
    Caller,
    Origin,
    GasPrice,
    Coinbase,
    Difficulty,
    GasLimit,
    BlockNumber,
    Timestamp,
    CodeByAddress,
    Balance,
    BlockHash,
}

/// Wire shape of a query answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseShape {
    /// Big-endian 256-bit value.
    Word,
    /// 20-byte address in the low-order bytes of the variant.
    Address,
    /// Host-endian `i64`.
    Scalar,
    /// Pointer and length of a byte buffer.
    Bytes,
}

impl QueryKind {
    pub fn from_raw(key: c_int) -> Option<Self> {
        let kind = match key {
            ffi::EVM_SLOAD => QueryKind::StorageValue,
            ffi::EVM_ADDRESS => QueryKind::OwnAddress,
            ffi::EVM_CALLER => QueryKind::Caller,
            ffi::EVM_ORIGIN => QueryKind::Origin,
            ffi::EVM_GAS_PRICE => QueryKind::GasPrice,
            ffi::EVM_COINBASE => QueryKind::Coinbase,
            ffi::EVM_DIFFICULTY => QueryKind::Difficulty,
            ffi::EVM_GAS_LIMIT => QueryKind::GasLimit,
            ffi::EVM_NUMBER => QueryKind::BlockNumber,
            ffi::EVM_TIMESTAMP => QueryKind::Timestamp,
            ffi::EVM_CODE_BY_ADDRESS => QueryKind::CodeByAddress,
            ffi::EVM_BALANCE => QueryKind::Balance,
            ffi::EVM_BLOCKHASH => QueryKind::BlockHash,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_raw(self) -> c_int {
        match self {
            QueryKind::StorageValue => ffi::EVM_SLOAD,
            QueryKind::OwnAddress => ffi::EVM_ADDRESS,
            QueryKind::Caller => ffi::EVM_CALLER,
            QueryKind::Origin => ffi::EVM_ORIGIN,
            QueryKind::GasPrice => ffi::EVM_GAS_PRICE,
            QueryKind::Coinbase => ffi::EVM_COINBASE,
            QueryKind::Difficulty => ffi::EVM_DIFFICULTY,
            QueryKind::GasLimit => ffi::EVM_GAS_LIMIT,
            QueryKind::BlockNumber => ffi::EVM_NUMBER,
            QueryKind::Timestamp => ffi::EVM_TIMESTAMP,
            QueryKind::CodeByAddress => ffi::EVM_CODE_BY_ADDRESS,
            QueryKind::Balance => ffi::EVM_BALANCE,
            QueryKind::BlockHash => ffi::EVM_BLOCKHASH,
        }
    }

    /// The one shape every answer to this key must have.
    pub fn shape(self) -> ResponseShape {
        match self {
            QueryKind::StorageValue
            | QueryKind::GasPrice
            | QueryKind::Difficulty
            | QueryKind::Balance
            | QueryKind::BlockHash => ResponseShape::Word,
            QueryKind::OwnAddress | QueryKind::Caller | QueryKind::Origin | QueryKind::Coinbase => {
                ResponseShape::Address
            }
            QueryKind::GasLimit | QueryKind::BlockNumber | QueryKind::Timestamp => {
                ResponseShape::Scalar
            }
            QueryKind::CodeByAddress => ResponseShape::Bytes,
        }
    }
}

/// A decoded query with its argument, if the key carries one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Query {
    StorageValue(U256),
    OwnAddress,
    Caller,
    Origin,
    GasPrice,
    Coinbase,
    Difficulty,
    GasLimit,
    BlockNumber,
    Timestamp,
    CodeByAddress(Address),
    Balance(Address),
    BlockHash(i64),
}

impl Query {
    pub fn kind(&self) -> QueryKind {
        match self {
            Query::StorageValue(_) => QueryKind::StorageValue,
            Query::OwnAddress => QueryKind::OwnAddress,
            Query::Caller => QueryKind::Caller,
            Query::Origin => QueryKind::Origin,
            Query::GasPrice => QueryKind::GasPrice,
            Query::Coinbase => QueryKind::Coinbase,
            Query::Difficulty => QueryKind::Difficulty,
            Query::GasLimit => QueryKind::GasLimit,
            Query::BlockNumber => QueryKind::BlockNumber,
            Query::Timestamp => QueryKind::Timestamp,
            Query::CodeByAddress(_) => QueryKind::CodeByAddress,
            Query::Balance(_) => QueryKind::Balance,
            Query::BlockHash(_) => QueryKind::BlockHash,
        }
    }
}

/// Answer to a [`Query`]. Its shape must match [`QueryKind::shape`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryResponse {
    Word(U256),
    Address(Address),
    Scalar(i64),
    Bytes(Vec<u8>),
}

impl QueryResponse {
    pub fn shape(&self) -> ResponseShape {
        match self {
            QueryResponse::Word(_) => ResponseShape::Word,
            QueryResponse::Address(_) => ResponseShape::Address,
            QueryResponse::Scalar(_) => ResponseShape::Scalar,
            QueryResponse::Bytes(_) => ResponseShape::Bytes,
        }
    }
}

/// The update callback key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    StorageStore,
    Log,
    SelfDestruct,
}

impl UpdateKind {
    pub fn from_raw(key: c_int) -> Option<Self> {
        match key {
            ffi::EVM_SSTORE => Some(UpdateKind::StorageStore),
            ffi::EVM_LOG => Some(UpdateKind::Log),
            ffi::EVM_SELFDESTRUCT => Some(UpdateKind::SelfDestruct),
            _ => None,
        }
    }
}

/// A decoded state update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update<'a> {
    StorageStore { key: U256, value: U256 },
    Log { data: &'a [u8], topics: Vec<B256> },
    SelfDestruct { beneficiary: Address },
}

impl Update<'_> {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Update::StorageStore { .. } => UpdateKind::StorageStore,
            Update::Log { .. } => UpdateKind::Log,
            Update::SelfDestruct { .. } => UpdateKind::SelfDestruct,
        }
    }
}

/// The kind of call-like instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    Call,
    DelegateCall,
    CallCode,
    /// Contract creation; `address` is ignored and `value` is the endowment.
    Create,
}

impl CallKind {
    pub fn from_raw(kind: c_int) -> Option<Self> {
        match kind {
            ffi::EVM_CALL => Some(CallKind::Call),
            ffi::EVM_DELEGATECALL => Some(CallKind::DelegateCall),
            ffi::EVM_CALLCODE => Some(CallKind::CallCode),
            ffi::EVM_CREATE => Some(CallKind::Create),
            _ => None,
        }
    }

    pub fn as_raw(self) -> c_int {
        match self {
            CallKind::Call => ffi::EVM_CALL,
            CallKind::DelegateCall => ffi::EVM_DELEGATECALL,
            CallKind::CallCode => ffi::EVM_CALLCODE,
            CallKind::Create => ffi::EVM_CREATE,
        }
    }
}

/// A nested call or creation requested by the engine.
///
/// For [`CallKind::DelegateCall`] `value` is always zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest<'a> {
    pub kind: CallKind,
    pub gas: i64,
    pub address: Address,
    pub value: U256,
    pub input: &'a [u8],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Failure,
}

/// What the environment reports back for a nested call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    pub status: CallStatus,
    pub output: Vec<u8>,
    /// Gas used by the call. Must be non-negative.
    pub gas: i64,
}

impl CallOutcome {
    pub fn success(output: Vec<u8>, gas: i64) -> Self {
        CallOutcome {
            status: CallStatus::Success,
            output,
            gas,
        }
    }

    pub fn failure(gas: i64) -> Self {
        CallOutcome {
            status: CallStatus::Failure,
            output: Vec::new(),
            gas,
        }
    }
}

/// Host-side implementation of the engine's state access.
///
/// All methods run synchronously on the thread that called
/// [`EngineHandle::execute`](crate::EngineHandle::execute). `call` may itself
/// execute code on an engine handle; the nested execution gets its own
/// environment registration.
pub trait Environment {
    /// Read-only state and context lookup.
    fn query(&mut self, query: Query) -> Result<QueryResponse, EnvironmentError>;

    /// Storage writes, logs and self-destructs.
    fn update(&mut self, update: Update<'_>) -> Result<(), EnvironmentError>;

    /// Nested call or contract creation.
    fn call(&mut self, request: CallRequest<'_>) -> Result<CallOutcome, EnvironmentError>;
}

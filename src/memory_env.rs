//! In-memory [`Environment`] for hosts that keep their whole world state in
//! maps, such as fixture-driven VM tests.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use anyhow::Result;
use revm::primitives::{Address, B256, U256};
use tracing::trace;

use crate::environment::{
    CallKind, CallOutcome, CallRequest, Environment, EnvironmentError, Query, QueryResponse,
    Update,
};
use crate::utils::{hex_to_address, hex_to_bytes, hex_to_u256};

/// Extra gas charged by the default call handler for a value transfer.
pub const CALL_VALUE_TRANSFER_COST: i64 = 9000 - 2300;
/// Extra gas charged by the default call handler when the target account does
/// not exist.
pub const CALL_NEW_ACCOUNT_COST: i64 = 25000;

/// Block-level context answered to the block queries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockContext {
    pub coinbase: Address,
    pub number: i64,
    pub timestamp: i64,
    pub gas_limit: i64,
    pub difficulty: U256,
    pub gas_price: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: U256,
    pub code: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedLog {
    pub data: Vec<u8>,
    pub topics: Vec<B256>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub gas: i64,
    pub address: Address,
    pub value: U256,
    pub input: Vec<u8>,
}

/// Handler for nested calls. Receives the environment so it can consult
/// accounts or start a nested execution.
pub type CallHandler =
    Box<dyn FnMut(&MemoryEnvironment, &CallRequest<'_>) -> Result<CallOutcome, EnvironmentError> + Send>;

/// Reference environment backed by hash maps.
///
/// Storage belongs to the executing account (`address`). Every update is
/// applied and also recorded in order, so callers can assert on the exact
/// sequence of writes. Nested calls go to the configured [`CallHandler`], or
/// to [`MemoryEnvironment::default_call`] when none is set.
#[derive(Default)]
pub struct MemoryEnvironment {
    pub address: Address,
    pub caller: Address,
    pub origin: Address,
    pub block: BlockContext,
    pub storage: HashMap<U256, U256>,
    pub accounts: HashMap<Address, Account>,
    pub block_hashes: HashMap<i64, B256>,

    pub storage_writes: Vec<(U256, U256)>,
    pub logs: Vec<RecordedLog>,
    pub self_destructs: Vec<Address>,
    pub calls: Vec<RecordedCall>,

    call_handler: Option<CallHandler>,
}

impl MemoryEnvironment {
    pub fn new(address: Address) -> Self {
        MemoryEnvironment {
            address,
            ..Default::default()
        }
    }

    /// Build from the hex strings used in VM test fixtures.
    pub fn from_hex(address: &str, caller: &str, origin: &str) -> Result<Self> {
        Ok(MemoryEnvironment {
            address: hex_to_address(address)?,
            caller: hex_to_address(caller)?,
            origin: hex_to_address(origin)?,
            ..Default::default()
        })
    }

    pub fn with_block(mut self, block: BlockContext) -> Self {
        self.block = block;
        self
    }

    pub fn with_call_handler(
        mut self,
        handler: impl FnMut(&MemoryEnvironment, &CallRequest<'_>) -> Result<CallOutcome, EnvironmentError>
            + Send
            + 'static,
    ) -> Self {
        self.call_handler = Some(Box::new(handler));
        self
    }

    pub fn set_storage(&mut self, key: U256, value: U256) {
        self.storage.insert(key, value);
    }

    pub fn set_storage_hex(&mut self, key: &str, value: &str) -> Result<()> {
        self.storage.insert(hex_to_u256(key)?, hex_to_u256(value)?);
        Ok(())
    }

    pub fn storage_value(&self, key: U256) -> U256 {
        self.storage.get(&key).copied().unwrap_or_default()
    }

    pub fn insert_account(&mut self, address: Address, balance: U256, code: Vec<u8>) {
        self.accounts.insert(address, Account { balance, code });
    }

    pub fn insert_account_hex(&mut self, address: &str, balance: &str, code: &str) -> Result<()> {
        self.insert_account(
            hex_to_address(address)?,
            hex_to_u256(balance)?,
            hex_to_bytes(code)?,
        );
        Ok(())
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.accounts
            .get(&address)
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    /// Call handling used when no handler is configured.
    ///
    /// A transfer the executing account cannot cover fails with no gas.
    /// Creation succeeds with empty output and costs nothing. Any other call
    /// succeeds with empty output and costs [`CALL_VALUE_TRANSFER_COST`] when it
    /// carries value plus [`CALL_NEW_ACCOUNT_COST`] when the target is unknown.
    pub fn default_call(&self, request: &CallRequest<'_>) -> CallOutcome {
        if request.kind != CallKind::DelegateCall && self.balance(self.address) < request.value {
            return CallOutcome::failure(0);
        }
        if request.kind == CallKind::Create {
            return CallOutcome::success(Vec::new(), 0);
        }

        let mut cost = 0;
        if !request.value.is_zero() {
            cost += CALL_VALUE_TRANSFER_COST;
        }
        if !self.accounts.contains_key(&request.address) {
            cost += CALL_NEW_ACCOUNT_COST;
        }
        CallOutcome::success(Vec::new(), cost)
    }
}

impl Environment for MemoryEnvironment {
    fn query(&mut self, query: Query) -> Result<QueryResponse, EnvironmentError> {
        trace!(?query, "memory environment query");
        Ok(match query {
            Query::StorageValue(key) => QueryResponse::Word(self.storage_value(key)),
            Query::OwnAddress => QueryResponse::Address(self.address),
            Query::Caller => QueryResponse::Address(self.caller),
            Query::Origin => QueryResponse::Address(self.origin),
            Query::GasPrice => QueryResponse::Word(self.block.gas_price),
            Query::Coinbase => QueryResponse::Address(self.block.coinbase),
            Query::Difficulty => QueryResponse::Word(self.block.difficulty),
            Query::GasLimit => QueryResponse::Scalar(self.block.gas_limit),
            Query::BlockNumber => QueryResponse::Scalar(self.block.number),
            Query::Timestamp => QueryResponse::Scalar(self.block.timestamp),
            Query::CodeByAddress(addr) => QueryResponse::Bytes(
                self.accounts
                    .get(&addr)
                    .map(|a| a.code.clone())
                    .unwrap_or_default(),
            ),
            Query::Balance(addr) => QueryResponse::Word(self.balance(addr)),
            Query::BlockHash(number) => {
                let hash = self.block_hashes.get(&number).copied().unwrap_or_default();
                QueryResponse::Word(U256::from_be_bytes(hash.0))
            }
        })
    }

    fn update(&mut self, update: Update<'_>) -> Result<(), EnvironmentError> {
        trace!(?update, "memory environment update");
        match update {
            Update::StorageStore { key, value } => {
                self.storage.insert(key, value);
                self.storage_writes.push((key, value));
            }
            Update::Log { data, topics } => self.logs.push(RecordedLog {
                data: data.to_vec(),
                topics,
            }),
            Update::SelfDestruct { beneficiary } => self.self_destructs.push(beneficiary),
        }
        Ok(())
    }

    fn call(&mut self, request: CallRequest<'_>) -> Result<CallOutcome, EnvironmentError> {
        self.calls.push(RecordedCall {
            kind: request.kind,
            gas: request.gas,
            address: request.address,
            value: request.value,
            input: request.input.to_vec(),
        });
        match self.call_handler.take() {
            Some(mut handler) => {
                // Put the handler back before a panic leaves this frame.
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(self, &request)));
                self.call_handler = Some(handler);
                outcome.unwrap_or_else(|payload| panic::resume_unwind(payload))
            }
            None => Ok(self.default_call(&request)),
        }
    }
}

impl fmt::Debug for MemoryEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEnvironment")
            .field("address", &self.address)
            .field("caller", &self.caller)
            .field("origin", &self.origin)
            .field("block", &self.block)
            .field("storage", &self.storage.len())
            .field("accounts", &self.accounts.len())
            .field("logs", &self.logs.len())
            .field("call_handler", &self.call_handler.is_some())
            .finish()
    }
}

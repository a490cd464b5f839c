//! Shared test helpers for integration tests.
//!
//! Provides a mock native engine that speaks the C interface the bridge
//! expects, plus small bytecode and environment helpers. The mock interprets a
//! handful of opcodes with a fixed gas schedule and reaches all host state
//! through the callbacks it was created with.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashSet;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use evmjit_bridge::ffi::*;
use evmjit_bridge::{decode_call_gas, u256_from_be, u256_to_be, CallStatus, CodeIdentity, U256};

// ── Call counters ──
//
// Every native entry point runs on the thread that called into the bridge, so
// per-thread counters keep parallel tests from seeing each other.

thread_local! {
    static CREATED: Cell<usize> = const { Cell::new(0) };
    static DESTROYED: Cell<usize> = const { Cell::new(0) };
    static EXECUTED: Cell<usize> = const { Cell::new(0) };
    static RELEASED: Cell<usize> = const { Cell::new(0) };
    static COMPILED: Cell<usize> = const { Cell::new(0) };
    static LAST_MODE: Cell<c_int> = const { Cell::new(-1) };
}

fn bump(counter: &'static std::thread::LocalKey<Cell<usize>>) {
    counter.with(|c| c.set(c.get() + 1));
}

pub fn created() -> usize {
    CREATED.with(|c| c.get())
}

pub fn destroyed() -> usize {
    DESTROYED.with(|c| c.get())
}

pub fn executed() -> usize {
    EXECUTED.with(|c| c.get())
}

pub fn released() -> usize {
    RELEASED.with(|c| c.get())
}

pub fn compiled() -> usize {
    COMPILED.with(|c| c.get())
}

// Compiles through `mock_interface_slow_prepare` happen on whichever thread
// called `prepare_code`, so this one is process wide.
static SLOW_COMPILED: AtomicUsize = AtomicUsize::new(0);

pub fn slow_compiled() -> usize {
    SLOW_COMPILED.load(Ordering::SeqCst)
}

pub fn last_mode() -> c_int {
    LAST_MODE.with(|c| c.get())
}

// ── Opcodes understood by the mock ──

pub const STOP: u8 = 0x00;
pub const ADD: u8 = 0x01;
pub const BALANCE: u8 = 0x31;
pub const CALLER: u8 = 0x33;
pub const CALLVALUE: u8 = 0x34;
pub const EXTCODESIZE: u8 = 0x3b;
pub const BLOCKHASH: u8 = 0x40;
pub const NUMBER: u8 = 0x43;
pub const GASLIMIT: u8 = 0x45;
pub const SLOAD: u8 = 0x54;
pub const SSTORE: u8 = 0x55;
pub const PUSH1: u8 = 0x60;
pub const PUSH32: u8 = 0x7f;
/// Pops a topic; the execution input is the log data.
pub const LOG1: u8 = 0xa1;
/// Pops the endowment; the execution input is the init code.
pub const CREATE: u8 = 0xf0;
/// Pops gas, address and value; pushes the first output word, zero on failure.
pub const CALL: u8 = 0xf1;
pub const CALLCODE: u8 = 0xf2;
/// Pops a word and returns it as 32 bytes.
pub const RETURN: u8 = 0xf3;
/// Same stack layout as `CALL`; the value is still handed to the bridge.
pub const DELEGATECALL: u8 = 0xf4;
pub const SELFDESTRUCT: u8 = 0xff;

pub const G_VERYLOW: i64 = 3;
pub const G_BASE: i64 = 2;
pub const G_EXT: i64 = 20;
pub const G_SLOAD: i64 = 50;
pub const G_SSET: i64 = 20000;
pub const G_SRESET: i64 = 5000;
pub const G_CALL: i64 = 40;
pub const G_LOG1: i64 = 750;

// ── Mock engine ──

struct MockInstance {
    query: EvmQueryFn,
    update: EvmUpdateFn,
    call: EvmCallFn,
    cache: Mutex<HashSet<(c_int, [u8; 32])>>,
}

unsafe extern "C" fn mock_create(
    query: EvmQueryFn,
    update: EvmUpdateFn,
    call: EvmCallFn,
) -> *mut EvmInstance {
    bump(&CREATED);
    let instance = Box::new(MockInstance {
        query,
        update,
        call,
        cache: Mutex::new(HashSet::new()),
    });
    Box::into_raw(instance) as *mut EvmInstance
}

unsafe extern "C" fn mock_create_null(
    _query: EvmQueryFn,
    _update: EvmUpdateFn,
    _call: EvmCallFn,
) -> *mut EvmInstance {
    bump(&CREATED);
    ptr::null_mut()
}

unsafe extern "C" fn mock_destroy(instance: *mut EvmInstance) {
    bump(&DESTROYED);
    drop(Box::from_raw(instance as *mut MockInstance));
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn mock_execute(
    instance: *mut EvmInstance,
    env: *mut EvmEnv,
    mode: c_int,
    _code_hash: EvmUint256be,
    code: *const u8,
    code_size: usize,
    gas: i64,
    input: *const u8,
    input_size: usize,
    value: EvmUint256be,
) -> EvmResult {
    bump(&EXECUTED);
    LAST_MODE.with(|m| m.set(mode));

    let engine = &*(instance as *const MockInstance);
    let mut vm = Vm {
        engine,
        env,
        gas,
        value: u256_from_be(value),
        input: bytes(input, input_size),
        stack: Vec::new(),
    };
    match vm.run(bytes(code, code_size)) {
        Ok(output) => result(EVM_SUCCESS, vm.gas, output),
        Err(code) => result(code, 0, None),
    }
}

fn result(code: c_int, gas_left: i64, output: Option<[u8; 32]>) -> EvmResult {
    let mut out = EvmResult {
        code,
        gas_left,
        output_data: ptr::null(),
        output_size: 0,
        internal_memory: ptr::null_mut(),
    };
    if let Some(word) = output {
        // SAFETY: plain allocation of 32 bytes, freed in `mock_release_result`.
        unsafe {
            let buf = libc::malloc(word.len()) as *mut u8;
            assert!(!buf.is_null(), "malloc failed");
            ptr::copy_nonoverlapping(word.as_ptr(), buf, word.len());
            out.output_data = buf;
            out.output_size = word.len();
            out.internal_memory = buf as *mut c_void;
        }
    }
    out
}

unsafe extern "C" fn mock_release_result(result: *const EvmResult) {
    bump(&RELEASED);
    let memory = (*result).internal_memory;
    if !memory.is_null() {
        libc::free(memory);
    }
}

unsafe extern "C" fn mock_set_option(
    _instance: *mut EvmInstance,
    name: *const c_char,
    value: *const c_char,
) -> bool {
    let name = CStr::from_ptr(name).to_string_lossy();
    let value = CStr::from_ptr(value).to_string_lossy();
    matches!((name.as_ref(), value.as_ref()), ("cache", "on" | "off"))
}

unsafe extern "C" fn mock_get_code_status(
    instance: *mut EvmInstance,
    mode: c_int,
    code_hash: EvmUint256be,
) -> c_int {
    let engine = &*(instance as *const MockInstance);
    let cache = engine.cache.lock().unwrap();
    if cache.contains(&(mode, code_hash.bytes)) {
        EVM_READY
    } else {
        EVM_UNKNOWN
    }
}

unsafe extern "C" fn mock_prepare_code(
    instance: *mut EvmInstance,
    mode: c_int,
    code_hash: EvmUint256be,
    _code: *const u8,
    _code_size: usize,
) {
    bump(&COMPILED);
    let engine = &*(instance as *const MockInstance);
    engine.cache.lock().unwrap().insert((mode, code_hash.bytes));
}

/// Like `mock_prepare_code`, but takes long enough for other threads to ask
/// for the same code while it is still compiling.
unsafe extern "C" fn mock_prepare_code_slow(
    instance: *mut EvmInstance,
    mode: c_int,
    code_hash: EvmUint256be,
    _code: *const u8,
    _code_size: usize,
) {
    SLOW_COMPILED.fetch_add(1, Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    let engine = &*(instance as *const MockInstance);
    engine.cache.lock().unwrap().insert((mode, code_hash.bytes));
}

fn table(abi_version: c_int, create: EvmCreateFn) -> EvmInterface {
    EvmInterface {
        abi_version,
        create,
        destroy: mock_destroy,
        execute: mock_execute,
        release_result: mock_release_result,
        set_option: mock_set_option,
        get_code_status: mock_get_code_status,
        prepare_code: mock_prepare_code,
    }
}

/// Interface accessor of the mock engine.
pub unsafe extern "C" fn mock_interface() -> EvmInterface {
    table(EVM_ABI_VERSION, mock_create)
}

/// Reports an ABI version the bridge does not speak.
pub unsafe extern "C" fn mock_interface_wrong_abi() -> EvmInterface {
    table(EVM_ABI_VERSION + 7, mock_create)
}

/// Mock engine whose compiles are slow and counted process wide.
pub unsafe extern "C" fn mock_interface_slow_prepare() -> EvmInterface {
    EvmInterface {
        prepare_code: mock_prepare_code_slow,
        ..table(EVM_ABI_VERSION, mock_create)
    }
}

/// Factory that fails to produce an instance.
pub unsafe extern "C" fn mock_interface_null_create() -> EvmInterface {
    table(EVM_ABI_VERSION, mock_create_null)
}

// ── Interpreter ──

struct Vm<'a> {
    engine: &'a MockInstance,
    env: *mut EvmEnv,
    gas: i64,
    value: U256,
    input: &'a [u8],
    stack: Vec<U256>,
}

impl Vm<'_> {
    fn charge(&mut self, cost: i64) -> Result<(), c_int> {
        if cost > self.gas {
            return Err(EVM_OUT_OF_GAS);
        }
        self.gas -= cost;
        Ok(())
    }

    fn pop(&mut self) -> Result<U256, c_int> {
        self.stack.pop().ok_or(EVM_STACK_UNDERFLOW)
    }

    fn push(&mut self, value: U256) -> Result<(), c_int> {
        if self.stack.len() >= 1024 {
            return Err(EVM_STACK_OVERFLOW);
        }
        self.stack.push(value);
        Ok(())
    }

    unsafe fn query(&self, key: c_int, arg: EvmVariant) -> EvmVariant {
        (self.engine.query)(self.env, key, arg)
    }

    unsafe fn sload(&self, key: U256) -> U256 {
        u256_from_be(self.query(EVM_SLOAD, word(key)).uint256be)
    }

    unsafe fn call(&mut self, kind: c_int, gas: i64, address: U256, value: U256) -> Result<U256, c_int> {
        self.charge(G_CALL)?;
        let mut out = [0u8; 32];
        let raw = (self.engine.call)(
            self.env,
            kind,
            gas,
            address_of(address),
            u256_to_be(value),
            self.input.as_ptr(),
            self.input.len(),
            out.as_mut_ptr(),
            out.len(),
        );
        let (status, used) = decode_call_gas(raw);
        self.charge(used)?;
        Ok(match status {
            CallStatus::Success => U256::from_be_bytes(out),
            CallStatus::Failure => U256::ZERO,
        })
    }

    unsafe fn run(&mut self, code: &[u8]) -> Result<Option<[u8; 32]>, c_int> {
        let mut pc = 0;
        while pc < code.len() {
            let op = code[pc];
            pc += 1;
            match op {
                STOP => return Ok(None),
                ADD => {
                    self.charge(G_VERYLOW)?;
                    let a = self.pop()?;
                    let b = self.pop()?;
                    self.push(a.wrapping_add(b))?;
                }
                PUSH1..=PUSH32 => {
                    self.charge(G_VERYLOW)?;
                    let n = (op - PUSH1 + 1) as usize;
                    let mut buf = [0u8; 32];
                    let end = (pc + n).min(code.len());
                    let imm = &code[pc..end];
                    buf[32 - n..32 - n + imm.len()].copy_from_slice(imm);
                    pc += n;
                    self.push(U256::from_be_bytes(buf))?;
                }
                CALLER => {
                    self.charge(G_BASE)?;
                    let v = self.query(EVM_CALLER, EvmVariant::zeroed());
                    self.push(word_of(v.address.address))?;
                }
                CALLVALUE => {
                    self.charge(G_BASE)?;
                    self.push(self.value)?;
                }
                NUMBER => {
                    self.charge(G_BASE)?;
                    let v = self.query(EVM_NUMBER, EvmVariant::zeroed());
                    self.push(U256::from(v.int64 as u64))?;
                }
                GASLIMIT => {
                    self.charge(G_BASE)?;
                    let v = self.query(EVM_GAS_LIMIT, EvmVariant::zeroed());
                    self.push(U256::from(v.int64 as u64))?;
                }
                BALANCE => {
                    self.charge(G_EXT)?;
                    let addr = self.pop()?;
                    let v = self.query(EVM_BALANCE, address_arg(addr));
                    self.push(u256_from_be(v.uint256be))?;
                }
                EXTCODESIZE => {
                    self.charge(G_EXT)?;
                    let addr = self.pop()?;
                    let v = self.query(EVM_CODE_BY_ADDRESS, address_arg(addr));
                    self.push(U256::from(v.data.data_size))?;
                }
                BLOCKHASH => {
                    self.charge(G_EXT)?;
                    let number = self.pop()?;
                    let v = self.query(EVM_BLOCKHASH, EvmVariant { int64: number.as_limbs()[0] as i64 });
                    self.push(u256_from_be(v.uint256be))?;
                }
                SLOAD => {
                    self.charge(G_SLOAD)?;
                    let key = self.pop()?;
                    let value = self.sload(key);
                    self.push(value)?;
                }
                SSTORE => {
                    let key = self.pop()?;
                    let value = self.pop()?;
                    let current = self.sload(key);
                    let cost = if current.is_zero() && !value.is_zero() {
                        G_SSET
                    } else {
                        G_SRESET
                    };
                    self.charge(cost)?;
                    (self.engine.update)(self.env, EVM_SSTORE, word(key), word(value));
                }
                LOG1 => {
                    self.charge(G_LOG1)?;
                    let topic = u256_to_be(self.pop()?).bytes;
                    (self.engine.update)(self.env, EVM_LOG, data_arg(self.input), data_arg(&topic));
                }
                CREATE => {
                    let value = self.pop()?;
                    let created = self.call(EVM_CREATE, self.gas, U256::ZERO, value)?;
                    self.push(created)?;
                }
                CALL | CALLCODE | DELEGATECALL => {
                    let gas = self.pop()?;
                    let address = self.pop()?;
                    let value = self.pop()?;
                    let kind = match op {
                        CALL => EVM_CALL,
                        CALLCODE => EVM_CALLCODE,
                        _ => EVM_DELEGATECALL,
                    };
                    let out = self.call(kind, gas.as_limbs()[0] as i64, address, value)?;
                    self.push(out)?;
                }
                RETURN => {
                    let value = self.pop()?;
                    return Ok(Some(value.to_be_bytes()));
                }
                SELFDESTRUCT => {
                    let beneficiary = self.pop()?;
                    (self.engine.update)(
                        self.env,
                        EVM_SELFDESTRUCT,
                        address_arg(beneficiary),
                        EvmVariant::zeroed(),
                    );
                    return Ok(None);
                }
                _ => return Err(EVM_BAD_INSTRUCTION),
            }
        }
        Ok(None)
    }
}

unsafe fn bytes<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data, len)
    }
}

fn word(value: U256) -> EvmVariant {
    EvmVariant {
        uint256be: u256_to_be(value),
    }
}

fn data_arg(data: &[u8]) -> EvmVariant {
    EvmVariant {
        data: EvmVariantData {
            data: data.as_ptr(),
            data_size: data.len(),
        },
    }
}

fn address_of(value: U256) -> EvmUint160be {
    let be = value.to_be_bytes::<32>();
    let mut out = EvmUint160be::default();
    out.bytes.copy_from_slice(&be[12..]);
    out
}

fn address_arg(value: U256) -> EvmVariant {
    EvmVariant {
        address: EvmVariantAddress {
            address_padding: [0u8; 12],
            address: address_of(value),
        },
    }
}

fn word_of(address: EvmUint160be) -> U256 {
    let mut be = [0u8; 32];
    be[12..].copy_from_slice(&address.bytes);
    U256::from_be_bytes(be)
}

// ── Fixtures ──

/// Decode a hex bytecode string.
pub fn code(hex_code: &str) -> Vec<u8> {
    hex::decode(hex_code).expect("valid hex bytecode")
}

/// Identity for test code: the code itself, zero padded or truncated.
pub fn identity(code: &[u8]) -> CodeIdentity {
    let mut bytes = [0u8; 32];
    let n = code.len().min(32);
    bytes[..n].copy_from_slice(&code[..n]);
    CodeIdentity::new(bytes)
}

/// Initialise tracing output for a test, once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("evmjit_bridge=debug")),
        )
        .try_init();
}

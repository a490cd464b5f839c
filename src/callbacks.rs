//! Native-facing callback entry points.
//!
//! The engine calls these three functions, synchronously and on the thread
//! running `execute`, whenever bytecode needs host state. Each one resolves the
//! opaque env handle, decodes the wire arguments for its key, asks the
//! [`Environment`] and encodes the answer in the shape the key dictates.
//!
//! Nothing unwinds out of here. A failing or panicking environment, an unknown
//! key or a handle that does not resolve produces a defined fallback (zeroed
//! variant, ignored update, failed call with no gas) and a recorded
//! [`CallbackFault`].

use std::any::Any;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::slice;

use revm::primitives::{B256, U256};
use tracing::{trace, warn};

use crate::codec::{address_from_ffi, address_to_ffi, u256_from_be, u256_to_be};
use crate::environment::{
    CallKind, CallRequest, CallStatus, Environment, Query, QueryKind, QueryResponse, Update,
    UpdateKind,
};
use crate::ffi::{
    EvmEnv, EvmUint160be, EvmUint256be, EvmVariant, EvmVariantAddress, EvmVariantData,
    FAILURE_FLAG,
};
use crate::registry::{self, Frame};

/// Which callback a fault happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callback {
    Query,
    Update,
    Call,
}

/// A callback invocation that could not be serviced and was answered with the
/// defined fallback instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackFault {
    pub callback: Callback,
    pub reason: String,
}

/// Gas value reported to the engine for a failed nested call.
pub fn encode_call_failure(gas: i64) -> i64 {
    ((gas as u64) | FAILURE_FLAG) as i64
}

/// Split a call callback return value into status and gas magnitude.
pub fn decode_call_gas(raw: i64) -> (CallStatus, i64) {
    let bits = raw as u64;
    if bits & FAILURE_FLAG != 0 {
        (CallStatus::Failure, (bits & !FAILURE_FLAG) as i64)
    } else {
        (CallStatus::Success, raw)
    }
}

/// Query callback handed to the engine at creation time.
///
/// # Safety
///
/// `env` must be a handle produced by an `execute` still running on this
/// thread (anything else is answered with a zeroed variant). For keys whose
/// argument is a memory reference the pointer must be valid for its size.
pub unsafe extern "C" fn on_query(env: *mut EvmEnv, key: c_int, arg: EvmVariant) -> EvmVariant {
    dispatch(env, Callback::Query, EvmVariant::zeroed(), |frame, environment| {
        let kind = QueryKind::from_raw(key).ok_or_else(|| format!("unknown query key {key}"))?;
        let query = decode_query(kind, &arg);
        trace!(?query, "query callback");
        let response = environment
            .query(query)
            .map_err(|e| format!("{kind:?}: {e}"))?;
        if response.shape() != kind.shape() {
            return Err(format!(
                "{kind:?} expects a {:?} answer, environment returned {:?}",
                kind.shape(),
                response.shape()
            ));
        }
        Ok(encode_response(frame, response))
    })
}

/// Update callback handed to the engine at creation time.
///
/// # Safety
///
/// As for [`on_query`]; for `LOG` both arguments must reference readable
/// memory of the given sizes for the duration of the call.
pub unsafe extern "C" fn on_update(
    env: *mut EvmEnv,
    key: c_int,
    arg1: EvmVariant,
    arg2: EvmVariant,
) {
    dispatch(env, Callback::Update, (), |_, environment| {
        let kind = UpdateKind::from_raw(key).ok_or_else(|| format!("unknown update key {key}"))?;
        let update = match kind {
            UpdateKind::StorageStore => Update::StorageStore {
                key: variant_word(&arg1),
                value: variant_word(&arg2),
            },
            UpdateKind::Log => {
                let data = variant_bytes(&arg1);
                // A trailing partial topic is dropped.
                let topics = variant_bytes(&arg2)
                    .chunks_exact(32)
                    .map(B256::from_slice)
                    .collect();
                Update::Log { data, topics }
            }
            UpdateKind::SelfDestruct => Update::SelfDestruct {
                beneficiary: address_from_ffi(variant_address(&arg1)),
            },
        };
        trace!(?update, "update callback");
        environment
            .update(update)
            .map_err(|e| format!("{kind:?}: {e}"))
    })
}

/// Call callback handed to the engine at creation time.
///
/// Returns the gas reported by the environment; failures carry
/// [`FAILURE_FLAG`]. At most `output_size` bytes of the call output are
/// copied into `output`, the rest is dropped.
///
/// # Safety
///
/// As for [`on_query`]; `input` must be readable for `input_size` bytes and
/// `output` writable for `output_size` bytes (either may be null when the size
/// is zero).
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn on_call(
    env: *mut EvmEnv,
    kind: c_int,
    gas: i64,
    address: EvmUint160be,
    value: EvmUint256be,
    input: *const u8,
    input_size: usize,
    output: *mut u8,
    output_size: usize,
) -> i64 {
    let input = raw_slice(input, input_size);
    let output = raw_slice_mut(output, output_size);
    dispatch(env, Callback::Call, encode_call_failure(0), |_, environment| {
        let kind = CallKind::from_raw(kind).ok_or_else(|| format!("unknown call kind {kind}"))?;
        if gas < 0 {
            return Err(format!("{kind:?} requested with negative gas {gas}"));
        }
        let value = match kind {
            CallKind::DelegateCall => U256::ZERO,
            _ => u256_from_be(value),
        };
        let request = CallRequest {
            kind,
            gas,
            address: address_from_ffi(address),
            value,
            input,
        };
        trace!(?kind, gas, %value, input_len = input.len(), "call callback");
        let outcome = environment
            .call(request)
            .map_err(|e| format!("{kind:?}: {e}"))?;
        if outcome.gas < 0 {
            return Err(format!("{kind:?} reported negative gas {}", outcome.gas));
        }
        let copied = outcome.output.len().min(output.len());
        output[..copied].copy_from_slice(&outcome.output[..copied]);
        Ok(match outcome.status {
            CallStatus::Success => outcome.gas,
            CallStatus::Failure => encode_call_failure(outcome.gas),
        })
    })
}

/// Resolve the handle, take exclusive access to the environment and run `f`,
/// turning every failure into `fallback`.
fn dispatch<R>(
    handle: *mut EvmEnv,
    callback: Callback,
    fallback: R,
    f: impl FnOnce(&Frame<'_>, &mut dyn Environment) -> Result<R, String>,
) -> R {
    let resolved = registry::with_frame(handle, |frame| {
        let Some(mut guard) = frame.enter() else {
            frame.record_fault(
                callback,
                "environment re-entered while servicing another callback".to_string(),
            );
            return None;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(frame, guard.env())));
        drop(guard);
        match outcome {
            Ok(Ok(value)) => Some(value),
            Ok(Err(reason)) => {
                frame.record_fault(callback, reason);
                None
            }
            Err(payload) => {
                frame.record_fault(callback, panic_message(payload.as_ref()));
                None
            }
        }
    });
    match resolved {
        Some(Some(value)) => value,
        Some(None) => fallback,
        None => {
            warn!(?callback, handle = handle as usize, "callback for unregistered environment handle");
            fallback
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("environment panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("environment panicked: {s}")
    } else {
        "environment panicked".to_string()
    }
}

fn decode_query(kind: QueryKind, arg: &EvmVariant) -> Query {
    match kind {
        QueryKind::StorageValue => Query::StorageValue(variant_word(arg)),
        QueryKind::OwnAddress => Query::OwnAddress,
        QueryKind::Caller => Query::Caller,
        QueryKind::Origin => Query::Origin,
        QueryKind::GasPrice => Query::GasPrice,
        QueryKind::Coinbase => Query::Coinbase,
        QueryKind::Difficulty => Query::Difficulty,
        QueryKind::GasLimit => Query::GasLimit,
        QueryKind::BlockNumber => Query::BlockNumber,
        QueryKind::Timestamp => Query::Timestamp,
        QueryKind::CodeByAddress => Query::CodeByAddress(address_from_ffi(variant_address(arg))),
        QueryKind::Balance => Query::Balance(address_from_ffi(variant_address(arg))),
        QueryKind::BlockHash => Query::BlockHash(variant_int(arg)),
    }
}

fn encode_response(frame: &Frame<'_>, response: QueryResponse) -> EvmVariant {
    let mut out = EvmVariant::zeroed();
    match response {
        QueryResponse::Word(value) => out.uint256be = u256_to_be(value),
        QueryResponse::Address(addr) => {
            out.address = EvmVariantAddress {
                address_padding: [0u8; 12],
                address: address_to_ffi(addr),
            }
        }
        QueryResponse::Scalar(n) => out.int64 = n,
        QueryResponse::Bytes(bytes) => {
            let (data, data_size) = frame.retain(bytes);
            out.data = EvmVariantData { data, data_size };
        }
    }
    out
}

// Every bit pattern is a valid value for the plain-data union members, so
// reading them is sound whatever member the engine wrote.

fn variant_word(v: &EvmVariant) -> U256 {
    u256_from_be(unsafe { v.uint256be })
}

fn variant_address(v: &EvmVariant) -> EvmUint160be {
    unsafe { v.address.address }
}

fn variant_int(v: &EvmVariant) -> i64 {
    unsafe { v.int64 }
}

/// # Safety
///
/// The memory reference in `v` must be valid for the duration of the callback.
unsafe fn variant_bytes<'a>(v: &EvmVariant) -> &'a [u8] {
    let data = v.data;
    raw_slice(data.data, data.data_size)
}

unsafe fn raw_slice<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data, len)
    }
}

unsafe fn raw_slice_mut<'a>(data: *mut u8, len: usize) -> &'a mut [u8] {
    if data.is_null() || len == 0 {
        &mut []
    } else {
        slice::from_raw_parts_mut(data, len)
    }
}

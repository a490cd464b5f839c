//! Owned execution result.

use std::fmt;
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::slice;

use crate::callbacks::CallbackFault;
use crate::engine::EngineHandle;
use crate::ffi::{EvmReleaseResultFn, EvmResult};
use crate::types::ExecutionStatus;

/// Result of [`EngineHandle::execute`].
///
/// Owns the native result record and its output buffer. The record is handed
/// back to the engine's `release_result` exactly once, when this value is
/// dropped; the type is move-only and borrows the engine, so it can neither be
/// released twice nor outlive the instance that produced it.
pub struct ExecutionResult<'e> {
    raw: EvmResult,
    release: EvmReleaseResultFn,
    faults: Vec<CallbackFault>,
    _engine: PhantomData<&'e EngineHandle>,
}

impl<'e> ExecutionResult<'e> {
    /// # Safety
    ///
    /// `raw` must be a result produced by the engine that `release` belongs to
    /// and must not have been released yet.
    pub(crate) unsafe fn from_raw(raw: EvmResult, release: EvmReleaseResultFn) -> Self {
        ExecutionResult {
            raw,
            release,
            faults: Vec::new(),
            _engine: PhantomData,
        }
    }

    pub(crate) fn set_faults(&mut self, faults: Vec<CallbackFault>) {
        self.faults = faults;
    }

    pub fn status(&self) -> ExecutionStatus {
        ExecutionStatus::from_raw(self.raw.code)
    }

    /// The raw status code as reported by the engine.
    pub fn status_code(&self) -> c_int {
        self.raw.code
    }

    /// Gas left after execution. Negative values are engine-specific abnormal
    /// terminations and are passed through as-is.
    pub fn gas_left(&self) -> i64 {
        self.raw.gas_left
    }

    pub fn output(&self) -> &[u8] {
        if self.raw.output_data.is_null() || self.raw.output_size == 0 {
            return &[];
        }
        // SAFETY: the engine keeps the buffer alive until release, which only
        // happens in `Drop`.
        unsafe { slice::from_raw_parts(self.raw.output_data, self.raw.output_size) }
    }

    /// Callbacks during this execution that were answered with a fallback.
    pub fn callback_faults(&self) -> &[CallbackFault] {
        &self.faults
    }

    /// Copy the output out and release the native record.
    pub fn into_output(self) -> Vec<u8> {
        self.output().to_vec()
    }
}

impl Drop for ExecutionResult<'_> {
    fn drop(&mut self) {
        // SAFETY: `from_raw` guarantees a live, unreleased record; `drop` runs
        // once.
        unsafe { (self.release)(&self.raw) }
    }
}

impl fmt::Debug for ExecutionResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionResult")
            .field("status", &self.status())
            .field("gas_left", &self.gas_left())
            .field("output", &hex::encode(self.output()))
            .field("faults", &self.faults.len())
            .finish()
    }
}

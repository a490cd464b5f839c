//! Owning handle over a native engine instance.

use std::collections::HashSet;
use std::ffi::CString;
use std::fmt;
use std::os::raw::c_int;
use std::ptr::NonNull;
use std::sync::{Condvar, Mutex, PoisonError};

use revm::primitives::U256;
use tracing::{debug, error, info, warn};

use crate::callbacks::{on_call, on_query, on_update};
use crate::codec::{hash_to_ffi, u256_to_be};
use crate::config::EngineConfig;
use crate::environment::Environment;
use crate::error::BridgeError;
use crate::ffi::{EvmGetInterfaceFn, EvmInstance, EvmInterface, EVM_ABI_VERSION};
use crate::registry::{Frame, Registration};
use crate::result::ExecutionResult;
use crate::types::{CodeIdentity, CodeStatus, Mode};

/// A live native engine instance bound to this crate's callbacks.
///
/// The instance is created once in [`create`](Self::create) and destroyed at
/// most once, either by [`destroy`](Self::destroy) or on drop. Every other
/// operation on a destroyed handle fails with [`BridgeError::EngineDestroyed`]
/// before reaching native code.
pub struct EngineHandle {
    interface: EvmInterface,
    instance: Option<NonNull<EvmInstance>>,
    /// Code currently being compiled by some thread.
    preparing: Mutex<HashSet<(Mode, CodeIdentity)>>,
    prepared: Condvar,
}

// The native instance is documented thread-safe and shareable; the compiled
// code cache is the only state shared across executions.
unsafe impl Send for EngineHandle {}
unsafe impl Sync for EngineHandle {}

impl EngineHandle {
    /// Obtain the engine's function table and create one instance.
    ///
    /// An ABI version mismatch is a configuration error: it is reported here,
    /// and the native factory is never called.
    pub fn create(get_interface: EvmGetInterfaceFn) -> Result<Self, BridgeError> {
        // SAFETY: the accessor takes no arguments and returns a plain table.
        let interface = unsafe { get_interface() };
        Self::from_interface(interface)
    }

    /// Like [`create`](Self::create) with an already obtained table.
    pub fn from_interface(interface: EvmInterface) -> Result<Self, BridgeError> {
        if interface.abi_version != EVM_ABI_VERSION {
            error!(
                expected = EVM_ABI_VERSION,
                found = interface.abi_version,
                "native engine ABI version mismatch"
            );
            return Err(BridgeError::AbiMismatch {
                expected: EVM_ABI_VERSION,
                found: interface.abi_version,
            });
        }

        // SAFETY: the version check above guarantees the table layout.
        let raw = unsafe { (interface.create)(on_query, on_update, on_call) };
        let instance = NonNull::new(raw).ok_or(BridgeError::EngineCreation)?;
        info!(abi_version = interface.abi_version, "native engine created");

        Ok(EngineHandle {
            interface,
            instance: Some(instance),
            preparing: Mutex::new(HashSet::new()),
            prepared: Condvar::new(),
        })
    }

    /// Create an engine and apply `config`'s options in order.
    pub fn with_config(
        get_interface: EvmGetInterfaceFn,
        config: &EngineConfig,
    ) -> Result<Self, BridgeError> {
        let engine = Self::create(get_interface)?;
        for (name, value) in &config.options {
            let accepted = engine.set_option(name, value)?;
            if !accepted && config.strict_options {
                return Err(BridgeError::OptionRejected {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(engine)
    }

    pub fn abi_version(&self) -> c_int {
        self.interface.abi_version
    }

    pub fn is_destroyed(&self) -> bool {
        self.instance.is_none()
    }

    fn live(&self) -> Result<NonNull<EvmInstance>, BridgeError> {
        self.instance.ok_or(BridgeError::EngineDestroyed)
    }

    /// Run `code` to completion against `env`.
    ///
    /// Blocks until the engine returns, including every callback round-trip.
    /// `env` is reachable from the callbacks only for the duration of this
    /// call; nested `execute` calls made from `env.call` register their own
    /// environment on top of it.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &self,
        env: &mut dyn Environment,
        mode: Mode,
        code_identity: &CodeIdentity,
        code: &[u8],
        gas: i64,
        input: &[u8],
        value: U256,
    ) -> Result<ExecutionResult<'_>, BridgeError> {
        let instance = self.live()?;
        if gas < 0 {
            return Err(BridgeError::NegativeGas(gas));
        }
        debug!(
            ?mode,
            code = %code_identity,
            code_len = code.len(),
            gas,
            input_len = input.len(),
            "execute"
        );

        let frame = Frame::new(env);
        let mut result = {
            let registration = Registration::new(&frame);
            // SAFETY: the instance is live, every buffer outlives the call and
            // the registration keeps `env` resolvable until it returns.
            unsafe {
                let raw = (self.interface.execute)(
                    instance.as_ptr(),
                    registration.handle(),
                    mode.as_raw(),
                    hash_to_ffi(code_identity.as_b256()),
                    code.as_ptr(),
                    code.len(),
                    gas,
                    input.as_ptr(),
                    input.len(),
                    u256_to_be(value),
                );
                ExecutionResult::from_raw(raw, self.interface.release_result)
            }
        };
        result.set_faults(frame.into_faults());

        debug!(
            status = ?result.status(),
            gas_left = result.gas_left(),
            output_len = result.output().len(),
            faults = result.callback_faults().len(),
            "execute finished"
        );
        Ok(result)
    }

    /// Configure an engine tunable. `Ok(false)` when the engine does not
    /// accept the option.
    pub fn set_option(&self, name: &str, value: &str) -> Result<bool, BridgeError> {
        let instance = self.live()?;
        let c_name = CString::new(name).map_err(|_| BridgeError::InvalidOption(name.to_string()))?;
        let c_value =
            CString::new(value).map_err(|_| BridgeError::InvalidOption(value.to_string()))?;

        // SAFETY: both strings are NUL-terminated and live across the call.
        let accepted = unsafe {
            (self.interface.set_option)(instance.as_ptr(), c_name.as_ptr(), c_value.as_ptr())
        };
        if accepted {
            debug!(name, value, "engine option set");
        } else {
            warn!(name, value, "engine rejected option");
        }
        Ok(accepted)
    }

    pub fn code_status(
        &self,
        mode: Mode,
        code_identity: &CodeIdentity,
    ) -> Result<CodeStatus, BridgeError> {
        let instance = self.live()?;
        // SAFETY: live instance, hash passed by value.
        let raw = unsafe {
            (self.interface.get_code_status)(
                instance.as_ptr(),
                mode.as_raw(),
                hash_to_ffi(code_identity.as_b256()),
            )
        };
        Ok(CodeStatus::from_raw(raw))
    }

    pub fn is_code_ready(&self, mode: Mode, code_identity: &CodeIdentity) -> Result<bool, BridgeError> {
        Ok(self.code_status(mode, code_identity)? == CodeStatus::Ready)
    }

    /// Compile `code` ahead of time. Idempotent per `(mode, code_identity)`:
    /// code that is already ready is not handed to the engine again, and
    /// concurrent callers preparing the same code wait for one compile.
    pub fn prepare_code(
        &self,
        mode: Mode,
        code_identity: &CodeIdentity,
        code: &[u8],
    ) -> Result<(), BridgeError> {
        let instance = self.live()?;
        let _claim = self.claim(mode, *code_identity);
        if self.is_code_ready(mode, code_identity)? {
            debug!(?mode, code = %code_identity, "code already prepared");
            return Ok(());
        }
        debug!(?mode, code = %code_identity, code_len = code.len(), "preparing code");
        // SAFETY: live instance, `code` outlives the call.
        unsafe {
            (self.interface.prepare_code)(
                instance.as_ptr(),
                mode.as_raw(),
                hash_to_ffi(code_identity.as_b256()),
                code.as_ptr(),
                code.len(),
            )
        };
        Ok(())
    }

    /// Blocks while another thread holds the claim for the same code.
    fn claim(&self, mode: Mode, code_identity: CodeIdentity) -> PrepareClaim<'_> {
        let key = (mode, code_identity);
        let mut preparing = self.preparing.lock().unwrap_or_else(PoisonError::into_inner);
        while preparing.contains(&key) {
            preparing = self
                .prepared
                .wait(preparing)
                .unwrap_or_else(PoisonError::into_inner);
        }
        preparing.insert(key);
        PrepareClaim { engine: self, key }
    }

    /// Destroy the native instance. A second call fails with
    /// [`BridgeError::EngineDestroyed`].
    pub fn destroy(&mut self) -> Result<(), BridgeError> {
        let instance = self.instance.take().ok_or(BridgeError::EngineDestroyed)?;
        // SAFETY: taken out of `self`, so it is destroyed exactly once.
        unsafe { (self.interface.destroy)(instance.as_ptr()) };
        info!("native engine destroyed");
        Ok(())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if self.instance.is_some() {
            let _ = self.destroy();
        }
    }
}

/// Exclusive right to check and compile one `(mode, code_identity)`,
/// released on drop.
struct PrepareClaim<'a> {
    engine: &'a EngineHandle,
    key: (Mode, CodeIdentity),
}

impl Drop for PrepareClaim<'_> {
    fn drop(&mut self) {
        self.engine
            .preparing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        self.engine.prepared.notify_all();
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("abi_version", &self.interface.abi_version)
            .field("instance", &self.instance)
            .finish()
    }
}

//! Host callback bridge for a native EVM JIT engine.
//!
//! The engine executes bytecode but owns no state: every storage read, block
//! query, log, self-destruct and nested call is delegated back to the host
//! through three C callbacks. This crate binds those callbacks to a Rust
//! [`Environment`] and wraps the engine's lifecycle in an owning
//! [`EngineHandle`] whose results are released exactly once.
//!
//! # Safety
//!
//! The engine is reached through raw function pointers obtained from an
//! `extern "C"` interface accessor. The bridge trusts that table to follow the
//! ABI it reports via `abi_version`; everything above it is safe Rust.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod ffi;

mod callbacks;
mod codec;
mod config;
mod engine;
mod environment;
mod error;
mod memory_env;
mod registry;
mod result;
mod types;
mod utils;

pub use callbacks::*;
pub use codec::*;
pub use config::*;
pub use engine::*;
pub use environment::*;
pub use error::*;
pub use memory_env::*;
pub use result::*;
pub use types::*;
pub use utils::*;

pub use revm::primitives::{Address, B256, U256};

/// The natively built EVMJIT library.
#[cfg(feature = "evmjit")]
pub mod evmjit {
    use crate::config::EngineConfig;
    use crate::engine::EngineHandle;
    use crate::error::BridgeError;
    use crate::ffi::EvmInterface;

    #[link(name = "evmjit-standalone")]
    #[link(name = "stdc++")]
    extern "C" {
        #[link_name = "evmjit_get_interface"]
        fn get_interface() -> EvmInterface;
    }

    /// Interface accessor exported by `libevmjit-standalone`.
    pub unsafe extern "C" fn interface() -> EvmInterface {
        get_interface()
    }

    /// Create an engine backed by the linked EVMJIT.
    pub fn create_engine() -> Result<EngineHandle, BridgeError> {
        EngineHandle::create(interface)
    }

    pub fn create_engine_with_config(config: &EngineConfig) -> Result<EngineHandle, BridgeError> {
        EngineHandle::with_config(interface, config)
    }
}

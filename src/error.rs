//! Bridge error types.

use std::os::raw::c_int;

/// Error returned by [`EngineHandle`](crate::EngineHandle) operations.
///
/// Engine-reported execution failures are not errors; they come back as
/// ordinary [`ExecutionResult`](crate::ExecutionResult) data.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The native library reports a different ABI version. No engine instance
    /// was created.
    #[error("ABI version mismatch: bridge expects {expected}, engine reports {found}")]
    AbiMismatch { expected: c_int, found: c_int },

    /// The native factory returned a null instance.
    #[error("native engine factory returned no instance")]
    EngineCreation,

    /// The handle was destroyed; no further operations are possible.
    #[error("engine handle has been destroyed")]
    EngineDestroyed,

    /// A code identity must be exactly 32 bytes.
    #[error("code identity must be 32 bytes, got {0}")]
    InvalidCodeIdentity(usize),

    /// Gas passed to `execute` must be in `0..=i64::MAX`.
    #[error("gas must be non-negative, got {0}")]
    NegativeGas(i64),

    /// Option names and values are handed to the engine as C strings.
    #[error("option {0:?} contains an interior NUL byte")]
    InvalidOption(String),

    /// A configured option was rejected while `strict_options` was set.
    #[error("engine rejected option {name}={value}")]
    OptionRejected { name: String, value: String },
}

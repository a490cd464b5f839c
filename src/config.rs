//! Engine configuration.

/// Options applied to a freshly created engine by
/// [`EngineHandle::with_config`](crate::EngineHandle::with_config).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// `(name, value)` pairs passed to `set_option`, in order.
    pub options: Vec<(String, String)>,

    /// Fail creation when the engine rejects any option. When unset a rejected
    /// option is only logged.
    pub strict_options: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_options = strict;
        self
    }
}

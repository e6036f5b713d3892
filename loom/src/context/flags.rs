//! Runtime Context configuration (§4.A).

/// Policy flags recognized on a [`super::Context`] (§4.A, §6 "Flags
/// recognized on Context").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextFlags {
    /// Newly created promises/agent invocations schedule their producer on
    /// the next cooperative yield rather than waiting for first access.
    /// Default `true`; turning it off globally risks self-deadlock (§4.A).
    pub start_soon_default: bool,
    /// If `true`, a producer's uncaught error becomes a synthetic
    /// error-Message appended to its output instead of a re-raised terminal
    /// error (§4.A, §7).
    pub errors_as_messages: bool,
    /// Opt-in: install a persistence hook that routes every message through
    /// a user-provided logger sink (§6).
    pub llm_logger_agent: bool,
}

impl Default for ContextFlags {
    fn default() -> Self {
        ContextFlags {
            start_soon_default: true,
            errors_as_messages: false,
            llm_logger_agent: false,
        }
    }
}

/// Fluent builder for [`ContextFlags`] / [`super::Context`], in the
/// teacher's `with_*` style (`StateGraph::with_store`).
#[derive(Clone, Copy, Debug, Default)]
pub struct ContextBuilder {
    flags: ContextFlags,
}

impl ContextBuilder {
    pub fn new() -> Self {
        ContextBuilder::default()
    }

    pub fn with_start_soon_default(mut self, enabled: bool) -> Self {
        self.flags.start_soon_default = enabled;
        self
    }

    pub fn with_errors_as_messages(mut self, enabled: bool) -> Self {
        self.flags.errors_as_messages = enabled;
        self
    }

    pub fn with_llm_logger_agent(mut self, enabled: bool) -> Self {
        self.flags.llm_logger_agent = enabled;
        self
    }

    pub fn build(self) -> super::Context {
        super::Context::from_flags(self.flags)
    }
}

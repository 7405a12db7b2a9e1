//! Error types for extension environments.

use thiserror::Error;

use crate::env::handle::HandleKind;

/// Message raised to guest code when an internal handle fails validation.
pub const INVALID_INTERNAL_VALUE: &str = "Invalid internal value";

/// Message raised to guest code when a warning is escalated.
pub const WARNINGS_ARE_FATAL: &str = "Warnings are fatal";

/// Errors that can occur while building or driving an extension environment.
#[derive(Error, Debug)]
pub enum ExtError {
    /// Failed to create or configure the Lua runtime.
    #[error("failed to initialize runtime: {0}")]
    RuntimeInit(#[source] mlua::Error),

    /// The styler refused to attach to or detach from the environment.
    #[error("styler error: {0}")]
    Styler(#[source] anyhow::Error),

    /// A mandatory standard library tier could not be loaded.
    #[error("failed to load library tier {tier}: {source}")]
    LibraryLoad {
        /// Maximum sandbox level of the failing tier.
        tier: i8,
        /// The runtime's error.
        #[source]
        source: mlua::Error,
    },

    /// A host callable could not be registered.
    #[error("failed to register host function `{name}`: {source}")]
    HostFunction {
        /// Guest-visible name of the callable.
        name: &'static str,
        /// The runtime's error.
        #[source]
        source: mlua::Error,
    },

    /// A global binding could not be injected.
    #[error("failed to inject global `{name}`: {source}")]
    Injection {
        /// Guest-visible name of the binding.
        name: &'static str,
        /// The runtime's error.
        #[source]
        source: mlua::Error,
    },

    /// The extension loader reported a failure.
    #[error("failed to load extensions: {0}")]
    ExtensionLoad(#[source] anyhow::Error),

    /// A requested extension could not be found along the search path.
    #[error("extension `{name}` not found along path \"{path}\"")]
    ExtensionNotFound {
        /// The extension name as requested.
        name: String,
        /// The search path, colon-separated.
        path: String,
    },

    /// Guest code raised an error which escaped to the host.
    #[error("script error: {0}")]
    Script(#[from] mlua::Error),

    /// The guest exceeded its memory allowance.
    #[error("memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    /// The guest exhausted its instruction budget.
    #[error("instruction limit exceeded after {consumed} instructions")]
    InstructionLimitExceeded {
        /// Instructions charged before the budget ran out.
        consumed: u64,
    },

    /// A handle was resolved with the wrong kind.
    #[error("handle kind mismatch: expected {expected}, found {found}")]
    HandleKindMismatch {
        /// The kind the caller asked for.
        expected: HandleKind,
        /// The kind the handle carries.
        found: HandleKind,
    },

    /// A handle outlived the host data it refers to.
    #[error("{0} handle no longer refers to live host data")]
    DanglingHandle(HandleKind),

    /// I/O error while locating or reading extensions.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ExtError {
    /// Check if this error aborted environment construction.
    pub fn is_construction_failure(&self) -> bool {
        matches!(
            self,
            ExtError::RuntimeInit(_)
                | ExtError::Styler(_)
                | ExtError::LibraryLoad { .. }
                | ExtError::HostFunction { .. }
                | ExtError::Injection { .. }
        )
    }

    /// Check if this error came from the extension loader.
    pub fn is_extension_load(&self) -> bool {
        matches!(self, ExtError::ExtensionLoad(_))
    }

    /// Check if this error represents a memory limit exceeded.
    pub fn is_memory_limit(&self) -> bool {
        matches!(self, ExtError::MemoryLimitExceeded(_))
    }

    /// Check if this error represents an exhausted instruction budget.
    pub fn is_instruction_limit(&self) -> bool {
        matches!(self, ExtError::InstructionLimitExceeded { .. })
    }

    /// Check if this error concerns handle validation.
    pub fn is_handle_error(&self) -> bool {
        matches!(
            self,
            ExtError::HandleKindMismatch { .. } | ExtError::DanglingHandle(_)
        )
    }

    /// Check if this error was raised from guest code.
    pub fn is_script(&self) -> bool {
        matches!(self, ExtError::Script(_))
    }
}

/// Result type alias for extension environment operations.
pub type Result<T> = std::result::Result<T, ExtError>;

/// Build an error which unwinds the current guest call.
pub fn guest_fatal(message: impl Into<String>) -> mlua::Error {
    mlua::Error::RuntimeError(message.into())
}

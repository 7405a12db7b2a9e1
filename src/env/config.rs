//! Environment configuration with builder pattern.

use std::fmt;

use crate::error::ExtError;

/// How much of the host system extensions may touch.
///
/// Levels are ordered from least to most restrictive. Each maps onto the numeric
/// level used by the capability tier table, where a smaller number grants more.
///
/// `package` is only granted from [`Standard`](Self::Standard) down, and `debug` only
/// at [`Unsound`](Self::Unsound), level -1. Level 0, [`Unrestricted`](Self::Unrestricted),
/// therefore has `os` but neither `debug` nor anything that reaches into handles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SandboxLevel {
    /// Can break the pipeline's abstractions (exposes the `debug` library).
    Unsound,

    /// Side-effects allowed anywhere on the host system.
    Unrestricted,

    /// Side-effects limited to input and output facilities.
    #[default]
    Standard,

    /// No side-effects on the host system.
    Strict,
}

impl SandboxLevel {
    /// Levels accepted from users, least restrictive first.
    pub const INPUT_LEVELS: [SandboxLevel; 3] = [
        SandboxLevel::Unrestricted,
        SandboxLevel::Standard,
        SandboxLevel::Strict,
    ];

    /// Numeric level compared against each tier's maximum.
    pub fn level(self) -> i8 {
        match self {
            SandboxLevel::Unsound => -1,
            SandboxLevel::Unrestricted => 0,
            SandboxLevel::Standard => 1,
            SandboxLevel::Strict => 2,
        }
    }

    /// Whether the runtime must be created without its safety checks.
    pub fn requires_unsafe_runtime(self) -> bool {
        self == SandboxLevel::Unsound
    }
}

impl TryFrom<i8> for SandboxLevel {
    type Error = ExtError;

    fn try_from(level: i8) -> Result<Self, Self::Error> {
        match level {
            -1 => Ok(SandboxLevel::Unsound),
            0 => Ok(SandboxLevel::Unrestricted),
            1 => Ok(SandboxLevel::Standard),
            2 => Ok(SandboxLevel::Strict),
            _ => Err(ExtError::Config(format!("unknown sandbox level: {}", level))),
        }
    }
}

impl fmt::Display for SandboxLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SandboxLevel::Unsound => "unsound",
            SandboxLevel::Unrestricted => "unrestricted",
            SandboxLevel::Standard => "standard",
            SandboxLevel::Strict => "strict",
        })
    }
}

/// An optional upper bound on some resource.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ResourceLimit<T> {
    #[default]
    Unlimited,
    Limited(T),
}

impl<T: Copy> ResourceLimit<T> {
    /// The bound, if there is one.
    pub fn limit(&self) -> Option<T> {
        match self {
            ResourceLimit::Unlimited => None,
            ResourceLimit::Limited(l) => Some(*l),
        }
    }
}

impl<T> From<Option<T>> for ResourceLimit<T> {
    fn from(limit: Option<T>) -> Self {
        match limit {
            Some(l) => ResourceLimit::Limited(l),
            None => ResourceLimit::Unlimited,
        }
    }
}

/// Configuration for an extension environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Capability restriction applied to the standard library.
    pub sandbox: SandboxLevel,
    /// Maximum memory the Lua state may allocate, in bytes.
    pub max_memory: ResourceLimit<usize>,
    /// Maximum instructions guest code may run per pass.
    pub instruction_limit: ResourceLimit<u64>,
    /// Whether warnings raised by host callables abort the guest call.
    pub fatal_warnings: bool,
}

impl EnvConfig {
    /// Create a new builder for EnvConfig.
    pub fn builder() -> EnvConfigBuilder {
        EnvConfigBuilder::default()
    }
}

/// Builder for creating EnvConfig instances.
#[derive(Debug, Clone, Default)]
pub struct EnvConfigBuilder {
    sandbox: Option<SandboxLevel>,
    max_memory: Option<ResourceLimit<usize>>,
    instruction_limit: Option<ResourceLimit<u64>>,
    fatal_warnings: Option<bool>,
}

impl EnvConfigBuilder {
    /// Set the sandbox level.
    pub fn sandbox(mut self, sandbox: SandboxLevel) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Set the memory limit in bytes.
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = Some(ResourceLimit::Limited(bytes));
        self
    }

    /// Set the per-pass instruction limit.
    pub fn instruction_limit(mut self, instructions: u64) -> Self {
        self.instruction_limit = Some(ResourceLimit::Limited(instructions));
        self
    }

    /// Make warnings from host callables fatal.
    pub fn fatal_warnings(mut self, fatal: bool) -> Self {
        self.fatal_warnings = Some(fatal);
        self
    }

    /// Build the EnvConfig.
    pub fn build(self) -> EnvConfig {
        let default = EnvConfig::default();
        EnvConfig {
            sandbox: self.sandbox.unwrap_or(default.sandbox),
            max_memory: self.max_memory.unwrap_or(default.max_memory),
            instruction_limit: self.instruction_limit.unwrap_or(default.instruction_limit),
            fatal_warnings: self.fatal_warnings.unwrap_or(default.fatal_warnings),
        }
    }
}

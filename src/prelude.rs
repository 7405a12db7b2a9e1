//! Prelude module for convenient imports.

pub use crate::error::{ExtError, Result};
pub use crate::env::{
    args::DocArgs,
    config::{EnvConfig, SandboxLevel},
    environment::{ExtParams, ExtensionEnv},
    host::{DocumentHost, NameRegistry, Styler, WarnOutcome, WarningSink},
};

//! # Lua Extension Environments
//!
//! Sandboxed Lua environments for the extension layer of a document-processing
//! pipeline.
//!
//! Each [`ExtensionEnv`] owns one Lua state. On construction it:
//!
//! - **Publishes host data**: the pass index, a self handle, the node-type table and
//!   opaque handles to the document arguments and name registry
//! - **Applies a capability sandbox**: standard libraries are loaded tier by tier up
//!   to the configured [`SandboxLevel`]
//! - **Installs host callables**: tree evaluation, stylesheet import, file inclusion
//!   and the rerun request
//! - **Loads extensions** through an [`ExtensionLoader`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use lua_ext_env::prelude::*;
//! use std::rc::Rc;
//!
//! let params = ExtParams::new(
//!     EnvConfig::builder().sandbox(SandboxLevel::Strict).build(),
//!     styler,
//!     Rc::new(DocArgs::new()),
//!     Rc::new(NameRegistry::new()),
//! );
//! let env = ExtensionEnv::new(&params)?;
//!
//! while env.requires_rerun() {
//!     env.begin_pass()?;
//!     env.exec("if em_iter < 2 then requires_reiter() end", "pass")?;
//! }
//! env.destroy();
//! ```
//!
//! ## Sandbox Levels
//!
//! | Level          | Libraries                                                 |
//! |----------------|-----------------------------------------------------------|
//! | `Strict`       | base (without file loading), coroutine, table, string, utf8, math |
//! | `Standard`     | the above, plus `package`, `io`, `dofile` and `loadfile`  |
//! | `Unrestricted` | the above, plus `os`                                      |
//! | `Unsound`      | the above, plus `debug`                                   |
//!
//! Handles published to guest code never own their targets. The host keeps its
//! styler, arguments and name registry alive for as long as the environment may
//! use them.

pub mod env;
pub mod error;
pub mod node_types;
pub mod prelude;

// Re-export main types at crate root for convenience
pub use env::args::{DocArgs, ExtArg};
pub use env::config::{EnvConfig, EnvConfigBuilder, ResourceLimit, SandboxLevel};
pub use env::environment::{EnvState, ExtParams, ExtensionEnv};
pub use env::extensions::{ExtensionLoader, NoExtensions, SearchPathLoader};
pub use env::handle::{HandleKind, TaggedHandle};
pub use env::host::{
    DocumentHost, NameRegistry, NoDocument, Styler, TracingWarnings, WarnOutcome, WarningSink,
};
pub use env::search_path::SearchPath;
pub use env::tiers::{permitted_libraries, CapabilityTier, Library, CAPABILITY_TIERS};
pub use error::{ExtError, Result};
pub use node_types::ContentType;

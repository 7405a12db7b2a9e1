//! Extension environment module containing construction, sandboxing and signalling.

pub mod args;
pub mod config;
pub mod environment;
pub mod extensions;
pub mod globals;
pub mod handle;
pub mod host;
pub mod limits;
mod libraries;
mod rerun;
pub mod search_path;
pub mod tiers;

#[cfg(test)]
pub(crate) mod testing;

//! Interfaces to the host subsystems an environment collaborates with.

use std::cell::RefCell;
use std::collections::HashMap;

use mlua::{Lua, Value};
use tracing::warn;

/// The styling subsystem, as seen from an extension environment.
///
/// An environment references its styler but never owns it.
pub trait Styler {
    /// Called once the environment holds a handle to this styler.
    fn provide(&self, _lua: &Lua) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the environment gives up its handle to this styler.
    fn revoke(&self, _lua: &Lua) -> anyhow::Result<()> {
        Ok(())
    }

    /// Import the named stylesheet on behalf of guest code.
    fn import_stylesheet(&self, sheet: &str) -> anyhow::Result<()>;
}

/// The document subsystem which evaluates node trees and includes files.
pub trait DocumentHost {
    /// Evaluate a node tree passed in from guest code.
    fn eval_tree<'lua>(&self, lua: &'lua Lua, node: Value<'lua>) -> mlua::Result<Value<'lua>>;

    /// Parse and return the document at `path`.
    fn include_file<'lua>(&self, lua: &'lua Lua, path: &str) -> mlua::Result<Value<'lua>>;
}

/// A document host with no document attached.
///
/// Evaluation returns its input unchanged and inclusion always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDocument;

impl DocumentHost for NoDocument {
    fn eval_tree<'lua>(&self, _lua: &'lua Lua, node: Value<'lua>) -> mlua::Result<Value<'lua>> {
        Ok(node)
    }

    fn include_file<'lua>(&self, _lua: &'lua Lua, path: &str) -> mlua::Result<Value<'lua>> {
        Err(mlua::Error::RuntimeError(format!(
            "cannot include {}: no document attached",
            path
        )))
    }
}

/// What the caller should do after emitting a warning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WarnOutcome {
    Continue,
    Fatal,
}

impl WarnOutcome {
    /// Whether the warning should abort the guest call.
    pub fn is_fatal(self) -> bool {
        self == WarnOutcome::Fatal
    }
}

/// Receives warnings raised by host callables.
pub trait WarningSink {
    fn warn(&self, message: &str) -> WarnOutcome;
}

/// Emits warnings through `tracing`, optionally treating them as fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWarnings {
    fatal: bool,
}

impl TracingWarnings {
    /// A sink which reports `Fatal` for every warning when `fatal` is set.
    pub fn new(fatal: bool) -> Self {
        Self { fatal }
    }
}

impl WarningSink for TracingWarnings {
    fn warn(&self, message: &str) -> WarnOutcome {
        warn!(fatal = self.fatal, "{}", message);
        if self.fatal {
            WarnOutcome::Fatal
        } else {
            WarnOutcome::Continue
        }
    }
}

/// Interns names shared across the pipeline, handing out stable ids.
#[derive(Debug, Default)]
pub struct NameRegistry {
    inner: RefCell<Names>,
}

#[derive(Debug, Default)]
struct Names {
    ids: HashMap<String, usize>,
    names: Vec<String>,
}

impl NameRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `name`, registering it if unseen.
    pub fn intern(&self, name: &str) -> usize {
        let mut inner = self.inner.borrow_mut();
        if let Some(id) = inner.ids.get(name) {
            return *id;
        }
        let id = inner.names.len();
        inner.names.push(name.to_owned());
        inner.ids.insert(name.to_owned(), id);
        id
    }

    /// The id of `name`, if registered.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.inner.borrow().ids.get(name).copied()
    }

    /// The name registered under `id`.
    pub fn name(&self, id: usize) -> Option<String> {
        self.inner.borrow().names.get(id).cloned()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.inner.borrow().names.len()
    }

    /// Whether no names are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

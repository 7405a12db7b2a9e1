//! Tagged handles: opaque references to host data published into the guest.
//!
//! A handle never owns what it points at. The host keeps the data alive in an `Rc`
//! and the handle holds a `Weak`, so a handle that outlives its target fails to
//! resolve instead of dangling. Guest code only ever sees the handle as an opaque
//! userdata; every host-side retrieval goes through a kind check first.

use std::fmt;
use std::rc::{Rc, Weak};

use mlua::{AnyUserData, Lua, MetaMethod, UserData, UserDataMethods};

use crate::env::args::DocArgs;
use crate::env::environment::EnvState;
use crate::env::host::{NameRegistry, Styler};
use crate::error::{guest_fatal, ExtError, Result, INVALID_INTERNAL_VALUE};

/// The kind of host data a handle refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Styler,
    ExtEnv,
    ParsedArgs,
    NameRegistry,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleKind::Styler => "styler",
            HandleKind::ExtEnv => "ext-env",
            HandleKind::ParsedArgs => "parsed-args",
            HandleKind::NameRegistry => "name-registry",
        })
    }
}

#[derive(Clone)]
enum Target {
    Styler(Weak<dyn Styler>),
    ExtEnv(Weak<EnvState>),
    ParsedArgs(Weak<DocArgs>),
    NameRegistry(Weak<NameRegistry>),
}

/// A non-owning, kind-tagged reference to host data.
#[derive(Clone)]
pub struct TaggedHandle {
    target: Target,
}

impl TaggedHandle {
    /// Handle to the styler.
    pub fn styler(styler: &Rc<dyn Styler>) -> Self {
        Self {
            target: Target::Styler(Rc::downgrade(styler)),
        }
    }

    /// Handle to an environment's pass state.
    pub fn ext_env(state: &Rc<EnvState>) -> Self {
        Self {
            target: Target::ExtEnv(Rc::downgrade(state)),
        }
    }

    /// Handle to the parsed arguments.
    pub fn parsed_args(args: &Rc<DocArgs>) -> Self {
        Self {
            target: Target::ParsedArgs(Rc::downgrade(args)),
        }
    }

    /// Handle to the name registry.
    pub fn name_registry(names: &Rc<NameRegistry>) -> Self {
        Self {
            target: Target::NameRegistry(Rc::downgrade(names)),
        }
    }

    /// The kind tag carried by this handle.
    pub fn kind(&self) -> HandleKind {
        match self.target {
            Target::Styler(_) => HandleKind::Styler,
            Target::ExtEnv(_) => HandleKind::ExtEnv,
            Target::ParsedArgs(_) => HandleKind::ParsedArgs,
            Target::NameRegistry(_) => HandleKind::NameRegistry,
        }
    }

    /// Whether the referenced host data is still alive.
    pub fn is_live(&self) -> bool {
        match &self.target {
            Target::Styler(w) => w.strong_count() > 0,
            Target::ExtEnv(w) => w.strong_count() > 0,
            Target::ParsedArgs(w) => w.strong_count() > 0,
            Target::NameRegistry(w) => w.strong_count() > 0,
        }
    }

    /// Fail unless this handle carries the `expected` kind.
    pub fn expect_kind(&self, expected: HandleKind) -> Result<()> {
        let found = self.kind();
        if found != expected {
            return Err(ExtError::HandleKindMismatch { expected, found });
        }
        Ok(())
    }

    /// Resolve to the styler.
    pub fn as_styler(&self) -> Result<Rc<dyn Styler>> {
        match &self.target {
            Target::Styler(w) => upgrade(w, HandleKind::Styler),
            _ => Err(self.mismatch(HandleKind::Styler)),
        }
    }

    /// Resolve to the environment's pass state.
    pub fn as_env(&self) -> Result<Rc<EnvState>> {
        match &self.target {
            Target::ExtEnv(w) => upgrade(w, HandleKind::ExtEnv),
            _ => Err(self.mismatch(HandleKind::ExtEnv)),
        }
    }

    /// Resolve to the parsed arguments.
    pub fn as_args(&self) -> Result<Rc<DocArgs>> {
        match &self.target {
            Target::ParsedArgs(w) => upgrade(w, HandleKind::ParsedArgs),
            _ => Err(self.mismatch(HandleKind::ParsedArgs)),
        }
    }

    /// Resolve to the name registry.
    pub fn as_names(&self) -> Result<Rc<NameRegistry>> {
        match &self.target {
            Target::NameRegistry(w) => upgrade(w, HandleKind::NameRegistry),
            _ => Err(self.mismatch(HandleKind::NameRegistry)),
        }
    }

    fn mismatch(&self, expected: HandleKind) -> ExtError {
        ExtError::HandleKindMismatch {
            expected,
            found: self.kind(),
        }
    }
}

fn upgrade<T: ?Sized>(weak: &Weak<T>, kind: HandleKind) -> Result<Rc<T>> {
    weak.upgrade().ok_or(ExtError::DanglingHandle(kind))
}

impl fmt::Debug for TaggedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedHandle")
            .field("kind", &self.kind())
            .field("live", &self.is_live())
            .finish()
    }
}

impl UserData for TaggedHandle {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("handle<{}>", this.kind()))
        });
    }
}

/// Read the handle stored under global `name`, checking its kind.
///
/// Anything other than a handle of the `expected` kind raises the guest-visible
/// internal-value error.
pub fn resolve_global(lua: &Lua, name: &str, expected: HandleKind) -> mlua::Result<TaggedHandle> {
    let value: Option<AnyUserData> = lua
        .globals()
        .get(name)
        .map_err(|_| guest_fatal(INVALID_INTERNAL_VALUE))?;
    checked(value, expected)
}

/// Read the handle stored in the registry under `key`, checking its kind.
///
/// Returns `Ok(None)` if nothing is stored there.
pub fn resolve_registry(
    lua: &Lua,
    key: &str,
    expected: HandleKind,
) -> mlua::Result<Option<TaggedHandle>> {
    let value: Option<AnyUserData> = lua
        .named_registry_value(key)
        .map_err(|_| guest_fatal(INVALID_INTERNAL_VALUE))?;
    match value {
        None => Ok(None),
        some => checked(some, expected).map(Some),
    }
}

fn checked(value: Option<AnyUserData>, expected: HandleKind) -> mlua::Result<TaggedHandle> {
    let ud = value.ok_or_else(|| guest_fatal(INVALID_INTERNAL_VALUE))?;
    let handle = TaggedHandle::clone(
        &*ud.borrow::<TaggedHandle>()
            .map_err(|_| guest_fatal(INVALID_INTERNAL_VALUE))?,
    );
    handle
        .expect_kind(expected)
        .map_err(|_| guest_fatal(INVALID_INTERNAL_VALUE))?;
    Ok(handle)
}

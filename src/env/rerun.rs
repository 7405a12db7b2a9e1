//! The guest-callable rerun request.
//!
//! The rerun flag only ever moves from false to true here. Clearing it is the pass
//! driver's business (see `ExtensionEnv::begin_pass`).

use std::rc::Rc;

use mlua::{Function, Lua, Value, Variadic};

use crate::env::globals::{ENV_VAR, REQUIRE_RERUN_FUNC};
use crate::env::handle::{resolve_global, HandleKind};
use crate::env::host::WarningSink;
use crate::error::{guest_fatal, INVALID_INTERNAL_VALUE, WARNINGS_ARE_FATAL};

/// Build the `requires_reiter` callable.
///
/// Arguments are ignored with a warning; if the sink treats the warning as fatal the
/// call raises instead of setting the flag.
pub(crate) fn rerun_request<'lua>(
    lua: &'lua Lua,
    warnings: Rc<dyn WarningSink>,
) -> mlua::Result<Function<'lua>> {
    lua.create_function(move |lua, args: Variadic<Value>| {
        if !args.is_empty()
            && warnings
                .warn(&format!("Arguments to {} are ignored", REQUIRE_RERUN_FUNC))
                .is_fatal()
        {
            return Err(guest_fatal(WARNINGS_ARE_FATAL));
        }

        let env = resolve_global(lua, ENV_VAR, HandleKind::ExtEnv)?
            .as_env()
            .map_err(|_| guest_fatal(INVALID_INTERNAL_VALUE))?;
        env.request_rerun();
        Ok(())
    })
}

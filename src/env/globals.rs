//! Guest-visible names and the bindings injected into every fresh runtime.

use std::rc::Rc;

use mlua::{IntoLua, Lua};
use tracing::debug;

use crate::env::environment::{EnvState, ExtParams};
use crate::env::handle::TaggedHandle;
use crate::error::{ExtError, Result};
use crate::node_types::ContentType;

/// Index of the current pass.
pub const ITER_VAR: &str = "em_iter";
/// Handle back to the owning environment.
pub const ENV_VAR: &str = "_em_env";
/// Content-type name to ordinal.
pub const NODE_TYPES_TABLE: &str = "node_types";
/// Handle to the parsed document arguments.
pub const ARGS_VAR: &str = "_em_args";
/// Handle to the shared name registry.
pub const NAMES_VAR: &str = "_em_mt_names";

pub const EVAL_FUNC: &str = "eval";
pub const IMPORT_STYLESHEET_FUNC: &str = "stylesheet";
pub const REQUIRE_RERUN_FUNC: &str = "requires_reiter";
pub const INCLUDE_FILE_FUNC: &str = "include";

/// Registry slot holding the styler handle while the styler is provided.
pub(crate) const STYLER_REGISTRY_KEY: &str = "lua_ext_env.styler";

/// Handles published by [`inject`], kept by the environment until teardown.
pub(crate) struct Published {
    pub selfp: TaggedHandle,
    pub args: TaggedHandle,
    pub names: TaggedHandle,
}

/// Define the pass index, self handle, node-type table, args handle and
/// name-registry handle. Nothing else in the global table is touched.
pub(crate) fn inject(lua: &Lua, state: &Rc<EnvState>, params: &ExtParams) -> Result<Published> {
    set_global(lua, ITER_VAR, state.iteration())?;

    let selfp = TaggedHandle::ext_env(state);
    set_global(lua, ENV_VAR, selfp.clone())?;

    let node_types = lua
        .create_table_with_capacity(0, ContentType::ALL.len())
        .map_err(|source| injection(NODE_TYPES_TABLE, source))?;
    for ty in ContentType::ALL {
        node_types
            .set(ty.name(), ty.ordinal())
            .map_err(|source| injection(NODE_TYPES_TABLE, source))?;
    }
    set_global(lua, NODE_TYPES_TABLE, node_types)?;

    let args = TaggedHandle::parsed_args(&params.args);
    set_global(lua, ARGS_VAR, args.clone())?;

    let names = TaggedHandle::name_registry(&params.names);
    set_global(lua, NAMES_VAR, names.clone())?;

    debug!("injected extension globals");
    Ok(Published { selfp, args, names })
}

fn set_global<'lua, V: IntoLua<'lua>>(lua: &'lua Lua, name: &'static str, value: V) -> Result<()> {
    lua.globals()
        .set(name, value)
        .map_err(|source| injection(name, source))
}

fn injection(name: &'static str, source: mlua::Error) -> ExtError {
    ExtError::Injection { name, source }
}

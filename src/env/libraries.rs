//! Library loading: capability tiers, host callables, then extensions.

use std::rc::Rc;

use mlua::{Function, Lua, Value};
use tracing::debug;

use crate::env::environment::ExtParams;
use crate::env::globals::{
    EVAL_FUNC, IMPORT_STYLESHEET_FUNC, INCLUDE_FILE_FUNC, REQUIRE_RERUN_FUNC, STYLER_REGISTRY_KEY,
};
use crate::env::handle::{resolve_registry, HandleKind};
use crate::env::rerun::rerun_request;
use crate::env::tiers::load_tiers;
use crate::error::{guest_fatal, ExtError, Result};

/// Populate `lua` with everything the sandbox level permits.
///
/// Library and host-callable failures abort construction. Extension loader failures
/// are passed through unchanged inside [`ExtError::ExtensionLoad`].
pub(crate) fn load_libraries(lua: &Lua, params: &ExtParams) -> Result<()> {
    load_tiers(lua, params.config.sandbox)?;
    register_host_functions(lua, params)?;

    debug!("loading extensions");
    params
        .loader
        .load_extensions(lua, params)
        .map_err(ExtError::ExtensionLoad)
}

fn register_host_functions(lua: &Lua, params: &ExtParams) -> Result<()> {
    let document = Rc::clone(&params.document);
    register(
        lua,
        EVAL_FUNC,
        lua.create_function(move |lua, node: Value| document.eval_tree(lua, node)),
    )?;

    register(
        lua,
        IMPORT_STYLESHEET_FUNC,
        lua.create_function(|lua, sheet: String| {
            let handle = resolve_registry(lua, STYLER_REGISTRY_KEY, HandleKind::Styler)?
                .ok_or_else(|| guest_fatal("styler is no longer available"))?;
            let styler = handle.as_styler().map_err(|e| guest_fatal(e.to_string()))?;
            styler
                .import_stylesheet(&sheet)
                .map_err(|e| guest_fatal(format!("failed to import stylesheet {}: {}", sheet, e)))
        }),
    )?;

    register(
        lua,
        REQUIRE_RERUN_FUNC,
        rerun_request(lua, Rc::clone(&params.warnings)),
    )?;

    let document = Rc::clone(&params.document);
    register(
        lua,
        INCLUDE_FILE_FUNC,
        lua.create_function(move |lua, path: String| document.include_file(lua, &path)),
    )?;

    Ok(())
}

fn register<'lua>(
    lua: &'lua Lua,
    name: &'static str,
    func: mlua::Result<Function<'lua>>,
) -> Result<()> {
    func.and_then(|f| lua.globals().set(name, f))
        .map_err(|source| ExtError::HostFunction { name, source })
}

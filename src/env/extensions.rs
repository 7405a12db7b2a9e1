//! Loading document-authored and distributed extension code.

use std::fs;
use std::path::PathBuf;

use mlua::Lua;
use tracing::debug;

use crate::env::environment::ExtParams;
use crate::error::ExtError;

/// Registers extension code into a freshly populated runtime.
///
/// Called once per environment, after every permitted library and host callable is
/// in place.
pub trait ExtensionLoader {
    fn load_extensions(&self, lua: &Lua, params: &ExtParams) -> anyhow::Result<()>;
}

/// Loads nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExtensions;

impl ExtensionLoader for NoExtensions {
    fn load_extensions(&self, _lua: &Lua, _params: &ExtParams) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Loads each extension named in the document arguments from the extension path.
///
/// An extension `name` resolves to the first of `name` or `name.lua` found relative to
/// the document's directory and then along the search path. Each chunk is called
/// with a table of the `name=value` extension arguments as its sole argument.
#[derive(Debug, Default, Clone)]
pub struct SearchPathLoader {
    origin: Option<PathBuf>,
}

impl SearchPathLoader {
    /// Search relative to the input file's directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Search relative to `origin` instead of the input file's directory.
    pub fn with_origin(origin: impl Into<PathBuf>) -> Self {
        Self {
            origin: Some(origin.into()),
        }
    }

    fn locate(&self, params: &ExtParams, name: &str) -> Result<PathBuf, ExtError> {
        let path = params.args.extension_path();
        let origin = self.origin.clone().unwrap_or_else(|| params.args.origin());
        [name.to_owned(), format!("{}.lua", name)]
            .iter()
            .find_map(|target| path.find(&origin, target).ok())
            .ok_or_else(|| ExtError::ExtensionNotFound {
                name: name.to_owned(),
                path: path.to_string(),
            })
    }
}

impl ExtensionLoader for SearchPathLoader {
    fn load_extensions(&self, lua: &Lua, params: &ExtParams) -> anyhow::Result<()> {
        for name in params.args.extensions() {
            let source_path = self.locate(params, name)?;
            let source = fs::read_to_string(&source_path).map_err(ExtError::Io)?;
            debug!(extension = %name, path = %source_path.display(), "loading extension");

            let ext_args = lua.create_table()?;
            for arg in params.args.extension_args() {
                ext_args.set(arg.name(), arg.value())?;
            }
            lua.load(source.as_str())
                .set_name(format!("@{}", source_path.display()))
                .call::<_, ()>(ext_args)
                .map_err(|e| anyhow::anyhow!("extension {}: {}", name, e))?;
        }
        Ok(())
    }
}

//! Shared host doubles for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use lua_ext_env::prelude::*;
use mlua::{Lua, Value};

/// A styler which records imported stylesheets.
#[derive(Default)]
pub struct SheetStyler {
    pub sheets: RefCell<Vec<String>>,
}

impl Styler for SheetStyler {
    fn import_stylesheet(&self, sheet: &str) -> anyhow::Result<()> {
        self.sheets.borrow_mut().push(sheet.to_owned());
        Ok(())
    }
}

/// A document whose trees evaluate to their length and whose files are their names.
pub struct EchoDocument;

impl DocumentHost for EchoDocument {
    fn eval_tree<'lua>(&self, _lua: &'lua Lua, node: Value<'lua>) -> mlua::Result<Value<'lua>> {
        match node {
            Value::Table(t) => Ok(Value::Integer(t.raw_len() as i64)),
            other => Ok(other),
        }
    }

    fn include_file<'lua>(&self, lua: &'lua Lua, path: &str) -> mlua::Result<Value<'lua>> {
        Ok(Value::String(lua.create_string(format!("included:{}", path))?))
    }
}

/// Host-owned collaborators which must outlive any environment built from them.
pub struct Host {
    pub styler: Rc<SheetStyler>,
    pub args: Rc<DocArgs>,
    pub names: Rc<NameRegistry>,
}

impl Host {
    pub fn new() -> Self {
        Self {
            styler: Rc::new(SheetStyler::default()),
            args: Rc::new(DocArgs::new()),
            names: Rc::new(NameRegistry::new()),
        }
    }

    pub fn params(&self, config: EnvConfig) -> ExtParams {
        ExtParams::new(
            config,
            self.styler.clone(),
            Rc::clone(&self.args),
            Rc::clone(&self.names),
        )
    }

    pub fn env(&self, sandbox: SandboxLevel) -> ExtensionEnv {
        let params = self.params(EnvConfig::builder().sandbox(sandbox).build());
        ExtensionEnv::new(&params).unwrap()
    }
}

/// Whether `name` is bound to anything in the environment's globals.
pub fn has_global(env: &ExtensionEnv, name: &str) -> bool {
    !matches!(
        env.lua().globals().get::<_, Value>(name).unwrap(),
        Value::Nil
    )
}

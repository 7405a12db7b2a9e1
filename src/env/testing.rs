//! Test doubles for the host collaborators.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mlua::Lua;

use crate::env::args::DocArgs;
use crate::env::config::EnvConfig;
use crate::env::environment::ExtParams;
use crate::env::host::{NameRegistry, Styler, WarnOutcome, WarningSink};

#[derive(Default)]
pub(crate) struct RecordingStyler {
    pub provided: Cell<u32>,
    pub revoked: Cell<u32>,
    pub sheets: RefCell<Vec<String>>,
}

impl Styler for RecordingStyler {
    fn provide(&self, _lua: &Lua) -> anyhow::Result<()> {
        self.provided.set(self.provided.get() + 1);
        Ok(())
    }

    fn revoke(&self, _lua: &Lua) -> anyhow::Result<()> {
        self.revoked.set(self.revoked.get() + 1);
        Ok(())
    }

    fn import_stylesheet(&self, sheet: &str) -> anyhow::Result<()> {
        if sheet == "missing" {
            anyhow::bail!("no such stylesheet");
        }
        self.sheets.borrow_mut().push(sheet.to_owned());
        Ok(())
    }
}

pub(crate) struct RecordingWarnings {
    fatal: bool,
    messages: RefCell<Vec<String>>,
}

impl RecordingWarnings {
    pub fn new(fatal: bool) -> Self {
        Self {
            fatal,
            messages: RefCell::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl WarningSink for RecordingWarnings {
    fn warn(&self, message: &str) -> WarnOutcome {
        self.messages.borrow_mut().push(message.to_owned());
        if self.fatal {
            WarnOutcome::Fatal
        } else {
            WarnOutcome::Continue
        }
    }
}

pub(crate) fn params(config: EnvConfig) -> ExtParams {
    params_with(
        config,
        Rc::new(RecordingStyler::default()),
        Rc::new(DocArgs::new()),
        Rc::new(NameRegistry::new()),
    )
}

pub(crate) fn params_with(
    config: EnvConfig,
    styler: Rc<dyn Styler>,
    args: Rc<DocArgs>,
    names: Rc<NameRegistry>,
) -> ExtParams {
    ExtParams::new(config, styler, args, names)
}

//! Extension environments: one sandboxed Lua state per document run.

use std::cell::Cell;
use std::rc::Rc;

use mlua::{Lua, LuaOptions, StdLib};
use tracing::debug;

use crate::env::args::DocArgs;
use crate::env::config::{EnvConfig, SandboxLevel};
use crate::env::extensions::{ExtensionLoader, NoExtensions};
use crate::env::globals::{self, ITER_VAR, STYLER_REGISTRY_KEY};
use crate::env::handle::TaggedHandle;
use crate::env::host::{DocumentHost, NameRegistry, NoDocument, Styler, TracingWarnings, WarningSink};
use crate::env::libraries::load_libraries;
use crate::env::limits::{self, InstructionBudget};
use crate::error::{ExtError, Result};

/// Pass bookkeeping shared between the host and the rerun callable.
#[derive(Debug)]
pub struct EnvState {
    iteration: Cell<u32>,
    rerun: Cell<bool>,
    started: Cell<bool>,
}

impl EnvState {
    pub(crate) fn new() -> Self {
        Self {
            iteration: Cell::new(0),
            rerun: Cell::new(true),
            started: Cell::new(false),
        }
    }

    /// Index of the current pass.
    pub fn iteration(&self) -> u32 {
        self.iteration.get()
    }

    /// Whether another pass has been requested.
    pub fn requires_rerun(&self) -> bool {
        self.rerun.get()
    }

    pub(crate) fn request_rerun(&self) {
        self.rerun.set(true);
    }

    fn begin_pass(&self) -> u32 {
        if self.started.replace(true) {
            self.iteration.set(self.iteration.get() + 1);
        }
        self.rerun.set(false);
        self.iteration.get()
    }
}

/// Everything needed to construct an [`ExtensionEnv`].
///
/// The styler, arguments and name registry are owned by the host. An environment
/// only keeps weak references to them, so they must outlive every pass that uses
/// them.
pub struct ExtParams {
    /// Sandbox level and resource limits.
    pub config: EnvConfig,
    /// Styler provided at creation and revoked at output.
    pub styler: Rc<dyn Styler>,
    /// Parsed document and extension arguments.
    pub args: Rc<DocArgs>,
    /// Name registry shared with the host.
    pub names: Rc<NameRegistry>,
    /// Target of `eval` and `include`.
    pub document: Rc<dyn DocumentHost>,
    /// Runs once all host callables are registered.
    pub loader: Box<dyn ExtensionLoader>,
    /// Receives warnings raised by guest calls.
    pub warnings: Rc<dyn WarningSink>,
}

impl ExtParams {
    /// Parameters with no document, no extensions and `tracing` warnings.
    pub fn new(
        config: EnvConfig,
        styler: Rc<dyn Styler>,
        args: Rc<DocArgs>,
        names: Rc<NameRegistry>,
    ) -> Self {
        let warnings = Rc::new(TracingWarnings::new(config.fatal_warnings));
        Self {
            config,
            styler,
            args,
            names,
            document: Rc::new(NoDocument),
            loader: Box::new(NoExtensions),
            warnings,
        }
    }

    /// Set the document host.
    pub fn with_document(mut self, document: Rc<dyn DocumentHost>) -> Self {
        self.document = document;
        self
    }

    /// Set the extension loader.
    pub fn with_loader(mut self, loader: impl ExtensionLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Set the warning sink.
    pub fn with_warnings(mut self, warnings: Rc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }
}

struct EnvHandles {
    names: TaggedHandle,
    args: TaggedHandle,
    selfp: TaggedHandle,
    styler: Option<TaggedHandle>,
}

/// A sandboxed Lua state with the pipeline's globals and callables installed.
pub struct ExtensionEnv {
    // Must drop before the handles.
    lua: Lua,
    state: Rc<EnvState>,
    budget: Option<Rc<InstructionBudget>>,
    handles: EnvHandles,
    sandbox: SandboxLevel,
}

impl ExtensionEnv {
    /// Create an environment, load permitted libraries and run the extension loader.
    ///
    /// The rerun flag starts set so that the driver runs at least one pass.
    pub fn new(params: &ExtParams) -> Result<Self> {
        let sandbox = params.config.sandbox;
        let lua = new_runtime(sandbox)?;
        let state = Rc::new(EnvState::new());
        debug!(%sandbox, "creating extension environment");

        let styler = TaggedHandle::styler(&params.styler);
        lua.set_named_registry_value(STYLER_REGISTRY_KEY, styler.clone())
            .map_err(|source| ExtError::Injection {
                name: STYLER_REGISTRY_KEY,
                source,
            })?;
        params.styler.provide(&lua).map_err(ExtError::Styler)?;

        let published = globals::inject(&lua, &state, params)?;
        let budget = limits::apply_limits(&lua, &params.config)?;
        load_libraries(&lua, params)?;

        Ok(Self {
            lua,
            state,
            budget,
            handles: EnvHandles {
                names: published.names,
                args: published.args,
                selfp: published.selfp,
                styler: Some(styler),
            },
            sandbox,
        })
    }

    /// Detach the styler once styling is complete.
    ///
    /// The environment stays usable; guest calls to import stylesheets fail from
    /// here on. Calling this again does nothing.
    pub fn finalize_for_output(&mut self) -> Result<()> {
        let Some(handle) = self.handles.styler.take() else {
            return Ok(());
        };
        self.lua.unset_named_registry_value(STYLER_REGISTRY_KEY)?;
        if let Ok(styler) = handle.as_styler() {
            styler.revoke(&self.lua).map_err(ExtError::Styler)?;
        }
        debug!("styler revoked");
        Ok(())
    }

    /// Close the runtime and release every handle this environment published.
    pub fn destroy(self) {
        let Self {
            lua,
            state,
            budget,
            handles,
            ..
        } = self;
        drop(lua);
        drop(budget);
        drop(handles.names);
        drop(handles.args);
        drop(handles.selfp);
        drop(handles.styler);
        drop(state);
        debug!("extension environment destroyed");
    }

    /// Start a pass: clear the rerun flag and publish the new pass index.
    ///
    /// The first call starts pass 0; each later call advances the index by one.
    pub fn begin_pass(&self) -> Result<u32> {
        let iteration = self.state.begin_pass();
        self.lua.globals().set(ITER_VAR, iteration)?;
        if let Some(budget) = &self.budget {
            budget.reset();
            limits::arm(&self.lua, budget);
        }
        debug!(iteration, "beginning pass");
        Ok(iteration)
    }

    /// Run a chunk of guest code.
    ///
    /// Once the pass's instruction budget is spent, each later chunk stops at its
    /// next budget check.
    pub fn exec(&self, chunk: &str, name: &str) -> Result<()> {
        let result = self.lua.load(chunk).set_name(name).exec();
        if let Some(budget) = self.budget.as_ref().filter(|b| b.exhausted()) {
            limits::arm(&self.lua, budget);
        }
        result.map_err(limits::classify)
    }

    /// The underlying Lua state.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Sandbox level this environment was built with.
    pub fn sandbox(&self) -> SandboxLevel {
        self.sandbox
    }

    /// Index of the current pass.
    pub fn iteration(&self) -> u32 {
        self.state.iteration()
    }

    /// Whether guest code asked for another pass.
    pub fn requires_rerun(&self) -> bool {
        self.state.requires_rerun()
    }

    /// Handle published as `_em_env`.
    pub fn self_handle(&self) -> &TaggedHandle {
        &self.handles.selfp
    }

    /// The styler handle, until [`finalize_for_output`](Self::finalize_for_output).
    pub fn styler_handle(&self) -> Option<&TaggedHandle> {
        self.handles.styler.as_ref()
    }

    /// Handle published as `_em_args`.
    pub fn args_handle(&self) -> &TaggedHandle {
        &self.handles.args
    }

    /// Handle published as `_em_mt_names`.
    pub fn names_handle(&self) -> &TaggedHandle {
        &self.handles.names
    }

    /// The per-pass instruction budget, if a limit is configured.
    pub fn instruction_budget(&self) -> Option<&InstructionBudget> {
        self.budget.as_deref()
    }
}

fn new_runtime(sandbox: SandboxLevel) -> Result<Lua> {
    if sandbox.requires_unsafe_runtime() {
        // SAFETY: only reachable by explicitly choosing the unsound level, which
        // exists to expose the debug library.
        Ok(unsafe { Lua::unsafe_new_with(StdLib::NONE, LuaOptions::new()) })
    } else {
        Lua::new_with(StdLib::NONE, LuaOptions::new()).map_err(ExtError::RuntimeInit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::globals::*;
    use crate::env::handle::{resolve_global, HandleKind};
    use crate::env::testing::{params, params_with, RecordingStyler, RecordingWarnings};
    use crate::error::{INVALID_INTERNAL_VALUE, WARNINGS_ARE_FATAL};
    use crate::node_types::ContentType;
    use mlua::{Table, Value};

    const ALL_LEVELS: [SandboxLevel; 4] = [
        SandboxLevel::Unsound,
        SandboxLevel::Unrestricted,
        SandboxLevel::Standard,
        SandboxLevel::Strict,
    ];

    fn env_at(sandbox: SandboxLevel) -> (ExtParams, ExtensionEnv) {
        let p = params(EnvConfig::builder().sandbox(sandbox).build());
        let env = ExtensionEnv::new(&p).unwrap();
        (p, env)
    }

    #[test]
    fn test_fresh_env_forces_first_pass() {
        for sandbox in ALL_LEVELS {
            let (_p, env) = env_at(sandbox);
            assert!(env.requires_rerun(), "{}", sandbox);
            assert_eq!(env.iteration(), 0);
            assert_eq!(env.sandbox(), sandbox);
        }
    }

    #[test]
    fn test_globals_injected() {
        let (_p, env) = env_at(SandboxLevel::Strict);
        let globals = env.lua().globals();

        assert_eq!(globals.get::<_, i64>(ITER_VAR).unwrap(), 0);
        for (name, kind) in [
            (ENV_VAR, HandleKind::ExtEnv),
            (ARGS_VAR, HandleKind::ParsedArgs),
            (NAMES_VAR, HandleKind::NameRegistry),
        ] {
            let handle = resolve_global(env.lua(), name, kind).unwrap();
            assert_eq!(handle.kind(), kind);
        }
        for func in [EVAL_FUNC, IMPORT_STYLESHEET_FUNC, REQUIRE_RERUN_FUNC, INCLUDE_FILE_FUNC] {
            assert!(matches!(globals.get::<_, Value>(func).unwrap(), Value::Function(_)));
        }
    }

    #[test]
    fn test_node_types_table() {
        let (_p, env) = env_at(SandboxLevel::Strict);
        let table: Table = env.lua().globals().get(NODE_TYPES_TABLE).unwrap();

        let mut entries = 0;
        for pair in table.pairs::<String, usize>() {
            let (name, ordinal) = pair.unwrap();
            assert_eq!(ContentType::from_name(&name).map(ContentType::ordinal), Some(ordinal));
            entries += 1;
        }
        assert_eq!(entries, ContentType::ALL.len());
    }

    #[test]
    fn test_self_handle_resolves_to_same_env() {
        let (_p, env) = env_at(SandboxLevel::Standard);
        let from_guest = resolve_global(env.lua(), ENV_VAR, HandleKind::ExtEnv)
            .unwrap()
            .as_env()
            .unwrap();
        let from_host = env.self_handle().as_env().unwrap();
        assert!(Rc::ptr_eq(&from_guest, &from_host));
    }

    #[test]
    fn test_handles_reference_host_data() {
        let args = Rc::new(DocArgs::new().with_extension("toc"));
        let names = Rc::new(NameRegistry::new());
        let p = params_with(
            EnvConfig::default(),
            Rc::new(RecordingStyler::default()),
            Rc::clone(&args),
            Rc::clone(&names),
        );
        let env = ExtensionEnv::new(&p).unwrap();

        assert!(Rc::ptr_eq(&env.args_handle().as_args().unwrap(), &args));
        assert!(Rc::ptr_eq(&env.names_handle().as_names().unwrap(), &names));
        assert_eq!(Rc::strong_count(&args), 2);
    }

    #[test]
    fn test_rerun_request_sets_flag() {
        let (_p, env) = env_at(SandboxLevel::Strict);
        assert_eq!(env.begin_pass().unwrap(), 0);
        assert!(!env.requires_rerun());

        env.exec("requires_reiter()", "rerun").unwrap();
        assert!(env.requires_rerun());

        let returned: mlua::Variadic<Value> =
            env.lua().load("return requires_reiter()").eval().unwrap();
        assert!(returned.is_empty());
    }

    #[test]
    fn test_rerun_request_with_args_warns() {
        let warnings = Rc::new(RecordingWarnings::new(false));
        let p = params(EnvConfig::default()).with_warnings(warnings.clone());
        let env = ExtensionEnv::new(&p).unwrap();
        env.begin_pass().unwrap();

        env.exec("requires_reiter(1, 'two')", "rerun").unwrap();
        assert!(env.requires_rerun());
        assert_eq!(
            warnings.messages(),
            vec!["Arguments to requires_reiter are ignored".to_owned()]
        );
    }

    #[test]
    fn test_rerun_request_with_args_fatal() {
        let warnings = Rc::new(RecordingWarnings::new(true));
        let p = params(EnvConfig::default()).with_warnings(warnings.clone());
        let env = ExtensionEnv::new(&p).unwrap();
        env.begin_pass().unwrap();

        let err = env.exec("requires_reiter(true)", "rerun").unwrap_err();
        assert!(err.is_script());
        assert!(err.to_string().contains(WARNINGS_ARE_FATAL), "{}", err);
        assert!(!env.requires_rerun());
        assert_eq!(warnings.messages().len(), 1);
    }

    #[test]
    fn test_fatal_warnings_from_config() {
        let p = params(EnvConfig::builder().fatal_warnings(true).build());
        let env = ExtensionEnv::new(&p).unwrap();
        env.begin_pass().unwrap();
        assert!(env.exec("requires_reiter(1)", "rerun").is_err());
        assert!(!env.requires_rerun());
    }

    #[test]
    fn test_rerun_rejects_foreign_handle() {
        let (_p, env) = env_at(SandboxLevel::Standard);
        env.begin_pass().unwrap();

        for replacement in ["_em_args", "_em_mt_names", "42", "nil", "{}"] {
            env.exec(&format!("_em_env = {}", replacement), "tamper").unwrap();
            let err = env.exec("requires_reiter()", "rerun").unwrap_err();
            assert!(err.to_string().contains(INVALID_INTERNAL_VALUE), "{}", err);
            assert!(!env.requires_rerun());
        }
    }

    #[test]
    fn test_guest_error_leaves_env_usable() {
        let (_p, env) = env_at(SandboxLevel::Standard);
        env.begin_pass().unwrap();

        let caught: bool = env
            .lua()
            .load("local saved = _em_env; _em_env = 1; local ok = pcall(requires_reiter); _em_env = saved; return ok")
            .eval()
            .unwrap();
        assert!(!caught);
        assert!(!env.requires_rerun());

        env.exec("requires_reiter()", "rerun").unwrap();
        assert!(env.requires_rerun());
    }

    #[test]
    fn test_begin_pass_advances_iteration() {
        let (_p, env) = env_at(SandboxLevel::Strict);
        assert_eq!(env.begin_pass().unwrap(), 0);
        assert_eq!(env.begin_pass().unwrap(), 1);
        assert_eq!(env.begin_pass().unwrap(), 2);
        assert_eq!(env.iteration(), 2);
        assert_eq!(env.lua().globals().get::<_, u32>(ITER_VAR).unwrap(), 2);
    }

    #[test]
    fn test_styler_lifecycle() {
        let styler = Rc::new(RecordingStyler::default());
        let p = params_with(
            EnvConfig::default(),
            styler.clone(),
            Rc::new(DocArgs::new()),
            Rc::new(NameRegistry::new()),
        );
        let mut env = ExtensionEnv::new(&p).unwrap();
        assert_eq!(styler.provided.get(), 1);
        assert!(env.styler_handle().is_some());

        env.exec("stylesheet('article')", "style").unwrap();
        assert_eq!(styler.sheets.borrow().as_slice(), ["article".to_owned()]);

        env.finalize_for_output().unwrap();
        env.finalize_for_output().unwrap();
        assert_eq!(styler.revoked.get(), 1);
        assert!(env.styler_handle().is_none());

        let err = env.exec("stylesheet('late')", "style").unwrap_err();
        assert!(err.to_string().contains("styler is no longer available"), "{}", err);

        env.exec("requires_reiter()", "rerun").unwrap();
    }

    #[test]
    fn test_stylesheet_failure_is_guest_visible() {
        let (_p, env) = env_at(SandboxLevel::Standard);
        let err = env.exec("stylesheet('missing')", "style").unwrap_err();
        assert!(err.to_string().contains("failed to import stylesheet missing"), "{}", err);
    }

    #[test]
    fn test_destroy_releases_handles() {
        let (_p, env) = env_at(SandboxLevel::Standard);
        let selfp = env.self_handle().clone();
        let styler = env.styler_handle().cloned().unwrap();
        assert!(selfp.is_live());

        env.destroy();
        assert!(!selfp.is_live());
        assert!(matches!(
            selfp.as_env(),
            Err(ExtError::DanglingHandle(HandleKind::ExtEnv))
        ));
        assert!(styler.is_live());
    }

    #[test]
    fn test_extension_loader_error_propagates() {
        struct Failing;
        impl ExtensionLoader for Failing {
            fn load_extensions(&self, _lua: &Lua, _params: &ExtParams) -> anyhow::Result<()> {
                anyhow::bail!("bad extension")
            }
        }

        let p = params(EnvConfig::default()).with_loader(Failing);
        let err = ExtensionEnv::new(&p).err().unwrap();
        assert!(err.is_extension_load());
        if let ExtError::ExtensionLoad(inner) = err {
            assert_eq!(inner.to_string(), "bad extension");
        }
    }

    #[test]
    fn test_extensions_see_host_callables() {
        struct Inspector;
        impl ExtensionLoader for Inspector {
            fn load_extensions(&self, lua: &Lua, _params: &ExtParams) -> anyhow::Result<()> {
                lua.load("assert(type(requires_reiter) == 'function'); seen_iter = em_iter")
                    .exec()?;
                Ok(())
            }
        }

        let p = params(EnvConfig::default()).with_loader(Inspector);
        let env = ExtensionEnv::new(&p).unwrap();
        assert_eq!(env.lua().globals().get::<_, i64>("seen_iter").unwrap(), 0);
    }

    #[test]
    fn test_instruction_limit_per_pass() {
        let p = params(EnvConfig::builder().instruction_limit(50_000).build());
        let env = ExtensionEnv::new(&p).unwrap();
        env.begin_pass().unwrap();

        let err = env.exec("while true do end", "spin").unwrap_err();
        assert!(err.is_instruction_limit(), "{}", err);

        env.begin_pass().unwrap();
        assert!(!env.instruction_budget().unwrap().exhausted());
        env.exec("local x = 0 for i = 1, 100 do x = x + i end", "sum").unwrap();
    }

    #[test]
    fn test_script_error_after_spent_budget() {
        let p = params(EnvConfig::builder().instruction_limit(50_000).build());
        let env = ExtensionEnv::new(&p).unwrap();
        env.begin_pass().unwrap();

        assert!(env.exec("while true do end", "spin").unwrap_err().is_instruction_limit());
        assert!(env.instruction_budget().unwrap().exhausted());

        let err = env.exec("error('x')", "fail").unwrap_err();
        assert!(err.is_script(), "{}", err);
        assert!(env.exec("while true do end", "spin").unwrap_err().is_instruction_limit());
    }

    #[test]
    fn test_memory_limit() {
        let p = params(EnvConfig::builder().max_memory(2 * 1024 * 1024).build());
        let env = ExtensionEnv::new(&p).unwrap();
        let err = env
            .exec("local t = {} for i = 1, 1e8 do t[i] = i end", "hog")
            .unwrap_err();
        assert!(err.is_memory_limit(), "{}", err);
    }
}

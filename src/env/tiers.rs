//! Capability tiers over the Lua standard library.
//!
//! The table is ordered from most to least widely available. A tier is active when
//! the sandbox level does not exceed its maximum, so lowering the level only ever
//! adds capabilities.

use mlua::{Lua, StdLib, Value};
use tracing::debug;

use crate::env::config::SandboxLevel;
use crate::error::{ExtError, Result};

/// A standard library which may be exposed to guest code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Library {
    Base,
    Coroutine,
    Table,
    String,
    Utf8,
    Math,
    Package,
    Io,
    Os,
    Debug,
}

impl Library {
    /// Global under which the library appears once loaded.
    pub fn global_name(self) -> &'static str {
        match self {
            Library::Base => "_G",
            Library::Coroutine => "coroutine",
            Library::Table => "table",
            Library::String => "string",
            Library::Utf8 => "utf8",
            Library::Math => "math",
            Library::Package => "package",
            Library::Io => "io",
            Library::Os => "os",
            Library::Debug => "debug",
        }
    }

    /// Runtime flag for this library.
    ///
    /// The base library is opened with every state, so it maps to no flag.
    pub fn std_lib(self) -> StdLib {
        match self {
            Library::Base => StdLib::NONE,
            Library::Coroutine => StdLib::COROUTINE,
            Library::Table => StdLib::TABLE,
            Library::String => StdLib::STRING,
            Library::Utf8 => StdLib::UTF8,
            Library::Math => StdLib::MATH,
            Library::Package => StdLib::PACKAGE,
            Library::Io => StdLib::IO,
            Library::Os => StdLib::OS,
            Library::Debug => StdLib::DEBUG,
        }
    }
}

/// One row of the capability table.
#[derive(Debug)]
pub struct CapabilityTier {
    /// Highest sandbox level at which this tier is loaded.
    pub max_level: i8,
    /// Libraries loaded with this tier.
    pub libraries: &'static [Library],
    /// Base-library globals which only exist while this tier is active.
    pub guarded_globals: &'static [&'static str],
}

impl CapabilityTier {
    /// Whether this tier is loaded at `sandbox`.
    pub fn is_active(&self, sandbox: SandboxLevel) -> bool {
        sandbox.level() <= self.max_level
    }

    fn std_libs(&self) -> StdLib {
        self.libraries
            .iter()
            .fold(StdLib::NONE, |libs, lib| libs | lib.std_lib())
    }
}

/// The capability table, most widely available tier first.
pub static CAPABILITY_TIERS: &[CapabilityTier] = &[
    CapabilityTier {
        max_level: 2,
        libraries: &[
            Library::Base,
            Library::Coroutine,
            Library::Table,
            Library::String,
            Library::Utf8,
            Library::Math,
        ],
        guarded_globals: &[],
    },
    CapabilityTier {
        max_level: 1,
        libraries: &[Library::Package, Library::Io],
        guarded_globals: &["dofile", "loadfile"],
    },
    CapabilityTier {
        max_level: 0,
        libraries: &[Library::Os],
        guarded_globals: &[],
    },
    CapabilityTier {
        max_level: -1,
        libraries: &[Library::Debug],
        guarded_globals: &[],
    },
];

/// Libraries guest code receives at the given sandbox level.
pub fn permitted_libraries(sandbox: SandboxLevel) -> impl Iterator<Item = Library> {
    CAPABILITY_TIERS
        .iter()
        .filter(move |tier| tier.is_active(sandbox))
        .flat_map(|tier| tier.libraries.iter().copied())
}

/// Load every active tier into `lua` and strip globals guarded by inactive ones.
pub(crate) fn load_tiers(lua: &Lua, sandbox: SandboxLevel) -> Result<()> {
    let globals = lua.globals();
    for tier in CAPABILITY_TIERS {
        if tier.is_active(sandbox) {
            debug!(tier = tier.max_level, libraries = ?tier.libraries, "loading library tier");
            lua.load_from_std_lib(tier.std_libs())
                .map_err(|source| ExtError::LibraryLoad {
                    tier: tier.max_level,
                    source,
                })?;
        } else {
            for name in tier.guarded_globals {
                globals
                    .raw_set(*name, Value::Nil)
                    .map_err(|source| ExtError::LibraryLoad {
                        tier: tier.max_level,
                        source,
                    })?;
            }
        }
    }
    Ok(())
}

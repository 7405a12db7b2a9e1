//! Parsed document arguments shared with extension environments.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::env::search_path::SearchPath;

/// A `name=value` argument destined for extension code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtArg {
    name: String,
    value: String,
}

impl ExtArg {
    /// Create an argument from its name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The argument name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The argument value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl FromStr for ExtArg {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.split_once('=') {
            Some(("", _)) => Err(format!("need argument name in {:?}", raw)),
            Some((name, value)) => Ok(Self::new(name, value)),
            None => Err(format!("need a value in {:?}", raw)),
        }
    }
}

impl fmt::Display for ExtArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Document and command arguments, read-only once an environment exists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocArgs {
    input_file: Option<PathBuf>,
    extensions: Vec<String>,
    extension_args: Vec<ExtArg>,
    extension_path: SearchPath,
}

impl DocArgs {
    /// Arguments with no input file, extensions or search path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the document being processed.
    pub fn with_input_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.input_file = Some(file.into());
        self
    }

    /// Request that an extension be loaded.
    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    /// Add a `name=value` argument passed to every extension.
    pub fn with_extension_arg(mut self, arg: ExtArg) -> Self {
        self.extension_args.push(arg);
        self
    }

    /// Set the path searched for extensions.
    pub fn with_extension_path(mut self, path: SearchPath) -> Self {
        self.extension_path = path;
        self
    }

    /// The document being processed, if any.
    pub fn input_file(&self) -> Option<&Path> {
        self.input_file.as_deref()
    }

    /// Extensions to load, in order.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Arguments passed to every extension.
    pub fn extension_args(&self) -> &[ExtArg] {
        &self.extension_args
    }

    /// Path searched for extensions.
    pub fn extension_path(&self) -> &SearchPath {
        &self.extension_path
    }

    /// Directory extensions are looked up relative to before the search path.
    pub fn origin(&self) -> PathBuf {
        self.input_file
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

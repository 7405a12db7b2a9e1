//! Colon-separated search paths for locating extension sources.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// An ordered list of directories to search.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Directories in search order.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Locate `target`, first relative to `origin` and then along each directory.
    ///
    /// Absolute targets are rejected. A candidate only matches if, once symlinks
    /// and `..` are resolved, it is a regular file still inside the directory it was
    /// found from.
    pub fn find(&self, origin: impl AsRef<Path>, target: impl AsRef<Path>) -> io::Result<PathBuf> {
        let target = target.as_ref();
        if target.is_absolute() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("absolute paths are forbidden: got {:?}", target),
            ));
        }

        let roots = std::iter::once(origin.as_ref().to_path_buf()).chain(self.dirs.iter().cloned());
        for root in roots {
            let Ok(root) = root.canonicalize() else {
                continue;
            };
            let Ok(candidate) = root.join(target).canonicalize() else {
                continue;
            };
            if candidate.starts_with(&root) && candidate.is_file() {
                return Ok(candidate);
            }
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("could not find {:?} along path \"{}\"", target, self),
        ))
    }
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self
            .dirs
            .iter()
            .map(|d| d.to_string_lossy().into_owned())
            .collect();
        f.write_str(&joined.join(":"))
    }
}

impl From<&str> for SearchPath {
    fn from(raw: &str) -> Self {
        Self {
            dirs: raw
                .split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect(),
        }
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for SearchPath {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            dirs: iter.into_iter().map(Into::into).collect(),
        }
    }
}

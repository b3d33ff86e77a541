//! Maps plugin names to executables on the plugin search path.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use age_agent_protocol::{PluginName, RejectReason};

const RESOLVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::resolver");
const EXECUTE_BITS: u32 = 0o111;

/// Errors raised while locating a plugin binary.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No file named `age-plugin-<name>` exists in any search directory.
    #[error("plugin not found: {name}")]
    NotFound {
        /// Requested plugin name.
        name: String,
    },
    /// A matching file exists but no execute bit is set.
    #[error("plugin not executable: {}", path.display())]
    NotExecutable {
        /// First non-executable candidate.
        path: PathBuf,
    },
    /// A candidate exists but its metadata could not be read.
    #[error("failed to inspect plugin candidate {}: {source}", path.display())]
    Metadata {
        /// Candidate path.
        path: PathBuf,
        /// Underlying metadata failure.
        #[source]
        source: io::Error,
    },
}

impl ResolveError {
    /// Converts the failure into the reason reported to the client.
    #[must_use]
    pub fn reject_reason(&self, name: &PluginName) -> RejectReason {
        match self {
            Self::NotFound { name } => RejectReason::NotFound { name: name.clone() },
            Self::NotExecutable { path } => RejectReason::NotExecutable { path: path.clone() },
            Self::Metadata { .. } => RejectReason::NotFound {
                name: name.as_str().to_owned(),
            },
        }
    }
}

/// Looks plugin binaries up in a fixed list of directories.
///
/// The search path is captured once when the resolver is built, so changes to
/// the server's environment after startup do not affect resolution.
#[derive(Debug, Clone, Default)]
pub struct PluginResolver {
    directories: Vec<PathBuf>,
}

impl PluginResolver {
    /// Builds a resolver over a `PATH`-style list of directories.
    ///
    /// Empty entries are ignored.
    #[must_use]
    pub fn new(search_path: impl Into<OsString>) -> Self {
        let search_path = search_path.into();
        let directories = env::split_paths(&search_path)
            .filter(|directory| !directory.as_os_str().is_empty())
            .collect();
        Self { directories }
    }

    /// Builds a resolver from the current process's `PATH`.
    #[must_use]
    pub fn from_env() -> Self {
        env::var_os("PATH").map_or_else(Self::default, Self::new)
    }

    /// Directories searched, in order.
    #[must_use]
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Finds the executable for `name`.
    ///
    /// Directories are searched in order and the first executable regular
    /// file named `age-plugin-<name>` wins. When only non-executable matches
    /// exist the first one is reported.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] when no candidate exists and
    /// [`ResolveError::NotExecutable`] when candidates exist but none can be
    /// run.
    pub fn resolve(&self, name: &PluginName) -> Result<PathBuf, ResolveError> {
        let binary = name.binary_name();
        let mut not_executable = None;
        for directory in &self.directories {
            let candidate = directory.join(&binary);
            match inspect(&candidate)? {
                Candidate::Missing => {}
                Candidate::Executable => {
                    debug!(
                        target: RESOLVER_TARGET,
                        plugin = %name,
                        path = %candidate.display(),
                        "resolved plugin"
                    );
                    return Ok(candidate);
                }
                Candidate::NotExecutable => {
                    not_executable.get_or_insert(candidate);
                }
            }
        }
        Err(not_executable.map_or_else(
            || ResolveError::NotFound {
                name: name.as_str().to_owned(),
            },
            |path| ResolveError::NotExecutable { path },
        ))
    }
}

enum Candidate {
    Missing,
    Executable,
    NotExecutable,
}

fn inspect(path: &Path) -> Result<Candidate, ResolveError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
        {
            return Ok(Candidate::Missing);
        }
        Err(source) => {
            return Err(ResolveError::Metadata {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if !metadata.is_file() {
        return Ok(Candidate::Missing);
    }
    if metadata.permissions().mode() & EXECUTE_BITS == 0 {
        Ok(Candidate::NotExecutable)
    } else {
        Ok(Candidate::Executable)
    }
}

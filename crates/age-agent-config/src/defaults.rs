use std::path::Path;

use camino::Utf8PathBuf;

use crate::socket::SocketPath;

/// Environment variable overriding the agent socket path.
pub const SOCKET_ENV_VAR: &str = "AGE_PLUGIN_AGENT_SOCKET";

/// Socket file name placed in the user's home directory.
pub const SOCKET_FILE_NAME: &str = ".age-plugin-agent.sock";

/// Socket path used when the home directory cannot be determined.
pub const FALLBACK_SOCKET_PATH: &str = "/tmp/age-plugin-agent.sock";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned default log filter, used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Computes the default socket path for the given home directory.
///
/// Home directories that are not valid UTF-8 are treated as unknown.
#[must_use]
pub fn default_socket_path(home: Option<&Path>) -> Utf8PathBuf {
    home.and_then(|dir| Utf8PathBuf::from_path_buf(dir.to_path_buf()).ok())
        .map_or_else(
            || Utf8PathBuf::from(FALLBACK_SOCKET_PATH),
            |dir| dir.join(SOCKET_FILE_NAME),
        )
}

/// Default socket in the current user's home directory.
///
/// Falls back to [`FALLBACK_SOCKET_PATH`] when no usable home directory is
/// known.
#[must_use]
pub fn default_socket() -> SocketPath {
    SocketPath::from(default_socket_path(dirs::home_dir().as_deref()))
}

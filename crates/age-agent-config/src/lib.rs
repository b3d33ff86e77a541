//! Shared configuration for the age plugin agent.
//!
//! Both the server and the proxy client need to agree on where the agent
//! socket lives. [`Config`] is layered by `ortho_config` from built-in
//! defaults, an optional configuration file, `AGE_PLUGIN_AGENT_*` environment
//! variables and command-line flags, in increasing order of precedence. It is
//! resolved once in the binary entrypoint and then passed by reference into
//! every component that needs it.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Deserializer, Serialize};

mod defaults;
mod logging;
mod socket;

pub use defaults::{
    DEFAULT_LOG_FILTER, FALLBACK_SOCKET_PATH, SOCKET_ENV_VAR, SOCKET_FILE_NAME, default_log_filter,
    default_log_filter_string, default_log_format, default_socket, default_socket_path,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketPath, SocketPathError};

/// Resolved runtime configuration shared by the server and the proxy client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "AGE_PLUGIN_AGENT")]
pub struct Config {
    /// Socket the server listens on and the client dials.
    ///
    /// An empty value selects the default location.
    #[serde(default = "default_socket", deserialize_with = "socket_or_default")]
    pub socket: SocketPath,
    /// Tracing filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Config {
    /// Builds a configuration for the given socket using default log settings.
    #[must_use]
    pub fn new(socket: SocketPath) -> Self {
        Self {
            socket,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }

    /// Replaces the tracing filter expression.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Socket the server listens on and the client dials.
    #[must_use]
    pub const fn socket(&self) -> &SocketPath {
        &self.socket
    }

    /// Advisory lock file held by a running server.
    #[must_use]
    pub fn lock_path(&self) -> Utf8PathBuf {
        self.socket.lock_path()
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(default_socket())
    }
}

fn socket_or_default<'de, D>(deserializer: D) -> Result<SocketPath, D::Error>
where
    D: Deserializer<'de>,
{
    let path = Utf8PathBuf::deserialize(deserializer)?;
    if path.as_str().is_empty() {
        return Ok(default_socket());
    }
    Ok(SocketPath::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn lock_file_sits_beside_socket() {
        let config = Config::new(SocketPath::from("/run/agent.sock"));
        assert_eq!(config.lock_path().as_str(), "/run/agent.sock.lock");
    }

    #[rstest]
    fn defaults_apply_to_log_settings() {
        let config = Config::default();
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
    }

    #[rstest]
    fn log_filter_builder_replaces_field() {
        let config = Config::default().with_log_filter("debug");
        assert_eq!(config.log_filter(), "debug");
    }

    #[rstest]
    fn missing_home_uses_fallback() {
        assert_eq!(default_socket_path(None).as_str(), FALLBACK_SOCKET_PATH);
    }

    #[rstest]
    fn home_directory_hosts_socket() {
        let path = default_socket_path(Some(std::path::Path::new("/home/alice")));
        assert_eq!(path.as_str(), "/home/alice/.age-plugin-agent.sock");
    }
}

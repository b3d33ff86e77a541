//! CLI argument definitions for the agent binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use age_agent_protocol::PLUGIN_BINARY_PREFIX;

/// Name under which the binary runs its own command line instead of proxying.
pub(crate) const AGENT_BINARY_NAME: &str = "age-plugin-agent";

const CONFIG_HELP: &str = "\
Configuration flags go before the command:
  --socket <PATH>         Agent socket [env: AGE_PLUGIN_AGENT_SOCKET]
  --log-filter <FILTER>   Server log filter [env: AGE_PLUGIN_AGENT_LOG_FILTER]
  --log-format <FORMAT>   json or compact [env: AGE_PLUGIN_AGENT_LOG_FORMAT]
  --config-path <PATH>    Configuration file";

/// Command-line interface for the age plugin agent.
#[derive(Parser, Debug)]
#[command(
    name = AGENT_BINARY_NAME,
    version,
    about = "Share one running age plugin between many invocations",
    disable_help_subcommand = true,
    after_help = CONFIG_HELP
)]
pub(crate) struct Cli {
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operations offered by the agent binary.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Runs the agent server on a Unix socket.
    Server {
        /// Socket to listen on, overriding the environment and the default.
        #[arg(value_name = "SOCKET_PATH")]
        socket: Option<PathBuf>,
    },
    /// Relays stdin and stdout to a plugin through the agent server.
    Proxy {
        /// Plugin name, for example `yubikey`.
        #[arg(value_name = "NAME", allow_hyphen_values = true)]
        name: String,
    },
}

/// Extracts the plugin name when the binary was invoked as
/// `age-plugin-<name>`, typically through a symlink.
pub(crate) fn proxy_name_from_argv0(argv0: &OsStr) -> Option<String> {
    let file_name = Path::new(argv0).file_name()?.to_str()?;
    let name = file_name.strip_prefix(PLUGIN_BINARY_PREFIX)?;
    if file_name == AGENT_BINARY_NAME || name.is_empty() {
        return None;
    }
    Some(name.to_owned())
}

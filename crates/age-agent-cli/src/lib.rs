//! Command-line runtime for the age plugin agent.
//!
//! One binary serves two roles. `age-plugin-agent server` runs the agent
//! server; `age-plugin-agent proxy <name>` (or the binary invoked through a
//! symlink named `age-plugin-<name>`) stands in for a plugin, relaying its
//! stdin and stdout to the server. Configuration is loaded exactly once,
//! here, and passed down explicitly.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

use age_agent_config::Config;

mod cli;
mod config;
mod errors;
mod handshake;
mod proxy;
mod relay;
mod transport;

use cli::{Cli, CliCommand, proxy_name_from_argv0};
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub use errors::ClientError;
use errors::AppError;
pub use handshake::{ClientHandshakeError, initiate_handshake};
pub use proxy::run_proxy;
pub use relay::{RelayError, relay_session};

/// Runs the CLI using the provided arguments and diagnostic streams.
///
/// `stdout` receives help and version text; `stderr` receives a single
/// `error: …` line on failure. Proxy mode relays the process's own stdin and
/// stdout.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

/// Runs the CLI with a custom configuration loader.
pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    match dispatch(&args, loader) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::CliUsage(error))
            if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
        {
            let _ = write!(stdout, "{error}");
            ExitCode::SUCCESS
        }
        Err(AppError::CliUsage(error)) => {
            let _ = write!(stderr, "{error}");
            ExitCode::FAILURE
        }
        Err(error) => {
            let _ = writeln!(stderr, "error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch<L: ConfigLoader>(args: &[OsString], loader: &L) -> Result<(), AppError> {
    let mut split = split_config_arguments(args);
    if let Some(name) = args.first().and_then(|argv0| proxy_name_from_argv0(argv0)) {
        let config = loader.load(&split.config_arguments)?;
        return proxy_stdio(&config, &name);
    }

    let cli = Cli::try_parse_from(&split.command_arguments).map_err(AppError::CliUsage)?;
    match cli.command {
        CliCommand::Server { socket } => {
            if let Some(socket) = socket {
                split.push_socket(socket.into_os_string());
            }
            let config = loader.load(&split.config_arguments)?;
            age_agentd::run_server(&config)?;
            Ok(())
        }
        CliCommand::Proxy { name } => {
            let config = loader.load(&split.config_arguments)?;
            proxy_stdio(&config, &name)
        }
    }
}

fn proxy_stdio(config: &Config, name: &str) -> Result<(), AppError> {
    run_proxy(config.socket(), name, io::stdin(), io::stdout())?;
    Ok(())
}

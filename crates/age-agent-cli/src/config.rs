//! Configuration loading for the agent binary.
//!
//! Leading configuration flags are split off the command line and handed to
//! `ortho_config` together with the environment; the remaining tokens are
//! parsed as the command.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;

use age_agent_config::Config;

use crate::AppError;

/// Flags recognised by the configuration loader.
///
/// Must stay in sync with the fields of [`Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] =
    &["--config-path", "--socket", "--log-filter", "--log-format"];

/// Flag used to hand the server's positional socket to the loader.
const SOCKET_FLAG: &str = "--socket";

pub(crate) trait ConfigLoader {
    /// Loads configuration from `args`, which start with the program name.
    ///
    /// Configuration flags must precede the command; anything after the
    /// first command token belongs to the command.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let Some(text) = argument.to_str() else {
        return FlagAction::Stop;
    };
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text, false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Command line divided between the loader and the command parser.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the leading configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by everything from the first command token.
    pub(crate) command_arguments: Vec<OsString>,
}

impl ConfigArgumentSplit {
    /// Hands a socket given on the command line to the loader, where it
    /// outranks every other source.
    pub(crate) fn push_socket(&mut self, socket: OsString) {
        self.config_arguments.push(OsString::from(SOCKET_FLAG));
        self.config_arguments.push(socket);
    }
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut tokens = args.iter();
    let Some(program) = tokens.next() else {
        return ConfigArgumentSplit::default();
    };
    let mut config_arguments = vec![program.clone()];
    let mut command_arguments = vec![program.clone()];

    let mut pending_value = false;
    for argument in tokens.by_ref() {
        if pending_value {
            config_arguments.push(argument.clone());
            pending_value = false;
            continue;
        }
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                pending_value = needs_value;
            }
            FlagAction::Stop => {
                command_arguments.push(argument.clone());
                break;
            }
        }
    }
    command_arguments.extend(tokens.cloned());

    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case("--log-filter=debug", FlagAction::Include { needs_value: false })]
    #[case("--log-format", FlagAction::Include { needs_value: true })]
    #[case("--socket", FlagAction::Include { needs_value: true })]
    #[case("server", FlagAction::Stop)]
    #[case("--unknown", FlagAction::Stop)]
    fn classifies_arguments(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(classify(OsStr::new(argument)), expected);
    }

    #[rstest]
    fn leading_flags_go_to_the_loader() {
        let split = split_config_arguments(&os_args(&[
            "age-plugin-agent",
            "--log-format",
            "compact",
            "--log-filter=debug",
            "server",
            "/tmp/agent.sock",
        ]));
        assert_eq!(
            split.config_arguments,
            os_args(&["age-plugin-agent", "--log-format", "compact", "--log-filter=debug"])
        );
        assert_eq!(
            split.command_arguments,
            os_args(&["age-plugin-agent", "server", "/tmp/agent.sock"])
        );
    }

    #[rstest]
    fn flags_after_the_command_stay_with_it() {
        let split = split_config_arguments(&os_args(&[
            "age-plugin-agent",
            "proxy",
            "--socket",
        ]));
        assert_eq!(split.config_arguments, os_args(&["age-plugin-agent"]));
        assert_eq!(
            split.command_arguments,
            os_args(&["age-plugin-agent", "proxy", "--socket"])
        );
    }

    #[rstest]
    fn positional_socket_is_appended_as_a_flag() {
        let mut split = split_config_arguments(&os_args(&["age-plugin-agent", "server"]));
        split.push_socket(OsString::from("/srv/agent.sock"));
        assert_eq!(
            split.config_arguments,
            os_args(&["age-plugin-agent", "--socket", "/srv/agent.sock"])
        );
    }

    #[rstest]
    fn empty_arguments_split_to_nothing() {
        assert_eq!(split_config_arguments(&[]), ConfigArgumentSplit::default());
    }
}

//! Entrypoint for the `age-plugin-agent` binary.
//!
//! Delegates to [`age_agent_cli::run`], which selects server or proxy mode
//! from the invocation name and arguments.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Unlocked handles: proxy mode writes stdout from a relay thread.
    age_agent_cli::run(std::env::args_os(), &mut io::stdout(), &mut io::stderr())
}

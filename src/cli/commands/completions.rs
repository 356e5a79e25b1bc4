//! Completions command - generate shell completion scripts

use crate::cli::args::Cli;
use clap::CommandFactory;
use clap_complete::{generate, Shell};

/// Execute the completions command
pub fn execute(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}

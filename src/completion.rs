//! # Shell Completion Module
//!
//! ```bash
//! # Generate bash completions
//! cadence completion bash > ~/.local/share/bash-completion/completions/cadence
//!
//! # Generate zsh completions
//! cadence completion zsh > ~/.config/zsh/completions/_cadence
//! ```

use crate::cli::Shell;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};

/// Write completions for `cmd` to stdout.
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    write_completions(gen, cmd, &mut io::stdout());
}

/// Write completions for `cmd` to any sink.
pub fn write_completions<G: Generator>(gen: G, cmd: &mut Command, out: &mut dyn Write) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, out);
}

/// Convert our CLI Shell enum to clap_complete Shell
pub fn shell_to_completion_shell(shell: Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::CommandFactory;

    #[test]
    fn test_shell_conversion() {
        assert_eq!(shell_to_completion_shell(Shell::Bash), CompletionShell::Bash);
        assert_eq!(shell_to_completion_shell(Shell::Zsh), CompletionShell::Zsh);
        assert_eq!(shell_to_completion_shell(Shell::Fish), CompletionShell::Fish);
    }

    #[test]
    fn test_bash_completion_mentions_subcommands() {
        let mut cmd = Args::command();
        let mut buffer = Vec::new();
        write_completions(CompletionShell::Bash, &mut cmd, &mut buffer);

        let script = String::from_utf8(buffer).unwrap();
        assert!(script.contains("cadence"));
        assert!(script.contains("resolve-batch"));
        assert!(script.contains("history"));
    }
}

//! Shell completion generation.

use std::io;

use clap::Command;
use clap_complete::{generate, Shell};

/// Name completions are registered under.
pub const BIN_NAME: &str = "skyreduce";

/// Write the completion script for `shell` to `out`.
pub fn generate_completion(cmd: &mut Command, shell: Shell, out: &mut dyn io::Write) {
    generate(shell, cmd, BIN_NAME, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Arg;

    #[test]
    fn bash_completion_mentions_flags() {
        let mut cmd = Command::new(BIN_NAME).arg(Arg::new("context").long("context"));
        let mut buf = Vec::new();
        generate_completion(&mut cmd, Shell::Bash, &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("--context"));
    }

    #[test]
    fn zsh_completion_is_generated() {
        let mut cmd = Command::new(BIN_NAME);
        let mut buf = Vec::new();
        generate_completion(&mut cmd, Shell::Zsh, &mut buf);
        assert!(!buf.is_empty());
    }
}

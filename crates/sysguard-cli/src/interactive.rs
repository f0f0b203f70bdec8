//! Interactive confirmation prompts
//!
//! Uses dialoguer when stdin is a terminal. Without a terminal every prompt
//! is declined, so unattended runs need `--force` for destructive commands.

use std::io::IsTerminal;

use sysguard_core::Confirm;

/// Terminal yes/no prompt, defaulting to "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerConfirm {
    interactive: bool,
}

impl DialoguerConfirm {
    /// Prompt only when stdin is attached to a terminal.
    pub fn detect() -> Self {
        Self {
            interactive: std::io::stdin().is_terminal(),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }
}

impl Confirm for DialoguerConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if !self.interactive {
            tracing::debug!(prompt, "no terminal, declining");
            return false;
        }
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

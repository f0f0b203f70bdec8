//! Explicit run context
//!
//! Operator identity, power source and run flags are passed into every
//! operation instead of being read from the process environment.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::exec::{CommandRunner, CommandSpec};
use crate::{Error, Result};

/// Where the machine currently draws power from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSource {
    #[default]
    Ac,
    Battery,
}

impl fmt::Display for PowerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ac => write!(f, "ac"),
            Self::Battery => write!(f, "battery"),
        }
    }
}

/// Shared cancellation flag.
///
/// Set from a signal handler; checked between steps so the current step
/// always finishes and the next one never starts.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` if the flag is set.
    pub fn check(&self, next: &str) -> Result<()> {
        if self.is_set() {
            Err(Error::Interrupted {
                next: next.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Per-run context handed to every store and procedure.
#[derive(Debug, Clone)]
pub struct OperatorContext {
    /// The human on whose behalf the run happens
    pub operator: String,
    pub power_source: PowerSource,
    /// Validate and report, never mutate
    pub dry_run: bool,
    /// Skip confirmation prompts (and, for rollback restore, capture-warning gates)
    pub force: bool,
    pub interrupt: Interrupt,
}

impl OperatorContext {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            power_source: PowerSource::Ac,
            dry_run: false,
            force: false,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_power_source(mut self, power_source: PowerSource) -> Self {
        self.power_source = power_source;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }
}

/// Asks the operator to approve a destructive operation.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Approves everything (non-interactive runs that already passed `--force`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Declines everything (non-interactive runs without `--force`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeNo;

impl Confirm for AssumeNo {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

/// Gate a destructive operation on force, dry-run or explicit approval.
pub(crate) fn require_confirmation(
    ctx: &OperatorContext,
    confirm: &dyn Confirm,
    operation: &str,
    prompt: &str,
) -> Result<()> {
    if ctx.force || ctx.dry_run || confirm.confirm(prompt) {
        Ok(())
    } else {
        Err(Error::Cancelled {
            operation: operation.to_string(),
        })
    }
}

/// Facts about the machine recorded into every snapshot and rollback point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    pub host: String,
    pub kernel_version: String,
    pub operator_user: String,
    pub tool_version: String,
}

impl HostFacts {
    /// Gather facts; every probe falls back to `"unknown"`.
    pub fn collect(runner: &dyn CommandRunner, ctx: &OperatorContext) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let kernel_version = match runner.run(&CommandSpec::new("uname").arg("-r")) {
            Ok(output) if !output.stdout.trim().is_empty() => output.stdout.trim().to_string(),
            Ok(_) => "unknown".to_string(),
            Err(e) => {
                debug!(error = %e, "kernel version probe failed");
                "unknown".to_string()
            }
        };

        Self {
            host,
            kernel_version,
            operator_user: ctx.operator.clone(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

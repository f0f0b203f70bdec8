//! Command implementations for sysguard-cli

pub mod guard;
pub mod recover;
pub mod rollback;
pub mod snapshot;
pub mod status;

use colored::Colorize;
use serde::Serialize;
use sysguard_core::{
    ConfigResolver, ItemReport, ItemStatus, OperatorContext, PowerSource, Settings, SystemRunner,
};

use crate::cli::Cli;
use crate::error::Result;
use crate::interactive::DialoguerConfirm;

pub use guard::run_guard;
pub use recover::{run_recover, run_recover_list};
pub use rollback::run_rollback;
pub use snapshot::run_snapshot;
pub use status::run_status;

/// Settings, operator context and I/O choices shared by every command.
pub struct Env {
    pub settings: Settings,
    pub ctx: OperatorContext,
    pub runner: SystemRunner,
    pub confirm: DialoguerConfirm,
    pub json: bool,
}

impl Env {
    /// Resolve settings and build the operator context from global flags.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut resolver = ConfigResolver::new();
        if let Some(path) = &cli.config {
            resolver = resolver.with_file(path);
        }
        let settings = resolver.resolve()?;

        let power_source = if cli.on_battery {
            PowerSource::Battery
        } else {
            PowerSource::Ac
        };
        let ctx = OperatorContext::new(operator_name(cli.operator.as_deref()))
            .with_dry_run(cli.dry_run)
            .with_force(cli.force)
            .with_power_source(power_source);

        tracing::debug!(
            operator = %ctx.operator,
            backup_root = %settings.backup_root.as_str(),
            "environment ready"
        );

        Ok(Self {
            settings,
            ctx,
            runner: SystemRunner::new(),
            confirm: DialoguerConfirm::detect(),
            json: cli.json,
        })
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Banner shown before any dry-run output.
    pub fn dry_run_banner(&self) {
        if self.ctx.dry_run && !self.json {
            println!("{}", "Dry run: nothing will be changed".yellow().bold());
        }
    }
}

/// `--operator`, then `$SUDO_USER`, then `$USER`.
fn operator_name(explicit: Option<&str>) -> String {
    [
        explicit.map(str::to_string),
        std::env::var("SUDO_USER").ok(),
        std::env::var("USER").ok(),
    ]
    .into_iter()
    .flatten()
    .find(|name| !name.trim().is_empty())
    .unwrap_or_else(|| "unknown".to_string())
}

/// One line per item: marker, path and detail.
pub(crate) fn print_items(items: &[ItemReport]) {
    for item in items {
        let marker = match item.status {
            ItemStatus::Succeeded => "+".green(),
            ItemStatus::Failed => "x".red(),
            ItemStatus::Skipped => "-".yellow(),
        };
        match &item.detail {
            Some(detail) => println!("  {} {} ({})", marker, item.path, detail.dimmed()),
            None => println!("  {} {}", marker, item.path),
        }
    }
}

//! Snapshot command implementation

use colored::Colorize;
use sysguard_core::{RestoreReport, SnapshotStore};

use super::{Env, print_items};
use crate::cli::SnapshotAction;
use crate::error::{CliError, Result};

/// Run a snapshot subcommand
pub fn run_snapshot(env: &Env, action: SnapshotAction) -> Result<()> {
    let store = SnapshotStore::new(&env.settings, &env.runner);
    match action {
        SnapshotAction::Create { description } => create(env, &store, &description),
        SnapshotAction::List => list(env, &store),
        SnapshotAction::Validate { id } => validate(env, &store, &id),
        SnapshotAction::Restore { id, path } => {
            let report = match path.as_deref() {
                Some(prefix) => store.restore_paths(&id, prefix, &env.ctx, &env.confirm)?,
                None => store.restore(&id, &env.ctx, &env.confirm)?,
            };
            print_restore(env, &report)
        }
        SnapshotAction::Delete { id } => {
            let report = store.delete(&id, &env.ctx, &env.confirm)?;
            if env.json {
                return env.print_json(&report);
            }
            env.dry_run_banner();
            if report.removed {
                println!("{} Deleted snapshot {}", "OK".green().bold(), id.cyan());
            } else {
                println!("Would delete snapshot {}", id.cyan());
            }
            Ok(())
        }
    }
}

fn create(env: &Env, store: &SnapshotStore<'_>, description: &str) -> Result<()> {
    let report = store.create(description, &env.ctx)?;
    if env.json {
        return env.print_json(&report);
    }

    env.dry_run_banner();
    println!("{} {}", "Snapshot".bold(), report.id.cyan());
    print_items(&report.items);
    println!();
    println!("{}: {}", "Result".dimmed(), report.counts());
    if !report.dry_run {
        println!("{}: {}", "Log".dimmed(), report.log.as_str());
    }
    Ok(())
}

fn list(env: &Env, store: &SnapshotStore<'_>) -> Result<()> {
    let snapshots = store.list()?;
    if env.json {
        return env.print_json(&snapshots);
    }

    if snapshots.is_empty() {
        println!(
            "{} (use {} to take one)",
            "No snapshots".dimmed(),
            "sysguard snapshot create".cyan()
        );
        return Ok(());
    }

    println!("{}", "Snapshots".bold());
    for info in &snapshots {
        if info.corrupt {
            println!("  {} {} ({})", "x".red(), info.id, "unreadable metadata".red());
            continue;
        }
        let created = info
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {}  {}  {} file(s)  {}",
            "+".green(),
            info.id.cyan(),
            created.dimmed(),
            info.files,
            info.description
        );
    }
    Ok(())
}

fn validate(env: &Env, store: &SnapshotStore<'_>, id: &str) -> Result<()> {
    let report = store.validate(id)?;
    if env.json {
        env.print_json(&report)?;
    } else if report.is_valid() {
        println!(
            "{} Snapshot {} is intact ({} file(s) checked)",
            "OK".green().bold(),
            id.cyan(),
            report.files_checked
        );
    } else {
        println!("{} Snapshot {} is damaged:", "FAIL".red().bold(), id.cyan());
        for error in &report.errors {
            println!("  {} {}", "x".red(), error);
        }
    }

    if report.is_valid() {
        Ok(())
    } else {
        Err(CliError::user(format!(
            "snapshot {id} failed validation with {} error(s)",
            report.errors.len()
        )))
    }
}

/// Print a restore report; any failed item makes the command fail.
pub(crate) fn print_restore(env: &Env, report: &RestoreReport) -> Result<()> {
    if env.json {
        env.print_json(report)?;
    } else {
        env.dry_run_banner();
        println!("{} {}", "Restore".bold(), report.id.cyan());
        if let Some(from) = &report.migrated_from {
            println!("{}: metadata upgraded from format {}", "Note".yellow(), from);
        }
        print_items(&report.items);
        if let Some(emergency) = &report.emergency_point {
            println!("{}: {}", "Emergency point".dimmed(), emergency.cyan());
        }
        for copy in &report.safety_copies {
            println!("{}: {}", "Previous copy".dimmed(), copy.as_str());
        }
        for failure in &report.reload.failed {
            println!(
                "  {} reload `{}` failed: {}",
                "!".yellow(),
                failure.command,
                failure.message
            );
        }
        println!();
        println!("{}: {}", "Result".dimmed(), report.counts());
    }

    let failed = report.counts().failed;
    if failed > 0 {
        return Err(CliError::user(format!(
            "{failed} item(s) of {} could not be restored",
            report.id
        )));
    }
    Ok(())
}

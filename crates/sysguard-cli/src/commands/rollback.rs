//! Rollback command implementation

use colored::Colorize;
use sysguard_core::{CaptureArea, RollbackPoint, RollbackStore};

use super::Env;
use super::snapshot::print_restore;
use crate::cli::RollbackAction;
use crate::error::Result;

/// Run a rollback subcommand
pub fn run_rollback(env: &Env, action: RollbackAction) -> Result<()> {
    let store = RollbackStore::new(&env.settings, &env.runner);
    match action {
        RollbackAction::Create { name, description } => {
            let point = store.create(&name, &description, &env.ctx)?;
            if env.json {
                return env.print_json(&point);
            }
            env.dry_run_banner();
            print_point(&point);
            if env.ctx.dry_run {
                println!();
                println!("Would capture {} path(s)", point.captured_paths.len());
            }
            Ok(())
        }
        RollbackAction::List => list(env, &store),
        RollbackAction::Show { id } => {
            let point = store.get(&id)?;
            let integrity = store.verify(&id).map(|_| ()).map_err(|e| e.to_string());
            if env.json {
                return env.print_json(&serde_json::json!({
                    "point": point,
                    "intact": integrity.is_ok(),
                    "integrity_error": integrity.as_ref().err(),
                }));
            }
            print_point(&point);
            match integrity {
                Ok(()) => println!("{}: {}", "Integrity".dimmed(), "ok".green()),
                Err(e) => println!("{}: {}", "Integrity".dimmed(), e.red()),
            }
            Ok(())
        }
        RollbackAction::Restore { id } => {
            let report = store.restore(&id, &env.ctx, &env.confirm)?;
            print_restore(env, &report)
        }
        RollbackAction::Delete { id } => {
            let report = store.delete(&id, &env.ctx, &env.confirm)?;
            if env.json {
                return env.print_json(&report);
            }
            env.dry_run_banner();
            if report.removed {
                println!("{} Deleted rollback point {}", "OK".green().bold(), id.cyan());
            } else {
                println!("Would delete rollback point {}", id.cyan());
            }
            Ok(())
        }
    }
}

fn list(env: &Env, store: &RollbackStore<'_>) -> Result<()> {
    let entries = store.list()?;
    let last_restored = store.last_restored()?;
    if env.json {
        return env.print_json(&serde_json::json!({
            "last_restored": last_restored,
            "points": entries,
        }));
    }

    if entries.is_empty() {
        println!(
            "{} (use {} to take one)",
            "No rollback points".dimmed(),
            "sysguard rollback create --name <name>".cyan()
        );
        return Ok(());
    }

    println!("{}", "Rollback points".bold());
    for entry in &entries {
        let mut tags = Vec::new();
        if entry.emergency {
            tags.push("emergency".yellow().to_string());
        }
        if last_restored.as_deref() == Some(entry.id.as_str()) {
            tags.push("last restored".green().to_string());
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        println!(
            "  {} {}  {}  {}{}",
            "+".green(),
            entry.id.cyan(),
            entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            entry.name,
            tags
        );
    }
    Ok(())
}

fn print_point(point: &RollbackPoint) {
    println!("{} {}", "Rollback point".bold(), point.id.cyan());
    println!("{}:    {}", "Name".dimmed(), point.name);
    if !point.description.is_empty() {
        println!("{}:    {}", "About".dimmed(), point.description);
    }
    println!(
        "{}: {}",
        "Created".dimmed(),
        point.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "{}:  {} on {} by {}",
        "System".dimmed(),
        point.system_info.host,
        point.system_info.kernel_version,
        point.system_info.operator_user
    );
    if !point.hardware_info.vendor.is_empty() || !point.hardware_info.product.is_empty() {
        println!(
            "{}: {} {}",
            "Hardware".dimmed(),
            point.hardware_info.vendor,
            point.hardware_info.product
        );
    }
    for gpu in &point.hardware_info.gpus {
        println!("{}:     {}", "GPU".dimmed(), gpu);
    }
    if point.emergency {
        println!("{}", "Taken automatically before a restore".yellow());
    }

    println!();
    println!("{}:", "Contents".bold());
    let flags = [
        (CaptureArea::Configs, point.contents.configs),
        (CaptureArea::Packages, point.contents.packages),
        (CaptureArea::Services, point.contents.services),
        (CaptureArea::Logs, point.contents.logs),
    ];
    for (area, complete) in flags {
        let marker = if complete { "+".green() } else { "!".yellow() };
        println!("  {} {}", marker, area);
        for warning in point.warnings_for(area) {
            println!("      {}", warning.message.dimmed());
        }
    }
    println!(
        "  {} path(s), {} package(s)",
        point.captured_paths.len(),
        point.package_count
    );
}

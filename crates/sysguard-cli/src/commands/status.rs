//! Status command implementation

use colored::Colorize;
use serde::Serialize;
use sysguard_core::{AppendLog, Error as CoreError, RollbackStore, SnapshotStore, StoreLock};

use super::Env;
use crate::error::Result;

/// Recovery log lines shown
const RECENT_RECOVERIES: usize = 5;

#[derive(Debug, Serialize)]
struct StatusReport {
    backup_root: String,
    system_root: String,
    mappings: usize,
    tracked_paths: usize,
    retention: usize,
    snapshots: usize,
    latest_snapshot: Option<String>,
    rollback_points: usize,
    last_restored: Option<String>,
    busy: bool,
    recent_recoveries: Vec<String>,
}

/// Run the status command
pub fn run_status(env: &Env) -> Result<()> {
    let snapshots = SnapshotStore::new(&env.settings, &env.runner);
    let rollback = RollbackStore::new(&env.settings, &env.runner);

    let recovery_log = AppendLog::new(env.settings.recovery_log(), "recovery").lines()?;
    let skip = recovery_log.len().saturating_sub(RECENT_RECOVERIES);

    let report = StatusReport {
        backup_root: env.settings.backup_root.as_str().to_string(),
        system_root: env.settings.system_root.as_str().to_string(),
        mappings: env.settings.mappings.len(),
        tracked_paths: env.settings.tracked_paths.len(),
        retention: env.settings.retention,
        snapshots: snapshots.list()?.len(),
        latest_snapshot: snapshots.latest()?,
        rollback_points: rollback.list()?.len(),
        last_restored: rollback.last_restored()?,
        busy: store_busy(env)?,
        recent_recoveries: recovery_log.into_iter().skip(skip).collect(),
    };

    if env.json {
        return env.print_json(&report);
    }

    println!("{}", "sysguard status".bold());
    println!();
    println!("{}:  {}", "Backup root".dimmed(), report.backup_root);
    if report.system_root != "/" {
        println!("{}:  {}", "System root".dimmed(), report.system_root.yellow());
    }
    println!(
        "{}:     {} mapped file(s), {} tracked path(s)",
        "Tracking".dimmed(),
        report.mappings,
        report.tracked_paths
    );
    if report.busy {
        println!("{}:        {}", "Lock".dimmed(), "held by another run".yellow());
    }
    println!();

    println!("{}:", "Snapshots".bold());
    match &report.latest_snapshot {
        Some(latest) => println!("  {} total, newest {}", report.snapshots, latest.cyan()),
        None => println!(
            "  {} (use {} to take one)",
            "None".dimmed(),
            "sysguard snapshot create".cyan()
        ),
    }
    println!();

    println!("{}:", "Rollback points".bold());
    println!(
        "  {} of {} kept",
        report.rollback_points, report.retention
    );
    if let Some(id) = &report.last_restored {
        println!("  last restored {}", id.cyan());
    }
    println!();

    println!("{}:", "Recent recoveries".bold());
    if report.recent_recoveries.is_empty() {
        println!("  {}", "None".dimmed());
    }
    for line in &report.recent_recoveries {
        println!("  {}", line);
    }
    Ok(())
}

/// Whether another run holds the store lock. Never creates the lock file.
fn store_busy(env: &Env) -> Result<bool> {
    if !env.settings.lock_path().is_file() {
        return Ok(false);
    }
    match StoreLock::acquire(&env.settings.backup_root) {
        Ok(_lock) => Ok(false),
        Err(CoreError::StoreBusy { .. }) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

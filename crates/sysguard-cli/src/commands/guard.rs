//! Guard command implementation
//!
//! Takes a rollback point, runs a command, and on failure or interrupt tries
//! a recovery procedure before offering to roll back.

use std::process::Command;

use colored::Colorize;
use sysguard_core::{
    AssumeYes, CommandRunner, Confirm, FailureClass, OperatorContext, RecoveryArgs,
    RecoveryOutcome, RecoveryRegistry, RollbackStore, Settings, Verdict,
};
use tracing::{info, warn};

use super::Env;
use super::recover::print_outcome;
use super::snapshot::print_restore;
use crate::error::{CliError, Result};
use crate::signal;

/// Run `command` under a fresh rollback point
///
/// The recovery class and its arguments are checked before the point is taken.
pub fn run_guard(
    env: &Env,
    name: &str,
    recover: Option<&str>,
    recovery_args: &RecoveryArgs,
    command: &[String],
) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        return Err(CliError::user("no command given to guard"));
    };
    let command_line = command.join(" ");
    let registry = RecoveryRegistry::new(&env.settings, &env.runner);
    let recovery = match recover {
        Some(tag) => {
            let class: FailureClass = tag.parse()?;
            registry.resolve(class, recovery_args)?;
            Some(class)
        }
        None => None,
    };
    let store = RollbackStore::new(&env.settings, &env.runner);
    let point = store.create(name, &format!("guard: {command_line}"), &env.ctx)?;

    if env.ctx.dry_run {
        env.dry_run_banner();
        println!(
            "Would take rollback point {} ({} path(s)) and run `{}`",
            name.cyan(),
            point.captured_paths.len(),
            command_line
        );
        if let Some(class) = recovery {
            println!("On failure would run {} recovery", class.to_string().cyan());
        }
        return Ok(());
    }
    println!("{} {} taken", "Rollback point".bold(), point.id.cyan());

    signal::install(env.ctx.interrupt.clone())?;
    let status = Command::new(program).args(args).status();
    let detail = match status {
        Ok(status) if status.success() && !env.ctx.interrupt.is_set() => {
            info!(command = %command_line, "guarded command succeeded");
            println!("{} `{}` succeeded", "OK".green().bold(), command_line);
            return Ok(());
        }
        Ok(_) if env.ctx.interrupt.is_set() => "interrupted".to_string(),
        Ok(status) => match status.code() {
            Some(code) => format!("`{command_line}` exited with status {code}"),
            None => format!("`{command_line}` was killed by a signal"),
        },
        Err(e) => format!("could not start `{command_line}`: {e}"),
    };
    warn!(command = %command_line, %detail, "guarded command failed");
    println!("{} {}", "FAIL".red().bold(), detail);

    if let Some(class) = recovery {
        if env.ctx.interrupt.is_set() {
            println!("Skipping recovery after interrupt");
        } else if let Some(outcome) = attempt_recovery(
            &env.settings,
            &env.runner,
            class,
            recovery_args,
            &env.ctx,
        ) {
            print_outcome(env, &outcome);
            if outcome.verdict == Verdict::Success {
                return Ok(());
            }
        }
    }

    let prompt = format!("Roll back to {} ({})?", point.id, point.name);
    if env.ctx.force || env.confirm.confirm(&prompt) {
        let report = store.restore(&point.id, &env.ctx, &AssumeYes)?;
        print_restore(env, &report)?;
    } else {
        println!(
            "Left the system as is. Roll back later with {}",
            format!("sysguard rollback restore {}", point.id).cyan()
        );
    }

    Err(CliError::GuardFailed { detail })
}

/// Run the recovery, reporting an error instead of returning it.
fn attempt_recovery(
    settings: &Settings,
    runner: &dyn CommandRunner,
    class: FailureClass,
    args: &RecoveryArgs,
    ctx: &OperatorContext,
) -> Option<RecoveryOutcome> {
    match RecoveryRegistry::new(settings, runner).execute(class, args, ctx) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(class = %class, error = %e, "recovery after guarded failure did not complete");
            println!("{} {} recovery did not complete: {}", "WARN".yellow().bold(), class, e);
            None
        }
    }
}

//! Recover command implementation

use colored::Colorize;
use serde::Serialize;
use sysguard_core::{FailureClass, RecoveryArgs, RecoveryOutcome, RecoveryRegistry, Verdict};

use super::Env;
use crate::error::{CliError, Result};

#[derive(Serialize)]
struct ClassListing {
    tag: &'static str,
    threshold_percent: u8,
    description: &'static str,
}

/// Print every failure class with its threshold
pub fn run_recover_list(json: bool) -> Result<()> {
    let listing: Vec<ClassListing> = FailureClass::ALL
        .iter()
        .map(|class| ClassListing {
            tag: class.tag(),
            threshold_percent: class.threshold(),
            description: class.description(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{}", "Failure classes".bold());
    for entry in &listing {
        println!(
            "  {} {:>3}%  {}",
            format!("{:<18}", entry.tag).cyan(),
            entry.threshold_percent,
            entry.description.dimmed()
        );
    }
    Ok(())
}

/// Run the procedure for `tag`.
///
/// A verdict other than success becomes [`CliError::RecoveryIncomplete`].
pub fn run_recover(env: &Env, tag: &str, args: &RecoveryArgs) -> Result<()> {
    let registry = RecoveryRegistry::new(&env.settings, &env.runner);
    let outcome = registry.execute_tag(tag, args, &env.ctx)?;

    if env.json {
        env.print_json(&outcome)?;
    } else {
        print_outcome(env, &outcome);
        if !outcome.dry_run {
            println!("{}: {}", "Log".dimmed(), registry.log_path().as_str());
        }
    }
    outcome_result(&outcome)
}

pub(crate) fn print_outcome(env: &Env, outcome: &RecoveryOutcome) {
    env.dry_run_banner();
    println!(
        "{} {} via {}",
        "Recovery".bold(),
        outcome.failure_class.cyan(),
        outcome.mechanism
    );

    for (n, step) in outcome.steps.iter().enumerate() {
        let kind = if step.verification { "verify" } else { "step" };
        let marker = if outcome.dry_run {
            "-".dimmed()
        } else if step.succeeded {
            "+".green()
        } else {
            "x".red()
        };
        let line = format!("{}/{} {} {}", n + 1, outcome.steps_total, kind, step.name);
        match &step.detail {
            Some(detail) => println!("  {} {} ({})", marker, line, detail.dimmed()),
            None => println!("  {} {}", marker, line),
        }
    }

    if outcome.dry_run {
        return;
    }
    let verdict = match outcome.verdict {
        Verdict::Success => outcome.verdict.to_string().green().bold(),
        Verdict::Partial => outcome.verdict.to_string().yellow().bold(),
        _ => outcome.verdict.to_string().red().bold(),
    };
    println!();
    println!(
        "{}: {} ({}/{} steps, {}%, threshold {}%){}",
        "Verdict".dimmed(),
        verdict,
        outcome.steps_succeeded,
        outcome.steps_total,
        outcome.success_rate_percent,
        outcome.threshold_percent,
        if outcome.interrupted { ", interrupted" } else { "" }
    );
}

pub(crate) fn outcome_result(outcome: &RecoveryOutcome) -> Result<()> {
    match outcome.verdict {
        Verdict::Success | Verdict::Planned => Ok(()),
        verdict => Err(CliError::RecoveryIncomplete {
            class: outcome.failure_class.clone(),
            verdict,
            rate: outcome.success_rate_percent,
            threshold: outcome.threshold_percent,
        }),
    }
}

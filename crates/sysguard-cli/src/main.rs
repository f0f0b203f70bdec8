//! sysguard CLI
//!
//! Configuration snapshots, whole-subsystem rollback points and automated
//! recovery procedures for a single machine.

mod cli;
mod commands;
mod error;
mod interactive;
mod logging;
mod signal;

use clap::{CommandFactory, Parser};
use colored::Colorize;

use cli::{Cli, Commands};
use commands::Env;
use error::Result;
use sysguard_core::RecoveryArgs;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: logging disabled: {}", "warning".yellow(), e);
    }
    tracing::debug!("verbose mode enabled");

    let Some(command) = cli.command.clone() else {
        println!(
            "{} configuration snapshots, rollback and recovery",
            "sysguard".green().bold()
        );
        println!();
        println!("Run {} for available commands.", "sysguard --help".cyan());
        return Ok(());
    };

    // Commands that need no settings
    match &command {
        Commands::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "sysguard",
                &mut std::io::stdout(),
            );
            return Ok(());
        }
        Commands::Recover { list: true, .. } => return commands::run_recover_list(cli.json),
        _ => {}
    }

    let env = Env::from_cli(&cli)?;
    execute_command(&env, command)
}

fn execute_command(env: &Env, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Snapshot { action } => commands::run_snapshot(env, action),
        Commands::Rollback { action } => commands::run_rollback(env, action),
        Commands::Recover {
            tag,
            package,
            service,
            module,
            path,
            ..
        } => {
            let tag = tag.ok_or_else(|| error::CliError::user("a failure class is required"))?;
            if !env.ctx.dry_run {
                signal::install(env.ctx.interrupt.clone())?;
            }
            let args = RecoveryArgs {
                package,
                service,
                module,
                path,
            };
            commands::run_recover(env, &tag, &args)
        }
        Commands::Guard {
            name,
            recover,
            package,
            service,
            module,
            path,
            command,
        } => {
            let args = RecoveryArgs {
                package,
                service,
                module,
                path,
            };
            commands::run_guard(env, &name, recover.as_deref(), &args, &command)
        }
        Commands::Status => commands::run_status(env),
        Commands::Completions { .. } => Ok(()),
    }
}

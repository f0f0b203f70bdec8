//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// sysguard - configuration snapshots, rollback points and automated recovery
#[derive(Parser, Debug)]
#[command(name = "sysguard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file layered over the built-in and global configuration
    #[arg(long, global = true, env = "SYSGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Validate and report, change nothing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub force: bool,

    /// Operator recorded in metadata and logs (default: $SUDO_USER, then $USER)
    #[arg(long, global = true, env = "SYSGUARD_OPERATOR")]
    pub operator: Option<String>,

    /// The machine runs on battery (selects the tlp battery profile)
    #[arg(long, global = true)]
    pub on_battery: bool,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Per-file, checksum-verified configuration snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Whole-subsystem rollback points
    Rollback {
        #[command(subcommand)]
        action: RollbackAction,
    },

    /// Run a recovery procedure for a failure class
    ///
    /// Examples:
    ///   sysguard recover --list
    ///   sysguard recover service-start --service tlp.service
    ///   sysguard recover config-corruption --path /etc/tlp.conf
    Recover {
        /// Failure class tag (see --list)
        #[arg(required_unless_present = "list")]
        tag: Option<String>,

        /// List failure classes and exit
        #[arg(long)]
        list: bool,

        /// Package to reinstall (package-install)
        #[arg(long)]
        package: Option<String>,

        /// Unit to restart (service-start)
        #[arg(long)]
        service: Option<String>,

        /// Kernel module to reload (gpu-driver)
        #[arg(long)]
        module: Option<String>,

        /// Configuration file to restore (config-corruption)
        #[arg(long)]
        path: Option<String>,
    },

    /// Run a command under a fresh rollback point
    ///
    /// If the command fails or is interrupted, optionally runs a recovery
    /// procedure, then offers to restore the rollback point.
    ///
    /// Example:
    ///   sysguard guard --name nvidia-update --recover gpu-driver -- pacman -Syu nvidia
    Guard {
        /// Name of the rollback point taken before the command runs
        #[arg(long)]
        name: String,

        /// Failure class to recover if the command fails
        #[arg(long)]
        recover: Option<String>,

        /// Package to reinstall (package-install)
        #[arg(long, requires = "recover")]
        package: Option<String>,

        /// Unit to restart (service-start)
        #[arg(long, requires = "recover")]
        service: Option<String>,

        /// Kernel module to reload (gpu-driver)
        #[arg(long, requires = "recover")]
        module: Option<String>,

        /// Configuration file to restore (config-corruption)
        #[arg(long, requires = "recover")]
        path: Option<String>,

        /// The command to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Show backup store overview
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Snapshot actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotAction {
    /// Capture every mapped configuration file
    Create {
        /// Free-text description
        #[arg(short, long, default_value = "manual snapshot")]
        description: String,
    },

    /// List snapshots, newest first
    List,

    /// Verify a snapshot's artifacts and checksums
    Validate {
        /// Snapshot id
        id: String,
    },

    /// Restore a snapshot over the live configuration
    Restore {
        /// Snapshot id
        id: String,

        /// Only restore files under this path
        #[arg(long)]
        path: Option<String>,
    },

    /// Permanently delete a snapshot
    Delete {
        /// Snapshot id
        id: String,
    },
}

/// Rollback actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RollbackAction {
    /// Capture configuration, package, service and log state
    Create {
        /// Short name of the point
        #[arg(short, long)]
        name: String,

        /// Free-text description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List rollback points, newest first
    List,

    /// Show everything recorded about a point
    Show {
        /// Rollback point id
        id: String,
    },

    /// Replace tracked configuration with a point's capture
    Restore {
        /// Rollback point id
        id: String,
    },

    /// Permanently delete a point
    Delete {
        /// Rollback point id
        id: String,
    },
}

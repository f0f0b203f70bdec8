//! Core engine for sysguard
//!
//! This crate implements the three protection layers of sysguard:
//!
//! - **Snapshots**: per-file, checksum-verified copies of mapped configuration
//!   files, restorable individually or as a whole
//! - **Rollback points**: whole-subsystem captures (configuration trees,
//!   package and service state, logs) with a bounded, indexed history
//! - **Recovery**: tag-selected, multi-step repair procedures scored against
//!   a per-mechanism success threshold
//!
//! # Architecture
//!
//! `sysguard-core` sits above the filesystem layer and below the CLI:
//!
//! ```text
//!                   sysguard (CLI)
//!                        |
//!                  sysguard-core
//!                        |
//!     +--------+---------+---------+----------+
//!     |        |         |         |          |
//!  snapshot rollback  recovery  restore    ledger
//!     |        |         |         |          |
//!     +--------+----+----+---------+----------+
//!                   |
//!        policy · config · exec · context
//!                   |
//!              sysguard-fs
//! ```
//!
//! Every external tool runs through [`exec::CommandRunner`], so the whole
//! engine can be driven against a temporary system root with
//! [`exec::MockRunner`].

pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod ledger;
pub mod policy;
pub mod recovery;
pub mod report;
pub mod restore;
pub mod rollback;
pub mod snapshot;

pub use config::{ConfigResolver, FileMapping, PermissionPolicy, Settings};
pub use context::{AssumeNo, AssumeYes, Confirm, HostFacts, Interrupt, OperatorContext, PowerSource};
pub use error::{Error, Result};
pub use exec::{CommandOutput, CommandRunner, CommandSpec, ExternalError, MockRunner, SystemRunner};
pub use ledger::{AppendLog, LogLevel, RollbackIndex, RollbackIndexEntry, StoreLock};
pub use policy::{PathClass, PathPolicy};
pub use recovery::{FailureClass, RecoveryArgs, RecoveryOutcome, RecoveryRegistry, Verdict};
pub use report::{
    Counts, CreateReport, DeleteReport, ItemReport, ItemStatus, ReloadReport, RestoreReport,
    ValidationReport,
};
pub use restore::RestoreEngine;
pub use rollback::{CaptureArea, RollbackPoint, RollbackStore};
pub use snapshot::{FileEntry, SnapshotInfo, SnapshotMetadata, SnapshotStore};

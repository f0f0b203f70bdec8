//! Automated recovery procedures
//!
//! A failure class tag selects a fixed, ordered procedure. Every step runs
//! regardless of earlier failures, and the run is scored against the
//! procedure's threshold:
//!
//! ```text
//! tag ──► FailureClass ──► RecoveryProcedure ──► [Step..., verification]
//!                                                    │
//!                                  recovery.log ◄────┴──► RecoveryOutcome
//! ```
//!
//! Recovery does not take the store lock itself; the snapshot restores some
//! steps perform take it for their own duration.

mod outcome;
mod procedures;
mod step;

pub use outcome::{RecoveryOutcome, StepResult, Verdict, success_rate};
pub use procedures::{
    ConfigCorruption, DiskSpace, DisplayConfig, GpuDriver, Network, PackageInstall, Permissions,
    PowerManagement, Procedure, ProcedureEnv, RecoveryProcedure, ServiceStart, VendorTools,
};
pub use step::{Step, StepAction, xorg_sections_balanced};

use std::fmt;
use std::str::FromStr;

use tracing::{error, info, warn};

use crate::config::Settings;
use crate::context::OperatorContext;
use crate::exec::CommandRunner;
use crate::ledger::AppendLog;
use crate::policy::PathPolicy;
use crate::{Error, Result};

use step::StepExecutor;

/// The failure classes recovery knows how to repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    PackageInstall,
    ServiceStart,
    GpuDriver,
    DisplayConfig,
    PowerManagement,
    VendorTools,
    Network,
    DiskSpace,
    Permissions,
    ConfigCorruption,
}

impl FailureClass {
    pub const ALL: [FailureClass; 10] = [
        FailureClass::PackageInstall,
        FailureClass::ServiceStart,
        FailureClass::GpuDriver,
        FailureClass::DisplayConfig,
        FailureClass::PowerManagement,
        FailureClass::VendorTools,
        FailureClass::Network,
        FailureClass::DiskSpace,
        FailureClass::Permissions,
        FailureClass::ConfigCorruption,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::PackageInstall => "package-install",
            Self::ServiceStart => "service-start",
            Self::GpuDriver => "gpu-driver",
            Self::DisplayConfig => "display-config",
            Self::PowerManagement => "power-management",
            Self::VendorTools => "vendor-tools",
            Self::Network => "network",
            Self::DiskSpace => "disk-space",
            Self::Permissions => "permissions",
            Self::ConfigCorruption => "config-corruption",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::PackageInstall => "reinstall a package after a failed install (--package)",
            Self::ServiceStart => "reset and restart a failed unit (--service)",
            Self::GpuDriver => "reload a GPU kernel module, default nvidia (--module)",
            Self::DisplayConfig => "restore X11 configuration from the newest snapshot",
            Self::PowerManagement => "re-enable tlp and apply the current power profile",
            Self::VendorTools => "restart the supergfxd and asusd daemons",
            Self::Network => "restart NetworkManager and probe connectivity",
            Self::DiskSpace => "clean package cache and journal",
            Self::Permissions => "re-apply the permission policy to mapped files",
            Self::ConfigCorruption => "restore one file from the newest intact snapshot (--path)",
        }
    }

    /// Success threshold of this class's procedure, in percent.
    pub fn threshold(&self) -> u8 {
        match self {
            Self::PackageInstall => PackageInstall::THRESHOLD,
            Self::ServiceStart => ServiceStart::THRESHOLD,
            Self::GpuDriver => GpuDriver::THRESHOLD,
            Self::DisplayConfig => DisplayConfig::THRESHOLD,
            Self::PowerManagement => PowerManagement::THRESHOLD,
            Self::VendorTools => VendorTools::THRESHOLD,
            Self::Network => Network::THRESHOLD,
            Self::DiskSpace => DiskSpace::THRESHOLD,
            Self::Permissions => Permissions::THRESHOLD,
            Self::ConfigCorruption => ConfigCorruption::THRESHOLD,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for FailureClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|class| class.tag() == s)
            .ok_or_else(|| Error::UnknownFailureClass { tag: s.to_string() })
    }
}

/// Arguments some procedures need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryArgs {
    pub package: Option<String>,
    pub service: Option<String>,
    pub module: Option<String>,
    pub path: Option<String>,
}

impl RecoveryArgs {
    pub fn package(name: impl Into<String>) -> Self {
        Self {
            package: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn service(unit: impl Into<String>) -> Self {
        Self {
            service: Some(unit.into()),
            ..Self::default()
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

fn required(
    value: &Option<String>,
    class: FailureClass,
    argument: &'static str,
) -> Result<String> {
    value
        .clone()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::MissingRecoveryArgument {
            class: class.tag().to_string(),
            argument,
        })
}

/// Maps failure classes to procedures and runs them.
pub struct RecoveryRegistry<'a> {
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    log: AppendLog,
}

impl<'a> RecoveryRegistry<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn CommandRunner) -> Self {
        Self {
            settings,
            runner,
            log: AppendLog::new(settings.recovery_log(), "recovery"),
        }
    }

    pub fn log_path(&self) -> &sysguard_fs::NormalizedPath {
        self.log.path()
    }

    /// The procedure for `class`, with its arguments bound.
    pub fn resolve(&self, class: FailureClass, args: &RecoveryArgs) -> Result<RecoveryProcedure> {
        Ok(match class {
            FailureClass::PackageInstall => RecoveryProcedure::PackageInstall(PackageInstall {
                package: required(&args.package, class, "package")?,
            }),
            FailureClass::ServiceStart => RecoveryProcedure::ServiceStart(ServiceStart {
                unit: required(&args.service, class, "service")?,
            }),
            FailureClass::GpuDriver => RecoveryProcedure::GpuDriver(
                args.module
                    .clone()
                    .map(|module| GpuDriver { module })
                    .unwrap_or_default(),
            ),
            FailureClass::DisplayConfig => RecoveryProcedure::DisplayConfig(DisplayConfig),
            FailureClass::PowerManagement => RecoveryProcedure::PowerManagement(PowerManagement),
            FailureClass::VendorTools => RecoveryProcedure::VendorTools(VendorTools),
            FailureClass::Network => RecoveryProcedure::Network(Network),
            FailureClass::DiskSpace => RecoveryProcedure::DiskSpace(DiskSpace),
            FailureClass::Permissions => RecoveryProcedure::Permissions(Permissions),
            FailureClass::ConfigCorruption => {
                let path = required(&args.path, class, "path")?;
                PathPolicy::new().validate(&path)?;
                RecoveryProcedure::ConfigCorruption(ConfigCorruption { path })
            }
        })
    }

    /// The steps `execute` would run, in order.
    pub fn plan(
        &self,
        class: FailureClass,
        args: &RecoveryArgs,
        ctx: &OperatorContext,
    ) -> Result<Vec<Step>> {
        let procedure = self.resolve(class, args)?;
        Ok(procedure.steps(&ProcedureEnv {
            settings: self.settings,
            ctx,
        }))
    }

    /// Parse `tag` and execute its procedure.
    pub fn execute_tag(
        &self,
        tag: &str,
        args: &RecoveryArgs,
        ctx: &OperatorContext,
    ) -> Result<RecoveryOutcome> {
        self.execute(tag.parse()?, args, ctx)
    }

    /// Run every step of the procedure for `class` and score the result.
    ///
    /// Step failures never end the run. An interrupt stops it before the
    /// next step; the steps not started count as failed.
    pub fn execute(
        &self,
        class: FailureClass,
        args: &RecoveryArgs,
        ctx: &OperatorContext,
    ) -> Result<RecoveryOutcome> {
        let procedure = self.resolve(class, args)?;
        let steps = procedure.steps(&ProcedureEnv {
            settings: self.settings,
            ctx,
        });

        if ctx.dry_run {
            let planned = steps
                .iter()
                .map(|step| StepResult {
                    name: step.name.clone(),
                    verification: step.verification,
                    succeeded: false,
                    detail: Some(step.action.to_string()),
                })
                .collect();
            return Ok(RecoveryOutcome::planned(
                class.tag(),
                procedure.mechanism(),
                procedure.threshold(),
                planned,
            ));
        }

        info!(
            class = %class,
            mechanism = procedure.mechanism(),
            steps = steps.len(),
            "recovery started"
        );
        let executor = StepExecutor {
            settings: self.settings,
            runner: self.runner,
            ctx,
            policy: PathPolicy::new(),
        };

        let mut results = Vec::with_capacity(steps.len());
        let mut interrupted = false;
        for (index, step) in steps.iter().enumerate() {
            if !interrupted && ctx.interrupt.check(&step.name).is_err() {
                warn!(class = %class, next = %step.name, "recovery interrupted");
                interrupted = true;
            }
            let result = if interrupted {
                StepResult {
                    name: step.name.clone(),
                    verification: step.verification,
                    succeeded: false,
                    detail: Some("not started: interrupted".to_string()),
                }
            } else {
                let (succeeded, detail) = match executor.perform(&step.action) {
                    Ok(detail) => (true, detail),
                    Err(detail) => {
                        error!(class = %class, step = %step.name, %detail, "recovery step failed");
                        (false, Some(detail))
                    }
                };
                StepResult {
                    name: step.name.clone(),
                    verification: step.verification,
                    succeeded,
                    detail,
                }
            };
            self.log_step(class, index + 1, steps.len(), &result)?;
            results.push(result);
        }

        let outcome = RecoveryOutcome::from_steps(
            class.tag(),
            procedure.mechanism(),
            procedure.threshold(),
            results,
            interrupted,
        );
        let line = format!("{} (operator {})", outcome.log_line(), ctx.operator);
        match outcome.verdict {
            Verdict::Success => self.log.info(&line)?,
            Verdict::Partial => self.log.warn(&line)?,
            _ => self.log.error(&line)?,
        }
        info!(
            class = %class,
            verdict = %outcome.verdict,
            rate = outcome.success_rate_percent,
            "recovery finished"
        );
        Ok(outcome)
    }

    fn log_step(
        &self,
        class: FailureClass,
        number: usize,
        total: usize,
        result: &StepResult,
    ) -> Result<()> {
        let kind = if result.verification { "verify" } else { "step" };
        let status = if result.succeeded { "ok" } else { "failed" };
        let detail = result
            .detail
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        let line = format!("{class} {kind} {number}/{total} {}: {status}{detail}", result.name);
        if result.succeeded {
            self.log.info(&line)
        } else {
            self.log.warn(&line)
        }
    }
}

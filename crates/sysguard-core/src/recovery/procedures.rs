//! The fixed recovery procedures
//!
//! Each procedure is a struct implementing [`Procedure`]; its step list is
//! ordered and always ends in a verification step.

use std::time::Duration;

use super::step::{Step, StepAction};
use crate::config::Settings;
use crate::context::{OperatorContext, PowerSource};
use crate::exec::CommandSpec;

const SERVICE_TIMEOUT: Duration = Duration::from_secs(60);
const PACKAGE_TIMEOUT: Duration = Duration::from_secs(600);
const INITRAMFS_TIMEOUT: Duration = Duration::from_secs(300);
const NETWORK_TIMEOUT: Duration = Duration::from_secs(10);

/// What a procedure may consult when building its steps.
pub struct ProcedureEnv<'a> {
    pub settings: &'a Settings,
    pub ctx: &'a OperatorContext,
}

pub trait Procedure {
    /// Human-readable name of the repair mechanism
    const MECHANISM: &'static str;
    /// Minimum success rate, in percent, for a `success` verdict
    const THRESHOLD: u8;

    fn steps(&self, env: &ProcedureEnv<'_>) -> Vec<Step>;
}

fn systemctl<const N: usize>(args: [&str; N]) -> StepAction {
    StepAction::Run(
        CommandSpec::new("systemctl")
            .args(args)
            .timeout(SERVICE_TIMEOUT),
    )
}

fn pacman<const N: usize>(args: [&str; N]) -> StepAction {
    StepAction::Run(CommandSpec::new("pacman").args(args).timeout(PACKAGE_TIMEOUT))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInstall {
    pub package: String,
}

impl Procedure for PackageInstall {
    const MECHANISM: &'static str = "package reinstall";
    const THRESHOLD: u8 = 80;

    fn steps(&self, _env: &ProcedureEnv<'_>) -> Vec<Step> {
        let pkg = self.package.as_str();
        vec![
            Step::new(
                "remove stale package database lock",
                StepAction::RemoveFile("/var/lib/pacman/db.lck".into()),
            ),
            Step::new("refresh package databases", pacman(["-Syy", "--noconfirm"])),
            Step::new("clean package cache", pacman(["-Sc", "--noconfirm"])),
            Step::new(format!("reinstall {pkg}"), pacman(["-S", "--noconfirm", pkg])),
            Step::verify(format!("{pkg} is installed"), pacman(["-Q", pkg])),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStart {
    pub unit: String,
}

impl Procedure for ServiceStart {
    const MECHANISM: &'static str = "service restart";
    const THRESHOLD: u8 = 80;

    fn steps(&self, _env: &ProcedureEnv<'_>) -> Vec<Step> {
        let unit = self.unit.as_str();
        vec![
            Step::new(format!("reset failed state of {unit}"), systemctl(["reset-failed", unit])),
            Step::new("reload unit files", systemctl(["daemon-reload"])),
            Step::new(format!("enable {unit}"), systemctl(["enable", unit])),
            Step::new(format!("restart {unit}"), systemctl(["restart", unit])),
            Step::verify(format!("{unit} is active"), systemctl(["is-active", unit])),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuDriver {
    pub module: String,
}

impl Default for GpuDriver {
    fn default() -> Self {
        Self {
            module: "nvidia".into(),
        }
    }
}

impl Procedure for GpuDriver {
    const MECHANISM: &'static str = "driver reload";
    const THRESHOLD: u8 = 70;

    fn steps(&self, _env: &ProcedureEnv<'_>) -> Vec<Step> {
        let module = self.module.as_str();
        let run = |program: &str, args: &[&str]| {
            StepAction::Run(
                CommandSpec::new(program)
                    .args(args.iter().copied())
                    .timeout(SERVICE_TIMEOUT),
            )
        };
        vec![
            Step::new("rebuild module dependencies", run("depmod", &["-a"])),
            Step::new(format!("unload {module}"), run("modprobe", &["-r", module])),
            Step::new(format!("load {module}"), run("modprobe", &[module])),
            Step::new(
                "rebuild initramfs",
                StepAction::Run(
                    CommandSpec::new("mkinitcpio")
                        .arg("-P")
                        .timeout(INITRAMFS_TIMEOUT),
                ),
            ),
            Step::verify(
                format!("{module} is loaded"),
                StepAction::RunListing {
                    command: CommandSpec::new("lsmod").timeout(SERVICE_TIMEOUT),
                    entry: module.to_string(),
                },
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayConfig;

impl DisplayConfig {
    pub const XORG_CONF: &'static str = "/etc/X11/xorg.conf";
}

impl Procedure for DisplayConfig {
    const MECHANISM: &'static str = "display config repair";
    const THRESHOLD: u8 = 80;

    fn steps(&self, _env: &ProcedureEnv<'_>) -> Vec<Step> {
        vec![
            Step::new(
                "move xorg.conf aside",
                StepAction::MoveAside(Self::XORG_CONF.into()),
            ),
            Step::new(
                "restore X11 configuration from snapshot",
                StepAction::RestoreFromSnapshot {
                    prefix: "/etc/X11".into(),
                },
            ),
            Step::new("reload unit files", systemctl(["daemon-reload"])),
            Step::new(
                "trigger udev",
                StepAction::Run(
                    CommandSpec::new("udevadm")
                        .arg("trigger")
                        .timeout(SERVICE_TIMEOUT),
                ),
            ),
            Step::verify(
                "xorg.conf sections balanced",
                StepAction::VerifyXorgSections(Self::XORG_CONF.into()),
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerManagement;

impl Procedure for PowerManagement {
    const MECHANISM: &'static str = "power management reset";
    const THRESHOLD: u8 = 80;

    fn steps(&self, env: &ProcedureEnv<'_>) -> Vec<Step> {
        let mode = match env.ctx.power_source {
            PowerSource::Ac => "ac",
            PowerSource::Battery => "bat",
        };
        vec![
            Step::new(
                "mask rfkill units",
                systemctl(["mask", "systemd-rfkill.service", "systemd-rfkill.socket"]),
            ),
            Step::new("enable tlp", systemctl(["enable", "tlp.service"])),
            Step::new("restart tlp", systemctl(["restart", "tlp.service"])),
            Step::new(
                format!("apply tlp {mode} profile"),
                StepAction::Run(CommandSpec::new("tlp").arg(mode).timeout(SERVICE_TIMEOUT)),
            ),
            Step::verify(
                "tlp reports status",
                StepAction::Run(CommandSpec::new("tlp-stat").arg("-s").timeout(SERVICE_TIMEOUT)),
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VendorTools;

impl Procedure for VendorTools {
    const MECHANISM: &'static str = "vendor daemon restart";
    const THRESHOLD: u8 = 75;

    fn steps(&self, _env: &ProcedureEnv<'_>) -> Vec<Step> {
        vec![
            Step::new("reload unit files", systemctl(["daemon-reload"])),
            Step::new("restart supergfxd", systemctl(["restart", "supergfxd.service"])),
            Step::new("restart asusd", systemctl(["restart", "asusd.service"])),
            Step::verify(
                "graphics mode readable",
                StepAction::Run(CommandSpec::new("supergfxctl").arg("-g").timeout(SERVICE_TIMEOUT)),
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Network;

impl Procedure for Network {
    const MECHANISM: &'static str = "network restart";
    const THRESHOLD: u8 = 66;

    fn steps(&self, env: &ProcedureEnv<'_>) -> Vec<Step> {
        let host = env.settings.network_probe_host.as_str();
        vec![
            Step::new(
                "restart NetworkManager",
                systemctl(["restart", "NetworkManager.service"]),
            ),
            Step::new(
                "enable networking",
                StepAction::Run(
                    CommandSpec::new("nmcli")
                        .args(["networking", "on"])
                        .timeout(NETWORK_TIMEOUT),
                ),
            ),
            Step::verify(
                format!("{host} reachable"),
                StepAction::Run(
                    CommandSpec::new("ping")
                        .args(["-c", "1", "-W", "3", host])
                        .timeout(NETWORK_TIMEOUT),
                ),
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskSpace;

impl Procedure for DiskSpace {
    const MECHANISM: &'static str = "disk cleanup";
    const THRESHOLD: u8 = 75;

    fn steps(&self, env: &ProcedureEnv<'_>) -> Vec<Step> {
        vec![
            Step::new("clean package cache", pacman(["-Sc", "--noconfirm"])),
            Step::new(
                "vacuum journal",
                StepAction::Run(
                    CommandSpec::new("journalctl")
                        .arg("--vacuum-time=7d")
                        .timeout(SERVICE_TIMEOUT),
                ),
            ),
            Step::new(
                "trim cached package versions",
                StepAction::Run(CommandSpec::new("paccache").arg("-rk2").timeout(PACKAGE_TIMEOUT)),
            ),
            Step::verify(
                "enough free space on /",
                StepAction::VerifyFreeSpace {
                    mount: "/".into(),
                    min_bytes: env.settings.min_free_bytes,
                },
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions;

impl Procedure for Permissions {
    const MECHANISM: &'static str = "permission reset";
    const THRESHOLD: u8 = 66;

    fn steps(&self, _env: &ProcedureEnv<'_>) -> Vec<Step> {
        vec![
            Step::new("apply ownership", StepAction::ApplyOwnership),
            Step::new("apply mode", StepAction::ApplyMode),
            Step::verify("modes match policy", StepAction::VerifyModes),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCorruption {
    pub path: String,
}

impl Procedure for ConfigCorruption {
    const MECHANISM: &'static str = "config restore";
    const THRESHOLD: u8 = 66;

    fn steps(&self, _env: &ProcedureEnv<'_>) -> Vec<Step> {
        let path = self.path.as_str();
        vec![
            Step::new(
                format!("move {path} aside"),
                StepAction::MoveAsideForRestore(path.into()),
            ),
            Step::new(
                format!("restore {path} from snapshot"),
                StepAction::RestoreFileFromSnapshot(path.into()),
            ),
            Step::verify(
                format!("{path} matches snapshot"),
                StepAction::VerifySnapshotChecksum(path.into()),
            ),
        ]
    }
}

/// One procedure per failure class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryProcedure {
    PackageInstall(PackageInstall),
    ServiceStart(ServiceStart),
    GpuDriver(GpuDriver),
    DisplayConfig(DisplayConfig),
    PowerManagement(PowerManagement),
    VendorTools(VendorTools),
    Network(Network),
    DiskSpace(DiskSpace),
    Permissions(Permissions),
    ConfigCorruption(ConfigCorruption),
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $body:expr) => {
        match $self {
            RecoveryProcedure::PackageInstall($p) => $body,
            RecoveryProcedure::ServiceStart($p) => $body,
            RecoveryProcedure::GpuDriver($p) => $body,
            RecoveryProcedure::DisplayConfig($p) => $body,
            RecoveryProcedure::PowerManagement($p) => $body,
            RecoveryProcedure::VendorTools($p) => $body,
            RecoveryProcedure::Network($p) => $body,
            RecoveryProcedure::DiskSpace($p) => $body,
            RecoveryProcedure::Permissions($p) => $body,
            RecoveryProcedure::ConfigCorruption($p) => $body,
        }
    };
}

fn mechanism_of<P: Procedure>(_: &P) -> &'static str {
    P::MECHANISM
}

fn threshold_of<P: Procedure>(_: &P) -> u8 {
    P::THRESHOLD
}

impl RecoveryProcedure {
    pub fn mechanism(&self) -> &'static str {
        dispatch!(self, p => mechanism_of(p))
    }

    pub fn threshold(&self) -> u8 {
        dispatch!(self, p => threshold_of(p))
    }

    pub fn steps(&self, env: &ProcedureEnv<'_>) -> Vec<Step> {
        dispatch!(self, p => p.steps(env))
    }
}

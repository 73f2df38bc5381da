//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use shuttle_core::{OperationMode, RunParameters};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "shuttle", version, about = "NMR sample shuttle controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/shuttle_config.toml")]
    pub config: PathBuf,

    /// Log and print results as JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Drive the simulated shuttle instead of the serial motor module
    #[arg(long, action = ArgAction::SetTrue)]
    pub simulate: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Operation mode; the numeric aliases match the legacy mode numbers.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    /// Trapezoidal profile at one speed
    #[value(alias = "1")]
    ConstantVelocity,
    /// Speed recomputed from the ramp while in transit
    #[value(alias = "2")]
    VelocitySweep,
    /// Speed chosen so the move takes --motion-time seconds
    #[value(alias = "3")]
    ConstantTime,
}

impl From<ModeArg> for OperationMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::ConstantVelocity => Self::ConstantVelocity,
            ModeArg::VelocitySweep => Self::VelocitySweep,
            ModeArg::ConstantTime => Self::ConstantTime,
        }
    }
}

/// Inputs shared by `run` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Operation mode
    #[arg(long, value_enum, value_name = "MODE")]
    pub mode: ModeArg,
    /// Stall-guard profile id (sample tube)
    #[arg(long, value_name = "ID")]
    pub profile: u8,
    /// Target field in mT; selects the distance unless --distance is given
    #[arg(long, value_name = "MT", allow_negative_numbers = true)]
    pub field: f64,
    /// Transients per slice (NS)
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub transients: u32,
    /// Number of slices (TD)
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub slices: u32,
    /// Speed in cm/s (defaults to motion.speed_cm_s)
    #[arg(long, value_name = "CM_S")]
    pub speed: Option<f64>,
    /// Acceleration in cm/s² (defaults to motion.accel_cm_s2)
    #[arg(long, value_name = "CM_S2")]
    pub accel: Option<f64>,
    /// Explicit travel distance in cm
    #[arg(long, value_name = "CM", allow_negative_numbers = true)]
    pub distance: Option<f64>,
    /// One-way motion time in seconds (constant-time mode)
    #[arg(long = "motion-time", value_name = "S")]
    pub motion_time: Option<f64>,
    /// Velocity-sweep ramp over z (cm) and Bz (mT)
    #[arg(long, value_name = "EXPR")]
    pub ramp: Option<String>,
}

impl RunArgs {
    pub fn to_parameters(&self) -> RunParameters {
        RunParameters {
            transients: self.transients,
            slices: self.slices,
            speed_cm_s: self.speed,
            accel_cm_s2: self.accel,
            distance_cm: self.distance,
            motion_time_s: self.motion_time,
            ramp: self.ramp.clone(),
            ..RunParameters::new(self.mode.into(), self.profile, self.field)
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Shuttle the sample for the requested scans
    Run {
        #[command(flatten)]
        args: RunArgs,
        /// Wait temperature.equilibration_s before the first move
        #[arg(long, action = ArgAction::SetTrue)]
        wait_equilibration: bool,
    },
    /// Validate inputs and print the motion plan without moving
    Plan {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Open the motor module and read its status
    SelfCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_mode_alias_parses() {
        let cli = Cli::try_parse_from([
            "shuttle", "plan", "--mode", "2", "--profile", "1", "--field", "1000",
        ])
        .unwrap();
        match cli.cmd {
            Commands::Plan { args } => assert_eq!(args.mode, ModeArg::VelocitySweep),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn run_args_map_to_parameters() {
        let cli = Cli::try_parse_from([
            "shuttle",
            "run",
            "--mode",
            "constant-time",
            "--profile",
            "2",
            "--field",
            "500",
            "--transients",
            "4",
            "--motion-time",
            "1.5",
        ])
        .unwrap();
        let Commands::Run { args, .. } = cli.cmd else {
            panic!("expected run");
        };
        let p = args.to_parameters();
        assert_eq!(p.mode, OperationMode::ConstantTime);
        assert_eq!(p.stall_profile, 2);
        assert_eq!(p.transients, 4);
        assert_eq!(p.slices, 1);
        assert_eq!(p.motion_time_s, Some(1.5));
        assert!(p.speed_cm_s.is_none());
    }
}

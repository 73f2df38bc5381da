#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core shuttle logic (hardware-agnostic).
//!
//! This crate moves an NMR sample between the magnet centre and a height
//! where the field has a requested value. All hardware interactions go
//! through the `shuttle_traits::ShuttleMotor` trait.
//!
//! ## Architecture
//!
//! - **Field model**: field/height mapping from a fitted curve or a measured table (`field`)
//! - **Ramp**: velocity-sweep scaling expressions in `z` and `Bz` (`ramp`)
//! - **Units**: cm and cm/s to motor steps and internal speed/acceleration units (`units`)
//! - **Planner**: per-mode speed, distance and motion time (`planner`)
//! - **Motion**: the polling state machine that follows the firmware program (`motion`)
//! - **Summary**: error count, transient messages and exit code (`summary`)
//!
//! Distances are in cm, speeds in cm/s, fields in mT.

pub mod builder;
pub mod config;
pub mod conversions;
pub mod error;
pub mod field;
pub mod hw_error;
pub mod mocks;
pub mod motion;
pub mod planner;
pub mod ramp;
pub mod runner;
pub mod status;
pub mod summary;
pub mod units;
pub mod util;

pub use builder::{Missing, Set, Shuttle, ShuttleBuilder, build_shuttle};
pub use config::{
    IoMap, LowFieldCoil, MotionDefaults, MotorModel, MotorSettings, PollCfg, ShuttleConfig,
    StallProfile,
};
pub use error::{AbortReason, BuildError, Report, Result, ShuttleError};
pub use field::{FieldFit, FieldModel, FieldPositionModel, FieldTable};
pub use motion::{MotionPhase, MotionState, PositionSense, ShuttleCore};
pub use planner::{OperationMode, RunParameters, RunPlan};
pub use ramp::{RampExpr, RampVariable};
pub use runner::{RunHooks, run};
pub use status::ShuttleStatus;
pub use summary::{RunOutcome, RunSummary, SummaryJson};
pub use units::MotorUnits;

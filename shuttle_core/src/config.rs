//! Configuration types for the shuttle control loop.
//!
//! These are the runtime configuration structs used by `ShuttleCore`.
//! They are separate from the TOML-deserialized config in `shuttle_config`.

use std::time::Duration;

use serde::Serialize;

use crate::field::{FieldFit, FieldModel, FieldPositionModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MotorModel {
    #[serde(rename = "TMCM-1160")]
    Tmcm1160,
    #[serde(rename = "TMCM-1060")]
    Tmcm1060,
}

/// Drive train settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorSettings {
    pub model: MotorModel,
    /// Sign of the actual position when the sample is above the magnet.
    pub direction: i8,
    pub full_step_rot: u32,
    pub pulse_divisor: u8,
    pub ramp_divisor: u8,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            model: MotorModel::Tmcm1160,
            direction: -1,
            full_step_rot: 200,
            pulse_divisor: 3,
            ramp_divisor: 7,
        }
    }
}

/// stallGuard2 settings for one sample tube.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StallProfile {
    pub id: u8,
    pub name: String,
    pub run_current: u8,
    pub standby_current: u8,
    pub filter: bool,
    pub threshold: i8,
    pub stop_on_stall: i32,
}

impl StallProfile {
    /// Profiles for the 5, 8 and 10 mm tubes.
    #[must_use]
    pub fn builtin() -> Vec<Self> {
        let p = |id: u8, name: &str, run_current: u8, standby_current: u8, threshold: i8| Self {
            id,
            name: name.to_string(),
            run_current,
            standby_current,
            filter: true,
            threshold,
            stop_on_stall: 1000,
        };
        vec![
            p(1, "5 mm tube", 64, 16, 6),
            p(2, "8 mm tube", 80, 16, 8),
            p(3, "10 mm tube", 128, 48, 4),
        ]
    }
}

/// Defaults applied when a run leaves speed, acceleration or ramp unset.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionDefaults {
    pub speed_cm_s: f64,
    pub accel_cm_s2: f64,
    pub max_speed_cm_s: f64,
    pub ramp: String,
}

impl Default for MotionDefaults {
    fn default() -> Self {
        Self {
            speed_cm_s: 25.0,
            accel_cm_s2: 22.74,
            max_speed_cm_s: 30.5,
            ramp: "1-0.9/(1+exp(-0.001*(Bz-5000)))".to_string(),
        }
    }
}

/// Auxiliary coil that produces a known low field at a fixed height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowFieldCoil {
    pub field_mt: f64,
    pub distance_cm: f64,
}

/// Firmware I/O contract of the motor module program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoMap {
    pub light_gate_input: u8,
    pub position_variable: u8,
    pub error_variable: u8,
    pub distance_variable: u8,
}

impl Default for IoMap {
    fn default() -> Self {
        Self {
            light_gate_input: 10,
            position_variable: 8,
            error_variable: 9,
            distance_variable: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollCfg {
    pub interval_ms: u64,
    /// Consecutive failed reads tolerated before aborting.
    pub max_read_failures: u32,
}

impl Default for PollCfg {
    fn default() -> Self {
        Self {
            interval_ms: 20,
            max_read_failures: 3,
        }
    }
}

/// Static configuration for a run. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ShuttleConfig {
    pub motor: MotorSettings,
    pub max_height_cm: f64,
    pub wheel_circumference_cm: f64,
    pub b0_mt: f64,
    pub field: FieldPositionModel,
    pub motion: MotionDefaults,
    pub stall_profiles: Vec<StallProfile>,
    /// `None` when the coil is disabled.
    pub low_field_coil: Option<LowFieldCoil>,
    pub equilibration: Duration,
    pub io: IoMap,
    pub poll: PollCfg,
}

impl Default for ShuttleConfig {
    fn default() -> Self {
        let b0_mt = 7056.391_97;
        let max_height_cm = 90.0;
        Self {
            motor: MotorSettings::default(),
            max_height_cm,
            wheel_circumference_cm: 25.0,
            b0_mt,
            field: FieldPositionModel::new(
                FieldModel::Analytic(FieldFit {
                    b0_mt,
                    a: 5.75,
                    b: 20.34,
                }),
                max_height_cm,
            ),
            motion: MotionDefaults::default(),
            stall_profiles: StallProfile::builtin(),
            low_field_coil: None,
            equilibration: Duration::from_secs(30),
            io: IoMap::default(),
            poll: PollCfg::default(),
        }
    }
}

impl ShuttleConfig {
    #[must_use]
    pub fn stall_profile(&self, id: u8) -> Option<&StallProfile> {
        self.stall_profiles.iter().find(|p| p.id == id)
    }
}

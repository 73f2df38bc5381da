//! Conversions bridging `shuttle_config` types to `shuttle_core` types.

use std::time::Duration;

use crate::config::{
    IoMap, LowFieldCoil, MotionDefaults, MotorModel, MotorSettings, PollCfg, ShuttleConfig,
    StallProfile,
};
use crate::error::{Result, ShuttleError};
use crate::field::{FieldFit, FieldModel, FieldPositionModel, FieldTable};

// ── MotorSettings ────────────────────────────────────────────────────────────

impl From<shuttle_config::MotorModel> for MotorModel {
    fn from(m: shuttle_config::MotorModel) -> Self {
        match m {
            shuttle_config::MotorModel::Tmcm1160 => Self::Tmcm1160,
            shuttle_config::MotorModel::Tmcm1060 => Self::Tmcm1060,
        }
    }
}

impl From<&shuttle_config::MotorCfg> for MotorSettings {
    fn from(c: &shuttle_config::MotorCfg) -> Self {
        Self {
            model: c.model.into(),
            direction: c.direction,
            full_step_rot: c.full_step_rot,
            pulse_divisor: c.pulse_divisor,
            ramp_divisor: c.ramp_divisor,
        }
    }
}

// ── StallProfile ─────────────────────────────────────────────────────────────

impl From<&shuttle_config::StallProfileCfg> for StallProfile {
    fn from(c: &shuttle_config::StallProfileCfg) -> Self {
        Self {
            id: c.id,
            name: c.name.clone().unwrap_or_else(|| format!("profile {}", c.id)),
            run_current: c.run_current,
            standby_current: c.standby_current,
            filter: c.filter != 0,
            threshold: c.threshold,
            stop_on_stall: c.stop_on_stall,
        }
    }
}

// ── MotionDefaults ───────────────────────────────────────────────────────────

impl From<&shuttle_config::MotionCfg> for MotionDefaults {
    fn from(c: &shuttle_config::MotionCfg) -> Self {
        Self {
            speed_cm_s: c.speed_cm_s,
            accel_cm_s2: c.accel_cm_s2,
            max_speed_cm_s: c.max_speed_cm_s,
            ramp: c.ramp.clone(),
        }
    }
}

// ── LowFieldCoil ─────────────────────────────────────────────────────────────

impl LowFieldCoil {
    /// `None` when the configured coil field is zero or not a number.
    #[must_use]
    pub fn from_cfg(c: &shuttle_config::LowFieldCoilCfg) -> Option<Self> {
        (c.field_mt.is_finite() && c.field_mt > 0.0).then_some(Self {
            field_mt: c.field_mt,
            distance_cm: c.distance_cm,
        })
    }
}

// ── IoMap / PollCfg ──────────────────────────────────────────────────────────

impl From<&shuttle_config::IoCfg> for IoMap {
    fn from(c: &shuttle_config::IoCfg) -> Self {
        Self {
            light_gate_input: c.light_gate_input,
            position_variable: c.position_variable,
            error_variable: c.error_variable,
            distance_variable: c.distance_variable,
        }
    }
}

impl From<&shuttle_config::PollCfg> for PollCfg {
    fn from(c: &shuttle_config::PollCfg) -> Self {
        Self {
            interval_ms: c.interval_ms,
            max_read_failures: c.max_read_failures,
        }
    }
}

// ── FieldTable ───────────────────────────────────────────────────────────────

impl TryFrom<&shuttle_config::FieldMap> for FieldTable {
    type Error = ShuttleError;
    fn try_from(m: &shuttle_config::FieldMap) -> std::result::Result<Self, Self::Error> {
        let points: Vec<(f64, f64)> = m.rows.iter().map(|r| (r.distance, r.field)).collect();
        Self::from_points(&points)
    }
}

// ── ShuttleConfig ────────────────────────────────────────────────────────────

impl ShuttleConfig {
    /// Build the runtime config from a validated TOML config. `field_map` must
    /// be provided when the config selects a measured table.
    pub fn from_config(
        cfg: &shuttle_config::Config,
        field_map: Option<&shuttle_config::FieldMap>,
    ) -> Result<Self> {
        let model = match (&cfg.field.fit, field_map) {
            (Some(fit), _) => FieldModel::Analytic(FieldFit {
                b0_mt: cfg.field.b0_mt,
                a: fit.a,
                b: fit.b,
            }),
            (None, Some(map)) => FieldModel::Table(FieldTable::try_from(map)?),
            (None, None) => {
                return Err(eyre::Report::new(ShuttleError::Configuration(
                    "field map selected but no table was loaded".into(),
                )));
            }
        };

        Ok(Self {
            motor: (&cfg.motor).into(),
            max_height_cm: cfg.geometry.max_height_cm,
            wheel_circumference_cm: cfg.geometry.wheel_circumference_cm,
            b0_mt: cfg.field.b0_mt,
            field: FieldPositionModel::new(model, cfg.geometry.max_height_cm),
            motion: (&cfg.motion).into(),
            stall_profiles: cfg.stall_profiles.iter().map(StallProfile::from).collect(),
            low_field_coil: LowFieldCoil::from_cfg(&cfg.low_field_coil),
            equilibration: Duration::from_secs(cfg.temperature.equilibration_s),
            io: (&cfg.io).into(),
            poll: (&cfg.poll).into(),
        })
    }
}

//! Run parameter validation and motion planning.
//!
//! `RunParameters::plan` turns one invocation's inputs into a `RunPlan`:
//! stall profile lookup, distance resolution from the target field, physical
//! limit checks and an estimate of the one-way motion time for each mode.

use std::fmt;

use serde::Serialize;

use crate::config::{ShuttleConfig, StallProfile};
use crate::error::{Result, ShuttleError};
use crate::ramp::{RampExpr, RampVariable};
use crate::units;

/// Integration steps (distance or field) for the velocity-sweep time estimate.
const SWEEP_STEPS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationMode {
    ConstantVelocity,
    VelocitySweep,
    ConstantTime,
}

impl TryFrom<u8> for OperationMode {
    type Error = ShuttleError;
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::ConstantVelocity),
            2 => Ok(Self::VelocitySweep),
            3 => Ok(Self::ConstantTime),
            other => Err(ShuttleError::Configuration(format!(
                "unknown operation mode {other}"
            ))),
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConstantVelocity => "constant velocity",
            Self::VelocitySweep => "velocity sweep",
            Self::ConstantTime => "constant time",
        })
    }
}

/// Inputs for one run. Unset speed, acceleration and ramp use config defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
    pub mode: OperationMode,
    pub stall_profile: u8,
    pub target_field_mt: f64,
    pub transients: u32,
    pub slices: u32,
    pub speed_cm_s: Option<f64>,
    pub accel_cm_s2: Option<f64>,
    /// Overrides the distance derived from the target field.
    pub distance_cm: Option<f64>,
    /// Required in constant-time mode.
    pub motion_time_s: Option<f64>,
    pub ramp: Option<String>,
}

impl RunParameters {
    #[must_use]
    pub fn new(mode: OperationMode, stall_profile: u8, target_field_mt: f64) -> Self {
        Self {
            mode,
            stall_profile,
            target_field_mt,
            transients: 1,
            slices: 1,
            speed_cm_s: None,
            accel_cm_s2: None,
            distance_cm: None,
            motion_time_s: None,
            ramp: None,
        }
    }
}

/// Validated plan for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPlan {
    pub mode: OperationMode,
    pub profile: StallProfile,
    pub target_field_mt: f64,
    pub distance_cm: f64,
    pub speed_cm_s: f64,
    pub accel_cm_s2: f64,
    #[serde(serialize_with = "ser_ramp")]
    pub ramp: Option<RampExpr>,
    /// Estimated one-way travel time.
    pub motion_time_s: f64,
    pub transients: u32,
    pub slices: u32,
}

fn ser_ramp<S: serde::Serializer>(
    ramp: &Option<RampExpr>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match ramp {
        Some(r) => s.serialize_some(r.source()),
        None => s.serialize_none(),
    }
}

fn out_of_range(msg: String) -> eyre::Report {
    eyre::Report::new(ShuttleError::OutOfRange(msg))
}

fn configuration(msg: String) -> eyre::Report {
    eyre::Report::new(ShuttleError::Configuration(msg))
}

/// Distance for a target field: the low-field coil position when the target
/// matches the coil, 0 when it matches B0, otherwise the field model inverse.
pub fn resolve_distance(cfg: &ShuttleConfig, target_field_mt: f64) -> Result<f64> {
    if !(target_field_mt.is_finite() && target_field_mt > 0.0) {
        return Err(out_of_range(format!(
            "target field {target_field_mt} mT must be > 0"
        )));
    }
    let z = if let Some(coil) = cfg.low_field_coil
        && target_field_mt == coil.field_mt
    {
        coil.distance_cm
    } else if target_field_mt == cfg.b0_mt {
        0.0
    } else {
        cfg.field.distance_for_field(target_field_mt)?
    };
    check_distance(cfg, z)?;
    Ok(z)
}

fn check_distance(cfg: &ShuttleConfig, z: f64) -> Result<()> {
    if !(z.is_finite() && (0.0..=cfg.max_height_cm).contains(&z)) {
        return Err(out_of_range(format!(
            "distance {z:.3} cm outside [0, {}]",
            cfg.max_height_cm
        )));
    }
    Ok(())
}

/// Trapezoidal/triangular profile time for distance `d` at cruise `v` and accel `a`.
#[must_use]
pub fn constant_velocity_time(d: f64, v: f64, a: f64) -> f64 {
    let t_acc = v / a;
    if a * t_acc * t_acc >= d {
        2.0 * (d / a).sqrt()
    } else {
        2.0 * t_acc + (d - a * t_acc * t_acc) / v
    }
}

/// Cruise speed that covers `d` in time `t` with acceleration `a`.
pub fn constant_time_speed(d: f64, a: f64, t: f64) -> std::result::Result<f64, ShuttleError> {
    let disc = a * t * t - 4.0 * d;
    if disc < 0.0 {
        return Err(ShuttleError::OutOfRange(format!(
            "distance {d:.2} cm cannot be covered in {t} s at {a} cm/s²"
        )));
    }
    Ok(0.5 * (a * t - a.sqrt() * disc.sqrt()))
}

/// Travel time for a sweep from 0 to `d`, integrating `speed * ramp` over
/// equal distance steps with trapezoidal averaging.
pub fn sweep_time(
    cfg: &ShuttleConfig,
    ramp: &RampExpr,
    d: f64,
    speed: f64,
) -> std::result::Result<f64, ShuttleError> {
    if d <= 0.0 {
        return Ok(0.0);
    }
    let dz = d / f64::from(SWEEP_STEPS);
    let speed_at = |z: f64| -> std::result::Result<f64, ShuttleError> {
        let b = cfg.field.field_for_distance(z)?;
        Ok(speed * ramp.eval(z, b))
    };
    let mut last = speed_at(0.0)?;
    let mut t = 0.0;
    for i in 1..=SWEEP_STEPS {
        let cur = speed_at(f64::from(i) * dz)?;
        let avg = 0.5 * (cur + last);
        if !(avg.is_finite() && avg > 0.0) {
            return Err(ShuttleError::OutOfRange(format!(
                "ramp gives non-positive speed near z = {:.2} cm",
                f64::from(i) * dz
            )));
        }
        t += dz / avg;
        last = cur;
    }
    Ok(t)
}

/// Travel time for a sweep from B0 down to `target_field_mt`, stepping the
/// field in equal decrements and mapping each step to its position.
pub fn field_sweep_time(
    cfg: &ShuttleConfig,
    ramp: &RampExpr,
    target_field_mt: f64,
    speed: f64,
) -> std::result::Result<f64, ShuttleError> {
    let span = cfg.b0_mt - target_field_mt;
    if span <= 0.0 {
        return Ok(0.0);
    }
    let point = |i: u32| -> std::result::Result<(f64, f64, f64), ShuttleError> {
        let b = cfg.b0_mt - span * f64::from(i) / f64::from(SWEEP_STEPS);
        let z = if i == 0 {
            0.0
        } else {
            cfg.field.distance_for_field(b)?
        };
        Ok((z, b, speed * ramp.eval(z, b)))
    };
    let (mut last_z, _, mut last_v) = point(0)?;
    let mut t = 0.0;
    for i in 1..=SWEEP_STEPS {
        let (z, b, v) = point(i)?;
        let avg = 0.5 * (v + last_v);
        if !(avg.is_finite() && avg > 0.0) {
            return Err(ShuttleError::OutOfRange(format!(
                "ramp gives non-positive speed near {b:.1} mT"
            )));
        }
        t += (z - last_z).abs() / avg;
        last_z = z;
        last_v = v;
    }
    Ok(t)
}

impl RunParameters {
    /// Validate against `cfg` and produce a plan. Errors carry a typed
    /// `ShuttleError` for exit code mapping.
    pub fn plan(&self, cfg: &ShuttleConfig) -> Result<RunPlan> {
        let profile = cfg
            .stall_profile(self.stall_profile)
            .cloned()
            .ok_or_else(|| configuration(format!("unknown stall profile {}", self.stall_profile)))?;
        if self.transients == 0 {
            return Err(configuration("transients must be >= 1".into()));
        }
        if self.slices == 0 {
            return Err(configuration("slices must be >= 1".into()));
        }

        let distance_cm = match self.distance_cm {
            Some(d) => {
                check_distance(cfg, d)?;
                d
            }
            None => resolve_distance(cfg, self.target_field_mt)?,
        };

        let accel = self.accel_cm_s2.unwrap_or(cfg.motion.accel_cm_s2);
        let max_accel = units::max_accel_cm_s2(
            cfg.motor.model,
            cfg.wheel_circumference_cm,
            cfg.motor.pulse_divisor,
            cfg.motor.ramp_divisor,
        );
        if !(accel.is_finite() && accel > 0.0) || max_accel.is_some_and(|m| accel > m) {
            return Err(out_of_range(format!(
                "acceleration {accel} cm/s² outside (0, {}]",
                max_accel.map_or_else(|| "inf".to_string(), |m| format!("{m:.2}"))
            )));
        }

        let mut ramp = None;
        let (speed, motion_time_s) = match self.mode {
            OperationMode::ConstantVelocity => {
                let v = self.speed_cm_s.unwrap_or(cfg.motion.speed_cm_s);
                (v, constant_velocity_time(distance_cm, v, accel))
            }
            OperationMode::VelocitySweep => {
                let v = self.speed_cm_s.unwrap_or(cfg.motion.speed_cm_s);
                let src = self.ramp.as_deref().unwrap_or(&cfg.motion.ramp);
                let expr = RampExpr::parse(src)?;
                check_speed(cfg, v)?;
                // Field ramps step the field, unless the distance does not come
                // from the field model.
                let by_field = expr.primary_variable() == RampVariable::Field
                    && self.distance_cm.is_none()
                    && !cfg
                        .low_field_coil
                        .is_some_and(|c| c.field_mt == self.target_field_mt);
                let t = if by_field {
                    field_sweep_time(cfg, &expr, self.target_field_mt, v)?
                } else {
                    sweep_time(cfg, &expr, distance_cm, v)?
                };
                ramp = Some(expr);
                (v, t)
            }
            OperationMode::ConstantTime => {
                let t = self.motion_time_s.ok_or_else(|| {
                    configuration("constant-time mode requires a motion time".into())
                })?;
                if !(t.is_finite() && t > 0.0) {
                    return Err(out_of_range(format!("motion time {t} s must be > 0")));
                }
                (constant_time_speed(distance_cm, accel, t)?, t)
            }
        };
        check_speed(cfg, speed)?;

        Ok(RunPlan {
            mode: self.mode,
            profile,
            target_field_mt: self.target_field_mt,
            distance_cm,
            speed_cm_s: speed,
            accel_cm_s2: accel,
            ramp,
            motion_time_s,
            transients: self.transients,
            slices: self.slices,
        })
    }
}

fn check_speed(cfg: &ShuttleConfig, v: f64) -> Result<()> {
    if !(v.is_finite() && v > 0.0 && v <= cfg.motion.max_speed_cm_s) {
        return Err(out_of_range(format!(
            "speed {v:.3} cm/s outside (0, {}]",
            cfg.motion.max_speed_cm_s
        )));
    }
    Ok(())
}

impl fmt::Display for RunPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode:          {}", self.mode)?;
        writeln!(f, "Stall profile: {} ({})", self.profile.id, self.profile.name)?;
        writeln!(f, "Target field:  {} mT", self.target_field_mt)?;
        writeln!(f, "Distance:      {:.2} cm", self.distance_cm)?;
        writeln!(f, "Speed:         {:.2} cm/s", self.speed_cm_s)?;
        writeln!(f, "Acceleration:  {:.2} cm/s²", self.accel_cm_s2)?;
        if let Some(r) = &self.ramp {
            writeln!(f, "Ramp:          {r}")?;
        }
        writeln!(f, "Motion time:   {:.3} s", self.motion_time_s)?;
        write!(f, "Scans:         {} x {} slice(s)", self.transients, self.slices)
    }
}

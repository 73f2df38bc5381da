#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and field-map parsing for the sample shuttle.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The field-map CSV loader enforces headers and a strictly monotonic
//!   distance/field relationship before the table is handed to the core.
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Field-map CSV schema.
///
/// Expected headers:
/// distance,field
///
/// Example:
/// distance,field
/// 0.0,7056.4
/// 10.0,6950.2
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct FieldMapRow {
    /// Distance above the magnet centre in cm
    pub distance: f64,
    /// Field strength at that distance in mT
    pub field: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotorModel {
    #[default]
    #[serde(rename = "TMCM-1160")]
    Tmcm1160,
    #[serde(rename = "TMCM-1060")]
    Tmcm1060,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotorCfg {
    /// Serial device path. When absent the port is found by USB description.
    pub port: Option<String>,
    pub port_description: String,
    pub baud_rate: u32,
    pub module_address: u8,
    /// Max time to wait for a command reply before failing
    pub reply_timeout_ms: u64,
    pub model: MotorModel,
    /// +1 or -1; sign of actual position when the sample is above the magnet
    pub direction: i8,
    pub full_step_rot: u32,
    pub pulse_divisor: u8,
    pub ramp_divisor: u8,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            port: None,
            port_description: "Trinamic Stepper Device".to_string(),
            baud_rate: 9600,
            module_address: 1,
            reply_timeout_ms: 200,
            model: MotorModel::Tmcm1160,
            direction: -1,
            full_step_rot: 200,
            pulse_divisor: 3,
            ramp_divisor: 7,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GeometryCfg {
    pub max_height_cm: f64,
    pub wheel_circumference_cm: f64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct FieldFit {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Deserialize)]
pub struct FieldCfg {
    /// Field at the magnet centre (distance 0) in mT
    pub b0_mt: f64,
    /// Analytic fit B(z) = B0 / (1 + (z/b)^a)
    #[serde(default)]
    pub fit: Option<FieldFit>,
    /// Measured distance,field table; relative paths resolve against the config file
    #[serde(default)]
    pub map_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    pub speed_cm_s: f64,
    pub accel_cm_s2: f64,
    pub max_speed_cm_s: f64,
    /// Default velocity-sweep ramp over `z` (cm) and/or `Bz` (mT)
    pub ramp: String,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            speed_cm_s: 25.0,
            accel_cm_s2: 22.74,
            max_speed_cm_s: 30.5,
            ramp: "1-0.9/(1+exp(-0.001*(Bz-5000)))".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LowFieldCoilCfg {
    /// Field produced by the low-field coil; 0 disables the override
    pub field_mt: f64,
    pub distance_cm: f64,
}

impl Default for LowFieldCoilCfg {
    fn default() -> Self {
        Self {
            field_mt: 0.0,
            distance_cm: 150.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TemperatureCfg {
    pub equilibration_s: u64,
}

impl Default for TemperatureCfg {
    fn default() -> Self {
        Self { equilibration_s: 30 }
    }
}

/// Firmware I/O contract of the shuttle's motor module program.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IoCfg {
    pub light_gate_input: u8,
    pub position_variable: u8,
    pub error_variable: u8,
    pub distance_variable: u8,
}

impl Default for IoCfg {
    fn default() -> Self {
        Self {
            light_gate_input: 10,
            position_variable: 8,
            error_variable: 9,
            distance_variable: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollCfg {
    pub interval_ms: u64,
    /// Consecutive failed reads tolerated before the run is aborted
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

#[derive(Debug, Deserialize, Clone)]
pub struct StallProfileCfg {
    pub id: u8,
    #[serde(default)]
    pub name: Option<String>,
    pub run_current: u8,
    pub standby_current: u8,
    /// stallGuard2 filter; 0 or 1
    pub filter: u8,
    /// stallGuard2 threshold, -64..=63
    pub threshold: i8,
    /// Stop-on-stall velocity in internal units
    pub stop_on_stall: i32,
}

fn default_stall_profiles() -> Vec<StallProfileCfg> {
    let p = |id: u8, name: &str, run_current, threshold| StallProfileCfg {
        id,
        name: Some(name.to_string()),
        run_current,
        standby_current: 16,
        filter: 1,
        threshold,
        stop_on_stall: 1000,
    };
    vec![
        p(1, "5 mm tube", 64, 6),
        p(2, "8 mm tube", 80, 8),
        StallProfileCfg {
            standby_current: 48,
            ..p(3, "10 mm tube", 128, 4)
        },
    ]
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub motor: MotorCfg,
    pub geometry: GeometryCfg,
    pub field: FieldCfg,
    #[serde(default)]
    pub motion: MotionCfg,
    #[serde(default)]
    pub low_field_coil: LowFieldCoilCfg,
    #[serde(default)]
    pub temperature: TemperatureCfg,
    #[serde(default)]
    pub io: IoCfg,
    #[serde(default)]
    pub poll: PollCfg,
    #[serde(default = "default_stall_profiles")]
    pub stall_profiles: Vec<StallProfileCfg>,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Highest speed (cm/s) a TMCM-1160 can be commanded for a given pulse divisor.
#[must_use]
pub fn tmcm1160_speed_limit(circumference_cm: f64, pulse_divisor: u8) -> f64 {
    circumference_cm * 9.765_625 / 2f64.powi(i32::from(pulse_divisor))
}

/// Validated distance/field table, distance ascending and field descending.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap {
    pub rows: Vec<FieldMapRow>,
}

impl FieldMap {
    pub fn from_rows(rows: Vec<FieldMapRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("field map requires at least two rows, got {}", rows.len());
        }
        for (i, r) in rows.iter().enumerate() {
            if !(r.distance.is_finite() && r.field.is_finite()) {
                eyre::bail!("field map row {} has a non-finite value", i + 1);
            }
        }
        for (i, w) in rows.windows(2).enumerate() {
            if w[1].distance <= w[0].distance {
                eyre::bail!(
                    "field map distances must be strictly increasing (rows {} and {})",
                    i + 1,
                    i + 2
                );
            }
            if w[1].field >= w[0].field {
                eyre::bail!(
                    "field map fields must be strictly decreasing with distance (rows {} and {})",
                    i + 1,
                    i + 2
                );
            }
        }
        Ok(Self { rows })
    }
}

impl TryFrom<Vec<FieldMapRow>> for FieldMap {
    type Error = eyre::Report;
    fn try_from(rows: Vec<FieldMapRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_field_map_csv(path: &Path) -> eyre::Result<FieldMap> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open field map CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["distance", "field"];
    let actual: Vec<String> = headers.iter().map(str::to_lowercase).collect();
    if actual != expected {
        eyre::bail!(
            "field map CSV must have headers 'distance,field', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<FieldMapRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    FieldMap::try_from(rows)
}

impl Config {
    /// Field map path resolved against the directory holding the config file.
    #[must_use]
    pub fn field_map_path(&self, config_dir: &Path) -> Option<PathBuf> {
        self.field.map_file.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                config_dir.join(p)
            }
        })
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Motor
        if self.motor.direction != 1 && self.motor.direction != -1 {
            eyre::bail!("motor.direction must be 1 or -1");
        }
        if self.motor.full_step_rot == 0 {
            eyre::bail!("motor.full_step_rot must be > 0");
        }
        if self.motor.baud_rate == 0 {
            eyre::bail!("motor.baud_rate must be > 0");
        }
        if self.motor.reply_timeout_ms == 0 {
            eyre::bail!("motor.reply_timeout_ms must be >= 1");
        }
        if self.motor.pulse_divisor > 13 {
            eyre::bail!("motor.pulse_divisor must be in [0, 13]");
        }
        if self.motor.ramp_divisor > 13 {
            eyre::bail!("motor.ramp_divisor must be in [0, 13]");
        }

        // Geometry
        if !(self.geometry.max_height_cm.is_finite() && self.geometry.max_height_cm > 0.0) {
            eyre::bail!("geometry.max_height_cm must be > 0");
        }
        if !(self.geometry.wheel_circumference_cm.is_finite()
            && self.geometry.wheel_circumference_cm > 0.0)
        {
            eyre::bail!("geometry.wheel_circumference_cm must be > 0");
        }

        // Field
        if !(self.field.b0_mt.is_finite() && self.field.b0_mt > 0.0) {
            eyre::bail!("field.b0_mt must be > 0");
        }
        match (&self.field.fit, &self.field.map_file) {
            (Some(_), Some(_)) | (None, None) => {
                eyre::bail!("field must set exactly one of fit or map_file");
            }
            (Some(fit), None) => {
                if !(fit.a.is_finite() && fit.a > 0.0) {
                    eyre::bail!("field.fit.a must be > 0");
                }
                if !(fit.b.is_finite() && fit.b > 0.0) {
                    eyre::bail!("field.fit.b must be > 0");
                }
            }
            (None, Some(_)) => {}
        }

        // Motion
        if !(self.motion.speed_cm_s.is_finite() && self.motion.speed_cm_s > 0.0) {
            eyre::bail!("motion.speed_cm_s must be > 0");
        }
        if !(self.motion.accel_cm_s2.is_finite() && self.motion.accel_cm_s2 > 0.0) {
            eyre::bail!("motion.accel_cm_s2 must be > 0");
        }
        if !(self.motion.max_speed_cm_s.is_finite() && self.motion.max_speed_cm_s > 0.0) {
            eyre::bail!("motion.max_speed_cm_s must be > 0");
        }
        if self.motion.speed_cm_s > self.motion.max_speed_cm_s {
            eyre::bail!("motion.speed_cm_s must be <= motion.max_speed_cm_s");
        }
        if self.motor.model == MotorModel::Tmcm1160 {
            let limit =
                tmcm1160_speed_limit(self.geometry.wheel_circumference_cm, self.motor.pulse_divisor);
            if self.motion.max_speed_cm_s > limit {
                eyre::bail!(
                    "motion.max_speed_cm_s must be <= {limit:.2} for TMCM-1160 with pulse_divisor {}",
                    self.motor.pulse_divisor
                );
            }
        }
        if self.motion.ramp.trim().is_empty() {
            eyre::bail!("motion.ramp must not be empty");
        }

        // Low-field coil
        let coil = &self.low_field_coil;
        if coil.field_mt.is_finite() && coil.field_mt != 0.0 {
            if coil.field_mt < 0.0 {
                eyre::bail!("low_field_coil.field_mt must be >= 0");
            }
            if !(coil.distance_cm >= 0.0 && coil.distance_cm <= self.geometry.max_height_cm) {
                eyre::bail!("low_field_coil.distance_cm must be in [0, geometry.max_height_cm]");
            }
        }

        // Temperature
        if self.temperature.equilibration_s > 24 * 60 * 60 {
            eyre::bail!("temperature.equilibration_s is unreasonably large (>24h)");
        }

        // Poll
        if self.poll.interval_ms == 0 {
            eyre::bail!("poll.interval_ms must be >= 1");
        }
        if self.poll.interval_ms > 1000 {
            eyre::bail!("poll.interval_ms must be <= 1000");
        }

        // Stall profiles
        if self.stall_profiles.is_empty() {
            eyre::bail!("stall_profiles must contain at least one profile");
        }
        for (i, p) in self.stall_profiles.iter().enumerate() {
            if self.stall_profiles[..i].iter().any(|q| q.id == p.id) {
                eyre::bail!("stall_profiles has duplicate id {}", p.id);
            }
            if p.filter > 1 {
                eyre::bail!("stall_profiles[{}].filter must be 0 or 1", p.id);
            }
            if !(-64..=63).contains(&p.threshold) {
                eyre::bail!("stall_profiles[{}].threshold must be in [-64, 63]", p.id);
            }
            if p.stop_on_stall < 0 {
                eyre::bail!("stall_profiles[{}].stop_on_stall must be >= 0", p.id);
            }
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}

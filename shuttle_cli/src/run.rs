//! Config mapping, motor assembly and command execution.

use crate::cancel::Cancellation;
use crate::cli::RunArgs;
use eyre::WrapErr;
use shuttle_core::error::{Result, ShuttleError};
use shuttle_core::hw_error::map_hw_error;
use shuttle_core::{RunHooks, RunPlan, RunSummary, ShuttleConfig};
use shuttle_hardware::SimulatedShuttle;
use shuttle_traits::ShuttleMotor;
use std::path::Path;

/// Stall the simulated shuttle after this many position polls.
pub const ENV_SIM_STALL_AFTER: &str = "SHUTTLE_TEST_SIM_STALL_AFTER";
/// Interrupt the simulated light gate after this many position polls.
pub const ENV_SIM_LIGHT_GATE_AFTER: &str = "SHUTTLE_TEST_SIM_LIGHT_GATE_AFTER";

/// Validated TOML config and the runtime config derived from it.
pub struct Loaded {
    pub cfg: shuttle_config::Config,
    pub shuttle: ShuttleConfig,
}

fn configuration(e: impl std::fmt::Display) -> eyre::Report {
    eyre::Report::new(ShuttleError::Configuration(e.to_string()))
}

/// Read, validate and convert the config file, including its field map.
pub fn load(path: &Path) -> Result<Loaded> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| configuration(format!("read {}: {e}", path.display())))?;
    let cfg = shuttle_config::load_toml(&text)
        .map_err(|e| configuration(format!("parse {}: {e}", path.display())))?;
    cfg.validate().map_err(|e| configuration(format!("{e:#}")))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let field_map = match cfg.field_map_path(dir) {
        Some(p) => {
            let map = shuttle_config::load_field_map_csv(&p)
                .map_err(|e| configuration(format!("{e:#}")))?;
            tracing::debug!(path = %p.display(), rows = map.rows.len(), "field map loaded");
            Some(map)
        }
        None => None,
    };
    let shuttle = ShuttleConfig::from_config(&cfg, field_map.as_ref())
        .wrap_err("build runtime config")?;
    Ok(Loaded { cfg, shuttle })
}

/// Validate run inputs against the config.
pub fn plan(loaded: &Loaded, args: &RunArgs) -> Result<RunPlan> {
    let plan = args.to_parameters().plan(&loaded.shuttle)?;
    tracing::info!(
        mode = %plan.mode,
        distance_cm = plan.distance_cm,
        speed_cm_s = plan.speed_cm_s,
        motion_time_s = plan.motion_time_s,
        "plan ready"
    );
    Ok(plan)
}

fn env_polls(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(var = name, value = %raw, error = %e, "ignoring malformed env var");
            None
        }
    }
}

/// Simulated shuttle matching the config's firmware I/O contract.
pub fn simulated(cfg: &shuttle_config::Config) -> SimulatedShuttle {
    let mut sim = SimulatedShuttle::new()
        .with_io(
            cfg.io.light_gate_input,
            cfg.io.position_variable,
            cfg.io.distance_variable,
        )
        .with_direction(i32::from(cfg.motor.direction));
    if let Some(n) = env_polls(ENV_SIM_STALL_AFTER) {
        sim = sim.with_stall_after(n);
    }
    if let Some(n) = env_polls(ENV_SIM_LIGHT_GATE_AFTER) {
        sim = sim.with_light_gate_fault_after(n);
    }
    sim
}

/// Acquire the motor connection. Without the `hardware` feature the
/// simulated shuttle is always used.
pub fn open_motor(cfg: &shuttle_config::Config, simulate: bool) -> Result<Box<dyn ShuttleMotor>> {
    #[cfg(feature = "hardware")]
    {
        if !simulate {
            let settings = shuttle_hardware::serial::PortSettings {
                path: cfg.motor.port.clone(),
                description: cfg.motor.port_description.clone(),
                baud: cfg.motor.baud_rate,
                address: cfg.motor.module_address,
                reply_timeout: std::time::Duration::from_millis(cfg.motor.reply_timeout_ms),
            };
            let module = shuttle_hardware::serial::open(&settings).wrap_err("open motor port")?;
            return Ok(Box::new(module));
        }
    }
    #[cfg(not(feature = "hardware"))]
    {
        if !simulate {
            tracing::info!("built without hardware support; using the simulated shuttle");
        }
    }
    Ok(Box::new(simulated(cfg)))
}

/// Drive the shuttle for `plan`, cancelling on STOP or Ctrl-C.
pub fn run_shuttle(
    loaded: Loaded,
    plan: RunPlan,
    motor: Box<dyn ShuttleMotor>,
    cancel: Cancellation,
    wait_equilibration: bool,
) -> Result<RunSummary> {
    let hooks = RunHooks {
        clock: None,
        cancel_check: Some(Box::new(move || cancel.requested())),
        wait_equilibration,
    };
    shuttle_core::run(motor, loaded.shuttle, plan, hooks)
}

/// Motor module status read by `self-check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Health {
    pub microstep_resolution: u8,
    pub status_flags: u32,
    pub light_gate_closed: bool,
    pub position_steps: i32,
}

impl Health {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "microstep_resolution": self.microstep_resolution,
            "status_flags": self.status_flags,
            "light_gate_closed": self.light_gate_closed,
            "position_steps": self.position_steps,
        })
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Microstep resolution: {}", self.microstep_resolution)?;
        writeln!(f, "Status flags:         {:#06x}", self.status_flags)?;
        writeln!(
            f,
            "Light gate:           {}",
            if self.light_gate_closed { "closed" } else { "INTERRUPTED" }
        )?;
        write!(f, "Position:             {} steps", self.position_steps)
    }
}

fn device(e: &(dyn std::error::Error + 'static), what: &'static str) -> eyre::Report {
    eyre::Report::new(map_hw_error(e)).wrap_err(what)
}

/// Read the module's status without moving; the connection is closed after.
pub fn self_check(mut motor: Box<dyn ShuttleMotor>, light_gate_input: u8) -> Result<Health> {
    let health = read_health(motor.as_mut(), light_gate_input);
    if let Err(e) = motor.close() {
        tracing::warn!(error = %e, "failed to close motor connection");
    }
    let health = health?;
    tracing::info!(
        flags = health.status_flags,
        light_gate = health.light_gate_closed,
        "self-check done"
    );
    Ok(health)
}

fn read_health(motor: &mut dyn ShuttleMotor, light_gate_input: u8) -> Result<Health> {
    let microstep_resolution = motor
        .microstep_resolution()
        .map_err(|e| device(&*e, "read microstep resolution"))?;
    let status_flags = motor
        .status_flags()
        .map_err(|e| device(&*e, "read status flags"))?;
    let light_gate_closed = motor
        .digital_input(light_gate_input)
        .map_err(|e| device(&*e, "read light gate"))?;
    let position_steps = motor
        .current_position()
        .map_err(|e| device(&*e, "read position"))?;
    Ok(Health {
        microstep_resolution,
        status_flags,
        light_gate_closed,
        position_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_check_reads_simulated_module() {
        let h = self_check(Box::new(SimulatedShuttle::new()), 10).unwrap();
        assert_eq!(
            h,
            Health {
                microstep_resolution: 8,
                status_flags: 0,
                light_gate_closed: true,
                position_steps: 0,
            }
        );
        assert!(h.to_string().contains("closed"));
    }

    #[test]
    fn closed_module_is_a_device_error() {
        let mut sim = SimulatedShuttle::new();
        sim.close().unwrap();
        let err = self_check(Box::new(sim), 10).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShuttleError>(),
            Some(ShuttleError::DeviceCommunication(_))
        ));
    }

    #[test]
    fn missing_config_file_is_a_configuration_error() {
        let err = load(Path::new("/nonexistent/shuttle.toml")).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ShuttleError>(),
            Some(ShuttleError::Configuration(_))
        ));
    }
}

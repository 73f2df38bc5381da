//! The sample-motion control loop (`ShuttleCore`).
//!
//! The motor module runs the actual up/down program; this loop follows it by
//! polling the position-sense variable, watches the light gate and the stall
//! flags, counts transients and slices, and in velocity-sweep mode keeps
//! retargeting the speed from the live position.

use std::sync::Arc;
use std::time::Instant;

use eyre::WrapErr;
use shuttle_traits::{Clock, HwResult, ShuttleMotor};

use crate::config::ShuttleConfig;
use crate::error::{AbortReason, Result, ShuttleError};
use crate::hw_error::map_hw_error;
use crate::planner::{OperationMode, RunPlan};
use crate::status::ShuttleStatus;
use crate::summary::{RunOutcome, RunSummary};
use crate::units::MotorUnits;

/// Value of the firmware's position-sense variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSense {
    Down,
    Up,
    InTransit,
    /// Anything else the firmware reports; logged and ignored.
    Unknown(i32),
}

impl From<i32> for PositionSense {
    fn from(v: i32) -> Self {
        match v {
            0 => Self::Down,
            1 => Self::Up,
            2 => Self::InTransit,
            other => Self::Unknown(other),
        }
    }
}

impl PositionSense {
    #[must_use]
    pub fn raw(self) -> i32 {
        match self {
            Self::Down => 0,
            Self::Up => 1,
            Self::InTransit => 2,
            Self::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionPhase {
    #[default]
    Idle,
    MovingUp,
    AtTop,
    MovingDown,
    AtBottom,
    Done,
    Aborted,
}

impl MotionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

/// Mutable per-run state, owned by the control loop.
#[derive(Debug, Clone, Default)]
pub struct MotionState {
    pub phase: MotionPhase,
    pub up: bool,
    /// Completed transients within the current slice.
    pub transients_done: u32,
    pub slices_done: u32,
    pub errors: u32,
    pub up_since: Option<Instant>,
    pub last_speed: Option<i32>,
    pub read_failures: u32,
}

/// Control loop over a concrete motor type.
pub struct ShuttleCore<M: ShuttleMotor> {
    pub(crate) motor: M,
    pub(crate) config: ShuttleConfig,
    pub(crate) plan: RunPlan,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) cancel_check: Option<Box<dyn Fn() -> bool>>,
    pub(crate) units: Option<MotorUnits>,
    pub(crate) speed_units: i32,
    pub(crate) max_speed_units: i32,
    pub(crate) state: MotionState,
    pub(crate) abort: Option<ShuttleError>,
    pub(crate) summary: RunSummary,
    pub(crate) parked: bool,
    pub(crate) closed: bool,
}

impl<M: ShuttleMotor> core::fmt::Debug for ShuttleCore<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShuttleCore")
            .field("mode", &self.plan.mode)
            .field("phase", &self.state.phase)
            .field("transients_done", &self.state.transients_done)
            .field("slices_done", &self.state.slices_done)
            .field("errors", &self.state.errors)
            .finish_non_exhaustive()
    }
}

impl<M: ShuttleMotor> ShuttleCore<M> {
    #[must_use]
    pub fn phase(&self) -> MotionPhase {
        self.state.phase
    }

    #[must_use]
    pub fn state(&self) -> &MotionState {
        &self.state
    }

    #[must_use]
    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    #[must_use]
    pub fn config(&self) -> &ShuttleConfig {
        &self.config
    }

    #[must_use]
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Unit conversion resolved by `begin()`.
    #[must_use]
    pub fn units(&self) -> Option<&MotorUnits> {
        self.units.as_ref()
    }

    #[must_use]
    pub fn last_speed(&self) -> Option<i32> {
        self.state.last_speed
    }

    #[must_use]
    pub fn motor(&self) -> &M {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut M {
        &mut self.motor
    }

    /// Configure the motor for this run and arm the motion distance.
    ///
    /// Resets per-run state, clears the firmware error flags and the
    /// position latch, loads the stall profile and drive settings, and writes
    /// the step count last, which starts the firmware's shuttle program.
    pub fn begin(&mut self) -> Result<()> {
        self.state = MotionState::default();
        self.abort = None;
        self.summary = RunSummary::start();
        self.parked = false;

        let io = self.config.io;
        let profile = self.plan.profile.clone();
        let motor_cfg = self.config.motor.clone();

        self.write(|m| m.set_user_variable(io.error_variable, 0), "clear error flags")?;
        self.write(
            |m| m.set_user_variable(io.position_variable, PositionSense::Down.raw()),
            "reset position sense",
        )?;
        self.write(|m| m.set_run_current(profile.run_current), "set run current")?;
        self.write(
            |m| m.set_standby_current(profile.standby_current),
            "set standby current",
        )?;
        self.write(
            |m| m.set_stall_guard_filter(profile.filter),
            "set stallGuard2 filter",
        )?;
        self.write(
            |m| m.set_stall_guard_threshold(profile.threshold),
            "set stallGuard2 threshold",
        )?;
        self.write(
            |m| m.set_stop_on_stall(profile.stop_on_stall),
            "set stop-on-stall",
        )?;
        self.write(
            |m| m.set_pulse_divisor(motor_cfg.pulse_divisor),
            "set pulse divisor",
        )?;
        self.write(
            |m| m.set_ramp_divisor(motor_cfg.ramp_divisor),
            "set ramp divisor",
        )?;

        let res = match self.motor.microstep_resolution() {
            Ok(r) => r,
            Err(e) => {
                let mapped = map_hw_error(&*e);
                self.fail(mapped.clone());
                return Err(eyre::Report::new(mapped)).wrap_err("read microstep resolution");
            }
        };
        let units = MotorUnits::new(&motor_cfg, self.config.wheel_circumference_cm, res);
        self.units = Some(units);
        self.speed_units = units.speed_units(self.plan.speed_cm_s);
        self.max_speed_units = units.speed_units(self.config.motion.max_speed_cm_s);
        let accel_units = units.accel_units(self.plan.accel_cm_s2);

        if self.plan.mode == OperationMode::VelocitySweep {
            let max = self.max_speed_units;
            self.write(|m| m.set_max_velocity(max), "set max velocity")?;
            let start = self
                .config
                .field
                .field_for_distance(0.0)
                .ok()
                .and_then(|b| self.sweep_speed(0.0, b))
                .unwrap_or(self.speed_units);
            self.write(|m| m.set_target_speed(start), "set target speed")?;
            self.state.last_speed = Some(start);
        } else {
            let speed = self.speed_units;
            self.write(|m| m.set_max_velocity(speed), "set max velocity")?;
            self.write(|m| m.set_target_speed(speed), "set target speed")?;
            self.state.last_speed = Some(speed);
        }
        self.write(|m| m.set_max_acceleration(accel_units), "set max acceleration")?;

        let steps = units.steps_for_distance(self.plan.distance_cm);
        self.write(
            |m| m.set_user_variable(io.distance_variable, steps),
            "arm motion distance",
        )?;

        tracing::info!(
            mode = %self.plan.mode,
            distance_cm = self.plan.distance_cm,
            steps,
            speed_units = self.speed_units,
            accel_units,
            transients = self.plan.transients,
            slices = self.plan.slices,
            "shuttle armed"
        );
        Ok(())
    }

    /// One poll of the control loop. Does not sleep; the caller paces ticks.
    ///
    /// Abort conditions return `Ok(ShuttleStatus::Aborted(_))`. An `Err`
    /// means a fatal device failure; the run is already marked aborted.
    pub fn step(&mut self) -> Result<ShuttleStatus> {
        match self.state.phase {
            MotionPhase::Done => return Ok(ShuttleStatus::Done),
            MotionPhase::Aborted => {
                let err = self
                    .abort
                    .clone()
                    .unwrap_or(ShuttleError::Abort(AbortReason::UserCancelled));
                return Ok(ShuttleStatus::Aborted(err));
            }
            _ => {}
        }
        if self.units.is_none() {
            return Err(eyre::Report::new(ShuttleError::Configuration(
                "step() called before begin()".into(),
            )));
        }

        if self.cancel_requested() {
            return Ok(self.abort_with(AbortReason::UserCancelled));
        }

        let io = self.config.io;
        let gate = match self.motor.digital_input(io.light_gate_input) {
            Ok(v) => v,
            Err(e) => return self.read_failed("light gate input", &*e),
        };
        if !gate {
            return Ok(self.abort_with(AbortReason::EmergencyStop));
        }

        let flags = match self.motor.status_flags() {
            Ok(f) => f,
            Err(e) => return self.read_failed("status flags", &*e),
        };
        if flags != 0 {
            tracing::error!(flags, "driver status flags set");
            return Ok(self.abort_with(AbortReason::StallDetected));
        }

        let raw = match self.motor.user_variable(io.position_variable) {
            Ok(v) => v,
            Err(e) => return self.read_failed("position sense", &*e),
        };

        let failures = self.state.read_failures;
        let status = self.on_position(PositionSense::from(raw))?;
        // Only a tick whose every read succeeded clears the failure streak.
        if self.state.read_failures == failures {
            self.state.read_failures = 0;
        }
        Ok(status)
    }

    /// Reset the firmware's motion distance so the shuttle stays down.
    pub fn safe_park(&mut self) -> Result<()> {
        self.parked = true;
        let var = self.config.io.distance_variable;
        self.motor
            .set_user_variable(var, 0)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reset motion distance")
    }

    /// Terminate the run: safe-park if not yet done, release the motor, and
    /// return the summary. A run still in progress is recorded as cancelled.
    pub fn finish(&mut self) -> RunSummary {
        let outcome = match self.state.phase {
            MotionPhase::Done => RunOutcome::Completed,
            MotionPhase::Aborted => RunOutcome::Aborted(
                self.abort
                    .clone()
                    .unwrap_or(ShuttleError::Abort(AbortReason::UserCancelled)),
            ),
            _ => {
                let err = ShuttleError::Abort(AbortReason::UserCancelled);
                self.fail(err.clone());
                RunOutcome::Aborted(err)
            }
        };
        if !self.parked
            && let Err(e) = self.safe_park()
        {
            tracing::warn!(error = %e, "motion distance reset failed");
        }
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.motor.close() {
                tracing::warn!(error = %map_hw_error(&*e), "closing motor connection failed");
            }
        }
        self.summary.finish(outcome);
        tracing::info!("{}", self.summary.status_line());
        self.summary.clone()
    }

    // ── Private: transitions ─────────────────────────────────────────────────

    fn on_position(&mut self, sense: PositionSense) -> Result<ShuttleStatus> {
        match sense {
            PositionSense::Up => {
                if self.state.up {
                    if let Some(since) = self.state.up_since {
                        tracing::debug!(elapsed_ms = self.clock.ms_since(since), "sample up");
                    }
                } else {
                    self.state.up = true;
                    self.state.up_since = Some(self.clock.now());
                    tracing::info!("Sample UP.");
                }
                self.state.phase = MotionPhase::AtTop;
            }
            PositionSense::Down => {
                if self.state.up {
                    self.state.up = false;
                    self.state.phase = MotionPhase::AtBottom;
                    if let Some(since) = self.state.up_since.take() {
                        let up_for = self.clock.now().saturating_duration_since(since);
                        self.summary.record_up_phase(up_for);
                        tracing::info!(elapsed_s = up_for.as_secs_f64(), "Sample DOWN.");
                    }
                    return Ok(self.complete_transient());
                }
            }
            PositionSense::InTransit => {
                self.state.phase = if self.state.up {
                    MotionPhase::MovingDown
                } else {
                    MotionPhase::MovingUp
                };
                if self.plan.mode == OperationMode::VelocitySweep {
                    return self.sweep_tick();
                }
            }
            PositionSense::Unknown(v) => {
                tracing::warn!(value = v, "unknown position sense value ignored");
            }
        }
        Ok(ShuttleStatus::Running)
    }

    fn complete_transient(&mut self) -> ShuttleStatus {
        self.state.transients_done += 1;
        let n = self.state.transients_done;
        let ns = self.plan.transients;
        let td = self.plan.slices;
        let field = self.plan.target_field_mt;
        let msg = if td > 1 {
            format!(
                "Completed scan {n}/{ns} for 2D slice {}/{td} at magnetic field strength of {field} mT",
                self.state.slices_done + 1
            )
        } else {
            format!("Completed scan {n} of {ns} at magnetic field strength of {field} mT")
        };
        tracing::info!("{msg}");
        self.summary.record_transient(msg);

        if n >= ns {
            self.state.transients_done = 0;
            self.state.slices_done += 1;
            self.summary.record_slice();
            if self.state.slices_done >= td {
                self.state.phase = MotionPhase::Done;
                return ShuttleStatus::Done;
            }
        }
        ShuttleStatus::Running
    }

    fn sweep_tick(&mut self) -> Result<ShuttleStatus> {
        let Some(units) = self.units else {
            return Ok(ShuttleStatus::Running);
        };
        let steps = match self.motor.current_position() {
            Ok(s) => s,
            Err(e) => return self.read_failed("actual position", &*e),
        };
        let z = units.distance_for_steps(steps);
        let field = match self.config.field.field_for_distance(z) {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(z_cm = z, error = %e, "no field for position; speed unchanged");
                return Ok(ShuttleStatus::Running);
            }
        };
        let Some(speed) = self.sweep_speed(z, field) else {
            tracing::warn!(z_cm = z, field_mt = field, "ramp not finite; speed unchanged");
            return Ok(ShuttleStatus::Running);
        };
        self.write(|m| m.set_target_speed(speed), "set target speed")?;
        self.state.last_speed = Some(speed);
        tracing::debug!(z_cm = z, field_mt = field, speed, "sweep speed update");
        Ok(ShuttleStatus::Running)
    }

    /// Base speed scaled by the ramp, clamped to `[0, max]`.
    #[allow(clippy::cast_possible_truncation)]
    fn sweep_speed(&self, z_cm: f64, field_mt: f64) -> Option<i32> {
        let ramp = self.plan.ramp.as_ref()?;
        let factor = ramp.eval(z_cm, field_mt);
        if !factor.is_finite() {
            return None;
        }
        let v = (f64::from(self.speed_units) * factor).clamp(0.0, f64::from(self.max_speed_units));
        Some(v as i32)
    }

    // ── Private: failure handling ────────────────────────────────────────────

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_check.as_ref().is_some_and(|check| check())
    }

    fn abort_with(&mut self, reason: AbortReason) -> ShuttleStatus {
        tracing::error!(%reason, "run aborted");
        let err = ShuttleError::Abort(reason);
        self.fail(err.clone());
        ShuttleStatus::Aborted(err)
    }

    /// Latch an abort: count it once, stop motion, remember why.
    fn fail(&mut self, err: ShuttleError) {
        if self.state.phase == MotionPhase::Aborted {
            return;
        }
        self.state.phase = MotionPhase::Aborted;
        self.state.errors += 1;
        self.summary.record_error();
        self.abort = Some(err);
        if let Err(e) = self.safe_park() {
            tracing::warn!(error = %e, "safe-park failed after abort");
        }
    }

    fn read_failed(
        &mut self,
        what: &'static str,
        e: &(dyn std::error::Error + 'static),
    ) -> Result<ShuttleStatus> {
        self.state.read_failures += 1;
        let mapped = map_hw_error(e);
        let limit = self.config.poll.max_read_failures;
        if self.state.read_failures > limit {
            tracing::error!(error = %mapped, failures = self.state.read_failures, what, "giving up on reads");
            self.fail(mapped.clone());
            return Err(eyre::Report::new(mapped)).wrap_err(format!("reading {what}"));
        }
        tracing::warn!(error = %mapped, failures = self.state.read_failures, limit, what, "read failed; retrying next tick");
        Ok(ShuttleStatus::Running)
    }

    fn write<F>(&mut self, f: F, what: &'static str) -> Result<()>
    where
        F: FnOnce(&mut M) -> HwResult<()>,
    {
        if let Err(e) = f(&mut self.motor) {
            let mapped = map_hw_error(&*e);
            self.fail(mapped.clone());
            return Err(eyre::Report::new(mapped)).wrap_err(what);
        }
        Ok(())
    }
}

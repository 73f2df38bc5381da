//! Type-state builder for `Shuttle` and generic `build_shuttle` constructor.
//!
//! The builder enforces at compile time that a motor and a run plan are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use shuttle_traits::{Clock, MonotonicClock, ShuttleMotor};

use crate::config::ShuttleConfig;
use crate::error::{BuildError, Result};
use crate::motion::{MotionPhase, MotionState, ShuttleCore};
use crate::planner::{OperationMode, RunPlan};
use crate::status::ShuttleStatus;
use crate::summary::RunSummary;

// ── Public dynamic-dispatch wrapper ──────────────────────────────────────────

/// Shuttle controller over a boxed motor.
pub struct Shuttle {
    pub(crate) inner: ShuttleCore<Box<dyn ShuttleMotor>>,
}

impl core::fmt::Debug for Shuttle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Shuttle").field("inner", &self.inner).finish()
    }
}

impl Shuttle {
    /// Start building a Shuttle.
    #[must_use]
    pub fn builder() -> ShuttleBuilder<Missing, Missing> {
        ShuttleBuilder::default()
    }

    /// Configure the motor and arm the motion distance.
    pub fn begin(&mut self) -> Result<()> {
        self.inner.begin()
    }

    /// One iteration of the motion loop.
    pub fn step(&mut self) -> Result<ShuttleStatus> {
        self.inner.step()
    }

    /// Reset the motion distance (best-effort caller decides).
    pub fn safe_park(&mut self) -> Result<()> {
        self.inner.safe_park()
    }

    /// Terminate the run and return its summary.
    pub fn finish(&mut self) -> RunSummary {
        self.inner.finish()
    }

    #[must_use]
    pub fn phase(&self) -> MotionPhase {
        self.inner.phase()
    }

    #[must_use]
    pub fn state(&self) -> &MotionState {
        self.inner.state()
    }

    #[must_use]
    pub fn plan(&self) -> &RunPlan {
        self.inner.plan()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Shuttle`. Validated on `build()`.
pub struct ShuttleBuilder<M, P> {
    motor: Option<Box<dyn ShuttleMotor>>,
    plan: Option<RunPlan>,
    config: Option<ShuttleConfig>,
    cancel_check: Option<Box<dyn Fn() -> bool>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _m: PhantomData<M>,
    _p: PhantomData<P>,
}

impl Default for ShuttleBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            motor: None,
            plan: None,
            config: None,
            cancel_check: None,
            clock: None,
            _m: PhantomData,
            _p: PhantomData,
        }
    }
}

/// Validate configuration and construct a `ShuttleCore`.
///
/// Shared by `ShuttleBuilder::try_build()` and `build_shuttle()`.
fn validate_and_build<M: ShuttleMotor>(
    motor: M,
    config: ShuttleConfig,
    plan: RunPlan,
    cancel_check: Option<Box<dyn Fn() -> bool>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ShuttleCore<M>> {
    if plan.transients == 0 || plan.slices == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "transients and slices must be >= 1",
        )));
    }
    if !(plan.distance_cm.is_finite() && (0.0..=config.max_height_cm).contains(&plan.distance_cm))
    {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "distance outside shuttle travel",
        )));
    }
    if !(plan.speed_cm_s.is_finite() && plan.speed_cm_s > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "speed must be > 0",
        )));
    }
    if plan.mode == OperationMode::VelocitySweep && plan.ramp.is_none() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "velocity sweep requires a ramp",
        )));
    }
    if config.poll.interval_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "poll interval must be >= 1 ms",
        )));
    }
    if !(config.wheel_circumference_cm.is_finite() && config.wheel_circumference_cm > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "wheel circumference must be > 0",
        )));
    }

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };

    Ok(ShuttleCore {
        motor,
        config,
        plan,
        clock,
        cancel_check,
        units: None,
        speed_units: 0,
        max_speed_units: 0,
        state: MotionState::default(),
        abort: None,
        summary: RunSummary::start(),
        parked: false,
        closed: false,
    })
}

impl<M, P> ShuttleBuilder<M, P> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Shuttle> {
        let motor = self
            .motor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor))?;
        let plan = self
            .plan
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPlan))?;
        let inner = validate_and_build(
            motor,
            self.config.unwrap_or_default(),
            plan,
            self.cancel_check,
            self.clock,
        )?;
        Ok(Shuttle { inner })
    }

    /// Static configuration; defaults to `ShuttleConfig::default()`.
    #[must_use]
    pub fn with_config(mut self, config: ShuttleConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Cancellation predicate polled once per tick.
    #[must_use]
    pub fn with_cancel_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.cancel_check = Some(Box::new(f));
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<P> ShuttleBuilder<Missing, P> {
    pub fn with_motor(self, motor: impl ShuttleMotor + 'static) -> ShuttleBuilder<Set, P> {
        ShuttleBuilder {
            motor: Some(Box::new(motor)),
            plan: self.plan,
            config: self.config,
            cancel_check: self.cancel_check,
            clock: self.clock,
            _m: PhantomData,
            _p: PhantomData,
        }
    }
}

impl<M> ShuttleBuilder<M, Missing> {
    pub fn with_plan(self, plan: RunPlan) -> ShuttleBuilder<M, Set> {
        ShuttleBuilder {
            motor: self.motor,
            plan: Some(plan),
            config: self.config,
            cancel_check: self.cancel_check,
            clock: self.clock,
            _m: PhantomData,
            _p: PhantomData,
        }
    }
}

impl ShuttleBuilder<Set, Set> {
    /// Validate and build. Only available when motor and plan are set.
    pub fn build(self) -> Result<Shuttle> {
        self.try_build()
    }
}

/// Build a statically-dispatched `ShuttleCore` from a concrete motor.
pub fn build_shuttle<M>(
    motor: M,
    config: ShuttleConfig,
    plan: RunPlan,
    cancel_check: Option<Box<dyn Fn() -> bool>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ShuttleCore<M>>
where
    M: ShuttleMotor,
{
    validate_and_build(motor, config, plan, cancel_check, clock)
}

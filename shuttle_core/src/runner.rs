use std::sync::Arc;
use std::time::Duration;

use shuttle_traits::{Clock, ShuttleMotor};

use crate::builder::build_shuttle;
use crate::config::ShuttleConfig;
use crate::error::Result;
use crate::planner::RunPlan;
use crate::status::ShuttleStatus;
use crate::summary::RunSummary;

/// Slice length used while waiting for temperature equilibration.
const EQUILIBRATION_SLICE: Duration = Duration::from_millis(250);

/// Injected collaborators for a run.
#[derive(Default)]
pub struct RunHooks {
    /// Defaults to `MonotonicClock`.
    pub clock: Option<Box<dyn Clock + Send + Sync>>,
    /// Polled once per tick; `true` cancels the run.
    pub cancel_check: Option<Box<dyn Fn() -> bool>>,
    /// Wait `ShuttleConfig::equilibration` before arming the shuttle.
    pub wait_equilibration: bool,
}

/// Run the shuttle until all transients complete or the run aborts.
///
/// Returns `Err` only when the run could not start (invalid plan or a motor
/// configuration failure); the motion distance is reset and the connection
/// closed in that case too. Once the shuttle is armed every outcome, including
/// aborts and device failures, is reported through the returned summary.
pub fn run<M>(motor: M, config: ShuttleConfig, plan: RunPlan, hooks: RunHooks) -> Result<RunSummary>
where
    M: ShuttleMotor,
{
    let interval_ms = config.poll.interval_ms;
    let period = crate::util::poll_period(interval_ms);
    let equilibration = config.equilibration;
    let mut shuttle = build_shuttle(motor, config, plan, hooks.cancel_check, hooks.clock)?;
    let clock = Arc::clone(&shuttle.clock);

    if hooks.wait_equilibration && !equilibration.is_zero() {
        tracing::info!(
            seconds = equilibration.as_secs_f64(),
            "waiting for temperature equilibration"
        );
        let start = clock.now();
        while clock.now().saturating_duration_since(start) < equilibration {
            if shuttle.cancel_requested() {
                tracing::warn!("cancelled during temperature equilibration");
                return Ok(shuttle.finish());
            }
            clock.sleep(EQUILIBRATION_SLICE.min(equilibration));
        }
    }

    if let Err(e) = shuttle.begin() {
        let summary = shuttle.finish();
        tracing::error!(error = %e, errors = summary.errors(), "motor configuration failed");
        return Err(e);
    }
    tracing::info!(
        mode = %shuttle.plan().mode,
        rate_hz = crate::util::poll_rate_hz(interval_ms),
        "run start"
    );

    loop {
        match shuttle.step() {
            Ok(ShuttleStatus::Running) => clock.sleep(period),
            Ok(ShuttleStatus::Done) => {
                tracing::info!(
                    transients = shuttle.summary().transients_completed(),
                    slices = shuttle.summary().slices_completed(),
                    "run complete"
                );
                break;
            }
            Ok(ShuttleStatus::Aborted(e)) => {
                tracing::error!(error = %e, "run aborted");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                break;
            }
        }
    }

    Ok(shuttle.finish())
}

use std::time::Duration;

use shuttle_core::mocks::ScriptedMotor;
use shuttle_core::{
    AbortReason, OperationMode, RunHooks, RunOutcome, RunParameters, RunPlan, ShuttleConfig,
    ShuttleError, run,
};
use shuttle_traits::ManualClock;

fn plan(transients: u32) -> RunPlan {
    let mut p = RunParameters::new(OperationMode::ConstantVelocity, 1, 1000.0);
    p.transients = transients;
    p.plan(&ShuttleConfig::default()).expect("plan")
}

fn hooks(clock: &ManualClock) -> RunHooks {
    RunHooks {
        clock: Some(Box::new(clock.clone())),
        ..RunHooks::default()
    }
}

#[test]
fn completed_run_exits_zero_and_paces_with_the_clock() {
    let clock = ManualClock::new();
    let summary = run(
        ScriptedMotor::transients(2),
        ShuttleConfig::default(),
        plan(2),
        hooks(&clock),
    )
    .expect("run");
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.transients_completed(), 2);
    // Seven Running ticks at the default 20 ms period before the final Done.
    assert_eq!(clock.elapsed(), Duration::from_millis(7 * 20));
    assert!(summary.status_line().starts_with("Sequence successfully completed at "));
}

#[test]
fn up_phase_duration_follows_the_clock() {
    let clock = ManualClock::new();
    let summary = run(
        ScriptedMotor::new([0, 1, 1, 1, 0]),
        ShuttleConfig::default(),
        plan(1),
        hooks(&clock),
    )
    .expect("run");
    assert_eq!(summary.up_phases(), &[Duration::from_millis(60)]);
}

#[test]
fn stall_run_exits_one() {
    let clock = ManualClock::new();
    let summary = run(
        ScriptedMotor::new([0, 2, 2]).with_stall_at(2),
        ShuttleConfig::default(),
        plan(1),
        hooks(&clock),
    )
    .expect("run");
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(
        summary.outcome(),
        Some(&RunOutcome::Aborted(ShuttleError::Abort(
            AbortReason::StallDetected
        )))
    );
}

#[test]
fn device_failure_during_polling_is_reported_in_the_summary() {
    let clock = ManualClock::new();
    let summary = run(
        ScriptedMotor::transients(1).with_read_failures(0, 100),
        ShuttleConfig::default(),
        plan(1),
        hooks(&clock),
    )
    .expect("run");
    assert_eq!(summary.exit_code(), 1);
    assert!(matches!(
        summary.outcome(),
        Some(RunOutcome::Aborted(ShuttleError::DeviceCommunication(_)))
    ));
}

#[test]
fn configuration_write_failure_is_an_error() {
    let clock = ManualClock::new();
    let err = run(
        ScriptedMotor::transients(1).with_failing_writes(),
        ShuttleConfig::default(),
        plan(1),
        hooks(&clock),
    )
    .expect_err("begin fails");
    assert!(matches!(
        err.downcast_ref::<ShuttleError>(),
        Some(ShuttleError::DeviceCommunication(_))
    ));
}

#[test]
fn equilibration_wait_uses_the_clock() {
    let clock = ManualClock::new();
    let mut cfg = ShuttleConfig::default();
    cfg.equilibration = Duration::from_secs(2);
    let summary = run(
        ScriptedMotor::transients(1),
        cfg,
        plan(1),
        RunHooks {
            wait_equilibration: true,
            ..hooks(&clock)
        },
    )
    .expect("run");
    assert_eq!(summary.exit_code(), 0);
    assert!(clock.elapsed() >= Duration::from_secs(2));
}

#[test]
fn cancel_during_equilibration_never_arms() {
    let clock = ManualClock::new();
    let summary = run(
        ScriptedMotor::transients(1),
        ShuttleConfig::default(),
        plan(1),
        RunHooks {
            wait_equilibration: true,
            cancel_check: Some(Box::new(|| true)),
            ..hooks(&clock)
        },
    )
    .expect("run");
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(summary.transients_completed(), 0);
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[test]
fn invalid_plan_is_rejected_before_motion() {
    let clock = ManualClock::new();
    let mut p = plan(1);
    p.transients = 0;
    assert!(run(ScriptedMotor::transients(1), ShuttleConfig::default(), p, hooks(&clock)).is_err());
}

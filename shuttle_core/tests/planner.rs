use rstest::rstest;
use shuttle_core::planner::{
    constant_time_speed, constant_velocity_time, field_sweep_time, resolve_distance, sweep_time,
};
use shuttle_core::{
    LowFieldCoil, OperationMode, RunParameters, ShuttleConfig, ShuttleError,
};

fn cfg() -> ShuttleConfig {
    ShuttleConfig::default()
}

fn kind(err: &eyre::Report) -> &ShuttleError {
    err.downcast_ref::<ShuttleError>()
        .unwrap_or_else(|| panic!("expected a ShuttleError, got {err:?}"))
}

#[test]
fn constant_velocity_plan_uses_defaults() {
    let plan = RunParameters::new(OperationMode::ConstantVelocity, 2, 1000.0)
        .plan(&cfg())
        .expect("plan");
    assert!((plan.distance_cm - 27.822).abs() < 1e-3);
    assert_eq!(plan.speed_cm_s, 25.0);
    assert_eq!(plan.accel_cm_s2, 22.74);
    assert_eq!(plan.profile.id, 2);
    assert!(plan.ramp.is_none());
    // Cruise is reached: 2 v/a + (d - v²/a) / v
    assert!((plan.motion_time_s - 2.2123).abs() < 1e-3);
}

#[rstest]
#[case(10.0, 25.0, 22.74, 2.0 * (10.0f64 / 22.74).sqrt())]
#[case(50.0, 10.0, 20.0, 5.5)]
#[case(0.0, 25.0, 22.74, 0.0)]
fn constant_velocity_time_profiles(
    #[case] d: f64,
    #[case] v: f64,
    #[case] a: f64,
    #[case] expected: f64,
) {
    assert!((constant_velocity_time(d, v, a) - expected).abs() < 1e-9);
}

#[rstest]
#[case(20.0, 20.0, 3.0)]
#[case(27.8, 22.74, 4.0)]
#[case(5.0, 100.0, 1.0)]
fn constant_time_speed_hits_the_requested_time(#[case] d: f64, #[case] a: f64, #[case] t: f64) {
    let v = constant_time_speed(d, a, t).expect("feasible");
    assert!((constant_velocity_time(d, v, a) - t).abs() < 1e-6);
}

#[test]
fn constant_time_too_short_is_out_of_range() {
    assert!(matches!(
        constant_time_speed(50.0, 10.0, 2.0),
        Err(ShuttleError::OutOfRange(_))
    ));
}

#[test]
fn constant_time_plan_derives_speed() {
    let mut p = RunParameters::new(OperationMode::ConstantTime, 1, 1000.0);
    p.motion_time_s = Some(4.0);
    let plan = p.plan(&cfg()).expect("plan");
    assert_eq!(plan.motion_time_s, 4.0);
    assert!(plan.speed_cm_s > 0.0 && plan.speed_cm_s < 25.0);
}

#[test]
fn sweep_plan_is_slower_than_constant_speed() {
    let plan = RunParameters::new(OperationMode::VelocitySweep, 1, 1000.0)
        .plan(&cfg())
        .expect("plan");
    let ramp = plan.ramp.as_ref().expect("default ramp");
    assert_eq!(ramp.source(), "1-0.9/(1+exp(-0.001*(Bz-5000)))");
    assert!(plan.motion_time_s > plan.distance_cm / plan.speed_cm_s);
}

#[rstest]
#[case::field_steps("1+0*Bz")]
#[case::distance_steps("1+0*z")]
fn flat_ramp_sweep_matches_cruise_time(#[case] ramp: &str) {
    let mut p = RunParameters::new(OperationMode::VelocitySweep, 1, 1000.0);
    p.ramp = Some(ramp.into());
    let plan = p.plan(&cfg()).expect("plan");
    let cruise = plan.distance_cm / plan.speed_cm_s;
    assert!((plan.motion_time_s - cruise).abs() < 1e-6, "{} vs {cruise}", plan.motion_time_s);
}

#[test]
fn field_ramp_plan_integrates_over_field_steps() {
    let c = cfg();
    let plan = RunParameters::new(OperationMode::VelocitySweep, 1, 1000.0)
        .plan(&c)
        .expect("plan");
    let ramp = plan.ramp.as_ref().expect("default ramp");

    let by_field = field_sweep_time(&c, ramp, 1000.0, plan.speed_cm_s).expect("field steps");
    let by_distance =
        sweep_time(&c, ramp, plan.distance_cm, plan.speed_cm_s).expect("distance steps");
    assert_eq!(plan.motion_time_s, by_field);
    assert!(by_field > 0.0 && by_distance > 0.0);
    assert!((by_field - by_distance).abs() > 1e-9);
}

#[test]
fn field_sweep_to_b0_takes_no_time() {
    let c = cfg();
    let ramp = shuttle_core::RampExpr::parse("Bz").expect("ramp");
    assert_eq!(field_sweep_time(&c, &ramp, c.b0_mt, 25.0).expect("time"), 0.0);
}

#[test]
fn b0_target_needs_no_travel() {
    let c = cfg();
    assert_eq!(resolve_distance(&c, c.b0_mt).expect("b0"), 0.0);
}

#[test]
fn coil_field_maps_to_coil_distance() {
    let mut c = cfg();
    c.low_field_coil = Some(LowFieldCoil {
        field_mt: 20.0,
        distance_cm: 75.0,
    });
    assert_eq!(resolve_distance(&c, 20.0).expect("coil"), 75.0);
    // Other fields still use the model.
    let z = resolve_distance(&c, 21.0).expect("model");
    assert!(z > 50.0 && z < 60.0, "{z}");
}

#[test]
fn explicit_distance_overrides_the_field() {
    let mut p = RunParameters::new(OperationMode::ConstantVelocity, 1, 1000.0);
    p.distance_cm = Some(30.0);
    assert_eq!(p.plan(&cfg()).expect("plan").distance_cm, 30.0);
}

#[rstest]
#[case::unknown_profile(|p: &mut RunParameters| p.stall_profile = 9, "config")]
#[case::zero_transients(|p: &mut RunParameters| p.transients = 0, "config")]
#[case::zero_slices(|p: &mut RunParameters| p.slices = 0, "config")]
#[case::field_above_b0(|p: &mut RunParameters| p.target_field_mt = 8000.0, "range")]
#[case::zero_field(|p: &mut RunParameters| p.target_field_mt = 0.0, "range")]
#[case::distance_above_travel(|p: &mut RunParameters| p.distance_cm = Some(95.0), "range")]
#[case::too_fast(|p: &mut RunParameters| p.speed_cm_s = Some(40.0), "range")]
#[case::too_hard(|p: &mut RunParameters| p.accel_cm_s2 = Some(1000.0), "range")]
#[case::no_accel(|p: &mut RunParameters| p.accel_cm_s2 = Some(0.0), "range")]
#[case::bad_ramp(|p: &mut RunParameters| {
    p.mode = OperationMode::VelocitySweep;
    p.ramp = Some("Bz +".into());
}, "ramp")]
#[case::ramp_without_variable(|p: &mut RunParameters| {
    p.mode = OperationMode::VelocitySweep;
    p.ramp = Some("2 * 3".into());
}, "ramp")]
#[case::negative_ramp(|p: &mut RunParameters| {
    p.mode = OperationMode::VelocitySweep;
    p.ramp = Some("1 - Bz/1000".into());
}, "range")]
#[case::constant_time_without_time(|p: &mut RunParameters| p.mode = OperationMode::ConstantTime, "config")]
#[case::constant_time_too_short(|p: &mut RunParameters| {
    p.mode = OperationMode::ConstantTime;
    p.motion_time_s = Some(0.5);
}, "range")]
fn invalid_parameters_are_typed(#[case] tweak: fn(&mut RunParameters), #[case] expected: &str) {
    let mut p = RunParameters::new(OperationMode::ConstantVelocity, 1, 1000.0);
    tweak(&mut p);
    let err = p.plan(&cfg()).expect_err("must fail");
    let got = match kind(&err) {
        ShuttleError::Configuration(_) => "config",
        ShuttleError::OutOfRange(_) => "range",
        ShuttleError::InvalidRampExpression(_) => "ramp",
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(got, expected, "{err:?}");
}

#[test]
fn mode_numbers_match_the_cli() {
    assert_eq!(OperationMode::try_from(1).ok(), Some(OperationMode::ConstantVelocity));
    assert_eq!(OperationMode::try_from(2).ok(), Some(OperationMode::VelocitySweep));
    assert_eq!(OperationMode::try_from(3).ok(), Some(OperationMode::ConstantTime));
    assert!(OperationMode::try_from(4).is_err());
}

#[test]
fn plan_display_lists_the_essentials() {
    let plan = RunParameters::new(OperationMode::VelocitySweep, 1, 1000.0)
        .plan(&cfg())
        .expect("plan");
    let text = plan.to_string();
    assert!(text.contains("velocity sweep"));
    assert!(text.contains("Ramp:"));
    assert!(text.contains("27.82 cm"));
}

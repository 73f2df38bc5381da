use rstest::rstest;
use shuttle_config::{MotorModel, load_toml};

const BASE: &str = r#"
[geometry]
max_height_cm = 90.0
wheel_circumference_cm = 25.0

[field]
b0_mt = 7056.39197
fit = { a = 5.75, b = 20.34 }
"#;

fn with_extra(extra: &str) -> String {
    format!("{BASE}\n{extra}")
}

#[test]
fn minimal_config_uses_defaults_and_validates() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("minimal config should pass");

    assert_eq!(cfg.motor.model, MotorModel::Tmcm1160);
    assert_eq!(cfg.motor.direction, -1);
    assert_eq!(cfg.poll.interval_ms, 20);
    assert_eq!(cfg.poll.max_read_failures, 3);
    assert_eq!(cfg.io.light_gate_input, 10);
    assert_eq!(cfg.io.position_variable, 8);
    assert_eq!(cfg.io.error_variable, 9);
    assert_eq!(cfg.io.distance_variable, 1);
    assert_eq!(cfg.stall_profiles.len(), 3);
    assert_eq!(cfg.stall_profiles[2].run_current, 128);
    assert_eq!(cfg.stall_profiles[2].standby_current, 48);
}

#[test]
fn parses_model_names_and_profiles() {
    let cfg = load_toml(&with_extra(
        r#"
[motor]
model = "TMCM-1060"
direction = 1

[[stall_profiles]]
id = 7
run_current = 100
standby_current = 10
filter = 0
threshold = -3
stop_on_stall = 500
"#,
    ))
    .expect("parse TOML");
    cfg.validate().expect("valid config");
    assert_eq!(cfg.motor.model, MotorModel::Tmcm1060);
    assert_eq!(cfg.stall_profiles.len(), 1);
    assert_eq!(cfg.stall_profiles[0].threshold, -3);
}

#[test]
fn rejects_unknown_model() {
    let err = load_toml(&with_extra("[motor]\nmodel = \"TMCM-9999\"\n")).expect_err("bad model");
    assert!(format!("{err}").contains("TMCM-9999"));
}

#[rstest]
#[case("[motor]\ndirection = 0\n", "motor.direction must be 1 or -1")]
#[case("[motor]\npulse_divisor = 14\n", "motor.pulse_divisor must be in [0, 13]")]
#[case("[motion]\nspeed_cm_s = 0.0\n", "motion.speed_cm_s must be > 0")]
#[case(
    "[motion]\nspeed_cm_s = 20.0\nmax_speed_cm_s = 10.0\n",
    "motion.speed_cm_s must be <= motion.max_speed_cm_s"
)]
#[case("[motion]\nmax_speed_cm_s = 40.0\n", "for tmcm-1160")]
#[case("[poll]\ninterval_ms = 0\n", "poll.interval_ms must be >= 1")]
#[case(
    "[low_field_coil]\nfield_mt = 20.0\ndistance_cm = 150.0\n",
    "low_field_coil.distance_cm must be in"
)]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be one of")]
#[case(
    "[[stall_profiles]]\nid = 1\nrun_current = 64\nstandby_current = 16\nfilter = 2\nthreshold = 6\nstop_on_stall = 1000\n",
    "filter must be 0 or 1"
)]
#[case(
    "[[stall_profiles]]\nid = 1\nrun_current = 64\nstandby_current = 16\nfilter = 1\nthreshold = 6\nstop_on_stall = 1000\n\n[[stall_profiles]]\nid = 1\nrun_current = 80\nstandby_current = 16\nfilter = 1\nthreshold = 8\nstop_on_stall = 1000\n",
    "duplicate id 1"
)]
fn rejects_invalid_sections(#[case] extra: &str, #[case] expected: &str) {
    let cfg = load_toml(&with_extra(extra)).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    let msg = format!("{err}").to_lowercase();
    assert!(msg.contains(expected), "unexpected message: {msg}");
}

#[test]
fn tmcm1060_has_no_speed_ceiling() {
    let cfg = load_toml(&with_extra(
        "[motor]\nmodel = \"TMCM-1060\"\n\n[motion]\nmax_speed_cm_s = 60.0\n",
    ))
    .expect("parse TOML");
    cfg.validate().expect("1060 accepts higher max speed");
}

#[test]
fn field_requires_exactly_one_model() {
    let toml = r#"
[geometry]
max_height_cm = 90.0
wheel_circumference_cm = 25.0

[field]
b0_mt = 7056.0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("no field model");
    assert!(format!("{err}").contains("exactly one of fit or map_file"));

    let both = format!("{toml}fit = {{ a = 5.75, b = 20.34 }}\nmap_file = \"fieldMap.csv\"\n");
    let cfg = load_toml(&both).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn field_map_path_resolves_relative_to_config_dir() {
    let toml = r#"
[geometry]
max_height_cm = 90.0
wheel_circumference_cm = 25.0

[field]
b0_mt = 7056.0
map_file = "fieldMap.csv"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    let p = cfg
        .field_map_path(std::path::Path::new("/opt/shuttle/etc"))
        .expect("map path");
    assert_eq!(p, std::path::Path::new("/opt/shuttle/etc/fieldMap.csv"));
}

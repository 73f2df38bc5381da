use rstest::rstest;
use shuttle_core::{RampExpr, RampVariable, ShuttleError};

#[test]
fn default_ramp_slows_near_the_magnet() {
    let r: RampExpr = "1-0.9/(1+exp(-0.001*(Bz-5000)))".parse().expect("ramp");
    let near = r.eval(0.0, 7000.0);
    let far = r.eval(0.0, 100.0);
    assert!(near < far);
    assert!((r.eval(0.0, 5000.0) - 0.55).abs() < 1e-12);
    assert_eq!(r.primary_variable(), RampVariable::Field);
    assert!(!r.references(RampVariable::Position));
}

#[rstest]
#[case("z / 90", RampVariable::Position)]
#[case("0.5 + z * Bz / 1e6", RampVariable::Field)]
#[case("math.exp(-z)", RampVariable::Position)]
fn primary_variable_prefers_the_field(#[case] src: &str, #[case] expected: RampVariable) {
    assert_eq!(RampExpr::parse(src).expect("ramp").primary_variable(), expected);
}

#[rstest]
#[case("")]
#[case("   ")]
#[case("z +")]
#[case("(z")]
#[case("z)")]
#[case("sqrt(z)")]
#[case("x * 2")]
#[case("1 + 2")]
#[case("z $ 2")]
#[case("exp z")]
#[case("1..2 * z")]
fn malformed_ramps_are_rejected(#[case] src: &str) {
    assert!(matches!(
        RampExpr::parse(src),
        Err(ShuttleError::InvalidRampExpression(_))
    ));
}

#[test]
fn source_is_kept_for_display() {
    let r = RampExpr::parse("  1 - z/100 ").expect("ramp");
    assert_eq!(r.source(), "1 - z/100");
    assert_eq!(r.to_string(), "1 - z/100");
}

#[test]
fn division_by_zero_is_not_finite() {
    let r = RampExpr::parse("1 / z").expect("ramp");
    assert!(!r.eval(0.0, 0.0).is_finite());
}

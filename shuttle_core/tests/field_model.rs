use proptest::prelude::*;
use rstest::rstest;
use shuttle_core::{FieldFit, FieldModel, FieldPositionModel, FieldTable, ShuttleError};

fn analytic() -> FieldPositionModel {
    FieldPositionModel::new(
        FieldModel::Analytic(FieldFit {
            b0_mt: 7056.391_97,
            a: 5.75,
            b: 20.34,
        }),
        90.0,
    )
}

fn table() -> FieldPositionModel {
    let t = FieldTable::from_points(&[
        (0.0, 7000.0),
        (10.0, 6000.0),
        (20.0, 4000.0),
        (40.0, 500.0),
        (80.0, 20.0),
    ])
    .expect("valid table");
    FieldPositionModel::new(FieldModel::Table(t), 90.0)
}

#[test]
fn analytic_field_is_b0_at_the_centre() {
    let m = analytic();
    let b = m.field_for_distance(0.0).expect("z = 0");
    assert!((b - 7056.391_97).abs() < 1e-9);
}

#[rstest]
#[case(-0.1)]
#[case(f64::NAN)]
#[case(f64::INFINITY)]
fn invalid_distances_are_rejected(#[case] z: f64) {
    assert!(matches!(
        analytic().field_for_distance(z),
        Err(ShuttleError::OutOfRange(_))
    ));
}

#[rstest]
#[case(8000.0)]
#[case(0.001)]
#[case(-5.0)]
fn unreachable_fields_are_out_of_range(#[case] b: f64) {
    assert!(matches!(
        analytic().distance_for_field(b),
        Err(ShuttleError::OutOfRange(_))
    ));
}

#[test]
fn table_interpolates_linearly() {
    let m = table();
    assert!((m.field_for_distance(5.0).expect("inside") - 6500.0).abs() < 1e-9);
    assert!((m.field_for_distance(30.0).expect("inside") - 2250.0).abs() < 1e-9);
    assert!((m.distance_for_field(5000.0).expect("inside") - 15.0).abs() < 1e-9);
    assert!((m.distance_for_field(20.0).expect("last row") - 80.0).abs() < 1e-9);
    assert!((m.distance_for_field(7000.0).expect("first row")).abs() < 1e-9);
}

#[test]
fn table_lookups_outside_rows_fail() {
    let m = table();
    assert!(m.field_for_distance(85.0).is_err());
    assert!(m.distance_for_field(7100.0).is_err());
    assert!(m.distance_for_field(10.0).is_err());
}

#[rstest]
#[case(&[(0.0, 100.0)])]
#[case(&[(0.0, 100.0), (0.0, 50.0)])]
#[case(&[(0.0, 100.0), (1.0, 100.0)])]
#[case(&[(0.0, 100.0), (1.0, 150.0)])]
#[case(&[(0.0, 100.0), (f64::NAN, 50.0)])]
fn malformed_tables_are_rejected(#[case] points: &[(f64, f64)]) {
    assert!(matches!(
        FieldTable::from_points(points),
        Err(ShuttleError::Configuration(_))
    ));
}

proptest! {
    #[test]
    fn analytic_inverse_round_trips(z in 1.0f64..89.0) {
        let m = analytic();
        let b = m.field_for_distance(z).expect("field");
        let back = m.distance_for_field(b).expect("distance");
        prop_assert!((back - z).abs() < 1e-6, "z={z} back={back}");
    }

    #[test]
    fn table_inverse_round_trips(z in 0.0f64..=80.0) {
        let m = table();
        let b = m.field_for_distance(z).expect("field");
        let back = m.distance_for_field(b).expect("distance");
        prop_assert!((back - z).abs() < 1e-6, "z={z} back={back}");
    }

    #[test]
    fn field_decreases_with_height(z1 in 1.0f64..80.0, dz in 0.01f64..10.0) {
        let z2 = (z1 + dz).min(80.0);
        prop_assume!(z2 > z1);
        for m in [analytic(), table()] {
            let b1 = m.field_for_distance(z1).expect("b1");
            let b2 = m.field_for_distance(z2).expect("b2");
            prop_assert!(b2 < b1);
        }
    }
}

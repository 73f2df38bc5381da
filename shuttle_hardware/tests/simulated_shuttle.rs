use rstest::rstest;
use shuttle_hardware::sim::STALL_FLAG;
use shuttle_hardware::tmcl::param;
use shuttle_hardware::{SimTiming, SimulatedShuttle};
use shuttle_traits::ShuttleMotor;

const SENSE: u8 = 8;
const DISTANCE: u8 = 1;

fn armed(steps: i32) -> SimulatedShuttle {
    let mut sim = SimulatedShuttle::new().with_timing(SimTiming {
        down_polls: 1,
        transit_polls: 2,
        up_polls: 2,
    });
    sim.set_user_variable(SENSE, 0).expect("reset sense");
    sim.set_user_variable(DISTANCE, steps).expect("arm");
    sim
}

fn poll(sim: &mut SimulatedShuttle) -> (i32, i32) {
    let sense = sim.user_variable(SENSE).expect("sense");
    let pos = sim.current_position().expect("position");
    (sense, pos)
}

#[test]
fn armed_shuttle_cycles_up_and_down() {
    let mut sim = armed(1000);
    let trace: Vec<(i32, i32)> = (0..8).map(|_| poll(&mut sim)).collect();
    assert_eq!(
        trace,
        vec![
            (0, 0),
            (2, -500),
            (2, -1000),
            (1, -1000),
            (1, -1000),
            (2, -500),
            (2, 0),
            (0, 0),
        ]
    );
}

#[test]
fn parking_returns_the_shuttle_down() {
    let mut sim = armed(1000);
    for _ in 0..3 {
        poll(&mut sim);
    }
    sim.set_user_variable(DISTANCE, 0).expect("park");
    assert_eq!(poll(&mut sim), (0, 0));
    assert_eq!(poll(&mut sim), (0, 0));
}

#[rstest]
#[case(0)]
#[case(3)]
fn stall_is_reported_after_n_polls(#[case] n: usize) {
    let mut sim = armed(1000).with_stall_after(n);
    for _ in 0..n {
        assert_eq!(sim.status_flags().expect("flags"), 0);
        poll(&mut sim);
    }
    assert_eq!(sim.status_flags().expect("flags"), STALL_FLAG);
}

#[test]
fn light_gate_fault_only_affects_its_pin() {
    let mut sim = armed(1000).with_light_gate_fault_after(1);
    assert!(sim.digital_input(10).expect("gate"));
    poll(&mut sim);
    assert!(!sim.digital_input(10).expect("gate"));
    assert!(sim.digital_input(3).expect("other pin"));
}

#[test]
fn axis_writes_are_recorded() {
    let mut sim = SimulatedShuttle::new();
    sim.set_max_velocity(2048).expect("max v");
    sim.set_stall_guard_threshold(-2).expect("sg");
    sim.move_to_absolute_position(-300).expect("mvp");
    assert_eq!(sim.axis_parameter(param::MAX_SPEED), Some(2048));
    assert_eq!(sim.axis_parameter(param::STALL_GUARD_THRESHOLD), Some(-2));
    assert_eq!(sim.current_position().expect("pos"), -300);
    assert_eq!(sim.microstep_resolution().expect("res"), 8);
}

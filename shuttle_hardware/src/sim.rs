//! Software stand-in for a TMCL module running the shuttle program.
//!
//! While a non-zero motion distance is armed the simulated firmware cycles
//! the position-sense variable Down → InTransit → Up → InTransit → Down, one
//! leg step per position-sense read, and moves the actual position along
//! with it. Writing zero to the distance variable parks the shuttle.

use std::collections::BTreeMap;

use shuttle_traits::{HwResult, ShuttleMotor};

use crate::error::HwError;
use crate::tmcl::param;

const SENSE_DOWN: i32 = 0;
const SENSE_UP: i32 = 1;
const SENSE_IN_TRANSIT: i32 = 2;

/// Bit reported in the error flags on a stall.
pub const STALL_FLAG: u32 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Down,
    Rising,
    Up,
    Falling,
}

/// Polls spent in each leg of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTiming {
    pub down_polls: u32,
    pub transit_polls: u32,
    pub up_polls: u32,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            down_polls: 2,
            transit_polls: 4,
            up_polls: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedShuttle {
    timing: SimTiming,
    light_gate_input: u8,
    position_variable: u8,
    distance_variable: u8,
    direction: i32,
    microstep_res: u8,
    axis: BTreeMap<u8, i32>,
    user_vars: BTreeMap<u8, i32>,
    leg: Leg,
    leg_polls: u32,
    polls: usize,
    stall_after: Option<usize>,
    light_gate_fault_after: Option<usize>,
    closed: bool,
}

impl Default for SimulatedShuttle {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedShuttle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timing: SimTiming::default(),
            light_gate_input: 10,
            position_variable: 8,
            distance_variable: 1,
            direction: -1,
            microstep_res: 8,
            axis: BTreeMap::new(),
            user_vars: BTreeMap::new(),
            leg: Leg::Down,
            leg_polls: 0,
            polls: 0,
            stall_after: None,
            light_gate_fault_after: None,
            closed: false,
        }
    }

    #[must_use]
    pub fn with_timing(mut self, timing: SimTiming) -> Self {
        self.timing = SimTiming {
            down_polls: timing.down_polls.max(1),
            transit_polls: timing.transit_polls.max(1),
            up_polls: timing.up_polls.max(1),
        };
        self
    }

    /// Firmware I/O contract: light-gate input, position-sense and distance variables.
    #[must_use]
    pub fn with_io(mut self, light_gate_input: u8, position_variable: u8, distance_variable: u8) -> Self {
        self.light_gate_input = light_gate_input;
        self.position_variable = position_variable;
        self.distance_variable = distance_variable;
        self
    }

    /// Sign of the actual position above the magnet.
    #[must_use]
    pub fn with_direction(mut self, direction: i32) -> Self {
        self.direction = direction.signum();
        self
    }

    /// Report a stall from the `n`-th position-sense read on.
    #[must_use]
    pub fn with_stall_after(mut self, polls: usize) -> Self {
        self.stall_after = Some(polls);
        self
    }

    /// Interrupt the light gate from the `n`-th position-sense read on.
    #[must_use]
    pub fn with_light_gate_fault_after(mut self, polls: usize) -> Self {
        self.light_gate_fault_after = Some(polls);
        self
    }

    #[must_use]
    pub fn polls(&self) -> usize {
        self.polls
    }

    #[must_use]
    pub fn axis_parameter(&self, p: u8) -> Option<i32> {
        self.axis.get(&p).copied()
    }

    #[must_use]
    pub fn user_variable_value(&self, id: u8) -> Option<i32> {
        self.user_vars.get(&id).copied()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), HwError> {
        if self.closed {
            return Err(HwError::Serial("simulated port closed".into()));
        }
        Ok(())
    }

    fn set_axis(&mut self, p: u8, value: i32) -> HwResult<()> {
        self.ensure_open()?;
        self.axis.insert(p, value);
        Ok(())
    }

    fn armed_steps(&self) -> i64 {
        i64::from(self.user_vars.get(&self.distance_variable).copied().unwrap_or(0))
    }

    fn leg_len(&self, leg: Leg) -> u32 {
        match leg {
            Leg::Down => self.timing.down_polls,
            Leg::Rising | Leg::Falling => self.timing.transit_polls,
            Leg::Up => self.timing.up_polls,
        }
    }

    /// Advance one poll and return the position-sense value.
    fn advance(&mut self) -> i32 {
        self.polls += 1;
        let armed = self.armed_steps();
        if armed == 0 {
            self.leg = Leg::Down;
            self.leg_polls = 0;
            self.axis.insert(param::ACTUAL_POSITION, 0);
            return SENSE_DOWN;
        }

        self.leg_polls += 1;
        if self.leg_polls > self.leg_len(self.leg) {
            self.leg = match self.leg {
                Leg::Down => Leg::Rising,
                Leg::Rising => Leg::Up,
                Leg::Up => Leg::Falling,
                Leg::Falling => Leg::Down,
            };
            self.leg_polls = 1;
            tracing::debug!(leg = ?self.leg, poll = self.polls, "simulated shuttle leg");
        }

        let transit = i64::from(self.timing.transit_polls);
        let k = i64::from(self.leg_polls);
        let top = i64::from(self.direction) * armed;
        let (steps, sense) = match self.leg {
            Leg::Down => (0, SENSE_DOWN),
            Leg::Rising => (top * k / transit, SENSE_IN_TRANSIT),
            Leg::Up => (top, SENSE_UP),
            Leg::Falling => (top * (transit - k) / transit, SENSE_IN_TRANSIT),
        };
        let steps = i32::try_from(steps).unwrap_or(if steps < 0 { i32::MIN } else { i32::MAX });
        self.axis.insert(param::ACTUAL_POSITION, steps);
        sense
    }
}

impl ShuttleMotor for SimulatedShuttle {
    fn set_max_velocity(&mut self, units: i32) -> HwResult<()> {
        self.set_axis(param::MAX_SPEED, units)
    }
    fn set_max_acceleration(&mut self, units: i32) -> HwResult<()> {
        self.set_axis(param::MAX_ACCELERATION, units)
    }
    fn set_run_current(&mut self, current: u8) -> HwResult<()> {
        self.set_axis(param::RUN_CURRENT, i32::from(current))
    }
    fn set_standby_current(&mut self, current: u8) -> HwResult<()> {
        self.set_axis(param::STANDBY_CURRENT, i32::from(current))
    }
    fn set_stall_guard_filter(&mut self, enabled: bool) -> HwResult<()> {
        self.set_axis(param::STALL_GUARD_FILTER, i32::from(enabled))
    }
    fn set_stall_guard_threshold(&mut self, threshold: i8) -> HwResult<()> {
        self.set_axis(param::STALL_GUARD_THRESHOLD, i32::from(threshold))
    }
    fn set_stop_on_stall(&mut self, velocity: i32) -> HwResult<()> {
        self.set_axis(param::STOP_ON_STALL, velocity)
    }
    fn set_pulse_divisor(&mut self, divisor: u8) -> HwResult<()> {
        self.set_axis(param::PULSE_DIVISOR, i32::from(divisor))
    }
    fn set_ramp_divisor(&mut self, divisor: u8) -> HwResult<()> {
        self.set_axis(param::RAMP_DIVISOR, i32::from(divisor))
    }
    fn microstep_resolution(&mut self) -> HwResult<u8> {
        self.ensure_open()?;
        Ok(self.microstep_res)
    }
    fn set_target_speed(&mut self, units: i32) -> HwResult<()> {
        self.set_axis(param::TARGET_SPEED, units)
    }
    fn move_to_absolute_position(&mut self, steps: i32) -> HwResult<()> {
        self.set_axis(param::TARGET_POSITION, steps)?;
        self.axis.insert(param::ACTUAL_POSITION, steps);
        Ok(())
    }
    fn current_position(&mut self) -> HwResult<i32> {
        self.ensure_open()?;
        Ok(self.axis_parameter(param::ACTUAL_POSITION).unwrap_or(0))
    }
    fn digital_input(&mut self, pin: u8) -> HwResult<bool> {
        self.ensure_open()?;
        if pin == self.light_gate_input {
            return Ok(!self.light_gate_fault_after.is_some_and(|n| self.polls >= n));
        }
        Ok(true)
    }
    fn status_flags(&mut self) -> HwResult<u32> {
        self.ensure_open()?;
        if self.stall_after.is_some_and(|n| self.polls >= n) {
            return Ok(STALL_FLAG);
        }
        Ok(0)
    }
    fn set_user_variable(&mut self, id: u8, value: i32) -> HwResult<()> {
        self.ensure_open()?;
        self.user_vars.insert(id, value);
        if id == self.position_variable {
            self.leg = Leg::Down;
            self.leg_polls = 0;
        }
        if id == self.distance_variable && value == 0 {
            tracing::debug!(poll = self.polls, "simulated shuttle parked");
        }
        Ok(())
    }
    fn user_variable(&mut self, id: u8) -> HwResult<i32> {
        self.ensure_open()?;
        if id == self.position_variable {
            let sense = self.advance();
            self.user_vars.insert(id, sense);
            return Ok(sense);
        }
        Ok(self.user_vars.get(&id).copied().unwrap_or(0))
    }
    fn close(&mut self) -> HwResult<()> {
        self.closed = true;
        Ok(())
    }
}

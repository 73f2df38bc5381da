//! Scripted motor for driving the control loop deterministically.

use std::collections::VecDeque;

use shuttle_traits::{HwResult, ShuttleMotor};

/// A write the loop issued to the motor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotorCommand {
    MaxVelocity(i32),
    MaxAcceleration(i32),
    RunCurrent(u8),
    StandbyCurrent(u8),
    StallGuardFilter(bool),
    StallGuardThreshold(i8),
    StopOnStall(i32),
    PulseDivisor(u8),
    RampDivisor(u8),
    TargetSpeed(i32),
    MoveTo(i32),
    UserVariable(u8, i32),
    Close,
}

/// Motor whose position-sense reads follow a script.
///
/// A "poll" is one read of the position-sense variable. Scripts repeat their
/// last value once exhausted. Faults are injected by poll index (0-based) and
/// surface on the light-gate or status read of that tick.
#[derive(Debug, Clone)]
pub struct ScriptedMotor {
    senses: VecDeque<i32>,
    last_sense: i32,
    positions: VecDeque<i32>,
    last_position: i32,
    position_variable: u8,
    light_gate_pin: u8,
    microstep_res: u8,
    polls: usize,
    stall_at: Option<usize>,
    light_gate_fault_at: Option<usize>,
    read_failures: Option<(usize, usize)>,
    fail_position_reads: bool,
    fail_writes: bool,
    /// Every write, in order.
    pub log: Vec<MotorCommand>,
}

impl ScriptedMotor {
    #[must_use]
    pub fn new(senses: impl IntoIterator<Item = i32>) -> Self {
        Self {
            senses: senses.into_iter().collect(),
            last_sense: 0,
            positions: VecDeque::new(),
            last_position: 0,
            position_variable: 8,
            light_gate_pin: 10,
            microstep_res: 8,
            polls: 0,
            stall_at: None,
            light_gate_fault_at: None,
            read_failures: None,
            fail_position_reads: false,
            fail_writes: false,
            log: Vec::new(),
        }
    }

    /// `[0,1,1,0]` repeated once per transient.
    #[must_use]
    pub fn transients(n: usize) -> Self {
        Self::new(std::iter::repeat_n([0, 1, 1, 0], n).flatten())
    }

    /// Actual positions (steps) returned by successive position reads.
    #[must_use]
    pub fn with_positions(mut self, steps: impl IntoIterator<Item = i32>) -> Self {
        self.positions = steps.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_stall_at(mut self, poll: usize) -> Self {
        self.stall_at = Some(poll);
        self
    }

    #[must_use]
    pub fn with_light_gate_fault_at(mut self, poll: usize) -> Self {
        self.light_gate_fault_at = Some(poll);
        self
    }

    /// Fail `count` consecutive status reads starting at poll `from`.
    #[must_use]
    pub fn with_read_failures(mut self, from: usize, count: usize) -> Self {
        self.read_failures = Some((from, count));
        self
    }

    /// Every actual-position read fails.
    #[must_use]
    pub fn with_failing_position_reads(mut self) -> Self {
        self.fail_position_reads = true;
        self
    }

    /// Every write fails.
    #[must_use]
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    #[must_use]
    pub fn with_microstep_resolution(mut self, res: u8) -> Self {
        self.microstep_res = res;
        self
    }

    /// Position-sense reads served so far.
    #[must_use]
    pub fn polls(&self) -> usize {
        self.polls
    }

    /// Target speeds commanded, in order.
    #[must_use]
    pub fn target_speeds(&self) -> Vec<i32> {
        self.log
            .iter()
            .filter_map(|c| match c {
                MotorCommand::TargetSpeed(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Values written to a user variable, in order.
    #[must_use]
    pub fn user_variable_writes(&self, id: u8) -> Vec<i32> {
        self.log
            .iter()
            .filter_map(|c| match c {
                MotorCommand::UserVariable(var, v) if *var == id => Some(*v),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.log.contains(&MotorCommand::Close)
    }

    fn record(&mut self, cmd: MotorCommand) -> HwResult<()> {
        if self.fail_writes && cmd != MotorCommand::Close {
            return Err(Box::new(std::io::Error::other("scripted write failure")));
        }
        self.log.push(cmd);
        Ok(())
    }

    fn read_failing(&self) -> bool {
        self.read_failures
            .is_some_and(|(from, count)| self.polls >= from && self.polls < from + count)
    }
}

impl ShuttleMotor for ScriptedMotor {
    fn set_max_velocity(&mut self, units: i32) -> HwResult<()> {
        self.record(MotorCommand::MaxVelocity(units))
    }
    fn set_max_acceleration(&mut self, units: i32) -> HwResult<()> {
        self.record(MotorCommand::MaxAcceleration(units))
    }
    fn set_run_current(&mut self, current: u8) -> HwResult<()> {
        self.record(MotorCommand::RunCurrent(current))
    }
    fn set_standby_current(&mut self, current: u8) -> HwResult<()> {
        self.record(MotorCommand::StandbyCurrent(current))
    }
    fn set_stall_guard_filter(&mut self, enabled: bool) -> HwResult<()> {
        self.record(MotorCommand::StallGuardFilter(enabled))
    }
    fn set_stall_guard_threshold(&mut self, threshold: i8) -> HwResult<()> {
        self.record(MotorCommand::StallGuardThreshold(threshold))
    }
    fn set_stop_on_stall(&mut self, velocity: i32) -> HwResult<()> {
        self.record(MotorCommand::StopOnStall(velocity))
    }
    fn set_pulse_divisor(&mut self, divisor: u8) -> HwResult<()> {
        self.record(MotorCommand::PulseDivisor(divisor))
    }
    fn set_ramp_divisor(&mut self, divisor: u8) -> HwResult<()> {
        self.record(MotorCommand::RampDivisor(divisor))
    }
    fn microstep_resolution(&mut self) -> HwResult<u8> {
        Ok(self.microstep_res)
    }
    fn set_target_speed(&mut self, units: i32) -> HwResult<()> {
        self.record(MotorCommand::TargetSpeed(units))
    }
    fn move_to_absolute_position(&mut self, steps: i32) -> HwResult<()> {
        self.record(MotorCommand::MoveTo(steps))
    }
    fn current_position(&mut self) -> HwResult<i32> {
        if self.fail_position_reads {
            return Err(Box::new(std::io::Error::other("scripted position timeout")));
        }
        if let Some(p) = self.positions.pop_front() {
            self.last_position = p;
        }
        Ok(self.last_position)
    }
    fn digital_input(&mut self, pin: u8) -> HwResult<bool> {
        if pin != self.light_gate_pin {
            return Ok(true);
        }
        Ok(self.light_gate_fault_at != Some(self.polls))
    }
    fn status_flags(&mut self) -> HwResult<u32> {
        if self.read_failing() {
            // A failed tick never reaches the position read; advance manually.
            self.polls += 1;
            return Err(Box::new(std::io::Error::other("scripted read timeout")));
        }
        Ok(u32::from(self.stall_at.is_some_and(|at| self.polls >= at)))
    }
    fn set_user_variable(&mut self, id: u8, value: i32) -> HwResult<()> {
        self.record(MotorCommand::UserVariable(id, value))
    }
    fn user_variable(&mut self, id: u8) -> HwResult<i32> {
        if id != self.position_variable {
            return Ok(0);
        }
        if let Some(s) = self.senses.pop_front() {
            self.last_sense = s;
        }
        self.polls += 1;
        Ok(self.last_sense)
    }
    fn close(&mut self) -> HwResult<()> {
        self.record(MotorCommand::Close)
    }
}

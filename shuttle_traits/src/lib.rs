pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type crossing the hardware boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Command adapter for the shuttle's stepper motor module.
///
/// Every call is a synchronous round trip to the device and may fail. Values
/// are in the module's native units (steps, internal speed/acceleration
/// units); conversion from physical units happens in the core.
pub trait ShuttleMotor {
    fn set_max_velocity(&mut self, units: i32) -> HwResult<()>;
    fn set_max_acceleration(&mut self, units: i32) -> HwResult<()>;
    fn set_run_current(&mut self, current: u8) -> HwResult<()>;
    fn set_standby_current(&mut self, current: u8) -> HwResult<()>;
    fn set_stall_guard_filter(&mut self, enabled: bool) -> HwResult<()>;
    fn set_stall_guard_threshold(&mut self, threshold: i8) -> HwResult<()>;
    fn set_stop_on_stall(&mut self, velocity: i32) -> HwResult<()>;
    fn set_pulse_divisor(&mut self, divisor: u8) -> HwResult<()>;
    fn set_ramp_divisor(&mut self, divisor: u8) -> HwResult<()>;
    /// Microstep resolution exponent (steps per full step = 2^res).
    fn microstep_resolution(&mut self) -> HwResult<u8>;
    fn set_target_speed(&mut self, units: i32) -> HwResult<()>;
    fn move_to_absolute_position(&mut self, steps: i32) -> HwResult<()>;
    fn current_position(&mut self) -> HwResult<i32>;
    /// Level of a digital input; `true` is high.
    fn digital_input(&mut self, pin: u8) -> HwResult<bool>;
    /// Driver status bitmask; non-zero means a stall or driver error.
    fn status_flags(&mut self) -> HwResult<u32>;
    fn set_user_variable(&mut self, id: u8, value: i32) -> HwResult<()>;
    fn user_variable(&mut self, id: u8) -> HwResult<i32>;

    /// Release the connection. Further calls are not expected to succeed.
    fn close(&mut self) -> HwResult<()> {
        Ok(())
    }
}

impl<M: ShuttleMotor + ?Sized> ShuttleMotor for Box<M> {
    fn set_max_velocity(&mut self, units: i32) -> HwResult<()> {
        (**self).set_max_velocity(units)
    }
    fn set_max_acceleration(&mut self, units: i32) -> HwResult<()> {
        (**self).set_max_acceleration(units)
    }
    fn set_run_current(&mut self, current: u8) -> HwResult<()> {
        (**self).set_run_current(current)
    }
    fn set_standby_current(&mut self, current: u8) -> HwResult<()> {
        (**self).set_standby_current(current)
    }
    fn set_stall_guard_filter(&mut self, enabled: bool) -> HwResult<()> {
        (**self).set_stall_guard_filter(enabled)
    }
    fn set_stall_guard_threshold(&mut self, threshold: i8) -> HwResult<()> {
        (**self).set_stall_guard_threshold(threshold)
    }
    fn set_stop_on_stall(&mut self, velocity: i32) -> HwResult<()> {
        (**self).set_stop_on_stall(velocity)
    }
    fn set_pulse_divisor(&mut self, divisor: u8) -> HwResult<()> {
        (**self).set_pulse_divisor(divisor)
    }
    fn set_ramp_divisor(&mut self, divisor: u8) -> HwResult<()> {
        (**self).set_ramp_divisor(divisor)
    }
    fn microstep_resolution(&mut self) -> HwResult<u8> {
        (**self).microstep_resolution()
    }
    fn set_target_speed(&mut self, units: i32) -> HwResult<()> {
        (**self).set_target_speed(units)
    }
    fn move_to_absolute_position(&mut self, steps: i32) -> HwResult<()> {
        (**self).move_to_absolute_position(steps)
    }
    fn current_position(&mut self) -> HwResult<i32> {
        (**self).current_position()
    }
    fn digital_input(&mut self, pin: u8) -> HwResult<bool> {
        (**self).digital_input(pin)
    }
    fn status_flags(&mut self) -> HwResult<u32> {
        (**self).status_flags()
    }
    fn set_user_variable(&mut self, id: u8, value: i32) -> HwResult<()> {
        (**self).set_user_variable(id, value)
    }
    fn user_variable(&mut self, id: u8) -> HwResult<i32> {
        (**self).user_variable(id)
    }
    fn close(&mut self) -> HwResult<()> {
        (**self).close()
    }
}

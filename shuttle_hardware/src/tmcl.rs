//! Trinamic TMCL binary protocol over any byte stream.
//!
//! Every command is a 9-byte request answered by a 9-byte reply:
//!
//! ```text
//! request: address | command | type | motor/bank | value (i32, big endian) | checksum
//! reply:   host    | module  | status | command  | value (i32, big endian) | checksum
//! ```
//!
//! The checksum is the byte sum of the first eight bytes, modulo 256.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use shuttle_traits::{HwResult, ShuttleMotor};

use crate::error::{HwError, Result};
use crate::util::read_exact_with_deadline;

pub const FRAME_LEN: usize = 9;

/// Status codes that mean the command was executed.
pub const STATUS_OK: u8 = 100;
pub const STATUS_LOADED: u8 = 101;

/// Reply polling granularity while waiting for the module.
const READ_POLL: Duration = Duration::from_millis(1);

/// Upper bound on bytes discarded while resynchronising the link.
const DRAIN_LIMIT: usize = 64 * FRAME_LEN;

/// Bank holding the TMCL program's user variables.
pub const USER_VARIABLE_BANK: u8 = 2;

/// TMCL instruction numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Move to position
    Mvp = 4,
    /// Set axis parameter
    Sap = 5,
    /// Get axis parameter
    Gap = 6,
    /// Set global parameter
    Sgp = 9,
    /// Get global parameter
    Ggp = 10,
    /// Get input
    Gio = 15,
}

/// Axis parameter numbers.
pub mod param {
    pub const TARGET_POSITION: u8 = 0;
    pub const ACTUAL_POSITION: u8 = 1;
    pub const TARGET_SPEED: u8 = 2;
    pub const MAX_SPEED: u8 = 4;
    pub const MAX_ACCELERATION: u8 = 5;
    pub const RUN_CURRENT: u8 = 6;
    pub const STANDBY_CURRENT: u8 = 7;
    pub const MICROSTEP_RESOLUTION: u8 = 140;
    pub const RAMP_DIVISOR: u8 = 153;
    pub const PULSE_DIVISOR: u8 = 154;
    pub const STALL_GUARD_FILTER: u8 = 173;
    pub const STALL_GUARD_THRESHOLD: u8 = 174;
    pub const STOP_ON_STALL: u8 = 181;
    pub const ERROR_FLAGS: u8 = 207;
}

#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Human-readable TMCL status.
#[must_use]
pub fn status_text(status: u8) -> &'static str {
    match status {
        STATUS_OK => "ok",
        STATUS_LOADED => "loaded into EEPROM",
        1 => "wrong checksum",
        2 => "invalid command",
        3 => "wrong type",
        4 => "invalid value",
        5 => "configuration EEPROM locked",
        6 => "command not available",
        _ => "unknown status",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub address: u8,
    pub command: u8,
    pub type_: u8,
    pub bank: u8,
    pub value: i32,
}

impl Request {
    #[must_use]
    pub fn new(address: u8, command: Command, type_: u8, bank: u8, value: i32) -> Self {
        Self {
            address,
            command: command as u8,
            type_,
            bank,
            value,
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut f = [0u8; FRAME_LEN];
        f[0] = self.address;
        f[1] = self.command;
        f[2] = self.type_;
        f[3] = self.bank;
        f[4..8].copy_from_slice(&self.value.to_be_bytes());
        f[8] = checksum(&f[..8]);
        f
    }

    pub fn decode(frame: &[u8; FRAME_LEN]) -> Result<Self> {
        verify(frame)?;
        Ok(Self {
            address: frame[0],
            command: frame[1],
            type_: frame[2],
            bank: frame[3],
            value: be_value(frame),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub reply_address: u8,
    pub module_address: u8,
    pub status: u8,
    pub command: u8,
    pub value: i32,
}

impl Reply {
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut f = [0u8; FRAME_LEN];
        f[0] = self.reply_address;
        f[1] = self.module_address;
        f[2] = self.status;
        f[3] = self.command;
        f[4..8].copy_from_slice(&self.value.to_be_bytes());
        f[8] = checksum(&f[..8]);
        f
    }

    pub fn decode(frame: &[u8; FRAME_LEN]) -> Result<Self> {
        verify(frame)?;
        Ok(Self {
            reply_address: frame[0],
            module_address: frame[1],
            status: frame[2],
            command: frame[3],
            value: be_value(frame),
        })
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.status, STATUS_OK | STATUS_LOADED)
    }
}

fn verify(frame: &[u8; FRAME_LEN]) -> Result<()> {
    let expected = checksum(&frame[..8]);
    if frame[8] != expected {
        return Err(HwError::Checksum {
            expected,
            got: frame[8],
        });
    }
    Ok(())
}

fn be_value(frame: &[u8; FRAME_LEN]) -> i32 {
    i32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]])
}

/// A TMCL module (TMCM-1160, TMCM-1060) on a byte stream.
#[derive(Debug)]
pub struct TmclModule<P> {
    port: P,
    address: u8,
    motor: u8,
    timeout: Duration,
    /// Set after a timeout or framing error; late bytes may still be queued.
    stale: bool,
    closed: bool,
}

impl<P: Read + Write> TmclModule<P> {
    #[must_use]
    pub fn new(port: P, address: u8, timeout: Duration) -> Self {
        Self {
            port,
            address,
            motor: 0,
            timeout,
            stale: false,
            closed: false,
        }
    }

    #[must_use]
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Send one request and return the reply value.
    ///
    /// Replies to an earlier command (a reply that missed its deadline) are
    /// discarded until the matching reply arrives or the deadline passes.
    pub fn request(&mut self, command: Command, type_: u8, bank: u8, value: i32) -> Result<i32> {
        if self.closed {
            return Err(HwError::Closed);
        }
        if self.stale {
            self.drain_input()?;
        }
        let req = Request::new(self.address, command, type_, bank, value);
        self.port.write_all(&req.encode())?;
        self.port.flush()?;

        let result = self.read_reply(&req);
        self.stale = matches!(
            result,
            Err(HwError::Timeout | HwError::Checksum { .. } | HwError::UnexpectedReply(_))
        );
        let reply = result?;
        if !reply.is_ok() {
            return Err(HwError::Status {
                command: req.command,
                status: reply.status,
                text: status_text(reply.status),
            });
        }
        tracing::trace!(
            command = req.command,
            type_,
            bank,
            value,
            reply = reply.value,
            "tmcl"
        );
        Ok(reply.value)
    }

    fn read_reply(&mut self, req: &Request) -> Result<Reply> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut frame = [0u8; FRAME_LEN];
            read_exact_with_deadline(&mut self.port, &mut frame, remaining, READ_POLL)?;
            let reply = Reply::decode(&frame)?;
            if reply.module_address != self.address {
                return Err(HwError::UnexpectedReply(format!(
                    "reply from module {} while talking to {}",
                    reply.module_address, self.address
                )));
            }
            if reply.command == req.command {
                return Ok(reply);
            }
            tracing::debug!(
                expected = req.command,
                got = reply.command,
                "discarding stale tmcl reply"
            );
            if Instant::now() >= deadline {
                return Err(HwError::Timeout);
            }
        }
    }

    /// Discard whatever the module has already sent.
    fn drain_input(&mut self) -> Result<()> {
        let mut buf = [0u8; FRAME_LEN];
        let mut dropped = 0;
        while dropped < DRAIN_LIMIT {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => dropped += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    break;
                }
                Err(e) => return Err(HwError::Io(e)),
            }
        }
        if dropped > 0 {
            tracing::debug!(bytes = dropped, "discarded late tmcl bytes");
        }
        self.stale = false;
        Ok(())
    }

    pub fn set_axis_parameter(&mut self, p: u8, value: i32) -> Result<()> {
        self.request(Command::Sap, p, self.motor, value).map(drop)
    }

    pub fn axis_parameter(&mut self, p: u8) -> Result<i32> {
        self.request(Command::Gap, p, self.motor, 0)
    }

    pub fn set_global_parameter(&mut self, bank: u8, p: u8, value: i32) -> Result<()> {
        self.request(Command::Sgp, p, bank, value).map(drop)
    }

    pub fn global_parameter(&mut self, bank: u8, p: u8) -> Result<i32> {
        self.request(Command::Ggp, p, bank, 0)
    }

    /// Absolute move (MVP ABS).
    pub fn move_to(&mut self, steps: i32) -> Result<()> {
        self.request(Command::Mvp, 0, self.motor, steps).map(drop)
    }

    /// Digital input level (GIO bank 0).
    pub fn input(&mut self, pin: u8) -> Result<bool> {
        Ok(self.request(Command::Gio, pin, 0, 0)? != 0)
    }
}

impl<P: Read + Write> ShuttleMotor for TmclModule<P> {
    fn set_max_velocity(&mut self, units: i32) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::MAX_SPEED, units)?)
    }
    fn set_max_acceleration(&mut self, units: i32) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::MAX_ACCELERATION, units)?)
    }
    fn set_run_current(&mut self, current: u8) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::RUN_CURRENT, i32::from(current))?)
    }
    fn set_standby_current(&mut self, current: u8) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::STANDBY_CURRENT, i32::from(current))?)
    }
    fn set_stall_guard_filter(&mut self, enabled: bool) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::STALL_GUARD_FILTER, i32::from(enabled))?)
    }
    fn set_stall_guard_threshold(&mut self, threshold: i8) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::STALL_GUARD_THRESHOLD, i32::from(threshold))?)
    }
    fn set_stop_on_stall(&mut self, velocity: i32) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::STOP_ON_STALL, velocity)?)
    }
    fn set_pulse_divisor(&mut self, divisor: u8) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::PULSE_DIVISOR, i32::from(divisor))?)
    }
    fn set_ramp_divisor(&mut self, divisor: u8) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::RAMP_DIVISOR, i32::from(divisor))?)
    }
    fn microstep_resolution(&mut self) -> HwResult<u8> {
        let v = self.axis_parameter(param::MICROSTEP_RESOLUTION)?;
        Ok(u8::try_from(v).map_err(|_| {
            HwError::OutOfRange(format!("microstep resolution {v}"))
        })?)
    }
    fn set_target_speed(&mut self, units: i32) -> HwResult<()> {
        Ok(self.set_axis_parameter(param::TARGET_SPEED, units)?)
    }
    fn move_to_absolute_position(&mut self, steps: i32) -> HwResult<()> {
        Ok(self.move_to(steps)?)
    }
    fn current_position(&mut self) -> HwResult<i32> {
        Ok(self.axis_parameter(param::ACTUAL_POSITION)?)
    }
    fn digital_input(&mut self, pin: u8) -> HwResult<bool> {
        Ok(self.input(pin)?)
    }
    fn status_flags(&mut self) -> HwResult<u32> {
        let v = self.axis_parameter(param::ERROR_FLAGS)?;
        #[allow(clippy::cast_sign_loss)]
        let flags = v as u32;
        Ok(flags)
    }
    fn set_user_variable(&mut self, id: u8, value: i32) -> HwResult<()> {
        Ok(self.set_global_parameter(USER_VARIABLE_BANK, id, value)?)
    }
    fn user_variable(&mut self, id: u8) -> HwResult<i32> {
        Ok(self.global_parameter(USER_VARIABLE_BANK, id)?)
    }
    /// Flush and refuse further requests. The OS handle is released when
    /// the module is dropped.
    fn close(&mut self) -> HwResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.port.flush()?;
        tracing::debug!(address = self.address, "tmcl connection released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_reference_frame() {
        // ROR motor 0, velocity 500
        assert_eq!(checksum(&[0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0xF4]), 0xF7);
    }

    #[test]
    fn request_encodes_negative_values_big_endian() {
        let f = Request::new(1, Command::Sap, param::STALL_GUARD_THRESHOLD, 0, -2).encode();
        assert_eq!(&f[..8], &[1, 5, 174, 0, 0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(f[8], checksum(&f[..8]));
    }

    #[test]
    fn corrupted_reply_is_rejected() {
        let mut f = Reply {
            reply_address: 2,
            module_address: 1,
            status: STATUS_OK,
            command: 6,
            value: 1234,
        }
        .encode();
        f[6] ^= 0x10;
        assert!(matches!(Reply::decode(&f), Err(HwError::Checksum { .. })));
    }
}

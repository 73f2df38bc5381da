//! Conversion between physical units (cm, cm/s, cm/s²) and motor-module units.

use crate::config::{MotorModel, MotorSettings};

/// Internal clock of the TMCM-1160 ramp generator.
const TMCM1160_CLOCK_HZ: f64 = 16.0e6;

/// Unit conversion for one motor configuration and wheel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorUnits {
    pub model: MotorModel,
    pub circumference_cm: f64,
    pub full_step_rot: u32,
    pub microstep_res: u8,
    pub pulse_divisor: u8,
    pub ramp_divisor: u8,
    pub direction: i8,
}

impl MotorUnits {
    #[must_use]
    pub fn new(motor: &MotorSettings, circumference_cm: f64, microstep_res: u8) -> Self {
        Self {
            model: motor.model,
            circumference_cm,
            full_step_rot: motor.full_step_rot,
            microstep_res,
            pulse_divisor: motor.pulse_divisor,
            ramp_divisor: motor.ramp_divisor,
            direction: motor.direction,
        }
    }

    /// Microsteps per wheel revolution.
    #[must_use]
    pub fn steps_per_rev(&self) -> f64 {
        f64::from(self.full_step_rot) * 2f64.powi(i32::from(self.microstep_res))
    }

    /// Velocity in module units. Saturates at the i32 range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn speed_units(&self, cm_s: f64) -> i32 {
        let pps = cm_s / self.circumference_cm * self.steps_per_rev();
        let v = match self.model {
            MotorModel::Tmcm1160 => {
                pps * 2f64.powi(i32::from(self.pulse_divisor)) * 2048.0 * 32.0 / TMCM1160_CLOCK_HZ
            }
            MotorModel::Tmcm1060 => pps,
        };
        v as i32
    }

    /// Acceleration in module units. Saturates at the i32 range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn accel_units(&self, cm_s2: f64) -> i32 {
        let pps2 = cm_s2 / self.circumference_cm * self.steps_per_rev();
        let a = match self.model {
            MotorModel::Tmcm1160 => {
                let shift = i32::from(self.ramp_divisor) + i32::from(self.pulse_divisor) + 29;
                pps2 * 2f64.powi(shift) / (TMCM1160_CLOCK_HZ * TMCM1160_CLOCK_HZ)
            }
            MotorModel::Tmcm1060 => pps2,
        };
        a as i32
    }

    /// Microsteps needed to travel `cm`, truncated toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn steps_for_distance(&self, cm: f64) -> i32 {
        (cm * self.steps_per_rev() / self.circumference_cm) as i32
    }

    /// Sample height in cm for a reported actual position.
    #[must_use]
    pub fn distance_for_steps(&self, steps: i32) -> f64 {
        f64::from(steps) * f64::from(self.direction) * self.circumference_cm / self.steps_per_rev()
    }
}

/// Highest commandable speed in cm/s, when the model has a fixed ceiling.
#[must_use]
pub fn max_speed_cm_s(model: MotorModel, circumference_cm: f64, pulse_divisor: u8) -> Option<f64> {
    match model {
        MotorModel::Tmcm1160 => Some(shuttle_config::tmcm1160_speed_limit(
            circumference_cm,
            pulse_divisor,
        )),
        MotorModel::Tmcm1060 => None,
    }
}

/// Highest commandable acceleration in cm/s², when the model has a fixed ceiling.
#[must_use]
pub fn max_accel_cm_s2(
    model: MotorModel,
    circumference_cm: f64,
    pulse_divisor: u8,
    ramp_divisor: u8,
) -> Option<f64> {
    match model {
        MotorModel::Tmcm1160 => {
            let shift = i32::from(ramp_divisor) + i32::from(pulse_divisor) + 29;
            Some(circumference_cm * (1.024e13 / 2f64.powi(shift)))
        }
        MotorModel::Tmcm1060 => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(model: MotorModel) -> MotorUnits {
        MotorUnits {
            model,
            circumference_cm: 25.0,
            full_step_rot: 200,
            microstep_res: 8,
            pulse_divisor: 3,
            ramp_divisor: 7,
            direction: -1,
        }
    }

    #[test]
    fn steps_per_rev_uses_microstep_exponent() {
        assert_eq!(units(MotorModel::Tmcm1160).steps_per_rev(), 51_200.0);
    }

    #[test]
    fn tmcm1160_speed_ceiling_maps_to_register_max() {
        let u = units(MotorModel::Tmcm1160);
        let vmax = max_speed_cm_s(MotorModel::Tmcm1160, 25.0, 3).unwrap();
        assert_eq!(u.speed_units(vmax), 2048);
        assert_eq!(u.speed_units(25.0), 1677);
    }

    #[test]
    fn tmcm1160_accel_ceiling() {
        let amax = max_accel_cm_s2(MotorModel::Tmcm1160, 25.0, 3, 7).unwrap();
        assert!((amax - 465.661).abs() < 1e-3);
        let u = units(MotorModel::Tmcm1160);
        assert!((2047..=2048).contains(&u.accel_units(amax)));
    }

    #[test]
    fn tmcm1060_uses_pulses_per_second() {
        let u = units(MotorModel::Tmcm1060);
        assert_eq!(u.speed_units(25.0), 51_200);
        assert_eq!(u.accel_units(12.5), 25_600);
        assert_eq!(max_speed_cm_s(MotorModel::Tmcm1060, 25.0, 3), None);
    }

    #[test]
    fn distance_steps_round_trip_respects_direction() {
        let u = units(MotorModel::Tmcm1160);
        let steps = u.steps_for_distance(50.0);
        assert_eq!(steps, 102_400);
        assert!((u.distance_for_steps(-steps) - 50.0).abs() < 1e-9);
    }
}

// Differential-drive kinematics for the two-wheel base
// Converts body-frame velocities (linear, angular) to per-wheel motor commands.

use serde::{Deserialize, Serialize};

/// Raw command units per m/s of wheel speed for the uncalibrated mapping
pub const NOMINAL_RAW_PER_MPS: f64 = 50.0;

/// Maximum raw wheel command (safety limit)
pub const MAX_RAW: i16 = 3000;

/// Per-wheel motor calibration.
///
/// The calibrated mapping is affine in wheel speed: `raw = a * v + sign(v) * b`,
/// where `b` compensates the motor deadband. Inversion flags account for
/// mirrored motor mounting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub inverse_left_motor: bool,
    pub inverse_right_motor: bool,
    pub a_left: f64,
    pub b_left: f64,
    pub a_right: f64,
    pub b_right: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            inverse_left_motor: true,
            inverse_right_motor: false,
            a_left: 41.2,
            b_left: 0.0,
            a_right: 41.2,
            b_right: 0.0,
        }
    }
}

/// Linear wheel speeds in m/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelSpeeds {
    pub left: f64,
    pub right: f64,
}

/// Raw wheel commands for the two motors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelCommand {
    pub left: i16,
    pub right: i16,
}

impl WheelCommand {
    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Convert body-frame velocities to wheel speeds
///
/// # Arguments
/// * `linear` - Forward velocity in m/s
/// * `angular` - Rotational velocity in rad/s (positive = counter-clockwise)
/// * `wheel_separation` - Distance between the wheels in meters
pub fn body_to_wheel(linear: f64, angular: f64, wheel_separation: f64) -> WheelSpeeds {
    let half_track = angular * wheel_separation / 2.0;
    WheelSpeeds {
        left: linear - half_track,
        right: linear + half_track,
    }
}

impl Calibration {
    /// Map wheel speeds with the nominal gain only
    pub fn nominal(&self, speeds: WheelSpeeds) -> WheelCommand {
        self.finish(
            speeds.left * NOMINAL_RAW_PER_MPS,
            speeds.right * NOMINAL_RAW_PER_MPS,
        )
    }

    /// Map wheel speeds through the per-wheel affine calibration
    pub fn calibrated(&self, speeds: WheelSpeeds) -> WheelCommand {
        self.finish(
            affine(speeds.left, self.a_left, self.b_left),
            affine(speeds.right, self.a_right, self.b_right),
        )
    }

    /// Scale into range, apply mounting inversion, convert to integers
    fn finish(&self, left: f64, right: f64) -> WheelCommand {
        let peak = left.abs().max(right.abs());
        let scale = if peak > MAX_RAW as f64 {
            MAX_RAW as f64 / peak
        } else {
            1.0
        };

        let left = if self.inverse_left_motor { -left } else { left };
        let right = if self.inverse_right_motor {
            -right
        } else {
            right
        };

        WheelCommand {
            left: to_raw(left * scale),
            right: to_raw(right * scale),
        }
    }
}

fn affine(speed: f64, a: f64, b: f64) -> f64 {
    if speed == 0.0 {
        0.0
    } else {
        a * speed + b * speed.signum()
    }
}

fn to_raw(value: f64) -> i16 {
    (value.round() as i32).clamp(-(MAX_RAW as i32), MAX_RAW as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plain() -> Calibration {
        Calibration {
            inverse_left_motor: false,
            inverse_right_motor: false,
            ..Calibration::default()
        }
    }

    #[test]
    fn test_zero_velocity() {
        let speeds = body_to_wheel(0.0, 0.0, 0.46);
        assert_eq!(Calibration::default().nominal(speeds), WheelCommand::zero());
        assert_eq!(Calibration::default().calibrated(speeds), WheelCommand::zero());
    }

    #[test]
    fn test_forward_motion_equal_wheels() {
        let speeds = body_to_wheel(0.4, 0.0, 0.46);
        assert_relative_eq!(speeds.left, 0.4);
        assert_relative_eq!(speeds.right, 0.4);
    }

    #[test]
    fn test_rotation_opposite_wheels() {
        let speeds = body_to_wheel(0.0, 1.0, 0.5);
        assert_relative_eq!(speeds.left, -0.25);
        assert_relative_eq!(speeds.right, 0.25);
    }

    #[test]
    fn test_inverse_left_motor_flips_sign() {
        let speeds = body_to_wheel(0.5, 0.0, 0.46);
        let cmd = Calibration::default().nominal(speeds);
        assert_eq!(cmd.left, -25);
        assert_eq!(cmd.right, 25);
    }

    #[test]
    fn test_calibrated_offset_follows_direction() {
        let calibration = Calibration {
            b_left: 5.0,
            b_right: 5.0,
            ..plain()
        };
        let cmd = calibration.calibrated(WheelSpeeds {
            left: -0.5,
            right: 0.5,
        });
        // 41.2 * 0.5 + 5 = 25.6
        assert_eq!(cmd.left, -26);
        assert_eq!(cmd.right, 26);
    }

    #[test]
    fn test_max_velocity_scaled_proportionally() {
        let cmd = plain().nominal(WheelSpeeds {
            left: 200.0,
            right: 100.0,
        });
        assert_eq!(cmd.left, MAX_RAW);
        assert_eq!(cmd.right, MAX_RAW / 2);
    }
}

// Velocity command shaping: dead-zone boost near standstill
//
// When the base is (almost) stopped, small commands would be swallowed by
// static friction and motor deadband. Such commands are snapped up to the
// configured floor so the base actually starts moving.

use serde::{Deserialize, Serialize};

use crate::estimator::VelocityEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadZoneConfig {
    pub enabled: bool,
    /// Linear command floor in m/s
    pub linear_threshold: f64,
    /// Angular command floor in rad/s
    pub angular_threshold: f64,
    /// Estimated |linear| below this counts as stopped
    pub linear_zero_epsilon: f64,
    /// Estimated |angular| below this counts as stopped
    pub angular_zero_epsilon: f64,
}

impl Default for DeadZoneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            linear_threshold: 0.15,
            angular_threshold: 0.3,
            linear_zero_epsilon: 0.05,
            angular_zero_epsilon: 0.05,
        }
    }
}

/// Which wheel mapping the shaped command is sent through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStrategy {
    Raw,
    Calibrated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear: f64,
    pub angular: f64,
}

impl VelocityCommand {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

#[derive(Debug, Clone)]
pub struct CommandShaper {
    dead_zone: DeadZoneConfig,
    strategy: CalibrationStrategy,
}

impl CommandShaper {
    pub fn new(dead_zone: DeadZoneConfig, strategy: CalibrationStrategy) -> Self {
        Self {
            dead_zone,
            strategy,
        }
    }

    pub fn strategy(&self) -> CalibrationStrategy {
        self.strategy
    }

    /// Shape a desired command given the current velocity estimate.
    ///
    /// The angular boost is checked first; a command small in both axes only
    /// gets its angular component raised. Boosted values keep the requested
    /// direction.
    pub fn shape(&self, desired: VelocityCommand, estimate: VelocityEstimate) -> VelocityCommand {
        let dz = &self.dead_zone;
        let mut shaped = desired;
        if !dz.enabled {
            return shaped;
        }

        let almost_stopped = estimate.linear.abs() < dz.linear_zero_epsilon
            && estimate.angular.abs() < dz.angular_zero_epsilon;
        if !almost_stopped {
            return shaped;
        }

        let linear = desired.linear.abs();
        let angular = desired.angular.abs();
        // copysign on purpose: a small reverse command must not flip direction
        if angular > 0.0 && angular < dz.angular_threshold && linear < dz.linear_threshold {
            shaped.angular = dz.angular_threshold.copysign(desired.angular);
        } else if linear > 0.0 && linear < dz.linear_threshold && angular < dz.angular_threshold {
            shaped.linear = dz.linear_threshold.copysign(desired.linear);
        }
        shaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floors() -> DeadZoneConfig {
        DeadZoneConfig {
            enabled: true,
            linear_threshold: 0.15,
            angular_threshold: 0.3,
            linear_zero_epsilon: 0.05,
            angular_zero_epsilon: 0.05,
        }
    }

    fn shaper() -> CommandShaper {
        CommandShaper::new(floors(), CalibrationStrategy::Calibrated)
    }

    fn at_rest() -> VelocityEstimate {
        VelocityEstimate {
            linear: 0.01,
            angular: -0.01,
        }
    }

    #[test]
    fn test_small_angular_snaps_to_floor() {
        let shaped = shaper().shape(VelocityCommand::new(0.0, 0.05), at_rest());
        assert_eq!(shaped, VelocityCommand::new(0.0, 0.3));
    }

    #[test]
    fn test_small_linear_snaps_to_floor() {
        let shaped = shaper().shape(VelocityCommand::new(0.05, 0.0), at_rest());
        assert_eq!(shaped, VelocityCommand::new(0.15, 0.0));
    }

    #[test]
    fn test_small_in_both_boosts_angular_only() {
        let shaped = shaper().shape(VelocityCommand::new(0.05, 0.05), at_rest());
        assert_eq!(shaped, VelocityCommand::new(0.05, 0.3));
    }

    #[test]
    fn test_zero_command_untouched() {
        let shaped = shaper().shape(VelocityCommand::default(), at_rest());
        assert_eq!(shaped, VelocityCommand::default());
    }

    #[test]
    fn test_large_linear_disables_angular_boost() {
        let shaped = shaper().shape(VelocityCommand::new(0.4, 0.05), at_rest());
        assert_eq!(shaped, VelocityCommand::new(0.4, 0.05));
    }

    #[test]
    fn test_no_boost_while_moving() {
        let moving = VelocityEstimate {
            linear: 0.2,
            angular: 0.0,
        };
        let shaped = shaper().shape(VelocityCommand::new(0.05, 0.0), moving);
        assert_eq!(shaped, VelocityCommand::new(0.05, 0.0));
    }

    #[test]
    fn test_disabled_is_pass_through() {
        let shaper = CommandShaper::new(
            DeadZoneConfig {
                enabled: false,
                ..floors()
            },
            CalibrationStrategy::Raw,
        );
        let shaped = shaper.shape(VelocityCommand::new(0.0, 0.05), at_rest());
        assert_eq!(shaped, VelocityCommand::new(0.0, 0.05));
    }

    #[test]
    fn test_negative_small_command_keeps_direction() {
        let shaped = shaper().shape(VelocityCommand::new(0.0, -0.1), at_rest());
        assert_eq!(shaped.angular, -0.3);
        let shaped = shaper().shape(VelocityCommand::new(-0.02, 0.0), at_rest());
        assert_eq!(shaped.linear, -0.15);
    }
}

// Timeouts, topics, runtime configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::robot::kinematics::Calibration;
use crate::shaper::DeadZoneConfig;

// Staleness budgets for the watchdogs
pub const IMU_TIMEOUT: Duration = Duration::from_millis(250);
pub const CMD_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on the driving loop rate; boards answer in milliseconds
pub const MAX_LOOP_HZ: f64 = 1000.0;

// Zenoh topics: inputs
pub const TOPIC_CMD_VEL: &str = "stalkbot/cmd/vel";
pub const TOPIC_CMD_VEL_RAW: &str = "stalkbot/cmd/vel_raw";
pub const TOPIC_IMU: &str = "stalkbot/sensor/imu";
pub const TOPIC_STALK: &str = "stalkbot/cmd/stalk";
pub const TOPIC_STALK_REF: &str = "stalkbot/cmd/stalk_ref";

// Zenoh topics: outputs
pub const TOPIC_ODOM: &str = "stalkbot/state/odom";
pub const TOPIC_TF: &str = "stalkbot/state/tf";
pub const TOPIC_HEALTH: &str = "stalkbot/state/health";
pub const TOPIC_BATTERIES: &str = "stalkbot/state/batteries";
pub const TOPIC_BUTTONS: &str = "stalkbot/state/buttons";
pub const TOPIC_VOLUME: &str = "stalkbot/state/volume";
pub const TOPIC_TEMPERATURE: &str = "stalkbot/state/temperature";
pub const TOPIC_DIAGNOSTICS: &str = "stalkbot/state/diagnostics";

// Zenoh queryables (request/reply services)
pub const SERVICE_SET_DCDC: &str = "stalkbot/srv/set_dcdc";
pub const SERVICE_GET_DCDC: &str = "stalkbot/srv/get_dcdc";
pub const SERVICE_LEDS: &str = "stalkbot/srv/leds";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Coordinate frame names used in the published transforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameIds {
    pub odom: String,
    pub base: String,
    pub stalk: String,
    pub head: String,
}

impl Default for FrameIds {
    fn default() -> Self {
        Self {
            odom: "odom".to_string(),
            base: "base_link".to_string(),
            stalk: "stalk".to_string(),
            head: "head".to_string(),
        }
    }
}

/// Startup configuration, resolved once and immutable afterwards.
///
/// Every field has a default so a partial (or absent) JSON file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Driving loop frequency in Hz
    pub loop_hz: f64,
    /// Fuse yaw rate from the inertial topic instead of wheel differences
    pub using_imu: bool,
    /// Use the simulated backend instead of the serial boards
    pub simulation: bool,
    /// Serial port of the motion board
    pub board1: String,
    /// Serial port of the power board
    pub board2: String,
    pub frames: FrameIds,
    pub publish_temperature: bool,
    pub publish_buttons: bool,
    pub publish_volume: bool,
    pub publish_diagnostics: bool,
    pub number_of_leds: usize,
    pub initial_dcdc_mask: u8,
    pub final_dcdc_mask: u8,
    /// Height axis speed in mm/s
    pub height_velocity: u8,
    /// Tilt axis speed in deg/s
    pub tilt_velocity: u8,
    pub calibration: Calibration,
    /// Send velocity commands through the calibrated wheel mapping
    pub use_calibrated_velocity: bool,
    pub dead_zone: DeadZoneConfig,
    /// Distance between the wheels in meters
    pub wheel_separation: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            loop_hz: 20.0,
            using_imu: true,
            simulation: false,
            board1: "/dev/ttyUSB0".to_string(),
            board2: "/dev/ttyUSB1".to_string(),
            frames: FrameIds::default(),
            publish_temperature: true,
            publish_buttons: true,
            publish_volume: true,
            publish_diagnostics: true,
            number_of_leds: 60,
            initial_dcdc_mask: 0xFF,
            final_dcdc_mask: 0x00,
            height_velocity: 20,
            tilt_velocity: 2,
            calibration: Calibration::default(),
            use_calibrated_velocity: true,
            dead_zone: DeadZoneConfig::default(),
            wheel_separation: 0.46,
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file, or fall back to defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str::<RuntimeConfig>(&text)?
            }
            None => RuntimeConfig::default(),
        };
        config.resolve()
    }

    /// Apply cross-field rules and validate
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        if self.simulation {
            // the simulated backend has no inertial source
            self.using_imu = false;
        }

        if !(self.loop_hz.is_finite() && self.loop_hz > 0.0 && self.loop_hz <= MAX_LOOP_HZ) {
            return Err(ConfigError::Invalid {
                field: "loop_hz",
                reason: format!("must be in (0, {}], got {}", MAX_LOOP_HZ, self.loop_hz),
            });
        }
        if !(self.wheel_separation.is_finite() && self.wheel_separation > 0.0) {
            return Err(ConfigError::Invalid {
                field: "wheel_separation",
                reason: format!("must be positive, got {}", self.wheel_separation),
            });
        }
        let dz = &self.dead_zone;
        let thresholds = [
            dz.linear_threshold,
            dz.angular_threshold,
            dz.linear_zero_epsilon,
            dz.angular_zero_epsilon,
        ];
        if thresholds.iter().any(|t| !(t.is_finite() && *t >= 0.0)) {
            return Err(ConfigError::Invalid {
                field: "dead_zone",
                reason: "thresholds must be non-negative".to_string(),
            });
        }

        Ok(self)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.loop_hz)
    }
}

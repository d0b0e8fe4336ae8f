// Hardware capability for the differential-drive base and its stalk
//
// Provides:
// - The `Robot` trait every backend implements
// - Differential-drive kinematics and wheel calibration
// - A serial backend for the two controller boards
// - A simulated backend for bench testing

pub mod board;
pub mod kinematics;
pub mod simulated;
#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};

pub use board::BoardRobot;
pub use simulated::SimulatedRobot;

/// Stalk travel bounds
pub const MIN_HEIGHT_MM: i32 = 0;
pub const MAX_HEIGHT_MM: i32 = 700;
pub const MIN_TILT_DEG: i32 = -20;
pub const MAX_TILT_DEG: i32 = 20;

/// Error from a single capability call
#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from board {board}: {reason}")]
    InvalidResponse { board: u8, reason: String },

    #[error("Checksum mismatch for board {board}")]
    ChecksumMismatch { board: u8 },

    #[error("Board {board} returned error status: 0x{status:02X}")]
    BoardError { board: u8, status: u8 },

    #[error("Timeout waiting for response from board {board}")]
    Timeout { board: u8 },
}

pub type Result<T> = std::result::Result<T, RobotError>;

/// Allowed setpoint range of the two stalk axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalkLimits {
    pub min_height_mm: i32,
    pub max_height_mm: i32,
    pub min_tilt_deg: i32,
    pub max_tilt_deg: i32,
}

impl Default for StalkLimits {
    fn default() -> Self {
        Self {
            min_height_mm: MIN_HEIGHT_MM,
            max_height_mm: MAX_HEIGHT_MM,
            min_tilt_deg: MIN_TILT_DEG,
            max_tilt_deg: MAX_TILT_DEG,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub elec_level: u8,
    pub pc1_level: u8,
    pub motor_h_level: u8,
    pub motor_l_level: u8,
    pub charger_status: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    pub left_motor: i32,
    pub right_motor: i32,
    pub left_driver: i32,
    pub right_driver: i32,
    pub tilt_overheat: bool,
    pub height_overheat: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerDiagnostics {
    pub elec_bat_voltage: f64,
    pub pc1_bat_voltage: f64,
    pub cable_bat_voltage: f64,
    pub motor_voltage: f64,
    pub motor_h_voltage: f64,
    pub motor_l_voltage: f64,
    pub elec_instant_current: f64,
    pub motor_instant_current: f64,
    pub elec_integrated_current: f64,
    pub motor_integrated_current: f64,
}

/// Access to the robot hardware.
///
/// Calls are not reentrant: the caller serializes them. Each call reports
/// success through its `Result`, nothing panics across this boundary.
pub trait Robot {
    /// Wheel travel in meters since the previous call, as (left, right)
    fn incremental_distance(&mut self) -> Result<(f64, f64)>;

    /// Whether the base reports both wheels at rest
    fn is_stopped(&mut self) -> bool;

    /// Body velocity through the nominal wheel gain
    fn set_velocity(&mut self, linear: f64, angular: f64) -> Result<()>;

    /// Body velocity through the per-wheel calibrated mapping
    fn set_velocity_calibrated(&mut self, linear: f64, angular: f64) -> Result<()>;

    /// Raw per-wheel motor command
    fn set_velocity_raw(&mut self, left: i16, right: i16) -> Result<()>;

    fn height(&mut self) -> Result<i32>;
    fn set_height(&mut self, millimeters: i32) -> Result<()>;
    fn tilt(&mut self) -> Result<i32>;
    fn set_tilt(&mut self, degrees: i32) -> Result<()>;

    /// Height axis speed in mm/s
    fn set_height_velocity(&mut self, mm_per_sec: u8) -> Result<()>;
    /// Tilt axis speed in deg/s
    fn set_tilt_velocity(&mut self, deg_per_sec: u8) -> Result<()>;

    fn stalk_limits(&self) -> StalkLimits {
        StalkLimits::default()
    }

    fn battery_status(&mut self) -> Result<BatteryStatus>;
    fn temperatures(&mut self) -> Result<Temperatures>;
    /// State of the two arcade buttons
    fn buttons(&mut self) -> Result<(bool, bool)>;
    /// Rotary encoder increment since the previous call
    fn rotary_encoder(&mut self) -> Result<i32>;
    fn power_diagnostics(&mut self) -> Result<PowerDiagnostics>;

    fn dcdc_mask(&mut self) -> Result<u8>;
    fn enable_dcdc(&mut self, mask: u8) -> Result<()>;

    /// Packed RGB triplets, one per LED
    fn set_leds(&mut self, rgb: &[u8]) -> Result<()>;
}

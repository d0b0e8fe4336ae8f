// Message types exchanged over zenoh (JSON payloads)

use serde::{Deserialize, Serialize};

use crate::estimator::{Pose, VelocityEstimate};
use crate::robot::PowerDiagnostics;
use crate::transforms::{FrameTransform, Quaternion};

// Inputs are defined next to the components that consume them
pub use crate::shaper::VelocityCommand;
pub use crate::stalk::{StalkCommand, StalkReference};
pub use crate::supervisor::InertialSample;

/// Raw per-wheel motor command from teleop/scripts
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RawWheelCommand {
    pub left: i16,
    pub right: i16,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    ImuStale,
}

/// Any payload with the wall-clock time (seconds since the epoch) it was sampled at
#[derive(Debug, Clone, Serialize)]
pub struct Stamped<T> {
    pub stamp: f64,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Stamped<T> {
    pub fn new(stamp: f64, data: T) -> Self {
        Self { stamp, data }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Odometry {
    pub frame_id: String,
    pub child_frame_id: String,
    pub pose: Pose,
    pub orientation: Quaternion,
    pub twist: VelocityEstimate,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transforms {
    pub transforms: Vec<FrameTransform>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Buttons {
    pub button1: bool,
    pub button2: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeIncrement {
    pub volume_inc: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Diagnostics {
    #[serde(flatten)]
    pub power: PowerDiagnostics,
    pub average_loop_freq: f64,
}

/// DC/DC request: mode 0 replaces the mask, 1 switches `mask` bits on,
/// 2 switches them off
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetDcdcRequest {
    pub mode: u8,
    pub mask: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedRequest {
    pub rgb_values: Vec<u8>,
}

/// Reply to every service call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            mask: None,
            error: None,
        }
    }

    pub fn with_mask(mask: u8) -> Self {
        Self {
            mask: Some(mask),
            ..Self::ok()
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            mask: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_wire_names() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::ImuStale).unwrap(),
            "\"imu_stale\""
        );
    }

    #[test]
    fn test_stamped_flattens_payload() {
        let msg = Stamped::new(
            12.5,
            Buttons {
                button1: true,
                button2: false,
            },
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["stamp"], 12.5);
        assert_eq!(value["button1"], true);
    }

    #[test]
    fn test_parse_inputs() {
        let cmd: VelocityCommand =
            serde_json::from_str(r#"{"linear":0.2,"angular":-0.1}"#).unwrap();
        assert_eq!(cmd, VelocityCommand::new(0.2, -0.1));

        let stalk: StalkCommand = serde_json::from_str(
            r#"{"head_up":true,"head_down":false,"tilt_up":false,"tilt_down":false}"#,
        )
        .unwrap();
        assert!(stalk.head_up);

        let imu: InertialSample =
            serde_json::from_str(r#"{"stamp":3.25,"angular_rate_z":0.5}"#).unwrap();
        assert_eq!(imu.angular_rate_z, 0.5);
    }

    #[test]
    fn test_failed_reply_omits_mask() {
        let value = serde_json::to_value(ServiceReply::failed("nope")).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("mask").is_none());
    }
}

// Coordinate frames for the base, the stalk and the head

use serde::Serialize;

use crate::config::FrameIds;
use crate::estimator::Pose;

/// Unit quaternion, (x, y, z, w) order
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub fn identity() -> Self {
        Self::from_rpy(0.0, 0.0, 0.0)
    }

    /// From fixed-axis roll, pitch, yaw in radians
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll / 2.0).sin_cos();
        let (sp, cp) = (pitch / 2.0).sin_cos();
        let (sy, cy) = (yaw / 2.0).sin_cos();

        Self {
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
            w: cr * cp * cy + sr * sp * sy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameTransform {
    pub parent: String,
    pub child: String,
    pub translation: [f64; 3],
    pub rotation: Quaternion,
}

/// odom -> base, base -> stalk, stalk -> head
pub fn robot_frames(
    frames: &FrameIds,
    pose: Pose,
    height_m: f64,
    tilt_rad: f64,
) -> [FrameTransform; 3] {
    [
        FrameTransform {
            parent: frames.odom.clone(),
            child: frames.base.clone(),
            translation: [pose.x, pose.y, 0.0],
            rotation: Quaternion::from_rpy(0.0, 0.0, pose.yaw),
        },
        FrameTransform {
            parent: frames.base.clone(),
            child: frames.stalk.clone(),
            translation: [0.0, 0.0, height_m],
            rotation: Quaternion::identity(),
        },
        FrameTransform {
            parent: frames.stalk.clone(),
            child: frames.head.clone(),
            translation: [0.0, 0.0, 0.0],
            rotation: Quaternion::from_rpy(0.0, tilt_rad, 0.0),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_identity() {
        let q = Quaternion::identity();
        assert_eq!((q.x, q.y, q.z, q.w), (0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_yaw_only() {
        let q = Quaternion::from_rpy(0.0, 0.0, FRAC_PI_2);
        assert_relative_eq!(q.z, (PI / 4.0).sin());
        assert_relative_eq!(q.w, (PI / 4.0).cos());
        assert_eq!(q.x, 0.0);
        assert_eq!(q.y, 0.0);
    }

    #[test]
    fn test_pitch_only() {
        let q = Quaternion::from_rpy(0.0, 0.2, 0.0);
        assert_relative_eq!(q.y, 0.1f64.sin());
        assert_relative_eq!(q.w, 0.1f64.cos());
    }

    #[test]
    fn test_robot_frames_chain() {
        let pose = Pose {
            x: 1.0,
            y: -2.0,
            yaw: 0.3,
        };
        let [base, stalk, head] = robot_frames(&FrameIds::default(), pose, 0.45, -0.1);

        assert_eq!(base.parent, "odom");
        assert_eq!(base.child, "base_link");
        assert_eq!(base.translation, [1.0, -2.0, 0.0]);
        assert_eq!(stalk.parent, base.child);
        assert_eq!(stalk.translation, [0.0, 0.0, 0.45]);
        assert_eq!(head.parent, stalk.child);
        assert_relative_eq!(head.rotation.y, (-0.05f64).sin());
    }
}

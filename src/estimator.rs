//! Dead-reckoning pose and velocity estimation.
//!
//! Integrates per-tick wheel travel into a planar pose. Heading comes either
//! from the wheel difference or, when an inertial source is configured, from
//! the yaw-rate samples accumulated between ticks.

use std::time::Instant;

use serde::Serialize;
use tracing::debug;

/// Ticks closer together than this (seconds) do not update the velocity estimate
pub const MIN_DT: f64 = 1e-4;

/// Planar pose in the odometry frame.
///
/// `yaw` is a running sum in radians and is never wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VelocityEstimate {
    /// m/s
    pub linear: f64,
    /// rad/s
    pub angular: f64,
}

/// Yaw accumulated from inertial samples between two ticks.
///
/// The first sample only seeds the reference timestamp.
#[derive(Debug, Clone, Default)]
pub struct YawIntegrator {
    accumulated: f64,
    last_stamp: Option<f64>,
    latest_rate: f64,
}

impl YawIntegrator {
    pub fn is_bootstrapped(&self) -> bool {
        self.last_stamp.is_some()
    }

    /// Latest accepted yaw rate in rad/s, zero after a rejected sample
    pub fn latest_rate(&self) -> f64 {
        self.latest_rate
    }

    /// Pending yaw increment not yet consumed by a tick
    pub fn pending(&self) -> f64 {
        self.accumulated
    }

    /// Reset the reference timestamp without contributing yaw
    pub fn seed(&mut self, stamp: f64) {
        self.last_stamp = Some(stamp);
    }

    /// Accumulate `rate` over the time since the previous sample.
    ///
    /// Returns false (and only re-seeds) when there is no earlier sample or
    /// the stamps do not advance.
    pub fn integrate(&mut self, stamp: f64, rate: f64) -> bool {
        let Some(previous) = self.last_stamp.replace(stamp) else {
            return false;
        };
        let duration = stamp - previous;
        if duration <= 0.0 {
            debug!("Inertial stamp did not advance ({:.6}s), re-seeding", duration);
            return false;
        }
        self.latest_rate = rate;
        self.accumulated += rate * duration;
        true
    }

    /// Record a sample judged to be noise: advances the reference, zero rate
    pub fn reject(&mut self, stamp: f64) {
        self.last_stamp = Some(stamp);
        self.latest_rate = 0.0;
    }

    pub fn silence(&mut self) {
        self.latest_rate = 0.0;
    }

    /// Hand the pending increment to the caller and start over from zero
    pub fn take_increment(&mut self) -> f64 {
        std::mem::take(&mut self.accumulated)
    }
}

pub struct MotionEstimator {
    wheel_separation: f64,
    using_imu: bool,
    pose: Pose,
    velocity: VelocityEstimate,
    inertial: YawIntegrator,
    last_tick: Option<Instant>,
}

impl MotionEstimator {
    pub fn new(wheel_separation: f64, using_imu: bool) -> Self {
        Self {
            wheel_separation,
            using_imu,
            pose: Pose::default(),
            velocity: VelocityEstimate::default(),
            inertial: YawIntegrator::default(),
            last_tick: None,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn velocity(&self) -> VelocityEstimate {
        self.velocity
    }

    pub fn using_imu(&self) -> bool {
        self.using_imu
    }

    pub fn inertial(&self) -> &YawIntegrator {
        &self.inertial
    }

    pub fn inertial_mut(&mut self) -> &mut YawIntegrator {
        &mut self.inertial
    }

    /// Publish an accepted inertial yaw rate right away, ahead of the next tick
    pub fn observe_angular(&mut self, rate: f64) {
        self.velocity.angular = rate;
    }

    /// Drop the angular estimate, e.g. while the inertial feed is stale
    pub fn suppress_angular(&mut self) {
        self.velocity.angular = 0.0;
        self.inertial.silence();
    }

    /// Integrate one tick of wheel travel (meters since the previous tick).
    ///
    /// The first call only records the tick time. Returns whether the pose
    /// was integrated.
    pub fn update(&mut self, left: f64, right: f64, now: Instant) -> bool {
        let Some(last) = self.last_tick.replace(now) else {
            debug!("First odometry tick, no time reference yet");
            return false;
        };
        let dt = now.saturating_duration_since(last).as_secs_f64();

        let distance = (left + right) / 2.0;
        let yaw_increment = if self.using_imu {
            self.inertial.take_increment()
        } else {
            (right - left) / self.wheel_separation
        };

        if dt >= MIN_DT {
            self.velocity.linear = distance / dt;
            self.velocity.angular = if self.using_imu {
                self.inertial.latest_rate()
            } else {
                yaw_increment / dt
            };
        } else {
            debug!("Tick period {:.6}s below floor, holding velocity", dt);
        }

        // midpoint heading
        let heading = self.pose.yaw + yaw_increment / 2.0;
        self.pose.x += distance * heading.cos();
        self.pose.y += distance * heading.sin();
        self.pose.yaw += yaw_increment;
        true
    }
}

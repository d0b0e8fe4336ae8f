// Safety watchdogs: stale inertial data and lost command links
//
// Either feed going quiet for longer than its budget makes the driver stop
// the base. Nothing here is fatal: the loop keeps running and the watchdogs
// clear themselves once fresh data arrives.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CMD_TIMEOUT, IMU_TIMEOUT};
use crate::estimator::MotionEstimator;

/// Yaw rates below this magnitude (rad/s) are treated as sensor noise
pub const YAW_RATE_NOISE_FLOOR: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessBudgets {
    pub inertial_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for StalenessBudgets {
    fn default() -> Self {
        Self {
            inertial_timeout: IMU_TIMEOUT,
            command_timeout: CMD_TIMEOUT,
        }
    }
}

/// Yaw-rate sample from the inertial sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InertialSample {
    /// Sensor timestamp in seconds
    pub stamp: f64,
    /// Angular rate about the vertical axis in rad/s
    pub angular_rate_z: f64,
}

/// What happened to an inertial sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Only (re)seeded the reference timestamp
    Seeded,
    /// Treated as zero rate (robot stopped or below the noise floor)
    Rejected,
    /// Contributed yaw
    Integrated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogVerdict {
    pub inertial_stale: bool,
    pub command_stale: bool,
}

impl WatchdogVerdict {
    pub fn force_stop(&self) -> bool {
        self.inertial_stale || self.command_stale
    }
}

pub struct SafetySupervisor {
    budgets: StalenessBudgets,
    using_imu: bool,
    last_inertial: Instant,
    last_command: Instant,
    inertial_fault: bool,
    command_stale: bool,
}

impl SafetySupervisor {
    /// Both feeds count as fresh at `now`
    pub fn new(budgets: StalenessBudgets, using_imu: bool, now: Instant) -> Self {
        Self {
            budgets,
            using_imu,
            last_inertial: now,
            last_command: now,
            inertial_fault: false,
            command_stale: false,
        }
    }

    pub fn inertial_fault(&self) -> bool {
        self.inertial_fault
    }

    pub fn command_stale(&self) -> bool {
        self.command_stale
    }

    pub fn note_command(&mut self, now: Instant) {
        self.last_command = now;
    }

    /// Fold an inertial sample into the estimator's yaw accumulator
    pub fn on_inertial_sample(
        &mut self,
        estimator: &mut MotionEstimator,
        sample: InertialSample,
        robot_stopped: bool,
        now: Instant,
    ) -> SampleOutcome {
        self.last_inertial = now;

        let integrator = estimator.inertial_mut();
        if !integrator.is_bootstrapped() {
            info!("First inertial sample at {:.3}s", sample.stamp);
            integrator.seed(sample.stamp);
            return SampleOutcome::Seeded;
        }
        if self.inertial_fault {
            // the gap spans the outage, start over from this sample
            integrator.seed(sample.stamp);
            return SampleOutcome::Seeded;
        }

        if robot_stopped || sample.angular_rate_z.abs() < YAW_RATE_NOISE_FLOOR {
            integrator.reject(sample.stamp);
            estimator.suppress_angular();
            return SampleOutcome::Rejected;
        }

        if integrator.integrate(sample.stamp, sample.angular_rate_z) {
            estimator.observe_angular(sample.angular_rate_z);
            SampleOutcome::Integrated
        } else {
            SampleOutcome::Seeded
        }
    }

    /// Check both feeds against their budgets.
    ///
    /// Runs once per tick; transitions are logged once, not every tick.
    pub fn evaluate(&mut self, now: Instant) -> WatchdogVerdict {
        let mut verdict = WatchdogVerdict::default();

        if self.using_imu {
            let age = now.saturating_duration_since(self.last_inertial);
            let stale = age >= self.budgets.inertial_timeout;
            if stale && !self.inertial_fault {
                warn!("Inertial feed stale ({:?} old), stopping robot", age);
            } else if !stale && self.inertial_fault {
                info!("Inertial feed recovered");
            }
            self.inertial_fault = stale;
            verdict.inertial_stale = stale;
        }

        let age = now.saturating_duration_since(self.last_command);
        let stale = age >= self.budgets.command_timeout;
        if stale && !self.command_stale {
            warn!("Command stale ({:?} old), stopping robot", age);
        } else if !stale && self.command_stale {
            debug!("Commands resumed");
        }
        self.command_stale = stale;
        verdict.command_stale = stale;

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sample(stamp: f64, rate: f64) -> InertialSample {
        InertialSample {
            stamp,
            angular_rate_z: rate,
        }
    }

    fn setup() -> (SafetySupervisor, MotionEstimator, Instant) {
        let t0 = Instant::now();
        (
            SafetySupervisor::new(StalenessBudgets::default(), true, t0),
            MotionEstimator::new(0.46, true),
            t0,
        )
    }

    #[test]
    fn test_first_sample_only_seeds() {
        let (mut supervisor, mut estimator, t0) = setup();
        let outcome = supervisor.on_inertial_sample(&mut estimator, sample(5.0, 1.0), false, t0);
        assert_eq!(outcome, SampleOutcome::Seeded);
        assert_eq!(estimator.inertial().pending(), 0.0);
        assert!(estimator.inertial().is_bootstrapped());
    }

    #[test]
    fn test_accepted_sample_accumulates() {
        let (mut supervisor, mut estimator, t0) = setup();
        supervisor.on_inertial_sample(&mut estimator, sample(5.0, 1.0), false, t0);
        let outcome =
            supervisor.on_inertial_sample(&mut estimator, sample(5.02, 1.0), false, t0 + ms(20));
        assert_eq!(outcome, SampleOutcome::Integrated);
        assert_relative_eq!(estimator.inertial().pending(), 0.02, epsilon = 1e-9);
        assert_eq!(estimator.velocity().angular, 1.0);
    }

    #[test]
    fn test_noise_floor_rejects() {
        let (mut supervisor, mut estimator, t0) = setup();
        supervisor.on_inertial_sample(&mut estimator, sample(5.0, 0.0), false, t0);
        let outcome =
            supervisor.on_inertial_sample(&mut estimator, sample(5.02, 0.039), false, t0 + ms(20));
        assert_eq!(outcome, SampleOutcome::Rejected);
        assert_eq!(estimator.inertial().pending(), 0.0);
        assert_eq!(estimator.velocity().angular, 0.0);
    }

    #[test]
    fn test_stopped_robot_rejects() {
        let (mut supervisor, mut estimator, t0) = setup();
        supervisor.on_inertial_sample(&mut estimator, sample(5.0, 0.0), false, t0);
        let outcome =
            supervisor.on_inertial_sample(&mut estimator, sample(5.02, 0.8), true, t0 + ms(20));
        assert_eq!(outcome, SampleOutcome::Rejected);
        assert_eq!(estimator.inertial().pending(), 0.0);
    }

    #[test]
    fn test_inertial_watchdog_threshold_is_inclusive() {
        let (mut supervisor, _, t0) = setup();
        supervisor.note_command(t0 + ms(200));
        assert!(!supervisor.evaluate(t0 + ms(249)).inertial_stale);
        let verdict = supervisor.evaluate(t0 + ms(250));
        assert!(verdict.inertial_stale);
        assert!(verdict.force_stop());
        assert!(supervisor.inertial_fault());
    }

    #[test]
    fn test_fault_suppresses_accumulation_until_recovered() {
        let (mut supervisor, mut estimator, t0) = setup();
        supervisor.on_inertial_sample(&mut estimator, sample(1.0, 0.5), false, t0);
        assert!(supervisor.evaluate(t0 + ms(300)).inertial_stale);

        // fresh sample while faulted only re-seeds
        let outcome =
            supervisor.on_inertial_sample(&mut estimator, sample(1.3, 0.5), false, t0 + ms(310));
        assert_eq!(outcome, SampleOutcome::Seeded);
        assert_eq!(estimator.inertial().pending(), 0.0);

        assert!(!supervisor.evaluate(t0 + ms(320)).inertial_stale);
        let outcome =
            supervisor.on_inertial_sample(&mut estimator, sample(1.32, 0.5), false, t0 + ms(330));
        assert_eq!(outcome, SampleOutcome::Integrated);
        assert_relative_eq!(estimator.inertial().pending(), 0.01, epsilon = 1e-9);
    }

    #[test]
    fn test_command_watchdog_independent_of_inertial() {
        let (mut supervisor, mut estimator, t0) = setup();
        for i in 0..=6 {
            let now = t0 + ms(100 * i);
            supervisor.on_inertial_sample(&mut estimator, sample(i as f64 * 0.1, 0.5), false, now);
        }
        assert!(!supervisor.evaluate(t0 + ms(499)).command_stale);
        let verdict = supervisor.evaluate(t0 + ms(600));
        assert!(!verdict.inertial_stale);
        assert!(verdict.command_stale);
        assert!(verdict.force_stop());

        supervisor.note_command(t0 + ms(610));
        assert!(!supervisor.evaluate(t0 + ms(620)).force_stop());
    }

    #[test]
    fn test_without_imu_inertial_never_stale() {
        let t0 = Instant::now();
        let mut supervisor = SafetySupervisor::new(StalenessBudgets::default(), false, t0);
        supervisor.note_command(t0 + ms(900));
        let verdict = supervisor.evaluate(t0 + ms(1000));
        assert_eq!(verdict, WatchdogVerdict::default());
    }
}

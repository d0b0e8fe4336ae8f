// Driver core: estimator, command shaping, stalk sequencing and watchdogs
// composed around one robot backend.
//
// Every event handler and every tick takes `&mut self`, so the caller decides
// the interleaving and the robot only ever sees one caller at a time.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{FrameIds, RuntimeConfig};
use crate::error::DriverError;
use crate::estimator::{MotionEstimator, Pose, VelocityEstimate};
use crate::messages::{RawWheelCommand, RuntimeHealth, SetDcdcRequest};
use crate::peripherals::{PeripheralMonitor, PeripheralReport};
use crate::robot::Robot;
use crate::shaper::{CalibrationStrategy, CommandShaper, VelocityCommand};
use crate::stalk::{StalkCommand, StalkController, StalkPosition, StalkReference, StalkSetpoint};
use crate::supervisor::{
    InertialSample, SafetySupervisor, SampleOutcome, StalenessBudgets, WatchdogVerdict,
};

/// Result of one loop tick, ready to publish
#[derive(Debug, Clone)]
pub struct TickReport {
    pub pose: Pose,
    pub velocity: VelocityEstimate,
    pub stalk: StalkPosition,
    pub verdict: WatchdogVerdict,
    pub health: RuntimeHealth,
    pub peripherals: PeripheralReport,
}

pub struct Driver<R: Robot> {
    robot: R,
    estimator: MotionEstimator,
    shaper: CommandShaper,
    stalk: StalkController,
    supervisor: SafetySupervisor,
    peripherals: PeripheralMonitor,
    frames: FrameIds,
    number_of_leds: usize,
}

impl<R: Robot> Driver<R> {
    /// Wrap an initialized backend; both watchdogs start fresh at `now`
    pub fn new(mut robot: R, config: &RuntimeConfig, now: Instant) -> Self {
        if let Err(e) = robot.set_height_velocity(config.height_velocity) {
            warn!("Failed to set height velocity: {}", e);
        }
        if let Err(e) = robot.set_tilt_velocity(config.tilt_velocity) {
            warn!("Failed to set tilt velocity: {}", e);
        }

        let strategy = if config.use_calibrated_velocity {
            CalibrationStrategy::Calibrated
        } else {
            CalibrationStrategy::Raw
        };

        Self {
            robot,
            estimator: MotionEstimator::new(config.wheel_separation, config.using_imu),
            shaper: CommandShaper::new(config.dead_zone, strategy),
            stalk: StalkController::new(),
            supervisor: SafetySupervisor::new(StalenessBudgets::default(), config.using_imu, now),
            peripherals: PeripheralMonitor::new(config),
            frames: config.frames.clone(),
            number_of_leds: config.number_of_leds,
        }
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    pub fn estimator(&self) -> &MotionEstimator {
        &self.estimator
    }

    pub fn stalk(&self) -> &StalkController {
        &self.stalk
    }

    pub fn supervisor(&self) -> &SafetySupervisor {
        &self.supervisor
    }

    pub fn frames(&self) -> &FrameIds {
        &self.frames
    }

    fn stop(&mut self) {
        if let Err(e) = self.robot.set_velocity(0.0, 0.0) {
            warn!("Failed to stop robot: {}", e);
        }
    }

    /// Process incoming velocity command
    pub fn on_velocity_command(&mut self, cmd: VelocityCommand, now: Instant) {
        debug!("Received command: {:?}", &cmd);
        self.supervisor.note_command(now);
        if self.supervisor.inertial_fault() {
            // no heading reference, do not move
            debug!("Inertial fault active, command dropped");
            return;
        }

        let shaped = self.shaper.shape(cmd, self.estimator.velocity());
        let result = match self.shaper.strategy() {
            CalibrationStrategy::Raw => self.robot.set_velocity(shaped.linear, shaped.angular),
            CalibrationStrategy::Calibrated => self
                .robot
                .set_velocity_calibrated(shaped.linear, shaped.angular),
        };
        if let Err(e) = result {
            warn!("Failed to send velocity command: {}", e);
        }
    }

    /// Forward a raw wheel command as is.
    ///
    /// Raw commands do not feed the command watchdog, so a raw-only stream
    /// still gets the base stopped once velocity commands go quiet.
    pub fn on_raw_command(&mut self, cmd: RawWheelCommand) {
        debug!("Received raw command: {:?}", &cmd);
        if let Err(e) = self.robot.set_velocity_raw(cmd.left, cmd.right) {
            warn!("Failed to send raw wheel command: {}", e);
        }
    }

    /// Process an inertial sample; `None` when no inertial source is configured
    pub fn on_inertial_sample(
        &mut self,
        sample: InertialSample,
        now: Instant,
    ) -> Option<SampleOutcome> {
        if !self.estimator.using_imu() {
            return None;
        }
        let stopped = self.robot.is_stopped();
        Some(
            self.supervisor
                .on_inertial_sample(&mut self.estimator, sample, stopped, now),
        )
    }

    pub fn on_stalk_command(&mut self, cmd: StalkCommand) {
        self.stalk.command(&mut self.robot, cmd);
    }

    pub fn on_stalk_reference(
        &mut self,
        reference: StalkReference,
    ) -> Result<StalkSetpoint, DriverError> {
        self.stalk.apply_reference(&mut self.robot, reference)
    }

    pub fn dcdc_mask(&mut self) -> Result<u8, DriverError> {
        Ok(self.robot.dcdc_mask()?)
    }

    /// Apply a DC/DC request and return the mask now in effect
    pub fn set_dcdc(&mut self, request: SetDcdcRequest) -> Result<u8, DriverError> {
        let mask = match request.mode {
            0 => request.mask,
            1 => self.robot.dcdc_mask()? | request.mask,
            2 => self.robot.dcdc_mask()? & !request.mask,
            mode => return Err(DriverError::InvalidDcdcMode(mode)),
        };
        self.robot.enable_dcdc(mask)?;
        Ok(mask)
    }

    pub fn set_leds(&mut self, rgb: &[u8]) -> Result<(), DriverError> {
        let expected = self.number_of_leds * 3;
        if rgb.len() != expected {
            return Err(DriverError::InvalidLedPayload {
                expected,
                got: rgb.len(),
            });
        }
        self.robot.set_leds(rgb)?;
        Ok(())
    }

    /// One pass of the driving loop
    pub fn tick(&mut self, now: Instant) -> TickReport {
        self.peripherals.record_tick(now);

        // 1. Watchdogs
        let verdict = self.supervisor.evaluate(now);
        if verdict.inertial_stale {
            self.estimator.suppress_angular();
        }
        if verdict.force_stop() {
            self.stop();
        }

        // 2. Odometry
        match self.robot.incremental_distance() {
            Ok((left, right)) => {
                self.estimator.update(left, right, now);
            }
            Err(e) => warn!("Odometry read failed, skipping tick: {}", e),
        }

        // 3. Stalk position
        let stalk = self.stalk.refresh(&mut self.robot);

        // 4. Everything else the boards report
        let peripherals = self.peripherals.poll(&mut self.robot);

        let health = if verdict.inertial_stale {
            RuntimeHealth::ImuStale
        } else if verdict.command_stale {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        };

        TickReport {
            pose: self.estimator.pose(),
            velocity: self.estimator.velocity(),
            stalk,
            verdict,
            health,
            peripherals,
        }
    }
}

impl<R: Robot> Drop for Driver<R> {
    fn drop(&mut self) {
        info!("Driver shutting down, stopping robot");
        self.stop();
    }
}

// Stalk sequencing: height and tilt axes
//
// Joystick-style commands drive each axis through a three-state machine:
// a held button sends the axis to its travel limit once, and releasing it
// freezes the axis at whatever position it reached. Absolute references
// bypass the machine and go straight to the motors.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DriverError;
use crate::robot::{self, Robot, StalkLimits};

/// Radians to degrees, as the stalk firmware expects it
pub const RAD_TO_DEG: f64 = 57.2958;
pub const DEG_TO_RAD: f64 = 0.0174533;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisState {
    MovingToMax,
    MovingToMin,
    #[default]
    Holding,
}

/// Button state from the operator joystick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalkCommand {
    pub head_up: bool,
    pub head_down: bool,
    pub tilt_up: bool,
    pub tilt_down: bool,
}

/// Absolute stalk target
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StalkReference {
    pub height_m: f64,
    pub tilt_rad: f64,
}

/// Integer setpoints as sent to the motors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalkSetpoint {
    pub height_mm: i32,
    pub tilt_deg: i32,
}

impl StalkSetpoint {
    pub fn from_reference(reference: StalkReference) -> Self {
        Self {
            height_mm: (reference.height_m * 1000.0).round() as i32,
            tilt_deg: (reference.tilt_rad * RAD_TO_DEG).round() as i32,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Height,
    Tilt,
}

impl Axis {
    fn name(self) -> &'static str {
        match self {
            Axis::Height => "height",
            Axis::Tilt => "tilt",
        }
    }

    fn bounds(self, limits: &StalkLimits) -> (i32, i32) {
        match self {
            Axis::Height => (limits.min_height_mm, limits.max_height_mm),
            Axis::Tilt => (limits.min_tilt_deg, limits.max_tilt_deg),
        }
    }

    fn read<R: Robot>(self, robot: &mut R) -> robot::Result<i32> {
        match self {
            Axis::Height => robot.height(),
            Axis::Tilt => robot.tilt(),
        }
    }

    fn write<R: Robot>(self, robot: &mut R, value: i32) -> robot::Result<()> {
        match self {
            Axis::Height => robot.set_height(value),
            Axis::Tilt => robot.set_tilt(value),
        }
    }
}

/// Last known stalk position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StalkPosition {
    pub height_m: f64,
    pub tilt_rad: f64,
}

#[derive(Debug, Default)]
pub struct StalkController {
    height: AxisState,
    tilt: AxisState,
    position: StalkPosition,
}

impl StalkController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height_state(&self) -> AxisState {
        self.height
    }

    pub fn tilt_state(&self) -> AxisState {
        self.tilt
    }

    pub fn position(&self) -> StalkPosition {
        self.position
    }

    /// Poll both axis positions; an axis whose read fails keeps its last value
    pub fn refresh<R: Robot>(&mut self, robot: &mut R) -> StalkPosition {
        match robot.height() {
            Ok(mm) => self.position.height_m = mm as f64 * 0.001,
            Err(e) => debug!("Height read failed: {}", e),
        }
        match robot.tilt() {
            Ok(deg) => self.position.tilt_rad = deg as f64 * DEG_TO_RAD,
            Err(e) => debug!("Tilt read failed: {}", e),
        }
        self.position
    }

    /// Advance both axes from one joystick sample
    pub fn command<R: Robot>(&mut self, robot: &mut R, command: StalkCommand) {
        let limits = robot.stalk_limits();
        step_axis(
            robot,
            Axis::Height,
            &mut self.height,
            command.head_up,
            command.head_down,
            &limits,
        );
        step_axis(
            robot,
            Axis::Tilt,
            &mut self.tilt,
            command.tilt_up,
            command.tilt_down,
            &limits,
        );
    }

    /// Send an absolute reference to both axes.
    ///
    /// Out-of-range references are rejected before anything is sent. The
    /// axis states are left untouched.
    pub fn apply_reference<R: Robot>(
        &self,
        robot: &mut R,
        reference: StalkReference,
    ) -> Result<StalkSetpoint, DriverError> {
        let limits = robot.stalk_limits();
        let setpoint = StalkSetpoint::from_reference(reference);

        check_reference(
            Axis::Height,
            reference.height_m * 1000.0,
            setpoint.height_mm,
            &limits,
        )?;
        check_reference(
            Axis::Tilt,
            reference.tilt_rad * RAD_TO_DEG,
            setpoint.tilt_deg,
            &limits,
        )?;

        debug!(
            "Stalk reference: height={}mm tilt={}deg",
            setpoint.height_mm, setpoint.tilt_deg
        );
        robot.set_height(setpoint.height_mm)?;
        robot.set_tilt(setpoint.tilt_deg)?;
        Ok(setpoint)
    }
}

fn check_reference(
    axis: Axis,
    requested: f64,
    rounded: i32,
    limits: &StalkLimits,
) -> Result<(), DriverError> {
    let (min, max) = axis.bounds(limits);
    if requested.is_finite() && (min..=max).contains(&rounded) {
        Ok(())
    } else {
        Err(DriverError::InvalidActuatorReference {
            what: axis.name(),
            value: requested,
            min: min as f64,
            max: max as f64,
        })
    }
}

fn step_axis<R: Robot>(
    robot: &mut R,
    axis: Axis,
    state: &mut AxisState,
    up: bool,
    down: bool,
    limits: &StalkLimits,
) {
    let (min, max) = axis.bounds(limits);

    // a held button keeps its axis moving; only a release leads to a hold
    if up {
        if *state != AxisState::MovingToMax {
            if let Err(e) = axis.write(robot, max) {
                warn!("Failed to send {} to maximum: {}", axis.name(), e);
            }
            *state = AxisState::MovingToMax;
        }
    } else if down {
        if *state != AxisState::MovingToMin {
            if let Err(e) = axis.write(robot, min) {
                warn!("Failed to send {} to minimum: {}", axis.name(), e);
            }
            *state = AxisState::MovingToMin;
        }
    } else if *state != AxisState::Holding {
        // hold where it is; retried on the next sample if either call fails
        let held = axis
            .read(robot)
            .and_then(|position| axis.write(robot, position));
        match held {
            Ok(()) => *state = AxisState::Holding,
            Err(e) => debug!("{} hold not confirmed yet: {}", axis.name(), e),
        }
    }
}

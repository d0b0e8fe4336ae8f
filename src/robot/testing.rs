// Scripted robot that records every capability call

use std::collections::VecDeque;

use super::{BatteryStatus, PowerDiagnostics, Result, Robot, RobotError, Temperatures};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetVelocity(f64, f64),
    SetVelocityCalibrated(f64, f64),
    SetVelocityRaw(i16, i16),
    GetHeight,
    SetHeight(i32),
    GetTilt,
    SetTilt(i32),
    SetHeightVelocity(u8),
    SetTiltVelocity(u8),
    EnableDcdc(u8),
    SetLeds(usize),
}

#[derive(Default)]
pub struct RecordingRobot {
    pub calls: Vec<Call>,
    pub increments: VecDeque<(f64, f64)>,
    pub stopped: bool,
    pub height_mm: i32,
    pub tilt_deg: i32,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub buttons: (bool, bool),
    pub rotary: i32,
    pub dcdc: u8,
}

impl RecordingRobot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls issued so far, draining the record
    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    pub fn last_velocity(&self) -> Option<Call> {
        self.calls
            .iter()
            .rev()
            .find(|c| {
                matches!(
                    c,
                    Call::SetVelocity(..)
                        | Call::SetVelocityCalibrated(..)
                        | Call::SetVelocityRaw(..)
                )
            })
            .cloned()
    }

    fn read<T>(&self, value: T) -> Result<T> {
        if self.fail_reads {
            Err(RobotError::Timeout { board: 1 })
        } else {
            Ok(value)
        }
    }

    fn write(&mut self, call: Call) -> Result<()> {
        self.calls.push(call);
        if self.fail_writes {
            Err(RobotError::Timeout { board: 1 })
        } else {
            Ok(())
        }
    }
}

impl Robot for RecordingRobot {
    fn incremental_distance(&mut self) -> Result<(f64, f64)> {
        let step = self.increments.pop_front().unwrap_or((0.0, 0.0));
        self.read(step)
    }

    fn is_stopped(&mut self) -> bool {
        self.stopped
    }

    fn set_velocity(&mut self, linear: f64, angular: f64) -> Result<()> {
        self.write(Call::SetVelocity(linear, angular))
    }

    fn set_velocity_calibrated(&mut self, linear: f64, angular: f64) -> Result<()> {
        self.write(Call::SetVelocityCalibrated(linear, angular))
    }

    fn set_velocity_raw(&mut self, left: i16, right: i16) -> Result<()> {
        self.write(Call::SetVelocityRaw(left, right))
    }

    fn height(&mut self) -> Result<i32> {
        self.calls.push(Call::GetHeight);
        self.read(self.height_mm)
    }

    fn set_height(&mut self, millimeters: i32) -> Result<()> {
        self.write(Call::SetHeight(millimeters))
    }

    fn tilt(&mut self) -> Result<i32> {
        self.calls.push(Call::GetTilt);
        self.read(self.tilt_deg)
    }

    fn set_tilt(&mut self, degrees: i32) -> Result<()> {
        self.write(Call::SetTilt(degrees))
    }

    fn set_height_velocity(&mut self, mm_per_sec: u8) -> Result<()> {
        self.write(Call::SetHeightVelocity(mm_per_sec))
    }

    fn set_tilt_velocity(&mut self, deg_per_sec: u8) -> Result<()> {
        self.write(Call::SetTiltVelocity(deg_per_sec))
    }

    fn battery_status(&mut self) -> Result<BatteryStatus> {
        self.read(BatteryStatus::default())
    }

    fn temperatures(&mut self) -> Result<Temperatures> {
        self.read(Temperatures::default())
    }

    fn buttons(&mut self) -> Result<(bool, bool)> {
        self.read(self.buttons)
    }

    fn rotary_encoder(&mut self) -> Result<i32> {
        self.read(self.rotary)
    }

    fn power_diagnostics(&mut self) -> Result<PowerDiagnostics> {
        self.read(PowerDiagnostics::default())
    }

    fn dcdc_mask(&mut self) -> Result<u8> {
        self.read(self.dcdc)
    }

    fn enable_dcdc(&mut self, mask: u8) -> Result<()> {
        self.write(Call::EnableDcdc(mask))?;
        self.dcdc = mask;
        Ok(())
    }

    fn set_leds(&mut self, rgb: &[u8]) -> Result<()> {
        self.write(Call::SetLeds(rgb.len()))
    }
}

// Simulated backend: an ideal differential-drive base with a stalk
//
// Wheel travel is integrated from the last velocity command over the wall
// time between odometry reads. The stalk axes move toward their setpoints
// at the configured axis speeds.

use std::time::Instant;
use tracing::debug;

use super::kinematics::{NOMINAL_RAW_PER_MPS, body_to_wheel};
use super::{BatteryStatus, PowerDiagnostics, Result, Robot, Temperatures};

pub struct SimulatedRobot {
    wheel_separation: f64,
    wheel_speeds: (f64, f64),
    last_odometry: Instant,
    stalk_updated: Instant,
    height_mm: f64,
    height_target_mm: f64,
    height_velocity: f64,
    tilt_deg: f64,
    tilt_target_deg: f64,
    tilt_velocity: f64,
    dcdc_mask: u8,
}

impl SimulatedRobot {
    pub fn new(wheel_separation: f64) -> Self {
        let now = Instant::now();
        Self {
            wheel_separation,
            wheel_speeds: (0.0, 0.0),
            last_odometry: now,
            stalk_updated: now,
            height_mm: 0.0,
            height_target_mm: 0.0,
            height_velocity: 20.0,
            tilt_deg: 0.0,
            tilt_target_deg: 0.0,
            tilt_velocity: 2.0,
            dcdc_mask: 0xFF,
        }
    }

    /// Advance both stalk axes toward their targets
    fn advance_stalk(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.stalk_updated).as_secs_f64();
        self.stalk_updated = now;

        self.height_mm = approach(self.height_mm, self.height_target_mm, self.height_velocity * dt);
        self.tilt_deg = approach(self.tilt_deg, self.tilt_target_deg, self.tilt_velocity * dt);
    }
}

fn approach(current: f64, target: f64, max_step: f64) -> f64 {
    let error = target - current;
    if error.abs() <= max_step {
        target
    } else {
        current + max_step.copysign(error)
    }
}

impl Robot for SimulatedRobot {
    fn incremental_distance(&mut self) -> Result<(f64, f64)> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_odometry).as_secs_f64();
        self.last_odometry = now;
        let (left, right) = self.wheel_speeds;
        Ok((left * dt, right * dt))
    }

    fn is_stopped(&mut self) -> bool {
        self.wheel_speeds == (0.0, 0.0)
    }

    fn set_velocity(&mut self, linear: f64, angular: f64) -> Result<()> {
        let speeds = body_to_wheel(linear, angular, self.wheel_separation);
        debug!("Simulated wheels: left={:.3} right={:.3}", speeds.left, speeds.right);
        self.wheel_speeds = (speeds.left, speeds.right);
        Ok(())
    }

    fn set_velocity_calibrated(&mut self, linear: f64, angular: f64) -> Result<()> {
        self.set_velocity(linear, angular)
    }

    fn set_velocity_raw(&mut self, left: i16, right: i16) -> Result<()> {
        self.wheel_speeds = (
            left as f64 / NOMINAL_RAW_PER_MPS,
            right as f64 / NOMINAL_RAW_PER_MPS,
        );
        Ok(())
    }

    fn height(&mut self) -> Result<i32> {
        self.advance_stalk();
        Ok(self.height_mm.round() as i32)
    }

    fn set_height(&mut self, millimeters: i32) -> Result<()> {
        self.advance_stalk();
        let limits = self.stalk_limits();
        self.height_target_mm =
            millimeters.clamp(limits.min_height_mm, limits.max_height_mm) as f64;
        Ok(())
    }

    fn tilt(&mut self) -> Result<i32> {
        self.advance_stalk();
        Ok(self.tilt_deg.round() as i32)
    }

    fn set_tilt(&mut self, degrees: i32) -> Result<()> {
        self.advance_stalk();
        let limits = self.stalk_limits();
        self.tilt_target_deg = degrees.clamp(limits.min_tilt_deg, limits.max_tilt_deg) as f64;
        Ok(())
    }

    fn set_height_velocity(&mut self, mm_per_sec: u8) -> Result<()> {
        self.height_velocity = mm_per_sec as f64;
        Ok(())
    }

    fn set_tilt_velocity(&mut self, deg_per_sec: u8) -> Result<()> {
        self.tilt_velocity = deg_per_sec as f64;
        Ok(())
    }

    fn battery_status(&mut self) -> Result<BatteryStatus> {
        Ok(BatteryStatus {
            elec_level: 100,
            pc1_level: 100,
            motor_h_level: 100,
            motor_l_level: 100,
            charger_status: 0,
        })
    }

    fn temperatures(&mut self) -> Result<Temperatures> {
        Ok(Temperatures {
            left_motor: 25,
            right_motor: 25,
            left_driver: 25,
            right_driver: 25,
            ..Temperatures::default()
        })
    }

    fn buttons(&mut self) -> Result<(bool, bool)> {
        Ok((false, false))
    }

    fn rotary_encoder(&mut self) -> Result<i32> {
        Ok(0)
    }

    fn power_diagnostics(&mut self) -> Result<PowerDiagnostics> {
        Ok(PowerDiagnostics {
            elec_bat_voltage: 24.0,
            pc1_bat_voltage: 24.0,
            cable_bat_voltage: 0.0,
            motor_voltage: 24.0,
            motor_h_voltage: 24.0,
            motor_l_voltage: 24.0,
            ..PowerDiagnostics::default()
        })
    }

    fn dcdc_mask(&mut self) -> Result<u8> {
        Ok(self.dcdc_mask)
    }

    fn enable_dcdc(&mut self, mask: u8) -> Result<()> {
        self.dcdc_mask = mask;
        Ok(())
    }

    fn set_leds(&mut self, rgb: &[u8]) -> Result<()> {
        debug!("Simulated LEDs: {} bytes", rgb.len());
        Ok(())
    }
}

// Serial backend for the two controller boards
//
// Packet format: [0xFF, 0xFF, Address, Length, Instruction, Params..., Checksum]
// Replies carry a status byte in place of the instruction.
//
// The motion board drives the wheels and the stalk and reports odometry,
// temperatures and the operator controls. The power board reports the
// batteries and owns the DC/DC outputs and the LED strip.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::kinematics::{Calibration, WheelCommand, body_to_wheel};
use super::{BatteryStatus, PowerDiagnostics, Result, Robot, RobotError, Temperatures};
use crate::config::RuntimeConfig;

pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

/// Board addresses on their respective links
pub const MOTION_BOARD: u8 = 1;
pub const POWER_BOARD: u8 = 2;

/// Encoder ticks per meter of wheel travel
pub const TICKS_PER_METER: f64 = 40_000.0;

const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set shared by both boards
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    // motion board
    SetWheelVelocity = 0x10,
    ReadIncrements = 0x11,
    ReadMotionStatus = 0x12,
    SetHeight = 0x20,
    ReadHeight = 0x21,
    SetTilt = 0x22,
    ReadTilt = 0x23,
    SetHeightVelocity = 0x24,
    SetTiltVelocity = 0x25,
    ReadTemperatures = 0x30,
    ReadButtons = 0x31,
    ReadRotaryEncoder = 0x32,
    // power board
    ReadBatteries = 0x40,
    ReadDiagnostics = 0x41,
    ReadDcdc = 0x42,
    SetDcdc = 0x43,
    SetLeds = 0x44,
}

/// One serial link to a board
pub struct BoardLink {
    port: Box<dyn SerialPort>,
    address: u8,
}

impl BoardLink {
    pub fn open(port_name: &str, address: u8) -> Result<Self> {
        Self::open_with_baudrate(port_name, address, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, address: u8, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port, address })
    }

    /// Checksum over everything after the header
    fn checksum(data: &[u8]) -> u8 {
        let sum: u32 = data.iter().map(|&b| b as u32).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(address: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(address);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum = Self::checksum(&packet[2..]);
        packet.push(checksum);

        packet
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        let board = self.address;
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                RobotError::Timeout { board }
            } else {
                RobotError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(RobotError::InvalidResponse {
                board,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut address_length = [0u8; 2];
        self.port.read_exact(&mut address_length)?;
        let [address, length] = address_length;

        if address != board {
            return Err(RobotError::InvalidResponse {
                board,
                reason: format!("Address mismatch: expected {}, got {}", board, address),
            });
        }
        if length < 2 {
            return Err(RobotError::InvalidResponse {
                board,
                reason: format!("Length {} too short", length),
            });
        }

        // status + params + checksum
        let mut remaining = vec![0u8; length as usize];
        self.port.read_exact(&mut remaining)?;

        let (body, received) = remaining.split_at(remaining.len() - 1);
        let mut checksum_data = vec![address, length];
        checksum_data.extend_from_slice(body);
        if Self::checksum(&checksum_data) != received[0] {
            return Err(RobotError::ChecksumMismatch { board });
        }

        if body[0] != 0 {
            return Err(RobotError::BoardError {
                board,
                status: body[0],
            });
        }

        Ok(body[1..].to_vec())
    }

    /// Send one request and wait for its reply payload
    pub fn transact(&mut self, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = Self::build_packet(self.address, instruction, params);
        debug!(
            "Board {} <- {:?} ({} param bytes)",
            self.address,
            instruction,
            params.len()
        );
        self.port.write_all(&packet)?;
        self.port.flush()?;
        self.read_response()
    }

    /// Like `transact`, but insists on a payload of `len` bytes
    fn query(&mut self, instruction: Instruction, len: usize) -> Result<Vec<u8>> {
        let reply = self.transact(instruction, &[])?;
        if reply.len() < len {
            return Err(RobotError::InvalidResponse {
                board: self.address,
                reason: format!("Expected {} bytes, got {}", len, reply.len()),
            });
        }
        Ok(reply)
    }

    pub fn ping(&mut self) -> Result<bool> {
        match self.transact(Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(RobotError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn write_i16(&mut self, instruction: Instruction, value: i16) -> Result<()> {
        self.transact(instruction, &value.to_le_bytes()).map(|_| ())
    }

    fn read_i16(&mut self, instruction: Instruction) -> Result<i16> {
        let reply = self.query(instruction, 2)?;
        Ok(i16::from_le_bytes([reply[0], reply[1]]))
    }

    fn read_u8(&mut self, instruction: Instruction) -> Result<u8> {
        Ok(self.query(instruction, 1)?[0])
    }
}

/// Robot backed by the motion and power boards
pub struct BoardRobot {
    motion: BoardLink,
    power: BoardLink,
    calibration: Calibration,
    wheel_separation: f64,
    final_dcdc_mask: u8,
}

impl BoardRobot {
    /// Open both boards, check they answer, and power up the DC/DC outputs
    pub fn open(config: &RuntimeConfig) -> Result<Self> {
        info!("Opening motion board on {}", config.board1);
        let mut motion = BoardLink::open(&config.board1, MOTION_BOARD)?;
        info!("Opening power board on {}", config.board2);
        let mut power = BoardLink::open(&config.board2, POWER_BOARD)?;

        for link in [&mut motion, &mut power] {
            if !link.ping()? {
                warn!("Board {} not responding to ping", link.address);
                return Err(RobotError::Timeout {
                    board: link.address,
                });
            }
        }

        let mut robot = Self {
            motion,
            power,
            calibration: config.calibration,
            wheel_separation: config.wheel_separation,
            final_dcdc_mask: config.final_dcdc_mask,
        };
        robot.enable_dcdc(config.initial_dcdc_mask)?;

        info!("Boards initialized successfully");
        Ok(robot)
    }

    fn send_wheels(&mut self, command: WheelCommand) -> Result<()> {
        debug!(
            "Setting wheel command: left={}, right={}",
            command.left, command.right
        );
        let mut params = [0u8; 4];
        params[..2].copy_from_slice(&command.left.to_le_bytes());
        params[2..].copy_from_slice(&command.right.to_le_bytes());
        self.motion
            .transact(Instruction::SetWheelVelocity, &params)
            .map(|_| ())
    }
}

impl Robot for BoardRobot {
    fn incremental_distance(&mut self) -> Result<(f64, f64)> {
        let reply = self.motion.query(Instruction::ReadIncrements, 8)?;
        let left = i32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]);
        let right = i32::from_le_bytes([reply[4], reply[5], reply[6], reply[7]]);

        let sign = |inverse: bool| if inverse { -1.0 } else { 1.0 };
        Ok((
            sign(self.calibration.inverse_left_motor) * left as f64 / TICKS_PER_METER,
            sign(self.calibration.inverse_right_motor) * right as f64 / TICKS_PER_METER,
        ))
    }

    fn is_stopped(&mut self) -> bool {
        match self.motion.read_u8(Instruction::ReadMotionStatus) {
            Ok(status) => status & 0x01 != 0,
            Err(e) => {
                debug!("Motion status read failed: {}", e);
                false
            }
        }
    }

    fn set_velocity(&mut self, linear: f64, angular: f64) -> Result<()> {
        let speeds = body_to_wheel(linear, angular, self.wheel_separation);
        self.send_wheels(self.calibration.nominal(speeds))
    }

    fn set_velocity_calibrated(&mut self, linear: f64, angular: f64) -> Result<()> {
        let speeds = body_to_wheel(linear, angular, self.wheel_separation);
        self.send_wheels(self.calibration.calibrated(speeds))
    }

    fn set_velocity_raw(&mut self, left: i16, right: i16) -> Result<()> {
        self.send_wheels(WheelCommand::new(left, right))
    }

    fn height(&mut self) -> Result<i32> {
        self.motion.read_i16(Instruction::ReadHeight).map(i32::from)
    }

    fn set_height(&mut self, millimeters: i32) -> Result<()> {
        self.motion
            .write_i16(Instruction::SetHeight, saturate_i16(millimeters))
    }

    fn tilt(&mut self) -> Result<i32> {
        self.motion.read_i16(Instruction::ReadTilt).map(i32::from)
    }

    fn set_tilt(&mut self, degrees: i32) -> Result<()> {
        self.motion.write_i16(Instruction::SetTilt, saturate_i16(degrees))
    }

    fn set_height_velocity(&mut self, mm_per_sec: u8) -> Result<()> {
        self.motion
            .transact(Instruction::SetHeightVelocity, &[mm_per_sec])
            .map(|_| ())
    }

    fn set_tilt_velocity(&mut self, deg_per_sec: u8) -> Result<()> {
        self.motion
            .transact(Instruction::SetTiltVelocity, &[deg_per_sec])
            .map(|_| ())
    }

    fn battery_status(&mut self) -> Result<BatteryStatus> {
        let reply = self.power.query(Instruction::ReadBatteries, 5)?;
        Ok(BatteryStatus {
            elec_level: reply[0],
            pc1_level: reply[1],
            motor_h_level: reply[2],
            motor_l_level: reply[3],
            charger_status: reply[4],
        })
    }

    fn temperatures(&mut self) -> Result<Temperatures> {
        let reply = self.motion.query(Instruction::ReadTemperatures, 5)?;
        Ok(Temperatures {
            left_motor: reply[0] as i8 as i32,
            right_motor: reply[1] as i8 as i32,
            left_driver: reply[2] as i8 as i32,
            right_driver: reply[3] as i8 as i32,
            tilt_overheat: reply[4] & 0x01 != 0,
            height_overheat: reply[4] & 0x02 != 0,
        })
    }

    fn buttons(&mut self) -> Result<(bool, bool)> {
        let bits = self.motion.read_u8(Instruction::ReadButtons)?;
        Ok((bits & 0x01 != 0, bits & 0x02 != 0))
    }

    fn rotary_encoder(&mut self) -> Result<i32> {
        let raw = self.motion.read_u8(Instruction::ReadRotaryEncoder)?;
        Ok(raw as i8 as i32)
    }

    fn power_diagnostics(&mut self) -> Result<PowerDiagnostics> {
        // ten little-endian u16 values in hundredths (volts, amps, amp-hours)
        let reply = self.power.query(Instruction::ReadDiagnostics, 20)?;
        let v: Vec<f64> = reply[..20]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) as f64 / 100.0)
            .collect();
        Ok(PowerDiagnostics {
            elec_bat_voltage: v[0],
            pc1_bat_voltage: v[1],
            cable_bat_voltage: v[2],
            motor_voltage: v[3],
            motor_h_voltage: v[4],
            motor_l_voltage: v[5],
            elec_instant_current: v[6],
            motor_instant_current: v[7],
            elec_integrated_current: v[8],
            motor_integrated_current: v[9],
        })
    }

    fn dcdc_mask(&mut self) -> Result<u8> {
        self.power.read_u8(Instruction::ReadDcdc)
    }

    fn enable_dcdc(&mut self, mask: u8) -> Result<()> {
        info!("Setting DC/DC mask 0x{:02X}", mask);
        self.power.transact(Instruction::SetDcdc, &[mask]).map(|_| ())
    }

    fn set_leds(&mut self, rgb: &[u8]) -> Result<()> {
        // LED frames can exceed one packet, send them in chunks with an offset
        for (index, chunk) in rgb.chunks(240).enumerate() {
            let mut params = Vec::with_capacity(chunk.len() + 1);
            params.push(index as u8);
            params.extend_from_slice(chunk);
            self.power.transact(Instruction::SetLeds, &params)?;
        }
        Ok(())
    }
}

impl Drop for BoardRobot {
    fn drop(&mut self) {
        info!("Stopping wheels and applying final DC/DC mask");
        if let Err(e) = self.send_wheels(WheelCommand::zero()) {
            warn!("Failed to stop wheels on drop: {}", e);
        }
        let mask = self.final_dcdc_mask;
        if let Err(e) = self.enable_dcdc(mask) {
            warn!("Failed to apply final DC/DC mask on drop: {}", e);
        }
    }
}

fn saturate_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ~(1 + 4 + 0x22 + 0x0A + 0x00) = ~49 = 206
        let data = [1u8, 4, 0x22, 0x0A, 0x00];
        assert_eq!(BoardLink::checksum(&data), 206);
    }

    #[test]
    fn test_build_packet() {
        let packet = BoardLink::build_packet(MOTION_BOARD, Instruction::Ping, &[]);
        // Header (2) + Address (1) + Length (1) + Instruction (1) + Checksum (1)
        assert_eq!(packet.len(), 6);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], MOTION_BOARD);
        assert_eq!(packet[3], 2);
        assert_eq!(packet[4], 0x01);
        assert_eq!(packet[5], BoardLink::checksum(&packet[2..5]));
    }

    #[test]
    fn test_build_packet_with_params() {
        let packet =
            BoardLink::build_packet(MOTION_BOARD, Instruction::SetHeight, &500i16.to_le_bytes());
        assert_eq!(packet.len(), 8);
        assert_eq!(packet[3], 4);
        assert_eq!(i16::from_le_bytes([packet[5], packet[6]]), 500);
    }

    #[test]
    fn test_saturate_i16() {
        assert_eq!(saturate_i16(100_000), i16::MAX);
        assert_eq!(saturate_i16(-100_000), i16::MIN);
        assert_eq!(saturate_i16(-15), -15);
    }
}

// Per-tick pass-through of batteries, operator controls and diagnostics

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::RuntimeConfig;
use crate::messages::{Buttons, Diagnostics, VolumeIncrement};
use crate::robot::{BatteryStatus, Robot, Temperatures};

/// Everything read from the peripherals on one tick; `None` means skipped
/// (disabled, unchanged, or the read failed)
#[derive(Debug, Default, Clone)]
pub struct PeripheralReport {
    pub batteries: Option<BatteryStatus>,
    pub buttons: Option<Buttons>,
    pub volume: Option<VolumeIncrement>,
    pub temperature: Option<Temperatures>,
    pub diagnostics: Option<Diagnostics>,
}

pub struct PeripheralMonitor {
    publish_buttons: bool,
    publish_volume: bool,
    publish_temperature: bool,
    publish_diagnostics: bool,
    last_buttons: Option<Buttons>,
    last_tick: Option<Instant>,
    period_sum: Duration,
    period_count: u32,
}

impl PeripheralMonitor {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            publish_buttons: config.publish_buttons,
            publish_volume: config.publish_volume,
            publish_temperature: config.publish_temperature,
            publish_diagnostics: config.publish_diagnostics,
            last_buttons: None,
            last_tick: None,
            period_sum: Duration::ZERO,
            period_count: 0,
        }
    }

    /// Count the time since the previous tick towards the loop-rate average
    pub fn record_tick(&mut self, now: Instant) {
        if let Some(last) = self.last_tick.replace(now) {
            self.period_sum += now.saturating_duration_since(last);
            self.period_count += 1;
        }
    }

    /// Average loop frequency in Hz since startup, 0 before two ticks
    pub fn average_loop_freq(&self) -> f64 {
        if self.period_count == 0 || self.period_sum.is_zero() {
            return 0.0;
        }
        self.period_count as f64 / self.period_sum.as_secs_f64()
    }

    pub fn poll<R: Robot>(&mut self, robot: &mut R) -> PeripheralReport {
        let mut report = PeripheralReport {
            batteries: robot.battery_status().ok(),
            ..PeripheralReport::default()
        };

        if self.publish_buttons {
            if let Ok((button1, button2)) = robot.buttons() {
                let buttons = Buttons { button1, button2 };
                // only on the first read and on change
                if self.last_buttons != Some(buttons) {
                    self.last_buttons = Some(buttons);
                    report.buttons = Some(buttons);
                }
            }
        }

        if self.publish_volume {
            match robot.rotary_encoder() {
                Ok(0) => {}
                Ok(volume_inc) => report.volume = Some(VolumeIncrement { volume_inc }),
                Err(e) => debug!("Rotary encoder read failed: {}", e),
            }
        }

        if self.publish_temperature {
            report.temperature = robot.temperatures().ok();
        }

        if self.publish_diagnostics {
            if let Ok(power) = robot.power_diagnostics() {
                report.diagnostics = Some(Diagnostics {
                    power,
                    average_loop_freq: self.average_loop_freq(),
                });
            }
        }

        report
    }
}

// Driving loop around the driver core
// One task owns the robot: ticks and incoming messages are interleaved with
// select!, so no handler ever runs concurrently with a tick.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use zenoh::pubsub::Publisher;
use zenoh::query::Query;
use zenoh::sample::Sample;

// local imports
use crate::config::{
    CMD_TIMEOUT, FrameIds, IMU_TIMEOUT, RuntimeConfig, SERVICE_GET_DCDC, SERVICE_LEDS,
    SERVICE_SET_DCDC, TOPIC_BATTERIES, TOPIC_BUTTONS, TOPIC_CMD_VEL, TOPIC_CMD_VEL_RAW,
    TOPIC_DIAGNOSTICS, TOPIC_HEALTH, TOPIC_IMU, TOPIC_ODOM, TOPIC_STALK, TOPIC_STALK_REF,
    TOPIC_TEMPERATURE, TOPIC_TF, TOPIC_VOLUME,
};
use crate::driver::{Driver, TickReport};
use crate::error::RuntimeError;
use crate::messages::{
    InertialSample, LedRequest, Odometry, RawWheelCommand, ServiceReply, SetDcdcRequest,
    StalkCommand, StalkReference, Stamped, Transforms, VelocityCommand,
};
use crate::robot::Robot;
use crate::robot::board::BoardRobot;
use crate::robot::simulated::SimulatedRobot;
use crate::transforms::{Quaternion, robot_frames};

/// Open the configured backend and drive it until shutdown
pub async fn run(config: RuntimeConfig) -> Result<(), RuntimeError> {
    if config.simulation {
        info!("Simulation mode, no hardware will be opened");
        let robot = SimulatedRobot::new(config.wheel_separation);
        run_with(robot, config).await
    } else {
        info!("Opening boards {} and {}...", config.board1, config.board2);
        let robot = BoardRobot::open(&config).map_err(RuntimeError::Init)?;
        run_with(robot, config).await
    }
}

/// Decoded input, stamped when zenoh delivered it
#[derive(Debug)]
enum Inbound {
    Velocity(VelocityCommand),
    Raw(RawWheelCommand),
    Inertial(InertialSample),
    Stalk(StalkCommand),
    StalkReference(StalkReference),
}

struct Outputs<'a> {
    odom: Publisher<'a>,
    tf: Publisher<'a>,
    health: Publisher<'a>,
    batteries: Publisher<'a>,
    buttons: Publisher<'a>,
    volume: Publisher<'a>,
    temperature: Publisher<'a>,
    diagnostics: Publisher<'a>,
}

impl Outputs<'_> {
    async fn publish_tick(
        &self,
        report: &TickReport,
        odom: Odometry,
        tf: Transforms,
    ) -> Result<(), RuntimeError> {
        let stamp = wall_clock();

        put(&self.health, &report.health).await?;
        put(&self.odom, &Stamped::new(stamp, odom)).await?;
        put(&self.tf, &Stamped::new(stamp, tf)).await?;

        let peripherals = &report.peripherals;
        if let Some(batteries) = &peripherals.batteries {
            put(&self.batteries, &Stamped::new(stamp, batteries)).await?;
        }
        if let Some(buttons) = &peripherals.buttons {
            put(&self.buttons, &Stamped::new(stamp, buttons)).await?;
        }
        if let Some(volume) = &peripherals.volume {
            put(&self.volume, &Stamped::new(stamp, volume)).await?;
        }
        if let Some(temperature) = &peripherals.temperature {
            put(&self.temperature, &Stamped::new(stamp, temperature)).await?;
        }
        if let Some(diagnostics) = &peripherals.diagnostics {
            put(&self.diagnostics, &Stamped::new(stamp, diagnostics)).await?;
        }
        Ok(())
    }
}

/// Drive an already initialized backend until Ctrl-C
pub async fn run_with<R: Robot>(robot: R, config: RuntimeConfig) -> Result<(), RuntimeError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers, subscribers and services...");
    // Subscribers stamp on arrival, so a long tick cannot age the watchdog inputs
    let (tx, mut inbound) = mpsc::unbounded_channel();
    let _sub_vel = session
        .declare_subscriber(TOPIC_CMD_VEL)
        .callback(forward(tx.clone(), "velocity command", Inbound::Velocity))
        .await?;
    let _sub_vel_raw = session
        .declare_subscriber(TOPIC_CMD_VEL_RAW)
        .callback(forward(tx.clone(), "raw wheel command", Inbound::Raw))
        .await?;
    let _sub_stalk = session
        .declare_subscriber(TOPIC_STALK)
        .callback(forward(tx.clone(), "stalk command", Inbound::Stalk))
        .await?;
    let _sub_stalk_ref = session
        .declare_subscriber(TOPIC_STALK_REF)
        .callback(forward(tx.clone(), "stalk reference", Inbound::StalkReference))
        .await?;
    let _sub_imu = if config.using_imu {
        let subscriber = session
            .declare_subscriber(TOPIC_IMU)
            .callback(forward(tx, "inertial sample", Inbound::Inertial))
            .await?;
        Some(subscriber)
    } else {
        None
    };

    let srv_set_dcdc = session.declare_queryable(SERVICE_SET_DCDC).await?;
    let srv_get_dcdc = session.declare_queryable(SERVICE_GET_DCDC).await?;
    let srv_leds = session.declare_queryable(SERVICE_LEDS).await?;

    let outputs = Outputs {
        odom: session.declare_publisher(TOPIC_ODOM).await?,
        tf: session.declare_publisher(TOPIC_TF).await?,
        health: session.declare_publisher(TOPIC_HEALTH).await?,
        batteries: session.declare_publisher(TOPIC_BATTERIES).await?,
        buttons: session.declare_publisher(TOPIC_BUTTONS).await?,
        volume: session.declare_publisher(TOPIC_VOLUME).await?,
        temperature: session.declare_publisher(TOPIC_TEMPERATURE).await?,
        diagnostics: session.declare_publisher(TOPIC_DIAGNOSTICS).await?,
    };

    let mut driver = Driver::new(robot, &config, Instant::now());
    let mut tick = interval(config.loop_period());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Runtime started: {}Hz loop, {}ms command watchdog, inertial source {}",
        config.loop_hz,
        CMD_TIMEOUT.as_millis(),
        if config.using_imu { "on" } else { "off" }
    );
    if config.using_imu {
        info!("Inertial watchdog: {}ms", IMU_TIMEOUT.as_millis());
    }
    info!(
        "Subscribed to: {}, {}, {}, {}",
        TOPIC_CMD_VEL, TOPIC_CMD_VEL_RAW, TOPIC_STALK, TOPIC_STALK_REF
    );
    info!("Publishing to: {}, {}, {}", TOPIC_ODOM, TOPIC_TF, TOPIC_HEALTH);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let report = driver.tick(Instant::now());
                let odom = odometry(&report, driver.frames());
                let tf = Transforms {
                    transforms: robot_frames(
                        driver.frames(),
                        report.pose,
                        report.stalk.height_m,
                        report.stalk.tilt_rad,
                    )
                    .to_vec(),
                };
                outputs.publish_tick(&report, odom, tf).await?;
            }

            Some((received, event)) = inbound.recv() => match event {
                Inbound::Velocity(cmd) => driver.on_velocity_command(cmd, received),
                Inbound::Raw(cmd) => driver.on_raw_command(cmd),
                Inbound::Inertial(imu) => {
                    driver.on_inertial_sample(imu, received);
                }
                Inbound::Stalk(cmd) => driver.on_stalk_command(cmd),
                Inbound::StalkReference(reference) => {
                    if let Err(e) = driver.on_stalk_reference(reference) {
                        warn!("Stalk reference rejected: {}", e);
                    }
                }
            },

            Ok(query) = srv_set_dcdc.recv_async() => {
                let reply = match request::<SetDcdcRequest>(&query) {
                    Ok(req) => match driver.set_dcdc(req) {
                        Ok(mask) => {
                            info!("DC/DC mask set to {:#010b}", mask);
                            ServiceReply::with_mask(mask)
                        }
                        Err(e) => ServiceReply::failed(e),
                    },
                    Err(reason) => ServiceReply::failed(reason),
                };
                respond(&query, &reply).await;
            }

            Ok(query) = srv_get_dcdc.recv_async() => {
                let reply = match driver.dcdc_mask() {
                    Ok(mask) => ServiceReply::with_mask(mask),
                    Err(e) => ServiceReply::failed(e),
                };
                respond(&query, &reply).await;
            }

            Ok(query) = srv_leds.recv_async() => {
                let reply = match request::<LedRequest>(&query) {
                    Ok(req) => match driver.set_leds(&req.rgb_values) {
                        Ok(()) => ServiceReply::ok(),
                        Err(e) => ServiceReply::failed(e),
                    },
                    Err(reason) => ServiceReply::failed(reason),
                };
                respond(&query, &reply).await;
            }

            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    // dropping the driver stops the base, dropping the backend releases it
    drop(driver);
    Ok(())
}

/// Subscriber callback: decode the payload and queue it with its arrival time
fn forward<T: DeserializeOwned + 'static>(
    tx: UnboundedSender<(Instant, Inbound)>,
    what: &'static str,
    wrap: fn(T) -> Inbound,
) -> impl Fn(Sample) + Send + Sync + 'static {
    move |sample| {
        let received = Instant::now();
        if let Some(value) = decode::<T>(&sample, what) {
            // only fails once the loop has exited
            let _ = tx.send((received, wrap(value)));
        }
    }
}

fn decode<T: DeserializeOwned>(sample: &Sample, what: &str) -> Option<T> {
    let payload = sample.payload().to_bytes();
    match serde_json::from_slice(&payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse {}: {}", what, e);
            None
        }
    }
}

fn request<T: DeserializeOwned>(query: &Query) -> Result<T, String> {
    let payload = query
        .payload()
        .ok_or_else(|| "missing request payload".to_string())?;
    serde_json::from_slice(&payload.to_bytes()).map_err(|e| e.to_string())
}

async fn respond(query: &Query, reply: &ServiceReply) {
    debug!("Reply on {}: {:?}", query.key_expr(), reply);
    let json = match serde_json::to_string(reply) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode reply: {}", e);
            return;
        }
    };
    if let Err(e) = query.reply(query.key_expr().clone(), json).await {
        warn!("Failed to send reply on {}: {}", query.key_expr(), e);
    }
}

async fn put<T: Serialize>(publisher: &Publisher<'_>, value: &T) -> Result<(), RuntimeError> {
    let json = serde_json::to_string(value)?;
    publisher.put(json).await?;
    Ok(())
}

fn odometry(report: &TickReport, frames: &FrameIds) -> Odometry {
    Odometry {
        frame_id: frames.odom.clone(),
        child_frame_id: frames.base.clone(),
        pose: report.pose,
        orientation: Quaternion::from_rpy(0.0, 0.0, report.pose.yaw),
        twist: report.velocity,
    }
}

/// Seconds since the Unix epoch
fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

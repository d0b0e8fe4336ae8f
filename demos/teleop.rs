// Keyboard teleop: W/S drive, A/D turn, I/K stalk up/down, J/L head tilt,
// R/F speed, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use stalkbot_runtime::config::{TOPIC_CMD_VEL, TOPIC_STALK};
use stalkbot_runtime::messages::{StalkCommand, VelocityCommand};
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS: [f64; 3] = [0.1, 0.25, 0.5]; // m/s
const TURN_SPEEDS: [f64; 3] = [0.3, 0.6, 1.2]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Release everything after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_vel = session.declare_publisher(TOPIC_CMD_VEL).await?;
    let pub_stalk = session.declare_publisher(TOPIC_STALK).await?;

    info!("Controls: W/S=drive, A/D=turn, I/K=stalk, J/L=tilt, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_vel, &pub_stalk).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_vel: &zenoh::pubsub::Publisher<'_>,
    pub_stalk: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    let mut cmd = VelocityCommand::default();
    let mut stalk = StalkCommand::default();
    let mut last_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                if pressed {
                    last_input = Instant::now();
                }

                match code {
                    // Base
                    KeyCode::Char('w') if pressed => cmd.linear = SPEEDS[speed_idx],
                    KeyCode::Char('s') if pressed => cmd.linear = -SPEEDS[speed_idx],
                    KeyCode::Char('a') if pressed => cmd.angular = TURN_SPEEDS[speed_idx],
                    KeyCode::Char('d') if pressed => cmd.angular = -TURN_SPEEDS[speed_idx],

                    // Stalk: held keys keep the axis moving
                    KeyCode::Char('i') if pressed => stalk.head_up = true,
                    KeyCode::Char('k') if pressed => stalk.head_down = true,
                    KeyCode::Char('j') if pressed => stalk.tilt_up = true,
                    KeyCode::Char('l') if pressed => stalk.tilt_down = true,

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd = VelocityCommand::default();
            stalk = StalkCommand::default();
        }

        // Always publish at ~50Hz, the runtime watchdog stops the base otherwise
        pub_vel.put(serde_json::to_string(&cmd)?).await?;
        pub_stalk.put(serde_json::to_string(&stalk)?).await?;
    }

    pub_vel
        .put(serde_json::to_string(&VelocityCommand::default())?)
        .await?;
    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}

// Keyboard teleop: WASD drive, space stop, R/F speed, Q quit
//
// Publishes command requests to the transmitter over zenoh. Holding a key
// repeats the request so the transmitter keeps the link alive; letting go
// sends Stop.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use tank_link_runtime::config::TOPIC_CMD;
use tank_link_runtime::messages::{Command, CommandRequest};

const SPEEDS: [u8; 3] = [90, 160, 255];
const INPUT_TIMEOUT_MS: u64 = 300; // Stop after this much time with no movement key
const REPEAT_MS: u64 = 250;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD).await?;

    info!("Controls: WASD=drive, SPACE=stop, R/F=speed, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    // Leave the rover stopped whatever happened above
    publish(&publisher, &CommandRequest::new(Command::Stop)).await?;
    result
}

async fn publish(
    publisher: &zenoh::pubsub::Publisher<'_>,
    request: &CommandRequest,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(request)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 1;
    let mut moving = Command::Stop;
    let mut last_movement_input = Instant::now();
    let mut last_publish = Instant::now();

    publish(publisher, &speed_request(speed_idx)).await?;
    print_speed(speed_idx);

    loop {
        let mut next = None;

        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => next = Some(Command::Forward),
                    KeyCode::Char('s') if pressed => next = Some(Command::Backward),
                    KeyCode::Char('a') if pressed => next = Some(Command::Left),
                    KeyCode::Char('d') if pressed => next = Some(Command::Right),
                    KeyCode::Char(' ') if pressed => next = Some(Command::Stop),

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(SPEEDS.len() - 1);
                        publish(publisher, &speed_request(speed_idx)).await?;
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        publish(publisher, &speed_request(speed_idx)).await?;
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if next.is_some_and(|cmd| cmd != Command::Stop) {
            last_movement_input = Instant::now();
        } else if moving != Command::Stop
            && last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS)
        {
            next = Some(Command::Stop);
        }

        match next {
            Some(cmd) if cmd != moving => {
                moving = cmd;
                last_publish = Instant::now();
                info!("Command: {:?}", cmd);
                publish(publisher, &CommandRequest::new(cmd)).await?;
            }
            _ if moving != Command::Stop
                && last_publish.elapsed() > Duration::from_millis(REPEAT_MS) =>
            {
                last_publish = Instant::now();
                publish(publisher, &CommandRequest::new(moving)).await?;
            }
            _ => {}
        }
    }

    Ok(())
}

fn speed_request(idx: usize) -> CommandRequest {
    CommandRequest::with_speeds(Command::SetSpeed, SPEEDS[idx], SPEEDS[idx])
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {} ({})", label, SPEEDS[idx]);
}

// Receiver runtime: radio frames in, ramped motor outputs out
//
// One loop pass: drain radio -> decode/authenticate -> freshness check ->
// update ramp targets -> watchdog -> ramp tick -> (periodic) status.
// Everything runs on the same loop, so the ramp tick is the only writer of
// motion state and frame acceptance the only writer of session state.

use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{RuntimeConfig, TOPIC_RX_STATUS};
use crate::failsafe::FailSafe;
use crate::messages::{Command, LinkHealth, ReceiverStatus};
use crate::motor::{AnyMotors, MotorDriver, MotorOutputs, RampController, SimulatedMotors};
use crate::protocol::{
    ChaChaFrameCipher, CodecError, ControlFrame, FrameCipher, FrameCodec, FrameKey, RxSession,
    SessionReject, WireFrame,
};
use crate::radio::{SerialRadio, Transport};

/// Upper bound on frames handled per loop pass, keeps the ramp cadence
const MAX_FRAMES_PER_PASS: usize = 16;

/// What happened to one received buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Authentic and fresh; motion targets updated
    Accepted(ControlFrame),
    /// Authentic but not newer than the last accepted frame
    Stale(SessionReject),
    /// Wrong length, failed authentication, or unsupported version
    Rejected(CodecError),
}

/// Counters for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_accepted: u64,
    pub auth_failures: u64,
    pub stale_frames: u64,
    pub malformed: u64,
}

pub struct Receiver<O: MotorOutputs, C: FrameCipher = ChaChaFrameCipher> {
    codec: FrameCodec<C>,
    session: RxSession,
    failsafe: FailSafe,
    ramp: RampController<O>,
    stats: LinkStats,
}

impl<O: MotorOutputs> Receiver<O> {
    pub fn new(key: &FrameKey, outputs: O, config: &RuntimeConfig) -> Self {
        Self::with_codec(FrameCodec::new(key), outputs, config)
    }
}

impl<O: MotorOutputs, C: FrameCipher> Receiver<O, C> {
    pub fn with_codec(codec: FrameCodec<C>, outputs: O, config: &RuntimeConfig) -> Self {
        Self {
            codec,
            session: RxSession::new().with_resync_after(config.resync_after_ms),
            failsafe: FailSafe::new(config.watchdog_timeout_ms),
            ramp: RampController::with_ramp(outputs, config.ramp_step, config.ramp_interval_ms),
            stats: LinkStats::default(),
        }
    }

    /// Drive outputs to coast and reset link state (boot / re-init)
    pub fn begin(&mut self) {
        self.session.reset();
        self.ramp.begin();
    }

    /// Handle a raw buffer from the transport
    pub fn handle_bytes(&mut self, bytes: &[u8], now_ms: u64) -> FrameOutcome {
        match WireFrame::from_slice(bytes) {
            Ok(wire) => self.handle_frame(&wire, now_ms),
            Err(e) => {
                self.stats.malformed += 1;
                debug!("Dropping radio buffer: {}", e);
                FrameOutcome::Rejected(e)
            }
        }
    }

    pub fn handle_frame(&mut self, wire: &WireFrame, now_ms: u64) -> FrameOutcome {
        let frame = match self.codec.decode_frame(wire) {
            Ok(frame) => frame,
            Err(e) => {
                match e {
                    CodecError::Authentication => self.stats.auth_failures += 1,
                    _ => self.stats.malformed += 1,
                }
                warn!("Discarding frame: {}", e);
                return FrameOutcome::Rejected(e);
            }
        };

        if let Err(reject) = self.session.accept(frame.sequence, now_ms) {
            self.stats.stale_frames += 1;
            debug!("Discarding frame: {}", reject);
            return FrameOutcome::Stale(reject);
        }

        self.stats.frames_accepted += 1;
        info!(
            "RX <<< cmd={:?} seq={} L={} R={}",
            frame.command, frame.sequence, frame.left_speed, frame.right_speed
        );
        self.dispatch(&frame);
        FrameOutcome::Accepted(frame)
    }

    fn dispatch(&mut self, frame: &ControlFrame) {
        let (left, right) = (frame.left_speed, frame.right_speed);
        match frame.command {
            Command::SetSpeed => self.ramp.set_speed(left, right),
            Command::Stop => self.ramp.stop(),
            Command::Forward => {
                self.ramp.set_speed(left, right);
                self.ramp.forward();
            }
            Command::Backward => {
                self.ramp.set_speed(left, right);
                self.ramp.backward();
            }
            Command::Left => {
                self.ramp.set_speed(left, right);
                self.ramp.left();
            }
            Command::Right => {
                self.ramp.set_speed(left, right);
                self.ramp.right();
            }
        }
    }

    /// Watchdog first, then the ramp step
    pub fn tick(&mut self, now_ms: u64) -> LinkHealth {
        let health = self.failsafe.check(now_ms, &self.session, &mut self.ramp);
        self.ramp.tick(now_ms);
        health
    }

    pub fn status(&self, now_ms: u64) -> ReceiverStatus {
        let (left_speed, right_speed) = self.ramp.speeds();
        let (left_command, right_command) = self.ramp.current();
        ReceiverStatus {
            state: self.ramp.state(),
            left_speed,
            right_speed,
            left_command,
            right_command,
            link: self.failsafe.health(),
            last_sequence: self.session.last_accepted(),
            frames_accepted: self.stats.frames_accepted,
            auth_failures: self.stats.auth_failures,
            stale_frames: self.stats.stale_frames,
            uptime_s: now_ms / 1000,
        }
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn ramp(&self) -> &RampController<O> {
        &self.ramp
    }

    pub fn session(&self) -> &RxSession {
        &self.session
    }
}

/// Pull up to MAX_FRAMES_PER_PASS frames off the transport
pub fn drain_transport<T: Transport, O: MotorOutputs, C: FrameCipher>(
    radio: &mut T,
    receiver: &mut Receiver<O, C>,
    now_ms: u64,
) -> usize {
    let mut handled = 0;
    while handled < MAX_FRAMES_PER_PASS {
        match radio.receive() {
            Ok(Some(frame)) => {
                receiver.handle_frame(&frame, now_ms);
                handled += 1;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Radio receive failed: {}", e);
                break;
            }
        }
    }
    handled
}

fn open_motors(config: &RuntimeConfig) -> Result<AnyMotors, Box<dyn std::error::Error + Send + Sync>> {
    match &config.motor_port {
        Some(port) => Ok(AnyMotors::Bridge(MotorDriver::new(port)?)),
        None => {
            warn!("No motor port configured, using simulated motors");
            Ok(AnyMotors::Simulated(SimulatedMotors::new()))
        }
    }
}

pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let key = config.frame_key()?;
    let mut radio = SerialRadio::open(&config.radio_port, config.radio_baudrate)?;
    let motors = open_motors(&config)?;

    let mut receiver = Receiver::new(&key, motors, &config);
    receiver.begin();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_status = session.declare_publisher(TOPIC_RX_STATUS).await?;

    let start = Instant::now();
    let mut tick = interval(Duration::from_millis(config.loop_period_ms()));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_status_ms: Option<u64> = None;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Receiver started: {}Hz loop, {}ms watchdog timeout, ramp step {} every {}ms",
        config.loop_hz, config.watchdog_timeout_ms, config.ramp_step, config.ramp_interval_ms
    );
    info!("Publishing status to: {}", TOPIC_RX_STATUS);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down receiver");
                break;
            }
        }
        let now_ms = start.elapsed().as_millis() as u64;

        // 1. Drain radio (non-blocking), bounded per pass
        drain_transport(&mut radio, &mut receiver, now_ms);

        // 2. Watchdog + ramp
        receiver.tick(now_ms);

        // 3. Periodic status
        let due = last_status_ms
            .map(|last| now_ms.saturating_sub(last) >= config.status_interval_ms)
            .unwrap_or(true);
        if due {
            last_status_ms = Some(now_ms);
            let status_json = serde_json::to_string(&receiver.status(now_ms))?;
            if let Err(e) = pub_status.put(status_json).await {
                warn!("Failed to publish status: {}", e);
            }
        }
    }

    Ok(())
}

// Transmitter runtime: command requests in, encrypted frames out
//
// Command requests arrive on a zenoh topic as JSON (from a web UI bridge or
// the teleop demo). Each accepted request becomes one ControlFrame stamped
// with the next sequence number, sealed, and written to the radio.

use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{RuntimeConfig, TOPIC_CMD, TOPIC_TX_STATUS};
use crate::messages::{Command, CommandRequest, TransmitterStatus};
use crate::protocol::{
    ChaChaFrameCipher, CodecError, ControlFrame, FrameCipher, FrameCodec, FrameKey, TxSession,
};
use crate::radio::{SerialRadio, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    #[error("Frame encoding failed: {0}")]
    Codec(#[from] CodecError),

    #[error("Radio transmit failed: {0}")]
    Transport(#[from] TransportError),
}

/// Clamp a requested speed into the PWM range
fn clamp_speed(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

pub struct Transmitter<T: Transport, C: FrameCipher = ChaChaFrameCipher> {
    transport: T,
    codec: FrameCodec<C>,
    session: TxSession,
    default_speed: u8,
    keepalive_ms: u64,
    source_timeout_ms: u64,
    /// Last speeds set with `setspeed`; 0 means unset
    left_speed: u8,
    right_speed: u8,
    state: Command,
    /// Latest command source request, repeated as keepalive
    last_sent: Option<(Command, u8, u8)>,
    last_sent_at_ms: Option<u64>,
    last_source_at_ms: Option<u64>,
    frames_sent: u64,
    tx_failures: u64,
}

impl<T: Transport> Transmitter<T> {
    pub fn new(key: &FrameKey, transport: T, config: &RuntimeConfig) -> Self {
        Self::with_codec(FrameCodec::new(key), transport, config)
    }
}

impl<T: Transport, C: FrameCipher> Transmitter<T, C> {
    pub fn with_codec(codec: FrameCodec<C>, transport: T, config: &RuntimeConfig) -> Self {
        Self {
            transport,
            codec,
            session: TxSession::new(),
            default_speed: config.default_speed,
            keepalive_ms: config.keepalive_ms,
            source_timeout_ms: config.source_timeout_ms,
            left_speed: 0,
            right_speed: 0,
            state: Command::Stop,
            last_sent: None,
            last_sent_at_ms: None,
            last_source_at_ms: None,
            frames_sent: 0,
            tx_failures: 0,
        }
    }

    /// Explicit speed, else last set speed, else the configured default
    fn resolve_speed(&self, requested: Option<i64>, last: u8) -> u8 {
        match requested {
            Some(value) => clamp_speed(value),
            None if last > 0 => last,
            None => self.default_speed,
        }
    }

    /// Handle one request from the command source
    pub fn handle_request(
        &mut self,
        request: &CommandRequest,
        now_ms: u64,
    ) -> Result<ControlFrame, TransmitError> {
        let command = request.kind();
        let left = self.resolve_speed(request.left_speed, self.left_speed);
        let right = self.resolve_speed(request.right_speed, self.right_speed);

        // The latest request is what keepalive repeats, even if this send fails
        self.last_sent = Some((command, left, right));
        let frame = match self.send(command, left, right, now_ms) {
            Ok(frame) => frame,
            Err(e) => {
                // Retry on the next poll instead of waiting a keepalive period
                self.last_sent_at_ms = None;
                return Err(e);
            }
        };
        self.last_source_at_ms = Some(now_ms);

        match command {
            Command::SetSpeed => {
                self.left_speed = left;
                self.right_speed = right;
            }
            Command::Stop => {
                self.left_speed = 0;
                self.right_speed = 0;
            }
            _ => {}
        }
        if command != Command::SetSpeed {
            self.state = command;
        }
        Ok(frame)
    }

    /// Keepalive and source-loss handling; call once per loop pass
    pub fn poll(&mut self, now_ms: u64) -> Result<Option<ControlFrame>, TransmitError> {
        let Some(source_at) = self.last_source_at_ms else {
            return Ok(None);
        };

        if now_ms.saturating_sub(source_at) > self.source_timeout_ms {
            // Source went quiet: send one Stop, then nothing until it returns.
            // A failed Stop stays pending and is retried on the next pass.
            if self.last_sent.is_some() {
                warn!(
                    "Command source silent for {}ms, sending stop",
                    now_ms.saturating_sub(source_at)
                );
                let frame = self.send(Command::Stop, 0, 0, now_ms)?;
                self.last_sent = None;
                self.state = Command::Stop;
                return Ok(Some(frame));
            }
            return Ok(None);
        }

        if self.keepalive_ms == 0 {
            return Ok(None);
        }
        let Some((command, left, right)) = self.last_sent else {
            return Ok(None);
        };
        let due = self
            .last_sent_at_ms
            .map(|at| now_ms.saturating_sub(at) >= self.keepalive_ms)
            .unwrap_or(true);
        if !due {
            return Ok(None);
        }
        debug!("Keepalive resend of {:?}", command);
        let frame = self.send(command, left, right, now_ms)?;
        if command != Command::SetSpeed {
            self.state = command;
        }
        Ok(Some(frame))
    }

    fn send(
        &mut self,
        command: Command,
        left: u8,
        right: u8,
        now_ms: u64,
    ) -> Result<ControlFrame, TransmitError> {
        let frame = ControlFrame::new(command, left, right, self.session.next_sequence());
        let wire = self.codec.encode(&frame)?;
        if let Err(e) = self.transport.transmit(&wire) {
            self.tx_failures += 1;
            return Err(e.into());
        }
        self.frames_sent += 1;
        self.last_sent_at_ms = Some(now_ms);
        info!(
            "TX >>> cmd={:?} seq={} L={} R={}",
            frame.command, frame.sequence, frame.left_speed, frame.right_speed
        );
        Ok(frame)
    }

    pub fn status(&self, tank_id: &str, now_ms: u64) -> TransmitterStatus {
        TransmitterStatus {
            kind: "status".to_string(),
            tank_id: tank_id.to_string(),
            state: format!("{:?}", self.state).to_lowercase(),
            left_speed: self.left_speed,
            right_speed: self.right_speed,
            next_sequence: self.session.peek(),
            frames_sent: self.frames_sent,
            tx_failures: self.tx_failures,
            uptime: now_ms / 1000,
        }
    }

    pub fn state(&self) -> Command {
        self.state
    }

    pub fn speeds(&self) -> (u8, u8) {
        (self.left_speed, self.right_speed)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let key = config.frame_key()?;
    let radio = SerialRadio::open(&config.radio_port, config.radio_baudrate)?;
    let mut transmitter = Transmitter::new(&key, radio, &config);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD).await?;
    let pub_status = session.declare_publisher(TOPIC_TX_STATUS).await?;

    let start = Instant::now();
    let mut tick = interval(Duration::from_millis(config.loop_period_ms()));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_status_ms: Option<u64> = None;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Transmitter started: {}Hz loop, keepalive {}ms",
        config.loop_hz, config.keepalive_ms
    );
    info!("Subscribed to: {}", TOPIC_CMD);
    info!("Publishing status to: {}", TOPIC_TX_STATUS);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down transmitter, sending stop");
                let now_ms = start.elapsed().as_millis() as u64;
                if let Err(e) = transmitter.handle_request(&CommandRequest::new(Command::Stop), now_ms) {
                    warn!("Final stop failed: {}", e);
                }
                break;
            }
        }
        let now_ms = start.elapsed().as_millis() as u64;
        let mut force_status = false;

        // 1. Drain all pending command requests (non-blocking)
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<CommandRequest>(&payload) {
                Ok(request) => {
                    if let Err(e) = transmitter.handle_request(&request, now_ms) {
                        warn!("Transmission failed: {}", e);
                    }
                    force_status = true;
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Keepalive / source watchdog
        if let Err(e) = transmitter.poll(now_ms) {
            warn!("Keepalive failed: {}", e);
        }

        // 3. Status
        let due = last_status_ms
            .map(|last| now_ms.saturating_sub(last) >= config.status_interval_ms)
            .unwrap_or(true);
        if force_status || due {
            last_status_ms = Some(now_ms);
            let status_json = serde_json::to_string(&transmitter.status(&config.tank_id, now_ms))?;
            if let Err(e) = pub_status.put(status_json).await {
                warn!("Failed to publish status: {}", e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::loopback::Fault;
    use crate::radio::{LoopbackEnd, LoopbackLink};

    fn key() -> FrameKey {
        FrameKey::new([0x33; 32])
    }

    fn transmitter() -> (Transmitter<LoopbackEnd>, LoopbackEnd) {
        let (tx_end, rx_end) = LoopbackLink::pair();
        let config = RuntimeConfig::default();
        (Transmitter::new(&key(), tx_end, &config), rx_end)
    }

    fn decode_next(rx_end: &mut LoopbackEnd) -> ControlFrame {
        let wire = rx_end.receive().expect("rx").expect("frame");
        FrameCodec::new(&key()).decode_frame(&wire).expect("decode")
    }

    #[test]
    fn test_default_speed_when_never_set() {
        let (mut tx, mut rx_end) = transmitter();
        let frame = tx
            .handle_request(&CommandRequest::new(Command::Forward), 0)
            .expect("send");
        assert_eq!((frame.left_speed, frame.right_speed), (200, 200));
        assert_eq!(decode_next(&mut rx_end), frame);
    }

    #[test]
    fn test_last_set_speed_is_reused() {
        let (mut tx, _rx_end) = transmitter();
        tx.handle_request(&CommandRequest::with_speeds(Command::SetSpeed, 120, 90), 0)
            .expect("send");
        assert_eq!(tx.speeds(), (120, 90));

        let frame = tx
            .handle_request(&CommandRequest::new(Command::Left), 10)
            .expect("send");
        assert_eq!((frame.left_speed, frame.right_speed), (120, 90));
        assert_eq!(tx.state(), Command::Left);
    }

    #[test]
    fn test_stop_clears_speeds() {
        let (mut tx, _rx_end) = transmitter();
        tx.handle_request(&CommandRequest::with_speeds(Command::SetSpeed, 50, 50), 0)
            .expect("send");
        tx.handle_request(&CommandRequest::new(Command::Stop), 10)
            .expect("send");
        assert_eq!(tx.speeds(), (0, 0));
        let frame = tx
            .handle_request(&CommandRequest::new(Command::Forward), 20)
            .expect("send");
        assert_eq!(frame.left_speed, 200);
    }

    #[test]
    fn test_out_of_range_speeds_clamped() {
        let (mut tx, _rx_end) = transmitter();
        let request = CommandRequest {
            command: "forward".to_string(),
            left_speed: Some(999),
            right_speed: Some(-4),
        };
        let frame = tx.handle_request(&request, 0).expect("send");
        assert_eq!((frame.left_speed, frame.right_speed), (255, 0));
    }

    #[test]
    fn test_unknown_command_maps_to_stop() {
        let (mut tx, _rx_end) = transmitter();
        let request = CommandRequest {
            command: "somersault".to_string(),
            left_speed: None,
            right_speed: None,
        };
        let frame = tx.handle_request(&request, 0).expect("send");
        assert_eq!(frame.command, Command::Stop);
    }

    #[test]
    fn test_sequence_increments_per_frame() {
        let (mut tx, mut rx_end) = transmitter();
        for expected in 0..3u32 {
            tx.handle_request(&CommandRequest::new(Command::Forward), 0)
                .expect("send");
            assert_eq!(decode_next(&mut rx_end).sequence, expected);
        }
        assert_eq!(tx.status("t", 0).next_sequence, 3);
    }

    #[test]
    fn test_transport_failure_leaves_state() {
        let (mut tx, mut rx_end) = transmitter();
        tx.transport_mut().inject(Fault::Fail);
        let result = tx.handle_request(&CommandRequest::with_speeds(Command::SetSpeed, 10, 10), 0);
        assert!(matches!(result, Err(TransmitError::Transport(_))));
        assert_eq!(tx.speeds(), (0, 0));
        assert_eq!(tx.state(), Command::Stop);
        assert_eq!(rx_end.pending(), 0);
        assert_eq!(tx.status("t", 0).tx_failures, 1);
    }

    #[test]
    fn test_keepalive_repeats_last_command() {
        let (mut tx, mut rx_end) = transmitter();
        tx.handle_request(&CommandRequest::new(Command::Forward), 0)
            .expect("send");
        decode_next(&mut rx_end);

        assert_eq!(tx.poll(100).expect("poll"), None);
        // Source refreshes at 400, keepalive due at 500
        tx.handle_request(&CommandRequest::new(Command::Forward), 400)
            .expect("send");
        decode_next(&mut rx_end);
        assert_eq!(tx.poll(500).expect("poll"), None);
        let frame = tx.poll(900).expect("poll").expect("keepalive");
        assert_eq!(frame.command, Command::Forward);
        assert_eq!(frame.sequence, 2);
    }

    #[test]
    fn test_silent_source_sends_single_stop() {
        let (mut tx, mut rx_end) = transmitter();
        tx.handle_request(&CommandRequest::new(Command::Backward), 0)
            .expect("send");
        decode_next(&mut rx_end);

        let frame = tx.poll(1001).expect("poll").expect("stop");
        assert_eq!(frame.command, Command::Stop);
        assert_eq!(tx.state(), Command::Stop);
        assert_eq!(tx.poll(2000).expect("poll"), None);
        assert_eq!(tx.poll(5000).expect("poll"), None);
    }

    #[test]
    fn test_failed_stop_is_retried_not_the_old_maneuver() {
        let (mut tx, mut rx_end) = transmitter();
        tx.handle_request(&CommandRequest::new(Command::Forward), 0)
            .expect("send");
        decode_next(&mut rx_end);

        tx.transport_mut().inject(Fault::Fail);
        let result = tx.handle_request(&CommandRequest::new(Command::Stop), 600);
        assert!(matches!(result, Err(TransmitError::Transport(_))));
        assert_eq!(tx.state(), Command::Forward);
        assert_eq!(rx_end.pending(), 0);

        let frame = tx.poll(610).expect("poll").expect("retry");
        assert_eq!(frame.command, Command::Stop);
        assert_eq!(decode_next(&mut rx_end).command, Command::Stop);
        assert_eq!(tx.state(), Command::Stop);
        assert_eq!(tx.poll(620).expect("poll"), None);
    }

    #[test]
    fn test_failed_request_does_not_refresh_source() {
        let (mut tx, mut rx_end) = transmitter();
        tx.handle_request(&CommandRequest::new(Command::Forward), 0)
            .expect("send");
        decode_next(&mut rx_end);

        tx.transport_mut().inject(Fault::Fail);
        assert!(tx.handle_request(&CommandRequest::new(Command::Left), 900).is_err());

        // Source last reached the air at 0, so it times out at 1001
        let frame = tx.poll(1001).expect("poll").expect("stop");
        assert_eq!(frame.command, Command::Stop);
        assert_eq!(tx.state(), Command::Stop);
    }

    #[test]
    fn test_failed_source_stop_is_retried() {
        let (mut tx, mut rx_end) = transmitter();
        tx.handle_request(&CommandRequest::new(Command::Backward), 0)
            .expect("send");
        decode_next(&mut rx_end);

        tx.transport_mut().inject(Fault::Fail);
        assert!(matches!(tx.poll(1001), Err(TransmitError::Transport(_))));
        assert_eq!(tx.state(), Command::Backward);
        assert_eq!(rx_end.pending(), 0);

        let frame = tx.poll(1011).expect("poll").expect("stop");
        assert_eq!(frame.command, Command::Stop);
        assert_eq!(decode_next(&mut rx_end).command, Command::Stop);
        assert_eq!(tx.state(), Command::Stop);
        assert_eq!(tx.poll(1021).expect("poll"), None);
    }

    #[test]
    fn test_no_traffic_before_first_request() {
        let (mut tx, rx_end) = transmitter();
        assert_eq!(tx.poll(10_000).expect("poll"), None);
        assert_eq!(rx_end.pending(), 0);
    }
}

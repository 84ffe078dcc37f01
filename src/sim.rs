// Bench simulation: transmitter and receiver joined by a loopback radio link
//
// Runs on a virtual millisecond clock so a whole scripted drive (including
// link faults and the watchdog stop) finishes instantly and deterministically.

use tracing::info;

use crate::config::RuntimeConfig;
use crate::messages::{CommandRequest, LinkHealth, ReceiverStatus};
use crate::motor::SimulatedMotors;
use crate::protocol::FrameKey;
use crate::radio::loopback::Fault;
use crate::radio::{LoopbackEnd, LoopbackLink};
use crate::receiver::{drain_transport, Receiver};
use crate::transmitter::Transmitter;

/// One scripted event
#[derive(Debug, Clone)]
pub enum Step {
    /// Command source issues a request
    Request(CommandRequest),
    /// Next transmitted frame is affected by a radio fault
    Fault(Fault),
    /// Re-deliver a previously transmitted frame (replay attempt)
    Replay(usize),
    /// Command source disconnects: no more requests or keepalives reach the link
    Disconnect,
}

/// Sample of receiver state at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub at_ms: u64,
    pub status: ReceiverStatus,
}

pub struct Simulation {
    transmitter: Transmitter<LoopbackEnd>,
    receiver: Receiver<SimulatedMotors>,
    rx_end: LoopbackEnd,
    loop_ms: u64,
    now_ms: u64,
    connected: bool,
}

impl Simulation {
    pub fn new(config: &RuntimeConfig) -> Self {
        let key = FrameKey::generate();
        let (tx_end, rx_end) = LoopbackLink::pair();
        let mut receiver = Receiver::new(&key, SimulatedMotors::new(), config);
        receiver.begin();
        Self {
            transmitter: Transmitter::new(&key, tx_end, config),
            receiver,
            rx_end,
            loop_ms: config.loop_period_ms(),
            now_ms: 0,
            connected: true,
        }
    }

    pub fn apply(&mut self, step: &Step) {
        match step {
            Step::Request(request) => {
                if let Err(e) = self.transmitter.handle_request(request, self.now_ms) {
                    info!("Sim request failed: {}", e);
                }
            }
            Step::Fault(fault) => self.transmitter.transport_mut().inject(*fault),
            Step::Replay(index) => {
                if let Some(frame) = self.transmitter.transport().sent().get(*index).copied() {
                    self.rx_end.deliver(frame);
                }
            }
            Step::Disconnect => self.connected = false,
        }
    }

    /// Advance the virtual clock by `duration_ms`, one loop pass at a time
    pub fn run_for(&mut self, duration_ms: u64) {
        let end = self.now_ms + duration_ms;
        while self.now_ms < end {
            self.now_ms += self.loop_ms;
            if self.connected {
                if let Err(e) = self.transmitter.poll(self.now_ms) {
                    info!("Sim keepalive failed: {}", e);
                }
            }
            drain_transport(&mut self.rx_end, &mut self.receiver, self.now_ms);
            self.receiver.tick(self.now_ms);
        }
    }

    pub fn sample(&self) -> Sample {
        Sample {
            at_ms: self.now_ms,
            status: self.receiver.status(self.now_ms),
        }
    }

    pub fn receiver(&self) -> &Receiver<SimulatedMotors> {
        &self.receiver
    }

    pub fn transmitter(&self) -> &Transmitter<LoopbackEnd> {
        &self.transmitter
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

/// Default bench script: drive, pivot, fault injection, replay, link loss
pub fn demo_script() -> Vec<(u64, Step)> {
    use crate::messages::Command;
    vec![
        (0, Step::Request(CommandRequest::with_speeds(Command::SetSpeed, 200, 200))),
        (0, Step::Request(CommandRequest::new(Command::Forward))),
        (400, Step::Request(CommandRequest::new(Command::Left))),
        (400, Step::Fault(Fault::Corrupt(20))),
        (100, Step::Request(CommandRequest::new(Command::Right))),
        (400, Step::Replay(1)),
        (100, Step::Request(CommandRequest::new(Command::Forward))),
        (300, Step::Disconnect),
        (3500, Step::Replay(0)),
    ]
}

/// Run a script of (delay before step, step); returns a sample after every step
pub fn run_script(config: &RuntimeConfig, script: &[(u64, Step)]) -> Vec<Sample> {
    let mut sim = Simulation::new(config);
    let mut samples = Vec::with_capacity(script.len());
    for (delay_ms, step) in script {
        sim.run_for(*delay_ms);
        sim.apply(step);
        let sample = sim.sample();
        info!(
            "t={}ms {:?} -> state={:?} cmd=({}, {}) link={:?}",
            sample.at_ms,
            step,
            sample.status.state,
            sample.status.left_command,
            sample.status.right_command,
            sample.status.link
        );
        samples.push(sample);
    }
    samples
}

/// True if the receiver ended the script stopped with a silent link
pub fn ended_safe(samples: &[Sample]) -> bool {
    samples
        .last()
        .map(|s| s.status.link == LinkHealth::Silent && s.status.left_command == 0)
        .unwrap_or(true)
}

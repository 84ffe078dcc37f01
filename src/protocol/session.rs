// Link session: sequence stamping (transmitter) and freshness checks (receiver)
//
// Sequences are u32 and wrap silently. The receiver accepts a frame only if
// its sequence is "after" the last accepted one within half the sequence
// space, which rejects replays and duplicates while tolerating wraparound.

use tracing::{debug, info};

/// Half of the u32 sequence space
const HALF_WINDOW: u32 = 1 << 31;

/// Transmitter side sequence counter
#[derive(Debug, Default)]
pub struct TxSession {
    counter: u32,
}

impl TxSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from an arbitrary counter value (tests, simulation)
    pub fn starting_at(counter: u32) -> Self {
        Self { counter }
    }

    /// Post-increment: returns the current value and advances, wrapping
    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.counter;
        self.counter = self.counter.wrapping_add(1);
        seq
    }

    /// Value the next frame will carry
    pub fn peek(&self) -> u32 {
        self.counter
    }
}

/// Why an authenticated frame was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionReject {
    #[error("stale sequence {sequence} (last accepted {last})")]
    Stale { sequence: u32, last: u32 },
}

/// True when `sequence` is strictly after `last` modulo 2^32
pub fn is_forward_progress(last: u32, sequence: u32) -> bool {
    let delta = sequence.wrapping_sub(last);
    delta != 0 && delta < HALF_WINDOW
}

/// Receiver side freshness / anti-replay state
#[derive(Debug, Default)]
pub struct RxSession {
    last_accepted: Option<u32>,
    last_accepted_at_ms: Option<u64>,
    resync_after_ms: Option<u64>,
}

impl RxSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a sequence discontinuity after this much silence
    pub fn with_resync_after(mut self, resync_after_ms: Option<u64>) -> Self {
        self.resync_after_ms = resync_after_ms;
        self
    }

    /// Check an authenticated frame's sequence and record it on acceptance
    pub fn accept(&mut self, sequence: u32, now_ms: u64) -> Result<(), SessionReject> {
        if let Some(last) = self.last_accepted {
            if !is_forward_progress(last, sequence) {
                if self.resync_allowed(now_ms) {
                    info!(
                        "Resyncing link session after silence: last={}, new={}",
                        last, sequence
                    );
                } else {
                    debug!("Rejecting stale sequence {} (last {})", sequence, last);
                    return Err(SessionReject::Stale { sequence, last });
                }
            }
        }

        self.last_accepted = Some(sequence);
        self.last_accepted_at_ms = Some(now_ms);
        Ok(())
    }

    fn resync_allowed(&self, now_ms: u64) -> bool {
        match (self.resync_after_ms, self.silence_ms(now_ms)) {
            (Some(window), Some(silence)) => silence > window,
            _ => false,
        }
    }

    pub fn last_accepted(&self) -> Option<u32> {
        self.last_accepted
    }

    pub fn last_accepted_at_ms(&self) -> Option<u64> {
        self.last_accepted_at_ms
    }

    /// Time since the last accepted frame, None if nothing was ever accepted
    pub fn silence_ms(&self, now_ms: u64) -> Option<u64> {
        self.last_accepted_at_ms
            .map(|at| now_ms.saturating_sub(at))
    }

    /// Silent when nothing was ever accepted or the last frame is older than `timeout_ms`
    pub fn is_silent(&self, now_ms: u64, timeout_ms: u64) -> bool {
        match self.silence_ms(now_ms) {
            Some(silence) => silence > timeout_ms,
            None => true,
        }
    }

    /// Back to boot state: nothing accepted
    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.last_accepted_at_ms = None;
    }
}

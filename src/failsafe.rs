// Receiver watchdog
// Note: link silence must fail toward "motors off". If the transmitter dies or
// the radio link drops, the last command must not keep driving the rover.

use tracing::{info, warn};

use crate::config::WATCHDOG_TIMEOUT_MS;
use crate::messages::LinkHealth;
use crate::motor::{MotorOutputs, RampController};
use crate::protocol::RxSession;

pub struct FailSafe {
    timeout_ms: u64,
    health: LinkHealth,
}

impl FailSafe {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            health: LinkHealth::Silent, // Start silent until first frame
        }
    }

    /// Run once per control loop pass, before the ramp tick.
    ///
    /// Forces a Stop target whenever no frame was ever accepted or the last
    /// accepted frame is older than the timeout.
    pub fn check<O: MotorOutputs>(
        &mut self,
        now_ms: u64,
        session: &RxSession,
        ramp: &mut RampController<O>,
    ) -> LinkHealth {
        if session.is_silent(now_ms, self.timeout_ms) {
            if self.health != LinkHealth::Silent {
                warn!(
                    "Link silent ({:?} ms since last frame), stopping rover",
                    session.silence_ms(now_ms)
                );
            }
            self.health = LinkHealth::Silent;

            // Re-arming an existing stop target would disturb the ramp cadence
            if !ramp.is_stop_target() {
                ramp.stop();
            }
        } else {
            if self.health != LinkHealth::Ok {
                info!("Link healthy, last sequence {:?}", session.last_accepted());
            }
            self.health = LinkHealth::Ok;
        }
        self.health
    }

    pub fn health(&self) -> LinkHealth {
        self.health
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

impl Default for FailSafe {
    fn default() -> Self {
        Self::new(WATCHDOG_TIMEOUT_MS)
    }
}

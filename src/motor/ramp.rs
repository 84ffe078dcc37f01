// Motion ramp controller for the differential base
//
// Converts discrete maneuvers into per-side signed commands (-255..=255) and
// walks the applied command toward the target by at most `ramp_step` every
// `ramp_interval_ms`. A reversal always passes through zero, so the H-bridge
// never flips polarity while driving.

use tracing::{debug, warn};

use super::driver::{MotorOutputs, Side, SideDrive};
use crate::config::{RAMP_INTERVAL_MS, RAMP_STEP};
use crate::messages::RoverState;

/// Largest magnitude of a side command
pub const MAX_COMMAND: i16 = 255;

/// Advance `current` toward `target` by at most `step`.
///
/// Never overshoots the target, also when slowing down within one direction, and never crosses zero in one step: when the
/// signs differ the value is first brought to zero.
pub fn step_toward(current: i16, target: i16, step: u8) -> i16 {
    if current == target {
        return current;
    }
    let step = i16::from(step.max(1));

    if target == 0 || (target > 0 && current < 0) || (target < 0 && current > 0) {
        // Head for zero first
        return if current > 0 {
            (current - step).max(0)
        } else {
            (current + step).min(0)
        };
    }

    // Same sign: move by at most one step, clamped at the target
    if current > target {
        (current - step).max(target)
    } else {
        (current + step).min(target)
    }
}

/// Per-side ramp state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideRamp {
    /// Last commanded direction: -1, 0 or +1
    pub direction: i8,
    /// Speed ceiling (max PWM duty)
    pub max_speed: u8,
    pub target: i16,
    pub current: i16,
}

impl Default for SideRamp {
    fn default() -> Self {
        Self {
            direction: 0,
            max_speed: u8::MAX,
            target: 0,
            current: 0,
        }
    }
}

impl SideRamp {
    fn retarget(&mut self) {
        self.target = i16::from(self.direction) * i16::from(self.max_speed);
    }
}

pub struct RampController<O: MotorOutputs> {
    outputs: O,
    left: SideRamp,
    right: SideRamp,
    ramp_step: u8,
    ramp_interval_ms: u16,
    /// None means the next tick runs immediately
    last_update_ms: Option<u64>,
    state: RoverState,
}

impl<O: MotorOutputs> RampController<O> {
    pub fn new(outputs: O) -> Self {
        Self::with_ramp(outputs, RAMP_STEP, RAMP_INTERVAL_MS)
    }

    pub fn with_ramp(outputs: O, ramp_step: u8, ramp_interval_ms: u16) -> Self {
        let mut controller = Self {
            outputs,
            left: SideRamp::default(),
            right: SideRamp::default(),
            ramp_step: 1,
            ramp_interval_ms: 1,
            last_update_ms: None,
            state: RoverState::Stop,
        };
        controller.set_ramp(ramp_step, ramp_interval_ms);
        controller
    }

    /// Put both channels in coast and reset to a stopped state
    pub fn begin(&mut self) {
        self.left = SideRamp {
            max_speed: self.left.max_speed,
            ..SideRamp::default()
        };
        self.right = SideRamp {
            max_speed: self.right.max_speed,
            ..SideRamp::default()
        };
        self.apply();
        self.stop();
    }

    /// Ramp resolution; zero values are treated as 1
    pub fn set_ramp(&mut self, step: u8, interval_ms: u16) {
        self.ramp_step = step.max(1);
        self.ramp_interval_ms = interval_ms.max(1);
        self.last_update_ms = None;
    }

    /// Record per-side targets as direction * max speed and arm the next tick
    pub fn set_targets(&mut self, left_dir: i8, right_dir: i8, left_max: u8, right_max: u8) {
        self.left.direction = left_dir.clamp(-1, 1);
        self.right.direction = right_dir.clamp(-1, 1);
        self.left.max_speed = left_max;
        self.right.max_speed = right_max;
        self.left.retarget();
        self.right.retarget();
        self.last_update_ms = None;
        debug!(
            "Ramp targets: left={}, right={}",
            self.left.target, self.right.target
        );
    }

    /// Change speed ceilings, keeping the last commanded directions
    pub fn set_speed(&mut self, left_max: u8, right_max: u8) {
        let (left_dir, right_dir) = (self.left.direction, self.right.direction);
        self.set_targets(left_dir, right_dir, left_max, right_max);
    }

    pub fn forward(&mut self) {
        self.maneuver(1, 1, RoverState::Forward);
    }

    pub fn backward(&mut self) {
        self.maneuver(-1, -1, RoverState::Backward);
    }

    /// Pivot left in place: left side reverses, right side forward
    pub fn left(&mut self) {
        self.maneuver(-1, 1, RoverState::Left);
    }

    /// Pivot right in place
    pub fn right(&mut self) {
        self.maneuver(1, -1, RoverState::Right);
    }

    pub fn stop(&mut self) {
        self.maneuver(0, 0, RoverState::Stop);
    }

    fn maneuver(&mut self, left_dir: i8, right_dir: i8, state: RoverState) {
        let (left_max, right_max) = (self.left.max_speed, self.right.max_speed);
        self.set_targets(left_dir, right_dir, left_max, right_max);
        self.state = state;
    }

    /// Advance the ramp if due. Returns true when outputs were updated.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if let Some(last) = self.last_update_ms {
            if now_ms.saturating_sub(last) < u64::from(self.ramp_interval_ms) {
                return false;
            }
        }
        self.last_update_ms = Some(now_ms);

        let next_left = step_toward(self.left.current, self.left.target, self.ramp_step);
        let next_right = step_toward(self.right.current, self.right.target, self.ramp_step);
        if next_left == self.left.current && next_right == self.right.current {
            return false;
        }

        self.left.current = next_left;
        self.right.current = next_right;
        self.apply();
        true
    }

    fn apply(&mut self) {
        for (side, command) in [
            (Side::Left, self.left.current),
            (Side::Right, self.right.current),
        ] {
            if let Err(e) = self.outputs.apply(side, SideDrive::from_command(command)) {
                warn!("Failed to drive {:?} motor: {}", side, e);
            }
        }
    }

    /// True when both targets are zero
    pub fn is_stop_target(&self) -> bool {
        self.left.target == 0 && self.right.target == 0
    }

    pub fn state(&self) -> RoverState {
        self.state
    }

    pub fn left_side(&self) -> &SideRamp {
        &self.left
    }

    pub fn right_side(&self) -> &SideRamp {
        &self.right
    }

    pub fn current(&self) -> (i16, i16) {
        (self.left.current, self.right.current)
    }

    pub fn target(&self) -> (i16, i16) {
        (self.left.target, self.right.target)
    }

    pub fn speeds(&self) -> (u8, u8) {
        (self.left.max_speed, self.right.max_speed)
    }

    pub fn ramp(&self) -> (u8, u16) {
        (self.ramp_step, self.ramp_interval_ms)
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }
}

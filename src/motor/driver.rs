// Motor driver boundary for the two-channel tank base
//
// Each side is a half-H bridge: two polarity pins and one PWM duty.
// The ramp controller talks to anything implementing MotorOutputs.

use tracing::{debug, info, warn};

use super::hbridge::{BridgeError, Channel, HBridgeBus};

/// Drive side of the rover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Pin and duty state for one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideDrive {
    pub in1: bool,
    pub in2: bool,
    pub duty: u8,
}

impl SideDrive {
    /// Map a signed command (-255..=255) to pins and duty.
    /// Positive drives IN1, negative IN2, zero coasts with both pins low.
    pub fn from_command(command: i16) -> Self {
        let duty = command.unsigned_abs().min(255) as u8;
        match command {
            c if c > 0 => Self {
                in1: true,
                in2: false,
                duty,
            },
            c if c < 0 => Self {
                in1: false,
                in2: true,
                duty,
            },
            _ => Self::coast(),
        }
    }

    pub fn coast() -> Self {
        Self::default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

/// Sink for per-side motor outputs
pub trait MotorOutputs {
    fn apply(&mut self, side: Side, drive: SideDrive) -> Result<(), MotorError>;
}

/// Channel wiring on the bridge board
pub const LEFT_CHANNEL: Channel = Channel::A;
pub const RIGHT_CHANNEL: Channel = Channel::B;

/// High-level driver for the bridge board
pub struct MotorDriver {
    bus: HBridgeBus,
}

impl MotorDriver {
    /// Open the bridge board on the given serial port and make sure it answers
    pub fn new(port: &str) -> Result<Self, MotorError> {
        info!("Opening motor bridge on {}", port);
        let mut bus = HBridgeBus::open(port)?;
        if !bus.ping()? {
            warn!("Motor bridge on {} not responding to ping", port);
            return Err(BridgeError::Timeout.into());
        }
        bus.coast_all()?;
        info!("Motor bridge ready");
        Ok(Self { bus })
    }

    /// Coast both sides
    pub fn stop(&mut self) -> Result<(), MotorError> {
        info!("Coasting all motors");
        self.bus.coast_all()?;
        Ok(())
    }

    fn channel(side: Side) -> Channel {
        match side {
            Side::Left => LEFT_CHANNEL,
            Side::Right => RIGHT_CHANNEL,
        }
    }
}

impl MotorOutputs for MotorDriver {
    fn apply(&mut self, side: Side, drive: SideDrive) -> Result<(), MotorError> {
        self.bus
            .set_drive(Self::channel(side), drive.in1, drive.in2, drive.duty)?;
        Ok(())
    }
}

impl Drop for MotorDriver {
    fn drop(&mut self) {
        // Try to stop motors when driver is dropped
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}

/// Motor outputs without hardware: remembers the last drive per side
#[derive(Debug, Default)]
pub struct SimulatedMotors {
    pub left: SideDrive,
    pub right: SideDrive,
    pub writes: u64,
}

impl SimulatedMotors {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MotorOutputs for SimulatedMotors {
    fn apply(&mut self, side: Side, drive: SideDrive) -> Result<(), MotorError> {
        debug!(
            "Sim {:?}: in1={} in2={} duty={}",
            side, drive.in1, drive.in2, drive.duty
        );
        match side {
            Side::Left => self.left = drive,
            Side::Right => self.right = drive,
        }
        self.writes += 1;
        Ok(())
    }
}

/// Either a real bridge board or simulated outputs, picked at startup
pub enum AnyMotors {
    Bridge(MotorDriver),
    Simulated(SimulatedMotors),
}

impl MotorOutputs for AnyMotors {
    fn apply(&mut self, side: Side, drive: SideDrive) -> Result<(), MotorError> {
        match self {
            AnyMotors::Bridge(driver) => driver.apply(side, drive),
            AnyMotors::Simulated(sim) => sim.apply(side, drive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_command() {
        assert_eq!(
            SideDrive::from_command(150),
            SideDrive {
                in1: true,
                in2: false,
                duty: 150
            }
        );
    }

    #[test]
    fn test_negative_command() {
        assert_eq!(
            SideDrive::from_command(-255),
            SideDrive {
                in1: false,
                in2: true,
                duty: 255
            }
        );
    }

    #[test]
    fn test_zero_coasts() {
        assert_eq!(SideDrive::from_command(0), SideDrive::coast());
        assert!(!SideDrive::coast().in1 && !SideDrive::coast().in2);
    }

    #[test]
    fn test_duty_clamped() {
        assert_eq!(SideDrive::from_command(400).duty, 255);
        assert_eq!(SideDrive::from_command(i16::MIN).duty, 255);
    }

    #[test]
    fn test_simulated_records_sides() {
        let mut sim = SimulatedMotors::new();
        sim.apply(Side::Left, SideDrive::from_command(-10)).expect("sim");
        sim.apply(Side::Right, SideDrive::from_command(20)).expect("sim");
        assert_eq!(sim.left.duty, 10);
        assert!(sim.left.in2);
        assert_eq!(sim.right.duty, 20);
        assert_eq!(sim.writes, 2);
    }
}

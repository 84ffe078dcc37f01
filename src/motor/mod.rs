// Motor control module for the tank base
//
// Provides:
// - Motion ramp controller (direction/speed commands -> ramped side commands)
// - Motor driver boundary (per-side H-bridge outputs)
// - Serial protocol for the H-bridge bridge board

mod driver;
pub mod hbridge;
pub mod ramp;

pub use driver::{AnyMotors, MotorDriver, MotorError, MotorOutputs, Side, SideDrive, SimulatedMotors};
pub use hbridge::{BridgeError, HBridgeBus};
pub use ramp::{step_toward, RampController, SideRamp, MAX_COMMAND};

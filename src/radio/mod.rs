// Radio transport boundary
//
// The core only needs a framed byte channel of fixed packet size:
// - SerialRadio: LoRa UART modem in transparent mode
// - LoopbackLink: in-memory link for tests and simulation

pub mod loopback;
pub mod serial;

pub use loopback::{LoopbackEnd, LoopbackLink};
pub use serial::SerialRadio;

use crate::protocol::WireFrame;

/// Error types for the radio link
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Link closed")]
    Closed,

    #[error("Transmit rejected: {0}")]
    Rejected(String),
}

/// Fixed-size frame transport. `receive` must not block the control loop.
pub trait Transport {
    fn transmit(&mut self, frame: &WireFrame) -> Result<(), TransportError>;

    /// Next complete frame if one is available
    fn receive(&mut self) -> Result<Option<WireFrame>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, frame: &WireFrame) -> Result<(), TransportError> {
        (**self).transmit(frame)
    }

    fn receive(&mut self) -> Result<Option<WireFrame>, TransportError> {
        (**self).receive()
    }
}

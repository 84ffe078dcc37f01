// Serial protocol for the H-bridge bridge board
//
// The board drives two half-H channels (IN1, IN2, PWM per side).
// Packet format: [0xFF, 0xFF, Length, Instruction, Params..., Checksum]
// Length counts instruction + params + checksum.
// Response format: [0xFF, 0xFF, Length, Status, Params..., Checksum]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for the bridge board
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 20;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Flag bits in the SetDrive pin byte
const PIN_IN1: u8 = 0b01;
const PIN_IN2: u8 = 0b10;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Ping = 0x01,
    SetDrive = 0x10, // params: [channel, pins, duty]
    Coast = 0x11,    // all pins low, duty 0 on both channels
}

/// Bridge channel index on the board
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Channel {
    A = 0,
    B = 1,
}

/// Error types for bridge board communication
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from bridge: {reason}")]
    InvalidResponse { reason: String },

    #[error("Checksum mismatch in bridge response")]
    ChecksumMismatch,

    #[error("Bridge returned error status: 0x{status:02X}")]
    BoardError { status: u8 },

    #[error("Timeout waiting for bridge response")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge board bus - handles serial communication with the motor MCU
pub struct HBridgeBus {
    port: Box<dyn SerialPort>,
}

impl HBridgeBus {
    /// Open a new connection to the bridge board
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Checksum over everything after the header
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // instruction + params + checksum
        let mut packet = Vec::with_capacity(5 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum = Self::checksum(&packet[2..]);
        packet.push(checksum);

        packet
    }

    /// Encode IN1/IN2 into the pin flag byte
    fn pin_flags(in1: bool, in2: bool) -> u8 {
        let mut flags = 0;
        if in1 {
            flags |= PIN_IN1;
        }
        if in2 {
            flags |= PIN_IN2;
        }
        flags
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a response packet, returning its params
    fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BridgeError::Timeout
            } else {
                BridgeError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(BridgeError::InvalidResponse {
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut length = [0u8; 1];
        self.port.read_exact(&mut length)?;
        let length = length[0] as usize;
        if length < 2 {
            return Err(BridgeError::InvalidResponse {
                reason: format!("Length too short: {}", length),
            });
        }

        // status + params + checksum
        let mut remaining = vec![0u8; length];
        self.port.read_exact(&mut remaining)?;

        let mut checksum_data = vec![length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        if Self::checksum(&checksum_data) != remaining[remaining.len() - 1] {
            return Err(BridgeError::ChecksumMismatch);
        }

        let status = remaining[0];
        if status != 0 {
            return Err(BridgeError::BoardError { status });
        }

        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Ping the board to check it is alive
    pub fn ping(&mut self) -> Result<bool> {
        let packet = Self::build_packet(Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response() {
            Ok(_) => Ok(true),
            Err(BridgeError::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Set polarity pins and PWM duty on one channel (fire and forget)
    pub fn set_drive(&mut self, channel: Channel, in1: bool, in2: bool, duty: u8) -> Result<()> {
        let params = [channel as u8, Self::pin_flags(in1, in2), duty];
        let packet = Self::build_packet(Instruction::SetDrive, &params);
        debug!(
            "SetDrive ch={:?} in1={} in2={} duty={}",
            channel, in1, in2, duty
        );
        self.send_packet(&packet)
    }

    /// Drop both channels to coast
    pub fn coast_all(&mut self) -> Result<()> {
        let packet = Self::build_packet(Instruction::Coast, &[]);
        self.send_packet(&packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // Length=5, Instruction=SETDRIVE, ch=1, pins=IN1, duty=200
        let data = [5u8, 0x10, 1, 0b01, 200];
        // ~(5+16+1+1+200) = ~223 = 32
        assert_eq!(HBridgeBus::checksum(&data), 32);
    }

    #[test]
    fn test_build_ping_packet() {
        let packet = HBridgeBus::build_packet(Instruction::Ping, &[]);
        // Header (2) + Length (1) + Instruction (1) + Checksum (1)
        assert_eq!(packet, vec![0xFF, 0xFF, 2, 0x01, !3u8]);
    }

    #[test]
    fn test_build_set_drive_packet() {
        let params = [Channel::B as u8, HBridgeBus::pin_flags(false, true), 150];
        let packet = HBridgeBus::build_packet(Instruction::SetDrive, &params);
        assert_eq!(packet.len(), 8);
        assert_eq!(&packet[..5], &[0xFF, 0xFF, 5, 0x10, 1]);
        assert_eq!(packet[5], 0b10);
        assert_eq!(packet[6], 150);
        assert_eq!(packet[7], HBridgeBus::checksum(&packet[2..7]));
    }

    #[test]
    fn test_pin_flags() {
        assert_eq!(HBridgeBus::pin_flags(false, false), 0);
        assert_eq!(HBridgeBus::pin_flags(true, false), 1);
        assert_eq!(HBridgeBus::pin_flags(false, true), 2);
    }
}

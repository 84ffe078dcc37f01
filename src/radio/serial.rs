// LoRa UART modem transport
//
// The modem runs in transparent mode: bytes written to the UART are sent as
// one radio packet, received packets come out of the UART as a byte stream.
// Each frame is prefixed with a two-byte sync header so the reader can
// realign after noise or a partial packet:
// [0x54, 0x4B, frame (FRAME_SIZE bytes)]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

use super::{Transport, TransportError};
use crate::protocol::{WireFrame, FRAME_SIZE};

/// Sync header ("TK")
pub const SYNC: [u8; 2] = [0x54, 0x4B];

/// Short timeout keeps the control loop cadence when the modem stalls
pub const DEFAULT_TIMEOUT_MS: u64 = 5;

const PACKET_SIZE: usize = SYNC.len() + FRAME_SIZE;
const READ_CHUNK: usize = 256;

/// Reassembles whole frames from a byte stream
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    discarded: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, skipping bytes before a sync header
    pub fn next_frame(&mut self) -> Option<WireFrame> {
        match self.buffer.windows(SYNC.len()).position(|w| w == SYNC) {
            Some(start) => {
                if start > 0 {
                    self.discard(start);
                }
            }
            None => {
                // Keep a trailing byte that could be the start of a header
                let keep = usize::from(self.buffer.last() == Some(&SYNC[0]));
                let drop = self.buffer.len() - keep;
                if drop > 0 {
                    self.discard(drop);
                }
                return None;
            }
        }

        if self.buffer.len() < PACKET_SIZE {
            return None;
        }

        let frame = WireFrame::from_slice(&self.buffer[SYNC.len()..PACKET_SIZE]).ok();
        self.buffer.drain(..PACKET_SIZE);
        frame
    }

    fn discard(&mut self, count: usize) {
        debug!("Discarding {} unsynchronised radio bytes", count);
        self.buffer.drain(..count);
        self.discarded += count as u64;
    }

    /// Bytes thrown away while hunting for a sync header
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Build the on-UART packet for a frame
pub fn build_packet(frame: &WireFrame) -> [u8; PACKET_SIZE] {
    let mut packet = [0u8; PACKET_SIZE];
    packet[..SYNC.len()].copy_from_slice(&SYNC);
    packet[SYNC.len()..].copy_from_slice(frame.as_bytes());
    packet
}

pub struct SerialRadio {
    port: Box<dyn SerialPort>,
    assembler: FrameAssembler,
}

impl SerialRadio {
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self, TransportError> {
        info!("Opening radio modem on {} @ {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port,
            assembler: FrameAssembler::new(),
        })
    }
}

impl Transport for SerialRadio {
    fn transmit(&mut self, frame: &WireFrame) -> Result<(), TransportError> {
        self.port.write_all(&build_packet(frame))?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<WireFrame>, TransportError> {
        if let Some(frame) = self.assembler.next_frame() {
            return Ok(Some(frame));
        }

        let available = self.port.bytes_to_read()? as usize;
        if available > 0 {
            let mut chunk = vec![0u8; available.min(READ_CHUNK)];
            let read = match self.port.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
                Err(e) => return Err(e.into()),
            };
            self.assembler.push(&chunk[..read]);
        }

        Ok(self.assembler.next_frame())
    }
}

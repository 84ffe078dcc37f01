// Plaintext control frame
//
// Layout (8 bytes, before encryption):
// [version, command, left_speed, right_speed, seq3, seq2, seq1, seq0]
// Sequence is big-endian. All fields are always present so every frame has
// the same size regardless of command.

use crate::messages::Command;

/// Plaintext layout version
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the serialized plaintext
pub const PLAINTEXT_SIZE: usize = 8;

/// One command as carried over the radio link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    pub command: Command,
    pub left_speed: u8,
    pub right_speed: u8,
    pub sequence: u32,
}

impl ControlFrame {
    pub fn new(command: Command, left_speed: u8, right_speed: u8, sequence: u32) -> Self {
        Self {
            command,
            left_speed,
            right_speed,
            sequence,
        }
    }

    pub fn to_plaintext(&self) -> [u8; PLAINTEXT_SIZE] {
        let seq = self.sequence.to_be_bytes();
        [
            PROTOCOL_VERSION,
            self.command.code(),
            self.left_speed,
            self.right_speed,
            seq[0],
            seq[1],
            seq[2],
            seq[3],
        ]
    }

    /// Parse authenticated plaintext. Returns the version byte on mismatch.
    pub fn from_plaintext(bytes: &[u8; PLAINTEXT_SIZE]) -> Result<Self, u8> {
        if bytes[0] != PROTOCOL_VERSION {
            return Err(bytes[0]);
        }
        Ok(Self {
            command: Command::from_code(bytes[1]),
            left_speed: bytes[2],
            right_speed: bytes[3],
            sequence: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_layout() {
        let frame = ControlFrame::new(Command::Left, 120, 200, 0x0102_0304);
        let bytes = frame.to_plaintext();
        assert_eq!(bytes, [1, 3, 120, 200, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(ControlFrame::from_plaintext(&bytes), Ok(frame));
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = ControlFrame::new(Command::Stop, 0, 0, 0).to_plaintext();
        bytes[0] = 9;
        assert_eq!(ControlFrame::from_plaintext(&bytes), Err(9));
    }

    #[test]
    fn test_unknown_command_degrades_to_stop() {
        let bytes = [PROTOCOL_VERSION, 0x7F, 255, 255, 0, 0, 0, 5];
        let frame = ControlFrame::from_plaintext(&bytes).expect("version ok");
        assert_eq!(frame.command, Command::Stop);
        assert_eq!(frame.sequence, 5);
    }
}

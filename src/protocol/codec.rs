// Fixed-size wire frame codec
//
// encode: ControlFrame -> plaintext -> AEAD seal -> WireFrame (FRAME_SIZE bytes)
// decode: bytes -> length check -> AEAD open -> ControlFrame
//
// There is no partial-frame or variable-length encoding: a buffer is either
// exactly FRAME_SIZE bytes and authentic, or it is discarded.

use tracing::debug;

use super::cipher::{ChaChaFrameCipher, CipherError, FrameCipher, FrameKey, SEALED_SIZE};
use super::frame::ControlFrame;

/// Size of every frame on the radio link
pub const FRAME_SIZE: usize = SEALED_SIZE;

/// Associated data binding frames to this protocol and version
const FRAME_AAD: &[u8] = b"tank-link/v1";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame must be {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("frame failed authentication")]
    Authentication,

    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),

    #[error("failed to seal frame: {0}")]
    Seal(CipherError),
}

/// Opaque encrypted frame as sent over the air
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WireFrame([u8; FRAME_SIZE]);

impl WireFrame {
    pub fn from_bytes(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }

    /// Accept only buffers of exactly FRAME_SIZE bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let array: [u8; FRAME_SIZE] = bytes.try_into().map_err(|_| CodecError::WrongLength {
            expected: FRAME_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; FRAME_SIZE] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        FRAME_SIZE
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for WireFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WireFrame({})", hex::encode(self.0))
    }
}

/// Frame codec over a swappable AEAD primitive
pub struct FrameCodec<C: FrameCipher = ChaChaFrameCipher> {
    cipher: C,
}

impl FrameCodec<ChaChaFrameCipher> {
    pub fn new(key: &FrameKey) -> Self {
        Self::with_cipher(ChaChaFrameCipher::new(key))
    }
}

impl<C: FrameCipher> FrameCodec<C> {
    pub fn with_cipher(cipher: C) -> Self {
        Self { cipher }
    }

    pub fn encode(&self, frame: &ControlFrame) -> Result<WireFrame, CodecError> {
        let sealed = self
            .cipher
            .seal(FRAME_AAD, &frame.to_plaintext())
            .map_err(CodecError::Seal)?;
        Ok(WireFrame(sealed))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<ControlFrame, CodecError> {
        let wire = WireFrame::from_slice(bytes)?;
        self.decode_frame(&wire)
    }

    pub fn decode_frame(&self, wire: &WireFrame) -> Result<ControlFrame, CodecError> {
        let plaintext = self
            .cipher
            .open(FRAME_AAD, wire.as_bytes())
            .map_err(|_| CodecError::Authentication)?;
        let frame =
            ControlFrame::from_plaintext(&plaintext).map_err(CodecError::UnsupportedVersion)?;
        debug!(
            "Decoded frame seq={} cmd={:?} L={} R={}",
            frame.sequence, frame.command, frame.left_speed, frame.right_speed
        );
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Command;
    use crate::protocol::frame::PLAINTEXT_SIZE;

    fn codec() -> FrameCodec {
        FrameCodec::new(&FrameKey::new([0x42; 32]))
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(FRAME_SIZE, 36);
        let wire = codec()
            .encode(&ControlFrame::new(Command::Forward, 200, 200, 1))
            .expect("encode");
        assert_eq!(wire.as_bytes().len(), FRAME_SIZE);
    }

    #[test]
    fn test_encode_decode() {
        let codec = codec();
        let frame = ControlFrame::new(Command::SetSpeed, 17, 255, u32::MAX);
        let wire = codec.encode(&frame).expect("encode");
        assert_eq!(codec.decode(wire.as_bytes()), Ok(frame));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let codec = codec();
        let wire = codec
            .encode(&ControlFrame::new(Command::Stop, 0, 0, 0))
            .expect("encode");
        let short = &wire.as_bytes()[..FRAME_SIZE - 1];
        assert_eq!(
            codec.decode(short),
            Err(CodecError::WrongLength {
                expected: FRAME_SIZE,
                actual: FRAME_SIZE - 1
            })
        );

        let mut long = wire.as_bytes().to_vec();
        long.push(0);
        assert!(matches!(
            codec.decode(&long),
            Err(CodecError::WrongLength { .. })
        ));
    }

    #[test]
    fn test_bit_flip_in_any_field_is_detected() {
        let codec = codec();
        let wire = codec
            .encode(&ControlFrame::new(Command::Forward, 100, 100, 10))
            .expect("encode");
        // Nonce, ciphertext (command, speeds, sequence) and tag regions
        for index in [0, 12, 13, 14, 15, 19, 12 + PLAINTEXT_SIZE, FRAME_SIZE - 1] {
            let mut tampered = wire;
            tampered.as_bytes_mut()[index] ^= 0x01;
            assert_eq!(
                codec.decode_frame(&tampered),
                Err(CodecError::Authentication),
                "flip at byte {} not detected",
                index
            );
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let wire = codec()
            .encode(&ControlFrame::new(Command::Forward, 100, 100, 10))
            .expect("encode");
        let other = FrameCodec::new(&FrameKey::new([0x43; 32]));
        assert_eq!(other.decode_frame(&wire), Err(CodecError::Authentication));
    }

    struct FailingCipher;

    impl FrameCipher for FailingCipher {
        fn seal(
            &self,
            _aad: &[u8],
            _plaintext: &[u8; PLAINTEXT_SIZE],
        ) -> Result<[u8; SEALED_SIZE], CipherError> {
            Err(CipherError::Nonce)
        }

        fn open(
            &self,
            _aad: &[u8],
            _sealed: &[u8; SEALED_SIZE],
        ) -> Result<[u8; PLAINTEXT_SIZE], CipherError> {
            Err(CipherError::Open)
        }
    }

    #[test]
    fn test_seal_failure_is_reported() {
        let codec = FrameCodec::with_cipher(FailingCipher);
        assert_eq!(
            codec.encode(&ControlFrame::new(Command::Stop, 0, 0, 0)),
            Err(CodecError::Seal(CipherError::Nonce))
        );
    }
}

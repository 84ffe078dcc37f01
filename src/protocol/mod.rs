// Secure command frame protocol
//
// Provides:
// - Plaintext control frame layout
// - AEAD capability trait and the ChaCha20-Poly1305 implementation
// - Fixed-size wire frame codec
// - Link session sequencing and anti-replay

pub mod cipher;
pub mod codec;
pub mod frame;
pub mod session;

pub use cipher::{ChaChaFrameCipher, CipherError, FrameCipher, FrameKey, KeyError};
pub use codec::{CodecError, FrameCodec, WireFrame, FRAME_SIZE};
pub use frame::{ControlFrame, PLAINTEXT_SIZE, PROTOCOL_VERSION};
pub use session::{RxSession, SessionReject, TxSession};

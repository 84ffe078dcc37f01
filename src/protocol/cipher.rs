// Authenticated encryption for control frames
//
// Sealed layout: [nonce (12)] [ciphertext (PLAINTEXT_SIZE)] [tag (16)]
// The nonce is random per frame and travels in the clear.

use std::fmt;

use chacha20poly1305::aead::rand_core::{OsRng, RngCore};
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};

use super::frame::PLAINTEXT_SIZE;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Total sealed size: nonce + ciphertext + tag
pub const SEALED_SIZE: usize = NONCE_SIZE + PLAINTEXT_SIZE + TAG_SIZE;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum KeyError {
    #[error("key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("key must be {KEY_SIZE} bytes, got {0}")]
    Length(usize),
}

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("nonce generation failed")]
    Nonce,

    #[error("encryption failed")]
    Seal,

    #[error("authentication failed")]
    Open,
}

/// Shared 256-bit link key
#[derive(Clone, PartialEq, Eq)]
pub struct FrameKey([u8; KEY_SIZE]);

impl FrameKey {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text.trim())?;
        let bytes: [u8; KEY_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::Length(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Fresh random key from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

// Never print key material
impl fmt::Debug for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FrameKey(..)")
    }
}

/// Keyed AEAD over the fixed-size frame envelope.
///
/// Implementations own nonce placement and tag layout; the codec only deals
/// in plaintext and sealed byte arrays, so the primitive can be swapped
/// without touching framing.
pub trait FrameCipher {
    fn seal(
        &self,
        aad: &[u8],
        plaintext: &[u8; PLAINTEXT_SIZE],
    ) -> Result<[u8; SEALED_SIZE], CipherError>;

    fn open(
        &self,
        aad: &[u8],
        sealed: &[u8; SEALED_SIZE],
    ) -> Result<[u8; PLAINTEXT_SIZE], CipherError>;
}

/// ChaCha20-Poly1305 with a random 96-bit nonce per frame
pub struct ChaChaFrameCipher {
    cipher: ChaCha20Poly1305,
}

impl ChaChaFrameCipher {
    pub fn new(key: &FrameKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
        }
    }

    fn gen_nonce() -> Result<[u8; NONCE_SIZE], CipherError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| CipherError::Nonce)?;
        Ok(nonce)
    }
}

impl FrameCipher for ChaChaFrameCipher {
    fn seal(
        &self,
        aad: &[u8],
        plaintext: &[u8; PLAINTEXT_SIZE],
    ) -> Result<[u8; SEALED_SIZE], CipherError> {
        let nonce = Self::gen_nonce()?;
        let mut body = *plaintext;
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut body)
            .map_err(|_| CipherError::Seal)?;

        let mut sealed = [0u8; SEALED_SIZE];
        sealed[..NONCE_SIZE].copy_from_slice(&nonce);
        sealed[NONCE_SIZE..NONCE_SIZE + PLAINTEXT_SIZE].copy_from_slice(&body);
        sealed[NONCE_SIZE + PLAINTEXT_SIZE..].copy_from_slice(tag.as_slice());
        Ok(sealed)
    }

    fn open(
        &self,
        aad: &[u8],
        sealed: &[u8; SEALED_SIZE],
    ) -> Result<[u8; PLAINTEXT_SIZE], CipherError> {
        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        let tag = Tag::from_slice(&sealed[NONCE_SIZE + PLAINTEXT_SIZE..]);

        let mut body = [0u8; PLAINTEXT_SIZE];
        body.copy_from_slice(&sealed[NONCE_SIZE..NONCE_SIZE + PLAINTEXT_SIZE]);
        self.cipher
            .decrypt_in_place_detached(nonce, aad, &mut body, tag)
            .map_err(|_| CipherError::Open)?;
        Ok(body)
    }
}

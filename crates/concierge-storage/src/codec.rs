//! Versioned at-rest encoding for message content.
//!
//! Every stored message carries an explicit `content_encoding` tag. The
//! encoding used for new rows is fixed when the codec is built; reads
//! dispatch on the stored tag only.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use concierge_core::error::ConciergeError;

const NONCE_LEN: usize = 12;

/// Tag stored next to every message body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentEncoding {
    Plain,
    Aes256GcmV1,
}

impl ContentEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Plain => "plain",
            ContentEncoding::Aes256GcmV1 => "aes256gcm-v1",
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentEncoding {
    type Err = ConciergeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(ContentEncoding::Plain),
            "aes256gcm-v1" => Ok(ContentEncoding::Aes256GcmV1),
            other => Err(ConciergeError::Crypto(format!(
                "Unknown content encoding: {}",
                other
            ))),
        }
    }
}

/// Encodes message bodies on write and decodes them on read.
///
/// The AES-256-GCM key is the SHA-256 digest of the process secret. Output
/// is `base64(nonce || ciphertext)` with a fresh 96-bit nonce per value.
#[derive(Clone)]
pub struct ContentCodec {
    write_encoding: ContentEncoding,
    cipher: Option<Aes256Gcm>,
}

impl ContentCodec {
    /// Store content in clear. Encrypted rows can not be read back.
    pub fn plain() -> Self {
        Self {
            write_encoding: ContentEncoding::Plain,
            cipher: None,
        }
    }

    /// Encrypt new content with a key derived from `secret`.
    pub fn encrypted(secret: &str) -> Result<Self, ConciergeError> {
        if secret.is_empty() {
            return Err(ConciergeError::Crypto(
                "Content encryption secret is empty".to_string(),
            ));
        }
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ConciergeError::Crypto(format!("Invalid key: {}", e)))?;
        Ok(Self {
            write_encoding: ContentEncoding::Aes256GcmV1,
            cipher: Some(cipher),
        })
    }

    /// Keep writing clear text but still read encrypted rows.
    pub fn plain_with_key(secret: &str) -> Result<Self, ConciergeError> {
        let mut codec = Self::encrypted(secret)?;
        codec.write_encoding = ContentEncoding::Plain;
        Ok(codec)
    }

    /// The encoding new rows are written with.
    pub fn write_encoding(&self) -> ContentEncoding {
        self.write_encoding
    }

    pub fn encode(&self, content: &str) -> Result<(String, ContentEncoding), ConciergeError> {
        match self.write_encoding {
            ContentEncoding::Plain => Ok((content.to_string(), ContentEncoding::Plain)),
            ContentEncoding::Aes256GcmV1 => {
                let cipher = self.cipher()?;
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let ciphertext = cipher
                    .encrypt(&nonce, content.as_bytes())
                    .map_err(|e| ConciergeError::Crypto(format!("Encryption failed: {}", e)))?;

                let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                payload.extend_from_slice(nonce.as_slice());
                payload.extend_from_slice(&ciphertext);
                Ok((STANDARD.encode(payload), ContentEncoding::Aes256GcmV1))
            }
        }
    }

    pub fn decode(&self, stored: &str, encoding: ContentEncoding) -> Result<String, ConciergeError> {
        match encoding {
            ContentEncoding::Plain => Ok(stored.to_string()),
            ContentEncoding::Aes256GcmV1 => {
                let cipher = self.cipher()?;
                let payload = STANDARD
                    .decode(stored)
                    .map_err(|e| ConciergeError::Crypto(format!("Invalid base64: {}", e)))?;
                if payload.len() < NONCE_LEN {
                    return Err(ConciergeError::Crypto("Ciphertext too short".to_string()));
                }
                let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
                let plaintext = cipher
                    .decrypt(Nonce::from_slice(nonce), ciphertext)
                    .map_err(|e| ConciergeError::Crypto(format!("Decryption failed: {}", e)))?;
                String::from_utf8(plaintext)
                    .map_err(|e| ConciergeError::Crypto(format!("Invalid UTF-8: {}", e)))
            }
        }
    }

    fn cipher(&self) -> Result<&Aes256Gcm, ConciergeError> {
        self.cipher
            .as_ref()
            .ok_or_else(|| ConciergeError::Crypto("No content key configured".to_string()))
    }
}

impl Default for ContentCodec {
    fn default() -> Self {
        Self::plain()
    }
}

impl fmt::Debug for ContentCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentCodec")
            .field("write_encoding", &self.write_encoding)
            .field("has_key", &self.cipher.is_some())
            .finish()
    }
}

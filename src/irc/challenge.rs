//! Solanum CHALLENGE oper-up response (spec §4.8, §6).
//!
//! The server sends RSA-encrypted random bytes in base64 chunks across one
//! or more `RPL_RSACHALLENGE2` (740) lines, terminated by
//! `RPL_ENDOFRSACHALLENGE2` (741). The client decrypts the concatenated
//! ciphertext with its oper private key (PKCS1v1.5 padding), SHA-1 hashes
//! the plaintext, and replies `CHALLENGE +<hex digest>`.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use sha1::{Digest, Sha1};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("failed to read challenge key file: {0}")]
    Read(#[from] std::io::Error),
    #[error("challenge key is not a usable unencrypted RSA private key")]
    UnsupportedKey,
    #[error("challenge ciphertext was not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("RSA decryption of the challenge failed: {0}")]
    Decrypt(#[from] rsa::Error),
}

/// Accumulates base64 chunks of a `CHALLENGE` response and, once the
/// server signals the end, turns them into the reply string.
pub struct Challenge {
    key: RsaPrivateKey,
    buffer: String,
}

impl Challenge {
    /// Load an oper's RSA private key from `key_file`. Only unencrypted
    /// PKCS1/PKCS8 PEM keys are supported; a password-protected key falls
    /// back to the plaintext `OPER` path in [`super::oper_up`].
    pub fn load(key_file: &str) -> Result<Self, ChallengeError> {
        let pem = std::fs::read_to_string(key_file)?;
        let key = RsaPrivateKey::from_pkcs1_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
            .map_err(|_| ChallengeError::UnsupportedKey)?;
        Ok(Self { key, buffer: String::new() })
    }

    /// Append one base64 chunk from an `RPL_RSACHALLENGE2` line.
    pub fn push(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
    }

    /// Decrypt the accumulated ciphertext and return the hex SHA-1 digest
    /// to send back as `CHALLENGE +<digest>`.
    pub fn finalise(self) -> Result<String, ChallengeError> {
        use base64::Engine as _;
        let ciphertext = base64::engine::general_purpose::STANDARD.decode(&self.buffer)?;
        let plaintext = self.key.decrypt(Pkcs1v15Encrypt, &ciphertext)?;

        let mut hasher = Sha1::new();
        hasher.update(&plaintext);
        let digest = hasher.finalize();

        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

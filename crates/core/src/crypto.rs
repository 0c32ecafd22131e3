//! Symmetric cipher for tracker credentials at rest.
//!
//! Wire form is `base64(iv):base64(tag):base64(ciphertext)` using AES-256-GCM with a
//! 96-bit IV and a key derived by hashing the configured secret with SHA-256.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption key must not be empty")]
    EmptyKey,
    #[error("malformed ciphertext: {0}")]
    Malformed(&'static str),
    #[error("ciphertext failed authentication")]
    Authentication,
    #[error("encryption failed")]
    Encryption,
}

pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    pub fn new(secret: &SecretString) -> Result<Self, CipherError> {
        let raw = secret.expose_secret();
        if raw.trim().is_empty() {
            return Err(CipherError::EmptyKey);
        }
        let digest = Sha256::digest(raw.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        Ok(Self { cipher: Aes256Gcm::new(key) })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut iv = [0_u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        self.encrypt_with_iv(plaintext, iv)
    }

    fn encrypt_with_iv(&self, plaintext: &str, iv: [u8; IV_LEN]) -> Result<String, CipherError> {
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CipherError::Encryption)?;
        // aes-gcm appends the tag to the ciphertext.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!("{}:{}:{}", STANDARD.encode(iv), STANDARD.encode(tag), STANDARD.encode(ciphertext)))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let mut parts = encoded.trim().split(':');
        let (Some(iv), Some(tag), Some(ciphertext), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::Malformed("expected iv:tag:ciphertext"));
        };

        let iv = STANDARD.decode(iv).map_err(|_| CipherError::Malformed("iv is not base64"))?;
        let tag = STANDARD.decode(tag).map_err(|_| CipherError::Malformed("tag is not base64"))?;
        let mut sealed = STANDARD
            .decode(ciphertext)
            .map_err(|_| CipherError::Malformed("ciphertext is not base64"))?;

        if iv.len() != IV_LEN {
            return Err(CipherError::Malformed("iv must be 12 bytes"));
        }
        if tag.len() != TAG_LEN {
            return Err(CipherError::Malformed("tag must be 16 bytes"));
        }

        sealed.extend_from_slice(&tag);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| CipherError::Authentication)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Malformed("plaintext is not utf-8"))
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use secrecy::SecretString;

    use super::{CipherError, TokenCipher};

    fn cipher() -> TokenCipher {
        TokenCipher::new(&SecretString::from("local-test-key".to_owned())).expect("cipher")
    }

    fn flip_byte(segment: &str, index: usize) -> String {
        let mut bytes = STANDARD.decode(segment).expect("base64 segment");
        bytes[index] ^= 0x01;
        STANDARD.encode(bytes)
    }

    #[test]
    fn encrypt_then_decrypt_returns_original_token() {
        let cipher = cipher();
        for token in ["ghp_abc123", "", "tökén with spaces and ünïcode"] {
            let encoded = cipher.encrypt(token).expect("encrypt");
            assert_eq!(encoded.split(':').count(), 3);
            assert_eq!(cipher.decrypt(&encoded).expect("decrypt"), token);
        }
    }

    #[test]
    fn each_encryption_uses_a_fresh_iv() {
        let cipher = cipher();
        let first = cipher.encrypt("ghp_abc123").expect("encrypt");
        let second = cipher.encrypt("ghp_abc123").expect("encrypt");
        assert_ne!(first, second);
    }

    #[test]
    fn flipping_any_byte_of_any_segment_fails_authentication() {
        let cipher = cipher();
        let encoded = cipher.encrypt("ghp_abc123").expect("encrypt");
        let parts: Vec<&str> = encoded.split(':').collect();

        for segment in 0..3 {
            let len = STANDARD.decode(parts[segment]).expect("segment").len();
            for index in 0..len {
                let mut tampered: Vec<String> = parts.iter().map(|part| (*part).to_owned()).collect();
                tampered[segment] = flip_byte(parts[segment], index);
                let result = cipher.decrypt(&tampered.join(":"));
                assert_eq!(
                    result,
                    Err(CipherError::Authentication),
                    "segment {segment} byte {index} should be detected"
                );
            }
        }
    }

    #[test]
    fn wrong_key_and_malformed_input_are_rejected() {
        let encoded = cipher().encrypt("ghp_abc123").expect("encrypt");
        let other = TokenCipher::new(&SecretString::from("another-key".to_owned())).expect("cipher");

        assert_eq!(other.decrypt(&encoded), Err(CipherError::Authentication));
        assert!(matches!(cipher().decrypt("not-a-token"), Err(CipherError::Malformed(_))));
        assert!(matches!(
            TokenCipher::new(&SecretString::from("  ".to_owned())),
            Err(CipherError::EmptyKey)
        ));
    }
}

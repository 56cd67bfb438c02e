// src/services/codec.rs

//! Response body decryption.
//!
//! Every API response is a base64 string (sometimes JSON-quoted) of an
//! AES-256-ECB ciphertext with PKCS#7 padding. There is no IV and no
//! outbound encryption.

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ecb::cipher::{BlockDecryptMut, KeyInit, block_padding::Pkcs7};
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};

type Aes256EcbDec = ecb::Decryptor<Aes256>;

/// Decrypts API response bodies with a fixed symmetric key.
#[derive(Clone)]
pub struct Codec {
    key: [u8; 32],
}

impl Codec {
    /// Create a codec from the 32-byte ASCII key.
    pub fn new(key: &str) -> Result<Self> {
        let key: [u8; 32] = key
            .as_bytes()
            .try_into()
            .map_err(|_| AppError::config("AES key must be exactly 32 bytes"))?;
        Ok(Self { key })
    }

    /// Decrypt a response body into plaintext.
    pub fn decrypt(&self, body: &str) -> Result<String> {
        let encoded = strip_quotes(body.trim());
        let mut buf = STANDARD
            .decode(encoded)
            .map_err(|e| AppError::decode(format!("base64: {e}")))?;

        let plain = Aes256EcbDec::new(&self.key.into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|e| AppError::decode(format!("block/padding: {e}")))?;

        Ok(String::from_utf8_lossy(plain).into_owned())
    }

    /// Decrypt a response body and parse the plaintext as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self, body: &str) -> Result<T> {
        let text = self.decrypt(body)?;
        serde_json::from_str(&text).map_err(|e| AppError::decode(format!("json: {e}")))
    }

    /// Inverse of [`Codec::decrypt`], used to build response fixtures.
    #[cfg(test)]
    pub(crate) fn encrypt(&self, plaintext: &str) -> String {
        use ecb::cipher::BlockEncryptMut;

        let msg = plaintext.as_bytes();
        let mut buf = vec![0u8; msg.len() + 16];
        buf[..msg.len()].copy_from_slice(msg);
        let ct = ecb::Encryptor::<Aes256>::new(&self.key.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, msg.len())
            .expect("buffer has room for a full padding block");
        STANDARD.encode(ct)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

/// Remove one pair of surrounding double quotes.
fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}

use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const ENVELOPE_ALGORITHM: &str = "AES-256-GCM";

const NONCE_LEN: usize = 12;
const TOKEN_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption key must be 32 bytes")]
    InvalidKey,

    #[error("ciphertext failed authentication")]
    Authentication,

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub ciphertext: String,
    pub iv: String,
    pub algorithm: String,
}

pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<EncryptedEnvelope, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Authentication)?;

    Ok(EncryptedEnvelope {
        ciphertext: hex::encode(ciphertext),
        iv: hex::encode(nonce),
        algorithm: ENVELOPE_ALGORITHM.to_string(),
    })
}

pub fn decrypt(envelope: &EncryptedEnvelope, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if envelope.algorithm != ENVELOPE_ALGORITHM {
        return Err(CryptoError::UnsupportedAlgorithm(envelope.algorithm.clone()));
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    let iv = hex::decode(&envelope.iv).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    if iv.len() != NONCE_LEN {
        return Err(CryptoError::Malformed(format!(
            "iv must be {NONCE_LEN} bytes, got {}",
            iv.len()
        )));
    }
    let ciphertext =
        hex::decode(&envelope.ciphertext).map_err(|e| CryptoError::Malformed(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
        .map_err(|_| CryptoError::Authentication)
}

/// Opaque session/security token from the OS RNG.
pub fn generate_secure_token() -> String {
    let mut buf = [0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time signature check; length mismatches compare unequal without
/// branching on content.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let expected = sign(payload, secret);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

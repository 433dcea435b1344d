use aes_gcm::{
    aead::{rand_core::RngCore, Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::{StoreError, StoreResult};
use crate::store::CredentialSlot;

const BLOB_VERSION: u32 = 1;
const NONCE_LEN: usize = 12;

/// AES-256 key (32 bytes), wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// On-disk form of one encrypted slot value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub version: u32,
    /// Base64url nonce (12 bytes)
    pub nonce: String,
    /// Base64url ciphertext with the GCM tag appended
    pub ciphertext: String,
}

// Binds a blob to the slot it was written for, so swapping files is detected.
fn aad(version: u32, slot: CredentialSlot) -> String {
    format!("ta-auth|v{}|{}", version, slot.key())
}

pub fn encrypt(key: &EncryptionKey, value: &str, slot: CredentialSlot) -> StoreResult<EncryptedBlob> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let aad = aad(BLOB_VERSION, slot);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: value.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| StoreError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedBlob {
        version: BLOB_VERSION,
        nonce: URL_SAFE_NO_PAD.encode(nonce),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
    })
}

pub fn decrypt(
    key: &EncryptionKey,
    blob: &EncryptedBlob,
    slot: CredentialSlot,
) -> StoreResult<Zeroizing<String>> {
    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(&blob.nonce)
        .map_err(|_| StoreError::Corrupted)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(StoreError::Corrupted);
    }
    let ciphertext = URL_SAFE_NO_PAD
        .decode(&blob.ciphertext)
        .map_err(|_| StoreError::Corrupted)?;

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let aad = aad(blob.version, slot);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| StoreError::Corrupted)?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| StoreError::Corrupted)
}

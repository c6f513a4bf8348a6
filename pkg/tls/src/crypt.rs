//! Adapters binding the primitive library (hashes, HMAC, block and AEAD
//! ciphers, randomness) to the algorithm identifiers used by the cipher
//! suite catalogue. All protocol logic lives above this layer; nothing in
//! here knows about records or handshakes.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use md5::Md5;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};

use crate::alert::AlertDescription;
use crate::errors::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    None,
    Md5,
    Sha1,
    Sha256,
    Sha384,
}

fn digest_parts<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

macro_rules! hmac_parts {
    ($digest:ty, $key:expr, $parts:expr) => {{
        let mut mac =
            <Hmac<$digest> as Mac>::new_from_slice($key).expect("HMAC accepts any key length");
        for part in $parts {
            mac.update(part);
        }
        mac.finalize().into_bytes().to_vec()
    }};
}

impl HashAlgorithm {
    pub fn output_size(&self) -> usize {
        match self {
            HashAlgorithm::None => 0,
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }

    /// One-shot digest over the concatenation of 'parts'.
    pub fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            HashAlgorithm::None => Vec::new(),
            HashAlgorithm::Md5 => digest_parts::<Md5>(parts),
            HashAlgorithm::Sha1 => digest_parts::<Sha1>(parts),
            HashAlgorithm::Sha256 => digest_parts::<Sha256>(parts),
            HashAlgorithm::Sha384 => digest_parts::<Sha384>(parts),
        }
    }

    /// One-shot HMAC over the concatenation of 'parts'.
    pub fn hmac(&self, key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
        match self {
            HashAlgorithm::None => Vec::new(),
            HashAlgorithm::Md5 => hmac_parts!(Md5, key, parts),
            HashAlgorithm::Sha1 => hmac_parts!(Sha1, key, parts),
            HashAlgorithm::Sha256 => hmac_parts!(Sha256, key, parts),
            HashAlgorithm::Sha384 => hmac_parts!(Sha384, key, parts),
        }
    }
}

/// AES in raw block mode. The CBC chaining and TLS padding around it are
/// record-protection logic and live in the codec.
pub enum BlockCipher {
    Aes128(aes::Aes128),
    Aes256(aes::Aes256),
}

impl BlockCipher {
    pub fn new_aes(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Ok(BlockCipher::Aes128(
                aes::Aes128::new_from_slice(key).expect("checked length"),
            )),
            32 => Ok(BlockCipher::Aes256(
                aes::Aes256::new_from_slice(key).expect("checked length"),
            )),
            _ => Err(Error::alert(
                AlertDescription::internal_error,
                "unsupported AES key size",
            )),
        }
    }

    pub fn block_size(&self) -> usize {
        16
    }

    pub fn encrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            BlockCipher::Aes128(c) => c.encrypt_block(block),
            BlockCipher::Aes256(c) => c.encrypt_block(block),
        }
    }

    pub fn decrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            BlockCipher::Aes128(c) => c.decrypt_block(block),
            BlockCipher::Aes256(c) => c.decrypt_block(block),
        }
    }
}

pub const GCM_TAG_SIZE: usize = 16;
pub const GCM_NONCE_SIZE: usize = 12;

/// AES-GCM with a full 12-byte nonce. The record codec is responsible for
/// assembling the nonce from the implicit and explicit parts.
pub enum AeadCipher {
    Aes128Gcm(Aes128Gcm),
    Aes256Gcm(Aes256Gcm),
}

impl AeadCipher {
    pub fn new_aes_gcm(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Ok(AeadCipher::Aes128Gcm(
                Aes128Gcm::new_from_slice(key).expect("checked length"),
            )),
            32 => Ok(AeadCipher::Aes256Gcm(
                Aes256Gcm::new_from_slice(key).expect("checked length"),
            )),
            _ => Err(Error::alert(
                AlertDescription::internal_error,
                "unsupported AES-GCM key size",
            )),
        }
    }

    pub fn tag_size(&self) -> usize {
        GCM_TAG_SIZE
    }

    /// Returns ciphertext with the authentication tag appended.
    pub fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let result = match self {
            AeadCipher::Aes128Gcm(c) => c.encrypt(nonce, payload),
            AeadCipher::Aes256Gcm(c) => c.encrypt(nonce, payload),
        };
        result.map_err(|_| {
            Error::alert(AlertDescription::internal_error, "AEAD encryption failed")
        })
    }

    /// Verifies the trailing tag and returns the plaintext.
    pub fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        let result = match self {
            AeadCipher::Aes128Gcm(c) => c.decrypt(nonce, payload),
            AeadCipher::Aes256Gcm(c) => c.decrypt(nonce, payload),
        };
        result.map_err(|_| {
            Error::alert(
                AlertDescription::bad_record_mac,
                "AEAD tag verification failed",
            )
        })
    }
}

pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut out = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

/// A 32-byte hello random. For TLS 1.0/1.1 the leading four bytes carry the
/// wall clock in unix seconds.
pub fn hello_random(with_timestamp: bool) -> [u8; 32] {
    let mut out = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut out);
    if with_timestamp {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        out[0..4].copy_from_slice(&now.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_digest_matches_known_vector() {
        // SHA-256("abc")
        let expected: [u8; 32] = [
            0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
            0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
            0xf2, 0x00, 0x15, 0xad,
        ];
        assert_eq!(HashAlgorithm::Sha256.digest(&[b"a", b"bc"]), expected);
    }

    #[test]
    fn hmac_md5_matches_rfc2202_vector() {
        // RFC 2202 test case 2.
        let out = HashAlgorithm::Md5.hmac(b"Jefe", &[b"what do ya want ", b"for nothing?"]);
        let expected: [u8; 16] = [
            0x75, 0x0c, 0x78, 0x3e, 0x6a, 0xb0, 0xb5, 0x03, 0xea, 0xa8, 0x6e, 0x31, 0x0a, 0x5d,
            0xb7, 0x38,
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn aes_block_round_trip() {
        let cipher = BlockCipher::new_aes(&[0x42u8; 16]).unwrap();
        let mut block = *b"0123456789abcdef";
        let original = block;
        cipher.encrypt_block(&mut block);
        assert_ne!(block, original);
        cipher.decrypt_block(&mut block);
        assert_eq!(block, original);
    }

    #[test]
    fn gcm_seal_open_round_trip() {
        let aead = AeadCipher::new_aes_gcm(&[7u8; 16]).unwrap();
        let nonce = [1u8; 12];
        let sealed = aead.seal(&nonce, b"aad", b"payload").unwrap();
        assert_eq!(sealed.len(), 7 + GCM_TAG_SIZE);
        assert_eq!(aead.open(&nonce, b"aad", &sealed).unwrap(), b"payload");
        assert!(aead.open(&nonce, b"bad", &sealed).is_err());
    }
}

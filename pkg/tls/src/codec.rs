//! Record protection for one direction within one epoch. Block and stream
//! suites run MAC-then-encrypt; GCM suites run AEAD with the explicit
//! nonce layout of RFC 5288. A codec never advances sequence numbers
//! itself; the connection state owns the counters and passes each value in.

use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::cipher_suite::{CipherAlgorithm, CipherMode, SuiteInfo};
use crate::crypt::{random_bytes, AeadCipher, BlockCipher, HashAlgorithm, GCM_TAG_SIZE};
use crate::errors::{Error, Result};
use crate::rc4::Rc4;
use crate::record::{ContentType, ProtocolVersion, Record};
use crate::utils::{constant_time_eq, xor_inplace};

/// Explicit part of the AEAD nonce carried in front of every GCM record.
const AEAD_EXPLICIT_NONCE_SIZE: usize = 8;

/// Keyed HMAC over the pseudo-header and fragment of one record.
pub struct MacContext {
    hash: HashAlgorithm,
    key: Vec<u8>,
}

impl MacContext {
    pub fn new(hash: HashAlgorithm, key: &[u8]) -> Self {
        Self {
            hash,
            key: key.to_vec(),
        }
    }

    pub fn output_size(&self) -> usize {
        self.hash.output_size()
    }

    fn compute(&self, seq: u64, typ: ContentType, version: ProtocolVersion, data: &[u8]) -> Vec<u8> {
        let header = pseudo_header(seq, typ, version, data.len());
        self.hash.hmac(&self.key, &[&header, data])
    }
}

/// seq_num || type || version || length. Prefixes the MAC input for HMAC
/// suites and forms the additional data for AEAD suites.
fn pseudo_header(seq: u64, typ: ContentType, version: ProtocolVersion, len: usize) -> [u8; 13] {
    let mut out = [0u8; 13];
    out[0..8].copy_from_slice(&seq.to_be_bytes());
    out[8] = typ.to_u8();
    out[9] = version.major;
    out[10] = version.minor;
    out[11..13].copy_from_slice(&(len as u16).to_be_bytes());
    out
}

fn cbc_encrypt(cipher: &BlockCipher, chain: &mut [u8], data: &mut [u8]) {
    let bs = cipher.block_size();
    for block in data.chunks_exact_mut(bs) {
        xor_inplace(chain, block);
        cipher.encrypt_block(block);
        chain.copy_from_slice(block);
    }
}

fn cbc_decrypt(cipher: &BlockCipher, chain: &mut [u8], data: &mut [u8]) {
    let bs = cipher.block_size();
    for block in data.chunks_exact_mut(bs) {
        let saved = block.to_vec();
        cipher.decrypt_block(block);
        xor_inplace(chain, block);
        chain.copy_from_slice(&saved);
    }
}

/// One direction's record protection. Constructed on ChangeCipherSpec from
/// that direction's key block slices and replaced wholesale on the next
/// epoch.
pub enum RecordCodec {
    /// NULL cipher with an HMAC (the RSA_WITH_NULL_* suites).
    NullWithMac { mac: MacContext },
    Stream { cipher: Rc4, mac: MacContext },
    Block {
        cipher: BlockCipher,
        mac: MacContext,
        /// CBC chain state for the implicit-IV layout; unused when
        /// 'explicit_iv' is set.
        chain: Vec<u8>,
        explicit_iv: bool,
    },
    Aead {
        cipher: AeadCipher,
        implicit_iv: Vec<u8>,
    },
}

impl RecordCodec {
    /// Builds the codec for one direction of 'info'. Returns None for the
    /// all-null suite, which protects nothing.
    pub fn from_suite(
        info: &SuiteInfo,
        key: &[u8],
        iv: &[u8],
        mac_key: &[u8],
    ) -> Result<Option<RecordCodec>> {
        let codec = match (info.cipher, info.mode) {
            (CipherAlgorithm::None, _) => {
                if !info.uses_hmac {
                    return Ok(None);
                }
                RecordCodec::NullWithMac {
                    mac: MacContext::new(info.hash, mac_key),
                }
            }
            (CipherAlgorithm::Rc4, _) => RecordCodec::Stream {
                cipher: Rc4::new(key),
                mac: MacContext::new(info.hash, mac_key),
            },
            (CipherAlgorithm::Aes, CipherMode::Cbc) => RecordCodec::Block {
                cipher: BlockCipher::new_aes(key)?,
                mac: MacContext::new(info.hash, mac_key),
                chain: iv.to_vec(),
                explicit_iv: false,
            },
            (CipherAlgorithm::Aes, CipherMode::CbcExplicitIv) => RecordCodec::Block {
                cipher: BlockCipher::new_aes(key)?,
                mac: MacContext::new(info.hash, mac_key),
                chain: vec![],
                explicit_iv: true,
            },
            (CipherAlgorithm::Aes, CipherMode::Gcm) => RecordCodec::Aead {
                cipher: AeadCipher::new_aes_gcm(key)?,
                implicit_iv: iv.to_vec(),
            },
            _ => {
                return Err(Error::alert(
                    AlertDescription::internal_error,
                    "cipher suite row has no codec mapping",
                ));
            }
        };
        Ok(Some(codec))
    }

    /// MAC-then-encrypt (or AEAD-seal) one plaintext record.
    pub fn encode(&mut self, seq: u64, record: Record) -> Result<Record> {
        let Record { typ, version, body } = record;

        let protected = match self {
            RecordCodec::NullWithMac { mac } => {
                let tag = mac.compute(seq, typ, version, &body);
                let mut out = body.to_vec();
                out.extend_from_slice(&tag);
                out
            }
            RecordCodec::Stream { cipher, mac } => {
                let tag = mac.compute(seq, typ, version, &body);
                let mut out = body.to_vec();
                out.extend_from_slice(&tag);
                cipher.process(&mut out);
                out
            }
            RecordCodec::Block {
                cipher,
                mac,
                chain,
                explicit_iv,
            } => {
                let tag = mac.compute(seq, typ, version, &body);
                let mut buf = body.to_vec();
                buf.extend_from_slice(&tag);

                // Pad with 'pad' repeated pad + 1 times up to a block
                // multiple.
                let bs = cipher.block_size();
                let pad = bs - ((buf.len() + 1) % bs);
                for _ in 0..=pad {
                    buf.push(pad as u8);
                }
                debug_assert_eq!(buf.len() % bs, 0);

                if *explicit_iv {
                    // Fresh per-record IV, sent in the clear ahead of the
                    // ciphertext.
                    let iv = random_bytes(bs);
                    let mut chain_state = iv.clone();
                    cbc_encrypt(cipher, &mut chain_state, &mut buf);

                    let mut out = iv;
                    out.extend_from_slice(&buf);
                    out
                } else {
                    cbc_encrypt(cipher, chain, &mut buf);
                    buf
                }
            }
            RecordCodec::Aead {
                cipher,
                implicit_iv,
            } => {
                let explicit = random_bytes(AEAD_EXPLICIT_NONCE_SIZE);
                let mut nonce = implicit_iv.clone();
                nonce.extend_from_slice(&explicit);

                let aad = pseudo_header(seq, typ, version, body.len());
                let sealed = cipher.seal(&nonce, &aad, &body)?;

                let mut out = explicit;
                out.extend_from_slice(&sealed);
                out
            }
        };

        Ok(Record {
            typ,
            version,
            body: Bytes::from(protected),
        })
    }

    /// Decrypt and verify one record. Every cryptographic failure maps to
    /// bad_record_mac so nothing about padding validity leaks.
    pub fn decode(&mut self, seq: u64, record: Record) -> Result<Record> {
        let Record { typ, version, body } = record;

        let plaintext = match self {
            RecordCodec::NullWithMac { mac } => split_and_verify_mac(
                mac,
                seq,
                typ,
                version,
                body.to_vec(),
            )?,
            RecordCodec::Stream { cipher, mac } => {
                let mut buf = body.to_vec();
                cipher.process(&mut buf);
                split_and_verify_mac(mac, seq, typ, version, buf)?
            }
            RecordCodec::Block {
                cipher,
                mac,
                chain,
                explicit_iv,
            } => {
                let bs = cipher.block_size();
                let min_len = if *explicit_iv { 2 * bs } else { bs };
                if body.is_empty() || body.len() % bs != 0 || body.len() < min_len {
                    return Err(bad_record_mac("ciphertext is not block aligned"));
                }

                let mut buf = body.to_vec();
                let plaintext = if *explicit_iv {
                    let mut iv = buf[..bs].to_vec();
                    let mut rest = buf.split_off(bs);
                    cbc_decrypt(cipher, &mut iv, &mut rest);
                    rest
                } else {
                    cbc_decrypt(cipher, chain, &mut buf);
                    buf
                };

                // Too short to hold a MAC and one padding byte. Lengths are
                // public, so rejecting here leaks nothing.
                let total = plaintext.len();
                let mac_size = mac.output_size();
                if total < mac_size + 1 {
                    return Err(bad_record_mac("record shorter than its MAC"));
                }

                // Padding and MAC are both evaluated before either verdict
                // is acted on.
                let pad = plaintext[total - 1] as usize;

                let mut pad_ok = pad + 1 + mac_size <= total;
                if pad_ok {
                    let mut acc = 0u8;
                    for byte in &plaintext[total - 1 - pad..] {
                        acc |= byte ^ (pad as u8);
                    }
                    pad_ok = acc == 0;
                }

                let content_len = if pad_ok { total - pad - 1 - mac_size } else { 0 };
                let content = &plaintext[..content_len];
                let given = &plaintext[content_len..content_len + mac_size];
                let expected = mac.compute(seq, typ, version, content);
                let mac_ok = constant_time_eq(given, &expected);

                if !(pad_ok && mac_ok) {
                    return Err(bad_record_mac("record verification failed"));
                }

                content.to_vec()
            }
            RecordCodec::Aead {
                cipher,
                implicit_iv,
            } => {
                let overhead = AEAD_EXPLICIT_NONCE_SIZE + GCM_TAG_SIZE;
                if body.len() < overhead {
                    return Err(Error::alert(
                        AlertDescription::decode_error,
                        "AEAD record too short for nonce and tag",
                    ));
                }

                let (explicit, ciphertext) = body.split_at(AEAD_EXPLICIT_NONCE_SIZE);
                let mut nonce = implicit_iv.clone();
                nonce.extend_from_slice(explicit);

                let plaintext_len = ciphertext.len() - GCM_TAG_SIZE;
                let aad = pseudo_header(seq, typ, version, plaintext_len);
                cipher.open(&nonce, &aad, ciphertext)?
            }
        };

        Ok(Record {
            typ,
            version,
            body: Bytes::from(plaintext),
        })
    }
}

fn bad_record_mac(context: &'static str) -> Error {
    Error::alert(AlertDescription::bad_record_mac, context)
}

fn split_and_verify_mac(
    mac: &MacContext,
    seq: u64,
    typ: ContentType,
    version: ProtocolVersion,
    buf: Vec<u8>,
) -> Result<Vec<u8>> {
    let mac_size = mac.output_size();
    if buf.len() < mac_size {
        return Err(bad_record_mac("record shorter than its MAC"));
    }

    let content_len = buf.len() - mac_size;
    let expected = mac.compute(seq, typ, version, &buf[..content_len]);
    if !constant_time_eq(&buf[content_len..], &expected) {
        return Err(bad_record_mac("record MAC mismatch"));
    }

    let mut out = buf;
    out.truncate(content_len);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher_suite::{
        self, TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_128_GCM_SHA256,
        TLS_RSA_WITH_AES_256_CBC_SHA256, TLS_RSA_WITH_NULL_SHA, TLS_RSA_WITH_RC4_128_MD5,
    };
    use crate::record::{TLS_1_0, TLS_1_1, TLS_1_2};

    /// Builds matching encode/decode codecs for one direction of a suite.
    fn codec_pair(code: u16, version: ProtocolVersion) -> (RecordCodec, RecordCodec) {
        let info = cipher_suite::info(code, version).unwrap();
        let key = vec![0x11u8; info.key_size];
        let iv = vec![0x22u8; info.iv_size];
        let mac_key = vec![0x33u8; info.mac_size()];

        let enc = RecordCodec::from_suite(info, &key, &iv, &mac_key)
            .unwrap()
            .unwrap();
        let dec = RecordCodec::from_suite(info, &key, &iv, &mac_key)
            .unwrap()
            .unwrap();
        (enc, dec)
    }

    fn plaintext_record(version: ProtocolVersion, body: &'static [u8]) -> Record {
        Record {
            typ: ContentType::application_data,
            version,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn round_trip_all_protected_suites() {
        let cases = [
            (TLS_RSA_WITH_NULL_SHA, TLS_1_2),
            (TLS_RSA_WITH_RC4_128_MD5, TLS_1_0),
            (TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_0),
            (TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_1),
            (TLS_RSA_WITH_AES_256_CBC_SHA256, TLS_1_2),
            (TLS_RSA_WITH_AES_128_GCM_SHA256, TLS_1_2),
        ];

        for (code, version) in cases {
            let (mut enc, mut dec) = codec_pair(code, version);
            for seq in 0..3u64 {
                let record = plaintext_record(version, b"attack at dawn");
                let protected = enc.encode(seq, record.clone()).unwrap();
                if code != TLS_RSA_WITH_NULL_SHA {
                    assert!(!protected.body.starts_with(b"attack"), "{:#06x}", code);
                }
                let opened = dec.decode(seq, protected).unwrap();
                assert_eq!(opened, record, "{:#06x} at {}", code, version);
            }
        }
    }

    #[test]
    fn explicit_iv_layout_differs_from_implicit() {
        // 14 bytes + 20 MAC + padding = 48; the 1.1 layout prepends a
        // 16-byte IV on top of that.
        let (mut enc10, _) = codec_pair(TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_0);
        let out10 = enc10
            .encode(0, plaintext_record(TLS_1_0, b"attack at dawn"))
            .unwrap();
        assert_eq!(out10.body.len(), 48);

        let (mut enc11, _) = codec_pair(TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_1);
        let out11 = enc11
            .encode(0, plaintext_record(TLS_1_1, b"attack at dawn"))
            .unwrap();
        assert_eq!(out11.body.len(), 16 + 48);
    }

    #[test]
    fn zero_length_plaintext_is_legal() {
        let (mut enc, mut dec) = codec_pair(TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_2);
        let protected = enc.encode(0, plaintext_record(TLS_1_2, b"")).unwrap();
        // IV + MAC + padding only.
        assert_eq!(protected.body.len(), 16 + 32);
        let opened = dec.decode(0, protected).unwrap();
        assert!(opened.body.is_empty());
    }

    #[test]
    fn flipped_ciphertext_byte_maps_to_bad_record_mac() {
        let (mut enc, mut dec) = codec_pair(TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_2);
        let mut protected = enc
            .encode(0, plaintext_record(TLS_1_2, b"ABCDEFGHIJKLMNOP"))
            .unwrap();

        let mut tampered = protected.body.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        protected.body = Bytes::from(tampered);

        match dec.decode(0, protected) {
            Err(Error::Alert { description, .. }) => {
                assert_eq!(description, AlertDescription::bad_record_mac)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn replayed_gcm_record_fails_tag_verification() {
        let (mut enc, mut dec) = codec_pair(TLS_RSA_WITH_AES_128_GCM_SHA256, TLS_1_2);
        let protected = enc
            .encode(0, plaintext_record(TLS_1_2, b"hello"))
            .unwrap();

        assert!(dec.decode(0, protected.clone()).is_ok());

        // Replaying the same record under the next sequence number changes
        // the additional data, so the tag no longer verifies.
        match dec.decode(1, protected) {
            Err(Error::Alert { description, .. }) => {
                assert_eq!(description, AlertDescription::bad_record_mac)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn stream_suite_rejects_wrong_sequence() {
        let (mut enc, mut dec) = codec_pair(TLS_RSA_WITH_RC4_128_MD5, TLS_1_1);
        let protected = enc
            .encode(4, plaintext_record(TLS_1_1, b"payload"))
            .unwrap();
        assert!(dec.decode(5, protected).is_err());
    }

    #[test]
    fn truncated_records_are_rejected() {
        let (_, mut dec) = codec_pair(TLS_RSA_WITH_NULL_SHA, TLS_1_2);
        let short = Record {
            typ: ContentType::application_data,
            version: TLS_1_2,
            body: Bytes::from_static(&[0u8; 10]),
        };
        assert!(dec.decode(0, short).is_err());

        let (_, mut dec) = codec_pair(TLS_RSA_WITH_AES_128_GCM_SHA256, TLS_1_2);
        let short = Record {
            typ: ContentType::application_data,
            version: TLS_1_2,
            body: Bytes::from_static(&[0u8; 10]),
        };
        assert!(dec.decode(0, short).is_err());
    }

    #[test]
    fn implicit_iv_chains_across_records() {
        // Identical plaintext must not produce identical ciphertext once
        // the chain has advanced.
        let (mut enc, mut dec) = codec_pair(TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_0);
        let first = enc
            .encode(0, plaintext_record(TLS_1_0, b"same bytes here!"))
            .unwrap();
        let second = enc
            .encode(1, plaintext_record(TLS_1_0, b"same bytes here!"))
            .unwrap();
        assert_ne!(first.body, second.body);

        assert_eq!(dec.decode(0, first).unwrap().body.as_ref(), b"same bytes here!");
        assert_eq!(dec.decode(1, second).unwrap().body.as_ref(), b"same bytes here!");
    }
}

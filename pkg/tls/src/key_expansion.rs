//! The version-parametric PRF and the derivations built on it: master
//! secret, key block expansion and Finished verify data.

use crate::crypt::HashAlgorithm;
use crate::record::ProtocolVersion;

pub const MASTER_SECRET_SIZE: usize = 48;
pub const VERIFY_DATA_SIZE: usize = 12;

pub const LABEL_MASTER_SECRET: &[u8] = b"master secret";
pub const LABEL_KEY_EXPANSION: &[u8] = b"key expansion";
pub const LABEL_CLIENT_FINISHED: &[u8] = b"client finished";
pub const LABEL_SERVER_FINISHED: &[u8] = b"server finished";

/// The TLS pseudo-random function. TLS 1.0/1.1 split the secret in half and
/// XOR a P_MD5 stream with a P_SHA1 stream; TLS 1.2 runs a single P_hash
/// under the suite's PRF hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prf {
    Legacy,
    PHash(HashAlgorithm),
}

impl Prf {
    pub fn for_version(version: ProtocolVersion, suite_prf_hash: HashAlgorithm) -> Self {
        if version.is_legacy() {
            Prf::Legacy
        } else {
            Prf::PHash(suite_prf_hash)
        }
    }

    pub fn evaluate(&self, secret: &[u8], label: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
        let mut label_seed = Vec::with_capacity(label.len() + seed.len());
        label_seed.extend_from_slice(label);
        label_seed.extend_from_slice(seed);

        match self {
            Prf::Legacy => {
                // The secret splits into two halves of ceil(len / 2) bytes
                // which overlap by one byte when the length is odd.
                let half = (secret.len() + 1) / 2;
                let s1 = &secret[..half];
                let s2 = &secret[secret.len() - half..];

                let mut out = p_hash(HashAlgorithm::Md5, s1, &label_seed, out_len);
                let sha = p_hash(HashAlgorithm::Sha1, s2, &label_seed, out_len);
                crate::utils::xor_inplace(&sha, &mut out);
                out
            }
            Prf::PHash(hash) => p_hash(*hash, secret, &label_seed, out_len),
        }
    }
}

/// P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) +
///                        HMAC_hash(secret, A(2) + seed) + ...
/// where A(0) = seed and A(i) = HMAC_hash(secret, A(i-1)).
fn p_hash(hash: HashAlgorithm, secret: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut a = hash.hmac(secret, &[seed]);
    let mut out = Vec::with_capacity(out_len + hash.output_size());

    while out.len() < out_len {
        out.extend_from_slice(&hash.hmac(secret, &[&a, seed]));
        a = hash.hmac(secret, &[&a]);
    }

    out.truncate(out_len);
    out
}

/// master_secret = PRF(premaster, "master secret",
///                     client_random + server_random)[0..48]
pub fn master_secret(
    prf: Prf,
    premaster: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Vec<u8> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    prf.evaluate(premaster, LABEL_MASTER_SECRET, &seed, MASTER_SECRET_SIZE)
}

/// key_block = PRF(master, "key expansion", server_random + client_random).
/// The randoms swap sides relative to the master secret derivation.
pub fn key_block(
    prf: Prf,
    master: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    out_len: usize,
) -> Vec<u8> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);
    prf.evaluate(master, LABEL_KEY_EXPANSION, &seed, out_len)
}

/// The 12-byte Finished payload for one side, bound to the transcript hash.
pub fn verify_data(prf: Prf, master: &[u8], from_server: bool, transcript_hash: &[u8]) -> Vec<u8> {
    let label = if from_server {
        LABEL_SERVER_FINISHED
    } else {
        LABEL_CLIENT_FINISHED
    };
    prf.evaluate(master, label, transcript_hash, VERIFY_DATA_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prf_is_deterministic_and_sized() {
        for prf in [
            Prf::Legacy,
            Prf::PHash(HashAlgorithm::Sha256),
            Prf::PHash(HashAlgorithm::Sha384),
        ] {
            for len in [0usize, 1, 12, 48, 104, 200] {
                let a = prf.evaluate(b"secret", b"label", b"seed", len);
                let b = prf.evaluate(b"secret", b"label", b"seed", len);
                assert_eq!(a.len(), len);
                assert_eq!(a, b);
            }

            let other = prf.evaluate(b"secret", b"label", b"seeD", 48);
            assert_ne!(other, prf.evaluate(b"secret", b"label", b"seed", 48));
        }
    }

    #[test]
    fn tls12_prf_matches_reference_vector() {
        // Widely circulated P_SHA256 reference vector.
        let secret = [
            0x9b, 0xbe, 0x43, 0x6b, 0xa9, 0x40, 0xf0, 0x17, 0xb1, 0x76, 0x52, 0x84, 0x9a, 0x71,
            0xdb, 0x35,
        ];
        let seed = [
            0xa0, 0xba, 0x9f, 0x93, 0x6c, 0xda, 0x31, 0x18, 0x27, 0xa6, 0xf7, 0x96, 0xff, 0xd5,
            0x19, 0x8c,
        ];
        let out = Prf::PHash(HashAlgorithm::Sha256).evaluate(&secret, b"test label", &seed, 100);
        let expected_head = [
            0xe3, 0xf2, 0x29, 0xba, 0x72, 0x7b, 0xe1, 0x7b, 0x8d, 0x12, 0x26, 0x20, 0x55, 0x7c,
            0xd4, 0x53,
        ];
        assert_eq!(&out[..16], &expected_head);
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn legacy_prf_differs_from_tls12() {
        let a = Prf::Legacy.evaluate(b"secret", b"label", b"seed", 48);
        let b = Prf::PHash(HashAlgorithm::Sha256).evaluate(b"secret", b"label", b"seed", 48);
        assert_ne!(a, b);
    }

    #[test]
    fn legacy_prf_handles_odd_secret_lengths() {
        // 5-byte secret: halves are bytes 0..3 and 2..5.
        let out = Prf::Legacy.evaluate(&[1, 2, 3, 4, 5], b"l", b"s", 16);
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn master_secret_is_48_bytes_and_role_ordered() {
        let prf = Prf::PHash(HashAlgorithm::Sha256);
        let cr = [1u8; 32];
        let sr = [2u8; 32];
        let ms = master_secret(prf, &[3u8; 48], &cr, &sr);
        assert_eq!(ms.len(), MASTER_SECRET_SIZE);

        // The key expansion seed uses the opposite random order; with
        // identical lengths the outputs must differ.
        let kb = key_block(prf, &ms, &cr, &sr, 48);
        let swapped = key_block(prf, &ms, &sr, &cr, 48);
        assert_ne!(kb, swapped);
    }

    #[test]
    fn verify_data_binds_role_and_transcript() {
        let prf = Prf::PHash(HashAlgorithm::Sha256);
        let master = [7u8; 48];
        let hash = [9u8; 32];
        let client = verify_data(prf, &master, false, &hash);
        let server = verify_data(prf, &master, true, &hash);
        assert_eq!(client.len(), VERIFY_DATA_SIZE);
        assert_ne!(client, server);
        assert_ne!(client, verify_data(prf, &master, false, &[8u8; 32]));
    }
}

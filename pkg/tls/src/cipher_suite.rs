//! Static catalogue of the supported cipher suites and the negotiation
//! helpers over it. Row order is the server's preference order.

use crate::crypt::HashAlgorithm;
use crate::options::TlsParams;
use crate::record::{ProtocolVersion, TLS_1_0, TLS_1_1, TLS_1_2};

// rfc 2246
pub const TLS_NULL_WITH_NULL_NULL: u16 = 0x0000;
pub const TLS_RSA_WITH_NULL_MD5: u16 = 0x0001;
pub const TLS_RSA_WITH_NULL_SHA: u16 = 0x0002;
pub const TLS_RSA_WITH_RC4_128_MD5: u16 = 0x0004;
pub const TLS_RSA_WITH_RC4_128_SHA: u16 = 0x0005;
// rfc 3268
pub const TLS_RSA_WITH_AES_128_CBC_SHA: u16 = 0x002F;
pub const TLS_RSA_WITH_AES_256_CBC_SHA: u16 = 0x0035;
// rfc 5246
pub const TLS_RSA_WITH_AES_128_CBC_SHA256: u16 = 0x003C;
pub const TLS_RSA_WITH_AES_256_CBC_SHA256: u16 = 0x003D;
// rfc 5288
pub const TLS_RSA_WITH_AES_128_GCM_SHA256: u16 = 0x009C;
pub const TLS_RSA_WITH_AES_256_GCM_SHA384: u16 = 0x009D;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyExchange {
    None,
    Rsa,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherAlgorithm {
    None,
    Rc4,
    Aes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherMode {
    None,
    /// CBC with the IV taken from the key block (TLS 1.0).
    Cbc,
    /// CBC with a fresh per-record IV on the wire (TLS 1.1+).
    CbcExplicitIv,
    Gcm,
}

/// One row of the catalogue. CBC suites appear twice: the TLS 1.0 row draws
/// its IV from the key block while the 1.1+ row uses an explicit IV and
/// reserves no key block bytes for it.
#[derive(Debug)]
pub struct SuiteInfo {
    pub name: &'static str,
    pub code: u16,
    pub min_version: ProtocolVersion,
    pub max_version: ProtocolVersion,
    pub key_exchange: KeyExchange,
    pub cipher: CipherAlgorithm,
    pub mode: CipherMode,
    pub key_size: usize,
    pub block_size: usize,
    pub iv_size: usize,
    pub hash: HashAlgorithm,
    pub hash_size: usize,
    pub uses_hmac: bool,
    pub requires_certificate: bool,
}

impl SuiteInfo {
    pub fn supports_version(&self, version: ProtocolVersion) -> bool {
        version >= self.min_version && version <= self.max_version
    }

    /// MAC key bytes drawn from the key block. Zero for AEAD suites.
    pub fn mac_size(&self) -> usize {
        if self.uses_hmac {
            self.hash_size
        } else {
            0
        }
    }

    /// Hash driving the TLS 1.2 PRF and transcript for this suite.
    pub fn prf_hash(&self) -> HashAlgorithm {
        if self.hash == HashAlgorithm::Sha384 {
            HashAlgorithm::Sha384
        } else {
            HashAlgorithm::Sha256
        }
    }

    pub fn is_null(&self) -> bool {
        self.cipher == CipherAlgorithm::None
    }
}

pub const SUITE_CATALOG: &[SuiteInfo] = &[
    SuiteInfo {
        name: "TLS_NULL_WITH_NULL_NULL",
        code: TLS_NULL_WITH_NULL_NULL,
        min_version: TLS_1_0,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::None,
        cipher: CipherAlgorithm::None,
        mode: CipherMode::None,
        key_size: 0,
        block_size: 0,
        iv_size: 0,
        hash: HashAlgorithm::None,
        hash_size: 0,
        uses_hmac: false,
        requires_certificate: false,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_NULL_MD5",
        code: TLS_RSA_WITH_NULL_MD5,
        min_version: TLS_1_0,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::None,
        mode: CipherMode::None,
        key_size: 0,
        block_size: 0,
        iv_size: 0,
        hash: HashAlgorithm::Md5,
        hash_size: 16,
        uses_hmac: true,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_NULL_SHA",
        code: TLS_RSA_WITH_NULL_SHA,
        min_version: TLS_1_0,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::None,
        mode: CipherMode::None,
        key_size: 0,
        block_size: 0,
        iv_size: 0,
        hash: HashAlgorithm::Sha1,
        hash_size: 20,
        uses_hmac: true,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_AES_128_CBC_SHA",
        code: TLS_RSA_WITH_AES_128_CBC_SHA,
        min_version: TLS_1_0,
        max_version: TLS_1_0,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Aes,
        mode: CipherMode::Cbc,
        key_size: 16,
        block_size: 16,
        iv_size: 16,
        hash: HashAlgorithm::Sha1,
        hash_size: 20,
        uses_hmac: true,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_AES_128_CBC_SHA",
        code: TLS_RSA_WITH_AES_128_CBC_SHA,
        min_version: TLS_1_1,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Aes,
        mode: CipherMode::CbcExplicitIv,
        key_size: 16,
        block_size: 16,
        iv_size: 0,
        hash: HashAlgorithm::Sha1,
        hash_size: 20,
        uses_hmac: true,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_AES_256_CBC_SHA",
        code: TLS_RSA_WITH_AES_256_CBC_SHA,
        min_version: TLS_1_0,
        max_version: TLS_1_0,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Aes,
        mode: CipherMode::Cbc,
        key_size: 32,
        block_size: 16,
        iv_size: 16,
        hash: HashAlgorithm::Sha1,
        hash_size: 20,
        uses_hmac: true,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_AES_256_CBC_SHA",
        code: TLS_RSA_WITH_AES_256_CBC_SHA,
        min_version: TLS_1_1,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Aes,
        mode: CipherMode::CbcExplicitIv,
        key_size: 32,
        block_size: 16,
        iv_size: 0,
        hash: HashAlgorithm::Sha1,
        hash_size: 20,
        uses_hmac: true,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_AES_128_CBC_SHA256",
        code: TLS_RSA_WITH_AES_128_CBC_SHA256,
        min_version: TLS_1_2,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Aes,
        mode: CipherMode::CbcExplicitIv,
        key_size: 16,
        block_size: 16,
        iv_size: 0,
        hash: HashAlgorithm::Sha256,
        hash_size: 32,
        uses_hmac: true,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_AES_256_CBC_SHA256",
        code: TLS_RSA_WITH_AES_256_CBC_SHA256,
        min_version: TLS_1_2,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Aes,
        mode: CipherMode::CbcExplicitIv,
        key_size: 32,
        block_size: 16,
        iv_size: 0,
        hash: HashAlgorithm::Sha256,
        hash_size: 32,
        uses_hmac: true,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_AES_128_GCM_SHA256",
        code: TLS_RSA_WITH_AES_128_GCM_SHA256,
        min_version: TLS_1_2,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Aes,
        mode: CipherMode::Gcm,
        key_size: 16,
        block_size: 16,
        iv_size: 4,
        hash: HashAlgorithm::Sha256,
        hash_size: 32,
        uses_hmac: false,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_AES_256_GCM_SHA384",
        code: TLS_RSA_WITH_AES_256_GCM_SHA384,
        min_version: TLS_1_2,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Aes,
        mode: CipherMode::Gcm,
        key_size: 32,
        block_size: 16,
        iv_size: 4,
        hash: HashAlgorithm::Sha384,
        hash_size: 48,
        uses_hmac: false,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_RC4_128_MD5",
        code: TLS_RSA_WITH_RC4_128_MD5,
        min_version: TLS_1_0,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Rc4,
        mode: CipherMode::None,
        key_size: 16,
        block_size: 0,
        iv_size: 0,
        hash: HashAlgorithm::Md5,
        hash_size: 16,
        uses_hmac: true,
        requires_certificate: true,
    },
    SuiteInfo {
        name: "TLS_RSA_WITH_RC4_128_SHA",
        code: TLS_RSA_WITH_RC4_128_SHA,
        min_version: TLS_1_0,
        max_version: TLS_1_2,
        key_exchange: KeyExchange::Rsa,
        cipher: CipherAlgorithm::Rc4,
        mode: CipherMode::None,
        key_size: 16,
        block_size: 0,
        iv_size: 0,
        hash: HashAlgorithm::Sha1,
        hash_size: 20,
        uses_hmac: true,
        requires_certificate: true,
    },
];

/// Resolves a suite code at a given version. CBC suites resolve to the row
/// matching the version's IV layout.
pub fn info(code: u16, version: ProtocolVersion) -> Option<&'static SuiteInfo> {
    SUITE_CATALOG
        .iter()
        .find(|row| row.code == code && row.supports_version(version))
}

/// Suite codes offerable at 'version', in preference order.
pub fn candidates(version: ProtocolVersion, allow_null: bool) -> Vec<u16> {
    let mut out = vec![];
    for row in SUITE_CATALOG {
        if !row.supports_version(version) {
            continue;
        }
        if row.is_null() && !allow_null {
            continue;
        }
        if out.contains(&row.code) {
            continue;
        }
        out.push(row.code);
    }
    out
}

/// The list this endpoint is willing to negotiate: the version's
/// candidates, narrowed by the configured whitelist when one is set.
pub fn offer(version: ProtocolVersion, params: &TlsParams) -> Vec<u16> {
    let mut out = candidates(version, params.allow_null_suites);
    if let Some(allowed) = &params.cipher_suites {
        out.retain(|code| allowed.contains(code));
    }
    out
}

/// Picks the first code in local preference order that the peer also
/// offered, or TLS_NULL_WITH_NULL_NULL if there is no overlap.
pub fn locate(peer_codes: &[u16], local_codes: &[u16]) -> u16 {
    for code in local_codes {
        if peer_codes.contains(code) {
            return *code;
        }
    }
    TLS_NULL_WITH_NULL_NULL
}

pub fn name_of(code: u16) -> &'static str {
    SUITE_CATALOG
        .iter()
        .find(|row| row.code == code)
        .map(|row| row.name)
        .unwrap_or("UNKNOWN")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbc_rows_split_by_version() {
        let v10 = info(TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_0).unwrap();
        assert_eq!(v10.mode, CipherMode::Cbc);
        assert_eq!(v10.iv_size, 16);

        let v11 = info(TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_1).unwrap();
        assert_eq!(v11.mode, CipherMode::CbcExplicitIv);
        assert_eq!(v11.iv_size, 0);

        let v12 = info(TLS_RSA_WITH_AES_128_CBC_SHA, TLS_1_2).unwrap();
        assert_eq!(v12.mode, CipherMode::CbcExplicitIv);
    }

    #[test]
    fn sha256_and_gcm_suites_require_tls12() {
        assert!(info(TLS_RSA_WITH_AES_128_CBC_SHA256, TLS_1_1).is_none());
        assert!(info(TLS_RSA_WITH_AES_128_GCM_SHA256, TLS_1_1).is_none());
        assert!(info(TLS_RSA_WITH_AES_128_GCM_SHA256, TLS_1_2).is_some());
    }

    #[test]
    fn null_suites_are_filtered_unless_allowed() {
        let offered = candidates(TLS_1_2, false);
        assert!(!offered.contains(&TLS_RSA_WITH_NULL_MD5));
        assert!(!offered.contains(&TLS_NULL_WITH_NULL_NULL));

        let with_null = candidates(TLS_1_2, true);
        assert!(with_null.contains(&TLS_RSA_WITH_NULL_MD5));
    }

    #[test]
    fn locate_follows_local_preference() {
        // Local order is authoritative: 0x002F ranks above 0x0035 no matter
        // how the peer ordered its list.
        let local = candidates(TLS_1_2, false);
        let peer = [
            TLS_RSA_WITH_AES_256_CBC_SHA,
            TLS_RSA_WITH_AES_128_CBC_SHA,
        ];
        assert_eq!(locate(&peer, &local), TLS_RSA_WITH_AES_128_CBC_SHA);

        // Only null suites offered and the policy forbids them.
        let nulls = [TLS_RSA_WITH_NULL_MD5, TLS_RSA_WITH_NULL_SHA];
        assert_eq!(locate(&nulls, &local), TLS_NULL_WITH_NULL_NULL);
        assert_eq!(
            locate(&nulls, &candidates(TLS_1_2, true)),
            TLS_RSA_WITH_NULL_MD5
        );
    }

    #[test]
    fn offer_honours_the_configured_whitelist() {
        let mut params = TlsParams::default();
        assert!(offer(TLS_1_2, &params).contains(&TLS_RSA_WITH_AES_128_GCM_SHA256));

        params.cipher_suites = Some(vec![
            TLS_RSA_WITH_AES_128_CBC_SHA,
            TLS_RSA_WITH_AES_256_CBC_SHA,
        ]);
        assert_eq!(
            offer(TLS_1_2, &params),
            vec![TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_256_CBC_SHA]
        );

        // The whitelist cannot resurrect suites the policy filtered out.
        params.cipher_suites = Some(vec![TLS_RSA_WITH_NULL_MD5]);
        assert!(offer(TLS_1_2, &params).is_empty());
    }

    #[test]
    fn key_block_sizes_are_consistent() {
        for row in SUITE_CATALOG {
            let expected = 2 * (row.mac_size() + row.key_size + row.iv_size);
            assert_eq!(expected % 2, 0, "{}", row.name);
            if row.mode == CipherMode::Gcm {
                assert_eq!(row.mac_size(), 0, "{}", row.name);
                assert_eq!(row.iv_size, 4, "{}", row.name);
            }
        }
    }
}

//! Certificate chain material and the RSA premaster exchange built on it.
//! Chain validation is delegated to the surrounding runtime; this module
//! only holds the DER bytes, extracts the end-entity public key, and maps
//! the chain onto its handshake wire form.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;

use bytes::Bytes;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use rustls_pemfile::Item;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::Decode;

use crate::alert::AlertDescription;
use crate::errors::{Error, Result};

const RSA_ENCRYPTION_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// The configured (server) or received (client) certificate chain,
/// end-entity first, plus the private key when this endpoint owns one.
pub struct CertificateChain {
    certs: Vec<Bytes>,
    private_key: Option<RsaPrivateKey>,
}

impl CertificateChain {
    pub fn from_parts(certs: Vec<Bytes>, private_key: Option<RsaPrivateKey>) -> Self {
        Self { certs, private_key }
    }

    /// Loads a colon-separated list of PEM chain files plus the matching
    /// PEM private key.
    pub fn load(cert_paths: &str, key_path: &str) -> Result<Self> {
        let mut certs = vec![];
        for path in cert_paths.split(':').filter(|p| !p.is_empty()) {
            let file = File::open(path)
                .map_err(|e| Error::Config(format!("cannot open certificate {}: {}", path, e)))?;
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|e| {
                    Error::Config(format!("cannot parse certificate {}: {}", path, e))
                })?;
                certs.push(Bytes::from(cert.as_ref().to_vec()));
            }
        }

        if certs.is_empty() {
            return Err(Error::Config(format!(
                "no certificates found in '{}'",
                cert_paths
            )));
        }

        let file = File::open(key_path)
            .map_err(|e| Error::Config(format!("cannot open private key {}: {}", key_path, e)))?;
        let mut reader = BufReader::new(file);
        let private_key = read_private_key(&mut reader, key_path)?;

        Ok(Self {
            certs,
            private_key: Some(private_key),
        })
    }

    pub fn certificates(&self) -> &[Bytes] {
        &self.certs
    }

    pub fn private_key(&self) -> Option<&RsaPrivateKey> {
        self.private_key.as_ref()
    }

    /// Extracts the RSA public key from the end-entity certificate's
    /// SubjectPublicKeyInfo.
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        let der = self.certs.first().ok_or_else(|| {
            Error::alert(
                AlertDescription::handshake_failure,
                "empty certificate chain",
            )
        })?;

        let cert = x509_cert::Certificate::from_der(der).map_err(|_| {
            Error::alert(
                AlertDescription::decode_error,
                "end-entity certificate is not valid DER",
            )
        })?;

        let spki = &cert.tbs_certificate.subject_public_key_info;
        if spki.algorithm.oid != RSA_ENCRYPTION_OID {
            return Err(Error::alert(
                AlertDescription::handshake_failure,
                "end-entity certificate does not carry an RSA key",
            ));
        }

        let key_bits = spki.subject_public_key.as_bytes().ok_or_else(|| {
            Error::alert(
                AlertDescription::decode_error,
                "certificate public key has unused bits",
            )
        })?;

        RsaPublicKey::from_pkcs1_der(key_bits).map_err(|_| {
            Error::alert(
                AlertDescription::decode_error,
                "certificate public key is not a PKCS#1 RSA key",
            )
        })
    }
}

fn read_private_key(reader: &mut dyn BufRead, path: &str) -> Result<RsaPrivateKey> {
    loop {
        let item = rustls_pemfile::read_one(reader)
            .map_err(|e| Error::Config(format!("cannot parse private key {}: {}", path, e)))?;

        let key: std::result::Result<RsaPrivateKey, String> = match item {
            Some(Item::Pkcs1Key(k)) => {
                RsaPrivateKey::from_pkcs1_der(k.secret_pkcs1_der()).map_err(|e| e.to_string())
            }
            Some(Item::Pkcs8Key(k)) => {
                RsaPrivateKey::from_pkcs8_der(k.secret_pkcs8_der()).map_err(|e| e.to_string())
            }
            Some(_) => continue,
            None => {
                return Err(Error::Config(format!(
                    "no RSA private key found in '{}'",
                    path
                )));
            }
        };

        return key.map_err(|e| Error::Config(format!("invalid RSA key in '{}': {}", path, e)));
    }
}

/// RSA-encrypts the premaster secret under the server's public key.
pub fn encrypt_premaster(key: &RsaPublicKey, premaster: &[u8]) -> Result<Vec<u8>> {
    key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, premaster)
        .map_err(|_| {
            Error::alert(
                AlertDescription::internal_error,
                "premaster encryption failed",
            )
        })
}

/// Recovers the premaster secret with the server's private key. Failures
/// surface uniformly as decrypt_error.
pub fn decrypt_premaster(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    key.decrypt(Pkcs1v15Encrypt, ciphertext).map_err(|_| {
        Error::alert(
            AlertDescription::decrypt_error,
            "premaster decryption failed",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
    }

    #[test]
    fn premaster_round_trip() {
        let private = test_key();
        let public = RsaPublicKey::from(&private);

        let premaster = crate::crypt::random_bytes(48);
        let ciphertext = encrypt_premaster(&public, &premaster).unwrap();
        assert_ne!(&ciphertext, &premaster);
        assert_eq!(decrypt_premaster(&private, &ciphertext).unwrap(), premaster);
    }

    #[test]
    fn corrupted_exchange_fails_closed() {
        let private = test_key();
        let public = RsaPublicKey::from(&private);

        let mut ciphertext = encrypt_premaster(&public, &[7u8; 48]).unwrap();
        ciphertext[10] ^= 0xff;
        match decrypt_premaster(&private, &ciphertext) {
            Err(Error::Alert { description, .. }) => {
                assert_eq!(description, AlertDescription::decrypt_error)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_files_are_configuration_errors() {
        assert!(matches!(
            CertificateChain::load("/nonexistent/cert.pem", "/nonexistent/key.pem"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn empty_chain_has_no_public_key() {
        let chain = CertificateChain::from_parts(vec![], None);
        assert!(chain.public_key().is_err());
    }
}

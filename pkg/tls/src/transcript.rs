use bytes::Bytes;

use crate::crypt::HashAlgorithm;
use crate::record::ProtocolVersion;

/// Ordered concatenation of every handshake message body seen on the
/// connection, record headers excluded. Input to the Finished PRF.
#[derive(Default)]
pub struct Transcript {
    messages: Vec<Bytes>,
}

impl Transcript {
    pub fn new() -> Self {
        Self { messages: vec![] }
    }

    pub fn push(&mut self, message: Bytes) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.iter().map(|m| m.len()).sum()
    }

    /// The Finished seed for the given version: MD5 and SHA1 of the
    /// transcript concatenated for TLS 1.0/1.1, the suite's PRF hash alone
    /// for TLS 1.2.
    pub fn hash(&self, version: ProtocolVersion, prf_hash: HashAlgorithm) -> Vec<u8> {
        let parts: Vec<&[u8]> = self.messages.iter().map(|m| m.as_ref()).collect();
        if version.is_legacy() {
            let mut out = HashAlgorithm::Md5.digest(&parts);
            out.extend_from_slice(&HashAlgorithm::Sha1.digest(&parts));
            out
        } else {
            prf_hash.digest(&parts)
        }
    }
}

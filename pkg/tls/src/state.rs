//! Per-connection secrets and protection state. Everything a live session
//! needs after the handshake lives here behind a readers-writer lock so the
//! input and output stream wrappers can run on separate threads.

use std::sync::{Arc, RwLock};

use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::certificate::CertificateChain;
use crate::cipher_suite::{self, SuiteInfo};
use crate::codec::RecordCodec;
use crate::crypt::HashAlgorithm;
use crate::errors::{Error, Result};
use crate::extensions::RawExtension;
use crate::key_expansion::{self, Prf};
use crate::options::TlsParams;
use crate::record::{ProtocolVersion, Record};
use crate::transcript::Transcript;

pub type SharedState = Arc<RwLock<ConnectionState>>;

/// Write-locks the shared state, surfacing poisoning as an internal error
/// instead of panicking in protocol code.
pub(crate) fn lock_write(state: &SharedState) -> Result<std::sync::RwLockWriteGuard<ConnectionState>> {
    state.write().map_err(|_| {
        Error::alert(
            AlertDescription::internal_error,
            "connection state lock poisoned",
        )
    })
}

pub(crate) fn lock_read(state: &SharedState) -> Result<std::sync::RwLockReadGuard<ConnectionState>> {
    state.read().map_err(|_| {
        Error::alert(
            AlertDescription::internal_error,
            "connection state lock poisoned",
        )
    })
}

/// Accumulated, human-readable session information exposed after the
/// handshake for inspection.
#[derive(Clone, Debug, Default)]
pub struct SessionInfo {
    entries: Vec<InfoEntry>,
}

#[derive(Clone, Debug)]
pub struct InfoEntry {
    pub name: String,
    pub info: String,
    pub value: String,
}

impl SessionInfo {
    pub fn add(&mut self, name: &str, info: &str, value: impl ToString) {
        self.entries.push(InfoEntry {
            name: name.to_string(),
            info: info.to_string(),
            value: value.to_string(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    pub fn entries(&self) -> &[InfoEntry] {
        &self.entries
    }
}

pub struct ConnectionState {
    /// Is this endpoint the server?
    pub server: bool,

    pub params: TlsParams,

    /// Version asked for locally (and echoed in the premaster secret).
    pub requested_version: ProtocolVersion,

    /// Version in force on the wire. Starts at the requested version and
    /// only ever lowers.
    pub version: ProtocolVersion,

    /// The version carried in the ClientHello: our request on the client
    /// side, the peer's request on the server side. The premaster secret
    /// echoes this value to defeat version rollback.
    pub client_hello_version: ProtocolVersion,

    /// Selected suite code plus the sizes cached from its catalogue row.
    pub suite: u16,
    key_size: usize,
    iv_size: usize,
    mac_size: usize,

    pub client_random: Vec<u8>,
    pub server_random: Vec<u8>,

    pub premaster: Vec<u8>,
    pub master: Vec<u8>,

    key_block: Vec<u8>,
    client_mac_key: Vec<u8>,
    server_mac_key: Vec<u8>,
    client_key: Vec<u8>,
    server_key: Vec<u8>,
    client_iv: Vec<u8>,
    server_iv: Vec<u8>,

    /// Protection for records written by the client / by the server.
    /// Empty until the matching ChangeCipherSpec.
    client_codec: Option<RecordCodec>,
    server_codec: Option<RecordCodec>,

    client_seq: u64,
    server_seq: u64,

    pub transcript: Transcript,

    /// Server side: the configured chain and private key. Client side: the
    /// chain received from the peer.
    pub certificate: Option<CertificateChain>,

    /// Extensions observed in the peer's hello, kept for inspection only.
    pub extensions: Vec<RawExtension>,

    pub info: SessionInfo,
}

impl ConnectionState {
    pub fn new(server: bool, params: TlsParams) -> Result<Self> {
        let mut certificate = None;
        if let (Some(cert), Some(ckey)) = (&params.certificate, &params.private_key) {
            certificate = Some(CertificateChain::load(cert, ckey)?);
        }

        let requested = params.version;
        if !requested.is_supported() {
            return Err(Error::Config(format!(
                "unsupported requested version {}",
                requested
            )));
        }

        Ok(Self {
            server,
            requested_version: requested,
            version: requested,
            client_hello_version: requested,
            suite: cipher_suite::TLS_NULL_WITH_NULL_NULL,
            key_size: 0,
            iv_size: 0,
            mac_size: 0,
            client_random: vec![],
            server_random: vec![],
            premaster: vec![],
            master: vec![],
            key_block: vec![],
            client_mac_key: vec![],
            server_mac_key: vec![],
            client_key: vec![],
            server_key: vec![],
            client_iv: vec![],
            server_iv: vec![],
            client_codec: None,
            server_codec: None,
            client_seq: 0,
            server_seq: 0,
            transcript: Transcript::new(),
            certificate,
            extensions: vec![],
            info: SessionInfo::default(),
            params,
        })
    }

    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Lowers the negotiated version towards the peer's, never raising it.
    pub fn set_version(&mut self, peer: ProtocolVersion) -> Result<()> {
        if !peer.is_supported() {
            return Err(Error::alert(
                AlertDescription::protocol_version,
                "peer version outside the supported range",
            ));
        }

        if peer < self.version {
            self.version = peer;
        }
        Ok(())
    }

    /// Pins the suite and caches its sizes at the negotiated version.
    pub fn select_suite(&mut self, code: u16) -> Result<()> {
        let info = cipher_suite::info(code, self.version).ok_or_else(|| {
            Error::alert(
                AlertDescription::handshake_failure,
                "selected suite is not usable at the negotiated version",
            )
        })?;

        self.suite = code;
        self.key_size = info.key_size;
        self.iv_size = info.iv_size;
        self.mac_size = info.mac_size();
        Ok(())
    }

    pub fn suite_info(&self) -> Result<&'static SuiteInfo> {
        cipher_suite::info(self.suite, self.version).ok_or_else(|| {
            Error::alert(
                AlertDescription::internal_error,
                "no catalogue row for the pinned suite",
            )
        })
    }

    pub fn prf(&self) -> Prf {
        let hash = cipher_suite::info(self.suite, self.version)
            .map(|info| info.prf_hash())
            .unwrap_or(HashAlgorithm::Sha256);
        Prf::for_version(self.version, hash)
    }

    pub fn transcript_hash(&self) -> Vec<u8> {
        let hash = cipher_suite::info(self.suite, self.version)
            .map(|info| info.prf_hash())
            .unwrap_or(HashAlgorithm::Sha256);
        self.transcript.hash(self.version, hash)
    }

    /// Derives the master secret and the sliced key block from the
    /// premaster and both randoms.
    pub fn derive_keys(&mut self) -> Result<()> {
        if self.premaster.is_empty() || self.client_random.len() != 32
            || self.server_random.len() != 32
        {
            return Err(Error::alert(
                AlertDescription::internal_error,
                "key derivation before the exchange completed",
            ));
        }

        let prf = self.prf();
        self.master = key_expansion::master_secret(
            prf,
            &self.premaster,
            &self.client_random,
            &self.server_random,
        );

        let block_len = 2 * (self.mac_size + self.key_size + self.iv_size);
        self.key_block = key_expansion::key_block(
            prf,
            &self.master,
            &self.client_random,
            &self.server_random,
            block_len,
        );

        // Slice in catalogue order: MAC keys, cipher keys, IVs.
        let mut block = Bytes::from(self.key_block.clone());
        self.client_mac_key = block.split_to(self.mac_size).to_vec();
        self.server_mac_key = block.split_to(self.mac_size).to_vec();
        self.client_key = block.split_to(self.key_size).to_vec();
        self.server_key = block.split_to(self.key_size).to_vec();
        self.client_iv = block.split_to(self.iv_size).to_vec();
        self.server_iv = block.split_to(self.iv_size).to_vec();
        debug_assert!(block.is_empty());

        log::debug!(
            "derived key block: {} bytes for suite {:#06x}",
            block_len,
            self.suite
        );

        Ok(())
    }

    /// Activates the client-write protection. Called when the client's
    /// ChangeCipherSpec is sent (client side) or received (server side).
    pub fn change_client_cipher(&mut self) -> Result<()> {
        let info = self.suite_info()?;
        self.client_codec =
            RecordCodec::from_suite(info, &self.client_key, &self.client_iv, &self.client_mac_key)?;
        self.client_seq = 0;
        Ok(())
    }

    /// Activates the server-write protection.
    pub fn change_server_cipher(&mut self) -> Result<()> {
        let info = self.suite_info()?;
        self.server_codec =
            RecordCodec::from_suite(info, &self.server_key, &self.server_iv, &self.server_mac_key)?;
        self.server_seq = 0;
        Ok(())
    }

    pub fn client_sequence(&self) -> u64 {
        self.client_seq
    }

    pub fn server_sequence(&self) -> u64 {
        self.server_seq
    }

    /// Protects an outgoing record with this endpoint's write codec,
    /// consuming a sequence number when protection is active.
    pub fn protect(&mut self, record: Record) -> Result<Record> {
        let server = self.server;
        let active = if server {
            self.server_codec.is_some()
        } else {
            self.client_codec.is_some()
        };
        if !active {
            return Ok(record);
        }

        let seq = if server {
            let n = self.server_seq;
            self.server_seq += 1;
            n
        } else {
            let n = self.client_seq;
            self.client_seq += 1;
            n
        };

        let codec = if server {
            self.server_codec.as_mut()
        } else {
            self.client_codec.as_mut()
        };
        match codec {
            Some(c) => c.encode(seq, record),
            None => Ok(record),
        }
    }

    /// Reverses the peer's protection on an incoming record.
    pub fn unprotect(&mut self, record: Record) -> Result<Record> {
        let server = self.server;
        let active = if server {
            self.client_codec.is_some()
        } else {
            self.server_codec.is_some()
        };
        if !active {
            return Ok(record);
        }

        let seq = if server {
            let n = self.client_seq;
            self.client_seq += 1;
            n
        } else {
            let n = self.server_seq;
            self.server_seq += 1;
            n
        };

        let codec = if server {
            self.client_codec.as_mut()
        } else {
            self.server_codec.as_mut()
        };
        match codec {
            Some(c) => c.decode(seq, record),
            None => Ok(record),
        }
    }

    /// True once this endpoint's read side expects protected records.
    pub fn read_protected(&self) -> bool {
        if self.server {
            self.client_codec.is_some()
        } else {
            self.server_codec.is_some()
        }
    }

    /// Snapshot of the negotiated parameters plus everything accumulated
    /// during the handshake.
    pub fn session_info(&self) -> SessionInfo {
        let mut plist = self.info.clone();
        plist.add("TLS-STA-SFLG", "server endpoint", self.server);
        plist.add(
            "TLS-STA-RVER",
            "requested version",
            self.requested_version,
        );
        plist.add("TLS-STA-NVER", "negotiated version", self.version);
        plist.add(
            "TLS-STA-CIFR",
            "cipher suite",
            format!("{:#06x}", self.suite),
        );
        plist.add(
            "TLS-STA-SNAM",
            "cipher suite name",
            cipher_suite::name_of(self.suite),
        );
        plist.add("TLS-STA-KSIZ", "cipher key size", self.key_size);
        plist.add("TLS-STA-VSIZ", "cipher iv size", self.iv_size);
        plist.add("TLS-STA-HSIZ", "mac key size", self.mac_size);
        plist.add("TLS-STA-EXTL", "extension count", self.extensions.len());
        if self.params.debug_extensions {
            for (k, ext) in self.extensions.iter().enumerate() {
                plist.add(
                    &format!("TLS-EXT-{:04}", k),
                    "peer hello extension (type, length)",
                    format!("({}, {})", ext.typ, ext.data.len()),
                );
            }
        }
        plist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher_suite::{
        TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_128_GCM_SHA256,
    };
    use crate::record::{ContentType, TLS_1_0, TLS_1_1, TLS_1_2};

    fn ready_state(server: bool, suite: u16) -> ConnectionState {
        let mut state = ConnectionState::new(server, TlsParams::default()).unwrap();
        state.client_random = vec![1u8; 32];
        state.server_random = vec![2u8; 32];
        state.premaster = vec![3u8; 48];
        state.select_suite(suite).unwrap();
        state.derive_keys().unwrap();
        state
    }

    #[test]
    fn version_only_lowers() {
        let mut state = ConnectionState::new(true, TlsParams::default()).unwrap();
        assert_eq!(state.version, TLS_1_2);
        state.set_version(TLS_1_0).unwrap();
        assert_eq!(state.version, TLS_1_0);
        state.set_version(TLS_1_1).unwrap();
        assert_eq!(state.version, TLS_1_0);
        assert!(state.set_version(ProtocolVersion::new(2, 0)).is_err());
    }

    #[test]
    fn key_block_length_matches_suite_sizes() {
        let state = ready_state(true, TLS_RSA_WITH_AES_128_CBC_SHA);
        // 2 * (20 + 16 + 0) at TLS 1.2.
        assert_eq!(state.key_block.len(), 72);
        assert_eq!(state.master.len(), 48);
        assert_eq!(state.client_mac_key.len(), 20);
        assert_eq!(state.client_key.len(), 16);
        assert!(state.client_iv.is_empty());
    }

    #[test]
    fn both_directions_round_trip_through_shared_keys() {
        let mut server = ready_state(true, TLS_RSA_WITH_AES_128_CBC_SHA);
        let mut client = ready_state(false, TLS_RSA_WITH_AES_128_CBC_SHA);

        for state in [&mut server, &mut client] {
            state.change_client_cipher().unwrap();
            state.change_server_cipher().unwrap();
        }

        let record = Record {
            typ: ContentType::application_data,
            version: TLS_1_2,
            body: bytes::Bytes::from_static(b"hello"),
        };

        // Client to server.
        let wire = client.protect(record.clone()).unwrap();
        assert_eq!(server.unprotect(wire).unwrap(), record);

        // Server to client.
        let wire = server.protect(record.clone()).unwrap();
        assert_eq!(client.unprotect(wire).unwrap(), record);

        assert_eq!(client.client_sequence(), 1);
        assert_eq!(server.client_sequence(), 1);
    }

    #[test]
    fn sequence_numbers_only_advance_under_protection() {
        let mut state = ready_state(false, TLS_RSA_WITH_AES_128_GCM_SHA256);

        let record = Record {
            typ: ContentType::handshake,
            version: TLS_1_2,
            body: bytes::Bytes::from_static(b"x"),
        };

        // Unprotected epoch: no counter movement.
        state.protect(record.clone()).unwrap();
        assert_eq!(state.client_sequence(), 0);

        state.change_client_cipher().unwrap();
        state.protect(record).unwrap();
        assert_eq!(state.client_sequence(), 1);
    }

    #[test]
    fn suite_resolution_respects_version_window() {
        let mut state = ConnectionState::new(true, TlsParams::default()).unwrap();
        state.set_version(TLS_1_1).unwrap();
        assert!(state.select_suite(TLS_RSA_WITH_AES_128_GCM_SHA256).is_err());
        assert!(state.select_suite(TLS_RSA_WITH_AES_128_CBC_SHA).is_ok());
    }

    #[test]
    fn session_info_reports_negotiation() {
        let state = ready_state(true, TLS_RSA_WITH_AES_128_CBC_SHA);
        let info = state.session_info();
        assert_eq!(info.get("TLS-STA-CIFR").unwrap(), "0x002f");
        assert_eq!(
            info.get("TLS-STA-SNAM").unwrap(),
            "TLS_RSA_WITH_AES_128_CBC_SHA"
        );
        assert_eq!(info.get("TLS-STA-NVER").unwrap(), "TLS 1.2");
    }
}

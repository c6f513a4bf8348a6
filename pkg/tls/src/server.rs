//! Server side of the handshake: suite and version selection against the
//! ClientHello, certificate delivery, premaster recovery and the Finished
//! exchange.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};

use crate::alert::AlertDescription;
use crate::application_stream::TlsSocket;
use crate::buffer::Chunk;
use crate::certificate;
use crate::cipher_suite::{self, TLS_NULL_WITH_NULL_NULL};
use crate::crypt;
use crate::errors::{Error, Result};
use crate::handshake::{CertificatePayload, HandshakeBody, HandshakeType, ServerHello};
use crate::handshake_executor::HandshakeExecutor;
use crate::key_expansion::MASTER_SECRET_SIZE;
use crate::options::TlsParams;
use crate::record_stream::{RecordReader, RecordWriter};
use crate::state::{lock_read, lock_write, ConnectionState};

pub struct Server {
    params: TlsParams,
}

impl Server {
    pub fn new(params: TlsParams) -> Self {
        Self { params }
    }

    /// Performs the server handshake over an accepted TCP stream and
    /// returns the encrypting socket wrapper.
    pub fn accept(&self, stream: TcpStream) -> Result<TlsSocket> {
        let peer_addr = stream.peer_addr().ok();
        let reader = stream.try_clone()?;
        self.accept_io(Box::new(reader), Box::new(stream), peer_addr)
    }

    pub fn accept_io(
        &self,
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
        peer_addr: Option<SocketAddr>,
    ) -> Result<TlsSocket> {
        let state = ConnectionState::new(true, self.params.clone())?.shared();
        let mut executor = HandshakeExecutor::new(
            RecordReader::new(reader, state.clone()),
            RecordWriter::new(writer, state.clone()),
            state.clone(),
        );

        if let Err(e) = run_handshake(&mut executor, &self.params) {
            return Err(executor.fail(e));
        }

        {
            let state = lock_read(&state)?;
            log::info!(
                "server handshake complete: {} with {}",
                state.version,
                cipher_suite::name_of(state.suite)
            );
        }

        let authority = peer_addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| self.params.authority());
        let HandshakeExecutor {
            reader, writer, ..
        } = executor;
        Ok(TlsSocket::new(reader, writer, state, peer_addr, authority))
    }
}

fn run_handshake(executor: &mut HandshakeExecutor, params: &TlsParams) -> Result<()> {
    // ClientHello drives version and suite selection.
    let block = executor.recv_expected(HandshakeType::ClientHello)?;
    let hello = match HandshakeBody::decode(&block)? {
        HandshakeBody::ClientHello(v) => v,
        _ => {
            return Err(Error::alert(
                AlertDescription::internal_error,
                "ClientHello block decoded to another body",
            ));
        }
    };

    {
        let mut state = lock_write(&executor.state)?;
        state.set_version(hello.version)?;
        state.client_hello_version = hello.version;
        state.client_random = hello.random.to_vec();
        state.extensions = hello.extensions.clone();

        if !hello.compression_methods.contains(&0) {
            return Err(Error::alert(
                AlertDescription::handshake_failure,
                "peer does not offer null compression",
            ));
        }

        let local = cipher_suite::offer(state.version, params);
        let code = cipher_suite::locate(&hello.cipher_suites, &local);
        if code == TLS_NULL_WITH_NULL_NULL
            && !(params.allow_null_suites && hello.cipher_suites.contains(&code))
        {
            return Err(Error::alert(
                AlertDescription::handshake_failure,
                "no mutually acceptable cipher suite",
            ));
        }
        state.select_suite(code)?;
        state
            .info
            .add("TLS-CHL-SLEN", "client session id length", hello.session_id.len());
        state
            .info
            .add("TLS-CHL-NSUI", "cipher suites offered", hello.cipher_suites.len());
        log::debug!(
            "selected {} at {}",
            cipher_suite::name_of(code),
            state.version
        );
    }

    // ServerHello: negotiated version, fresh random, empty session id.
    let hello_chunk = {
        let mut state = lock_write(&executor.state)?;
        let random = crypt::hello_random(state.version.is_legacy());
        state.server_random = random.to_vec();
        ServerHello::new(state.version, random, state.suite).encode()
    };
    executor.send_handshake(HandshakeType::ServerHello, &hello_chunk)?;

    // Certificate, when the suite calls for one.
    let requires_certificate = lock_read(&executor.state)?.suite_info()?.requires_certificate;
    if requires_certificate {
        let chunk = {
            let state = lock_read(&executor.state)?;
            let chain = state.certificate.as_ref().ok_or_else(|| {
                Error::alert(
                    AlertDescription::handshake_failure,
                    "suite requires a certificate but none is configured",
                )
            })?;
            CertificatePayload {
                certificates: chain.certificates().to_vec(),
            }
            .encode()
        };
        executor.send_handshake(HandshakeType::Certificate, &chunk)?;
    }

    // No ServerKeyExchange for the RSA exchanges in this catalogue.
    executor.send_handshake(HandshakeType::ServerHelloDone, &Chunk::new())?;

    // ClientKeyExchange: recover and validate the premaster.
    let block = executor.recv_expected(HandshakeType::ClientKeyExchange)?;
    let exchange = match HandshakeBody::decode(&block)? {
        HandshakeBody::ClientKeyExchange(v) => v,
        _ => {
            return Err(Error::alert(
                AlertDescription::internal_error,
                "ClientKeyExchange block decoded to another body",
            ));
        }
    };

    {
        let mut state = lock_write(&executor.state)?;
        let premaster = match state.certificate.as_ref().and_then(|c| c.private_key()) {
            Some(key) => certificate::decrypt_premaster(key, &exchange.encrypted_premaster)?,
            None => exchange.encrypted_premaster.to_vec(),
        };

        if premaster.len() != MASTER_SECRET_SIZE {
            return Err(Error::alert(
                AlertDescription::decrypt_error,
                "premaster secret has the wrong length",
            ));
        }

        // The leading bytes echo the version from the ClientHello; any
        // other value points at tampering or a rollback attempt.
        if premaster[0] != state.client_hello_version.major
            || premaster[1] != state.client_hello_version.minor
        {
            return Err(Error::alert(
                AlertDescription::decrypt_error,
                "premaster version does not match the ClientHello",
            ));
        }

        state.premaster = premaster;
        state.derive_keys()?;
    }

    // The client's Finished covers the transcript up to the key exchange;
    // snapshot the expectation before its block arrives.
    let expected = executor.expected_peer_verify_data()?;
    executor.recv_change_cipher_spec()?;
    executor.verify_finished(&expected)?;

    // Our turn: activate the write cipher and close out the handshake.
    executor.send_change_cipher_spec()?;
    executor.send_finished()?;

    Ok(())
}

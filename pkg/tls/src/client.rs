//! Client side of the handshake: drives the hello exchange, the RSA key
//! exchange and the Finished verification, then hands the connection over
//! to the stream wrappers.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};

use crate::alert::AlertDescription;
use crate::application_stream::TlsSocket;
use crate::certificate::{self, CertificateChain};
use crate::cipher_suite;
use crate::crypt;
use crate::errors::{Error, Result};
use crate::handshake::{ClientKeyExchange, HandshakeBody, HandshakeType};
use crate::handshake_executor::HandshakeExecutor;
use crate::key_expansion::MASTER_SECRET_SIZE;
use crate::options::TlsParams;
use crate::record_stream::{RecordReader, RecordWriter};
use crate::state::{lock_read, lock_write, ConnectionState};

pub struct Client {
    params: TlsParams,
}

impl Client {
    pub fn new(params: TlsParams) -> Self {
        Self { params }
    }

    /// Performs the client handshake over a connected TCP stream and
    /// returns the encrypting socket wrapper.
    pub fn connect(&self, stream: TcpStream) -> Result<TlsSocket> {
        let peer_addr = stream.peer_addr().ok();
        let reader = stream.try_clone()?;
        self.connect_io(Box::new(reader), Box::new(stream), peer_addr)
    }

    /// Handshake over separable transport halves, for transports other
    /// than TcpStream.
    pub fn connect_io(
        &self,
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
        peer_addr: Option<SocketAddr>,
    ) -> Result<TlsSocket> {
        let state = ConnectionState::new(false, self.params.clone())?.shared();
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
                "client handshake complete: {} with {}",
                state.version,
                cipher_suite::name_of(state.suite)
            );
        }

        let HandshakeExecutor {
            reader, writer, ..
        } = executor;
        Ok(TlsSocket::new(
            reader,
            writer,
            state,
            peer_addr,
            self.params.authority(),
        ))
    }
}

fn run_handshake(executor: &mut HandshakeExecutor, params: &TlsParams) -> Result<()> {
    // ClientHello: requested version, fresh random, the full local suite
    // list, null compression only.
    let (hello_chunk, offered) = {
        let mut state = lock_write(&executor.state)?;
        let random = crypt::hello_random(state.requested_version.is_legacy());
        state.client_random = random.to_vec();
        state.client_hello_version = state.requested_version;

        let offered = cipher_suite::offer(state.requested_version, params);
        let hello =
            crate::handshake::ClientHello::new(state.requested_version, random, offered.clone());
        state
            .info
            .add("TLS-CHL-NSUI", "cipher suites offered", offered.len());
        (hello.encode(), offered)
    };
    executor.send_handshake(HandshakeType::ClientHello, &hello_chunk)?;

    // ServerHello pins the version and the suite.
    let block = executor.recv_expected(HandshakeType::ServerHello)?;
    let hello = match HandshakeBody::decode(&block)? {
        HandshakeBody::ServerHello(v) => v,
        _ => {
            return Err(Error::alert(
                AlertDescription::internal_error,
                "ServerHello block decoded to another body",
            ));
        }
    };

    {
        let mut state = lock_write(&executor.state)?;
        if hello.version > state.requested_version {
            return Err(Error::alert(
                AlertDescription::protocol_version,
                "server negotiated a version above the request",
            ));
        }
        state.set_version(hello.version)?;
        state.server_random = hello.random.to_vec();

        if !offered.contains(&hello.cipher_suite) {
            return Err(Error::alert(
                AlertDescription::illegal_parameter,
                "server selected a suite that was not offered",
            ));
        }
        if hello.compression_method != 0 {
            return Err(Error::alert(
                AlertDescription::illegal_parameter,
                "server selected an unsupported compression method",
            ));
        }
        state.select_suite(hello.cipher_suite)?;
        state
            .info
            .add("TLS-SHL-SLEN", "server session id length", hello.session_id.len());
    }

    // Certificate, when the suite calls for one.
    let requires_certificate = lock_read(&executor.state)?.suite_info()?.requires_certificate;
    if requires_certificate {
        let block = executor.recv_expected(HandshakeType::Certificate)?;
        let payload = match HandshakeBody::decode(&block)? {
            HandshakeBody::Certificate(v) => v,
            _ => {
                return Err(Error::alert(
                    AlertDescription::internal_error,
                    "Certificate block decoded to another body",
                ));
            }
        };
        if payload.certificates.is_empty() {
            return Err(Error::alert(
                AlertDescription::handshake_failure,
                "server sent an empty certificate chain",
            ));
        }
        lock_write(&executor.state)?.certificate =
            Some(CertificateChain::from_parts(payload.certificates, None));
    }

    // Absorb optional CertificateRequest, stop at ServerHelloDone.
    loop {
        let block = executor.recv_handshake()?;
        match block.typ {
            HandshakeType::CertificateRequest => {
                log::debug!("certificate request recognised but not honoured");
            }
            HandshakeType::ServerHelloDone => {
                HandshakeBody::decode(&block)?;
                break;
            }
            _ => {
                return Err(Error::alert(
                    AlertDescription::unexpected_message,
                    "unexpected handshake message before ServerHelloDone",
                ));
            }
        }
    }

    // ClientKeyExchange: premaster pinned to the requested version,
    // RSA-encrypted under the server's public key.
    let exchange_chunk = {
        let mut state = lock_write(&executor.state)?;
        let mut premaster = crypt::random_bytes(MASTER_SECRET_SIZE);
        premaster[0] = state.client_hello_version.major;
        premaster[1] = state.client_hello_version.minor;
        state.premaster = premaster.clone();

        let encrypted = match &state.certificate {
            Some(chain) => certificate::encrypt_premaster(&chain.public_key()?, &premaster)?,
            // Only the all-null suite runs without a key exchange key.
            None => premaster,
        };

        ClientKeyExchange {
            encrypted_premaster: encrypted.into(),
        }
        .encode()
    };
    executor.send_handshake(HandshakeType::ClientKeyExchange, &exchange_chunk)?;

    lock_write(&executor.state)?.derive_keys()?;

    // Our Finished goes out first, protected by the fresh cipher.
    executor.send_change_cipher_spec()?;
    executor.send_finished()?;

    // The server's Finished covers everything including ours; snapshot
    // the expectation before its block lands in the transcript.
    let expected = executor.expected_peer_verify_data()?;
    executor.recv_change_cipher_spec()?;
    executor.verify_finished(&expected)?;

    Ok(())
}

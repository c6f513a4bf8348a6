//! Message pump primitives shared by the client and server drivers:
//! handshake send/receive with transcript capture, ChangeCipherSpec
//! handling with cipher activation, and Finished exchange.

use crate::alert::{Alert, AlertDescription};
use crate::buffer::Chunk;
use crate::errors::{Error, Result};
use crate::handshake::{encode_message, HandshakeBlock, HandshakeType};
use crate::key_expansion::{self, VERIFY_DATA_SIZE};
use crate::record::ContentType;
use crate::record_stream::{Message, RecordReader, RecordWriter};
use crate::state::{lock_read, lock_write, SharedState};
use crate::utils::constant_time_eq;

pub(crate) struct HandshakeExecutor {
    pub reader: RecordReader,
    pub writer: RecordWriter,
    pub state: SharedState,
}

impl HandshakeExecutor {
    pub fn new(reader: RecordReader, writer: RecordWriter, state: SharedState) -> Self {
        Self {
            reader,
            writer,
            state,
        }
    }

    /// Sends one handshake message and appends it to the transcript.
    pub fn send_handshake(&mut self, typ: HandshakeType, body: &Chunk) -> Result<()> {
        let message = encode_message(typ, body);
        lock_write(&self.state)?.transcript.push(message.clone());
        self.writer.send_record(ContentType::handshake, &message)
    }

    /// Receives the next handshake block, appending it to the transcript.
    /// Warning alerts are absorbed; anything else out of place is an error.
    pub fn recv_handshake(&mut self) -> Result<HandshakeBlock> {
        loop {
            match self.reader.recv()? {
                Message::Handshake(block) => {
                    lock_write(&self.state)?.transcript.push(block.raw.clone());
                    return Ok(block);
                }
                Message::Alert(alert) => {
                    if alert.is_fatal() || alert.is_close_notify() {
                        return Err(Error::PeerAlert(alert));
                    }
                    log::warn!("ignoring warning alert during handshake: {:?}", alert);
                }
                Message::ChangeCipherSpec => {
                    return Err(Error::alert(
                        AlertDescription::unexpected_message,
                        "ChangeCipherSpec in the middle of a handshake flight",
                    ));
                }
                Message::ApplicationData(_) => {
                    return Err(Error::alert(
                        AlertDescription::unexpected_message,
                        "application data during the handshake",
                    ));
                }
            }
        }
    }

    /// Receives a handshake block of exactly the given type.
    pub fn recv_expected(&mut self, expected: HandshakeType) -> Result<HandshakeBlock> {
        let block = self.recv_handshake()?;
        if block.typ != expected {
            log::warn!("expected {:?}, peer sent {:?}", expected, block.typ);
            return Err(Error::alert(
                AlertDescription::unexpected_message,
                "handshake message out of order",
            ));
        }
        Ok(block)
    }

    /// Sends ChangeCipherSpec and activates this endpoint's write cipher.
    pub fn send_change_cipher_spec(&mut self) -> Result<()> {
        self.writer.send_change_cipher_spec()?;
        let mut state = lock_write(&self.state)?;
        if state.server {
            state.change_server_cipher()
        } else {
            state.change_client_cipher()
        }
    }

    /// Receives the peer's ChangeCipherSpec and activates the read cipher.
    pub fn recv_change_cipher_spec(&mut self) -> Result<()> {
        match self.reader.recv()? {
            Message::ChangeCipherSpec => {
                let mut state = lock_write(&self.state)?;
                if state.server {
                    state.change_client_cipher()
                } else {
                    state.change_server_cipher()
                }
            }
            Message::Alert(alert) if alert.is_fatal() || alert.is_close_notify() => {
                Err(Error::PeerAlert(alert))
            }
            _ => Err(Error::alert(
                AlertDescription::unexpected_message,
                "expected ChangeCipherSpec",
            )),
        }
    }

    /// The verify data this endpoint expects in the peer's Finished. Must
    /// be computed before the peer's Finished block enters the transcript.
    pub fn expected_peer_verify_data(&self) -> Result<Vec<u8>> {
        let state = lock_read(&self.state)?;
        Ok(key_expansion::verify_data(
            state.prf(),
            &state.master,
            !state.server,
            &state.transcript_hash(),
        ))
    }

    /// Builds and sends this endpoint's Finished over the active cipher.
    /// The client's Finished enters the transcript so the server's own
    /// Finished can cover it; the server's is the last message and does
    /// not.
    pub fn send_finished(&mut self) -> Result<()> {
        let (message, is_server) = {
            let state = lock_read(&self.state)?;
            let verify = key_expansion::verify_data(
                state.prf(),
                &state.master,
                state.server,
                &state.transcript_hash(),
            );
            let mut body = Chunk::with_capacity(VERIFY_DATA_SIZE);
            body.push_slice(&verify);
            (encode_message(HandshakeType::Finished, &body), state.server)
        };

        if !is_server {
            lock_write(&self.state)?.transcript.push(message.clone());
        }

        self.writer.send_record(ContentType::handshake, &message)
    }

    /// Receives the peer's Finished and compares it against the expected
    /// verify data in constant time.
    pub fn verify_finished(&mut self, expected: &[u8]) -> Result<()> {
        let block = self.recv_expected(HandshakeType::Finished)?;
        if block.body.len() != VERIFY_DATA_SIZE || !constant_time_eq(&block.body, expected) {
            return Err(Error::alert(
                AlertDescription::handshake_failure,
                "Finished verify data mismatch",
            ));
        }
        Ok(())
    }

    /// Best-effort translation of a handshake failure into a wire alert
    /// before surfacing it to the caller.
    pub fn fail(&mut self, error: Error) -> Error {
        if let Some(description) = error.unsent_alert() {
            log::warn!("handshake failed, sending alert {:?}", description);
            if self.writer.send_alert(Alert::fatal(description)).is_err() {
                log::debug!("could not deliver failure alert");
            }
            return error.mark_sent();
        }

        if matches!(error, Error::Io(_)) {
            // A transport timeout or abort still owes the peer a goodbye.
            let _ = self
                .writer
                .send_alert(Alert::fatal(AlertDescription::handshake_failure));
        }

        error
    }
}

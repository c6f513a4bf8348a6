//! Typed message traffic over the record layer: the reader reassembles
//! handshake blocks that span records, the writer fragments oversized
//! payloads, and both route every record through the connection state for
//! protection.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};

use crate::alert::{Alert, AlertDescription};
use crate::errors::{Error, Result};
use crate::handshake::{next_block, HandshakeBlock};
use crate::record::{ContentType, Record, MAX_PLAINTEXT_SIZE};
use crate::state::{lock_read, lock_write, SharedState};

/// Strongly typed view of one unit of traffic, dispatched by content type.
#[derive(Debug)]
pub enum Message {
    ChangeCipherSpec,
    Alert(Alert),
    Handshake(HandshakeBlock),
    ApplicationData(Bytes),
}

pub struct RecordReader {
    reader: Box<dyn Read + Send>,
    state: SharedState,

    /// Bytes of a handshake message that has not yet produced a complete
    /// block. Handshake messages may be split across or coalesced within
    /// records.
    pending_handshake: Bytes,
}

impl RecordReader {
    pub fn new(reader: Box<dyn Read + Send>, state: SharedState) -> Self {
        Self {
            reader,
            state,
            pending_handshake: Bytes::new(),
        }
    }

    /// Receives the next message, decrypting records and reassembling
    /// handshake blocks as needed.
    pub fn recv(&mut self) -> Result<Message> {
        loop {
            if let Some((block, consumed)) = next_block(&self.pending_handshake) {
                self.pending_handshake = self.pending_handshake.slice(consumed..);
                return Ok(Message::Handshake(block));
            }

            let record = Record::read_from(&mut *self.reader)?;
            let record = lock_write(&self.state)?.unprotect(record)?;

            if !self.pending_handshake.is_empty() && record.typ != ContentType::handshake {
                return Err(Error::alert(
                    AlertDescription::unexpected_message,
                    "record interleaved into a split handshake message",
                ));
            }

            match record.typ {
                ContentType::handshake => {
                    if self.pending_handshake.is_empty() {
                        self.pending_handshake = record.body;
                    } else {
                        let mut merged = BytesMut::from(self.pending_handshake.as_ref());
                        merged.extend_from_slice(&record.body);
                        self.pending_handshake = merged.freeze();
                    }
                }
                ContentType::change_cipher_spec => {
                    if record.body.as_ref() != [1] {
                        return Err(Error::alert(
                            AlertDescription::decode_error,
                            "malformed ChangeCipherSpec body",
                        ));
                    }
                    return Ok(Message::ChangeCipherSpec);
                }
                ContentType::alert => {
                    let alert = Alert::parse(&record.body)?;
                    log::debug!("received alert {:?}", alert);
                    return Ok(Message::Alert(alert));
                }
                ContentType::application_data => {
                    if !lock_read(&self.state)?.read_protected() {
                        return Err(Error::alert(
                            AlertDescription::unexpected_message,
                            "application data before the cipher was activated",
                        ));
                    }
                    return Ok(Message::ApplicationData(record.body));
                }
                ContentType::Unknown(_) => {
                    return Err(Error::alert(
                        AlertDescription::decode_error,
                        "record with unknown content type",
                    ));
                }
            }
        }
    }
}

pub struct RecordWriter {
    writer: Box<dyn Write + Send>,
    state: SharedState,
}

impl RecordWriter {
    pub fn new(writer: Box<dyn Write + Send>, state: SharedState) -> Self {
        Self { writer, state }
    }

    /// Sends a payload of the given content type, fragmenting it into
    /// record-sized pieces. An empty payload still produces one record.
    pub fn send_record(&mut self, typ: ContentType, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            self.send_fragment(typ, payload)?;
        } else {
            for fragment in payload.chunks(MAX_PLAINTEXT_SIZE) {
                self.send_fragment(typ, fragment)?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    fn send_fragment(&mut self, typ: ContentType, fragment: &[u8]) -> Result<()> {
        let record = {
            let mut state = lock_write(&self.state)?;
            let record = Record {
                typ,
                version: state.version,
                body: Bytes::copy_from_slice(fragment),
            };
            state.protect(record)?
        };
        record.write_to(&mut *self.writer)
    }

    pub fn send_change_cipher_spec(&mut self) -> Result<()> {
        self.send_record(ContentType::change_cipher_spec, &[1])
    }

    pub fn send_alert(&mut self, alert: Alert) -> Result<()> {
        let mut body = vec![];
        alert.serialize(&mut body);
        self.send_record(ContentType::alert, &body)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

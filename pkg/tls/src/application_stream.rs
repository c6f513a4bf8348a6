//! Byte-stream wrappers over an established session: a Read half that
//! decrypts ApplicationData records, a Write half that accumulates and
//! flushes record-sized fragments, and a socket facade composing both
//! with the transport's addressing metadata.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{Buf, BytesMut};

use crate::alert::{Alert, AlertDescription};
use crate::errors::{Error, Result};
use crate::record::MAX_PLAINTEXT_SIZE;
use crate::record_stream::{Message, RecordReader, RecordWriter};
use crate::state::{lock_read, SessionInfo, SharedState};

type SharedWriter = Arc<Mutex<RecordWriter>>;

fn lock_writer(writer: &SharedWriter) -> io::Result<std::sync::MutexGuard<RecordWriter>> {
    writer
        .lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "tls writer lock poisoned"))
}

/// Decrypting input stream. Serves buffered plaintext first, then pulls
/// and interprets records.
pub struct TlsInput {
    reader: RecordReader,
    writer: SharedWriter,
    buffer: BytesMut,
    eof: bool,
}

impl TlsInput {
    fn new(reader: RecordReader, writer: SharedWriter) -> Self {
        Self {
            reader,
            writer,
            buffer: BytesMut::new(),
            eof: false,
        }
    }
}

impl Read for TlsInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.buffer.is_empty() {
                let n = buf.len().min(self.buffer.len());
                buf[..n].copy_from_slice(&self.buffer[..n]);
                self.buffer.advance(n);
                return Ok(n);
            }

            if self.eof {
                return Ok(0);
            }

            match self.reader.recv() {
                Ok(Message::ApplicationData(data)) => {
                    // Zero-length records are legal and yield nothing.
                    self.buffer.extend_from_slice(&data);
                }
                Ok(Message::Alert(alert)) if alert.is_close_notify() => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(Message::Alert(alert)) if !alert.is_fatal() => {
                    log::warn!("ignoring warning alert: {:?}", alert);
                }
                Ok(Message::Alert(alert)) => {
                    self.eof = true;
                    return Err(Error::PeerAlert(alert).into());
                }
                Ok(Message::Handshake(block)) => {
                    // Renegotiation is not supported; decline and move on.
                    log::warn!(
                        "rejecting renegotiation attempt ({:?}) on established session",
                        block.typ
                    );
                    if let Ok(mut writer) = lock_writer(&self.writer) {
                        let _ = writer.send_alert(Alert {
                            level: crate::alert::AlertLevel::warning,
                            description: AlertDescription::no_renegotiation,
                        });
                    }
                }
                Ok(Message::ChangeCipherSpec) => {
                    if let Ok(mut writer) = lock_writer(&self.writer) {
                        let _ = writer
                            .send_alert(Alert::fatal(AlertDescription::unexpected_message));
                    }
                    self.eof = true;
                    return Err(Error::alert(
                        AlertDescription::unexpected_message,
                        "ChangeCipherSpec on an established session",
                    )
                    .into());
                }
                Err(e) => {
                    self.eof = true;
                    return Err(e.into());
                }
            }
        }
    }
}

/// Encrypting output stream. Bytes accumulate until a record-sized
/// fragment fills or the caller flushes.
pub struct TlsOutput {
    writer: SharedWriter,
    buffer: Vec<u8>,
    closed: bool,
}

impl TlsOutput {
    fn new(writer: SharedWriter) -> Self {
        Self {
            writer,
            buffer: Vec::new(),
            closed: false,
        }
    }

    fn send_buffer(&mut self, upto: usize) -> io::Result<()> {
        let fragment: Vec<u8> = self.buffer.drain(..upto).collect();
        let mut writer = lock_writer(&self.writer)?;
        writer
            .send_record(crate::record::ContentType::application_data, &fragment)
            .map_err(io::Error::from)
    }

    /// Flushes pending data and sends close_notify. Further writes fail
    /// cleanly.
    pub fn close_notify(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        let mut writer = lock_writer(&self.writer)?;
        writer
            .send_alert(Alert::close_notify())
            .map_err(io::Error::from)?;
        self.closed = true;
        Ok(())
    }
}

impl Write for TlsOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "tls output closed by close_notify",
            ));
        }

        self.buffer.extend_from_slice(buf);
        while self.buffer.len() >= MAX_PLAINTEXT_SIZE {
            self.send_buffer(MAX_PLAINTEXT_SIZE)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let len = self.buffer.len();
            self.send_buffer(len)?;
        }
        let mut writer = lock_writer(&self.writer)?;
        writer.flush().map_err(io::Error::from)
    }
}

/// A byte socket that transparently encrypts: both stream halves plus the
/// endpoint's addressing metadata and the negotiated session state.
pub struct TlsSocket {
    input: TlsInput,
    output: TlsOutput,
    state: SharedState,
    peer_addr: Option<SocketAddr>,
    authority: String,
}

impl TlsSocket {
    pub(crate) fn new(
        reader: RecordReader,
        writer: RecordWriter,
        state: SharedState,
        peer_addr: Option<SocketAddr>,
        authority: String,
    ) -> Self {
        let writer = Arc::new(Mutex::new(writer));
        Self {
            input: TlsInput::new(reader, writer.clone()),
            output: TlsOutput::new(writer),
            state,
            peer_addr,
            authority,
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// "host:port" of the remote endpoint.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Read-only view of the negotiated parameters.
    pub fn session_info(&self) -> Result<SessionInfo> {
        Ok(lock_read(&self.state)?.session_info())
    }

    /// Separates the two stream halves so a reader and a writer thread
    /// can run independently. The halves keep sharing the connection
    /// state under its lock.
    pub fn split(self) -> (TlsInput, TlsOutput) {
        (self.input, self.output)
    }

    /// Orderly shutdown of the write side.
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.output.close_notify()
    }
}

impl Read for TlsSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for TlsSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

use std::fmt;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::errors::{Error, Result};

// 'The length (in bytes) of the following TLSPlaintext.fragment. The length
// MUST NOT exceed 2^14.' Encrypted records may grow by padding, MAC, nonce
// and tag; 2048 bytes covers every suite in the catalogue.
pub const MAX_PLAINTEXT_SIZE: usize = 16384;
pub const MAX_CIPHERTEXT_SIZE: usize = MAX_PLAINTEXT_SIZE + 2048;

pub const RECORD_HEADER_SIZE: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

pub const TLS_1_0: ProtocolVersion = ProtocolVersion { major: 3, minor: 1 };
pub const TLS_1_1: ProtocolVersion = ProtocolVersion { major: 3, minor: 2 };
pub const TLS_1_2: ProtocolVersion = ProtocolVersion { major: 3, minor: 3 };

impl ProtocolVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn is_supported(&self) -> bool {
        self.major == 3 && (1..=3).contains(&self.minor)
    }

    /// True for TLS 1.0 and 1.1, which share the legacy PRF and the
    /// implicit-IV CBC layout.
    pub fn is_legacy(&self) -> bool {
        *self <= TLS_1_1
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.major, self.minor) {
            (3, 1) => write!(f, "TLS 1.0"),
            (3, 2) => write!(f, "TLS 1.1"),
            (3, 3) => write!(f, "TLS 1.2"),
            (major, minor) => write!(f, "{}.{}", major, minor),
        }
    }
}

tls_enum_u8!(ContentType => {
    change_cipher_spec(20),
    alert(21),
    handshake(22),
    application_data(23),
});

/// Outermost framed unit on the wire: a 5-byte header followed by the body.
/// Depending on the connection epoch the body is plaintext or ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub typ: ContentType,
    pub version: ProtocolVersion,
    pub body: Bytes,
}

impl Record {
    /// Reads one record from the transport, validating the header before
    /// committing to the body read.
    pub fn read_from(reader: &mut dyn Read) -> Result<Record> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        reader.read_exact(&mut header)?;

        let typ = ContentType::from_u8(header[0]);
        if let ContentType::Unknown(value) = typ {
            log::warn!("record with unknown content type {}", value);
            return Err(Error::alert(
                AlertDescription::decode_error,
                "unknown record content type",
            ));
        }

        let version = ProtocolVersion::new(header[1], header[2]);
        if !version.is_supported() {
            return Err(Error::alert(
                AlertDescription::protocol_version,
                "unsupported record version",
            ));
        }

        let length = (&header[3..5]).read_u16::<BigEndian>()? as usize;
        if length > MAX_CIPHERTEXT_SIZE {
            return Err(Error::alert(
                AlertDescription::record_overflow,
                "record length exceeds the ciphertext ceiling",
            ));
        }

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body)?;

        log::trace!("read {:?} record, {} bytes", typ, length);

        Ok(Record {
            typ,
            version,
            body: Bytes::from(body),
        })
    }

    pub fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        debug_assert!(self.body.len() <= MAX_CIPHERTEXT_SIZE);

        let mut header = Vec::with_capacity(RECORD_HEADER_SIZE);
        header.push(self.typ.to_u8());
        header.push(self.version.major);
        header.push(self.version.minor);
        header.write_u16::<BigEndian>(self.body.len() as u16)?;

        writer.write_all(&header)?;
        writer.write_all(&self.body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering_and_names() {
        assert!(TLS_1_0 < TLS_1_1 && TLS_1_1 < TLS_1_2);
        assert!(TLS_1_0.is_legacy() && TLS_1_1.is_legacy());
        assert!(!TLS_1_2.is_legacy());
        assert_eq!(TLS_1_2.to_string(), "TLS 1.2");
        assert!(!ProtocolVersion::new(3, 4).is_supported());
        assert!(!ProtocolVersion::new(2, 1).is_supported());
    }

    #[test]
    fn record_round_trip() {
        let record = Record {
            typ: ContentType::handshake,
            version: TLS_1_2,
            body: Bytes::from_static(&[1, 2, 3, 4]),
        };

        let mut wire = vec![];
        record.write_to(&mut wire).unwrap();
        assert_eq!(&wire[..5], &[22, 3, 3, 0, 4]);

        let parsed = Record::read_from(&mut wire.as_slice()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let wire = [0x30u8, 3, 3, 0, 0];
        match Record::read_from(&mut wire.as_ref()) {
            Err(Error::Alert { description, .. }) => {
                assert_eq!(description, AlertDescription::decode_error)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn oversize_record_is_rejected() {
        let mut wire = vec![23u8, 3, 3];
        wire.extend_from_slice(&((MAX_CIPHERTEXT_SIZE + 1) as u16).to_be_bytes());
        match Record::read_from(&mut wire.as_slice()) {
            Err(Error::Alert { description, .. }) => {
                assert_eq!(description, AlertDescription::record_overflow)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn short_read_is_a_transport_error() {
        let wire = [22u8, 3, 1, 0, 10, 1, 2];
        assert!(matches!(
            Record::read_from(&mut wire.as_ref()),
            Err(Error::Io(_))
        ));
    }
}

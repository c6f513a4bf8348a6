use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::errors::{Error, Result};

/// A hello extension kept as raw bytes. Extensions are recognised for
/// observability but never acted upon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawExtension {
    pub typ: u16,
    pub data: Bytes,
}

/// Parses the optional extensions blob trailing a ClientHello: a 2-byte
/// list length followed by (type, 2-byte length, payload) entries.
pub fn parse_extensions(data: &Bytes) -> Result<Vec<RawExtension>> {
    if data.is_empty() {
        return Ok(vec![]);
    }

    let malformed = || {
        Error::alert(
            AlertDescription::decode_error,
            "malformed hello extensions block",
        )
    };

    if data.len() < 2 {
        return Err(malformed());
    }

    let total = u16::from_be_bytes([data[0], data[1]]) as usize;
    if total != data.len() - 2 {
        return Err(malformed());
    }

    let mut out = vec![];
    let mut offset = 2usize;
    while offset < data.len() {
        if offset + 4 > data.len() {
            return Err(malformed());
        }
        let typ = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        offset += 4;
        if offset + len > data.len() {
            return Err(malformed());
        }
        out.push(RawExtension {
            typ,
            data: data.slice(offset..offset + len),
        });
        offset += len;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_means_no_extensions() {
        assert!(parse_extensions(&Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn parses_server_name_and_alpn_shells() {
        // server_name (0) with 5 payload bytes, then alpn (16) empty.
        let blob = Bytes::from_static(&[
            0x00, 0x0d, // list length
            0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o',
            0x00, 0x10, 0x00, 0x00,
        ]);
        let exts = parse_extensions(&blob).unwrap();
        assert_eq!(exts.len(), 2);
        assert_eq!(exts[0].typ, 0);
        assert_eq!(exts[0].data.as_ref(), b"hello");
        assert_eq!(exts[1].typ, 16);
        assert!(exts[1].data.is_empty());
    }

    #[test]
    fn truncated_blob_is_a_decode_error() {
        let blob = Bytes::from_static(&[0x00, 0x06, 0x00, 0x00, 0x00, 0x05, b'x']);
        assert!(parse_extensions(&blob).is_err());
    }
}

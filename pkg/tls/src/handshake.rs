//! Handshake block framing and the typed bodies carried inside. A record
//! body of content type handshake is a concatenation of blocks, each a
//! 1-byte type and a 3-byte length followed by the body; blocks borrow
//! windows into the record body without copying.

use bytes::Bytes;

use crate::alert::AlertDescription;
use crate::buffer::Chunk;
use crate::errors::{Error, Result};
use crate::extensions::{parse_extensions, RawExtension};
use crate::record::ProtocolVersion;
use crate::utils::u24_from_be_bytes;

tls_enum_u8!(HandshakeType => {
    HelloRequest(0),
    ClientHello(1),
    ServerHello(2),
    Certificate(11),
    ServerKeyExchange(12),
    CertificateRequest(13),
    ServerHelloDone(14),
    ClientKeyExchange(16),
    Finished(20),
});

/// One handshake block: a (type, offset, length) window into its record.
#[derive(Clone, Debug)]
pub struct HandshakeBlock {
    pub typ: HandshakeType,
    /// The block including its 4-byte header; this is what enters the
    /// handshake transcript.
    pub raw: Bytes,
    pub body: Bytes,
}

/// Parses the next block out of 'data'. Returns None when the data ends
/// mid-block, signalling that the message continues in a following record.
pub fn next_block(data: &Bytes) -> Option<(HandshakeBlock, usize)> {
    if data.len() < 4 {
        return None;
    }

    let typ = HandshakeType::from_u8(data[0]);
    let length = u24_from_be_bytes(&data[1..4]);
    if data.len() < 4 + length {
        return None;
    }

    let block = HandshakeBlock {
        typ,
        raw: data.slice(0..4 + length),
        body: data.slice(4..4 + length),
    };
    Some((block, 4 + length))
}

/// Forward-only iteration over a complete handshake message. A trailing
/// partial block means the message is malformed at this layer.
pub struct BlockIter {
    data: Bytes,
    offset: usize,
}

pub fn iter_blocks(data: Bytes) -> BlockIter {
    BlockIter { data, offset: 0 }
}

impl Iterator for BlockIter {
    type Item = Result<HandshakeBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        match next_block(&self.data.slice(self.offset..)) {
            Some((block, consumed)) => {
                self.offset += consumed;
                Some(Ok(block))
            }
            None => {
                // Stop before running past the record end.
                self.offset = self.data.len();
                Some(Err(Error::alert(
                    AlertDescription::decode_error,
                    "truncated handshake block",
                )))
            }
        }
    }
}

/// Frames a body chunk as a complete handshake message.
pub fn encode_message(typ: HandshakeType, body: &Chunk) -> Bytes {
    let mut out = Chunk::with_capacity(4 + body.len());
    out.push_u8(typ.to_u8());
    out.push_u24(body.len());
    out.push_chunk(body);
    out.into_bytes()
}

/// Bounds-checked sequential reader over a block body.
struct Cursor {
    data: Bytes,
    offset: usize,
}

impl Cursor {
    fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    fn short(&self) -> Error {
        Error::alert(
            AlertDescription::decode_error,
            "handshake body ends prematurely",
        )
    }

    fn take_u8(&mut self) -> Result<u8> {
        if self.offset >= self.data.len() {
            return Err(self.short());
        }
        let v = self.data[self.offset];
        self.offset += 1;
        Ok(v)
    }

    fn take_u16(&mut self) -> Result<u16> {
        let hi = self.take_u8()?;
        let lo = self.take_u8()?;
        Ok(((hi as u16) << 8) | lo as u16)
    }

    fn take_u24(&mut self) -> Result<usize> {
        let hi = self.take_u8()? as usize;
        let mid = self.take_u8()? as usize;
        let lo = self.take_u8()? as usize;
        Ok((hi << 16) | (mid << 8) | lo)
    }

    fn take_bytes(&mut self, n: usize) -> Result<Bytes> {
        if self.offset + n > self.data.len() {
            return Err(self.short());
        }
        let out = self.data.slice(self.offset..self.offset + n);
        self.offset += n;
        Ok(out)
    }

    fn rest(&mut self) -> Bytes {
        let out = self.data.slice(self.offset..);
        self.offset = self.data.len();
        out
    }

    fn finished(&self) -> bool {
        self.offset == self.data.len()
    }
}

#[derive(Clone, Debug)]
pub struct ClientHello {
    pub version: ProtocolVersion,
    pub random: Bytes,
    pub session_id: Bytes,
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
    pub extensions: Vec<RawExtension>,
}

impl ClientHello {
    pub fn new(version: ProtocolVersion, random: [u8; 32], cipher_suites: Vec<u16>) -> Self {
        Self {
            version,
            random: Bytes::from(random.to_vec()),
            session_id: Bytes::new(),
            cipher_suites,
            // Only null compression is ever offered.
            compression_methods: vec![0],
            extensions: vec![],
        }
    }

    pub fn decode(body: Bytes) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let version = ProtocolVersion::new(cursor.take_u8()?, cursor.take_u8()?);
        let random = cursor.take_bytes(32)?;

        let session_len = cursor.take_u8()? as usize;
        let session_id = cursor.take_bytes(session_len)?;

        let suites_len = cursor.take_u16()? as usize;
        if suites_len % 2 != 0 {
            return Err(Error::alert(
                AlertDescription::decode_error,
                "odd cipher suite list length",
            ));
        }
        let mut cipher_suites = Vec::with_capacity(suites_len / 2);
        for _ in 0..suites_len / 2 {
            cipher_suites.push(cursor.take_u16()?);
        }

        let compression_len = cursor.take_u8()? as usize;
        let compression = cursor.take_bytes(compression_len)?;

        // Anything after the compression list is the extensions blob.
        let extensions = parse_extensions(&cursor.rest())?;

        Ok(Self {
            version,
            random,
            session_id,
            cipher_suites,
            compression_methods: compression.to_vec(),
            extensions,
        })
    }

    pub fn encode(&self) -> Chunk {
        let mut chunk = Chunk::new();
        chunk.push_u8(self.version.major);
        chunk.push_u8(self.version.minor);
        chunk.push_slice(&self.random);
        chunk.push_u8(self.session_id.len() as u8);
        chunk.push_slice(&self.session_id);
        chunk.push_u16((self.cipher_suites.len() * 2) as u16);
        for code in &self.cipher_suites {
            chunk.push_u16(*code);
        }
        chunk.push_u8(self.compression_methods.len() as u8);
        chunk.push_slice(&self.compression_methods);
        chunk
    }
}

#[derive(Clone, Debug)]
pub struct ServerHello {
    pub version: ProtocolVersion,
    pub random: Bytes,
    pub session_id: Bytes,
    pub cipher_suite: u16,
    pub compression_method: u8,
}

impl ServerHello {
    pub fn new(version: ProtocolVersion, random: [u8; 32], cipher_suite: u16) -> Self {
        Self {
            version,
            random: Bytes::from(random.to_vec()),
            session_id: Bytes::new(),
            cipher_suite,
            compression_method: 0,
        }
    }

    pub fn decode(body: Bytes) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let version = ProtocolVersion::new(cursor.take_u8()?, cursor.take_u8()?);
        let random = cursor.take_bytes(32)?;
        let session_len = cursor.take_u8()? as usize;
        let session_id = cursor.take_bytes(session_len)?;
        let cipher_suite = cursor.take_u16()?;
        let compression_method = cursor.take_u8()?;

        // This core negotiates no extensions, so a hello carrying them is
        // not decodable here.
        if !cursor.finished() {
            return Err(Error::alert(
                AlertDescription::decode_error,
                "unexpected trailing bytes in ServerHello",
            ));
        }

        Ok(Self {
            version,
            random,
            session_id,
            cipher_suite,
            compression_method,
        })
    }

    pub fn encode(&self) -> Chunk {
        let mut chunk = Chunk::new();
        chunk.push_u8(self.version.major);
        chunk.push_u8(self.version.minor);
        chunk.push_slice(&self.random);
        chunk.push_u8(self.session_id.len() as u8);
        chunk.push_slice(&self.session_id);
        chunk.push_u16(self.cipher_suite);
        chunk.push_u8(self.compression_method);
        chunk
    }
}

/// The certificate list: a 3-byte total length followed by 3-byte-length
/// prefixed DER entries, end-entity first.
#[derive(Clone, Debug)]
pub struct CertificatePayload {
    pub certificates: Vec<Bytes>,
}

impl CertificatePayload {
    pub fn decode(body: Bytes) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let total = cursor.take_u24()?;
        let list = cursor.take_bytes(total)?;
        if !cursor.finished() {
            return Err(Error::alert(
                AlertDescription::decode_error,
                "trailing bytes after certificate list",
            ));
        }

        let mut certificates = vec![];
        let mut entries = Cursor::new(list);
        while !entries.finished() {
            let len = entries.take_u24()?;
            certificates.push(entries.take_bytes(len)?);
        }

        Ok(Self { certificates })
    }

    pub fn encode(&self) -> Chunk {
        let total: usize = self.certificates.iter().map(|c| 3 + c.len()).sum();
        let mut chunk = Chunk::with_capacity(3 + total);
        chunk.push_u24(total);
        for cert in &self.certificates {
            chunk.push_u24(cert.len());
            chunk.push_slice(cert);
        }
        chunk
    }
}

/// RSA-only key exchange: a 2-byte length followed by the premaster secret
/// encrypted under the server's public key.
#[derive(Clone, Debug)]
pub struct ClientKeyExchange {
    pub encrypted_premaster: Bytes,
}

impl ClientKeyExchange {
    pub fn decode(body: Bytes) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let len = cursor.take_u16()? as usize;
        let encrypted_premaster = cursor.take_bytes(len)?;
        if !cursor.finished() {
            return Err(Error::alert(
                AlertDescription::decode_error,
                "inconsistent key exchange length",
            ));
        }
        Ok(Self {
            encrypted_premaster,
        })
    }

    pub fn encode(&self) -> Chunk {
        let mut chunk = Chunk::with_capacity(2 + self.encrypted_premaster.len());
        chunk.push_u16(self.encrypted_premaster.len() as u16);
        chunk.push_slice(&self.encrypted_premaster);
        chunk
    }
}

#[derive(Clone, Debug)]
pub struct Finished {
    pub verify_data: Bytes,
}

impl Finished {
    pub fn decode(body: Bytes) -> Result<Self> {
        Ok(Self { verify_data: body })
    }

    pub fn encode(&self) -> Chunk {
        let mut chunk = Chunk::with_capacity(self.verify_data.len());
        chunk.push_slice(&self.verify_data);
        chunk
    }
}

/// Typed view over a handshake block.
#[derive(Clone, Debug)]
pub enum HandshakeBody {
    HelloRequest,
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    Certificate(CertificatePayload),
    /// Recognised but carried opaque; never sent by this core.
    ServerKeyExchange(Bytes),
    /// Recognised but not honoured.
    CertificateRequest(Bytes),
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
}

impl HandshakeBody {
    pub fn decode(block: &HandshakeBlock) -> Result<Self> {
        let body = block.body.clone();
        Ok(match block.typ {
            HandshakeType::HelloRequest => {
                require_empty(&body, "HelloRequest carries no body")?;
                HandshakeBody::HelloRequest
            }
            HandshakeType::ClientHello => HandshakeBody::ClientHello(ClientHello::decode(body)?),
            HandshakeType::ServerHello => HandshakeBody::ServerHello(ServerHello::decode(body)?),
            HandshakeType::Certificate => {
                HandshakeBody::Certificate(CertificatePayload::decode(body)?)
            }
            HandshakeType::ServerKeyExchange => HandshakeBody::ServerKeyExchange(body),
            HandshakeType::CertificateRequest => HandshakeBody::CertificateRequest(body),
            HandshakeType::ServerHelloDone => {
                require_empty(&body, "ServerHelloDone carries no body")?;
                HandshakeBody::ServerHelloDone
            }
            HandshakeType::ClientKeyExchange => {
                HandshakeBody::ClientKeyExchange(ClientKeyExchange::decode(body)?)
            }
            HandshakeType::Finished => HandshakeBody::Finished(Finished::decode(body)?),
            HandshakeType::Unknown(_) => {
                return Err(Error::alert(
                    AlertDescription::decode_error,
                    "unknown handshake block type",
                ));
            }
        })
    }
}

fn require_empty(body: &Bytes, context: &'static str) -> Result<()> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(Error::alert(AlertDescription::decode_error, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher_suite::{TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_256_CBC_SHA};
    use crate::record::{TLS_1_0, TLS_1_2};

    #[test]
    fn client_hello_round_trip() {
        let hello = ClientHello::new(
            TLS_1_2,
            [7u8; 32],
            vec![TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_256_CBC_SHA],
        );
        let message = encode_message(HandshakeType::ClientHello, &hello.encode());

        let (block, consumed) = next_block(&message).unwrap();
        assert_eq!(consumed, message.len());
        assert_eq!(block.typ, HandshakeType::ClientHello);

        let decoded = match HandshakeBody::decode(&block).unwrap() {
            HandshakeBody::ClientHello(v) => v,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(decoded.version, TLS_1_2);
        assert_eq!(decoded.random.as_ref(), &[7u8; 32]);
        assert!(decoded.session_id.is_empty());
        assert_eq!(
            decoded.cipher_suites,
            vec![TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_256_CBC_SHA]
        );
        assert_eq!(decoded.compression_methods, vec![0]);
        assert!(decoded.extensions.is_empty());
    }

    #[test]
    fn client_hello_with_extensions_parses_them_opaquely() {
        let hello = ClientHello::new(TLS_1_0, [1u8; 32], vec![TLS_RSA_WITH_AES_128_CBC_SHA]);
        let mut body = hello.encode();
        // server_name extension shell.
        body.push_slice(&[0x00, 0x08, 0x00, 0x00, 0x00, 0x04, b't', b'e', b's', b't']);

        let decoded = ClientHello::decode(body.into_bytes()).unwrap();
        assert_eq!(decoded.extensions.len(), 1);
        assert_eq!(decoded.extensions[0].typ, 0);
        assert_eq!(decoded.extensions[0].data.as_ref(), b"test");
    }

    #[test]
    fn server_hello_rejects_trailing_bytes() {
        let hello = ServerHello::new(TLS_1_2, [9u8; 32], TLS_RSA_WITH_AES_128_CBC_SHA);
        let mut body = hello.encode();
        body.push_u8(0x00);
        assert!(ServerHello::decode(body.into_bytes()).is_err());
    }

    #[test]
    fn server_hello_round_trip() {
        let hello = ServerHello::new(TLS_1_0, [3u8; 32], TLS_RSA_WITH_AES_256_CBC_SHA);
        let decoded = ServerHello::decode(hello.encode().into_bytes()).unwrap();
        assert_eq!(decoded.version, TLS_1_0);
        assert_eq!(decoded.cipher_suite, TLS_RSA_WITH_AES_256_CBC_SHA);
        assert_eq!(decoded.compression_method, 0);
    }

    #[test]
    fn certificate_list_round_trip() {
        let payload = CertificatePayload {
            certificates: vec![Bytes::from_static(b"first"), Bytes::from_static(b"second")],
        };
        let decoded = CertificatePayload::decode(payload.encode().into_bytes()).unwrap();
        assert_eq!(decoded.certificates.len(), 2);
        assert_eq!(decoded.certificates[0].as_ref(), b"first");
        assert_eq!(decoded.certificates[1].as_ref(), b"second");
    }

    #[test]
    fn multiple_blocks_iterate_in_order() {
        let mut data = Vec::new();
        data.extend_from_slice(&encode_message(HandshakeType::ServerHelloDone, &Chunk::new()));
        data.extend_from_slice(&encode_message(
            HandshakeType::Finished,
            &Finished {
                verify_data: Bytes::from_static(&[0u8; 12]),
            }
            .encode(),
        ));

        let blocks: Vec<_> = iter_blocks(Bytes::from(data))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].typ, HandshakeType::ServerHelloDone);
        assert_eq!(blocks[1].typ, HandshakeType::Finished);
        assert_eq!(blocks[1].body.len(), 12);
    }

    #[test]
    fn partial_block_waits_for_more_data() {
        let message = encode_message(
            HandshakeType::Finished,
            &Finished {
                verify_data: Bytes::from_static(&[1u8; 12]),
            }
            .encode(),
        );

        // Header only, then header plus half the body.
        assert!(next_block(&message.slice(0..3)).is_none());
        assert!(next_block(&message.slice(0..9)).is_none());
        assert!(next_block(&message).is_some());

        // Iterating a truncated message is an error, not an infinite loop.
        let results: Vec<_> = iter_blocks(message.slice(0..9)).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn key_exchange_length_must_match() {
        let good = ClientKeyExchange {
            encrypted_premaster: Bytes::from_static(&[9u8; 16]),
        };
        let decoded = ClientKeyExchange::decode(good.encode().into_bytes()).unwrap();
        assert_eq!(decoded.encrypted_premaster.len(), 16);

        let mut bad = good.encode();
        bad.push_u8(0xff);
        assert!(ClientKeyExchange::decode(bad.into_bytes()).is_err());
    }
}

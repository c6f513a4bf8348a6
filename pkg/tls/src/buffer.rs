use bytes::Bytes;

use crate::utils::u24_to_be_bytes;

/// Append-only byte sequence used to assemble record and handshake bodies
/// without committing to a final length until serialized.
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    data: Vec<u8>,
}

impl Chunk {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn push_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn push_u24(&mut self, value: usize) {
        self.data.extend_from_slice(&u24_to_be_bytes(value));
    }

    pub fn push_slice(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
    }

    pub fn push_chunk(&mut self, other: &Chunk) {
        self.data.extend_from_slice(&other.data);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_encodes_wire_integers() {
        let mut c = Chunk::new();
        c.push_u8(0x16);
        c.push_u16(0x0301);
        c.push_u24(0x012345);
        c.push_slice(&[0xaa, 0xbb]);
        assert_eq!(
            c.into_bytes().as_ref(),
            &[0x16, 0x03, 0x01, 0x01, 0x23, 0x45, 0xaa, 0xbb]
        );
    }
}

//! RC4 stream cipher. Kept in-crate because the rest of the primitive
//! stack has no equivalent; consumed only through the cipher suite
//! factories for the 0x0004/0x0005 suites.

pub struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        assert!(!key.is_empty() && key.len() <= 256);

        let mut s = [0u8; 256];
        for (k, v) in s.iter_mut().enumerate() {
            *v = k as u8;
        }

        let mut j: u8 = 0;
        for i in 0..256 {
            j = j
                .wrapping_add(s[i])
                .wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }

        Self { s, i: 0, j: 0 }
    }

    /// Applies the keystream in place. Encryption and decryption are the
    /// same operation.
    pub fn process(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s[(self.s[self.i as usize].wrapping_add(self.s[self.j as usize])) as usize];
            *byte ^= k;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystream_matches_rfc6229_40bit_vector() {
        // RFC 6229, key 0x0102030405, first 16 keystream bytes.
        let mut cipher = Rc4::new(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        let mut data = [0u8; 16];
        cipher.process(&mut data);
        assert_eq!(
            data,
            [
                0xb2, 0x39, 0x63, 0x05, 0xf0, 0x3d, 0xc0, 0x27, 0xcc, 0xc3, 0x52, 0x4a, 0x0a,
                0x11, 0x18, 0xa8
            ]
        );
    }

    #[test]
    fn classic_plaintext_vector() {
        let mut cipher = Rc4::new(b"Key");
        let mut data = *b"Plaintext";
        cipher.process(&mut data);
        assert_eq!(
            data,
            [0xbb, 0xf3, 0x16, 0xe8, 0xd9, 0x40, 0xaf, 0x0a, 0xd3]
        );

        let mut decoder = Rc4::new(b"Key");
        decoder.process(&mut data);
        assert_eq!(&data, b"Plaintext");
    }

    #[test]
    fn separate_directions_keep_independent_state() {
        let mut a = Rc4::new(b"shared");
        let mut b = Rc4::new(b"shared");
        let mut first = *b"record one";
        let mut second = *b"record two";
        a.process(&mut first);
        a.process(&mut second);
        b.process(&mut first);
        b.process(&mut second);
        assert_eq!(&first, b"record one");
        assert_eq!(&second, b"record two");
    }
}

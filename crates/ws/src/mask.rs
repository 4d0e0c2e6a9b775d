//! Payload masking.
//!
//! A masking key is XORed cyclically over the payload. [`Masker`] remembers
//! its position in the key, so a payload can be masked or unmasked in pieces
//! of any size.

/// A source of masking keys and handshake nonces.
pub trait MaskSource {
    fn next_key(&mut self) -> [u8; 4];
}

impl MaskSource for fastrand::Rng {
    fn next_key(&mut self) -> [u8; 4] {
        self.u32(..).to_ne_bytes()
    }
}

impl<F> MaskSource for F
where
    F: FnMut() -> [u8; 4],
{
    fn next_key(&mut self) -> [u8; 4] {
        self()
    }
}

/// XORs `data` with `key`, starting at position `offset` of the key.
pub fn apply_mask(data: &mut [u8], key: [u8; 4], offset: usize) {
    let key = rotate(key, offset);
    let wide = u64::from_ne_bytes([key[0], key[1], key[2], key[3], key[0], key[1], key[2], key[3]]);

    let mut words = data.chunks_exact_mut(8);
    for word in &mut words {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(word);
        word.copy_from_slice(&(u64::from_ne_bytes(bytes) ^ wide).to_ne_bytes());
    }

    for (i, byte) in words.into_remainder().iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

const fn rotate(key: [u8; 4], offset: usize) -> [u8; 4] {
    let offset = offset & 3;
    [key[offset], key[(offset + 1) & 3], key[(offset + 2) & 3], key[(offset + 3) & 3]]
}

/// Streaming mask state of one frame payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Masker {
    key: [u8; 4],
    offset: usize,
}

impl Masker {
    pub fn new(key: [u8; 4]) -> Self {
        Self { key, offset: 0 }
    }

    pub fn key(&self) -> [u8; 4] {
        self.key
    }

    /// Position in the key where the next byte will be masked.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn apply(&mut self, data: &mut [u8]) {
        apply_mask(data, self.key, self.offset);
        self.offset = (self.offset + data.len()) & 3;
    }
}

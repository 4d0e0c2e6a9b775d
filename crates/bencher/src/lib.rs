//! Fixtures shared by the benchmarks.

/// A named wire capture.
#[derive(Debug, Copy, Clone)]
pub struct Fixture {
    name: &'static str,
    content: &'static [u8],
}

impl Fixture {
    pub const fn new(name: &'static str, content: &'static [u8]) -> Self {
        Self { name, content }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn content(&self) -> &'static [u8] {
        self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// The content repeated `count` times, as on a pipelined connection.
    pub fn pipelined(&self, count: usize) -> Vec<u8> {
        self.content.repeat(count)
    }
}

/// Piece sizes the parsers are fed with when measuring resumption.
pub const SPLITS: [usize; 3] = [1, 16, 512];

//! Byte range type shared between the hydrate and api modules.

/// An inclusive byte range, mirroring the server's `storage::ByteRange` shape
/// so range math reads the same on both sides of the wire.
#[derive(Debug, Clone, Copy)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

//! Buffer abstractions for XDR encoding/decoding
//!
//! This module provides the buffer types every message encoder and decoder
//! is written against.

mod read;
mod write;

pub use read::ReadBuffer;
pub use write::WriteBuffer;

/// Number of padding bytes that align `len` to four
#[inline]
pub fn padding(len: usize) -> usize {
    (4 - (len & 3)) & 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        assert_eq!(padding(0), 0);
        assert_eq!(padding(1), 3);
        assert_eq!(padding(2), 2);
        assert_eq!(padding(3), 1);
        assert_eq!(padding(4), 0);
        assert_eq!(padding(13), 3);
    }
}

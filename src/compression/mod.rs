//! Seam for the compressed DRM wrapper (`CDRM`).
//!
//! cdckit does not implement the wrapper's compression itself. Callers that
//! need to open compressed containers pass a [`Decompressor`] through
//! [`crate::formats::drm::DrmOptions`]; the container codec hands it the
//! whole wrapped stream and parses whatever comes back.
//!
//! ```
//! use cdckit::Result;
//! use cdckit::compression::Decompressor;
//!
//! struct Passthrough;
//!
//! impl Decompressor for Passthrough {
//!     fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
//!         Ok(input[4..].to_vec())
//!     }
//! }
//! ```

use crate::Result;

/// Magic of the compressed container wrapper, as raw bytes.
pub const CDRM_MAGIC: [u8; 4] = *b"CDRM";

/// Turns a compressed wrapper into the plain byte stream it contains.
pub trait Decompressor {
    /// `input` starts at the wrapper's magic and runs to the end of the
    /// stream. The returned bytes are parsed from offset 0.
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;
}

impl<F> Decompressor for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>>,
{
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        self(input)
    }
}

/// Whether `head` starts with the compressed wrapper magic.
pub fn is_compressed(head: &[u8]) -> bool {
    head.starts_with(&CDRM_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_wrapper() {
        assert!(is_compressed(b"CDRM\0\0\0\0"));
        assert!(!is_compressed(b"\x13\0\0\0"));
        assert!(!is_compressed(b"CD"));
    }

    #[test]
    fn closures_are_decompressors() {
        let d = |input: &[u8]| -> Result<Vec<u8>> { Ok(input.iter().rev().copied().collect()) };
        assert_eq!(d.decompress(&[1, 2, 3]).unwrap(), [3, 2, 1]);
    }
}

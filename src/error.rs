//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout cdckit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the codecs can produce.
///
/// Every error aborts the decode or encode call in progress; no codec
/// returns a partially populated model.
#[derive(Debug)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    BadMagic,
    /// A DRM version field is not one of the known values in either byte
    /// order.
    UnrecognizedVersion(u32),
    /// The version is known but its layout is not implemented.
    UnsupportedVariant(&'static str),
    /// A structural constraint was violated (message describes which one).
    Format(&'static str),
    /// A fully specified payload left this many bytes unconsumed.
    TrailingData(usize),
    /// The stream ended before a declared length could be satisfied.
    Truncated,
    /// PCD9 pixel format code outside the handled set.
    UnsupportedFormat(u32),
    /// A DRM section header has a reserved bit set in `unknown05`.
    UnsupportedSectionFlag(u8),
    /// A null-terminated string had no null terminator within its table.
    UnterminatedString,
    /// The input needs a capability the caller did not provide.
    Unsupported(&'static str),
    /// An underlying I/O operation failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadMagic => write!(f, "bad magic value"),
            Error::UnrecognizedVersion(v) => write!(f, "unrecognized version: {v:#010x}"),
            Error::UnsupportedVariant(s) => write!(f, "unsupported {s} variant"),
            Error::Format(s) => write!(f, "format error: {s}"),
            Error::TrailingData(n) => write!(f, "{n} trailing bytes after payload"),
            Error::Truncated => write!(f, "unexpected end of data"),
            Error::UnsupportedFormat(v) => write!(f, "unsupported texture format: {v:#x}"),
            Error::UnsupportedSectionFlag(v) => write!(f, "unsupported section flag: {v:#04x}"),
            Error::UnterminatedString => write!(f, "unterminated string"),
            Error::Unsupported(s) => write!(f, "unsupported: {s}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Io(e)
        }
    }
}

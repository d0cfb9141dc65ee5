//! Low-level I/O primitives shared by all codecs.
//!
//! Each read function consumes exactly the bytes it promises or returns
//! [`Error::Truncated`]. Byte order is always passed per call as `le`; there
//! is no stream-wide default.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::{Error, Result};

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

/// Read a `u16` with caller-supplied endianness.
#[inline]
pub(crate) fn end_u16<R: Read>(r: &mut R, le: bool) -> Result<u16> {
    let b = bytesa::<2>(r)?;
    Ok(if le {
        u16::from_le_bytes(b)
    } else {
        u16::from_be_bytes(b)
    })
}

/// Read a `u32` with caller-supplied endianness.
#[inline]
pub(crate) fn end_u32<R: Read>(r: &mut R, le: bool) -> Result<u32> {
    let b = bytesa::<4>(r)?;
    Ok(if le {
        u32::from_le_bytes(b)
    } else {
        u32::from_be_bytes(b)
    })
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
///
/// The buffer grows as data arrives, so a corrupt length field cannot force
/// a huge allocation before the stream runs dry.
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = Vec::new();
    r.by_ref().take(len as u64).read_to_end(&mut b)?;
    if b.len() != len {
        return Err(Error::Truncated);
    }
    Ok(b)
}

/// Look at the next `N` bytes without consuming them.
pub(crate) fn peek<R: Read + Seek, const N: usize>(r: &mut R) -> Result<[u8; N]> {
    let b = bytesa::<N>(r)?;
    r.seek(SeekFrom::Current(-(N as i64)))?;
    Ok(b)
}

/// Bytes left between the current position and the end of the stream.
pub(crate) fn remaining<R: Seek>(r: &mut R) -> Result<u64> {
    let pos = r.stream_position()?;
    let end = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(pos))?;
    Ok(end.saturating_sub(pos))
}

/// Read a fixed-width, null-padded single-byte string.
///
/// Everything from the first `0x00` onward is padding.
pub(crate) fn fixed_string<R: Read>(r: &mut R, width: usize) -> Result<String> {
    let buf = bytesv(r, width)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Read a null-terminated string byte-by-byte from a reader.
pub(crate) fn read_null_string<R: Read>(r: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = u8(r)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Split a string table into its null-terminated entries.
///
/// The table must end exactly on a terminator; a dangling tail returns
/// [`Error::UnterminatedString`].
pub(crate) fn null_strings(buf: &[u8]) -> Result<Vec<String>> {
    let mut cur = io::Cursor::new(buf);
    let mut out = Vec::new();
    while (cur.position() as usize) < buf.len() {
        let s = read_null_string(&mut cur).map_err(|e| match e {
            Error::Truncated => Error::UnterminatedString,
            e => e,
        })?;
        out.push(s);
    }
    Ok(out)
}

/// Write one byte.
#[inline]
pub(crate) fn w_u8<W: Write>(w: &mut W, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a `u16` with caller-supplied endianness.
#[inline]
pub(crate) fn w_end_u16<W: Write>(w: &mut W, v: u16, le: bool) -> Result<()> {
    let b = if le { v.to_le_bytes() } else { v.to_be_bytes() };
    w.write_all(&b)?;
    Ok(())
}

/// Write a `u32` with caller-supplied endianness.
#[inline]
pub(crate) fn w_end_u32<W: Write>(w: &mut W, v: u32, le: bool) -> Result<()> {
    let b = if le { v.to_le_bytes() } else { v.to_be_bytes() };
    w.write_all(&b)?;
    Ok(())
}

/// Write `s` into a field of exactly `width` bytes, padding with `0x00`.
pub(crate) fn w_fixed_string<W: Write>(w: &mut W, s: &str, width: usize) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > width {
        return Err(Error::Format("string longer than its fixed field"));
    }
    w.write_all(bytes)?;
    w.write_all(&vec![0u8; width - bytes.len()])?;
    Ok(())
}

/// Write `s` followed by a `0x00` terminator. Returns the bytes written.
///
/// A string with an embedded null would read back as two strings, so it is
/// refused before anything is written.
pub(crate) fn w_null_string<W: Write>(w: &mut W, s: &str) -> Result<u32> {
    if s.contains('\0') {
        return Err(Error::Format("string contains a null byte"));
    }
    w.write_all(s.as_bytes())?;
    w.write_all(&[0])?;
    u32::try_from(s.len() + 1).map_err(|_| Error::Format("string too long"))
}

/// Overwrite a previously reserved `u32` at absolute `pos`, then return to
/// where the writer was.
pub(crate) fn patch_u32<W: Write + Seek>(w: &mut W, pos: u64, v: u32, le: bool) -> Result<()> {
    let resume = w.stream_position()?;
    w.seek(SeekFrom::Start(pos))?;
    w_end_u32(w, v, le)?;
    w.seek(SeekFrom::Start(resume))?;
    Ok(())
}

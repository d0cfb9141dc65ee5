//! BigFile - archive index ("SFAT" table) for packed asset archives.
//!
//! The index only describes where file blobs live; the blobs themselves are
//! packed into separate archive files and are never touched here.
//!
//! ## Layout
//! ```text
//! [0x00] Magic 0x54414653 ("SFAT" when LE)  (u32)
//! [0x04] Unknown04                          (u32)
//! [0x08] Unknown08                          (u32)
//! [0x0C] EntryCount                         (u32)
//! [0x10] Unknown10                          (u32)
//! [0x14] Label, null-padded ASCII           (32 bytes)
//! [0x34] Entries                            (EntryCount × 0x10)
//! ```
//!
//! ## Entry (0x10 bytes)
//! ```text
//! [0x00] NameHash                 (u32)
//! [0x04] Locale                   (u32)
//! [0x08] Size                     (u32)
//! [0x0C] Offset bits 8..24        (u16)
//! [0x0E] Offset bits 0..8         (u8)
//! [0x0F] FileIndex                (u8)
//! ```
//!
//! ## Endianness
//! Not self-describing. The caller states it; the magic is read in that byte
//! order and must match exactly.

use std::io::{Cursor, Read, Seek, Write};

use tracing::{debug, trace};

use crate::utils::{end_u16, end_u32, fixed_string, u8, w_end_u16, w_end_u32, w_fixed_string, w_u8};
use crate::{Error, Result};

/// Index magic as a `u32` in the archive's byte order.
pub const MAGIC: u32 = 0x5441_4653;

/// On-disk size of the fixed header, magic included.
pub const HEADER_SIZE: usize = 52;

/// On-disk size of one entry.
pub const ENTRY_SIZE: usize = 16;

/// Width of the label field.
pub const LABEL_SIZE: usize = 32;

/// Alignment the header area is padded to inside an archive.
pub const HEADER_ALIGNMENT: usize = 2048;

/// Largest offset the packed 24-bit field can carry.
pub const MAX_OFFSET: u32 = 0x00FF_FFFF;

/// Bytes a packer must reserve for an index of `count` entries.
///
/// The header plus entries, rounded up to the next multiple of 2048.
pub fn estimate_header_size(count: usize) -> usize {
    (HEADER_SIZE + ENTRY_SIZE * count).div_ceil(HEADER_ALIGNMENT) * HEADER_ALIGNMENT
}

/// One file record in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BigFileEntry {
    /// Hash of the file's path.
    pub name_hash: u32,
    /// Locale mask the file applies to.
    pub locale: u32,
    /// File size in bytes.
    pub size: u32,
    /// 24-bit offset reassembled from the split on-disk field.
    pub offset: u32,
    /// Which archive file of the set holds the data.
    pub file_index: u8,
}

/// Parsed BigFile index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BigFile {
    pub unknown04: u32,
    pub unknown08: u32,
    pub unknown10: u32,
    /// 32-byte label with its padding stripped.
    pub label: String,
    /// Entries in on-disk order.
    pub entries: Vec<BigFileEntry>,
}

impl BigFile {
    /// Parse an index from `r` using byte order `le`.
    ///
    /// `r` must be positioned at the magic.
    pub fn parse<R: Read>(r: &mut R, le: bool) -> Result<Self> {
        if end_u32(r, le)? != MAGIC {
            return Err(Error::BadMagic);
        }

        let unknown04 = end_u32(r, le)?;
        let unknown08 = end_u32(r, le)?;
        let count = end_u32(r, le)?;
        let unknown10 = end_u32(r, le)?;
        let label = fixed_string(r, LABEL_SIZE)?;
        debug!(count, le, label = %label, "bigfile header");

        let mut entries = Vec::new();
        for _ in 0..count {
            let name_hash = end_u32(r, le)?;
            let locale = end_u32(r, le)?;
            let size = end_u32(r, le)?;
            let offset = ((end_u16(r, le)? as u32) << 8) | u8(r)? as u32;
            let file_index = u8(r)?;
            trace!("entry {name_hash:#010x} size={size} offset={offset:#x} file={file_index}");
            entries.push(BigFileEntry {
                name_hash,
                locale,
                size,
                offset,
                file_index,
            });
        }

        Ok(Self {
            unknown04,
            unknown08,
            unknown10,
            label,
            entries,
        })
    }

    /// Encode the index with the same field order [`parse`](Self::parse)
    /// reads.
    ///
    /// Fails with [`Error::Format`] if an offset does not fit 24 bits or the
    /// label is wider than its field.
    pub fn write<W: Write>(&self, w: &mut W, le: bool) -> Result<()> {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| Error::Format("too many bigfile entries"))?;
        if self.label.len() > LABEL_SIZE {
            return Err(Error::Format("bigfile label wider than its field"));
        }
        if self.entries.iter().any(|e| e.offset > MAX_OFFSET) {
            return Err(Error::Format("bigfile entry offset exceeds 24 bits"));
        }

        w_end_u32(w, MAGIC, le)?;
        w_end_u32(w, self.unknown04, le)?;
        w_end_u32(w, self.unknown08, le)?;
        w_end_u32(w, count, le)?;
        w_end_u32(w, self.unknown10, le)?;
        w_fixed_string(w, &self.label, LABEL_SIZE)?;

        for e in &self.entries {
            w_end_u32(w, e.name_hash, le)?;
            w_end_u32(w, e.locale, le)?;
            w_end_u32(w, e.size, le)?;
            w_end_u16(w, (e.offset >> 8) as u16, le)?;
            w_u8(w, e.offset as u8)?;
            w_u8(w, e.file_index)?;
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self, le: bool) -> Result<Vec<u8>> {
        let capacity = HEADER_SIZE + ENTRY_SIZE * self.entries.len();
        let mut out = Cursor::new(Vec::with_capacity(capacity));
        self.write(&mut out, le)?;
        Ok(out.into_inner())
    }

    /// Bytes a packer must reserve for this index.
    pub fn header_size(&self) -> usize {
        estimate_header_size(self.entries.len())
    }

    /// First entry with the given name hash.
    pub fn find(&self, name_hash: u32) -> Option<&BigFileEntry> {
        self.entries.iter().find(|e| e.name_hash == name_hash)
    }

    /// Parse from an in-memory buffer.
    pub fn from_bytes(data: &[u8], le: bool) -> Result<Self> {
        Self::parse(&mut Cursor::new(data), le)
    }

    /// Parse and report how many bytes the index occupied.
    pub fn parse_with_len<R: Read + Seek>(r: &mut R, le: bool) -> Result<(Self, u64)> {
        let start = r.stream_position()?;
        let index = Self::parse(r, le)?;
        Ok((index, r.stream_position()? - start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(count: u32) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&MAGIC.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend_from_slice(&count.to_le_bytes());
        raw.extend_from_slice(&3u32.to_le_bytes());
        let mut label = b"pc-w\\bigfile".to_vec();
        label.resize(LABEL_SIZE, 0);
        raw.extend_from_slice(&label);
        raw
    }

    #[test]
    fn header_size_alignment() {
        assert_eq!(estimate_header_size(0), 2048);
        assert_eq!(estimate_header_size(1), 2048);
        assert_eq!(estimate_header_size(124), 2048);
        assert_eq!(estimate_header_size(125), 4096);
        assert_eq!(estimate_header_size(200), 4096);
    }

    #[test]
    fn empty_index() {
        let raw = header(0);
        assert_eq!(&raw[..4], b"SFAT");
        let big = BigFile::from_bytes(&raw, true).unwrap();
        assert!(big.entries.is_empty());
        assert_eq!(big.label, "pc-w\\bigfile");
        assert_eq!((big.unknown04, big.unknown08, big.unknown10), (1, 2, 3));
    }

    #[test]
    fn packed_offset() {
        let mut raw = header(1);
        raw.extend_from_slice(&hex::decode("efbeadde0100000000100000341278").unwrap());
        raw.push(4);
        let big = BigFile::from_bytes(&raw, true).unwrap();
        let e = big.entries[0];
        assert_eq!(e.name_hash, 0xDEADBEEF);
        assert_eq!(e.locale, 1);
        assert_eq!(e.size, 0x1000);
        assert_eq!(e.offset, 0x12_3478);
        assert_eq!(e.file_index, 4);
        assert_eq!(big.find(0xDEADBEEF), Some(&e));
    }

    #[test]
    fn bad_magic_has_no_swap_fallback() {
        let raw = header(0);
        assert!(matches!(BigFile::from_bytes(&raw, false), Err(Error::BadMagic)));
    }

    #[test]
    fn short_entry_table() {
        let mut raw = header(2);
        raw.extend_from_slice(&[0u8; ENTRY_SIZE]);
        assert!(matches!(BigFile::from_bytes(&raw, true), Err(Error::Truncated)));
    }

    #[test]
    fn write_matches_parse() {
        let big = BigFile {
            unknown04: 7,
            unknown08: 0,
            unknown10: 9,
            label: "label".into(),
            entries: vec![
                BigFileEntry {
                    name_hash: 1,
                    locale: 0xFFFF_FFFF,
                    size: 10,
                    offset: MAX_OFFSET,
                    file_index: 0,
                },
                BigFileEntry {
                    name_hash: 2,
                    locale: 0,
                    size: 20,
                    offset: 0x100,
                    file_index: 3,
                },
            ],
        };
        for le in [true, false] {
            let raw = big.to_bytes(le).unwrap();
            assert_eq!(raw.len(), HEADER_SIZE + 2 * ENTRY_SIZE);
            let (back, len) = BigFile::parse_with_len(&mut Cursor::new(&raw), le).unwrap();
            assert_eq!(back, big);
            assert_eq!(len as usize, raw.len());
        }
    }

    #[test]
    fn oversized_offset_rejected() {
        let big = BigFile {
            entries: vec![BigFileEntry {
                name_hash: 0,
                locale: 0,
                size: 0,
                offset: MAX_OFFSET + 1,
                file_index: 0,
            }],
            ..Default::default()
        };
        assert!(matches!(big.to_bytes(true), Err(Error::Format(_))));
    }

    #[test]
    fn rejected_index_writes_nothing() {
        let entry = BigFileEntry {
            name_hash: 0,
            locale: 0,
            size: 0,
            offset: 0,
            file_index: 0,
        };
        let late_bad_offset = BigFile {
            entries: vec![
                entry,
                BigFileEntry {
                    offset: MAX_OFFSET + 1,
                    ..entry
                },
            ],
            ..Default::default()
        };
        let wide_label = BigFile {
            label: "x".repeat(LABEL_SIZE + 1),
            ..Default::default()
        };
        for big in [late_bad_offset, wide_label] {
            let mut out = Vec::new();
            assert!(matches!(big.write(&mut out, true), Err(Error::Format(_))));
            assert!(out.is_empty());
        }
    }
}

//! DRM - section-based resource container.
//!
//! A DRM bundles the sections (textures, meshes, scripts, ...) that make up
//! one loadable unit of a level or object. Each section may carry a
//! resolver: a side-block of relocation data whose layout is owned by the
//! [`Resolver`] implementation, not by this module.
//!
//! ## Layout
//! ```text
//! [0x00] Version (14, 19 or 21; byte order auto-detected)  (u32)
//! [0x04] Header word 0 / StringTableA length               (u32)
//! [0x08] Header word 1 / StringTableB length               (u32)
//! [0x0C] Header word 2 (must be zero)                      (u32)
//! [0x10] Header word 3                                     (u32)
//! [0x14] SectionCount                                      (u32)
//! [0x18] Section headers                                   (SectionCount × 0x14)
//! [...]  StringTableB, StringTableA   (string-table layout only)
//! [...]  Per section: resolver bytes, then data bytes
//! ```
//!
//! ## Section header (0x14 bytes)
//! ```text
//! [0x00] DataSize                                 (u32)
//! [0x04] Type                                     (u8)
//! [0x05] Unknown05 (bit 0 reserved)               (u8)
//! [0x06] Unknown06                                (u16)
//! [0x08] Flags (bits 0..8) | ResolverLength << 8  (u32)
//! [0x0C] Id                                       (u32)
//! [0x10] Unknown10                                (u32)
//! ```
//!
//! All section headers precede all payloads, so decoding runs in two
//! phases: every header first, then every payload in header order.
//!
//! ## Layout variants
//! The string-table layout is not self-describing. The caller picks it with
//! [`DrmOptions::layout`]; with [`DrmLayout::WithStringTables`] header words
//! 0 and 1 hold the byte lengths of two tables of null-terminated strings
//! stored right after the section headers, table B first.
//!
//! ## Compression
//! A stream starting with `CDRM` is a compressed wrapper. It is handed to
//! the [`Decompressor`] in [`DrmOptions`] and the result is parsed instead.

use std::io::{Cursor, Read, Seek, Write};

use tracing::{debug, trace, warn};

use crate::compression::{Decompressor, is_compressed};
use crate::utils::{
    bytesv, end_u16, end_u32, null_strings, patch_u32, peek, remaining, u8, w_end_u16,
    w_end_u32, w_null_string, w_u8,
};
use crate::{Error, Result};

/// Version used by the legacy sub-format (not implemented).
pub const VERSION_LEGACY: u32 = 14;
/// The supported container version.
pub const VERSION: u32 = 19;
/// Version used by the extended sub-format (not implemented).
pub const VERSION_EXTENDED: u32 = 21;

const KNOWN_VERSIONS: [u32; 3] = [VERSION_LEGACY, VERSION, VERSION_EXTENDED];

/// Size of the header words following the version field.
pub const HEADER_SIZE: u64 = 20;
/// On-disk size of one section header.
pub const SECTION_HEADER_SIZE: u64 = 20;

/// Largest resolver the 24-bit length sub-field can describe.
pub const MAX_RESOLVER_LEN: u32 = 0x00FF_FFFF;

/// Which on-disk header shape a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrmLayout {
    /// Header words are diagnostic only; no string tables.
    #[default]
    Simple,
    /// Header words 0 and 1 are string table lengths.
    WithStringTables,
}

/// Per-call decode configuration.
#[derive(Clone, Copy, Default)]
pub struct DrmOptions<'a> {
    pub layout: DrmLayout,
    /// Used only when the input starts with the compressed wrapper magic.
    pub decompressor: Option<&'a dyn Decompressor>,
}

impl<'a> DrmOptions<'a> {
    pub fn with_layout(layout: DrmLayout) -> Self {
        Self {
            layout,
            decompressor: None,
        }
    }

    pub fn decompressor(mut self, d: &'a dyn Decompressor) -> Self {
        self.decompressor = Some(d);
        self
    }
}

impl std::fmt::Debug for DrmOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrmOptions")
            .field("layout", &self.layout)
            .field("decompressor", &self.decompressor.is_some())
            .finish()
    }
}

/// Codec for a section's resolver side-block.
///
/// Implemented by the resolver model itself. `parse` receives exactly the
/// bytes the section header declares; `to_bytes` must produce the bytes to
/// store, whose length becomes the header's resolver length.
pub trait Resolver: Sized {
    fn parse(data: &[u8], le: bool) -> Result<Self>;
    fn to_bytes(&self, le: bool) -> Result<Vec<u8>>;
}

/// Resolver that keeps the side-block as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResolver {
    pub data: Vec<u8>,
}

impl Resolver for RawResolver {
    fn parse(data: &[u8], _le: bool) -> Result<Self> {
        Ok(Self {
            data: data.to_vec(),
        })
    }

    fn to_bytes(&self, _le: bool) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}

/// Section content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionType {
    Generic,
    Empty,
    Animation,
    PushBufferWc,
    PushBuffer,
    Texture,
    Sound,
    DtpData,
    Script,
    ShaderLib,
    Material,
    Object,
    RenderMesh,
    CollisionMesh,
    StreamGroupList,
    /// Any value without a known name; kept so it encodes back unchanged.
    Other(u8),
}

impl From<u8> for SectionType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Generic,
            1 => Self::Empty,
            2 => Self::Animation,
            3 => Self::PushBufferWc,
            4 => Self::PushBuffer,
            5 => Self::Texture,
            6 => Self::Sound,
            7 => Self::DtpData,
            8 => Self::Script,
            9 => Self::ShaderLib,
            10 => Self::Material,
            11 => Self::Object,
            12 => Self::RenderMesh,
            13 => Self::CollisionMesh,
            14 => Self::StreamGroupList,
            v => Self::Other(v),
        }
    }
}

impl From<SectionType> for u8 {
    fn from(t: SectionType) -> Self {
        match t {
            SectionType::Generic => 0,
            SectionType::Empty => 1,
            SectionType::Animation => 2,
            SectionType::PushBufferWc => 3,
            SectionType::PushBuffer => 4,
            SectionType::Texture => 5,
            SectionType::Sound => 6,
            SectionType::DtpData => 7,
            SectionType::Script => 8,
            SectionType::ShaderLib => 9,
            SectionType::Material => 10,
            SectionType::Object => 11,
            SectionType::RenderMesh => 12,
            SectionType::CollisionMesh => 13,
            SectionType::StreamGroupList => 14,
            SectionType::Other(v) => v,
        }
    }
}

/// A section header exactly as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub data_size: u32,
    pub kind: u8,
    pub unknown05: u8,
    pub unknown06: u16,
    /// Bits 0..8: flags. Bits 8..32: resolver length in bytes.
    pub packed: u32,
    pub id: u32,
    pub unknown10: u32,
}

impl SectionHeader {
    /// Low 8 bits of the packed word.
    pub fn flags(&self) -> u8 {
        (self.packed & 0xFF) as u8
    }

    /// High 24 bits of the packed word.
    pub fn resolver_len(&self) -> u32 {
        self.packed >> 8
    }

    /// Combine `flags` and a resolver length into the packed word.
    pub fn pack(flags: u8, resolver_len: u32) -> Result<u32> {
        if resolver_len > MAX_RESOLVER_LEN {
            return Err(Error::Format("resolver longer than 24-bit length field"));
        }
        Ok(flags as u32 | (resolver_len << 8))
    }

    pub fn parse<R: Read>(r: &mut R, le: bool) -> Result<Self> {
        Ok(Self {
            data_size: end_u32(r, le)?,
            kind: u8(r)?,
            unknown05: u8(r)?,
            unknown06: end_u16(r, le)?,
            packed: end_u32(r, le)?,
            id: end_u32(r, le)?,
            unknown10: end_u32(r, le)?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W, le: bool) -> Result<()> {
        w_end_u32(w, self.data_size, le)?;
        w_u8(w, self.kind)?;
        w_u8(w, self.unknown05)?;
        w_end_u16(w, self.unknown06, le)?;
        w_end_u32(w, self.packed, le)?;
        w_end_u32(w, self.id, le)?;
        w_end_u32(w, self.unknown10, le)?;
        Ok(())
    }
}

/// One section of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<R = RawResolver> {
    pub id: u32,
    pub kind: SectionType,
    pub flags: u8,
    pub unknown05: u8,
    pub unknown06: u16,
    pub unknown10: u32,
    pub resolver: Option<R>,
    /// `None` when the header declares no data. Encoding rejects an empty
    /// `Some`, which could not be told apart from `None` on disk.
    pub data: Option<Vec<u8>>,
}

impl<R> Section<R> {
    /// A section with no resolver, no data and zeroed unknowns.
    pub fn new(id: u32, kind: SectionType) -> Self {
        Self {
            id,
            kind,
            flags: 0,
            unknown05: 0,
            unknown06: 0,
            unknown10: 0,
            resolver: None,
            data: None,
        }
    }

    /// Data bytes, empty when the section has none.
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }
}

impl<R: Resolver> Section<R> {
    /// Serialize the resolver and build the on-disk header.
    ///
    /// Rejects anything that would decode back as a different section.
    fn stage(&self, le: bool) -> Result<(SectionHeader, Vec<u8>)> {
        if self.unknown05 & 1 != 0 {
            return Err(Error::UnsupportedSectionFlag(self.unknown05));
        }
        if let SectionType::Other(v) = self.kind
            && SectionType::from(v) != self.kind
        {
            return Err(Error::Format("section type value has a named variant"));
        }
        if self.data.as_ref().is_some_and(Vec::is_empty) {
            return Err(Error::Format("empty section data must be None"));
        }

        let resolver = match &self.resolver {
            Some(r) => {
                let bytes = r.to_bytes(le)?;
                if bytes.is_empty() {
                    return Err(Error::Format("resolver serialized to zero bytes"));
                }
                bytes
            }
            None => Vec::new(),
        };
        let resolver_len = u32::try_from(resolver.len())
            .map_err(|_| Error::Format("resolver longer than 24-bit length field"))?;
        let data_size = u32::try_from(self.data().len())
            .map_err(|_| Error::Format("section data larger than 4 GiB"))?;

        let header = SectionHeader {
            data_size,
            kind: self.kind.into(),
            unknown05: self.unknown05,
            unknown06: self.unknown06,
            packed: SectionHeader::pack(self.flags, resolver_len)?,
            id: self.id,
            unknown10: self.unknown10,
        };
        Ok((header, resolver))
    }
}

/// Trailing string tables of the string-table layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringTables {
    /// Length in header word 0; stored second on disk.
    pub a: Vec<String>,
    /// Length in header word 1; stored first on disk.
    pub b: Vec<String>,
}

/// Parsed DRM container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drm<R = RawResolver> {
    /// Version normalized to its little-endian value.
    pub version: u32,
    /// Byte order detected from the version field.
    pub le: bool,
    /// Present only for the string-table layout.
    pub string_tables: Option<StringTables>,
    /// Sections in header order.
    pub sections: Vec<Section<R>>,
}

/// Work out the byte order from the raw (little-endian read) version field.
///
/// Both readings are tried; exactly one must be a known version.
fn detect_version(raw: u32) -> Result<(u32, bool)> {
    let candidates = [(raw, true), (raw.swap_bytes(), false)];
    let mut hits = candidates
        .into_iter()
        .filter(|(v, _)| KNOWN_VERSIONS.contains(v));
    match (hits.next(), hits.next()) {
        (Some(hit), None) => Ok(hit),
        (Some(_), Some(_)) => Err(Error::Format("version readable in both byte orders")),
        (None, _) => Err(Error::UnrecognizedVersion(raw)),
    }
}

fn check_version(version: u32) -> Result<()> {
    match version {
        VERSION => Ok(()),
        VERSION_LEGACY => Err(Error::UnsupportedVariant("legacy")),
        VERSION_EXTENDED => Err(Error::UnsupportedVariant("extended")),
        v => Err(Error::UnrecognizedVersion(v)),
    }
}

impl<R: Resolver> Drm<R> {
    /// An empty little-endian container of the supported version.
    pub fn new() -> Self {
        Self {
            version: VERSION,
            le: true,
            string_tables: None,
            sections: Vec::new(),
        }
    }

    /// Parse a container from `r`.
    ///
    /// `r` must be positioned at the start of the container (or of its
    /// compressed wrapper).
    pub fn parse<S: Read + Seek>(r: &mut S, opts: &DrmOptions<'_>) -> Result<Self> {
        let head = peek::<_, 4>(r)?;
        if !is_compressed(&head) {
            return Self::parse_plain(r, opts.layout);
        }

        let decompressor = opts
            .decompressor
            .ok_or(Error::Unsupported("compressed DRM without a decompressor"))?;
        let mut packed = Vec::new();
        r.read_to_end(&mut packed)?;
        let plain = decompressor.decompress(&packed)?;
        debug!("CDRM: {} bytes -> {} bytes", packed.len(), plain.len());
        drop(packed);
        Self::parse_plain(&mut Cursor::new(plain), opts.layout)
    }

    /// Parse from an in-memory buffer.
    pub fn from_bytes(data: &[u8], opts: &DrmOptions<'_>) -> Result<Self> {
        Self::parse(&mut Cursor::new(data), opts)
    }

    fn parse_plain<S: Read + Seek>(r: &mut S, layout: DrmLayout) -> Result<Self> {
        let (version, le) = detect_version(end_u32(r, true)?)?;
        check_version(version)?;

        if remaining(r)? < HEADER_SIZE {
            return Err(Error::Truncated);
        }

        let words = [
            end_u32(r, le)?,
            end_u32(r, le)?,
            end_u32(r, le)?,
            end_u32(r, le)?,
        ];
        let section_count = end_u32(r, le)?;
        debug!(version, le, section_count, ?layout, "drm header");

        if words[2] != 0 {
            return Err(Error::Format("drm header word 0x0C must be zero"));
        }
        let table_lens = match layout {
            DrmLayout::Simple => {
                if words.iter().any(|&w| w != 0) {
                    warn!("drm header words not zero: {words:08x?}");
                }
                None
            }
            DrmLayout::WithStringTables => {
                if words[3] != 0 {
                    warn!("drm header word 0x10 not zero: {:#x}", words[3]);
                }
                Some((words[0], words[1]))
            }
        };

        if remaining(r)? < section_count as u64 * SECTION_HEADER_SIZE {
            return Err(Error::Truncated);
        }

        // Phase 1: the contiguous header block.
        let mut headers = Vec::with_capacity(section_count as usize);
        for _ in 0..section_count {
            headers.push(SectionHeader::parse(r, le)?);
        }

        let string_tables = match table_lens {
            Some((len_a, len_b)) => {
                let b = null_strings(&bytesv(r, len_b as usize)?)?;
                let a = null_strings(&bytesv(r, len_a as usize)?)?;
                trace!("string tables: {} + {} entries", a.len(), b.len());
                Some(StringTables { a, b })
            }
            None => None,
        };

        // Phase 2: payloads in header order.
        let mut sections = Vec::with_capacity(headers.len());
        for h in &headers {
            if h.unknown05 & 1 != 0 {
                return Err(Error::UnsupportedSectionFlag(h.unknown05));
            }

            let resolver = match h.resolver_len() {
                0 => None,
                len => Some(R::parse(&bytesv(r, len as usize)?, le)?),
            };
            let data = match h.data_size {
                0 => None,
                len => Some(bytesv(r, len as usize)?),
            };
            trace!(
                "section {:#010x} type={} data={} resolver={}",
                h.id,
                h.kind,
                h.data_size,
                h.resolver_len()
            );

            sections.push(Section {
                id: h.id,
                kind: SectionType::from(h.kind),
                flags: h.flags(),
                unknown05: h.unknown05,
                unknown06: h.unknown06,
                unknown10: h.unknown10,
                resolver,
                data,
            });
        }

        Ok(Self {
            version,
            le,
            string_tables,
            sections,
        })
    }

    /// Encode the container.
    ///
    /// Resolver lengths and string table lengths are derived from what is
    /// written, never taken from stale header values. `w` must be seekable
    /// because the table lengths are patched in afterwards. Every section
    /// and string is checked before the first byte goes out.
    pub fn write<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        check_version(self.version)?;
        let le = self.le;

        let count = u32::try_from(self.sections.len())
            .map_err(|_| Error::Format("too many drm sections"))?;
        let staged = self
            .sections
            .iter()
            .map(|s| s.stage(le))
            .collect::<Result<Vec<_>>>()?;
        if let Some(tables) = &self.string_tables
            && tables.a.iter().chain(&tables.b).any(|s| s.contains('\0'))
        {
            return Err(Error::Format("string contains a null byte"));
        }

        w_end_u32(w, self.version, le)?;
        let table_len_pos = w.stream_position()?;
        for _ in 0..4 {
            w_end_u32(w, 0, le)?;
        }
        w_end_u32(w, count, le)?;

        for (header, _) in &staged {
            header.write(w, le)?;
        }

        if let Some(tables) = &self.string_tables {
            let mut len_b = 0u32;
            for s in &tables.b {
                len_b += w_null_string(w, s)?;
            }
            let mut len_a = 0u32;
            for s in &tables.a {
                len_a += w_null_string(w, s)?;
            }
            patch_u32(w, table_len_pos, len_a, le)?;
            patch_u32(w, table_len_pos + 4, len_b, le)?;
        }

        for (s, (_, resolver)) in self.sections.iter().zip(&staged) {
            w.write_all(resolver)?;
            w.write_all(s.data())?;
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.write(&mut out)?;
        Ok(out.into_inner())
    }

    /// Layout this container encodes with.
    pub fn layout(&self) -> DrmLayout {
        if self.string_tables.is_some() {
            DrmLayout::WithStringTables
        } else {
            DrmLayout::Simple
        }
    }

    /// Sections of the given kind, in order.
    pub fn sections_of_type(&self, kind: SectionType) -> impl Iterator<Item = &Section<R>> {
        self.sections.iter().filter(move |s| s.kind == kind)
    }

    /// First section with the given id.
    pub fn section_by_id(&self, id: u32) -> Option<&Section<R>> {
        self.sections.iter().find(|s| s.id == id)
    }
}

impl<R: Resolver> Default for Drm<R> {
    fn default() -> Self {
        Self::new()
    }
}

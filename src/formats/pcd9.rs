//! PCD9 - Direct3D 9 style texture with a full mip chain.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "PCD9"                           (u32 LE 0x39444350)
//! [0x04] Format (D3D format code)               (u32 LE)
//! [0x08] DataSize (all mip levels)              (u32 LE)
//! [0x0C] Unknown0C                              (u32 LE)
//! [0x10] Width                                  (u16 LE)
//! [0x12] Height                                 (u16 LE)
//! [0x14] BitsPerPixel                           (u8)
//! [0x15] MipmapCount - 1                        (u8)
//! [0x16] Unknown16                              (u16 LE)
//! [0x18] Mip levels, largest first              (DataSize bytes)
//! ```
//!
//! ## Mip sizes
//! Level 0 has the header dimensions; each following level halves both
//! (floor), clamping to 1. A level occupies `w * h * 4` bytes for
//! A8R8G8B8, or `ceil(w/4) * ceil(h/4)` blocks of 8 (DXT1) or 16 (DXT3,
//! DXT5) bytes. The declared data size must match the sum exactly.
//!
//! Pixel conversion to and from block-compressed data is not done here; see
//! [`BlockTranscoder`].

use std::io::{Cursor, Read, Seek, Write};

use tracing::{debug, trace};

use crate::utils::{bytesv, end_u16, end_u32, patch_u32, u8, w_end_u16, w_end_u32, w_u8};
use crate::{Error, Result};

/// Texture magic as a little-endian `u32`.
pub const MAGIC: u32 = 0x3944_4350;

/// On-disk header size, magic included.
pub const HEADER_SIZE: u64 = 0x18;

const DATA_SIZE_OFFSET: u64 = 8;

/// Pixel formats, valued by their D3D format codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TextureFormat {
    A8R8G8B8 = 21,
    Dxt1 = 0x3154_5844,
    Dxt3 = 0x3354_5844,
    Dxt5 = 0x3554_5844,
}

impl TryFrom<u32> for TextureFormat {
    type Error = Error;

    fn try_from(v: u32) -> Result<Self> {
        match v {
            21 => Ok(Self::A8R8G8B8),
            0x3154_5844 => Ok(Self::Dxt1),
            0x3354_5844 => Ok(Self::Dxt3),
            0x3554_5844 => Ok(Self::Dxt5),
            v => Err(Error::UnsupportedFormat(v)),
        }
    }
}

impl TextureFormat {
    /// Bytes per 4×4 block, or `None` for uncompressed formats.
    pub fn block_size(self) -> Option<usize> {
        match self {
            Self::A8R8G8B8 => None,
            Self::Dxt1 => Some(8),
            Self::Dxt3 | Self::Dxt5 => Some(16),
        }
    }

    pub fn is_block_compressed(self) -> bool {
        self.block_size().is_some()
    }

    /// Exact byte size of one mip level of `width` × `height` pixels.
    pub fn level_size(self, width: u16, height: u16) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self.block_size() {
            None => w * h * 4,
            Some(block) => w.div_ceil(4) * h.div_ceil(4) * block,
        }
    }
}

/// One level of the mip chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mipmap {
    pub width: u16,
    pub height: u16,
    pub data: Vec<u8>,
}

/// Parsed PCD9 texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub format: TextureFormat,
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u8,
    pub unknown0c: u32,
    pub unknown16: u16,
    /// Level 0 is full resolution.
    pub mipmaps: Vec<Mipmap>,
}

/// Dimensions of every level of a `count`-level chain starting at
/// `width` × `height`.
pub fn mip_dimensions(width: u16, height: u16, count: usize) -> Vec<(u16, u16)> {
    let (mut w, mut h) = (width, height);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        w = w.max(1);
        h = h.max(1);
        out.push((w, h));
        w >>= 1;
        h >>= 1;
    }
    out
}

impl Texture {
    /// Parse a texture from `r`.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        if end_u32(r, true)? != MAGIC {
            return Err(Error::BadMagic);
        }

        let raw_format = end_u32(r, true)?;
        let data_size = end_u32(r, true)?;
        let unknown0c = end_u32(r, true)?;
        let width = end_u16(r, true)?;
        let height = end_u16(r, true)?;
        let bits_per_pixel = u8(r)?;
        let mipmap_count = 1 + u8(r)? as usize;
        let unknown16 = end_u16(r, true)?;
        debug!(
            "pcd9 {raw_format:#x} {width}x{height} bpp={bits_per_pixel} mips={mipmap_count} data={data_size}"
        );

        let scratch = bytesv(r, data_size as usize)?;
        let format = TextureFormat::try_from(raw_format)?;

        let mut data = scratch.as_slice();
        let mut mipmaps = Vec::with_capacity(mipmap_count);
        for (w, h) in mip_dimensions(width, height, mipmap_count) {
            let size = format.level_size(w, h);
            if data.len() < size {
                return Err(Error::Truncated);
            }
            let (level, rest) = data.split_at(size);
            trace!("mip {}: {w}x{h} {size} bytes", mipmaps.len());
            mipmaps.push(Mipmap {
                width: w,
                height: h,
                data: level.to_vec(),
            });
            data = rest;
        }

        if !data.is_empty() {
            return Err(Error::TrailingData(data.len()));
        }

        Ok(Self {
            format,
            width,
            height,
            bits_per_pixel,
            unknown0c,
            unknown16,
            mipmaps,
        })
    }

    /// Parse from an in-memory buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(&mut Cursor::new(data))
    }

    /// Encode the texture.
    ///
    /// Mip data is written as-is in level order; sizes are not checked
    /// against the format. The data size field is patched in afterwards.
    pub fn write<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        let count_minus_one = match self.mipmaps.len() {
            0 => return Err(Error::Format("texture has no mipmaps")),
            n @ 1..=256 => (n - 1) as u8,
            _ => return Err(Error::Format("more than 256 mipmaps")),
        };

        let start = w.stream_position()?;
        w_end_u32(w, MAGIC, true)?;
        w_end_u32(w, self.format as u32, true)?;
        w_end_u32(w, 0, true)?;
        w_end_u32(w, self.unknown0c, true)?;
        w_end_u16(w, self.width, true)?;
        w_end_u16(w, self.height, true)?;
        w_u8(w, self.bits_per_pixel)?;
        w_u8(w, count_minus_one)?;
        w_end_u16(w, self.unknown16, true)?;

        let mut data_size = 0u32;
        for mip in &self.mipmaps {
            w.write_all(&mip.data)?;
            data_size = u32::try_from(mip.data.len())
                .ok()
                .and_then(|n| data_size.checked_add(n))
                .ok_or(Error::Format("texture data larger than 4 GiB"))?;
        }

        patch_u32(w, start + DATA_SIZE_OFFSET, data_size, true)
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let capacity = HEADER_SIZE as usize + self.expected_data_size();
        let mut out = Cursor::new(Vec::with_capacity(capacity));
        self.write(&mut out)?;
        Ok(out.into_inner())
    }

    /// Sum of the level sizes the format requires for this mip chain.
    pub fn expected_data_size(&self) -> usize {
        mip_dimensions(self.width, self.height, self.mipmaps.len())
            .into_iter()
            .map(|(w, h)| self.format.level_size(w, h))
            .sum()
    }

    /// Decode the top mip level to RGBA8 pixels.
    ///
    /// A8R8G8B8 levels already hold R, G, B, A bytes and are copied; block
    /// formats go through `transcoder`. With `keep_alpha == false` every
    /// alpha byte is 0xFF. Returns `None` for a texture without mipmaps.
    pub fn to_rgba(
        &self,
        transcoder: &dyn BlockTranscoder,
        keep_alpha: bool,
    ) -> Result<Option<Mipmap>> {
        let Some(top) = self.mipmaps.first() else {
            return Ok(None);
        };

        let mut pixels = if self.format.is_block_compressed() {
            transcoder.decompress(&top.data, top.width, top.height, self.format)?
        } else {
            top.data.clone()
        };
        if !keep_alpha {
            for px in pixels.chunks_exact_mut(4) {
                px[3] = 0xFF;
            }
        }

        Ok(Some(Mipmap {
            width: top.width,
            height: top.height,
            data: pixels,
        }))
    }

    /// Replace the image of a single-level texture with RGBA8 pixels.
    ///
    /// The new image must have the texture's dimensions. A8R8G8B8 stores the
    /// pixels as given; block formats are compressed with `transcoder`.
    pub fn replace_image(
        &mut self,
        rgba: &[u8],
        width: u16,
        height: u16,
        transcoder: &dyn BlockTranscoder,
    ) -> Result<()> {
        if width != self.width || height != self.height {
            return Err(Error::Format("replacement image size differs from texture"));
        }
        if self.mipmaps.len() > 1 {
            return Err(Error::Unsupported("replacing textures with multiple mipmaps"));
        }
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(Error::Format("pixel buffer does not match dimensions"));
        }

        let data = if self.format.is_block_compressed() {
            transcoder.compress(rgba, width, height, self.format)?
        } else {
            rgba.to_vec()
        };
        debug!("replaced {width}x{height} image, {} bytes", data.len());

        self.mipmaps = vec![Mipmap {
            width,
            height,
            data,
        }];
        Ok(())
    }
}

/// Converts between RGBA8 pixels and block-compressed data.
pub trait BlockTranscoder {
    fn compress(
        &self,
        rgba: &[u8],
        width: u16,
        height: u16,
        format: TextureFormat,
    ) -> Result<Vec<u8>>;

    fn decompress(
        &self,
        data: &[u8],
        width: u16,
        height: u16,
        format: TextureFormat,
    ) -> Result<Vec<u8>>;
}

/// Stand-in for callers that only handle uncompressed textures.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranscoder;

impl BlockTranscoder for NoTranscoder {
    fn compress(&self, _: &[u8], _: u16, _: u16, _: TextureFormat) -> Result<Vec<u8>> {
        Err(Error::Unsupported("block compression"))
    }

    fn decompress(&self, _: &[u8], _: u16, _: u16, _: TextureFormat) -> Result<Vec<u8>> {
        Err(Error::Unsupported("block decompression"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(format: TextureFormat, w: u16, h: u16, mips: u8, payload: &[u8]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"PCD9");
        raw.extend_from_slice(&(format as u32).to_le_bytes());
        raw.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        raw.extend_from_slice(&0xCAFEu32.to_le_bytes());
        raw.extend_from_slice(&w.to_le_bytes());
        raw.extend_from_slice(&h.to_le_bytes());
        raw.push(32);
        raw.push(mips - 1);
        raw.extend_from_slice(&7u16.to_le_bytes());
        raw.extend_from_slice(payload);
        raw
    }

    #[test]
    fn block_arithmetic() {
        assert_eq!(TextureFormat::Dxt1.level_size(6, 6), 32);
        assert_eq!(TextureFormat::Dxt1.level_size(3, 3), 8);
        assert_eq!(TextureFormat::Dxt5.level_size(6, 6), 64);
        assert_eq!(TextureFormat::Dxt3.level_size(1, 1), 16);
        assert_eq!(TextureFormat::A8R8G8B8.level_size(3, 2), 24);
    }

    #[test]
    fn chain_clamps_to_one() {
        assert_eq!(
            mip_dimensions(8, 2, 5),
            [(8, 2), (4, 1), (2, 1), (1, 1), (1, 1)]
        );
        assert_eq!(mip_dimensions(0, 0, 1), [(1, 1)]);
    }

    #[test]
    fn dxt1_chain() {
        let payload: Vec<u8> = (0..40).collect();
        let tex = Texture::from_bytes(&raw(TextureFormat::Dxt1, 6, 6, 2, &payload)).unwrap();
        assert_eq!(tex.format, TextureFormat::Dxt1);
        assert_eq!(tex.unknown0c, 0xCAFE);
        assert_eq!(tex.unknown16, 7);
        assert_eq!(tex.bits_per_pixel, 32);
        assert_eq!(tex.mipmaps.len(), 2);
        assert_eq!((tex.mipmaps[0].width, tex.mipmaps[0].height), (6, 6));
        assert_eq!(tex.mipmaps[0].data, payload[..32]);
        assert_eq!((tex.mipmaps[1].width, tex.mipmaps[1].height), (3, 3));
        assert_eq!(tex.mipmaps[1].data, payload[32..]);
        assert_eq!(tex.expected_data_size(), 40);
    }

    #[test]
    fn trailing_byte_is_an_error() {
        let payload = vec![0u8; 41];
        assert!(matches!(
            Texture::from_bytes(&raw(TextureFormat::Dxt1, 6, 6, 2, &payload)),
            Err(Error::TrailingData(1))
        ));
    }

    #[test]
    fn short_level_is_truncated() {
        let payload = vec![0u8; 39];
        assert!(matches!(
            Texture::from_bytes(&raw(TextureFormat::Dxt1, 6, 6, 2, &payload)),
            Err(Error::Truncated)
        ));
    }

    #[test]
    fn declared_size_past_end() {
        let mut data = raw(TextureFormat::A8R8G8B8, 1, 1, 1, &[0; 4]);
        data.pop();
        assert!(matches!(Texture::from_bytes(&data), Err(Error::Truncated)));
    }

    #[test]
    fn unknown_format() {
        let mut data = raw(TextureFormat::A8R8G8B8, 1, 1, 1, &[0; 4]);
        data[4] = 50;
        assert!(matches!(
            Texture::from_bytes(&data),
            Err(Error::UnsupportedFormat(50))
        ));
    }

    #[test]
    fn bad_magic() {
        let mut data = raw(TextureFormat::A8R8G8B8, 1, 1, 1, &[0; 4]);
        data[0] = b'X';
        assert!(matches!(Texture::from_bytes(&data), Err(Error::BadMagic)));
    }

    #[test]
    fn encode_patches_data_size() {
        let payload: Vec<u8> = (0..40).collect();
        let original = raw(TextureFormat::Dxt1, 6, 6, 2, &payload);
        let tex = Texture::from_bytes(&original).unwrap();
        assert_eq!(tex.to_bytes().unwrap(), original);
    }

    #[test]
    fn encode_needs_a_mipmap() {
        let tex = Texture {
            format: TextureFormat::Dxt5,
            width: 4,
            height: 4,
            bits_per_pixel: 0,
            unknown0c: 0,
            unknown16: 0,
            mipmaps: Vec::new(),
        };
        assert!(matches!(tex.to_bytes(), Err(Error::Format(_))));
    }

    #[test]
    fn rgba_preview_of_true_color() {
        let data = raw(TextureFormat::A8R8G8B8, 1, 1, 1, &[1, 2, 3, 4]);
        let tex = Texture::from_bytes(&data).unwrap();
        let px = tex.to_rgba(&NoTranscoder, true).unwrap().unwrap();
        assert_eq!(px.data, [1, 2, 3, 4]);
        let px = tex.to_rgba(&NoTranscoder, false).unwrap().unwrap();
        assert_eq!(px.data, [1, 2, 3, 0xFF]);
        assert_eq!(tex.mipmaps[0].data, [1, 2, 3, 4]);
    }

    #[test]
    fn replace_true_color_image() {
        let data = raw(TextureFormat::A8R8G8B8, 1, 1, 1, &[0; 4]);
        let mut tex = Texture::from_bytes(&data).unwrap();
        tex.replace_image(&[10, 20, 30, 40], 1, 1, &NoTranscoder).unwrap();
        assert_eq!(tex.mipmaps[0].data, [10, 20, 30, 40]);
        let px = tex.to_rgba(&NoTranscoder, true).unwrap().unwrap();
        assert_eq!(px.data, [10, 20, 30, 40]);

        assert!(matches!(
            tex.replace_image(&[0; 16], 2, 2, &NoTranscoder),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn replace_rejects_mip_chains() {
        let data = raw(TextureFormat::A8R8G8B8, 2, 2, 2, &[0; 20]);
        let mut tex = Texture::from_bytes(&data).unwrap();
        assert!(matches!(
            tex.replace_image(&[0; 16], 2, 2, &NoTranscoder),
            Err(Error::Unsupported(_))
        ));
    }
}

//! Codecs for Crystal Dynamics asset formats.
//!
//! Every codec follows the same conventions:
//!
//! * **Decode** with `parse` over a [`std::io::Read`] (plus
//!   [`std::io::Seek`] where the format needs to peek or measure), or with
//!   `from_bytes` over a slice.
//! * **Encode** with `write` over a [`std::io::Write`] + [`std::io::Seek`]
//!   target, or with `to_bytes`. Length fields that depend on what follows
//!   them are written as placeholders and patched once the payload is out.
//! * **All or nothing** - any malformed record aborts the whole call with
//!   the specific [`crate::Error`] kind. There is no partial result.
//! * **Collaborators are injected** - the compressed wrapper, resolver
//!   side-blocks and block compression are reached through traits
//!   ([`crate::compression::Decompressor`], [`drm::Resolver`],
//!   [`pcd9::BlockTranscoder`]) so they can be swapped or faked.
//!
//! ## Format overview
//!
//! | Module      | Format  | Description |
//! |-------------|---------|-------------|
//! | [`bigfile`] | BigFile | Archive index: hash, locale, size and packed offset per file |
//! | [`drm`]     | DRM     | Section container with resolvers and optional string tables |
//! | [`pcd9`]    | PCD9    | Texture with an A8R8G8B8 or DXT1/3/5 mip chain |

pub mod bigfile;
pub mod drm;
pub mod pcd9;

//! **cdckit** - codecs for Crystal Dynamics game asset formats.
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::bigfile`] | BigFile - archive index |
//! | [`formats::drm`]     | DRM - section container (plain, or via a [`compression::Decompressor`]) |
//! | [`formats::pcd9`]    | PCD9 - texture with mip chain |
//!
//! Decoders log through [`tracing`]; install a subscriber to see them.

pub mod compression;
pub mod error;
pub mod formats;
mod utils;

pub use error::{Error, Result};

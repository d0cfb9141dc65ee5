use std::env;
use std::fs;

use cdckit::formats::bigfile::BigFile;
use cdckit::formats::drm::{Drm, DrmLayout, DrmOptions};
use cdckit::formats::pcd9::Texture;
use cdckit::{Error, Result};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .ok_or(Error::Unsupported("usage: inspect <file> [--string-tables]"))?;
    let layout = match args.next().as_deref() {
        Some("--string-tables") => DrmLayout::WithStringTables,
        _ => DrmLayout::Simple,
    };
    let data = fs::read(&path)?;

    match data.get(..4) {
        Some(b"SFAT") | Some(b"TAFS") => {
            let big = BigFile::from_bytes(&data, data.starts_with(b"SFAT"))?;
            println!("bigfile '{}': {} entries", big.label, big.entries.len());
            for e in &big.entries {
                println!(
                    "  {:08X} locale={:08X} size={} offset={:#x} file={}",
                    e.name_hash, e.locale, e.size, e.offset, e.file_index
                );
            }
        }
        Some(b"PCD9") => {
            let tex = Texture::from_bytes(&data)?;
            println!("texture {:?} {}x{}", tex.format, tex.width, tex.height);
            for (i, mip) in tex.mipmaps.iter().enumerate() {
                println!("  mip {i}: {}x{} {} bytes", mip.width, mip.height, mip.data.len());
            }
        }
        _ => {
            let drm: Drm = Drm::from_bytes(&data, &DrmOptions::with_layout(layout))?;
            let order = if drm.le { "LE" } else { "BE" };
            println!("drm v{} {order}: {} sections", drm.version, drm.sections.len());
            for s in &drm.sections {
                println!(
                    "  {:08X} {:?} data={} resolver={}",
                    s.id,
                    s.kind,
                    s.data().len(),
                    s.resolver.as_ref().map_or(0, |r| r.data.len())
                );
            }
        }
    }

    Ok(())
}

use crate::archive::Archive;
use crate::codec::{BinaryCodec, Codec, JsonCodec};
use crate::pass::{self, PassReport};
use crate::struct_type::TypeRegistry;
use crate::universe::Universe;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// `.json` files use the JSON codec; everything else is binary.
pub fn codec_for(path: &str) -> Box<dyn Codec> {
    let is_json = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Box::new(JsonCodec::pretty())
    } else {
        Box::new(BinaryCodec)
    }
}

pub fn save(path: &str, archive: &Archive) -> Result<()> {
    let mut data = Vec::new();
    codec_for(path)
        .encode(archive.root(), &mut data)
        .with_context(|| format!("Failed to encode archive for: {}", path))?;
    fs::write(path, data).with_context(|| format!("Failed to write to file: {}", path))?;
    Ok(())
}

pub fn load(path: &str) -> Result<Archive> {
    let data = fs::read(path).with_context(|| format!("Failed to read file: {}", path))?;
    let archive = codec_for(path)
        .decode(&data)
        .with_context(|| format!("Failed to decode archive: {}", path))?;
    Ok(archive)
}

pub fn save_universe(path: &str, universe: &mut Universe) -> Result<PassReport> {
    let mut archive = Archive::new();
    let report = pass::save(universe, &mut archive);
    save(path, &archive)?;
    Ok(report)
}

pub fn load_universe(
    path: &str,
    registry: &TypeRegistry,
    universe: &mut Universe,
) -> Result<PassReport> {
    let archive = load(path)?;
    Ok(pass::load(&archive, registry, universe))
}

pub fn exists(path: &str) -> bool {
    Path::new(path).exists()
}

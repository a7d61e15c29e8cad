use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use correl_core::io::{load_image, read_raw_volume};
use correl_core::volume::{Mask, Volume};
use serde::de::DeserializeOwned;

/// Parse `z,y,x`.
pub fn parse_triple<T>(text: &str, what: &str) -> Result<[T; 3]>
where
    T: FromStr + Copy + Default,
    T::Err: Display,
{
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 3 {
        bail!("{} must be three comma-separated values z,y,x, got '{}'", what, text);
    }
    let mut out = [T::default(); 3];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {} component '{}': {}", what, part, e))?;
    }
    Ok(out)
}

/// Load a `.raw` f32 volume (needs `shape`) or a 2D grayscale image.
pub fn load_volume(path: &Path, shape: Option<&str>) -> Result<Volume> {
    let is_raw = path.extension().and_then(|e| e.to_str()) == Some("raw");
    let volume = if is_raw {
        let shape = shape.context("Raw volumes need --shape z,y,x")?;
        read_raw_volume(path, parse_triple(shape, "shape")?)
    } else {
        load_image(path)
    };
    volume.with_context(|| format!("Failed to load {}", path.display()))
}

/// Non-zero voxels of the mask file are excluded from correlation.
pub fn load_mask(path: &Path, shape: Option<&str>) -> Result<Mask> {
    Ok(load_volume(path, shape)?.mapv(|v| v != 0.0))
}

pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Invalid config {}", path.display()))
}

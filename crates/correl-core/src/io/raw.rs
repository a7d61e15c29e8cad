//! Headerless little-endian `f32` volumes, stored z-major.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array3;

use crate::error::{CorrelError, Result};
use crate::volume::Volume;

/// Memory-map `path` and decode it as a `shape` volume.
pub fn read_raw_volume(path: &Path, shape: [usize; 3]) -> Result<Volume> {
    let expected = shape
        .iter()
        .try_fold(std::mem::size_of::<f32>(), |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| CorrelError::InvalidParameter(format!("shape {:?} too large", shape)))?;

    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    if mmap.len() != expected {
        return Err(CorrelError::InvalidRaw {
            expected,
            found: mmap.len(),
        });
    }

    let mut values = vec![0.0f32; expected / 4];
    LittleEndian::read_f32_into(&mmap, &mut values);

    Array3::from_shape_vec((shape[0], shape[1], shape[2]), values)
        .map_err(|e| CorrelError::ShapeMismatch(e.to_string()))
}

/// Write a volume in the layout read by [`read_raw_volume`].
pub fn write_raw_volume(volume: &Volume, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for &v in volume.iter() {
        writer.write_f32::<LittleEndian>(v)?;
    }
    writer.flush()?;
    Ok(())
}

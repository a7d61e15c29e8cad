use std::path::Path;

use image::{GrayImage, ImageBuffer, ImageFormat, Luma};
use ndarray::Array3;

use crate::error::{CorrelError, Result};
use crate::volume::Volume;

/// Load a grayscale image into a `1 x height x width` volume scaled to [0, 1].
pub fn load_image(path: &Path) -> Result<Volume> {
    let gray = image::open(path)?.to_luma16();
    let (w, h) = gray.dimensions();
    let data = Array3::from_shape_fn((1, h as usize, w as usize), |(_, row, col)| {
        gray.get_pixel(col as u32, row as u32).0[0] as f32 / 65535.0
    });
    Ok(data)
}

/// Save a 2D volume as 16-bit TIFF.
pub fn save_tiff(volume: &Volume, path: &Path) -> Result<()> {
    let (h, w) = planar_dims(volume)?;
    let pixels: Vec<u16> = volume
        .iter()
        .map(|&v| (to_unit(v) * 65535.0) as u16)
        .collect();

    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| CorrelError::InvalidParameter("pixel buffer size mismatch".into()))?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save a 2D volume as 8-bit PNG.
pub fn save_png(volume: &Volume, path: &Path) -> Result<()> {
    let (h, w) = planar_dims(volume)?;
    let mut img = GrayImage::new(w as u32, h as u32);
    for ((_, row, col), &v) in volume.indexed_iter() {
        img.put_pixel(col as u32, row as u32, Luma([(to_unit(v) * 255.0) as u8]));
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a 2D volume, choosing the format from the file extension.
pub fn save_image(volume: &Volume, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => save_png(volume, path),
        _ => save_tiff(volume, path),
    }
}

fn planar_dims(volume: &Volume) -> Result<(usize, usize)> {
    let (nz, h, w) = volume.dim();
    if nz != 1 {
        return Err(CorrelError::InvalidParameter(format!(
            "only 2D images can be saved, got {} slices",
            nz
        )));
    }
    Ok((h, w))
}

/// NaN (outside the warped field) is written as black.
fn to_unit(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

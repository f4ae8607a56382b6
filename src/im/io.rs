use super::core::{Im, LabelIm};
use image::{DynamicImage, ImageResult};
use std::path::{Path, PathBuf};

// Helpers for 32-bit label PNG packing/unpacking
// -----------------------------------------------------------------------------
fn dim_mismatch_err() -> image::ImageError {
    image::ImageError::Parameter(image::error::ParameterError::from_kind(
        image::error::ParameterErrorKind::DimensionMismatch,
    ))
}

fn pack_u32_as_rgba8(pixels: &[u32]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::with_capacity(pixels.len() * 4);
    for v in pixels {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn unpack_rgba8_as_u32(raw_rgba: &[u8]) -> Result<Vec<u32>, image::ImageError> {
    if raw_rgba.len() % 4 != 0 {
        return Err(dim_mismatch_err());
    }

    let mut out: Vec<u32> = Vec::with_capacity(raw_rgba.len() / 4);
    for px in raw_rgba.chunks_exact(4) {
        out.push(u32::from_le_bytes([px[0], px[1], px[2], px[3]]));
    }
    Ok(out)
}

fn label_im_from_raw<T: Copy + Into<u32>>(w: u32, h: u32, raw: &[T]) -> ImageResult<LabelIm> {
    let arr: Vec<u32> = raw.iter().map(|&v| v.into()).collect();
    Im::from_vec(w as usize, h as usize, arr).ok_or_else(dim_mismatch_err)
}

// Label image I/O
// -----------------------------------------------------------------------------
impl Im<u32, 1> {
    /// Load an integer label image.
    ///
    /// 8 and 16 bit gray images are read as-is. RGBA8 images are treated as
    /// 32-bit labels packed little-endian (see `save_png`). Anything else is
    /// converted to 16 bit gray first.
    pub fn load_labels<P: AsRef<Path>>(path: P) -> ImageResult<Self> {
        match image::open(path)? {
            DynamicImage::ImageLuma8(buf) => label_im_from_raw(buf.width(), buf.height(), buf.as_raw()),
            DynamicImage::ImageLuma16(buf) => {
                label_im_from_raw(buf.width(), buf.height(), buf.as_raw())
            }
            DynamicImage::ImageRgba8(buf) => {
                let (w, h) = (buf.width() as usize, buf.height() as usize);
                let arr = unpack_rgba8_as_u32(buf.as_raw())?;
                Im::from_vec(w, h, arr).ok_or_else(dim_mismatch_err)
            }
            other => {
                let buf = other.into_luma16();
                label_im_from_raw(buf.width(), buf.height(), buf.as_raw())
            }
        }
    }

    // PNG has no 32-bit gray, so labels above u16::MAX are losslessly packed
    // into RGBA8 (little-endian bytes).
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let max = self.arr.iter().copied().max().unwrap_or(0);
        if max <= u16::MAX as u32 {
            let raw: Vec<u16> = self.arr.iter().map(|&v| v as u16).collect();
            let img =
                image::ImageBuffer::<image::Luma<u16>, _>::from_raw(self.w as u32, self.h as u32, raw)
                    .ok_or_else(dim_mismatch_err)?;
            return img.save_with_format(path, image::ImageFormat::Png);
        }

        let raw = pack_u32_as_rgba8(&self.arr);
        let img = image::RgbaImage::from_raw(self.w as u32, self.h as u32, raw)
            .ok_or_else(dim_mismatch_err)?;
        img.save_with_format(path, image::ImageFormat::Png)
    }
}

/// Image files in `dir` sorted by file name. Frame `i` of the stack is entry `i`.
pub fn list_label_images<P: AsRef<Path>>(dir: P) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "tif" | "tiff"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load every label image in `dir`, in file-name order.
pub fn load_label_stack<P: AsRef<Path>>(dir: P) -> crate::Result<Vec<LabelIm>> {
    let mut stack = Vec::new();
    for path in list_label_images(dir)? {
        stack.push(LabelIm::load_labels(&path)?);
    }
    Ok(stack)
}

// Tests
// -----------------------------------------------------------------------------

// src/sanitize.rs
//
// Component K: sanitizer. Flattens alpha against white, re-encodes as JPEG
// at a fixed quality with all metadata dropped - mozjpeg never writes EXIF/
// ICC segments unless explicitly asked to, so a plain encode is a strip.

use crate::error::{Result, SecurityError};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use mozjpeg::{ColorSpace, Compress};
use std::panic;
use std::path::Path;

/// Open `src`, flatten and re-encode as JPEG, write to `dst`. Never
/// overwrites `src`; returns `Ok(true)` on success.
pub fn sanitize_image(src: &Path, dst: &Path, quality: u8) -> Result<bool> {
    if src == dst {
        return Err(SecurityError::internal("sanitize_image: src and dst must differ"));
    }
    let data = std::fs::read(src).map_err(|e| SecurityError::file_read_failed(src.to_string_lossy(), &e))?;
    let decoded = image::load_from_memory(&data).map_err(|e| SecurityError::decode_failed(e.to_string()))?;

    let flattened = flatten_alpha(&decoded);
    let encoded = encode_jpeg(&flattened, quality)?;

    std::fs::write(dst, encoded).map_err(|e| SecurityError::sanitize_write_failed(dst.to_string_lossy(), &e))?;
    Ok(true)
}

fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    match img {
        DynamicImage::ImageRgba8(rgba) => {
            let (w, h) = rgba.dimensions();
            RgbImage::from_fn(w, h, |x, y| {
                let p = rgba.get_pixel(x, y);
                let alpha = p[3] as f64 / 255.0;
                let blend = |channel: u8| -> u8 {
                    ((channel as f64) * alpha + 255.0 * (1.0 - alpha)).round() as u8
                };
                Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
            })
        }
        other => other.to_rgb8(),
    }
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    // mozjpeg can panic internally on pathological input, so we catch it -
    // sanitization must never unwind into the caller.
    let result = panic::catch_unwind(|| encode_jpeg_inner(img, quality));
    result.map_err(|_| SecurityError::internal("mozjpeg panicked during encoding"))?
}

fn encode_jpeg_inner(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let (w, h) = img.dimensions();
    let mut comp = Compress::new(ColorSpace::JCS_RGB);
    comp.set_size(w as usize, h as usize);
    comp.set_quality(quality as f32);
    comp.set_color_space(ColorSpace::JCS_YCbCr);

    let mut output = Vec::new();
    {
        let mut writer = comp
            .start_compress(&mut output)
            .map_err(|e| SecurityError::internal(format!("mozjpeg start_compress failed: {e:?}")))?;
        let stride = w as usize * 3;
        for row in img.as_raw().chunks(stride) {
            writer
                .write_scanlines(row)
                .map_err(|e| SecurityError::internal(format!("mozjpeg write_scanlines failed: {e:?}")))?;
        }
        writer
            .finish()
            .map_err(|e| SecurityError::internal(format!("mozjpeg finish failed: {e:?}")))?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn write_test_png(path: &Path, rgba: RgbaImage) {
        let img = DynamicImage::ImageRgba8(rgba);
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        std::fs::write(path, buf).unwrap();
    }

    #[test]
    fn sanitize_produces_valid_jpeg_without_alpha() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.png");
        let dst = dir.path().join("out.jpg");
        write_test_png(&src, RgbaImage::from_pixel(32, 32, Rgba([10, 20, 30, 128])));

        let ok = sanitize_image(&src, &dst, 85).unwrap();
        assert!(ok);

        let out_bytes = std::fs::read(&dst).unwrap();
        assert_eq!(&out_bytes[0..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&out_bytes).unwrap();
        assert_eq!(decoded.dimensions(), (32, 32));
    }

    #[test]
    fn sanitize_rejects_identical_src_and_dst() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("same.png");
        write_test_png(&path, RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255])));
        let err = sanitize_image(&path, &path, 85).unwrap_err();
        assert!(matches!(err, SecurityError::Internal { .. }));
    }
}

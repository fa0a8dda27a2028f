// src/decode.rs
//
// Component A: image I/O and color conversion.
// Decodes a file into a 3-channel RGB8 array and preserves enough format
// information for downstream analyzers. JPEG goes through mozjpeg (backed by
// libjpeg-turbo, also exposing quantization tables); everything else goes
// through the `image` crate, mirroring this codebase's own decoder split.

use crate::error::{Result, SecurityError};
use crate::model::ImageFormatKind;
use image::{DynamicImage, RgbImage};
use mozjpeg::Decompress;
use std::panic;

/// A decoded image plus the format metadata the rest of the pipeline needs.
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormatKind,
    /// Average JPEG quantization table value, when known (used by component B).
    pub avg_quant: Option<f64>,
}

/// Sniff the container format from magic bytes. Returns `None` for anything
/// unrecognized; callers treat that as a structural issue.
pub fn sniff_format(data: &[u8]) -> Option<ImageFormatKind> {
    if data.len() < 12 {
        return None;
    }
    if data[0] == 0xFF && data[1] == 0xD8 {
        return Some(ImageFormatKind::Jpeg);
    }
    if data[0..4] == [0x89, 0x50, 0x4E, 0x47] {
        return Some(ImageFormatKind::Png);
    }
    if data[0..2] == *b"BM" {
        return Some(ImageFormatKind::Bmp);
    }
    if &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some(ImageFormatKind::Webp);
    }
    if &data[0..3] == b"GIF" {
        return Some(ImageFormatKind::Gif);
    }
    None
}

/// Decode raw bytes into RGB8, dispatching on the sniffed format.
pub fn decode(data: &[u8]) -> Result<DecodedImage> {
    let format = sniff_format(data)
        .ok_or_else(|| SecurityError::decode_failed("unrecognized image container"))?;

    match format {
        ImageFormatKind::Jpeg => decode_jpeg_mozjpeg(data),
        _ => decode_with_image_crate(data, format),
    }
}

fn decode_jpeg_mozjpeg(data: &[u8]) -> Result<DecodedImage> {
    if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
        return Err(SecurityError::decode_failed("mozjpeg: missing JPEG EOI marker"));
    }

    let avg_quant = average_quantization_value(data);

    // mozjpeg can panic internally on malformed input, so we catch it -
    // a corrupted JPEG must degrade to a DecodeError, never unwind into
    // the orchestrator (SPEC_FULL.md §7: the engine never raises to its caller).
    let result = panic::catch_unwind(|| decode_jpeg_mozjpeg_inner(data));

    let (width, height, flat) = result
        .map_err(|_| SecurityError::decode_failed("mozjpeg panicked during decode"))??;

    let rgb = RgbImage::from_raw(width, height, flat)
        .ok_or_else(|| SecurityError::decode_failed("mozjpeg: failed to build image from raw data"))?;

    Ok(DecodedImage {
        image: DynamicImage::ImageRgb8(rgb),
        format: ImageFormatKind::Jpeg,
        avg_quant,
    })
}

fn decode_jpeg_mozjpeg_inner(data: &[u8]) -> Result<(u32, u32, Vec<u8>)> {
    let decompress = Decompress::new_mem(data)
        .map_err(|e| SecurityError::decode_failed(format!("mozjpeg decompress init failed: {e:?}")))?;

    let mut decompress = decompress
        .rgb()
        .map_err(|e| SecurityError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}")))?;

    let width = decompress.width() as u32;
    let height = decompress.height() as u32;

    let pixels: Vec<[u8; 3]> = decompress
        .read_scanlines()
        .map_err(|e| SecurityError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}")))?;
    let flat: Vec<u8> = pixels.into_iter().flatten().collect();

    Ok((width, height, flat))
}

/// Parse average DQT (quantization table) value directly from JPEG bytes.
/// Standalone from mozjpeg's Decompress handle since libjpeg doesn't expose
/// the raw table values through the safe wrapper; this is a minimal JFIF
/// segment walk, not a full decoder.
pub fn average_quantization_value(data: &[u8]) -> Option<f64> {
    let mut i = 2usize; // skip SOI
    let mut values: Vec<u16> = Vec::new();
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        if marker == 0xD9 || marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            i += 2;
            continue;
        }
        if i + 4 > data.len() {
            break;
        }
        let seg_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if seg_len < 2 || i + 2 + seg_len > data.len() {
            break;
        }
        if marker == 0xDB {
            // DQT: one or more tables, each prefixed by a precision/id byte.
            let mut p = i + 4;
            let end = i + 2 + seg_len;
            while p < end {
                let pq_tq = data[p];
                let precision = pq_tq >> 4;
                p += 1;
                let entries = 64usize;
                let entry_size = if precision == 0 { 1 } else { 2 };
                if p + entries * entry_size > end {
                    break;
                }
                for k in 0..entries {
                    let v = if precision == 0 {
                        data[p + k] as u16
                    } else {
                        u16::from_be_bytes([data[p + 2 * k], data[p + 2 * k + 1]])
                    };
                    values.push(v);
                }
                p += entries * entry_size;
            }
        }
        if marker == 0xDA {
            break; // start of scan: no more tables follow
        }
        i += 2 + seg_len;
    }
    if values.is_empty() {
        None
    } else {
        Some(values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
    }
}

fn decode_with_image_crate(data: &[u8], format: ImageFormatKind) -> Result<DecodedImage> {
    let image = image::load_from_memory(data)
        .map_err(|e| SecurityError::decode_failed(format!("decode failed: {e}")))?;
    Ok(DecodedImage {
        image,
        format,
        avg_quant: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage as ImgRgbImage};
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = ImgRgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn sniffs_png_magic() {
        let data = encode_png(8, 8);
        assert_eq!(sniff_format(&data), Some(ImageFormatKind::Png));
    }

    #[test]
    fn sniffs_bmp_magic() {
        let mut data = vec![0u8; 64];
        data[0] = b'B';
        data[1] = b'M';
        assert_eq!(sniff_format(&data), Some(ImageFormatKind::Bmp));
    }

    #[test]
    fn decode_png_round_trips_dimensions() {
        let data = encode_png(16, 12);
        let decoded = decode(&data).unwrap();
        assert_eq!(decoded.format, ImageFormatKind::Png);
        assert_eq!(decoded.image.width(), 16);
        assert_eq!(decoded.image.height(), 12);
    }

    #[test]
    fn unrecognized_bytes_fail_to_decode() {
        let data = vec![0u8; 32];
        assert!(decode(&data).is_err());
    }
}

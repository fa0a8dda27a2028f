// src/structural.rs
//
// Component G: structural validators. Generic dimension/size sanity checks,
// the BMP header invariant suite, and MIME/extension category reconciliation.

use crate::model::{AnalyzerOutcome, FileCategory};
use image::DynamicImage;

const MAX_PIXELS: u64 = 25_000_000;
const MAX_ASPECT_RATIO: f64 = 20.0;
const ALPHA_STDDEV_THRESHOLD: f64 = 100.0;
const NOISE_VARIANCE_THRESHOLD: f64 = 5000.0;

/// Generic structural sanity check: size > 0, dimensions within a sane
/// envelope. Returns warnings rather than hard failures - callers decide
/// how these fold into the overall threat level.
pub fn generic_check(data_len: usize, width: u32, height: u32) -> AnalyzerOutcome {
    let mut outcome = AnalyzerOutcome::none();
    if data_len == 0 {
        return AnalyzerOutcome::new(true, 1.0).with_detail("reason", "empty file");
    }
    let pixels = width as u64 * height as u64;
    let mut anomalies = 0;
    if pixels > MAX_PIXELS {
        anomalies += 1;
        outcome.details.insert("oversized".into(), true.into());
    }
    let (long, short) = (width.max(height) as f64, width.min(height).max(1) as f64);
    if long / short > MAX_ASPECT_RATIO {
        anomalies += 1;
        outcome.details.insert("odd_aspect_ratio".into(), true.into());
    }
    outcome.details.insert("anomaly_count".into(), anomalies.into());
    outcome.detected = anomalies > 0;
    outcome
}

/// Pixel-level visual anomaly sweep: alpha-channel stddev and grayscale edge
/// noise. Alpha only applies to RGBA/LA inputs; both checks run against the
/// already-decoded image so they carry no extra I/O cost.
pub fn visual_pixel_anomalies(img: &DynamicImage) -> AnalyzerOutcome {
    let mut outcome = AnalyzerOutcome::none();
    let mut anomalies = 0u32;

    if let Some(alpha_stddev) = alpha_channel_stddev(img) {
        outcome.details.insert("alpha_stddev".into(), alpha_stddev.into());
        if alpha_stddev > ALPHA_STDDEV_THRESHOLD {
            anomalies += 1;
            outcome.details.insert("alpha_anomaly".into(), true.into());
        }
    }

    let noise_variance = grayscale_laplacian_variance(img);
    outcome.details.insert("noise_variance".into(), noise_variance.into());
    if noise_variance > NOISE_VARIANCE_THRESHOLD {
        anomalies += 1;
        outcome.details.insert("noise_excessive".into(), true.into());
    }

    outcome.details.insert("anomaly_count".into(), anomalies.into());
    outcome.detected = anomalies > 0;
    outcome
}

fn alpha_channel_stddev(img: &DynamicImage) -> Option<f64> {
    let alpha: Vec<u8> = match img {
        DynamicImage::ImageRgba8(rgba) => rgba.pixels().map(|p| p[3]).collect(),
        DynamicImage::ImageLumaA8(la) => la.pixels().map(|p| p[1]).collect(),
        _ => return None,
    };
    if alpha.is_empty() {
        return None;
    }
    let mean = alpha.iter().map(|&a| a as f64).sum::<f64>() / alpha.len() as f64;
    let variance = alpha.iter().map(|&a| (a as f64 - mean).powi(2)).sum::<f64>() / alpha.len() as f64;
    Some(variance.sqrt())
}

/// Variance of the 3x3 discrete Laplacian over the grayscale image - edges
/// and sensor/compression noise both drive this up; a flat photograph stays low.
fn grayscale_laplacian_variance(img: &DynamicImage) -> f64 {
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let at = |x: i64, y: i64| -> f64 {
        let cx = x.clamp(0, w as i64 - 1) as u32;
        let cy = y.clamp(0, h as i64 - 1) as u32;
        gray.get_pixel(cx, cy)[0] as f64
    };

    let mut values = Vec::with_capacity((w * h) as usize);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let lap = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            values.push(lap);
        }
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// BMP header invariants. Offsets are from the file start, little-endian,
/// as specified by the Windows BITMAPFILEHEADER/BITMAPINFOHEADER layout.
pub fn bmp_structural_check(data: &[u8], zero_padding_limit: u16) -> AnalyzerOutcome {
    let mut issues = Vec::new();

    if data.len() < 54 {
        return AnalyzerOutcome::new(true, 1.0).with_detail("reason", "BMP: file too short for header");
    }
    if &data[0..2] != b"BM" {
        return AnalyzerOutcome::new(true, 1.0).with_detail("reason", "BMP: bad magic bytes");
    }

    let declared_size = u32::from_le_bytes([data[2], data[3], data[4], data[5]]) as u64;
    let pixel_offset = u32::from_le_bytes([data[10], data[11], data[12], data[13]]) as u64;
    let dib_size = u32::from_le_bytes([data[14], data[15], data[16], data[17]]);
    let width = i32::from_le_bytes([data[18], data[19], data[20], data[21]]);
    let height = i32::from_le_bytes([data[22], data[23], data[24], data[25]]);
    let planes = u16::from_le_bytes([data[26], data[27]]);
    let bpp = u16::from_le_bytes([data[28], data[29]]);

    let real_size = data.len() as u64;

    let tolerance = (1024u64).max((declared_size as f64 * 0.03) as u64);
    if declared_size.abs_diff(real_size) > tolerance {
        issues.push("BMP: declared size deviates from real size beyond tolerance".to_string());
    }

    if pixel_offset < 54 || pixel_offset > declared_size {
        issues.push("BMP: pixel offset out of range".to_string());
    }

    if ![12u32, 40, 52, 56, 108, 124].contains(&dib_size) {
        issues.push("BMP: unsupported DIB header size".to_string());
    }

    if ![1u16, 4, 8, 16, 24, 32].contains(&bpp) {
        issues.push("BMP: unsupported bits-per-pixel".to_string());
    }

    if planes != 1 {
        issues.push("BMP: planes field must be 1".to_string());
    }

    if width <= 0 {
        issues.push("BMP: width must be positive".to_string());
    }

    let row_stride = (((bpp as u64) * width.unsigned_abs() as u64 + 31) / 32) * 4;
    let needed = pixel_offset + row_stride * height.unsigned_abs() as u64;
    if real_size < needed {
        issues.push("BMP: file truncated relative to declared dimensions".to_string());
    }

    let scan_len = data.len().min(4096);
    let head = &data[..scan_len];
    if contains_subslice(head, b"JFIF") || contains_subslice(head, &[0xFF, 0xD8]) || contains_subslice(head, b"PNG") {
        issues.push("BMP: embedded foreign format marker in header region".to_string());
    }

    let tail_end = data.len().min(256);
    if tail_end > 54 {
        let zero_count = data[54..tail_end].iter().filter(|&&b| b == 0).count();
        if zero_count > zero_padding_limit as usize {
            issues.push("BMP: excessive zero padding in header region".to_string());
        }
    }

    let detected = !issues.is_empty();
    let confidence = if detected { 1.0 } else { 0.0 };
    let mut outcome = AnalyzerOutcome::new(detected, confidence);
    outcome.details.insert("issues".into(), issues.clone().into());
    outcome
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Map a MIME type string to its top-level category.
pub fn mime_category(mime: &str) -> FileCategory {
    if mime.starts_with("image/") {
        FileCategory::Image
    } else if mime.starts_with("audio/") {
        FileCategory::Audio
    } else if mime.starts_with("video/") {
        FileCategory::Video
    } else if mime == "application/pdf" || mime == "text/plain" {
        FileCategory::Document
    } else {
        FileCategory::Unknown
    }
}

/// Map a claimed file extension to its expected category.
pub fn extension_category(extension: &str) -> FileCategory {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" => FileCategory::Image,
        "mp3" | "wav" | "ogg" | "m4a" => FileCategory::Audio,
        "mp4" | "avi" | "mkv" | "webm" => FileCategory::Video,
        "pdf" | "txt" => FileCategory::Document,
        _ => FileCategory::Unknown,
    }
}

/// Reconcile the claimed extension against the sniffed MIME category: they
/// must agree, or the orchestrator treats this as a structural issue.
pub fn categories_reconcile(claimed: FileCategory, detected: FileCategory) -> bool {
    matches!(
        (claimed, detected),
        (FileCategory::Image, FileCategory::Image)
            | (FileCategory::Audio, FileCategory::Audio)
            | (FileCategory::Video, FileCategory::Video)
            | (FileCategory::Document, FileCategory::Document)
            | (_, FileCategory::Unknown)
            | (FileCategory::Unknown, _)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_bmp(width: i32, height: i32) -> Vec<u8> {
        let bpp = 24u16;
        let row_stride = (((bpp as u64) * width.unsigned_abs() as u64 + 31) / 32) * 4;
        let pixel_offset = 54u32;
        let pixel_data_len = row_stride * height.unsigned_abs() as u64;
        let declared_size = pixel_offset as u64 + pixel_data_len;

        let mut data = vec![0u8; declared_size as usize];
        data[0] = b'B';
        data[1] = b'M';
        data[2..6].copy_from_slice(&(declared_size as u32).to_le_bytes());
        data[10..14].copy_from_slice(&pixel_offset.to_le_bytes());
        data[14..18].copy_from_slice(&40u32.to_le_bytes());
        data[18..22].copy_from_slice(&width.to_le_bytes());
        data[22..26].copy_from_slice(&height.to_le_bytes());
        data[26..28].copy_from_slice(&1u16.to_le_bytes());
        data[28..30].copy_from_slice(&bpp.to_le_bytes());
        // Make the 54..256 region non-zero so the padding heuristic doesn't fire.
        for b in data.iter_mut().take(256.min(data.len())).skip(54) {
            *b = 0xAB;
        }
        data
    }

    #[test]
    fn well_formed_bmp_passes() {
        let data = minimal_valid_bmp(16, 16);
        let outcome = bmp_structural_check(&data, 180);
        assert!(!outcome.detected, "issues: {:?}", outcome.details.get("issues"));
    }

    #[test]
    fn zero_pixel_offset_is_rejected() {
        let mut data = minimal_valid_bmp(16, 16);
        data[10..14].copy_from_slice(&0u32.to_le_bytes());
        let outcome = bmp_structural_check(&data, 180);
        assert!(outcome.detected);
    }

    #[test]
    fn declared_size_at_exact_tolerance_boundary_is_accepted() {
        let mut data = minimal_valid_bmp(16, 16);
        let real_size = data.len() as u64;
        let tolerance = (1024u64).max((real_size as f64 * 0.03) as u64);
        let new_declared = real_size + tolerance;
        data[2..6].copy_from_slice(&(new_declared as u32).to_le_bytes());
        let outcome = bmp_structural_check(&data, 180);
        let issues: Vec<String> = outcome
            .details
            .get("issues")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
            .unwrap_or_default();
        assert!(!issues.iter().any(|i| i.contains("deviates")));
    }

    #[test]
    fn one_byte_beyond_tolerance_is_rejected() {
        let mut data = minimal_valid_bmp(16, 16);
        let real_size = data.len() as u64;
        let tolerance = (1024u64).max((real_size as f64 * 0.03) as u64);
        let new_declared = real_size + tolerance + 1;
        data[2..6].copy_from_slice(&(new_declared as u32).to_le_bytes());
        let outcome = bmp_structural_check(&data, 180);
        assert!(outcome.detected);
    }

    #[test]
    fn too_short_file_is_rejected() {
        let data = vec![b'B', b'M'];
        let outcome = bmp_structural_check(&data, 180);
        assert!(outcome.detected);
    }

    #[test]
    fn generic_check_flags_empty_file() {
        let outcome = generic_check(0, 0, 0);
        assert!(outcome.detected);
    }

    #[test]
    fn generic_check_flags_oversized_image() {
        let outcome = generic_check(1000, 6000, 6000);
        assert!(outcome.detected);
    }

    #[test]
    fn flat_rgb_image_has_no_pixel_anomalies() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(32, 32, image::Rgb([40, 40, 40])));
        let outcome = visual_pixel_anomalies(&img);
        assert!(!outcome.detected);
    }

    #[test]
    fn high_variance_alpha_channel_is_an_anomaly() {
        let rgba = image::RgbaImage::from_fn(32, 32, |x, y| {
            let a = if (x + y) % 2 == 0 { 0 } else { 255 };
            image::Rgba([10, 10, 10, a])
        });
        let img = DynamicImage::ImageRgba8(rgba);
        let outcome = visual_pixel_anomalies(&img);
        assert!(outcome.detected);
        assert!(outcome.details.contains_key("alpha_anomaly"));
    }

    #[test]
    fn uniform_alpha_channel_is_not_an_anomaly() {
        let rgba = image::RgbaImage::from_pixel(16, 16, image::Rgba([10, 10, 10, 255]));
        let img = DynamicImage::ImageRgba8(rgba);
        let outcome = visual_pixel_anomalies(&img);
        assert!(!outcome.details.contains_key("alpha_anomaly"));
    }

    #[test]
    fn noisy_checkerboard_trips_noise_anomaly() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(40, 40, |x, y| {
            let v = if (x + y) % 2 == 0 { 0 } else { 255 };
            image::Rgb([v, v, v])
        }));
        let outcome = visual_pixel_anomalies(&img);
        assert!(outcome.details.contains_key("noise_excessive"));
    }

    #[test]
    fn category_reconciliation_allows_unknown_either_side() {
        assert!(categories_reconcile(FileCategory::Image, FileCategory::Unknown));
        assert!(categories_reconcile(FileCategory::Unknown, FileCategory::Video));
        assert!(!categories_reconcile(FileCategory::Image, FileCategory::Video));
    }
}

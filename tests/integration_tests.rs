// tests/integration_tests.rs
//
// End-to-end scenarios against the public `validate_file`/`sanitize_image`
// surface: clean images, LSB-embedded payloads, tool signatures, structural
// corruption, and the sanitize round-trip.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use stego_sentry::{sanitize_image, validate_file, ThreatLevel};
use tempfile::{tempdir, NamedTempFile};

fn write_png(rgb: &RgbImage) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(rgb.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    std::fs::write(file.path(), &buf).unwrap();
    file
}

fn natural_looking(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        let v = (((x * 37 + y * 59) ^ (x + y)) % 256) as u8;
        Rgb([v, v.wrapping_add(33), v.wrapping_add(91)])
    })
}

#[test]
fn clean_photo_like_image_reports_safe() {
    let img = natural_looking(320, 240);
    let file = write_png(&img);
    let report = validate_file(file.path(), "vacation.png");
    assert!(report.invariant_holds());
    assert!(report.threat_level <= ThreatLevel::Low);
}

#[test]
fn image_with_every_red_lsb_flipped_is_flagged() {
    let mut img = natural_looking(256, 256);
    for p in img.pixels_mut() {
        p[0] |= 1;
    }
    let file = write_png(&img);
    let report = validate_file(file.path(), "suspicious.png");
    assert!(!report.issues.is_empty() || report.threat_level > ThreatLevel::Safe);
}

#[test]
fn embedded_steghide_marker_is_critical_regardless_of_container() {
    let mut data = vec![0xFFu8, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(&[0u8; 64]);
    data.extend_from_slice(b"steghide-embedded-marker");
    data.extend_from_slice(&[0xFF, 0xD9]);
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &data).unwrap();

    let report = validate_file(file.path(), "cover.jpg");
    assert_eq!(report.threat_level, ThreatLevel::Critical);
    assert!(!report.is_safe);
}

#[test]
fn truncated_bmp_is_rejected_as_structurally_invalid() {
    let mut data = vec![0u8; 200];
    data[0] = b'B';
    data[1] = b'M';
    data[2..6].copy_from_slice(&2_000_000u32.to_le_bytes());
    data[10..14].copy_from_slice(&54u32.to_le_bytes());
    data[14..18].copy_from_slice(&40u32.to_le_bytes());
    data[18..22].copy_from_slice(&100i32.to_le_bytes());
    data[22..26].copy_from_slice(&100i32.to_le_bytes());
    data[26..28].copy_from_slice(&1u16.to_le_bytes());
    data[28..30].copy_from_slice(&24u16.to_le_bytes());

    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &data).unwrap();
    let report = validate_file(file.path(), "broken.bmp");
    assert!(!report.is_safe);
    assert!(report.threat_level >= ThreatLevel::High);
}

#[test]
fn mismatched_extension_is_flagged_but_not_necessarily_unsafe() {
    let img = natural_looking(64, 64);
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &buf).unwrap();

    // Claim it's an mp3 though the bytes are a PNG.
    let report = validate_file(file.path(), "track.mp3");
    assert!(report.issues.iter().any(|i| i.contains("mismatch")));
}

#[test]
fn sanitize_then_revalidate_produces_a_plain_jpeg() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("in.png");
    let dst = dir.path().join("out.jpg");
    let img = natural_looking(128, 96);
    std::fs::write(&src, {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    })
    .unwrap();

    let ok = sanitize_image(&src, &dst).unwrap();
    assert!(ok);

    let out = std::fs::read(&dst).unwrap();
    assert_eq!(&out[0..2], &[0xFF, 0xD8]);

    let report = validate_file(&dst, "out.jpg");
    assert!(report.invariant_holds());
}

#[test]
fn nonexistent_file_degrades_to_a_high_threat_report_without_panicking() {
    let report = validate_file(std::path::Path::new("/nonexistent/path/file.png"), "file.png");
    assert!(!report.is_safe);
    assert_eq!(report.threat_level, ThreatLevel::High);
}

#[test]
fn high_entropy_incompressible_blob_triggers_crypto_entropy_warning() {
    // Over the 100 KB threshold, PRNG-like bytes that zlib can't shrink.
    let mut state: u32 = 1234567;
    let data: Vec<u8> = (0..150_000)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 16) as u8
        })
        .collect();
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &data).unwrap();

    let report = validate_file(file.path(), "blob.bin");
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("Cryptographic") || w.contains("entropy")));
    assert!(report.metadata.contains_key("crypto_entropy"));
}

#[test]
fn rgba_image_with_erratic_alpha_channel_flags_visual_anomaly() {
    let rgba = image::RgbaImage::from_fn(64, 64, |x, y| {
        let a = if (x * 13 + y * 7) % 2 == 0 { 0 } else { 255 };
        image::Rgba([20, 30, 40, a])
    });
    let file = NamedTempFile::new().unwrap();
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    std::fs::write(file.path(), &buf).unwrap();

    let report = validate_file(file.path(), "checker.png");
    assert!(report.warnings.iter().any(|w| w.contains("alpha")));
}

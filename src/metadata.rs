// src/metadata.rs
//
// Component H: metadata scanner. Reads EXIF tags via kamadak-exif (read-only
// access is all this scanner needs), walks JPEG COM marker segments directly
// for the one tag EXIF doesn't cover, and flags suspicious substrings or
// oversized values across both.

use crate::model::AnalyzerOutcome;
use exif::{In, Reader, Tag, Value};
use std::io::Cursor;

const SUSPICIOUS_SUBSTRINGS: &[&str] = &["script", "eval", "exec", "base64", "stego"];
const SCANNED_TAGS: &[Tag] = &[Tag::Software, Tag::UserComment, Tag::ImageDescription];

pub fn scan(data: &[u8]) -> AnalyzerOutcome {
    let mut flagged_tags = Vec::new();
    let mut oversized = false;

    if let Ok(reader) = Reader::new().read_from_container(&mut Cursor::new(data)) {
        for &tag in SCANNED_TAGS {
            if let Some(field) = reader.get_field(tag, In::PRIMARY) {
                let text = field_to_string(&field.value);
                let lower = text.to_ascii_lowercase();
                if SUSPICIOUS_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
                    flagged_tags.push(tag.to_string());
                }
                if text.len() > 1000 || lower.contains("base64") {
                    oversized = true;
                }
            }
        }
    }

    // kamadak-exif has no tag constant for the JPEG COM segment (it isn't an
    // EXIF/TIFF field at all), so `Comment` is covered with a direct marker
    // walk instead, the same way decode.rs reads the DQT segments.
    for comment in jpeg_comment_segments(data) {
        let lower = comment.to_ascii_lowercase();
        if SUSPICIOUS_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
            flagged_tags.push("Comment".to_string());
        }
        if comment.len() > 1000 || lower.contains("base64") {
            oversized = true;
        }
    }

    let detected = !flagged_tags.is_empty() || oversized;
    let confidence = if detected { 0.6 } else { 0.0 };

    AnalyzerOutcome::new(detected, confidence)
        .with_detail("flagged_tags", flagged_tags)
        .with_detail("oversized_value", oversized)
}

/// Extract JPEG COM (0xFFFE) segment payloads as lossily-decoded text.
fn jpeg_comment_segments(data: &[u8]) -> Vec<String> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Vec::new();
    }
    let mut comments = Vec::new();
    let mut i = 2usize;
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
        let seg_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if seg_len < 2 || i + 2 + seg_len > data.len() {
            break;
        }
        if marker == 0xFE {
            let payload = &data[i + 4..i + 2 + seg_len];
            comments.push(String::from_utf8_lossy(payload).into_owned());
        }
        if marker == 0xDA {
            break; // start of scan: no more marker segments follow
        }
        i += 2 + seg_len;
    }
    comments
}

fn field_to_string(value: &Value) -> String {
    match value {
        Value::Ascii(vecs) => vecs
            .iter()
            .map(|v| String::from_utf8_lossy(v).to_string())
            .collect::<Vec<_>>()
            .join(" "),
        other => format!("{:?}", other),
    }
}

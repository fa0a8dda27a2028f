// src/signatures.rs
//
// Component I: signature scanner. Linear byte scan of the first 1 MB for
// stego-tool names and, for text-like extensions, malicious script markers.

const SCAN_LIMIT: usize = 1024 * 1024;

const STEGO_TOOL_MARKERS: &[&str] = &[
    "OpenStego",
    "steghide",
    "outguess",
    "jsteg",
    "F5-steganography",
    "camouflage",
    "SilentEye",
];

const SCRIPT_MARKERS: &[&str] = &[
    "<?php",
    "<script",
    "javascript:",
    "eval(",
    "exec(",
    "system(",
    "shell_exec(",
    "passthru(",
    "<iframe",
    "onload=",
    "onerror=",
    "<jsp:",
    "Runtime.exec",
];

const TEXT_LIKE_EXTENSIONS: &[&str] = &["html", "htm", "php", "js", "jsp", "asp", "txt", "xml"];

#[derive(Debug, Default, Clone)]
pub struct SignatureScanResult {
    pub stego_tool_found: Option<String>,
    pub script_marker_found: Option<String>,
}

/// Scans the first 1 MB of `data`, idempotent and bounded by construction
/// (it always looks at the same prefix regardless of how many times it runs).
pub fn scan(data: &[u8], extension: &str) -> SignatureScanResult {
    let window = &data[..data.len().min(SCAN_LIMIT)];

    let mut result = SignatureScanResult::default();

    for marker in STEGO_TOOL_MARKERS {
        if contains_ascii(window, marker) {
            result.stego_tool_found = Some((*marker).to_string());
            break;
        }
    }

    let ext_lower = extension.to_ascii_lowercase();
    if TEXT_LIKE_EXTENSIONS.contains(&ext_lower.as_str()) {
        for marker in SCRIPT_MARKERS {
            if contains_ascii(window, marker) {
                result.script_marker_found = Some((*marker).to_string());
                break;
            }
        }
    }

    result
}

fn contains_ascii(haystack: &[u8], needle: &str) -> bool {
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

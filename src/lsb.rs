// src/lsb.rs
//
// Component D: LSB analyzer. The primary signal - LSB ratio deviation, RS
// analysis, and sequence metrics (autocorrelation, block variance, runs test)
// feed a confidence-accumulation table gated by the adaptive thresholds from
// component C.

use crate::model::{AdaptiveThresholds, AnalyzerOutcome, ImageFormatKind};
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};

const MIN_SAMPLE: usize = 800;
const SUB_THRESHOLD_SAMPLE: usize = 4000;
const MAX_SAMPLED_PIXELS: usize = 60_000;
const RS_MAX_SIDE: u32 = 512;

pub fn analyze(img: &DynamicImage, format: ImageFormatKind, thresholds: &AdaptiveThresholds) -> AnalyzerOutcome {
    let thresholds = if format == ImageFormatKind::Bmp {
        AdaptiveThresholds::new(
            (thresholds.minor - 0.05).max(0.001),
            (thresholds.moderate - 0.05).max(0.002),
            (thresholds.strong - 0.05).max(0.003),
        )
    } else {
        *thresholds
    };

    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let stride = ((w as u64 * h as u64) as f64 / MAX_SAMPLED_PIXELS as f64)
        .sqrt()
        .ceil()
        .max(1.0) as u32;

    let mut bits: Vec<u8> = Vec::new();
    let mut red_lsb_stream: Vec<u8> = Vec::new();
    let mut y = 0;
    while y < h {
        let mut x = 0;
        while x < w {
            let p = rgb.get_pixel(x, y);
            for c in 0..3 {
                let bit = p[c] & 1;
                bits.push(bit);
                if c == 0 {
                    red_lsb_stream.push(bit);
                }
            }
            x += stride;
        }
        y += stride;
    }

    if bits.len() < MIN_SAMPLE {
        return AnalyzerOutcome::none();
    }

    let ones: u64 = bits.iter().map(|&b| b as u64).sum();
    let ratio = ones as f64 / bits.len() as f64;
    let deviation = (ratio - 0.5).abs();

    let rs = rs_analysis(img);
    let seq = sequence_metrics(&red_lsb_stream);

    let mut confidence = 0.0f64;
    let mut detected;

    if deviation >= thresholds.strong {
        confidence += 0.6 * (6.0 * (deviation - thresholds.strong)).tanh();
        detected = true;
    } else if deviation >= thresholds.moderate {
        confidence += 0.45 * (5.0 * (deviation - thresholds.moderate)).tanh();
        detected = rs.detected && rs.confidence > 0.25;
    } else if deviation >= thresholds.minor {
        confidence += 0.25 * (4.0 * (deviation - thresholds.minor)).tanh();
        detected = rs.detected && rs.confidence > 0.35;
    } else {
        detected = false;
    }

    if rs.detected {
        confidence += 0.4 * rs.confidence;
        if rs.confidence > 0.55 && deviation > 0.9 * thresholds.minor {
            detected = true;
        }
    }

    if let Some(autocorr) = seq.autocorr {
        if autocorr.abs() > 0.15 {
            confidence += 0.05 * autocorr.abs().min(0.5);
        }
    }
    if seq.block_variance < 5e-4 && deviation < thresholds.minor {
        confidence += 0.08;
    }
    if let Some(runs_z) = seq.runs_z {
        if runs_z.abs() > 2.2 {
            confidence += 0.07;
        }
    }

    // Symmetric tool-signature window centered between moderate and strong.
    let window_center = (thresholds.moderate + thresholds.strong) / 2.0;
    let window_half_width = 0.3 * (thresholds.strong - thresholds.moderate);
    if (deviation - window_center).abs() <= window_half_width {
        confidence *= 1.15;
        if rs.confidence > 0.3 {
            detected = true;
        }
    }

    if bits.len() < SUB_THRESHOLD_SAMPLE {
        confidence *= 0.6;
        if confidence <= 0.3 {
            detected = false;
        }
    }

    confidence = confidence.clamp(0.0, 1.0);

    let mut outcome = AnalyzerOutcome::new(detected, confidence)
        .with_detail("ratio", ratio)
        .with_detail("deviation", deviation)
        .with_detail("sample_size", bits.len() as u64)
        .with_detail("rs_confidence", rs.confidence)
        .with_detail("rs_detected", rs.detected);

    if let Some(reveal_len) = reveal_lsb(&red_lsb_stream, deviation, thresholds.moderate) {
        outcome.details.insert("revealed_text_len".into(), reveal_len.into());
    }

    outcome
}

struct RsOutcome {
    detected: bool,
    confidence: f64,
}

/// RS analysis on the red channel, downscaled so the longest side ≤ 512.
fn rs_analysis(img: &DynamicImage) -> RsOutcome {
    let (w, h) = img.dimensions();
    let longest = w.max(h).max(1);
    let small = if longest > RS_MAX_SIDE {
        let scale = RS_MAX_SIDE as f32 / longest as f32;
        let nw = ((w as f32 * scale).round() as u32).max(2);
        let nh = ((h as f32 * scale).round() as u32).max(2);
        img.resize_exact(nw, nh, FilterType::Triangle)
    } else {
        img.clone()
    };
    let rgb: RgbImage = small.to_rgb8();
    let (sw, sh) = rgb.dimensions();

    let mut red = Vec::with_capacity((sw * sh) as usize);
    for y in 0..sh {
        for x in 0..sw {
            red.push(rgb.get_pixel(x, y)[0]);
        }
    }
    // Flipped-LSB copy of the red plane, used to compute d' below.
    let mut flipped = red.clone();
    for v in flipped.iter_mut() {
        *v ^= 1;
    }

    let mut r_count = 0u64;
    let mut s_count = 0u64;
    let mut total_change = 0f64;
    let mut groups = 0u64;

    let bw = sw / 2;
    let bh = sh / 2;
    for by in 0..bh {
        for bx in 0..bw {
            let idx = |dx: u32, dy: u32| ((by * 2 + dy) * sw + (bx * 2 + dx)) as usize;
            let block = [
                red[idx(0, 0)] as i32,
                red[idx(1, 0)] as i32,
                red[idx(0, 1)] as i32,
                red[idx(1, 1)] as i32,
            ];
            let block_flipped = [
                flipped[idx(0, 0)] as i32,
                flipped[idx(1, 0)] as i32,
                flipped[idx(0, 1)] as i32,
                flipped[idx(1, 1)] as i32,
            ];
            let d: i32 = block.windows(2).map(|w| (w[0] - w[1]).abs()).sum();
            let d_prime: i32 = block_flipped.windows(2).map(|w| (w[0] - w[1]).abs()).sum();

            if d_prime > d {
                r_count += 1;
            } else if d_prime < d {
                s_count += 1;
            }
            total_change += (d_prime - d).unsigned_abs() as f64;
            groups += 1;
        }
    }

    if groups == 0 {
        return RsOutcome {
            detected: false,
            confidence: 0.0,
        };
    }

    let diff = (r_count as f64 - s_count as f64).abs() / groups as f64;
    let avg_change = total_change / groups as f64;
    let confidence = (3.0 * diff + avg_change / 50.0).tanh();
    let detected = confidence > 0.3 && diff > 0.02;

    RsOutcome { detected, confidence }
}

struct SequenceMetrics {
    autocorr: Option<f64>,
    block_variance: f64,
    runs_z: Option<f64>,
}

fn sequence_metrics(red_lsb: &[u8]) -> SequenceMetrics {
    if red_lsb.len() < 1000 {
        return SequenceMetrics {
            autocorr: None,
            block_variance: f64::MAX,
            runs_z: None,
        };
    }

    let n = red_lsb.len();
    let mean = red_lsb.iter().map(|&b| b as f64).sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n - 1 {
        num += (red_lsb[i] as f64 - mean) * (red_lsb[i + 1] as f64 - mean);
    }
    for i in 0..n {
        den += (red_lsb[i] as f64 - mean).powi(2);
    }
    let autocorr = if den > 0.0 { Some(num / den) } else { None };

    let block_size = 32usize;
    let mut proportions = Vec::new();
    let mut i = 0;
    while i + block_size <= n {
        let ones: u32 = red_lsb[i..i + block_size].iter().map(|&b| b as u32).sum();
        proportions.push(ones as f64 / block_size as f64);
        i += block_size;
    }
    let block_variance = if proportions.len() > 1 {
        let pm = proportions.iter().sum::<f64>() / proportions.len() as f64;
        proportions.iter().map(|p| (p - pm).powi(2)).sum::<f64>() / proportions.len() as f64
    } else {
        f64::MAX
    };

    let runs_z = runs_test_z(red_lsb);

    SequenceMetrics {
        autocorr,
        block_variance,
        runs_z,
    }
}

/// Two-sided runs test, clamped to [-10, 10].
fn runs_test_z(bits: &[u8]) -> Option<f64> {
    let n = bits.len();
    let n1 = bits.iter().filter(|&&b| b == 1).count();
    let n0 = n - n1;
    if n1 == 0 || n0 == 0 {
        return None;
    }
    let mut runs = 1u64;
    for i in 1..n {
        if bits[i] != bits[i - 1] {
            runs += 1;
        }
    }
    let n1 = n1 as f64;
    let n0 = n0 as f64;
    let n = n as f64;
    let expected_runs = (2.0 * n1 * n0) / n + 1.0;
    let variance = (2.0 * n1 * n0 * (2.0 * n1 * n0 - n)) / (n.powi(2) * (n - 1.0));
    if variance <= 0.0 {
        return None;
    }
    let z = (runs as f64 - expected_runs) / variance.sqrt();
    Some(z.clamp(-10.0, 10.0))
}

/// Best-effort reveal: attempt to decode a printable ASCII run of length ≥ 10
/// from the red-channel LSB stream once deviation reaches moderate. Only the
/// *length* is ever recorded - never the decoded content itself.
fn reveal_lsb(red_lsb: &[u8], deviation: f64, moderate_threshold: f64) -> Option<usize> {
    if deviation < moderate_threshold {
        return None;
    }
    let limit = red_lsb.len().min(10_000);
    let mut bytes = Vec::with_capacity(limit / 8);
    let mut i = 0;
    while i + 8 <= limit {
        let mut byte = 0u8;
        for b in 0..8 {
            byte = (byte << 1) | red_lsb[i + b];
        }
        bytes.push(byte);
        i += 8;
    }

    let mut best_run = 0usize;
    let mut current_run = 0usize;
    for &b in &bytes {
        if b == 0 {
            break;
        }
        if (0x20..=0x7E).contains(&b) {
            current_run += 1;
            best_run = best_run.max(current_run);
        } else {
            current_run = 0;
        }
    }
    if best_run >= 10 {
        Some(best_run)
    } else {
        None
    }
}

// src/statistics.rs
//
// Component E: statistical tests - pair-based chi-square on image pixels,
// file-level Shannon entropy, and a byte-level chi-square/compressibility
// "crypto-entropy" check. The byte chi-square p-value uses a hand-rolled
// regularized incomplete gamma function since no `scipy`-equivalent crate
// exists in this ecosystem for exactly this computation (see SPEC_FULL.md §9).

use crate::model::AnalyzerOutcome;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::DynamicImage;
use std::io::Write;

/// Pair-based chi-square test on consecutive pixel pairs, per channel.
pub fn pair_chi_square(img: &DynamicImage) -> AnalyzerOutcome {
    let rgb = img.to_rgb8();
    let pixels: Vec<[u8; 3]> = rgb.pixels().map(|p| p.0).collect();
    if pixels.len() < 4 {
        return AnalyzerOutcome::none();
    }

    let mut p_values = Vec::with_capacity(3);
    for channel in 0..3 {
        let mut even_first = 0u64;
        let mut odd_first = 0u64;
        for pair in pixels.chunks(2) {
            if pair.len() < 2 {
                continue;
            }
            if pair[0][channel] % 2 == 0 {
                even_first += 1;
            } else {
                odd_first += 1;
            }
        }
        let total = (even_first + odd_first) as f64;
        if total == 0.0 {
            continue;
        }
        let expected = total / 2.0;
        let chi_sq = (even_first as f64 - expected).powi(2) / expected
            + (odd_first as f64 - expected).powi(2) / expected;
        let p = chi_square_p_value(chi_sq, 1);
        p_values.push(p);
    }

    if p_values.is_empty() {
        return AnalyzerOutcome::none();
    }

    let min_p = p_values.iter().cloned().fold(f64::MAX, f64::min);
    let mean_p = p_values.iter().sum::<f64>() / p_values.len() as f64;
    let channels_below_05 = p_values.iter().filter(|&&p| p < 0.05).count();

    let detected = min_p < 0.01 || (channels_below_05 >= 2 && mean_p < 0.1);
    let confidence = if channels_below_05 >= 2 {
        (1.5 * (1.0 - mean_p)).min(1.0)
    } else {
        1.0 - min_p
    };

    AnalyzerOutcome::new(detected, confidence)
        .with_detail("min_p", min_p)
        .with_detail("mean_p", mean_p)
}

/// File-level Shannon entropy with size-dependent thresholds.
pub fn file_entropy(data: &[u8]) -> AnalyzerOutcome {
    if data.is_empty() {
        return AnalyzerOutcome::none();
    }
    let entropy = shannon_entropy(data);
    let size = data.len();

    let (base, stego) = if size < 50 * 1024 {
        (7.5 + 0.2, 7.8 + 0.15)
    } else if size > 500 * 1024 {
        (7.5, 7.8)
    } else {
        (7.5 + 0.1, 7.8 + 0.05)
    };

    let detected = entropy > stego;
    let confidence = if detected {
        ((entropy - stego) / (8.0 - stego)).clamp(0.0, 1.0)
    } else {
        0.0
    };

    AnalyzerOutcome::new(detected, confidence)
        .with_detail("entropy", entropy)
        .with_detail("base_threshold", base)
        .with_detail("stego_threshold", stego)
}

/// Byte-entropy + zlib compressibility + byte chi-square vs. uniform.
pub fn crypto_entropy(data: &[u8]) -> AnalyzerOutcome {
    if data.is_empty() {
        return AnalyzerOutcome::none();
    }
    let entropy = shannon_entropy(data);
    let ratio = compression_ratio(data);
    let chi_sq = byte_chi_square(data);
    let p = chi_square_p_value(chi_sq, 255);

    let suspicious = (entropy > 7.8 && ratio > 0.9) || p < 0.001;
    let confidence = if suspicious {
        ((entropy / 8.0) * ratio).clamp(0.0, 1.0)
    } else {
        0.0
    };

    AnalyzerOutcome::new(suspicious, confidence)
        .with_detail("entropy", entropy)
        .with_detail("compression_ratio", ratio)
        .with_detail("chi_square_p", p)
}

fn shannon_entropy(data: &[u8]) -> f64 {
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let n = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

/// `compressed_len / original_len`: near 1.0 means zlib couldn't shrink the
/// data at all (incompressible - consistent with encryption or an already-
/// compressed payload); near 0.0 means highly compressible plaintext.
fn compression_ratio(data: &[u8]) -> f64 {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
    if encoder.write_all(data).is_err() {
        return 1.0;
    }
    match encoder.finish() {
        Ok(compressed) => compressed.len() as f64 / data.len().max(1) as f64,
        Err(_) => 1.0,
    }
}

fn byte_chi_square(data: &[u8]) -> f64 {
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let expected = data.len() as f64 / 256.0;
    if expected == 0.0 {
        return 0.0;
    }
    counts
        .iter()
        .map(|&c| (c as f64 - expected).powi(2) / expected)
        .sum()
}

/// Chi-square survival-function p-value: `P(X > chi_sq)` for `df` degrees of
/// freedom, computed as the regularized upper incomplete gamma function
/// `Q(df/2, chi_sq/2)`.
pub fn chi_square_p_value(chi_sq: f64, df: u32) -> f64 {
    if chi_sq <= 0.0 {
        return 1.0;
    }
    regularized_gamma_q(df as f64 / 2.0, chi_sq / 2.0)
}

/// Q(a, x) = 1 - P(a, x), the regularized upper incomplete gamma function.
/// Series expansion for x < a+1, continued fraction otherwise - the standard
/// Numerical-Recipes split for numerical stability across the full range.
fn regularized_gamma_q(a: f64, x: f64) -> f64 {
    if x < 0.0 || a <= 0.0 {
        return f64::NAN;
    }
    if x == 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        1.0 - gamma_series(a, x)
    } else {
        gamma_continued_fraction(a, x)
    }
}

fn ln_gamma(x: f64) -> f64 {
    // Lanczos approximation, g=7, n=9.
    const G: f64 = 7.0;
    const COEFFS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    if x < 0.5 {
        return (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = COEFFS[0];
    let t = x + G + 0.5;
    for (i, c) in COEFFS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

fn gamma_series(a: f64, x: f64) -> f64 {
    let gln = ln_gamma(a);
    let mut sum = 1.0 / a;
    let mut term = sum;
    let mut n = a;
    for _ in 0..200 {
        n += 1.0;
        term *= x / n;
        sum += term;
        if term.abs() < sum.abs() * 1e-14 {
            break;
        }
    }
    sum * (-x + a * x.ln() - gln).exp()
}

fn gamma_continued_fraction(a: f64, x: f64) -> f64 {
    let gln = ln_gamma(a);
    let tiny = 1e-300;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / tiny;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..200 {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < tiny {
            d = tiny;
        }
        c = b + an / c;
        if c.abs() < tiny {
            c = tiny;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < 1e-14 {
            break;
        }
    }
    (-x + a * x.ln() - gln).exp() * h
}

// src/complexity.rs
//
// Component B: complexity estimator. Natural photographs carry high entropy;
// adaptive thresholds (component C) widen with complexity to avoid false
// positives on detailed images.

use crate::decode::DecodedImage;
use crate::model::{ComplexityMetrics, ImageFormatKind};
use image::{imageops::FilterType, GenericImageView};

const MAX_SIDE: u32 = 256;

pub fn estimate(decoded: &DecodedImage) -> ComplexityMetrics {
    let (w, h) = decoded.image.dimensions();
    let longest = w.max(h);
    let small = if longest > MAX_SIDE {
        let scale = MAX_SIDE as f32 / longest as f32;
        let nw = ((w as f32 * scale).round() as u32).max(1);
        let nh = ((h as f32 * scale).round() as u32).max(1);
        decoded.image.resize_exact(nw, nh, FilterType::Triangle)
    } else {
        decoded.image.clone()
    };
    let rgb = small.to_rgb8();
    let (sw, sh) = rgb.dimensions();

    let edge_density = edge_density(&rgb, sw, sh);
    let (color_variance, saturation_variance) = color_and_saturation_variance(&rgb);
    let block_uniformity = block_uniformity(&rgb, sw, sh);

    let jpeg_quality_estimate = decoded.avg_quant.map(|q| 1.0 / (1.0 + q / 50.0));

    let mut parts = vec![
        edge_density,
        (color_variance / 5000.0).tanh(),
        (2.0 * saturation_variance).tanh(),
        block_uniformity,
    ];
    if let Some(q) = jpeg_quality_estimate {
        parts.push(q);
    }
    let complexity_score = (parts.iter().sum::<f64>() / parts.len() as f64).clamp(0.0, 1.0);

    ComplexityMetrics {
        edge_density,
        color_variance,
        saturation_variance,
        block_uniformity,
        jpeg_quality_estimate,
        complexity_score,
        format: decoded.format,
    }
}

fn luminance(p: image::Rgb<u8>) -> f64 {
    0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64
}

fn edge_density(rgb: &image::RgbImage, w: u32, h: u32) -> f64 {
    if w < 2 || h < 2 {
        return 0.0;
    }
    let mut sums = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let l = luminance(*rgb.get_pixel(x, y));
            let lx = luminance(*rgb.get_pixel(x.min(w - 2) + 1, y)) - l;
            let ly = luminance(*rgb.get_pixel(x, y.min(h - 2) + 1)) - l;
            sums.push(lx.abs() + ly.abs());
        }
    }
    let mean = sums.iter().sum::<f64>() / sums.len() as f64;
    let var = sums.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / sums.len() as f64;
    let std = var.sqrt();
    let threshold = mean + std;
    let above = sums.iter().filter(|&&v| v > threshold).count();
    above as f64 / sums.len() as f64
}

fn color_and_saturation_variance(rgb: &image::RgbImage) -> (f64, f64) {
    let n = rgb.pixels().len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mut channel_means = [0.0f64; 3];
    for p in rgb.pixels() {
        for c in 0..3 {
            channel_means[c] += p[c] as f64;
        }
    }
    for m in channel_means.iter_mut() {
        *m /= n;
    }
    let mut channel_vars = [0.0f64; 3];
    let mut sat_values = Vec::with_capacity(n as usize);
    for p in rgb.pixels() {
        for c in 0..3 {
            channel_vars[c] += (p[c] as f64 - channel_means[c]).powi(2);
        }
        let max = p.0.iter().copied().max().unwrap_or(0) as f64;
        let min = p.0.iter().copied().min().unwrap_or(0) as f64;
        sat_values.push(if max > 0.0 { (max - min) / max } else { 0.0 });
    }
    for v in channel_vars.iter_mut() {
        *v /= n;
    }
    let color_variance = channel_vars.iter().sum::<f64>() / 3.0;

    let sat_mean = sat_values.iter().sum::<f64>() / n;
    let saturation_variance = sat_values.iter().map(|v| (v - sat_mean).powi(2)).sum::<f64>() / n;

    (color_variance, saturation_variance)
}

fn block_uniformity(rgb: &image::RgbImage, w: u32, h: u32) -> f64 {
    const BLOCK: u32 = 8;
    let mut variances = Vec::new();
    let mut by = 0;
    while by < h {
        let mut bx = 0;
        let bh = BLOCK.min(h - by);
        while bx < w {
            let bw = BLOCK.min(w - bx);
            let mut values = Vec::with_capacity((bw * bh) as usize);
            for y in by..by + bh {
                for x in bx..bx + bw {
                    values.push(luminance(*rgb.get_pixel(x, y)));
                }
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
            variances.push(var);
            bx += BLOCK;
        }
        by += BLOCK;
    }
    if variances.is_empty() {
        return 1.0;
    }
    let mean_block_var = variances.iter().sum::<f64>() / variances.len() as f64;
    1.0 / (1.0 + mean_block_var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn flat_image_has_low_complexity() {
        let img = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let data = encode_png(&img);
        let decoded = decode(&data).unwrap();
        let metrics = estimate(&decoded);
        assert!(metrics.complexity_score < 0.2, "flat image should score low: {}", metrics.complexity_score);
    }

    #[test]
    fn noisy_image_has_higher_complexity_than_flat() {
        let mut rng_state: u32 = 12345;
        let mut next = || {
            rng_state = rng_state.wrapping_mul(1664525).wrapping_add(1013904223);
            (rng_state >> 16) as u8
        };
        let noisy = RgbImage::from_fn(64, 64, |_, _| Rgb([next(), next(), next()]));
        let flat = RgbImage::from_pixel(64, 64, Rgb([100, 100, 100]));

        let noisy_metrics = estimate(&decode(&encode_png(&noisy)).unwrap());
        let flat_metrics = estimate(&decode(&encode_png(&flat)).unwrap());

        assert!(noisy_metrics.complexity_score > flat_metrics.complexity_score);
    }

    #[test]
    fn complexity_score_is_bounded() {
        let img = RgbImage::from_fn(300, 200, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]));
        let metrics = estimate(&decode(&encode_png(&img)).unwrap());
        assert!((0.0..=1.0).contains(&metrics.complexity_score));
    }
}

// src/thresholds.rs
//
// Component C: adaptive threshold derivation. Maps complexity + format to
// LSB deviation thresholds. These widen with complexity (detailed images
// naturally carry more LSB noise) and narrow for stricter formats.

use crate::model::{AdaptiveThresholds, ImageFormatKind};

pub fn derive(complexity_score: f64, format: ImageFormatKind) -> AdaptiveThresholds {
    let mut tol = 0.05 + 0.15 * complexity_score;
    match format {
        ImageFormatKind::Bmp => tol *= 0.7,
        ImageFormatKind::Jpeg => tol *= 1.3,
        _ => {}
    }
    let minor = 0.20 + 0.50 * tol;
    let moderate = minor + 0.05 + 0.30 * tol;
    let strong = moderate + 0.07 + 0.20 * tol;
    AdaptiveThresholds::new(minor, moderate, strong)
}

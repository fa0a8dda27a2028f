// src/frequency.rs
//
// Component F: frequency-domain analyzer. Grayscale -> 2-D FFT (row-then-
// column, the standard composition of rustfft's 1-D planner into 2-D) -> DC
// shifted to center -> central-energy ratio.

use crate::model::AnalyzerOutcome;
use image::{DynamicImage, GenericImageView};
use rustfft::{num_complex::Complex, FftPlanner};

pub fn analyze(img: &DynamicImage) -> AnalyzerOutcome {
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    if w < 4 || h < 4 {
        return AnalyzerOutcome::none();
    }

    let mut planner = FftPlanner::<f64>::new();
    let row_fft = planner.plan_fft_forward(w as usize);
    let col_fft = planner.plan_fft_forward(h as usize);

    let mut grid: Vec<Complex<f64>> = gray
        .pixels()
        .map(|p| Complex::new(p[0] as f64, 0.0))
        .collect();

    // Row-wise FFT.
    for row in grid.chunks_mut(w as usize) {
        row_fft.process(row);
    }

    // Column-wise FFT (transpose-free: gather, transform, scatter).
    let mut column = vec![Complex::new(0.0, 0.0); h as usize];
    for x in 0..w as usize {
        for (y, slot) in column.iter_mut().enumerate() {
            *slot = grid[y * w as usize + x];
        }
        col_fft.process(&mut column);
        for (y, value) in column.iter().enumerate() {
            grid[y * w as usize + x] = *value;
        }
    }

    let magnitude: Vec<f64> = grid.iter().map(|c| c.norm()).collect();
    let total_energy: f64 = magnitude.iter().sum();
    if total_energy <= 0.0 {
        return AnalyzerOutcome::none();
    }

    // Shift DC to the center for the purposes of measuring central energy:
    // rustfft's unshifted output places DC at (0,0), so we sum the four
    // quadrant corners (equivalent to the shifted center) within the radius.
    let radius = (w.min(h) as f64) / 8.0;
    let mut central_energy = 0.0;
    for y in 0..h as usize {
        let dy = wrapped_distance(y as f64, h as f64);
        for x in 0..w as usize {
            let dx = wrapped_distance(x as f64, w as f64);
            if (dx * dx + dy * dy).sqrt() <= radius {
                central_energy += magnitude[y * w as usize + x];
            }
        }
    }

    let energy_ratio = central_energy / total_energy;
    let detected = energy_ratio < 0.3;
    let confidence = if energy_ratio < 0.5 {
        1.0 - energy_ratio
    } else {
        0.0
    };

    AnalyzerOutcome::new(detected, confidence).with_detail("energy_ratio", energy_ratio)
}

/// Distance from `coord` to the nearest of 0 or `len` (the DC bin after an
/// fftshift would sit at index 0 in rustfft's unshifted layout, so the
/// "center" of the shifted spectrum corresponds to index 0 here, wrapping).
fn wrapped_distance(coord: f64, len: f64) -> f64 {
    coord.min(len - coord)
}

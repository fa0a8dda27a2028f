// src/fusion.rs
//
// Component J: fusion / decision. Weighted, dispersion-adjusted combination
// of the four core analyzer confidences into a composite score, gating a set
// of detection rules that in turn drive the threat-level mapping.

use crate::model::{AnalyzerOutcome, ThreatLevel};
use std::collections::BTreeMap;

const BASE_WEIGHTS: [(&str, f64); 4] = [
    ("lsb", 0.35),
    ("entropy", 0.25),
    ("chi", 0.20),
    ("freq", 0.20),
];

pub struct FusionInputs<'a> {
    pub lsb: &'a AnalyzerOutcome,
    pub entropy: &'a AnalyzerOutcome,
    pub chi: &'a AnalyzerOutcome,
    pub freq: &'a AnalyzerOutcome,
    pub complexity_score: f64,
}

pub struct FusionResult {
    pub has_steganography: bool,
    pub composite_score: f64,
    pub positive_methods: Vec<String>,
    pub strong_methods: Vec<String>,
    pub mean: f64,
    pub stddev: f64,
}

pub fn fuse(inputs: &FusionInputs) -> FusionResult {
    let candidates: BTreeMap<&str, &AnalyzerOutcome> = [
        ("lsb", inputs.lsb),
        ("entropy", inputs.entropy),
        ("chi", inputs.chi),
        ("freq", inputs.freq),
    ]
    .into_iter()
    .collect();

    let active: Vec<(&str, f64)> = candidates
        .iter()
        .filter(|(_, o)| o.confidence > 0.0)
        .map(|(&k, o)| (k, o.confidence))
        .collect();

    if active.is_empty() {
        return FusionResult {
            has_steganography: false,
            composite_score: 0.0,
            positive_methods: vec![],
            strong_methods: vec![],
            mean: 0.0,
            stddev: 0.0,
        };
    }

    let mean = active.iter().map(|(_, c)| c).sum::<f64>() / active.len() as f64;
    let variance = active.iter().map(|(_, c)| (c - mean).powi(2)).sum::<f64>() / active.len() as f64;
    let stddev = variance.sqrt();

    let base_weight = |name: &str| -> f64 {
        BASE_WEIGHTS
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    };

    let mut adjusted: Vec<(&str, f64, f64)> = active
        .iter()
        .map(|&(name, conf)| {
            let w0 = base_weight(name);
            let adj = if stddev > 0.0 {
                w0 * (1.0 + 0.5 * ((conf - mean) / (2.0 * stddev)).tanh())
            } else {
                w0
            };
            (name, adj, conf)
        })
        .collect();

    let total_weight: f64 = adjusted.iter().map(|(_, w, _)| w).sum();
    if total_weight > 0.0 {
        for (_, w, _) in adjusted.iter_mut() {
            *w /= total_weight;
        }
    }

    let composite_score: f64 = adjusted.iter().map(|(_, w, c)| w * c).sum();

    let positive_threshold = (0.8 * mean).max(0.3);
    let positive_methods: Vec<String> = adjusted
        .iter()
        .filter(|(_, _, c)| *c > positive_threshold)
        .map(|(name, _, _)| name.to_string())
        .collect();
    let strong_methods: Vec<String> = adjusted
        .iter()
        .filter(|(_, _, c)| *c > mean + stddev)
        .map(|(name, _, _)| name.to_string())
        .collect();

    // Rule 1: explicit LSB payload reveal of length >= 10.
    let rule1 = inputs
        .lsb
        .details
        .get("revealed_text_len")
        .and_then(|v| v.as_u64())
        .map(|len| len >= 10)
        .unwrap_or(false);

    // Rule 2.
    let rule2 = (positive_methods.len() >= 2 && !strong_methods.is_empty())
        || composite_score > mean + 0.5 * stddev;

    // Rule 3.
    let rule3 = inputs.lsb.confidence > 0.18
        && inputs.entropy.confidence > 0.9 * mean
        && composite_score > 1.1 * mean;

    // Rule 4.
    let rule4 = inputs.entropy.confidence > 0.55
        && inputs.lsb.confidence < 0.10
        && inputs.complexity_score < 0.65;

    let has_steganography = rule1 || rule2 || rule3 || rule4;

    FusionResult {
        has_steganography,
        composite_score,
        positive_methods,
        strong_methods,
        mean,
        stddev,
    }
}

/// Threat-level mapping driven by the fusion result and the ancillary signals
/// the orchestrator collects outside of the four weighted analyzers.
#[allow(clippy::too_many_arguments)]
pub fn map_threat(
    fusion: &FusionResult,
    stego_tool_signature: bool,
    structural_violation: bool,
    entropy_only_warning: bool,
    visual_anomaly_count: u32,
) -> ThreatLevel {
    let mut level = ThreatLevel::Safe;

    if stego_tool_signature {
        level.raise(ThreatLevel::Critical);
    }

    if fusion.has_steganography {
        if fusion.composite_score > 0.8 && fusion.positive_methods.len() >= 2 {
            level.raise(ThreatLevel::Critical);
        } else {
            level.raise(ThreatLevel::High);
        }
    }

    if structural_violation {
        level.raise(ThreatLevel::High);
    }

    if entropy_only_warning && level == ThreatLevel::Safe {
        level.raise(ThreatLevel::Low);
    }

    if visual_anomaly_count >= 4 {
        level.raise(ThreatLevel::Medium);
    }

    level
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(confidence: f64) -> AnalyzerOutcome {
        AnalyzerOutcome::new(confidence > 0.3, confidence)
    }

    #[test]
    fn all_zero_confidence_yields_no_detection() {
        let lsb = outcome(0.0);
        let entropy = outcome(0.0);
        let chi = outcome(0.0);
        let freq = outcome(0.0);
        let fusion = fuse(&FusionInputs {
            lsb: &lsb,
            entropy: &entropy,
            chi: &chi,
            freq: &freq,
            complexity_score: 0.5,
        });
        assert!(!fusion.has_steganography);
        assert_eq!(fusion.composite_score, 0.0);
    }

    #[test]
    fn high_confidence_across_methods_triggers_rule_two() {
        let lsb = outcome(0.9);
        let entropy = outcome(0.85);
        let chi = outcome(0.1);
        let freq = outcome(0.1);
        let fusion = fuse(&FusionInputs {
            lsb: &lsb,
            entropy: &entropy,
            chi: &chi,
            freq: &freq,
            complexity_score: 0.5,
        });
        assert!(fusion.has_steganography);
        assert!(fusion.positive_methods.len() >= 2);
    }

    #[test]
    fn rule_four_fires_on_flat_high_entropy_image() {
        let lsb = outcome(0.05);
        let entropy = outcome(0.6);
        let chi = outcome(0.05);
        let freq = outcome(0.05);
        let fusion = fuse(&FusionInputs {
            lsb: &lsb,
            entropy: &entropy,
            chi: &chi,
            freq: &freq,
            complexity_score: 0.3,
        });
        assert!(fusion.has_steganography);
    }

    #[test]
    fn stego_tool_signature_always_maps_to_critical() {
        let empty = AnalyzerOutcome::none();
        let fusion = fuse(&FusionInputs {
            lsb: &empty,
            entropy: &empty,
            chi: &empty,
            freq: &empty,
            complexity_score: 0.5,
        });
        let level = map_threat(&fusion, true, false, false, 0);
        assert_eq!(level, ThreatLevel::Critical);
    }

    #[test]
    fn threat_level_never_drops_below_structural_violation_floor() {
        let empty = AnalyzerOutcome::none();
        let fusion = fuse(&FusionInputs {
            lsb: &empty,
            entropy: &empty,
            chi: &empty,
            freq: &empty,
            complexity_score: 0.5,
        });
        let level = map_threat(&fusion, false, true, false, 0);
        assert!(level >= ThreatLevel::High);
    }
}

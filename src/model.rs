// src/model.rs
//
// Core data model shared by every analyzer and the fusion/orchestration stages.

use serde::Serialize;
use std::collections::BTreeMap;

/// Ordered threat level. Derive order follows declaration order: SAFE is the
/// lowest, CRITICAL the highest. Combination is monotonic - callers only raise.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreatLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Raise `self` to `other` if `other` is higher; never lowers.
    pub fn raise(&mut self, other: ThreatLevel) {
        if other > *self {
            *self = other;
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThreatLevel::Safe => "SAFE",
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// A single analyzer's verdict. Every component in §4 of the design doc
/// produces one of these; fusion combines them.
#[derive(Clone, Debug, Serialize)]
pub struct AnalyzerOutcome {
    pub detected: bool,
    pub confidence: f64,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl AnalyzerOutcome {
    pub fn none() -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            details: BTreeMap::new(),
        }
    }

    pub fn new(detected: bool, confidence: f64) -> Self {
        Self {
            detected,
            confidence: confidence.clamp(0.0, 1.0),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Immutable per-call outcome record. Constructed once by the orchestrator and
/// never mutated after return.
#[derive(Clone, Debug, Serialize)]
pub struct SecurityReport {
    pub is_safe: bool,
    pub threat_level: ThreatLevel,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub recommendations: Vec<String>,
}

impl SecurityReport {
    /// Invariant checked in debug builds and exercised directly in tests:
    /// `is_safe ⇔ issues empty ∧ threat ∈ {SAFE, LOW}`.
    pub fn invariant_holds(&self) -> bool {
        self.is_safe == (self.issues.is_empty() && self.threat_level <= ThreatLevel::Low)
    }
}

/// Per-image complexity metrics (component B).
#[derive(Clone, Debug, Serialize)]
pub struct ComplexityMetrics {
    pub edge_density: f64,
    pub color_variance: f64,
    pub saturation_variance: f64,
    pub block_uniformity: f64,
    pub jpeg_quality_estimate: Option<f64>,
    pub complexity_score: f64,
    pub format: ImageFormatKind,
}

/// Adaptive LSB deviation thresholds (component C). `minor < moderate < strong`
/// is an invariant asserted at construction.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct AdaptiveThresholds {
    pub minor: f64,
    pub moderate: f64,
    pub strong: f64,
}

impl AdaptiveThresholds {
    pub fn new(minor: f64, moderate: f64, strong: f64) -> Self {
        debug_assert!(minor < moderate, "minor must be < moderate");
        debug_assert!(moderate < strong, "moderate must be < strong");
        debug_assert!(strong < 0.5, "strong must be < 0.5");
        Self {
            minor,
            moderate,
            strong,
        }
    }
}

/// Decoded image format, tracked through the pipeline for format-specific rules.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum ImageFormatKind {
    Jpeg,
    Png,
    Bmp,
    Webp,
    Gif,
}

impl std::fmt::Display for ImageFormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImageFormatKind::Jpeg => "JPEG",
            ImageFormatKind::Png => "PNG",
            ImageFormatKind::Bmp => "BMP",
            ImageFormatKind::Webp => "WEBP",
            ImageFormatKind::Gif => "GIF",
        };
        write!(f, "{}", s)
    }
}

/// Top-level MIME category used for extension/MIME reconciliation (component G).
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum FileCategory {
    Image,
    Audio,
    Video,
    Document,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_level_raise_is_monotonic() {
        let mut t = ThreatLevel::Safe;
        t.raise(ThreatLevel::Medium);
        assert_eq!(t, ThreatLevel::Medium);
        t.raise(ThreatLevel::Low);
        assert_eq!(t, ThreatLevel::Medium, "raise must never lower the level");
        t.raise(ThreatLevel::Critical);
        assert_eq!(t, ThreatLevel::Critical);
    }

    #[test]
    fn report_invariant_detects_violation() {
        let safe = SecurityReport {
            is_safe: true,
            threat_level: ThreatLevel::Safe,
            confidence: 0.0,
            issues: vec![],
            warnings: vec![],
            metadata: BTreeMap::new(),
            recommendations: vec![],
        };
        assert!(safe.invariant_holds());

        let mut broken = safe.clone_for_test();
        broken.is_safe = true;
        broken.issues.push("oops".into());
        assert!(!broken.invariant_holds());
    }

    impl SecurityReport {
        fn clone_for_test(&self) -> Self {
            self.clone()
        }
    }

    #[test]
    #[should_panic]
    fn adaptive_thresholds_assert_monotonic_in_debug() {
        let _ = AdaptiveThresholds::new(0.3, 0.2, 0.4);
    }
}

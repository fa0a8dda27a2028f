// src/validator.rs
//
// Component L: orchestrator. Wires every other component into the single
// `validate_file` entry point. Never lets an internal error escape - every
// failure path folds into a `SecurityReport` instead (see SPEC_FULL.md §7).

use crate::config::{Capabilities, ValidatorConfig};
use crate::decode;
use crate::model::{AnalyzerOutcome, FileCategory, ImageFormatKind, SecurityReport, ThreatLevel};
use crate::{complexity, fusion, hash, lsb, metadata, signatures, statistics, structural};
use std::collections::BTreeMap;
use std::path::Path;

const SUSPICIOUS_NAME_FRAGMENTS: &[&str] = &["..", "~", "${", "%(", "<", ">", "|", "&"];

pub struct EnhancedFileSecurityValidator {
    config: ValidatorConfig,
    capabilities: Capabilities,
}

impl Default for EnhancedFileSecurityValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl EnhancedFileSecurityValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        let capabilities = Capabilities::probe();
        log::debug!(
            "security validator constructed: external_stego_tool={:?} external_analyzer_script={:?}",
            capabilities.external_stego_tool,
            capabilities.external_analyzer_script
        );
        Self { config, capabilities }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// `validate_file(path, original_name) -> SecurityReport`. Never panics
    /// across this boundary and never returns `Err` - every failure degrades
    /// into a report with an appropriate threat level.
    pub fn validate_file(&self, path: &Path, original_name: &str) -> SecurityReport {
        log::debug!("validate_file: path={:?} original_name={}", path, original_name);

        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut metadata_map: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        let mut threat = ThreatLevel::Safe;

        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("validate_file: failed to read {:?}: {}", path, e);
                return self.catch_all_report("Corrupted or altered file structure");
            }
        };

        // Step 1: size + name-pattern checks.
        if data.len() as u64 > self.config.max_file_size_bytes {
            issues.push(format!(
                "File size {} exceeds limit of {} bytes",
                data.len(),
                self.config.max_file_size_bytes
            ));
            threat.raise(ThreatLevel::High);
        }
        if data.is_empty() {
            issues.push("Corrupted or altered file structure".to_string());
            threat.raise(ThreatLevel::High);
        }
        if let Some(fragment) = suspicious_name_fragment(original_name) {
            issues.push(format!("Suspicious filename fragment: {}", fragment));
            threat.raise(ThreatLevel::High);
        }

        // Step 2: stego-tool / script signature scan over the full file.
        let extension = extension_of(original_name);
        let sig = signatures::scan(&data, &extension);
        if let Some(tool) = &sig.stego_tool_found {
            issues.push("Detected steganography-tool signature".to_string());
            metadata_map.insert("stego_tool_marker".into(), tool.clone().into());
            threat.raise(ThreatLevel::Critical);
        }
        if let Some(marker) = &sig.script_marker_found {
            issues.push(format!("Detected embedded script marker: {}", marker));
            threat.raise(ThreatLevel::High);
        }
        let stego_tool_signature = sig.stego_tool_found.is_some();

        // Step 3: MIME/category reconciliation.
        let detected_format = decode::sniff_format(&data);
        let detected_category = detected_format.map(|_| FileCategory::Image).unwrap_or(FileCategory::Unknown);
        let claimed_category = structural::extension_category(&extension);
        if detected_format.is_some() && !structural::categories_reconcile(claimed_category, detected_category) {
            issues.push("Extension/MIME category mismatch".to_string());
            threat.raise(ThreatLevel::High);
        }

        let mut needs_sanitization = false;
        let mut entropy_outcome = AnalyzerOutcome::none();
        let mut lsb_outcome = AnalyzerOutcome::none();
        let mut chi_outcome = AnalyzerOutcome::none();
        let mut freq_outcome = AnalyzerOutcome::none();
        let mut complexity_score = 0.5;
        let mut visual_anomaly_count = 0u32;

        // Step 4: image-specific analysis.
        if let Some(format) = detected_format {
            match decode::decode(&data) {
                Ok(decoded) => {
                    let metrics = complexity::estimate(&decoded);
                    complexity_score = metrics.complexity_score;
                    let thresholds = crate::thresholds::derive(metrics.complexity_score, format);

                    // Independent analyzers run off the main thread pair-wise;
                    // none of D/E/F/H shares mutable state.
                    let (lsb_result, (chi_result, freq_result)) = rayon::join(
                        || lsb::analyze(&decoded.image, format, &thresholds),
                        || {
                            rayon::join(
                                || statistics::pair_chi_square(&decoded.image),
                                || crate::frequency::analyze(&decoded.image),
                            )
                        },
                    );
                    lsb_outcome = lsb_result;
                    chi_outcome = chi_result;
                    freq_outcome = freq_result;
                    let meta_outcome = metadata::scan(&data);
                    if meta_outcome.detected {
                        warnings.push("Suspicious or oversized metadata detected".to_string());
                    }

                    let (w, h) = (decoded.image.width(), decoded.image.height());
                    let generic = structural::generic_check(data.len(), w, h);
                    if let Some(anomalies) = generic.details.get("anomaly_count").and_then(|v| v.as_u64()) {
                        visual_anomaly_count += anomalies as u32;
                    }
                    if generic.details.contains_key("oversized") {
                        warnings.push("Excessively large image".to_string());
                    }

                    let pixel_anomalies = structural::visual_pixel_anomalies(&decoded.image);
                    if let Some(anomalies) = pixel_anomalies.details.get("anomaly_count").and_then(|v| v.as_u64()) {
                        visual_anomaly_count += anomalies as u32;
                    }
                    if pixel_anomalies.details.contains_key("alpha_anomaly") {
                        warnings.push("Suspicious alpha-channel variance".to_string());
                    }
                    if pixel_anomalies.details.contains_key("noise_excessive") {
                        warnings.push("Abnormal edge-noise levels detected".to_string());
                    }

                    if format == ImageFormatKind::Bmp {
                        let bmp_outcome = structural::bmp_structural_check(&data, self.config.bmp_zero_padding_limit);
                        if bmp_outcome.detected {
                            if let Some(bmp_issues) = bmp_outcome.details.get("issues").and_then(|v| v.as_array()) {
                                for issue in bmp_issues {
                                    if let Some(s) = issue.as_str() {
                                        issues.push(s.to_string());
                                    }
                                }
                            }
                            threat.raise(ThreatLevel::High);
                        }
                    }

                    needs_sanitization = lsb_outcome.detected || meta_outcome.detected;
                }
                Err(e) => {
                    issues.push("Corrupted or altered file structure".to_string());
                    warnings.push(format!("decode error: {}", e));
                    threat.raise(ThreatLevel::High);
                }
            }
        }

        // Step 5: file-level entropy + crypto-entropy analyzers, above the
        // size threshold (crypto-entropy's byte chi-square needs a large
        // enough sample to mean anything at df=255).
        let mut crypto_score = 0.0;
        if data.len() as u64 > self.config.entropy_analysis_min_bytes {
            entropy_outcome = statistics::file_entropy(&data);

            let crypto_outcome = statistics::crypto_entropy(&data);
            if crypto_outcome.detected {
                warnings.push(
                    "Cryptographic or compressed pattern detected (high entropy, low compressibility)".to_string(),
                );
                crypto_score = 0.6;
            } else {
                let ratio = crypto_outcome.details.get("compression_ratio").and_then(|v| v.as_f64()).unwrap_or(0.0);
                let ent = crypto_outcome.details.get("entropy").and_then(|v| v.as_f64()).unwrap_or(0.0);
                if ratio > 0.95 && ent > 7.4 {
                    crypto_score = 0.25;
                }
            }
            metadata_map.insert("crypto_entropy".into(), serde_json::to_value(&crypto_outcome).unwrap_or_default());
        }

        // Step 6: fuse and map threat.
        let fusion_result = fusion::fuse(&fusion::FusionInputs {
            lsb: &lsb_outcome,
            entropy: &entropy_outcome,
            chi: &chi_outcome,
            freq: &freq_outcome,
            complexity_score,
        });

        if fusion_result.has_steganography {
            issues.push(format!(
                "Steganography indicators detected: {}",
                fusion_result.positive_methods.join(", ")
            ));
        }

        let entropy_only_warning =
            data.len() as u64 > self.config.entropy_analysis_min_bytes && entropy_outcome.confidence > 0.8;
        if entropy_only_warning && !fusion_result.has_steganography {
            warnings.push("Elevated file entropy".to_string());
        }

        let structural_violation = issues.iter().any(|i| i.starts_with("BMP:"));
        let fused_threat = fusion::map_threat(
            &fusion_result,
            stego_tool_signature,
            structural_violation,
            entropy_only_warning,
            visual_anomaly_count,
        );
        threat.raise(fused_threat);

        // Confidence scores pool every independent signal, not just the four
        // weighted fusion inputs - crypto-entropy contributes here even
        // though it sits outside the named fusion weight table.
        let mut confidences: Vec<f64> = [&lsb_outcome, &entropy_outcome, &chi_outcome, &freq_outcome]
            .iter()
            .map(|o| o.confidence)
            .filter(|&c| c > 0.0)
            .collect();
        if crypto_score > 0.0 {
            confidences.push(crypto_score);
        }
        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        metadata_map.insert("lsb".into(), serde_json::to_value(&lsb_outcome).unwrap_or_default());
        metadata_map.insert("chi_square".into(), serde_json::to_value(&chi_outcome).unwrap_or_default());
        metadata_map.insert("frequency".into(), serde_json::to_value(&freq_outcome).unwrap_or_default());
        metadata_map.insert("entropy".into(), serde_json::to_value(&entropy_outcome).unwrap_or_default());
        metadata_map.insert("complexity_score".into(), complexity_score.into());

        let is_safe = issues.is_empty() && threat <= ThreatLevel::Low;

        let mut recommendations = Vec::new();
        match threat {
            ThreatLevel::Critical => recommendations.push("Reject immediately".to_string()),
            ThreatLevel::High => recommendations.push("Reject — multiple issues".to_string()),
            ThreatLevel::Medium => recommendations.push("Manual review".to_string()),
            _ if is_safe && !warnings.is_empty() => {
                recommendations.push("Approve with monitoring; consider re-encoding".to_string())
            }
            _ => {}
        }

        if is_safe && needs_sanitization {
            metadata_map.insert("needs_sanitization".into(), true.into());
        }

        let report = SecurityReport {
            is_safe,
            threat_level: threat,
            confidence,
            issues,
            warnings,
            metadata: metadata_map,
            recommendations,
        };
        debug_assert!(report.invariant_holds());
        report
    }

    pub fn sanitize_image(&self, src: &Path, dst: &Path) -> crate::error::Result<bool> {
        crate::sanitize::sanitize_image(src, dst, self.config.sanitize_jpeg_quality)
    }

    pub fn calculate_file_hash(&self, path: &Path) -> crate::error::Result<String> {
        hash::calculate_file_hash(path)
    }

    fn catch_all_report(&self, issue: &str) -> SecurityReport {
        SecurityReport {
            is_safe: false,
            threat_level: ThreatLevel::High,
            confidence: 0.0,
            issues: vec![issue.to_string()],
            warnings: vec![],
            metadata: BTreeMap::new(),
            recommendations: vec!["Reject — multiple issues".to_string()],
        }
    }
}

fn suspicious_name_fragment(name: &str) -> Option<&str> {
    for fragment in SUSPICIOUS_NAME_FRAGMENTS {
        if name.contains(fragment) {
            return Some(fragment);
        }
    }
    if name.matches('.').count() > 2 {
        return Some(".");
    }
    None
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Free functions mirroring the primary API named in §6, for callers that
/// don't want to hold onto a validator instance.
pub fn validate_file(path: &Path, original_name: &str) -> SecurityReport {
    EnhancedFileSecurityValidator::default().validate_file(path, original_name)
}

pub fn sanitize_image(src: &Path, dst: &Path) -> crate::error::Result<bool> {
    EnhancedFileSecurityValidator::default().sanitize_image(src, dst)
}

pub fn calculate_file_hash(path: &Path) -> crate::error::Result<String> {
    hash::calculate_file_hash(path)
}

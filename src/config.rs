// src/config.rs
//
// Typed configuration surface and one-time capability probing.
// Mirrors the "typed config struct with named constructors" shape this codebase
// already uses for its firewall policy (strict()/lenient()/disabled()/custom()).

use std::path::PathBuf;
use std::time::Duration;

/// Tunable constants for the validation pipeline. `Default` reproduces the
/// hard-coded numbers from the fusion/threshold formulas exactly.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Hard cap on accepted file size (component L, step 1).
    pub max_file_size_bytes: u64,
    /// Number of zero bytes allowed in BMP bytes [54..256) before flagging
    /// excessive padding (component G).
    pub bmp_zero_padding_limit: u16,
    /// JPEG quality used when sanitizing (component K).
    pub sanitize_jpeg_quality: u8,
    /// Timeout for the optional external stego-inspection CLI.
    pub external_tool_timeout: Duration,
    /// Timeout for the optional external per-channel-entropy script.
    pub external_script_timeout: Duration,
    /// Above this size, the file-level entropy analyzer is run (component L, step 5).
    pub entropy_analysis_min_bytes: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * 1024 * 1024,
            bmp_zero_padding_limit: 180,
            sanitize_jpeg_quality: 85,
            external_tool_timeout: Duration::from_secs(20),
            external_script_timeout: Duration::from_secs(25),
            entropy_analysis_min_bytes: 100 * 1024,
        }
    }
}

/// Capability probes computed once at validator construction time, replacing
/// the module-level `HAS_*` globals of the system this engine is modeled on.
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    /// Path to an external stego-inspection CLI, if one is on `PATH`.
    pub external_stego_tool: Option<PathBuf>,
    /// Path to a sibling per-channel-entropy analyzer script, if present.
    pub external_analyzer_script: Option<PathBuf>,
}

impl Capabilities {
    /// Probe the environment once. FFT and the chi-square p-value helper are
    /// always-compiled-in (rustfft, hand-rolled incomplete gamma) so they are
    /// not modeled here - only the two genuinely optional external processes are.
    pub fn probe() -> Self {
        Self {
            external_stego_tool: which_on_path("stego-inspect"),
            external_analyzer_script: which_on_path("sharp-analyze"),
        }
    }
}

fn which_on_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

// src/error.rs
//
// Structured error types for stego-sentry.
// Manual Display/Error impls rather than a derive - mirrors how this codebase's
// other error enum is built, kept consistent across the analysis pipeline.

/// Error type for stego-sentry operations.
#[derive(Debug)]
pub enum SecurityError {
    /// File could not be read from disk.
    FileReadFailed { path: String, source: String },
    /// Image data could not be decoded as its claimed format.
    DecodeFailed { reason: String },
    /// File exceeds the configured size limit.
    SizeExceeded { bytes: u64, max: u64 },
    /// Filename contains a suspicious fragment (path traversal, shell metacharacters).
    SuspiciousName { name: String, fragment: String },
    /// A BMP (or other container) structural invariant was violated.
    StructuralInvariant { reason: String },
    /// Destination path for a sanitized copy could not be written.
    SanitizeWriteFailed { path: String, source: String },
    /// Generic internal error with a message (degraded analyzer paths, etc).
    Internal { message: String },
}

impl SecurityError {
    pub fn file_read_failed(path: impl Into<String>, source: &dyn std::error::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source: source.to_string(),
        }
    }

    pub fn decode_failed(reason: impl Into<String>) -> Self {
        Self::DecodeFailed {
            reason: reason.into(),
        }
    }

    pub fn size_exceeded(bytes: u64, max: u64) -> Self {
        Self::SizeExceeded { bytes, max }
    }

    pub fn suspicious_name(name: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self::SuspiciousName {
            name: name.into(),
            fragment: fragment.into(),
        }
    }

    pub fn structural_invariant(reason: impl Into<String>) -> Self {
        Self::StructuralInvariant {
            reason: reason.into(),
        }
    }

    pub fn sanitize_write_failed(path: impl Into<String>, source: &dyn std::error::Error) -> Self {
        Self::SanitizeWriteFailed {
            path: path.into(),
            source: source.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SecurityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileReadFailed { path, source } => {
                write!(f, "failed to read file '{}': {}", path, source)
            }
            Self::DecodeFailed { reason } => write!(f, "decode failed: {}", reason),
            Self::SizeExceeded { bytes, max } => {
                write!(f, "file size {} bytes exceeds limit of {} bytes", bytes, max)
            }
            Self::SuspiciousName { name, fragment } => write!(
                f,
                "filename '{}' contains suspicious fragment '{}'",
                name, fragment
            ),
            Self::StructuralInvariant { reason } => write!(f, "structural invariant violated: {}", reason),
            Self::SanitizeWriteFailed { path, source } => {
                write!(f, "failed to write sanitized image to '{}': {}", path, source)
            }
            Self::Internal { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for SecurityError {}

/// Result type alias for stego-sentry operations.
pub type Result<T> = std::result::Result<T, SecurityError>;

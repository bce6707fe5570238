// THEORY:
// Every failure the engine can produce falls into one of three families:
// malformed input (a genome record or an image we cannot trust), numeric
// degeneracy (handled in place by explicit policy, so it never shows up here),
// and dimension mismatch (two buffers that cannot be combined). All of them
// are recoverable: the caller aborts the current sample or run and reports.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DaltonError>;

#[derive(Debug, Error)]
pub enum DaltonError {
    /// A persisted genome record is missing fields or holds an unparseable value.
    #[error("malformed genome record: {0}")]
    MalformedGenome(String),

    /// A decoded or constructed image has no pixels.
    #[error("image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// Two buffers (images, networks, channel vectors) disagree on size.
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    #[error("invalid configuration for '{parameter}': {reason}")]
    InvalidConfiguration { parameter: String, reason: String },

    /// A blocking fitness worker panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration parse error: {0}")]
    Config(#[from] toml::de::Error),
}

impl DaltonError {
    pub fn dimension_mismatch(expected: usize, got: usize, context: impl Into<String>) -> Self {
        DaltonError::DimensionMismatch {
            expected,
            got,
            context: context.into(),
        }
    }

    pub fn invalid_config(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        DaltonError::InvalidConfiguration {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_genome(details: impl Into<String>) -> Self {
        DaltonError::MalformedGenome(details.into())
    }

    /// True for errors caused by untrustworthy input data rather than by the caller.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            DaltonError::MalformedGenome(_) | DaltonError::EmptyImage { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_display_names_both_sizes() {
        let err = DaltonError::dimension_mismatch(12, 9, "network input");
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("9"));
        assert!(msg.contains("network input"));
    }

    #[test]
    fn malformed_input_classification() {
        assert!(DaltonError::malformed_genome("2 fields").is_malformed_input());
        assert!(DaltonError::EmptyImage { width: 0, height: 4 }.is_malformed_input());
        assert!(!DaltonError::dimension_mismatch(1, 2, "x").is_malformed_input());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DaltonError>();
    }
}

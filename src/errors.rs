//! Error types for the airguide guidance service.
//!
//! The backend seam reports typed errors; the guidance tool converts every
//! one of them into a plain-string response, so nothing here ever crosses
//! the transport boundary as a raised error.

use thiserror::Error;

/// Failures produced by the text-generation backend.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The generation pipeline itself failed (device, tensor, or tokenizer
    /// error during the forward/sampling loop).
    #[error("{0}")]
    Pipeline(String),

    /// The backend completed but produced no usable generated text.
    #[error("the model returned no valid output")]
    NoValidOutput,
}

/// Result type alias for backend operations.
pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_carries_message() {
        let err = GenerationError::Pipeline("CUDA OOM".to_string());
        assert!(err.to_string().contains("CUDA OOM"));
    }

    #[test]
    fn test_no_valid_output_display() {
        let err = GenerationError::NoValidOutput;
        assert!(err.to_string().contains("no valid output"));
    }

}

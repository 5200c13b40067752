//! The guidance tool: the one externally callable operation.
//!
//! Takes a weather report and an AQI report, builds the fixed prompt, asks
//! the backend for text, and normalizes every outcome into a single response
//! string. Success and failure share the one string channel, so the error
//! prefixes below are part of the external contract and must stay stable.

use std::sync::Arc;

use crate::backend::{BackendHandle, GenerationParams};
use crate::errors::GenerationError;

/// Returned when the model never initialized; the backend is not invoked.
pub const BACKEND_UNAVAILABLE_MSG: &str =
    "The language model could not be initialized. Please check your model path and device setup.";

/// Returned when the backend produced no usable text.
pub const NO_VALID_OUTPUT_MSG: &str =
    "Failed to generate safety guidelines. The model returned no valid output.";

/// Prefix for pipeline-level generation failures.
pub const PIPELINE_ERROR_PREFIX: &str = "Model pipeline error: ";

/// Prefix for failures outside the generation pipeline (worker faults).
pub const UNEXPECTED_ERROR_PREFIX: &str = "Unexpected error during text generation: ";

/// Build the instructional prompt. Both reports are interpolated verbatim;
/// the four numbered sections and their order are part of the contract.
pub fn build_prompt(weather_report: &str, aqi_report: &str) -> String {
    format!(
        "You are a health assistant. Given this weather and air quality:\n\
         \n\
         Weather Report:\n\
         {weather_report}\n\
         \n\
         AQI Report:\n\
         {aqi_report}\n\
         \n\
         Provide:\n\
         1. Overall outdoor safety level.\n\
         2. Health risks.\n\
         3. Precautions.\n\
         4. Special advice for sensitive groups.\n"
    )
}

/// Guidance service bound to a process-lifetime backend handle.
#[derive(Clone)]
pub struct GuidanceService {
    backend: BackendHandle,
    params: GenerationParams,
}

impl GuidanceService {
    pub fn new(backend: BackendHandle) -> Self {
        GuidanceService {
            backend,
            params: GenerationParams::default(),
        }
    }

    /// Analyze a weather report and an AQI report and produce outdoor safety
    /// guidance: overall safety level, health risks, precautions, and advice
    /// for sensitive groups.
    ///
    /// Per-call flow: check backend state, build prompt, invoke, normalize.
    /// All paths terminate in a returned string; no retries, no streaming.
    pub async fn safety_guidelines(&self, weather_report: &str, aqi_report: &str) -> String {
        let generator = match &self.backend {
            BackendHandle::Ready(generator) => Arc::clone(generator),
            BackendHandle::Unavailable(diagnostic) => {
                tracing::warn!(%diagnostic, "guidance requested while backend unavailable");
                return BACKEND_UNAVAILABLE_MSG.to_string();
            }
        };

        let prompt = build_prompt(weather_report, aqi_report);
        let params = self.params;

        // Generation is blocking and compute-bound; keep it off the async
        // dispatch threads.
        let outcome =
            tokio::task::spawn_blocking(move || generator.generate(&prompt, &params)).await;

        match outcome {
            // Trim here as well: the contract holds for any TextGenerator,
            // not just LocalModel's own trimmed output.
            Ok(Ok(text)) => text.trim().to_string(),
            Ok(Err(GenerationError::NoValidOutput)) => NO_VALID_OUTPUT_MSG.to_string(),
            Ok(Err(GenerationError::Pipeline(err))) => {
                tracing::error!(%err, "generation pipeline failed");
                format!("{PIPELINE_ERROR_PREFIX}{err}")
            }
            Err(join_err) => {
                tracing::error!(%join_err, "generation worker failed");
                format!("{UNEXPECTED_ERROR_PREFIX}{join_err}")
            }
        }
    }
}

//! Model backend adapter.
//!
//! Owns the generative model's lifecycle and exposes one capability: turn a
//! prompt into generated text, or fail with a typed [`GenerationError`].
//! Initialization happens exactly once at process startup; the resulting
//! [`BackendHandle`] is either `Ready` or `Unavailable` for the lifetime of
//! the process, and the guidance tool checks it before every invocation.

pub mod model;

use std::sync::Arc;

use crate::config::ModelConfig;
use crate::errors::GenerationResult;

/// Sampling parameters for a generation call.
///
/// Fixed by the service contract: callers cannot tune them per request.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    /// Softmax temperature for sampling.
    pub temperature: f64,
    /// Hard cap on newly generated tokens.
    pub max_new_tokens: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            temperature: 0.7,
            max_new_tokens: 512,
        }
    }
}

/// The single capability the backend exposes.
///
/// `generate` is blocking and compute-bound; async callers are expected to
/// run it on a blocking worker. Implementations return only newly generated
/// text (no prompt echo), trimmed of surrounding whitespace.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> GenerationResult<String>;
}

/// Process-lifetime backend state, constructed once at startup.
///
/// `Unavailable` carries the diagnostic from the failed load. There is no
/// transition back to `Ready` without a process restart.
#[derive(Clone)]
pub enum BackendHandle {
    Ready(Arc<dyn TextGenerator>),
    Unavailable(String),
}

impl BackendHandle {
    /// Attempt to load the model described by `config`.
    ///
    /// Any failure (missing artifacts, incompatible weights, device
    /// unavailable) is caught here: the error is logged together with
    /// operator guidance and the process keeps running in the
    /// `Unavailable` state.
    pub fn initialize(config: &ModelConfig) -> Self {
        match model::LocalModel::load(config) {
            Ok(loaded) => {
                tracing::info!("text generation model loaded, backend ready");
                BackendHandle::Ready(Arc::new(loaded))
            }
            Err(e) => {
                tracing::error!(
                    "Failed to load the text generation model: {e:#}. \
                     Please download it first using the CLI command (refer README)"
                );
                BackendHandle::Unavailable(format!("{e:#}"))
            }
        }
    }

    /// Wrap an already-constructed generator. Used by tests and by callers
    /// that manage loading themselves.
    pub fn ready(generator: Arc<dyn TextGenerator>) -> Self {
        BackendHandle::Ready(generator)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, BackendHandle::Ready(_))
    }
}

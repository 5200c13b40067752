//! airguide - Outdoor safety guidance from a local LLM
//!
//! An MCP server exposing one tool, `safety_guidelines`, which turns a
//! weather report and an air-quality report into outdoor safety guidance
//! generated by a locally loaded causal language model.
//!
//! # Architecture
//!
//! - `backend`: model lifecycle + the `generate` capability (candle)
//! - `guidance`: prompt construction and response normalization
//! - `server`: MCP JSON-RPC over SSE (axum)

pub mod backend;
pub mod cli;
pub mod config;
pub mod errors;
pub mod guidance;
pub mod server;

// Re-export commonly used types
pub use backend::{BackendHandle, GenerationParams, TextGenerator};
pub use errors::{GenerationError, GenerationResult};
pub use guidance::GuidanceService;

//! Integration tests for the guidance service contract.
//!
//! Exercises the availability short-circuit, prompt construction, response
//! normalization, and idempotence against stub and spy backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use airguide::backend::{BackendHandle, GenerationParams, TextGenerator};
use airguide::errors::{GenerationError, GenerationResult};
use airguide::guidance::{
    GuidanceService, BACKEND_UNAVAILABLE_MSG, NO_VALID_OUTPUT_MSG, PIPELINE_ERROR_PREFIX,
};

/// Counts invocations and records the last prompt seen.
struct SpyGenerator {
    calls: AtomicUsize,
    prompts: std::sync::Mutex<Vec<String>>,
    reply: GenerationResult<String>,
}

impl SpyGenerator {
    fn returning(text: &str) -> Arc<Self> {
        Arc::new(SpyGenerator {
            calls: AtomicUsize::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
            reply: Ok(text.to_string()),
        })
    }

    fn failing(err: GenerationError) -> Arc<Self> {
        Arc::new(SpyGenerator {
            calls: AtomicUsize::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
            reply: Err(err),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl TextGenerator for SpyGenerator {
    fn generate(&self, prompt: &str, _params: &GenerationParams) -> GenerationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(GenerationError::Pipeline(msg)) => Err(GenerationError::Pipeline(msg.clone())),
            Err(GenerationError::NoValidOutput) => Err(GenerationError::NoValidOutput),
        }
    }
}

fn service_with(generator: Arc<SpyGenerator>) -> GuidanceService {
    GuidanceService::new(BackendHandle::ready(generator))
}

// P1: an unavailable backend short-circuits to the fixed fallback string.
// The zero-invocation guarantee is structural: the Unavailable variant holds
// no generator, so there is nothing the service could invoke.
#[tokio::test]
async fn unavailable_backend_returns_fallback_without_invoking_backend() {
    let service = GuidanceService::new(BackendHandle::Unavailable(
        "weights not found".to_string(),
    ));

    let response = service.safety_guidelines("any weather", "any aqi").await;
    assert_eq!(response, BACKEND_UNAVAILABLE_MSG);
}

// P2: the prompt passed to the backend embeds both reports verbatim and
// requests the four named sections in order.
#[tokio::test]
async fn prompt_contains_inputs_and_sections() {
    let spy = SpyGenerator::returning("ok");
    let service = service_with(spy.clone());

    service
        .safety_guidelines("Overcast, 12C, gusty wind", "AQI 95, moderate")
        .await;

    let prompt = spy.last_prompt().expect("backend was invoked");
    assert!(prompt.contains("Overcast, 12C, gusty wind"));
    assert!(prompt.contains("AQI 95, moderate"));

    let positions: Vec<usize> = [
        "1. Overall outdoor safety level.",
        "2. Health risks.",
        "3. Precautions.",
        "4. Special advice for sensitive groups.",
    ]
    .iter()
    .map(|section| prompt.find(section).expect("section present"))
    .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

// P3: success is passed through trimmed and otherwise unmodified.
#[tokio::test]
async fn success_is_trimmed_pass_through() {
    let spy = SpyGenerator::returning("  SAFE. No risks.  ");
    let service = service_with(spy);

    let response = service.safety_guidelines("sunny", "aqi 10").await;
    assert_eq!(response, "SAFE. No risks.");
}

// P4: empty output becomes the fixed "no valid output" message.
#[tokio::test]
async fn empty_output_returns_no_valid_output_message() {
    let spy = SpyGenerator::failing(GenerationError::NoValidOutput);
    let service = service_with(spy);

    let response = service.safety_guidelines("sunny", "aqi 10").await;
    assert_eq!(response, NO_VALID_OUTPUT_MSG);
}

// P5: pipeline errors surface with the pipeline prefix and the error text.
#[tokio::test]
async fn pipeline_failure_surfaces_with_prefix() {
    let spy = SpyGenerator::failing(GenerationError::Pipeline("CUDA OOM".to_string()));
    let service = service_with(spy);

    let response = service.safety_guidelines("sunny", "aqi 10").await;
    assert!(response.starts_with(PIPELINE_ERROR_PREFIX));
    assert!(response.contains("CUDA OOM"));
}

// P6: identical inputs against a deterministic backend yield identical
// responses; no hidden state accumulates across calls.
#[tokio::test]
async fn identical_calls_are_idempotent() {
    let spy = SpyGenerator::returning("Stay hydrated.");
    let service = service_with(spy.clone());

    let first = service.safety_guidelines("hot", "aqi 60").await;
    let second = service.safety_guidelines("hot", "aqi 60").await;
    assert_eq!(first, second);
    assert_eq!(spy.call_count(), 2);

    let prompts = spy.prompts.lock().unwrap();
    assert_eq!(prompts[0], prompts[1]);
}

// End-to-end scenario from the service contract.
#[tokio::test]
async fn scenario_unhealthy_aqi() {
    let spy = SpyGenerator::returning(
        "1. Moderate risk\n2. Respiratory irritation\n3. Limit exertion\n4. Avoid for asthma/elderly",
    );
    let service = service_with(spy.clone());

    let response = service
        .safety_guidelines("Sunny, 30C, light breeze", "AQI 180, unhealthy")
        .await;
    assert_eq!(
        response,
        "1. Moderate risk\n2. Respiratory irritation\n3. Limit exertion\n4. Avoid for asthma/elderly"
    );

    let prompt = spy.last_prompt().unwrap();
    assert!(prompt.contains("Sunny, 30C, light breeze"));
    assert!(prompt.contains("AQI 180, unhealthy"));
}

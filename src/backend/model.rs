//! Local Llama-family causal LM runner via Candle.
//!
//! Artifacts are resolved strictly from the local filesystem: either an
//! explicit snapshot directory or the local Hugging Face cache. Nothing is
//! downloaded at runtime; a cache miss is a load failure with guidance to
//! fetch the model out-of-band.

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{
    Cache, Config as LlamaArchConfig, Llama, LlamaConfig, LlamaEosToks,
};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tokenizers::Tokenizer;

use crate::config::ModelConfig;
use crate::errors::{GenerationError, GenerationResult};
use super::{GenerationParams, TextGenerator};

/// Resolved locations of the three artifact kinds a snapshot must provide.
#[derive(Debug)]
struct ModelArtifacts {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: Vec<PathBuf>,
}

impl ModelArtifacts {
    /// Resolve from an explicit snapshot directory.
    fn from_dir(dir: &Path) -> Result<Self> {
        let config = dir.join("config.json");
        let tokenizer = dir.join("tokenizer.json");
        if !config.exists() {
            return Err(anyhow!("missing {} in model directory", config.display()));
        }
        if !tokenizer.exists() {
            return Err(anyhow!("missing {} in model directory", tokenizer.display()));
        }

        let mut weights = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read model directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "safetensors") {
                weights.push(path);
            }
        }
        weights.sort();
        if weights.is_empty() {
            return Err(anyhow!(
                "no *.safetensors weights found in {}",
                dir.display()
            ));
        }

        Ok(ModelArtifacts {
            config,
            tokenizer,
            weights,
        })
    }

    /// Resolve a model id through the local Hugging Face cache only.
    fn from_hub_cache(model_id: &str) -> Result<Self> {
        let cache = hf_hub::Cache::default();
        let repo = cache.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config = repo
            .get("config.json")
            .ok_or_else(|| anyhow!("config.json for {model_id} not in local cache"))?;

        // All snapshot files live next to config.json; list weights from there.
        let snapshot_dir = config
            .parent()
            .ok_or_else(|| anyhow!("cached config.json for {model_id} has no parent directory"))?
            .to_path_buf();

        let mut artifacts = Self::from_dir(&snapshot_dir)?;
        artifacts.config = config;
        Ok(artifacts)
    }

    fn resolve(config: &ModelConfig) -> Result<Self> {
        match (&config.path, &config.hub_id) {
            (Some(dir), _) => Self::from_dir(dir),
            (None, Some(id)) => Self::from_hub_cache(id),
            (None, None) => Err(anyhow!(
                "no model configured: set model.path or model.hub_id"
            )),
        }
    }
}

/// A loaded causal language model bound to one compute device.
///
/// There is exactly one instance per process, shared by all concurrent
/// calls. `gen_lock` serializes the forward/sampling loop so callers never
/// interleave on shared device memory.
pub struct LocalModel {
    model: Llama,
    tokenizer: Tokenizer,
    arch: LlamaArchConfig,
    device: Device,
    dtype: DType,
    gen_lock: Mutex<()>,
}

impl LocalModel {
    /// Load tokenizer, architecture config, and weights, then bind to the
    /// configured device. Runs once at startup.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let artifacts = ModelArtifacts::resolve(config)?;

        let device = match config.device {
            Some(index) => Device::new_cuda(index)
                .with_context(|| format!("Failed to open CUDA device {index}"))?,
            None => Device::Cpu,
        };
        let dtype = if device.is_cuda() { DType::F16 } else { DType::F32 };

        let tokenizer = Tokenizer::from_file(&artifacts.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer: {e}"))?;

        let config_contents = std::fs::read_to_string(&artifacts.config)
            .context("Failed to read model config")?;
        let llama_config: LlamaConfig = serde_json::from_str(&config_contents)
            .context("Failed to parse model config")?;
        let arch = llama_config.into_config(false);

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&artifacts.weights, dtype, &device)
                .context("Failed to load model weights")?
        };
        let model = Llama::load(vb, &arch).context("Failed to build model graph")?;

        tracing::info!(
            weights = artifacts.weights.len(),
            cuda = device.is_cuda(),
            "model artifacts loaded"
        );

        Ok(LocalModel {
            model,
            tokenizer,
            arch,
            device,
            dtype,
            gen_lock: Mutex::new(()),
        })
    }

    fn is_eos(&self, token: u32) -> bool {
        match &self.arch.eos_token_id {
            Some(LlamaEosToks::Single(id)) => token == *id,
            Some(LlamaEosToks::Multiple(ids)) => ids.contains(&token),
            None => false,
        }
    }

    fn sampling_seed() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(299_792_458)
    }
}

impl TextGenerator for LocalModel {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> GenerationResult<String> {
        // One request at a time on the shared model/device.
        let _guard = self
            .gen_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let pipeline = |e: &dyn std::fmt::Display| GenerationError::Pipeline(e.to_string());

        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| pipeline(&e))?;
        let mut tokens: Vec<u32> = encoding.get_ids().to_vec();
        let prompt_len = tokens.len();

        // Fresh KV cache per call: no hidden state survives between requests.
        let mut cache = Cache::new(true, self.dtype, &self.arch, &self.device)
            .map_err(|e| pipeline(&e))?;
        let mut logits_processor =
            LogitsProcessor::new(Self::sampling_seed(), Some(params.temperature), None);

        let mut generated: Vec<u32> = Vec::new();
        let mut index_pos = 0;
        for step in 0..params.max_new_tokens {
            let (context_size, context_index) = if step > 0 {
                (1, index_pos)
            } else {
                (tokens.len(), 0)
            };
            let context = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(context, &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| pipeline(&e))?;
            let logits = self
                .model
                .forward(&input, context_index, &mut cache)
                .and_then(|l| l.squeeze(0))
                .map_err(|e| pipeline(&e))?;
            index_pos += context.len();

            let next = logits_processor.sample(&logits).map_err(|e| pipeline(&e))?;
            if self.is_eos(next) {
                break;
            }
            tokens.push(next);
            generated.push(next);
        }

        tracing::debug!(
            prompt_tokens = prompt_len,
            output_tokens = generated.len(),
            "generation finished"
        );

        if generated.is_empty() {
            return Err(GenerationError::NoValidOutput);
        }

        // Decode only the newly generated ids: no prompt echo.
        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| pipeline(&e))?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::NoValidOutput);
        }
        Ok(text)
    }
}

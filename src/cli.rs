//! Command-line argument parsing for airguide
//!
//! Provides clap-based CLI with flags that override the on-disk config.

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// airguide - Outdoor safety guidance from weather and AQI reports via a local LLM
#[derive(Parser, Debug)]
#[command(name = "airguide")]
#[command(version = "0.1.0")]
#[command(about = "MCP server generating outdoor safety guidance with a local model", long_about = None)]
pub struct Args {
    /// Host to bind the MCP endpoint to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind the MCP endpoint to
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory containing the model snapshot (config.json, tokenizer.json, *.safetensors)
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Hugging Face model id resolved from the local cache (no network fetch)
    #[arg(long)]
    pub hub_id: Option<String>,

    /// CUDA device index (omit for CPU)
    #[arg(long)]
    pub device: Option<usize>,

    /// Verbosity level: default (info), -v (debug), -vv (trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Fold CLI overrides into the loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.model_path {
            config.model.path = Some(path.clone());
        }
        if let Some(hub_id) = &self.hub_id {
            config.model.hub_id = Some(hub_id.clone());
        }
        if let Some(device) = self.device {
            config.model.device = Some(device);
        }
    }

    /// Log filter directive for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "airguide=info",
            1 => "airguide=debug",
            _ => "airguide=trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let args = Args::parse_from([
            "airguide",
            "--port",
            "9100",
            "--model-path",
            "/models/llama",
            "--device",
            "1",
        ]);
        let mut config = Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.model.path, Some(PathBuf::from("/models/llama")));
        assert_eq!(config.model.device, Some(1));
        // Untouched fields keep config values
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_log_filter_levels() {
        let args = Args::parse_from(["airguide"]);
        assert_eq!(args.log_filter(), "airguide=info");
        let args = Args::parse_from(["airguide", "-vv"]);
        assert_eq!(args.log_filter(), "airguide=trace");
    }
}

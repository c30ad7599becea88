//! Runtime configuration for vram-planner.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Engine calibration knobs, input defaults and launch-command settings live here.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::emitter::OutputFormat;
use crate::input::{GpuSpec, WorkloadProfile};
use crate::memory::DEFAULT_SYSTEM_OVERHEAD_FRACTION;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vram-planner",
    version,
    about = "GPU memory estimation and deployment planning for LLM inference"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, global = true, default_value = "planner.json")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Produce a full deployment plan and launch command.
    Plan {
        /// Input record (JSON file, or `-` for stdin).
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Launch command flavor.
        #[arg(short, long, value_enum, default_value_t = FormatArg::Command)]
        format: FormatArg,

        /// Print the whole plan as JSON instead of the command.
        #[arg(long)]
        json: bool,
    },

    /// Print the memory breakdown only.
    Memory {
        /// Input record (JSON file, or `-` for stdin).
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },

    /// Inspect the quantization catalog.
    Quant {
        #[command(subcommand)]
        action: QuantCommand,
    },

    /// Estimate a transformer shape from a parameter count.
    Arch {
        /// Parameter count in billions.
        #[arg(long)]
        params: f64,
    },

    /// Run the HTTP planning service.
    Serve {
        /// HTTP listen address (overrides the config file).
        #[arg(long)]
        listen: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum QuantCommand {
    /// List every supported format.
    List,

    /// Order formats from most to least compressed.
    Compare {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Recommend a format for a GPU and model size.
    Recommend {
        /// VRAM in GB.
        #[arg(long)]
        vram: f64,

        /// Parameter count in billions.
        #[arg(long)]
        params: f64,

        #[arg(long, default_value_t = 1)]
        batch_size: u64,

        #[arg(long, default_value_t = 2048)]
        max_seq_len: u64,

        /// quality, memory or balanced.
        #[arg(long, default_value = "balanced")]
        priority: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Command,
    Docker,
    Kubernetes,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Command => OutputFormat::Command,
            FormatArg::Docker => OutputFormat::Docker,
            FormatArg::Kubernetes => OutputFormat::Kubernetes,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,

    /// Engine calibration.
    pub engine: EngineConfig,

    /// Values used when an input record leaves them out.
    pub defaults: DefaultsConfig,

    /// Launch command settings.
    pub output: OutputConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Heuristic constants exposed to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// System overhead as a fraction of weights + KV cache + activations.
    pub system_overhead_fraction: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_overhead_fraction: DEFAULT_SYSTEM_OVERHEAD_FRACTION,
        }
    }
}

/// Fallbacks for flat and hybrid input records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub gpu: GpuSpec,
    pub workload: WorkloadProfile,
    pub quantization: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            gpu: GpuSpec::default(),
            workload: WorkloadProfile::default(),
            quantization: "fp16".to_string(),
        }
    }
}

/// Container and cluster descriptor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Entrypoint for the direct command line.
    pub entrypoint: String,

    /// Container image for docker / kubernetes output.
    pub docker_image: String,

    /// Port the server listens on inside the container.
    pub port: u16,

    /// Host model cache mounted into the container.
    pub hf_cache_dir: String,

    /// Kubernetes namespace.
    pub namespace: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            entrypoint: "python -m vllm.entrypoints.openai.api_server".to_string(),
            docker_image: "vllm/vllm-openai:latest".to_string(),
            port: 8000,
            hf_cache_dir: "~/.cache/huggingface".to_string(),
            namespace: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            crate::memory::MemoryModel::new(config.engine.system_overhead_fraction)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.engine.system_overhead_fraction, 0.10);
        assert_eq!(cfg.output.port, 8000);
        assert_eq!(cfg.defaults.quantization, "fp16");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "engine": {{ "system_overhead_fraction": 0.2 }} }}"#).unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.engine.system_overhead_fraction, 0.2);
        assert_eq!(cfg.server.listen, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_rejects_bad_overhead() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "engine": {{ "system_overhead_fraction": 3.0 }} }}"#).unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load(std::path::Path::new("/nonexistent/planner.json")).unwrap();
        assert_eq!(cfg.server.max_body_bytes, 64 * 1024);
    }

    #[test]
    fn test_cli_parses_plan() {
        let cli = Cli::parse_from(["vram-planner", "plan", "--input", "req.json", "--format", "docker"]);
        match cli.command {
            Command::Plan { format, json, .. } => {
                assert_eq!(format, FormatArg::Docker);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

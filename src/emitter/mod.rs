//! Runtime configuration and launch command emission.
//!
//! - [`params`]: known-parameter table and best-effort validation
//! - [`render`]: command line, container run command, cluster descriptor
//!
//! The emitter never fails. Unknown or borderline parameters become
//! warnings, and a missing model identifier is replaced by a placeholder so
//! that partial configurations can still be previewed.

pub mod params;
pub mod render;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::OutputConfig;

pub use params::{EmitWarning, WarningKind};

/// Substituted when no model identifier was given.
pub const MODEL_PLACEHOLDER: &str = "<model-name>";

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl ParamValue {
    /// Rendered argument, or `None` when the value takes no argument.
    pub fn render(&self) -> Option<String> {
        match self {
            ParamValue::Null | ParamValue::Bool(_) => None,
            ParamValue::Int(v) => Some(v.to_string()),
            ParamValue::Float(v) => Some(format_float(*v)),
            ParamValue::Str(v) => Some(v.clone()),
            ParamValue::List(v) => Some(v.join(",")),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, ParamValue::Bool(true))
    }
}

fn format_float(v: f64) -> String {
    let s = format!("{v:.4}");
    let s = s.trim_end_matches('0');
    s.strip_suffix('.').unwrap_or(s).to_string()
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        ParamValue::List(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Parameter name to value, in any key style.
pub type ParameterMap = BTreeMap<String, ParamValue>;

/// Canonical kebab-case flag name: `maxNumSeqs`, `max_num_seqs` and
/// `--max-num-seqs` all become `max-num-seqs`.
pub fn canonical_flag(key: &str) -> String {
    let trimmed = key.trim().trim_start_matches('-');
    let mut out = String::with_capacity(trimmed.len() + 4);
    let mut prev_lower = false;
    for ch in trimmed.chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            if !out.ends_with('-') && !out.is_empty() {
                out.push('-');
            }
            prev_lower = false;
        } else if ch.is_ascii_uppercase() {
            if prev_lower && !out.ends_with('-') {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out.trim_end_matches('-').to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Command,
    Docker,
    Kubernetes,
}

/// Terminal artifact: canonical parameters plus the rendered command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfiguration {
    pub parameters: ParameterMap,
    pub format: OutputFormat,
    pub command: String,
    pub warnings: Vec<EmitWarning>,
}

impl RuntimeConfiguration {
    /// The model identifier was missing and a placeholder was used.
    pub fn missing_required(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| w.kind == WarningKind::MissingRequired)
    }
}

/// Renders parameter maps using the configured entrypoint and container settings.
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    output: OutputConfig,
    gpu_count: Option<u64>,
}

impl Emitter {
    pub fn new(output: OutputConfig) -> Self {
        Self {
            output,
            gpu_count: None,
        }
    }

    /// Declared GPU count, checked against the parallelism settings.
    pub fn with_gpu_count(mut self, gpu_count: u64) -> Self {
        self.gpu_count = Some(gpu_count);
        self
    }

    pub fn emit(&self, params: &ParameterMap, format: OutputFormat) -> RuntimeConfiguration {
        let mut parameters = ParameterMap::new();
        let mut collisions = Vec::new();
        for (key, value) in params {
            let flag = canonical_flag(key);
            if flag.is_empty() {
                continue;
            }
            if parameters.insert(flag.clone(), value.clone()).is_some() {
                collisions.push(EmitWarning::new(
                    &flag,
                    WarningKind::Inconsistent,
                    format!("`{key}` is another spelling of --{flag}; keeping its value"),
                ));
            }
        }

        let mut warnings = params::check(&parameters, self.gpu_count);
        warnings.extend(collisions);

        let model_problem = match parameters.get("model") {
            Some(ParamValue::Str(s)) if !s.trim().is_empty() => None,
            None | Some(ParamValue::Null) | Some(ParamValue::Str(_)) => Some(EmitWarning::new(
                "model",
                WarningKind::MissingRequired,
                format!("model identifier is required; using placeholder {MODEL_PLACEHOLDER}"),
            )),
            Some(other) => Some(EmitWarning::new(
                "model",
                WarningKind::InvalidType,
                format!("model identifier must be a string, got {other:?}; using placeholder {MODEL_PLACEHOLDER}"),
            )),
        };
        if let Some(problem) = model_problem {
            // Supersedes the table check's type warning for `model`.
            warnings.retain(|w| !(w.parameter == "model" && w.kind == WarningKind::InvalidType));
            warnings.push(problem);
            parameters.insert("model".to_string(), ParamValue::from(MODEL_PLACEHOLDER));
        }

        for w in &warnings {
            warn!(parameter = %w.parameter, kind = ?w.kind, "{}", w.message);
        }

        let command = match format {
            OutputFormat::Command => render::command_line(&self.output, &parameters),
            OutputFormat::Docker => render::docker_run(&self.output, &parameters),
            OutputFormat::Kubernetes => render::kubernetes_deployment(&self.output, &parameters),
        };

        RuntimeConfiguration {
            parameters,
            format,
            command,
            warnings,
        }
    }
}

/// Emit a direct command line with default output settings.
pub fn emit(params: &ParameterMap) -> RuntimeConfiguration {
    Emitter::default().emit(params, OutputFormat::Command)
}

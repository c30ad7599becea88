//! Known serving-engine parameters and best-effort validation.

use serde::Serialize;

use super::{ParamValue, ParameterMap};
use crate::error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Unknown,
    InvalidType,
    OutOfRange,
    Borderline,
    InvalidChoice,
    MissingRequired,
    Inconsistent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmitWarning {
    pub parameter: String,
    pub kind: WarningKind,
    pub message: String,
}

impl EmitWarning {
    pub(crate) fn new(parameter: &str, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            parameter: parameter.to_string(),
            kind,
            message: message.into(),
        }
    }

    fn inconsistent(parameter: &str, err: PlanError) -> Self {
        Self::new(parameter, WarningKind::Inconsistent, err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ParamKind {
    Flag,
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Choice(&'static [&'static str]),
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Values outside this range are legal but unusual.
    pub recommended: Option<(f64, f64)>,
}

const fn spec(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        recommended: None,
    }
}

const fn spec_recommended(name: &'static str, kind: ParamKind, lo: f64, hi: f64) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        recommended: Some((lo, hi)),
    }
}

static KNOWN: &[ParamSpec] = &[
    spec("model", ParamKind::Text),
    spec("served-model-name", ParamKind::Text),
    spec("host", ParamKind::Text),
    spec("port", ParamKind::Int { min: 1, max: 65_535 }),
    spec("tensor-parallel-size", ParamKind::Int { min: 1, max: 64 }),
    spec("pipeline-parallel-size", ParamKind::Int { min: 1, max: 64 }),
    spec_recommended(
        "gpu-memory-utilization",
        ParamKind::Float { min: 0.05, max: 1.0 },
        0.5,
        0.95,
    ),
    spec_recommended(
        "max-num-seqs",
        ParamKind::Int { min: 1, max: 10_000 },
        1.0,
        512.0,
    ),
    spec("max-num-batched-tokens", ParamKind::Int { min: 1, max: 1_000_000 }),
    spec("max-model-len", ParamKind::Int { min: 1, max: 1_000_000 }),
    spec(
        "dtype",
        ParamKind::Choice(&["auto", "half", "float16", "bfloat16", "float", "float32"]),
    ),
    spec(
        "quantization",
        ParamKind::Choice(&["awq", "gptq", "fp8", "bitsandbytes", "squeezellm", "marlin"]),
    ),
    spec(
        "kv-cache-dtype",
        ParamKind::Choice(&["auto", "fp8", "fp8_e5m2", "fp8_e4m3"]),
    ),
    spec_recommended("swap-space", ParamKind::Float { min: 0.0, max: 1024.0 }, 0.0, 64.0),
    spec("block-size", ParamKind::Choice(&["8", "16", "32"])),
    spec("enable-chunked-prefill", ParamKind::Flag),
    spec("enable-prefix-caching", ParamKind::Flag),
    spec("enforce-eager", ParamKind::Flag),
    spec("disable-log-requests", ParamKind::Flag),
    spec("trust-remote-code", ParamKind::Flag),
    spec("seed", ParamKind::Int { min: 0, max: i64::MAX }),
];

pub fn known_parameters() -> &'static [ParamSpec] {
    KNOWN
}

pub fn lookup(name: &str) -> Option<&'static ParamSpec> {
    KNOWN.iter().find(|p| p.name == name)
}

/// Validate canonical-keyed parameters. Never fails; returns warnings.
pub fn check(params: &ParameterMap, gpu_count: Option<u64>) -> Vec<EmitWarning> {
    let mut warnings = Vec::new();
    for (name, value) in params {
        if matches!(value, ParamValue::Null) {
            continue;
        }
        match lookup(name) {
            Some(spec) => check_value(spec, value, &mut warnings),
            None => warnings.push(EmitWarning::new(
                name,
                WarningKind::Unknown,
                format!("unknown parameter `{name}` passed through unchecked"),
            )),
        }
    }
    check_consistency(params, gpu_count, &mut warnings);
    warnings
}

fn check_value(spec: &ParamSpec, value: &ParamValue, warnings: &mut Vec<EmitWarning>) {
    let name = spec.name;
    let type_error = |expected: &str| {
        EmitWarning::new(
            name,
            WarningKind::InvalidType,
            format!("expected {expected}, got {value:?}"),
        )
    };

    let numeric = match (spec.kind, value) {
        (ParamKind::Flag, ParamValue::Bool(_)) => None,
        (ParamKind::Flag, _) => {
            warnings.push(type_error("a boolean"));
            None
        }
        (ParamKind::Int { min, max }, ParamValue::Int(v)) => {
            if *v < min || *v > max {
                warnings.push(EmitWarning::new(
                    name,
                    WarningKind::OutOfRange,
                    format!("{v} is outside [{min}, {max}]"),
                ));
            }
            Some(*v as f64)
        }
        (ParamKind::Int { .. }, _) => {
            warnings.push(type_error("an integer"));
            None
        }
        (ParamKind::Float { min, max }, v @ (ParamValue::Int(_) | ParamValue::Float(_))) => {
            let n = v.as_f64().unwrap_or_default();
            if n.is_nan() || n < min || n > max {
                warnings.push(EmitWarning::new(
                    name,
                    WarningKind::OutOfRange,
                    format!("{n} is outside [{min}, {max}]"),
                ));
            }
            Some(n)
        }
        (ParamKind::Float { .. }, _) => {
            warnings.push(type_error("a number"));
            None
        }
        (ParamKind::Choice(choices), v) => {
            match v.render() {
                Some(s) if choices.contains(&s.to_lowercase().as_str()) => {}
                Some(s) => warnings.push(EmitWarning::new(
                    name,
                    WarningKind::InvalidChoice,
                    format!("`{s}` is not one of: {}", choices.join(", ")),
                )),
                None => warnings.push(type_error("a string")),
            }
            None
        }
        (ParamKind::Text, ParamValue::Str(_) | ParamValue::List(_)) => None,
        (ParamKind::Text, _) => {
            warnings.push(type_error("a string"));
            None
        }
    };

    if let (Some(n), Some((lo, hi))) = (numeric, spec.recommended) {
        if (n < lo || n > hi) && !warnings.iter().any(|w| w.parameter == name) {
            warnings.push(EmitWarning::new(
                name,
                WarningKind::Borderline,
                format!("{n} is outside the usual range [{lo}, {hi}]"),
            ));
        }
    }
}

fn check_consistency(params: &ParameterMap, gpu_count: Option<u64>, warnings: &mut Vec<EmitWarning>) {
    let int = |key: &str| params.get(key).and_then(ParamValue::as_i64);
    let chunked = params
        .get("enable-chunked-prefill")
        .is_some_and(ParamValue::is_true);

    if let (Some(tokens), Some(max_len)) = (int("max-num-batched-tokens"), int("max-model-len")) {
        if tokens < max_len && !chunked {
            warnings.push(EmitWarning::inconsistent(
                "max-num-batched-tokens",
                PlanError::Configuration(format!(
                    "max-num-batched-tokens ({tokens}) is below max-model-len ({max_len}) without chunked prefill"
                )),
            ));
        }
    }

    if let (Some(seqs), Some(tokens)) = (int("max-num-seqs"), int("max-num-batched-tokens")) {
        if seqs > tokens {
            warnings.push(EmitWarning::inconsistent(
                "max-num-seqs",
                PlanError::Configuration(format!(
                    "max-num-seqs ({seqs}) exceeds max-num-batched-tokens ({tokens})"
                )),
            ));
        }
    }

    if let Some(gpus) = gpu_count {
        let tp = int("tensor-parallel-size").unwrap_or(1);
        let pp = int("pipeline-parallel-size").unwrap_or(1);
        if u64::try_from(tp.saturating_mul(pp)).ok() != Some(gpus) {
            warnings.push(EmitWarning::inconsistent(
                "tensor-parallel-size",
                PlanError::Configuration(format!(
                    "tensor-parallel-size ({tp}) × pipeline-parallel-size ({pp}) does not match the {gpus} available GPUs"
                )),
            ));
        }
    }
}

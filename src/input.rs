//! Canonical planning inputs and their normalization from JSON records.
//!
//! Three record shapes are accepted and resolved here, once:
//! - structured: `{ gpuSpecs: {..}, modelSpecs: {..}, workloadSpecs: {..} }`
//! - flat: every field at the top level
//! - hybrid: some nested sections present, the rest flat or defaulted
//!
//! camelCase and snake_case keys (plus a few common synonyms) are accepted.
//! Downstream code only ever sees [`PlanInput`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::architecture::PartialArchitecture;
use crate::config::DefaultsConfig;
use crate::error::{PlanError, Result};
use crate::strategy::Posture;
use crate::validate::{self, NumberBounds};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GpuSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Memory per GPU.
    #[serde(rename = "totalMemoryGB")]
    pub total_memory_gb: f64,
    /// Bandwidth per GPU.
    #[serde(rename = "memoryBandwidthGBps")]
    pub memory_bandwidth_gbps: f64,
    pub has_tensor_cores: bool,
    pub gpu_count: u64,
}

impl Default for GpuSpec {
    fn default() -> Self {
        // A100 80GB SXM
        Self {
            name: None,
            total_memory_gb: 80.0,
            memory_bandwidth_gbps: 2039.0,
            has_tensor_cores: true,
            gpu_count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    /// Model identifier passed to the serving engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parameters_billion: f64,
    pub quantization: String,
    #[serde(default, skip_serializing_if = "PartialArchitecture::is_empty")]
    pub architecture: PartialArchitecture,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkloadProfile {
    pub expected_concurrency: u64,
    pub average_sequence_length: u64,
    pub max_sequence_length: u64,
    #[serde(rename = "optimizationPosture")]
    pub posture: Posture,
    /// Free-form use case; doubles as the balanced posture's target profile.
    pub workload_kind: String,
}

impl Default for WorkloadProfile {
    fn default() -> Self {
        Self {
            expected_concurrency: 32,
            average_sequence_length: 1024,
            max_sequence_length: 4096,
            posture: Posture::Balanced,
            workload_kind: "general".to_string(),
        }
    }
}

/// The one canonical record every planning stage consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    #[serde(rename = "gpuSpecs")]
    pub gpu: GpuSpec,
    #[serde(rename = "modelSpecs")]
    pub model: ModelSpec,
    #[serde(rename = "workloadSpecs")]
    pub workload: WorkloadProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputShape {
    Structured,
    Flat,
    Hybrid,
}

const GPU_SECTION: &[&str] = &["gpuSpecs", "gpu_specs", "gpu"];
const MODEL_SECTION: &[&str] = &["modelSpecs", "model_specs", "model"];
const WORKLOAD_SECTION: &[&str] = &["workloadSpecs", "workload_specs", "workload"];

/// Canonical key followed by accepted synonyms.
const ALIASES: &[(&str, &[&str])] = &[
    ("gpuName", &["gpu_name"]),
    ("totalMemoryGB", &["total_memory_gb", "totalMemoryGb", "vramGB", "vram_gb", "vram"]),
    (
        "memoryBandwidthGBps",
        &["memory_bandwidth_gbps", "memoryBandwidthGbps", "bandwidthGBps", "bandwidth"],
    ),
    ("hasTensorCores", &["has_tensor_cores", "tensorCores", "tensor_cores"]),
    ("gpuCount", &["gpu_count", "numGpus", "num_gpus"]),
    ("modelName", &["model_name", "modelId", "model_id"]),
    (
        "parametersBillion",
        &["parameters_billion", "paramsBillion", "params_billion", "modelSize", "model_size"],
    ),
    ("quantization", &["precision", "dtype"]),
    ("layerCount", &["layer_count", "numLayers", "num_layers", "layers"]),
    ("hiddenSize", &["hidden_size"]),
    ("headCount", &["head_count", "numHeads", "num_heads", "numAttentionHeads"]),
    ("vocabularySize", &["vocabulary_size", "vocabSize", "vocab_size"]),
    (
        "feedForwardSize",
        &["feed_forward_size", "intermediateSize", "intermediate_size", "ffnSize"],
    ),
    (
        "expectedConcurrency",
        &["expected_concurrency", "concurrency", "concurrentUsers", "batchSize", "batch_size"],
    ),
    (
        "averageSequenceLength",
        &["average_sequence_length", "avgSequenceLength", "avgSeqLen", "avg_seq_len"],
    ),
    (
        "maxSequenceLength",
        &["max_sequence_length", "maxSeqLen", "max_seq_len", "maxModelLen", "max_model_len"],
    ),
    (
        "optimizationPosture",
        &["optimization_posture", "posture", "optimizationTarget", "optimization_target"],
    ),
    (
        "workloadKind",
        &["workload_kind", "workloadType", "workload_type", "useCase", "targetProfile"],
    ),
];

fn canonical_key(key: &str) -> &str {
    ALIASES
        .iter()
        .find(|(canonical, aliases)| *canonical == key || aliases.contains(&key))
        .map(|(canonical, _)| *canonical)
        .unwrap_or(key)
}

/// Rename synonyms to canonical keys. An explicit canonical key wins over a synonym.
fn canonicalize(obj: &Map<String, Value>, name_key: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in obj {
        let canonical = if key == "name" {
            name_key
        } else {
            canonical_key(key)
        };
        if canonical == key || !out.contains_key(canonical) {
            out.insert(canonical.to_string(), value.clone());
        }
    }
    out
}

fn nested<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Map<String, Value>> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_object))
}

/// Which of the accepted record shapes `value` is.
pub fn detect_shape(value: &Value) -> Result<InputShape> {
    let obj = value
        .as_object()
        .ok_or_else(|| PlanError::validation("input", "non-object", "expected an object"))?;
    let present = [GPU_SECTION, MODEL_SECTION, WORKLOAD_SECTION]
        .iter()
        .filter(|keys| nested(obj, keys).is_some())
        .count();
    Ok(match present {
        3 => InputShape::Structured,
        0 => InputShape::Flat,
        _ => InputShape::Hybrid,
    })
}

/// Resolve any accepted record shape into a validated [`PlanInput`].
pub fn normalize(value: &Value, defaults: &DefaultsConfig) -> Result<PlanInput> {
    let shape = detect_shape(value)?;
    let top = value
        .as_object()
        .ok_or_else(|| PlanError::validation("input", "non-object", "expected an object"))?;

    // A flat record may name the model with a plain `model` string.
    let mut flat = canonicalize(top, "modelName");
    if let Some(Value::String(model)) = top.get("model") {
        flat.entry("modelName").or_insert_with(|| Value::String(model.clone()));
    }

    let section = |keys: &[&str], name_key: &str| -> Map<String, Value> {
        match nested(top, keys) {
            Some(obj) => canonicalize(obj, name_key),
            None => flat.clone(),
        }
    };
    let gpu_fields = section(GPU_SECTION, "gpuName");
    let model_fields = section(MODEL_SECTION, "modelName");
    let workload_fields = section(WORKLOAD_SECTION, "workloadKind");

    if shape == InputShape::Structured {
        validate::require_fields(
            &Value::Object(gpu_fields.clone()),
            &["totalMemoryGB"],
            "gpuSpecs",
        )?;
        validate::require_fields(
            &Value::Object(model_fields.clone()),
            &["parametersBillion"],
            "modelSpecs",
        )?;
    }

    let input = PlanInput {
        gpu: gpu_spec(&gpu_fields, &defaults.gpu)?,
        model: model_spec(&model_fields, &defaults.quantization, shape)?,
        workload: workload_profile(&workload_fields, &defaults.workload)?,
    };
    validate::plan_input(&input)?;

    debug!(?shape, params_billion = input.model.parameters_billion, "Normalized input");
    Ok(input)
}

fn get<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn gpu_spec(obj: &Map<String, Value>, default: &GpuSpec) -> Result<GpuSpec> {
    Ok(GpuSpec {
        name: get(obj, "gpuName")
            .map(|v| validate::non_empty_string(v, "gpuSpecs.name"))
            .transpose()?
            .or_else(|| default.name.clone()),
        total_memory_gb: get(obj, "totalMemoryGB")
            .map(|v| validate::number(v, validate::VRAM_GB, "gpuSpecs.totalMemoryGB"))
            .transpose()?
            .unwrap_or(default.total_memory_gb),
        memory_bandwidth_gbps: get(obj, "memoryBandwidthGBps")
            .map(|v| validate::number(v, validate::BANDWIDTH_GBPS, "gpuSpecs.memoryBandwidthGBps"))
            .transpose()?
            .unwrap_or(default.memory_bandwidth_gbps),
        has_tensor_cores: get(obj, "hasTensorCores")
            .map(|v| validate::boolean(v, "gpuSpecs.hasTensorCores"))
            .transpose()?
            .unwrap_or(default.has_tensor_cores),
        gpu_count: get(obj, "gpuCount")
            .map(|v| validate::integer(v, validate::GPU_COUNT, "gpuSpecs.gpuCount"))
            .transpose()?
            .unwrap_or(default.gpu_count),
    })
}

fn model_spec(obj: &Map<String, Value>, default_quantization: &str, shape: InputShape) -> Result<ModelSpec> {
    let parameters_billion = match get(obj, "parametersBillion") {
        Some(v) => validate::number(v, validate::PARAMETERS_BILLION, "modelSpecs.parametersBillion")?,
        None => {
            let field = if shape == InputShape::Flat {
                "parametersBillion"
            } else {
                "modelSpecs.parametersBillion"
            };
            return Err(PlanError::validation(field, "missing", "required field is missing"));
        }
    };

    let quantization = match get(obj, "quantization") {
        Some(v) => validate::quantization_name(v, "modelSpecs.quantization")?,
        None => default_quantization.to_string(),
    };

    // Shape overrides may sit directly on the model or under `architecture`.
    let arch_fields = match get(obj, "architecture").and_then(Value::as_object) {
        Some(nested) => canonicalize(nested, "name"),
        None => obj.clone(),
    };
    let dim = NumberBounds::inclusive(1.0, 1_000_000.0);
    let arch_field = |key: &str| -> Result<Option<u64>> {
        get(&arch_fields, key)
            .map(|v| validate::integer(v, dim, &format!("modelSpecs.architecture.{key}")))
            .transpose()
    };

    Ok(ModelSpec {
        name: get(obj, "modelName")
            .map(|v| validate::non_empty_string(v, "modelSpecs.name"))
            .transpose()?,
        parameters_billion,
        quantization,
        architecture: PartialArchitecture {
            layer_count: arch_field("layerCount")?,
            hidden_size: arch_field("hiddenSize")?,
            head_count: arch_field("headCount")?,
            vocabulary_size: arch_field("vocabularySize")?,
            feed_forward_size: arch_field("feedForwardSize")?,
        },
    })
}

fn workload_profile(obj: &Map<String, Value>, default: &WorkloadProfile) -> Result<WorkloadProfile> {
    let expected_concurrency = get(obj, "expectedConcurrency")
        .map(|v| validate::integer(v, validate::BATCH_SIZE, "workloadSpecs.expectedConcurrency"))
        .transpose()?
        .unwrap_or(default.expected_concurrency);
    let average = get(obj, "averageSequenceLength")
        .map(|v| validate::integer(v, validate::SEQUENCE_LENGTH, "workloadSpecs.averageSequenceLength"))
        .transpose()?;
    let max = get(obj, "maxSequenceLength")
        .map(|v| validate::integer(v, validate::SEQUENCE_LENGTH, "workloadSpecs.maxSequenceLength"))
        .transpose()?;

    // Only default one side so that an explicit value never trips the avg <= max check.
    let (average_sequence_length, max_sequence_length) = match (average, max) {
        (Some(avg), Some(max)) => (avg, max),
        (Some(avg), None) => (avg, avg.max(default.max_sequence_length)),
        (None, Some(max)) => (default.average_sequence_length.min(max), max),
        (None, None) => (default.average_sequence_length, default.max_sequence_length),
    };

    let posture = match get(obj, "optimizationPosture") {
        Some(v) => validate::one_of(v, &Posture::NAMES, "workloadSpecs.optimizationPosture")?
            .parse()?,
        None => default.posture,
    };
    let workload_kind = match get(obj, "workloadKind") {
        Some(v) => validate::non_empty_string(v, "workloadSpecs.workloadKind")?.to_lowercase(),
        None => default.workload_kind.clone(),
    };

    Ok(WorkloadProfile {
        expected_concurrency,
        average_sequence_length,
        max_sequence_length,
        posture,
        workload_kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> DefaultsConfig {
        DefaultsConfig::default()
    }

    #[test]
    fn test_structured_shape() {
        let value = json!({
            "gpuSpecs": { "totalMemoryGB": 24, "memoryBandwidthGBps": 1008, "hasTensorCores": true, "gpuCount": 1 },
            "modelSpecs": { "name": "meta-llama/Llama-2-7b-hf", "parametersBillion": 7, "quantization": "FP16" },
            "workloadSpecs": { "expectedConcurrency": 8, "averageSequenceLength": 512, "maxSequenceLength": 2048, "optimizationPosture": "latency" }
        });
        assert_eq!(detect_shape(&value).unwrap(), InputShape::Structured);
        let input = normalize(&value, &defaults()).unwrap();
        assert_eq!(input.gpu.total_memory_gb, 24.0);
        assert_eq!(input.model.name.as_deref(), Some("meta-llama/Llama-2-7b-hf"));
        assert_eq!(input.model.quantization, "fp16");
        assert_eq!(input.workload.posture, Posture::Latency);
    }

    #[test]
    fn test_flat_shape_with_synonyms() {
        let value = json!({
            "model": "mistralai/Mistral-7B-v0.1",
            "params_billion": 7.0,
            "vram_gb": 48,
            "num_gpus": 2,
            "max_seq_len": 8192,
            "posture": "Throughput"
        });
        assert_eq!(detect_shape(&value).unwrap(), InputShape::Flat);
        let input = normalize(&value, &defaults()).unwrap();
        assert_eq!(input.model.name.as_deref(), Some("mistralai/Mistral-7B-v0.1"));
        assert_eq!(input.gpu.total_memory_gb, 48.0);
        assert_eq!(input.gpu.gpu_count, 2);
        assert_eq!(input.workload.max_sequence_length, 8192);
        assert_eq!(input.workload.posture, Posture::Throughput);
        assert_eq!(input.model.quantization, defaults().quantization);
    }

    #[test]
    fn test_hybrid_shape_defaults_missing_sections() {
        let value = json!({
            "modelSpecs": { "parametersBillion": 13, "architecture": { "num_layers": 40 } },
            "totalMemoryGB": 40
        });
        assert_eq!(detect_shape(&value).unwrap(), InputShape::Hybrid);
        let input = normalize(&value, &defaults()).unwrap();
        assert_eq!(input.gpu.total_memory_gb, 40.0);
        assert_eq!(input.model.architecture.layer_count, Some(40));
        assert_eq!(input.workload, WorkloadProfile::default());
    }

    #[test]
    fn test_structured_requires_memory() {
        let value = json!({
            "gpuSpecs": { "gpuCount": 1 },
            "modelSpecs": { "parametersBillion": 7 },
            "workloadSpecs": {}
        });
        match normalize(&value, &defaults()).unwrap_err() {
            PlanError::Validation { field, .. } => assert_eq!(field, "gpuSpecs.totalMemoryGB"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_parameters_rejected() {
        let err = normalize(&json!({ "vram": 24 }), &defaults()).unwrap_err();
        assert!(matches!(err, PlanError::Validation { .. }));
    }

    #[test]
    fn test_average_above_max_rejected() {
        let value = json!({
            "parametersBillion": 7,
            "averageSequenceLength": 4096,
            "maxSequenceLength": 1024
        });
        match normalize(&value, &defaults()).unwrap_err() {
            PlanError::Validation { field, .. } => {
                assert_eq!(field, "workloadSpecs.averageSequenceLength")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lone_average_extends_default_max() {
        let input = normalize(
            &json!({ "parametersBillion": 7, "avgSeqLen": 16384 }),
            &defaults(),
        )
        .unwrap();
        assert_eq!(input.workload.max_sequence_length, 16384);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let err = normalize(&json!({ "parametersBillion": "seven" }), &defaults()).unwrap_err();
        match err {
            PlanError::Validation { field, .. } => assert_eq!(field, "modelSpecs.parametersBillion"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_quantization_rejected() {
        let err = normalize(&json!({ "parametersBillion": 7, "dtype": "int2" }), &defaults()).unwrap_err();
        assert!(matches!(err, PlanError::UnsupportedFormat { .. }));
    }
}

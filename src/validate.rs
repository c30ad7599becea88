//! Domain validators for externally supplied values.
//!
//! Each validator takes a raw JSON value, its constraints and the field name
//! used for error reporting, and returns the (possibly normalized) value.
//! Values past the domain bounds below are rejected as unrealistic rather
//! than merely unusual.

use serde_json::{Map, Value};

use crate::error::{PlanError, Result};
use crate::input::{GpuSpec, ModelSpec, PlanInput, WorkloadProfile};
use crate::quantization;

/// Longest sequence length accepted, in tokens.
pub const MAX_SEQUENCE_LENGTH: u64 = 1_000_000;

/// Largest batch size / concurrency accepted.
pub const MAX_BATCH_SIZE: u64 = 10_000;

/// Largest per-GPU VRAM accepted, in GB.
pub const MAX_VRAM_GB: f64 = 1000.0;

/// Largest memory bandwidth accepted, in GB/s.
pub const MAX_BANDWIDTH_GBPS: f64 = 10_000.0;

/// Largest parameter count accepted (10^13), expressed in billions.
pub const MAX_PARAMETERS_BILLION: f64 = 10_000.0;

/// Largest number of GPUs in one deployment.
pub const MAX_GPU_COUNT: u64 = 64;

/// Numeric range constraint. `min` is exclusive when `exclusive_min` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberBounds {
    pub min: f64,
    pub max: f64,
    pub exclusive_min: bool,
}

impl NumberBounds {
    pub const fn inclusive(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            exclusive_min: false,
        }
    }

    /// `(0, max]`
    pub const fn positive(max: f64) -> Self {
        Self {
            min: 0.0,
            max,
            exclusive_min: true,
        }
    }

    fn describe(&self) -> String {
        let open = if self.exclusive_min { '(' } else { '[' };
        format!("must be in {open}{}, {}]", self.min, self.max)
    }

    fn contains(&self, value: f64) -> bool {
        let above_min = if self.exclusive_min {
            value > self.min
        } else {
            value >= self.min
        };
        above_min && value <= self.max
    }
}

pub const SEQUENCE_LENGTH: NumberBounds = NumberBounds::inclusive(1.0, MAX_SEQUENCE_LENGTH as f64);
pub const BATCH_SIZE: NumberBounds = NumberBounds::inclusive(1.0, MAX_BATCH_SIZE as f64);
pub const VRAM_GB: NumberBounds = NumberBounds::positive(MAX_VRAM_GB);
pub const BANDWIDTH_GBPS: NumberBounds = NumberBounds::positive(MAX_BANDWIDTH_GBPS);
pub const PARAMETERS_BILLION: NumberBounds = NumberBounds::positive(MAX_PARAMETERS_BILLION);
pub const GPU_COUNT: NumberBounds = NumberBounds::inclusive(1.0, MAX_GPU_COUNT as f64);

/// Check an already-typed float against a range.
pub fn check_number(value: f64, bounds: NumberBounds, field: &str) -> Result<f64> {
    if value.is_nan() {
        return Err(PlanError::validation(field, value, "must be a number, not NaN"));
    }
    if !bounds.contains(value) {
        return Err(PlanError::validation(field, value, bounds.describe()));
    }
    Ok(value)
}

/// Validate a JSON number against a range.
pub fn number(value: &Value, bounds: NumberBounds, field: &str) -> Result<f64> {
    let n = value
        .as_f64()
        .ok_or_else(|| PlanError::validation(field, value, format!("expected a number, got {}", kind_of(value))))?;
    check_number(n, bounds, field)
}

/// Validate a JSON number that must be a whole number within range.
pub fn integer(value: &Value, bounds: NumberBounds, field: &str) -> Result<u64> {
    let n = number(value, bounds, field)?;
    if n.fract() != 0.0 || n < 0.0 {
        return Err(PlanError::validation(field, n, "must be a non-negative integer"));
    }
    Ok(n as u64)
}

pub fn boolean(value: &Value, field: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| PlanError::validation(field, value, format!("expected a boolean, got {}", kind_of(value))))
}

/// Validate a non-blank string. Returns it trimmed.
pub fn non_empty_string(value: &Value, field: &str) -> Result<String> {
    let s = value
        .as_str()
        .ok_or_else(|| PlanError::validation(field, value, format!("expected a string, got {}", kind_of(value))))?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(PlanError::validation(field, format!("{s:?}"), "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Validate enum membership, case-insensitively. Returns the lower-cased value.
pub fn one_of(value: &Value, allowed: &[&str], field: &str) -> Result<String> {
    let s = non_empty_string(value, field)?.to_lowercase();
    if allowed.contains(&s.as_str()) {
        Ok(s)
    } else {
        Err(PlanError::validation(
            field,
            s,
            format!("must be one of: {}", allowed.join(", ")),
        ))
    }
}

/// Validate that `value` is an object carrying every key in `required`.
pub fn require_fields<'a>(
    value: &'a Value,
    required: &[&str],
    field: &str,
) -> Result<&'a Map<String, Value>> {
    let obj = value
        .as_object()
        .ok_or_else(|| PlanError::validation(field, kind_of(value), "expected an object"))?;
    if let Some(missing) = required.iter().find(|key| !obj.contains_key(**key)) {
        return Err(PlanError::validation(
            &format!("{field}.{missing}"),
            "missing",
            "required field is missing",
        ));
    }
    Ok(obj)
}

/// Validate a quantization format name against the catalog.
pub fn quantization_name(value: &Value, field: &str) -> Result<String> {
    let name = non_empty_string(value, field)?;
    Ok(quantization::lookup(&name)?.name.to_string())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn gpu_spec(gpu: &GpuSpec) -> Result<()> {
    check_number(gpu.total_memory_gb, VRAM_GB, "gpuSpecs.totalMemoryGB")?;
    check_number(
        gpu.memory_bandwidth_gbps,
        BANDWIDTH_GBPS,
        "gpuSpecs.memoryBandwidthGBps",
    )?;
    check_number(gpu.gpu_count as f64, GPU_COUNT, "gpuSpecs.gpuCount")?;
    Ok(())
}

pub fn model_spec(model: &ModelSpec) -> Result<()> {
    check_number(
        model.parameters_billion,
        PARAMETERS_BILLION,
        "modelSpecs.parametersBillion",
    )?;
    quantization::lookup(&model.quantization)?;
    if let Some(name) = &model.name {
        if name.trim().is_empty() {
            return Err(PlanError::validation(
                "modelSpecs.name",
                format!("{name:?}"),
                "must not be empty",
            ));
        }
    }
    Ok(())
}

pub fn workload(workload: &WorkloadProfile) -> Result<()> {
    check_number(
        workload.expected_concurrency as f64,
        BATCH_SIZE,
        "workloadSpecs.expectedConcurrency",
    )?;
    check_number(
        workload.average_sequence_length as f64,
        SEQUENCE_LENGTH,
        "workloadSpecs.averageSequenceLength",
    )?;
    check_number(
        workload.max_sequence_length as f64,
        SEQUENCE_LENGTH,
        "workloadSpecs.maxSequenceLength",
    )?;
    if workload.average_sequence_length > workload.max_sequence_length {
        return Err(PlanError::validation(
            "workloadSpecs.averageSequenceLength",
            workload.average_sequence_length,
            format!(
                "must not exceed maxSequenceLength ({})",
                workload.max_sequence_length
            ),
        ));
    }
    Ok(())
}

pub fn plan_input(input: &PlanInput) -> Result<()> {
    gpu_spec(&input.gpu)?;
    model_spec(&input.model)?;
    workload(&input.workload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_rejects_wrong_kind() {
        let err = number(&json!("80"), VRAM_GB, "vram").unwrap_err();
        match err {
            PlanError::Validation { field, reason, .. } => {
                assert_eq!(field, "vram");
                assert!(reason.contains("string"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_number_bounds() {
        assert_eq!(number(&json!(80), VRAM_GB, "vram").unwrap(), 80.0);
        assert!(number(&json!(0), VRAM_GB, "vram").is_err());
        assert!(number(&json!(1000.5), VRAM_GB, "vram").is_err());
        assert!(check_number(f64::NAN, VRAM_GB, "vram").is_err());
    }

    #[test]
    fn test_integer_rejects_fraction() {
        assert_eq!(integer(&json!(32), BATCH_SIZE, "batch").unwrap(), 32);
        assert!(integer(&json!(3.5), BATCH_SIZE, "batch").is_err());
        assert!(integer(&json!(10_001), BATCH_SIZE, "batch").is_err());
    }

    #[test]
    fn test_string_is_trimmed_and_non_empty() {
        assert_eq!(non_empty_string(&json!("  llama  "), "name").unwrap(), "llama");
        assert!(non_empty_string(&json!("   "), "name").is_err());
    }

    #[test]
    fn test_one_of_normalizes_case() {
        let allowed = ["throughput", "latency", "balanced"];
        assert_eq!(one_of(&json!(" Latency "), &allowed, "posture").unwrap(), "latency");
        assert!(one_of(&json!("fast"), &allowed, "posture").is_err());
    }

    #[test]
    fn test_require_fields_reports_missing_key() {
        let value = json!({ "totalMemoryGB": 80 });
        let err = require_fields(&value, &["totalMemoryGB", "memoryBandwidthGBps"], "gpuSpecs")
            .unwrap_err();
        match err {
            PlanError::Validation { field, .. } => {
                assert_eq!(field, "gpuSpecs.memoryBandwidthGBps")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_quantization_name_is_normalized() {
        assert_eq!(quantization_name(&json!("FP16"), "q").unwrap(), "fp16");
        assert!(matches!(
            quantization_name(&json!("int3"), "q"),
            Err(PlanError::UnsupportedFormat { .. })
        ));
    }
}

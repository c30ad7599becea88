//! Quantization catalog: numeric formats and their memory/quality trade-offs.
//!
//! The catalog is a static table; nothing here mutates after startup.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::architecture;
use crate::error::{PlanError, Result};
use crate::memory::{self, ExecutionMode};
use crate::validate::{self, NumberBounds};

/// Fraction of VRAM a recommended format's total footprint may occupy.
pub const RECOMMEND_VRAM_FRACTION: f64 = 0.90;

/// Models at or above this size (billions) tolerate compression better.
pub const LARGE_MODEL_THRESHOLD_B: f64 = 7.0;

const LARGE_MODEL_LOSS_FACTOR: f64 = 0.8;
const SMALL_MODEL_LOSS_FACTOR: f64 = 1.2;

const SEVERITY_LOW_MAX: f64 = 0.05;
const SEVERITY_MEDIUM_MAX: f64 = 0.10;

/// A numeric storage format for model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantizationFormat {
    pub name: &'static str,
    pub bits_per_parameter: u32,
    pub bytes_per_parameter: f64,
    /// Size relative to fp32, before overhead.
    pub memory_efficiency: f64,
    /// Expected quality loss in `[0, 1]`.
    pub quality_loss_estimate: f64,
    /// Scales/zero-points and similar per-format bookkeeping, as a fraction of weights.
    pub fixed_overhead_fraction: f64,
}

impl QuantizationFormat {
    const fn new(
        name: &'static str,
        bits_per_parameter: u32,
        quality_loss_estimate: f64,
        fixed_overhead_fraction: f64,
    ) -> Self {
        Self {
            name,
            bits_per_parameter,
            bytes_per_parameter: bits_per_parameter as f64 / 8.0,
            memory_efficiency: bits_per_parameter as f64 / 32.0,
            quality_loss_estimate,
            fixed_overhead_fraction,
        }
    }

    /// Size relative to fp32 including the fixed overhead.
    pub fn effective_memory_fraction(&self) -> f64 {
        self.memory_efficiency * (1.0 + self.fixed_overhead_fraction)
    }
}

impl fmt::Display for QuantizationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

static CATALOG: [QuantizationFormat; 8] = [
    QuantizationFormat::new("fp32", 32, 0.0, 0.0),
    QuantizationFormat::new("fp16", 16, 0.0, 0.0),
    QuantizationFormat::new("bf16", 16, 0.0, 0.0),
    QuantizationFormat::new("fp8", 8, 0.02, 0.0),
    QuantizationFormat::new("int8", 8, 0.03, 0.0),
    QuantizationFormat::new("awq", 4, 0.05, 0.01),
    QuantizationFormat::new("gptq", 4, 0.06, 0.02),
    QuantizationFormat::new("int4", 4, 0.10, 0.0),
];

/// Every format in the catalog, widest first.
pub fn catalog() -> &'static [QuantizationFormat] {
    &CATALOG
}

pub fn names() -> Vec<String> {
    CATALOG.iter().map(|f| f.name.to_string()).collect()
}

/// Case-insensitive lookup.
pub fn lookup(name: &str) -> Result<&'static QuantizationFormat> {
    let wanted = name.trim().to_lowercase();
    CATALOG
        .iter()
        .find(|f| f.name == wanted)
        .ok_or_else(|| PlanError::UnsupportedFormat {
            name: name.to_string(),
            valid: names(),
        })
}

/// Look up several formats and order them most compressed first.
pub fn compare<S: AsRef<str>>(names: &[S]) -> Result<Vec<QuantizationFormat>> {
    let mut formats = names
        .iter()
        .map(|n| lookup(n.as_ref()).copied())
        .collect::<Result<Vec<_>>>()?;
    formats.sort_by(|a, b| {
        a.effective_memory_fraction()
            .total_cmp(&b.effective_memory_fraction())
    });
    Ok(formats)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn from_loss(loss: f64) -> Self {
        if loss <= SEVERITY_LOW_MAX {
            Severity::Low
        } else if loss <= SEVERITY_MEDIUM_MAX {
            Severity::Medium
        } else {
            Severity::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityImpact {
    pub format: String,
    pub base_loss: f64,
    pub quality_loss: f64,
    pub severity: Severity,
}

/// Estimate the quality cost of running a model of the given size in `name`.
pub fn estimate_quality_impact(name: &str, params_billion: f64) -> Result<QualityImpact> {
    let format = lookup(name)?;
    validate::check_number(params_billion, validate::PARAMETERS_BILLION, "modelParamsBillion")?;
    let factor = if params_billion >= LARGE_MODEL_THRESHOLD_B {
        LARGE_MODEL_LOSS_FACTOR
    } else {
        SMALL_MODEL_LOSS_FACTOR
    };
    let quality_loss = format.quality_loss_estimate * factor;
    Ok(QualityImpact {
        format: format.name.to_string(),
        base_loss: format.quality_loss_estimate,
        quality_loss,
        severity: Severity::from_loss(quality_loss),
    })
}

/// Ordering of candidate formats tried by [`recommend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Quality,
    Memory,
    #[default]
    Balanced,
}

impl Priority {
    fn candidates(self) -> &'static [&'static str] {
        match self {
            Priority::Quality => &["fp16", "bf16", "fp8", "int8", "awq", "gptq", "int4"],
            Priority::Memory => &["int4", "awq", "gptq", "int8", "fp8", "fp16"],
            Priority::Balanced => &["fp16", "fp8", "int8", "awq", "gptq", "int4"],
        }
    }
}

impl FromStr for Priority {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "quality" => Ok(Priority::Quality),
            "memory" => Ok(Priority::Memory),
            "balanced" => Ok(Priority::Balanced),
            _ => Err(PlanError::validation(
                "priority",
                s,
                "must be one of: quality, memory, balanced",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendOptions {
    pub batch_size: u64,
    pub max_seq_len: u64,
    pub priority: Priority,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            max_seq_len: 2048,
            priority: Priority::Balanced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub format: QuantizationFormat,
    pub priority: Priority,
    pub weights_gb: f64,
    pub kv_cache_gb: f64,
    pub activations_gb: f64,
    pub total_memory_gb: f64,
    pub usable_vram_gb: f64,
    pub can_fit: bool,
    pub quality: QualityImpact,
}

/// Pick the first format, in priority order, whose rough footprint fits in
/// 90% of `vram_gb`. Falls back to the most compressed candidate with
/// `can_fit = false`.
pub fn recommend(
    vram_gb: f64,
    params_billion: f64,
    options: RecommendOptions,
) -> Result<Recommendation> {
    validate::check_number(vram_gb, validate::VRAM_GB, "vramGB")?;
    validate::check_number(params_billion, validate::PARAMETERS_BILLION, "modelParamsBillion")?;
    validate::check_number(
        options.batch_size as f64,
        NumberBounds::inclusive(0.0, validate::MAX_BATCH_SIZE as f64),
        "batchSize",
    )?;
    validate::check_number(
        options.max_seq_len as f64,
        NumberBounds::inclusive(0.0, validate::MAX_SEQUENCE_LENGTH as f64),
        "maxSeqLen",
    )?;

    let arch = architecture::estimate(params_billion)?;
    let usable_vram_gb = vram_gb * RECOMMEND_VRAM_FRACTION;

    let footprint = |format: &'static QuantizationFormat| -> Result<Recommendation> {
        let weights_gb = memory::model_weights_gb(params_billion, format)?;
        let kv_cache_gb = memory::kv_cache_gb(options.batch_size, options.max_seq_len, &arch, format);
        let activations_gb = memory::activation_memory(
            options.batch_size,
            options.max_seq_len,
            &arch,
            format,
            ExecutionMode::Inference,
        )
        .total_gb;
        let total_memory_gb = weights_gb + kv_cache_gb + activations_gb;
        Ok(Recommendation {
            format: *format,
            priority: options.priority,
            weights_gb,
            kv_cache_gb,
            activations_gb,
            total_memory_gb,
            usable_vram_gb,
            can_fit: total_memory_gb <= usable_vram_gb,
            quality: estimate_quality_impact(format.name, params_billion)?,
        })
    };

    let candidates = options
        .priority
        .candidates()
        .iter()
        .map(|name| lookup(name))
        .collect::<Result<Vec<_>>>()?;

    for format in &candidates {
        let rec = footprint(format)?;
        debug!(
            format = format.name,
            total_gb = rec.total_memory_gb,
            usable_gb = usable_vram_gb,
            "Evaluated quantization candidate"
        );
        if rec.can_fit {
            return Ok(rec);
        }
    }

    let most_aggressive = candidates
        .iter()
        .min_by(|a, b| {
            a.effective_memory_fraction()
                .total_cmp(&b.effective_memory_fraction())
        })
        .copied()
        .ok_or_else(|| PlanError::Configuration("no quantization candidates".into()))?;
    footprint(most_aggressive)
}

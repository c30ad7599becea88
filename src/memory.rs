//! Closed-form GPU memory estimators: model weights, KV cache, activations.
//!
//! Weights are reported as `params (billions) × bytes per param`, i.e. decimal
//! gigabytes. KV cache and activations are computed from byte counts and
//! reported in GiB (`bytes / 1024³`). A batch size or sequence length of zero
//! yields exactly zero KV-cache and activation memory.
//!
//! The fractions below are calibration points carried over from empirical
//! fits, not derived quantities.

use serde::Serialize;

use crate::architecture::ModelArchitecture;
use crate::error::Result;
use crate::quantization::{self, QuantizationFormat};
use crate::validate::{self, NumberBounds};

pub const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Key and value tensors.
const KV_TENSORS: f64 = 2.0;

pub const ATTENTION_FRACTION: f64 = 0.30;
pub const MLP_FRACTION: f64 = 0.20;
pub const LAYER_NORM_FRACTION: f64 = 0.05;
pub const RESIDUAL_FRACTION: f64 = 0.10;
pub const ACTIVATION_OVERHEAD_FRACTION: f64 = 0.15;

/// Inference-time savings over a naive forward pass (paged attention, fused kernels).
pub const INFERENCE_EFFICIENCY: f64 = 0.5;

/// Backward-pass buffers, as a multiple of the forward total.
pub const TRAINING_MULTIPLIER: f64 = 2.0;

/// Default system overhead as a fraction of weights + KV cache + activations.
pub const DEFAULT_SYSTEM_OVERHEAD_FRACTION: f64 = 0.10;

/// Round to three decimals for display.
pub fn round_gb(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Inference,
    Training,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightsMemory {
    pub parameters_billion: f64,
    pub format: String,
    pub bytes_per_parameter: f64,
    pub base_gb: f64,
    pub overhead_gb: f64,
    pub total_gb: f64,
}

/// Weight memory in GB, including the format's fixed overhead.
pub fn model_weights_gb(params_billion: f64, format: &QuantizationFormat) -> Result<f64> {
    Ok(weights_breakdown(params_billion, format)?.total_gb)
}

/// Weight memory with base and overhead reported separately.
pub fn model_weights_memory(params_billion: f64, format_name: &str) -> Result<WeightsMemory> {
    let format = quantization::lookup(format_name)?;
    weights_breakdown(params_billion, format)
}

fn weights_breakdown(params_billion: f64, format: &QuantizationFormat) -> Result<WeightsMemory> {
    validate::check_number(
        params_billion,
        NumberBounds::inclusive(0.0, validate::MAX_PARAMETERS_BILLION),
        "parametersBillion",
    )?;
    let base_gb = params_billion * format.bytes_per_parameter;
    let overhead_gb = base_gb * format.fixed_overhead_fraction;
    Ok(WeightsMemory {
        parameters_billion: params_billion,
        format: format.name.to_string(),
        bytes_per_parameter: format.bytes_per_parameter,
        base_gb,
        overhead_gb,
        total_gb: base_gb + overhead_gb,
    })
}

/// KV cache in GiB: `2 × batch × seq × layers × hidden × bytes`.
pub fn kv_cache_gb(
    batch_size: u64,
    sequence_length: u64,
    arch: &ModelArchitecture,
    format: &QuantizationFormat,
) -> f64 {
    KV_TENSORS
        * batch_size as f64
        * sequence_length as f64
        * arch.layer_count as f64
        * arch.hidden_size as f64
        * format.bytes_per_parameter
        / BYTES_PER_GIB
}

/// KV cache for a single sequence of `sequence_length` tokens.
pub fn kv_cache_per_sequence_gb(
    sequence_length: u64,
    arch: &ModelArchitecture,
    format: &QuantizationFormat,
) -> f64 {
    kv_cache_gb(1, sequence_length, arch, format)
}

/// Activation memory split into its weighted components. The components
/// already include the efficiency and mode multipliers and sum to `total_gb`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationMemory {
    pub attention_gb: f64,
    pub mlp_gb: f64,
    pub layer_norm_gb: f64,
    pub residual_gb: f64,
    pub overhead_gb: f64,
    pub mode: ExecutionMode,
    pub total_gb: f64,
}

pub fn activation_memory(
    batch_size: u64,
    sequence_length: u64,
    arch: &ModelArchitecture,
    format: &QuantizationFormat,
    mode: ExecutionMode,
) -> ActivationMemory {
    let base = batch_size as f64
        * sequence_length as f64
        * arch.hidden_size as f64
        * arch.layer_count as f64
        * format.bytes_per_parameter
        / BYTES_PER_GIB;
    let scale = INFERENCE_EFFICIENCY
        * match mode {
            ExecutionMode::Inference => 1.0,
            ExecutionMode::Training => TRAINING_MULTIPLIER,
        };
    let component = |fraction: f64| base * fraction * scale;

    let attention_gb = component(ATTENTION_FRACTION);
    let mlp_gb = component(MLP_FRACTION);
    let layer_norm_gb = component(LAYER_NORM_FRACTION);
    let residual_gb = component(RESIDUAL_FRACTION);
    let overhead_gb = component(ACTIVATION_OVERHEAD_FRACTION);

    ActivationMemory {
        attention_gb,
        mlp_gb,
        layer_norm_gb,
        residual_gb,
        overhead_gb,
        mode,
        total_gb: attention_gb + mlp_gb + layer_norm_gb + residual_gb + overhead_gb,
    }
}

/// Activation memory for a single token in inference mode.
pub fn activation_per_token_gb(arch: &ModelArchitecture, format: &QuantizationFormat) -> f64 {
    activation_memory(1, 1, arch, format, ExecutionMode::Inference).total_gb
}

/// Inputs for a full [`MemoryBreakdown`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryRequest {
    pub parameters_billion: f64,
    pub architecture: ModelArchitecture,
    pub format: QuantizationFormat,
    pub batch_size: u64,
    pub sequence_length: u64,
    pub mode: ExecutionMode,
}

/// Percentage of the total taken by each component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentShares {
    pub model_weights: f64,
    pub kv_cache: f64,
    pub activations: f64,
    pub system_overhead: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryBreakdown {
    pub model_weights_gb: f64,
    pub kv_cache_gb: f64,
    pub activations_gb: f64,
    pub system_overhead_gb: f64,
    pub total_gb: f64,
    pub shares: ComponentShares,
}

impl MemoryBreakdown {
    /// Copy with every quantity rounded to three decimals.
    pub fn rounded(&self) -> Self {
        Self {
            model_weights_gb: round_gb(self.model_weights_gb),
            kv_cache_gb: round_gb(self.kv_cache_gb),
            activations_gb: round_gb(self.activations_gb),
            system_overhead_gb: round_gb(self.system_overhead_gb),
            total_gb: round_gb(self.total_gb),
            shares: ComponentShares {
                model_weights: round_gb(self.shares.model_weights),
                kv_cache: round_gb(self.shares.kv_cache),
                activations: round_gb(self.shares.activations),
                system_overhead: round_gb(self.shares.system_overhead),
            },
        }
    }
}

/// Combines the three estimators with a tunable system overhead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryModel {
    system_overhead_fraction: f64,
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self {
            system_overhead_fraction: DEFAULT_SYSTEM_OVERHEAD_FRACTION,
        }
    }
}

impl MemoryModel {
    pub fn new(system_overhead_fraction: f64) -> Result<Self> {
        validate::check_number(
            system_overhead_fraction,
            NumberBounds::inclusive(0.0, 1.0),
            "systemOverheadFraction",
        )?;
        Ok(Self {
            system_overhead_fraction,
        })
    }

    pub fn system_overhead_fraction(&self) -> f64 {
        self.system_overhead_fraction
    }

    /// KV cache plus activations for a batch. Zero when either dimension is zero.
    pub fn request_memory_gb(
        &self,
        batch_size: u64,
        sequence_length: u64,
        arch: &ModelArchitecture,
        format: &QuantizationFormat,
        mode: ExecutionMode,
    ) -> f64 {
        kv_cache_gb(batch_size, sequence_length, arch, format)
            + activation_memory(batch_size, sequence_length, arch, format, mode).total_gb
    }

    pub fn breakdown(&self, req: &MemoryRequest) -> Result<MemoryBreakdown> {
        req.architecture.validate()?;
        validate::check_number(
            req.batch_size as f64,
            NumberBounds::inclusive(0.0, validate::MAX_BATCH_SIZE as f64),
            "batchSize",
        )?;
        validate::check_number(
            req.sequence_length as f64,
            NumberBounds::inclusive(0.0, validate::MAX_SEQUENCE_LENGTH as f64),
            "sequenceLength",
        )?;

        let model_weights_gb = model_weights_gb(req.parameters_billion, &req.format)?;
        // An empty request needs no memory at all, weights included.
        if req.batch_size == 0 || req.sequence_length == 0 {
            return Ok(MemoryBreakdown {
                model_weights_gb: 0.0,
                kv_cache_gb: 0.0,
                activations_gb: 0.0,
                system_overhead_gb: 0.0,
                total_gb: 0.0,
                shares: ComponentShares::default(),
            });
        }
        let kv_cache_gb = kv_cache_gb(req.batch_size, req.sequence_length, &req.architecture, &req.format);
        let activations_gb = activation_memory(
            req.batch_size,
            req.sequence_length,
            &req.architecture,
            &req.format,
            req.mode,
        )
        .total_gb;

        let subtotal = model_weights_gb + kv_cache_gb + activations_gb;
        let system_overhead_gb = subtotal * self.system_overhead_fraction;
        let total_gb = subtotal + system_overhead_gb;

        let share = |part: f64| {
            if total_gb > 0.0 {
                part / total_gb * 100.0
            } else {
                0.0
            }
        };

        Ok(MemoryBreakdown {
            model_weights_gb,
            kv_cache_gb,
            activations_gb,
            system_overhead_gb,
            total_gb,
            shares: ComponentShares {
                model_weights: share(model_weights_gb),
                kv_cache: share(kv_cache_gb),
                activations: share(activations_gb),
                system_overhead: share(system_overhead_gb),
            },
        })
    }
}

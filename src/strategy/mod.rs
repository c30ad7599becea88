//! Optimization postures: memory allocation, batch sizing, performance estimates.
//!
//! - [`throughput`]: aggressive memory use, large batches
//! - [`latency`]: conservative memory use, small batches, full-window KV reservation
//! - [`balanced`]: middle ground, refined by a named target profile
//!
//! All three share the same decision procedure and differ only in their
//! [`PostureTuning`] constants and utilization choice. Performance numbers are
//! guidance only, never measured throughput.

pub mod balanced;
pub mod latency;
pub mod throughput;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::architecture::ModelArchitecture;
use crate::error::{PlanError, Result};
use crate::memory;
use crate::quantization::QuantizationFormat;

/// Prefill throughput multiplier over decode when tensor cores are available.
pub const TENSOR_CORE_INTENSITY: f64 = 100.0;
pub const CUDA_CORE_INTENSITY: f64 = 40.0;

/// Lower bound for time-to-first-token, in milliseconds.
pub const MIN_TTFT_MS: f64 = 15.0;

/// Optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    Throughput,
    Latency,
    #[default]
    Balanced,
}

impl Posture {
    pub const NAMES: [&'static str; 3] = ["throughput", "latency", "balanced"];
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Posture::Throughput => write!(f, "throughput"),
            Posture::Latency => write!(f, "latency"),
            Posture::Balanced => write!(f, "balanced"),
        }
    }
}

impl FromStr for Posture {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "throughput" => Ok(Posture::Throughput),
            "latency" => Ok(Posture::Latency),
            "balanced" => Ok(Posture::Balanced),
            _ => Err(PlanError::validation(
                "optimizationPosture",
                s,
                format!("must be one of: {}", Posture::NAMES.join(", ")),
            )),
        }
    }
}

/// Per-posture calibration constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureTuning {
    /// Share of post-weights memory given to the KV cache; the rest is reserved.
    pub kv_share: f64,
    /// Applied to available memory before dividing by per-sequence cost.
    pub safety_margin: f64,
    pub min_sequences: u64,
    pub max_sequences: u64,
    pub max_batched_tokens: u64,
    /// Fraction of peak bandwidth realistically achieved.
    pub bandwidth_efficiency: f64,
    /// Inter-token latency increase per additional concurrent sequence.
    pub concurrency_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryAllocation {
    pub posture: Posture,
    pub profile: String,
    pub total_vram_gb: f64,
    pub model_memory_gb: f64,
    pub utilization_fraction: f64,
    pub allocated_vram_gb: f64,
    pub kv_cache_budget_gb: f64,
    pub reserved_gb: f64,
}

/// Inputs to the batch-size stage.
#[derive(Debug, Clone, Copy)]
pub struct BatchContext<'a> {
    pub allocated_vram_gb: f64,
    pub model_memory_gb: f64,
    /// Ceiling for KV cache plus activations; the rest of the remainder stays reserved.
    pub kv_cache_budget_gb: f64,
    pub utilization_fraction: f64,
    pub architecture: &'a ModelArchitecture,
    pub format: &'a QuantizationFormat,
    pub average_sequence_length: u64,
    pub max_sequence_length: u64,
}

impl<'a> BatchContext<'a> {
    pub fn from_allocation(
        allocation: &MemoryAllocation,
        architecture: &'a ModelArchitecture,
        format: &'a QuantizationFormat,
        average_sequence_length: u64,
        max_sequence_length: u64,
    ) -> Self {
        Self {
            allocated_vram_gb: allocation.allocated_vram_gb,
            model_memory_gb: allocation.model_memory_gb,
            kv_cache_budget_gb: allocation.kv_cache_budget_gb,
            utilization_fraction: allocation.utilization_fraction,
            architecture,
            format,
            average_sequence_length,
            max_sequence_length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPlan {
    pub max_concurrent_sequences: u64,
    pub max_batched_tokens: u64,
    pub kv_cache_memory_gb: f64,
    pub activation_memory_gb: f64,
    pub memory_utilization_fraction: f64,
    pub kv_cache_per_sequence_gb: f64,
    pub activation_per_token_gb: f64,
    /// Token budget is smaller than the longest prompt, so prefill must be chunked.
    pub chunked_prefill: bool,
}

impl BatchPlan {
    /// Memory figures for one of `gpu_count` tensor-parallel shards.
    pub fn per_gpu(self, gpu_count: u64) -> Self {
        let n = gpu_count.max(1) as f64;
        Self {
            kv_cache_memory_gb: self.kv_cache_memory_gb / n,
            activation_memory_gb: self.activation_memory_gb / n,
            kv_cache_per_sequence_gb: self.kv_cache_per_sequence_gb / n,
            activation_per_token_gb: self.activation_per_token_gb / n,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceInput {
    pub model_memory_gb: f64,
    pub memory_bandwidth_gbps: f64,
    pub gpu_count: u64,
    pub has_tensor_cores: bool,
    pub batch_size: u64,
    pub sequence_length: u64,
}

/// Rough guidance figures; not a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEstimate {
    pub tokens_per_second: f64,
    pub time_to_first_token_ms: f64,
    pub inter_token_latency_ms: f64,
}

/// A posture's decision procedure.
pub trait OptimizationStrategy: Send + Sync {
    fn posture(&self) -> Posture;

    fn tuning(&self) -> PostureTuning;

    /// Name of the target profile in effect.
    fn profile(&self) -> &str {
        "default"
    }

    /// Fraction of total VRAM to hand to the serving engine.
    fn utilization_fraction(&self, total_vram_gb: f64, model_memory_gb: f64) -> f64;

    /// Tokens of KV cache reserved per sequence.
    fn kv_sequence_length(&self, ctx: &BatchContext<'_>) -> u64 {
        ctx.average_sequence_length
    }

    fn allocate_memory(&self, total_vram_gb: f64, model_memory_gb: f64) -> Result<MemoryAllocation> {
        if total_vram_gb <= model_memory_gb {
            return Err(PlanError::InsufficientMemory {
                required_gb: model_memory_gb,
                available_gb: total_vram_gb,
            });
        }
        let tuning = self.tuning();
        let utilization_fraction = self.utilization_fraction(total_vram_gb, model_memory_gb);
        let allocated_vram_gb = total_vram_gb * utilization_fraction;
        let remaining = (allocated_vram_gb - model_memory_gb).max(0.0);
        let kv_cache_budget_gb = remaining * tuning.kv_share;

        debug!(
            posture = %self.posture(),
            profile = self.profile(),
            utilization_fraction,
            allocated_vram_gb,
            "Allocated memory"
        );

        Ok(MemoryAllocation {
            posture: self.posture(),
            profile: self.profile().to_string(),
            total_vram_gb,
            model_memory_gb,
            utilization_fraction,
            allocated_vram_gb,
            kv_cache_budget_gb,
            reserved_gb: remaining - kv_cache_budget_gb,
        })
    }

    fn plan_batch(&self, ctx: &BatchContext<'_>) -> Result<BatchPlan> {
        plan_batch_with(&self.tuning(), self.kv_sequence_length(ctx), ctx)
    }

    fn estimate_performance(&self, input: &PerformanceInput) -> PerformanceEstimate {
        estimate_performance_with(&self.tuning(), input)
    }
}

/// Strategy for `posture`. `target_profile` only refines the balanced posture;
/// unknown names fall back to the default profile.
pub fn strategy_for(posture: Posture, target_profile: Option<&str>) -> Box<dyn OptimizationStrategy> {
    match posture {
        Posture::Throughput => Box::new(throughput::ThroughputStrategy),
        Posture::Latency => Box::new(latency::LatencyStrategy),
        Posture::Balanced => Box::new(balanced::BalancedStrategy::for_profile(
            target_profile.unwrap_or(balanced::DEFAULT_PROFILE),
        )),
    }
}

fn plan_batch_with(
    tuning: &PostureTuning,
    kv_sequence_length: u64,
    ctx: &BatchContext<'_>,
) -> Result<BatchPlan> {
    let available = ctx.allocated_vram_gb - ctx.model_memory_gb;
    if available <= 0.0 {
        return Err(PlanError::InsufficientMemory {
            required_gb: ctx.model_memory_gb,
            available_gb: ctx.allocated_vram_gb,
        });
    }

    let kv_per_sequence = memory::kv_cache_per_sequence_gb(kv_sequence_length, ctx.architecture, ctx.format);
    let activation_per_token = memory::activation_per_token_gb(ctx.architecture, ctx.format);
    let per_sequence = kv_per_sequence + activation_per_token * ctx.average_sequence_length as f64;
    if per_sequence <= 0.0 {
        return Err(PlanError::Configuration(
            "per-sequence memory must be positive".to_string(),
        ));
    }

    let budget = ctx.kv_cache_budget_gb.min(available);
    let fitting = (budget / per_sequence).floor() as u64;
    if fitting == 0 {
        return Err(PlanError::InsufficientMemory {
            required_gb: ctx.model_memory_gb + per_sequence,
            available_gb: ctx.model_memory_gb + budget,
        });
    }

    let with_margin = (tuning.safety_margin * budget / per_sequence).floor() as u64;
    let sequences = with_margin
        .clamp(tuning.min_sequences, tuning.max_sequences)
        .min(fitting);

    let max_batched_tokens = sequences
        .saturating_mul(ctx.average_sequence_length)
        .min(tuning.max_batched_tokens);

    let plan = BatchPlan {
        max_concurrent_sequences: sequences,
        max_batched_tokens,
        kv_cache_memory_gb: sequences as f64 * kv_per_sequence,
        activation_memory_gb: max_batched_tokens as f64 * activation_per_token,
        memory_utilization_fraction: ctx.utilization_fraction,
        kv_cache_per_sequence_gb: kv_per_sequence,
        activation_per_token_gb: activation_per_token,
        chunked_prefill: max_batched_tokens < ctx.max_sequence_length,
    };

    debug!(
        sequences,
        max_batched_tokens,
        fitting,
        kv_cache_gb = plan.kv_cache_memory_gb,
        "Planned batch"
    );
    Ok(plan)
}

fn estimate_performance_with(tuning: &PostureTuning, input: &PerformanceInput) -> PerformanceEstimate {
    let effective_bandwidth =
        input.memory_bandwidth_gbps * input.gpu_count.max(1) as f64 * tuning.bandwidth_efficiency;
    let batch = input.batch_size.max(1) as f64;

    if input.model_memory_gb <= 0.0 || effective_bandwidth <= 0.0 {
        return PerformanceEstimate {
            tokens_per_second: 0.0,
            time_to_first_token_ms: MIN_TTFT_MS,
            inter_token_latency_ms: 0.0,
        };
    }

    let decode_step_ms = input.model_memory_gb / effective_bandwidth * 1000.0;
    let intensity = if input.has_tensor_cores {
        TENSOR_CORE_INTENSITY
    } else {
        CUDA_CORE_INTENSITY
    };
    let prefill_ms = input.sequence_length as f64 * input.model_memory_gb
        / (effective_bandwidth * intensity)
        * 1000.0;

    PerformanceEstimate {
        tokens_per_second: effective_bandwidth / input.model_memory_gb * batch,
        time_to_first_token_ms: prefill_ms.max(MIN_TTFT_MS),
        inter_token_latency_ms: decode_step_ms * (1.0 + tuning.concurrency_penalty * (batch - 1.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{architecture, quantization};

    fn fixtures() -> (ModelArchitecture, &'static QuantizationFormat) {
        (
            architecture::estimate(7.0).unwrap(),
            quantization::lookup("fp16").unwrap(),
        )
    }

    #[test]
    fn test_posture_parse() {
        assert_eq!("Throughput".parse::<Posture>().unwrap(), Posture::Throughput);
        assert!("fastest".parse::<Posture>().is_err());
        assert_eq!(Posture::Latency.to_string(), "latency");
    }

    #[test]
    fn test_allocation_equal_memory_is_fatal() {
        for posture in [Posture::Throughput, Posture::Latency, Posture::Balanced] {
            let strategy = strategy_for(posture, None);
            match strategy.allocate_memory(14.0, 14.0) {
                Err(PlanError::InsufficientMemory {
                    required_gb,
                    available_gb,
                }) => {
                    assert_eq!(required_gb, 14.0);
                    assert_eq!(available_gb, 14.0);
                }
                other => panic!("expected InsufficientMemory, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_batch_equal_memory_is_fatal() {
        let (arch, fmt) = fixtures();
        let ctx = BatchContext {
            allocated_vram_gb: 14.0,
            model_memory_gb: 14.0,
            kv_cache_budget_gb: 0.0,
            utilization_fraction: 0.9,
            architecture: &arch,
            format: fmt,
            average_sequence_length: 512,
            max_sequence_length: 2048,
        };
        for posture in [Posture::Throughput, Posture::Latency, Posture::Balanced] {
            assert!(matches!(
                strategy_for(posture, None).plan_batch(&ctx),
                Err(PlanError::InsufficientMemory { .. })
            ));
        }
    }

    #[test]
    fn test_allocation_splits_remainder() {
        let alloc = strategy_for(Posture::Balanced, None)
            .allocate_memory(80.0, 14.0)
            .unwrap();
        let remaining = alloc.allocated_vram_gb - alloc.model_memory_gb;
        assert!((alloc.kv_cache_budget_gb + alloc.reserved_gb - remaining).abs() < 1e-9);
        assert!(alloc.kv_cache_budget_gb > alloc.reserved_gb);
    }

    #[test]
    fn test_batch_respects_budget() {
        let (arch, fmt) = fixtures();
        for posture in [Posture::Throughput, Posture::Latency, Posture::Balanced] {
            let strategy = strategy_for(posture, None);
            let alloc = strategy.allocate_memory(24.0, 14.0).unwrap();
            let ctx = BatchContext::from_allocation(&alloc, &arch, fmt, 1024, 4096);
            let plan = strategy.plan_batch(&ctx).unwrap();
            let used = alloc.model_memory_gb + plan.kv_cache_memory_gb + plan.activation_memory_gb;
            assert!(
                used <= alloc.allocated_vram_gb + 1e-9,
                "{posture}: {used} > {}",
                alloc.allocated_vram_gb
            );
            assert!(plan.max_concurrent_sequences >= 1);
        }
    }

    #[test]
    fn test_batch_stays_within_kv_budget() {
        let (arch, fmt) = fixtures();
        let strategy = strategy_for(Posture::Throughput, None);
        let alloc = strategy.allocate_memory(80.0, 14.0).unwrap();
        let ctx = BatchContext::from_allocation(&alloc, &arch, fmt, 512, 4096);
        let plan = strategy.plan_batch(&ctx).unwrap();
        assert!(plan.kv_cache_memory_gb + plan.activation_memory_gb <= alloc.kv_cache_budget_gb);
        assert!(alloc.reserved_gb > 0.0);

        // A smaller KV share leaves more reserved and admits fewer sequences.
        let tight = BatchContext {
            kv_cache_budget_gb: alloc.kv_cache_budget_gb / 2.0,
            ..ctx
        };
        let smaller = strategy.plan_batch(&tight).unwrap();
        assert!(smaller.max_concurrent_sequences < plan.max_concurrent_sequences);
        assert!(smaller.kv_cache_memory_gb + smaller.activation_memory_gb <= tight.kv_cache_budget_gb);
    }

    #[test]
    fn test_per_gpu_divides_memory_figures() {
        let (arch, fmt) = fixtures();
        let strategy = strategy_for(Posture::Balanced, None);
        let alloc = strategy.allocate_memory(80.0, 14.0).unwrap();
        let plan = strategy
            .plan_batch(&BatchContext::from_allocation(&alloc, &arch, fmt, 512, 4096))
            .unwrap();
        let shard = plan.per_gpu(4);
        assert_eq!(shard.max_concurrent_sequences, plan.max_concurrent_sequences);
        assert_eq!(shard.kv_cache_memory_gb * 4.0, plan.kv_cache_memory_gb);
        assert_eq!(shard.activation_memory_gb * 4.0, plan.activation_memory_gb);
    }

    #[test]
    fn test_batch_too_small_for_one_sequence() {
        let (arch, fmt) = fixtures();
        let ctx = BatchContext {
            allocated_vram_gb: 14.01,
            model_memory_gb: 14.0,
            kv_cache_budget_gb: 0.01,
            utilization_fraction: 0.9,
            architecture: &arch,
            format: fmt,
            average_sequence_length: 4096,
            max_sequence_length: 4096,
        };
        match strategy_for(Posture::Throughput, None).plan_batch(&ctx) {
            Err(PlanError::InsufficientMemory {
                required_gb,
                available_gb,
            }) => {
                assert!(required_gb > 14.01);
                assert!(available_gb <= 14.01);
            }
            other => panic!("expected InsufficientMemory, got {other:?}"),
        }
    }

    #[test]
    fn test_performance_scales_with_batch() {
        let strategy = strategy_for(Posture::Throughput, None);
        let base = PerformanceInput {
            model_memory_gb: 14.0,
            memory_bandwidth_gbps: 2000.0,
            gpu_count: 1,
            has_tensor_cores: true,
            batch_size: 1,
            sequence_length: 2048,
        };
        let one = strategy.estimate_performance(&base);
        let many = strategy.estimate_performance(&PerformanceInput {
            batch_size: 16,
            ..base
        });
        assert!((many.tokens_per_second - one.tokens_per_second * 16.0).abs() < 1e-6);
        assert!(many.inter_token_latency_ms > one.inter_token_latency_ms);
        assert!(one.time_to_first_token_ms >= MIN_TTFT_MS);
    }

    #[test]
    fn test_ttft_floor() {
        let est = strategy_for(Posture::Latency, None).estimate_performance(&PerformanceInput {
            model_memory_gb: 1.0,
            memory_bandwidth_gbps: 3000.0,
            gpu_count: 1,
            has_tensor_cores: true,
            batch_size: 1,
            sequence_length: 16,
        });
        assert_eq!(est.time_to_first_token_ms, MIN_TTFT_MS);
    }
}

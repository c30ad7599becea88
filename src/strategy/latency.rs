//! Latency posture: leave headroom, keep batches small, and reserve KV cache
//! for the full context window so sequences are never preempted.

use super::{BatchContext, OptimizationStrategy, Posture, PostureTuning};

/// Above this weights-to-VRAM ratio the strategy allows a little more memory.
const LARGE_MODEL_RATIO: f64 = 0.6;

const DEFAULT_UTILIZATION: f64 = 0.75;
const LARGE_MODEL_UTILIZATION: f64 = 0.80;

pub const TUNING: PostureTuning = PostureTuning {
    kv_share: 0.80,
    safety_margin: 0.70,
    min_sequences: 1,
    max_sequences: 32,
    max_batched_tokens: 8_192,
    bandwidth_efficiency: 0.70,
    concurrency_penalty: 0.05,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyStrategy;

impl OptimizationStrategy for LatencyStrategy {
    fn posture(&self) -> Posture {
        Posture::Latency
    }

    fn tuning(&self) -> PostureTuning {
        TUNING
    }

    fn utilization_fraction(&self, total_vram_gb: f64, model_memory_gb: f64) -> f64 {
        if model_memory_gb / total_vram_gb > LARGE_MODEL_RATIO {
            LARGE_MODEL_UTILIZATION
        } else {
            DEFAULT_UTILIZATION
        }
    }

    fn kv_sequence_length(&self, ctx: &BatchContext<'_>) -> u64 {
        ctx.max_sequence_length
    }
}

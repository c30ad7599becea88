//! Throughput posture: fill the GPU, batch as much as the memory allows.

use super::{OptimizationStrategy, Posture, PostureTuning};

/// Below this weights-to-VRAM ratio the most aggressive utilization is safe.
const ROOMY_MODEL_RATIO: f64 = 0.5;

const ROOMY_UTILIZATION: f64 = 0.95;
const TIGHT_UTILIZATION: f64 = 0.90;

pub const TUNING: PostureTuning = PostureTuning {
    kv_share: 0.90,
    safety_margin: 0.85,
    min_sequences: 4,
    max_sequences: 256,
    max_batched_tokens: 65_536,
    bandwidth_efficiency: 0.80,
    concurrency_penalty: 0.02,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ThroughputStrategy;

impl OptimizationStrategy for ThroughputStrategy {
    fn posture(&self) -> Posture {
        Posture::Throughput
    }

    fn tuning(&self) -> PostureTuning {
        TUNING
    }

    fn utilization_fraction(&self, total_vram_gb: f64, model_memory_gb: f64) -> f64 {
        if model_memory_gb / total_vram_gb < ROOMY_MODEL_RATIO {
            ROOMY_UTILIZATION
        } else {
            TIGHT_UTILIZATION
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::BatchContext;
    use crate::{architecture, quantization};

    #[test]
    fn test_utilization_is_aggressive() {
        let s = ThroughputStrategy;
        assert_eq!(s.utilization_fraction(80.0, 14.0), 0.95);
        assert_eq!(s.utilization_fraction(24.0, 14.0), 0.90);
    }

    #[test]
    fn test_batch_ceiling() {
        let arch = architecture::estimate(1.0).unwrap();
        let fmt = quantization::lookup("int4").unwrap();
        let s = ThroughputStrategy;
        let alloc = s.allocate_memory(80.0, 0.5).unwrap();
        let plan = s
            .plan_batch(&BatchContext::from_allocation(&alloc, &arch, fmt, 128, 256))
            .unwrap();
        assert_eq!(plan.max_concurrent_sequences, TUNING.max_sequences);
        assert_eq!(plan.max_batched_tokens, 256 * 128);
        assert!(!plan.chunked_prefill);
    }
}

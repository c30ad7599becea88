//! End-to-end planning pipeline.
//!
//! architecture -> memory breakdown -> posture strategy (allocation, batch,
//! performance) -> parameter map -> emitter. Every stage is a pure function
//! of the [`PlanInput`], so identical inputs yield identical plans.

use serde::Serialize;
use tracing::{debug, info};

use crate::architecture::{self, ArchitectureEstimate};
use crate::config::{Config, OutputConfig};
use crate::emitter::{Emitter, OutputFormat, ParameterMap, RuntimeConfiguration};
use crate::error::Result;
use crate::input::{ModelSpec, PlanInput};
use crate::memory::{self, ExecutionMode, MemoryBreakdown, MemoryModel, MemoryRequest};
use crate::quantization::{self, QualityImpact, QuantizationFormat};
use crate::strategy::{
    self, BatchContext, BatchPlan, MemoryAllocation, PerformanceEstimate, PerformanceInput,
};

/// Workload kinds that benefit from sharing prompt prefixes across requests.
const PREFIX_CACHING_KINDS: &[&str] = &["multi-user", "chatbot", "chat", "web-api"];

/// Memory breakdown for the expected load, without planning a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReport {
    pub architecture: ArchitectureEstimate,
    pub format: QuantizationFormat,
    pub batch_size: u64,
    pub sequence_length: u64,
    pub gpu_count: u64,
    pub memory: MemoryBreakdown,
    /// Total divided across the GPUs.
    pub per_gpu_gb: f64,
    pub available_per_gpu_gb: f64,
    pub fits: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPlan {
    pub input: PlanInput,
    pub architecture: ArchitectureEstimate,
    pub memory: MemoryReport,
    pub allocation: MemoryAllocation,
    pub batch: BatchPlan,
    pub performance: PerformanceEstimate,
    pub quality: QualityImpact,
    pub configuration: RuntimeConfiguration,
}

/// Runs the pipeline with a fixed engine calibration and output settings.
#[derive(Debug, Clone)]
pub struct Planner {
    memory_model: MemoryModel,
    output: OutputConfig,
}

impl Planner {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            memory_model: MemoryModel::new(config.engine.system_overhead_fraction)?,
            output: config.output.clone(),
        })
    }

    /// Estimated shape with any explicit fields from the model section applied.
    pub fn architecture(&self, model: &ModelSpec) -> Result<ArchitectureEstimate> {
        let mut estimate = architecture::estimate_detailed(model.parameters_billion)?;
        if !model.architecture.is_empty() {
            estimate.architecture = model.architecture.fill(estimate.architecture);
            estimate.architecture.validate()?;
        }
        Ok(estimate)
    }

    /// Breakdown at expected concurrency × max sequence length.
    pub fn memory(&self, input: &PlanInput) -> Result<MemoryReport> {
        let architecture = self.architecture(&input.model)?;
        let format = *quantization::lookup(&input.model.quantization)?;
        self.memory_report(input, architecture, format)
    }

    fn memory_report(
        &self,
        input: &PlanInput,
        architecture: ArchitectureEstimate,
        format: QuantizationFormat,
    ) -> Result<MemoryReport> {
        let request = MemoryRequest {
            parameters_billion: input.model.parameters_billion,
            architecture: architecture.architecture,
            format,
            batch_size: input.workload.expected_concurrency,
            sequence_length: input.workload.max_sequence_length,
            mode: ExecutionMode::Inference,
        };
        let breakdown = self.memory_model.breakdown(&request)?;
        let gpu_count = input.gpu.gpu_count.max(1);
        let per_gpu_gb = breakdown.total_gb / gpu_count as f64;

        Ok(MemoryReport {
            architecture,
            format,
            batch_size: request.batch_size,
            sequence_length: request.sequence_length,
            gpu_count,
            memory: breakdown.rounded(),
            per_gpu_gb: memory::round_gb(per_gpu_gb),
            available_per_gpu_gb: input.gpu.total_memory_gb,
            fits: per_gpu_gb <= input.gpu.total_memory_gb,
        })
    }

    pub fn plan(&self, input: &PlanInput) -> Result<DeploymentPlan> {
        self.plan_with_format(input, OutputFormat::Command)
    }

    pub fn plan_with_format(&self, input: &PlanInput, format: OutputFormat) -> Result<DeploymentPlan> {
        let architecture = self.architecture(&input.model)?;
        let quant = *quantization::lookup(&input.model.quantization)?;
        let memory = self.memory_report(input, architecture, quant)?;

        let gpu_count = input.gpu.gpu_count.max(1);
        let weights_gb = memory::model_weights_gb(input.model.parameters_billion, &quant)?;
        let weights_per_gpu_gb = weights_gb / gpu_count as f64;

        let workload = &input.workload;
        let strategy = strategy::strategy_for(workload.posture, Some(workload.workload_kind.as_str()));
        let allocation = strategy.allocate_memory(input.gpu.total_memory_gb, weights_per_gpu_gb)?;

        // Tensor parallelism shards weights and KV cache evenly: size the batch
        // against the pooled budget of the group, then report one shard so the
        // plan reads in the same per-GPU units as the allocation.
        let ctx = BatchContext {
            allocated_vram_gb: allocation.allocated_vram_gb * gpu_count as f64,
            model_memory_gb: weights_gb,
            kv_cache_budget_gb: allocation.kv_cache_budget_gb * gpu_count as f64,
            utilization_fraction: allocation.utilization_fraction,
            architecture: &architecture.architecture,
            format: &quant,
            average_sequence_length: workload.average_sequence_length,
            max_sequence_length: workload.max_sequence_length,
        };
        let batch = strategy.plan_batch(&ctx)?.per_gpu(gpu_count);

        let performance = strategy.estimate_performance(&PerformanceInput {
            model_memory_gb: weights_gb,
            memory_bandwidth_gbps: input.gpu.memory_bandwidth_gbps,
            gpu_count,
            has_tensor_cores: input.gpu.has_tensor_cores,
            batch_size: batch.max_concurrent_sequences,
            sequence_length: workload.average_sequence_length,
        });
        let quality = quantization::estimate_quality_impact(quant.name, input.model.parameters_billion)?;

        let params = parameter_map(input, &quant, &allocation, &batch);
        let configuration = Emitter::new(self.output.clone())
            .with_gpu_count(gpu_count)
            .emit(&params, format);

        info!(
            posture = %workload.posture,
            profile = strategy.profile(),
            quantization = quant.name,
            gpu_count,
            max_num_seqs = batch.max_concurrent_sequences,
            max_num_batched_tokens = batch.max_batched_tokens,
            warnings = configuration.warnings.len(),
            "Planned deployment"
        );

        Ok(DeploymentPlan {
            input: input.clone(),
            architecture,
            memory,
            allocation,
            batch,
            performance,
            quality,
            configuration,
        })
    }
}

/// Serving-engine `--dtype` / `--quantization` for a catalog format.
fn precision_flags(format: &QuantizationFormat) -> (&'static str, Option<&'static str>) {
    match format.name {
        "fp32" => ("float32", None),
        "fp16" => ("float16", None),
        "bf16" => ("bfloat16", None),
        "fp8" => ("auto", Some("fp8")),
        "awq" => ("auto", Some("awq")),
        "gptq" => ("auto", Some("gptq")),
        // int8 and int4 load through bitsandbytes
        _ => ("auto", Some("bitsandbytes")),
    }
}

fn parameter_map(
    input: &PlanInput,
    format: &QuantizationFormat,
    allocation: &MemoryAllocation,
    batch: &BatchPlan,
) -> ParameterMap {
    let (dtype, quantization) = precision_flags(format);
    let utilization = (allocation.utilization_fraction * 100.0).round() / 100.0;
    let prefix_caching = PREFIX_CACHING_KINDS.contains(&input.workload.workload_kind.as_str());

    let mut params = ParameterMap::new();
    params.insert("model".into(), input.model.name.clone().into());
    params.insert("tensor-parallel-size".into(), input.gpu.gpu_count.into());
    params.insert("gpu-memory-utilization".into(), utilization.into());
    params.insert("max-num-seqs".into(), batch.max_concurrent_sequences.into());
    params.insert("max-num-batched-tokens".into(), batch.max_batched_tokens.into());
    params.insert("max-model-len".into(), input.workload.max_sequence_length.into());
    params.insert("dtype".into(), dtype.into());
    params.insert("quantization".into(), quantization.into());
    params.insert("enable-chunked-prefill".into(), batch.chunked_prefill.into());
    params.insert("enable-prefix-caching".into(), prefix_caching.into());

    debug!(count = params.len(), "Built parameter map");
    params
}

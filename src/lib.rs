//! vram-planner: GPU memory estimation and deployment planning for LLM
//! inference serving.
//!
//! Estimates weights, KV cache and activation memory for a model under a
//! given numeric precision, sizes batches under a throughput, latency or
//! balanced posture, and renders the result as a serving-engine launch
//! command. All numbers are closed-form estimates, never measurements.
//!
//! - [`validate`]: range and shape checks for external values
//! - [`quantization`]: format catalog, comparison and recommendation
//! - [`architecture`]: transformer shape from a parameter count
//! - [`memory`]: weights, KV cache, activations and the total breakdown
//! - [`strategy`]: per-posture allocation, batch sizing and performance
//! - [`emitter`]: parameter map to command line, container or cluster descriptor
//! - [`input`]: normalization of flat, structured and hybrid records
//! - [`planner`]: the end-to-end pipeline
//! - [`server`]: HTTP planning service

pub mod architecture;
pub mod config;
pub mod emitter;
pub mod error;
pub mod input;
pub mod memory;
pub mod planner;
pub mod quantization;
pub mod server;
pub mod strategy;
pub mod validate;

pub use config::Config;
pub use emitter::{emit, Emitter, OutputFormat, ParamValue, ParameterMap, RuntimeConfiguration};
pub use error::{PlanError, Result};
pub use input::{normalize, PlanInput};
pub use planner::{DeploymentPlan, MemoryReport, Planner};
pub use strategy::{strategy_for, OptimizationStrategy, Posture};

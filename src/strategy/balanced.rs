//! Balanced posture, refined by a named target profile.

use tracing::warn;

use super::{OptimizationStrategy, Posture, PostureTuning};

pub const DEFAULT_PROFILE: &str = "general";

/// Named deployment targets for the balanced posture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetProfile {
    pub name: &'static str,
    pub utilization: f64,
    pub max_sequences: u64,
    pub max_batched_tokens: u64,
}

static PROFILES: [TargetProfile; 5] = [
    TargetProfile {
        name: "general",
        utilization: 0.85,
        max_sequences: 128,
        max_batched_tokens: 16_384,
    },
    TargetProfile {
        name: "web-api",
        utilization: 0.85,
        max_sequences: 96,
        max_batched_tokens: 12_288,
    },
    TargetProfile {
        name: "multi-user",
        utilization: 0.88,
        max_sequences: 160,
        max_batched_tokens: 20_480,
    },
    TargetProfile {
        name: "interactive",
        utilization: 0.82,
        max_sequences: 64,
        max_batched_tokens: 8_192,
    },
    TargetProfile {
        name: "batch-processing",
        utilization: 0.90,
        max_sequences: 192,
        max_batched_tokens: 32_768,
    },
];

pub fn profiles() -> &'static [TargetProfile] {
    &PROFILES
}

/// Exact match on a normalized profile name.
pub fn find_profile(name: &str) -> Option<&'static TargetProfile> {
    let wanted = name.trim().to_lowercase().replace('_', "-");
    PROFILES.iter().find(|p| p.name == wanted)
}

const BASE_TUNING: PostureTuning = PostureTuning {
    kv_share: 0.85,
    safety_margin: 0.80,
    min_sequences: 2,
    max_sequences: 128,
    max_batched_tokens: 16_384,
    bandwidth_efficiency: 0.75,
    concurrency_penalty: 0.03,
};

#[derive(Debug, Clone, Copy)]
pub struct BalancedStrategy {
    profile: &'static TargetProfile,
}

impl Default for BalancedStrategy {
    fn default() -> Self {
        Self::for_profile(DEFAULT_PROFILE)
    }
}

impl BalancedStrategy {
    /// Unknown profile names fall back to [`DEFAULT_PROFILE`].
    pub fn for_profile(name: &str) -> Self {
        let profile = find_profile(name).unwrap_or_else(|| {
            warn!(
                requested = name,
                fallback = DEFAULT_PROFILE,
                "Unknown target profile, using default"
            );
            &PROFILES[0]
        });
        Self { profile }
    }

    pub fn target_profile(&self) -> &TargetProfile {
        self.profile
    }
}

impl OptimizationStrategy for BalancedStrategy {
    fn posture(&self) -> Posture {
        Posture::Balanced
    }

    fn tuning(&self) -> PostureTuning {
        PostureTuning {
            max_sequences: self.profile.max_sequences,
            max_batched_tokens: self.profile.max_batched_tokens,
            ..BASE_TUNING
        }
    }

    fn profile(&self) -> &str {
        self.profile.name
    }

    fn utilization_fraction(&self, _total_vram_gb: f64, _model_memory_gb: f64) -> f64 {
        self.profile.utilization
    }
}

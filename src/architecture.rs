//! Transformer shape estimation from a parameter count.
//!
//! Sizes close to a known preset snap to it. Sizes further than
//! [`SNAP_TOLERANCE`] from the closest preset are linearly interpolated
//! between the two bracketing presets. Sizes outside the preset range clamp
//! to the nearest end rather than extrapolating.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlanError, Result};

/// Relative distance from the closest preset within which the preset is used as-is.
pub const SNAP_TOLERANCE: f64 = 0.30;

/// Shape of a decoder-only transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArchitecture {
    pub layer_count: u64,
    pub hidden_size: u64,
    pub head_count: u64,
    pub vocabulary_size: u64,
    pub feed_forward_size: u64,
}

impl ModelArchitecture {
    pub fn head_dim(&self) -> u64 {
        self.hidden_size / self.head_count
    }

    /// Rough parameter count: attention (4h²) plus gated MLP (3·h·ffn) per
    /// layer, plus untied input/output embeddings.
    pub fn approximate_parameters(&self) -> f64 {
        let h = self.hidden_size as f64;
        let per_layer = 4.0 * h * h + 3.0 * h * self.feed_forward_size as f64;
        self.layer_count as f64 * per_layer + 2.0 * self.vocabulary_size as f64 * h
    }

    /// All fields positive and the head dimension integral.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("architecture.layerCount", self.layer_count),
            ("architecture.hiddenSize", self.hidden_size),
            ("architecture.headCount", self.head_count),
            ("architecture.vocabularySize", self.vocabulary_size),
            ("architecture.feedForwardSize", self.feed_forward_size),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(PlanError::validation(field, value, "must be a positive integer"));
            }
        }
        if self.hidden_size % self.head_count != 0 {
            return Err(PlanError::validation(
                "architecture.hiddenSize",
                self.hidden_size,
                format!("must be divisible by headCount ({})", self.head_count),
            ));
        }
        Ok(())
    }
}

/// Caller-supplied shape fields. Any field left `None` is filled from the estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialArchitecture {
    pub layer_count: Option<u64>,
    pub hidden_size: Option<u64>,
    pub head_count: Option<u64>,
    pub vocabulary_size: Option<u64>,
    pub feed_forward_size: Option<u64>,
}

impl PartialArchitecture {
    pub fn is_empty(&self) -> bool {
        *self == PartialArchitecture::default()
    }

    /// Overlay the given fields on `base`.
    pub fn fill(&self, base: ModelArchitecture) -> ModelArchitecture {
        ModelArchitecture {
            layer_count: self.layer_count.unwrap_or(base.layer_count),
            hidden_size: self.hidden_size.unwrap_or(base.hidden_size),
            head_count: self.head_count.unwrap_or(base.head_count),
            vocabulary_size: self.vocabulary_size.unwrap_or(base.vocabulary_size),
            feed_forward_size: self.feed_forward_size.unwrap_or(base.feed_forward_size),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Preset {
    params_billion: f64,
    architecture: ModelArchitecture,
}

const fn preset(
    params_billion: f64,
    layer_count: u64,
    hidden_size: u64,
    head_count: u64,
    vocabulary_size: u64,
    feed_forward_size: u64,
) -> Preset {
    Preset {
        params_billion,
        architecture: ModelArchitecture {
            layer_count,
            hidden_size,
            head_count,
            vocabulary_size,
            feed_forward_size,
        },
    }
}

// Ascending by parameter count.
static PRESETS: [Preset; 8] = [
    preset(1.0, 22, 2048, 32, 32000, 5632),
    preset(3.0, 26, 3200, 32, 32000, 8640),
    preset(7.0, 32, 4096, 32, 32000, 11008),
    preset(13.0, 40, 5120, 40, 32000, 13824),
    preset(30.0, 60, 6656, 52, 32000, 17920),
    preset(65.0, 80, 8192, 64, 32000, 22016),
    preset(70.0, 80, 8192, 64, 32000, 28672),
    preset(175.0, 96, 12288, 96, 50257, 49152),
];

/// Parameter sizes (billions) with a known shape.
pub fn preset_sizes() -> Vec<f64> {
    PRESETS.iter().map(|p| p.params_billion).collect()
}

/// Result of [`estimate_detailed`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureEstimate {
    pub parameters_billion: f64,
    pub architecture: ModelArchitecture,
    pub interpolated: bool,
    pub nearest_preset_billion: f64,
}

/// Shape for a model of `params_billion` parameters.
pub fn estimate(params_billion: f64) -> Result<ModelArchitecture> {
    Ok(estimate_detailed(params_billion)?.architecture)
}

/// Like [`estimate`], but also reports how the shape was obtained.
pub fn estimate_detailed(params_billion: f64) -> Result<ArchitectureEstimate> {
    if !(params_billion > 0.0) || !params_billion.is_finite() {
        return Err(PlanError::InvalidInput {
            field: "paramsBillion".to_string(),
            value: params_billion.to_string(),
        });
    }

    let nearest = PRESETS
        .iter()
        .min_by(|a, b| {
            (a.params_billion - params_billion)
                .abs()
                .total_cmp(&(b.params_billion - params_billion).abs())
        })
        .copied()
        .unwrap_or(PRESETS[0]);

    let snap = |preset: Preset| ArchitectureEstimate {
        parameters_billion: params_billion,
        architecture: preset.architecture,
        interpolated: false,
        nearest_preset_billion: preset.params_billion,
    };

    let distance = (params_billion - nearest.params_billion).abs();
    if distance <= SNAP_TOLERANCE * nearest.params_billion {
        return Ok(snap(nearest));
    }

    let upper_idx = match PRESETS
        .iter()
        .position(|p| p.params_billion >= params_billion)
    {
        Some(0) | None => {
            debug!(
                params_billion,
                nearest = nearest.params_billion,
                "Size outside preset range, clamping to nearest preset"
            );
            return Ok(snap(nearest));
        }
        Some(idx) => idx,
    };
    let lower = PRESETS[upper_idx - 1];
    let upper = PRESETS[upper_idx];
    let t = (params_billion - lower.params_billion) / (upper.params_billion - lower.params_billion);

    let architecture = interpolate(&lower.architecture, &upper.architecture, t);
    debug!(
        params_billion,
        lower = lower.params_billion,
        upper = upper.params_billion,
        t,
        "Interpolated architecture"
    );

    Ok(ArchitectureEstimate {
        parameters_billion: params_billion,
        architecture,
        interpolated: true,
        nearest_preset_billion: nearest.params_billion,
    })
}

fn lerp(a: u64, b: u64, t: f64) -> u64 {
    (a as f64 + (b as f64 - a as f64) * t).round() as u64
}

/// Field-wise interpolation. The hidden size is snapped to the nearest
/// multiple of the interpolated head count to keep the head dimension integral.
fn interpolate(a: &ModelArchitecture, b: &ModelArchitecture, t: f64) -> ModelArchitecture {
    let head_count = lerp(a.head_count, b.head_count, t).max(1);
    let raw_hidden = a.hidden_size as f64 + (b.hidden_size as f64 - a.hidden_size as f64) * t;
    let hidden_size = ((raw_hidden / head_count as f64).round() as u64).max(1) * head_count;

    ModelArchitecture {
        layer_count: lerp(a.layer_count, b.layer_count, t),
        hidden_size,
        head_count,
        vocabulary_size: lerp(a.vocabulary_size, b.vocabulary_size, t),
        feed_forward_size: lerp(a.feed_forward_size, b.feed_forward_size, t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid_and_sorted() {
        for pair in PRESETS.windows(2) {
            assert!(pair[0].params_billion < pair[1].params_billion);
        }
        for p in &PRESETS {
            p.architecture.validate().unwrap();
        }
    }

    #[test]
    fn test_exact_preset() {
        let est = estimate_detailed(7.0).unwrap();
        assert!(!est.interpolated);
        assert_eq!(est.architecture.layer_count, 32);
        assert_eq!(est.architecture.hidden_size, 4096);
    }

    #[test]
    fn test_near_preset_snaps() {
        let est = estimate_detailed(8.0).unwrap();
        assert!(!est.interpolated);
        assert_eq!(est.nearest_preset_billion, 7.0);
        assert_eq!(est.architecture, estimate(7.0).unwrap());
    }

    #[test]
    fn test_far_from_preset_interpolates() {
        let est = estimate_detailed(100.0).unwrap();
        assert!(est.interpolated);
        assert_eq!(est.nearest_preset_billion, 70.0);
        assert_eq!(est.architecture.layer_count, 85);
        assert_eq!(est.architecture.head_count, 73);
        assert_eq!(est.architecture.hidden_size % est.architecture.head_count, 0);
        est.architecture.validate().unwrap();
    }

    #[test]
    fn test_below_range_clamps() {
        let est = estimate_detailed(0.5).unwrap();
        assert!(!est.interpolated);
        assert_eq!(est.architecture, PRESETS[0].architecture);
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!(matches!(estimate(0.0), Err(PlanError::InvalidInput { .. })));
        assert!(matches!(estimate(-3.0), Err(PlanError::InvalidInput { .. })));
        assert!(matches!(estimate(f64::NAN), Err(PlanError::InvalidInput { .. })));
    }

    #[test]
    fn test_partial_fill_overrides() {
        let partial = PartialArchitecture {
            layer_count: Some(40),
            ..Default::default()
        };
        let filled = partial.fill(estimate(7.0).unwrap());
        assert_eq!(filled.layer_count, 40);
        assert_eq!(filled.hidden_size, 4096);
    }

    #[test]
    fn test_approximate_parameters_near_7b() {
        let params = estimate(7.0).unwrap().approximate_parameters();
        assert!(params > 6.5e9 && params < 7.0e9, "got {params}");
    }
}

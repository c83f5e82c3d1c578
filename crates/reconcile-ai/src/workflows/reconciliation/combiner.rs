//! Blends deterministic and secondary confidence into one value.
//!
//! The combiner holds no learning state. Weights arrive from the path router and are
//! renormalized here, with the deterministic share floored so the secondary path can
//! never fully dominate a financial decision.

use serde::{Deserialize, Serialize};

/// Minimum share the deterministic path keeps after renormalization.
pub const DETERMINISTIC_WEIGHT_FLOOR: f64 = 0.2;

/// Relative trust placed in each scoring path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathWeights {
    pub deterministic: f64,
    pub secondary: f64,
}

impl PathWeights {
    pub const DETERMINISTIC_PRIMARY: Self = Self {
        deterministic: 0.8,
        secondary: 0.2,
    };
    pub const SECONDARY_PRIMARY: Self = Self {
        deterministic: 0.2,
        secondary: 0.8,
    };
    pub const HYBRID: Self = Self {
        deterministic: 0.4,
        secondary: 0.6,
    };
    pub const DETERMINISTIC_ONLY: Self = Self {
        deterministic: 1.0,
        secondary: 0.0,
    };

    /// Scale to a sum of 1.0 and apply the deterministic floor. Degenerate inputs
    /// (negative, non-finite, or all-zero) fall back to the balanced preset.
    pub fn normalized(self) -> Self {
        let valid = self.deterministic.is_finite()
            && self.secondary.is_finite()
            && self.deterministic >= 0.0
            && self.secondary >= 0.0
            && self.deterministic + self.secondary > 0.0;
        let source = if valid { self } else { Self::HYBRID };

        let sum = source.deterministic + source.secondary;
        let deterministic = (source.deterministic / sum).max(DETERMINISTIC_WEIGHT_FLOOR);
        Self {
            deterministic,
            secondary: 1.0 - deterministic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreSource {
    HeuristicOnly,
    Hybrid,
}

/// Final confidence plus the inputs that produced it. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridScore {
    pub value: u8,
    pub source: ScoreSource,
    pub deterministic_score: u8,
    pub secondary_score: Option<u8>,
    pub weights_used: PathWeights,
}

/// Merge the two paths. Without a secondary score the deterministic score passes
/// through verbatim.
pub fn combine(
    deterministic_score: u8,
    secondary_score: Option<u8>,
    weights: PathWeights,
) -> HybridScore {
    let deterministic_score = deterministic_score.min(100);

    match secondary_score {
        None => HybridScore {
            value: deterministic_score,
            source: ScoreSource::HeuristicOnly,
            deterministic_score,
            secondary_score: None,
            weights_used: PathWeights::DETERMINISTIC_ONLY,
        },
        Some(secondary) => {
            let secondary = secondary.min(100);
            let weights = weights.normalized();
            let blended = f64::from(secondary) * weights.secondary
                + f64::from(deterministic_score) * weights.deterministic;
            HybridScore {
                value: blended.round().clamp(0.0, 100.0) as u8,
                source: ScoreSource::Hybrid,
                deterministic_score,
                secondary_score: Some(secondary),
                weights_used: weights,
            }
        }
    }
}

use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTO_APPLY_THRESHOLD: u8 = 80;
pub const DEFAULT_MINIMUM_THRESHOLD: u8 = 20;
pub const DEFAULT_AMBIGUITY_FLOOR: u8 = 40;

/// Score gates shared by the scorer and the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Confidence at or above which a decision may be applied without review.
    pub auto_apply_threshold: u8,
    /// Candidates scoring below this never reach the combiner.
    pub minimum_threshold: u8,
    /// Lower bound of the mid-confidence band.
    pub ambiguity_floor: u8,
}

impl ScoringConfig {
    pub fn is_consistent(&self) -> bool {
        self.minimum_threshold < self.ambiguity_floor
            && self.ambiguity_floor < self.auto_apply_threshold
            && self.auto_apply_threshold <= 100
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            auto_apply_threshold: DEFAULT_AUTO_APPLY_THRESHOLD,
            minimum_threshold: DEFAULT_MINIMUM_THRESHOLD,
            ambiguity_floor: DEFAULT_AMBIGUITY_FLOOR,
        }
    }
}

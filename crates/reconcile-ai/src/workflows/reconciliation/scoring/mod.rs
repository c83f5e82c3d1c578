//! Deterministic, explainable candidate scoring.
//!
//! Both variants share one shape: independent factors, each clamped to its own band,
//! summed into a 0-100 confidence. Scoring is pure and performs no I/O, so identical
//! inputs always produce identical breakdowns.

mod categorization;
mod config;
mod matching;

pub use config::{
    ScoringConfig, DEFAULT_AMBIGUITY_FLOOR, DEFAULT_AUTO_APPLY_THRESHOLD,
    DEFAULT_MINIMUM_THRESHOLD,
};
pub use matching::normalize_reference;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::domain::{Candidate, CandidateId, Transaction};

/// Independent evidence the deterministic path weighs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    Reference,
    Amount,
    CounterpartyName,
    KnownPattern,
    HistoricalPrecedent,
    TypicalAmount,
    DescriptionQuality,
}

impl ScoreFactor {
    pub const fn label(self) -> &'static str {
        match self {
            ScoreFactor::Reference => "reference",
            ScoreFactor::Amount => "amount",
            ScoreFactor::CounterpartyName => "counterparty_name",
            ScoreFactor::KnownPattern => "known_pattern",
            ScoreFactor::HistoricalPrecedent => "historical_precedent",
            ScoreFactor::TypicalAmount => "typical_amount",
            ScoreFactor::DescriptionQuality => "description_quality",
        }
    }

    /// Inclusive point band the factor is clamped to.
    pub const fn band(self) -> (i16, i16) {
        match self {
            ScoreFactor::Reference => (0, 40),
            ScoreFactor::Amount => (0, 40),
            ScoreFactor::CounterpartyName => (0, 20),
            ScoreFactor::KnownPattern => (0, 60),
            ScoreFactor::HistoricalPrecedent => (0, 30),
            ScoreFactor::TypicalAmount => (0, 10),
            ScoreFactor::DescriptionQuality => (-10, 0),
        }
    }
}

/// Discrete contribution to a candidate's score, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: ScoreFactor,
    pub points: i16,
    /// Human-readable rule that fired. Never echoes raw transaction text.
    pub notes: String,
}

impl ScoreComponent {
    pub(crate) fn new(factor: ScoreFactor, points: i16, notes: impl Into<String>) -> Self {
        let (min, max) = factor.band();
        Self {
            factor,
            points: points.clamp(min, max),
            notes: notes.into(),
        }
    }
}

/// Per-candidate factor contributions and their sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub candidate_id: CandidateId,
    pub components: Vec<ScoreComponent>,
    pub total: u8,
}

impl ScoreBreakdown {
    pub(crate) fn from_components(
        candidate_id: CandidateId,
        components: Vec<ScoreComponent>,
    ) -> Self {
        let sum: i16 = components.iter().map(|component| component.points).sum();
        Self {
            candidate_id,
            components,
            total: sum.clamp(0, 100) as u8,
        }
    }

    /// Evidence row for a request that produced no candidates at all.
    pub fn unmatched() -> Self {
        Self {
            candidate_id: CandidateId("unmatched".to_string()),
            components: Vec::new(),
            total: 0,
        }
    }

    pub fn points_for(&self, factor: ScoreFactor) -> i16 {
        self.components
            .iter()
            .filter(|component| component.factor == factor)
            .map(|component| component.points)
            .sum()
    }

    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .components
            .iter()
            .map(|component| format!("{}={}", component.factor.label(), component.points))
            .collect();
        format!("{} scored {} ({})", self.candidate_id, self.total, parts.join(", "))
    }

    fn tie_break_key(&self) -> (i16, i16) {
        let identifying =
            self.points_for(ScoreFactor::Reference) + self.points_for(ScoreFactor::KnownPattern);
        let supporting = self.points_for(ScoreFactor::Amount)
            + self.points_for(ScoreFactor::HistoricalPrecedent);
        (identifying, supporting)
    }
}

/// Total order used to rank candidates: score, strongest identifying factor,
/// strongest amount/precedent factor, then candidate id.
pub fn rank_order(a: &ScoreBreakdown, b: &ScoreBreakdown) -> Ordering {
    b.total
        .cmp(&a.total)
        .then_with(|| b.tie_break_key().0.cmp(&a.tie_break_key().0))
        .then_with(|| b.tie_break_key().1.cmp(&a.tie_break_key().1))
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
}

/// Stateless scorer for both decision types.
#[derive(Debug, Clone, Default)]
pub struct DeterministicScorer;

impl DeterministicScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, transaction: &Transaction, candidate: &Candidate) -> ScoreBreakdown {
        let components = match candidate {
            Candidate::Invoice(invoice) => matching::score_invoice(transaction, invoice),
            Candidate::Account(account) => categorization::score_account(transaction, account),
        };
        ScoreBreakdown::from_components(candidate.id().clone(), components)
    }

    /// Score every candidate and return the breakdowns best-first.
    pub fn rank(&self, transaction: &Transaction, candidates: &[Candidate]) -> Vec<ScoreBreakdown> {
        let mut ranked: Vec<ScoreBreakdown> = candidates
            .iter()
            .map(|candidate| self.score(transaction, candidate))
            .collect();
        ranked.sort_by(rank_order);
        ranked
    }
}

//! Confidence-scored bank reconciliation: invoice matching and categorization.
//!
//! A transaction flows through candidate generation, deterministic scoring, an optional
//! secondary inference call for ambiguous cases, the hybrid combiner and the decision
//! engine's thresholds. Every terminal decision is audited before it is returned. Human
//! corrections feed the accuracy tracker, which steers the path router's weights.

pub mod accuracy;
pub mod audit;
pub mod candidates;
pub mod combiner;
pub mod domain;
pub mod engine;
pub mod import;
mod jsonl;
pub mod ledger;
pub mod path_router;
pub mod router;
pub mod scoring;
pub mod secondary;
pub mod service;

#[cfg(test)]
mod tests;

pub use accuracy::{
    summarize, AccuracyConfig, AccuracyOutcome, AccuracyStats, AccuracyStore,
    AccuracyStoreError, AccuracyTracker, InMemoryAccuracyStore, JsonLinesAccuracyStore,
    Recommendation,
};
pub use audit::{AuditError, AuditLog, AuditRecord, InMemoryAuditLog, JsonLinesAuditLog};
pub use candidates::{
    CandidateFixture, CandidateGenerator, CandidateSource, CandidateSourceError,
    InMemoryCandidateSource,
};
pub use combiner::{combine, HybridScore, PathWeights, ScoreSource, DETERMINISTIC_WEIGHT_FLOOR};
pub use domain::{
    AccountEntry, AmountRange, Candidate, CandidateId, DecisionId, DecisionPath, DecisionType,
    OpenInvoice, Prediction, TenantId, Transaction, TransactionId,
};
pub use engine::{
    Decision, DecisionAction, DecisionEngine, DecisionError, DecisionStage, EngineConfig,
    EscalationReason,
};
pub use import::{parse_transactions, ImportError};
pub use ledger::{
    CorrectionStatus, DecisionLedger, InMemoryDecisionLedger, JsonLinesDecisionLedger,
    LedgerEntry, LedgerError, LedgerRecord, DEFAULT_LEDGER_CAPACITY,
};
pub use path_router::PathRouter;
pub use router::reconciliation_router;
pub use scoring::{DeterministicScorer, ScoreBreakdown, ScoreComponent, ScoreFactor, ScoringConfig};
pub use secondary::{
    ConfiguredSecondary, DisabledSecondary, HttpSecondary, SanitizePolicy, SecondaryInference,
    SecondaryRequest, SecondaryResolution, SecondaryUnavailable,
};
pub use service::{Correction, CorrectionReceipt, ReconciliationService, ReconciliationSettings};

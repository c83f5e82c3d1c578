//! Feedback loop: what each path predicted versus what a human confirmed.
//!
//! Outcomes are append-only and tenant-scoped. They carry prediction codes and flags
//! only, never transaction text. Statistics are derived on read from the most recent
//! window of outcomes per (tenant, decision type).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{DecisionPath, DecisionType, Prediction, TenantId};
use super::jsonl::{JsonLinesFile, ReplayError};

pub const DEFAULT_ACCURACY_WINDOW: usize = 200;
pub const DEFAULT_MIN_SAMPLES: usize = 50;
pub const DEFAULT_MARGIN_POINTS: f64 = 5.0;

/// One human correction compared against both paths' predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyOutcome {
    pub tenant_id: TenantId,
    pub decision_type: DecisionType,
    pub deterministic_prediction: Prediction,
    pub secondary_prediction: Option<Prediction>,
    pub actual_outcome: Prediction,
    pub deterministic_correct: bool,
    pub secondary_correct: Option<bool>,
    pub path_used: DecisionPath,
    pub created_at: DateTime<Utc>,
}

impl AccuracyOutcome {
    /// Build an outcome, deriving the correctness flags from the predictions.
    pub fn new(
        tenant_id: TenantId,
        decision_type: DecisionType,
        deterministic_prediction: Prediction,
        secondary_prediction: Option<Prediction>,
        actual_outcome: Prediction,
        path_used: DecisionPath,
    ) -> Self {
        let deterministic_correct = deterministic_prediction == actual_outcome;
        let secondary_correct = secondary_prediction
            .as_ref()
            .map(|prediction| *prediction == actual_outcome);
        Self {
            tenant_id,
            decision_type,
            deterministic_prediction,
            secondary_prediction,
            actual_outcome,
            deterministic_correct,
            secondary_correct,
            path_used,
            created_at: Utc::now(),
        }
    }
}

/// Blending policy the tracker recommends for a tenant and decision type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    DeterministicPrimary,
    SecondaryPrimary,
    Hybrid,
}

impl Recommendation {
    pub const fn label(self) -> &'static str {
        match self {
            Recommendation::DeterministicPrimary => "DETERMINISTIC_PRIMARY",
            Recommendation::SecondaryPrimary => "SECONDARY_PRIMARY",
            Recommendation::Hybrid => "HYBRID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyStats {
    /// Percentage, 0.0..=100.0.
    pub deterministic_accuracy: f64,
    /// Percentage, 0.0..=100.0.
    pub secondary_accuracy: f64,
    pub sample_size: usize,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyConfig {
    pub window: usize,
    pub min_samples: usize,
    pub margin_points: f64,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_ACCURACY_WINDOW,
            min_samples: DEFAULT_MIN_SAMPLES,
            margin_points: DEFAULT_MARGIN_POINTS,
        }
    }
}

/// Pure summary over a window of outcomes.
pub fn summarize(outcomes: &[AccuracyOutcome], config: &AccuracyConfig) -> AccuracyStats {
    let sample_size = outcomes.len();
    if sample_size == 0 {
        return AccuracyStats {
            deterministic_accuracy: 0.0,
            secondary_accuracy: 0.0,
            sample_size,
            recommendation: Recommendation::Hybrid,
        };
    }

    let deterministic_hits = outcomes
        .iter()
        .filter(|outcome| outcome.deterministic_correct)
        .count();
    let secondary_hits = outcomes
        .iter()
        .filter(|outcome| outcome.secondary_correct == Some(true))
        .count();

    let deterministic_accuracy = deterministic_hits as f64 * 100.0 / sample_size as f64;
    let secondary_accuracy = secondary_hits as f64 * 100.0 / sample_size as f64;

    let recommendation = if sample_size < config.min_samples {
        Recommendation::Hybrid
    } else if secondary_accuracy > deterministic_accuracy + config.margin_points {
        Recommendation::SecondaryPrimary
    } else if deterministic_accuracy > secondary_accuracy + config.margin_points {
        Recommendation::DeterministicPrimary
    } else {
        Recommendation::Hybrid
    };

    AccuracyStats {
        deterministic_accuracy,
        secondary_accuracy,
        sample_size,
        recommendation,
    }
}

/// Append-only storage for accuracy outcomes.
pub trait AccuracyStore: Send + Sync {
    fn append(&self, outcome: AccuracyOutcome) -> Result<(), AccuracyStoreError>;
    /// Most recent outcomes for the key, oldest first, at most `limit` rows.
    fn recent(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
        limit: usize,
    ) -> Result<Vec<AccuracyOutcome>, AccuracyStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AccuracyStoreError {
    #[error("accuracy outcome is missing a tenant scope")]
    MissingTenant,
    #[error("accuracy log io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("accuracy outcome serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("accuracy log {path} line {line} is corrupt: {details}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        details: String,
    },
}

impl AccuracyStoreError {
    fn from_replay(path: &Path, error: ReplayError) -> Self {
        match error {
            ReplayError::Io(err) => Self::Io(err),
            ReplayError::Corrupt { line, details } => Self::Corrupt {
                path: path.to_path_buf(),
                line,
                details,
            },
        }
    }
}

type OutcomeKey = (TenantId, DecisionType);

#[derive(Debug, Default)]
pub struct InMemoryAccuracyStore {
    rows: RwLock<HashMap<OutcomeKey, Vec<AccuracyOutcome>>>,
}

impl AccuracyStore for InMemoryAccuracyStore {
    fn append(&self, outcome: AccuracyOutcome) -> Result<(), AccuracyStoreError> {
        let key = (outcome.tenant_id.clone(), outcome.decision_type);
        let mut guard = self.rows.write().expect("accuracy store lock poisoned");
        guard.entry(key).or_default().push(outcome);
        Ok(())
    }

    fn recent(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
        limit: usize,
    ) -> Result<Vec<AccuracyOutcome>, AccuracyStoreError> {
        let guard = self.rows.read().expect("accuracy store lock poisoned");
        let rows = guard
            .get(&(tenant_id.clone(), decision_type))
            .map(|rows| {
                let start = rows.len().saturating_sub(limit);
                rows[start..].to_vec()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

/// Durable store: one JSON object per line, synced on every append and replayed on open.
#[derive(Debug)]
pub struct JsonLinesAccuracyStore {
    log: JsonLinesFile,
    index: InMemoryAccuracyStore,
}

impl JsonLinesAccuracyStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AccuracyStoreError> {
        let path = path.as_ref();
        let (log, outcomes) = JsonLinesFile::open::<AccuracyOutcome>(path)
            .map_err(|err| AccuracyStoreError::from_replay(path, err))?;
        let index = InMemoryAccuracyStore::default();
        for outcome in outcomes {
            index.append(outcome)?;
        }
        Ok(Self { log, index })
    }

    /// Load an existing log for reporting. The file is never created or modified.
    pub fn snapshot(path: impl AsRef<Path>) -> Result<InMemoryAccuracyStore, AccuracyStoreError> {
        let path = path.as_ref();
        let outcomes = JsonLinesFile::read::<AccuracyOutcome>(path)
            .map_err(|err| AccuracyStoreError::from_replay(path, err))?;
        let index = InMemoryAccuracyStore::default();
        for outcome in outcomes {
            index.append(outcome)?;
        }
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }
}

impl AccuracyStore for JsonLinesAccuracyStore {
    fn append(&self, outcome: AccuracyOutcome) -> Result<(), AccuracyStoreError> {
        let line = serde_json::to_string(&outcome)?;
        self.log.append_line(&line)?;
        self.index.append(outcome)
    }

    fn recent(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
        limit: usize,
    ) -> Result<Vec<AccuracyOutcome>, AccuracyStoreError> {
        self.index.recent(tenant_id, decision_type, limit)
    }
}

/// Records corrections and reports rolling accuracy per tenant and decision type.
#[derive(Clone)]
pub struct AccuracyTracker {
    store: Arc<dyn AccuracyStore>,
    config: AccuracyConfig,
}

impl AccuracyTracker {
    pub fn new(store: Arc<dyn AccuracyStore>, config: AccuracyConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AccuracyConfig {
        &self.config
    }

    pub fn record_outcome(&self, outcome: AccuracyOutcome) -> Result<(), AccuracyStoreError> {
        if outcome.tenant_id.is_blank() {
            return Err(AccuracyStoreError::MissingTenant);
        }
        tracing::debug!(
            tenant = %outcome.tenant_id,
            decision_type = outcome.decision_type.label(),
            deterministic_correct = outcome.deterministic_correct,
            secondary_correct = ?outcome.secondary_correct,
            "recording accuracy outcome"
        );
        self.store.append(outcome)
    }

    pub fn get_accuracy(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
    ) -> Result<AccuracyStats, AccuracyStoreError> {
        if tenant_id.is_blank() {
            return Err(AccuracyStoreError::MissingTenant);
        }
        let outcomes = self
            .store
            .recent(tenant_id, decision_type, self.config.window)?;
        Ok(summarize(&outcomes, &self.config))
    }
}

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::accuracy::{
    AccuracyConfig, AccuracyOutcome, AccuracyStats, AccuracyStore, AccuracyStoreError,
    AccuracyTracker,
};
use super::audit::AuditLog;
use super::candidates::{CandidateGenerator, CandidateSource, DEFAULT_MAX_CANDIDATES};
use super::combiner::PathWeights;
use super::domain::{CandidateId, DecisionId, DecisionType, Prediction, TenantId, Transaction};
use super::engine::{Decision, DecisionEngine, DecisionError, EngineConfig};
use super::ledger::{CorrectionStatus, DecisionLedger, LedgerEntry, LedgerError, LedgerRecord};
use super::path_router::{PathRouter, DEFAULT_ROUTER_CACHE_TTL};
use super::secondary::SecondaryInference;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Everything the service needs besides its collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconciliationSettings {
    pub engine: EngineConfig,
    pub accuracy: AccuracyConfig,
    pub router_cache_ttl: Duration,
    pub max_candidates: usize,
    pub batch_concurrency: usize,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            accuracy: AccuracyConfig::default(),
            router_cache_ttl: DEFAULT_ROUTER_CACHE_TTL,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

/// Human correction event. `corrected_outcome == None` means "no valid target".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub tenant_id: TenantId,
    pub decision_id: DecisionId,
    #[serde(default)]
    pub corrected_outcome: Option<CandidateId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionReceipt {
    pub outcome: AccuracyOutcome,
    pub status: CorrectionStatus,
}

/// Service composing candidate generation, the decision engine, the ledger and the
/// accuracy feedback loop.
pub struct ReconciliationService<C, S> {
    generator: CandidateGenerator<C>,
    engine: DecisionEngine<S>,
    ledger: Arc<dyn DecisionLedger>,
    tracker: Arc<AccuracyTracker>,
    batch_concurrency: usize,
}

impl<C, S> ReconciliationService<C, S>
where
    C: CandidateSource + 'static,
    S: SecondaryInference + 'static,
{
    pub fn new(
        source: Arc<C>,
        secondary: Arc<S>,
        audit: Arc<dyn AuditLog>,
        accuracy_store: Arc<dyn AccuracyStore>,
        ledger: Arc<dyn DecisionLedger>,
        settings: ReconciliationSettings,
    ) -> Self {
        let tracker = Arc::new(AccuracyTracker::new(accuracy_store, settings.accuracy));
        let router = Arc::new(PathRouter::new(tracker.clone(), settings.router_cache_ttl));
        let engine = DecisionEngine::new(secondary, router, audit, settings.engine);

        Self {
            generator: CandidateGenerator::new(source, settings.max_candidates),
            engine,
            ledger,
            tracker,
            batch_concurrency: settings.batch_concurrency.max(1),
        }
    }

    pub fn router(&self) -> &Arc<PathRouter> {
        self.engine.router()
    }

    pub fn tracker(&self) -> &Arc<AccuracyTracker> {
        &self.tracker
    }

    /// Generate candidates, decide, and store the decision in the ledger.
    pub async fn decide(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
        transaction: &Transaction,
    ) -> Result<Decision, ServiceError> {
        if tenant_id.is_blank() {
            return Err(DecisionError::MissingTenant.into());
        }
        let candidates = self
            .generator
            .generate(transaction, tenant_id, decision_type)
            .map_err(DecisionError::from)?;
        let decision = self
            .engine
            .decide(tenant_id, decision_type, transaction, &candidates)
            .await?;
        self.ledger.insert(LedgerRecord::from(&decision))?;
        Ok(decision)
    }

    /// Decide independent transactions concurrently. Results keep the input order.
    pub async fn decide_batch(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
        transactions: &[Transaction],
    ) -> Vec<Result<Decision, ServiceError>> {
        stream::iter(transactions)
            .map(|transaction| self.decide(tenant_id, decision_type, transaction))
            .buffered(self.batch_concurrency)
            .collect()
            .await
    }

    /// Record a human correction once and feed it to the accuracy tracker.
    ///
    /// The ledger claims the correction before the outcome is written, so concurrent
    /// corrections of one decision produce at most one accuracy row.
    pub fn correct(&self, correction: Correction) -> Result<CorrectionReceipt, ServiceError> {
        if correction.tenant_id.is_blank() {
            return Err(DecisionError::MissingTenant.into());
        }

        let entry = self
            .ledger
            .fetch(&correction.decision_id)?
            .filter(|entry| entry.record.tenant_id == correction.tenant_id)
            .ok_or(LedgerError::NotFound)?;
        let record = &entry.record;
        let actual = Prediction::from_candidate(correction.corrected_outcome.as_ref());

        let outcome = AccuracyOutcome::new(
            record.tenant_id.clone(),
            record.decision_type,
            record.deterministic_prediction.clone(),
            record.secondary_prediction.clone(),
            actual.clone(),
            record.decision_path,
        );

        let status = self
            .ledger
            .record_correction(&correction.decision_id, &actual)?;
        if status == CorrectionStatus::AlreadyRecorded {
            return Ok(CorrectionReceipt { outcome, status });
        }

        if let Err(err) = self.tracker.record_outcome(outcome.clone()) {
            if let Err(release) = self
                .ledger
                .release_correction(&correction.decision_id, &actual)
            {
                tracing::warn!(
                    decision = %record.id,
                    error = %release,
                    "correction claim could not be released"
                );
            }
            return Err(err.into());
        }
        self.router()
            .invalidate(&record.tenant_id, record.decision_type);

        tracing::info!(
            decision = %record.id,
            tenant = %record.tenant_id,
            decision_type = record.decision_type.label(),
            deterministic_correct = outcome.deterministic_correct,
            secondary_correct = ?outcome.secondary_correct,
            "correction recorded"
        );

        Ok(CorrectionReceipt { outcome, status })
    }

    pub fn accuracy(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
    ) -> Result<AccuracyStats, ServiceError> {
        if tenant_id.is_blank() {
            return Err(DecisionError::MissingTenant.into());
        }
        Ok(self.tracker.get_accuracy(tenant_id, decision_type)?)
    }

    pub fn weights(&self, tenant_id: &TenantId, decision_type: DecisionType) -> PathWeights {
        self.router().get_weights(tenant_id, decision_type)
    }

    /// Ledger entry for a decision, with its correction if one was recorded.
    pub fn decision(
        &self,
        tenant_id: &TenantId,
        decision_id: &DecisionId,
    ) -> Result<LedgerEntry, ServiceError> {
        self.ledger
            .fetch(decision_id)?
            .filter(|entry| &entry.record.tenant_id == tenant_id)
            .ok_or_else(|| LedgerError::NotFound.into())
    }
}

/// Error raised by the reconciliation service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Accuracy(#[from] AccuracyStoreError),
}

impl ServiceError {
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Decision(DecisionError::InvalidInput(_))
                | ServiceError::Decision(DecisionError::MissingTenant)
                | ServiceError::Accuracy(AccuracyStoreError::MissingTenant)
        )
    }
}

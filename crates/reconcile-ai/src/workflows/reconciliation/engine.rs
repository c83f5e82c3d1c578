//! Decision orchestrator.
//!
//! Walks `CANDIDATES_GENERATED -> SCORED -> (AMBIGUOUS -> SECONDARY_CONSULTED) -> COMBINED
//! -> DECIDED` for one transaction and returns a terminal [`Decision`]. Only input errors
//! and audit failures leave this module as errors. Secondary-path failures are logged and
//! folded into a deterministic-only score.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::{AuditError, AuditLog, AuditRecord};
use super::candidates::CandidateSourceError;
use super::combiner::{combine, HybridScore, PathWeights, ScoreSource};
use super::domain::{
    Candidate, CandidateId, DecisionId, DecisionPath, DecisionType, Prediction, TenantId,
    Transaction, TransactionId,
};
use super::path_router::PathRouter;
use super::scoring::{DeterministicScorer, ScoreBreakdown, ScoringConfig};
use super::secondary::{
    SanitizePolicy, SecondaryInference, SecondaryRequest, SecondaryResolution,
    SecondaryUnavailable,
};

/// Amounts at or above this many minor units always go to a human.
pub const DEFAULT_HIGH_VALUE_CEILING: i64 = 1_000_000;
pub const DEFAULT_SECONDARY_TIMEOUT: Duration = Duration::from_millis(4_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    AutoApply,
    Review,
    NoMatch,
}

impl DecisionAction {
    pub const fn label(self) -> &'static str {
        match self {
            DecisionAction::AutoApply => "AUTO_APPLY",
            DecisionAction::Review => "REVIEW",
            DecisionAction::NoMatch => "NO_MATCH",
        }
    }
}

/// Reason code attached to every `REVIEW` decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationReason {
    AmbiguousMultiMatch,
    LowConfidence,
    HighValue,
    SecondaryNoMatch,
}

impl EscalationReason {
    pub const fn code(self) -> &'static str {
        match self {
            EscalationReason::AmbiguousMultiMatch => "AMBIGUOUS_MULTI_MATCH",
            EscalationReason::LowConfidence => "LOW_CONFIDENCE",
            EscalationReason::HighValue => "HIGH_VALUE",
            EscalationReason::SecondaryNoMatch => "SECONDARY_NO_MATCH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStage {
    CandidatesGenerated,
    Scored,
    Ambiguous,
    SecondaryConsulted,
    Combined,
    Decided,
}

/// Terminal, write-once outcome for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub tenant_id: TenantId,
    pub decision_type: DecisionType,
    pub transaction_id: TransactionId,
    pub action: DecisionAction,
    pub chosen_candidate_id: Option<CandidateId>,
    pub confidence: u8,
    pub reasoning: String,
    pub decision_path: DecisionPath,
    pub hybrid: HybridScore,
    /// Every scored candidate, best first. Never empty.
    pub evidence: Vec<ScoreBreakdown>,
    pub escalation: Option<EscalationReason>,
    pub deterministic_prediction: Prediction,
    pub secondary_prediction: Option<Prediction>,
    pub stage_trail: Vec<DecisionStage>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_escalated(&self) -> bool {
        self.escalation.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("invalid decision input: {0}")]
    InvalidInput(String),
    #[error("decision request is missing a tenant scope")]
    MissingTenant,
    #[error(transparent)]
    Candidates(#[from] CandidateSourceError),
    #[error("decision could not be audited: {0}")]
    Audit(#[from] AuditError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub high_value_ceiling_minor_units: i64,
    pub secondary_timeout: Duration,
    pub sanitize: SanitizePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            high_value_ceiling_minor_units: DEFAULT_HIGH_VALUE_CEILING,
            secondary_timeout: DEFAULT_SECONDARY_TIMEOUT,
            sanitize: SanitizePolicy::default(),
        }
    }
}

/// What the secondary path contributed to an ambiguous case.
enum SecondaryVerdict {
    Chose(SecondaryResolution, CandidateId),
    NoMatch(SecondaryResolution),
    Unavailable(SecondaryUnavailable),
}

/// Intermediate result before the high-value gate runs.
struct Outcome {
    action: DecisionAction,
    chosen: Option<CandidateId>,
    hybrid: HybridScore,
    escalation: Option<EscalationReason>,
    secondary_prediction: Option<Prediction>,
    reasoning: Vec<String>,
}

pub struct DecisionEngine<S> {
    scorer: DeterministicScorer,
    secondary: Arc<S>,
    router: Arc<PathRouter>,
    audit: Arc<dyn AuditLog>,
    config: EngineConfig,
}

impl<S> DecisionEngine<S>
where
    S: SecondaryInference + 'static,
{
    pub fn new(
        secondary: Arc<S>,
        router: Arc<PathRouter>,
        audit: Arc<dyn AuditLog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            scorer: DeterministicScorer::new(),
            secondary,
            router,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<PathRouter> {
        &self.router
    }

    /// Score, optionally consult the secondary path, apply thresholds, audit, return.
    pub async fn decide(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
        transaction: &Transaction,
        candidates: &[Candidate],
    ) -> Result<Decision, DecisionError> {
        validate(tenant_id, decision_type, transaction, candidates)?;

        let scoring = self.config.scoring;
        let mut trail = vec![DecisionStage::CandidatesGenerated];

        let ranked = self.scorer.rank(transaction, candidates);
        for breakdown in &ranked {
            tracing::debug!(
                tenant = %tenant_id,
                transaction = %transaction.id.0,
                candidate = %breakdown.candidate_id,
                score = breakdown.total,
                "scored candidate"
            );
        }
        trail.push(DecisionStage::Scored);

        let viable = ranked
            .iter()
            .take_while(|breakdown| breakdown.total >= scoring.minimum_threshold)
            .count();
        let high_scoring = ranked
            .iter()
            .take_while(|breakdown| breakdown.total >= scoring.auto_apply_threshold)
            .count();
        let deterministic_prediction =
            Prediction::from_candidate(ranked[..viable].first().map(|top| &top.candidate_id));

        let mut outcome = if viable == 0 {
            no_match(&ranked, scoring)
        } else if high_scoring == 1 {
            fast_path(&ranked[0], scoring)
        } else {
            trail.push(DecisionStage::Ambiguous);
            let weights = self.router.get_weights(tenant_id, decision_type);
            let request = self.config.sanitize.build_request(
                tenant_id,
                decision_type,
                transaction,
                candidates,
                &ranked[..viable],
            );
            let verdict = self.consult(request).await;
            trail.push(DecisionStage::SecondaryConsulted);
            if let SecondaryVerdict::Unavailable(reason) = &verdict {
                tracing::warn!(
                    tenant = %tenant_id,
                    decision_type = decision_type.label(),
                    transaction = %transaction.id.0,
                    failure = reason.kind(),
                    error = %reason,
                    "secondary path unavailable; using deterministic score"
                );
            }
            ambiguous(&ranked[..viable], high_scoring, verdict, weights, scoring)
        };
        trail.push(DecisionStage::Combined);

        self.apply_high_value_gate(transaction, &mut outcome);
        trail.push(DecisionStage::Decided);

        let decision_path = match outcome.hybrid.source {
            ScoreSource::Hybrid => DecisionPath::Hybrid,
            ScoreSource::HeuristicOnly => DecisionPath::Deterministic,
        };
        let evidence = if ranked.is_empty() {
            vec![ScoreBreakdown::unmatched()]
        } else {
            ranked
        };

        let decision = Decision {
            id: DecisionId::generate(),
            tenant_id: tenant_id.clone(),
            decision_type,
            transaction_id: transaction.id.clone(),
            action: outcome.action,
            chosen_candidate_id: outcome.chosen,
            confidence: outcome.hybrid.value,
            reasoning: outcome.reasoning.join("; "),
            decision_path,
            hybrid: outcome.hybrid,
            evidence,
            escalation: outcome.escalation,
            deterministic_prediction,
            secondary_prediction: outcome.secondary_prediction,
            stage_trail: trail,
            created_at: Utc::now(),
        };

        for record in AuditRecord::for_decision(&decision) {
            self.audit.append(&record)?;
        }

        tracing::info!(
            decision = %decision.id,
            tenant = %decision.tenant_id,
            decision_type = decision.decision_type.label(),
            action = decision.action.label(),
            confidence = decision.confidence,
            path = decision.decision_path.label(),
            escalation = decision.escalation.map(EscalationReason::code),
            "decision recorded"
        );

        Ok(decision)
    }

    async fn consult(&self, request: SecondaryRequest) -> SecondaryVerdict {
        let timeout = self.config.secondary_timeout;
        let result =
            match tokio::time::timeout(timeout, self.secondary.resolve(request.clone())).await {
                Ok(result) => result,
                Err(_) => Err(SecondaryUnavailable::Timeout(timeout.as_millis() as u64)),
            };

        match result {
            Ok(resolution) if resolution.confidence > 100 => SecondaryVerdict::Unavailable(
                SecondaryUnavailable::Malformed(format!(
                    "confidence {} out of range",
                    resolution.confidence
                )),
            ),
            Ok(resolution) => match resolution.chosen_candidate_id.clone() {
                Some(id) if request.offers(&id) => SecondaryVerdict::Chose(resolution, id),
                Some(_) => SecondaryVerdict::Unavailable(SecondaryUnavailable::UnknownCandidate),
                None => SecondaryVerdict::NoMatch(resolution),
            },
            Err(reason) => SecondaryVerdict::Unavailable(reason),
        }
    }

    /// Last gate. Runs after every other rule and cannot be bypassed.
    fn apply_high_value_gate(&self, transaction: &Transaction, outcome: &mut Outcome) {
        let ceiling = self.config.high_value_ceiling_minor_units;
        if transaction.absolute_amount() < ceiling {
            return;
        }
        outcome.action = DecisionAction::Review;
        outcome.escalation = Some(EscalationReason::HighValue);
        outcome.reasoning.push(format!(
            "high value, requires human review (amount {} >= ceiling {})",
            transaction.absolute_amount(),
            ceiling
        ));
    }
}

fn validate(
    tenant_id: &TenantId,
    decision_type: DecisionType,
    transaction: &Transaction,
    candidates: &[Candidate],
) -> Result<(), DecisionError> {
    if tenant_id.is_blank() {
        return Err(DecisionError::MissingTenant);
    }
    if transaction.id.0.trim().is_empty() {
        return Err(DecisionError::InvalidInput("transaction id is blank".to_string()));
    }
    if transaction.amount_minor_units == 0 {
        return Err(DecisionError::InvalidInput(
            "transaction amount must be non-zero".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for candidate in candidates {
        if candidate.tenant_id() != tenant_id {
            return Err(DecisionError::InvalidInput(format!(
                "candidate {} belongs to another tenant",
                candidate.id()
            )));
        }
        if candidate.decision_type() != decision_type {
            return Err(DecisionError::InvalidInput(format!(
                "candidate {} does not fit decision type {}",
                candidate.id(),
                decision_type
            )));
        }
        if !seen.insert(candidate.id()) {
            return Err(DecisionError::InvalidInput(format!(
                "candidate {} supplied twice",
                candidate.id()
            )));
        }
    }
    Ok(())
}

fn no_match(ranked: &[ScoreBreakdown], scoring: ScoringConfig) -> Outcome {
    let top = ranked.first().map(|breakdown| breakdown.total).unwrap_or(0);
    let mut reasoning = vec![format!(
        "no candidate reached the minimum score of {}",
        scoring.minimum_threshold
    )];
    if let Some(best) = ranked.first() {
        reasoning.push(format!("best was {}", best.summary()));
    }
    Outcome {
        action: DecisionAction::NoMatch,
        chosen: None,
        hybrid: combine(top, None, PathWeights::DETERMINISTIC_ONLY),
        escalation: None,
        secondary_prediction: None,
        reasoning,
    }
}

fn fast_path(top: &ScoreBreakdown, scoring: ScoringConfig) -> Outcome {
    Outcome {
        action: DecisionAction::AutoApply,
        chosen: Some(top.candidate_id.clone()),
        hybrid: combine(top.total, None, PathWeights::DETERMINISTIC_ONLY),
        escalation: None,
        secondary_prediction: None,
        reasoning: vec![
            top.summary(),
            format!(
                "only candidate at or above the auto-apply threshold of {}",
                scoring.auto_apply_threshold
            ),
        ],
    }
}

/// `viable` is the ranked shortlist at or above the minimum threshold.
fn ambiguous(
    viable: &[ScoreBreakdown],
    high_scoring: usize,
    verdict: SecondaryVerdict,
    weights: PathWeights,
    scoring: ScoringConfig,
) -> Outcome {
    let top = &viable[0];
    let mut reasoning = vec![top.summary()];
    let multi_high = high_scoring > 1;
    let mid_band_contenders = viable
        .iter()
        .filter(|breakdown| breakdown.total >= scoring.ambiguity_floor)
        .count();

    let (chosen, hybrid, secondary_prediction, resolved, secondary_declined) = match verdict {
        SecondaryVerdict::Chose(resolution, id) => {
            let deterministic = viable
                .iter()
                .find(|breakdown| breakdown.candidate_id == id)
                .map(|breakdown| breakdown.total)
                .unwrap_or(0);
            let hybrid = combine(deterministic, Some(resolution.confidence), weights);
            reasoning.push(format!(
                "secondary path chose {} with confidence {}",
                id, resolution.confidence
            ));
            if resolution.is_partial_payment == Some(true) {
                reasoning.push("secondary path flagged a partial payment".to_string());
            }
            let prediction = Prediction::Candidate(id.clone());
            (Some(id), hybrid, Some(prediction), true, false)
        }
        SecondaryVerdict::NoMatch(resolution) => {
            let hybrid = combine(top.total, Some(0), weights);
            reasoning.push(format!(
                "secondary path found no match (confidence {})",
                resolution.confidence
            ));
            let resolved = !multi_high;
            (
                Some(top.candidate_id.clone()),
                hybrid,
                Some(Prediction::NoMatch),
                resolved,
                true,
            )
        }
        SecondaryVerdict::Unavailable(reason) => {
            reasoning.push(format!(
                "secondary path unavailable ({}); deterministic score used",
                reason.kind()
            ));
            let hybrid = combine(top.total, None, weights);
            (Some(top.candidate_id.clone()), hybrid, None, !multi_high, false)
        }
    };

    if hybrid.source == ScoreSource::Hybrid {
        reasoning.push(format!(
            "combined {} with weights {:.2}/{:.2}",
            hybrid.value, hybrid.weights_used.deterministic, hybrid.weights_used.secondary
        ));
    }

    if resolved && hybrid.value >= scoring.auto_apply_threshold {
        reasoning.push(format!(
            "combined confidence at or above {}",
            scoring.auto_apply_threshold
        ));
        return Outcome {
            action: DecisionAction::AutoApply,
            chosen,
            hybrid,
            escalation: None,
            secondary_prediction,
            reasoning,
        };
    }

    let escalation = if !resolved {
        reasoning.push(format!(
            "{high_scoring} candidates at or above {} without a clear winner",
            scoring.auto_apply_threshold
        ));
        EscalationReason::AmbiguousMultiMatch
    } else if secondary_declined {
        EscalationReason::SecondaryNoMatch
    } else if mid_band_contenders > 1 && secondary_prediction.is_none() {
        reasoning.push(format!(
            "{mid_band_contenders} candidates between {} and {} without a clear winner",
            scoring.ambiguity_floor, scoring.auto_apply_threshold
        ));
        EscalationReason::AmbiguousMultiMatch
    } else {
        reasoning.push(format!(
            "confidence {} below the auto-apply threshold of {}",
            hybrid.value, scoring.auto_apply_threshold
        ));
        EscalationReason::LowConfidence
    };

    Outcome {
        action: DecisionAction::Review,
        chosen,
        hybrid,
        escalation: Some(escalation),
        secondary_prediction,
        reasoning,
    }
}

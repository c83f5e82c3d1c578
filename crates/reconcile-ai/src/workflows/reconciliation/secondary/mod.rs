//! Optional external scorer consulted for ambiguous or mid-confidence cases.
//!
//! The adapter is unreliable by contract. Every failure is a [`SecondaryUnavailable`]
//! value; the decision engine turns it into "no secondary score" and carries on with the
//! deterministic path.

mod http;
mod sanitize;

pub use http::HttpSecondary;
pub use sanitize::{mask_identifiers, truncate_chars, SanitizePolicy};

use std::future::Future;

use serde::{Deserialize, Serialize};

use super::domain::{CandidateId, DecisionType, TenantId};

/// Minimized view of a transaction, safe to send off-box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedTransaction {
    pub amount_minor_units: i64,
    pub date: chrono::NaiveDate,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_name: Option<String>,
}

/// One shortlisted candidate as the external scorer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryCandidate {
    pub id: CandidateId,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_minor_units: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub deterministic_score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryRequest {
    pub tenant_id: TenantId,
    pub decision_type: DecisionType,
    pub transaction: SanitizedTransaction,
    pub candidates: Vec<SecondaryCandidate>,
}

impl SecondaryRequest {
    pub fn offers(&self, candidate_id: &CandidateId) -> bool {
        self.candidates
            .iter()
            .any(|candidate| &candidate.id == candidate_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedAllocation {
    pub candidate_id: CandidateId,
    pub amount_minor_units: i64,
}

/// Answer from the external scorer. `chosen_candidate_id == None` means it found no match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryResolution {
    #[serde(default)]
    pub chosen_candidate_id: Option<CandidateId>,
    pub confidence: u8,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_partial_payment: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_allocation: Vec<SuggestedAllocation>,
}

/// Why no secondary score is available.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecondaryUnavailable {
    #[error("secondary path disabled")]
    Disabled,
    #[error("secondary path timed out after {0} ms")]
    Timeout(u64),
    #[error("secondary path rate limited")]
    RateLimited,
    #[error("secondary path quota exhausted")]
    QuotaExhausted,
    #[error("secondary path transport failure: {0}")]
    Transport(String),
    #[error("secondary path returned a malformed response: {0}")]
    Malformed(String),
    #[error("secondary path chose a candidate that was not offered")]
    UnknownCandidate,
}

impl SecondaryUnavailable {
    pub const fn kind(&self) -> &'static str {
        match self {
            SecondaryUnavailable::Disabled => "disabled",
            SecondaryUnavailable::Timeout(_) => "timeout",
            SecondaryUnavailable::RateLimited => "rate_limited",
            SecondaryUnavailable::QuotaExhausted => "quota_exhausted",
            SecondaryUnavailable::Transport(_) => "transport",
            SecondaryUnavailable::Malformed(_) => "malformed",
            SecondaryUnavailable::UnknownCandidate => "unknown_candidate",
        }
    }
}

/// External scorer contract.
pub trait SecondaryInference: Send + Sync {
    fn resolve(
        &self,
        request: SecondaryRequest,
    ) -> impl Future<Output = Result<SecondaryResolution, SecondaryUnavailable>> + Send;
}

/// Adapter used when no external scorer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSecondary;

impl SecondaryInference for DisabledSecondary {
    async fn resolve(
        &self,
        _request: SecondaryRequest,
    ) -> Result<SecondaryResolution, SecondaryUnavailable> {
        Err(SecondaryUnavailable::Disabled)
    }
}

/// Runtime choice between the HTTP adapter and no secondary path at all.
pub enum ConfiguredSecondary {
    Disabled(DisabledSecondary),
    Http(HttpSecondary),
}

impl SecondaryInference for ConfiguredSecondary {
    async fn resolve(
        &self,
        request: SecondaryRequest,
    ) -> Result<SecondaryResolution, SecondaryUnavailable> {
        match self {
            ConfiguredSecondary::Disabled(inner) => inner.resolve(request).await,
            ConfiguredSecondary::Http(inner) => inner.resolve(request).await,
        }
    }
}

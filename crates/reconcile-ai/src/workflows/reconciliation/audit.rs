//! Append-only audit and escalation log.
//!
//! One line per decision and one more per escalation. Lines carry identifying keys,
//! factor scores and the outcome. They never carry descriptions or counterparty names.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::combiner::ScoreSource;
use super::domain::{CandidateId, DecisionId, DecisionPath, DecisionType, TenantId, TransactionId};
use super::engine::{Decision, DecisionAction, EscalationReason};
use super::jsonl::{JsonLinesFile, ReplayError};

/// Factor scores for one candidate, keyed by factor label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateScores {
    pub candidate_id: CandidateId,
    pub factors: BTreeMap<String, i16>,
    pub total: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    Decision {
        timestamp: DateTime<Utc>,
        decision_id: DecisionId,
        tenant_id: TenantId,
        decision_type: DecisionType,
        transaction_id: TransactionId,
        scores: Vec<CandidateScores>,
        deterministic_score: u8,
        secondary_score: Option<u8>,
        source: ScoreSource,
        path: DecisionPath,
        action: DecisionAction,
        chosen_candidate_id: Option<CandidateId>,
        confidence: u8,
    },
    Escalation {
        timestamp: DateTime<Utc>,
        decision_id: DecisionId,
        tenant_id: TenantId,
        decision_type: DecisionType,
        transaction_id: TransactionId,
        reason_code: EscalationReason,
        confidence: u8,
        reasoning: String,
    },
}

impl AuditRecord {
    /// Lines to append for a terminal decision: always one, two when escalated.
    pub fn for_decision(decision: &Decision) -> Vec<AuditRecord> {
        let scores = decision
            .evidence
            .iter()
            .map(|breakdown| CandidateScores {
                candidate_id: breakdown.candidate_id.clone(),
                factors: breakdown
                    .components
                    .iter()
                    .map(|component| (component.factor.label().to_string(), component.points))
                    .collect(),
                total: breakdown.total,
            })
            .collect();

        let mut records = vec![AuditRecord::Decision {
            timestamp: decision.created_at,
            decision_id: decision.id.clone(),
            tenant_id: decision.tenant_id.clone(),
            decision_type: decision.decision_type,
            transaction_id: decision.transaction_id.clone(),
            scores,
            deterministic_score: decision.hybrid.deterministic_score,
            secondary_score: decision.hybrid.secondary_score,
            source: decision.hybrid.source,
            path: decision.decision_path,
            action: decision.action,
            chosen_candidate_id: decision.chosen_candidate_id.clone(),
            confidence: decision.confidence,
        }];

        if let Some(reason) = decision.escalation {
            records.push(AuditRecord::Escalation {
                timestamp: decision.created_at,
                decision_id: decision.id.clone(),
                tenant_id: decision.tenant_id.clone(),
                decision_type: decision.decision_type,
                transaction_id: decision.transaction_id.clone(),
                reason_code: reason,
                confidence: decision.confidence,
                reasoning: decision.reasoning.clone(),
            });
        }

        records
    }

    pub fn decision_id(&self) -> &DecisionId {
        match self {
            AuditRecord::Decision { decision_id, .. } => decision_id,
            AuditRecord::Escalation { decision_id, .. } => decision_id,
        }
    }
}

/// Write-once record store. Records are appended and never updated or deleted.
pub trait AuditLog: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit record serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("audit log unavailable: {0}")]
    Unavailable(String),
    #[error("audit log {path} line {line} is corrupt: {details}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        details: String,
    },
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit log mutex poisoned").clone()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .expect("audit log mutex poisoned")
            .push(record.clone());
        Ok(())
    }
}

/// JSON-lines file opened in append mode; every write is synced before returning.
#[derive(Debug)]
pub struct JsonLinesAuditLog {
    log: JsonLinesFile,
}

impl JsonLinesAuditLog {
    /// Open the log, checking existing lines and cutting off a torn final line.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref();
        let (log, _) = JsonLinesFile::open::<IgnoredAny>(path).map_err(|err| match err {
            ReplayError::Io(err) => AuditError::Io(err),
            ReplayError::Corrupt { line, details } => AuditError::Corrupt {
                path: path.to_path_buf(),
                line,
                details,
            },
        })?;
        Ok(Self { log })
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }
}

impl AuditLog for JsonLinesAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(record)?;
        self.log.append_line(&line)?;
        Ok(())
    }
}

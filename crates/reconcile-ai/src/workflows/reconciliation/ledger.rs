//! Decision ledger: the correction-relevant slice of every decision, plus the human
//! correction once one arrives.
//!
//! Evidence and reasoning live in the audit log; the ledger keeps only what a correction
//! needs. The in-memory index is bounded and evicts the oldest decisions first.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    CandidateId, DecisionId, DecisionPath, DecisionType, Prediction, TenantId, TransactionId,
};
use super::engine::{Decision, DecisionAction};
use super::jsonl::{JsonLinesFile, ReplayError};

pub const DEFAULT_LEDGER_CAPACITY: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: DecisionId,
    pub tenant_id: TenantId,
    pub decision_type: DecisionType,
    pub transaction_id: TransactionId,
    pub action: DecisionAction,
    pub chosen_candidate_id: Option<CandidateId>,
    pub confidence: u8,
    pub decision_path: DecisionPath,
    pub deterministic_prediction: Prediction,
    pub secondary_prediction: Option<Prediction>,
    pub created_at: DateTime<Utc>,
}

impl From<&Decision> for LedgerRecord {
    fn from(decision: &Decision) -> Self {
        Self {
            id: decision.id.clone(),
            tenant_id: decision.tenant_id.clone(),
            decision_type: decision.decision_type,
            transaction_id: decision.transaction_id.clone(),
            action: decision.action,
            chosen_candidate_id: decision.chosen_candidate_id.clone(),
            confidence: decision.confidence,
            decision_path: decision.decision_path,
            deterministic_prediction: decision.deterministic_prediction.clone(),
            secondary_prediction: decision.secondary_prediction.clone(),
            created_at: decision.created_at,
        }
    }
}

/// Stored decision plus the human correction, once one arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub record: LedgerRecord,
    pub correction: Option<Prediction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    Recorded,
    AlreadyRecorded,
}

/// Write-once decision store. Decisions are never updated; a correction is claimed
/// exactly once and a conflicting second correction is refused.
pub trait DecisionLedger: Send + Sync {
    fn insert(&self, record: LedgerRecord) -> Result<(), LedgerError>;
    fn fetch(&self, id: &DecisionId) -> Result<Option<LedgerEntry>, LedgerError>;
    /// Atomically attach `corrected` unless a correction is already present.
    fn record_correction(
        &self,
        id: &DecisionId,
        corrected: &Prediction,
    ) -> Result<CorrectionStatus, LedgerError>;
    /// Undo a claim from `record_correction` whose follow-up work failed.
    fn release_correction(
        &self,
        id: &DecisionId,
        corrected: &Prediction,
    ) -> Result<(), LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("decision already recorded")]
    Conflict,
    #[error("decision already corrected with a different outcome")]
    CorrectionConflict,
    #[error("decision not found")]
    NotFound,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("ledger io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("ledger log {path} line {line} is corrupt: {details}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        details: String,
    },
}

#[derive(Debug)]
struct LedgerIndex {
    entries: HashMap<DecisionId, LedgerEntry>,
    order: VecDeque<DecisionId>,
    capacity: usize,
}

impl LedgerIndex {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, record: LedgerRecord) -> Result<(), LedgerError> {
        if self.entries.contains_key(&record.id) {
            return Err(LedgerError::Conflict);
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(record.id.clone());
        self.entries.insert(
            record.id.clone(),
            LedgerEntry {
                record,
                correction: None,
            },
        );
        Ok(())
    }

    fn remove(&mut self, id: &DecisionId) {
        if self.entries.remove(id).is_some() {
            self.order.retain(|queued| queued != id);
        }
    }

    fn claim(
        &mut self,
        id: &DecisionId,
        corrected: &Prediction,
    ) -> Result<CorrectionStatus, LedgerError> {
        let entry = self.entries.get_mut(id).ok_or(LedgerError::NotFound)?;
        match &entry.correction {
            None => {
                entry.correction = Some(corrected.clone());
                Ok(CorrectionStatus::Recorded)
            }
            Some(existing) if existing == corrected => Ok(CorrectionStatus::AlreadyRecorded),
            Some(_) => Err(LedgerError::CorrectionConflict),
        }
    }

    fn release(&mut self, id: &DecisionId, corrected: &Prediction) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.correction.as_ref() == Some(corrected) => {
                entry.correction = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryDecisionLedger {
    index: Arc<Mutex<LedgerIndex>>,
}

impl Default for InMemoryDecisionLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }
}

impl InMemoryDecisionLedger {
    /// Keep at most `capacity` decisions; older ones are evicted first.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: Arc::new(Mutex::new(LedgerIndex::new(capacity))),
        }
    }

    pub fn len(&self) -> usize {
        self.index.lock().expect("ledger mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecisionLedger for InMemoryDecisionLedger {
    fn insert(&self, record: LedgerRecord) -> Result<(), LedgerError> {
        self.index.lock().expect("ledger mutex poisoned").insert(record)
    }

    fn fetch(&self, id: &DecisionId) -> Result<Option<LedgerEntry>, LedgerError> {
        let guard = self.index.lock().expect("ledger mutex poisoned");
        Ok(guard.entries.get(id).cloned())
    }

    fn record_correction(
        &self,
        id: &DecisionId,
        corrected: &Prediction,
    ) -> Result<CorrectionStatus, LedgerError> {
        self.index
            .lock()
            .expect("ledger mutex poisoned")
            .claim(id, corrected)
    }

    fn release_correction(
        &self,
        id: &DecisionId,
        corrected: &Prediction,
    ) -> Result<(), LedgerError> {
        self.index
            .lock()
            .expect("ledger mutex poisoned")
            .release(id, corrected);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LedgerEvent {
    Decided(LedgerRecord),
    Corrected {
        decision_id: DecisionId,
        outcome: Prediction,
    },
    Released {
        decision_id: DecisionId,
        outcome: Prediction,
    },
}

/// Durable ledger: decisions and corrections are appended as events and replayed into a
/// bounded index on open.
#[derive(Debug)]
pub struct JsonLinesDecisionLedger {
    log: JsonLinesFile,
    index: Mutex<LedgerIndex>,
}

impl JsonLinesDecisionLedger {
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let (log, events) =
            JsonLinesFile::open::<LedgerEvent>(path).map_err(|err| match err {
                ReplayError::Io(err) => LedgerError::Io(err),
                ReplayError::Corrupt { line, details } => LedgerError::Corrupt {
                    path: path.to_path_buf(),
                    line,
                    details,
                },
            })?;

        let mut index = LedgerIndex::new(capacity);
        let replayed = events.len();
        for event in events {
            match event {
                LedgerEvent::Decided(record) => {
                    let id = record.id.clone();
                    if index.insert(record).is_err() {
                        tracing::warn!(decision = %id, "duplicate decision in ledger log");
                    }
                }
                // Corrections for evicted decisions fall away with them.
                LedgerEvent::Corrected {
                    decision_id,
                    outcome,
                } => {
                    let _ = index.claim(&decision_id, &outcome);
                }
                LedgerEvent::Released {
                    decision_id,
                    outcome,
                } => {
                    index.release(&decision_id, &outcome);
                }
            }
        }
        tracing::info!(
            path = %path.display(),
            events = replayed,
            retained = index.entries.len(),
            "decision ledger replayed"
        );

        Ok(Self {
            log,
            index: Mutex::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    pub fn len(&self) -> usize {
        self.index.lock().expect("ledger mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self, event: &LedgerEvent) -> Result<(), LedgerError> {
        let line = serde_json::to_string(event)?;
        self.log.append_line(&line)?;
        Ok(())
    }
}

impl DecisionLedger for JsonLinesDecisionLedger {
    fn insert(&self, record: LedgerRecord) -> Result<(), LedgerError> {
        let mut index = self.index.lock().expect("ledger mutex poisoned");
        let id = record.id.clone();
        let event = LedgerEvent::Decided(record.clone());
        index.insert(record)?;
        if let Err(err) = self.write(&event) {
            index.remove(&id);
            return Err(err);
        }
        Ok(())
    }

    fn fetch(&self, id: &DecisionId) -> Result<Option<LedgerEntry>, LedgerError> {
        let index = self.index.lock().expect("ledger mutex poisoned");
        Ok(index.entries.get(id).cloned())
    }

    fn record_correction(
        &self,
        id: &DecisionId,
        corrected: &Prediction,
    ) -> Result<CorrectionStatus, LedgerError> {
        let mut index = self.index.lock().expect("ledger mutex poisoned");
        let status = index.claim(id, corrected)?;
        if status == CorrectionStatus::Recorded {
            let event = LedgerEvent::Corrected {
                decision_id: id.clone(),
                outcome: corrected.clone(),
            };
            if let Err(err) = self.write(&event) {
                index.release(id, corrected);
                return Err(err);
            }
        }
        Ok(status)
    }

    fn release_correction(
        &self,
        id: &DecisionId,
        corrected: &Prediction,
    ) -> Result<(), LedgerError> {
        let mut index = self.index.lock().expect("ledger mutex poisoned");
        if index.release(id, corrected) {
            self.write(&LedgerEvent::Released {
                decision_id: id.clone(),
                outcome: corrected.clone(),
            })?;
        }
        Ok(())
    }
}

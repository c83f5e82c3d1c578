use super::common::*;
use std::sync::Arc;

use crate::workflows::reconciliation::accuracy::InMemoryAccuracyStore;
use crate::workflows::reconciliation::domain::{
    Candidate, CandidateId, DecisionId, DecisionType, Prediction,
};
use crate::workflows::reconciliation::ledger::{
    CorrectionStatus, DecisionLedger, InMemoryDecisionLedger, JsonLinesDecisionLedger,
    LedgerError, LedgerRecord,
};
use crate::workflows::reconciliation::secondary::SecondaryUnavailable;
use crate::workflows::reconciliation::service::{Correction, ServiceError};

async fn record(id: &str) -> LedgerRecord {
    let harness = engine(FakeSecondary::failing(SecondaryUnavailable::Disabled));
    let decision = harness
        .engine
        .decide(
            &tenant(),
            DecisionType::InvoiceMatch,
            &exact_payment(),
            &[Candidate::Invoice(exact_invoice())],
        )
        .await
        .expect("decision");
    let mut record = LedgerRecord::from(&decision);
    record.id = DecisionId(id.to_string());
    record
}

fn matched() -> Prediction {
    Prediction::Candidate(CandidateId("inv-1042".to_string()))
}

#[tokio::test]
async fn in_memory_index_evicts_the_oldest_decisions() {
    let ledger = InMemoryDecisionLedger::with_capacity(2);
    for id in ["d-1", "d-2", "d-3"] {
        ledger.insert(record(id).await).expect("insert");
    }

    assert_eq!(ledger.len(), 2);
    assert!(ledger
        .fetch(&DecisionId("d-1".to_string()))
        .expect("fetch")
        .is_none());
    assert!(matches!(
        ledger.record_correction(&DecisionId("d-1".to_string()), &matched()),
        Err(LedgerError::NotFound)
    ));
    assert!(ledger
        .fetch(&DecisionId("d-3".to_string()))
        .expect("fetch")
        .is_some());
}

#[tokio::test]
async fn released_claims_can_be_reclaimed_with_another_outcome() {
    let ledger = InMemoryDecisionLedger::default();
    let id = DecisionId("d-1".to_string());
    ledger.insert(record("d-1").await).expect("insert");

    assert_eq!(
        ledger.record_correction(&id, &matched()).expect("claim"),
        CorrectionStatus::Recorded
    );
    ledger
        .release_correction(&id, &Prediction::NoMatch)
        .expect("release of another outcome is ignored");
    assert!(matches!(
        ledger.record_correction(&id, &Prediction::NoMatch),
        Err(LedgerError::CorrectionConflict)
    ));

    ledger.release_correction(&id, &matched()).expect("release");
    assert_eq!(
        ledger
            .record_correction(&id, &Prediction::NoMatch)
            .expect("reclaim"),
        CorrectionStatus::Recorded
    );
}

#[tokio::test]
async fn json_lines_ledger_keeps_decisions_and_corrections_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.jsonl");
    let corrected = DecisionId("d-1".to_string());
    let released = DecisionId("d-2".to_string());
    {
        let ledger = JsonLinesDecisionLedger::open(&path, 100).expect("open ledger");
        ledger.insert(record("d-1").await).expect("insert");
        ledger.insert(record("d-2").await).expect("insert");
        ledger
            .record_correction(&corrected, &matched())
            .expect("claim");
        ledger
            .record_correction(&released, &matched())
            .expect("claim");
        ledger
            .release_correction(&released, &matched())
            .expect("release");
    }

    let ledger = JsonLinesDecisionLedger::open(&path, 100).expect("reopen ledger");
    assert_eq!(ledger.len(), 2);
    let entry = ledger
        .fetch(&corrected)
        .expect("fetch")
        .expect("decision survives restart");
    assert_eq!(entry.correction, Some(matched()));
    assert!(matches!(
        ledger.record_correction(&corrected, &Prediction::NoMatch),
        Err(LedgerError::CorrectionConflict)
    ));
    assert_eq!(
        ledger.fetch(&released).expect("fetch").expect("entry").correction,
        None
    );
    assert!(matches!(
        ledger.insert(record("d-1").await),
        Err(LedgerError::Conflict)
    ));

    let raw = std::fs::read_to_string(&path).expect("read ledger");
    assert_eq!(raw.lines().count(), 5);
    assert!(!raw.contains("Jane Doe"));
    assert!(!raw.contains("evidence"));
}

#[tokio::test]
async fn json_lines_ledger_replays_into_a_bounded_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.jsonl");
    {
        let ledger = JsonLinesDecisionLedger::open(&path, 10).expect("open ledger");
        for id in ["d-1", "d-2", "d-3"] {
            ledger.insert(record(id).await).expect("insert");
        }
        ledger
            .record_correction(&DecisionId("d-1".to_string()), &matched())
            .expect("claim");
    }

    let ledger = JsonLinesDecisionLedger::open(&path, 2).expect("reopen ledger");
    assert_eq!(ledger.len(), 2);
    assert!(ledger
        .fetch(&DecisionId("d-1".to_string()))
        .expect("fetch")
        .is_none());
}

#[tokio::test]
async fn torn_ledger_event_is_dropped_on_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.jsonl");
    {
        let ledger = JsonLinesDecisionLedger::open(&path, 10).expect("open ledger");
        ledger.insert(record("d-1").await).expect("insert");
    }
    let mut raw = std::fs::read_to_string(&path).expect("read ledger");
    raw.push_str("{\"event\":\"corrected\",\"decision_id\":\"d-");
    std::fs::write(&path, raw).expect("write torn event");

    let ledger = JsonLinesDecisionLedger::open(&path, 10).expect("torn tail is recovered");
    let entry = ledger
        .fetch(&DecisionId("d-1".to_string()))
        .expect("fetch")
        .expect("entry");
    assert_eq!(entry.correction, None);
}

#[tokio::test]
async fn service_corrections_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.jsonl");
    let accuracy = || Arc::new(InMemoryAccuracyStore::default());

    let decision = {
        let ledger = Arc::new(JsonLinesDecisionLedger::open(&path, 100).expect("open ledger"));
        let service = service_with(
            FakeSecondary::failing(SecondaryUnavailable::Disabled),
            accuracy(),
            ledger,
        );
        service
            .decide(&tenant(), DecisionType::InvoiceMatch, &exact_payment())
            .await
            .expect("decision")
    };

    let ledger = Arc::new(JsonLinesDecisionLedger::open(&path, 100).expect("reopen ledger"));
    let service = service_with(
        FakeSecondary::failing(SecondaryUnavailable::Disabled),
        accuracy(),
        ledger,
    );
    let correction = |outcome: Option<&str>| Correction {
        tenant_id: tenant(),
        decision_id: decision.id.clone(),
        corrected_outcome: outcome.map(|id| CandidateId(id.to_string())),
    };

    let receipt = service
        .correct(correction(Some("inv-1042")))
        .expect("correction after restart");
    assert_eq!(receipt.status, CorrectionStatus::Recorded);
    assert!(receipt.outcome.deterministic_correct);
    assert!(matches!(
        service.correct(correction(None)),
        Err(ServiceError::Ledger(LedgerError::CorrectionConflict))
    ));
}

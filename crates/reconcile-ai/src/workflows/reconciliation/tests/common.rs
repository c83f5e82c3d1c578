use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::reconciliation::accuracy::{
    AccuracyConfig, AccuracyStore, AccuracyTracker, InMemoryAccuracyStore,
};
use crate::workflows::reconciliation::audit::{AuditError, AuditLog, AuditRecord, InMemoryAuditLog};
use crate::workflows::reconciliation::candidates::InMemoryCandidateSource;
use crate::workflows::reconciliation::domain::{
    AccountEntry, AmountRange, Candidate, CandidateId, OpenInvoice, TenantId, Transaction,
    TransactionId,
};
use crate::workflows::reconciliation::engine::{DecisionEngine, EngineConfig};
use crate::workflows::reconciliation::ledger::{DecisionLedger, InMemoryDecisionLedger};
use crate::workflows::reconciliation::path_router::PathRouter;
use crate::workflows::reconciliation::secondary::{
    SecondaryInference, SecondaryRequest, SecondaryResolution, SecondaryUnavailable,
};
use crate::workflows::reconciliation::service::{ReconciliationService, ReconciliationSettings};

pub(super) const TENANT: &str = "sunbeam-nursery";

pub(super) fn tenant() -> TenantId {
    TenantId(TENANT.to_string())
}

pub(super) fn payment(
    id: &str,
    amount: i64,
    reference: Option<&str>,
    counterparty: Option<&str>,
    description: &str,
) -> Transaction {
    Transaction {
        id: TransactionId(id.to_string()),
        amount_minor_units: amount,
        date: NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid date"),
        description: description.to_string(),
        reference: reference.map(str::to_string),
        counterparty_name: counterparty.map(str::to_string),
    }
}

pub(super) fn invoice(
    id: &str,
    outstanding: i64,
    reference: &str,
    parties: &[&str],
) -> OpenInvoice {
    OpenInvoice {
        id: CandidateId(id.to_string()),
        tenant_id: tenant(),
        outstanding_amount_minor_units: outstanding,
        reference: reference.to_string(),
        parties: parties.iter().map(|party| party.to_string()).collect(),
    }
}

pub(super) fn account(
    code: &str,
    keywords: &[&str],
    strength: f32,
    precedents: u32,
    range: Option<(i64, i64)>,
) -> AccountEntry {
    AccountEntry {
        code: CandidateId(code.to_string()),
        tenant_id: tenant(),
        name: format!("Account {code}"),
        keywords: keywords.iter().map(|keyword| keyword.to_string()).collect(),
        pattern_strength: strength,
        precedent_count: precedents,
        typical_amount_range: range.map(|(min, max)| AmountRange {
            min_minor_units: min,
            max_minor_units: max,
        }),
    }
}

/// Payment that scores 100 against `exact_invoice()`.
pub(super) fn exact_payment() -> Transaction {
    payment(
        "tx-exact",
        45_000,
        Some("INV-1042"),
        Some("Jane Doe"),
        "FASTER PAYMENT INV-1042",
    )
}

pub(super) fn exact_invoice() -> OpenInvoice {
    invoice("inv-1042", 45_000, "INV-1042", &["Jane Doe", "Milo Doe"])
}

/// Payment naming two invoices; each scores 85 (substring 30, amount 35, name 20).
pub(super) fn twin_payment() -> Transaction {
    payment(
        "tx-twin",
        45_000,
        None,
        Some("Jane Doe"),
        "FEES INV-2001 INV-2002",
    )
}

pub(super) fn twin_invoices() -> Vec<Candidate> {
    vec![
        Candidate::Invoice(invoice("inv-2001", 45_100, "INV-2001", &["Jane Doe"])),
        Candidate::Invoice(invoice("inv-2002", 45_100, "INV-2002", &["Jane Doe"])),
    ]
}

/// Scripted stand-in for the external scorer.
pub(super) enum Script {
    Answer(SecondaryResolution),
    Fail(SecondaryUnavailable),
    Hang(Duration),
}

pub(super) struct FakeSecondary {
    script: Script,
    calls: AtomicUsize,
    last_request: Mutex<Option<SecondaryRequest>>,
}

impl FakeSecondary {
    pub(super) fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub(super) fn choosing(candidate: &str, confidence: u8) -> Self {
        Self::new(Script::Answer(resolution(Some(candidate), confidence)))
    }

    pub(super) fn failing(reason: SecondaryUnavailable) -> Self {
        Self::new(Script::Fail(reason))
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn last_request(&self) -> Option<SecondaryRequest> {
        self.last_request
            .lock()
            .expect("fake secondary mutex poisoned")
            .clone()
    }
}

impl SecondaryInference for FakeSecondary {
    async fn resolve(
        &self,
        request: SecondaryRequest,
    ) -> Result<SecondaryResolution, SecondaryUnavailable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_request
            .lock()
            .expect("fake secondary mutex poisoned") = Some(request);

        match &self.script {
            Script::Answer(resolution) => Ok(resolution.clone()),
            Script::Fail(reason) => Err(reason.clone()),
            Script::Hang(duration) => {
                tokio::time::sleep(*duration).await;
                Err(SecondaryUnavailable::Transport("woke after hang".to_string()))
            }
        }
    }
}

pub(super) fn resolution(candidate: Option<&str>, confidence: u8) -> SecondaryResolution {
    SecondaryResolution {
        chosen_candidate_id: candidate.map(|id| CandidateId(id.to_string())),
        confidence,
        reasoning: "scripted".to_string(),
        is_partial_payment: None,
        suggested_allocation: Vec::new(),
    }
}

pub(super) struct FailingAuditLog;

impl AuditLog for FailingAuditLog {
    fn append(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("disk full".to_string()))
    }
}

pub(super) fn tracker() -> Arc<AccuracyTracker> {
    Arc::new(AccuracyTracker::new(
        Arc::new(InMemoryAccuracyStore::default()),
        AccuracyConfig::default(),
    ))
}

pub(super) struct EngineHarness {
    pub(super) engine: DecisionEngine<FakeSecondary>,
    pub(super) secondary: Arc<FakeSecondary>,
    pub(super) audit: Arc<InMemoryAuditLog>,
}

pub(super) fn engine_with(secondary: FakeSecondary, config: EngineConfig) -> EngineHarness {
    let secondary = Arc::new(secondary);
    let audit = Arc::new(InMemoryAuditLog::default());
    let router = Arc::new(PathRouter::new(tracker(), Duration::from_secs(60)));
    let engine = DecisionEngine::new(secondary.clone(), router, audit.clone(), config);
    EngineHarness {
        engine,
        secondary,
        audit,
    }
}

pub(super) fn engine(secondary: FakeSecondary) -> EngineHarness {
    engine_with(secondary, EngineConfig::default())
}

pub(super) type TestService = ReconciliationService<InMemoryCandidateSource, FakeSecondary>;

pub(super) struct ServiceHarness {
    pub(super) service: TestService,
    pub(super) source: Arc<InMemoryCandidateSource>,
    pub(super) secondary: Arc<FakeSecondary>,
    pub(super) audit: Arc<InMemoryAuditLog>,
    pub(super) ledger: Arc<InMemoryDecisionLedger>,
}

pub(super) fn seeded_source() -> Arc<InMemoryCandidateSource> {
    let source = Arc::new(InMemoryCandidateSource::default());
    source.add_invoice(exact_invoice());
    source.add_invoice(invoice("inv-2001", 45_100, "INV-2001", &["Jane Doe"]));
    source.add_invoice(invoice("inv-2002", 45_100, "INV-2002", &["Jane Doe"]));
    source.add_account(account(
        "6100",
        &["tesco", "sainsbury"],
        0.9,
        3,
        Some((2_000, 20_000)),
    ));
    source.add_account(account("7200", &["shell"], 0.8, 0, None));
    source
}

/// Service over the seeded source with caller-chosen stores.
pub(super) fn service_with(
    secondary: FakeSecondary,
    accuracy: Arc<dyn AccuracyStore>,
    ledger: Arc<dyn DecisionLedger>,
) -> TestService {
    ReconciliationService::new(
        seeded_source(),
        Arc::new(secondary),
        Arc::new(InMemoryAuditLog::default()),
        accuracy,
        ledger,
        ReconciliationSettings::default(),
    )
}

pub(super) fn service(secondary: FakeSecondary) -> ServiceHarness {
    let source = seeded_source();
    let secondary = Arc::new(secondary);
    let audit = Arc::new(InMemoryAuditLog::default());
    let ledger = Arc::new(InMemoryDecisionLedger::default());
    let service = ReconciliationService::new(
        source.clone(),
        secondary.clone(),
        audit.clone(),
        Arc::new(InMemoryAccuracyStore::default()),
        ledger.clone(),
        ReconciliationSettings::default(),
    );

    ServiceHarness {
        service,
        source,
        secondary,
        audit,
        ledger,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

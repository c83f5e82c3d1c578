use metrics_exporter_prometheus::PrometheusHandle;
use reconcile_ai::config::{AppConfig, SecondaryConfig};
use reconcile_ai::error::AppError;
use reconcile_ai::workflows::reconciliation::{
    AccuracyStore, AuditLog, CandidateFixture, ConfiguredSecondary, DecisionLedger,
    DecisionType, DisabledSecondary, HttpSecondary, InMemoryAccuracyStore, InMemoryAuditLog,
    InMemoryCandidateSource, InMemoryDecisionLedger, JsonLinesAccuracyStore, JsonLinesAuditLog,
    JsonLinesDecisionLedger, ReconciliationService,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) type AppService = ReconciliationService<InMemoryCandidateSource, ConfiguredSecondary>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire the reconciliation service from configuration. `candidates` overrides
/// `CANDIDATES_PATH` when given.
pub(crate) fn build_service(
    config: &AppConfig,
    candidates: Option<&Path>,
) -> Result<AppService, AppError> {
    let candidates_path = candidates.or(config.storage.candidates_path.as_deref());
    let source = Arc::new(load_candidates(candidates_path)?);
    let secondary = Arc::new(secondary_adapter(&config.secondary)?);

    let audit: Arc<dyn AuditLog> = match &config.storage.audit_log_path {
        Some(path) => Arc::new(JsonLinesAuditLog::open(path)?),
        None => {
            warn!("AUDIT_LOG_PATH not set; audit records are kept in memory only");
            Arc::new(InMemoryAuditLog::default())
        }
    };
    let accuracy: Arc<dyn AccuracyStore> = match &config.storage.accuracy_log_path {
        Some(path) => Arc::new(JsonLinesAccuracyStore::open(path)?),
        None => Arc::new(InMemoryAccuracyStore::default()),
    };
    let capacity = config.storage.ledger_capacity;
    let ledger: Arc<dyn DecisionLedger> = match &config.storage.ledger_log_path {
        Some(path) => Arc::new(JsonLinesDecisionLedger::open(path, capacity)?),
        None => {
            warn!("LEDGER_LOG_PATH not set; corrections only reach decisions made since start");
            Arc::new(InMemoryDecisionLedger::with_capacity(capacity))
        }
    };

    Ok(ReconciliationService::new(
        source,
        secondary,
        audit,
        accuracy,
        ledger,
        config.reconciliation_settings(),
    ))
}

pub(crate) fn load_candidates(path: Option<&Path>) -> Result<InMemoryCandidateSource, AppError> {
    let Some(path) = path else {
        return Ok(InMemoryCandidateSource::default());
    };
    let reader = BufReader::new(File::open(path)?);
    let fixture: CandidateFixture = serde_json::from_reader(reader)?;
    info!(
        path = %path.display(),
        invoices = fixture.invoices.len(),
        accounts = fixture.accounts.len(),
        "loaded candidate fixture"
    );
    Ok(InMemoryCandidateSource::from_fixture(fixture))
}

pub(crate) fn secondary_adapter(config: &SecondaryConfig) -> Result<ConfiguredSecondary, AppError> {
    match &config.endpoint {
        Some(endpoint) => {
            let adapter =
                HttpSecondary::new(endpoint.clone(), config.api_key.clone(), config.timeout)?;
            info!(endpoint = adapter.endpoint(), "secondary inference enabled");
            Ok(ConfiguredSecondary::Http(adapter))
        }
        None => {
            info!("SECONDARY_ENDPOINT not set; ambiguous cases go straight to review");
            Ok(ConfiguredSecondary::Disabled(DisabledSecondary))
        }
    }
}

pub(crate) fn parse_decision_type(raw: &str) -> Result<DecisionType, String> {
    DecisionType::parse(raw).ok_or_else(|| {
        format!("unknown decision type '{raw}' (use invoice_match or categorization)")
    })
}

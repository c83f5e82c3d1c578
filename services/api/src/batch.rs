use crate::infra::{build_service, parse_decision_type};
use chrono::{DateTime, Utc};
use clap::Args;
use reconcile_ai::config::AppConfig;
use reconcile_ai::error::AppError;
use reconcile_ai::telemetry;
use reconcile_ai::workflows::reconciliation::{
    parse_transactions, AccuracyConfig, AccuracyStats, AccuracyTracker, Decision,
    DecisionAction, DecisionType, JsonLinesAccuracyStore, PathRouter, PathWeights, TenantId,
    TransactionId,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub(crate) struct DecideArgs {
    /// Bank statement CSV with columns id,date,amount,description,reference,counterparty
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Tenant that owns the statement and candidates
    #[arg(long)]
    pub(crate) tenant: String,
    /// invoice_match or categorization
    #[arg(long = "type", value_parser = parse_decision_type, default_value = "invoice_match")]
    pub(crate) decision_type: DecisionType,
    /// JSON candidate fixture (invoices and accounts). Defaults to CANDIDATES_PATH.
    #[arg(long)]
    pub(crate) candidates: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct AccuracyArgs {
    /// JSON-lines accuracy log written by the service
    #[arg(long)]
    pub(crate) log: PathBuf,
    #[arg(long)]
    pub(crate) tenant: String,
    /// invoice_match or categorization
    #[arg(long = "type", value_parser = parse_decision_type, default_value = "invoice_match")]
    pub(crate) decision_type: DecisionType,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchReport {
    pub(crate) generated_at: DateTime<Utc>,
    pub(crate) tenant_id: TenantId,
    pub(crate) decision_type: DecisionType,
    pub(crate) summary: BatchSummary,
    pub(crate) decisions: Vec<Decision>,
    pub(crate) failures: Vec<BatchFailure>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub(crate) struct BatchSummary {
    pub(crate) auto_applied: usize,
    pub(crate) review: usize,
    pub(crate) no_match: usize,
    pub(crate) failed: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchFailure {
    pub(crate) transaction_id: TransactionId,
    pub(crate) error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AccuracyReport {
    #[serde(flatten)]
    pub(crate) stats: AccuracyStats,
    pub(crate) weights: PathWeights,
}

pub(crate) async fn run_decide(args: DecideArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let report = decide_statement(&config, args).await?;

    info!(
        auto_applied = report.summary.auto_applied,
        review = report.summary.review,
        no_match = report.summary.no_match,
        failed = report.summary.failed,
        "statement decided"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub(crate) async fn decide_statement(
    config: &AppConfig,
    args: DecideArgs,
) -> Result<BatchReport, AppError> {
    let DecideArgs {
        csv,
        tenant,
        decision_type,
        candidates,
    } = args;

    let transactions = parse_transactions(BufReader::new(File::open(&csv)?))?;
    let service = build_service(config, candidates.as_deref())?;
    let tenant_id = TenantId(tenant);

    let results = service
        .decide_batch(&tenant_id, decision_type, &transactions)
        .await;

    let mut summary = BatchSummary::default();
    let mut decisions = Vec::new();
    let mut failures = Vec::new();
    for (transaction, result) in transactions.iter().zip(results) {
        match result {
            Ok(decision) => {
                match decision.action {
                    DecisionAction::AutoApply => summary.auto_applied += 1,
                    DecisionAction::Review => summary.review += 1,
                    DecisionAction::NoMatch => summary.no_match += 1,
                }
                decisions.push(decision);
            }
            Err(err) => {
                summary.failed += 1;
                failures.push(BatchFailure {
                    transaction_id: transaction.id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(BatchReport {
        generated_at: Utc::now(),
        tenant_id,
        decision_type,
        summary,
        decisions,
        failures,
    })
}

pub(crate) fn run_accuracy_report(args: AccuracyArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let report = accuracy_report(&args, config.accuracy)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub(crate) fn accuracy_report(
    args: &AccuracyArgs,
    config: AccuracyConfig,
) -> Result<AccuracyReport, AppError> {
    let store = Arc::new(JsonLinesAccuracyStore::snapshot(&args.log)?);
    let tracker = AccuracyTracker::new(store, config);
    let stats = tracker.get_accuracy(&TenantId(args.tenant.clone()), args.decision_type)?;
    let weights = PathRouter::preset(stats.recommendation);
    Ok(AccuracyReport { stats, weights })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_ai::config::{
        AppEnvironment, DecisionConfig, SecondaryConfig, ServerConfig, StorageConfig,
        TelemetryConfig,
    };
    use reconcile_ai::workflows::reconciliation::{
        AccuracyOutcome, AccuracyStore, CandidateId, DecisionPath, Prediction, Recommendation,
        ScoringConfig,
    };
    use std::io::Write;
    use std::time::Duration;

    fn config() -> AppConfig {
        AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
            },
            decision: DecisionConfig {
                scoring: ScoringConfig::default(),
                high_value_ceiling_minor_units: 1_000_000,
                max_candidates: 25,
            },
            secondary: SecondaryConfig {
                endpoint: None,
                api_key: None,
                timeout: Duration::from_millis(500),
                max_candidates: 8,
                max_description_chars: 160,
            },
            accuracy: AccuracyConfig::default(),
            storage: StorageConfig {
                audit_log_path: None,
                accuracy_log_path: None,
                ledger_log_path: None,
                ledger_capacity: 1_000,
                candidates_path: None,
                router_cache_ttl: Duration::from_secs(60),
            },
        }
    }

    fn write_file(dir: &std::path::Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).expect("create file");
        file.write_all(contents.as_bytes()).expect("write file");
        path
    }

    #[tokio::test]
    async fn statement_rows_are_decided_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv = write_file(
            dir.path(),
            "statement.csv",
            "id,date,amount,description,reference,counterparty\n\
             tx-1,2025-04-01,300.00,BANK GIRO INV-9,INV-9,Sam Lee\n\
             tx-2,02/04/2025,12.00,CARD PAYMENT,,\n\
             tx-3,2025-04-03,25000.00,LARGE TRANSFER INV-9,INV-9,Sam Lee\n",
        );
        let candidates = write_file(
            dir.path(),
            "candidates.json",
            r#"{"invoices": [{
                "id": "inv-9",
                "tenant_id": "acorn-daycare",
                "outstanding_amount_minor_units": 30000,
                "reference": "INV-9",
                "parties": ["Sam Lee"]
            }]}"#,
        );

        let report = decide_statement(
            &config(),
            DecideArgs {
                csv,
                tenant: "acorn-daycare".to_string(),
                decision_type: DecisionType::InvoiceMatch,
                candidates: Some(candidates),
            },
        )
        .await
        .expect("report");

        let ids: Vec<&str> = report
            .decisions
            .iter()
            .map(|decision| decision.transaction_id.0.as_str())
            .collect();
        assert_eq!(ids, vec!["tx-1", "tx-2", "tx-3"]);
        assert_eq!(report.decisions[0].action, DecisionAction::AutoApply);
        assert_eq!(report.decisions[1].action, DecisionAction::NoMatch);
        assert_eq!(report.decisions[2].action, DecisionAction::Review);
        assert_eq!(
            report.summary,
            BatchSummary {
                auto_applied: 1,
                review: 1,
                no_match: 1,
                failed: 0,
            }
        );
    }

    #[test]
    fn accuracy_report_reads_the_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("accuracy.jsonl");
        let truth = Prediction::Candidate(CandidateId("inv-9".to_string()));
        {
            let store = JsonLinesAccuracyStore::open(&path).expect("store");
            for _ in 0..3 {
                store
                    .append(AccuracyOutcome::new(
                        TenantId("acorn-daycare".to_string()),
                        DecisionType::InvoiceMatch,
                        truth.clone(),
                        None,
                        truth.clone(),
                        DecisionPath::Deterministic,
                    ))
                    .expect("append");
            }
        }

        let report = accuracy_report(
            &AccuracyArgs {
                log: path,
                tenant: "acorn-daycare".to_string(),
                decision_type: DecisionType::InvoiceMatch,
            },
            AccuracyConfig::default(),
        )
        .expect("report");

        assert_eq!(report.stats.sample_size, 3);
        assert_eq!(report.stats.recommendation, Recommendation::Hybrid);
        assert_eq!(report.weights, PathWeights::HYBRID);

        let gated = accuracy_report(
            &AccuracyArgs {
                log: dir.path().join("accuracy.jsonl"),
                tenant: "acorn-daycare".to_string(),
                decision_type: DecisionType::InvoiceMatch,
            },
            AccuracyConfig {
                min_samples: 3,
                ..AccuracyConfig::default()
            },
        )
        .expect("report");
        assert_eq!(gated.stats.recommendation, Recommendation::DeterministicPrimary);
    }

    #[test]
    fn accuracy_report_refuses_a_missing_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("acuracy.jsonl");

        let result = accuracy_report(
            &AccuracyArgs {
                log: path.clone(),
                tenant: "acorn-daycare".to_string(),
                decision_type: DecisionType::InvoiceMatch,
            },
            AccuracyConfig::default(),
        );

        assert!(matches!(result, Err(AppError::Accuracy(_))));
        assert!(!path.exists());
    }
}

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::reconciliation::service::ServiceError;
use crate::workflows::reconciliation::{
    AccuracyStoreError, AuditError, ImportError, LedgerError, SecondaryUnavailable,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Import(ImportError),
    Fixture(serde_json::Error),
    Audit(AuditError),
    Accuracy(AccuracyStoreError),
    Ledger(LedgerError),
    Secondary(SecondaryUnavailable),
    Service(ServiceError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Import(err) => write!(f, "import error: {}", err),
            AppError::Fixture(err) => write!(f, "candidate fixture error: {}", err),
            AppError::Audit(err) => write!(f, "audit error: {}", err),
            AppError::Accuracy(err) => write!(f, "accuracy store error: {}", err),
            AppError::Ledger(err) => write!(f, "decision ledger error: {}", err),
            AppError::Secondary(err) => write!(f, "secondary adapter error: {}", err),
            AppError::Service(err) => write!(f, "decision error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Import(err) => Some(err),
            AppError::Fixture(err) => Some(err),
            AppError::Audit(err) => Some(err),
            AppError::Accuracy(err) => Some(err),
            AppError::Ledger(err) => Some(err),
            AppError::Secondary(err) => Some(err),
            AppError::Service(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Import(_) | AppError::Fixture(_) => StatusCode::BAD_REQUEST,
            AppError::Service(err) if err.is_input_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ImportError> for AppError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Fixture(value)
    }
}

impl From<AuditError> for AppError {
    fn from(value: AuditError) -> Self {
        Self::Audit(value)
    }
}

impl From<AccuracyStoreError> for AppError {
    fn from(value: AccuracyStoreError) -> Self {
        Self::Accuracy(value)
    }
}

impl From<LedgerError> for AppError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<SecondaryUnavailable> for AppError {
    fn from(value: SecondaryUnavailable) -> Self {
        Self::Secondary(value)
    }
}

impl From<ServiceError> for AppError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

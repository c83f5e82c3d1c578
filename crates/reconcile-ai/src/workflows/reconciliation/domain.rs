use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for the customer (childcare business) that owns the books.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bank-feed identifier of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

/// Invoice id or account code, depending on the decision type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub String);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

impl DecisionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two kinds of autonomous decision the engine makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    InvoiceMatch,
    Categorization,
}

impl DecisionType {
    pub const fn label(self) -> &'static str {
        match self {
            DecisionType::InvoiceMatch => "invoice_match",
            DecisionType::Categorization => "categorization",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "invoice_match" | "match" | "matching" => Some(Self::InvoiceMatch),
            "categorization" | "categorize" | "category" => Some(Self::Categorization),
            _ => None,
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bank transaction as delivered by the feed. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Signed amount in minor currency units (pence/cents).
    pub amount_minor_units: i64,
    pub date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub counterparty_name: Option<String>,
}

impl Transaction {
    pub fn absolute_amount(&self) -> i64 {
        self.amount_minor_units.saturating_abs()
    }
}

/// Outstanding receivable that an incoming payment may settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInvoice {
    pub id: CandidateId,
    pub tenant_id: TenantId,
    pub outstanding_amount_minor_units: i64,
    pub reference: String,
    /// Parent/guardian and child names the invoice is addressed to.
    #[serde(default)]
    pub parties: Vec<String>,
}

/// Inclusive band of amounts typically booked against an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min_minor_units: i64,
    pub max_minor_units: i64,
}

impl AmountRange {
    pub fn contains(&self, amount: i64) -> bool {
        amount >= self.min_minor_units && amount <= self.max_minor_units
    }
}

/// Chart-of-accounts entry with the learned signals the categorizer relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub code: CandidateId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Description keywords that indicate this account.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Strength of the keyword rule, 0.0..=1.0.
    #[serde(default)]
    pub pattern_strength: f32,
    /// Number of past transactions a human filed under this account for the same payee.
    #[serde(default)]
    pub precedent_count: u32,
    #[serde(default)]
    pub typical_amount_range: Option<AmountRange>,
}

/// Target a transaction might resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Candidate {
    Invoice(OpenInvoice),
    Account(AccountEntry),
}

impl Candidate {
    pub fn id(&self) -> &CandidateId {
        match self {
            Candidate::Invoice(invoice) => &invoice.id,
            Candidate::Account(account) => &account.code,
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        match self {
            Candidate::Invoice(invoice) => &invoice.tenant_id,
            Candidate::Account(account) => &account.tenant_id,
        }
    }

    pub fn decision_type(&self) -> DecisionType {
        match self {
            Candidate::Invoice(_) => DecisionType::InvoiceMatch,
            Candidate::Account(_) => DecisionType::Categorization,
        }
    }
}

/// What a path predicted, or what a human confirmed, for one decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prediction {
    Candidate(CandidateId),
    NoMatch,
}

impl Prediction {
    pub fn from_candidate(id: Option<&CandidateId>) -> Self {
        match id {
            Some(id) => Prediction::Candidate(id.clone()),
            None => Prediction::NoMatch,
        }
    }

    pub fn candidate_id(&self) -> Option<&CandidateId> {
        match self {
            Prediction::Candidate(id) => Some(id),
            Prediction::NoMatch => None,
        }
    }
}

/// Which scoring path produced a decision's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    Deterministic,
    Hybrid,
}

impl DecisionPath {
    pub const fn label(self) -> &'static str {
        match self {
            DecisionPath::Deterministic => "deterministic",
            DecisionPath::Hybrid => "hybrid",
        }
    }
}

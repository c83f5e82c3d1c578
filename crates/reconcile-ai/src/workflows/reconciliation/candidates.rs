use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::domain::{AccountEntry, Candidate, DecisionType, OpenInvoice, TenantId, Transaction};
use super::scoring::normalize_reference;

pub const DEFAULT_MAX_CANDIDATES: usize = 25;

/// Tenant-scoped lookup of open invoices and chart-of-accounts entries.
pub trait CandidateSource: Send + Sync {
    fn open_invoices(&self, tenant_id: &TenantId) -> Result<Vec<OpenInvoice>, CandidateSourceError>;
    fn chart_of_accounts(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<AccountEntry>, CandidateSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CandidateSourceError {
    #[error("candidate source unavailable: {0}")]
    Unavailable(String),
}

/// Fixture document accepted by [`InMemoryCandidateSource::from_fixture`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateFixture {
    #[serde(default)]
    pub invoices: Vec<OpenInvoice>,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

#[derive(Debug, Default)]
pub struct InMemoryCandidateSource {
    invoices: RwLock<HashMap<TenantId, Vec<OpenInvoice>>>,
    accounts: RwLock<HashMap<TenantId, Vec<AccountEntry>>>,
}

impl InMemoryCandidateSource {
    pub fn from_fixture(fixture: CandidateFixture) -> Self {
        let source = Self::default();
        for invoice in fixture.invoices {
            source.add_invoice(invoice);
        }
        for account in fixture.accounts {
            source.add_account(account);
        }
        source
    }

    pub fn add_invoice(&self, invoice: OpenInvoice) {
        self.invoices
            .write()
            .expect("candidate source lock poisoned")
            .entry(invoice.tenant_id.clone())
            .or_default()
            .push(invoice);
    }

    pub fn add_account(&self, account: AccountEntry) {
        self.accounts
            .write()
            .expect("candidate source lock poisoned")
            .entry(account.tenant_id.clone())
            .or_default()
            .push(account);
    }
}

impl CandidateSource for InMemoryCandidateSource {
    fn open_invoices(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<OpenInvoice>, CandidateSourceError> {
        let guard = self.invoices.read().expect("candidate source lock poisoned");
        Ok(guard.get(tenant_id).cloned().unwrap_or_default())
    }

    fn chart_of_accounts(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<AccountEntry>, CandidateSourceError> {
        let guard = self.accounts.read().expect("candidate source lock poisoned");
        Ok(guard.get(tenant_id).cloned().unwrap_or_default())
    }
}

/// Produces a bounded, tenant-isolated shortlist for the scorer. No decision logic.
pub struct CandidateGenerator<C> {
    source: Arc<C>,
    max_candidates: usize,
}

impl<C> CandidateGenerator<C>
where
    C: CandidateSource + 'static,
{
    pub fn new(source: Arc<C>, max_candidates: usize) -> Self {
        Self {
            source,
            max_candidates: max_candidates.max(1),
        }
    }

    pub fn source(&self) -> &Arc<C> {
        &self.source
    }

    pub fn generate(
        &self,
        transaction: &Transaction,
        tenant_id: &TenantId,
        decision_type: DecisionType,
    ) -> Result<Vec<Candidate>, CandidateSourceError> {
        let candidates = match decision_type {
            DecisionType::InvoiceMatch => {
                let invoices = self.source.open_invoices(tenant_id)?;
                self.shortlist_invoices(transaction, tenant_id, invoices)
            }
            DecisionType::Categorization => {
                let accounts = self.source.chart_of_accounts(tenant_id)?;
                self.shortlist_accounts(tenant_id, accounts)
            }
        };
        Ok(candidates)
    }

    fn shortlist_invoices(
        &self,
        transaction: &Transaction,
        tenant_id: &TenantId,
        invoices: Vec<OpenInvoice>,
    ) -> Vec<Candidate> {
        let haystack = normalize_reference(&format!(
            "{} {}",
            transaction.reference.as_deref().unwrap_or_default(),
            transaction.description
        ));
        let paid = i128::from(transaction.absolute_amount());

        let mut ranked: Vec<(bool, i128, OpenInvoice)> = invoices
            .into_iter()
            .filter(|invoice| owned_by(tenant_id, &invoice.tenant_id))
            .filter(|invoice| invoice.outstanding_amount_minor_units > 0)
            .map(|invoice| {
                let reference = normalize_reference(&invoice.reference);
                let reference_hit = reference.len() >= 3 && haystack.contains(&reference);
                let distance = (i128::from(invoice.outstanding_amount_minor_units) - paid).abs();
                (reference_hit, distance, invoice)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });
        ranked.truncate(self.max_candidates);
        ranked
            .into_iter()
            .map(|(_, _, invoice)| Candidate::Invoice(invoice))
            .collect()
    }

    fn shortlist_accounts(
        &self,
        tenant_id: &TenantId,
        accounts: Vec<AccountEntry>,
    ) -> Vec<Candidate> {
        let mut accounts: Vec<AccountEntry> = accounts
            .into_iter()
            .filter(|account| owned_by(tenant_id, &account.tenant_id))
            .collect();
        accounts.sort_by(|a, b| {
            b.precedent_count
                .cmp(&a.precedent_count)
                .then_with(|| a.code.cmp(&b.code))
        });
        accounts.truncate(self.max_candidates);
        accounts.into_iter().map(Candidate::Account).collect()
    }
}

fn owned_by(requested: &TenantId, owner: &TenantId) -> bool {
    if requested == owner {
        return true;
    }
    tracing::warn!(
        tenant = %requested,
        owner = %owner,
        "candidate source returned a row owned by another tenant; dropped"
    );
    false
}

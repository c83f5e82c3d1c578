use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{SanitizedTransaction, SecondaryCandidate, SecondaryRequest};
use crate::workflows::reconciliation::domain::{
    Candidate, CandidateId, DecisionType, TenantId, Transaction,
};
use crate::workflows::reconciliation::scoring::ScoreBreakdown;

pub const DEFAULT_SECONDARY_MAX_CANDIDATES: usize = 8;
pub const DEFAULT_MAX_DESCRIPTION_CHARS: usize = 160;
pub const DEFAULT_MAX_NAME_CHARS: usize = 64;

/// Digit runs at least this long are treated as identifying numbers.
const MASK_MIN_RUN: usize = 5;
const MASK_KEEP_TRAILING: usize = 4;

/// Limits applied to everything sent to the external scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizePolicy {
    pub max_candidates: usize,
    pub max_description_chars: usize,
    pub max_name_chars: usize,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            max_candidates: DEFAULT_SECONDARY_MAX_CANDIDATES,
            max_description_chars: DEFAULT_MAX_DESCRIPTION_CHARS,
            max_name_chars: DEFAULT_MAX_NAME_CHARS,
        }
    }
}

impl SanitizePolicy {
    /// Build the minimized request. `ranked` is the viable shortlist, best first.
    pub fn build_request(
        &self,
        tenant_id: &TenantId,
        decision_type: DecisionType,
        transaction: &Transaction,
        candidates: &[Candidate],
        ranked: &[ScoreBreakdown],
    ) -> SecondaryRequest {
        let by_id: HashMap<&CandidateId, &Candidate> = candidates
            .iter()
            .map(|candidate| (candidate.id(), candidate))
            .collect();

        let shortlisted = ranked
            .iter()
            .take(self.max_candidates.max(1))
            .filter_map(|breakdown| {
                by_id
                    .get(&breakdown.candidate_id)
                    .map(|candidate| self.candidate(candidate, breakdown.total))
            })
            .collect();

        SecondaryRequest {
            tenant_id: tenant_id.clone(),
            decision_type,
            transaction: self.transaction(transaction),
            candidates: shortlisted,
        }
    }

    fn transaction(&self, transaction: &Transaction) -> SanitizedTransaction {
        SanitizedTransaction {
            amount_minor_units: transaction.amount_minor_units,
            date: transaction.date,
            description: self.text(&transaction.description, self.max_description_chars),
            reference: transaction
                .reference
                .as_deref()
                .map(|reference| self.text(reference, self.max_name_chars)),
            counterparty_name: transaction
                .counterparty_name
                .as_deref()
                .map(|name| self.text(name, self.max_name_chars)),
        }
    }

    fn candidate(&self, candidate: &Candidate, deterministic_score: u8) -> SecondaryCandidate {
        match candidate {
            Candidate::Invoice(invoice) => SecondaryCandidate {
                id: invoice.id.clone(),
                label: self.text(&invoice.parties.join(" / "), self.max_name_chars),
                amount_minor_units: Some(invoice.outstanding_amount_minor_units),
                reference: Some(self.text(&invoice.reference, self.max_name_chars)),
                deterministic_score,
            },
            Candidate::Account(account) => SecondaryCandidate {
                id: account.code.clone(),
                label: self.text(&account.name, self.max_name_chars),
                amount_minor_units: None,
                reference: None,
                deterministic_score,
            },
        }
    }

    fn text(&self, raw: &str, limit: usize) -> String {
        truncate_chars(&mask_identifiers(raw.trim()), limit)
    }
}

/// Replace every run of five or more digits with `*`, keeping the last four.
pub fn mask_identifiers(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut run = String::new();

    let flush = |run: &mut String, output: &mut String| {
        let length = run.chars().count();
        if length >= MASK_MIN_RUN {
            output.extend(std::iter::repeat('*').take(length - MASK_KEEP_TRAILING));
            output.extend(run.chars().skip(length - MASK_KEEP_TRAILING));
        } else {
            output.push_str(run);
        }
        run.clear();
    };

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            run.push(ch);
        } else {
            flush(&mut run, &mut output);
            output.push(ch);
        }
    }
    flush(&mut run, &mut output);
    output
}

/// Cut to at most `limit` characters, on a char boundary.
pub fn truncate_chars(input: &str, limit: usize) -> String {
    input.chars().take(limit).collect()
}

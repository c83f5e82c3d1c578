use super::{ScoreComponent, ScoreFactor};
use crate::workflows::reconciliation::domain::{OpenInvoice, Transaction};

const MIN_REFERENCE_LEN: usize = 3;
const MIN_SUFFIX_DIGITS: usize = 3;

pub(crate) fn score_invoice(
    transaction: &Transaction,
    invoice: &OpenInvoice,
) -> Vec<ScoreComponent> {
    vec![
        reference_component(transaction, invoice),
        amount_component(transaction, invoice),
        name_component(transaction, invoice),
    ]
}

/// Uppercase alphanumerics only, so `inv-2024/0042` and `INV 2024 0042` compare equal.
pub fn normalize_reference(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn reference_component(transaction: &Transaction, invoice: &OpenInvoice) -> ScoreComponent {
    let expected = normalize_reference(&invoice.reference);
    if expected.len() < MIN_REFERENCE_LEN {
        return ScoreComponent::new(
            ScoreFactor::Reference,
            0,
            "invoice carries no usable reference",
        );
    }

    let given = transaction
        .reference
        .as_deref()
        .map(normalize_reference)
        .unwrap_or_default();
    let description = normalize_reference(&transaction.description);

    if given == expected {
        return ScoreComponent::new(ScoreFactor::Reference, 40, "reference exact match");
    }

    let contained = given.contains(&expected)
        || description.contains(&expected)
        || (given.len() >= MIN_REFERENCE_LEN && expected.contains(&given));
    if contained {
        return ScoreComponent::new(ScoreFactor::Reference, 30, "reference substring match");
    }

    if suffix_matches(transaction, &invoice.reference) {
        return ScoreComponent::new(ScoreFactor::Reference, 15, "reference numeric suffix match");
    }

    ScoreComponent::new(ScoreFactor::Reference, 0, "no reference match")
}

fn suffix_matches(transaction: &Transaction, invoice_reference: &str) -> bool {
    let suffix: String = {
        let mut digits: Vec<char> = invoice_reference
            .chars()
            .rev()
            .skip_while(|c| !c.is_ascii_alphanumeric())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.reverse();
        digits.into_iter().collect()
    };
    if suffix.len() < MIN_SUFFIX_DIGITS {
        return false;
    }
    let trimmed = suffix.trim_start_matches('0');

    let haystacks = [
        transaction.reference.as_deref().unwrap_or_default(),
        transaction.description.as_str(),
    ];
    haystacks
        .iter()
        .flat_map(|text| digit_runs(text))
        .any(|run| run.ends_with(&suffix) || (!trimmed.is_empty() && run == trimmed))
}

fn digit_runs(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .collect()
}

fn amount_component(transaction: &Transaction, invoice: &OpenInvoice) -> ScoreComponent {
    let outstanding = i128::from(invoice.outstanding_amount_minor_units);
    let paid = i128::from(transaction.amount_minor_units);

    if outstanding <= 0 {
        return ScoreComponent::new(ScoreFactor::Amount, 0, "invoice has no outstanding balance");
    }
    if paid <= 0 {
        return ScoreComponent::new(
            ScoreFactor::Amount,
            0,
            "outgoing transaction cannot settle a receivable",
        );
    }

    let diff = (paid - outstanding).abs();
    let (points, notes) = if diff == 0 {
        (40, "amount exact match")
    } else if diff * 100 <= outstanding {
        (35, "amount within 1%")
    } else if diff * 100 <= outstanding * 5 {
        (25, "amount within 5%")
    } else if diff * 100 <= outstanding * 10 {
        (15, "amount within 10%")
    } else if paid < outstanding {
        (10, "possible partial payment")
    } else {
        (0, "amount exceeds outstanding balance")
    };

    ScoreComponent::new(ScoreFactor::Amount, points, notes)
}

fn name_component(transaction: &Transaction, invoice: &OpenInvoice) -> ScoreComponent {
    let counterparty = match transaction.counterparty_name.as_deref().map(normalize_name) {
        Some(name) if !name.is_empty() => name,
        _ => {
            return ScoreComponent::new(ScoreFactor::CounterpartyName, 0, "no counterparty name")
        }
    };

    let best = invoice
        .parties
        .iter()
        .map(|party| normalize_name(party))
        .filter(|party| !party.is_empty())
        .map(|party| {
            if party == counterparty {
                1.0
            } else {
                strsim::normalized_levenshtein(&party, &counterparty)
            }
        })
        .fold(0.0_f64, f64::max);

    let points = if best >= 1.0 {
        20
    } else if best > 0.8 {
        15
    } else if best > 0.6 {
        10
    } else if best > 0.4 {
        5
    } else {
        0
    };

    let notes = if points == 20 {
        "counterparty name exact match".to_string()
    } else {
        format!("counterparty name similarity {:.2}", best)
    };
    ScoreComponent::new(ScoreFactor::CounterpartyName, points, notes)
}

fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::reconciliation::domain::{CandidateId, TenantId, TransactionId};
    use chrono::NaiveDate;

    fn invoice(reference: &str, outstanding: i64, parties: &[&str]) -> OpenInvoice {
        OpenInvoice {
            id: CandidateId("inv-1".to_string()),
            tenant_id: TenantId("nursery-1".to_string()),
            outstanding_amount_minor_units: outstanding,
            reference: reference.to_string(),
            parties: parties.iter().map(|party| party.to_string()).collect(),
        }
    }

    fn payment(amount: i64, reference: Option<&str>, counterparty: Option<&str>) -> Transaction {
        Transaction {
            id: TransactionId("tx-1".to_string()),
            amount_minor_units: amount,
            date: NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid date"),
            description: "FASTER PAYMENT".to_string(),
            reference: reference.map(str::to_string),
            counterparty_name: counterparty.map(str::to_string),
        }
    }

    #[test]
    fn reference_rules_rank_exact_over_substring_over_suffix() {
        let inv = invoice("INV-2025-0042", 52_000, &[]);

        let exact = reference_component(&payment(1, Some("inv 2025 0042"), None), &inv);
        let substring =
            reference_component(&payment(1, Some("Fees INV-2025-0042 March"), None), &inv);
        let suffix = reference_component(&payment(1, Some("ref 42"), None), &inv);
        let none = reference_component(&payment(1, Some("childcare"), None), &inv);

        assert_eq!(exact.points, 40);
        assert_eq!(substring.points, 30);
        assert_eq!(suffix.points, 15);
        assert_eq!(none.points, 0);
    }

    #[test]
    fn amount_bands_follow_percentage_tolerances() {
        let inv = invoice("INV-1", 100_000, &[]);

        assert_eq!(amount_component(&payment(100_000, None, None), &inv).points, 40);
        assert_eq!(amount_component(&payment(99_100, None, None), &inv).points, 35);
        assert_eq!(amount_component(&payment(96_000, None, None), &inv).points, 25);
        assert_eq!(amount_component(&payment(91_000, None, None), &inv).points, 15);
        assert_eq!(amount_component(&payment(40_000, None, None), &inv).points, 10);
        assert_eq!(amount_component(&payment(150_000, None, None), &inv).points, 0);
        assert_eq!(amount_component(&payment(-100_000, None, None), &inv).points, 0);
    }

    #[test]
    fn counterparty_similarity_uses_edit_distance_ratio() {
        let inv = invoice("INV-1", 1, &["Jane Smith", "Oliver Smith"]);

        let exact = name_component(&payment(1, None, Some("JANE  SMITH")), &inv);
        let close = name_component(&payment(1, None, Some("Jane Smyth")), &inv);
        let missing = name_component(&payment(1, None, None), &inv);

        assert_eq!(exact.points, 20);
        assert_eq!(close.points, 15);
        assert_eq!(missing.points, 0);
    }

    #[test]
    fn notes_never_echo_raw_references() {
        let inv = invoice("INV-2025-0042", 52_000, &["Jane Smith"]);
        let transaction = payment(52_000, Some("INV-2025-0042"), Some("Jane Smith"));
        let components = score_invoice(&transaction, &inv);

        for component in components {
            assert!(!component.notes.contains("0042"));
            assert!(!component.notes.to_lowercase().contains("jane"));
        }
    }
}

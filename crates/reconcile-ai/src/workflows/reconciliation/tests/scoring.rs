use super::common::*;
use std::cmp::Ordering;

use crate::workflows::reconciliation::domain::{Candidate, CandidateId, Transaction};
use crate::workflows::reconciliation::scoring::{
    rank_order, DeterministicScorer, ScoreBreakdown, ScoreComponent, ScoreFactor,
};

fn transactions() -> Vec<Transaction> {
    vec![
        exact_payment(),
        twin_payment(),
        payment("tx-a", -4_500, None, None, "TESCO STORES 2231"),
        payment("tx-b", 1, None, Some("J"), "#"),
        payment("tx-c", i64::MAX, Some("000001042"), Some("Jane Doe"), "1042"),
        payment("tx-d", i64::MIN, Some("inv 1042"), None, ""),
        payment("tx-e", 44_990, Some("1042"), Some("Jayne Do"), "school fees march"),
    ]
}

fn candidates() -> Vec<Candidate> {
    let mut candidates = vec![
        Candidate::Invoice(exact_invoice()),
        Candidate::Invoice(invoice("inv-0", 0, "", &[])),
        Candidate::Invoice(invoice("inv-neg", -500, "INV-1042", &["Jane Doe"])),
        Candidate::Invoice(invoice("inv-max", i64::MAX, "X", &["J"])),
        Candidate::Account(account("6100", &["tesco"], 1.0, 500, Some((2_000, 20_000)))),
        Candidate::Account(account("6200", &["fees"], f32::NAN, 0, Some((0, 0)))),
        Candidate::Account(account("6300", &[""], 7.5, 1, None)),
    ];
    candidates.extend(twin_invoices());
    candidates
}

#[test]
fn totals_stay_in_range_and_equal_the_clamped_factor_sum() {
    let scorer = DeterministicScorer::new();
    for transaction in transactions() {
        for candidate in candidates() {
            let breakdown = scorer.score(&transaction, &candidate);
            let sum: i16 = breakdown.components.iter().map(|component| component.points).sum();
            assert!(breakdown.total <= 100);
            assert_eq!(i16::from(breakdown.total), sum.clamp(0, 100));
            for component in &breakdown.components {
                let (min, max) = component.factor.band();
                assert!(component.points >= min && component.points <= max);
            }
        }
    }
}

#[test]
fn scoring_is_idempotent() {
    let scorer = DeterministicScorer::new();
    for transaction in transactions() {
        for candidate in candidates() {
            assert_eq!(
                scorer.score(&transaction, &candidate),
                scorer.score(&transaction, &candidate)
            );
        }
    }
}

#[test]
fn exact_reference_amount_and_name_score_one_hundred() {
    let breakdown =
        DeterministicScorer::new().score(&exact_payment(), &Candidate::Invoice(exact_invoice()));
    assert_eq!(breakdown.total, 100);
    assert_eq!(breakdown.points_for(ScoreFactor::Reference), 40);
    assert_eq!(breakdown.points_for(ScoreFactor::Amount), 40);
    assert_eq!(breakdown.points_for(ScoreFactor::CounterpartyName), 20);
}

#[test]
fn ties_break_on_identifying_then_supporting_factors_then_id() {
    let make = |id: &str, reference: i16, amount: i16, name: i16| {
        ScoreBreakdown::from_components(
            CandidateId(id.to_string()),
            vec![
                ScoreComponent::new(ScoreFactor::Reference, reference, "r"),
                ScoreComponent::new(ScoreFactor::Amount, amount, "a"),
                ScoreComponent::new(ScoreFactor::CounterpartyName, name, "n"),
            ],
        )
    };

    let stronger_reference = make("b", 40, 25, 0);
    let stronger_amount = make("a", 30, 35, 0);
    assert_eq!(stronger_reference.total, stronger_amount.total);
    assert_eq!(rank_order(&stronger_reference, &stronger_amount), Ordering::Less);

    let more_amount = make("z", 30, 40, 0);
    let more_name = make("y", 30, 35, 5);
    assert_eq!(rank_order(&more_amount, &more_name), Ordering::Less);

    let first = make("inv-1", 30, 35, 5);
    let second = make("inv-2", 30, 35, 5);
    assert_eq!(rank_order(&first, &second), Ordering::Less);
    assert_eq!(rank_order(&second, &first), Ordering::Greater);
}

#[test]
fn ranking_is_stable_under_input_permutation() {
    let scorer = DeterministicScorer::new();
    let transaction = twin_payment();
    let forward = scorer.rank(&transaction, &twin_invoices());
    let mut reversed_input = twin_invoices();
    reversed_input.reverse();
    let reversed = scorer.rank(&transaction, &reversed_input);

    assert_eq!(forward, reversed);
    assert_eq!(forward[0].candidate_id, CandidateId("inv-2001".to_string()));
}

use super::{ScoreComponent, ScoreFactor};
use crate::workflows::reconciliation::domain::{AccountEntry, Transaction};

const PATTERN_MAX_POINTS: f32 = 60.0;
const PRECEDENT_BASE_POINTS: i16 = 25;
const PRECEDENT_MAX_POINTS: i16 = 30;
/// Slack around the typical range that still earns partial credit, in percent.
const AMOUNT_SLACK_PERCENT: i128 = 25;

pub(crate) fn score_account(
    transaction: &Transaction,
    account: &AccountEntry,
) -> Vec<ScoreComponent> {
    let pattern = pattern_component(transaction, account);
    let precedent = precedent_component(account);
    let amount = typical_amount_component(transaction, account);

    let subtotal = pattern.points + precedent.points + amount.points;
    let quality = description_quality_component(&transaction.description, subtotal);

    vec![pattern, precedent, amount, quality]
}

fn pattern_component(transaction: &Transaction, account: &AccountEntry) -> ScoreComponent {
    let haystack = format!(
        "{} {}",
        transaction.description.to_lowercase(),
        transaction
            .counterparty_name
            .as_deref()
            .unwrap_or_default()
            .to_lowercase()
    );

    let matched = account
        .keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .any(|keyword| !keyword.is_empty() && haystack.contains(&keyword));

    if !matched {
        return ScoreComponent::new(ScoreFactor::KnownPattern, 0, "no known pattern matched");
    }

    let strength = if account.pattern_strength.is_finite() {
        account.pattern_strength.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let points = (strength * PATTERN_MAX_POINTS).round() as i16;
    ScoreComponent::new(
        ScoreFactor::KnownPattern,
        points,
        format!("known pattern matched with strength {:.2}", strength),
    )
}

fn precedent_component(account: &AccountEntry) -> ScoreComponent {
    match account.precedent_count {
        0 => ScoreComponent::new(ScoreFactor::HistoricalPrecedent, 0, "no historical precedent"),
        count => {
            let extra = i16::try_from(count - 1).unwrap_or(i16::MAX);
            let points = PRECEDENT_BASE_POINTS
                .saturating_add(extra)
                .min(PRECEDENT_MAX_POINTS);
            ScoreComponent::new(
                ScoreFactor::HistoricalPrecedent,
                points,
                format!("{count} prior transaction(s) filed here"),
            )
        }
    }
}

fn typical_amount_component(transaction: &Transaction, account: &AccountEntry) -> ScoreComponent {
    let Some(range) = account.typical_amount_range else {
        return ScoreComponent::new(ScoreFactor::TypicalAmount, 0, "no typical amount on record");
    };

    let amount = transaction.absolute_amount();
    if range.contains(amount) {
        return ScoreComponent::new(ScoreFactor::TypicalAmount, 10, "amount within typical range");
    }

    let amount = i128::from(amount);
    let low = i128::from(range.min_minor_units);
    let high = i128::from(range.max_minor_units);
    let near_low = amount < low && (low - amount) * 100 <= low * AMOUNT_SLACK_PERCENT;
    let near_high = amount > high && (amount - high) * 100 <= high * AMOUNT_SLACK_PERCENT;
    if near_low || near_high {
        return ScoreComponent::new(ScoreFactor::TypicalAmount, 5, "amount near typical range");
    }

    ScoreComponent::new(ScoreFactor::TypicalAmount, 0, "amount outside typical range")
}

/// Penalty for descriptions too short or garbled to support a confident category.
/// Never larger than the points earned elsewhere, so the total stays non-negative.
fn description_quality_component(description: &str, subtotal: i16) -> ScoreComponent {
    let trimmed = description.trim();
    let total_chars = trimmed.chars().count();
    let alphabetic = trimmed.chars().filter(|c| c.is_alphabetic()).count();

    let (penalty, notes) = if total_chars < 4 || alphabetic < 3 {
        (10, "description too short or garbled")
    } else if total_chars < 8 || alphabetic * 2 < total_chars {
        (5, "description low quality")
    } else {
        (0, "description readable")
    };

    let applied = penalty.min(subtotal.max(0));
    ScoreComponent::new(ScoreFactor::DescriptionQuality, -applied, notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::reconciliation::domain::{
        AmountRange, CandidateId, TenantId, TransactionId,
    };
    use chrono::NaiveDate;

    fn account(strength: f32, precedents: u32) -> AccountEntry {
        AccountEntry {
            code: CandidateId("6100".to_string()),
            tenant_id: TenantId("nursery-1".to_string()),
            name: "Food and catering".to_string(),
            keywords: vec!["tesco".to_string(), "grocer".to_string()],
            pattern_strength: strength,
            precedent_count: precedents,
            typical_amount_range: Some(AmountRange {
                min_minor_units: 2_000,
                max_minor_units: 20_000,
            }),
        }
    }

    fn spend(description: &str, amount: i64) -> Transaction {
        Transaction {
            id: TransactionId("tx-9".to_string()),
            amount_minor_units: amount,
            date: NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid date"),
            description: description.to_string(),
            reference: None,
            counterparty_name: None,
        }
    }

    #[test]
    fn pattern_points_scale_with_rule_strength() {
        let strong = pattern_component(&spend("TESCO STORES 2231", -4_500), &account(1.0, 0));
        let weak = pattern_component(&spend("TESCO STORES 2231", -4_500), &account(0.5, 0));
        let miss = pattern_component(&spend("SHELL FUEL", -4_500), &account(1.0, 0));

        assert_eq!(strong.points, 60);
        assert_eq!(weak.points, 30);
        assert_eq!(miss.points, 0);
    }

    #[test]
    fn precedent_points_start_at_base_and_cap() {
        assert_eq!(precedent_component(&account(0.0, 0)).points, 0);
        assert_eq!(precedent_component(&account(0.0, 1)).points, 25);
        assert_eq!(precedent_component(&account(0.0, 3)).points, 27);
        assert_eq!(precedent_component(&account(0.0, 400)).points, 30);
    }

    #[test]
    fn typical_amount_uses_absolute_value() {
        let entry = account(0.0, 0);
        assert_eq!(typical_amount_component(&spend("x", -4_500), &entry).points, 10);
        assert_eq!(typical_amount_component(&spend("x", -24_000), &entry).points, 5);
        assert_eq!(typical_amount_component(&spend("x", -90_000), &entry).points, 0);
    }

    #[test]
    fn garbled_descriptions_are_penalised_but_never_below_zero() {
        let components = score_account(&spend("#9", -90_000), &account(1.0, 0));
        let total: i16 = components.iter().map(|component| component.points).sum();
        assert_eq!(total, 0);

        let components = score_account(&spend("*/ 12", -4_500), &account(0.0, 2));
        let quality = components
            .iter()
            .find(|component| component.factor == ScoreFactor::DescriptionQuality)
            .expect("quality component present");
        assert_eq!(quality.points, -10);
    }
}

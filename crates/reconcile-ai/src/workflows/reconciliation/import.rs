use std::io::Read;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::domain::{Transaction, TransactionId};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("bank statement csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: invalid amount {value:?}")]
    InvalidAmount { row: usize, value: String },
    #[error("row {row}: invalid date {value:?}")]
    InvalidDate { row: usize, value: String },
    #[error("row {row}: transaction id is blank")]
    MissingId { row: usize },
}

/// Parse a bank statement export with columns
/// `id,date,amount,description,reference,counterparty`.
///
/// Amounts are decimal strings (`-45.50`, `1200`) converted to minor units without
/// floating point. Dates accept `YYYY-MM-DD` or `DD/MM/YYYY`.
pub fn parse_transactions<R: Read>(reader: R) -> Result<Vec<Transaction>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut transactions = Vec::new();

    for (index, record) in csv_reader.deserialize::<StatementRow>().enumerate() {
        let row = record?;
        let row_number = index + 1;

        if row.id.trim().is_empty() {
            return Err(ImportError::MissingId { row: row_number });
        }
        let amount_minor_units =
            parse_minor_units(&row.amount).ok_or_else(|| ImportError::InvalidAmount {
                row: row_number,
                value: row.amount.clone(),
            })?;
        let date = parse_date(&row.date).ok_or_else(|| ImportError::InvalidDate {
            row: row_number,
            value: row.date.clone(),
        })?;

        transactions.push(Transaction {
            id: TransactionId(row.id),
            amount_minor_units,
            date,
            description: row.description,
            reference: row.reference,
            counterparty_name: row.counterparty,
        });
    }

    Ok(transactions)
}

#[derive(Debug, Deserialize)]
struct StatementRow {
    id: String,
    date: String,
    amount: String,
    #[serde(default)]
    description: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    reference: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    counterparty: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// `"-1,234.5"` -> `-123450`. At most two decimal places.
pub fn parse_minor_units(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '£' && *c != '$' && *c != '€')
        .collect();
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.len() > 2
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };

    let magnitude = whole.checked_mul(100)?.checked_add(fraction)?;
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
        .ok()
}

//! CSV format handling for batch inputs and account output
//!
//! This module centralizes all CSV format concerns, providing:
//! - Record structures for the accounts, rates and operations files
//! - Conversion from CSV records to domain types
//! - Account output serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Formats
//!
//! ```text
//! accounts.csv    number,user,currency,name,password,balance
//! rates.csv       base,quote,rate
//! operations.csv  op,user,from,password,to,amount,reference
//! output          account,number,user,currency,balance
//! ```

use crate::types::{Account, AccountSeed, Currency, Operation, UserId};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// Row of the accounts file
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountCsv {
    pub number: String,
    pub user: UserId,
    pub currency: String,
    pub name: String,
    pub password: String,
    pub balance: Option<String>,
}

/// Row of the rates file
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RateCsv {
    pub base: String,
    pub quote: String,
    pub rate: String,
}

/// Row of the operations file
///
/// Columns not used by an operation may be left empty.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OperationCsv {
    pub op: String,
    pub user: UserId,
    pub from: Option<String>,
    pub password: Option<String>,
    pub to: Option<String>,
    pub amount: Option<String>,
    pub reference: Option<String>,
}

fn parse_amount(raw: &str, what: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|_| format!("Invalid {} '{}'", what, raw))
}

fn parse_currency(raw: &str) -> Result<Currency, String> {
    Currency::from_str(raw.trim()).map_err(|e| e.to_string())
}

/// Take a required, non-empty column
fn required(field: Option<String>, column: &str, op: &str) -> Result<String, String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(format!("{} requires a '{}' column", op, column)),
    }
}

/// Convert an accounts-file row
///
/// A missing balance opens the account empty.
pub fn convert_account_record(record: AccountCsv) -> Result<AccountSeed, String> {
    let currency = parse_currency(&record.currency)?;
    let balance = match record.balance {
        Some(raw) if !raw.trim().is_empty() => parse_amount(&raw, "balance")?,
        _ => Decimal::ZERO,
    };

    Ok(AccountSeed {
        number: record.number,
        user: record.user,
        currency,
        name: record.name,
        password: record.password,
        balance,
    })
}

/// Convert a rates-file row into `(base, quote, rate)`
pub fn convert_rate_record(record: RateCsv) -> Result<(Currency, Currency, Decimal), String> {
    let base = parse_currency(&record.base)?;
    let quote = parse_currency(&record.quote)?;
    let rate = parse_amount(&record.rate, "rate")?;
    if rate <= Decimal::ZERO {
        return Err(format!("Rate for {}/{} must be positive", base, quote));
    }
    Ok((base, quote, rate))
}

/// Convert an operations-file row
///
/// # Returns
///
/// Result containing either:
/// - Ok(Operation) - Successfully converted record
/// - Err(String) - Unknown operation, missing column or unparseable amount
pub fn convert_operation_record(record: OperationCsv) -> Result<Operation, String> {
    let op = record.op.trim().to_lowercase();
    match op.as_str() {
        "transfer" => {
            let amount = required(record.amount, "amount", &op)?;
            Ok(Operation::Transfer {
                user: record.user,
                from: required(record.from, "from", &op)?,
                password: record.password.unwrap_or_default(),
                to: required(record.to, "to", &op)?,
                amount: parse_amount(&amount, "amount")?,
            })
        }
        "payment" => {
            let amount = required(record.amount, "amount", &op)?;
            Ok(Operation::Payment {
                user: record.user,
                reference: required(record.reference, "reference", &op)?,
                from: required(record.from, "from", &op)?,
                password: record.password.unwrap_or_default(),
                to: required(record.to, "to", &op)?,
                amount: parse_amount(&amount, "amount")?,
            })
        }
        "refund" => Ok(Operation::Refund {
            user: record.user,
            reference: required(record.reference, "reference", &op)?,
            password: record.password.unwrap_or_default(),
        }),
        _ => Err(format!("Invalid operation type: '{}'", record.op)),
    }
}

/// Write account states to CSV format
///
/// Writes accounts in CSV format with columns: account, number, user,
/// currency, balance. Accounts are sorted by id for deterministic output and
/// balances are printed with `scale` decimal places.
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_accounts_csv(
    accounts: &[Account],
    scale: u32,
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["account", "number", "user", "currency", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_accounts = accounts.to_vec();
    sorted_accounts.sort_by_key(|account| account.id);

    for account in sorted_accounts {
        writer
            .write_record(&[
                account.id.to_string(),
                account.number.clone(),
                account.user_id.to_string(),
                account.currency.to_string(),
                format!("{:.*}", scale as usize, account.balance),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

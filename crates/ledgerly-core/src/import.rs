//! Transaction import: generic bank CSV and Plaid-style JSON
//!
//! Parsing is pure; [`import_transactions`] stores the parsed rows, marks
//! duplicates and optionally runs the organization's rules over the new rows.

use std::io::Read;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::NewImportedTransaction;
use crate::rules::{ApplyRulesSummary, RuleEngine};

/// Supported import formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportFormat {
    Csv,
    PlaidJson,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::PlaidJson => "plaid_json",
        }
    }

    /// Guess the format from a file name, then from the first byte of content
    pub fn detect(file_name: Option<&str>, content: &str) -> Self {
        if let Some(name) = file_name {
            let name = name.to_lowercase();
            if name.ends_with(".json") {
                return Self::PlaidJson;
            }
            if name.ends_with(".csv") {
                return Self::Csv;
            }
        }
        match content.trim_start().chars().next() {
            Some('[') | Some('{') => Self::PlaidJson,
            _ => Self::Csv,
        }
    }
}

impl std::str::FromStr for ImportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "plaid" | "plaid_json" | "plaid-json" | "json" => Ok(Self::PlaidJson),
            _ => Err(format!("Unknown import format: {}", s)),
        }
    }
}

impl std::fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse content in the given format
pub fn parse<R: Read>(reader: R, format: ImportFormat) -> Result<Vec<NewImportedTransaction>> {
    match format {
        ImportFormat::Csv => parse_csv(reader),
        ImportFormat::PlaidJson => parse_plaid_json(reader),
    }
}

/// Deduplication hash over date|description|amount|external id, hex encoded
pub fn generate_hash(
    date: &NaiveDate,
    description: &str,
    amount: f64,
    external_id: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(description.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{:.2}", amount).as_bytes());
    hasher.update(b"|");
    hasher.update(external_id.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Column positions found in a CSV header row
#[derive(Debug, Default, PartialEq)]
struct CsvColumns {
    date: Option<usize>,
    description: Option<usize>,
    merchant: Option<usize>,
    amount: Option<usize>,
    debit: Option<usize>,
    credit: Option<usize>,
    category: Option<usize>,
    external_id: Option<usize>,
}

impl CsvColumns {
    fn detect(headers: &StringRecord) -> Result<Self> {
        let mut columns = Self::default();
        for (i, header) in headers.iter().enumerate() {
            let slot = match header.trim().to_lowercase().as_str() {
                "date" | "transaction date" | "trans. date" | "posted date" | "post date" => {
                    &mut columns.date
                }
                "description" | "name" | "details" | "memo" => &mut columns.description,
                "merchant" | "merchant name" | "merchant_name" | "payee" => &mut columns.merchant,
                "amount" | "transaction amount" => &mut columns.amount,
                "debit" | "withdrawal" => &mut columns.debit,
                "credit" | "deposit" => &mut columns.credit,
                "category" | "categories" => &mut columns.category,
                "transaction id" | "transaction_id" | "id" | "reference" | "reference number" => {
                    &mut columns.external_id
                }
                _ => continue,
            };
            // First matching column wins ("Transaction Date" before "Post Date")
            if slot.is_none() {
                *slot = Some(i);
            }
        }

        if columns.date.is_none() {
            return Err(Error::Import("CSV has no date column".into()));
        }
        if columns.description.is_none() && columns.merchant.is_none() {
            return Err(Error::Import("CSV has no description column".into()));
        }
        if columns.amount.is_none() && columns.debit.is_none() && columns.credit.is_none() {
            return Err(Error::Import("CSV has no amount column".into()));
        }
        Ok(columns)
    }
}

fn field<'a>(record: &'a StringRecord, column: Option<usize>) -> Option<&'a str> {
    column
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parse a bank CSV whose columns are found from its header row
///
/// Amounts keep the bank's sign. With separate debit/credit columns the
/// amount is `credit - debit`.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<NewImportedTransaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = CsvColumns::detect(rdr.headers()?)?;
    let mut transactions = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let date_str = field(&record, columns.date)
            .ok_or_else(|| Error::Import(format!("Row {}: missing date", row + 1)))?;
        let date = parse_date(date_str)?;

        let merchant_name = field(&record, columns.merchant).map(String::from);
        let description = field(&record, columns.description)
            .map(String::from)
            .or_else(|| merchant_name.clone())
            .ok_or_else(|| Error::Import(format!("Row {}: missing description", row + 1)))?;

        let amount = match field(&record, columns.amount) {
            Some(value) => parse_amount(value)?,
            None => {
                let debit = field(&record, columns.debit)
                    .map(parse_amount)
                    .transpose()?
                    .unwrap_or(0.0);
                let credit = field(&record, columns.credit)
                    .map(parse_amount)
                    .transpose()?
                    .unwrap_or(0.0);
                credit - debit.abs()
            }
        };

        let provider_categories = field(&record, columns.category)
            .map(|c| {
                c.split(['>', ';', '|'])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let external_id = field(&record, columns.external_id).map(String::from);
        let import_hash = generate_hash(&date, &description, amount, external_id.as_deref());

        transactions.push(NewImportedTransaction {
            external_id,
            date,
            description,
            merchant_name,
            amount,
            provider_categories,
            import_hash,
        });
    }

    debug!("Parsed {} CSV transactions", transactions.len());
    Ok(transactions)
}

/// One transaction as delivered by Plaid's transactions endpoint
#[derive(Debug, Deserialize)]
struct PlaidTransaction {
    transaction_id: Option<String>,
    date: String,
    name: String,
    #[serde(default)]
    merchant_name: Option<String>,
    amount: f64,
    #[serde(default)]
    category: Option<Vec<String>>,
}

/// Either a bare array or Plaid's `{"transactions": [...]}` envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlaidPayload {
    List(Vec<PlaidTransaction>),
    Envelope { transactions: Vec<PlaidTransaction> },
}

/// Parse Plaid-style JSON
///
/// Plaid reports outflows as positive amounts; the sign is kept as delivered.
pub fn parse_plaid_json<R: Read>(reader: R) -> Result<Vec<NewImportedTransaction>> {
    let payload: PlaidPayload = serde_json::from_reader(reader)?;
    let raw = match payload {
        PlaidPayload::List(list) => list,
        PlaidPayload::Envelope { transactions } => transactions,
    };

    let mut transactions = Vec::with_capacity(raw.len());
    for tx in raw {
        let date = parse_date(&tx.date)?;
        let description = tx.name.trim().to_string();
        if description.is_empty() {
            return Err(Error::Import(format!(
                "Transaction on {} has an empty name",
                date
            )));
        }
        let external_id = tx.transaction_id.filter(|id| !id.trim().is_empty());
        let import_hash = generate_hash(&date, &description, tx.amount, external_id.as_deref());

        transactions.push(NewImportedTransaction {
            external_id,
            date,
            description,
            merchant_name: tx.merchant_name.filter(|m| !m.trim().is_empty()),
            amount: tx.amount,
            provider_categories: tx.category.unwrap_or_default(),
            import_hash,
        });
    }

    debug!("Parsed {} Plaid transactions", transactions.len());
    Ok(transactions)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
        "%m-%d-%Y", // 01-15-2024
        "%d/%m/%Y", // 15/01/2024 (European)
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::Import(format!("Unable to parse date: {}", s)))
}

fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned
        .parse::<f64>()
        .map_err(|_| Error::Import(format!("Unable to parse amount: {}", s)))
}

/// Result of one import run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub format: Option<ImportFormat>,
    pub parsed: usize,
    pub inserted: usize,
    pub duplicates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<ApplyRulesSummary>,
}

/// Parse, store and (optionally) rule-match a batch of transactions
pub fn import_transactions<R: Read>(
    db: &Database,
    organization_id: i64,
    reader: R,
    format: ImportFormat,
    apply_rules: bool,
) -> Result<ImportSummary> {
    let parsed = parse(reader, format)?;

    let mut summary = ImportSummary {
        format: Some(format),
        parsed: parsed.len(),
        ..Default::default()
    };

    for tx in &parsed {
        let stored = db.insert_imported_transaction(organization_id, tx)?;
        if stored.duplicate_of.is_some() {
            summary.duplicates += 1;
        } else {
            summary.inserted += 1;
        }
    }

    if apply_rules && summary.inserted > 0 {
        summary.rules = Some(RuleEngine::new(db).apply_rules_to_new(organization_id)?);
    }

    info!(
        organization_id,
        format = format.as_str(),
        parsed = summary.parsed,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        "Import finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("01/15/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(
            parse_date("2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("-45.99").unwrap(), -45.99);
        assert_eq!(parse_amount("$1,234.56").unwrap(), 1234.56);
        assert_eq!(parse_amount("(12.00)").unwrap(), -12.0);
        assert!(parse_amount("n/a").is_err());
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(ImportFormat::detect(Some("export.JSON"), ""), ImportFormat::PlaidJson);
        assert_eq!(ImportFormat::detect(Some("bank.csv"), "[1]"), ImportFormat::Csv);
        assert_eq!(ImportFormat::detect(None, "  [{\"a\":1}]"), ImportFormat::PlaidJson);
        assert_eq!(ImportFormat::detect(None, "Date,Amount"), ImportFormat::Csv);
        assert_eq!("plaid".parse::<ImportFormat>().unwrap(), ImportFormat::PlaidJson);
        assert!("ofx".parse::<ImportFormat>().is_err());
    }

    #[test]
    fn test_parse_csv_detects_columns() {
        let data = "\
Transaction Date,Post Date,Description,Merchant,Category,Amount,Transaction ID
01/15/2024,01/16/2024,UBER TRIP 123,Uber,Travel > Taxi,-23.50,abc-1
01/16/2024,01/17/2024,STAPLES #442,,Shopping,-12.99,
";
        let txs = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(txs.len(), 2);

        assert_eq!(txs[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(txs[0].description, "UBER TRIP 123");
        assert_eq!(txs[0].merchant_name.as_deref(), Some("Uber"));
        assert_eq!(txs[0].amount, -23.50);
        assert_eq!(txs[0].provider_categories, vec!["Travel", "Taxi"]);
        assert_eq!(txs[0].external_id.as_deref(), Some("abc-1"));

        assert_eq!(txs[1].merchant_name, None);
        assert_eq!(txs[1].external_id, None);
        assert_ne!(txs[0].import_hash, txs[1].import_hash);
    }

    #[test]
    fn test_parse_csv_debit_credit_columns() {
        let data = "Date,Name,Debit,Credit\n2024-02-01,Coffee,4.50,\n2024-02-02,Refund,,10.00\n";
        let txs = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(txs[0].amount, -4.50);
        assert_eq!(txs[1].amount, 10.0);
    }

    #[test]
    fn test_parse_csv_requires_columns() {
        assert!(parse_csv("Description,Amount\nCoffee,4.50\n".as_bytes()).is_err());
        assert!(parse_csv("Date,Description\n2024-01-01,Coffee\n".as_bytes()).is_err());
    }

    #[test]
    fn test_parse_csv_skips_blank_rows() {
        let data = "Date,Description,Amount\n2024-01-01,Coffee,-4.50\n,,\n";
        assert_eq!(parse_csv(data.as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_plaid_json_array_and_envelope() {
        let array = r#"[
            {"transaction_id": "tx1", "date": "2024-03-01", "name": "Uber 063015 SF**POOL**",
             "merchant_name": "Uber", "amount": 6.33, "category": ["Travel", "Taxi"]},
            {"transaction_id": "tx2", "date": "2024-03-02", "name": "Starbucks", "amount": 4.75}
        ]"#;
        let txs = parse_plaid_json(array.as_bytes()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].merchant_name.as_deref(), Some("Uber"));
        assert_eq!(txs[0].provider_categories, vec!["Travel", "Taxi"]);
        assert!(txs[1].provider_categories.is_empty());

        let envelope = format!(r#"{{"transactions": {}}}"#, array);
        assert_eq!(parse_plaid_json(envelope.as_bytes()).unwrap().len(), 2);
    }

    #[test]
    fn test_hash_includes_external_id() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let a = generate_hash(&date, "Coffee", 4.5, Some("a"));
        let b = generate_hash(&date, "Coffee", 4.5, Some("b"));
        assert_ne!(a, b);
        assert_eq!(a, generate_hash(&date, "Coffee", 4.5, Some("a")));
        assert_eq!(a.len(), 64);
    }
}

//! Payloads exchanged with the ledger service.
//!
//! The harness never interprets these beyond identifiers and amounts; their
//! remaining fields only have to be structurally valid for the service.

use serde::{Deserialize, Serialize};

pub mod generator;

pub use generator::{random_account, random_journal_entry, random_ledger};

pub type LedgerId = String;
pub type AccountId = String;
pub type Amount = u64;

pub const MINOR_UNITS: u64 = 100; // 1.00 = 100 minor units

/// Renders minor units the way the service expects them on the wire ("50.00").
pub fn format_amount(amount: Amount) -> String {
    format!("{}.{:02}", amount / MINOR_UNITS, amount % MINOR_UNITS)
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl LedgerType {
    pub const ALL: [LedgerType; 5] = [
        LedgerType::Asset,
        LedgerType::Liability,
        LedgerType::Equity,
        LedgerType::Revenue,
        LedgerType::Expense,
    ];
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub identifier: LedgerId,
    #[serde(rename = "type")]
    pub ledger_type: LedgerType,
    pub name: String,
    pub description: Option<String>,
    pub show_accounts_in_chart: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub identifier: AccountId,
    pub ledger: LedgerId,
    #[serde(rename = "type")]
    pub account_type: LedgerType,
    pub name: String,
    pub holders: Vec<String>,
    pub balance: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Debtor {
    pub account_number: AccountId,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Creditor {
    pub account_number: AccountId,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub transaction_identifier: String,
    /// Milliseconds since the Unix epoch.
    pub transaction_date: u64,
    pub transaction_type: String,
    pub clerk: String,
    pub note: Option<String>,
    pub message: Option<String>,
    pub debtors: Vec<Debtor>,
    pub creditors: Vec<Creditor>,
}

impl JournalEntry {
    /// Widened so many large debit lines cannot overflow the total.
    pub fn debit_total(&self) -> u128 {
        self.debtors.iter().map(|d| u128::from(d.amount)).sum()
    }

    pub fn credit_total(&self) -> u128 {
        self.creditors.iter().map(|c| u128::from(c.amount)).sum()
    }

    pub fn is_balanced(&self) -> bool {
        !self.debtors.is_empty()
            && !self.creditors.is_empty()
            && self.debit_total() == self.credit_total()
    }
}

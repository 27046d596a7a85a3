use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use rand::Rng;

use super::{Account, Amount, Creditor, Debtor, JournalEntry, Ledger, LedgerType};

const TRANSACTION_TYPES: [&str; 4] = ["BCHQ", "ICCT", "OCCT", "DDWT"];

/// 16 random bytes, hex encoded. Wide enough that a fixture of tens of
/// thousands of entities never collides in practice.
pub fn random_identifier<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    hex::encode(bytes)
}

fn random_word<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn pick_type<R: Rng + ?Sized>(rng: &mut R) -> LedgerType {
    *LedgerType::ALL
        .choose(rng)
        .unwrap_or(&LedgerType::Asset)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn random_ledger<R: Rng + ?Sized>(rng: &mut R) -> Ledger {
    Ledger {
        identifier: random_identifier(rng),
        ledger_type: pick_type(rng),
        name: random_word(rng, 12),
        description: Some(random_word(rng, 32)),
        show_accounts_in_chart: rng.gen(),
    }
}

pub fn random_account<R: Rng + ?Sized>(rng: &mut R, ledger: &str) -> Account {
    Account {
        identifier: random_identifier(rng),
        ledger: ledger.to_string(),
        account_type: pick_type(rng),
        name: random_word(rng, 12),
        holders: vec![random_word(rng, 8)],
        balance: 0,
    }
}

/// Single debtor, single creditor. Balanced whenever both amounts match.
pub fn random_journal_entry<R: Rng + ?Sized>(
    rng: &mut R,
    debtor: &Account,
    debtor_amount: Amount,
    creditor: &Account,
    creditor_amount: Amount,
) -> JournalEntry {
    JournalEntry {
        transaction_identifier: random_identifier(rng),
        transaction_date: now_millis(),
        transaction_type: TRANSACTION_TYPES
            .choose(rng)
            .copied()
            .unwrap_or("BCHQ")
            .to_string(),
        clerk: random_word(rng, 8),
        note: Some(random_word(rng, 16)),
        message: None,
        debtors: vec![Debtor {
            account_number: debtor.identifier.clone(),
            amount: debtor_amount,
        }],
        creditors: vec![Creditor {
            account_number: creditor.identifier.clone(),
            amount: creditor_amount,
        }],
    }
}

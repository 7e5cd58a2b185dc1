//! Read-side views over debts and payments.
//!
//! Weekly grouping for debt listings, daily grouping for payment history,
//! and charged/collected/pending totals for the income report. All pure
//! over already-fetched records except `total_outstanding`, which reads
//! through the store.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::LedgerError;
use crate::models::{Debt, Payment};
use crate::money::Cents;
use crate::store::LedgerStore;

// ---------------------------------------------------------------------------
// Outstanding balance
// ---------------------------------------------------------------------------

/// Total outstanding balance for one debtor (active debts only).
pub fn total_outstanding<S: LedgerStore>(store: &S, debtor_id: &str) -> Result<Cents, LedgerError> {
    let debts = store
        .list_active_debts(debtor_id)
        .map_err(LedgerError::persistence("list outstanding debts"))?;
    Ok(sum_outstanding(&debts))
}

/// Sum of outstanding balances over a debt set.
pub fn sum_outstanding(debts: &[Debt]) -> Cents {
    debts.iter().map(|d| d.balance).sum()
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Calendar date of a record timestamp.
///
/// Accepts RFC 3339 and SQLite's `datetime('now')` format. Unparseable
/// values bucket under today rather than being dropped; that keeps
/// malformed rows visible, at the cost of possibly misfiling old ones.
fn record_date(raw: &str) -> NaiveDate {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.date_naive();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return dt.date();
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d;
    }
    warn!(timestamp = %raw, "Unparseable record timestamp, bucketing under today");
    Utc::now().date_naive()
}

/// Group debts by the Monday of their ISO week, most recent week first.
/// Order within a bucket is the caller's order.
pub fn group_by_week(debts: &[Debt]) -> Vec<(NaiveDate, Vec<&Debt>)> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&Debt>> = BTreeMap::new();
    for debt in debts {
        let monday = record_date(&debt.created_at).week(Weekday::Mon).first_day();
        buckets.entry(monday).or_default().push(debt);
    }
    buckets.into_iter().rev().collect()
}

/// Group payments by calendar day, most recent day first.
/// Order within a bucket is the caller's order.
pub fn group_by_day(payments: &[Payment]) -> Vec<(NaiveDate, Vec<&Payment>)> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&Payment>> = BTreeMap::new();
    for payment in payments {
        buckets
            .entry(record_date(&payment.created_at))
            .or_default()
            .push(payment);
    }
    buckets.into_iter().rev().collect()
}

// ---------------------------------------------------------------------------
// Period totals
// ---------------------------------------------------------------------------

/// Income-report totals over a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    /// Sum of original debt amounts charged in the period.
    pub charged: Cents,
    /// Charged minus pending: what has actually been collected.
    pub collected: Cents,
    /// Sum of outstanding balances on the period's debts.
    pub pending: Cents,
}

/// Totals over debts whose creation date falls within `[start, end]`
/// inclusive.
pub fn period_totals(debts: &[Debt], start: NaiveDate, end: NaiveDate) -> PeriodTotals {
    let mut charged = Cents::ZERO;
    let mut pending = Cents::ZERO;

    for debt in debts {
        let date = record_date(&debt.created_at);
        if date < start || date > end {
            continue;
        }
        charged += debt.amount;
        pending += debt.balance;
    }

    PeriodTotals {
        charged,
        collected: charged - pending,
        pending,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

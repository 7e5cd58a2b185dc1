//! Error taxonomy for the ledger core.
//!
//! Store-level failures (`StoreError`) are always wrapped into a
//! `LedgerError` before they reach a caller; no raw rusqlite error escapes
//! the crate. A settlement that dies mid-write-back reports exactly which
//! payment inserts and balance updates were durably written so the caller
//! can reconcile instead of re-running the whole allocation blindly.

use serde::Serialize;
use thiserror::Error;

use crate::models::PaymentKind;
use crate::money::Cents;

// ---------------------------------------------------------------------------
// Store boundary
// ---------------------------------------------------------------------------

/// Failure at the ledger-store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Lock,

    /// The debt's version moved between read and write: a concurrent
    /// settlement landed first. The caller must re-read and recompute.
    #[error("debt {debt_id} changed concurrently (expected v{expected_version})")]
    Conflict {
        debt_id: String,
        expected_version: i64,
    },

    #[error("debt {debt_id} no longer exists")]
    RowMissing { debt_id: String },
}

// ---------------------------------------------------------------------------
// Settlement report
// ---------------------------------------------------------------------------

/// Durability of a single allocation step at the time a settlement failed.
///
/// Each step is two writes: the payment insert, then the debt balance
/// update. A step with `payment_persisted` and not `balance_persisted` left
/// a payment on record against a stale balance and needs manual attention.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub debt_id: String,
    pub amount: Cents,
    pub kind: PaymentKind,
    pub payment_persisted: bool,
    pub balance_persisted: bool,
}

impl StepReport {
    pub fn committed(&self) -> bool {
        self.payment_persisted && self.balance_persisted
    }
}

/// What a failed settlement actually did before stopping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub debtor_id: String,
    pub tendered: Cents,
    /// Every step the write-back attempted, in oldest-first order.
    pub steps: Vec<StepReport>,
}

impl SettlementReport {
    /// Steps with both writes durable.
    pub fn committed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.committed()).count()
    }

    /// Money durably applied to debts (fully committed steps only).
    pub fn committed_amount(&self) -> Cents {
        self.steps
            .iter()
            .filter(|s| s.committed())
            .map(|s| s.amount)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Ledger errors
// ---------------------------------------------------------------------------

/// Everything a ledger operation can fail with.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Non-positive or unparsable money amount. Raised before any I/O.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Unknown or inactive entity (debtor, collector, dish, debt).
    #[error("not found: {0}")]
    NotFound(String),

    /// A read or write failed before anything was durably written; the
    /// operation is safe to retry as-is.
    #[error("persistence failure during {step}: {source}")]
    Persistence {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    /// Some settlement writes landed, some did not. Not retry-safe: the
    /// caller must re-read the (now smaller) outstanding debts first.
    #[error(
        "settlement for {} interrupted after {} of {} step(s): {source}",
        .report.debtor_id,
        .report.committed_steps(),
        .report.steps.len()
    )]
    PartialSettlement {
        report: SettlementReport,
        #[source]
        source: StoreError,
    },
}

impl LedgerError {
    pub(crate) fn persistence(step: &'static str) -> impl FnOnce(StoreError) -> LedgerError {
        move |source| LedgerError::Persistence { step, source }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_committed_accounting() {
        let report = SettlementReport {
            debtor_id: "cust-1".into(),
            tendered: Cents(6000),
            steps: vec![
                StepReport {
                    debt_id: "d1".into(),
                    amount: Cents(5000),
                    kind: PaymentKind::Full,
                    payment_persisted: true,
                    balance_persisted: true,
                },
                StepReport {
                    debt_id: "d2".into(),
                    amount: Cents(1000),
                    kind: PaymentKind::Partial,
                    payment_persisted: true,
                    balance_persisted: false,
                },
            ],
        };
        assert_eq!(report.committed_steps(), 1);
        assert_eq!(report.committed_amount(), Cents(5000));
    }

    #[test]
    fn test_partial_settlement_message_names_progress() {
        let err = LedgerError::PartialSettlement {
            report: SettlementReport {
                debtor_id: "cust-9".into(),
                tendered: Cents(100),
                steps: vec![StepReport {
                    debt_id: "d1".into(),
                    amount: Cents(100),
                    kind: PaymentKind::Full,
                    payment_persisted: true,
                    balance_persisted: false,
                }],
            },
            source: StoreError::Conflict {
                debt_id: "d1".into(),
                expected_version: 1,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("cust-9"));
        assert!(msg.contains("0 of 1"));
    }
}

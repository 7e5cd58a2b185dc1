//! Payment settlement: allocate one tendered amount across a debtor's
//! outstanding debts, oldest first.
//!
//! The allocation itself is a pure function over the fetched debt list;
//! write-back then persists one payment insert plus one balance update per
//! touched debt, in the same oldest-first order. There is no multi-row
//! transaction and no compensating rollback: once a step is durable it
//! stands, like cash already handed over. A write failure stops the
//! sequence and returns a per-step durability report.

use tracing::{info, warn};

use crate::error::{LedgerError, SettlementReport, StepReport, StoreError};
use crate::models::{Debt, NewPayment, Payment, PaymentKind};
use crate::money::Cents;
use crate::store::LedgerStore;

// ---------------------------------------------------------------------------
// Allocation plan (pure)
// ---------------------------------------------------------------------------

/// One step of an allocation plan: how much of `debt` a settlement will
/// clear and what the balance becomes.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub debt: Debt,
    pub applied: Cents,
    pub new_balance: Cents,
    pub kind: PaymentKind,
}

/// Distribute `tendered` across `debts` in the order given.
///
/// Returns the planned steps and the unapplied remainder. Conservation
/// holds by construction: the applied amounts plus the remainder always sum
/// to `tendered`. Debts with no balance are skipped; no balance ever goes
/// below zero.
pub fn plan_allocation(debts: &[Debt], tendered: Cents) -> (Vec<PlannedStep>, Cents) {
    let mut remaining = tendered;
    let mut steps = Vec::new();

    for debt in debts {
        if !remaining.is_positive() {
            break;
        }
        if !debt.balance.is_positive() {
            continue;
        }

        let applied = debt.balance.min(remaining);
        let new_balance = debt.balance - applied;
        let kind = if new_balance.is_zero() {
            PaymentKind::Full
        } else {
            PaymentKind::Partial
        };

        steps.push(PlannedStep {
            debt: debt.clone(),
            applied,
            new_balance,
            kind,
        });
        remaining -= applied;
    }

    (steps, remaining)
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// One persisted settlement line.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementLine {
    pub debt_id: String,
    pub payment_id: String,
    pub applied: Cents,
    pub kind: PaymentKind,
    pub new_balance: Cents,
}

/// Outcome of a completed settlement.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub debtor_id: String,
    pub collector_id: String,
    pub tendered: Cents,
    pub lines: Vec<SettlementLine>,
    /// Money left after every eligible debt was cleared: change due back,
    /// or the whole tendered amount for a debtor with nothing outstanding.
    pub unapplied: Cents,
}

/// Settle `tendered` against `debtor_id`'s outstanding debts.
///
/// Validates the amount before any I/O, resolves debtor and collector
/// (the collector must be an active admin), fetches active debts oldest
/// first, then persists payment + balance-update pairs step by step.
///
/// Error shape follows how far things got: a failure before the first
/// durable write is [`LedgerError::Persistence`] and retry-safe; a failure
/// after is [`LedgerError::PartialSettlement`] with an exact report, and
/// the caller must re-read the remaining debts before trying again.
pub fn settle_payment<S: LedgerStore>(
    store: &S,
    debtor_id: &str,
    collector_id: &str,
    tendered: Cents,
) -> Result<Settlement, LedgerError> {
    if !tendered.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "tendered amount must be positive, got {tendered}"
        )));
    }

    store
        .get_active_customer(debtor_id)
        .map_err(LedgerError::persistence("fetch debtor"))?
        .ok_or_else(|| LedgerError::NotFound(format!("debtor {debtor_id}")))?;

    let collector = store
        .get_active_customer(collector_id)
        .map_err(LedgerError::persistence("fetch collector"))?
        .ok_or_else(|| LedgerError::NotFound(format!("collector {collector_id}")))?;
    if !collector.is_admin {
        return Err(LedgerError::NotFound(format!(
            "staff collector {collector_id}"
        )));
    }

    let debts = store
        .list_active_debts(debtor_id)
        .map_err(LedgerError::persistence("list outstanding debts"))?;

    let (steps, unapplied) = plan_allocation(&debts, tendered);

    let mut lines: Vec<SettlementLine> = Vec::with_capacity(steps.len());
    let mut committed: Vec<StepReport> = Vec::with_capacity(steps.len());

    for step in &steps {
        let payment = match store.insert_payment(&NewPayment {
            debtor_id: debtor_id.to_string(),
            collector_id: collector_id.to_string(),
            debt_id: step.debt.id.clone(),
            amount: step.applied,
            kind: step.kind,
            method: None,
        }) {
            Ok(p) => p,
            Err(source) => {
                return Err(write_failure(
                    debtor_id, tendered, committed, step, false, source,
                ));
            }
        };

        if let Err(source) =
            store.update_debt_balance(&step.debt.id, step.new_balance, step.debt.version)
        {
            return Err(write_failure(
                debtor_id, tendered, committed, step, true, source,
            ));
        }

        committed.push(step_report(step, true, true));
        lines.push(SettlementLine {
            debt_id: step.debt.id.clone(),
            payment_id: payment.id,
            applied: step.applied,
            kind: step.kind,
            new_balance: step.new_balance,
        });
    }

    info!(
        debtor_id = %debtor_id,
        collector_id = %collector_id,
        tendered = %tendered,
        debts_touched = lines.len(),
        unapplied = %unapplied,
        "Settlement recorded"
    );

    Ok(Settlement {
        debtor_id: debtor_id.to_string(),
        collector_id: collector_id.to_string(),
        tendered,
        lines,
        unapplied,
    })
}

fn step_report(step: &PlannedStep, payment_persisted: bool, balance_persisted: bool) -> StepReport {
    StepReport {
        debt_id: step.debt.id.clone(),
        amount: step.applied,
        kind: step.kind,
        payment_persisted,
        balance_persisted,
    }
}

/// Classify a mid-sequence write failure.
///
/// Nothing durable yet means plain `Persistence` (safe to retry as-is);
/// anything already on disk means `PartialSettlement` with the report.
fn write_failure(
    debtor_id: &str,
    tendered: Cents,
    mut committed: Vec<StepReport>,
    failed_step: &PlannedStep,
    payment_persisted: bool,
    source: StoreError,
) -> LedgerError {
    if committed.is_empty() && !payment_persisted {
        warn!(
            debtor_id = %debtor_id,
            debt_id = %failed_step.debt.id,
            error = %source,
            "Settlement failed before any write landed"
        );
        return LedgerError::Persistence {
            step: "insert payment",
            source,
        };
    }

    committed.push(step_report(failed_step, payment_persisted, false));
    let report = SettlementReport {
        debtor_id: debtor_id.to_string(),
        tendered,
        steps: committed,
    };
    warn!(
        debtor_id = %debtor_id,
        committed_steps = report.committed_steps(),
        attempted_steps = report.steps.len(),
        error = %source,
        "Settlement interrupted mid-write-back"
    );
    LedgerError::PartialSettlement { report, source }
}

// ===========================================================================
// Tests
// ===========================================================================

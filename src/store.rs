//! Ledger store boundary.
//!
//! The settlement and reporting code only ever talks to this trait, so the
//! backing store can be swapped (or faulted, in tests) without touching the
//! allocation logic. The production implementation lives on [`DbState`].

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use crate::db::DbState;
use crate::error::StoreError;
use crate::models::{Customer, DateRange, Debt, NewPayment, Payment, PaymentKind};
use crate::money::Cents;

/// Data operations the ledger core needs from its persistent store.
pub trait LedgerStore {
    /// Resolve a customer that exists and is active.
    fn get_active_customer(&self, customer_id: &str) -> Result<Option<Customer>, StoreError>;

    /// Active debts with a positive balance for one debtor, oldest first.
    ///
    /// The ascending creation order is the core business rule: tendered
    /// money pays the oldest charges down first.
    fn list_active_debts(&self, debtor_id: &str) -> Result<Vec<Debt>, StoreError>;

    /// Persist one payment record. Append-only; rows are never revisited.
    fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, StoreError>;

    /// Set a debt's outstanding balance, guarded by its version counter.
    ///
    /// Fails with [`StoreError::Conflict`] when the version moved since the
    /// caller read the debt, and [`StoreError::RowMissing`] when the debt is
    /// gone entirely.
    fn update_debt_balance(
        &self,
        debt_id: &str,
        new_balance: Cents,
        expected_version: i64,
    ) -> Result<(), StoreError>;

    /// Payment history for one debtor, newest first, optionally restricted
    /// to an inclusive calendar-date range.
    fn list_payments(
        &self,
        debtor_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<Payment>, StoreError>;

    /// Debts across all debtors for reporting, optionally restricted to an
    /// inclusive creation-date range. Soft-deleted debts are excluded.
    fn list_debts(&self, range: Option<DateRange>) -> Result<Vec<Debt>, StoreError>;
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

pub(crate) fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        company: row.get(4)?,
        is_admin: row.get::<_, i64>(5)? != 0,
        active: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

pub(crate) fn debt_from_row(row: &Row<'_>) -> rusqlite::Result<Debt> {
    Ok(Debt {
        id: row.get(0)?,
        debtor_id: row.get(1)?,
        registered_by: row.get(2)?,
        dish_id: row.get(3)?,
        dish_price: row.get::<_, Option<i64>>(4)?.map(Cents),
        amount: Cents(row.get(5)?),
        balance: Cents(row.get(6)?),
        description: row.get(7)?,
        active: row.get::<_, i64>(8)? != 0,
        version: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub(crate) const DEBT_COLUMNS: &str = "id, debtor_id, registered_by, dish_id, dish_price_cents,
            amount_cents, balance_cents, description, active, version, created_at";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        debtor_id: row.get(1)?,
        collector_id: row.get(2)?,
        debt_id: row.get(3)?,
        amount: Cents(row.get(4)?),
        kind: PaymentKind::from_string(&row.get::<_, String>(5)?),
        method: row.get(6)?,
        created_at: row.get(7)?,
    })
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

impl DbState {
    fn store_lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }
}

impl LedgerStore for DbState {
    fn get_active_customer(&self, customer_id: &str) -> Result<Option<Customer>, StoreError> {
        let conn = self.store_lock()?;
        let customer = conn
            .query_row(
                "SELECT id, name, email, phone, company, is_admin, active, created_at
                 FROM customers WHERE id = ?1 AND active = 1",
                params![customer_id],
                customer_from_row,
            )
            .optional()?;
        Ok(customer)
    }

    fn list_active_debts(&self, debtor_id: &str) -> Result<Vec<Debt>, StoreError> {
        let conn = self.store_lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DEBT_COLUMNS}
             FROM debts
             WHERE debtor_id = ?1 AND active = 1 AND balance_cents > 0
             ORDER BY created_at ASC"
        ))?;
        let debts = stmt
            .query_map(params![debtor_id], debt_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(debts)
    }

    fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, StoreError> {
        let conn = self.store_lock()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let method = payment.method.as_deref().unwrap_or("cash");

        conn.execute(
            "INSERT INTO payments (
                id, debtor_id, collector_id, debt_id, amount_cents, kind, method, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                payment.debtor_id,
                payment.collector_id,
                payment.debt_id,
                payment.amount.0,
                payment.kind.as_str(),
                method,
                now,
            ],
        )?;

        debug!(payment_id = %id, debt_id = %payment.debt_id, amount = %payment.amount, "Payment row inserted");

        Ok(Payment {
            id,
            debtor_id: payment.debtor_id.clone(),
            collector_id: payment.collector_id.clone(),
            debt_id: payment.debt_id.clone(),
            amount: payment.amount,
            kind: payment.kind,
            method: method.to_string(),
            created_at: now,
        })
    }

    fn update_debt_balance(
        &self,
        debt_id: &str,
        new_balance: Cents,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let conn = self.store_lock()?;
        let changed = conn.execute(
            "UPDATE debts
             SET balance_cents = ?1, version = version + 1
             WHERE id = ?2 AND version = ?3",
            params![new_balance.0, debt_id, expected_version],
        )?;

        if changed == 1 {
            return Ok(());
        }

        // Zero rows touched: either the debt vanished or someone else won
        // the version race. Tell the caller which.
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM debts WHERE id = ?1",
                params![debt_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        if exists {
            Err(StoreError::Conflict {
                debt_id: debt_id.to_string(),
                expected_version,
            })
        } else {
            Err(StoreError::RowMissing {
                debt_id: debt_id.to_string(),
            })
        }
    }

    fn list_payments(
        &self,
        debtor_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<Payment>, StoreError> {
        let conn = self.store_lock()?;
        const COLUMNS: &str =
            "id, debtor_id, collector_id, debt_id, amount_cents, kind, method, created_at";

        let payments = match range {
            Some(r) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM payments
                     WHERE debtor_id = ?1 AND date(created_at) BETWEEN ?2 AND ?3
                     ORDER BY created_at DESC"
                ))?;
                let rows = stmt
                    .query_map(
                        params![debtor_id, r.start.to_string(), r.end.to_string()],
                        payment_from_row,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM payments
                     WHERE debtor_id = ?1
                     ORDER BY created_at DESC"
                ))?;
                let rows = stmt
                    .query_map(params![debtor_id], payment_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(payments)
    }

    fn list_debts(&self, range: Option<DateRange>) -> Result<Vec<Debt>, StoreError> {
        let conn = self.store_lock()?;
        let debts = match range {
            Some(r) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DEBT_COLUMNS} FROM debts
                     WHERE active = 1 AND date(created_at) BETWEEN ?1 AND ?2
                     ORDER BY created_at ASC"
                ))?;
                let rows = stmt
                    .query_map(
                        params![r.start.to_string(), r.end.to_string()],
                        debt_from_row,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DEBT_COLUMNS} FROM debts
                     WHERE active = 1
                     ORDER BY created_at ASC"
                ))?;
                let rows = stmt
                    .query_map([], debt_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(debts)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

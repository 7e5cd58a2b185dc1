//! Customer account management.
//!
//! Customers are debtors; customers flagged as admin also act as staff who
//! register debts and collect payments. Deactivation is a soft delete: the
//! row stays for the audit trail, the account just disappears from listings
//! and from settlement.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;
use crate::error::{LedgerError, StoreError};
use crate::models::{Customer, NewCustomer};
use crate::store::customer_from_row;

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, company, is_admin, active, created_at";

/// Create a customer account.
pub fn create(db: &DbState, new: &NewCustomer) -> Result<Customer, LedgerError> {
    let conn = db.lock("create customer")?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO customers (id, name, email, phone, company, is_admin, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
        params![
            id,
            new.name,
            new.email,
            new.phone,
            new.company,
            new.is_admin as i64,
            now,
        ],
    )
    .map_err(|e| LedgerError::persistence("insert customer")(StoreError::Sqlite(e)))?;

    info!(customer_id = %id, is_admin = new.is_admin, "Customer created");

    Ok(Customer {
        id,
        name: new.name.clone(),
        email: new.email.clone(),
        phone: new.phone.clone(),
        company: new.company.clone(),
        is_admin: new.is_admin,
        active: true,
        created_at: now,
    })
}

/// Fetch a customer by id, active or not.
pub fn get(db: &DbState, customer_id: &str) -> Result<Option<Customer>, LedgerError> {
    let conn = db.lock("fetch customer")?;
    conn.query_row(
        &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1"),
        params![customer_id],
        customer_from_row,
    )
    .optional()
    .map_err(|e| LedgerError::persistence("fetch customer")(StoreError::Sqlite(e)))
}

/// Active non-admin customers, name ascending. This is the collector's
/// working list: people who can owe money.
pub fn list_active(db: &DbState) -> Result<Vec<Customer>, LedgerError> {
    let conn = db.lock("list customers")?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers
             WHERE active = 1 AND is_admin = 0
             ORDER BY name ASC"
        ))
        .map_err(|e| LedgerError::persistence("list customers")(StoreError::Sqlite(e)))?;
    let customers = stmt
        .query_map([], customer_from_row)
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| LedgerError::persistence("list customers")(StoreError::Sqlite(e)))?;
    Ok(customers)
}

/// Soft-delete a customer account.
pub fn deactivate(db: &DbState, customer_id: &str) -> Result<(), LedgerError> {
    let conn = db.lock("deactivate customer")?;
    let changed = conn
        .execute(
            "UPDATE customers SET active = 0 WHERE id = ?1",
            params![customer_id],
        )
        .map_err(|e| LedgerError::persistence("deactivate customer")(StoreError::Sqlite(e)))?;

    if changed == 0 {
        return Err(LedgerError::NotFound(format!("customer {customer_id}")));
    }

    info!(customer_id = %customer_id, "Customer deactivated");
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

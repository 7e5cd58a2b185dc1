//! Debt registration and listing.
//!
//! One debt per consumption event. The amount is fixed at registration and
//! the balance starts equal to it; settlement is the only thing that moves
//! the balance, and only downward.

use chrono::Utc;
use rusqlite::params;
use tracing::info;
use uuid::Uuid;

use crate::catalog;
use crate::db::DbState;
use crate::error::{LedgerError, StoreError};
use crate::models::{Debt, NewDebt};
use crate::store::{debt_from_row, LedgerStore, DEBT_COLUMNS};

/// Register a consumption event as a debt.
///
/// The registrar must be an active admin and the debtor an active non-admin
/// customer. Referencing a dish snapshots its current price into the row;
/// when no explicit amount is given the dish price becomes the charge.
pub fn register(db: &DbState, new: &NewDebt) -> Result<Debt, LedgerError> {
    let registrar = db
        .get_active_customer(&new.registered_by)
        .map_err(LedgerError::persistence("fetch registrar"))?
        .ok_or_else(|| LedgerError::NotFound(format!("registrar {}", new.registered_by)))?;
    if !registrar.is_admin {
        return Err(LedgerError::NotFound(format!(
            "staff registrar {}",
            new.registered_by
        )));
    }

    let debtor = db
        .get_active_customer(&new.debtor_id)
        .map_err(LedgerError::persistence("fetch debtor"))?
        .ok_or_else(|| LedgerError::NotFound(format!("debtor {}", new.debtor_id)))?;
    if debtor.is_admin {
        return Err(LedgerError::NotFound(format!("debtor {}", new.debtor_id)));
    }

    let dish = match &new.dish_id {
        Some(dish_id) => Some(
            catalog::get_dish(db, dish_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("dish {dish_id}")))?,
        ),
        None => None,
    };

    let amount = match (new.amount, &dish) {
        (Some(a), _) => a,
        (None, Some(d)) => d.price,
        (None, None) => {
            return Err(LedgerError::InvalidAmount(
                "debt needs an amount or a dish reference".to_string(),
            ))
        }
    };
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "debt amount must be positive, got {amount}"
        )));
    }

    let conn = db.lock("register debt")?;
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO debts (
            id, debtor_id, registered_by, dish_id, dish_price_cents,
            amount_cents, balance_cents, description, active, version, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, 1, 1, ?8)",
        params![
            id,
            new.debtor_id,
            new.registered_by,
            new.dish_id,
            dish.as_ref().map(|d| d.price.0),
            amount.0,
            new.description,
            now,
        ],
    )
    .map_err(|e| LedgerError::persistence("insert debt")(StoreError::Sqlite(e)))?;

    info!(
        debt_id = %id,
        debtor_id = %new.debtor_id,
        amount = %amount,
        dish_id = new.dish_id.as_deref().unwrap_or("-"),
        "Debt registered"
    );

    Ok(Debt {
        id,
        debtor_id: new.debtor_id.clone(),
        registered_by: new.registered_by.clone(),
        dish_id: new.dish_id.clone(),
        dish_price: dish.map(|d| d.price),
        amount,
        balance: amount,
        description: new.description.clone(),
        active: true,
        version: 1,
        created_at: now,
    })
}

/// Outstanding debts for one debtor, newest first — the listing a customer
/// sees on their own tab. Settlement uses the store's oldest-first read
/// instead.
pub fn outstanding_for(db: &DbState, debtor_id: &str) -> Result<Vec<Debt>, LedgerError> {
    let conn = db.lock("list debtor debts")?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {DEBT_COLUMNS} FROM debts
             WHERE debtor_id = ?1 AND active = 1 AND balance_cents > 0
             ORDER BY created_at DESC"
        ))
        .map_err(|e| LedgerError::persistence("list debtor debts")(StoreError::Sqlite(e)))?;
    let debts = stmt
        .query_map(params![debtor_id], debt_from_row)
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| LedgerError::persistence("list debtor debts")(StoreError::Sqlite(e)))?;
    Ok(debts)
}

/// Soft-delete a debt so it disappears from listings and settlement.
pub fn deactivate(db: &DbState, debt_id: &str) -> Result<(), LedgerError> {
    let conn = db.lock("deactivate debt")?;
    let changed = conn
        .execute(
            "UPDATE debts SET active = 0 WHERE id = ?1",
            params![debt_id],
        )
        .map_err(|e| LedgerError::persistence("deactivate debt")(StoreError::Sqlite(e)))?;

    if changed == 0 {
        return Err(LedgerError::NotFound(format!("debt {debt_id}")));
    }

    info!(debt_id = %debt_id, "Debt deactivated");
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewCustomer, NewDish};
    use crate::money::Cents;
    use crate::{catalog, customers, db};

    struct Fixture {
        db: DbState,
        admin: String,
        debtor: String,
    }

    fn fixture() -> Fixture {
        let db = db::test_db();
        let admin = customers::create(
            &db,
            &NewCustomer {
                name: "Marta".into(),
                email: "marta@example.com".into(),
                phone: None,
                company: None,
                is_admin: true,
            },
        )
        .unwrap()
        .id;
        let debtor = customers::create(
            &db,
            &NewCustomer {
                name: "Pedro".into(),
                email: "pedro@example.com".into(),
                phone: None,
                company: None,
                is_admin: false,
            },
        )
        .unwrap()
        .id;
        Fixture { db, admin, debtor }
    }

    #[test]
    fn test_register_with_dish_snapshots_price() {
        let f = fixture();
        let dish = catalog::create_dish(
            &f.db,
            &NewDish {
                name: "Lomo saltado".into(),
                price: Cents(1800),
                photo_url: None,
            },
        )
        .unwrap();

        let debt = register(
            &f.db,
            &NewDebt {
                debtor_id: f.debtor.clone(),
                registered_by: f.admin.clone(),
                dish_id: Some(dish.id.clone()),
                amount: None,
                description: None,
            },
        )
        .unwrap();
        assert_eq!(debt.amount, Cents(1800));
        assert_eq!(debt.balance, Cents(1800));
        assert_eq!(debt.dish_price, Some(Cents(1800)));

        // A later price hike does not reach back into the historical debt.
        catalog::update_dish(&f.db, &dish.id, "Lomo saltado", Cents(2200), None).unwrap();
        let listed = outstanding_for(&f.db, &f.debtor).unwrap();
        assert_eq!(listed[0].dish_price, Some(Cents(1800)));
        assert_eq!(listed[0].amount, Cents(1800));
    }

    #[test]
    fn test_register_free_form_debt() {
        let f = fixture();
        let debt = register(
            &f.db,
            &NewDebt {
                debtor_id: f.debtor.clone(),
                registered_by: f.admin.clone(),
                dish_id: None,
                amount: Some(Cents(750)),
                description: Some("Gaseosa y pan".into()),
            },
        )
        .unwrap();
        assert_eq!(debt.amount, Cents(750));
        assert_eq!(debt.description.as_deref(), Some("Gaseosa y pan"));
        assert!(debt.dish_id.is_none());
    }

    #[test]
    fn test_register_validation() {
        let f = fixture();

        // no amount, no dish
        let err = register(
            &f.db,
            &NewDebt {
                debtor_id: f.debtor.clone(),
                registered_by: f.admin.clone(),
                dish_id: None,
                amount: None,
                description: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        // non-admin registrar
        let err = register(
            &f.db,
            &NewDebt {
                debtor_id: f.debtor.clone(),
                registered_by: f.debtor.clone(),
                dish_id: None,
                amount: Some(Cents(100)),
                description: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        // unknown dish
        let err = register(
            &f.db,
            &NewDebt {
                debtor_id: f.debtor.clone(),
                registered_by: f.admin.clone(),
                dish_id: Some("missing".into()),
                amount: None,
                description: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_outstanding_for_newest_first_and_deactivate() {
        let f = fixture();
        let older = register(
            &f.db,
            &NewDebt {
                debtor_id: f.debtor.clone(),
                registered_by: f.admin.clone(),
                dish_id: None,
                amount: Some(Cents(1000)),
                description: Some("lunes".into()),
            },
        )
        .unwrap();
        // Force distinct creation times; uuids alone don't order.
        {
            let conn = f.db.conn.lock().unwrap();
            conn.execute(
                "UPDATE debts SET created_at = '2024-01-01T10:00:00+00:00' WHERE id = ?1",
                params![older.id],
            )
            .unwrap();
        }
        let newer = register(
            &f.db,
            &NewDebt {
                debtor_id: f.debtor.clone(),
                registered_by: f.admin.clone(),
                dish_id: None,
                amount: Some(Cents(2000)),
                description: Some("martes".into()),
            },
        )
        .unwrap();

        let listed = outstanding_for(&f.db, &f.debtor).unwrap();
        assert_eq!(listed[0].id, newer.id, "newest first for display");
        assert_eq!(listed[1].id, older.id);

        deactivate(&f.db, &older.id).unwrap();
        let listed = outstanding_for(&f.db, &f.debtor).unwrap();
        assert_eq!(listed.len(), 1);
        // and the store's settlement read skips it too
        assert_eq!(f.db.list_active_debts(&f.debtor).unwrap().len(), 1);
    }
}

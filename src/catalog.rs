//! Dish catalog management.
//!
//! Dishes carry the current price only; debts snapshot the price at charge
//! time (`debts.dish_price_cents`), so editing a dish here never changes
//! what anyone already owes.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;
use crate::error::{LedgerError, StoreError};
use crate::models::{Dish, NewDish};
use crate::money::Cents;

const DISH_COLUMNS: &str = "id, name, price_cents, photo_url, active, created_at, updated_at";

fn dish_from_row(row: &Row<'_>) -> rusqlite::Result<Dish> {
    Ok(Dish {
        id: row.get(0)?,
        name: row.get(1)?,
        price: Cents(row.get(2)?),
        photo_url: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Add a dish to the catalog.
pub fn create_dish(db: &DbState, new: &NewDish) -> Result<Dish, LedgerError> {
    if !new.price.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "dish price must be positive, got {}",
            new.price
        )));
    }

    let conn = db.lock("create dish")?;
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO dishes (id, name, price_cents, photo_url, active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
        params![id, new.name, new.price.0, new.photo_url, now],
    )
    .map_err(|e| LedgerError::persistence("insert dish")(StoreError::Sqlite(e)))?;

    info!(dish_id = %id, name = %new.name, price = %new.price, "Dish created");

    Ok(Dish {
        id,
        name: new.name.clone(),
        price: new.price,
        photo_url: new.photo_url.clone(),
        active: true,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Fetch one active dish.
pub fn get_dish(db: &DbState, dish_id: &str) -> Result<Option<Dish>, LedgerError> {
    let conn = db.lock("fetch dish")?;
    conn.query_row(
        &format!("SELECT {DISH_COLUMNS} FROM dishes WHERE id = ?1 AND active = 1"),
        params![dish_id],
        dish_from_row,
    )
    .optional()
    .map_err(|e| LedgerError::persistence("fetch dish")(StoreError::Sqlite(e)))
}

/// Active dishes, name ascending.
pub fn list_active(db: &DbState) -> Result<Vec<Dish>, LedgerError> {
    let conn = db.lock("list dishes")?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {DISH_COLUMNS} FROM dishes WHERE active = 1 ORDER BY name ASC"
        ))
        .map_err(|e| LedgerError::persistence("list dishes")(StoreError::Sqlite(e)))?;
    let dishes = stmt
        .query_map([], dish_from_row)
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| LedgerError::persistence("list dishes")(StoreError::Sqlite(e)))?;
    Ok(dishes)
}

/// Update a dish's name and price; the photo changes only when a new one is
/// supplied.
pub fn update_dish(
    db: &DbState,
    dish_id: &str,
    name: &str,
    price: Cents,
    photo_url: Option<&str>,
) -> Result<(), LedgerError> {
    if !price.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "dish price must be positive, got {price}"
        )));
    }

    let conn = db.lock("update dish")?;
    let now = Utc::now().to_rfc3339();

    let changed = match photo_url {
        Some(url) => conn.execute(
            "UPDATE dishes SET name = ?1, price_cents = ?2, photo_url = ?3, updated_at = ?4
             WHERE id = ?5",
            params![name, price.0, url, now, dish_id],
        ),
        None => conn.execute(
            "UPDATE dishes SET name = ?1, price_cents = ?2, updated_at = ?3
             WHERE id = ?4",
            params![name, price.0, now, dish_id],
        ),
    }
    .map_err(|e| LedgerError::persistence("update dish")(StoreError::Sqlite(e)))?;

    if changed == 0 {
        return Err(LedgerError::NotFound(format!("dish {dish_id}")));
    }

    info!(dish_id = %dish_id, price = %price, "Dish updated");
    Ok(())
}

/// Soft-delete a dish from the catalog.
pub fn deactivate_dish(db: &DbState, dish_id: &str) -> Result<(), LedgerError> {
    let conn = db.lock("deactivate dish")?;
    let changed = conn
        .execute(
            "UPDATE dishes SET active = 0, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), dish_id],
        )
        .map_err(|e| LedgerError::persistence("deactivate dish")(StoreError::Sqlite(e)))?;

    if changed == 0 {
        return Err(LedgerError::NotFound(format!("dish {dish_id}")));
    }

    info!(dish_id = %dish_id, "Dish deactivated");
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn new_dish(name: &str, price: i64) -> NewDish {
        NewDish {
            name: name.to_string(),
            price: Cents(price),
            photo_url: None,
        }
    }

    #[test]
    fn test_create_list_sorted() {
        let db = db::test_db();
        create_dish(&db, &new_dish("Tallarines", 1500)).unwrap();
        create_dish(&db, &new_dish("Arroz chaufa", 1200)).unwrap();

        let names: Vec<String> = list_active(&db).unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Arroz chaufa", "Tallarines"]);
    }

    #[test]
    fn test_create_rejects_non_positive_price() {
        let db = db::test_db();
        assert!(matches!(
            create_dish(&db, &new_dish("Gratis", 0)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_update_keeps_photo_when_not_supplied() {
        let db = db::test_db();
        let dish = create_dish(
            &db,
            &NewDish {
                name: "Ceviche".into(),
                price: Cents(2500),
                photo_url: Some("https://cdn.example.com/ceviche.jpg".into()),
            },
        )
        .unwrap();

        update_dish(&db, &dish.id, "Ceviche mixto", Cents(2800), None).unwrap();
        let updated = get_dish(&db, &dish.id).unwrap().unwrap();
        assert_eq!(updated.name, "Ceviche mixto");
        assert_eq!(updated.price, Cents(2800));
        assert_eq!(
            updated.photo_url.as_deref(),
            Some("https://cdn.example.com/ceviche.jpg"),
            "photo untouched"
        );

        update_dish(
            &db,
            &dish.id,
            "Ceviche mixto",
            Cents(2800),
            Some("https://cdn.example.com/mixto.jpg"),
        )
        .unwrap();
        let updated = get_dish(&db, &dish.id).unwrap().unwrap();
        assert_eq!(
            updated.photo_url.as_deref(),
            Some("https://cdn.example.com/mixto.jpg")
        );
    }

    #[test]
    fn test_deactivate_hides_dish() {
        let db = db::test_db();
        let dish = create_dish(&db, &new_dish("Sopa", 900)).unwrap();
        deactivate_dish(&db, &dish.id).unwrap();

        assert!(get_dish(&db, &dish.id).unwrap().is_none());
        assert!(list_active(&db).unwrap().is_empty());
        assert!(matches!(
            deactivate_dish(&db, "missing"),
            Err(LedgerError::NotFound(_))
        ));
    }
}

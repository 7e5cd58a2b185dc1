//! Local SQLite ledger store.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations and the shared
//! connection state every ledger operation goes through. Money columns are
//! INTEGER minor units (cents); timestamps are RFC 3339 TEXT.

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::error::{LedgerError, StoreError};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    /// Lock the connection, translating a poisoned mutex into a typed error.
    pub(crate) fn lock(
        &self,
        step: &'static str,
    ) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::persistence(step)(StoreError::Lock))
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{data_dir}/ledger.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure the
/// damaged file is moved aside and a fresh database is opened once; the
/// ledger file is the only copy of the payment history, so it is never
/// deleted.
pub fn init(data_dir: &Path) -> Result<DbState, LedgerError> {
    if let Err(e) = fs::create_dir_all(data_dir) {
        warn!("Failed to create data dir {}: {e}", data_dir.display());
        return Err(LedgerError::persistence("create data dir")(
            StoreError::Sqlite(rusqlite::Error::InvalidPath(data_dir.to_path_buf())),
        ));
    }

    let db_path = data_dir.join("ledger.db");
    info!("Opening ledger database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            error!(
                "Database open failed ({}), moving damaged file aside and retrying once",
                first_err
            );
            quarantine_damaged_db(data_dir, &db_path);
            open_and_configure(&db_path)
                .map_err(LedgerError::persistence("open database after retry"))?
        }
    };

    run_migrations(&conn).map_err(LedgerError::persistence("run migrations"))?;

    info!("Ledger database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Move a damaged database file (and its WAL/SHM sidecars) aside so a
/// fresh one can be opened without losing the payment history it holds.
fn quarantine_damaged_db(data_dir: &Path, db_path: &Path) {
    if !db_path.exists() {
        return;
    }
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let quarantine = data_dir.join(format!("ledger.db.corrupt-{stamp}"));
    match fs::rename(db_path, &quarantine) {
        Ok(()) => error!(
            "Damaged ledger database preserved at {}",
            quarantine.display()
        ),
        Err(e) => {
            warn!("Could not move damaged database aside: {e}");
            return;
        }
    }
    // The WAL/SHM sidecars belong to the damaged file; keep them with it.
    for suffix in ["wal", "shm"] {
        let side = db_path.with_extension(format!("db-{suffix}"));
        if side.exists() {
            let side_quarantine = data_dir.join(format!("ledger.db.corrupt-{stamp}-{suffix}"));
            let _ = fs::rename(&side, &side_quarantine);
        }
    }
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    // Ensure schema_version table exists first
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: customers, dishes, debts, payments.
fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        -- customers (debtors and admin collectors)
        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            company TEXT,
            is_admin INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- dishes (priced catalog items)
        CREATE TABLE IF NOT EXISTS dishes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            photo_url TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- debts (one row per consumption event; balance only shrinks)
        CREATE TABLE IF NOT EXISTS debts (
            id TEXT PRIMARY KEY,
            debtor_id TEXT NOT NULL REFERENCES customers(id),
            registered_by TEXT NOT NULL REFERENCES customers(id),
            dish_id TEXT REFERENCES dishes(id),
            dish_price_cents INTEGER,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            balance_cents INTEGER NOT NULL
                CHECK (balance_cents >= 0 AND balance_cents <= amount_cents),
            description TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- payments (append-only; one row per payment-event/debt pair)
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            debtor_id TEXT NOT NULL REFERENCES customers(id),
            collector_id TEXT NOT NULL REFERENCES customers(id),
            debt_id TEXT NOT NULL REFERENCES debts(id),
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            kind TEXT NOT NULL DEFAULT 'partial',
            method TEXT NOT NULL DEFAULT 'cash',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_debts_debtor_created
            ON debts(debtor_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_payments_debtor_created
            ON payments(debtor_id, created_at);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;
    info!("Migration v1 applied (core ledger tables)");
    Ok(())
}

/// Migration v2: per-debt version counter for compare-and-swap balance
/// updates. Two collectors settling the same customer at once can no longer
/// both apply against the same stale balance.
fn migrate_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        ALTER TABLE debts ADD COLUMN version INTEGER NOT NULL DEFAULT 1;

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )?;
    info!("Migration v2 applied (debt version column)");
    Ok(())
}

/// Test helper: run all migrations on an arbitrary connection.
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

/// Test helper: fresh in-memory database with the full schema.
#[cfg(test)]
pub(crate) fn test_db() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .expect("pragma setup");
    run_migrations_for_test(&conn);
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let db = test_db();
        let conn = db.conn.lock().unwrap();
        // Running again must be a no-op, not a duplicate-table error.
        run_migrations(&conn).expect("second run is a no-op");
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_damaged_database_is_preserved_not_deleted() {
        let dir = std::env::temp_dir().join(format!("fiado_test_corrupt_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("ledger.db"), b"not a sqlite file").unwrap();

        let db = init(&dir).expect("init recovers onto a fresh database");
        drop(db);

        let preserved: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("ledger.db.corrupt-"))
            .collect();
        assert_eq!(
            preserved.len(),
            1,
            "damaged file must be kept, found {preserved:?}"
        );
        let contents = fs::read(dir.join(&preserved[0])).unwrap();
        assert_eq!(contents, b"not a sqlite file");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_balance_check_constraint() {
        let db = test_db();
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO customers (id, name, email) VALUES ('c1', 'Ana', 'ana@example.com')",
            [],
        )
        .unwrap();
        // balance above amount violates the invariant at the schema level too
        let res = conn.execute(
            "INSERT INTO debts (id, debtor_id, registered_by, amount_cents, balance_cents)
             VALUES ('d1', 'c1', 'c1', 100, 200)",
            [],
        );
        assert!(res.is_err(), "balance > amount must be rejected");

        let res = conn.execute(
            "INSERT INTO debts (id, debtor_id, registered_by, amount_cents, balance_cents)
             VALUES ('d2', 'c1', 'c1', 100, -1)",
            [],
        );
        assert!(res.is_err(), "negative balance must be rejected");
    }
}

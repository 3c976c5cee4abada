//! SQLite persistence for accounts and orders.
//!
//! The store holds the authoritative snapshot of every account and its
//! orders (resolved ones included, for audit). The one rule that matters
//! here: a fill's cash movement, share movement and order transition are
//! written inside a single transaction via [`SqliteStore::save_user_state`],
//! so a crash can never leave a half-applied fill on disk.

use crate::types::{Account, Holding, Order};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info};

/// SQLite store for account and order snapshots.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                user_id TEXT PRIMARY KEY,
                cash_balance REAL NOT NULL,
                holdings_json TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                payload_json TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
            [],
        )?;

        Ok(())
    }

    // ========== Account Methods ==========

    /// Insert or update an account row.
    pub fn save_account(&self, account: &Account) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        Self::upsert_account(&conn, account)
    }

    fn upsert_account(conn: &Connection, account: &Account) -> Result<(), rusqlite::Error> {
        let holdings_json =
            serde_json::to_string(&account.holdings).unwrap_or_else(|_| "{}".to_string());

        conn.execute(
            "INSERT INTO accounts (user_id, cash_balance, holdings_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                cash_balance = excluded.cash_balance,
                holdings_json = excluded.holdings_json,
                updated_at = excluded.updated_at",
            params![
                account.user_id,
                account.cash_balance,
                holdings_json,
                account.created_at,
                account.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Load every persisted account.
    pub fn load_accounts(&self) -> Vec<Account> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = match conn.prepare(
            "SELECT user_id, cash_balance, holdings_json, created_at, updated_at FROM accounts",
        ) {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Failed to prepare account query: {}", e);
                return Vec::new();
            }
        };

        let rows = stmt.query_map([], |row| {
            let holdings_json: String = row.get(2)?;
            let holdings: BTreeMap<String, Holding> =
                serde_json::from_str(&holdings_json).unwrap_or_default();

            Ok(Account {
                user_id: row.get(0)?,
                cash_balance: row.get(1)?,
                holdings,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        });

        match rows {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(e) => {
                error!("Failed to load accounts: {}", e);
                Vec::new()
            }
        }
    }

    /// Get total account count.
    pub fn account_count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
            .unwrap_or(0)
    }

    // ========== Order Methods ==========

    /// Insert or update a single order row.
    pub fn save_order(&self, order: &Order) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        Self::upsert_order(&conn, order)
    }

    fn upsert_order(conn: &Connection, order: &Order) -> Result<(), rusqlite::Error> {
        let payload_json = serde_json::to_string(order)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        conn.execute(
            "INSERT INTO orders (id, user_id, symbol, status, created_at, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                payload_json = excluded.payload_json",
            params![
                order.id,
                order.user_id,
                order.symbol,
                order.status.to_string(),
                order.created_at,
                payload_json,
            ],
        )?;
        Ok(())
    }

    /// Load every persisted order, resolved ones included.
    pub fn load_orders(&self) -> Vec<Order> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = match conn.prepare("SELECT payload_json FROM orders ORDER BY created_at") {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Failed to prepare order query: {}", e);
                return Vec::new();
            }
        };

        let rows = stmt.query_map([], |row| {
            let payload_json: String = row.get(0)?;
            Ok(payload_json)
        });

        match rows {
            Ok(rows) => rows
                .filter_map(|r| r.ok())
                .filter_map(|json| match serde_json::from_str::<Order>(&json) {
                    Ok(order) => Some(order),
                    Err(e) => {
                        error!("Skipping undecodable order row: {}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                error!("Failed to load orders: {}", e);
                Vec::new()
            }
        }
    }

    /// Count orders in `status` for one user.
    pub fn order_count(&self, user_id: &str, status: &str) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE user_id = ?1 AND status = ?2",
            params![user_id, status],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    /// Delete all orders for one user (account reset).
    pub fn delete_user_orders(&self, user_id: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM orders WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }

    // ========== Transactional Snapshot ==========

    /// Write an account and a set of its orders as one transaction.
    ///
    /// This is the fill commit path: either the whole post-fill state
    /// lands on disk or none of it does.
    pub fn save_user_state(
        &self,
        account: &Account,
        orders: &[&Order],
    ) -> Result<(), rusqlite::Error> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        Self::upsert_account(&tx, account)?;
        for order in orders {
            debug_assert_eq!(order.user_id, account.user_id);
            Self::upsert_order(&tx, order)?;
        }

        tx.commit()?;
        debug!("Persisted state for {}", account.user_id);
        Ok(())
    }
}

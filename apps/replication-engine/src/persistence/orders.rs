//! Order record store.
//!
//! One row per completed executor call, success or failure. The consumer
//! only appends; the reconciler only transitions `status`. Rows are never
//! deleted by the pipeline.
//!
//! Uses Turso (Rust rewrite of `SQLite`) for durable storage.

use async_trait::async_trait;
use thiserror::Error;
use turso::{Builder, Database, Error as TursoError, Value};

use crate::models::{NonTerminalOrder, OrderRecord};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Database connection error.
    #[error("database connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("query error: {0}")]
    Query(String),

    /// Missing or malformed column.
    #[error("missing field: {0}")]
    MissingField(String),
}

impl From<TursoError> for PersistenceError {
    fn from(err: TursoError) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Store contract for order records.
#[async_trait]
pub trait OrderRecordStore: Send + Sync {
    /// Append one attempt outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the row cannot be written.
    async fn save(&self, record: &OrderRecord) -> Result<(), PersistenceError>;

    /// Orders whose status is outside the terminal set and that carry a
    /// venue order id, for the reconciler scan.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the scan fails.
    async fn find_non_terminal(&self) -> Result<Vec<NonTerminalOrder>, PersistenceError>;

    /// Transition the status of the row identified by `order_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the update fails.
    async fn set_status(&self, order_id: &str, status: &str) -> Result<(), PersistenceError>;
}

/// Turso-backed order record store.
pub struct TursoOrderStore {
    db: Database,
}

impl TursoOrderStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open(path: &str) -> Result<Self, PersistenceError> {
        let db = Builder::new_local(path).build().await?;
        Self::run_migrations(&db).await?;
        Ok(Self { db })
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        Self::open(":memory:").await
    }

    async fn run_migrations(db: &Database) -> Result<(), PersistenceError> {
        let conn = db.connect()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exchange TEXT NOT NULL,
                symbol TEXT NOT NULL,
                order_id TEXT NOT NULL DEFAULT '',
                client_order_id TEXT NOT NULL DEFAULT '',
                side TEXT NOT NULL,
                order_type TEXT NOT NULL,
                price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_orders_order_id
             ON orders(order_id);

            CREATE INDEX IF NOT EXISTS idx_orders_status_exchange
             ON orders(status, exchange);",
        )
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        tracing::debug!("Order store migrations complete");
        Ok(())
    }

    /// Number of rows currently carrying `status` (audit queries).
    pub async fn count_with_status(&self, status: &str) -> Result<u64, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(status.to_string())];

        let mut rows = conn
            .query("SELECT COUNT(*) FROM orders WHERE status = ?", params)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?
            .ok_or_else(|| PersistenceError::MissingField("count".to_string()))?;

        let count = row
            .get::<i64>(0)
            .map_err(|e| PersistenceError::MissingField(format!("count: {e}")))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Current status of the row carrying `order_id`, if any.
    pub async fn status_of(&self, order_id: &str) -> Result<Option<String>, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(order_id.to_string())];

        let mut rows = conn
            .query("SELECT status FROM orders WHERE order_id = ?", params)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?
        {
            Some(row) => {
                let status = row
                    .get::<String>(0)
                    .map_err(|e| PersistenceError::MissingField(format!("status: {e}")))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderRecordStore for TursoOrderStore {
    async fn save(&self, record: &OrderRecord) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;

        let params: Vec<Value> = vec![
            Value::Text(record.exchange.clone()),
            Value::Text(record.symbol.clone()),
            Value::Text(record.order_id.clone()),
            Value::Text(record.client_order_id.clone()),
            Value::Text(record.side.clone()),
            Value::Text(record.order_type.clone()),
            Value::Text(record.price.to_string()),
            Value::Text(record.quantity.to_string()),
            Value::Text(record.status.clone()),
            Value::Text(record.error_message.clone()),
        ];

        conn.execute(
            "INSERT INTO orders (
                exchange, symbol, order_id, client_order_id, side,
                order_type, price, quantity, status, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params,
        )
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        tracing::debug!(
            exchange = %record.exchange,
            order_id = %record.order_id,
            status = %record.status,
            "Order record saved"
        );
        Ok(())
    }

    async fn find_non_terminal(&self) -> Result<Vec<NonTerminalOrder>, PersistenceError> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                "SELECT exchange, symbol, order_id FROM orders
                 WHERE status NOT IN ('FILLED', 'CANCELLED', 'REJECTED', 'failed')
                   AND order_id != ''",
                Vec::<Value>::new(),
            )
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let mut orders = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?
        {
            orders.push(NonTerminalOrder {
                exchange: row
                    .get::<String>(0)
                    .map_err(|e| PersistenceError::MissingField(format!("exchange: {e}")))?,
                symbol: row
                    .get::<String>(1)
                    .map_err(|e| PersistenceError::MissingField(format!("symbol: {e}")))?,
                order_id: row
                    .get::<String>(2)
                    .map_err(|e| PersistenceError::MissingField(format!("order_id: {e}")))?,
            });
        }
        Ok(orders)
    }

    async fn set_status(&self, order_id: &str, status: &str) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;

        let params: Vec<Value> = vec![
            Value::Text(status.to_string()),
            Value::Text(order_id.to_string()),
        ];

        conn.execute(
            "UPDATE orders SET status = ?, updated_at = datetime('now') WHERE order_id = ?",
            params,
        )
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        tracing::debug!(order_id = %order_id, status = %status, "Order status updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn record(exchange: &str, order_id: &str, status: &str) -> OrderRecord {
        OrderRecord {
            exchange: exchange.to_string(),
            symbol: "BTCUSDT".to_string(),
            order_id: order_id.to_string(),
            client_order_id: "client-1".to_string(),
            side: "BUY".to_string(),
            order_type: "MARKET".to_string(),
            price: Decimal::ZERO,
            quantity: Decimal::ONE,
            status: status.to_string(),
            error_message: String::new(),
        }
    }

    #[tokio::test]
    async fn saves_and_scans_non_terminal() {
        let store = TursoOrderStore::in_memory().await.unwrap();

        store.save(&record("okx", "a", "success")).await.unwrap();
        store.save(&record("okx", "b", "FILLED")).await.unwrap();
        store.save(&record("bybit", "c", "NEW")).await.unwrap();
        // Failed submissions have no order id and are skipped.
        store.save(&record("bybit", "", "failed")).await.unwrap();

        let open = store.find_non_terminal().await.unwrap();
        let ids: Vec<&str> = open.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn set_status_moves_order_out_of_scan() {
        let store = TursoOrderStore::in_memory().await.unwrap();
        store.save(&record("okx", "a", "NEW")).await.unwrap();

        store.set_status("a", "FILLED").await.unwrap();

        assert!(store.find_non_terminal().await.unwrap().is_empty());
        assert_eq!(store.status_of("a").await.unwrap().as_deref(), Some("FILLED"));
    }

    #[tokio::test]
    async fn counts_by_status() {
        let store = TursoOrderStore::in_memory().await.unwrap();
        store.save(&record("okx", "a", "success")).await.unwrap();
        store.save(&record("bybit", "b", "success")).await.unwrap();
        store.save(&record("bybit", "", "failed")).await.unwrap();

        assert_eq!(store.count_with_status("success").await.unwrap(), 2);
        assert_eq!(store.count_with_status("failed").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn multiple_failed_rows_allowed() {
        // Failed attempts have no order id and append freely.
        let store = TursoOrderStore::in_memory().await.unwrap();
        store.save(&record("okx", "", "failed")).await.unwrap();
        store.save(&record("okx", "", "failed")).await.unwrap();
        assert_eq!(store.count_with_status("failed").await.unwrap(), 2);
    }
}

//! Database schema migrations.
//!
//! Version 1 creates the customer, session, message, and profile tables
//! plus the product catalog tables.

use rusqlite::Connection;
use tracing::info;

use concierge_core::error::ConciergeError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), ConciergeError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ConciergeError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            ConciergeError::Storage(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!(version = 1, "Applied migration: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema. Timestamps are epoch milliseconds.
fn apply_v1(conn: &Connection) -> Result<(), ConciergeError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS customers (
            customer_id     TEXT PRIMARY KEY NOT NULL,
            email           TEXT NOT NULL UNIQUE,
            phone           TEXT,
            first_name      TEXT,
            last_name       TEXT,
            created_at      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            session_id      TEXT PRIMARY KEY NOT NULL,
            customer_id     TEXT NOT NULL,
            channel         TEXT NOT NULL,
            start_time      INTEGER NOT NULL,
            end_time        INTEGER,
            last_activity   INTEGER NOT NULL,
            status          TEXT NOT NULL DEFAULT 'active'
                            CHECK (status IN ('active', 'ended')),
            FOREIGN KEY (customer_id) REFERENCES customers(customer_id)
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_customer
            ON sessions (customer_id);

        CREATE INDEX IF NOT EXISTS idx_sessions_status
            ON sessions (status);

        CREATE TABLE IF NOT EXISTS messages (
            message_id       TEXT PRIMARY KEY NOT NULL,
            session_id       TEXT NOT NULL,
            sender           TEXT NOT NULL
                             CHECK (sender IN ('customer', 'assistant')),
            content          TEXT NOT NULL,
            content_encoding TEXT NOT NULL DEFAULT 'plain'
                             CHECK (content_encoding IN ('plain', 'aes256gcm-v1')),
            sentiment        TEXT,
            sentiment_score  REAL,
            intent           TEXT,
            timestamp        INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(session_id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages (session_id, timestamp DESC);

        CREATE TABLE IF NOT EXISTS customer_profiles (
            customer_id     TEXT PRIMARY KEY NOT NULL,
            preferences     TEXT,
            lifetime_value  REAL,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL,
            FOREIGN KEY (customer_id) REFERENCES customers(customer_id)
        );

        CREATE TABLE IF NOT EXISTS products (
            product_id      TEXT PRIMARY KEY NOT NULL,
            name            TEXT NOT NULL,
            description     TEXT,
            price           REAL NOT NULL,
            category        TEXT,
            brand           TEXT,
            images          TEXT,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_products_category
            ON products (category);

        CREATE TABLE IF NOT EXISTS inventory (
            inventory_id      TEXT PRIMARY KEY NOT NULL,
            product_id        TEXT NOT NULL,
            size              TEXT,
            color             TEXT,
            quantity          INTEGER NOT NULL DEFAULT 0,
            reserved_quantity INTEGER NOT NULL DEFAULT 0,
            updated_at        INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            FOREIGN KEY (product_id) REFERENCES products(product_id),
            UNIQUE (product_id, size, color)
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| ConciergeError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_session_requires_customer() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO sessions (session_id, customer_id, channel, start_time, last_activity)
             VALUES ('s-1', 'ghost', 'web', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_message_encoding_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO customers (customer_id, email, created_at) VALUES ('c-1', 'a@b.c', 0);
             INSERT INTO sessions (session_id, customer_id, channel, start_time, last_activity)
             VALUES ('s-1', 'c-1', 'web', 0, 0);",
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO messages (message_id, session_id, sender, content, content_encoding, timestamp)
             VALUES ('m-1', 's-1', 'customer', 'hi', 'rot13', 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_tables_exist() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO products (product_id, name, price) VALUES ('p-1', 'Jacket', 120.0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO inventory (inventory_id, product_id, size, color, quantity)
             VALUES ('i-1', 'p-1', 'M', 'black', 4)",
            [],
        )
        .unwrap();

        let duplicate = conn.execute(
            "INSERT INTO inventory (inventory_id, product_id, size, color)
             VALUES ('i-2', 'p-1', 'M', 'black')",
            [],
        );
        assert!(duplicate.is_err());
    }
}

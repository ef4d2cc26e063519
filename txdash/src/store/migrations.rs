use rusqlite::Connection;

use super::StorageError;

struct Migration {
    version: i64,
    sql: &'static str,
}

// Statements are guarded with IF NOT EXISTS so an existing `sql_app.db` that
// predates `schema_version` is adopted in place.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
CREATE TABLE IF NOT EXISTS transactions (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    card_scheme         TEXT NOT NULL,
    transaction_date    TEXT NOT NULL,
    transaction_time    TEXT NOT NULL,
    reject_code         TEXT NOT NULL,
    reject_description  TEXT NOT NULL,
    timestamp           TEXT NOT NULL
);
"#,
    },
    Migration {
        version: 2,
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_transactions_timestamp ON transactions(timestamp);
CREATE INDEX IF NOT EXISTS idx_transactions_scheme ON transactions(card_scheme);
CREATE INDEX IF NOT EXISTS idx_transactions_reject_code ON transactions(reject_code);
CREATE INDEX IF NOT EXISTS idx_transactions_scheme_code ON transactions(card_scheme, reject_code);
"#,
    },
];

pub(super) fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);",
    )?;

    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(&format!(
            "BEGIN;\n{}\nINSERT INTO schema_version (version) VALUES ({});\nCOMMIT;",
            migration.sql, migration.version
        ))
        .map_err(|e| {
            let _ = conn.execute_batch("ROLLBACK;");
            StorageError::Migration(format!("version {}: {e}", migration.version))
        })?;
        tracing::debug!(version = migration.version, "applied store migration");
    }

    Ok(())
}

/// Schema of a database created before versioned migrations existed.
#[cfg(test)]
pub(super) const LEGACY_SCHEMA: &str = r#"
CREATE TABLE transactions (
    id INTEGER NOT NULL,
    card_scheme VARCHAR,
    transaction_date VARCHAR,
    transaction_time VARCHAR,
    reject_code VARCHAR,
    reject_description VARCHAR,
    timestamp DATETIME,
    PRIMARY KEY (id)
);
CREATE INDEX ix_transactions_id ON transactions (id);
CREATE INDEX ix_transactions_card_scheme ON transactions (card_scheme);
CREATE INDEX ix_transactions_timestamp ON transactions (timestamp);
"#;

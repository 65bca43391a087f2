//! Database schema definitions for the metadata store
//!
//! One row per canonical key; `key` carries the unique index the atomic
//! upsert relies on.

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sites (
    key TEXT PRIMARY KEY NOT NULL,
    content_hash TEXT NOT NULL,
    last_fetched TEXT NOT NULL,
    last_updated TEXT,
    back_link_count INTEGER NOT NULL DEFAULT 0,
    content TEXT
);

CREATE INDEX IF NOT EXISTS idx_sites_last_fetched ON sites(last_fetched);
"#;

/// Initializes the database schema
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_sites_table_exists_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='sites'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_key_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let insert = "INSERT INTO sites (key, content_hash, last_fetched) VALUES ('a/', 'h', 't')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}

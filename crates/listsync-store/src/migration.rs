//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Canonical business profiles (mirrored from the location service)
        CREATE TABLE locations (
            location_id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            name TEXT NOT NULL,
            address TEXT NOT NULL DEFAULT '',
            address2 TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT '',
            postal_code TEXT NOT NULL DEFAULT '',
            country TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            website TEXT NOT NULL DEFAULT '',
            category TEXT,                    -- nullable
            created_at INTEGER NOT NULL       -- Unix ms
        );

        -- Platform authorization grants
        CREATE TABLE credentials (
            credential_id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            platform TEXT NOT NULL,           -- lowercase platform name
            external_account_id TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            auth TEXT NOT NULL,               -- opaque token material
            metadata BLOB NOT NULL            -- CBOR CredentialMetadata
        );

        -- Listing mirrors
        CREATE TABLE listings (
            listing_id BLOB PRIMARY KEY,      -- 32 bytes, derived from the slot triple
            location_id TEXT NOT NULL,
            workspace_id TEXT NOT NULL,
            platform TEXT NOT NULL,
            credential_id TEXT NOT NULL,
            external_id TEXT,                 -- nullable until first publish
            status TEXT NOT NULL,             -- ListingStatus wire name
            discrepancies BLOB NOT NULL,      -- CBOR DiscrepancySet
            has_discrepancies INTEGER NOT NULL DEFAULT 0,
            last_synced_at INTEGER,           -- Unix ms, nullable
            observed BLOB NOT NULL,           -- CBOR FieldValues
            snapshot_digest TEXT,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,

            UNIQUE(location_id, platform, credential_id)
        );

        CREATE INDEX idx_locations_workspace ON locations(workspace_id);
        CREATE INDEX idx_credentials_workspace ON credentials(workspace_id, platform);
        CREATE INDEX idx_listings_workspace ON listings(workspace_id);
        CREATE INDEX idx_listings_location ON listings(location_id);
        CREATE INDEX idx_listings_credential ON listings(credential_id);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

//! SQLite implementation of the Store trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! tokio::spawn_blocking. Nested values (discrepancies, observed fields,
//! credential metadata) are stored as CBOR blobs.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use listsync_core::{
    Credential, CredentialId, Listing, ListingId, ListingStatus, Location, LocationId, Platform,
    WorkspaceId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, ListingFilter, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: DeserializeOwned>(idx: usize, bytes: &[u8]) -> rusqlite::Result<T> {
    ciborium::from_reader(bytes).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, e.to_string().into())
    })
}

fn parse_platform(idx: usize, s: &str) -> rusqlite::Result<Platform> {
    s.parse::<Platform>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

const LOCATION_COLUMNS: &str = "location_id, workspace_id, name, address, address2, city, state,
     postal_code, country, phone, website, category, created_at";

fn row_to_location(row: &rusqlite::Row<'_>) -> rusqlite::Result<Location> {
    Ok(Location {
        id: LocationId::new(row.get::<_, String>(0)?),
        workspace_id: WorkspaceId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        address: row.get(3)?,
        address2: row.get(4)?,
        city: row.get(5)?,
        state: row.get(6)?,
        postal_code: row.get(7)?,
        country: row.get(8)?,
        phone: row.get(9)?,
        website: row.get(10)?,
        category: row.get(11)?,
        created_at: row.get(12)?,
    })
}

const CREDENTIAL_COLUMNS: &str =
    "credential_id, workspace_id, platform, external_account_id, is_active, auth, metadata";

fn row_to_credential(row: &rusqlite::Row<'_>) -> rusqlite::Result<Credential> {
    let platform: String = row.get(2)?;
    let metadata: Vec<u8> = row.get(6)?;
    Ok(Credential {
        id: CredentialId::new(row.get::<_, String>(0)?),
        workspace_id: WorkspaceId::new(row.get::<_, String>(1)?),
        platform: parse_platform(2, &platform)?,
        external_account_id: row.get(3)?,
        is_active: row.get(4)?,
        auth: row.get(5)?,
        metadata: decode_cbor(6, &metadata)?,
    })
}

const LISTING_COLUMNS: &str = "listing_id, location_id, workspace_id, platform, credential_id,
     external_id, status, discrepancies, last_synced_at, observed, snapshot_digest, last_error,
     created_at, updated_at";

fn row_to_listing(row: &rusqlite::Row<'_>) -> rusqlite::Result<Listing> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let id: [u8; 32] = id_bytes
        .try_into()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "listing_id".into(), Type::Blob))?;
    let platform: String = row.get(3)?;
    let status: String = row.get(6)?;
    let discrepancies: Vec<u8> = row.get(7)?;
    let observed: Vec<u8> = row.get(9)?;

    Ok(Listing {
        id: ListingId::from_bytes(id),
        location_id: LocationId::new(row.get::<_, String>(1)?),
        workspace_id: WorkspaceId::new(row.get::<_, String>(2)?),
        platform: parse_platform(3, &platform)?,
        credential_id: CredentialId::new(row.get::<_, String>(4)?),
        external_id: row.get(5)?,
        status: ListingStatus::parse(&status)
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(6, "status".into(), Type::Text))?,
        discrepancies: decode_cbor(7, &discrepancies)?,
        last_synced_at: row.get(8)?,
        observed: decode_cbor(9, &observed)?,
        snapshot_digest: row.get(10)?,
        last_error: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Map a UNIQUE violation on the slot triple onto `DuplicateListing`.
fn map_slot_conflict(e: rusqlite::Error, listing: &Listing) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::DuplicateListing {
                location_id: listing.location_id.to_string(),
                platform: listing.platform.to_string(),
                credential_id: listing.credential_id.to_string(),
            }
        }
        other => StoreError::Database(other),
    }
}

/// Encoded blobs for one listing write.
struct ListingBlobs {
    discrepancies: Vec<u8>,
    observed: Vec<u8>,
}

impl ListingBlobs {
    fn encode(listing: &Listing) -> Result<Self> {
        Ok(Self {
            discrepancies: encode_cbor(&listing.discrepancies)?,
            observed: encode_cbor(&listing.observed)?,
        })
    }
}

fn insert_listing_row(conn: &Connection, listing: &Listing, blobs: &ListingBlobs) -> Result<()> {
    conn.execute(
        "INSERT INTO listings (
            listing_id, location_id, workspace_id, platform, credential_id, external_id,
            status, discrepancies, has_discrepancies, last_synced_at, observed,
            snapshot_digest, last_error, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(listing_id) DO UPDATE SET
            external_id = excluded.external_id,
            status = excluded.status,
            discrepancies = excluded.discrepancies,
            has_discrepancies = excluded.has_discrepancies,
            last_synced_at = excluded.last_synced_at,
            observed = excluded.observed,
            snapshot_digest = excluded.snapshot_digest,
            last_error = excluded.last_error,
            updated_at = excluded.updated_at",
        params![
            listing.id.as_bytes().as_slice(),
            listing.location_id.as_str(),
            listing.workspace_id.as_str(),
            listing.platform.as_str(),
            listing.credential_id.as_str(),
            listing.external_id,
            listing.status.as_str(),
            blobs.discrepancies,
            listing.has_discrepancies(),
            listing.last_synced_at,
            blobs.observed,
            listing.snapshot_digest,
            listing.last_error,
            listing.created_at,
            listing.updated_at,
        ],
    )
    .map_err(|e| map_slot_conflict(e, listing))?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_location(&self, id: &LocationId) -> Result<Option<Location>> {
        let id = id.clone();
        self.blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM locations WHERE location_id = ?1", LOCATION_COLUMNS),
                params![id.as_str()],
                row_to_location,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn put_location(&self, location: &Location) -> Result<()> {
        let location = location.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO locations (
                    location_id, workspace_id, name, address, address2, city, state,
                    postal_code, country, phone, website, category, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    location.id.as_str(),
                    location.workspace_id.as_str(),
                    location.name,
                    location.address,
                    location.address2,
                    location.city,
                    location.state,
                    location.postal_code,
                    location.country,
                    location.phone,
                    location.website,
                    location.category,
                    location.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_location(&self, id: &LocationId) -> Result<bool> {
        let id = id.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM listings WHERE location_id = ?1",
                params![id.as_str()],
            )?;
            let removed = tx.execute(
                "DELETE FROM locations WHERE location_id = ?1",
                params![id.as_str()],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_locations(&self, workspace_id: &WorkspaceId) -> Result<Vec<Location>> {
        let workspace_id = workspace_id.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM locations WHERE workspace_id = ?1 ORDER BY location_id",
                LOCATION_COLUMNS
            ))?;
            let locations = stmt
                .query_map(params![workspace_id.as_str()], row_to_location)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(locations)
        })
        .await
    }

    async fn get_credential(&self, id: &CredentialId) -> Result<Option<Credential>> {
        let id = id.clone();
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM credentials WHERE credential_id = ?1",
                    CREDENTIAL_COLUMNS
                ),
                params![id.as_str()],
                row_to_credential,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn put_credential(&self, credential: &Credential) -> Result<()> {
        let credential = credential.clone();
        let metadata = encode_cbor(&credential.metadata)?;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO credentials (
                    credential_id, workspace_id, platform, external_account_id,
                    is_active, auth, metadata
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    credential.id.as_str(),
                    credential.workspace_id.as_str(),
                    credential.platform.as_str(),
                    credential.external_account_id,
                    credential.is_active,
                    credential.auth,
                    metadata,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_credential(&self, id: &CredentialId) -> Result<bool> {
        let id = id.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM listings WHERE credential_id = ?1",
                params![id.as_str()],
            )?;
            let removed = tx.execute(
                "DELETE FROM credentials WHERE credential_id = ?1",
                params![id.as_str()],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_credentials(
        &self,
        workspace_id: &WorkspaceId,
        platform: Option<Platform>,
    ) -> Result<Vec<Credential>> {
        let workspace_id = workspace_id.clone();
        self.blocking(move |conn| {
            let mut values = vec![Value::Text(workspace_id.to_string())];
            let mut sql = format!(
                "SELECT {} FROM credentials WHERE workspace_id = ?1",
                CREDENTIAL_COLUMNS
            );
            if let Some(p) = platform {
                sql.push_str(" AND platform = ?2");
                values.push(Value::Text(p.as_str().to_string()));
            }
            sql.push_str(" ORDER BY credential_id");

            let mut stmt = conn.prepare(&sql)?;
            let credentials = stmt
                .query_map(params_from_iter(values.iter()), row_to_credential)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(credentials)
        })
        .await
    }

    async fn get_listing(&self, id: &ListingId) -> Result<Option<Listing>> {
        let id = *id;
        self.blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM listings WHERE listing_id = ?1", LISTING_COLUMNS),
                params![id.as_bytes().as_slice()],
                row_to_listing,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn insert_listing(&self, listing: &Listing) -> Result<InsertResult> {
        let listing = listing.clone();
        let blobs = ListingBlobs::encode(&listing)?;
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM listings WHERE listing_id = ?1)",
                params![listing.id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(InsertResult::AlreadyExists);
            }
            insert_listing_row(&tx, &listing, &blobs)?;
            tx.commit()?;
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn put_listing(&self, listing: &Listing) -> Result<()> {
        let listing = listing.clone();
        let blobs = ListingBlobs::encode(&listing)?;
        self.blocking(move |conn| insert_listing_row(conn, &listing, &blobs))
            .await
    }

    async fn delete_listing(&self, id: &ListingId) -> Result<bool> {
        let id = *id;
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM listings WHERE listing_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let filter = filter.clone();
        self.blocking(move |conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            let mut push = |column: &str, value: Value| {
                values.push(value);
                clauses.push(format!("{} = ?{}", column, values.len()));
            };

            if let Some(w) = &filter.workspace_id {
                push("workspace_id", Value::Text(w.to_string()));
            }
            if let Some(l) = &filter.location_id {
                push("location_id", Value::Text(l.to_string()));
            }
            if let Some(p) = filter.platform {
                push("platform", Value::Text(p.as_str().to_string()));
            }
            if let Some(c) = &filter.credential_id {
                push("credential_id", Value::Text(c.to_string()));
            }
            if let Some(s) = filter.status {
                push("status", Value::Text(s.as_str().to_string()));
            }
            if let Some(d) = filter.has_discrepancies {
                push("has_discrepancies", Value::Integer(i64::from(d)));
            }

            let mut sql = format!("SELECT {} FROM listings", LISTING_COLUMNS);
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY listing_id");

            let mut stmt = conn.prepare(&sql)?;
            let listings = stmt
                .query_map(params_from_iter(values.iter()), row_to_listing)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(listings)
        })
        .await
    }
}

//! SQLite persistence for contacts, forms and validation records.
//!
//! Contacts are keyed by (listing_id, method, value): re-observation updates
//! the existing row and never inserts a duplicate. Confidence only ever goes
//! up. Validation records are append-only and die with their contact.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mobc::{Manager, Pool};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{Result, ScoutError};
use crate::models::{
    hash_signature, Contact, ContactForm, ContactMethod, ContactStatus, ValidationRecord,
};

pub struct SqliteManager {
    db_path: String,
}

impl SqliteManager {
    pub fn new(db_path: String) -> Self {
        debug!("🔧 Creating SqliteManager for path: {}", db_path);
        Self { db_path }
    }
}

#[async_trait::async_trait]
impl Manager for SqliteManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        debug!("🔌 Opening database: {}", self.db_path);
        let conn = Connection::open(&self.db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        init_schema(&conn)?;
        Ok(conn)
    }

    async fn check(&self, conn: Self::Connection) -> std::result::Result<Self::Connection, Self::Error> {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(conn)
    }
}

pub type DbPool = Pool<SqliteManager>;

fn init_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS listings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT UNIQUE NOT NULL,
            title TEXT,
            created_at TEXT NOT NULL
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            listing_id INTEGER REFERENCES listings(id),
            method TEXT NOT NULL,
            value TEXT NOT NULL,
            confidence_score REAL NOT NULL DEFAULT 0,
            source TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unverified',
            validated_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            hash_signature TEXT NOT NULL,
            UNIQUE(listing_id, method, value)
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS contact_validations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contact_id INTEGER NOT NULL REFERENCES contacts(id),
            validation_method TEXT NOT NULL,
            validation_result INTEGER NOT NULL,
            confidence_score REAL NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            validated_at TEXT NOT NULL
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS contact_forms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contact_id INTEGER NOT NULL REFERENCES contacts(id),
            action_url TEXT NOT NULL,
            http_method TEXT NOT NULL,
            fields TEXT NOT NULL,
            required_fields TEXT NOT NULL,
            csrf_token TEXT,
            complexity REAL NOT NULL,
            friendliness REAL NOT NULL
        )
        "#,
        [],
    )?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_contacts_listing ON contacts(listing_id)",
        "CREATE INDEX IF NOT EXISTS idx_contacts_hash ON contacts(hash_signature)",
        "CREATE INDEX IF NOT EXISTS idx_contacts_status ON contacts(status)",
        "CREATE INDEX IF NOT EXISTS idx_contacts_confidence ON contacts(confidence_score DESC)",
        "CREATE INDEX IF NOT EXISTS idx_validations_contact ON contact_validations(contact_id)",
        "CREATE INDEX IF NOT EXISTS idx_forms_contact ON contact_forms(contact_id)",
    ];
    for sql in indexes {
        conn.execute(sql, [])?;
    }

    Ok(())
}

/// A persisted contact row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredContact {
    pub id: i64,
    pub listing_id: Option<i64>,
    pub method: String,
    pub value: String,
    pub confidence_score: f64,
    pub source: String,
    pub status: String,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Value,
    pub hash_signature: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub status: Option<String>,
    pub min_confidence: Option<f64>,
    pub listing_id: Option<i64>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl SearchQuery {
    pub fn with_limit(limit: usize, offset: usize) -> Self {
        SearchQuery {
            limit,
            offset,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStatistics {
    pub total_contacts: i64,
    pub by_method: HashMap<String, i64>,
    pub by_status: HashMap<String, i64>,
    pub by_confidence_bucket: HashMap<String, i64>,
    pub last_7_days: i64,
    pub last_30_days: i64,
    pub top_sources: Vec<(String, i64)>,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DedupCluster {
    pub hash_signature: String,
    pub contact_ids: Vec<i64>,
    pub listing_ids: Vec<Option<i64>>,
    pub value: String,
}

pub struct ContactStore {
    pool: DbPool,
}

impl ContactStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let manager = SqliteManager::new(db_path.to_string());
        let pool = Pool::builder().max_open(10).max_idle(5).build(manager);
        // Touch one connection so schema errors surface at startup.
        let conn = pool.get().await?;
        drop(conn);
        info!("✓ Contact store ready: {}", db_path);
        Ok(ContactStore { pool })
    }

    pub async fn upsert_listing(&self, url: &str, title: Option<&str>) -> Result<i64> {
        let conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO listings (url, title, created_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (url) DO UPDATE SET title = COALESCE(excluded.title, title)
            "#,
            params![url, title, now],
        )?;
        let id = conn.query_row("SELECT id FROM listings WHERE url = ?1", [url], |row| {
            row.get(0)
        })?;
        Ok(id)
    }

    /// Insert or update a contact keyed by (listing_id, method, value).
    /// A concurrent insert of the same key is retried once.
    pub async fn upsert_contact(
        &self,
        contact: &Contact,
        listing_id: Option<i64>,
    ) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        match upsert_contact_inner(&mut *conn, contact, listing_id) {
            Ok(id) => Ok(id),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!("Upsert conflict for {}; retrying once", contact.value);
                upsert_contact_inner(&mut *conn, contact, listing_id).map_err(|_| {
                    ScoutError::StoreConflict {
                        listing_id,
                        method: contact.method.as_str().to_string(),
                        value: contact.value.clone(),
                    }
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append a validation record and fold its outcome into the contact row.
    pub async fn apply_validation(
        &self,
        contact_id: i64,
        record: &ValidationRecord,
    ) -> Result<i64> {
        let conn = self.pool.get().await?;
        let metadata = crate::validator::record_metadata(record);
        conn.execute(
            r#"
            INSERT INTO contact_validations
                (contact_id, validation_method, validation_result, confidence_score, metadata, validated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                contact_id,
                record.validation_method,
                record.is_valid,
                record.confidence,
                metadata.to_string(),
                record.validated_at.to_rfc3339(),
            ],
        )?;
        let validation_id = conn.last_insert_rowid();

        let status = if record.is_valid { "valid" } else { "invalid" };
        conn.execute(
            "UPDATE contacts SET status = ?1, validated_at = ?2, updated_at = ?2 WHERE id = ?3",
            params![status, Utc::now().to_rfc3339(), contact_id],
        )?;

        Ok(validation_id)
    }

    /// Persist a contact form together with its form-method contact row.
    pub async fn store_form(&self, form: &ContactForm, listing_id: Option<i64>) -> Result<i64> {
        let contact = form.to_contact();
        let contact_id = self.upsert_contact(&contact, listing_id).await?;

        let conn = self.pool.get().await?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM contact_forms WHERE contact_id = ?1 AND action_url = ?2",
                params![contact_id, form.action_url],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            r#"
            INSERT INTO contact_forms
                (contact_id, action_url, http_method, fields, required_fields, csrf_token, complexity, friendliness)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                contact_id,
                form.action_url,
                form.method,
                serde_json::to_string(&form.fields)?,
                serde_json::to_string(&form.required_fields)?,
                form.csrf_token,
                form.complexity_score,
                form.user_friendly_score,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn get_contact(&self, id: i64) -> Result<Option<StoredContact>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_CONTACT),
                [id],
                row_to_contact,
            )
            .optional()?;
        Ok(row)
    }

    /// Rebuild a pipeline `Contact` from a stored row, for re-validation.
    pub async fn contact_for_validation(&self, id: i64) -> Result<Option<Contact>> {
        let Some(stored) = self.get_contact(id).await? else {
            return Ok(None);
        };
        let method = ContactMethod::from_str(&stored.method)
            .map_err(|e| ScoutError::Config(format!("corrupt method column: {}", e)))?;
        let status = match stored.status.as_str() {
            "valid" => ContactStatus::Verified,
            other => ContactStatus::from_str(other).unwrap_or(ContactStatus::Unverified),
        };
        let mut contact = Contact::new(
            method,
            stored.value.clone(),
            crate::models::ConfidenceLevel::from_score(stored.confidence_score),
            stored.source.clone(),
        );
        contact.confidence_score = stored.confidence_score;
        contact.verification_status = status;
        if let Value::Object(map) = stored.metadata {
            contact.metadata = map;
        }
        Ok(Some(contact))
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<StoredContact>> {
        let conn = self.pool.get().await?;

        let mut sql = format!("{} WHERE 1=1", SELECT_CONTACT);
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = &query.status {
            sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
            args.push(Box::new(status.clone()));
        }
        if let Some(min) = query.min_confidence {
            sql.push_str(&format!(" AND confidence_score >= ?{}", args.len() + 1));
            args.push(Box::new(min));
        }
        if let Some(listing_id) = query.listing_id {
            sql.push_str(&format!(" AND listing_id = ?{}", args.len() + 1));
            args.push(Box::new(listing_id));
        }
        if let Some(after) = query.created_after {
            sql.push_str(&format!(" AND created_at >= ?{}", args.len() + 1));
            args.push(Box::new(after.to_rfc3339()));
        }
        if let Some(before) = query.created_before {
            sql.push_str(&format!(" AND created_at <= ?{}", args.len() + 1));
            args.push(Box::new(before.to_rfc3339()));
        }
        if let Some(text) = &query.text {
            let pattern = format!("%{}%", text);
            sql.push_str(&format!(
                " AND (value LIKE ?{} OR source LIKE ?{})",
                args.len() + 1,
                args.len() + 2
            ));
            args.push(Box::new(pattern.clone()));
            args.push(Box::new(pattern));
        }

        sql.push_str(" ORDER BY confidence_score DESC, created_at DESC");
        let limit = if query.limit == 0 { 50 } else { query.limit };
        sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, query.offset));

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), row_to_contact)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn statistics(&self) -> Result<StoreStatistics> {
        let conn = self.pool.get().await?;

        let total_contacts: i64 =
            conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
        let average_confidence: f64 = conn.query_row(
            "SELECT COALESCE(AVG(confidence_score), 0) FROM contacts",
            [],
            |row| row.get(0),
        )?;

        let by_method = group_count(&conn, "SELECT method, COUNT(*) FROM contacts GROUP BY method")?;
        let by_status = group_count(&conn, "SELECT status, COUNT(*) FROM contacts GROUP BY status")?;
        let by_confidence_bucket = group_count(
            &conn,
            r#"
            SELECT CASE
                WHEN confidence_score >= 0.8 THEN 'high'
                WHEN confidence_score >= 0.6 THEN 'medium'
                WHEN confidence_score >= 0.4 THEN 'low'
                ELSE 'uncertain'
            END AS bucket, COUNT(*) FROM contacts GROUP BY bucket
            "#,
        )?;

        let week_ago = (Utc::now() - ChronoDuration::days(7)).to_rfc3339();
        let month_ago = (Utc::now() - ChronoDuration::days(30)).to_rfc3339();
        let last_7_days: i64 = conn.query_row(
            "SELECT COUNT(*) FROM contacts WHERE created_at >= ?1",
            [&week_ago],
            |row| row.get(0),
        )?;
        let last_30_days: i64 = conn.query_row(
            "SELECT COUNT(*) FROM contacts WHERE created_at >= ?1",
            [&month_ago],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) AS n FROM contacts GROUP BY source ORDER BY n DESC LIMIT 5",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut top_sources = Vec::new();
        for row in rows {
            top_sources.push(row?);
        }

        Ok(StoreStatistics {
            total_contacts,
            by_method,
            by_status,
            by_confidence_bucket,
            last_7_days,
            last_30_days,
            top_sources,
            average_confidence,
        })
    }

    /// Delete contacts older than the retention window, validations and form
    /// rows first (FK order). Returns the number of contacts deleted.
    pub async fn cleanup(&self, older_than_days: i64) -> Result<usize> {
        let conn = self.pool.get().await?;
        let cutoff = (Utc::now() - ChronoDuration::days(older_than_days)).to_rfc3339();

        conn.execute(
            "DELETE FROM contact_validations WHERE contact_id IN
                 (SELECT id FROM contacts WHERE created_at < ?1)",
            [&cutoff],
        )?;
        conn.execute(
            "DELETE FROM contact_forms WHERE contact_id IN
                 (SELECT id FROM contacts WHERE created_at < ?1)",
            [&cutoff],
        )?;
        let deleted = conn.execute("DELETE FROM contacts WHERE created_at < ?1", [&cutoff])?;
        info!("🧹 Cleanup removed {} contacts older than {} days", deleted, older_than_days);
        Ok(deleted)
    }

    /// Group repeated observations across listings by hash signature. Purely
    /// informational: nothing is deleted.
    pub async fn dedup_clusters(&self) -> Result<Vec<DedupCluster>> {
        let conn = self.pool.get().await?;
        let mut stmt = conn.prepare(
            r#"
            SELECT hash_signature, id, listing_id, value FROM contacts
            WHERE hash_signature IN (
                SELECT hash_signature FROM contacts GROUP BY hash_signature HAVING COUNT(*) > 1
            )
            ORDER BY hash_signature, id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut clusters: Vec<DedupCluster> = Vec::new();
        for row in rows {
            let (sig, id, listing_id, value) = row?;
            match clusters.last_mut() {
                Some(cluster) if cluster.hash_signature == sig => {
                    cluster.contact_ids.push(id);
                    cluster.listing_ids.push(listing_id);
                }
                _ => clusters.push(DedupCluster {
                    hash_signature: sig,
                    contact_ids: vec![id],
                    listing_ids: vec![listing_id],
                    value,
                }),
            }
        }
        Ok(clusters)
    }
}

const SELECT_CONTACT: &str = r#"
    SELECT id, listing_id, method, value, confidence_score, source, status,
           validated_at, created_at, updated_at, metadata, hash_signature
    FROM contacts
"#;

fn row_to_contact(row: &rusqlite::Row<'_>) -> SqliteResult<StoredContact> {
    let validated_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    let metadata: String = row.get(10)?;

    Ok(StoredContact {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        method: row.get(2)?,
        value: row.get(3)?,
        confidence_score: row.get(4)?,
        source: row.get(5)?,
        status: row.get(6)?,
        validated_at: validated_at.and_then(|s| parse_timestamp(&s)),
        created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
        hash_signature: row.get(11)?,
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn group_count(conn: &Connection, sql: &str) -> SqliteResult<HashMap<String, i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut out = HashMap::new();
    for row in rows {
        let (key, count) = row?;
        out.insert(key, count);
    }
    Ok(out)
}

/// The merge rules live here so they can be exercised without a pool.
fn upsert_contact_inner(
    conn: &mut Connection,
    contact: &Contact,
    listing_id: Option<i64>,
) -> SqliteResult<i64> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let now = Utc::now().to_rfc3339();
    let method = contact.method.as_str();

    let existing: Option<(i64, f64, String)> = tx
        .query_row(
            "SELECT id, confidence_score, metadata FROM contacts
             WHERE listing_id IS ?1 AND method = ?2 AND value = ?3",
            params![listing_id, method, contact.value],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let id = match existing {
        None => {
            let domain = contact.domain().unwrap_or_default();
            let signature = hash_signature(contact.method, &contact.value, &domain);
            let status = status_column(contact.verification_status);
            let validated_at = if contact.verification_status == ContactStatus::Verified {
                Some(now.clone())
            } else {
                None
            };
            tx.execute(
                r#"
                INSERT INTO contacts
                    (listing_id, method, value, confidence_score, source, status,
                     validated_at, created_at, updated_at, metadata, hash_signature)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?10)
                "#,
                params![
                    listing_id,
                    method,
                    contact.value,
                    contact.confidence_score,
                    contact.source_url,
                    status,
                    validated_at,
                    now,
                    Value::Object(contact.metadata.clone()).to_string(),
                    signature,
                ],
            )?;
            tx.last_insert_rowid()
        }
        Some((id, existing_score, existing_metadata)) => {
            // Confidence is monotone: a later observation only raises it.
            let merged_score = existing_score.max(contact.confidence_score);

            // Stronger extraction evidence overwrites the source pointer.
            if matches!(
                contact.extraction_method.as_str(),
                "mailto_link" | "standard_pattern"
            ) {
                tx.execute(
                    "UPDATE contacts SET source = ?1 WHERE id = ?2",
                    params![contact.source_url, id],
                )?;
            }

            if contact.verification_status == ContactStatus::Verified {
                tx.execute(
                    "UPDATE contacts SET status = 'valid', validated_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
            }

            // Merge metadata: new keys win, existing keys are preserved.
            let mut merged: serde_json::Map<String, Value> =
                serde_json::from_str(&existing_metadata).unwrap_or_default();
            for (k, v) in &contact.metadata {
                merged.insert(k.clone(), v.clone());
            }

            tx.execute(
                "UPDATE contacts SET confidence_score = ?1, metadata = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![merged_score, Value::Object(merged).to_string(), now, id],
            )?;
            id
        }
    };

    tx.commit()?;
    Ok(id)
}

fn status_column(status: ContactStatus) -> &'static str {
    match status {
        ContactStatus::Verified => "valid",
        other => other.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConfidenceLevel, ContactMethod};

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "OFF").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn contact(value: &str, score: f64) -> Contact {
        let mut c = Contact::new(
            ContactMethod::Email,
            value,
            ConfidenceLevel::Medium,
            "https://acme.de/kontakt",
        );
        c.confidence_score = score;
        c
    }

    #[test]
    fn upsert_inserts_then_updates_in_place() {
        let mut conn = memory_conn();
        let id1 = upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.6), Some(1)).unwrap();
        let id2 = upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.8), Some(1)).unwrap();
        assert_eq!(id1, id2);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn confidence_is_monotone_under_upsert() {
        let mut conn = memory_conn();
        upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.8), Some(1)).unwrap();
        upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.4), Some(1)).unwrap();

        let score: f64 = conn
            .query_row("SELECT confidence_score FROM contacts", [], |r| r.get(0))
            .unwrap();
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn same_value_different_listing_gets_own_row() {
        let mut conn = memory_conn();
        upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.6), Some(1)).unwrap();
        upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.6), Some(2)).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn null_listing_rows_are_keyed_too() {
        let mut conn = memory_conn();
        let id1 = upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.6), None).unwrap();
        let id2 = upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.7), None).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn verified_observation_sets_valid_status() {
        let mut conn = memory_conn();
        upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.6), Some(1)).unwrap();

        let mut verified = contact("info@acme.de", 0.6);
        verified.verification_status = ContactStatus::Verified;
        upsert_contact_inner(&mut conn, &verified, Some(1)).unwrap();

        let (status, validated_at): (String, Option<String>) = conn
            .query_row(
                "SELECT status, validated_at FROM contacts",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "valid");
        assert!(validated_at.is_some());
    }

    #[test]
    fn stronger_extraction_overwrites_source() {
        let mut conn = memory_conn();
        let mut weak = contact("info@acme.de", 0.5);
        weak.extraction_method = "ocr".into();
        weak.source_url = "https://acme.de/flyer.png".into();
        upsert_contact_inner(&mut conn, &weak, Some(1)).unwrap();

        let mut strong = contact("info@acme.de", 0.5);
        strong.extraction_method = "mailto_link".into();
        strong.source_url = "https://acme.de/kontakt".into();
        upsert_contact_inner(&mut conn, &strong, Some(1)).unwrap();

        let source: String = conn
            .query_row("SELECT source FROM contacts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(source, "https://acme.de/kontakt");

        // An OCR re-observation does not downgrade the pointer back.
        upsert_contact_inner(&mut conn, &weak, Some(1)).unwrap();
        let source: String = conn
            .query_row("SELECT source FROM contacts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(source, "https://acme.de/kontakt");
    }

    #[test]
    fn metadata_merge_prefers_new_keys_keeps_old() {
        let mut conn = memory_conn();
        let mut first = contact("info@acme.de", 0.5);
        first.insert_metadata("a", Value::String("old".into()));
        first.insert_metadata("keep", Value::Bool(true));
        upsert_contact_inner(&mut conn, &first, Some(1)).unwrap();

        let mut second = contact("info@acme.de", 0.5);
        second.insert_metadata("a", Value::String("new".into()));
        upsert_contact_inner(&mut conn, &second, Some(1)).unwrap();

        let metadata: String = conn
            .query_row("SELECT metadata FROM contacts", [], |r| r.get(0))
            .unwrap();
        let parsed: Value = serde_json::from_str(&metadata).unwrap();
        assert_eq!(parsed["a"], Value::String("new".into()));
        assert_eq!(parsed["keep"], Value::Bool(true));
    }

    #[test]
    fn hash_signature_is_written_on_insert() {
        let mut conn = memory_conn();
        upsert_contact_inner(&mut conn, &contact("info@acme.de", 0.5), Some(1)).unwrap();
        let sig: String = conn
            .query_row("SELECT hash_signature FROM contacts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(
            sig,
            hash_signature(ContactMethod::Email, "info@acme.de", "acme.de")
        );
    }

    #[tokio::test]
    async fn pool_roundtrip_with_search_and_stats() {
        let dir = std::env::temp_dir().join(format!("contact-scout-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let db_path = dir.join("store.db");
        let store = ContactStore::open(db_path.to_str().unwrap()).await.unwrap();

        let listing_id = store
            .upsert_listing("https://acme.de/wohnung/1", Some("2-Zimmer Wohnung"))
            .await
            .unwrap();

        let mut c = contact("info@acme.de", 0.9);
        c.insert_metadata("domain", Value::String("acme.de".into()));
        let contact_id = store.upsert_contact(&c, Some(listing_id)).await.unwrap();

        let mut low = contact("fallback@web.de", 0.3);
        low.source_url = "https://acme.de/impressum".into();
        store.upsert_contact(&low, Some(listing_id)).await.unwrap();

        // Search by confidence floor.
        let hits = store
            .search(&SearchQuery {
                min_confidence: Some(0.5),
                ..SearchQuery::with_limit(10, 0)
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, "info@acme.de");

        // Free-text search on value.
        let hits = store
            .search(&SearchQuery {
                text: Some("web.de".into()),
                ..SearchQuery::with_limit(10, 0)
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        // Validation appends and flips status.
        let record = ValidationRecord::new("dns", true, 0.8);
        store.apply_validation(contact_id, &record).await.unwrap();
        let stored = store.get_contact(contact_id).await.unwrap().unwrap();
        assert_eq!(stored.status, "valid");
        assert!(stored.validated_at.is_some());

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_contacts, 2);
        assert_eq!(stats.by_method.get("email"), Some(&2));
        assert_eq!(stats.last_7_days, 2);
        assert!(stats.average_confidence > 0.0);

        // Nothing is old enough for cleanup.
        let deleted = store.cleanup(30).await.unwrap();
        assert_eq!(deleted, 0);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn dedup_clusters_group_same_signature_across_listings() {
        let dir = std::env::temp_dir().join(format!("contact-scout-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let db_path = dir.join("store.db");
        let store = ContactStore::open(db_path.to_str().unwrap()).await.unwrap();

        let first = store
            .upsert_listing("https://acme.de/wohnung/1", None)
            .await
            .unwrap();
        let second = store
            .upsert_listing("https://acme.de/wohnung/2", None)
            .await
            .unwrap();

        store
            .upsert_contact(&contact("info@acme.de", 0.5), Some(first))
            .await
            .unwrap();
        store
            .upsert_contact(&contact("info@acme.de", 0.6), Some(second))
            .await
            .unwrap();
        store
            .upsert_contact(&contact("unique@acme.de", 0.6), Some(first))
            .await
            .unwrap();

        let clusters = store.dedup_clusters().await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].contact_ids.len(), 2);
        assert_eq!(clusters[0].value, "info@acme.de");

        // The cluster pass never deletes rows.
        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_contacts, 3);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}

//! SQLite-backed audit sink.

mod migrations;

use crate::clock::MonotonicClock;
use crate::sink::{ActorDirectory, AuditSink};
use crate::SinkError;
use async_trait::async_trait;
use bastion_audit_types::{
    AuditAction, AuditEvent, AuditFilter, AuditMetadata, AuditRecord, AuditTarget, RecordSeal,
    GENESIS_HASH,
};
use bastion_common_config::StorageSettings;
use bastion_common_core::{AuditRecordId, SubjectId};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

const MEMORY_PATH: &str = ":memory:";

const LAST_RECORDED_AT: &str =
    "SELECT recorded_at FROM audit_records ORDER BY sequence DESC LIMIT 1";

const LAST_LINK: &str = "SELECT sequence, hash FROM audit_records ORDER BY sequence DESC LIMIT 1";

const RECORD_COLUMNS: &str = "sequence, id, entity_type, entity_id, action, actor_subject, \
     recorded_at, metadata, origin, client, prev_hash, hash, actor_digest";

/// Connection settings for [`SqliteAuditSink`].
#[derive(Debug, Clone)]
pub struct SqliteSinkConfig {
    /// Database file path, or `:memory:`.
    pub database_path: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long to wait on a locked database.
    pub busy_timeout: Duration,
    /// Records per query page.
    pub page_size: usize,
}

impl Default for SqliteSinkConfig {
    fn default() -> Self {
        Self::from(&StorageSettings::default())
    }
}

impl From<&StorageSettings> for SqliteSinkConfig {
    fn from(settings: &StorageSettings) -> Self {
        Self {
            database_path: settings.database_path.clone(),
            max_connections: settings.max_connections,
            busy_timeout: Duration::from_millis(settings.busy_timeout_ms),
            page_size: settings.page_size,
        }
    }
}

impl SqliteSinkConfig {
    /// A private in-memory database on a single long-lived connection.
    pub fn in_memory() -> Self {
        Self {
            database_path: MEMORY_PATH.to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }

    /// Use a database file.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path == MEMORY_PATH
    }
}

/// Audit sink stored in SQLite.
///
/// Append-only is enforced twice: the Rust interface has no mutating
/// operation, and triggers abort any UPDATE or DELETE that reaches the table
/// through other means. The only permitted change is the foreign key's
/// `ON DELETE SET NULL` on `actor_subject`.
pub struct SqliteAuditSink {
    pool: SqlitePool,
    // Serializes appends so sequence and chain are computed without races.
    writer: Mutex<MonotonicClock>,
    page_size: usize,
}

impl SqliteAuditSink {
    /// Connect, apply migrations and resume the clock after the last record.
    #[instrument(skip(config), fields(path = %config.database_path))]
    pub async fn open(config: SqliteSinkConfig) -> Result<Self, SinkError> {
        let in_memory = config.is_in_memory();

        let mut options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", config.database_path))
                .map_err(|e| SinkError::Rejected(e.to_string()))?
                .create_if_missing(true)
                .foreign_keys(true)
                .busy_timeout(config.busy_timeout);
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Full);
        }

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if in_memory {
            // every connection would otherwise see its own empty database
            pool_options = pool_options
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        migrations::run(&pool).await?;

        let last = sqlx::query(LAST_RECORDED_AT)
            .fetch_optional(&pool)
            .await?
            .map(|row| -> Result<DateTime<Utc>, SinkError> {
                parse_timestamp(&row.try_get::<String, _>("recorded_at")?)
            })
            .transpose()?;

        info!(
            max_connections = config.max_connections,
            page_size = config.page_size,
            "Audit store opened"
        );

        Ok(Self {
            pool,
            writer: Mutex::new(MonotonicClock::starting_after(last)),
            page_size: config.page_size.max(1),
        })
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, mut event: AuditEvent) -> Result<AuditRecordId, SinkError> {
        let id = event.ensure_id();
        let mut clock = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT 1 FROM audit_records WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(SinkError::Duplicate(id));
        }

        let last = sqlx::query(LAST_LINK)
            .fetch_optional(&mut *tx)
            .await?;
        let (sequence, prev_hash) = match last {
            Some(row) => (
                to_sequence(row.try_get("sequence")?)? + 1,
                row.try_get::<String, _>("hash")?,
            ),
            None => (1, GENESIS_HASH.to_string()),
        };

        let record = AuditRecord::seal(event, sequence, clock.next(), &prev_hash);

        if let Some(actor) = &record.actor {
            sqlx::query("INSERT OR IGNORE INTO audit_principals (subject) VALUES (?)")
                .bind(actor.as_str())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO audit_records (
                sequence, id, entity_type, entity_id, action, actor_subject,
                recorded_at, metadata, origin, client, prev_hash, hash, actor_digest
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(from_sequence(record.sequence)?)
        .bind(record.id.to_string())
        .bind(&record.target.entity_type)
        .bind(&record.target.entity_id)
        .bind(record.action.as_ref())
        .bind(record.actor.as_ref().map(|a| a.as_str().to_string()))
        .bind(record.recorded_at_text())
        .bind(record.metadata.to_json_string())
        .bind(record.origin.map(|ip| ip.to_string()))
        .bind(&record.client)
        .bind(&record.seal.prev_hash)
        .bind(&record.seal.hash)
        .bind(&record.seal.actor_digest)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => SinkError::Duplicate(id),
            _ => SinkError::from(e),
        })?;

        tx.commit().await?;
        debug!(record_id = %id, sequence = record.sequence, "Audit record stored");
        Ok(id)
    }

    async fn fetch_page(
        &self,
        filter: &AuditFilter,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, SinkError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(RECORD_COLUMNS);
        qb.push(" FROM audit_records WHERE sequence > ");
        qb.push_bind(from_sequence(after.max(filter.after).unwrap_or(0))?);

        if let Some(entity_type) = &filter.entity_type {
            qb.push(" AND entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(entity_id) = &filter.entity_id {
            qb.push(" AND entity_id = ").push_bind(entity_id.clone());
        }
        if let Some(actor) = &filter.actor {
            qb.push(" AND actor_subject = ").push_bind(actor.as_str().to_string());
        }
        if let Some(action) = filter.action {
            qb.push(" AND action = ").push_bind(action.to_string());
        }
        if let Some(from) = filter.from {
            qb.push(" AND recorded_at >= ").push_bind(bound_text(from));
        }
        if let Some(to) = filter.to {
            qb.push(" AND recorded_at < ").push_bind(bound_text(to));
        }
        qb.push(" ORDER BY sequence ASC LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_record).collect()
    }

    async fn flush(&self) -> Result<(), SinkError> {
        sqlx::query("PRAGMA wal_checkpoint(PASSIVE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

#[async_trait]
impl ActorDirectory for SqliteAuditSink {
    async fn remove_actor(&self, subject: &SubjectId) -> Result<u64, SinkError> {
        let mut tx = self.pool.begin().await?;
        let detached: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM audit_records WHERE actor_subject = ?")
                .bind(subject.as_str())
                .fetch_one(&mut *tx)
                .await?
                .try_get("n")?;
        sqlx::query("DELETE FROM audit_principals WHERE subject = ?")
            .bind(subject.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(actor = %subject, detached, "Actor removed from audit store");
        Ok(u64::try_from(detached).unwrap_or(0))
    }
}

fn to_sequence(value: i64) -> Result<u64, SinkError> {
    u64::try_from(value).map_err(|_| SinkError::Corrupt(format!("negative sequence {}", value)))
}

fn from_sequence(value: u64) -> Result<i64, SinkError> {
    i64::try_from(value).map_err(|_| SinkError::Rejected(format!("sequence {} out of range", value)))
}

fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Text form of a range bound, rounded up to whole microseconds.
///
/// Stored timestamps are whole microseconds, so `t >= at` iff
/// `t >= ceil(at)` and `t < at` iff `t < ceil(at)`. Truncating instead would
/// disagree with [`AuditFilter::matches`] for sub-microsecond bounds.
fn bound_text(at: DateTime<Utc>) -> String {
    let truncated = at.trunc_subsecs(6);
    let rounded = if truncated < at {
        truncated + chrono::Duration::microseconds(1)
    } else {
        truncated
    };
    timestamp_text(rounded)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, SinkError> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| SinkError::Corrupt(format!("bad timestamp '{}': {}", text, e)))
}

fn corrupt(field: &str, e: impl std::fmt::Display) -> SinkError {
    SinkError::Corrupt(format!("{}: {}", field, e))
}

fn decode_record(row: &SqliteRow) -> Result<AuditRecord, SinkError> {
    let id: String = row.try_get("id")?;
    let action: String = row.try_get("action")?;
    let actor: Option<String> = row.try_get("actor_subject")?;
    let metadata: String = row.try_get("metadata")?;
    let origin: Option<String> = row.try_get("origin")?;

    Ok(AuditRecord {
        id: AuditRecordId::parse(&id).map_err(|e| corrupt("id", e))?,
        sequence: to_sequence(row.try_get("sequence")?)?,
        recorded_at: parse_timestamp(&row.try_get::<String, _>("recorded_at")?)?,
        target: AuditTarget::new(
            row.try_get::<String, _>("entity_type")?,
            row.try_get::<String, _>("entity_id")?,
        ),
        action: AuditAction::from_str(&action).map_err(|e| corrupt("action", e))?,
        actor: actor
            .map(SubjectId::parse)
            .transpose()
            .map_err(|e| corrupt("actor_subject", e))?,
        metadata: AuditMetadata::from_json_str(&metadata).map_err(|e| corrupt("metadata", e))?,
        origin: origin
            .map(|o| o.parse::<std::net::IpAddr>())
            .transpose()
            .map_err(|e| corrupt("origin", e))?,
        client: row.try_get("client")?,
        seal: RecordSeal {
            prev_hash: row.try_get("prev_hash")?,
            hash: row.try_get("hash")?,
            actor_digest: row.try_get("actor_digest")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn event(action: AuditAction, entity_id: &str, actor: Option<&str>) -> AuditEvent {
        AuditEvent::builder(action, AuditTarget::new("resource", entity_id))
            .actor(actor.map(|a| SubjectId::parse(a).unwrap()))
            .metadata("note", "ünïcode ✓")
            .origin("192.0.2.10".parse::<std::net::IpAddr>().unwrap())
            .client(Some("test-agent/1.0"))
            .build()
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let sink = SqliteAuditSink::open(SqliteSinkConfig::in_memory()).await.unwrap();
        let id = sink
            .append(event(AuditAction::Create, "r-1", Some("u-1")))
            .await
            .unwrap();

        let records: Vec<_> = sink.query(AuditFilter::new()).try_collect().await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, id);
        assert_eq!(record.sequence, 1);
        assert_eq!(record.actor.as_ref().map(|a| a.as_str()), Some("u-1"));
        assert_eq!(record.client.as_deref(), Some("test-agent/1.0"));
        assert!(record.verify_seal());
    }

    #[tokio::test]
    async fn test_duplicate_id() {
        let sink = SqliteAuditSink::open(SqliteSinkConfig::in_memory()).await.unwrap();
        let mut e = event(AuditAction::Delete, "r-1", None);
        let id = e.ensure_id();
        sink.append(e.clone()).await.unwrap();
        assert!(matches!(sink.append(e).await, Err(SinkError::Duplicate(d)) if d == id));
    }

    #[tokio::test]
    async fn test_filters() {
        let sink = SqliteAuditSink::open(SqliteSinkConfig::in_memory()).await.unwrap();
        sink.append(event(AuditAction::Create, "r-1", Some("u-1"))).await.unwrap();
        sink.append(event(AuditAction::Update, "r-1", Some("u-2"))).await.unwrap();
        sink.append(event(AuditAction::Delete, "r-2", Some("u-1"))).await.unwrap();

        let by_entity: Vec<_> = sink
            .query(AuditFilter::new().entity("resource", "r-1"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(by_entity.len(), 2);

        let by_actor: Vec<_> = sink
            .query(AuditFilter::new().actor(SubjectId::parse("u-1").unwrap()))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(by_actor.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![1, 3]);

        let by_action: Vec<_> = sink
            .query(AuditFilter::new().action(AuditAction::Update))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(by_action.len(), 1);

        let first = &by_entity[0];
        let in_range: Vec<_> = sink
            .query(AuditFilter::new().between(first.recorded_at, by_entity[1].recorded_at))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].id, first.id);
    }

    #[test]
    fn test_bounds_round_up_to_whole_micros() {
        let at = |text: &str| DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc);

        assert_eq!(
            bound_text(at("2026-01-02T03:04:05.000001500Z")),
            "2026-01-02T03:04:05.000002Z"
        );
        assert_eq!(
            bound_text(at("2026-01-02T03:04:05.000001Z")),
            "2026-01-02T03:04:05.000001Z"
        );
        assert_eq!(
            bound_text(at("2026-01-02T03:04:05.999999001Z")),
            "2026-01-02T03:04:06.000000Z"
        );
    }

    #[test]
    fn test_config_from_settings() {
        let settings = StorageSettings {
            database_path: "/var/lib/bastion/audit.db".into(),
            page_size: 64,
            ..StorageSettings::default()
        };
        let config = SqliteSinkConfig::from(&settings);
        assert_eq!(config.database_path, "/var/lib/bastion/audit.db");
        assert_eq!(config.page_size, 64);
        assert!(!config.is_in_memory());
        assert!(SqliteSinkConfig::in_memory().is_in_memory());
    }
}

//! Versioned schema for the SQLite sink.

use crate::SinkError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

pub(crate) struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

impl Migration {
    fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for statement in self.statements {
            hasher.update(statement.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_audit_tables",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS audit_principals (
                subject TEXT PRIMARY KEY NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS audit_records (
                sequence INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                action TEXT NOT NULL,
                actor_subject TEXT REFERENCES audit_principals(subject) ON DELETE SET NULL,
                recorded_at TEXT NOT NULL,
                metadata TEXT NOT NULL,
                origin TEXT,
                client TEXT,
                prev_hash TEXT NOT NULL,
                hash TEXT NOT NULL,
                actor_digest TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_audit_records_entity ON audit_records(entity_type, entity_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_records_actor ON audit_records(actor_subject, recorded_at)",
        ],
    },
    Migration {
        version: 2,
        name: "append_only_triggers",
        statements: &[
            r#"
            CREATE TRIGGER IF NOT EXISTS audit_records_no_update
            BEFORE UPDATE OF sequence, id, entity_type, entity_id, action, recorded_at,
                metadata, origin, client, prev_hash, hash, actor_digest
            ON audit_records
            BEGIN
                SELECT RAISE(ABORT, 'audit records are append-only');
            END
            "#,
            r#"
            CREATE TRIGGER IF NOT EXISTS audit_records_actor_detach_only
            BEFORE UPDATE OF actor_subject ON audit_records
            WHEN NEW.actor_subject IS NOT NULL
            BEGIN
                SELECT RAISE(ABORT, 'audit actor can only be detached');
            END
            "#,
            r#"
            CREATE TRIGGER IF NOT EXISTS audit_records_no_delete
            BEFORE DELETE ON audit_records
            BEGIN
                SELECT RAISE(ABORT, 'audit records are append-only');
            END
            "#,
        ],
    },
];

/// Apply every migration not yet recorded in `_bastion_migrations`.
///
/// An applied migration whose checksum no longer matches is reported as
/// corruption rather than silently re-run.
pub(crate) async fn run(pool: &SqlitePool) -> Result<(), SinkError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _bastion_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            checksum TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for migration in MIGRATIONS {
        let checksum = migration.checksum();
        let applied = sqlx::query("SELECT checksum FROM _bastion_migrations WHERE version = ?")
            .bind(migration.version)
            .fetch_optional(pool)
            .await?;

        if let Some(row) = applied {
            let stored: String = row.try_get("checksum")?;
            if stored != checksum {
                return Err(SinkError::Corrupt(format!(
                    "migration {} ({}) checksum mismatch",
                    migration.version, migration.name
                )));
            }
            debug!(version = migration.version, "Migration already applied");
            continue;
        }

        info!(version = migration.version, name = migration.name, "Applying migration");
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO _bastion_migrations (version, name, checksum, applied_at) VALUES (?, ?, ?, ?)",
        )
        .bind(migration.version)
        .bind(migration.name)
        .bind(&checksum)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_ordered_and_unique() {
        let versions: Vec<_> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(MIGRATIONS[0].checksum(), MIGRATIONS[0].checksum());
        assert_ne!(MIGRATIONS[0].checksum(), MIGRATIONS[1].checksum());
    }
}

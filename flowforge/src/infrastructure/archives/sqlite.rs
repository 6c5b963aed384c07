// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Embedded Relational Archive
//!
//! A single SQLite database holding values, aliases, and job records, for
//! deployments that want one file instead of a directory tree. Schema is
//! applied on open via `CREATE TABLE IF NOT EXISTS` statements guarded by a
//! `schema_version` row, rather than `sqlx::migrate!`, since this engine
//! ships no migrations directory - the same spirit as the teacher's
//! `infrastructure/repositories/schema.rs`, adapted to a single self-applying
//! schema rather than a migration chain.
//!
//! Concurrent writers are serialized by SQLite's own database-level locking;
//! `SqliteConnectOptions::busy_timeout` absorbs the resulting contention so a
//! writer blocked behind another transaction retries instead of failing
//! immediately with "database is locked".

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use flowforge_domain::aggregates::pipeline_structure::PipelineDeclaration;
use flowforge_domain::entities::{JobRecord, JobStatus, Value, ValueSchema};
use flowforge_domain::error::EngineError;
use flowforge_domain::repositories::{
    AliasHistoryEntry, AliasRepository, ArchiveId, ArchiveKind, JobRepository, MetadataRepository, PipelineRepository, ValueArchive, ValueStore,
};
use flowforge_domain::value_objects::{JobHash, ValueHash, ValueId, ValueOrigin, ValueStatus};
use serde_json::Value as JsonValue;

const SCHEMA_VERSION: i64 = 1;

async fn open_pool(path: &std::path::Path) -> Result<SqlitePool, EngineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .map_err(db_err)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await.map_err(db_err)?;
    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), EngineError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL)").execute(pool).await.map_err(db_err)?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT version FROM schema_meta LIMIT 1").fetch_optional(pool).await.map_err(db_err)?;

    match existing {
        None => {
            sqlx::query("INSERT INTO schema_meta (version) VALUES (?1)").bind(SCHEMA_VERSION).execute(pool).await.map_err(db_err)?;
        }
        Some(v) if v > SCHEMA_VERSION => {
            return Err(EngineError::IncompatibleArchive(format!("database schema version {v} is newer than this build supports ({SCHEMA_VERSION})")));
        }
        Some(_) => {}
    }

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS values_table (
            value_hash TEXT PRIMARY KEY,
            value_id TEXT NOT NULL,
            schema_json TEXT NOT NULL,
            data_type_config_json TEXT,
            payload BLOB NOT NULL,
            origin_json TEXT NOT NULL,
            status TEXT NOT NULL,
            metadata_json TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(db_err)?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS alias_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            value_id TEXT NOT NULL,
            written_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(db_err)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS alias_log_name_idx ON alias_log (name)").execute(pool).await.map_err(db_err)?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS jobs (
            job_hash TEXT PRIMARY KEY,
            record_json TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(db_err)?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS value_metadata (
            value_hash TEXT PRIMARY KEY,
            metadata_json TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(db_err)?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS pipelines (
            pipeline_name TEXT PRIMARY KEY,
            declaration_json TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(db_err)?;

    Ok(())
}

fn db_err(err: sqlx::Error) -> EngineError {
    EngineError::Database(err.to_string())
}

fn status_to_str(status: ValueStatus) -> &'static str {
    match status {
        ValueStatus::Set => "set",
        ValueStatus::NotSet => "not_set",
        ValueStatus::Default => "default",
        ValueStatus::None => "none",
    }
}

fn status_from_str(s: &str) -> ValueStatus {
    match s {
        "set" => ValueStatus::Set,
        "default" => ValueStatus::Default,
        "none" => ValueStatus::None,
        _ => ValueStatus::NotSet,
    }
}

/// `ValueStore` backed by a single SQLite database.
pub struct SqliteValueStore {
    archive_id: ArchiveId,
    pool: SqlitePool,
}

impl SqliteValueStore {
    pub async fn open(archive_id: ArchiveId, db_path: impl AsRef<std::path::Path>) -> Result<Self, EngineError> {
        let pool = open_pool(db_path.as_ref()).await?;
        Ok(Self { archive_id, pool })
    }
}

#[async_trait]
impl ValueArchive for SqliteValueStore {
    fn archive_id(&self) -> &ArchiveId {
        &self.archive_id
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Data
    }

    async fn contains(&self, value_hash: ValueHash) -> Result<bool, EngineError> {
        let row = sqlx::query("SELECT 1 FROM values_table WHERE value_hash = ?1")
            .bind(value_hash.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn load_value(&self, value_hash: ValueHash) -> Result<Value, EngineError> {
        let row = sqlx::query("SELECT value_id, schema_json, data_type_config_json, payload, origin_json, status, metadata_json FROM values_table WHERE value_hash = ?1")
            .bind(value_hash.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| EngineError::UnknownValue(value_hash.to_string()))?;

        let value_id: String = row.try_get("value_id").map_err(db_err)?;
        let schema_json: String = row.try_get("schema_json").map_err(db_err)?;
        let config_json: Option<String> = row.try_get("data_type_config_json").map_err(db_err)?;
        let payload: Vec<u8> = row.try_get("payload").map_err(db_err)?;
        let origin_json: String = row.try_get("origin_json").map_err(db_err)?;
        let status: String = row.try_get("status").map_err(db_err)?;
        let metadata_json: String = row.try_get("metadata_json").map_err(db_err)?;

        let schema: ValueSchema = serde_json::from_str(&schema_json)?;
        let data_type_config = config_json.map(|s| serde_json::from_str(&s)).transpose()?;
        let origin: ValueOrigin = serde_json::from_str(&origin_json)?;
        let metadata = serde_json::from_str(&metadata_json)?;

        Value::from_persisted(ValueId::parse(&value_id)?, schema, data_type_config, payload, origin, status_from_str(&status), metadata)
    }

    async fn iter_values(&self) -> Result<Vec<ValueHash>, EngineError> {
        let rows = sqlx::query("SELECT value_hash FROM values_table").fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                let hash_str: String = row.try_get("value_hash").map_err(db_err)?;
                hash_str.parse().map_err(|_| EngineError::Database(format!("corrupt value_hash: {hash_str}")))
            })
            .collect()
    }
}

#[async_trait]
impl ValueStore for SqliteValueStore {
    async fn write_value(&self, value: &Value) -> Result<(), EngineError> {
        let metadata_json = serde_json::to_string(value.metadata())?;
        let config_json = value.data_type_config().map(serde_json::to_string).transpose()?;
        sqlx::query(
            "INSERT OR IGNORE INTO values_table
                (value_hash, value_id, schema_json, data_type_config_json, payload, origin_json, status, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(value.value_hash().to_string())
        .bind(value.id().to_string())
        .bind(serde_json::to_string(value.schema())?)
        .bind(config_json)
        .bind(value.payload_bytes())
        .bind(serde_json::to_string(value.origin())?)
        .bind(status_to_str(value.status()))
        .bind(metadata_json)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

/// `AliasRepository` backed by the same database's `alias_log` table.
pub struct SqliteAliasStore {
    pool: SqlitePool,
}

impl SqliteAliasStore {
    pub async fn open(db_path: impl AsRef<std::path::Path>) -> Result<Self, EngineError> {
        let pool = open_pool(db_path.as_ref()).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl AliasRepository for SqliteAliasStore {
    async fn lookup_alias(&self, name: &str) -> Result<Option<ValueId>, EngineError> {
        let row = sqlx::query("SELECT value_id FROM alias_log WHERE name = ?1 ORDER BY id DESC LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let value_id: String = row.try_get("value_id").map_err(db_err)?;
                Ok(Some(ValueId::parse(&value_id)?))
            }
            None => Ok(None),
        }
    }

    async fn write_alias(&self, name: &str, value_id: ValueId) -> Result<(), EngineError> {
        sqlx::query("INSERT INTO alias_log (name, value_id, written_at) VALUES (?1, ?2, ?3)")
            .bind(name)
            .bind(value_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_aliases(&self) -> Result<Vec<String>, EngineError> {
        let rows = sqlx::query("SELECT DISTINCT name FROM alias_log").fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter().map(|row| row.try_get::<String, _>("name").map_err(db_err)).collect()
    }

    async fn alias_history(&self, name: &str) -> Result<Vec<AliasHistoryEntry>, EngineError> {
        let rows = sqlx::query("SELECT value_id, written_at FROM alias_log WHERE name = ?1 ORDER BY id ASC")
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                let value_id: String = row.try_get("value_id").map_err(db_err)?;
                let written_at: String = row.try_get("written_at").map_err(db_err)?;
                Ok(AliasHistoryEntry {
                    value_id: ValueId::parse(&value_id)?,
                    written_at: chrono::DateTime::parse_from_rfc3339(&written_at)
                        .map_err(|e| EngineError::Database(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}

/// `JobRepository` backed by the same database's `jobs` table.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub async fn open(db_path: impl AsRef<std::path::Path>) -> Result<Self, EngineError> {
        let pool = open_pool(db_path.as_ref()).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl JobRepository for SqliteJobStore {
    async fn lookup_job(&self, job_hash: JobHash) -> Result<Option<JobRecord>, EngineError> {
        let row = sqlx::query("SELECT record_json FROM jobs WHERE job_hash = ?1").bind(job_hash.to_string()).fetch_optional(&self.pool).await.map_err(db_err)?;
        match row {
            Some(row) => {
                let record_json: String = row.try_get("record_json").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&record_json)?))
            }
            None => Ok(None),
        }
    }

    async fn record_job(&self, record: JobRecord) -> Result<(), EngineError> {
        let record_json = serde_json::to_string(&record)?;
        sqlx::query("INSERT OR IGNORE INTO jobs (job_hash, record_json) VALUES (?1, ?2)")
            .bind(record.job_hash.to_string())
            .bind(record_json)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn iter_jobs(&self) -> Result<Vec<JobRecord>, EngineError> {
        let rows = sqlx::query("SELECT record_json FROM jobs").fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                let record_json: String = row.try_get("record_json").map_err(db_err)?;
                Ok(serde_json::from_str(&record_json)?)
            })
            .collect()
    }
}

/// `MetadataRepository` backed by the same database's `value_metadata` table.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub async fn open(db_path: impl AsRef<std::path::Path>) -> Result<Self, EngineError> {
        let pool = open_pool(db_path.as_ref()).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl MetadataRepository for SqliteMetadataStore {
    async fn write_metadata(&self, value_hash: ValueHash, metadata: JsonValue) -> Result<(), EngineError> {
        let metadata_json = serde_json::to_string(&metadata)?;
        sqlx::query("INSERT OR REPLACE INTO value_metadata (value_hash, metadata_json) VALUES (?1, ?2)")
            .bind(value_hash.to_string())
            .bind(metadata_json)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn load_metadata(&self, value_hash: ValueHash) -> Result<Option<JsonValue>, EngineError> {
        let row = sqlx::query("SELECT metadata_json FROM value_metadata WHERE value_hash = ?1")
            .bind(value_hash.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let metadata_json: String = row.try_get("metadata_json").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&metadata_json)?))
            }
            None => Ok(None),
        }
    }
}

/// `PipelineRepository` backed by the same database's `pipelines` table.
pub struct SqlitePipelineStore {
    pool: SqlitePool,
}

impl SqlitePipelineStore {
    pub async fn open(db_path: impl AsRef<std::path::Path>) -> Result<Self, EngineError> {
        let pool = open_pool(db_path.as_ref()).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl PipelineRepository for SqlitePipelineStore {
    async fn save_pipeline(&self, declaration: PipelineDeclaration) -> Result<(), EngineError> {
        let declaration_json = serde_json::to_string(&declaration)?;
        sqlx::query("INSERT OR REPLACE INTO pipelines (pipeline_name, declaration_json) VALUES (?1, ?2)")
            .bind(&declaration.pipeline_name)
            .bind(declaration_json)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn load_pipeline(&self, pipeline_name: &str) -> Result<Option<PipelineDeclaration>, EngineError> {
        let row = sqlx::query("SELECT declaration_json FROM pipelines WHERE pipeline_name = ?1")
            .bind(pipeline_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let declaration_json: String = row.try_get("declaration_json").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&declaration_json)?))
            }
            None => Ok(None),
        }
    }

    async fn list_pipelines(&self) -> Result<Vec<String>, EngineError> {
        let rows = sqlx::query("SELECT pipeline_name FROM pipelines").fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter().map(|row| row.try_get::<String, _>("pipeline_name").map_err(db_err)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_domain::entities::JobMetrics;
    use flowforge_domain::hashing::Multihash;
    use std::collections::BTreeMap;

    fn sample_value() -> Value {
        Value::new(ValueSchema::new("string"), None, b"hello".to_vec(), ValueOrigin::external("test"), ValueStatus::Set).unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_value_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteValueStore::open(ArchiveId::new("data"), dir.path().join("data.db")).await.unwrap();
        let value = sample_value();

        store.write_value(&value).await.unwrap();
        assert!(store.contains(value.value_hash()).await.unwrap());

        let loaded = store.load_value(value.value_hash()).await.unwrap();
        assert_eq!(loaded.value_hash(), value.value_hash());
    }

    #[tokio::test]
    async fn alias_lookup_returns_most_recent_binding() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteAliasStore::open(dir.path().join("aliases.db")).await.unwrap();
        let id1 = ValueId::new();
        let id2 = ValueId::new();

        store.write_alias("result", id1).await.unwrap();
        store.write_alias("result", id2).await.unwrap();

        assert_eq!(store.lookup_alias("result").await.unwrap(), Some(id2));
        assert_eq!(store.alias_history("result").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn job_cache_hits_on_a_recorded_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteJobStore::open(dir.path().join("jobs.db")).await.unwrap();

        let manifest_hash = Multihash::of_bytes(b"manifest").into();
        let mut inputs = BTreeMap::new();
        inputs.insert("a".to_string(), Multihash::of_bytes(b"va").into());
        let record = JobRecord::new(
            manifest_hash,
            inputs,
            BTreeMap::new(),
            Utc::now(),
            Utc::now(),
            "",
            JobStatus::Completed,
            JobMetrics::default(),
        )
        .unwrap();

        let job_hash = record.job_hash;
        store.record_job(record).await.unwrap();
        assert!(store.lookup_job(job_hash).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn metadata_round_trips_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMetadataStore::open(dir.path().join("metadata.db")).await.unwrap();
        let value_hash: ValueHash = Multihash::of_bytes(b"value").into();

        assert!(store.load_metadata(value_hash).await.unwrap().is_none());

        store.write_metadata(value_hash, serde_json::json!({"rows": 42})).await.unwrap();
        let loaded = store.load_metadata(value_hash).await.unwrap().unwrap();
        assert_eq!(loaded["rows"], 42);
    }

    #[tokio::test]
    async fn pipeline_declarations_round_trip_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlitePipelineStore::open(dir.path().join("pipelines.db")).await.unwrap();

        let declaration = PipelineDeclaration {
            pipeline_name: "nand".to_string(),
            doc: "two-gate NAND".to_string(),
            ..Default::default()
        };

        store.save_pipeline(declaration.clone()).await.unwrap();
        let loaded = store.load_pipeline("nand").await.unwrap().unwrap();
        assert_eq!(loaded.pipeline_name, "nand");
        assert_eq!(store.list_pipelines().await.unwrap(), vec!["nand".to_string()]);
        assert!(store.load_pipeline("missing").await.unwrap().is_none());
    }
}

// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Filesystem Archive
//!
//! Content-addressed directory layout, sharded two levels deep by the
//! value hash's hex prefix so no directory ever holds more than a few
//! thousand entries. Every write stages to a temporary path in the same
//! directory and renames atomically into place, so a crash mid-write never
//! leaves a partially-written value visible to a reader (§4.D). Orphaned
//! temp files from an interrupted write are swept on open.
//!
//! Layout under `<archive_dir>`:
//!
//! ```text
//! data/<hh>/<hh>/<value_hash>/value.json   - schema, origin, status, metadata
//! data/<hh>/<hh>/<value_hash>/payload.bin  - canonical payload bytes
//! aliases/log.jsonl                        - append-only alias history
//! jobs/<hh>/<job_hash>.json                - job records
//! ```
//!
//! Grounded in the teacher's file I/O discipline
//! (`infrastructure/services/binary_format.rs`'s stage-then-persist pattern)
//! generalized from chunk payloads to whole values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex as AsyncMutex;

use flowforge_domain::entities::{Value, ValueSchema};
use flowforge_domain::error::EngineError;
use flowforge_domain::repositories::{AliasHistoryEntry, AliasRepository, ArchiveId, ArchiveKind, JobRepository, ValueArchive, ValueStore};
use flowforge_domain::entities::JobRecord;
use flowforge_domain::value_objects::{JobHash, ValueHash, ValueId, ValueOrigin, ValueStatus};

/// On-disk shape of everything about a value except its payload bytes,
/// which are kept as a separate file so large payloads are never
/// re-encoded through JSON.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedValueMeta {
    id: ValueId,
    schema: ValueSchema,
    data_type_config: Option<JsonValue>,
    size: u64,
    value_hash: ValueHash,
    origin: ValueOrigin,
    status: ValueStatus,
    metadata: HashMap<String, JsonValue>,
}

fn shard_dir(root: &Path, hash: &str) -> PathBuf {
    // hash looks like "sha256:<hex>"; shard on the hex digest, not the
    // algorithm tag, so every archive shards uniformly regardless of which
    // hash algorithm produced the name.
    let hex = hash.split(':').next_back().unwrap_or(hash);
    let a = &hex[..hex.len().min(2)];
    let b = if hex.len() > 2 { &hex[2..hex.len().min(4)] } else { "00" };
    root.join(a).join(b).join(hex)
}

/// Writes `bytes` to `final_path` by staging to a sibling temp file and
/// renaming, so a reader never observes a partially-written file.
async fn atomic_write(final_path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let parent = final_path.parent().ok_or_else(|| EngineError::Io("no parent directory".to_string()))?;
    tokio::fs::create_dir_all(parent).await?;
    let tmp_path = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, final_path).await?;
    Ok(())
}

/// Removes any `.tmp-*` file left behind by a write that crashed between
/// staging and rename.
async fn gc_orphans(root: &Path) -> Result<(), EngineError> {
    if !root.exists() {
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(".tmp-") {
                    let _ = tokio::fs::remove_file(entry.path()).await;
                }
            }
        }
    }
    Ok(())
}

/// The content-addressed value archive/store: one directory per value
/// hash, sharded two levels deep.
pub struct FilesystemValueStore {
    archive_id: ArchiveId,
    root: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl FilesystemValueStore {
    pub async fn open(archive_id: ArchiveId, root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        gc_orphans(&root).await?;
        Ok(Self { archive_id, root, write_lock: AsyncMutex::new(()) })
    }
}

#[async_trait]
impl ValueArchive for FilesystemValueStore {
    fn archive_id(&self) -> &ArchiveId {
        &self.archive_id
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Data
    }

    async fn contains(&self, value_hash: ValueHash) -> Result<bool, EngineError> {
        let dir = shard_dir(&self.root, &value_hash.to_string());
        Ok(tokio::fs::try_exists(dir.join("value.json")).await.unwrap_or(false))
    }

    async fn load_value(&self, value_hash: ValueHash) -> Result<Value, EngineError> {
        let dir = shard_dir(&self.root, &value_hash.to_string());
        let meta_bytes = tokio::fs::read(dir.join("value.json"))
            .await
            .map_err(|_| EngineError::UnknownValue(value_hash.to_string()))?;
        let meta: PersistedValueMeta = serde_json::from_slice(&meta_bytes)?;
        let payload_bytes = tokio::fs::read(dir.join("payload.bin")).await?;
        Value::from_persisted(meta.id, meta.schema, meta.data_type_config, payload_bytes, meta.origin, meta.status, meta.metadata)
    }

    async fn iter_values(&self) -> Result<Vec<ValueHash>, EngineError> {
        let mut hashes = Vec::new();
        if !self.root.exists() {
            return Ok(hashes);
        }
        for entry in walkdir::WalkDir::new(&self.root).into_iter().filter_map(Result::ok) {
            if entry.file_name() == "value.json" {
                if let Ok(bytes) = tokio::fs::read(entry.path()).await {
                    if let Ok(meta) = serde_json::from_slice::<PersistedValueMeta>(&bytes) {
                        hashes.push(meta.value_hash);
                    }
                }
            }
        }
        Ok(hashes)
    }
}

#[async_trait]
impl ValueStore for FilesystemValueStore {
    async fn write_value(&self, value: &Value) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock().await;
        let dir = shard_dir(&self.root, &value.value_hash().to_string());
        // Idempotent on value hash: a second write of an already-stored
        // hash is a no-op, per §4.D.
        if tokio::fs::try_exists(dir.join("value.json")).await.unwrap_or(false) {
            return Ok(());
        }
        let meta = PersistedValueMeta {
            id: value.id(),
            schema: value.schema().clone(),
            data_type_config: value.data_type_config().cloned(),
            size: value.size(),
            value_hash: value.value_hash(),
            origin: value.origin().clone(),
            status: value.status(),
            metadata: value.metadata().clone(),
        };
        atomic_write(&dir.join("value.json"), &serde_json::to_vec(&meta)?).await?;
        atomic_write(&dir.join("payload.bin"), value.payload_bytes()).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AliasLogEntry {
    name: String,
    value_id: ValueId,
    written_at: chrono::DateTime<Utc>,
}

/// Append-only alias log with an in-memory current-state index rebuilt on
/// open by replaying the log in order.
pub struct FilesystemAliasStore {
    root: PathBuf,
    current: RwLock<HashMap<String, ValueId>>,
    write_lock: AsyncMutex<()>,
}

impl FilesystemAliasStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let current = RwLock::new(Self::replay_log(&root).await?);
        Ok(Self { root, current, write_lock: AsyncMutex::new(()) })
    }

    async fn replay_log(root: &Path) -> Result<HashMap<String, ValueId>, EngineError> {
        let mut current = HashMap::new();
        let log_path = root.join("log.jsonl");
        if let Ok(text) = tokio::fs::read_to_string(&log_path).await {
            for line in text.lines() {
                if let Ok(entry) = serde_json::from_str::<AliasLogEntry>(line) {
                    current.insert(entry.name, entry.value_id);
                }
            }
        }
        Ok(current)
    }

    fn log_path(&self) -> PathBuf {
        self.root.join("log.jsonl")
    }
}

#[async_trait]
impl AliasRepository for FilesystemAliasStore {
    async fn lookup_alias(&self, name: &str) -> Result<Option<ValueId>, EngineError> {
        Ok(self.current.read().get(name).copied())
    }

    async fn write_alias(&self, name: &str, value_id: ValueId) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock().await;
        let entry = AliasLogEntry { name: name.to_string(), value_id, written_at: Utc::now() };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(self.log_path()).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.current.write().insert(name.to_string(), value_id);
        Ok(())
    }

    async fn list_aliases(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.current.read().keys().cloned().collect())
    }

    async fn alias_history(&self, name: &str) -> Result<Vec<AliasHistoryEntry>, EngineError> {
        let text = tokio::fs::read_to_string(self.log_path()).await.unwrap_or_default();
        let history = text
            .lines()
            .filter_map(|line| serde_json::from_str::<AliasLogEntry>(line).ok())
            .filter(|entry| entry.name == name)
            .map(|entry| AliasHistoryEntry { value_id: entry.value_id, written_at: entry.written_at })
            .collect();
        Ok(history)
    }
}

/// Job records keyed by job hash, one file per job, sharded one level deep.
pub struct FilesystemJobStore {
    root: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl FilesystemJobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        gc_orphans(&root).await?;
        Ok(Self { root, write_lock: AsyncMutex::new(()) })
    }

    fn job_path(&self, job_hash: JobHash) -> PathBuf {
        let hash_str = job_hash.to_string();
        let hex = hash_str.split(':').next_back().unwrap_or(&hash_str);
        let prefix = &hex[..hex.len().min(2)];
        self.root.join(prefix).join(format!("{hex}.json"))
    }
}

#[async_trait]
impl JobRepository for FilesystemJobStore {
    async fn lookup_job(&self, job_hash: JobHash) -> Result<Option<JobRecord>, EngineError> {
        let path = self.job_path(job_hash);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(_) => Ok(None),
        }
    }

    async fn record_job(&self, record: JobRecord) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock().await;
        let path = self.job_path(record.job_hash);
        atomic_write(&path, &serde_json::to_vec(&record)?).await
    }

    async fn iter_jobs(&self) -> Result<Vec<JobRecord>, EngineError> {
        let mut records = Vec::new();
        if !self.root.exists() {
            return Ok(records);
        }
        for entry in walkdir::WalkDir::new(&self.root).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "json") {
                let bytes = tokio::fs::read(entry.path()).await?;
                records.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(records)
    }
}

/// Extracted-metadata blobs keyed by value hash, one file per entry,
/// sharded one level deep like the job store.
pub struct FilesystemMetadataStore {
    root: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl FilesystemMetadataStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        gc_orphans(&root).await?;
        Ok(Self { root, write_lock: AsyncMutex::new(()) })
    }

    fn entry_path(&self, value_hash: ValueHash) -> PathBuf {
        let hash_str = value_hash.to_string();
        let hex = hash_str.split(':').next_back().unwrap_or(&hash_str);
        let prefix = &hex[..hex.len().min(2)];
        self.root.join(prefix).join(format!("{hex}.json"))
    }
}

#[async_trait]
impl flowforge_domain::repositories::MetadataRepository for FilesystemMetadataStore {
    async fn write_metadata(&self, value_hash: ValueHash, metadata: JsonValue) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock().await;
        atomic_write(&self.entry_path(value_hash), &serde_json::to_vec(&metadata)?).await
    }

    async fn load_metadata(&self, value_hash: ValueHash) -> Result<Option<JsonValue>, EngineError> {
        match tokio::fs::read(self.entry_path(value_hash)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(_) => Ok(None),
        }
    }
}

/// Named [`flowforge_domain::aggregates::pipeline_structure::PipelineDeclaration`]s,
/// one file per pipeline name.
pub struct FilesystemPipelineStore {
    root: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl FilesystemPipelineStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root, write_lock: AsyncMutex::new(()) })
    }

    fn entry_path(&self, pipeline_name: &str) -> PathBuf {
        self.root.join(format!("{pipeline_name}.json"))
    }
}

#[async_trait]
impl flowforge_domain::repositories::PipelineRepository for FilesystemPipelineStore {
    async fn save_pipeline(&self, declaration: flowforge_domain::aggregates::pipeline_structure::PipelineDeclaration) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock().await;
        let path = self.entry_path(&declaration.pipeline_name);
        atomic_write(&path, &serde_json::to_vec(&declaration)?).await
    }

    async fn load_pipeline(&self, pipeline_name: &str) -> Result<Option<flowforge_domain::aggregates::pipeline_structure::PipelineDeclaration>, EngineError> {
        match tokio::fs::read(self.entry_path(pipeline_name)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(_) => Ok(None),
        }
    }

    async fn list_pipelines(&self) -> Result<Vec<String>, EngineError> {
        let mut names = Vec::new();
        if !self.root.exists() {
            return Ok(names);
        }
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_domain::hashing::Multihash;

    fn sample_value() -> Value {
        Value::new(ValueSchema::new("string"), None, b"hello".to_vec(), ValueOrigin::external("test"), ValueStatus::Set).unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_value_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemValueStore::open(ArchiveId::new("data"), dir.path().join("data")).await.unwrap();
        let value = sample_value();

        store.write_value(&value).await.unwrap();
        assert!(store.contains(value.value_hash()).await.unwrap());

        let loaded = store.load_value(value.value_hash()).await.unwrap();
        assert_eq!(loaded.value_hash(), value.value_hash());
        assert_eq!(loaded.payload_bytes(), value.payload_bytes());
    }

    #[tokio::test]
    async fn second_write_of_same_hash_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemValueStore::open(ArchiveId::new("data"), dir.path().join("data")).await.unwrap();
        let value = sample_value();
        store.write_value(&value).await.unwrap();
        store.write_value(&value).await.unwrap();
        assert!(store.contains(value.value_hash()).await.unwrap());
    }

    #[tokio::test]
    async fn alias_history_accumulates_across_rebinds() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemAliasStore::open(dir.path().join("aliases")).await.unwrap();
        let id1 = ValueId::new();
        let id2 = ValueId::new();

        store.write_alias("my_table", id1).await.unwrap();
        store.write_alias("my_table", id2).await.unwrap();

        assert_eq!(store.lookup_alias("my_table").await.unwrap(), Some(id2));
        let history = store.alias_history("my_table").await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn unknown_job_hash_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemJobStore::open(dir.path().join("jobs")).await.unwrap();
        let hash: JobHash = Multihash::of_bytes(b"nope").into();
        assert!(store.lookup_job(hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn metadata_round_trips_through_the_filesystem() {
        use flowforge_domain::repositories::MetadataRepository;

        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemMetadataStore::open(dir.path().join("metadata")).await.unwrap();
        let value_hash: ValueHash = Multihash::of_bytes(b"value").into();

        assert!(store.load_metadata(value_hash).await.unwrap().is_none());

        store.write_metadata(value_hash, serde_json::json!({"rows": 7})).await.unwrap();
        let loaded = store.load_metadata(value_hash).await.unwrap().unwrap();
        assert_eq!(loaded["rows"], 7);
    }

    #[tokio::test]
    async fn pipeline_declarations_round_trip_through_the_filesystem() {
        use flowforge_domain::aggregates::pipeline_structure::PipelineDeclaration;
        use flowforge_domain::repositories::PipelineRepository;

        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemPipelineStore::open(dir.path().join("pipelines")).await.unwrap();

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

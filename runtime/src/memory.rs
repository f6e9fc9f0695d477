//! Embedded fallback store.
//!
//! [`MemoryStore`] keeps every collection in memory behind a single
//! `tokio::sync::RwLock`. All guarded writes and batches run under the write
//! lock, which makes them atomic with respect to each other inside this
//! process.
//!
//! With a data directory, each collection is mirrored to `<dir>/<name>.json`
//! after every write and reloaded by [`MemoryStore::open`]. Writes are staged
//! on copies of the touched collections, persisted, and only then installed,
//! so a failed file write leaves the in-memory state unchanged.
//!
//! A batch touching several collections writes every `<name>.json.tmp` first,
//! then records the batch in `commit.json`, then renames the files into
//! place. Until the marker exists nothing on disk has changed. Once it exists
//! the batch is committed, and an interrupted rename is finished by the next
//! write or the next [`MemoryStore::open`].

use rsvp_core::document::{Collection, Document, ID_FIELD, document_id, ensure_id};
use rsvp_core::query::{Filter, QuerySpec};
use rsvp_core::store::{BatchOutcome, RecordStore, StoreError, StoreFuture, Update, WriteOp};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

type Table = BTreeMap<Uuid, Document>;

/// In-process document store with optional JSON file persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Collection, Table>>,
    data_dir: Option<PathBuf>,
}

impl MemoryStore {
    /// Purely in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted under `dir`, loading any existing collection files.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] if the directory cannot be created
    /// or an existing file cannot be read or parsed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| persistence_error(&dir, &e))?;
        finish_pending(&dir).await?;

        let mut tables = HashMap::new();
        for collection in Collection::ALL {
            let table = load_table(&file_path(&dir, collection)).await?;
            tracing::debug!(
                collection = %collection,
                records = table.len(),
                "Loaded fallback collection"
            );
            tables.insert(collection, table);
        }

        tracing::info!(dir = %dir.display(), "Opened fallback store");
        Ok(Self {
            tables: RwLock::new(tables),
            data_dir: Some(dir),
        })
    }

    /// Directory the store persists to, if any.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    async fn persist(&self, staged: &HashMap<Collection, Table>) -> Result<(), StoreError> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        finish_pending(dir).await?;

        let mut tables: Vec<(Collection, &Table)> = staged.iter().map(|(c, t)| (*c, t)).collect();
        tables.sort_by_key(|(collection, _)| *collection);
        let collections: Vec<Collection> = tables.iter().map(|(c, _)| *c).collect();

        let mut written = Vec::with_capacity(tables.len());
        for (collection, table) in tables {
            let tmp = tmp_path(dir, collection);
            if let Err(e) = write_table(&tmp, table).await {
                discard(&written).await;
                return Err(e);
            }
            written.push(tmp);
        }

        if let [collection] = collections.as_slice() {
            return install(dir, *collection).await;
        }

        if let Err(e) = write_marker(dir, &collections).await {
            discard(&written).await;
            return Err(e);
        }
        if let Err(e) = finish_pending(dir).await {
            // The marker is down, so the batch stands and the next write or
            // open completes it
            tracing::error!(error = %e, "Committed batch not yet installed");
        }
        Ok(())
    }

    /// Stage writes on copies, persist them, then install them.
    async fn write<T, F>(&self, collections: &[Collection], apply: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut HashMap<Collection, Table>) -> Result<(T, bool), StoreError>,
    {
        let mut tables = self.tables.write().await;
        let mut staged: HashMap<Collection, Table> = collections
            .iter()
            .map(|c| (*c, tables.get(c).cloned().unwrap_or_default()))
            .collect();

        let (result, changed) = apply(&mut staged)?;
        if changed {
            self.persist(&staged).await?;
            tables.extend(staged);
        }
        Ok(result)
    }
}

fn file_path(dir: &Path, collection: Collection) -> PathBuf {
    dir.join(format!("{}.json", collection.name()))
}

fn tmp_path(dir: &Path, collection: Collection) -> PathBuf {
    file_path(dir, collection).with_extension("json.tmp")
}

fn marker_path(dir: &Path) -> PathBuf {
    dir.join(COMMIT_MARKER)
}

const COMMIT_MARKER: &str = "commit.json";

async fn write_table(path: &Path, table: &Table) -> Result<(), StoreError> {
    let records: Vec<&Document> = table.values().collect();
    let bytes =
        serde_json::to_vec_pretty(&records).map_err(|e| StoreError::Serialization(e.to_string()))?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| persistence_error(path, &e))
}

async fn install(dir: &Path, collection: Collection) -> Result<(), StoreError> {
    let path = file_path(dir, collection);
    tokio::fs::rename(tmp_path(dir, collection), &path)
        .await
        .map_err(|e| persistence_error(&path, &e))
}

async fn discard(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove staged file");
        }
    }
}

async fn write_marker(dir: &Path, collections: &[Collection]) -> Result<(), StoreError> {
    let names: Vec<&str> = collections.iter().map(|c| c.name()).collect();
    let bytes = serde_json::to_vec(&names).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let path = marker_path(dir);
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| persistence_error(&tmp, &e))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|e| persistence_error(&path, &e))
}

/// Install the staged files of a committed batch, if `commit.json` names one.
async fn finish_pending(dir: &Path) -> Result<(), StoreError> {
    let path = marker_path(dir);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(persistence_error(&path, &e)),
    };
    let names: Vec<String> = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Persistence(format!("{}: {e}", path.display())))?;

    for collection in Collection::ALL {
        if !names.iter().any(|name| name == collection.name()) {
            continue;
        }
        match tokio::fs::metadata(tmp_path(dir, collection)).await {
            Ok(_) => install(dir, collection).await?,
            // Installed before the previous attempt stopped
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(persistence_error(&tmp_path(dir, collection), &e)),
        }
    }

    tokio::fs::remove_file(&path)
        .await
        .map_err(|e| persistence_error(&path, &e))?;
    tracing::info!(collections = ?names, "Installed committed batch");
    Ok(())
}

fn persistence_error(path: &Path, error: &std::io::Error) -> StoreError {
    StoreError::Persistence(format!("{}: {error}", path.display()))
}

async fn load_table(path: &Path) -> Result<Table, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Table::new()),
        Err(e) => return Err(persistence_error(path, &e)),
    };
    let records: Vec<Document> = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Persistence(format!("{}: {e}", path.display())))?;

    let mut table = Table::new();
    for record in records {
        match document_id(&record) {
            Some(id) => {
                table.insert(id, record);
            }
            None => tracing::warn!(path = %path.display(), "Skipping record without a valid {ID_FIELD}"),
        }
    }
    Ok(table)
}

fn insert_into(table: &mut Table, mut document: Document) -> Result<Document, StoreError> {
    let id = ensure_id(&mut document);
    if table.contains_key(&id) {
        return Err(StoreError::Database(format!("duplicate {ID_FIELD}: {id}")));
    }
    table.insert(id, document.clone());
    Ok(document)
}

/// Apply a guarded update. `Ok(false)` if the id is unknown or the guard fails.
fn update_in(
    table: &mut Table,
    id: Uuid,
    update: &Update,
    guard: &Filter,
) -> Result<bool, StoreError> {
    let Some(current) = table.get_mut(&id) else {
        return Ok(false);
    };
    if !guard.matches(current) {
        return Ok(false);
    }
    update.apply(current)?;
    Ok(true)
}

impl RecordStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn insert(&self, collection: Collection, document: Document) -> StoreFuture<'_, Document> {
        Box::pin(async move {
            self.write(&[collection], |tables| {
                let table = tables.entry(collection).or_default();
                Ok((insert_into(table, document)?, true))
            })
            .await
        })
    }

    fn find<'a>(
        &'a self,
        collection: Collection,
        spec: &'a QuerySpec,
    ) -> StoreFuture<'a, Vec<Document>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let records = tables
                .get(&collection)
                .map(|table| spec.apply(table.values().cloned()))
                .unwrap_or_default();
            Ok(records)
        })
    }

    fn count<'a>(&'a self, collection: Collection, filter: &'a Filter) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let count = tables
                .get(&collection)
                .map_or(0, |table| table.values().filter(|d| filter.matches(d)).count());
            Ok(count as u64)
        })
    }

    fn update<'a>(
        &'a self,
        collection: Collection,
        id: Uuid,
        update: &'a Update,
        guard: &'a Filter,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.write(&[collection], |tables| {
                let table = tables.entry(collection).or_default();
                let applied = update_in(table, id, update, guard)?;
                Ok((applied, applied))
            })
            .await
        })
    }

    fn delete(&self, collection: Collection, id: Uuid) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.write(&[collection], |tables| {
                let table = tables.entry(collection).or_default();
                let removed = table.remove(&id).is_some();
                Ok((removed, removed))
            })
            .await
        })
    }

    fn commit(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, BatchOutcome> {
        Box::pin(async move {
            let mut collections: Vec<Collection> = ops.iter().map(WriteOp::collection).collect();
            collections.sort();
            collections.dedup();

            self.write(&collections, |tables| {
                let mut inserted = Vec::new();
                for (step, op) in ops.into_iter().enumerate() {
                    let table = tables.entry(op.collection()).or_default();
                    let accepted = match op {
                        WriteOp::Insert {
                            document, unique, ..
                        } => {
                            let taken = unique
                                .as_ref()
                                .is_some_and(|key| table.values().any(|d| key.matches(d)));
                            if taken {
                                false
                            } else {
                                inserted.push(insert_into(table, document)?);
                                true
                            }
                        }
                        WriteOp::Update {
                            id, update, guard, ..
                        } => update_in(table, id, &update, &guard)?,
                    };
                    if !accepted {
                        tracing::debug!(step, "Batch step rejected");
                        metrics::counter!(
                            "registry_store_batches_rejected_total",
                            "backend" => "memory"
                        )
                        .increment(1);
                        return Ok((BatchOutcome::Rejected { step }, false));
                    }
                }
                Ok((BatchOutcome::Committed { inserted }, true))
            })
            .await
        })
    }
}

//! RocksDB storage backend for the agent's records.

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::Mutex;

use courier_core::{CoreError, Storage, StorageRecord, TagFilter, Tags};

/// Column family holding every record, keyed by `type \0 id`.
const CF_RECORDS: &str = "records";

/// RocksDB-backed record storage.
pub struct RocksStorage {
    db: DB,
    // Serializes read-modify-write sequences.
    write_lock: Mutex<()>,
}

fn storage_err(e: impl std::fmt::Display) -> CoreError {
    CoreError::StorageError(e.to_string())
}

impl RocksStorage {
    /// Open or create a RocksDB database at the given path.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        std::fs::create_dir_all(path).map_err(storage_err)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_RECORDS, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors).map_err(storage_err)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn type_prefix(record_type: &str) -> Vec<u8> {
        let mut prefix = record_type.as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn key(record_type: &str, id: &str) -> Vec<u8> {
        let mut key = Self::type_prefix(record_type);
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn not_found(record_type: &str, id: &str) -> CoreError {
        CoreError::StorageNotFound(format!("{} record {}", record_type, id))
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily, CoreError> {
        self.db
            .cf_handle(CF_RECORDS)
            .ok_or_else(|| storage_err(format!("column family '{}' not found", CF_RECORDS)))
    }

    fn read(&self, record_type: &str, id: &str) -> Result<Option<StorageRecord>, CoreError> {
        let raw = self
            .db
            .get_cf(self.cf()?, Self::key(record_type, id))
            .map_err(storage_err)?;
        raw.map(|bytes| serde_json::from_slice(&bytes).map_err(CoreError::from))
            .transpose()
    }

    fn write(&self, record: &StorageRecord) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.db
            .put_cf(self.cf()?, Self::key(&record.record_type, &record.id), bytes)
            .map_err(storage_err)
    }

    /// Load, change and write back an existing record.
    fn modify<F>(&self, record: &StorageRecord, change: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut StorageRecord),
    {
        let _guard = self.write_lock.lock().map_err(storage_err)?;
        let mut stored = self
            .read(&record.record_type, &record.id)?
            .ok_or_else(|| Self::not_found(&record.record_type, &record.id))?;
        change(&mut stored);
        self.write(&stored)
    }
}

#[async_trait]
impl Storage for RocksStorage {
    async fn add_record(&self, record: StorageRecord) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().map_err(storage_err)?;
        if self.read(&record.record_type, &record.id)?.is_some() {
            return Err(CoreError::StorageDuplicate(format!(
                "{} record {}",
                record.record_type, record.id
            )));
        }
        self.write(&record)
    }

    async fn get_record(&self, record_type: &str, record_id: &str) -> Result<StorageRecord, CoreError> {
        self.read(record_type, record_id)?
            .ok_or_else(|| Self::not_found(record_type, record_id))
    }

    async fn update_record_value(&self, record: &StorageRecord, value: &str) -> Result<(), CoreError> {
        self.modify(record, |stored| stored.value = value.to_string())
    }

    async fn update_record_tags(&self, record: &StorageRecord, tags: &Tags) -> Result<(), CoreError> {
        self.modify(record, |stored| stored.tags = tags.clone())
    }

    async fn delete_record_tags(
        &self,
        record: &StorageRecord,
        tag_names: &[String],
    ) -> Result<(), CoreError> {
        self.modify(record, |stored| {
            for name in tag_names {
                stored.tags.remove(name);
            }
        })
    }

    async fn delete_record(&self, record: &StorageRecord) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().map_err(storage_err)?;
        if self.read(&record.record_type, &record.id)?.is_none() {
            return Err(Self::not_found(&record.record_type, &record.id));
        }
        self.db
            .delete_cf(self.cf()?, Self::key(&record.record_type, &record.id))
            .map_err(storage_err)
    }

    async fn search_records(
        &self,
        record_type: &str,
        tag_filter: &TagFilter,
    ) -> Result<Vec<StorageRecord>, CoreError> {
        let prefix = Self::type_prefix(record_type);
        let iter = self
            .db
            .iterator_cf(self.cf()?, IteratorMode::From(prefix.as_slice(), Direction::Forward));
        let mut found = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(storage_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            let record: StorageRecord = serde_json::from_slice(&value)?;
            if record.matches(tag_filter) {
                found.push(record);
            }
        }
        Ok(found)
    }
}

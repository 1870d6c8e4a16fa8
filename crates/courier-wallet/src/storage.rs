use async_trait::async_trait;
use dashmap::DashMap;

use courier_core::{CoreError, Storage, StorageRecord, TagFilter, Tags};

/// Record storage held in memory, keyed by `(type, id)`.
#[derive(Default)]
pub struct BasicStorage {
    records: DashMap<(String, String), StorageRecord>,
}

impl BasicStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn key(record_type: &str, id: &str) -> (String, String) {
        (record_type.to_string(), id.to_string())
    }

    fn not_found(record_type: &str, id: &str) -> CoreError {
        CoreError::StorageNotFound(format!("{} record {}", record_type, id))
    }
}

#[async_trait]
impl Storage for BasicStorage {
    async fn add_record(&self, record: StorageRecord) -> Result<(), CoreError> {
        let key = Self::key(&record.record_type, &record.id);
        match self.records.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(CoreError::StorageDuplicate(
                format!("{} record {}", record.record_type, record.id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get_record(&self, record_type: &str, record_id: &str) -> Result<StorageRecord, CoreError> {
        self.records
            .get(&Self::key(record_type, record_id))
            .map(|r| r.value().clone())
            .ok_or_else(|| Self::not_found(record_type, record_id))
    }

    async fn update_record_value(&self, record: &StorageRecord, value: &str) -> Result<(), CoreError> {
        let mut stored = self
            .records
            .get_mut(&Self::key(&record.record_type, &record.id))
            .ok_or_else(|| Self::not_found(&record.record_type, &record.id))?;
        stored.value = value.to_string();
        Ok(())
    }

    async fn update_record_tags(&self, record: &StorageRecord, tags: &Tags) -> Result<(), CoreError> {
        let mut stored = self
            .records
            .get_mut(&Self::key(&record.record_type, &record.id))
            .ok_or_else(|| Self::not_found(&record.record_type, &record.id))?;
        stored.tags = tags.clone();
        Ok(())
    }

    async fn delete_record_tags(
        &self,
        record: &StorageRecord,
        tag_names: &[String],
    ) -> Result<(), CoreError> {
        let mut stored = self
            .records
            .get_mut(&Self::key(&record.record_type, &record.id))
            .ok_or_else(|| Self::not_found(&record.record_type, &record.id))?;
        for name in tag_names {
            stored.tags.remove(name);
        }
        Ok(())
    }

    async fn delete_record(&self, record: &StorageRecord) -> Result<(), CoreError> {
        self.records
            .remove(&Self::key(&record.record_type, &record.id))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(&record.record_type, &record.id))
    }

    async fn search_records(
        &self,
        record_type: &str,
        tag_filter: &TagFilter,
    ) -> Result<Vec<StorageRecord>, CoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.record_type == record_type && r.matches(tag_filter))
            .map(|r| r.value().clone())
            .collect())
    }
}

//! Record storage capability.
//!
//! Records are opaque string values addressed by `(type, id)` and carry a
//! flat set of string tags used for equality search.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CoreError;

/// Flat tag map attached to a record.
pub type Tags = BTreeMap<String, String>;

/// Equality filter over tags; every entry must match.
pub type TagFilter = BTreeMap<String, String>;

/// A single stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub id: String,
    pub value: String,
    #[serde(default)]
    pub tags: Tags,
}

impl StorageRecord {
    /// Create a record with a freshly generated id.
    pub fn new(record_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            id: uuid::Uuid::now_v7().to_string(),
            value: value.into(),
            tags: Tags::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Whether every entry in `filter` is present with an equal value.
    pub fn matches(&self, filter: &TagFilter) -> bool {
        filter
            .iter()
            .all(|(name, value)| self.tags.get(name) == Some(value))
    }
}

/// Build a tag filter from string pairs.
pub fn tag_filter<K, V, I>(pairs: I) -> TagFilter
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Persistent record storage.
///
/// Concurrent writers to the same record id are last-writer-wins.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Add a new record. Fails with `StorageDuplicate` if `(type, id)` exists.
    async fn add_record(&self, record: StorageRecord) -> Result<(), CoreError>;

    /// Fetch a record. Fails with `StorageNotFound` if absent.
    async fn get_record(&self, record_type: &str, record_id: &str) -> Result<StorageRecord, CoreError>;

    /// Replace the value of an existing record.
    async fn update_record_value(&self, record: &StorageRecord, value: &str) -> Result<(), CoreError>;

    /// Replace the tags of an existing record.
    async fn update_record_tags(&self, record: &StorageRecord, tags: &Tags) -> Result<(), CoreError>;

    /// Remove the named tags from an existing record.
    async fn delete_record_tags(
        &self,
        record: &StorageRecord,
        tag_names: &[String],
    ) -> Result<(), CoreError>;

    async fn delete_record(&self, record: &StorageRecord) -> Result<(), CoreError>;

    /// Every record of `record_type` whose tags match `tag_filter`.
    async fn search_records(
        &self,
        record_type: &str,
        tag_filter: &TagFilter,
    ) -> Result<Vec<StorageRecord>, CoreError>;

    /// Exactly one matching record: `StorageNotFound` on zero matches,
    /// `StorageDuplicate` on more than one.
    async fn find_single(
        &self,
        record_type: &str,
        tag_filter: &TagFilter,
    ) -> Result<StorageRecord, CoreError> {
        let mut found = self.search_records(record_type, tag_filter).await?;
        match found.len() {
            0 => Err(CoreError::StorageNotFound(format!(
                "no {} record matches {:?}",
                record_type, tag_filter
            ))),
            1 => Ok(found.remove(0)),
            n => Err(CoreError::StorageDuplicate(format!(
                "{} {} records match {:?}",
                n, record_type, tag_filter
            ))),
        }
    }

    /// Insert the record, or overwrite value and tags if it already exists.
    async fn save_record(&self, record: StorageRecord) -> Result<(), CoreError> {
        match self.get_record(&record.record_type, &record.id).await {
            Ok(existing) => {
                self.update_record_value(&existing, &record.value).await?;
                self.update_record_tags(&existing, &record.tags).await
            }
            Err(CoreError::StorageNotFound(_)) => self.add_record(record).await,
            Err(e) => Err(e),
        }
    }
}

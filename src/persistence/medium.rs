//! Backing media: where bucket rows live.
//!
//! A medium is a simple row store keyed by bucket id. It knows nothing about
//! entries; decoding and expiry checks happen in the bucket store.

use crate::core::error::MediumError;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// One stored bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub bucket_id: String,
    pub payload: Vec<u8>,
    /// Earliest expiry of any entry in the bucket, `-1` for none.
    pub earliest_expiry: i64,
}

impl Row {
    /// Whether the row may hold an entry expired at `now`.
    pub fn is_purge_candidate(&self, now: i64) -> bool {
        self.earliest_expiry >= 0 && self.earliest_expiry < now
    }
}

/// Lazily produced rows.
pub type RowStream<'a> = Box<dyn Iterator<Item = Result<Row, MediumError>> + Send + 'a>;

/// Row storage behind a bucket store.
///
/// Insert and update report affected row counts so the store can enforce
/// its integrity contract.
pub trait BackingMedium: Send + Sync {
    fn select_row(&self, bucket_id: &str) -> Result<Option<Row>, MediumError>;

    /// Insert a new row. Returns rows affected (0 if it already exists).
    fn insert_row(&self, row: &Row) -> Result<usize, MediumError>;

    /// Replace an existing row. Returns rows affected (0 if it does not exist).
    fn update_row(&self, row: &Row) -> Result<usize, MediumError>;

    /// Batched update, one count per row.
    fn update_rows(&self, rows: &[Row]) -> Result<Vec<usize>, MediumError> {
        rows.iter().map(|row| self.update_row(row)).collect()
    }

    /// Batched delete. Returns rows removed.
    fn delete_rows(&self, bucket_ids: &[String]) -> Result<usize, MediumError>;

    /// Rows whose earliest expiry has passed at `now`.
    fn select_expired_rows(&self, now: i64) -> Result<RowStream<'_>, MediumError>;

    /// Every row.
    fn select_all_rows(&self) -> Result<RowStream<'_>, MediumError>;

    /// Remove every row. Returns rows removed.
    fn delete_all(&self) -> Result<usize, MediumError>;
}

/// Rows held in process memory.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    rows: RwLock<BTreeMap<String, Row>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, including empty buckets.
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }
}

impl BackingMedium for MemoryMedium {
    fn select_row(&self, bucket_id: &str) -> Result<Option<Row>, MediumError> {
        Ok(self.rows.read().get(bucket_id).cloned())
    }

    fn insert_row(&self, row: &Row) -> Result<usize, MediumError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&row.bucket_id) {
            return Ok(0);
        }
        rows.insert(row.bucket_id.clone(), row.clone());
        Ok(1)
    }

    fn update_row(&self, row: &Row) -> Result<usize, MediumError> {
        match self.rows.write().get_mut(&row.bucket_id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete_rows(&self, bucket_ids: &[String]) -> Result<usize, MediumError> {
        let mut rows = self.rows.write();
        Ok(bucket_ids
            .iter()
            .filter(|id| rows.remove(id.as_str()).is_some())
            .count())
    }

    fn select_expired_rows(&self, now: i64) -> Result<RowStream<'_>, MediumError> {
        let expired: Vec<_> = self
            .rows
            .read()
            .values()
            .filter(|row| row.is_purge_candidate(now))
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::new(expired.into_iter()))
    }

    fn select_all_rows(&self) -> Result<RowStream<'_>, MediumError> {
        let all: Vec<_> = self.rows.read().values().cloned().map(Ok).collect();
        Ok(Box::new(all.into_iter()))
    }

    fn delete_all(&self) -> Result<usize, MediumError> {
        let mut rows = self.rows.write();
        let removed = rows.len();
        rows.clear();
        Ok(removed)
    }
}

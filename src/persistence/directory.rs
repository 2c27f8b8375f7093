//! Directory medium: one file per bucket row.
//!
//! Each row is written to a temporary file and renamed into place, so a
//! crash leaves either the old row or the new one, never a torn file.

use super::medium::{BackingMedium, Row, RowStream};
use crate::core::error::MediumError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const ROW_EXTENSION: &str = "bucket";
const TMP_EXTENSION: &str = "tmp";

#[derive(Serialize, Deserialize)]
struct RowFile {
    earliest_expiry: i64,
    payload: Vec<u8>,
}

/// Bucket rows stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryMedium {
    root: PathBuf,
}

impl DirectoryMedium {
    /// Open (creating if needed) a medium rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MediumError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "opened directory medium");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn row_path(&self, bucket_id: &str) -> PathBuf {
        self.root.join(format!("{bucket_id}.{ROW_EXTENSION}"))
    }

    fn write_row(&self, row: &Row) -> Result<(), MediumError> {
        let file = RowFile {
            earliest_expiry: row.earliest_expiry,
            payload: row.payload.clone(),
        };
        let bytes = bincode::serialize(&file).map_err(to_io)?;
        let tmp = self
            .root
            .join(format!("{}.{TMP_EXTENSION}", row.bucket_id));
        {
            let mut out = fs::File::create(&tmp)?;
            out.write_all(&bytes)?;
            out.sync_all()?;
        }
        fs::rename(&tmp, self.row_path(&row.bucket_id))?;
        Ok(())
    }

    fn rows(&self) -> Result<impl Iterator<Item = Result<Row, MediumError>> + Send, MediumError> {
        let entries = fs::read_dir(&self.root)?;
        Ok(entries.filter_map(|entry| {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => return Some(Err(err.into())),
            };
            if path.extension().and_then(|e| e.to_str()) != Some(ROW_EXTENSION) {
                return None;
            }
            let bucket_id = path.file_stem()?.to_str()?.to_string();
            Some(read_row(&path, bucket_id))
        }))
    }
}

fn to_io(err: bincode::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn read_row(path: &Path, bucket_id: String) -> Result<Row, MediumError> {
    let bytes = fs::read(path)?;
    let file: RowFile = match bincode::deserialize(&bytes) {
        Ok(file) => file,
        Err(err) => {
            return Err(MediumError::CorruptRow {
                bucket_id,
                reason: err.to_string(),
            })
        }
    };
    Ok(Row {
        bucket_id,
        payload: file.payload,
        earliest_expiry: file.earliest_expiry,
    })
}

impl BackingMedium for DirectoryMedium {
    fn select_row(&self, bucket_id: &str) -> Result<Option<Row>, MediumError> {
        let path = self.row_path(bucket_id);
        match read_row(&path, bucket_id.to_string()) {
            Ok(row) => Ok(Some(row)),
            Err(MediumError::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn insert_row(&self, row: &Row) -> Result<usize, MediumError> {
        if self.row_path(&row.bucket_id).exists() {
            return Ok(0);
        }
        self.write_row(row)?;
        Ok(1)
    }

    fn update_row(&self, row: &Row) -> Result<usize, MediumError> {
        if !self.row_path(&row.bucket_id).exists() {
            return Ok(0);
        }
        self.write_row(row)?;
        Ok(1)
    }

    fn delete_rows(&self, bucket_ids: &[String]) -> Result<usize, MediumError> {
        let mut removed = 0;
        for bucket_id in bucket_ids {
            match fs::remove_file(self.row_path(bucket_id)) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(removed)
    }

    fn select_expired_rows(&self, now: i64) -> Result<RowStream<'_>, MediumError> {
        let rows = self.rows()?.filter(move |row| match row {
            Ok(row) => row.is_purge_candidate(now),
            Err(_) => true,
        });
        Ok(Box::new(rows))
    }

    fn select_all_rows(&self) -> Result<RowStream<'_>, MediumError> {
        Ok(Box::new(self.rows()?))
    }

    fn delete_all(&self) -> Result<usize, MediumError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ROW_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        self.delete_rows(&ids)
    }
}

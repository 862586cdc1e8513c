//! [`sop_core::BlobStore`] implementations.

use dashmap::DashMap;
use sop_core::error::{Error, Result};
use sop_core::traits::BlobStore;
use std::path::PathBuf;
use uuid::Uuid;

/// In-memory `BlobStore`, keyed by `(table, id)`. Used by tests and as the
/// backing store for small/ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    tables: DashMap<String, DashMap<Uuid, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// A fresh, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, table: &str, id: Uuid) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.get(table).and_then(|t| t.get(&id).map(|v| v.clone())))
    }

    fn put(&self, table: &str, id: Uuid, bytes: &[u8]) -> Result<()> {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(id, bytes.to_vec());
        Ok(())
    }

    fn remove(&self, table: &str, id: Uuid) -> Result<()> {
        if let Some(t) = self.tables.get(table) {
            t.remove(&id);
        }
        Ok(())
    }

    fn create_table(&self, table: &str) -> Result<()> {
        self.tables.entry(table.to_string()).or_default();
        Ok(())
    }

    fn remove_table(&self, table: &str) -> Result<()> {
        self.tables.remove(table);
        Ok(())
    }
}

/// Filesystem-backed `BlobStore`. Each table is a subdirectory of
/// `base_path`; each blob is one file named by its id.
#[derive(Debug)]
pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    /// Open (creating if necessary) a filesystem blob store rooted at
    /// `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.base_path.join(table)
    }

    fn blob_path(&self, table: &str, id: Uuid) -> PathBuf {
        self.table_dir(table).join(id.to_string())
    }
}

impl BlobStore for FilesystemBlobStore {
    fn get(&self, table: &str, id: Uuid) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.blob_path(table, id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn put(&self, table: &str, id: Uuid, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(self.table_dir(table))?;
        // write-to-temp-then-rename keeps a half-written blob from ever
        // being observed as the committed version of this physical id.
        let tmp = self.blob_path(table, id).with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, self.blob_path(table, id))?;
        Ok(())
    }

    fn remove(&self, table: &str, id: Uuid) -> Result<()> {
        match std::fs::remove_file(self.blob_path(table, id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn create_table(&self, table: &str) -> Result<()> {
        std::fs::create_dir_all(self.table_dir(table))?;
        Ok(())
    }

    fn remove_table(&self, table: &str) -> Result<()> {
        match std::fs::remove_dir_all(self.table_dir(table)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }
}

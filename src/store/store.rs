use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{SecurityError, SecurityResult};

/// Storage consumed by the security core: opaque blobs keyed by ID.
///
/// `write_atomic` must leave either the fully-old or fully-new blob after
/// a crash, never a half-written one. Rotation takes the store by `&mut`,
/// which is the exclusive lock over it for the rotation's duration.
pub trait RecordStore {
    /// All record IDs, sorted, for deterministic iteration
    fn list_ids(&self) -> SecurityResult<Vec<String>>;

    fn read(&self, id: &str) -> SecurityResult<Vec<u8>>;

    /// Write via temp file, fsync, then atomic rename
    fn write_atomic(&mut self, id: &str, data: &[u8]) -> SecurityResult<()>;

    fn remove(&mut self, id: &str) -> SecurityResult<()>;
}

const RECORD_EXTENSION: &str = "enc";

/// Filesystem store: one encrypted blob per record in a flat directory
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn open(root: &Path) -> SecurityResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &str) -> SecurityResult<PathBuf> {
        // IDs become file names; path separators would escape the store.
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(SecurityError::invalid_parameter(
                "id",
                "a plain record identifier",
                id,
            ));
        }
        Ok(self.root.join(format!("{}.{}", id, RECORD_EXTENSION)))
    }
}

impl RecordStore for DirStore {
    fn list_ids(&self) -> SecurityResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read(&self, id: &str) -> SecurityResult<Vec<u8>> {
        let path = self.record_path(id)?;
        fs::read(&path).map_err(|e| SecurityError::Io(format!("read '{}': {}", path.display(), e)))
    }

    fn write_atomic(&mut self, id: &str, data: &[u8]) -> SecurityResult<()> {
        let path = self.record_path(id)?;
        let tmp = path.with_extension("enc.tmp");

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(data)?;
            file.flush()?;
            file.sync_all()?;
        }

        fs::rename(&tmp, &path)?;
        // Make the rename itself durable.
        if let Ok(dir) = File::open(&self.root) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) -> SecurityResult<()> {
        let path = self.record_path(id)?;
        fs::remove_file(&path)
            .map_err(|e| SecurityError::Io(format!("remove '{}': {}", path.display(), e)))
    }
}

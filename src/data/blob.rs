//! Blob store collaborator for large binary artifacts

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub String);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait BlobStore: Send + Sync {
    fn put(&self, name: &str, bytes: Vec<u8>) -> Result<BlobId>;

    /// `Ok(None)` when no blob has this id
    fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>>;

    fn find_by_name(&self, name: &str) -> Result<Option<BlobId>>;

    /// Streaming read of a blob
    fn open(&self, id: &BlobId) -> Result<Option<Box<dyn Read + Send>>> {
        Ok(self
            .get(id)?
            .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>))
    }
}

struct StoredBlob {
    name: String,
    bytes: Arc<[u8]>,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<BlobId, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_blobs<T>(&self, f: impl FnOnce(&mut HashMap<BlobId, StoredBlob>) -> T) -> Result<T> {
        let mut guard = self
            .blobs
            .lock()
            .map_err(|_| anyhow!("blob store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, name: &str, bytes: Vec<u8>) -> Result<BlobId> {
        let id = BlobId(uuid::Uuid::new_v4().simple().to_string());
        let blob = StoredBlob {
            name: name.to_string(),
            bytes: Arc::from(bytes),
        };
        // A name maps to one blob, as in the file store; the newest write wins
        self.with_blobs(|b| {
            b.retain(|_, existing| existing.name != name);
            b.insert(id.clone(), blob);
        })?;
        Ok(id)
    }

    fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>> {
        self.with_blobs(|b| b.get(id).map(|blob| blob.bytes.to_vec()))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<BlobId>> {
        self.with_blobs(|b| {
            b.iter()
                .find(|(_, blob)| blob.name == name)
                .map(|(id, _)| id.clone())
        })
    }

    fn open(&self, id: &BlobId) -> Result<Option<Box<dyn Read + Send>>> {
        // Shares the stored buffer instead of copying it
        let bytes = self.with_blobs(|b| b.get(id).map(|blob| Arc::clone(&blob.bytes)))?;
        Ok(bytes.map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>))
    }
}

/// One file per blob in a directory. The blob name doubles as its id.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .context(format!("Failed to create directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("invalid blob name: {:?}", name);
        }
        Ok(self.root.join(name))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, name: &str, bytes: Vec<u8>) -> Result<BlobId> {
        let path = self.path_for(name)?;
        // Write then rename so readers never see a partial file
        let tmp = self.root.join(format!(".{}.tmp", name));
        fs::write(&tmp, &bytes).context(format!("Failed to write blob: {}", tmp.display()))?;
        fs::rename(&tmp, &path).context(format!("Failed to move blob into place: {}", path.display()))?;
        Ok(BlobId(name.to_string()))
    }

    fn get(&self, id: &BlobId) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(&id.0)?;
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .context(format!("Failed to read blob: {}", path.display()))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<BlobId>> {
        let path = self.path_for(name)?;
        Ok(path.is_file().then(|| BlobId(name.to_string())))
    }

    fn open(&self, id: &BlobId) -> Result<Option<Box<dyn Read + Send>>> {
        let path = self.path_for(&id.0)?;
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path).context(format!("Failed to open blob: {:?}", path))?;
        Ok(Some(Box::new(BufReader::new(file))))
    }
}

//! Key/value backends for calibration persistence.
//!
//! `MemoryStore` is volatile and meant for tests and dry runs. `FileStore`
//! keeps one TOML document on disk and replaces it atomically on every
//! commit, so a power cut leaves either the old or the new document.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use proxi_traits::{BoxError, KvStore};
use tracing::{debug, warn};

use crate::error::{HwError, Result};

type Namespaces = BTreeMap<String, BTreeMap<String, u32>>;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Namespaces,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }
}

impl KvStore for MemoryStore {
    fn get_u32(&self, namespace: &str, key: &str) -> std::result::Result<Option<u32>, BoxError> {
        Ok(self
            .entries
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .copied())
    }

    fn set_u32(&mut self, namespace: &str, key: &str, value: u32) -> std::result::Result<(), BoxError> {
        self.entries
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    fn erase_all(&mut self) -> std::result::Result<(), BoxError> {
        self.entries.clear();
        Ok(())
    }
}

/// File-backed store. Writes are staged in `pending` until `commit`; the
/// durable snapshot in `entries` only changes after the file is replaced.
/// A failed commit drops the staged writes, so reads fall back to what is
/// on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Namespaces,
    pending: Namespaces,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`. A missing file is an
    /// empty store; an unreadable or malformed one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => toml::from_str::<Namespaces>(&text)
                .map_err(|e| HwError::Format(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Namespaces::new(),
            Err(e) => return Err(HwError::Io(e)),
        };
        debug!(path = %path.display(), namespaces = entries.len(), "file store opened");
        Ok(Self {
            path,
            entries,
            pending: Namespaces::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Namespaces) -> Result<()> {
        let text = toml::to_string(entries).map_err(|e| HwError::Format(e.to_string()))?;
        write_atomic(&self.path, text.as_bytes())?;
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get_u32(&self, namespace: &str, key: &str) -> std::result::Result<Option<u32>, BoxError> {
        let lookup = |map: &Namespaces| map.get(namespace).and_then(|ns| ns.get(key)).copied();
        Ok(lookup(&self.pending).or_else(|| lookup(&self.entries)))
    }

    fn set_u32(&mut self, namespace: &str, key: &str, value: u32) -> std::result::Result<(), BoxError> {
        self.pending
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> std::result::Result<(), BoxError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let staged = std::mem::take(&mut self.pending);
        let mut next = self.entries.clone();
        for (ns, keys) in staged {
            next.entry(ns).or_default().extend(keys);
        }
        match self.persist(&next) {
            Ok(()) => {
                self.entries = next;
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "file store commit failed; staged writes dropped");
                Err(Box::new(e) as BoxError)
            }
        }
    }

    fn erase_all(&mut self) -> std::result::Result<(), BoxError> {
        self.persist(&Namespaces::new())
            .map_err(|e| Box::new(e) as BoxError)?;
        self.entries.clear();
        self.pending.clear();
        Ok(())
    }
}

/// Write via a sibling temp file, fsync it, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

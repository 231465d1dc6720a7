//! Namespaced key-value persistence.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid key '{0}'")]
    InvalidKey(String),
}

/// Durable string storage addressed by `(namespace, key)`.
pub trait KeyValueStore: Send {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, KvError>;

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), KvError>;

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), KvError>;
}

fn check_segment(segment: &str) -> Result<(), KvError> {
    let ok = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(KvError::InvalidKey(segment.to_string()))
    }
}

/// One JSON file per key under `<root>/<namespace>/`.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$XDG_DATA_HOME` (or platform equivalent).
    pub fn with_default_dir() -> Result<Self, KvError> {
        dirs::data_dir()
            .map(Self::new)
            .ok_or_else(|| KvError::Unavailable("no data directory for this platform".to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, namespace: &str, key: &str) -> Result<PathBuf, KvError> {
        check_segment(namespace)?;
        check_segment(key)?;
        Ok(self.root.join(namespace).join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, KvError> {
        let path = self.path_for(namespace, key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(KvError::Io { path, source }),
        }
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), KvError> {
        let path = self.path_for(namespace, key)?;
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| KvError::Io { path, source }
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io(dir))?;
        }
        // Write-then-rename: readers never observe a partial document.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(io(&tmp))?;
        fs::rename(&tmp, &path).map_err(io(&path))?;
        debug!(path = %path.display(), bytes = value.len(), "kv write");
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), KvError> {
        let path = self.path_for(namespace, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(KvError::Io { path, source }),
        }
    }
}

/// In-process store. Clones share contents and failure switches.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    data: Arc<Mutex<HashMap<(String, String), String>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), String>>, KvError> {
        self.data
            .lock()
            .map_err(|_| KvError::Unavailable("memory store poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, KvError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("reads disabled".to_string()));
        }
        Ok(self
            .lock()?
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), KvError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("writes disabled".to_string()));
        }
        self.lock()?
            .insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), KvError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("writes disabled".to_string()));
        }
        self.lock()?
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}

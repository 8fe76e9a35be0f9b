//! The store module
//! A persistent key-value map keyed by content hash, loaded lazily and
//! flushed to disk after every mutation

use crate::error::{KbError, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

const FORMAT_VERSION: u32 = 1;

/// Lifecycle of a store: `Unopened -> Loaded -> Cleared -> Loaded ...`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Nothing read from disk yet.
    Unopened,
    /// Entries are in memory and mirror the backing file.
    Loaded,
    /// Entries dropped and the backing file removed.
    Cleared,
}

/// On-disk envelope. Values are encoded one by one so a damaged record
/// can be skipped without losing the rest of the store.
#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    records: Vec<(String, Vec<u8>)>,
}

struct Entries<V> {
    keys: Vec<String>,
    values: HashMap<String, V>,
}

impl<V> Default for Entries<V> {
    fn default() -> Self {
        Entries { keys: Vec::new(), values: HashMap::new() }
    }
}

/// Content-addressed key-value store backed by a single file.
///
/// Keys keep their first insertion order, which is the order [`iter`](KvStore::iter)
/// and [`keys`](KvStore::keys) report. No locking is done here: callers that share a
/// store between threads must serialize access themselves.
pub struct KvStore<V> {
    path: PathBuf,
    state: StoreState,
    entries: Entries<V>,
}

impl<V: Serialize + DeserializeOwned> KvStore<V> {
    /// Binds a store to `path` without touching the filesystem.
    ///
    /// The file is read on first access and created on first write.
    ///
    /// # Examples
    ///
    /// ```
    /// use knowdb::store::{KvStore, StoreState};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let mut store: KvStore<String> = KvStore::open(dir.path().join("kv.db"));
    /// assert_eq!(store.state(), StoreState::Unopened);
    ///
    /// store.set("k".to_string(), "v".to_string()).unwrap();
    /// assert_eq!(store.get("k").unwrap(), Some(&"v".to_string()));
    /// assert_eq!(store.state(), StoreState::Loaded);
    /// ```
    pub fn open(path: impl Into<PathBuf>) -> Self {
        KvStore {
            path: path.into(),
            state: StoreState::Unopened,
            entries: Entries::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Returns the value stored under `key`, or `None` if absent.
    pub fn get(&mut self, key: &str) -> Result<Option<&V>> {
        self.ensure_loaded()?;
        Ok(self.entries.values.get(key))
    }

    pub fn contains_key(&mut self, key: &str) -> Result<bool> {
        self.ensure_loaded()?;
        Ok(self.entries.values.contains_key(key))
    }

    pub fn len(&mut self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.entries.keys.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All keys in insertion order.
    pub fn keys(&mut self) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.entries.keys.clone())
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&mut self) -> Result<impl Iterator<Item = (&str, &V)>> {
        self.ensure_loaded()?;
        let values = &self.entries.values;
        Ok(self.entries.keys
            .iter()
            .filter_map(move |key| values.get(key).map(|value| (key.as_str(), value))))
    }

    /// Inserts or overwrites `key`, then flushes the whole store.
    ///
    /// An overwritten key keeps its original position.
    pub fn set(&mut self, key: String, value: V) -> Result<()> {
        self.ensure_loaded()?;
        self.state = StoreState::Loaded;

        if self.entries.values.insert(key.clone(), value).is_none() {
            self.entries.keys.push(key);
        }

        self.flush()
    }

    /// Removes `key`. Returns `false` when it was not there, which is not an error.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.ensure_loaded()?;

        if self.entries.values.remove(key).is_none() {
            return Ok(false);
        }
        self.entries.keys.retain(|k| k != key);
        self.flush()?;

        debug!(key = %key, path = %self.path.display(), "deleted key");
        Ok(true)
    }

    /// Drops every entry and deletes the backing file.
    pub fn clear(&mut self) -> Result<()> {
        self.entries = Entries::default();
        self.state = StoreState::Cleared;

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(KbError::storage(&self.path, e)),
        }

        debug!(path = %self.path.display(), "store cleared");
        Ok(())
    }

    fn ensure_loaded(&mut self) -> Result<()> {
        if self.state == StoreState::Unopened {
            self.entries = read_entries(&self.path)?;
            self.state = StoreState::Loaded;
        }
        Ok(())
    }

    /// Rewrites the file through a temp file + rename so readers never see half a store.
    fn flush(&self) -> Result<()> {
        let mut records = Vec::with_capacity(self.entries.keys.len());
        for key in &self.entries.keys {
            if let Some(value) = self.entries.values.get(key) {
                let bytes = bincode::serialize(value)
                    .map_err(|e| KbError::codec(&self.path, e))?;
                records.push((key.clone(), bytes));
            }
        }
        let stored = StoreFile { version: FORMAT_VERSION, records };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| KbError::storage(parent, e))?;
            }
        }

        let tmp = tmp_path(&self.path);
        let file = File::create(&tmp).map_err(|e| KbError::storage(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &stored)
            .map_err(|e| KbError::codec(&self.path, e))?;
        writer.flush().map_err(|e| KbError::storage(&tmp, e))?;
        drop(writer);

        fs::rename(&tmp, &self.path).map_err(|e| KbError::storage(&self.path, e))?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn read_entries<V: DeserializeOwned>(path: &Path) -> Result<Entries<V>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no store file yet, starting empty");
            return Ok(Entries::default());
        }
        Err(e) => return Err(KbError::storage(path, e)),
    };

    let stored: StoreFile = bincode::deserialize_from(BufReader::new(file))
        .map_err(|e| KbError::codec(path, e))?;

    if stored.version != FORMAT_VERSION {
        let msg = format!("unsupported store version {}", stored.version);
        return Err(KbError::codec(path, Box::new(bincode::ErrorKind::Custom(msg))));
    }

    let mut entries = Entries::default();
    let mut skipped = 0usize;
    for (key, bytes) in stored.records {
        match bincode::deserialize::<V>(&bytes) {
            Ok(value) => {
                if entries.values.insert(key.clone(), value).is_none() {
                    entries.keys.push(key);
                }
            }
            Err(e) => {
                skipped += 1;
                warn!(key = %key, path = %path.display(), error = %e, "skipping unreadable record");
            }
        }
    }

    debug!(path = %path.display(), records = entries.keys.len(), skipped, "store loaded");
    Ok(entries)
}

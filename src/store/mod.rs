//! Local document store.
//!
//! The whole `database.json` file is parsed once into a [`Document`] and kept
//! in memory behind a single lock. Mutations are visible to later reads right
//! away but only reach disk when [`Store::save`] is called.

pub mod collections;
pub mod favicon;
pub mod model;

use parking_lot::Mutex;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use collections::{Bookmarks, IdCollection, SearchHistory, SearchHistoryView, SettingsView, VisitHistory};
pub use favicon::{FaviconFetcher, FaviconStore, HttpFetcher};
pub use model::{BookmarkEntry, Document, Identified, SearchHistoryEntry, Settings, VisitHistoryEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No entry carries the requested id.
    NotFound(String),
    OutOfRange { index: usize, len: usize },
    /// Request payload did not describe a valid entry.
    Invalid(String),
    Io(String),
    Serialize(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "no entry with id {}", id),
            StoreError::OutOfRange { index, len } => {
                write!(f, "index {} out of range (len {})", index, len)
            }
            StoreError::Invalid(e) => write!(f, "invalid input: {}", e),
            StoreError::Io(e) => write!(f, "io: {}", e),
            StoreError::Serialize(e) => write!(f, "serialize: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// One ordered sequence inside the [`Document`].
pub trait CollectionKind {
    type Item: Clone;
    /// Top-level key in the persisted file.
    const KEY: &'static str;

    fn items(doc: &Document) -> &Vec<Self::Item>;
    fn items_mut(doc: &mut Document) -> &mut Vec<Self::Item>;
}

pub struct Store {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl Store {
    /// Load `path` into memory. A missing, empty or unparsable file yields the
    /// default document; an unparsable one is first moved to `<file>.corrupt-<timestamp>`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = load_document(&path);
        Store { path, doc: Mutex::new(doc) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole document to a temp file and rename it over the target.
    /// Holds the document lock for the duration so no mutation interleaves.
    pub fn save(&self) -> Result<(), StoreError> {
        let doc = self.doc.lock();
        let bytes = serde_json::to_vec(&*doc).map_err(|e| StoreError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(format!("create dir: {}", e)))?;
        }

        let tmp = sibling(&self.path, ".tmp");
        fs::write(&tmp, &bytes).map_err(|e| StoreError::Io(format!("write tmp: {}", e)))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Io(format!("rename: {}", e)));
        }
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "document saved");
        Ok(())
    }

    /// Snapshot of the full in-memory document.
    pub fn document(&self) -> Document {
        self.doc.lock().clone()
    }

    pub fn get_all<C: CollectionKind>(&self) -> Vec<C::Item> {
        C::items(&self.doc.lock()).clone()
    }

    pub fn append<C: CollectionKind>(&self, item: C::Item) -> Result<(), StoreError> {
        C::items_mut(&mut self.doc.lock()).push(item);
        Ok(())
    }

    pub fn replace_at<C: CollectionKind>(&self, index: usize, item: C::Item) -> Result<(), StoreError> {
        self.with_collection::<C, _>(|items| {
            let len = items.len();
            let slot = items.get_mut(index).ok_or(StoreError::OutOfRange { index, len })?;
            *slot = item;
            Ok(())
        })
    }

    pub fn remove_at<C: CollectionKind>(&self, index: usize) -> Result<(), StoreError> {
        self.with_collection::<C, _>(|items| {
            if index >= items.len() {
                return Err(StoreError::OutOfRange { index, len: items.len() });
            }
            items.remove(index);
            Ok(())
        })
    }

    /// Run `f` on one collection inside a single lock acquisition, so a
    /// lookup and the mutation that follows it cannot be split by another task.
    pub(crate) fn with_collection<C: CollectionKind, R>(&self, f: impl FnOnce(&mut Vec<C::Item>) -> R) -> R {
        let mut doc = self.doc.lock();
        f(C::items_mut(&mut doc))
    }

    pub(crate) fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut doc = self.doc.lock();
        f(&mut doc)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn load_document(path: &Path) -> Document {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no database yet, starting empty");
            return Document::default();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "database unreadable, starting empty");
            return Document::default();
        }
    };

    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Document::default();
    }

    match serde_json::from_slice::<Document>(&bytes) {
        Ok(doc) => doc,
        Err(e) => {
            let aside = corrupt_aside(path);
            match fs::rename(path, &aside) {
                Ok(()) => {
                    tracing::warn!(path = %path.display(), error = %e, moved_to = %aside.display(), "database corrupt, starting empty")
                }
                Err(mv) => tracing::error!(
                    path = %path.display(),
                    error = %e,
                    move_error = %mv,
                    "database corrupt and could not be moved aside; next save overwrites it"
                ),
            }
            Document::default()
        }
    }
}

/// `<file>.corrupt-<timestamp>`, with a counter if that name is taken, so an
/// earlier aside copy is never replaced.
fn corrupt_aside(path: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f").to_string();
    let base = sibling(path, &format!(".corrupt-{}", stamp));
    let mut candidate = base.clone();
    let mut n = 1;
    while candidate.exists() {
        candidate = sibling(&base, &format!(".{}", n));
        n += 1;
    }
    candidate
}

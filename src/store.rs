//! Key/value blob persistence for the library.
//!
//! The whole book list is one JSON array under [`LIBRARY_KEY`], rewritten on
//! every save.

use std::{
    cell::RefCell,
    collections::HashMap,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
};

use serde_json::Value;

use crate::{
    error::LibraryError,
    library::{BookRecord, Library},
};

/// Key the book list is stored under
pub const LIBRARY_KEY: &str = "myLibrary";

/// Opaque string storage addressed by key
pub trait BlobStore {
    /// Read the blob stored under `key`, if any
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::LoadError` if the blob exists but cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, LibraryError>;

    /// Replace the blob stored under `key`
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::PersistenceError` if the blob cannot be written.
    fn save(&self, key: &str, value: &str) -> Result<(), LibraryError>;
}

/// Stores each key as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory holding the blobs
    dir: PathBuf,
}

impl FileStore {
    /// Store blobs in `dir`, created on first save
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file backing `key`
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, LibraryError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&path)
            .map_err(|e| LibraryError::LoadError(format!("Failed to open file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| LibraryError::LoadError(format!("Failed to read file: {e}")))?;

        Ok(Some(contents))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), LibraryError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            LibraryError::PersistenceError(format!("Failed to create directory: {e}"))
        })?;

        let path = self.path_for(key);
        tracing::debug!(path = %path.display(), "saving blob");

        let mut file = File::create(&path)
            .map_err(|e| LibraryError::PersistenceError(format!("Failed to create file: {e}")))?;

        file.write_all(value.as_bytes())
            .map_err(|e| LibraryError::PersistenceError(format!("Failed to write to file: {e}")))?;

        Ok(())
    }
}

/// In-memory store, handy for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Blobs by key
    blobs: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, LibraryError> {
        Ok(self.blobs.borrow().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), LibraryError> {
        self.blobs.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Parse a JSON array of loosely shaped rows into records
///
/// # Errors
///
/// Returns `LibraryError::LoadError` if `json` is not a JSON array.
pub fn parse_rows(json: &str, users: &[String]) -> Result<Vec<BookRecord>, LibraryError> {
    let rows: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| LibraryError::LoadError(format!("Failed to parse JSON: {e}")))?;
    Ok(rows.iter().map(|row| BookRecord::from_row(row, users)).collect())
}

impl Library {
    /// Load the library from `store`.
    ///
    /// A missing blob gives an empty library, as does a corrupt one (logged).
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::LoadError` if the store itself fails.
    pub fn load_from(store: &dyn BlobStore, users: Vec<String>) -> Result<Self, LibraryError> {
        let Some(json) = store.load(LIBRARY_KEY)? else {
            return Ok(Self::new(users));
        };
        match parse_rows(&json, &users) {
            Ok(books) => {
                tracing::debug!(count = books.len(), "library loaded");
                Ok(Self::with_books(users, books))
            }
            Err(err) => {
                tracing::warn!("stored library is unreadable, starting empty: {err}");
                Ok(Self::new(users))
            }
        }
    }

    /// Write the whole library to `store`
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::PersistenceError` if serialization or the store fails.
    pub fn save_to(&self, store: &dyn BlobStore) -> Result<(), LibraryError> {
        let serialized = serde_json::to_string_pretty(self.books())
            .map_err(|e| LibraryError::PersistenceError(e.to_string()))?;
        store.save(LIBRARY_KEY, &serialized)
    }

    /// Upsert every row of an exported JSON array, returning how many were new
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::LoadError` if `json` is not a JSON array.
    pub fn import_rows(&mut self, json: &str) -> Result<usize, LibraryError> {
        let books = parse_rows(json, self.users())?;
        Ok(books
            .into_iter()
            .filter(|book| !book.isbn.is_empty())
            .map(|book| self.upsert(book))
            .filter(|inserted| *inserted)
            .count())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::isbn::Isbn;

    fn users() -> Vec<String> {
        vec!["sohini".to_string(), "som".to_string()]
    }

    #[test]
    fn missing_blob_is_an_empty_library() {
        let store = MemoryStore::new();
        let library = Library::load_from(&store, users()).unwrap();
        assert!(library.is_empty());
    }

    #[test]
    fn corrupt_blob_is_an_empty_library() {
        let store = MemoryStore::new();
        store.save(LIBRARY_KEY, "{not json").unwrap();
        let library = Library::load_from(&store, users()).unwrap();
        assert!(library.is_empty());
    }

    #[test]
    fn save_then_load_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"));

        let mut library = Library::new(users());
        let record = BookRecord::new(&Isbn::parse("0306406152").unwrap(), "T", "A", "Poetry");
        library.add_book(record, "som", true).unwrap();
        library.save_to(&store).unwrap();

        assert!(store.path_for(LIBRARY_KEY).exists());
        let loaded = Library::load_from(&store, users()).unwrap();
        assert_eq!(loaded, library);
    }

    #[test]
    fn legacy_records_are_migrated() {
        let store = MemoryStore::new();
        store
            .save(LIBRARY_KEY, r#"[{"isbn":"0306406152","title":"Old","isRead":true}]"#)
            .unwrap();
        let library = Library::load_from(&store, users()).unwrap();
        let book = library.get("0306406152").unwrap();
        assert!(book.is_read_by("sohini"));
        assert!(!book.is_read_by("som"));
    }

    #[test]
    fn import_counts_new_books_only() {
        let mut library = Library::new(users());
        let rows = r#"[
            {"isbn":"0306406152","title":"One","read_som":"YES"},
            {"isbn":"9780306406157","title":"Two"},
            {"isbn":"","title":"No ISBN"}
        ]"#;
        assert_eq!(library.import_rows(rows).unwrap(), 2);
        assert_eq!(library.import_rows(rows).unwrap(), 0);
        assert_eq!(library.len(), 2);
        assert!(library.get("0306406152").unwrap().is_read_by("som"));
        assert!(library.import_rows("{}").is_err());
    }

    #[test]
    fn import_keeps_read_flags_the_row_does_not_mention() {
        let mut library = Library::new(users());
        let record = BookRecord::new(&Isbn::parse("0306406152").unwrap(), "T", "A", "Poetry");
        library.add_book(record, "som", true).unwrap();

        let rows = r#"[{"isbn":"0306406152","title":"T2","read_sohini":"YES"}]"#;
        assert_eq!(library.import_rows(rows).unwrap(), 0);

        let book = library.get("0306406152").unwrap();
        assert_eq!(book.title, "T2");
        assert!(book.is_read_by("som"));
        assert!(book.is_read_by("sohini"));
        assert_eq!(book.read_by.len(), 2);
    }
}

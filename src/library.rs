//! The personal book list: records, per-reader read flags, queries and stats.

use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    category::DEFAULT_CATEGORY,
    error::LibraryError,
    isbn::{Isbn, cover_url},
};

/// Placeholder for a missing title or author
pub const UNKNOWN: &str = "Unknown";

/// One book in the library
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    /// Normalised ISBN
    pub isbn: String,
    /// Title as returned by the metadata source
    pub title: String,
    /// Author(s), comma separated
    pub author: String,
    /// Cover image URL
    pub image: String,
    /// Shelf category
    pub category: String,
    /// Read flag per reader
    #[serde(default)]
    pub read_by: BTreeMap<String, bool>,
}

impl BookRecord {
    /// Create a record with the default cover and no read flags
    #[must_use]
    pub fn new(isbn: &Isbn, title: &str, author: &str, category: &str) -> Self {
        Self {
            isbn: isbn.to_string(),
            title: non_empty_or(title, UNKNOWN),
            author: non_empty_or(author, UNKNOWN),
            image: isbn.cover_url(),
            category: non_empty_or(category, DEFAULT_CATEGORY),
            read_by: BTreeMap::new(),
        }
    }

    /// Whether `user` has read this book; unknown readers have not
    #[must_use]
    pub fn is_read_by(&self, user: &str) -> bool {
        self.read_by.get(user).copied().unwrap_or(false)
    }

    /// Build a record from a loosely shaped JSON row.
    ///
    /// Accepts both the nested `readBy` object and flat `read_<user>` columns
    /// (`"YES"`/`"NO"`), the latter taking precedence. A legacy `isRead` flag
    /// without `readBy` is credited to the first reader. Only readers the row
    /// mentions get a flag. Missing text fields get placeholders and `http://`
    /// images are upgraded to `https://`.
    #[must_use]
    pub fn from_row(row: &Value, users: &[String]) -> Self {
        let text = |key: &str| -> String {
            match row.get(key) {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            }
        };

        let code = text("isbn");
        let image = text("image").replacen("http://", "https://", 1);
        let image = if image.is_empty() && !code.is_empty() { cover_url(&code) } else { image };

        let mut read_by = BTreeMap::new();
        match row.get("readBy") {
            Some(Value::Object(flags)) => {
                for user in users {
                    if let Some(flag) = flags.get(user) {
                        read_by.insert(user.clone(), parse_yes_no(flag));
                    }
                }
            }
            _ => {
                if let (Some(flag), Some(first)) = (row.get("isRead"), users.first()) {
                    read_by.insert(first.clone(), parse_yes_no(flag));
                }
            }
        }
        for user in users {
            if let Some(flag) = row.get(format!("read_{user}").as_str()) {
                read_by.insert(user.clone(), parse_yes_no(flag));
            }
        }

        Self {
            title: non_empty_or(&text("title"), UNKNOWN),
            author: non_empty_or(&text("author"), UNKNOWN),
            category: non_empty_or(&text("category"), DEFAULT_CATEGORY),
            isbn: code,
            image,
            read_by,
        }
    }
}

/// Interpret a yes/no style flag: `true`, `"yes"`, `"true"` and `"1"` are yes
#[must_use]
pub fn parse_yes_no(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "yes" | "true" | "1"),
        Value::Number(n) => n.as_u64() == Some(1),
        _ => false,
    }
}

/// `value` trimmed, or `fallback` when that is empty
fn non_empty_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() { fallback.to_string() } else { trimmed.to_string() }
}

/// Which books to keep by read status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFilter {
    /// Every book
    #[default]
    All,
    /// Books the reader has read
    Read,
    /// Books the reader has not read
    Unread,
}

impl FromStr for ReadFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "read" => Ok(Self::Read),
            "unread" => Ok(Self::Unread),
            other => Err(format!("unknown read filter {other:?}, expected all, read or unread")),
        }
    }
}

/// Field used to order query results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Order by title
    #[default]
    Title,
    /// Order by author
    Author,
    /// Order by category
    Category,
    /// Order by ISBN
    Isbn,
}

impl SortKey {
    /// The field of `book` this key sorts on
    fn field(self, book: &BookRecord) -> &str {
        match self {
            Self::Title => &book.title,
            Self::Author => &book.author,
            Self::Category => &book.category,
            Self::Isbn => &book.isbn,
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "author" => Ok(Self::Author),
            "category" => Ok(Self::Category),
            "isbn" => Ok(Self::Isbn),
            other => Err(format!(
                "unknown sort key {other:?}, expected title, author, category or isbn"
            )),
        }
    }
}

/// Filters applied by [`Library::query`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryQuery {
    /// Case-insensitive text matched against title, author, category and ISBN
    pub search: Option<String>,
    /// Read-status filter, evaluated for `user`
    pub read: ReadFilter,
    /// Exact category to keep
    pub category: Option<String>,
    /// Sort order
    pub sort: SortKey,
    /// Reader whose flags the read filter uses
    pub user: String,
}

/// Counts shown on the home screen for one reader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LibraryStats {
    /// Books in the library
    pub total: usize,
    /// Books the reader has read
    pub read: usize,
    /// Books the reader has not read
    pub unread: usize,
}

/// The shared book list and its readers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Library {
    /// Configured readers, in order
    users: Vec<String>,
    /// Books in insertion order
    books: Vec<BookRecord>,
}

impl Library {
    /// Create an empty library for `users`
    #[must_use]
    pub fn new(users: Vec<String>) -> Self {
        Self { users, books: Vec::new() }
    }

    /// Create a library from existing records, filling in missing read flags
    #[must_use]
    pub fn with_books(users: Vec<String>, books: Vec<BookRecord>) -> Self {
        let mut library = Self::new(users);
        for mut book in books {
            library.fill_read_flags(&mut book);
            library.books.push(book);
        }
        library
    }

    /// Configured readers
    #[must_use]
    pub fn users(&self) -> &[String] {
        &self.users
    }

    /// Every book in insertion order
    #[must_use]
    pub fn books(&self) -> &[BookRecord] {
        &self.books
    }

    /// Number of books
    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether the library has no books
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Find a book by ISBN
    #[must_use]
    pub fn get(&self, isbn: &str) -> Option<&BookRecord> {
        self.books.iter().find(|b| b.isbn == isbn)
    }

    /// Insert or replace a book, keeping read flags the new record does not set.
    ///
    /// The record moves to the end of the list. Returns `true` when the ISBN
    /// was not in the library before.
    pub fn upsert(&mut self, mut record: BookRecord) -> bool {
        let existing = self.books.iter().position(|b| b.isbn == record.isbn);
        if let Some(pos) = existing {
            let old = self.books.remove(pos);
            for (user, flag) in old.read_by {
                record.read_by.entry(user).or_insert(flag);
            }
        }
        self.fill_read_flags(&mut record);
        tracing::info!(isbn = %record.isbn, title = %record.title, "book saved");
        self.books.push(record);
        existing.is_none()
    }

    /// Add a freshly scanned book with `user`'s read flag.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::UnknownUser` if `user` is not a configured reader.
    pub fn add_book(
        &mut self,
        mut record: BookRecord,
        user: &str,
        is_read: bool,
    ) -> Result<bool, LibraryError> {
        self.check_user(user)?;
        record.read_by.insert(user.to_string(), is_read);
        Ok(self.upsert(record))
    }

    /// Flip `user`'s read flag on a book and return the new value
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::UnknownUser` for an unknown reader and
    /// `LibraryError::BookNotFound` for an unknown ISBN.
    pub fn toggle_read(&mut self, isbn: &str, user: &str) -> Result<bool, LibraryError> {
        let current = self
            .get(isbn)
            .ok_or_else(|| LibraryError::BookNotFound(isbn.to_string()))?
            .is_read_by(user);
        self.set_read(isbn, user, !current)?;
        Ok(!current)
    }

    /// Set `user`'s read flag on a book
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::UnknownUser` for an unknown reader and
    /// `LibraryError::BookNotFound` for an unknown ISBN.
    pub fn set_read(&mut self, isbn: &str, user: &str, read: bool) -> Result<(), LibraryError> {
        self.check_user(user)?;
        let book = self
            .books
            .iter_mut()
            .find(|b| b.isbn == isbn)
            .ok_or_else(|| LibraryError::BookNotFound(isbn.to_string()))?;
        book.read_by.insert(user.to_string(), read);
        tracing::info!(isbn, user, read, "read flag updated");
        Ok(())
    }

    /// Remove a book and return it
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::BookNotFound` if no book has this ISBN.
    pub fn remove(&mut self, isbn: &str) -> Result<BookRecord, LibraryError> {
        let pos = self
            .books
            .iter()
            .position(|b| b.isbn == isbn)
            .ok_or_else(|| LibraryError::BookNotFound(isbn.to_string()))?;
        tracing::info!(isbn, "book removed");
        Ok(self.books.remove(pos))
    }

    /// Books matching `query`, sorted
    #[must_use]
    pub fn query(&self, query: &LibraryQuery) -> Vec<&BookRecord> {
        let needle = query.search.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty());
        let mut books: Vec<&BookRecord> = self
            .books
            .iter()
            .filter(|b| needle.as_deref().is_none_or(|n| matches_search(b, n)))
            .filter(|b| match query.read {
                ReadFilter::All => true,
                ReadFilter::Read => b.is_read_by(&query.user),
                ReadFilter::Unread => !b.is_read_by(&query.user),
            })
            .filter(|b| query.category.as_deref().is_none_or(|c| b.category == c))
            .collect();
        books.sort_by(|a, b| compare_text(query.sort.field(a), query.sort.field(b)));
        books
    }

    /// Total, read and unread counts for `user`
    #[must_use]
    pub fn stats(&self, user: &str) -> LibraryStats {
        let total = self.books.len();
        let read = self.books.iter().filter(|b| b.is_read_by(user)).count();
        LibraryStats { total, read, unread: total.saturating_sub(read) }
    }

    /// Distinct non-empty categories, sorted
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .books
            .iter()
            .filter(|b| !b.category.is_empty())
            .map(|b| b.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Fail unless `user` is a configured reader
    fn check_user(&self, user: &str) -> Result<(), LibraryError> {
        if self.users.iter().any(|u| u == user) {
            Ok(())
        } else {
            Err(LibraryError::UnknownUser(user.to_string()))
        }
    }

    /// Give every configured reader a flag, defaulting to unread
    fn fill_read_flags(&self, record: &mut BookRecord) {
        for user in &self.users {
            record.read_by.entry(user.clone()).or_insert(false);
        }
    }
}

impl fmt::Display for BookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {} [{}] ({})", self.title, self.author, self.category, self.isbn)
    }
}

/// Case-insensitive substring match over the searchable fields
fn matches_search(book: &BookRecord, needle: &str) -> bool {
    [&book.title, &book.author, &book.category]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
        || book.isbn.contains(needle)
}

/// Case-insensitive ordering with a case-sensitive tie break
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

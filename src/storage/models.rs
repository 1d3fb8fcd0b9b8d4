//! Database models for the catalog
//!
//! Record types for genres, languages, authors, books and book copies.
//!
//! # SQLite Adaptations
//! - Loan status stored as a single-character code (`m`, `o`, `a`, `r`)
//! - Dates stored as TEXT in ISO 8601 format (YYYY-MM-DD)
//! - Copy identifiers stored as 16-byte blobs
//! - Many-to-many relationships (book genres, book languages) use junction tables
//! - Case-insensitive names carry a lower-cased `name_key` column

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ENUMS
// ============================================================================

/// Loan status of a physical copy
///
/// Flat categorical value; nothing in the catalog moves a copy between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    #[default]
    Maintenance,
    OnLoan,
    Available,
    Reserved,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 4] = [
        LoanStatus::Maintenance,
        LoanStatus::OnLoan,
        LoanStatus::Available,
        LoanStatus::Reserved,
    ];

    /// Stored code
    pub fn code(&self) -> &'static str {
        match self {
            LoanStatus::Maintenance => "m",
            LoanStatus::OnLoan => "o",
            LoanStatus::Available => "a",
            LoanStatus::Reserved => "r",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "m" => Some(LoanStatus::Maintenance),
            "o" => Some(LoanStatus::OnLoan),
            "a" => Some(LoanStatus::Available),
            "r" => Some(LoanStatus::Reserved),
            _ => None,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            LoanStatus::Maintenance => "maintenance",
            LoanStatus::OnLoan => "on loan",
            LoanStatus::Available => "available",
            LoanStatus::Reserved => "reserved",
        }
    }

    /// Parse a code (`a`) or a label (`available`, `on-loan`, `on_loan`)
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase().replace(['-', '_'], " ");
        Self::from_code(&normalized)
            .or_else(|| Self::ALL.into_iter().find(|s| s.label() == normalized))
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// DETAIL URLS
// ============================================================================

/// Records that have a detail page
///
/// The path is derived from the primary key only, so it stays stable across
/// renames.
pub trait DetailUrl {
    /// Route name of the detail view
    const ROUTE: &'static str;
    /// Path segment under `/catalog/`
    const SEGMENT: &'static str;

    fn primary_key(&self) -> i64;

    fn absolute_url(&self) -> String {
        format!("/catalog/{}/{}", Self::SEGMENT, self.primary_key())
    }
}

// ============================================================================
// MAIN ENTITIES
// ============================================================================

/// Genre (e.g. Science Fiction, French Poetry)
///
/// `name_key` is the lower-cased name backing case-insensitive uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
    #[serde(skip)]
    pub name_key: String,
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl DetailUrl for Genre {
    const ROUTE: &'static str = "genre-detail";
    const SEGMENT: &'static str = "genre";

    fn primary_key(&self) -> i64 {
        self.id
    }
}

/// Language a book is written in
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Language {
    pub id: i64,
    pub name: String,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Author
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    #[serde(skip)]
    pub name_key: String,
    #[sqlx(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[sqlx(default)]
    pub date_of_death: Option<NaiveDate>,
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl DetailUrl for Author {
    const ROUTE: &'static str = "author-detail";
    const SEGMENT: &'static str = "author";

    fn primary_key(&self) -> i64 {
        self.id
    }
}

/// Book (the title, not a physical copy)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub isbn: String,
    #[sqlx(default)]
    pub author_id: Option<i64>,
}

impl DetailUrl for Book {
    const ROUTE: &'static str = "book-detail";
    const SEGMENT: &'static str = "book";

    fn primary_key(&self) -> i64 {
        self.id
    }
}

/// BookInstance - one physical copy of a book
///
/// `status` holds the stored code; use `get_status()` for the enum.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BookInstance {
    pub id: i64,
    pub unique_id: Uuid,
    #[sqlx(default)]
    pub due_back: Option<NaiveDate>,
    pub status: String,
    #[sqlx(default)]
    pub book_id: Option<i64>,
    pub imprint: String,
}

impl BookInstance {
    /// Get loan status as enum
    ///
    /// The schema CHECK constraint keeps codes valid; anything else reads as
    /// the default.
    pub fn get_status(&self) -> LoanStatus {
        LoanStatus::from_code(&self.status).unwrap_or_default()
    }
}

impl DetailUrl for BookInstance {
    const ROUTE: &'static str = "book-instance";
    const SEGMENT: &'static str = "bookinstance";

    fn primary_key(&self) -> i64 {
        self.id
    }
}

// ============================================================================
// JOINED VIEWS
// ============================================================================

/// Book with its author, genres and languages loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookWithRelations {
    pub book: Book,
    pub author: Option<Author>,
    pub genres: Vec<Genre>,
    pub languages: Vec<Language>,
}

impl BookWithRelations {
    /// Genre names joined for display
    pub fn genre_names(&self) -> String {
        self.genres
            .iter()
            .map(|g| g.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for BookWithRelations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.author {
            Some(author) => write!(f, "{}, {}", self.book.title, author.name),
            None => f.write_str(&self.book.title),
        }
    }
}

/// Copy with the title of the book it belongs to
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookInstanceWithBook {
    #[sqlx(flatten)]
    pub instance: BookInstance,
    #[sqlx(default)]
    pub book_title: Option<String>,
}

impl fmt::Display for BookInstanceWithBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.book_title {
            Some(title) => write!(f, "{} ({})", self.instance.id, title),
            None => write!(f, "{} (no book)", self.instance.id),
        }
    }
}

/// Record counts across the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub books: i64,
    pub instances: i64,
    pub instances_available: i64,
    pub authors: i64,
    pub genres: i64,
    pub languages: i64,
}

// ============================================================================
// NEW RECORD STRUCTS (for inserts and updates)
// ============================================================================

/// New genre record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGenre {
    pub name: String,
}

impl NewGenre {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// New language record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLanguage {
    pub name: String,
}

impl NewLanguage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// New author record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuthor {
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
}

impl NewAuthor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date_of_birth: None,
            date_of_death: None,
        }
    }

    pub fn born(mut self, date: NaiveDate) -> Self {
        self.date_of_birth = Some(date);
        self
    }

    pub fn died(mut self, date: NaiveDate) -> Self {
        self.date_of_death = Some(date);
        self
    }
}

/// New book record, including its genre and language links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub summary: String,
    pub isbn: String,
    pub author_id: Option<i64>,
    pub genre_ids: Vec<i64>,
    pub language_ids: Vec<i64>,
}

impl NewBook {
    pub fn new(title: impl Into<String>, summary: impl Into<String>, isbn: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            isbn: isbn.into(),
            author_id: None,
            genre_ids: Vec::new(),
            language_ids: Vec::new(),
        }
    }

    pub fn with_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_genres(mut self, genre_ids: Vec<i64>) -> Self {
        self.genre_ids = genre_ids;
        self
    }

    pub fn with_languages(mut self, language_ids: Vec<i64>) -> Self {
        self.language_ids = language_ids;
        self
    }
}

/// New book copy record
///
/// `unique_id` is generated at insert time when left as `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBookInstance {
    pub unique_id: Option<Uuid>,
    pub due_back: Option<NaiveDate>,
    pub status: LoanStatus,
    pub book_id: Option<i64>,
    pub imprint: String,
}

impl NewBookInstance {
    pub fn new(book_id: Option<i64>, imprint: impl Into<String>) -> Self {
        Self {
            unique_id: None,
            due_back: None,
            status: LoanStatus::default(),
            book_id,
            imprint: imprint.into(),
        }
    }

    pub fn with_unique_id(mut self, unique_id: Uuid) -> Self {
        self.unique_id = Some(unique_id);
        self
    }

    pub fn with_status(mut self, status: LoanStatus) -> Self {
        self.status = status;
        self
    }

    pub fn due_back(mut self, date: NaiveDate) -> Self {
        self.due_back = Some(date);
        self
    }
}

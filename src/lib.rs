//! Library catalog core
//!
//! Genres, languages, authors, books and physical copies stored in SQLite,
//! with field validation, case-insensitive uniqueness and restricted deletes.

pub mod config;
pub mod error;
pub mod storage;

pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use storage::Database;

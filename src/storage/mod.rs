// Catalog Core - Library catalog storage
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Database storage and models
//!
//! This module handles all catalog database operations using SQLite via sqlx.
//!
//! # Database Schema
//! - Genres: book genres, unique ignoring case
//! - Languages: book languages, unique by exact name
//! - Authors: unique ignoring case, optional birth/death dates
//! - Books: title, summary, unique ISBN, optional author
//! - BookInstances: physical copies with loan status and a 128-bit identifier
//! - BookGenres / BookLanguages: many-to-many junction tables
//!
//! References are restricted: a genre, language, author or book cannot be
//! deleted while something still points at it.
//!
//! # Usage Example
//! ```no_run
//! use catalog_core::storage::{queries, Database, NewAuthor, NewBook};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./catalog.db").await?;
//!
//! let author_id = queries::insert_author(db.pool(), &NewAuthor::new("Ursula K. Le Guin")).await?;
//! let book = NewBook::new("The Dispossessed", "An ambiguous utopia.", "9780061054884")
//!     .with_author(author_id);
//! let book_id = queries::insert_book(db.pool(), &book).await?;
//!
//! let view = queries::find_book_with_relations(db.pool(), book_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod validation;

// Re-export commonly used types
pub use database::{Database, DatabaseStats, WriteTransaction};
pub use models::{
    Author, Book, BookInstance, BookInstanceWithBook, BookWithRelations, CatalogSummary,
    DetailUrl, Genre, Language, LoanStatus, NewAuthor, NewBook, NewBookInstance, NewGenre,
    NewLanguage,
};

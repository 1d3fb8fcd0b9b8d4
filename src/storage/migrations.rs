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


//! Database migrations
//!
//! This module handles database schema creation and migrations.
//!
//! # Migration Strategy
//! Since sqlx's compile-time migration system requires build-time database connection,
//! we implement migrations as runtime SQL execution, tracked in `_migrations`.
//!
//! # Integrity Rules Carried by the Schema
//! - Every reference to a genre, language, author or book is `ON DELETE RESTRICT`
//! - Junction rows go away with their book (`ON DELETE CASCADE` on `book_id`)
//! - Case-insensitive names are enforced by a unique index on `name_key`

use crate::error::Result;
use sqlx::{Executor, SqlitePool};
use tracing::info;

/// Run all database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    create_migrations_table(pool).await?;

    run_migration(pool, 1, "initial_schema", create_initial_schema(pool)).await?;

    Ok(())
}

/// Create migrations tracking table
async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

/// Run a single migration if it hasn't been applied yet
async fn run_migration(
    pool: &SqlitePool,
    id: i32,
    name: &str,
    migration_fn: impl std::future::Future<Output = Result<()>>,
) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    migration_fn.await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

    info!(migration = name, id, "applied migration");

    Ok(())
}

/// Create initial database schema
async fn create_initial_schema(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
-- ============================================================================
-- LOOKUP ENTITIES
-- ============================================================================

CREATE TABLE IF NOT EXISTS Genres (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    name_key TEXT NOT NULL  -- lower-cased name
);

CREATE TABLE IF NOT EXISTS Languages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    name_key TEXT NOT NULL,  -- lower-cased name
    date_of_birth TEXT,  -- ISO 8601 date (YYYY-MM-DD)
    date_of_death TEXT
);

-- ============================================================================
-- BOOKS AND COPIES
-- ============================================================================

CREATE TABLE IF NOT EXISTS Books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    isbn TEXT NOT NULL,
    author_id INTEGER,
    FOREIGN KEY (author_id) REFERENCES Authors(id) ON DELETE RESTRICT
);

CREATE TABLE IF NOT EXISTS BookInstances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    unique_id BLOB NOT NULL,  -- 128-bit identifier
    due_back TEXT,
    status TEXT NOT NULL DEFAULT 'm' CHECK (status IN ('m', 'o', 'a', 'r')),
    book_id INTEGER,
    imprint TEXT NOT NULL,
    FOREIGN KEY (book_id) REFERENCES Books(id) ON DELETE RESTRICT
);

-- ============================================================================
-- JUNCTION TABLES (Many-to-Many Relationships)
-- ============================================================================

CREATE TABLE IF NOT EXISTS BookGenres (
    book_id INTEGER NOT NULL,
    genre_id INTEGER NOT NULL,
    FOREIGN KEY (book_id) REFERENCES Books(id) ON DELETE CASCADE,
    FOREIGN KEY (genre_id) REFERENCES Genres(id) ON DELETE RESTRICT,
    PRIMARY KEY (book_id, genre_id)
);

CREATE TABLE IF NOT EXISTS BookLanguages (
    book_id INTEGER NOT NULL,
    language_id INTEGER NOT NULL,
    FOREIGN KEY (book_id) REFERENCES Books(id) ON DELETE CASCADE,
    FOREIGN KEY (language_id) REFERENCES Languages(id) ON DELETE RESTRICT,
    PRIMARY KEY (book_id, language_id)
);

-- ============================================================================
-- UNIQUE INDEXES (names match validation::constraints)
-- ============================================================================

CREATE UNIQUE INDEX IF NOT EXISTS genre_name_case_insensitive_unique ON Genres(name_key);
CREATE UNIQUE INDEX IF NOT EXISTS author_name_case_insensitive_unique ON Authors(name_key);
CREATE UNIQUE INDEX IF NOT EXISTS language_name_unique ON Languages(name);
CREATE UNIQUE INDEX IF NOT EXISTS book_isbn_unique ON Books(isbn);
CREATE UNIQUE INDEX IF NOT EXISTS book_instance_unique_id_unique ON BookInstances(unique_id);

-- ============================================================================
-- INDEXES for Performance
-- ============================================================================

CREATE INDEX IF NOT EXISTS idx_books_title ON Books(title);
CREATE INDEX IF NOT EXISTS idx_books_author ON Books(author_id);
CREATE INDEX IF NOT EXISTS idx_book_instances_book ON BookInstances(book_id);
CREATE INDEX IF NOT EXISTS idx_book_instances_due_back ON BookInstances(due_back);
CREATE INDEX IF NOT EXISTS idx_book_instances_status ON BookInstances(status);
CREATE INDEX IF NOT EXISTS idx_book_genres_genre ON BookGenres(genre_id);
CREATE INDEX IF NOT EXISTS idx_book_languages_language ON BookLanguages(language_id);
        "#,
    )
    .await?;

    Ok(())
}

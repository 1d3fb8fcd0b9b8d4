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


//! Database query functions
//!
//! This module implements repository pattern for catalog operations.
//!
//! # Write Path
//! Every create, update and delete runs in one `BEGIN IMMEDIATE` transaction
//! ([`WriteTransaction`]):
//! 1. field constraints (`validation`), on the trimmed record
//! 2. explicit uniqueness / reference / dependent checks
//! 3. the write itself
//!
//! The unique indexes and `ON DELETE RESTRICT` keys in the schema back the
//! explicit checks. Driver-level unique violations become
//! `CatalogError::UniqueViolation`; foreign key failures become
//! `UnknownReference` on writes and `RestrictedDelete` on deletes.
//!
//! # Query Patterns
//! - Async/await for all database operations
//! - Helpers take `&mut SqliteConnection` so they run inside the caller's transaction

use crate::error::{CatalogError, Result};
use crate::storage::database::WriteTransaction;
use crate::storage::models::*;
use crate::storage::validation::{self, constraints, name_key};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// SHARED CHECKS
// ============================================================================

/// A record a write points at
#[derive(Debug, Clone, Copy)]
struct Reference {
    table: &'static str,
    entity: &'static str,
    id: i64,
}

impl Reference {
    fn author(id: i64) -> Self {
        Self { table: "Authors", entity: "Author", id }
    }

    fn genre(id: i64) -> Self {
        Self { table: "Genres", entity: "Genre", id }
    }

    fn language(id: i64) -> Self {
        Self { table: "Languages", entity: "Language", id }
    }

    fn book(id: i64) -> Self {
        Self { table: "Books", entity: "Book", id }
    }
}

/// Records that block deleting a row, and how to count them
#[derive(Debug)]
struct Dependents {
    referenced_by: &'static str,
    count_sql: &'static str,
}

const GENRE_DEPENDENTS: Dependents = Dependents {
    referenced_by: "Book",
    count_sql: "SELECT COUNT(*) FROM BookGenres WHERE genre_id = ?",
};

const LANGUAGE_DEPENDENTS: Dependents = Dependents {
    referenced_by: "Book",
    count_sql: "SELECT COUNT(*) FROM BookLanguages WHERE language_id = ?",
};

const AUTHOR_DEPENDENTS: Dependents = Dependents {
    referenced_by: "Book",
    count_sql: "SELECT COUNT(*) FROM Books WHERE author_id = ?",
};

const BOOK_DEPENDENTS: Dependents = Dependents {
    referenced_by: "BookInstance",
    count_sql: "SELECT COUNT(*) FROM BookInstances WHERE book_id = ?",
};

/// Typed uniqueness error for a unique index failure, if `err` is one
fn unique_violation(err: &sqlx::Error) -> Option<CatalogError> {
    const UNIQUE_COLUMNS: [(&str, &str, &str); 7] = [
        ("Genres.name", constraints::GENRE_NAME_CI, constraints::GENRE_NAME_CI_MESSAGE),
        ("Authors.name", constraints::AUTHOR_NAME_CI, constraints::AUTHOR_NAME_CI_MESSAGE),
        ("Languages.name", constraints::LANGUAGE_NAME, constraints::LANGUAGE_NAME_MESSAGE),
        ("Books.isbn", constraints::BOOK_ISBN, constraints::BOOK_ISBN_MESSAGE),
        (
            "BookInstances.unique_id",
            constraints::INSTANCE_UNIQUE_ID,
            constraints::INSTANCE_UNIQUE_ID_MESSAGE,
        ),
        ("BookGenres.", "book_genre_link", "Genre is already linked to this book"),
        ("BookLanguages.", "book_language_link", "Language is already linked to this book"),
    ];

    let sqlx::Error::Database(db) = err else {
        return None;
    };
    if !db.is_unique_violation() {
        return None;
    }

    let message = db.message();
    UNIQUE_COLUMNS
        .iter()
        .find(|(column, _, _)| message.contains(column))
        .map(|(_, constraint, text)| CatalogError::unique(*constraint, *text))
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Map a failed insert or update to a typed error
///
/// A foreign key failure is traced back to the first of `references` that no
/// longer exists.
async fn translate_write_error(
    conn: &mut SqliteConnection,
    err: sqlx::Error,
    references: &[Reference],
) -> CatalogError {
    if let Some(unique) = unique_violation(&err) {
        return unique;
    }
    if is_foreign_key_violation(&err) {
        if let Err(missing) = ensure_references(conn, references).await {
            return missing;
        }
    }
    CatalogError::SqlxError(err)
}

/// Map a failed delete to `RestrictedDelete` when a foreign key blocked it
async fn translate_delete_error(
    conn: &mut SqliteConnection,
    err: sqlx::Error,
    entity: &'static str,
    id: i64,
    dependents: Option<&Dependents>,
) -> CatalogError {
    let Some(dependents) = dependents.filter(|_| is_foreign_key_violation(&err)) else {
        return CatalogError::SqlxError(err);
    };

    match count_dependents(conn, dependents, id).await {
        Ok(count) => {
            warn!(entity, id, referenced_by = dependents.referenced_by, count, "delete blocked by foreign key");
            CatalogError::RestrictedDelete {
                entity,
                id,
                referenced_by: dependents.referenced_by,
                count,
            }
        }
        Err(e) => e,
    }
}

/// Fail with `UnknownReference` unless `table` has a row with `id`
async fn ensure_exists(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: i64,
) -> Result<()> {
    let exists: bool = sqlx::query_scalar(&format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", table))
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

    if exists {
        Ok(())
    } else {
        Err(CatalogError::UnknownReference { entity, id })
    }
}

async fn ensure_references(conn: &mut SqliteConnection, references: &[Reference]) -> Result<()> {
    for reference in references {
        ensure_exists(conn, reference.table, reference.entity, reference.id).await?;
    }
    Ok(())
}

/// Fail with `RecordNotFound` unless the record being changed exists
async fn ensure_target(conn: &mut SqliteConnection, table: &'static str, entity: &'static str, id: i64) -> Result<()> {
    ensure_exists(conn, table, entity, id)
        .await
        .map_err(|e| match e {
            CatalogError::UnknownReference { entity, id } => {
                CatalogError::not_found(format!("{} {}", entity, id))
            }
            other => other,
        })
}

async fn count_dependents(conn: &mut SqliteConnection, dependents: &Dependents, id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(dependents.count_sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}

/// Fail with `RestrictedDelete` when `dependents` still reference `id`
async fn ensure_unreferenced(
    conn: &mut SqliteConnection,
    dependents: &Dependents,
    entity: &'static str,
    id: i64,
) -> Result<()> {
    let count = count_dependents(conn, dependents, id).await?;

    if count > 0 {
        warn!(entity, id, referenced_by = dependents.referenced_by, count, "delete rejected: record still referenced");
        return Err(CatalogError::RestrictedDelete {
            entity,
            id,
            referenced_by: dependents.referenced_by,
            count,
        });
    }
    Ok(())
}

/// Delete one row after the existence and dependent checks
async fn delete_row(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: i64,
    dependents: Option<&Dependents>,
) -> Result<()> {
    ensure_target(conn, table, entity, id).await?;
    if let Some(dependents) = dependents {
        ensure_unreferenced(conn, dependents, entity, id).await?;
    }

    let deleted = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table))
        .bind(id)
        .execute(&mut *conn)
        .await;
    match deleted {
        Ok(_) => Ok(()),
        Err(err) => Err(translate_delete_error(conn, err, entity, id, dependents).await),
    }
}

/// Fail with `UniqueViolation` when another row already holds `value`
///
/// `exclude_id` skips the row being updated; `id IS NOT NULL` matches every row.
async fn ensure_unique<T>(
    conn: &mut SqliteConnection,
    sql: &str,
    value: T,
    exclude_id: Option<i64>,
    constraint: &str,
    message: &str,
) -> Result<()>
where
    T: for<'q> sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite> + Send,
{
    let taken: bool = sqlx::query_scalar(sql)
        .bind(value)
        .bind(exclude_id)
        .fetch_one(&mut *conn)
        .await?;

    if taken {
        return Err(CatalogError::unique(constraint, message));
    }
    Ok(())
}

// ============================================================================
// GENRE QUERIES
// ============================================================================

const GENRE_NAME_TAKEN: &str =
    "SELECT EXISTS(SELECT 1 FROM Genres WHERE name_key = ? AND id IS NOT ?)";

/// Insert a new genre
///
/// Returns the id of the inserted genre.
///
/// # Errors
/// `UniqueViolation` if a genre with the same name in any letter case exists.
pub async fn insert_genre(pool: &SqlitePool, genre: &NewGenre) -> Result<i64> {
    let genre = validation::validate_genre(genre)?;
    let key = name_key(&genre.name);

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        ensure_unique(
            conn,
            GENRE_NAME_TAKEN,
            &key,
            None,
            constraints::GENRE_NAME_CI,
            constraints::GENRE_NAME_CI_MESSAGE,
        )
        .await?;

        let inserted = sqlx::query("INSERT INTO Genres (name, name_key) VALUES (?, ?)")
            .bind(&genre.name)
            .bind(&key)
            .execute(&mut *conn)
            .await;
        match inserted {
            Ok(result) => Ok(result.last_insert_rowid()),
            Err(err) => Err(translate_write_error(conn, err, &[]).await),
        }
    }
    .await;
    let id = tx.finish(outcome).await?;

    debug!(genre_id = id, name = %genre.name, "inserted genre");
    Ok(id)
}

/// Find genre by ID
pub async fn find_genre_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Genre>> {
    let genre = sqlx::query_as::<_, Genre>("SELECT * FROM Genres WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(genre)
}

/// Find genre by name, ignoring letter case
pub async fn find_genre_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Genre>> {
    let genre = sqlx::query_as::<_, Genre>("SELECT * FROM Genres WHERE name_key = ?")
        .bind(name_key(name))
        .fetch_optional(pool)
        .await?;

    Ok(genre)
}

/// List all genres (insertion order; genres declare no ordering)
pub async fn list_genres(pool: &SqlitePool) -> Result<Vec<Genre>> {
    let genres = sqlx::query_as::<_, Genre>("SELECT * FROM Genres ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(genres)
}

/// Rename a genre
pub async fn update_genre(pool: &SqlitePool, id: i64, genre: &NewGenre) -> Result<Genre> {
    let genre = validation::validate_genre(genre)?;
    let key = name_key(&genre.name);

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        ensure_target(conn, "Genres", "Genre", id).await?;
        ensure_unique(
            conn,
            GENRE_NAME_TAKEN,
            &key,
            Some(id),
            constraints::GENRE_NAME_CI,
            constraints::GENRE_NAME_CI_MESSAGE,
        )
        .await?;

        let updated = sqlx::query_as::<_, Genre>(
            "UPDATE Genres SET name = ?, name_key = ? WHERE id = ? RETURNING *",
        )
        .bind(&genre.name)
        .bind(&key)
        .bind(id)
        .fetch_one(&mut *conn)
        .await;
        match updated {
            Ok(updated) => Ok(updated),
            Err(err) => Err(translate_write_error(conn, err, &[]).await),
        }
    }
    .await;

    tx.finish(outcome).await
}

/// Delete a genre
///
/// # Errors
/// `RestrictedDelete` while any book is linked to the genre.
pub async fn delete_genre(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = match tx.connection() {
        Ok(conn) => delete_row(conn, "Genres", "Genre", id, Some(&GENRE_DEPENDENTS)).await,
        Err(e) => Err(e),
    };
    tx.finish(outcome).await?;

    debug!(genre_id = id, "deleted genre");
    Ok(())
}

// ============================================================================
// LANGUAGE QUERIES
// ============================================================================

const LANGUAGE_NAME_TAKEN: &str =
    "SELECT EXISTS(SELECT 1 FROM Languages WHERE name = ? AND id IS NOT ?)";

/// Insert a new language
///
/// Language names are unique with exact (case-sensitive) comparison.
pub async fn insert_language(pool: &SqlitePool, language: &NewLanguage) -> Result<i64> {
    let language = validation::validate_language(language)?;

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        ensure_unique(
            conn,
            LANGUAGE_NAME_TAKEN,
            &language.name,
            None,
            constraints::LANGUAGE_NAME,
            constraints::LANGUAGE_NAME_MESSAGE,
        )
        .await?;

        let inserted = sqlx::query("INSERT INTO Languages (name) VALUES (?)")
            .bind(&language.name)
            .execute(&mut *conn)
            .await;
        match inserted {
            Ok(result) => Ok(result.last_insert_rowid()),
            Err(err) => Err(translate_write_error(conn, err, &[]).await),
        }
    }
    .await;
    let id = tx.finish(outcome).await?;

    debug!(language_id = id, name = %language.name, "inserted language");
    Ok(id)
}

pub async fn find_language_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Language>> {
    let language = sqlx::query_as::<_, Language>("SELECT * FROM Languages WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(language)
}

/// Find language by exact name
pub async fn find_language_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Language>> {
    let language = sqlx::query_as::<_, Language>("SELECT * FROM Languages WHERE name = ?")
        .bind(name.trim())
        .fetch_optional(pool)
        .await?;

    Ok(language)
}

/// List all languages ordered by name
pub async fn list_languages(pool: &SqlitePool) -> Result<Vec<Language>> {
    let languages = sqlx::query_as::<_, Language>("SELECT * FROM Languages ORDER BY name, id")
        .fetch_all(pool)
        .await?;

    Ok(languages)
}

pub async fn update_language(pool: &SqlitePool, id: i64, language: &NewLanguage) -> Result<Language> {
    let language = validation::validate_language(language)?;

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        ensure_target(conn, "Languages", "Language", id).await?;
        ensure_unique(
            conn,
            LANGUAGE_NAME_TAKEN,
            &language.name,
            Some(id),
            constraints::LANGUAGE_NAME,
            constraints::LANGUAGE_NAME_MESSAGE,
        )
        .await?;

        let updated = sqlx::query_as::<_, Language>("UPDATE Languages SET name = ? WHERE id = ? RETURNING *")
            .bind(&language.name)
            .bind(id)
            .fetch_one(&mut *conn)
            .await;
        match updated {
            Ok(updated) => Ok(updated),
            Err(err) => Err(translate_write_error(conn, err, &[]).await),
        }
    }
    .await;

    tx.finish(outcome).await
}

/// Delete a language
///
/// # Errors
/// `RestrictedDelete` while any book is linked to the language.
pub async fn delete_language(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = match tx.connection() {
        Ok(conn) => delete_row(conn, "Languages", "Language", id, Some(&LANGUAGE_DEPENDENTS)).await,
        Err(e) => Err(e),
    };
    tx.finish(outcome).await?;

    debug!(language_id = id, "deleted language");
    Ok(())
}

// ============================================================================
// AUTHOR QUERIES
// ============================================================================

const AUTHOR_NAME_TAKEN: &str =
    "SELECT EXISTS(SELECT 1 FROM Authors WHERE name_key = ? AND id IS NOT ?)";

/// Insert a new author
///
/// # Errors
/// `UniqueViolation` if an author with the same name in any letter case exists.
pub async fn insert_author(pool: &SqlitePool, author: &NewAuthor) -> Result<i64> {
    let author = validation::validate_author(author)?;
    let key = name_key(&author.name);

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        ensure_unique(
            conn,
            AUTHOR_NAME_TAKEN,
            &key,
            None,
            constraints::AUTHOR_NAME_CI,
            constraints::AUTHOR_NAME_CI_MESSAGE,
        )
        .await?;

        let inserted = sqlx::query(
            "INSERT INTO Authors (name, name_key, date_of_birth, date_of_death) VALUES (?, ?, ?, ?)",
        )
        .bind(&author.name)
        .bind(&key)
        .bind(author.date_of_birth)
        .bind(author.date_of_death)
        .execute(&mut *conn)
        .await;
        match inserted {
            Ok(result) => Ok(result.last_insert_rowid()),
            Err(err) => Err(translate_write_error(conn, err, &[]).await),
        }
    }
    .await;
    let id = tx.finish(outcome).await?;

    debug!(author_id = id, name = %author.name, "inserted author");
    Ok(id)
}

pub async fn find_author_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Author>> {
    let author = sqlx::query_as::<_, Author>("SELECT * FROM Authors WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(author)
}

/// Find author by name, ignoring letter case
pub async fn find_author_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Author>> {
    let author = sqlx::query_as::<_, Author>("SELECT * FROM Authors WHERE name_key = ?")
        .bind(name_key(name))
        .fetch_optional(pool)
        .await?;

    Ok(author)
}

/// List all authors ordered by name
pub async fn list_authors(pool: &SqlitePool) -> Result<Vec<Author>> {
    let authors = sqlx::query_as::<_, Author>("SELECT * FROM Authors ORDER BY name, id")
        .fetch_all(pool)
        .await?;

    Ok(authors)
}

pub async fn update_author(pool: &SqlitePool, id: i64, author: &NewAuthor) -> Result<Author> {
    let author = validation::validate_author(author)?;
    let key = name_key(&author.name);

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        ensure_target(conn, "Authors", "Author", id).await?;
        ensure_unique(
            conn,
            AUTHOR_NAME_TAKEN,
            &key,
            Some(id),
            constraints::AUTHOR_NAME_CI,
            constraints::AUTHOR_NAME_CI_MESSAGE,
        )
        .await?;

        let updated = sqlx::query_as::<_, Author>(
            r#"
            UPDATE Authors SET
                name = ?, name_key = ?, date_of_birth = ?, date_of_death = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&author.name)
        .bind(&key)
        .bind(author.date_of_birth)
        .bind(author.date_of_death)
        .bind(id)
        .fetch_one(&mut *conn)
        .await;
        match updated {
            Ok(updated) => Ok(updated),
            Err(err) => Err(translate_write_error(conn, err, &[]).await),
        }
    }
    .await;

    tx.finish(outcome).await
}

/// Delete an author
///
/// # Errors
/// `RestrictedDelete` while any book references the author.
pub async fn delete_author(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = match tx.connection() {
        Ok(conn) => delete_row(conn, "Authors", "Author", id, Some(&AUTHOR_DEPENDENTS)).await,
        Err(e) => Err(e),
    };
    tx.finish(outcome).await?;

    debug!(author_id = id, "deleted author");
    Ok(())
}

// ============================================================================
// BOOK QUERIES
// ============================================================================

const BOOK_ISBN_TAKEN: &str = "SELECT EXISTS(SELECT 1 FROM Books WHERE isbn = ? AND id IS NOT ?)";

/// The author, genres and languages a book points at
fn book_references(book: &NewBook) -> Vec<Reference> {
    book.author_id
        .map(Reference::author)
        .into_iter()
        .chain(book.genre_ids.iter().copied().map(Reference::genre))
        .chain(book.language_ids.iter().copied().map(Reference::language))
        .collect()
}

/// Replace the genre and language links of a book
async fn replace_book_links(
    conn: &mut SqliteConnection,
    book_id: i64,
    book: &NewBook,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM BookGenres WHERE book_id = ?")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM BookLanguages WHERE book_id = ?")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;

    for genre_id in &book.genre_ids {
        sqlx::query("INSERT OR IGNORE INTO BookGenres (book_id, genre_id) VALUES (?, ?)")
            .bind(book_id)
            .bind(genre_id)
            .execute(&mut *conn)
            .await?;
    }
    for language_id in &book.language_ids {
        sqlx::query("INSERT OR IGNORE INTO BookLanguages (book_id, language_id) VALUES (?, ?)")
            .bind(book_id)
            .bind(language_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Insert a new book together with its genre and language links
///
/// Returns the id of the inserted book.
///
/// # Errors
/// - `UniqueViolation` if the ISBN is already used
/// - `UnknownReference` if the author, a genre or a language does not exist
pub async fn insert_book(pool: &SqlitePool, book: &NewBook) -> Result<i64> {
    let book = validation::validate_book(book)?;
    let references = book_references(&book);

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        ensure_unique(
            conn,
            BOOK_ISBN_TAKEN,
            &book.isbn,
            None,
            constraints::BOOK_ISBN,
            constraints::BOOK_ISBN_MESSAGE,
        )
        .await?;
        ensure_references(conn, &references).await?;

        let inserted = sqlx::query(
            "INSERT INTO Books (title, summary, isbn, author_id) VALUES (?, ?, ?, ?)",
        )
        .bind(&book.title)
        .bind(&book.summary)
        .bind(&book.isbn)
        .bind(book.author_id)
        .execute(&mut *conn)
        .await;
        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(err) => return Err(translate_write_error(conn, err, &references).await),
        };

        if let Err(err) = replace_book_links(conn, id, &book).await {
            return Err(translate_write_error(conn, err, &references).await);
        }
        Ok(id)
    }
    .await;
    let id = tx.finish(outcome).await?;

    debug!(book_id = id, isbn = %book.isbn, "inserted book");
    Ok(id)
}

/// Find book by ID
pub async fn find_book_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM Books WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(book)
}

/// Find book by ISBN
pub async fn find_book_by_isbn(pool: &SqlitePool, isbn: &str) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM Books WHERE isbn = ?")
        .bind(isbn)
        .fetch_optional(pool)
        .await?;

    Ok(book)
}

/// List all books ordered by title
pub async fn list_books(pool: &SqlitePool) -> Result<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>("SELECT * FROM Books ORDER BY title, id")
        .fetch_all(pool)
        .await?;

    Ok(books)
}

/// List the books of one author ordered by title
pub async fn list_books_by_author(pool: &SqlitePool, author_id: i64) -> Result<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>("SELECT * FROM Books WHERE author_id = ? ORDER BY title, id")
        .bind(author_id)
        .fetch_all(pool)
        .await?;

    Ok(books)
}

/// Search books by title substring
///
/// `%` and `_` in `query` match themselves.
pub async fn search_books_by_title(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<Book>> {
    let search_pattern = format!("%{}%", escape_like(query));
    let books = sqlx::query_as::<_, Book>(
        r"SELECT * FROM Books WHERE title LIKE ? ESCAPE '\' ORDER BY title, id LIMIT ?",
    )
    .bind(&search_pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(books)
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Count total books
pub async fn count_books(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Books")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Genres linked to a book, ordered by name
pub async fn list_book_genres(pool: &SqlitePool, book_id: i64) -> Result<Vec<Genre>> {
    let genres = sqlx::query_as::<_, Genre>(
        r#"
        SELECT g.* FROM Genres g
        INNER JOIN BookGenres bg ON g.id = bg.genre_id
        WHERE bg.book_id = ?
        ORDER BY g.name
        "#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(genres)
}

/// Languages linked to a book, ordered by name
pub async fn list_book_languages(pool: &SqlitePool, book_id: i64) -> Result<Vec<Language>> {
    let languages = sqlx::query_as::<_, Language>(
        r#"
        SELECT l.* FROM Languages l
        INNER JOIN BookLanguages bl ON l.id = bl.language_id
        WHERE bl.book_id = ?
        ORDER BY l.name
        "#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(languages)
}

/// Load a book with its author, genres and languages
pub async fn find_book_with_relations(pool: &SqlitePool, id: i64) -> Result<Option<BookWithRelations>> {
    let Some(book) = find_book_by_id(pool, id).await? else {
        return Ok(None);
    };

    let author = match book.author_id {
        Some(author_id) => find_author_by_id(pool, author_id).await?,
        None => None,
    };
    let genres = list_book_genres(pool, id).await?;
    let languages = list_book_languages(pool, id).await?;

    Ok(Some(BookWithRelations {
        book,
        author,
        genres,
        languages,
    }))
}

/// Update a book, repointing its author and replacing its genre/language links
pub async fn update_book(pool: &SqlitePool, id: i64, book: &NewBook) -> Result<Book> {
    let book = validation::validate_book(book)?;
    let references = book_references(&book);

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        ensure_target(conn, "Books", "Book", id).await?;
        ensure_unique(
            conn,
            BOOK_ISBN_TAKEN,
            &book.isbn,
            Some(id),
            constraints::BOOK_ISBN,
            constraints::BOOK_ISBN_MESSAGE,
        )
        .await?;
        ensure_references(conn, &references).await?;

        let updated = sqlx::query_as::<_, Book>(
            r#"
            UPDATE Books SET
                title = ?, summary = ?, isbn = ?, author_id = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.summary)
        .bind(&book.isbn)
        .bind(book.author_id)
        .bind(id)
        .fetch_one(&mut *conn)
        .await;
        let updated = match updated {
            Ok(updated) => updated,
            Err(err) => return Err(translate_write_error(conn, err, &references).await),
        };

        if let Err(err) = replace_book_links(conn, id, &book).await {
            return Err(translate_write_error(conn, err, &references).await);
        }
        Ok(updated)
    }
    .await;

    tx.finish(outcome).await
}

/// Delete a book and its genre/language links
///
/// # Errors
/// `RestrictedDelete` while any copy references the book.
pub async fn delete_book(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = WriteTransaction::begin(pool).await?;
    // Links cascade with the book
    let outcome = match tx.connection() {
        Ok(conn) => delete_row(conn, "Books", "Book", id, Some(&BOOK_DEPENDENTS)).await,
        Err(e) => Err(e),
    };
    tx.finish(outcome).await?;

    debug!(book_id = id, "deleted book");
    Ok(())
}

// ============================================================================
// BOOK INSTANCE QUERIES
// ============================================================================

const INSTANCE_UNIQUE_ID_TAKEN: &str =
    "SELECT EXISTS(SELECT 1 FROM BookInstances WHERE unique_id = ? AND id IS NOT ?)";

const INSTANCE_WITH_BOOK: &str = r#"
    SELECT bi.*, b.title AS book_title
    FROM BookInstances bi
    LEFT JOIN Books b ON b.id = bi.book_id
"#;

/// Insert a new book copy
///
/// A fresh v4 identifier is generated when `unique_id` is `None`.
/// Returns the inserted record.
pub async fn insert_book_instance(pool: &SqlitePool, instance: &NewBookInstance) -> Result<BookInstance> {
    let instance = validation::validate_book_instance(instance)?;
    let references: Vec<Reference> = instance.book_id.map(Reference::book).into_iter().collect();

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        let unique_id = match instance.unique_id {
            Some(unique_id) => {
                ensure_unique(
                    conn,
                    INSTANCE_UNIQUE_ID_TAKEN,
                    unique_id,
                    None,
                    constraints::INSTANCE_UNIQUE_ID,
                    constraints::INSTANCE_UNIQUE_ID_MESSAGE,
                )
                .await?;
                unique_id
            }
            None => Uuid::new_v4(),
        };
        ensure_references(conn, &references).await?;

        let inserted = sqlx::query_as::<_, BookInstance>(
            r#"
            INSERT INTO BookInstances (unique_id, due_back, status, book_id, imprint)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(unique_id)
        .bind(instance.due_back)
        .bind(instance.status.code())
        .bind(instance.book_id)
        .bind(&instance.imprint)
        .fetch_one(&mut *conn)
        .await;
        match inserted {
            Ok(inserted) => Ok(inserted),
            Err(err) => Err(translate_write_error(conn, err, &references).await),
        }
    }
    .await;
    let inserted = tx.finish(outcome).await?;

    debug!(instance_id = inserted.id, unique_id = %inserted.unique_id, "inserted book instance");
    Ok(inserted)
}

pub async fn find_book_instance_by_id(pool: &SqlitePool, id: i64) -> Result<Option<BookInstance>> {
    let instance = sqlx::query_as::<_, BookInstance>("SELECT * FROM BookInstances WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(instance)
}

pub async fn find_book_instance_by_unique_id(pool: &SqlitePool, unique_id: Uuid) -> Result<Option<BookInstance>> {
    let instance = sqlx::query_as::<_, BookInstance>("SELECT * FROM BookInstances WHERE unique_id = ?")
        .bind(unique_id)
        .fetch_optional(pool)
        .await?;

    Ok(instance)
}

/// Load a copy with the title of its book
pub async fn find_book_instance_with_book(pool: &SqlitePool, id: i64) -> Result<Option<BookInstanceWithBook>> {
    let instance = sqlx::query_as::<_, BookInstanceWithBook>(&format!("{} WHERE bi.id = ?", INSTANCE_WITH_BOOK))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(instance)
}

/// List all copies ordered by due date (copies without one first)
pub async fn list_book_instances(pool: &SqlitePool) -> Result<Vec<BookInstance>> {
    let instances = sqlx::query_as::<_, BookInstance>(
        "SELECT * FROM BookInstances ORDER BY due_back ASC, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(instances)
}

/// List all copies with book titles, in the default copy order
pub async fn list_book_instances_with_book(pool: &SqlitePool) -> Result<Vec<BookInstanceWithBook>> {
    let instances = sqlx::query_as::<_, BookInstanceWithBook>(&format!(
        "{} ORDER BY bi.due_back ASC, bi.id",
        INSTANCE_WITH_BOOK
    ))
    .fetch_all(pool)
    .await?;

    Ok(instances)
}

/// List the copies of one book
pub async fn list_book_instances_by_book(pool: &SqlitePool, book_id: i64) -> Result<Vec<BookInstance>> {
    let instances = sqlx::query_as::<_, BookInstance>(
        "SELECT * FROM BookInstances WHERE book_id = ? ORDER BY due_back ASC, id",
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(instances)
}

/// List copies with the given loan status
pub async fn list_book_instances_by_status(pool: &SqlitePool, status: LoanStatus) -> Result<Vec<BookInstance>> {
    let instances = sqlx::query_as::<_, BookInstance>(
        "SELECT * FROM BookInstances WHERE status = ? ORDER BY due_back ASC, id",
    )
    .bind(status.code())
    .fetch_all(pool)
    .await?;

    Ok(instances)
}

/// Update a copy
///
/// A `None` `unique_id` keeps the stored identifier; identifiers are never
/// regenerated on update.
pub async fn update_book_instance(
    pool: &SqlitePool,
    id: i64,
    instance: &NewBookInstance,
) -> Result<BookInstance> {
    let instance = validation::validate_book_instance(instance)?;
    let references: Vec<Reference> = instance.book_id.map(Reference::book).into_iter().collect();

    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = async {
        let conn = tx.connection()?;
        ensure_target(conn, "BookInstances", "BookInstance", id).await?;
        if let Some(unique_id) = instance.unique_id {
            ensure_unique(
                conn,
                INSTANCE_UNIQUE_ID_TAKEN,
                unique_id,
                Some(id),
                constraints::INSTANCE_UNIQUE_ID,
                constraints::INSTANCE_UNIQUE_ID_MESSAGE,
            )
            .await?;
        }
        ensure_references(conn, &references).await?;

        let updated = sqlx::query_as::<_, BookInstance>(
            r#"
            UPDATE BookInstances SET
                unique_id = COALESCE(?, unique_id),
                due_back = ?, status = ?, book_id = ?, imprint = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(instance.unique_id)
        .bind(instance.due_back)
        .bind(instance.status.code())
        .bind(instance.book_id)
        .bind(&instance.imprint)
        .bind(id)
        .fetch_one(&mut *conn)
        .await;
        match updated {
            Ok(updated) => Ok(updated),
            Err(err) => Err(translate_write_error(conn, err, &references).await),
        }
    }
    .await;

    tx.finish(outcome).await
}

/// Delete a copy
pub async fn delete_book_instance(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = WriteTransaction::begin(pool).await?;
    let outcome = match tx.connection() {
        Ok(conn) => delete_row(conn, "BookInstances", "BookInstance", id, None).await,
        Err(e) => Err(e),
    };
    tx.finish(outcome).await?;

    debug!(instance_id = id, "deleted book instance");
    Ok(())
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Record counts across the catalog
pub async fn catalog_summary(pool: &SqlitePool) -> Result<CatalogSummary> {
    let summary = sqlx::query_as::<_, CatalogSummary>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM Books) AS books,
            (SELECT COUNT(*) FROM BookInstances) AS instances,
            (SELECT COUNT(*) FROM BookInstances WHERE status = 'a') AS instances_available,
            (SELECT COUNT(*) FROM Authors) AS authors,
            (SELECT COUNT(*) FROM Genres) AS genres,
            (SELECT COUNT(*) FROM Languages) AS languages
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(summary)
}

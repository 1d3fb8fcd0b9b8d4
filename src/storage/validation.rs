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


//! Field constraints
//!
//! Length limits and required-field checks evaluated before every write.
//! Text fields are trimmed first, and the trimmed record is what gets stored.
//! Lengths count characters, not bytes.

use crate::error::{CatalogError, Result};
use crate::storage::models::{NewAuthor, NewBook, NewBookInstance, NewGenre, NewLanguage};

pub const GENRE_NAME_MAX: usize = 200;
pub const LANGUAGE_NAME_MAX: usize = 20;
pub const AUTHOR_NAME_MAX: usize = 30;
pub const BOOK_TITLE_MAX: usize = 200;
pub const BOOK_SUMMARY_MAX: usize = 1000;
pub const BOOK_ISBN_MAX: usize = 13;
pub const INSTANCE_IMPRINT_MAX: usize = 200;

/// Unique constraint names, matching the index names in the schema
pub mod constraints {
    pub const GENRE_NAME_CI: &str = "genre_name_case_insensitive_unique";
    pub const AUTHOR_NAME_CI: &str = "author_name_case_insensitive_unique";
    pub const LANGUAGE_NAME: &str = "language_name_unique";
    pub const BOOK_ISBN: &str = "book_isbn_unique";
    pub const INSTANCE_UNIQUE_ID: &str = "book_instance_unique_id_unique";

    pub const GENRE_NAME_CI_MESSAGE: &str = "Genre already exists (case insensitive match)";
    pub const AUTHOR_NAME_CI_MESSAGE: &str = "Author name already exists (case insensitive match)";
    pub const LANGUAGE_NAME_MESSAGE: &str = "Language with this name already exists";
    pub const BOOK_ISBN_MESSAGE: &str = "Book with this ISBN already exists";
    pub const INSTANCE_UNIQUE_ID_MESSAGE: &str = "Book instance with this unique ID already exists";
}

/// Key used by the case-insensitive unique indexes
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Check a required string field against its maximum length
pub fn check_required(entity: &'static str, field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.is_empty() {
        return Err(CatalogError::MissingRequiredField { entity, field });
    }
    check_length(entity, field, value, max)
}

/// Check a string field against its maximum length
pub fn check_length(entity: &'static str, field: &'static str, value: &str, max: usize) -> Result<()> {
    let actual = value.chars().count();
    if actual > max {
        return Err(CatalogError::FieldTooLong {
            entity,
            field,
            max,
            actual,
        });
    }
    Ok(())
}

fn trimmed(value: &str) -> String {
    value.trim().to_string()
}

/// Trim and check a genre, returning the record to store
pub fn validate_genre(genre: &NewGenre) -> Result<NewGenre> {
    let genre = NewGenre {
        name: trimmed(&genre.name),
    };
    check_required("Genre", "name", &genre.name, GENRE_NAME_MAX)?;
    Ok(genre)
}

pub fn validate_language(language: &NewLanguage) -> Result<NewLanguage> {
    let language = NewLanguage {
        name: trimmed(&language.name),
    };
    check_required("Language", "name", &language.name, LANGUAGE_NAME_MAX)?;
    Ok(language)
}

pub fn validate_author(author: &NewAuthor) -> Result<NewAuthor> {
    let author = NewAuthor {
        name: trimmed(&author.name),
        ..author.clone()
    };
    check_required("Author", "name", &author.name, AUTHOR_NAME_MAX)?;
    Ok(author)
}

pub fn validate_book(book: &NewBook) -> Result<NewBook> {
    let book = NewBook {
        title: trimmed(&book.title),
        summary: trimmed(&book.summary),
        isbn: trimmed(&book.isbn),
        ..book.clone()
    };
    check_required("Book", "title", &book.title, BOOK_TITLE_MAX)?;
    check_required("Book", "summary", &book.summary, BOOK_SUMMARY_MAX)?;
    check_required("Book", "isbn", &book.isbn, BOOK_ISBN_MAX)?;
    Ok(book)
}

pub fn validate_book_instance(instance: &NewBookInstance) -> Result<NewBookInstance> {
    let instance = NewBookInstance {
        imprint: trimmed(&instance.imprint),
        ..instance.clone()
    };
    check_required("BookInstance", "imprint", &instance.imprint, INSTANCE_IMPRINT_MAX)?;
    Ok(instance)
}

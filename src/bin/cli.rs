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


use anyhow::Context;
use catalog_core::config::{CatalogConfig, ENV_DATABASE};
use catalog_core::storage::{
    queries, Database, DetailUrl, LoanStatus, NewAuthor, NewBook, NewBookInstance, NewGenre,
    NewLanguage,
};
use catalog_core::CatalogError;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "catalog-cli")]
#[command(version, about = "Library catalog CLI", long_about = None)]
struct Cli {
    /// Path to the catalog database
    #[arg(long, env = ENV_DATABASE, global = true)]
    database: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Entity {
    Genres,
    Languages,
    Authors,
    Books,
    Copies,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Init,
    /// Add a genre
    AddGenre { name: String },
    /// Add a language
    AddLanguage { name: String },
    /// Add an author
    AddAuthor {
        name: String,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        born: Option<NaiveDate>,
        /// Date of death (YYYY-MM-DD)
        #[arg(long)]
        died: Option<NaiveDate>,
    },
    /// Add a book
    AddBook {
        title: String,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        isbn: String,
        /// Author id
        #[arg(long)]
        author: Option<i64>,
        /// Genre id (repeatable)
        #[arg(long = "genre")]
        genres: Vec<i64>,
        /// Language id (repeatable)
        #[arg(long = "language")]
        languages: Vec<i64>,
    },
    /// Add a physical copy of a book
    AddCopy {
        /// Book id
        #[arg(long)]
        book: Option<i64>,
        #[arg(long)]
        imprint: String,
        /// maintenance, on-loan, available or reserved
        #[arg(long, value_parser = parse_status, default_value = "maintenance")]
        status: LoanStatus,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due_back: Option<NaiveDate>,
        /// Explicit identifier; generated when omitted
        #[arg(long)]
        unique_id: Option<Uuid>,
    },
    /// List records in their default order
    List {
        #[arg(value_enum)]
        entity: Entity,
    },
    /// Show a book with its author, genres and languages
    ShowBook { id: i64 },
    /// Delete a record (refused while other records reference it)
    Delete {
        #[arg(value_enum)]
        entity: Entity,
        id: i64,
    },
    /// Show record counts
    Summary,
    /// Run integrity checks and show page statistics
    Check,
    /// Copy the database file to another location
    Export { output: PathBuf },
    /// Reclaim unused space
    Vacuum,
}

fn parse_status(value: &str) -> Result<LoanStatus, String> {
    LoanStatus::parse(value).ok_or_else(|| format!("unknown loan status '{}'", value))
}

/// A created or listed record, with its detail page when it has one
#[derive(Serialize)]
struct Line {
    id: i64,
    display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl Line {
    fn new(id: i64, display: impl ToString) -> Self {
        Self {
            id,
            display: display.to_string(),
            url: None,
        }
    }

    fn linked<T: DetailUrl>(record: &T, display: impl ToString) -> Self {
        Self {
            id: record.primary_key(),
            display: display.to_string(),
            url: Some(record.absolute_url()),
        }
    }
}

fn print_lines(lines: &[Line], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(lines)?);
        return Ok(());
    }
    for line in lines {
        match &line.url {
            Some(url) => println!("{:>5}  {}  <{}>", line.id, line.display, url),
            None => println!("{:>5}  {}", line.id, line.display),
        }
    }
    Ok(())
}

fn print_json_or<T: Serialize>(value: &T, json: bool, text: impl FnOnce()) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text();
    }
    Ok(())
}

async fn list(db: &Database, entity: Entity) -> anyhow::Result<Vec<Line>> {
    let pool = db.pool();
    let lines = match entity {
        Entity::Genres => queries::list_genres(pool)
            .await?
            .iter()
            .map(|g| Line::linked(g, g))
            .collect(),
        Entity::Languages => queries::list_languages(pool)
            .await?
            .iter()
            .map(|l| Line::new(l.id, l))
            .collect(),
        Entity::Authors => queries::list_authors(pool)
            .await?
            .iter()
            .map(|a| Line::linked(a, a))
            .collect(),
        Entity::Books => {
            let mut lines = Vec::new();
            for book in queries::list_books(pool).await? {
                if let Some(view) = queries::find_book_with_relations(pool, book.id).await? {
                    lines.push(Line::linked(&view.book, &view));
                }
            }
            lines
        }
        Entity::Copies => queries::list_book_instances_with_book(pool)
            .await?
            .iter()
            .map(|c| {
                Line::linked(
                    &c.instance,
                    format!("{} [{}] {}", c, c.instance.get_status(), c.instance.unique_id),
                )
            })
            .collect(),
    };
    Ok(lines)
}

async fn delete(db: &Database, entity: Entity, id: i64) -> catalog_core::Result<()> {
    let pool = db.pool();
    match entity {
        Entity::Genres => queries::delete_genre(pool, id).await,
        Entity::Languages => queries::delete_language(pool, id).await,
        Entity::Authors => queries::delete_author(pool, id).await,
        Entity::Books => queries::delete_book(pool, id).await,
        Entity::Copies => queries::delete_book_instance(pool, id).await,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = CatalogConfig::from_env()?;
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    let db = Database::connect(&config)
        .await
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let pool = db.pool();
    let json = cli.json;

    match cli.command {
        Commands::Init => {
            println!("Catalog ready at {}", config.database_path.display());
        }
        Commands::AddGenre { name } => {
            let id = queries::insert_genre(pool, &NewGenre::new(name)).await?;
            let genre = queries::find_genre_by_id(pool, id)
                .await?
                .ok_or_else(|| CatalogError::not_found(format!("Genre {}", id)))?;
            print_lines(&[Line::linked(&genre, &genre)], json)?;
        }
        Commands::AddLanguage { name } => {
            let id = queries::insert_language(pool, &NewLanguage::new(name.as_str())).await?;
            print_lines(&[Line::new(id, name)], json)?;
        }
        Commands::AddAuthor { name, born, died } => {
            let new_author = NewAuthor {
                name,
                date_of_birth: born,
                date_of_death: died,
            };
            let id = queries::insert_author(pool, &new_author).await?;
            let author = queries::find_author_by_id(pool, id)
                .await?
                .ok_or_else(|| CatalogError::not_found(format!("Author {}", id)))?;
            print_lines(&[Line::linked(&author, &author)], json)?;
        }
        Commands::AddBook {
            title,
            summary,
            isbn,
            author,
            genres,
            languages,
        } => {
            let new_book = NewBook {
                title,
                summary,
                isbn,
                author_id: author,
                genre_ids: genres,
                language_ids: languages,
            };
            let id = queries::insert_book(pool, &new_book).await?;
            let view = queries::find_book_with_relations(pool, id)
                .await?
                .ok_or_else(|| CatalogError::not_found(format!("Book {}", id)))?;
            print_lines(&[Line::linked(&view.book, &view)], json)?;
        }
        Commands::AddCopy {
            book,
            imprint,
            status,
            due_back,
            unique_id,
        } => {
            let new_copy = NewBookInstance {
                unique_id,
                due_back,
                status,
                book_id: book,
                imprint,
            };
            let copy = queries::insert_book_instance(pool, &new_copy).await?;
            let view = queries::find_book_instance_with_book(pool, copy.id)
                .await?
                .ok_or_else(|| CatalogError::not_found(format!("BookInstance {}", copy.id)))?;
            print_json_or(&view, json, || {
                println!("{}  {}  <{}>", view, copy.unique_id, copy.absolute_url());
            })?;
        }
        Commands::List { entity } => {
            let lines = list(&db, entity).await?;
            print_lines(&lines, json)?;
        }
        Commands::ShowBook { id } => {
            let view = queries::find_book_with_relations(pool, id)
                .await?
                .ok_or_else(|| CatalogError::not_found(format!("Book {}", id)))?;
            let copies = queries::list_book_instances_by_book(pool, id).await?;
            print_json_or(&(&view, &copies), json, || {
                println!("{}", view);
                println!("  ISBN:      {}", view.book.isbn);
                println!("  Genres:    {}", view.genre_names());
                println!(
                    "  Languages: {}",
                    view.languages
                        .iter()
                        .map(|l| l.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                println!("  Summary:   {}", view.book.summary);
                println!("  Copies:    {}", copies.len());
                for copy in &copies {
                    let due = copy
                        .due_back
                        .map(|d| format!(" (due {})", d))
                        .unwrap_or_default();
                    println!("    {} {}{} - {}", copy.id, copy.get_status(), due, copy.imprint);
                }
            })?;
        }
        Commands::Delete { entity, id } => {
            delete(&db, entity, id).await?;
            println!("Deleted {}", id);
        }
        Commands::Summary => {
            let summary = queries::catalog_summary(pool).await?;
            print_json_or(&summary, json, || {
                println!("Books:      {}", summary.books);
                println!("Copies:     {} ({} available)", summary.instances, summary.instances_available);
                println!("Authors:    {}", summary.authors);
                println!("Genres:     {}", summary.genres);
                println!("Languages:  {}", summary.languages);
            })?;
        }
        Commands::Check => {
            let ok = db.check_integrity().await?;
            let stats = db.get_stats().await?;
            println!("Integrity:  {}", if ok { "ok" } else { "FAILED" });
            println!(
                "Pages:      {} x {} bytes ({:.1}% free)",
                stats.page_count,
                stats.page_size,
                stats.unused_percentage()
            );
            if stats.should_vacuum() {
                println!("Vacuum recommended");
            }
            if !ok {
                anyhow::bail!("integrity check failed");
            }
        }
        Commands::Export { output } => {
            db.export(&output).await?;
            println!("Exported to {}", output.display());
        }
        Commands::Vacuum => {
            db.vacuum().await?;
            println!("Vacuum complete");
        }
    }

    db.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_core=info,catalog_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<CatalogError>() {
            Some(err) => eprintln!("Error: {}", err.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

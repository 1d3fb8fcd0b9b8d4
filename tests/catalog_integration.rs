//! Integration tests for the catalog repository
//!
//! Exercises uniqueness, restricted deletes, identifier generation and default
//! orderings against real SQLite databases (in-memory and on disk).

use catalog_core::storage::{
    queries, Database, DetailUrl, LoanStatus, NewAuthor, NewBook, NewBookInstance, NewGenre,
    NewLanguage,
};
use catalog_core::{CatalogConfig, CatalogError};
use chrono::NaiveDate;
use std::collections::HashSet;
use uuid::Uuid;

async fn memory_db() -> Database {
    Database::new_in_memory()
        .await
        .expect("Failed to create in-memory database")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn assert_unique_violation(err: CatalogError, expected_constraint: &str) {
    match err {
        CatalogError::UniqueViolation { constraint, .. } => {
            assert_eq!(constraint, expected_constraint)
        }
        other => panic!("expected UniqueViolation, got {:?}", other),
    }
}

// ============================================================================
// UNIQUENESS
// ============================================================================

#[tokio::test]
async fn genre_names_are_unique_ignoring_case() {
    let db = memory_db().await;

    queries::insert_genre(db.pool(), &NewGenre::new("Sci-Fi"))
        .await
        .expect("first genre should insert");

    let err = queries::insert_genre(db.pool(), &NewGenre::new("sci-fi"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Genre already exists (case insensitive match)");
    assert_unique_violation(err, "genre_name_case_insensitive_unique");

    assert_eq!(queries::list_genres(db.pool()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn author_names_are_unique_ignoring_case() {
    let db = memory_db().await;

    queries::insert_author(db.pool(), &NewAuthor::new("Jane Doe"))
        .await
        .expect("first author should insert");

    let err = queries::insert_author(db.pool(), &NewAuthor::new("JANE DOE"))
        .await
        .unwrap_err();
    assert_unique_violation(err, "author_name_case_insensitive_unique");
}

#[tokio::test]
async fn language_names_are_case_sensitive() {
    let db = memory_db().await;

    queries::insert_language(db.pool(), &NewLanguage::new("English")).await.unwrap();
    queries::insert_language(db.pool(), &NewLanguage::new("english"))
        .await
        .expect("different case is a different language");

    let err = queries::insert_language(db.pool(), &NewLanguage::new("English"))
        .await
        .unwrap_err();
    assert_unique_violation(err, "language_name_unique");
}

#[tokio::test]
async fn duplicate_isbn_is_rejected() {
    let db = memory_db().await;

    queries::insert_book(db.pool(), &NewBook::new("First", "Summary", "1234567890123"))
        .await
        .expect("first book should insert");

    let err = queries::insert_book(db.pool(), &NewBook::new("Second", "Summary", "1234567890123"))
        .await
        .unwrap_err();
    assert_unique_violation(err, "book_isbn_unique");

    let stored = queries::find_book_by_isbn(db.pool(), "1234567890123")
        .await
        .unwrap()
        .expect("original book kept");
    assert_eq!(stored.title, "First");
    assert_eq!(queries::count_books(db.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn update_cannot_take_another_books_isbn() {
    let db = memory_db().await;

    queries::insert_book(db.pool(), &NewBook::new("A", "S", "1111111111111")).await.unwrap();
    let b = queries::insert_book(db.pool(), &NewBook::new("B", "S", "2222222222222"))
        .await
        .unwrap();

    let err = queries::update_book(db.pool(), b, &NewBook::new("B", "S", "1111111111111"))
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation());
}

// ============================================================================
// BOOK INSTANCE IDENTIFIERS
// ============================================================================

#[tokio::test]
async fn missing_unique_id_is_generated() {
    let db = memory_db().await;
    let book_id = queries::insert_book(db.pool(), &NewBook::new("Dune", "Spice", "9780441013593"))
        .await
        .unwrap();

    let mut seen = HashSet::new();
    for _ in 0..5 {
        let copy = queries::insert_book_instance(db.pool(), &NewBookInstance::new(Some(book_id), "Ace, 1990"))
            .await
            .expect("copy should insert");
        assert!(!copy.unique_id.is_nil());
        assert_eq!(copy.get_status(), LoanStatus::Maintenance);
        assert!(seen.insert(copy.unique_id), "identifier reused");
    }

    let stored = queries::list_book_instances(db.pool()).await.unwrap();
    let stored_ids: HashSet<Uuid> = stored.iter().map(|c| c.unique_id).collect();
    assert_eq!(stored_ids, seen);
}

#[tokio::test]
async fn supplied_unique_id_must_be_unused() {
    let db = memory_db().await;
    let unique_id = Uuid::new_v4();

    let copy = queries::insert_book_instance(
        db.pool(),
        &NewBookInstance::new(None, "Imprint").with_unique_id(unique_id),
    )
    .await
    .unwrap();
    assert_eq!(copy.unique_id, unique_id);

    let found = queries::find_book_instance_by_unique_id(db.pool(), unique_id)
        .await
        .unwrap()
        .expect("copy found by identifier");
    assert_eq!(found.id, copy.id);

    let err = queries::insert_book_instance(
        db.pool(),
        &NewBookInstance::new(None, "Other imprint").with_unique_id(unique_id),
    )
    .await
    .unwrap_err();
    assert_unique_violation(err, "book_instance_unique_id_unique");
}

// ============================================================================
// RESTRICTED DELETES
// ============================================================================

#[tokio::test]
async fn referenced_author_cannot_be_deleted() {
    let db = memory_db().await;

    let author_id = queries::insert_author(db.pool(), &NewAuthor::new("Jane Doe")).await.unwrap();
    queries::insert_book(
        db.pool(),
        &NewBook::new("Her Book", "Summary", "9780000000002").with_author(author_id),
    )
    .await
    .unwrap();

    let err = queries::delete_author(db.pool(), author_id).await.unwrap_err();
    match err {
        CatalogError::RestrictedDelete {
            entity,
            referenced_by,
            count,
            ..
        } => {
            assert_eq!(entity, "Author");
            assert_eq!(referenced_by, "Book");
            assert_eq!(count, 1);
        }
        other => panic!("expected RestrictedDelete, got {:?}", other),
    }

    let still_there = queries::find_author_by_name(db.pool(), "Jane Doe")
        .await
        .unwrap()
        .expect("author kept");
    assert_eq!(still_there.id, author_id);
}

#[tokio::test]
async fn referenced_genre_and_language_cannot_be_deleted() {
    let db = memory_db().await;

    let genre_id = queries::insert_genre(db.pool(), &NewGenre::new("Fantasy")).await.unwrap();
    let language_id = queries::insert_language(db.pool(), &NewLanguage::new("English")).await.unwrap();
    let book_id = queries::insert_book(
        db.pool(),
        &NewBook::new("Earthsea", "Wizards", "9780547773742")
            .with_genres(vec![genre_id])
            .with_languages(vec![language_id]),
    )
    .await
    .unwrap();

    let err = queries::delete_genre(db.pool(), genre_id).await.unwrap_err();
    assert!(matches!(err, CatalogError::RestrictedDelete { entity: "Genre", .. }));

    let err = queries::delete_language(db.pool(), language_id).await.unwrap_err();
    assert!(matches!(err, CatalogError::RestrictedDelete { entity: "Language", .. }));

    // Once the book is gone its links go with it and the lookups can be removed
    queries::delete_book(db.pool(), book_id).await.expect("unreferenced book deletes");
    queries::delete_genre(db.pool(), genre_id).await.expect("genre now free");
    queries::delete_language(db.pool(), language_id).await.expect("language now free");

    let link_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM BookGenres")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(link_rows, 0);
}

#[tokio::test]
async fn book_with_copies_cannot_be_deleted() {
    let db = memory_db().await;

    let book_id = queries::insert_book(db.pool(), &NewBook::new("Dune", "Spice", "9780441013593"))
        .await
        .unwrap();
    let copy = queries::insert_book_instance(db.pool(), &NewBookInstance::new(Some(book_id), "Ace"))
        .await
        .unwrap();

    let err = queries::delete_book(db.pool(), book_id).await.unwrap_err();
    assert!(matches!(
        err,
        CatalogError::RestrictedDelete { entity: "Book", referenced_by: "BookInstance", count: 1, .. }
    ));
    assert!(queries::find_book_by_id(db.pool(), book_id).await.unwrap().is_some());

    queries::delete_book_instance(db.pool(), copy.id).await.unwrap();
    queries::delete_book(db.pool(), book_id).await.expect("book free after copy removed");
}

#[tokio::test]
async fn repointing_a_book_releases_its_author() {
    let db = memory_db().await;

    let old_author = queries::insert_author(db.pool(), &NewAuthor::new("Old")).await.unwrap();
    let new_author = queries::insert_author(db.pool(), &NewAuthor::new("New")).await.unwrap();
    let book_id = queries::insert_book(
        db.pool(),
        &NewBook::new("Title", "Summary", "9780000000003").with_author(old_author),
    )
    .await
    .unwrap();

    queries::update_book(
        db.pool(),
        book_id,
        &NewBook::new("Title", "Summary", "9780000000003").with_author(new_author),
    )
    .await
    .unwrap();

    queries::delete_author(db.pool(), old_author).await.expect("old author no longer referenced");
    assert!(queries::delete_author(db.pool(), new_author).await.is_err());
}

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test]
async fn over_long_fields_are_rejected_before_writing() {
    let db = memory_db().await;

    let err = queries::insert_author(db.pool(), &NewAuthor::new("x".repeat(31))).await.unwrap_err();
    assert!(matches!(err, CatalogError::FieldTooLong { max: 30, actual: 31, .. }));

    let err = queries::insert_genre(db.pool(), &NewGenre::new("g".repeat(201))).await.unwrap_err();
    assert!(err.is_validation_error());

    queries::insert_genre(db.pool(), &NewGenre::new("g".repeat(200)))
        .await
        .expect("exact limit accepted");

    let summary = queries::catalog_summary(db.pool()).await.unwrap();
    assert_eq!(summary.authors, 0);
    assert_eq!(summary.genres, 1);
}

#[tokio::test]
async fn copy_with_unknown_book_is_rejected() {
    let db = memory_db().await;

    let err = queries::insert_book_instance(db.pool(), &NewBookInstance::new(Some(99), "Imprint"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::UnknownReference { entity: "Book", id: 99 }));
}

// ============================================================================
// ORDERING, DISPLAY AND URLS
// ============================================================================

#[tokio::test]
async fn default_orderings() {
    let db = memory_db().await;

    for name in ["Spanish", "English", "French"] {
        queries::insert_language(db.pool(), &NewLanguage::new(name)).await.unwrap();
    }
    let languages: Vec<String> = queries::list_languages(db.pool())
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.name)
        .collect();
    assert_eq!(languages, ["English", "French", "Spanish"]);

    for name in ["Zola", "Austen", "Melville"] {
        queries::insert_author(db.pool(), &NewAuthor::new(name)).await.unwrap();
    }
    let authors: Vec<String> = queries::list_authors(db.pool())
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(authors, ["Austen", "Melville", "Zola"]);

    for (title, isbn) in [("Walden", "1"), ("Beloved", "2"), ("Middlemarch", "3")] {
        queries::insert_book(db.pool(), &NewBook::new(title, "S", isbn)).await.unwrap();
    }
    let titles: Vec<String> = queries::list_books(db.pool())
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(titles, ["Beloved", "Middlemarch", "Walden"]);

    let late = NewBookInstance::new(None, "late").due_back(date(2024, 6, 1));
    let early = NewBookInstance::new(None, "early").due_back(date(2024, 1, 1));
    let undated = NewBookInstance::new(None, "undated");
    for copy in [late, early, undated] {
        queries::insert_book_instance(db.pool(), &copy).await.unwrap();
    }
    let imprints: Vec<String> = queries::list_book_instances(db.pool())
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.imprint)
        .collect();
    assert_eq!(imprints, ["undated", "early", "late"]);
}

#[tokio::test]
async fn display_strings_and_detail_urls() {
    let db = memory_db().await;

    let author_id = queries::insert_author(
        db.pool(),
        &NewAuthor::new("Mary Shelley").born(date(1797, 8, 30)).died(date(1851, 2, 1)),
    )
    .await
    .unwrap();
    let genre_id = queries::insert_genre(db.pool(), &NewGenre::new("Gothic")).await.unwrap();
    let book_id = queries::insert_book(
        db.pool(),
        &NewBook::new("Frankenstein", "A modern Prometheus", "9780486282114")
            .with_author(author_id)
            .with_genres(vec![genre_id]),
    )
    .await
    .unwrap();
    let copy = queries::insert_book_instance(
        db.pool(),
        &NewBookInstance::new(Some(book_id), "Dover").with_status(LoanStatus::OnLoan),
    )
    .await
    .unwrap();

    let author = queries::find_author_by_id(db.pool(), author_id).await.unwrap().unwrap();
    assert_eq!(author.to_string(), "Mary Shelley");
    assert_eq!(author.date_of_birth, Some(date(1797, 8, 30)));
    assert_eq!(author.absolute_url(), format!("/catalog/author/{}", author_id));

    let view = queries::find_book_with_relations(db.pool(), book_id).await.unwrap().unwrap();
    assert_eq!(view.to_string(), "Frankenstein, Mary Shelley");
    assert_eq!(view.genre_names(), "Gothic");
    assert_eq!(view.book.absolute_url(), format!("/catalog/book/{}", book_id));

    let copy_view = queries::find_book_instance_with_book(db.pool(), copy.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copy_view.to_string(), format!("{} (Frankenstein)", copy.id));
    assert_eq!(copy.absolute_url(), format!("/catalog/bookinstance/{}", copy.id));

    let on_loan = queries::list_book_instances_by_status(db.pool(), LoanStatus::OnLoan)
        .await
        .unwrap();
    assert_eq!(on_loan.len(), 1);
}

// ============================================================================
// FILE-BACKED DATABASE
// ============================================================================

#[tokio::test]
async fn file_database_persists_and_exports() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("nested").join("catalog.db");

    let db = Database::connect(&CatalogConfig::new(&path).with_max_connections(2))
        .await
        .expect("Failed to open file database");
    queries::insert_genre(db.pool(), &NewGenre::new("Mystery")).await.unwrap();
    assert!(db.check_integrity().await.unwrap());

    let export_path = dir.path().join("backup.db");
    db.export(&export_path).await.expect("Failed to export");
    db.close().await.unwrap();

    let reopened = Database::new(&export_path).await.expect("Failed to open export");
    let genre = queries::find_genre_by_name(reopened.pool(), "mystery")
        .await
        .unwrap()
        .expect("genre survived export");
    assert_eq!(genre.name, "Mystery");
}

// ============================================================================
// CONCURRENT WRITERS
// ============================================================================

async fn file_db(dir: &tempfile::TempDir) -> Database {
    let config = CatalogConfig::new(dir.path().join("catalog.db")).with_max_connections(5);
    Database::connect(&config)
        .await
        .expect("Failed to open file database")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_inserts_all_succeed() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = file_db(&dir).await;

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let pool = db.pool().clone();
            tokio::spawn(async move { queries::insert_genre(&pool, &NewGenre::new(format!("Genre {}", i))).await })
        })
        .collect();

    for handle in handles {
        handle
            .await
            .expect("insert task panicked")
            .expect("non-conflicting insert failed");
    }
    assert_eq!(queries::list_genres(db.pool()).await.unwrap().len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_case_variants_leave_one_genre() {
    const VARIANTS: [&str; 8] = [
        "epic fantasy",
        "Epic Fantasy",
        "EPIC FANTASY",
        "epic FANTASY",
        "Epic fantasy",
        "ePIC fANTASY",
        "EPIC fantasy",
        "epiC fantasY",
    ];

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = file_db(&dir).await;

    for round in 0..10 {
        let handles: Vec<_> = VARIANTS
            .iter()
            .map(|variant| {
                let pool = db.pool().clone();
                let name = format!("{} {}", variant, round);
                tokio::spawn(async move { queries::insert_genre(&pool, &NewGenre::new(name)).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.expect("insert task panicked") {
                Ok(_) => created += 1,
                Err(err) => assert_unique_violation(err, "genre_name_case_insensitive_unique"),
            }
        }
        assert_eq!(created, 1, "round {} created {} genres", round, created);
    }
    assert_eq!(queries::list_genres(db.pool()).await.unwrap().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_book_insert_and_author_delete_stay_typed() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = file_db(&dir).await;

    for round in 0..10 {
        let author_id = queries::insert_author(db.pool(), &NewAuthor::new(format!("Author {}", round)))
            .await
            .unwrap();

        let insert = {
            let pool = db.pool().clone();
            let book = NewBook::new("Contested", "Summary", format!("97800000{:05}", round)).with_author(author_id);
            tokio::spawn(async move { queries::insert_book(&pool, &book).await })
        };
        let delete = {
            let pool = db.pool().clone();
            tokio::spawn(async move { queries::delete_author(&pool, author_id).await })
        };

        let inserted = insert.await.expect("insert task panicked");
        let deleted = delete.await.expect("delete task panicked");
        match (inserted, deleted) {
            // Delete ran first
            (Err(CatalogError::UnknownReference { entity: "Author", id }), Ok(())) => {
                assert_eq!(id, author_id)
            }
            // Insert ran first
            (Ok(_), Err(CatalogError::RestrictedDelete { referenced_by: "Book", count: 1, .. })) => {}
            other => panic!("round {}: unexpected outcome {:?}", round, other),
        }
    }
}

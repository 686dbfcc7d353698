//! Integration tests for session behavior against a SQLite backend.

use db_session::config::DbSettings;
use db_session::db::{Engine, SessionFactory, SessionOptions, SqlParam};
use db_session::error::DbError;
use std::error::Error as _;
use std::sync::Arc;
use tempfile::NamedTempFile;

async fn engine_for(temp_file: &NamedTempFile) -> Arc<Engine> {
    let db_path = temp_file.path().to_str().unwrap();
    let settings = DbSettings::new(format!("sqlite:{}", db_path));
    Arc::new(Engine::connect(&settings).await.unwrap())
}

async fn create_schema(factory: &SessionFactory) {
    let mut session = factory.session();
    session.stage(
        "CREATE TABLE IF NOT EXISTS items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        vec![],
    );
    session.flush().await.unwrap();
    session.commit().await.unwrap();
}

#[tokio::test]
async fn factory_produces_a_fresh_session_per_call() {
    let temp_file = NamedTempFile::new().unwrap();
    let engine = engine_for(&temp_file).await;
    let factory = SessionFactory::new(engine.clone(), SessionOptions::default());

    let mut a = factory.session();
    a.stage("CREATE TABLE t (id INTEGER)", vec![]);
    assert_eq!(a.pending(), 1);

    let b = factory.session();
    assert_eq!(b.pending(), 0);
    assert!(Arc::ptr_eq(a.engine(), b.engine()));
}

#[tokio::test]
async fn autocommit_flush_is_immediately_visible_to_other_sessions() {
    let temp_file = NamedTempFile::new().unwrap();
    let engine = engine_for(&temp_file).await;
    let factory = SessionFactory::new(engine, SessionOptions::default());
    create_schema(&factory).await;

    let mut writer = factory.session();
    writer.stage(
        "INSERT INTO items (id, name) VALUES (?, ?)",
        vec![SqlParam::Int(1), SqlParam::Text("widget".to_string())],
    );
    let affected = writer.flush().await.unwrap();
    assert_eq!(affected, 1);

    let mut reader = factory.session();
    let rows = reader
        .query("SELECT id, name FROM items ORDER BY id", &[])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "widget");
    assert_eq!(rows[0]["id"], 1);
}

#[tokio::test]
async fn transactional_flush_is_invisible_until_commit() {
    let temp_file = NamedTempFile::new().unwrap();
    // Separate engines so the reader is not starved by the writer's open
    // transaction holding the single sqlite connection.
    let writer_engine = engine_for(&temp_file).await;
    let reader_engine = engine_for(&temp_file).await;

    let reader_factory = SessionFactory::new(reader_engine, SessionOptions::default());
    create_schema(&reader_factory).await;

    let writer_factory = SessionFactory::new(
        writer_engine,
        SessionOptions {
            autocommit: false,
            expire_on_commit: false,
        },
    );

    let mut writer = writer_factory.session();
    writer.stage(
        "INSERT INTO items (id, name) VALUES (?, ?)",
        vec![SqlParam::Int(7), SqlParam::Text("pending".to_string())],
    );
    writer.flush().await.unwrap();

    let mut reader = reader_factory.session();
    let rows = reader
        .query("SELECT id FROM items WHERE id = ?", &[SqlParam::Int(7)])
        .await
        .unwrap();
    assert!(rows.is_empty(), "uncommitted write should not be visible");

    writer.commit().await.unwrap();

    let rows = reader
        .query("SELECT id FROM items WHERE id = ?", &[SqlParam::Int(7)])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn transactional_session_reads_its_own_writes() {
    let temp_file = NamedTempFile::new().unwrap();
    let engine = engine_for(&temp_file).await;
    let autocommit_factory = SessionFactory::new(engine.clone(), SessionOptions::default());
    create_schema(&autocommit_factory).await;

    let factory = SessionFactory::new(
        engine,
        SessionOptions {
            autocommit: false,
            expire_on_commit: false,
        },
    );

    let mut session = factory.session();
    session.stage(
        "INSERT INTO items (id, name) VALUES (?, ?)",
        vec![SqlParam::Int(3), SqlParam::Text("bolt".to_string())],
    );
    session.flush().await.unwrap();

    let rows = session
        .query("SELECT name FROM items WHERE id = ?", &[SqlParam::Int(3)])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "bolt");

    session.rollback().await.unwrap();

    let rows = session
        .query("SELECT name FROM items WHERE id = ?", &[SqlParam::Int(3)])
        .await
        .unwrap();
    assert!(rows.is_empty(), "rolled back write should be gone");
}

#[tokio::test]
async fn rollback_discards_queued_writes_and_loaded_state() {
    let temp_file = NamedTempFile::new().unwrap();
    let engine = engine_for(&temp_file).await;
    let factory = SessionFactory::new(engine, SessionOptions::default());
    create_schema(&factory).await;

    let mut session = factory.session();
    session
        .query("SELECT id FROM items", &[])
        .await
        .unwrap();
    session.stage("INSERT INTO items (id, name) VALUES (9, 'x')", vec![]);
    assert_eq!(session.pending(), 1);
    assert!(session.loaded("SELECT id FROM items").is_some());

    session.rollback().await.unwrap();
    assert_eq!(session.pending(), 0);
    assert!(session.loaded("SELECT id FROM items").is_none());
}

#[tokio::test]
async fn expire_on_commit_clears_loaded_state() {
    let temp_file = NamedTempFile::new().unwrap();
    let engine = engine_for(&temp_file).await;
    let factory = SessionFactory::new(
        engine,
        SessionOptions {
            autocommit: true,
            expire_on_commit: true,
        },
    );
    create_schema(&factory).await;

    let mut session = factory.session();
    session.query("SELECT id FROM items", &[]).await.unwrap();
    assert!(session.loaded("SELECT id FROM items").is_some());

    session.commit().await.unwrap();
    assert!(session.loaded("SELECT id FROM items").is_none());
}

#[tokio::test]
async fn loaded_state_survives_commit_without_expiration() {
    let temp_file = NamedTempFile::new().unwrap();
    let engine = engine_for(&temp_file).await;
    let factory = SessionFactory::new(engine, SessionOptions::default());
    create_schema(&factory).await;

    let mut session = factory.session();
    session.query("SELECT id FROM items", &[]).await.unwrap();
    session.commit().await.unwrap();
    assert!(session.loaded("SELECT id FROM items").is_some());
}

#[tokio::test]
async fn query_errors_surface_as_the_uniform_database_kind() {
    let temp_file = NamedTempFile::new().unwrap();
    let engine = engine_for(&temp_file).await;
    let factory = SessionFactory::new(engine, SessionOptions::default());

    let mut session = factory.session();
    let err = session
        .query("SELECT * FROM missing_table", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Database { .. }));
    assert!(err.source().is_some(), "driver error should be preserved");
}

#[tokio::test]
async fn flush_errors_surface_as_the_uniform_database_kind() {
    let temp_file = NamedTempFile::new().unwrap();
    let engine = engine_for(&temp_file).await;
    let factory = SessionFactory::new(engine, SessionOptions::default());

    let mut session = factory.session();
    session.stage("INSERT INTO missing_table VALUES (1)", vec![]);
    let err = session.flush().await.unwrap_err();

    assert!(matches!(err, DbError::Database { .. }));
    // the failed statement stays queued
    assert_eq!(session.pending(), 1);
}

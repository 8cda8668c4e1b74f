use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: [&str; 9] = [
    r#"
    CREATE TABLE IF NOT EXISTS domains (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        value TEXT NOT NULL UNIQUE,
        first_seen_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS urls (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        value TEXT NOT NULL UNIQUE,
        domain_id INTEGER NOT NULL,
        processed INTEGER NOT NULL DEFAULT 0,
        first_seen_at TEXT NOT NULL,
        FOREIGN KEY (domain_id) REFERENCES domains(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        content_type TEXT,
        source_url TEXT,
        redirect TEXT,
        body TEXT NOT NULL,
        dedup_hash TEXT NOT NULL UNIQUE,
        first_seen_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS emails (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_address TEXT,
        to_address TEXT,
        trusted_sender INTEGER NOT NULL DEFAULT 0,
        body TEXT NOT NULL,
        dedup_hash TEXT NOT NULL UNIQUE,
        first_seen_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_kind TEXT NOT NULL,
        source_id INTEGER NOT NULL,
        url_id INTEGER NOT NULL,
        identity TEXT NOT NULL,
        first_seen_at TEXT NOT NULL,
        UNIQUE(source_kind, source_id, url_id, identity),
        FOREIGN KEY (url_id) REFERENCES urls(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_urls_processed ON urls(processed, id)",
    "CREATE INDEX IF NOT EXISTS idx_urls_domain_id ON urls(domain_id)",
    "CREATE INDEX IF NOT EXISTS idx_contents_kind ON contents(kind)",
    "CREATE INDEX IF NOT EXISTS idx_edges_url_id ON edges(url_id)",
];

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = apply_schema(&pool).await;
    pool.close().await;
    result
}

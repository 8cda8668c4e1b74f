//! SQLite-backed [`ProvenanceStore`].
//!
//! Each insert-if-absent is an `INSERT ... ON CONFLICT DO NOTHING` on the
//! table's unique key followed by a lookup of the id, so concurrent
//! writers racing on the same key all observe one row. `rows_affected`
//! tells the winner apart.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{Domain, Edge, Inserted, NewContent, RecordId, StoreSummary, UrlRecord};
use crate::store::ProvenanceStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool)
            .await
            .context("applying schema")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

enum Table {
    Contents,
    Emails,
}

fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn inserted(id: RecordId, rows_affected: u64) -> Inserted {
    if rows_affected > 0 {
        Inserted::new(id)
    } else {
        Inserted::existing(id)
    }
}

#[async_trait]
impl ProvenanceStore for SqliteStore {
    async fn insert_domain_if_absent(&self, domain: &Domain) -> Result<Inserted> {
        let result = sqlx::query(
            "INSERT INTO domains (value, first_seen_at) VALUES (?, ?) ON CONFLICT(value) DO NOTHING",
        )
        .bind(domain.as_str())
        .bind(now_iso())
        .execute(&self.pool)
        .await?;

        let id: RecordId = sqlx::query_scalar("SELECT id FROM domains WHERE value = ?")
            .bind(domain.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(inserted(id, result.rows_affected()))
    }

    async fn insert_url_if_absent(&self, value: &str, domain_id: RecordId) -> Result<Inserted> {
        let result = sqlx::query(
            r#"
            INSERT INTO urls (value, domain_id, processed, first_seen_at)
            VALUES (?, ?, 0, ?)
            ON CONFLICT(value) DO NOTHING
            "#,
        )
        .bind(value)
        .bind(domain_id)
        .bind(now_iso())
        .execute(&self.pool)
        .await?;

        let id: RecordId = sqlx::query_scalar("SELECT id FROM urls WHERE value = ?")
            .bind(value)
            .fetch_one(&self.pool)
            .await?;
        Ok(inserted(id, result.rows_affected()))
    }

    async fn find_url(&self, value: &str) -> Result<Option<UrlRecord>> {
        let row = sqlx::query("SELECT id, value, domain_id, processed FROM urls WHERE value = ?")
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| UrlRecord {
            id: r.get("id"),
            value: r.get("value"),
            domain_id: r.get("domain_id"),
            processed: r.get::<i64, _>("processed") != 0,
        }))
    }

    async fn insert_content_if_absent(&self, content: &NewContent) -> Result<Inserted> {
        let (result, table) = match content {
            NewContent::Web {
                kind,
                content_type,
                source_url,
                redirect,
                body,
                dedup_hash,
            } => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO contents (kind, content_type, source_url, redirect, body,
                                          dedup_hash, first_seen_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(dedup_hash) DO NOTHING
                    "#,
                )
                .bind(kind.as_str())
                .bind(content_type)
                .bind(source_url)
                .bind(redirect)
                .bind(body)
                .bind(dedup_hash)
                .bind(now_iso())
                .execute(&self.pool)
                .await?;
                (result, Table::Contents)
            }
            NewContent::Email {
                from_address,
                to_address,
                trusted_sender,
                body,
                dedup_hash,
            } => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO emails (from_address, to_address, trusted_sender, body,
                                        dedup_hash, first_seen_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(dedup_hash) DO NOTHING
                    "#,
                )
                .bind(from_address)
                .bind(to_address)
                .bind(*trusted_sender as i64)
                .bind(body)
                .bind(dedup_hash)
                .bind(now_iso())
                .execute(&self.pool)
                .await?;
                (result, Table::Emails)
            }
        };

        let lookup = match table {
            Table::Contents => "SELECT id FROM contents WHERE dedup_hash = ?",
            Table::Emails => "SELECT id FROM emails WHERE dedup_hash = ?",
        };
        let id: RecordId = sqlx::query_scalar(lookup)
            .bind(content.dedup_hash())
            .fetch_one(&self.pool)
            .await?;
        Ok(inserted(id, result.rows_affected()))
    }

    async fn insert_edge_if_absent(&self, edge: &Edge) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO edges (source_kind, source_id, url_id, identity, first_seen_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source_kind, source_id, url_id, identity) DO NOTHING
            "#,
        )
        .bind(edge.source.kind())
        .bind(edge.source.id())
        .bind(edge.target_url)
        .bind(&edge.identity)
        .bind(now_iso())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_explored(&self, value: &str) -> Result<()> {
        sqlx::query("UPDATE urls SET processed = 1 WHERE value = ?")
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn unexplored_urls(&self) -> Result<Vec<String>> {
        let urls: Vec<String> =
            sqlx::query_scalar("SELECT value FROM urls WHERE processed = 0 ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(urls)
    }

    async fn summary(&self) -> Result<StoreSummary> {
        let pool = &self.pool;
        let count = |sql: &'static str| async move {
            sqlx::query_scalar::<_, i64>(sql)
                .fetch_one(pool)
                .await
                .with_context(|| format!("running `{sql}`"))
        };

        Ok(StoreSummary {
            domains: count("SELECT COUNT(*) FROM domains").await?,
            urls_explored: count("SELECT COUNT(*) FROM urls WHERE processed = 1").await?,
            urls_unexplored: count("SELECT COUNT(*) FROM urls WHERE processed = 0").await?,
            html_contents: count("SELECT COUNT(*) FROM contents WHERE kind = 'html'").await?,
            script_contents: count("SELECT COUNT(*) FROM contents WHERE kind = 'script'").await?,
            plain_contents: count("SELECT COUNT(*) FROM contents WHERE kind = 'plain'").await?,
            emails: count("SELECT COUNT(*) FROM emails").await?,
            edges: count("SELECT COUNT(*) FROM edges").await?,
        })
    }
}

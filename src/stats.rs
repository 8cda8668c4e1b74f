//! Store overview for `malmail stats`.
//!
//! Row counts come from [`ProvenanceStore::summary`]; the per-domain
//! breakdown is a direct SQLite query.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::models::StoreSummary;
use crate::sqlite_store::SqliteStore;
use crate::store::ProvenanceStore;

const TOP_DOMAINS: i64 = 10;

struct DomainStats {
    domain: String,
    urls: i64,
    explored: i64,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let result = collect(&store).await;
    store.close().await;
    let (summary, domains) = result?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("stats");
    println!("  database: {}", config.db.path.display());
    println!("  size: {}", format_bytes(db_size));
    print_summary(&summary);

    if !domains.is_empty() {
        println!("  top domains:");
        println!("    {:<40} {:>6} {:>9}", "DOMAIN", "URLS", "EXPLORED");
        for d in &domains {
            println!("    {:<40} {:>6} {:>9}", d.domain, d.urls, d.explored);
        }
    }
    println!("ok");
    Ok(())
}

async fn collect(store: &SqliteStore) -> Result<(StoreSummary, Vec<DomainStats>)> {
    let summary = store.summary().await?;
    let domains = top_domains(store.pool()).await?;
    Ok((summary, domains))
}

pub fn print_summary(summary: &StoreSummary) {
    println!("  domains: {}", summary.domains);
    println!(
        "  urls: {} ({} explored, {} unexplored)",
        summary.urls_explored + summary.urls_unexplored,
        summary.urls_explored,
        summary.urls_unexplored
    );
    println!(
        "  contents: html {}, script {}, plain {}",
        summary.html_contents, summary.script_contents, summary.plain_contents
    );
    println!("  emails: {}", summary.emails);
    println!("  edges: {}", summary.edges);
}

async fn top_domains(pool: &SqlitePool) -> Result<Vec<DomainStats>> {
    let rows = sqlx::query(
        r#"
        SELECT d.value AS domain,
               COUNT(u.id) AS urls,
               COALESCE(SUM(u.processed), 0) AS explored
        FROM domains d
        JOIN urls u ON u.domain_id = d.id
        GROUP BY d.id
        ORDER BY urls DESC, d.value
        LIMIT ?
        "#,
    )
    .bind(TOP_DOMAINS)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| DomainStats {
            domain: row.get("domain"),
            urls: row.get("urls"),
            explored: row.get("explored"),
        })
        .collect())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}

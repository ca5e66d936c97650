//! Database statistics overview.
//!
//! A quick summary of what has been loaded: row counts per table, the
//! most-linked brands, and when the last product was loaded. Used by
//! `food-etl stats` to check that runs are landing where expected.

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;

use crate::config::Config;
use crate::db;

const COUNTED_TABLES: &[&str] = &[
    "products",
    "brands",
    "categories",
    "tags",
    "nutrients",
    "ingredients",
    "product_brands",
    "product_categories",
    "product_tags",
    "product_nutrients",
    "product_ingredients",
];

struct BrandStats {
    name: String,
    product_count: i64,
}

async fn table_counts(conn: &mut SqliteConnection) -> Result<Vec<(&'static str, i64)>> {
    let mut counts = Vec::with_capacity(COUNTED_TABLES.len());
    for table in COUNTED_TABLES {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&mut *conn)
            .await?;
        counts.push((*table, n));
    }
    Ok(counts)
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let mut conn = pool.acquire().await?;

    let counts = table_counts(&mut conn).await?;

    let last_loaded: Option<i64> = sqlx::query_scalar("SELECT MAX(loaded_at) FROM products")
        .fetch_one(&mut *conn)
        .await?;

    let brand_rows = sqlx::query(
        r#"
        SELECT b.name, COUNT(pb.product_code) AS product_count
        FROM brands b
        JOIN product_brands pb ON pb.brand_id = b.id
        GROUP BY b.id
        ORDER BY product_count DESC, b.name
        LIMIT 10
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let brands: Vec<BrandStats> = brand_rows
        .iter()
        .map(|row| BrandStats {
            name: row.get("name"),
            product_count: row.get("product_count"),
        })
        .collect();

    drop(conn);
    pool.close().await;

    let db_size = SqliteConnectOptions::from_str(&config.db.url)
        .ok()
        .and_then(|opts| std::fs::metadata(opts.get_filename()).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    println!("food-etl database stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.url);
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Last load:   {}",
        last_loaded
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    for (table, n) in &counts {
        println!("  {:<22} {:>8}", table, n);
    }

    if !brands.is_empty() {
        println!();
        println!("  Top brands:");
        println!("  {:<32} {:>8}", "BRAND", "PRODUCTS");
        println!("  {}", "-".repeat(41));
        for b in &brands {
            println!("  {:<32} {:>8}", b.name, b.product_count);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now ("3 hours ago"), falling back to
/// a date once it is more than a month old.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    match delta {
        d if d < 0 => format_ts_iso(ts),
        d if d < 60 => "just now".to_string(),
        d if d < 3600 => plural(d / 60, "min"),
        d if d < 86400 => plural(d / 3600, "hour"),
        d if d < 86400 * 30 => plural(d / 86400, "day"),
        _ => format_ts_iso(ts),
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }

    #[tokio::test]
    async fn counts_every_table() {
        let pool = db::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("INSERT INTO brands (name) VALUES ('Acme')")
            .execute(&mut *conn)
            .await
            .unwrap();

        let counts = table_counts(&mut conn).await.unwrap();
        assert_eq!(counts.len(), COUNTED_TABLES.len());
        assert!(counts.contains(&("brands", 1)));
        assert!(counts.contains(&("products", 0)));
    }
}

use anyhow::Result;
use sqlx::SqliteConnection;

use crate::config::Config;
use crate::db;

/// Create every table and index if missing. Safe to run repeatedly.
///
/// Natural keys carry UNIQUE constraints; the resolver looks up before it
/// inserts, and these constraints back that up.
pub async fn apply_schema(conn: &mut SqliteConnection) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            code TEXT PRIMARY KEY,
            name TEXT,
            nutriscore TEXT CHECK (nutriscore IN ('a', 'b', 'c', 'd', 'e')),
            ecoscore TEXT CHECK (ecoscore IN ('a', 'b', 'c', 'd', 'e')),
            nova_group INTEGER CHECK (nova_group BETWEEN 1 AND 4),
            loaded_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS brands (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('allergen', 'additive')),
            UNIQUE(name, kind)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS nutrients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            unit TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            vegan INTEGER CHECK (vegan IN (0, 1)),
            vegetarian INTEGER CHECK (vegetarian IN (0, 1))
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    // Link tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS product_brands (
            product_code TEXT NOT NULL REFERENCES products(code),
            brand_id INTEGER NOT NULL REFERENCES brands(id),
            PRIMARY KEY (product_code, brand_id)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS product_categories (
            product_code TEXT NOT NULL REFERENCES products(code),
            category_id INTEGER NOT NULL REFERENCES categories(id),
            PRIMARY KEY (product_code, category_id)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS product_tags (
            product_code TEXT NOT NULL REFERENCES products(code),
            tag_id INTEGER NOT NULL REFERENCES tags(id),
            PRIMARY KEY (product_code, tag_id)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS product_nutrients (
            product_code TEXT NOT NULL REFERENCES products(code),
            nutrient_id INTEGER NOT NULL REFERENCES nutrients(id),
            quantity_per_100g REAL NOT NULL,
            PRIMARY KEY (product_code, nutrient_id)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS product_ingredients (
            product_code TEXT NOT NULL REFERENCES products(code),
            ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
            estimated_quantity REAL,
            PRIMARY KEY (product_code, ingredient_id)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    // Reverse lookups from reference rows to products
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_product_tags_tag ON product_tags(tag_id)")
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_product_ingredients_ingredient ON product_ingredients(ingredient_id)",
    )
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_products_loaded_at ON products(loaded_at DESC)",
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let mut conn = pool.acquire().await?;
    apply_schema(&mut conn).await?;
    drop(conn);
    pool.close().await;
    Ok(())
}

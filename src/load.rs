//! Normalized record → database rows.
//!
//! [`load`] upserts the product and rebuilds every association through the
//! resolvers. Reloading a product is a full replace: all five kinds of link
//! rows are deleted first, so the stored links always match the latest
//! record. The caller's connection is used as-is and nothing is committed;
//! the pipeline wraps each call in a transaction.

use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::NormalizedRecord;
use crate::resolve::{
    resolve_brand, resolve_category, resolve_ingredient, resolve_nutrient, resolve_tag,
    Resolution, UnitConflict,
};

const LINK_TABLES: [&str; 5] = [
    "product_brands",
    "product_categories",
    "product_tags",
    "product_nutrients",
    "product_ingredients",
];

/// What a single load wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// The product row was inserted rather than updated.
    pub created: bool,
    /// Stale link rows removed before rebuilding.
    pub links_cleared: u64,
    pub brands: u64,
    pub categories: u64,
    pub tags: u64,
    pub nutrients: u64,
    pub ingredients: u64,
    /// Ingredients already linked earlier in the same record.
    pub duplicate_ingredients: u64,
    pub unit_conflicts: Vec<UnitConflict>,
}

/// Upsert `record` and rebuild its associations on `conn`.
///
/// # Errors
///
/// Any database error is returned unchanged; the caller is expected to roll
/// back.
pub async fn load(conn: &mut SqliteConnection, record: &NormalizedRecord) -> Result<LoadReport> {
    let product = &record.product;
    let code = product.code.as_str();
    let now = chrono::Utc::now().timestamp();
    let mut report = LoadReport::default();

    let existing: Option<String> = sqlx::query_scalar("SELECT code FROM products WHERE code = ?")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

    if existing.is_some() {
        info!(code, "product exists, replacing associations");
        report.links_cleared = clear_links(conn, code).await?;

        sqlx::query(
            r#"
            UPDATE products
            SET name = ?, nutriscore = ?, ecoscore = ?, nova_group = ?, loaded_at = ?
            WHERE code = ?
            "#,
        )
        .bind(&product.name)
        .bind(product.nutriscore.as_db())
        .bind(product.ecoscore.as_db())
        .bind(product.nova_group.as_db())
        .bind(now)
        .bind(code)
        .execute(&mut *conn)
        .await?;
    } else {
        info!(code, "creating product");
        sqlx::query(
            r#"
            INSERT INTO products (code, name, nutriscore, ecoscore, nova_group, loaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(code)
        .bind(&product.name)
        .bind(product.nutriscore.as_db())
        .bind(product.ecoscore.as_db())
        .bind(product.nova_group.as_db())
        .bind(now)
        .execute(&mut *conn)
        .await?;
        report.created = true;
    }

    if let Some(brand_name) = &record.brand {
        if let Some(brand) = resolve_brand(conn, brand_name).await? {
            report.brands += link(conn, "product_brands", "brand_id", code, brand.entity.id).await?;
        }
    }

    for name in &record.categories {
        if let Some(category) = resolve_category(conn, name).await? {
            report.categories +=
                link(conn, "product_categories", "category_id", code, category.entity.id).await?;
        }
    }

    for spec in &record.tags {
        if let Some(tag) = resolve_tag(conn, &spec.name, spec.kind).await? {
            report.tags += link(conn, "product_tags", "tag_id", code, tag.entity.id).await?;
        }
    }

    for fact in &record.nutrients {
        let Some(nutrient) = resolve_nutrient(conn, &fact.name, &fact.unit).await? else {
            continue;
        };
        if let Resolution::Conflict(conflict) = nutrient.resolution {
            report.unit_conflicts.push(conflict);
        }
        sqlx::query(
            r#"
            INSERT INTO product_nutrients (product_code, nutrient_id, quantity_per_100g)
            VALUES (?, ?, ?)
            ON CONFLICT(product_code, nutrient_id) DO UPDATE SET
                quantity_per_100g = excluded.quantity_per_100g
            "#,
        )
        .bind(code)
        .bind(nutrient.entity.id)
        .bind(fact.quantity)
        .execute(&mut *conn)
        .await?;
        report.nutrients += 1;
    }

    for entry in &record.ingredients {
        let Some(ingredient) =
            resolve_ingredient(conn, &entry.name, entry.vegan, entry.vegetarian).await?
        else {
            continue;
        };
        let ingredient = ingredient.entity;

        // A record can list the same ingredient twice; keep the first.
        let already_linked: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM product_ingredients WHERE product_code = ? AND ingredient_id = ?",
        )
        .bind(code)
        .bind(ingredient.id)
        .fetch_optional(&mut *conn)
        .await?;

        if already_linked.is_some() {
            debug!(
                code,
                ingredient = %ingredient.name,
                "ingredient already linked to product, skipping"
            );
            report.duplicate_ingredients += 1;
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO product_ingredients (product_code, ingredient_id, estimated_quantity)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(code)
        .bind(ingredient.id)
        .bind(entry.quantity)
        .execute(&mut *conn)
        .await?;
        report.ingredients += 1;
    }

    info!(
        code,
        created = report.created,
        brands = report.brands,
        categories = report.categories,
        tags = report.tags,
        nutrients = report.nutrients,
        ingredients = report.ingredients,
        "product staged for commit"
    );

    Ok(report)
}

/// Delete every link row of `code`. Returns the number of rows removed.
async fn clear_links(conn: &mut SqliteConnection, code: &str) -> Result<u64> {
    let mut removed = 0;
    for table in LINK_TABLES {
        removed += sqlx::query(&format!("DELETE FROM {} WHERE product_code = ?", table))
            .bind(code)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    debug!(code, removed, "cleared stale links");
    Ok(removed)
}

/// Insert an existence-only link. A repeated link is ignored; returns the
/// number of rows written (0 or 1).
async fn link(
    conn: &mut SqliteConnection,
    table: &'static str,
    column: &'static str,
    code: &str,
    id: i64,
) -> Result<u64> {
    let written = sqlx::query(&format!(
        "INSERT OR IGNORE INTO {} (product_code, {}) VALUES (?, ?)",
        table, column
    ))
    .bind(code)
    .bind(id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(written)
}

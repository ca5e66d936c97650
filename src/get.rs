//! Product retrieval by code.
//!
//! Reads a product and every association back out of the database. Used
//! by the `food-etl get` command and by tests that check what a load left
//! behind.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::{Row, SqliteConnection};

use crate::config::Config;
use crate::db;
use crate::models::{Grade, NovaGroup, NutrientFact, TagKind, TagSpec, TriState};

/// A stored product with all of its associations, sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    pub code: String,
    pub name: Option<String>,
    pub nutriscore: Grade,
    pub ecoscore: Grade,
    pub nova_group: NovaGroup,
    pub loaded_at: String, // ISO8601
    pub brands: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<TagSpec>,
    pub nutrients: Vec<NutrientFact>,
    pub ingredients: Vec<IngredientView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngredientView {
    pub name: String,
    pub vegan: TriState,
    pub vegetarian: TriState,
    pub estimated_quantity: Option<f64>,
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Read one product graph on an existing connection.
pub async fn product_view(
    conn: &mut SqliteConnection,
    code: &str,
) -> crate::error::Result<Option<ProductView>> {
    let row = sqlx::query(
        "SELECT code, name, nutriscore, ecoscore, nova_group, loaded_at FROM products WHERE code = ?",
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let nutriscore: Option<String> = row.get("nutriscore");
    let ecoscore: Option<String> = row.get("ecoscore");
    let nova_group: Option<i64> = row.get("nova_group");
    let loaded_at: i64 = row.get("loaded_at");

    let brands: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT b.name FROM product_brands pb
        JOIN brands b ON b.id = pb.brand_id
        WHERE pb.product_code = ?
        ORDER BY b.name
        "#,
    )
    .bind(code)
    .fetch_all(&mut *conn)
    .await?;

    let categories: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT c.name FROM product_categories pc
        JOIN categories c ON c.id = pc.category_id
        WHERE pc.product_code = ?
        ORDER BY c.name
        "#,
    )
    .bind(code)
    .fetch_all(&mut *conn)
    .await?;

    let tag_rows = sqlx::query(
        r#"
        SELECT t.name, t.kind FROM product_tags pt
        JOIN tags t ON t.id = pt.tag_id
        WHERE pt.product_code = ?
        ORDER BY t.kind, t.name
        "#,
    )
    .bind(code)
    .fetch_all(&mut *conn)
    .await?;

    let tags: Vec<TagSpec> = tag_rows
        .iter()
        .filter_map(|r| {
            let kind: String = r.get("kind");
            TagKind::from_db(&kind).map(|kind| TagSpec {
                name: r.get("name"),
                kind,
            })
        })
        .collect();

    let nutrient_rows = sqlx::query(
        r#"
        SELECT n.name, n.unit, pn.quantity_per_100g FROM product_nutrients pn
        JOIN nutrients n ON n.id = pn.nutrient_id
        WHERE pn.product_code = ?
        ORDER BY n.name
        "#,
    )
    .bind(code)
    .fetch_all(&mut *conn)
    .await?;

    let nutrients = nutrient_rows
        .iter()
        .map(|r| NutrientFact {
            name: r.get("name"),
            unit: r.get("unit"),
            quantity: r.get("quantity_per_100g"),
        })
        .collect();

    let ingredient_rows = sqlx::query(
        r#"
        SELECT i.name, i.vegan, i.vegetarian, pi.estimated_quantity FROM product_ingredients pi
        JOIN ingredients i ON i.id = pi.ingredient_id
        WHERE pi.product_code = ?
        ORDER BY i.name
        "#,
    )
    .bind(code)
    .fetch_all(&mut *conn)
    .await?;

    let ingredients = ingredient_rows
        .iter()
        .map(|r| IngredientView {
            name: r.get("name"),
            vegan: TriState::from_db(r.get("vegan")),
            vegetarian: TriState::from_db(r.get("vegetarian")),
            estimated_quantity: r.get("estimated_quantity"),
        })
        .collect();

    Ok(Some(ProductView {
        code: row.get("code"),
        name: row.get("name"),
        nutriscore: Grade::from_db(nutriscore.as_deref()),
        ecoscore: Grade::from_db(ecoscore.as_deref()),
        nova_group: NovaGroup::from_db(nova_group),
        loaded_at: format_ts_iso(loaded_at),
        brands,
        categories,
        tags,
        nutrients,
        ingredients,
    }))
}

/// Core get function returning structured data.
pub async fn get_product(config: &Config, code: &str) -> Result<ProductView> {
    let pool = db::connect(config).await?;
    let mut conn = pool.acquire().await?;
    let view = product_view(&mut conn, code).await;
    drop(conn);
    pool.close().await;

    match view? {
        Some(view) => Ok(view),
        None => bail!("product not found: {}", code),
    }
}

/// CLI entry point: print a product as text or JSON.
pub async fn run_get(config: &Config, code: &str, json: bool) -> Result<()> {
    let view = get_product(config, code).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("--- Product ---");
    println!("code: {}", view.code);
    println!("name: {}", view.name.as_deref().unwrap_or("(none)"));
    println!("nutriscore: {}", view.nutriscore);
    println!("ecoscore: {}", view.ecoscore);
    println!("nova group: {}", view.nova_group);
    println!("loaded at: {}", view.loaded_at);
    println!("brands: {}", view.brands.join(", "));
    println!("categories: {}", view.categories.join(", "));
    println!();

    println!("--- Tags ({}) ---", view.tags.len());
    for tag in &view.tags {
        println!("{:<10} {}", tag.kind.as_str(), tag.name);
    }
    println!();

    println!("--- Nutrients per 100 g ({}) ---", view.nutrients.len());
    for n in &view.nutrients {
        println!("{:<16} {:>10} {}", n.name, n.quantity, n.unit);
    }
    println!();

    println!("--- Ingredients ({}) ---", view.ingredients.len());
    for i in &view.ingredients {
        let qty = i
            .estimated_quantity
            .map(|q| format!("{:.1}%", q))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:<32} {:>7}  vegan: {:<7} vegetarian: {}",
            i.name, qty, i.vegan, i.vegetarian
        );
    }

    Ok(())
}

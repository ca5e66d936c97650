//! Reference-data resolution: get-or-create by natural key.
//!
//! Brands, categories, tags, nutrients, and ingredients are shared by many
//! products and looked up by name (or name + kind for tags). Each resolver
//! looks the key up on the caller's connection, inserts a row if none
//! exists, and reports what happened through [`Resolution`].
//!
//! | Entity | On existing row |
//! |--------|-----------------|
//! | Brand, Category, Tag | returned unchanged |
//! | Nutrient | stored unit kept; a different incoming unit is a [`UnitConflict`] |
//! | Ingredient | known incoming flags overwrite stored flags; unknown ones never do |
//!
//! A blank key resolves to `Ok(None)` and the caller skips the link.
//! Nothing here commits: the caller owns the transaction.

use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Brand, Category, Ingredient, Nutrient, Tag, TagKind, TriState};

/// A nutrient resolved with a unit different from the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitConflict {
    pub nutrient: String,
    pub stored_unit: String,
    pub incoming_unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No row existed; one was inserted.
    Created,
    /// The stored row was returned as-is.
    Existing,
    /// The stored row was refined (ingredient flags).
    Updated,
    /// The stored row was kept despite conflicting input.
    Conflict(UnitConflict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub entity: T,
    pub resolution: Resolution,
}

impl<T> Resolved<T> {
    fn new(entity: T, resolution: Resolution) -> Self {
        Self { entity, resolution }
    }
}

fn natural_key(raw: &str) -> Option<&str> {
    let key = raw.trim();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Look up `name` in a single-column reference table, inserting it if
/// absent. Returns the row id and whether it was created.
async fn lookup_or_insert_name(
    conn: &mut SqliteConnection,
    table: &'static str,
    name: &str,
) -> Result<(i64, bool)> {
    let existing: Option<i64> =
        sqlx::query_scalar(&format!("SELECT id FROM {} WHERE name = ?", table))
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some(id) = existing {
        return Ok((id, false));
    }

    let id = sqlx::query(&format!("INSERT INTO {} (name) VALUES (?)", table))
        .bind(name)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

    Ok((id, true))
}

pub async fn resolve_brand(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Resolved<Brand>>> {
    let Some(name) = natural_key(name) else {
        debug!(name, "brand name blank, skipping");
        return Ok(None);
    };

    let (id, created) = lookup_or_insert_name(conn, "brands", name).await?;
    let resolution = if created {
        info!(brand = name, id, "brand created");
        Resolution::Created
    } else {
        Resolution::Existing
    };

    Ok(Some(Resolved::new(
        Brand {
            id,
            name: name.to_string(),
        },
        resolution,
    )))
}

pub async fn resolve_category(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Resolved<Category>>> {
    let Some(name) = natural_key(name) else {
        return Ok(None);
    };

    let (id, created) = lookup_or_insert_name(conn, "categories", name).await?;
    let resolution = if created {
        info!(category = name, id, "category created");
        Resolution::Created
    } else {
        Resolution::Existing
    };

    Ok(Some(Resolved::new(
        Category {
            id,
            name: name.to_string(),
        },
        resolution,
    )))
}

pub async fn resolve_tag(
    conn: &mut SqliteConnection,
    name: &str,
    kind: TagKind,
) -> Result<Option<Resolved<Tag>>> {
    let Some(name) = natural_key(name) else {
        return Ok(None);
    };

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE name = ? AND kind = ?")
        .bind(name)
        .bind(kind.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    let (id, resolution) = match existing {
        Some(id) => (id, Resolution::Existing),
        None => {
            let id = sqlx::query("INSERT INTO tags (name, kind) VALUES (?, ?)")
                .bind(name)
                .bind(kind.as_str())
                .execute(&mut *conn)
                .await?
                .last_insert_rowid();
            info!(tag = name, kind = kind.as_str(), id, "tag created");
            (id, Resolution::Created)
        }
    };

    Ok(Some(Resolved::new(
        Tag {
            id,
            name: name.to_string(),
            kind,
        },
        resolution,
    )))
}

/// Resolve a nutrient by name. The first unit seen for a name is permanent.
pub async fn resolve_nutrient(
    conn: &mut SqliteConnection,
    name: &str,
    unit: &str,
) -> Result<Option<Resolved<Nutrient>>> {
    let (Some(name), Some(unit)) = (natural_key(name), natural_key(unit)) else {
        debug!(name, unit, "nutrient name or unit blank, skipping");
        return Ok(None);
    };

    let existing: Option<(i64, String)> =
        sqlx::query_as("SELECT id, unit FROM nutrients WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    let resolved = match existing {
        Some((id, stored_unit)) => {
            let resolution = if stored_unit != unit {
                warn!(
                    nutrient = name,
                    stored_unit = %stored_unit,
                    incoming_unit = unit,
                    "nutrient unit conflict, keeping stored unit"
                );
                Resolution::Conflict(UnitConflict {
                    nutrient: name.to_string(),
                    stored_unit: stored_unit.clone(),
                    incoming_unit: unit.to_string(),
                })
            } else {
                Resolution::Existing
            };
            Resolved::new(
                Nutrient {
                    id,
                    name: name.to_string(),
                    unit: stored_unit,
                },
                resolution,
            )
        }
        None => {
            let id = sqlx::query("INSERT INTO nutrients (name, unit) VALUES (?, ?)")
                .bind(name)
                .bind(unit)
                .execute(&mut *conn)
                .await?
                .last_insert_rowid();
            info!(nutrient = name, unit, id, "nutrient created");
            Resolved::new(
                Nutrient {
                    id,
                    name: name.to_string(),
                    unit: unit.to_string(),
                },
                Resolution::Created,
            )
        }
    };

    Ok(Some(resolved))
}

/// Resolve an ingredient by trimmed name, refining its diet flags.
///
/// A stored flag changes only when the incoming flag is known and differs,
/// so flags move from unknown to known but never back.
pub async fn resolve_ingredient(
    conn: &mut SqliteConnection,
    name: &str,
    vegan: TriState,
    vegetarian: TriState,
) -> Result<Option<Resolved<Ingredient>>> {
    let Some(name) = natural_key(name) else {
        warn!(name, "ingredient name blank, skipping");
        return Ok(None);
    };

    let existing: Option<(i64, Option<bool>, Option<bool>)> =
        sqlx::query_as("SELECT id, vegan, vegetarian FROM ingredients WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    let Some((id, stored_vegan, stored_vegetarian)) = existing else {
        let id = sqlx::query("INSERT INTO ingredients (name, vegan, vegetarian) VALUES (?, ?, ?)")
            .bind(name)
            .bind(vegan.as_db())
            .bind(vegetarian.as_db())
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();
        info!(ingredient = name, id, %vegan, %vegetarian, "ingredient created");
        return Ok(Some(Resolved::new(
            Ingredient {
                id,
                name: name.to_string(),
                vegan,
                vegetarian,
            },
            Resolution::Created,
        )));
    };

    let mut ingredient = Ingredient {
        id,
        name: name.to_string(),
        vegan: TriState::from_db(stored_vegan),
        vegetarian: TriState::from_db(stored_vegetarian),
    };

    let mut modified = false;
    if vegan.is_known() && ingredient.vegan != vegan {
        ingredient.vegan = vegan;
        modified = true;
    }
    if vegetarian.is_known() && ingredient.vegetarian != vegetarian {
        ingredient.vegetarian = vegetarian;
        modified = true;
    }

    if !modified {
        debug!(ingredient = name, id, "ingredient found, unchanged");
        return Ok(Some(Resolved::new(ingredient, Resolution::Existing)));
    }

    sqlx::query("UPDATE ingredients SET vegan = ?, vegetarian = ? WHERE id = ?")
        .bind(ingredient.vegan.as_db())
        .bind(ingredient.vegetarian.as_db())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    info!(
        ingredient = name,
        id,
        vegan = %ingredient.vegan,
        vegetarian = %ingredient.vegetarian,
        "ingredient flags refined"
    );

    Ok(Some(Resolved::new(ingredient, Resolution::Updated)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn resolving_twice_returns_same_brand() {
        let pool = db::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = resolve_brand(&mut conn, "Ferrero").await.unwrap().unwrap();
        let second = resolve_brand(&mut conn, "Ferrero").await.unwrap().unwrap();

        assert_eq!(first.resolution, Resolution::Created);
        assert_eq!(second.resolution, Resolution::Existing);
        assert_eq!(first.entity.id, second.entity.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM brands")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn categories_are_idempotent_and_trimmed() {
        let pool = db::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let a = resolve_category(&mut conn, "sodas").await.unwrap().unwrap();
        let b = resolve_category(&mut conn, "  sodas ").await.unwrap().unwrap();
        assert_eq!(a.entity.id, b.entity.id);
        assert_eq!(b.entity.name, "sodas");
    }

    #[tokio::test]
    async fn blank_keys_resolve_to_nothing() {
        let pool = db::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(resolve_brand(&mut conn, "").await.unwrap().is_none());
        assert!(resolve_category(&mut conn, "   ").await.unwrap().is_none());
        assert!(resolve_tag(&mut conn, "", TagKind::Allergen)
            .await
            .unwrap()
            .is_none());
        assert!(resolve_nutrient(&mut conn, "Fat", " ").await.unwrap().is_none());
        assert!(
            resolve_ingredient(&mut conn, "\t", TriState::True, TriState::True)
                .await
                .unwrap()
                .is_none()
        );

        let brands: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM brands")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(brands, 0);
    }

    #[tokio::test]
    async fn tags_are_keyed_by_name_and_kind() {
        let pool = db::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let allergen = resolve_tag(&mut conn, "milk", TagKind::Allergen)
            .await
            .unwrap()
            .unwrap();
        let again = resolve_tag(&mut conn, "milk", TagKind::Allergen)
            .await
            .unwrap()
            .unwrap();
        let additive = resolve_tag(&mut conn, "milk", TagKind::Additive)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(allergen.entity.id, again.entity.id);
        assert_ne!(allergen.entity.id, additive.entity.id);
        assert_eq!(additive.resolution, Resolution::Created);
    }

    #[tokio::test]
    async fn nutrient_unit_conflict_keeps_stored_unit() {
        let pool = db::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let created = resolve_nutrient(&mut conn, "Fat", "g").await.unwrap().unwrap();
        let conflicting = resolve_nutrient(&mut conn, "Fat", "kg").await.unwrap().unwrap();

        assert_eq!(created.entity.id, conflicting.entity.id);
        assert_eq!(conflicting.entity.unit, "g");
        assert_eq!(
            conflicting.resolution,
            Resolution::Conflict(UnitConflict {
                nutrient: "Fat".into(),
                stored_unit: "g".into(),
                incoming_unit: "kg".into(),
            })
        );

        let stored: String = sqlx::query_scalar("SELECT unit FROM nutrients WHERE name = 'Fat'")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(stored, "g");
    }

    #[tokio::test]
    async fn ingredient_flags_refine_without_regressing() {
        let pool = db::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let created = resolve_ingredient(&mut conn, "sugar", TriState::Unknown, TriState::False)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.resolution, Resolution::Created);

        let refined = resolve_ingredient(&mut conn, "sugar", TriState::True, TriState::Unknown)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refined.resolution, Resolution::Updated);
        assert_eq!(refined.entity.id, created.entity.id);
        assert_eq!(refined.entity.vegan, TriState::True);
        assert_eq!(refined.entity.vegetarian, TriState::False);

        let (vegan, vegetarian): (Option<bool>, Option<bool>) =
            sqlx::query_as("SELECT vegan, vegetarian FROM ingredients WHERE name = 'sugar'")
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(vegan, Some(true));
        assert_eq!(vegetarian, Some(false));
    }

    #[tokio::test]
    async fn unknown_flags_leave_ingredient_untouched() {
        let pool = db::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        resolve_ingredient(&mut conn, "milk", TriState::False, TriState::True)
            .await
            .unwrap();
        let again = resolve_ingredient(&mut conn, " milk ", TriState::Unknown, TriState::True)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(again.resolution, Resolution::Existing);
        assert_eq!(again.entity.vegan, TriState::False);
        assert_eq!(again.entity.vegetarian, TriState::True);
    }
}

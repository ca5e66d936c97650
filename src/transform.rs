//! Raw upstream document → [`NormalizedRecord`].
//!
//! Pure mapping, no I/O. The whole record is rejected only when it has no
//! `product` object or no product code. Individual fields that fail to
//! parse are logged and dropped (or mapped to unknown) and the rest of the
//! record is kept.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{EtlError, Result};
use crate::models::{
    Grade, IngredientEntry, NormalizedRecord, NovaGroup, NutrientFact, ProductAttributes,
    TagKind, TagSpec, TriState,
};

/// Nutrient fields read from the product, with the name and unit they are
/// stored under.
pub const NUTRIENT_FIELDS: [(&str, &str, &str); 7] = [
    ("energy-kcal_100g", "Energy Kcal", "kcal"),
    ("fat_100g", "Fat", "g"),
    ("saturated-fat_100g", "Saturated fat", "g"),
    ("carbohydrates_100g", "Carbohydrates", "g"),
    ("sugars_100g", "Sugars", "g"),
    ("proteins_100g", "Proteins", "g"),
    ("sodium_100g", "Sodium", "g"),
];

/// Map one upstream document to a normalized record.
///
/// `requested_code` is the code that was fetched. If the document carries
/// a different code (barcode normalization upstream), the document's code
/// wins.
///
/// # Errors
///
/// [`EtlError::MalformedInput`] if the document has no `product` object or
/// the product has no code.
pub fn transform(raw: &Value, requested_code: &str) -> Result<NormalizedRecord> {
    let product = raw
        .get("product")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed(requested_code, "missing or non-object `product`"))?;

    let code = product
        .get("code")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| malformed(requested_code, "product has no `code`"))?;

    if code != requested_code {
        warn!(
            requested = requested_code,
            actual = code,
            "upstream code differs from requested code, using upstream code"
        );
    }

    info!(code, "transforming product");

    let attributes = ProductAttributes {
        code: code.to_string(),
        name: non_blank_str(product.get("product_name")),
        nutriscore: grade_field(product, "nutriscore_grade", code),
        ecoscore: grade_field(product, "ecoscore_grade", code),
        nova_group: nova_field(product, code),
    };

    let brand = match product.get("brands") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(other) => {
            warn!(code, value = %other, "`brands` is not a string, ignoring");
            None
        }
    };

    let categories = last_segments(product.get("categories_hierarchy"));

    let mut tags: Vec<TagSpec> = last_segments(product.get("allergens_tags"))
        .into_iter()
        .map(|name| TagSpec {
            name,
            kind: TagKind::Allergen,
        })
        .collect();
    tags.extend(
        last_segments(product.get("additives_tags"))
            .into_iter()
            .map(|name| TagSpec {
                name,
                kind: TagKind::Additive,
            }),
    );

    let nutrients = nutrient_facts(product, code);
    let ingredients = ingredient_entries(product.get("ingredients"), code);

    debug!(
        code,
        categories = categories.len(),
        tags = tags.len(),
        nutrients = nutrients.len(),
        ingredients = ingredients.len(),
        "transform complete"
    );

    Ok(NormalizedRecord {
        product: attributes,
        brand,
        categories,
        tags,
        nutrients,
        ingredients,
    })
}

fn malformed(code: &str, reason: &str) -> EtlError {
    warn!(code, reason, "rejecting upstream record");
    EtlError::MalformedInput {
        code: code.to_string(),
        reason: reason.to_string(),
    }
}

fn non_blank_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Interpret a JSON number or numeric string as `f64`.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn grade_field(product: &Map<String, Value>, field: &str, code: &str) -> Grade {
    match product.get(field) {
        None | Some(Value::Null) => Grade::Unknown,
        Some(value) => match value.as_str().and_then(Grade::parse) {
            Some(grade) => grade,
            None => {
                warn!(code, field, %value, "unrecognized grade, storing as unknown");
                Grade::Unknown
            }
        },
    }
}

fn nova_field(product: &Map<String, Value>, code: &str) -> NovaGroup {
    let value = match product.get("nova_group") {
        None | Some(Value::Null) => return NovaGroup::Unknown,
        Some(v) => v,
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed.and_then(NovaGroup::from_number) {
        Some(group) => group,
        None => {
            warn!(code, %value, "unrecognized nova_group, storing as unknown");
            NovaGroup::Unknown
        }
    }
}

/// Final colon-delimited segment of each string entry (`"en:sodas"` →
/// `"sodas"`). Empty segments and non-string entries are skipped.
fn last_segments(value: Option<&Value>) -> Vec<String> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|entry| entry.rsplit(':').next())
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn nutrient_facts(product: &Map<String, Value>, code: &str) -> Vec<NutrientFact> {
    let mut facts = Vec::new();
    for (field, name, unit) in NUTRIENT_FIELDS {
        let value = match product.get(field) {
            None | Some(Value::Null) => continue,
            Some(v) => v,
        };
        match as_number(value) {
            Some(quantity) => facts.push(NutrientFact {
                name: name.to_string(),
                unit: unit.to_string(),
                quantity,
            }),
            None => warn!(code, field, %value, "non-numeric nutrient value, skipping"),
        }
    }
    facts
}

fn ingredient_entries(value: Option<&Value>, code: &str) -> Vec<IngredientEntry> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            warn!(code, %entry, "ingredient entry is not an object, skipping");
            continue;
        };

        let Some(name) = non_blank_str(obj.get("text")) else {
            let id = obj.get("id").and_then(Value::as_str).unwrap_or("<no id>");
            warn!(code, ingredient_id = id, "ingredient has no text, skipping");
            continue;
        };

        let raw_quantity = match obj.get("percent") {
            None | Some(Value::Null) => obj.get("percent_estimate"),
            some => some,
        };
        let quantity = match raw_quantity {
            None | Some(Value::Null) => None,
            Some(v) => {
                let parsed = as_number(v);
                if parsed.is_none() {
                    warn!(code, ingredient = %name, value = %v, "invalid ingredient quantity");
                }
                parsed
            }
        };

        out.push(IngredientEntry {
            vegan: diet_flag(obj.get("vegan")),
            vegetarian: diet_flag(obj.get("vegetarian")),
            name,
            quantity,
        });
    }
    out
}

fn diet_flag(value: Option<&Value>) -> TriState {
    match value {
        Some(Value::String(s)) => {
            let flag = TriState::parse(s);
            if !flag.is_known() && s.eq_ignore_ascii_case("maybe") {
                debug!("diet flag 'maybe' treated as unknown");
            }
            flag
        }
        Some(Value::Bool(true)) => TriState::True,
        Some(Value::Bool(false)) => TriState::False,
        _ => TriState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(product: Value) -> Value {
        json!({ "status": 1, "product": product })
    }

    #[test]
    fn rejects_missing_product() {
        let err = transform(&json!({ "status": 0 }), "123").unwrap_err();
        assert!(matches!(err, EtlError::MalformedInput { .. }));

        let err = transform(&json!({ "product": "nope" }), "123").unwrap_err();
        assert!(matches!(err, EtlError::MalformedInput { .. }));

        let err = transform(&Value::Null, "123").unwrap_err();
        assert!(matches!(err, EtlError::MalformedInput { .. }));
    }

    #[test]
    fn rejects_product_without_code() {
        let err = transform(&doc(json!({ "product_name": "Nutella" })), "123").unwrap_err();
        assert!(err.to_string().contains("code"));

        let err = transform(&doc(json!({ "code": "  " })), "123").unwrap_err();
        assert!(matches!(err, EtlError::MalformedInput { .. }));
    }

    #[test]
    fn upstream_code_wins_over_requested() {
        let record = transform(&doc(json!({ "code": "0123" })), "123").unwrap();
        assert_eq!(record.product.code, "0123");
    }

    #[test]
    fn maps_grades_and_nova() {
        let record = transform(
            &doc(json!({
                "code": "1",
                "product_name": "Cola",
                "nutriscore_grade": "E",
                "ecoscore_grade": "not-applicable",
                "nova_group": 4
            })),
            "1",
        )
        .unwrap();
        assert_eq!(record.product.name.as_deref(), Some("Cola"));
        assert_eq!(record.product.nutriscore, Grade::E);
        assert_eq!(record.product.ecoscore, Grade::Unknown);
        assert_eq!(record.product.nova_group, NovaGroup::UltraProcessed);

        let record = transform(&doc(json!({ "code": "1", "nova_group": "2" })), "1").unwrap();
        assert_eq!(record.product.nova_group, NovaGroup::ProcessedIngredients);
        assert_eq!(record.product.nutriscore, Grade::Unknown);

        let record = transform(&doc(json!({ "code": "1", "nova_group": 9 })), "1").unwrap();
        assert_eq!(record.product.nova_group, NovaGroup::Unknown);
    }

    #[test]
    fn categories_take_last_path_segment() {
        let record = transform(
            &doc(json!({
                "code": "1",
                "categories_hierarchy": ["en:beverages", "en:sodas", "en:", 42]
            })),
            "1",
        )
        .unwrap();
        assert_eq!(record.categories, vec!["beverages", "sodas"]);
    }

    #[test]
    fn allergens_and_additives_become_tags() {
        let record = transform(
            &doc(json!({
                "code": "1",
                "allergens_tags": ["en:milk"],
                "additives_tags": ["en:e330"]
            })),
            "1",
        )
        .unwrap();
        assert_eq!(
            record.tags,
            vec![
                TagSpec {
                    name: "milk".into(),
                    kind: TagKind::Allergen
                },
                TagSpec {
                    name: "e330".into(),
                    kind: TagKind::Additive
                },
            ]
        );
    }

    #[test]
    fn nutrient_values_parse_or_are_skipped() {
        let record = transform(
            &doc(json!({
                "code": "1",
                "fat_100g": "12.5",
                "sugars_100g": 56.3,
                "proteins_100g": "n/a",
                "sodium_100g": null
            })),
            "1",
        )
        .unwrap();
        assert_eq!(
            record.nutrients,
            vec![
                NutrientFact {
                    name: "Fat".into(),
                    unit: "g".into(),
                    quantity: 12.5
                },
                NutrientFact {
                    name: "Sugars".into(),
                    unit: "g".into(),
                    quantity: 56.3
                },
            ]
        );

        let record = transform(&doc(json!({ "code": "1", "fat_100g": "n/a" })), "1").unwrap();
        assert!(record.nutrients.is_empty());
    }

    #[test]
    fn energy_is_stored_in_kcal() {
        let record = transform(&doc(json!({ "code": "1", "energy-kcal_100g": 539 })), "1").unwrap();
        assert_eq!(record.nutrients[0].name, "Energy Kcal");
        assert_eq!(record.nutrients[0].unit, "kcal");
        assert_eq!(record.nutrients[0].quantity, 539.0);
    }

    #[test]
    fn ingredients_need_text_and_fall_back_to_estimate() {
        let record = transform(
            &doc(json!({
                "code": "1",
                "ingredients": [
                    { "id": "en:sugar", "text": " Sugar ", "percent": 56.3, "vegan": "yes", "vegetarian": "yes" },
                    { "id": "en:palm-oil", "text": "Palm oil", "percent_estimate": "20.1", "vegan": "en:yes" },
                    { "id": "en:hazelnuts", "text": "Hazelnuts", "percent": "lots", "vegan": "maybe", "vegetarian": "no" },
                    { "id": "en:mystery" },
                    { "id": "en:blank", "text": "   " },
                    "not an object"
                ]
            })),
            "1",
        )
        .unwrap();

        assert_eq!(
            record.ingredients,
            vec![
                IngredientEntry {
                    name: "Sugar".into(),
                    vegan: TriState::True,
                    vegetarian: TriState::True,
                    quantity: Some(56.3),
                },
                IngredientEntry {
                    name: "Palm oil".into(),
                    vegan: TriState::True,
                    vegetarian: TriState::Unknown,
                    quantity: Some(20.1),
                },
                IngredientEntry {
                    name: "Hazelnuts".into(),
                    vegan: TriState::Unknown,
                    vegetarian: TriState::False,
                    quantity: None,
                },
            ]
        );
    }

    #[test]
    fn brand_must_be_a_non_blank_string() {
        let record = transform(&doc(json!({ "code": "1", "brands": "Ferrero" })), "1").unwrap();
        assert_eq!(record.brand.as_deref(), Some("Ferrero"));

        let record = transform(&doc(json!({ "code": "1", "brands": "" })), "1").unwrap();
        assert_eq!(record.brand, None);

        let record = transform(&doc(json!({ "code": "1", "brands": ["a"] })), "1").unwrap();
        assert_eq!(record.brand, None);
    }

    #[test]
    fn blank_product_name_is_stored_as_none() {
        let record = transform(&doc(json!({ "code": "1", "product_name": "   " })), "1").unwrap();
        assert_eq!(record.product.name, None);

        let record = transform(&doc(json!({ "code": "1", "product_name": " Nutella " })), "1").unwrap();
        assert_eq!(record.product.name.as_deref(), Some("Nutella"));
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::model::Ingredient;
use crate::normalize::canonical_key;
use crate::scope::{resolve_catalog, CatalogFilters};
use crate::AppResult;

/// A loose reference to an ingredient: anything from a fully linked
/// shopping item down to bare free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LooseIngredient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientResolution {
    pub changed: bool,
    pub items: Vec<LooseIngredient>,
}

fn record_canonical(record: &Ingredient) -> String {
    if record.canonical_name.is_empty() {
        canonical_key(&record.name)
    } else {
        record.canonical_name.clone()
    }
}

/// Resolve loose ingredient references against the household's effective
/// ingredient catalog.
///
/// Preference order per item: exact id match, then exact canonical-name
/// match, else unresolved (left untouched). Resolved items have their
/// `ingredient_id`, `canonical_name` and `category_id` synchronized to
/// the matched record; `changed` reports whether anything actually
/// differed. Safe to call repeatedly, including over persisted shopping
/// items whose linkage has drifted after catalog edits.
pub async fn resolve_ingredients(
    pool: &SqlitePool,
    items: Vec<LooseIngredient>,
    household_id: &str,
) -> AppResult<IngredientResolution> {
    let catalog =
        resolve_catalog::<Ingredient>(pool, household_id, &CatalogFilters::default()).await?;

    let mut by_id: HashMap<&str, &Ingredient> = HashMap::with_capacity(catalog.len());
    let mut by_canonical: HashMap<String, &Ingredient> = HashMap::with_capacity(catalog.len());
    for record in &catalog {
        by_id.insert(record.id.as_str(), record);
        // First record wins on canonical collisions so resolution is
        // deterministic in catalog order.
        by_canonical
            .entry(record_canonical(record))
            .or_insert(record);
    }

    let mut changed = false;
    let mut resolved = Vec::with_capacity(items.len());
    for mut item in items {
        let matched = item
            .ingredient_id
            .as_deref()
            .and_then(|id| by_id.get(id).copied())
            .or_else(|| {
                let key = item
                    .canonical_name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .or_else(|| item.display_name.as_deref().map(canonical_key))?;
                by_canonical.get(&key).copied()
            });

        if let Some(record) = matched {
            let canonical = record_canonical(record);
            if item.ingredient_id.as_deref() != Some(record.id.as_str()) {
                item.ingredient_id = Some(record.id.clone());
                changed = true;
            }
            if item.canonical_name.as_deref() != Some(canonical.as_str()) {
                item.canonical_name = Some(canonical);
                changed = true;
            }
            if item.category_id != record.category_id {
                item.category_id = record.category_id.clone();
                changed = true;
            }
        }
        resolved.push(item);
    }

    Ok(IngredientResolution {
        changed,
        items: resolved,
    })
}

use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::catalog::default_category;
use crate::error::is_unique_violation;
use crate::id::new_uuid_v7;
use crate::matcher::{resolve_ingredients, LooseIngredient};
use crate::model::{CatalogEntity, Dish, ItemStatus, ShoppingItem, ShoppingList, WeekDay};
use crate::normalize::canonical_key;
use crate::scope::{require_household, resolve_catalog, CatalogFilters};
use crate::time::{now_ms, week_start_str};
use crate::week_plan::fetch_week_plan;
use crate::{AppError, AppResult};

async fn read_list(
    pool: &SqlitePool,
    household_id: &str,
    week_key: &str,
) -> AppResult<Option<ShoppingList>> {
    let row = sqlx::query(
        "SELECT id, household_id, week_start, items_json, created_at, updated_at \
         FROM shopping_lists WHERE household_id = ? AND week_start = ?",
    )
    .bind(household_id)
    .bind(week_key)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)?;
    row.as_ref().map(ShoppingList::from_row).transpose()
}

async fn write_items(
    pool: &SqlitePool,
    list_id: &str,
    items: &[ShoppingItem],
    now: i64,
) -> AppResult<()> {
    let items_json = serde_json::to_string(items).map_err(AppError::from)?;
    sqlx::query("UPDATE shopping_lists SET items_json = ?, updated_at = ? WHERE id = ?")
        .bind(&items_json)
        .bind(now)
        .bind(list_id)
        .execute(pool)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

/// Get-or-create the household's list for a week, empty on first
/// creation. Same constraint-race handling as the week-plan gateway.
pub async fn ensure_shopping_list(
    pool: &SqlitePool,
    week_start: NaiveDate,
    household_id: &str,
) -> AppResult<ShoppingList> {
    let household_id = require_household(household_id)?;
    let week_key = week_start_str(week_start);

    if let Some(list) = read_list(pool, household_id, &week_key).await? {
        return Ok(list);
    }

    let id = new_uuid_v7();
    let now = now_ms();
    let insert = sqlx::query(
        "INSERT INTO shopping_lists (id, household_id, week_start, items_json, created_at, updated_at) \
         VALUES (?, ?, ?, '[]', ?, ?)",
    )
    .bind(&id)
    .bind(household_id)
    .bind(&week_key)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match insert {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {}
        Err(err) => {
            return Err(AppError::from(err)
                .with_context("operation", "create")
                .with_context("table", "shopping_lists".to_string())
                .with_context("household_id", household_id.to_string()))
        }
    }
    read_list(pool, household_id, &week_key).await?.ok_or_else(|| {
        AppError::new(
            "SHOPPING/INDEX_CONFLICT",
            "Shopping list uniqueness violated but no row is readable",
        )
        .with_context("household_id", household_id.to_string())
        .with_context("week_start", week_key)
    })
}

struct Contribution {
    display_name: String,
    canonical_name: String,
    quantity: Option<String>,
    unit: Option<String>,
    from_dish: Option<String>,
}

fn day_contributions(day: &WeekDay, dishes: &HashMap<&str, &Dish>) -> Vec<Contribution> {
    let mut out = Vec::new();
    for dish_id in [day.main_dish_id.as_deref(), day.side_dish_id.as_deref()]
        .into_iter()
        .flatten()
    {
        let Some(dish) = dishes.get(dish_id) else {
            // Archived or foreign dish reference; nothing to expand.
            tracing::debug!(
                target: "larder",
                event = "dish_unresolved",
                dish_id = dish_id,
            );
            continue;
        };
        for line in &dish.ingredients {
            let canonical = if line.canonical_name.is_empty() {
                canonical_key(&line.display_name)
            } else {
                line.canonical_name.clone()
            };
            out.push(Contribution {
                display_name: line.display_name.clone(),
                canonical_name: canonical,
                quantity: line.quantity.clone(),
                unit: line.unit.clone(),
                from_dish: Some(dish.id.clone()),
            });
        }
    }
    for ad_hoc in &day.overrides {
        let canonical = if ad_hoc.canonical_name.is_empty() {
            canonical_key(&ad_hoc.display_name)
        } else {
            ad_hoc.canonical_name.clone()
        };
        out.push(Contribution {
            display_name: ad_hoc.display_name.clone(),
            canonical_name: canonical,
            quantity: None,
            unit: None,
            from_dish: None,
        });
    }
    out
}

fn merge_contributions(contributions: Vec<Contribution>) -> Vec<ShoppingItem> {
    let mut items: Vec<ShoppingItem> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for contribution in contributions {
        let key = format!("name:{}", contribution.canonical_name);
        match index.get(&key) {
            Some(&slot) => {
                let item = &mut items[slot];
                item.occurrences += 1;
                if let Some(dish_id) = contribution.from_dish {
                    if !item.from_dishes.contains(&dish_id) {
                        item.from_dishes.push(dish_id);
                    }
                }
                // First-seen display name, quantity and unit win.
            }
            None => {
                index.insert(key, items.len());
                items.push(ShoppingItem {
                    ingredient_id: None,
                    category_id: None,
                    display_name: contribution.display_name,
                    canonical_name: contribution.canonical_name,
                    quantity: contribution.quantity,
                    unit: contribution.unit,
                    occurrences: 1,
                    from_dishes: contribution.from_dish.into_iter().collect(),
                    status: ItemStatus::Pending,
                    purchased_by: None,
                    purchased_at: None,
                    store_id: None,
                });
            }
        }
    }
    items
}

fn carry_purchase_state(items: &mut [ShoppingItem], previous: &[ShoppingItem]) {
    let prior: HashMap<String, &ShoppingItem> = previous
        .iter()
        .map(|item| (item.merge_key(), item))
        .collect();
    for item in items {
        if let Some(old) = prior.get(&item.merge_key()) {
            if old.status == ItemStatus::Purchased {
                item.status = ItemStatus::Purchased;
                item.purchased_by = old.purchased_by.clone();
                item.purchased_at = old.purchased_at;
                item.store_id = old.store_id.clone();
            }
        }
    }
}

/// Derive the week's consolidated list from the plan and persist it onto
/// the existing list row.
///
/// An absent plan is a normal state and yields an empty item set. Items
/// that keep their merge key across the rebuild keep their purchase
/// marks; keys that disappear lose them even if the key later returns.
pub async fn rebuild_shopping_list(
    pool: &SqlitePool,
    week_start: NaiveDate,
    household_id: &str,
) -> AppResult<ShoppingList> {
    let household_id = require_household(household_id)?;
    let mut list = ensure_shopping_list(pool, week_start, household_id).await?;

    let plan = fetch_week_plan(pool, week_start, household_id).await?;
    let mut items = match &plan {
        None => Vec::new(),
        Some(plan) => {
            let dishes =
                resolve_catalog::<Dish>(pool, household_id, &CatalogFilters::default()).await?;
            // Index by own id and by overridden master id, so a day that
            // still references the master picks up the override.
            let mut by_id: HashMap<&str, &Dish> = HashMap::with_capacity(dishes.len() * 2);
            for dish in &dishes {
                by_id.insert(dish.id(), dish);
                if let Some(master_id) = dish.provenance().master_id() {
                    by_id.insert(master_id, dish);
                }
            }

            let mut contributions = Vec::new();
            for day in &plan.days {
                contributions.extend(day_contributions(day, &by_id));
            }
            merge_contributions(contributions)
        }
    };

    // Attach ingredient and category linkage where resolvable.
    let loose: Vec<LooseIngredient> = items
        .iter()
        .map(|item| LooseIngredient {
            ingredient_id: item.ingredient_id.clone(),
            canonical_name: Some(item.canonical_name.clone()),
            display_name: Some(item.display_name.clone()),
            category_id: item.category_id.clone(),
        })
        .collect();
    let resolution = resolve_ingredients(pool, loose, household_id).await?;
    for (item, resolved) in items.iter_mut().zip(resolution.items) {
        item.ingredient_id = resolved.ingredient_id;
        if let Some(canonical) = resolved.canonical_name {
            item.canonical_name = canonical;
        }
        item.category_id = resolved.category_id;
    }

    // Uncategorized items land in the household's default bucket instead
    // of failing the read path.
    if items.iter().any(|item| item.category_id.is_none()) {
        let fallback = default_category(pool, household_id).await?;
        for item in items.iter_mut().filter(|item| item.category_id.is_none()) {
            item.category_id = Some(fallback.id.clone());
        }
    }

    carry_purchase_state(&mut items, &list.items);

    let now = now_ms();
    write_items(pool, &list.id, &items, now).await?;
    tracing::info!(
        target: "larder",
        event = "shopping_list_rebuilt",
        household_id = household_id,
        week_start = %list.week_start,
        items = items.len(),
    );
    list.items = items;
    list.updated_at = now;
    Ok(list)
}

/// Flip one item's purchase state by merge key.
///
/// Transitioning to purchased stamps `purchased_at` and records the
/// buyer and store; reverting to pending clears all three.
pub async fn set_item_status(
    pool: &SqlitePool,
    week_start: NaiveDate,
    household_id: &str,
    merge_key: &str,
    status: ItemStatus,
    purchased_by: Option<String>,
    store_id: Option<String>,
) -> AppResult<ShoppingList> {
    let household_id = require_household(household_id)?;
    let week_key = week_start_str(week_start);
    let mut list = read_list(pool, household_id, &week_key)
        .await?
        .ok_or_else(|| {
            AppError::new("SHOPPING/NOT_FOUND", "Shopping list not found")
                .with_context("household_id", household_id.to_string())
                .with_context("week_start", week_key.clone())
        })?;

    let item = list
        .items
        .iter_mut()
        .find(|item| item.merge_key() == merge_key)
        .ok_or_else(|| {
            AppError::new("SHOPPING/ITEM_NOT_FOUND", "Shopping item not found")
                .with_context("merge_key", merge_key.to_string())
                .with_context("week_start", week_key.clone())
        })?;

    let now = now_ms();
    match status {
        ItemStatus::Purchased => {
            item.status = ItemStatus::Purchased;
            item.purchased_by = purchased_by;
            item.purchased_at = Some(now);
            item.store_id = store_id;
        }
        ItemStatus::Pending => {
            item.status = ItemStatus::Pending;
            item.purchased_by = None;
            item.purchased_at = None;
            item.store_id = None;
        }
    }

    write_items(pool, &list.id, &list.items, now).await?;
    list.updated_at = now;
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(canonical: &str, ingredient_id: Option<&str>, status: ItemStatus) -> ShoppingItem {
        ShoppingItem {
            ingredient_id: ingredient_id.map(str::to_string),
            category_id: None,
            display_name: canonical.to_string(),
            canonical_name: canonical.to_string(),
            quantity: None,
            unit: None,
            occurrences: 1,
            from_dishes: vec![],
            status,
            purchased_by: None,
            purchased_at: None,
            store_id: None,
        }
    }

    #[test]
    fn merge_counts_occurrences_and_unions_dishes() {
        let contributions = vec![
            Contribution {
                display_name: "Arroz".into(),
                canonical_name: "arroz".into(),
                quantity: Some("200".into()),
                unit: Some("g".into()),
                from_dish: Some("dish-a".into()),
            },
            Contribution {
                display_name: "arroz blanco".into(),
                canonical_name: "arroz".into(),
                quantity: None,
                unit: None,
                from_dish: Some("dish-b".into()),
            },
            Contribution {
                display_name: "arroz".into(),
                canonical_name: "arroz".into(),
                quantity: None,
                unit: None,
                from_dish: Some("dish-a".into()),
            },
        ];
        let items = merge_contributions(contributions);
        assert_eq!(items.len(), 1);
        let merged = &items[0];
        assert_eq!(merged.occurrences, 3);
        assert_eq!(merged.from_dishes, vec!["dish-a", "dish-b"]);
        // First-seen display form and quantity survive later duplicates.
        assert_eq!(merged.display_name, "Arroz");
        assert_eq!(merged.quantity.as_deref(), Some("200"));
    }

    #[test]
    fn purchase_state_carries_by_merge_key() {
        let mut previous = item("arroz", None, ItemStatus::Purchased);
        previous.purchased_by = Some("ana".into());
        previous.purchased_at = Some(42);
        let previous = vec![previous, item("pollo", None, ItemStatus::Pending)];

        let mut rebuilt = vec![
            item("arroz", None, ItemStatus::Pending),
            item("pollo", None, ItemStatus::Pending),
            item("cebolla", None, ItemStatus::Pending),
        ];
        carry_purchase_state(&mut rebuilt, &previous);

        assert_eq!(rebuilt[0].status, ItemStatus::Purchased);
        assert_eq!(rebuilt[0].purchased_by.as_deref(), Some("ana"));
        assert_eq!(rebuilt[0].purchased_at, Some(42));
        assert_eq!(rebuilt[1].status, ItemStatus::Pending);
        assert_eq!(rebuilt[2].status, ItemStatus::Pending);
    }

    #[test]
    fn purchase_state_does_not_carry_across_key_change() {
        // The old mark was keyed by canonical name; the rebuilt item is
        // now linked to an ingredient id, so the keys no longer agree.
        let previous = vec![item("arroz", None, ItemStatus::Purchased)];
        let mut rebuilt = vec![item("arroz", Some("ing-1"), ItemStatus::Pending)];
        carry_purchase_state(&mut rebuilt, &previous);
        assert_eq!(rebuilt[0].status, ItemStatus::Pending);
    }
}

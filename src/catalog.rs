use sqlx::SqlitePool;

use crate::id::new_uuid_v7;
use crate::model::{CatalogEntity, Category, Dish, DishIngredient, Ingredient, Provenance};
use crate::normalize::{canonical_key, normalize_name, slugify};
use crate::scope::{require_household, unhide_master};
use crate::time::now_ms;
use crate::{AppError, AppResult};

const DEFAULT_CATEGORY_NAME: &str = "Uncategorized";
const DEFAULT_CATEGORY_SLUG: &str = "uncategorized";
const DEFAULT_COLOR: &str = "#9AA0A6";

#[derive(Debug, Clone)]
pub struct CategoryInput {
    pub name: String,
    pub color: Option<String>,
    pub position: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IngredientInput {
    pub name: String,
    pub category_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DishInput {
    pub name: String,
    pub ingredients: Vec<DishIngredient>,
}

pub async fn fetch_entity<E: CatalogEntity>(pool: &SqlitePool, id: &str) -> AppResult<Option<E>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ? AND deleted_at IS NULL",
        E::columns(),
        E::KIND.table(),
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)?;
    row.as_ref().map(E::from_row).transpose()
}

async fn require_master<E: CatalogEntity>(pool: &SqlitePool, master_id: &str) -> AppResult<E> {
    let entity = fetch_entity::<E>(pool, master_id).await?.ok_or_else(|| {
        AppError::new("CATALOG/NOT_FOUND", "Master entity not found")
            .with_context("kind", E::KIND.to_string())
            .with_context("master_id", master_id.to_string())
    })?;
    if !matches!(entity.provenance(), Provenance::Master) {
        return Err(
            AppError::new("CATALOG/NOT_A_MASTER", "Entity is not master-scoped")
                .with_context("kind", E::KIND.to_string())
                .with_context("id", master_id.to_string()),
        );
    }
    Ok(entity)
}

async fn live_override_id<E: CatalogEntity>(
    pool: &SqlitePool,
    household_id: &str,
    master_id: &str,
) -> AppResult<Option<String>> {
    let sql = format!(
        "SELECT id FROM {} WHERE scope = 'override' AND household_id = ? AND master_id = ? \
         AND deleted_at IS NULL",
        E::KIND.table(),
    );
    sqlx::query_scalar(&sql)
        .bind(household_id)
        .bind(master_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)
}

// -- categories ---------------------------------------------------------

async fn insert_category(
    pool: &SqlitePool,
    provenance: &Provenance,
    input: &CategoryInput,
    is_default: bool,
) -> AppResult<Category> {
    let _ = normalize_name(&input.name)?;
    let id = new_uuid_v7();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO categories \
         (id, household_id, master_id, scope, name, slug, color, position, is_default, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(provenance.household_id())
    .bind(provenance.master_id())
    .bind(provenance.scope_str())
    .bind(input.name.trim())
    .bind(slugify(&input.name))
    .bind(input.color.as_deref().unwrap_or(DEFAULT_COLOR))
    .bind(input.position.unwrap_or(0))
    .bind(is_default as i64)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    fetch_entity::<Category>(pool, &id)
        .await?
        .ok_or_else(|| AppError::new("CATALOG/NOT_FOUND", "Category not found after insert"))
}

pub async fn create_master_category(
    pool: &SqlitePool,
    input: CategoryInput,
) -> AppResult<Category> {
    insert_category(pool, &Provenance::Master, &input, false).await
}

pub async fn create_custom_category(
    pool: &SqlitePool,
    household_id: &str,
    input: CategoryInput,
) -> AppResult<Category> {
    let household_id = require_household(household_id)?;
    let provenance = Provenance::Household {
        household_id: household_id.to_string(),
    };
    insert_category(pool, &provenance, &input, false).await
}

async fn update_category_override(
    pool: &SqlitePool,
    id: &str,
    input: &CategoryInput,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE categories SET name = ?, slug = ?, color = COALESCE(?, color), \
         position = COALESCE(?, position), updated_at = ? WHERE id = ?",
    )
    .bind(input.name.trim())
    .bind(slugify(&input.name))
    .bind(input.color.as_deref())
    .bind(input.position)
    .bind(now_ms())
    .bind(id)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

/// First household-scoped edit of a master category creates an override;
/// later edits update it in place. A fresh override clears any hide
/// marker for the master.
pub async fn upsert_category_override(
    pool: &SqlitePool,
    household_id: &str,
    master_id: &str,
    input: CategoryInput,
) -> AppResult<Category> {
    let household_id = require_household(household_id)?;
    let _ = normalize_name(&input.name)?;
    require_master::<Category>(pool, master_id).await?;

    if let Some(id) = live_override_id::<Category>(pool, household_id, master_id).await? {
        update_category_override(pool, &id, &input).await?;
        return fetch_entity::<Category>(pool, &id)
            .await?
            .ok_or_else(|| AppError::new("CATALOG/NOT_FOUND", "Override not found after update"));
    }

    let provenance = Provenance::Override {
        household_id: household_id.to_string(),
        master_id: master_id.to_string(),
    };
    match insert_category(pool, &provenance, &input, false).await {
        Ok(created) => {
            unhide_master(pool, household_id, Category::KIND, master_id).await?;
            Ok(created)
        }
        // A concurrent creator won the partial unique index; fold our
        // edit into the surviving row.
        Err(err) if err.is_unique_violation() => {
            let id = live_override_id::<Category>(pool, household_id, master_id)
                .await?
                .ok_or(err)?;
            update_category_override(pool, &id, &input).await?;
            fetch_entity::<Category>(pool, &id).await?.ok_or_else(|| {
                AppError::new("CATALOG/NOT_FOUND", "Override not found after update")
            })
        }
        Err(err) => Err(err),
    }
}

/// Find-or-create the household's fallback category for items that have
/// no category assigned. Idempotent: repeated calls return the same row.
pub async fn default_category(pool: &SqlitePool, household_id: &str) -> AppResult<Category> {
    let household_id = require_household(household_id)?;
    let row = sqlx::query(&format!(
        "SELECT {} FROM categories WHERE scope = 'household' AND household_id = ? \
         AND is_default = 1 AND deleted_at IS NULL LIMIT 1",
        Category::columns(),
    ))
    .bind(household_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)?;
    if let Some(row) = row {
        return Category::from_row(&row);
    }

    let provenance = Provenance::Household {
        household_id: household_id.to_string(),
    };
    let input = CategoryInput {
        name: DEFAULT_CATEGORY_NAME.to_string(),
        color: None,
        position: Some(i64::from(i32::MAX)),
    };
    let created = insert_category(pool, &provenance, &input, true).await?;
    debug_assert_eq!(created.slug, DEFAULT_CATEGORY_SLUG);
    tracing::info!(
        target: "larder",
        event = "default_category_created",
        household_id = household_id,
        id = %created.id,
    );
    Ok(created)
}

// -- ingredients --------------------------------------------------------

async fn insert_ingredient(
    pool: &SqlitePool,
    provenance: &Provenance,
    input: &IngredientInput,
) -> AppResult<Ingredient> {
    let canonical = normalize_name(&input.name)?;
    let id = new_uuid_v7();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO ingredients \
         (id, household_id, master_id, scope, name, canonical_name, category_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(provenance.household_id())
    .bind(provenance.master_id())
    .bind(provenance.scope_str())
    .bind(input.name.trim())
    .bind(&canonical)
    .bind(input.category_id.as_deref())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    fetch_entity::<Ingredient>(pool, &id)
        .await?
        .ok_or_else(|| AppError::new("CATALOG/NOT_FOUND", "Ingredient not found after insert"))
}

pub async fn create_master_ingredient(
    pool: &SqlitePool,
    input: IngredientInput,
) -> AppResult<Ingredient> {
    insert_ingredient(pool, &Provenance::Master, &input).await
}

pub async fn create_custom_ingredient(
    pool: &SqlitePool,
    household_id: &str,
    input: IngredientInput,
) -> AppResult<Ingredient> {
    let household_id = require_household(household_id)?;
    let provenance = Provenance::Household {
        household_id: household_id.to_string(),
    };
    insert_ingredient(pool, &provenance, &input).await
}

async fn update_ingredient_override(
    pool: &SqlitePool,
    id: &str,
    input: &IngredientInput,
    canonical: &str,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE ingredients SET name = ?, canonical_name = ?, category_id = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(input.name.trim())
    .bind(canonical)
    .bind(input.category_id.as_deref())
    .bind(now_ms())
    .bind(id)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

pub async fn upsert_ingredient_override(
    pool: &SqlitePool,
    household_id: &str,
    master_id: &str,
    input: IngredientInput,
) -> AppResult<Ingredient> {
    let household_id = require_household(household_id)?;
    let canonical = normalize_name(&input.name)?;
    require_master::<Ingredient>(pool, master_id).await?;

    if let Some(id) = live_override_id::<Ingredient>(pool, household_id, master_id).await? {
        update_ingredient_override(pool, &id, &input, &canonical).await?;
        return fetch_entity::<Ingredient>(pool, &id)
            .await?
            .ok_or_else(|| AppError::new("CATALOG/NOT_FOUND", "Override not found after update"));
    }

    let provenance = Provenance::Override {
        household_id: household_id.to_string(),
        master_id: master_id.to_string(),
    };
    match insert_ingredient(pool, &provenance, &input).await {
        Ok(created) => {
            unhide_master(pool, household_id, Ingredient::KIND, master_id).await?;
            Ok(created)
        }
        Err(err) if err.is_unique_violation() => {
            let id = live_override_id::<Ingredient>(pool, household_id, master_id)
                .await?
                .ok_or(err)?;
            update_ingredient_override(pool, &id, &input, &canonical).await?;
            fetch_entity::<Ingredient>(pool, &id).await?.ok_or_else(|| {
                AppError::new("CATALOG/NOT_FOUND", "Override not found after update")
            })
        }
        Err(err) => Err(err),
    }
}

// -- dishes -------------------------------------------------------------

fn canonicalized_dish_ingredients(ingredients: &[DishIngredient]) -> Vec<DishIngredient> {
    ingredients
        .iter()
        .map(|line| {
            let canonical = if line.canonical_name.is_empty() {
                canonical_key(&line.display_name)
            } else {
                line.canonical_name.clone()
            };
            DishIngredient {
                display_name: line.display_name.clone(),
                canonical_name: canonical,
                quantity: line.quantity.clone(),
                unit: line.unit.clone(),
            }
        })
        .collect()
}

async fn insert_dish(
    pool: &SqlitePool,
    provenance: &Provenance,
    input: &DishInput,
) -> AppResult<Dish> {
    let _ = normalize_name(&input.name)?;
    let ingredients = canonicalized_dish_ingredients(&input.ingredients);
    let ingredients_json = serde_json::to_string(&ingredients).map_err(AppError::from)?;
    let id = new_uuid_v7();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO dishes \
         (id, household_id, master_id, scope, name, ingredients_json, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(provenance.household_id())
    .bind(provenance.master_id())
    .bind(provenance.scope_str())
    .bind(input.name.trim())
    .bind(&ingredients_json)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    fetch_entity::<Dish>(pool, &id)
        .await?
        .ok_or_else(|| AppError::new("CATALOG/NOT_FOUND", "Dish not found after insert"))
}

pub async fn create_master_dish(pool: &SqlitePool, input: DishInput) -> AppResult<Dish> {
    insert_dish(pool, &Provenance::Master, &input).await
}

pub async fn create_custom_dish(
    pool: &SqlitePool,
    household_id: &str,
    input: DishInput,
) -> AppResult<Dish> {
    let household_id = require_household(household_id)?;
    let provenance = Provenance::Household {
        household_id: household_id.to_string(),
    };
    insert_dish(pool, &provenance, &input).await
}

async fn update_dish_override(pool: &SqlitePool, id: &str, input: &DishInput) -> AppResult<()> {
    let ingredients = canonicalized_dish_ingredients(&input.ingredients);
    let ingredients_json = serde_json::to_string(&ingredients).map_err(AppError::from)?;
    sqlx::query("UPDATE dishes SET name = ?, ingredients_json = ?, updated_at = ? WHERE id = ?")
        .bind(input.name.trim())
        .bind(&ingredients_json)
        .bind(now_ms())
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

pub async fn upsert_dish_override(
    pool: &SqlitePool,
    household_id: &str,
    master_id: &str,
    input: DishInput,
) -> AppResult<Dish> {
    let household_id = require_household(household_id)?;
    let _ = normalize_name(&input.name)?;
    require_master::<Dish>(pool, master_id).await?;

    if let Some(id) = live_override_id::<Dish>(pool, household_id, master_id).await? {
        update_dish_override(pool, &id, &input).await?;
        return fetch_entity::<Dish>(pool, &id)
            .await?
            .ok_or_else(|| AppError::new("CATALOG/NOT_FOUND", "Override not found after update"));
    }

    let provenance = Provenance::Override {
        household_id: household_id.to_string(),
        master_id: master_id.to_string(),
    };
    match insert_dish(pool, &provenance, &input).await {
        Ok(created) => {
            unhide_master(pool, household_id, Dish::KIND, master_id).await?;
            Ok(created)
        }
        Err(err) if err.is_unique_violation() => {
            let id = live_override_id::<Dish>(pool, household_id, master_id)
                .await?
                .ok_or(err)?;
            update_dish_override(pool, &id, &input).await?;
            fetch_entity::<Dish>(pool, &id)
                .await?
                .ok_or_else(|| AppError::new("CATALOG/NOT_FOUND", "Override not found after update"))
        }
        Err(err) => Err(err),
    }
}

// -- deletion -----------------------------------------------------------

/// Delete path for catalog entities, scoped to a household.
///
/// Deleting a master the household does not own records a hide marker.
/// Deleting the household's own row (custom or override) archives it.
/// Another household's rows are reported as not found rather than leaked.
pub async fn delete_entity<E: CatalogEntity>(
    pool: &SqlitePool,
    household_id: &str,
    id: &str,
) -> AppResult<()> {
    let household_id = require_household(household_id)?;
    let entity = fetch_entity::<E>(pool, id).await?.ok_or_else(|| {
        AppError::new("CATALOG/NOT_FOUND", "Entity not found")
            .with_context("kind", E::KIND.to_string())
            .with_context("id", id.to_string())
    })?;

    match entity.provenance() {
        Provenance::Master => crate::scope::hide_master(pool, household_id, E::KIND, id).await,
        Provenance::Override {
            household_id: owner,
            ..
        }
        | Provenance::Household {
            household_id: owner,
        } if owner == household_id => {
            let now = now_ms();
            let sql = format!(
                "UPDATE {} SET deleted_at = ?, updated_at = ? WHERE id = ?",
                E::KIND.table()
            );
            sqlx::query(&sql)
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map_err(AppError::from)?;
            tracing::info!(
                target: "larder",
                event = "entity_archived",
                kind = %E::KIND,
                household_id = household_id,
                id = id,
            );
            Ok(())
        }
        _ => Err(AppError::new("CATALOG/NOT_FOUND", "Entity not found")
            .with_context("kind", E::KIND.to_string())
            .with_context("id", id.to_string())),
    }
}

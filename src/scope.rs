use std::collections::{HashMap, HashSet};

use sqlx::SqlitePool;

use crate::id::new_uuid_v7;
use crate::model::{CatalogEntity, CatalogKind};
use crate::time::now_ms;
use crate::{AppError, AppResult};

/// Optional kind-specific narrowing applied to masters and household
/// customs. Overrides are always fetched unfiltered so a substituted
/// master is never lost to a filter mismatch.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilters {
    /// Ingredients only: restrict to one category.
    pub category_id: Option<String>,
    /// Categories only: restrict to one slug.
    pub slug: Option<String>,
}

pub fn require_household(household_id: &str) -> AppResult<&str> {
    let trimmed = household_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::new(
            "VALIDATION/HOUSEHOLD_REQUIRED",
            "household_id is required",
        ));
    }
    Ok(trimmed)
}

fn filter_sql<E: CatalogEntity>(filters: &CatalogFilters) -> (String, Vec<String>) {
    let mut clauses = String::new();
    let mut binds = Vec::new();
    match E::KIND {
        CatalogKind::Ingredient => {
            if let Some(category_id) = &filters.category_id {
                clauses.push_str(" AND category_id = ?");
                binds.push(category_id.clone());
            }
        }
        CatalogKind::Category => {
            if let Some(slug) = &filters.slug {
                clauses.push_str(" AND slug = ?");
                binds.push(slug.clone());
            }
        }
        CatalogKind::Dish => {}
    }
    (clauses, binds)
}

async fn fetch_masters<E: CatalogEntity>(
    pool: &SqlitePool,
    filters: &CatalogFilters,
) -> AppResult<Vec<E>> {
    let (clauses, binds) = filter_sql::<E>(filters);
    let sql = format!(
        "SELECT {} FROM {} WHERE scope = 'master' AND deleted_at IS NULL{} ORDER BY {}",
        E::columns(),
        E::KIND.table(),
        clauses,
        E::sort_sql(),
    );
    let mut query = sqlx::query(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.fetch_all(pool).await.map_err(AppError::from)?;
    rows.iter().map(E::from_row).collect()
}

async fn fetch_overrides<E: CatalogEntity>(
    pool: &SqlitePool,
    household_id: &str,
) -> AppResult<HashMap<String, E>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE scope = 'override' AND household_id = ? AND deleted_at IS NULL",
        E::columns(),
        E::KIND.table(),
    );
    let rows = sqlx::query(&sql)
        .bind(household_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)?;
    let mut by_master = HashMap::with_capacity(rows.len());
    for row in &rows {
        let entity = E::from_row(row)?;
        let master_id = entity
            .provenance()
            .master_id()
            .ok_or_else(|| {
                AppError::new("CATALOG/SCOPE_INVALID", "Override row lacks master_id")
                    .with_context("id", entity.id().to_string())
            })?
            .to_string();
        by_master.insert(master_id, entity);
    }
    Ok(by_master)
}

async fn fetch_customs<E: CatalogEntity>(
    pool: &SqlitePool,
    household_id: &str,
    filters: &CatalogFilters,
) -> AppResult<Vec<E>> {
    let (clauses, binds) = filter_sql::<E>(filters);
    let sql = format!(
        "SELECT {} FROM {} WHERE scope = 'household' AND household_id = ? AND deleted_at IS NULL{} ORDER BY {}",
        E::columns(),
        E::KIND.table(),
        clauses,
        E::sort_sql(),
    );
    let mut query = sqlx::query(&sql).bind(household_id);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.fetch_all(pool).await.map_err(AppError::from)?;
    rows.iter().map(E::from_row).collect()
}

async fn fetch_hidden(
    pool: &SqlitePool,
    household_id: &str,
    kind: CatalogKind,
) -> AppResult<HashSet<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT master_id FROM hidden_masters WHERE household_id = ? AND kind = ?",
    )
    .bind(household_id)
    .bind(kind.as_str())
    .fetch_all(pool)
    .await
    .map_err(AppError::from)?;
    Ok(rows.into_iter().map(|(master_id,)| master_id).collect())
}

/// Effective per-household view of one catalog kind.
///
/// For each live master: hidden masters are dropped, overridden masters
/// are substituted by the household's override, the rest pass through.
/// Household customs are appended unchanged. The output never contains
/// both a master and its override.
pub async fn resolve_catalog<E: CatalogEntity>(
    pool: &SqlitePool,
    household_id: &str,
    filters: &CatalogFilters,
) -> AppResult<Vec<E>> {
    let household_id = require_household(household_id)?;

    let masters = fetch_masters::<E>(pool, filters).await?;
    let mut overrides = fetch_overrides::<E>(pool, household_id).await?;
    let customs = fetch_customs::<E>(pool, household_id, filters).await?;
    let hidden = fetch_hidden(pool, household_id, E::KIND).await?;

    let mut resolved = Vec::with_capacity(masters.len() + customs.len());
    for master in masters {
        if hidden.contains(master.id()) {
            continue;
        }
        match overrides.remove(master.id()) {
            Some(replacement) => resolved.push(replacement),
            None => resolved.push(master),
        }
    }
    resolved.extend(customs);

    tracing::debug!(
        target: "larder",
        event = "catalog_resolved",
        kind = %E::KIND,
        household_id = household_id,
        count = resolved.len(),
    );
    Ok(resolved)
}

/// Record that a household removed a master entity from its view.
/// Idempotent: re-hiding an already hidden master is a no-op.
pub async fn hide_master(
    pool: &SqlitePool,
    household_id: &str,
    kind: CatalogKind,
    master_id: &str,
) -> AppResult<()> {
    let household_id = require_household(household_id)?;
    let now = now_ms();
    sqlx::query(
        "INSERT OR IGNORE INTO hidden_masters (id, household_id, kind, master_id, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_uuid_v7())
    .bind(household_id)
    .bind(kind.as_str())
    .bind(master_id)
    .bind(now)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    tracing::info!(
        target: "larder",
        event = "master_hidden",
        kind = %kind,
        household_id = household_id,
        master_id = master_id,
    );
    Ok(())
}

/// Clear a hide marker. Idempotent; also invoked automatically when an
/// override is freshly created for the master, since an explicit edit
/// supersedes a hide.
pub async fn unhide_master(
    pool: &SqlitePool,
    household_id: &str,
    kind: CatalogKind,
    master_id: &str,
) -> AppResult<()> {
    let household_id = require_household(household_id)?;
    let res = sqlx::query(
        "DELETE FROM hidden_masters WHERE household_id = ? AND kind = ? AND master_id = ?",
    )
    .bind(household_id)
    .bind(kind.as_str())
    .bind(master_id)
    .execute(pool)
    .await
    .map_err(AppError::from)?;
    if res.rows_affected() > 0 {
        tracing::info!(
            target: "larder",
            event = "master_unhidden",
            kind = %kind,
            household_id = household_id,
            master_id = master_id,
        );
    }
    Ok(())
}

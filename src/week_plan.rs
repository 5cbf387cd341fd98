use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::error::is_unique_violation;
use crate::id::new_uuid_v7;
use crate::model::{PlanDay, WeekDay, WeekPlan};
use crate::scope::require_household;
use crate::time::{now_ms, week_start_str};
use crate::{AppError, AppResult};

pub const DEFAULT_SERVINGS: i64 = 2;
pub const DEFAULT_COOK_TIME: &str = "18:00";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekPlanOutcome {
    pub plan: WeekPlan,
    pub created: bool,
}

/// The fixed day entries every plan starts with: one per working day,
/// default servings and cook timing, nothing assigned.
pub fn default_days() -> Vec<WeekDay> {
    PlanDay::ALL
        .into_iter()
        .map(|day| WeekDay {
            day,
            cook: None,
            servings: DEFAULT_SERVINGS,
            cook_time: DEFAULT_COOK_TIME.to_string(),
            main_dish_id: None,
            side_dish_id: None,
            overrides: Vec::new(),
        })
        .collect()
}

async fn read_plan(
    pool: &SqlitePool,
    household_id: &str,
    week_key: &str,
) -> AppResult<Option<WeekPlan>> {
    let row = sqlx::query(
        "SELECT id, household_id, week_start, days_json, created_at, updated_at \
         FROM week_plans WHERE household_id = ? AND week_start = ?",
    )
    .bind(household_id)
    .bind(week_key)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)?;
    row.as_ref().map(WeekPlan::from_row).transpose()
}

/// Load a household's plan for the week containing `week_start`, if any.
pub async fn fetch_week_plan(
    pool: &SqlitePool,
    week_start: NaiveDate,
    household_id: &str,
) -> AppResult<Option<WeekPlan>> {
    let household_id = require_household(household_id)?;
    read_plan(pool, household_id, &week_start_str(week_start)).await
}

/// Idempotent get-or-create keyed by `(household_id, week_start)`.
///
/// A lost creation race surfaces as a uniqueness violation; the gateway
/// then re-reads once. If the row still cannot be found the distinct
/// `WEEKPLAN/INDEX_CONFLICT` error is raised instead of retrying
/// indefinitely.
pub async fn get_or_create_week_plan(
    pool: &SqlitePool,
    week_start: NaiveDate,
    household_id: &str,
) -> AppResult<WeekPlanOutcome> {
    let household_id = require_household(household_id)?;
    let week_key = week_start_str(week_start);

    if let Some(plan) = read_plan(pool, household_id, &week_key).await? {
        return Ok(WeekPlanOutcome {
            plan,
            created: false,
        });
    }

    let id = new_uuid_v7();
    let now = now_ms();
    let days_json = serde_json::to_string(&default_days()).map_err(AppError::from)?;
    let insert = sqlx::query(
        "INSERT INTO week_plans (id, household_id, week_start, days_json, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(household_id)
    .bind(&week_key)
    .bind(&days_json)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match insert {
        Ok(_) => {
            tracing::info!(
                target: "larder",
                event = "week_plan_created",
                household_id = household_id,
                week_start = %week_key,
            );
            let plan = read_plan(pool, household_id, &week_key)
                .await?
                .ok_or_else(|| {
                    AppError::new("WEEKPLAN/INDEX_CONFLICT", "Week plan vanished after insert")
                        .with_context("household_id", household_id.to_string())
                        .with_context("week_start", week_key.clone())
                })?;
            Ok(WeekPlanOutcome {
                plan,
                created: true,
            })
        }
        Err(err) if is_unique_violation(&err) => {
            // A concurrent creator won; their row is the plan.
            match read_plan(pool, household_id, &week_key).await? {
                Some(plan) => Ok(WeekPlanOutcome {
                    plan,
                    created: false,
                }),
                None => Err(AppError::new(
                    "WEEKPLAN/INDEX_CONFLICT",
                    "Week plan uniqueness violated but no row is readable",
                )
                .with_context("household_id", household_id.to_string())
                .with_context("week_start", week_key)
                .with_cause(AppError::from(err))),
            }
        }
        Err(err) => Err(AppError::from(err)
            .with_context("operation", "create")
            .with_context("table", "week_plans".to_string())
            .with_context("household_id", household_id.to_string())),
    }
}

/// Persist edited day entries. Last write wins on the single row; the
/// fixed day-array shape is preserved by construction.
pub async fn save_week_plan(pool: &SqlitePool, plan: &WeekPlan) -> AppResult<WeekPlan> {
    let days_json = serde_json::to_string(&plan.days).map_err(AppError::from)?;
    let now = now_ms();
    let res = sqlx::query("UPDATE week_plans SET days_json = ?, updated_at = ? WHERE id = ?")
        .bind(&days_json)
        .bind(now)
        .bind(&plan.id)
        .execute(pool)
        .await
        .map_err(AppError::from)?;
    if res.rows_affected() == 0 {
        return Err(AppError::new("WEEKPLAN/NOT_FOUND", "Week plan not found")
            .with_context("id", plan.id.clone()));
    }
    read_plan(pool, &plan.household_id, &plan.week_start)
        .await?
        .ok_or_else(|| {
            AppError::new("WEEKPLAN/NOT_FOUND", "Week plan not found after save")
                .with_context("id", plan.id.clone())
        })
}

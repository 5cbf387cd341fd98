use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{AppError, AppResult};

/// The three catalog kinds the scope resolver works over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Category,
    Ingredient,
    Dish,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 3] = [
        CatalogKind::Category,
        CatalogKind::Ingredient,
        CatalogKind::Dish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Category => "category",
            CatalogKind::Ingredient => "ingredient",
            CatalogKind::Dish => "dish",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            CatalogKind::Category => "categories",
            CatalogKind::Ingredient => "ingredients",
            CatalogKind::Dish => "dishes",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown catalog kind: {0}")]
pub struct ParseCatalogKindError(String);

impl FromStr for CatalogKind {
    type Err = ParseCatalogKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category" => Ok(CatalogKind::Category),
            "ingredient" => Ok(CatalogKind::Ingredient),
            "dish" => Ok(CatalogKind::Dish),
            other => Err(ParseCatalogKindError(other.to_string())),
        }
    }
}

/// Which tier a catalog row belongs to. The tag carries only the fields
/// valid for it: masters are global, overrides always point back at a
/// master, household customs belong to exactly one household.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Provenance {
    Master,
    Override {
        household_id: String,
        master_id: String,
    },
    Household {
        household_id: String,
    },
}

impl Provenance {
    pub fn scope_str(&self) -> &'static str {
        match self {
            Provenance::Master => "master",
            Provenance::Override { .. } => "override",
            Provenance::Household { .. } => "household",
        }
    }

    pub fn household_id(&self) -> Option<&str> {
        match self {
            Provenance::Master => None,
            Provenance::Override { household_id, .. } => Some(household_id),
            Provenance::Household { household_id } => Some(household_id),
        }
    }

    pub fn master_id(&self) -> Option<&str> {
        match self {
            Provenance::Override { master_id, .. } => Some(master_id),
            _ => None,
        }
    }

    /// Rebuild the tag from raw storage columns, rejecting rows that
    /// violate the tier rules instead of defaulting them.
    pub fn from_columns(
        scope: &str,
        household_id: Option<String>,
        master_id: Option<String>,
    ) -> AppResult<Self> {
        match (scope, household_id, master_id) {
            ("master", None, None) => Ok(Provenance::Master),
            ("override", Some(household_id), Some(master_id)) => Ok(Provenance::Override {
                household_id,
                master_id,
            }),
            ("household", Some(household_id), None) => Ok(Provenance::Household { household_id }),
            (scope, household_id, master_id) => Err(AppError::new(
                "CATALOG/SCOPE_INVALID",
                "Row violates scope tier rules",
            )
            .with_context("scope", scope.to_string())
            .with_context("household_id", household_id.unwrap_or_default())
            .with_context("master_id", master_id.unwrap_or_default())),
        }
    }
}

fn provenance_from_row(row: &SqliteRow) -> AppResult<Provenance> {
    let scope: String = row.try_get("scope").map_err(AppError::from)?;
    let household_id: Option<String> = row.try_get("household_id").map_err(AppError::from)?;
    let master_id: Option<String> = row.try_get("master_id").map_err(AppError::from)?;
    Provenance::from_columns(&scope, household_id, master_id)
}

/// Shared surface the scope resolver needs from every catalog kind.
pub trait CatalogEntity: Sized + Send + Unpin {
    const KIND: CatalogKind;

    fn from_row(row: &SqliteRow) -> AppResult<Self>;
    fn id(&self) -> &str;
    fn provenance(&self) -> &Provenance;
    /// Column list selected for this kind.
    fn columns() -> &'static str;
    /// Sort applied to masters and to household customs.
    fn sort_sql() -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(flatten)]
    pub provenance: Provenance,
    pub name: String,
    pub slug: String,
    pub color: String,
    pub position: i64,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl CatalogEntity for Category {
    const KIND: CatalogKind = CatalogKind::Category;

    fn from_row(row: &SqliteRow) -> AppResult<Self> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            provenance: provenance_from_row(row)?,
            name: row.try_get("name").map_err(AppError::from)?,
            slug: row.try_get("slug").map_err(AppError::from)?,
            color: row.try_get("color").map_err(AppError::from)?,
            position: row.try_get("position").map_err(AppError::from)?,
            is_default: row
                .try_get::<i64, _>("is_default")
                .map(|value| value != 0)
                .map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
            deleted_at: row
                .try_get::<Option<i64>, _>("deleted_at")
                .map_err(AppError::from)?,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    fn columns() -> &'static str {
        "id, household_id, master_id, scope, name, slug, color, position, is_default, \
         created_at, updated_at, deleted_at"
    }

    fn sort_sql() -> &'static str {
        "position, name, id"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: String,
    #[serde(flatten)]
    pub provenance: Provenance,
    pub name: String,
    pub canonical_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl CatalogEntity for Ingredient {
    const KIND: CatalogKind = CatalogKind::Ingredient;

    fn from_row(row: &SqliteRow) -> AppResult<Self> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            provenance: provenance_from_row(row)?,
            name: row.try_get("name").map_err(AppError::from)?,
            canonical_name: row.try_get("canonical_name").map_err(AppError::from)?,
            category_id: row
                .try_get::<Option<String>, _>("category_id")
                .map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
            deleted_at: row
                .try_get::<Option<i64>, _>("deleted_at")
                .map_err(AppError::from)?,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    fn columns() -> &'static str {
        "id, household_id, master_id, scope, name, canonical_name, category_id, \
         created_at, updated_at, deleted_at"
    }

    fn sort_sql() -> &'static str {
        "name, id"
    }
}

/// One line of a dish's ingredient list. Quantity and unit are opaque
/// display strings; no parsing happens anywhere in the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishIngredient {
    pub display_name: String,
    pub canonical_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dish {
    pub id: String,
    #[serde(flatten)]
    pub provenance: Provenance,
    pub name: String,
    pub ingredients: Vec<DishIngredient>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl CatalogEntity for Dish {
    const KIND: CatalogKind = CatalogKind::Dish;

    fn from_row(row: &SqliteRow) -> AppResult<Self> {
        let ingredients_json: String = row.try_get("ingredients_json").map_err(AppError::from)?;
        let ingredients: Vec<DishIngredient> =
            serde_json::from_str(&ingredients_json).map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            provenance: provenance_from_row(row)?,
            name: row.try_get("name").map_err(AppError::from)?,
            ingredients,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
            deleted_at: row
                .try_get::<Option<i64>, _>("deleted_at")
                .map_err(AppError::from)?,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    fn columns() -> &'static str {
        "id, household_id, master_id, scope, name, ingredients_json, \
         created_at, updated_at, deleted_at"
    }

    fn sort_sql() -> &'static str {
        "name, id"
    }
}

/// Working days a plan covers, in fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl PlanDay {
    pub const ALL: [PlanDay; 5] = [
        PlanDay::Monday,
        PlanDay::Tuesday,
        PlanDay::Wednesday,
        PlanDay::Thursday,
        PlanDay::Friday,
    ];
}

/// Plan-side state of an ad-hoc ingredient line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideStatus {
    Need,
    Have,
    Bought,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientOverride {
    pub display_name: String,
    pub canonical_name: String,
    pub status: OverrideStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekDay {
    pub day: PlanDay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook: Option<String>,
    pub servings: i64,
    pub cook_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_dish_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_dish_id: Option<String>,
    #[serde(default)]
    pub overrides: Vec<IngredientOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekPlan {
    pub id: String,
    pub household_id: String,
    /// `YYYY-MM-DD` of the ISO-week Monday.
    pub week_start: String,
    pub days: Vec<WeekDay>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl WeekPlan {
    pub fn from_row(row: &SqliteRow) -> AppResult<Self> {
        let days_json: String = row.try_get("days_json").map_err(AppError::from)?;
        let days: Vec<WeekDay> = serde_json::from_str(&days_json).map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            household_id: row.try_get("household_id").map_err(AppError::from)?,
            week_start: row.try_get("week_start").map_err(AppError::from)?,
            days,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Purchased,
}

#[derive(Debug, Error)]
#[error("unknown item status: {0}")]
pub struct ParseItemStatusError(String);

impl FromStr for ItemStatus {
    type Err = ParseItemStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "purchased" => Ok(ItemStatus::Purchased),
            other => Err(ParseItemStatusError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub display_name: String,
    pub canonical_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub occurrences: i64,
    #[serde(default)]
    pub from_dishes: Vec<String>,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchased_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

impl ShoppingItem {
    /// Identity used for dedupe and for carrying purchase state across
    /// rebuilds: ingredient id when known, canonical name otherwise.
    pub fn merge_key(&self) -> String {
        match &self.ingredient_id {
            Some(id) => format!("id:{id}"),
            None => format!("name:{}", self.canonical_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingList {
    pub id: String,
    pub household_id: String,
    pub week_start: String,
    pub items: Vec<ShoppingItem>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ShoppingList {
    pub fn from_row(row: &SqliteRow) -> AppResult<Self> {
        let items_json: String = row.try_get("items_json").map_err(AppError::from)?;
        let items: Vec<ShoppingItem> = serde_json::from_str(&items_json).map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            household_id: row.try_get("household_id").map_err(AppError::from)?,
            week_start: row.try_get("week_start").map_err(AppError::from)?,
            items,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_tags_validate_tier_rules() {
        assert_eq!(
            Provenance::from_columns("master", None, None).unwrap(),
            Provenance::Master
        );
        let ovr = Provenance::from_columns("override", Some("hh".into()), Some("m".into()))
            .expect("valid override");
        assert_eq!(ovr.master_id(), Some("m"));
        assert_eq!(ovr.household_id(), Some("hh"));

        // A master never carries a household, an override never lacks one.
        let err = Provenance::from_columns("master", Some("hh".into()), None).unwrap_err();
        assert_eq!(err.code(), "CATALOG/SCOPE_INVALID");
        let err = Provenance::from_columns("override", None, Some("m".into())).unwrap_err();
        assert_eq!(err.code(), "CATALOG/SCOPE_INVALID");
        let err = Provenance::from_columns("household", Some("hh".into()), Some("m".into()))
            .unwrap_err();
        assert_eq!(err.code(), "CATALOG/SCOPE_INVALID");
    }

    #[test]
    fn merge_key_prefers_ingredient_id() {
        let mut item = ShoppingItem {
            ingredient_id: None,
            category_id: None,
            display_name: "Tomates".into(),
            canonical_name: "tomat".into(),
            quantity: None,
            unit: None,
            occurrences: 1,
            from_dishes: vec![],
            status: ItemStatus::Pending,
            purchased_by: None,
            purchased_at: None,
            store_id: None,
        };
        assert_eq!(item.merge_key(), "name:tomat");
        item.ingredient_id = Some("ing-1".into());
        assert_eq!(item.merge_key(), "id:ing-1");
    }

    #[test]
    fn catalog_kind_round_trips_through_str() {
        for kind in CatalogKind::ALL {
            let parsed: CatalogKind = kind.as_str().parse().expect("parse kind");
            assert_eq!(parsed, kind);
        }
        assert!("week".parse::<CatalogKind>().is_err());
    }

    #[test]
    fn week_day_serde_defaults_overrides_to_empty() {
        let json = r#"{"day":"monday","servings":2,"cook_time":"18:00"}"#;
        let day: WeekDay = serde_json::from_str(json).expect("decode week day");
        assert_eq!(day.day, PlanDay::Monday);
        assert!(day.overrides.is_empty());
        assert!(day.main_dish_id.is_none());
    }
}

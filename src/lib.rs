//! Household meal-planning core.
//!
//! Three coupled subsystems around one SQLite store: a three-tier
//! catalog scope resolver (master / override / household-custom plus
//! per-household hide markers), a canonical-name normalizer that builds
//! merge keys for free-text ingredient names, and a shopping-list
//! aggregation engine that derives a status-preserving weekly list from
//! a household's week plan. Routing, auth and UI live in the host; this
//! crate is a library boundary handed pre-authenticated, already-parsed
//! values.

pub mod catalog;
pub mod db;
mod error;
mod id;
pub mod logging;
pub mod matcher;
pub mod migrate;
pub mod model;
pub mod normalize;
pub mod scope;
pub mod shopping;
pub mod time;
pub mod week_plan;

pub use error::{is_unique_violation, AppError, AppResult};
pub use id::new_uuid_v7;

pub use catalog::{
    create_custom_category, create_custom_dish, create_custom_ingredient, create_master_category,
    create_master_dish, create_master_ingredient, default_category, delete_entity,
    upsert_category_override, upsert_dish_override, upsert_ingredient_override, CategoryInput,
    DishInput, IngredientInput,
};
pub use matcher::{resolve_ingredients, IngredientResolution, LooseIngredient};
pub use model::{
    CatalogEntity, CatalogKind, Category, Dish, DishIngredient, Ingredient, IngredientOverride,
    ItemStatus, OverrideStatus, PlanDay, Provenance, ShoppingItem, ShoppingList, WeekDay, WeekPlan,
};
pub use normalize::{canonical_key, normalize_name, slugify};
pub use scope::{hide_master, resolve_catalog, unhide_master, CatalogFilters};
pub use shopping::{ensure_shopping_list, rebuild_shopping_list, set_item_status};
pub use week_plan::{fetch_week_plan, get_or_create_week_plan, save_week_plan, WeekPlanOutcome};

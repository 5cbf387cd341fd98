use anyhow::Result;
use sqlx::SqlitePool;

use larder::model::CatalogKind;
use larder::{
    create_custom_ingredient, create_master_category, create_master_ingredient, hide_master,
    resolve_catalog, unhide_master, upsert_ingredient_override, CatalogFilters, Category,
    CategoryInput, Ingredient, IngredientInput, Provenance,
};

async fn setup_pool() -> Result<SqlitePool> {
    let pool = larder::db::open_memory_pool().await?;
    larder::migrate::apply_migrations(&pool).await?;
    Ok(pool)
}

fn ingredient(name: &str) -> IngredientInput {
    IngredientInput {
        name: name.to_string(),
        category_id: None,
    }
}

fn category(name: &str) -> CategoryInput {
    CategoryInput {
        name: name.to_string(),
        color: None,
        position: None,
    }
}

#[tokio::test]
async fn masters_are_shared_and_customs_are_appended() -> Result<()> {
    let pool = setup_pool().await?;
    let arroz = create_master_ingredient(&pool, ingredient("Arroz")).await?;
    let pollo = create_master_ingredient(&pool, ingredient("Pollo")).await?;
    let custom = create_custom_ingredient(&pool, "hh-1", ingredient("Salsa secreta")).await?;

    let view =
        resolve_catalog::<Ingredient>(&pool, "hh-1", &CatalogFilters::default()).await?;
    let ids: Vec<&str> = view.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec![&arroz.id, &pollo.id, &custom.id]);

    // Another household sees the masters but not the custom.
    let other =
        resolve_catalog::<Ingredient>(&pool, "hh-2", &CatalogFilters::default()).await?;
    assert_eq!(other.len(), 2);
    assert!(other.iter().all(|i| i.id != custom.id));
    Ok(())
}

#[tokio::test]
async fn override_substitutes_master_never_both() -> Result<()> {
    let pool = setup_pool().await?;
    let master = create_master_ingredient(&pool, ingredient("Tomates")).await?;
    let ovr =
        upsert_ingredient_override(&pool, "hh-1", &master.id, ingredient("Tomates cherry"))
            .await?;

    let view =
        resolve_catalog::<Ingredient>(&pool, "hh-1", &CatalogFilters::default()).await?;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, ovr.id);
    assert_eq!(view[0].name, "Tomates cherry");
    assert_eq!(view[0].provenance.master_id(), Some(master.id.as_str()));

    // The override is scoped: other households keep the master.
    let other =
        resolve_catalog::<Ingredient>(&pool, "hh-2", &CatalogFilters::default()).await?;
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].id, master.id);
    assert_eq!(other[0].provenance, Provenance::Master);
    Ok(())
}

#[tokio::test]
async fn ingredient_view_narrows_by_category() -> Result<()> {
    let pool = setup_pool().await?;
    let verduras = create_master_category(&pool, category("Verduras")).await?;
    let tomates = create_master_ingredient(
        &pool,
        IngredientInput {
            name: "Tomates".to_string(),
            category_id: Some(verduras.id.clone()),
        },
    )
    .await?;
    create_master_ingredient(&pool, ingredient("Arroz")).await?;

    let filters = CatalogFilters {
        category_id: Some(verduras.id.clone()),
        ..CatalogFilters::default()
    };
    let view = resolve_catalog::<Ingredient>(&pool, "hh-1", &filters).await?;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, tomates.id);
    Ok(())
}

#[tokio::test]
async fn category_view_narrows_by_slug() -> Result<()> {
    let pool = setup_pool().await?;
    let frutas = create_master_category(&pool, category("Frutas y Verduras")).await?;
    create_master_category(&pool, category("Congelados")).await?;

    let filters = CatalogFilters {
        slug: Some("frutas-y-verduras".to_string()),
        ..CatalogFilters::default()
    };
    let view = resolve_catalog::<Category>(&pool, "hh-1", &filters).await?;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, frutas.id);
    Ok(())
}

#[tokio::test]
async fn filtered_view_substitutes_overrides_of_matching_masters() -> Result<()> {
    let pool = setup_pool().await?;
    let verduras = create_master_category(&pool, category("Verduras")).await?;
    let master = create_master_ingredient(
        &pool,
        IngredientInput {
            name: "Tomates".to_string(),
            category_id: Some(verduras.id.clone()),
        },
    )
    .await?;
    // The override moves the ingredient out of the category entirely.
    let ovr = upsert_ingredient_override(
        &pool,
        "hh-1",
        &master.id,
        IngredientInput {
            name: "Tomates cherry".to_string(),
            category_id: None,
        },
    )
    .await?;

    // Filters narrow the master set; substitution still replaces a
    // matching master with its override, whatever the override's own
    // category is.
    let filters = CatalogFilters {
        category_id: Some(verduras.id.clone()),
        ..CatalogFilters::default()
    };
    let view = resolve_catalog::<Ingredient>(&pool, "hh-1", &filters).await?;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, ovr.id);
    assert!(view[0].category_id.is_none());
    Ok(())
}

#[tokio::test]
async fn hidden_masters_never_appear() -> Result<()> {
    let pool = setup_pool().await?;
    let master = create_master_ingredient(&pool, ingredient("Atún")).await?;
    hide_master(&pool, "hh-1", CatalogKind::Ingredient, &master.id).await?;
    // Re-hiding is a no-op, not an error.
    hide_master(&pool, "hh-1", CatalogKind::Ingredient, &master.id).await?;

    let view =
        resolve_catalog::<Ingredient>(&pool, "hh-1", &CatalogFilters::default()).await?;
    assert!(view.is_empty());

    unhide_master(&pool, "hh-1", CatalogKind::Ingredient, &master.id).await?;
    let view =
        resolve_catalog::<Ingredient>(&pool, "hh-1", &CatalogFilters::default()).await?;
    assert_eq!(view.len(), 1);
    Ok(())
}

#[tokio::test]
async fn fresh_override_clears_a_hide() -> Result<()> {
    let pool = setup_pool().await?;
    let master = create_master_ingredient(&pool, ingredient("Lentejas")).await?;
    hide_master(&pool, "hh-1", CatalogKind::Ingredient, &master.id).await?;

    let ovr =
        upsert_ingredient_override(&pool, "hh-1", &master.id, ingredient("Lentejas pardinas"))
            .await?;

    // Edit supersedes hide: the override shows instead of nothing.
    let view =
        resolve_catalog::<Ingredient>(&pool, "hh-1", &CatalogFilters::default()).await?;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, ovr.id);
    Ok(())
}

#[tokio::test]
async fn archived_rows_are_excluded_everywhere() -> Result<()> {
    let pool = setup_pool().await?;
    create_master_ingredient(&pool, ingredient("Pan")).await?;
    let custom = create_custom_ingredient(&pool, "hh-1", ingredient("Pan de masa madre")).await?;
    larder::delete_entity::<Ingredient>(&pool, "hh-1", &custom.id).await?;

    let view =
        resolve_catalog::<Ingredient>(&pool, "hh-1", &CatalogFilters::default()).await?;
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].name, "Pan");
    Ok(())
}

#[tokio::test]
async fn household_id_is_required() -> Result<()> {
    let pool = setup_pool().await?;
    let err = resolve_catalog::<Ingredient>(&pool, "  ", &CatalogFilters::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/HOUSEHOLD_REQUIRED");
    Ok(())
}

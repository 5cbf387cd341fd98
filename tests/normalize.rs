use larder::{canonical_key, normalize_name, slugify};
use proptest::prelude::*;

#[test]
fn canonical_key_builds_merge_keys() {
    assert_eq!(canonical_key("  Tomates  "), "tomat");
    assert_eq!(canonical_key("Luces"), "luz");
    assert_eq!(canonical_key("Cebollas"), "cebolla");
    assert_eq!(canonical_key("Arroz"), "arroz");
    assert_eq!(canonical_key("Azúcar, morena."), "azucar morena");
}

#[test]
fn plural_collapse_is_stable_for_ingredient_names() {
    for raw in [
        "Tomates",
        "tomate",
        "Luces",
        "huevos",
        "ajo",
        "pimientos rojos",
        "aceite de oliva",
        "Arroz con Pollo",
    ] {
        let once = canonical_key(raw);
        assert_eq!(canonical_key(&once), once, "unstable for {raw:?}");
    }
}

#[test]
fn normalize_name_signals_missing_names() {
    let err = normalize_name(" .,;! ").unwrap_err();
    assert_eq!(err.code(), "VALIDATION/NAME_REQUIRED");
    assert_eq!(normalize_name("Sal").unwrap(), "sal");
}

#[test]
fn slugify_examples() {
    assert_eq!(slugify("Frutas y Verduras"), "frutas-y-verduras");
    assert_eq!(slugify("Lácteos"), "lacteos");
    assert_eq!(slugify("  panadería / bollería  "), "panaderia-bolleria");
}

proptest! {
    #[test]
    fn slugify_is_idempotent(raw in "\\PC{0,48}") {
        let once = slugify(&raw);
        prop_assert_eq!(slugify(&once), once);
    }

    #[test]
    fn slugify_is_url_safe(raw in "\\PC{0,48}") {
        let slug = slugify(&raw);
        prop_assert!(slug
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-'));
        prop_assert!(!slug.starts_with('-'));
        prop_assert!(!slug.ends_with('-'));
    }
}

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::{AppError, AppResult};

/// Sentence punctuation, brackets and quotes stripped from merge keys.
const PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '¡', '¿', '"', '\'', '(', ')', '[', ']', '{', '}', '«', '»',
    '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '`', '´',
];

fn strip_diacritics(input: &str) -> String {
    input.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Heuristic plural collapse for Spanish-style ingredient names.
///
/// Single pass by contract: "luces" becomes "luz", "tomates" becomes
/// "tomat", "huevos" becomes "huevo". Lossy on purpose; the result is a
/// merge key, not a dictionary form.
fn singularize(input: &str) -> String {
    if input.chars().count() <= 3 {
        return input.to_string();
    }
    if let Some(stem) = input.strip_suffix("ces") {
        return format!("{stem}z");
    }
    if let Some(stem) = input.strip_suffix("es") {
        return stem.to_string();
    }
    if let Some(stem) = input.strip_suffix('s') {
        return stem.to_string();
    }
    input.to_string()
}

/// Merge key for free-text ingredient names. Infallible: empty input
/// yields an empty key, which callers treat as "no usable name".
pub fn canonical_key(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let decomposed = strip_diacritics(&lowered);
    let cleaned: String = decomposed
        .chars()
        .filter(|c| !PUNCTUATION.contains(c))
        .collect();
    singularize(&collapse_whitespace(&cleaned))
}

/// Canonicalize a user-supplied name, rejecting input with no usable text.
pub fn normalize_name(raw: &str) -> AppResult<String> {
    let key = canonical_key(raw);
    if key.is_empty() {
        return Err(
            AppError::new("VALIDATION/NAME_REQUIRED", "A non-empty name is required")
                .with_context("raw", raw.to_string()),
        );
    }
    Ok(key)
}

/// URL-safe token used for category identity. Same diacritic and
/// punctuation treatment as `canonical_key`, no singularization.
pub fn slugify(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let decomposed = strip_diacritics(&lowered);
    let mut slug = String::with_capacity(decomposed.len());
    for c in decomposed.chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        // Everything else (punctuation, symbols) is dropped.
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_lowercases_and_strips_accents() {
        assert_eq!(canonical_key("  Azúcar  "), "azucar");
        assert_eq!(canonical_key("Jalapeño"), "jalapeno");
    }

    #[test]
    fn strips_punctuation_and_collapses_whitespace() {
        assert_eq!(canonical_key("aceite  de  oliva."), "aceite de oliva");
        assert_eq!(canonical_key("¡pimientos! (rojos)"), "pimientos rojo");
    }

    #[test]
    fn plural_collapse() {
        assert_eq!(canonical_key("Tomates"), "tomat");
        assert_eq!(canonical_key("Luces"), "luz");
        assert_eq!(canonical_key("huevos"), "huevo");
        assert_eq!(canonical_key("arroz"), "arroz");
    }

    #[test]
    fn short_strings_pass_through() {
        assert_eq!(canonical_key("ajo"), "ajo");
        assert_eq!(canonical_key("OS"), "os");
    }

    #[test]
    fn idempotent_over_ingredient_vocabulary() {
        let vocabulary = [
            "Tomates",
            "tomate",
            "Luces",
            "cebollas",
            "Arroz con Pollo",
            "huevos",
            "ajo",
            "azúcar morena",
            "pimientos rojos",
            "leche",
        ];
        for raw in vocabulary {
            let once = canonical_key(raw);
            assert_eq!(canonical_key(&once), once, "not stable for {raw:?}");
        }
    }

    #[test]
    fn normalize_name_rejects_empty_input() {
        let err = normalize_name("  ¡¿?!  ").unwrap_err();
        assert_eq!(err.code(), "VALIDATION/NAME_REQUIRED");
        assert!(normalize_name("sal").is_ok());
    }

    #[test]
    fn slugify_produces_url_safe_tokens() {
        assert_eq!(slugify("Frutas y Verduras"), "frutas-y-verduras");
        assert_eq!(slugify("  Lácteos — fríos  "), "lacteos-frios");
        assert_eq!(slugify("Café & Té"), "cafe-te");
    }

    #[test]
    fn slugify_collapses_hyphen_runs() {
        assert_eq!(slugify("a - - b"), "a-b");
        assert_eq!(slugify("--edge--"), "edge");
    }

    #[test]
    fn slugify_keeps_no_plural_heuristic() {
        assert_eq!(slugify("Tomates"), "tomates");
    }
}

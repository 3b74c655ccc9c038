//! Sibling-name comparison and validation.
//!
//! Names are compared under Unicode case folding after trimming surrounding
//! whitespace: two siblings named `"Sensor"` and `"sensor"` collide.

use crate::error::ArchonError;

/// Trims surrounding whitespace and returns `None` for an empty result.
#[must_use]
pub fn normalize(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// A folded key suitable for case-insensitive sibling-name comparison.
#[must_use]
pub fn fold_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Validates a candidate name against a parent's existing sibling names
/// (already-trimmed, not yet excluding the node being renamed).
pub fn validate_sibling_name<'a>(
    candidate: &str,
    existing_siblings: impl IntoIterator<Item = &'a str>,
) -> Result<String, ArchonError> {
    let Some(trimmed) = normalize(candidate) else {
        return Err(ArchonError::name_required());
    };
    let candidate_key = fold_key(trimmed);
    for sibling in existing_siblings {
        if fold_key(sibling) == candidate_key {
            return Err(ArchonError::duplicate_name(trimmed));
        }
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_names_are_rejected() {
        assert!(validate_sibling_name("   ", Vec::<&str>::new()).is_err());
        assert!(validate_sibling_name("", Vec::<&str>::new()).is_err());
    }

    #[test]
    fn case_insensitive_collision_is_rejected() {
        let err = validate_sibling_name("sensor", ["Sensor"]).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::VALIDATION_DUPLICATE_NAME);
    }

    #[test]
    fn leading_and_trailing_whitespace_is_trimmed() {
        let name = validate_sibling_name("  Bench 3  ", ["Lab"]).unwrap();
        assert_eq!(name, "Bench 3");
    }

    proptest::proptest! {
        #[test]
        fn fold_key_is_idempotent(name in ".*") {
            proptest::prop_assert_eq!(fold_key(&fold_key(&name)), fold_key(&name));
        }

        #[test]
        fn normalize_never_returns_surrounding_whitespace(name in ".*") {
            if let Some(trimmed) = normalize(&name) {
                proptest::prop_assert_eq!(trimmed, trimmed.trim());
            }
        }
    }
}

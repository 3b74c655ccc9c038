//! Snapshot name validation: non-empty, charset
//! `[A-Za-z0-9._-]`, length at most 128.

use archon_core::{codes, ArchonError};

const MAX_LEN: usize = 128;

pub fn validate_snapshot_name(name: &str) -> Result<(), ArchonError> {
    if name.is_empty() {
        return Err(ArchonError::name_required());
    }
    if name.len() > MAX_LEN {
        return Err(ArchonError::new(
            codes::VALIDATION_NAME_REQUIRED,
            format!("snapshot name must be at most {MAX_LEN} characters, got {}", name.len()),
        ));
    }
    if let Some(bad) = name.chars().find(|c| !is_allowed(*c)) {
        return Err(ArchonError::new(
            codes::VALIDATION_NAME_REQUIRED,
            format!("snapshot name contains disallowed character {bad:?}; only [A-Za-z0-9._-] are allowed"),
        ));
    }
    Ok(())
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        assert!(validate_snapshot_name("v1.0.0-rc_1").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(validate_snapshot_name("").is_err());
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(validate_snapshot_name("v1 release").is_err());
        assert!(validate_snapshot_name("v1/release").is_err());
    }

    #[test]
    fn rejects_overlong_name() {
        let name = "a".repeat(129);
        assert!(validate_snapshot_name(&name).is_err());
    }
}

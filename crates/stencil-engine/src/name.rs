//! Resource name normalization
//!
//! Every cache key is a normalized name, so two spellings of the same logical
//! resource always share one entry. The canonical form is absolute-style:
//! a leading `/`, `/` separators, no empty, `.` or `..` segments.

use crate::error::{Result, TemplateError};

/// Normalize a resource name into its canonical cache key
///
/// Backslashes count as separators, repeated separators collapse, `.` is
/// dropped and `..` removes the previous segment. A `..` that would climb
/// above the template root is rejected, as is a name with no segments left.
///
/// Normalizing an already normalized name returns it unchanged.
pub fn normalize_name(name: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(invalid(name, "climbs above the template root"));
                }
            }
            segment => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(invalid(name, "does not name a resource"));
    }

    Ok(format!("/{}", segments.join("/")))
}

fn invalid(name: &str, reason: &str) -> TemplateError {
    TemplateError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_relative_and_absolute_spellings_match() {
        assert_eq!(normalize_name("a/b.tpl").unwrap(), "/a/b.tpl");
        assert_eq!(normalize_name("/a/b.tpl").unwrap(), "/a/b.tpl");
    }

    #[test]
    fn test_redundant_separators_collapse() {
        assert_eq!(normalize_name("//a///b.tpl").unwrap(), "/a/b.tpl");
        assert_eq!(normalize_name("a\\b.tpl").unwrap(), "/a/b.tpl");
    }

    #[test]
    fn test_dot_segments_resolve() {
        assert_eq!(normalize_name("./a/./b.tpl").unwrap(), "/a/b.tpl");
        assert_eq!(normalize_name("a/c/../b.tpl").unwrap(), "/a/b.tpl");
    }

    #[test]
    fn test_backtracking_above_root_is_rejected() {
        let err = normalize_name("../secret.tpl").unwrap_err();
        assert!(matches!(err, TemplateError::InvalidName { .. }));
        assert!(normalize_name("a/../../b.tpl").is_err());
    }

    #[test]
    fn test_empty_names_are_rejected() {
        assert!(normalize_name("").is_err());
        assert!(normalize_name("/").is_err());
        assert!(normalize_name("a/..").is_err());
    }

    fn segment() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec!["a", "b", "c.tpl", "layout", ".", "..", ""])
    }

    fn raw_name() -> impl Strategy<Value = String> {
        (
            prop::collection::vec(segment(), 1..8),
            prop::sample::select(vec!["/", "\\", "//"]),
        )
            .prop_map(|(segments, separator)| segments.join(separator))
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(name in raw_name()) {
            if let Ok(normalized) = normalize_name(&name) {
                prop_assert_eq!(normalize_name(&normalized).unwrap(), normalized);
            }
        }

        #[test]
        fn prop_normalized_names_are_canonical(name in raw_name()) {
            if let Ok(normalized) = normalize_name(&name) {
                prop_assert!(normalized.starts_with('/'));
                prop_assert!(!normalized.contains("//"));
                prop_assert!(!normalized.contains('\\'));
                prop_assert!(normalized.split('/').skip(1).all(|s| s != "." && s != ".."));
            }
        }

        #[test]
        fn prop_leading_slash_does_not_change_key(name in raw_name()) {
            let with_root = format!("/{name}");
            prop_assert_eq!(normalize_name(&name).ok(), normalize_name(&with_root).ok());
        }
    }
}

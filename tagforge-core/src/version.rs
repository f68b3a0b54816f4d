//! Semantic-version filtering and ordering of tag names.
//!
//! Tag names are validated after stripping a single optional leading `v`,
//! so `v1.4.2` and `1.4.2` are both accepted while `vv1.4.2` is not. Sorting
//! always hands back the original, unstripped names.

use semver::Version;
use std::cmp::Ordering;

/// A tag name paired with its parsed semantic version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Name exactly as the upstream reported it, e.g. `v1.4.2`.
    pub name: String,
    /// Parsed version with the leading `v` removed.
    pub version: Version,
}

impl Tag {
    /// Parse a tag name, returning `None` when it is not a semantic version.
    pub fn parse(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let version = Version::parse(strip_v_prefix(&name)).ok()?;
        Some(Self { name, version })
    }

    /// Compare two tags by semver precedence (build metadata ignored).
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        self.version.cmp_precedence(&other.version)
    }
}

/// Strip one leading `v`, if present.
pub fn strip_v_prefix(name: &str) -> &str {
    name.strip_prefix('v').unwrap_or(name)
}

/// Whether `name`, minus an optional leading `v`, is a semantic version.
pub fn is_valid_version(name: &str) -> bool {
    Version::parse(strip_v_prefix(name)).is_ok()
}

/// Keep valid version names and order them newest first.
///
/// Equal-precedence names (e.g. differing only in build metadata) keep their
/// relative input order.
pub fn sort_descending<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tags: Vec<Tag> = names.into_iter().filter_map(Tag::parse).collect();
    tags.sort_by(|a, b| b.cmp_precedence(a));
    tags.into_iter().map(|tag| tag.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_versions() {
        assert!(is_valid_version("1.0.0"));
        assert!(is_valid_version("v1.0.0"));
        assert!(is_valid_version("v1.3.0-rc.1"));
        assert!(is_valid_version("v1.2.40+build.7"));
    }

    #[test]
    fn test_invalid_versions() {
        assert!(!is_valid_version(""));
        assert!(!is_valid_version("v"));
        assert!(!is_valid_version("v1.0"));
        assert!(!is_valid_version("vv1.0.0"));
        assert!(!is_valid_version("V1.0.0"));
        assert!(!is_valid_version("v01.0.0"));
        assert!(!is_valid_version("release-1.0.0"));
        assert!(!is_valid_version(" v1.0.0"));
    }

    #[test]
    fn test_sort_descending_drops_invalid() {
        let sorted = sort_descending(["v2.0.0", "v1.0.0", "invalid", "v1.5.0"]);
        assert_eq!(sorted, vec!["v2.0.0", "v1.5.0", "v1.0.0"]);
    }

    #[test]
    fn test_sort_descending_prerelease_precedence() {
        let sorted = sort_descending([
            "v1.3.0-beta.2",
            "v1.3.0",
            "v1.3.0-beta.10",
            "v1.3.0-rc.1",
            "v1.2.9",
        ]);
        assert_eq!(
            sorted,
            vec![
                "v1.3.0",
                "v1.3.0-rc.1",
                "v1.3.0-beta.10",
                "v1.3.0-beta.2",
                "v1.2.9",
            ]
        );
    }

    #[test]
    fn test_sort_descending_numeric_not_lexical() {
        let sorted = sort_descending(["v1.2.9", "v1.2.10", "v1.10.0", "v1.9.0"]);
        assert_eq!(sorted, vec!["v1.10.0", "v1.9.0", "v1.2.10", "v1.2.9"]);
    }

    #[test]
    fn test_sort_descending_is_stable_for_equal_precedence() {
        let sorted = sort_descending(["v1.0.0+b", "1.0.0", "v1.0.0+a"]);
        assert_eq!(sorted, vec!["v1.0.0+b", "1.0.0", "v1.0.0+a"]);
    }

    #[test]
    fn test_sort_descending_keeps_original_names() {
        let sorted = sort_descending(["1.0.0", "v2.0.0"]);
        assert_eq!(sorted, vec!["v2.0.0", "1.0.0"]);
    }

    #[test]
    fn test_tag_parse() {
        let tag = Tag::parse("v1.4.2").expect("valid tag");
        assert_eq!(tag.name, "v1.4.2");
        assert_eq!(tag.version, Version::new(1, 4, 2));
        assert!(Tag::parse("nightly").is_none());
    }

    fn arb_version() -> impl Strategy<Value = String> {
        (
            0u64..50,
            0u64..50,
            0u64..50,
            prop::option::of("[a-z]{1,6}(\\.[1-9][0-9]{0,2})?"),
            any::<bool>(),
        )
            .prop_map(|(major, minor, patch, pre, prefixed)| {
                let mut s = format!("{}.{}.{}", major, minor, patch);
                if let Some(pre) = pre {
                    s.push('-');
                    s.push_str(&pre);
                }
                if prefixed {
                    format!("v{}", s)
                } else {
                    s
                }
            })
    }

    proptest! {
        #[test]
        fn prop_generated_versions_are_valid(name in arb_version()) {
            prop_assert!(is_valid_version(&name));
        }

        #[test]
        fn prop_double_prefix_is_invalid(name in arb_version()) {
            let doubled = format!("vv{}", strip_v_prefix(&name));
            prop_assert!(!is_valid_version(&doubled));
        }

        #[test]
        fn prop_sort_descending_idempotent(names in prop::collection::vec(arb_version(), 0..32)) {
            let once = sort_descending(names);
            let twice = sort_descending(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sort_descending_is_ordered(names in prop::collection::vec(arb_version(), 0..32)) {
            let sorted = sort_descending(names.clone());
            prop_assert_eq!(sorted.len(), names.len());
            for pair in sorted.windows(2) {
                let a = Tag::parse(pair[0].clone()).expect("valid");
                let b = Tag::parse(pair[1].clone()).expect("valid");
                prop_assert_ne!(a.cmp_precedence(&b), Ordering::Less);
            }
        }

        #[test]
        fn prop_sort_descending_filters_garbage(
            names in prop::collection::vec(arb_version(), 0..16),
            junk in prop::collection::vec("[a-z_-]{1,12}", 0..16),
        ) {
            let mut mixed = names.clone();
            mixed.extend(junk);
            let sorted = sort_descending(mixed);
            prop_assert_eq!(sorted.len(), names.len());
        }
    }
}

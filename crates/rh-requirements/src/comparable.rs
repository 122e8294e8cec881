use rh_pep508::Requirement;

/// Permissive equality between two requirements.
///
/// Two requirements match when every component that is present on *both* sides agrees:
///
/// - the name always has to agree (names are never empty);
/// - the direct URL, the extras and the version specifiers are only compared when both sides set
///   them, so an absent or empty value matches anything;
/// - markers are compared expression by expression, pairwise, and only up to the length of the
///   shorter marker.
///
/// This is **not** an equivalence relation. It is not transitive when optional components are
/// only partially populated: `foo>=1` matches `foo`, and `foo` matches `foo<1`, but `foo>=1`
/// doesn't match `foo<1`. [`crate::combine_requirements`] relies on exactly this permissiveness
/// by probing with a name-only requirement, so don't tighten it.
pub fn loosely_matches(left: &Requirement, right: &Requirement) -> bool {
    if left.name != right.name {
        return false;
    }

    if let (Some(left), Some(right)) = (left.url(), right.url()) {
        if left != right {
            return false;
        }
    }

    if !left.extras.is_empty() && !right.extras.is_empty() {
        let same = left.extras.iter().all(|extra| right.extras.contains(extra))
            && right.extras.iter().all(|extra| left.extras.contains(extra));
        if !same {
            return false;
        }
    }

    if let (Some(left), Some(right)) = (left.specifiers(), right.specifiers()) {
        if !left.is_empty() && !right.is_empty() {
            let same = left.iter().all(|specifier| right.iter().any(|s| s == specifier))
                && right.iter().all(|specifier| left.iter().any(|s| s == specifier));
            if !same {
                return false;
            }
        }
    }

    if let (Some(left), Some(right)) = (&left.marker, &right.marker) {
        let pairwise_equal = left
            .expressions()
            .into_iter()
            .zip(right.expressions())
            .all(|(left, right)| left.to_string() == right.to_string());
        if !pairwise_equal {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rh_pep508::Requirement;

    use super::loosely_matches;

    fn req(s: &str) -> Requirement {
        Requirement::from_str(s).unwrap()
    }

    #[test]
    fn absent_components_match_anything() {
        assert!(loosely_matches(&req("foo>=1.0"), &req("foo")));
        assert!(loosely_matches(&req("foo"), &req("foo[bar]<2")));
        assert!(loosely_matches(&req("Foo_Bar"), &req("foo.bar>=1")));
        assert!(!loosely_matches(&req("foo"), &req("bar")));
    }

    #[test]
    fn present_components_must_agree() {
        assert!(loosely_matches(&req("foo>=1.0,<2"), &req("foo<2,>=1.0")));
        assert!(!loosely_matches(&req("foo>=1.0"), &req("foo>=1.1")));
        assert!(!loosely_matches(&req("foo[a]"), &req("foo[b]")));
        assert!(loosely_matches(&req("foo[a,b]"), &req("foo[b,a]")));
    }

    #[test]
    fn not_transitive() {
        let lower = req("foo>=1");
        let bare = req("foo");
        let upper = req("foo<1");
        assert!(loosely_matches(&lower, &bare));
        assert!(loosely_matches(&bare, &upper));
        assert!(!loosely_matches(&lower, &upper));
    }

    #[test]
    fn markers_compare_pairwise_up_to_shorter() {
        let short = req(r#"foo; python_version < "3.8""#);
        let long = req(r#"foo; python_version < "3.8" and os_name == "nt""#);
        let other = req(r#"foo; python_version >= "3.8""#);
        assert!(loosely_matches(&short, &long));
        assert!(!loosely_matches(&short, &other));
    }
}

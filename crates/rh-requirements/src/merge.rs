use rh_pep440::{Operator, VersionSpecifier, VersionSpecifiers};
use rh_pep508::{Requirement, VersionOrUrl};
use tracing::trace;

use crate::loosely_matches;

/// Reduce a set of version specifiers to the tightest bound per operator.
///
/// - `>=` and `>` keep only their highest version, `<=` and `<` their lowest.
/// - `==`, `!=`, `~=`, `===` (and the wildcard forms) are all kept, with exact duplicates
///   collapsed.
///
/// The output is ordered by operator: `>=`, `>`, `<=`, `<`, `==`, `!=`, `~=`, `===`; within an
/// operator, the first occurrence wins. Distinct operators are never combined, so `>=1.0,>0.5`
/// stays as is.
pub fn resolve_specifiers(
    specifiers: impl IntoIterator<Item = VersionSpecifier>,
) -> VersionSpecifiers {
    let mut greater_than_equal: Option<VersionSpecifier> = None;
    let mut greater_than: Option<VersionSpecifier> = None;
    let mut less_than_equal: Option<VersionSpecifier> = None;
    let mut less_than: Option<VersionSpecifier> = None;
    let mut equal = Vec::new();
    let mut not_equal = Vec::new();
    let mut compatible = Vec::new();
    let mut exact = Vec::new();

    for specifier in specifiers {
        match specifier.operator() {
            Operator::GreaterThanEqual => keep_max(&mut greater_than_equal, specifier),
            Operator::GreaterThan => keep_max(&mut greater_than, specifier),
            Operator::LessThanEqual => keep_min(&mut less_than_equal, specifier),
            Operator::LessThan => keep_min(&mut less_than, specifier),
            Operator::Equal | Operator::EqualStar => push_unique(&mut equal, specifier),
            Operator::NotEqual | Operator::NotEqualStar => push_unique(&mut not_equal, specifier),
            Operator::TildeEqual => push_unique(&mut compatible, specifier),
            Operator::ExactEqual => push_unique(&mut exact, specifier),
        }
    }

    greater_than_equal
        .into_iter()
        .chain(greater_than)
        .chain(less_than_equal)
        .chain(less_than)
        .chain(equal)
        .chain(not_equal)
        .chain(compatible)
        .chain(exact)
        .collect()
}

fn keep_max(slot: &mut Option<VersionSpecifier>, specifier: VersionSpecifier) {
    match slot {
        Some(current) if specifier.version() <= current.version() => {}
        _ => *slot = Some(specifier),
    }
}

fn keep_min(slot: &mut Option<VersionSpecifier>, specifier: VersionSpecifier) {
    match slot {
        Some(current) if specifier.version() >= current.version() => {}
        _ => *slot = Some(specifier),
    }
}

fn push_unique(specifiers: &mut Vec<VersionSpecifier>, specifier: VersionSpecifier) {
    if !specifiers.contains(&specifier) {
        specifiers.push(specifier);
    }
}

/// Merge requirements on the same distribution into a single requirement each.
///
/// Requirements are keyed by their normalized name, so `Foo_Bar>=1` and `foo.bar<2` merge into
/// `foo-bar>=1,<2`. When merging:
///
/// - version specifiers are pooled and reduced with [`resolve_specifiers`];
/// - extras are unioned, in order of first appearance;
/// - the first entry decides between a direct URL and version specifiers, so a later URL never
///   replaces specifiers and later specifiers never replace a URL;
/// - the first entry's marker is kept, even when it has none.
///
/// Entries are returned in order of first appearance.
pub fn combine_requirements(requirements: impl IntoIterator<Item = Requirement>) -> Vec<Requirement> {
    let mut merged: Vec<Requirement> = Vec::new();

    for requirement in requirements {
        // A bare name matches any requirement with the same name.
        let key = Requirement::from_name(requirement.name.clone());
        let Some(existing) = merged
            .iter_mut()
            .find(|existing| loosely_matches(existing, &key))
        else {
            merged.push(requirement);
            continue;
        };

        trace!("Merging `{requirement}` into `{existing}`");
        merge_into(existing, requirement);
    }

    merged
}

fn merge_into(existing: &mut Requirement, requirement: Requirement) {
    for extra in requirement.extras {
        if !existing.extras.contains(&extra) {
            existing.extras.push(extra);
        }
    }

    existing.version_or_url = match (existing.version_or_url.take(), requirement.version_or_url) {
        (Some(VersionOrUrl::VersionSpecifier(left)), Some(VersionOrUrl::VersionSpecifier(right))) => {
            let resolved = resolve_specifiers(left.into_iter().chain(right));
            Some(VersionOrUrl::VersionSpecifier(resolved))
        }
        // No specifiers is an empty specifier set, which takes on later specifiers but not a URL.
        (None, Some(VersionOrUrl::VersionSpecifier(right))) => {
            Some(VersionOrUrl::VersionSpecifier(resolve_specifiers(right)))
        }
        (left, _) => left,
    };

    // An empty specifier set renders the same as no specifiers at all.
    if existing
        .specifiers()
        .is_some_and(VersionSpecifiers::is_empty)
    {
        existing.version_or_url = None;
    }
}

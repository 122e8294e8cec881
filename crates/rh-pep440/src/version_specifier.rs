use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::version::compare_release;
use crate::{Version, VersionParseError};

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`.
#[derive(Eq, PartialEq, Debug, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `===` (discouraged)
    ///
    /// <https://peps.python.org/pep-0440/#arbitrary-equality>
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~=`
    TildeEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Operator {
    /// Returns the textual form, with `==` and `!=` shared by their wildcard variants.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        }
    }

    /// Whether the operator takes a `.*` suffix.
    pub fn is_star(self) -> bool {
        matches!(self, Self::EqualStar | Self::NotEqualStar)
    }

    /// Upgrades `==` and `!=` to their wildcard variants.
    fn with_star(self) -> Option<Self> {
        match self {
            Self::Equal => Some(Self::EqualStar),
            Self::NotEqual => Some(Self::NotEqualStar),
            _ => None,
        }
    }
}

impl FromStr for Operator {
    type Err = VersionSpecifierParseError;

    /// Does not know about star versions; `==` always parses as [`Operator::Equal`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operator = match s {
            "==" => Self::Equal,
            "===" => Self::ExactEqual,
            "!=" => Self::NotEqual,
            "~=" => Self::TildeEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            other => {
                return Err(VersionSpecifierParseError::InvalidOperator(
                    other.to_string(),
                ));
            }
        };
        Ok(operator)
    }
}

impl Display for Operator {
    /// Note the `EqualStar` is also `==`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A version range such as `>1.2.3`, `<=4!5.6.7-a8.post9.dev0` or `== 4.1.*`.
///
/// See <https://peps.python.org/pep-0440/#version-specifiers>
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

impl VersionSpecifier {
    /// Build a specifier from an operator and a version, rejecting combinations PEP 440 forbids.
    pub fn from_version(
        operator: Operator,
        version: Version,
    ) -> Result<Self, VersionSpecifierParseError> {
        if operator == Operator::TildeEqual && version.release().len() < 2 {
            return Err(VersionSpecifierParseError::CompatibleRelease);
        }
        if operator.is_star() && (version.is_local() || version.any_prerelease() || version.is_post())
        {
            return Err(VersionSpecifierParseError::InvalidWildcard(operator));
        }
        if version.is_local() && !matches!(operator, Operator::Equal | Operator::NotEqual) {
            return Err(VersionSpecifierParseError::LocalNotAllowed(operator));
        }
        Ok(Self { operator, version })
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn into_parts(self) -> (Operator, Version) {
        (self.operator, self.version)
    }

    /// Whether the given version satisfies this specifier.
    pub fn contains(&self, version: &Version) -> bool {
        // A local label on the candidate is ignored unless the specifier carries one.
        let candidate = if self.version.is_local() {
            version.clone()
        } else {
            version.without_local()
        };

        match self.operator {
            Operator::Equal => candidate == self.version,
            Operator::EqualStar => self.prefix_matches(&candidate),
            Operator::ExactEqual => version.to_string() == self.version.to_string(),
            Operator::NotEqual => candidate != self.version,
            Operator::NotEqualStar => !self.prefix_matches(&candidate),
            Operator::TildeEqual => {
                // `~=2.2.post3` is equivalent to `>=2.2.post3, ==2.*`.
                let release = self.version.release();
                let prefix = Version::new(&release[..release.len() - 1]);
                candidate >= self.version
                    && candidate.epoch() == self.version.epoch()
                    && release_has_prefix(candidate.release(), prefix.release())
            }
            Operator::LessThan => {
                // `<V` excludes pre-releases of V unless V is itself a pre-release.
                candidate < self.version
                    && !(!self.version.any_prerelease()
                        && candidate.any_prerelease()
                        && same_release(&candidate, &self.version))
            }
            Operator::LessThanEqual => candidate <= self.version,
            Operator::GreaterThan => {
                // `>V` excludes post-releases of V unless V is itself a post-release.
                candidate > self.version
                    && !(!self.version.is_post()
                        && candidate.is_post()
                        && same_release(&candidate, &self.version))
            }
            Operator::GreaterThanEqual => candidate >= self.version,
        }
    }

    fn prefix_matches(&self, candidate: &Version) -> bool {
        candidate.epoch() == self.version.epoch()
            && release_has_prefix(candidate.release(), self.version.release())
    }
}

/// Zero-padded prefix test on release segments, so `1.0` starts with `1.0.0`.
fn release_has_prefix(release: &[u64], prefix: &[u64]) -> bool {
    prefix
        .iter()
        .enumerate()
        .all(|(index, number)| release.get(index).copied().unwrap_or(0) == *number)
}

fn same_release(left: &Version, right: &Version) -> bool {
    left.epoch() == right.epoch()
        && compare_release(left.release(), right.release()) == Ordering::Equal
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parses a specifier such as `>= 1.19`, `== 1.1.*` or `~=1.0+abc.5`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();
        let split = spec
            .find(|c: char| !matches!(c, '=' | '!' | '~' | '<' | '>'))
            .unwrap_or(spec.len());
        let (operator, version) = spec.split_at(split);
        if operator.is_empty() {
            return Err(VersionSpecifierParseError::MissingOperator(spec.to_string()));
        }
        let operator = Operator::from_str(operator)?;
        let version = version.trim();
        if version.is_empty() {
            return Err(VersionSpecifierParseError::MissingVersion(spec.to_string()));
        }
        let (version, star) = Version::from_str_star(version)?;
        let operator = if star {
            operator
                .with_star()
                .ok_or(VersionSpecifierParseError::InvalidWildcard(operator))?
        } else {
            operator
        };
        Self::from_version(operator, version)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.operator.is_star() {
            write!(f, "{}{}.*", self.operator, self.version)
        } else {
            write!(f, "{}{}", self.operator, self.version)
        }
    }
}

impl<'de> Deserialize<'de> for VersionSpecifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

impl Serialize for VersionSpecifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A comma-separated list of [`VersionSpecifier`]s, such as `>= 1.16, < 2.0`.
///
/// The order of the specifiers is preserved, and is what [`Display`] renders.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifiers {
    /// Matches all versions.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether all specifiers match the given version.
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|specifier| specifier.contains(version))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VersionSpecifier> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<VersionSpecifier> {
        self.0
    }
}

impl std::ops::Deref for VersionSpecifiers {
    type Target = [VersionSpecifier];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<T: IntoIterator<Item = VersionSpecifier>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for VersionSpecifiers {
    type Item = VersionSpecifier;
    type IntoIter = std::vec::IntoIter<VersionSpecifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<VersionSpecifier> for VersionSpecifiers {
    fn from(specifier: VersionSpecifier) -> Self {
        Self(vec![specifier])
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        s.split(',')
            .map(VersionSpecifier::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, version_specifier) in self.0.iter().enumerate() {
            if idx != 0 {
                f.write_str(",")?;
            }
            write!(f, "{version_specifier}")?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An error that occurs when parsing a [`VersionSpecifier`] fails.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VersionSpecifierParseError {
    #[error("No such comparison operator `{0}`, must be one of ~= == != <= >= < > ===")]
    InvalidOperator(String),
    #[error("Missing comparison operator in `{0}`")]
    MissingOperator(String),
    #[error("Missing version in `{0}`")]
    MissingVersion(String),
    #[error("The ~= operator requires at least two segments in the release version")]
    CompatibleRelease,
    #[error("Operator {0} cannot be used with a wildcard version specifier")]
    InvalidWildcard(Operator),
    #[error("You can't mix a {0} operator with a local version (`+1.2.3`)")]
    LocalNotAllowed(Operator),
    #[error(transparent)]
    Version(#[from] VersionParseError),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn version(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    #[test]
    fn parse_and_display() {
        let cases = [
            (">=1.0", ">=1.0"),
            (">= 1.0", ">=1.0"),
            ("==1.2.*", "==1.2.*"),
            ("!= 1.2.*", "!=1.2.*"),
            ("~=2.2.post3", "~=2.2.post3"),
            ("<2.0", "<2.0"),
            ("===1.0", "===1.0"),
            ("==1.0+local", "==1.0+local"),
        ];
        for (input, expected) in cases {
            let specifier = VersionSpecifier::from_str(input).unwrap();
            assert_eq!(specifier.to_string(), expected, "{input:?}");
        }
    }

    #[test]
    fn specifiers_keep_order() {
        let specifiers = VersionSpecifiers::from_str(">= 1.16, < 2.0").unwrap();
        assert_eq!(specifiers.to_string(), ">=1.16,<2.0");
        assert_eq!(specifiers.len(), 2);
        assert!(VersionSpecifiers::from_str("").unwrap().is_empty());
    }

    #[test]
    fn contains() {
        let cases = [
            ("==1.1", "1.1.0", true),
            ("==1.1", "1.1+local", true),
            ("==1.1.*", "1.1.3", true),
            ("==1.1.*", "1.2", false),
            ("!=1.1.*", "1.2", true),
            ("~=2.2", "2.9", true),
            ("~=2.2", "3.0", false),
            ("~=1.4.5", "1.4.9", true),
            ("~=1.4.5", "1.5.0", false),
            ("<2.0", "1.9", true),
            ("<2.0", "2.0a1", false),
            ("<2.0a2", "2.0a1", true),
            ("<=2.0", "2.0", true),
            (">1.7", "1.7.post1", false),
            (">1.7", "1.7.1", true),
            (">1.7.post2", "1.7.post3", true),
            (">=1.0", "1.0", true),
            (">=1.0", "0.9", false),
        ];
        for (specifier, candidate, expected) in cases {
            let specifier = VersionSpecifier::from_str(specifier).unwrap();
            assert_eq!(
                specifier.contains(&version(candidate)),
                expected,
                "{specifier} contains {candidate}"
            );
        }
    }

    #[test]
    fn failures() {
        insta::assert_snapshot!(
            VersionSpecifier::from_str("~=1").unwrap_err(),
            @"The ~= operator requires at least two segments in the release version"
        );
        insta::assert_snapshot!(
            VersionSpecifier::from_str(">=1.0.*").unwrap_err(),
            @"Operator >= cannot be used with a wildcard version specifier"
        );
        insta::assert_snapshot!(
            VersionSpecifier::from_str(">=1.0+local").unwrap_err(),
            @"You can't mix a >= operator with a local version (`+1.2.3`)"
        );
        insta::assert_snapshot!(
            VersionSpecifier::from_str("1.0").unwrap_err(),
            @"Missing comparison operator in `1.0`"
        );
        insta::assert_snapshot!(
            VersionSpecifier::from_str("=>1.0").unwrap_err(),
            @"No such comparison operator `=>`, must be one of ~= == != <= >= < > ==="
        );
    }
}

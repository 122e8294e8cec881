use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::{cmp, iter};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use unscanny::Scanner;

/// The kind of a pre-release: `a`, `b` or `rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrereleaseKind {
    /// alpha prerelease
    Alpha,
    /// beta prerelease
    Beta,
    /// release candidate prerelease
    Rc,
}

impl Display for PrereleaseKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => f.write_str("a"),
            Self::Beta => f.write_str("b"),
            Self::Rc => f.write_str("rc"),
        }
    }
}

/// A pre-release marker such as `a1` or `rc2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prerelease {
    pub kind: PrereleaseKind,
    pub number: u64,
}

impl Display for Prerelease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.number)
    }
}

/// A segment of a local version label, e.g. `ubuntu` or `4` in `1.0+ubuntu.4`.
///
/// Numeric segments sort after alphanumeric ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    String(String),
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => f.write_str(string),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        // <https://peps.python.org/pep-0440/#local-version-identifiers>
        match (self, other) {
            (Self::Number(n1), Self::Number(n2)) => n1.cmp(n2),
            (Self::String(s1), Self::String(s2)) => s1.cmp(s2),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

/// A version number such as `1.2.3` or `4!5.6.7-a8.post9.dev0+local`.
///
/// Versions are stored in their normalized form, so `1.0-ALPHA1` and `1.0a1` are equal and both
/// display as `1.0a1`. Trailing zeros in the release segment don't affect equality or ordering,
/// but are preserved for display.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<Prerelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

impl Version {
    /// Create a final release version from its release segment, e.g. `[3, 6, 1]`.
    pub fn new<I, R>(release_numbers: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: std::borrow::Borrow<u64>,
    {
        Self {
            epoch: 0,
            release: release_numbers.into_iter().map(|r| *r.borrow()).collect(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// Parse a version that may end in `.*`, as used by the `==` and `!=` operators.
    ///
    /// Returns the version and whether it carried a trailing wildcard.
    pub fn from_str_star(version: &str) -> Result<(Self, bool), VersionParseError> {
        Parser::new(version).parse(true)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn pre(&self) -> Option<Prerelease> {
        self.pre
    }

    pub fn post(&self) -> Option<u64> {
        self.post
    }

    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    /// Whether this is an alpha, beta, release candidate or development release.
    pub fn any_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// Whether this is a post release.
    pub fn is_post(&self) -> bool {
        self.post.is_some()
    }

    /// Whether this version carries a local label.
    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// Returns a copy of this version with the local label removed.
    #[must_use]
    pub fn without_local(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Returns the release-only version, dropping pre, post, dev and local segments.
    #[must_use]
    pub fn only_release(&self) -> Self {
        Self {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses a version such as `1.19`, `1.0a1`, `1.0+abc.5` or `1!2012.2`.
    ///
    /// A trailing `.*` is rejected; see [`Version::from_str_star`].
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let (parsed, star) = Parser::new(version).parse(false)?;
        debug_assert!(!star);
        Ok(parsed)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let mut release = self.release.iter();
        if let Some(first) = release.next() {
            write!(f, "{first}")?;
        }
        for number in release {
            write!(f, ".{number}")?;
        }
        if let Some(pre) = self.pre {
            write!(f, "{pre}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        let mut local = self.local.iter();
        if let Some(first) = local.next() {
            write!(f, "+{first}")?;
            for segment in local {
                write!(f, ".{segment}")?;
            }
        }
        Ok(())
    }
}

/// Compare the release parts of two versions, e.g. `4.3.1` > `4.2`, `1.1.0` == `1.1` and
/// `1.16` < `1.19`.
pub(crate) fn compare_release(this: &[u64], other: &[u64]) -> Ordering {
    // "When comparing release segments with different numbers of components, the shorter segment
    // is padded out with additional zeros as necessary"
    let len = cmp::max(this.len(), other.len());
    this.iter()
        .chain(iter::repeat(&0))
        .zip(other.iter().chain(iter::repeat(&0)))
        .take(len)
        .map(|(this, other)| this.cmp(other))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Compare the parts attached after the release, given equal release.
///
/// The order of suffixes is `.devN, aN, bN, rcN, <no suffix>, .postN`, where dev and post
/// releases may also be attached to pre-releases. For post, any number sorts above none, while
/// for dev, no number sorts above any number. A version without a local label sorts below the
/// same version with one.
fn sortable_tuple(version: &Version) -> (u64, u64, Option<u64>, u64, Option<&[LocalSegment]>) {
    let local = if version.local.is_empty() {
        None
    } else {
        Some(version.local.as_slice())
    };
    match (version.pre, version.post, version.dev) {
        // dev release
        (None, None, Some(n)) => (0, 0, None, n, local),
        // alpha, beta and release candidate
        (Some(Prerelease { kind, number }), post, dev) => {
            let rank = match kind {
                PrereleaseKind::Alpha => 1,
                PrereleaseKind::Beta => 2,
                PrereleaseKind::Rc => 3,
            };
            (rank, number, post, dev.unwrap_or(u64::MAX), local)
        }
        // final release
        (None, None, None) => (4, 0, None, 0, local),
        // post release
        (None, Some(post), dev) => (5, 0, Some(post), dev.unwrap_or(u64::MAX), local),
    }
}

impl PartialEq<Self> for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    /// Trailing zeros are skipped since equality zero-pads the release.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        for number in self.release.iter().rev().skip_while(|number| **number == 0) {
            number.hash(state);
        }
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd<Self> for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// 1.0.dev456 < 1.0a1 < 1.0a2.dev456 < 1.0a12.dev456 < 1.0a12 < 1.0b1.dev456 < 1.0b2
    /// < 1.0b2.post345.dev456 < 1.0b2.post345 < 1.0rc1 < 1.0 < 1.0.post456.dev34 < 1.0.post456
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| sortable_tuple(self).cmp(&sortable_tuple(other)))
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = Version;

            fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                f.write_str("a version string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Version::from_str(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An error that occurs when parsing a [`Version`] string fails.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("Version `{version}` doesn't match PEP 440 rules: {kind}")]
pub struct VersionParseError {
    version: String,
    kind: ErrorKind,
}

impl VersionParseError {
    fn new(version: &str, kind: ErrorKind) -> Self {
        Self {
            version: version.to_string(),
            kind,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
enum ErrorKind {
    #[error("expected a release number")]
    NoLeadingNumber,
    #[error("the number `{0}` is too large")]
    NumberTooBig(String),
    #[error("local version labels must not be empty")]
    LocalEmpty,
    #[error("a wildcard is only allowed directly after the release segment")]
    UnexpectedWildcard,
    #[error("unexpected trailing characters `{0}`")]
    UnexpectedEnd(String),
}

/// A hand-written parser for the PEP 440 version grammar, accepting the alternative spellings
/// PEP 440 normalizes (`alpha`, `-`, `_`, `rev`, a leading `v`, and so on).
struct Parser<'a> {
    original: &'a str,
    lowercase: String,
}

impl<'a> Parser<'a> {
    fn new(original: &'a str) -> Self {
        Self {
            original,
            lowercase: original.trim().to_ascii_lowercase(),
        }
    }

    fn error(&self, kind: ErrorKind) -> VersionParseError {
        VersionParseError::new(self.original, kind)
    }

    fn parse(&self, allow_star: bool) -> Result<(Version, bool), VersionParseError> {
        let mut s = Scanner::new(&self.lowercase);
        s.eat_if('v');

        let mut first = self
            .number(&mut s)?
            .ok_or_else(|| self.error(ErrorKind::NoLeadingNumber))?;
        let mut epoch = 0;
        if s.eat_if('!') {
            epoch = first;
            first = self
                .number(&mut s)?
                .ok_or_else(|| self.error(ErrorKind::NoLeadingNumber))?;
        }

        let mut release = vec![first];
        let mut star = false;
        loop {
            let checkpoint = s.cursor();
            if !s.eat_if('.') {
                break;
            }
            if s.eat_if('*') {
                star = true;
                break;
            }
            if let Some(number) = self.number(&mut s)? {
                release.push(number);
            } else {
                s.jump(checkpoint);
                break;
            }
        }

        if star {
            if !allow_star {
                return Err(self.error(ErrorKind::UnexpectedWildcard));
            }
            if !s.done() {
                return Err(self.error(ErrorKind::UnexpectedWildcard));
            }
            return Ok((
                Version {
                    epoch,
                    ..Version::new(release)
                },
                true,
            ));
        }

        let pre = self.pre(&mut s)?;
        let post = self.post(&mut s)?;
        let dev = self.dev(&mut s)?;
        let local = self.local(&mut s)?;

        if s.eat_if(".*") {
            return Err(self.error(ErrorKind::UnexpectedWildcard));
        }
        if !s.done() {
            return Err(self.error(ErrorKind::UnexpectedEnd(s.after().to_string())));
        }

        Ok((
            Version {
                epoch,
                release,
                pre,
                post,
                dev,
                local,
            },
            false,
        ))
    }

    fn number(&self, s: &mut Scanner) -> Result<Option<u64>, VersionParseError> {
        let digits = s.eat_while(|c: char| c.is_ascii_digit());
        if digits.is_empty() {
            return Ok(None);
        }
        digits
            .parse::<u64>()
            .map(Some)
            .map_err(|_| self.error(ErrorKind::NumberTooBig(digits.to_string())))
    }

    /// Parses an optional `[-_.]?(a|alpha|b|beta|c|rc|pre|preview)[-_.]?N?`.
    fn pre(&self, s: &mut Scanner) -> Result<Option<Prerelease>, VersionParseError> {
        let checkpoint = s.cursor();
        s.eat_if(is_separator);
        // Longer spellings first so `alpha` isn't read as `a` followed by garbage.
        let spellings = [
            ("alpha", PrereleaseKind::Alpha),
            ("beta", PrereleaseKind::Beta),
            ("preview", PrereleaseKind::Rc),
            ("pre", PrereleaseKind::Rc),
            ("rc", PrereleaseKind::Rc),
            ("a", PrereleaseKind::Alpha),
            ("b", PrereleaseKind::Beta),
            ("c", PrereleaseKind::Rc),
        ];
        let Some(kind) = spellings
            .into_iter()
            .find_map(|(spelling, kind)| s.eat_if(spelling).then_some(kind))
        else {
            s.jump(checkpoint);
            return Ok(None);
        };
        let number = self.implicit_number(s)?;
        Ok(Some(Prerelease { kind, number }))
    }

    /// Parses an optional `-N` or `[-_.]?(post|rev|r)[-_.]?N?`.
    fn post(&self, s: &mut Scanner) -> Result<Option<u64>, VersionParseError> {
        let checkpoint = s.cursor();
        if s.eat_if('-') {
            if let Some(number) = self.number(s)? {
                return Ok(Some(number));
            }
            s.jump(checkpoint);
        }
        s.eat_if(is_separator);
        if s.eat_if("post") || s.eat_if("rev") || s.eat_if('r') {
            return self.implicit_number(s).map(Some);
        }
        s.jump(checkpoint);
        Ok(None)
    }

    /// Parses an optional `[-_.]?dev[-_.]?N?`.
    fn dev(&self, s: &mut Scanner) -> Result<Option<u64>, VersionParseError> {
        let checkpoint = s.cursor();
        s.eat_if(is_separator);
        if s.eat_if("dev") {
            return self.implicit_number(s).map(Some);
        }
        s.jump(checkpoint);
        Ok(None)
    }

    /// Parses an optional `+label(.label)*`, where `-` and `_` also separate labels.
    fn local(&self, s: &mut Scanner) -> Result<Vec<LocalSegment>, VersionParseError> {
        let mut local = Vec::new();
        if !s.eat_if('+') {
            return Ok(local);
        }
        loop {
            let segment = s.eat_while(|c: char| c.is_ascii_alphanumeric());
            if segment.is_empty() {
                return Err(self.error(ErrorKind::LocalEmpty));
            }
            if segment.bytes().all(|b| b.is_ascii_digit()) {
                let number = segment
                    .parse::<u64>()
                    .map_err(|_| self.error(ErrorKind::NumberTooBig(segment.to_string())))?;
                local.push(LocalSegment::Number(number));
            } else {
                local.push(LocalSegment::String(segment.to_string()));
            }
            if !s.eat_if(is_separator) {
                break;
            }
        }
        Ok(local)
    }

    /// A number after a pre, post or dev marker, which defaults to zero when omitted.
    fn implicit_number(&self, s: &mut Scanner) -> Result<u64, VersionParseError> {
        let checkpoint = s.cursor();
        s.eat_if(is_separator);
        if let Some(number) = self.number(s)? {
            return Ok(number);
        }
        s.jump(checkpoint);
        Ok(0)
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '-' | '_' | '.')
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn normalized_display() {
        let cases = [
            ("1.0", "1.0"),
            ("v1.0", "1.0"),
            ("2.0.0", "2.0.0"),
            ("1.0-ALPHA1", "1.0a1"),
            ("1.0.beta.2", "1.0b2"),
            ("1.0c3", "1.0rc3"),
            ("1.0preview1", "1.0rc1"),
            ("1.0-1", "1.0.post1"),
            ("1.0.rev4", "1.0.post4"),
            ("1.0.post", "1.0.post0"),
            ("1.0-dev", "1.0.dev0"),
            ("1!2.0a1.post2.dev3+Ubuntu-4", "1!2.0a1.post2.dev3+ubuntu.4"),
            (" 2020.12.4 ", "2020.12.4"),
        ];
        for (input, expected) in cases {
            let version = Version::from_str(input).unwrap();
            assert_eq!(version.to_string(), expected, "{input:?}");
        }
    }

    #[test]
    fn ordering() {
        let versions = [
            "1.0.dev456",
            "1.0a1",
            "1.0a2.dev456",
            "1.0a12.dev456",
            "1.0a12",
            "1.0b1.dev456",
            "1.0b2",
            "1.0b2.post345.dev456",
            "1.0b2.post345",
            "1.0rc1.dev456",
            "1.0rc1",
            "1.0",
            "1.0+abc.5",
            "1.0+abc.7",
            "1.0+5",
            "1.0.post456.dev34",
            "1.0.post456",
            "1.1.dev1",
        ];
        for window in versions.windows(2) {
            let lower = Version::from_str(window[0]).unwrap();
            let higher = Version::from_str(window[1]).unwrap();
            assert!(lower < higher, "{} < {}", window[0], window[1]);
        }
    }

    #[test]
    fn trailing_zeros_are_equal() {
        let short = Version::from_str("1.1").unwrap();
        let long = Version::from_str("1.1.0.0").unwrap();
        assert_eq!(short, long);
        assert_eq!(short.to_string(), "1.1");
        assert_eq!(long.to_string(), "1.1.0.0");
    }

    #[test]
    fn epoch_dominates() {
        let epoch = Version::from_str("1!0.1").unwrap();
        let plain = Version::from_str("2024.1").unwrap();
        assert!(epoch > plain);
    }

    #[test]
    fn star() {
        let (version, star) = Version::from_str_star("1.2.*").unwrap();
        assert!(star);
        assert_eq!(version.release(), &[1, 2]);

        let (version, star) = Version::from_str_star("1.2").unwrap();
        assert!(!star);
        assert_eq!(version.to_string(), "1.2");

        assert!(Version::from_str("1.2.*").is_err());
        assert!(Version::from_str_star("1.2a1.*").is_err());
    }

    #[test]
    fn failures() {
        let failures = ["", "a", "1.0+", "1.0 foo", "1..2", "1.0+abc..1", "pypy3"];
        for input in failures {
            assert!(Version::from_str(input).is_err(), "{input:?}");
        }
    }

    #[test]
    fn error_message() {
        let err = Version::from_str("1.0 foo").unwrap_err();
        insta::assert_snapshot!(err, @"Version `1.0 foo` doesn't match PEP 440 rules: unexpected trailing characters ` foo`");
    }
}

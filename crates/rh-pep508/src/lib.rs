//! Dependency specifiers, as described in
//! <https://packaging.python.org/en/latest/specifications/dependency-specifiers/> (PEP 508).
//!
//! A [`Requirement`] such as `requests[security] >=2.8.1 ; python_version > "3.8"` is parsed into
//! its name, extras, version specifiers or direct URL, and marker. [`Display`] renders the
//! normalized form used in core metadata and requirements files.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;
use unicode_width::UnicodeWidthChar;
use url::Url;

use rh_normalize::{ExtraName, PackageName};
use rh_pep440::{VersionSpecifier, VersionSpecifiers};

pub use crate::marker::{
    MarkerExpression, MarkerOperator, MarkerTree, MarkerValue, MarkerVariable,
};

use crate::cursor::Cursor;

mod cursor;
mod marker;

/// A parse error, pointing at `len` bytes from `start` in `input`.
#[derive(Debug)]
pub struct Pep508Error {
    pub message: Pep508ErrorSource,
    pub start: usize,
    pub len: usize,
    pub input: String,
}

#[derive(Debug, Error)]
pub enum Pep508ErrorSource {
    #[error("{0}")]
    String(String),
    #[error(transparent)]
    UrlError(#[from] url::ParseError),
}

impl From<String> for Pep508ErrorSource {
    fn from(message: String) -> Self {
        Self::String(message)
    }
}

impl From<&str> for Pep508ErrorSource {
    fn from(message: &str) -> Self {
        Self::String(message.to_string())
    }
}

/// The terminal width of `text`.
fn display_width(text: &str) -> usize {
    text.chars().filter_map(UnicodeWidthChar::width).sum()
}

impl Display for Pep508Error {
    /// The message, then the input with the span underlined by carets.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let start = self.start.min(self.input.len());
        let end = (start + self.len).min(self.input.len());
        let indent = display_width(&self.input[..start]);
        let carets = display_width(&self.input[start..end]).max(1);
        writeln!(f, "{}", self.message)?;
        writeln!(f, "{}", self.input)?;
        write!(f, "{}{}", " ".repeat(indent), "^".repeat(carets))
    }
}

impl std::error::Error for Pep508Error {}

/// A dependency specifier, e.g. `requests[security,tests] >=2.8.1 ; python_version > "3.8"`.
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct Requirement {
    pub name: PackageName,
    pub extras: Vec<ExtraName>,
    /// `>=2.8.1` or `@ https://...`, if either is given.
    pub version_or_url: Option<VersionOrUrl>,
    pub marker: Option<MarkerTree>,
}

/// The version specifiers or the direct URL of a [`Requirement`].
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub enum VersionOrUrl {
    VersionSpecifier(VersionSpecifiers),
    /// e.g. `foo @ https://example.org/foo-1.0.tar.gz`
    Url(Url),
}

impl Requirement {
    /// A requirement on any version of `name`.
    pub fn from_name(name: PackageName) -> Self {
        Self {
            name,
            extras: Vec::new(),
            version_or_url: None,
            marker: None,
        }
    }

    pub fn specifiers(&self) -> Option<&VersionSpecifiers> {
        if let Some(VersionOrUrl::VersionSpecifier(specifiers)) = &self.version_or_url {
            Some(specifiers)
        } else {
            None
        }
    }

    pub fn url(&self) -> Option<&Url> {
        if let Some(VersionOrUrl::Url(url)) = &self.version_or_url {
            Some(url)
        } else {
            None
        }
    }

    /// The requirement with only its name and version or URL.
    #[must_use]
    pub fn without_extras_and_marker(&self) -> Self {
        Self {
            name: self.name.clone(),
            extras: Vec::new(),
            version_or_url: self.version_or_url.clone(),
            marker: None,
        }
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name.as_str())?;
        if let Some((first, rest)) = self.extras.split_first() {
            write!(f, "[{first}")?;
            for extra in rest {
                write!(f, ",{extra}")?;
            }
            f.write_str("]")?;
        }
        match &self.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => write!(f, "{specifiers}")?,
            Some(VersionOrUrl::Url(url)) => write!(f, " @ {url}")?,
            None => {}
        }
        if let Some(marker) = &self.marker {
            // A `;` directly after a URL would be read as part of it.
            let separator = if self.url().is_some() { " ; " } else { "; " };
            write!(f, "{separator}{marker}")?;
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_requirement(&mut Cursor::new(input))
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let requirement = String::deserialize(deserializer)?;
        requirement.parse().map_err(de::Error::custom)
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Characters of package and extra names, before normalization.
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// ```text
/// specification = wsp* name wsp* extras? wsp* (url_req | versionspec)? wsp* (';' marker)? wsp*
/// ```
fn parse_requirement(cursor: &mut Cursor) -> Result<Requirement, Pep508Error> {
    cursor.eat_whitespace();
    let name = parse_name(cursor)?;
    cursor.eat_whitespace();
    let extras = parse_extras(cursor)?;
    cursor.eat_whitespace();

    let version_or_url = match cursor.peek() {
        None | Some((_, ';')) => None,
        Some((_, '@')) => {
            cursor.next();
            Some(VersionOrUrl::Url(parse_url(cursor)?))
        }
        Some((open, '(')) => {
            cursor.next();
            Some(VersionOrUrl::VersionSpecifier(parse_specifiers(
                cursor,
                Some(open),
            )?))
        }
        Some((_, '<' | '=' | '>' | '~' | '!')) => Some(VersionOrUrl::VersionSpecifier(
            parse_specifiers(cursor, None)?,
        )),
        Some((pos, other)) => {
            return Err(cursor.error(
                format!("Expected a version specifier, `@`, or `;` after the name, found `{other}`"),
                pos,
                other.len_utf8(),
            ));
        }
    };

    cursor.eat_whitespace();
    let marker = match cursor.eat_char(';') {
        Some(_) => Some(marker::parse_markers_cursor(cursor)?),
        None => None,
    };

    cursor.eat_whitespace();
    if let Some((pos, other)) = cursor.peek() {
        return Err(cursor.error(
            format!("Unexpected `{other}` after the requirement"),
            pos,
            cursor.remaining(),
        ));
    }

    Ok(Requirement {
        name,
        extras,
        version_or_url,
        marker,
    })
}

fn parse_name(cursor: &mut Cursor) -> Result<PackageName, Pep508Error> {
    let (start, len) = cursor.take_while(is_name_char);
    if len == 0 {
        return Err(match cursor.peek() {
            Some((pos, other)) => cursor.error(
                format!("Expected a package name, found `{other}`"),
                pos,
                other.len_utf8(),
            ),
            None => cursor.error("Expected a package name", start, 1),
        });
    }
    PackageName::from_str(cursor.slice(start, len))
        .map_err(|err| cursor.error(err.to_string(), start, len))
}

/// `[extra1, extra2]`, possibly empty.
fn parse_extras(cursor: &mut Cursor) -> Result<Vec<ExtraName>, Pep508Error> {
    let Some(open) = cursor.eat_char('[') else {
        return Ok(Vec::new());
    };
    let unclosed = |cursor: &Cursor| cursor.error("Missing closing `]` for the extras", open, 1);

    let mut extras = Vec::new();
    cursor.eat_whitespace();
    if cursor.eat_char(']').is_some() {
        return Ok(extras);
    }

    loop {
        cursor.eat_whitespace();
        let (start, len) = cursor.take_while(is_name_char);
        if len == 0 {
            return Err(match cursor.peek() {
                Some((pos, other)) => cursor.error(
                    format!("Expected an extra name, found `{other}`"),
                    pos,
                    other.len_utf8(),
                ),
                None => unclosed(cursor),
            });
        }
        let extra = ExtraName::from_str(cursor.slice(start, len))
            .map_err(|err| cursor.error(err.to_string(), start, len))?;
        extras.push(extra);

        cursor.eat_whitespace();
        match cursor.next() {
            Some((_, ',')) => {}
            Some((_, ']')) => return Ok(extras),
            Some((pos, other)) => {
                return Err(cursor.error(
                    format!("Expected `,` or `]` after an extra, found `{other}`"),
                    pos,
                    other.len_utf8(),
                ));
            }
            None => return Err(unclosed(cursor)),
        }
    }
}

/// A direct URL, which extends to the next whitespace.
fn parse_url(cursor: &mut Cursor) -> Result<Url, Pep508Error> {
    cursor.eat_whitespace();
    let (start, len) = cursor.take_while(|c| !c.is_whitespace());
    if len == 0 {
        return Err(cursor.error("Expected a URL after `@`", start, 1));
    }
    Url::parse(cursor.slice(start, len)).map_err(|err| cursor.error(err, start, len))
}

/// Comma-separated version specifiers, running up to the `;` of the marker or, within
/// parentheses, the closing `)`.
fn parse_specifiers(
    cursor: &mut Cursor,
    open: Option<usize>,
) -> Result<VersionSpecifiers, Pep508Error> {
    let end = if open.is_some() { ')' } else { ';' };
    let (start, len) = cursor.take_while(|c| c != end);
    if let Some(open) = open {
        if cursor.eat_char(')').is_none() {
            return Err(cursor.error("Missing closing `)` for the version specifiers", open, 1));
        }
    }

    let mut specifiers = Vec::new();
    let mut offset = start;
    for part in cursor.slice(start, len).split(',') {
        let specifier = part.trim();
        let leading = part.len() - part.trim_start().len();
        let parsed = VersionSpecifier::from_str(specifier)
            .map_err(|err| cursor.error(err.to_string(), offset + leading, specifier.len()))?;
        specifiers.push(parsed);
        offset += part.len() + ','.len_utf8();
    }
    Ok(specifiers.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;
    use insta::assert_snapshot;

    use super::*;

    fn parse_err(input: &str) -> String {
        Requirement::from_str(input).unwrap_err().to_string()
    }

    #[test]
    fn name_extras_specifiers_and_marker() {
        let requirement = Requirement::from_str(
            "requests [security, tests] >=2.8.1, ==2.8.* ; python_version < '2.7'",
        )
        .unwrap();
        assert_eq!(requirement.name.as_str(), "requests");
        assert_eq!(
            requirement
                .extras
                .iter()
                .map(ExtraName::as_str)
                .collect::<Vec<_>>(),
            ["security", "tests"]
        );
        assert_eq!(
            requirement.specifiers().unwrap().to_string(),
            ">=2.8.1,==2.8.*"
        );
        assert_snapshot!(requirement, @r#"requests[security,tests]>=2.8.1,==2.8.*; python_version < "2.7""#);
    }

    #[test]
    fn names_are_normalized() {
        let requirement = Requirement::from_str("Ruamel_Yaml>=0.15").unwrap();
        assert_snapshot!(requirement, @"ruamel-yaml>=0.15");
    }

    #[test]
    fn parenthesized_specifiers() {
        let requirement = Requirement::from_str("numpy ( >=1.19, <2.0 )").unwrap();
        assert_snapshot!(requirement, @"numpy>=1.19,<2.0");
    }

    #[test]
    fn direct_url() {
        let requirement = Requirement::from_str(
            "pip @ https://github.com/pypa/pip/archive/1.3.1.zip ; os_name == 'nt'",
        )
        .unwrap();
        assert_eq!(
            requirement.url().map(Url::as_str),
            Some("https://github.com/pypa/pip/archive/1.3.1.zip")
        );
        assert!(requirement.specifiers().is_none());
        assert_snapshot!(requirement, @r#"pip @ https://github.com/pypa/pip/archive/1.3.1.zip ; os_name == "nt""#);
        assert_eq!(
            requirement.without_extras_and_marker().to_string(),
            "pip @ https://github.com/pypa/pip/archive/1.3.1.zip"
        );
    }

    #[test]
    fn bare_name() {
        let requirement = Requirement::from_str("  attrs  ").unwrap();
        assert_eq!(
            requirement,
            Requirement::from_name(PackageName::from_str("attrs").unwrap())
        );
        assert_snapshot!(requirement, @"attrs");
    }

    #[test]
    fn empty_extras() {
        let requirement = Requirement::from_str("black[ ]").unwrap();
        assert!(requirement.extras.is_empty());
    }

    #[test]
    fn error_empty() {
        assert_eq!(parse_err(""), "Expected a package name\n\n^");
    }

    #[test]
    fn error_name() {
        assert_snapshot!(parse_err("@name"), @r"
        Expected a package name, found `@`
        @name
        ^
        ");
        assert!(parse_err("_name").starts_with("Invalid name `_name`"));
    }

    #[test]
    fn error_extras() {
        assert_snapshot!(parse_err("black[d"), @r"
        Missing closing `]` for the extras
        black[d
             ^
        ");
        assert_snapshot!(parse_err("black[d;e]"), @r"
        Expected `,` or `]` after an extra, found `;`
        black[d;e]
               ^
        ");
    }

    #[test]
    fn error_after_name() {
        assert_snapshot!(parse_err("name version"), @r"
        Expected a version specifier, `@`, or `;` after the name, found `v`
        name version
             ^
        ");
    }

    #[test]
    fn error_bad_specifier() {
        assert_eq!(
            parse_err("name >= 1.0.*, <2"),
            indoc! {"
                Operator >= cannot be used with a wildcard version specifier
                name >= 1.0.*, <2
                     ^^^^^^^^"
            }
        );
    }

    #[test]
    fn error_missing_parenthesis() {
        assert_snapshot!(parse_err("name (>=1.0"), @r"
        Missing closing `)` for the version specifiers
        name (>=1.0
             ^
        ");
    }

    #[test]
    fn error_trailing() {
        assert_snapshot!(parse_err("name (>=1.0) extra"), @r"
        Unexpected `e` after the requirement
        name (>=1.0) extra
                     ^^^^^
        ");
    }
}

//! The glob patterns of `manifest_additional` lines and license file lookup.
//!
//! Patterns are `/`-separated and matched component-wise against paths relative to a root. Within
//! a component, `*` matches any run of characters, `?` matches a single character and `[...]`
//! (negated with `[!...]`) matches one character of a class. A `**` component matches any number
//! of directories, including none. Matching is case-sensitive and dotfiles are not special.

use std::path::{Path, PathBuf};

use unscanny::Scanner;
use walkdir::WalkDir;

use rh_fs::Simplified;

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GlobPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    AnyDirectories,
    Pattern(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    AnySequence,
    Class {
        negated: bool,
        ranges: Vec<(char, char)>,
    },
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Self::Literal(literal) => *literal == c,
            Self::AnyChar | Self::AnySequence => true,
            Self::Class { negated, ranges } => {
                ranges.iter().any(|(start, end)| (*start..=*end).contains(&c)) != *negated
            }
        }
    }
}

impl GlobPattern {
    /// Parse a pattern. Every string is a valid pattern: an unclosed `[` matches itself.
    pub(crate) fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .map(|segment| {
                if segment == "**" {
                    Segment::AnyDirectories
                } else {
                    Segment::Pattern(parse_segment(segment))
                }
            })
            .collect();
        Self { segments }
    }

    /// A pattern matching `pattern` in any subdirectory, like `Path.rglob`.
    pub(crate) fn recursive(pattern: &str) -> Self {
        Self::new(&format!("**/{pattern}"))
    }

    fn is_recursive(&self) -> bool {
        self.segments.contains(&Segment::AnyDirectories)
    }

    /// Whether the `/`-separated relative path matches.
    pub(crate) fn matches(&self, relative: &str) -> bool {
        let components: Vec<&str> = relative
            .split('/')
            .filter(|component| !component.is_empty())
            .collect();
        match_segments(&self.segments, &components)
    }

    /// The regular files below `root` matching this pattern, in a stable order.
    ///
    /// A missing `root` matches nothing.
    pub(crate) fn matching_files(&self, root: &Path) -> Result<Vec<PathBuf>, Error> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
        if !self.is_recursive() {
            walker = walker.max_depth(self.segments.len());
        }

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|err| Error::WalkDir {
                root: root.to_path_buf(),
                err,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if self.matches(&relative.portable_display()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

fn match_segments(segments: &[Segment], components: &[&str]) -> bool {
    match segments.split_first() {
        None => components.is_empty(),
        Some((Segment::AnyDirectories, rest)) => {
            (0..=components.len()).any(|skip| match_segments(rest, &components[skip..]))
        }
        Some((Segment::Pattern(tokens), rest)) => {
            components.split_first().is_some_and(|(first, remaining)| {
                let chars: Vec<char> = first.chars().collect();
                match_tokens(tokens, &chars) && match_segments(rest, remaining)
            })
        }
    }
}

fn match_tokens(tokens: &[Token], text: &[char]) -> bool {
    match tokens.split_first() {
        None => text.is_empty(),
        Some((Token::AnySequence, rest)) => {
            (0..=text.len()).any(|skip| match_tokens(rest, &text[skip..]))
        }
        Some((token, rest)) => text
            .split_first()
            .is_some_and(|(c, remaining)| token.matches(*c) && match_tokens(rest, remaining)),
    }
}

fn parse_segment(segment: &str) -> Vec<Token> {
    let mut scanner = Scanner::new(segment);
    let mut tokens = Vec::new();
    while let Some(c) = scanner.eat() {
        let token = match c {
            '*' => {
                scanner.eat_while('*');
                Token::AnySequence
            }
            '?' => Token::AnyChar,
            '[' => {
                let start = scanner.cursor();
                parse_class(&mut scanner).unwrap_or_else(|| {
                    scanner.jump(start);
                    Token::Literal('[')
                })
            }
            c => Token::Literal(c),
        };
        tokens.push(token);
    }
    tokens
}

/// Parse the rest of a `[...]` class, after the opening bracket.
fn parse_class(scanner: &mut Scanner) -> Option<Token> {
    let negated = scanner.eat_if('!');
    let mut ranges = Vec::new();
    // A `]` directly after the opening bracket is part of the class.
    if scanner.eat_if(']') {
        ranges.push((']', ']'));
    }
    loop {
        let start = scanner.eat()?;
        if start == ']' {
            return Some(Token::Class { negated, ranges });
        }
        let is_range = scanner.at('-')
            && scanner
                .after()
                .chars()
                .nth(1)
                .is_some_and(|end| end != ']');
        if is_range {
            scanner.eat();
            let end = scanner.eat()?;
            ranges.push((start, end));
        } else {
            ranges.push((start, start));
        }
    }
}

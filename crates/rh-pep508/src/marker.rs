//! Environment markers such as `python_version < "3.8"` or `extra == 'docs'`.
//!
//! Markers are parsed into a tree and rendered back in a normalized form. They are never
//! evaluated, only carried into distribution metadata or dropped where a format has no markers.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rh_normalize::ExtraName;

use crate::Pep508Error;
use crate::cursor::Cursor;

/// The environment variables a marker may reference.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum MarkerVariable {
    ImplementationName,
    ImplementationVersion,
    OsName,
    PlatformMachine,
    PlatformPythonImplementation,
    PlatformRelease,
    PlatformSystem,
    PlatformVersion,
    PythonFullVersion,
    PythonVersion,
    SysPlatform,
    Extra,
}

impl MarkerVariable {
    const NAMES: [(Self, &'static str); 12] = [
        (Self::ImplementationName, "implementation_name"),
        (Self::ImplementationVersion, "implementation_version"),
        (Self::OsName, "os_name"),
        (Self::PlatformMachine, "platform_machine"),
        (Self::PlatformPythonImplementation, "platform_python_implementation"),
        (Self::PlatformRelease, "platform_release"),
        (Self::PlatformSystem, "platform_system"),
        (Self::PlatformVersion, "platform_version"),
        (Self::PythonFullVersion, "python_full_version"),
        (Self::PythonVersion, "python_version"),
        (Self::SysPlatform, "sys_platform"),
        (Self::Extra, "extra"),
    ];

    pub fn as_str(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(variable, _)| *variable == self)
            .map_or("extra", |(_, name)| *name)
    }
}

impl FromStr for MarkerVariable {
    type Err = String;

    /// Also accepts the dotted PEP 345 spellings, e.g. `os.name` and `sys.platform`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let canonical = match name {
            "os.name" => "os_name",
            "sys.platform" => "sys_platform",
            "platform.machine" => "platform_machine",
            "platform.version" => "platform_version",
            "platform.python_implementation" | "python_implementation" => {
                "platform_python_implementation"
            }
            name => name,
        };
        Self::NAMES
            .iter()
            .find(|(_, known)| *known == canonical)
            .map(|(variable, _)| *variable)
            .ok_or_else(|| name.to_string())
    }
}

impl Display for MarkerVariable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a marker comparison.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum MarkerValue {
    Variable(MarkerVariable),
    QuotedString(String),
}

impl Display for MarkerValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Variable(variable) => write!(f, "{variable}"),
            Self::QuotedString(value) if value.contains('"') => write!(f, "'{value}'"),
            Self::QuotedString(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MarkerOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    TildeEqual,
    ExactEqual,
    In,
    NotIn,
}

impl MarkerOperator {
    /// The comparison operators, longest first so that prefixes don't shadow them.
    const COMPARISONS: [(&'static str, Self); 8] = [
        ("===", Self::ExactEqual),
        ("==", Self::Equal),
        ("!=", Self::NotEqual),
        (">=", Self::GreaterEqual),
        ("<=", Self::LessEqual),
        ("~=", Self::TildeEqual),
        (">", Self::GreaterThan),
        ("<", Self::LessThan),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::NotIn => "not in",
            comparison => Self::COMPARISONS
                .iter()
                .find(|(_, operator)| *operator == comparison)
                .map_or("==", |(symbol, _)| *symbol),
        }
    }
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single comparison such as `python_version >= "3.7"`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MarkerExpression {
    pub l_value: MarkerValue,
    pub operator: MarkerOperator,
    pub r_value: MarkerValue,
}

impl MarkerExpression {
    /// The extra selected by `extra == "name"`, written either way round.
    pub fn extra(&self) -> Option<&str> {
        if self.operator != MarkerOperator::Equal {
            return None;
        }
        match (&self.l_value, &self.r_value) {
            (MarkerValue::Variable(MarkerVariable::Extra), MarkerValue::QuotedString(value))
            | (MarkerValue::QuotedString(value), MarkerValue::Variable(MarkerVariable::Extra)) => {
                Some(value)
            }
            _ => None,
        }
    }
}

impl Display for MarkerExpression {
    /// Extra names are single-quoted, as in `extra == 'testing'`, other strings double-quoted.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let extra = MarkerValue::Variable(MarkerVariable::Extra);
        match (&self.l_value, &self.r_value) {
            (l_value, MarkerValue::QuotedString(value)) if *l_value == extra && !value.contains('\'') => {
                write!(f, "{l_value} {} '{value}'", self.operator)
            }
            (MarkerValue::QuotedString(value), r_value) if *r_value == extra && !value.contains('\'') => {
                write!(f, "'{value}' {} {r_value}", self.operator)
            }
            _ => write!(f, "{} {} {}", self.l_value, self.operator, self.r_value),
        }
    }
}

/// A boolean combination of [`MarkerExpression`]s.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum MarkerTree {
    Expression(MarkerExpression),
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
}

impl MarkerTree {
    /// `extra == "<extra>"`
    pub fn extra(extra: &ExtraName) -> Self {
        Self::Expression(MarkerExpression {
            l_value: MarkerValue::Variable(MarkerVariable::Extra),
            operator: MarkerOperator::Equal,
            r_value: MarkerValue::QuotedString(extra.to_string()),
        })
    }

    /// `self and other`, without nesting one conjunction in another.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let mut children = Vec::new();
        for tree in [self, other] {
            if let Self::And(grandchildren) = tree {
                children.extend(grandchildren);
            } else {
                children.push(tree);
            }
        }
        Self::And(children)
    }

    /// All comparisons in the tree, left to right, regardless of how they are combined.
    pub fn expressions(&self) -> Vec<&MarkerExpression> {
        match self {
            Self::Expression(expression) => vec![expression],
            Self::And(children) | Self::Or(children) => {
                children.iter().flat_map(Self::expressions).collect()
            }
        }
    }
}

impl FromStr for MarkerTree {
    type Err = Pep508Error;

    fn from_str(markers: &str) -> Result<Self, Self::Err> {
        parse_markers_cursor(&mut Cursor::new(markers))
    }
}

impl Display for MarkerTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (children, keyword) = match self {
            Self::Expression(expression) => return write!(f, "{expression}"),
            Self::And(children) => (children, " and "),
            Self::Or(children) => (children, " or "),
        };
        for (index, child) in children.iter().enumerate() {
            if index > 0 {
                f.write_str(keyword)?;
            }
            if let Self::Expression(expression) = child {
                write!(f, "{expression}")?;
            } else {
                write!(f, "({child})")?;
            }
        }
        Ok(())
    }
}

/// Consume `keyword` if it is the next word.
fn eat_keyword(cursor: &mut Cursor, keyword: &str) -> bool {
    let (start, len) = cursor.peek_while(char::is_alphabetic);
    if cursor.slice(start, len) == keyword {
        cursor.take_while(char::is_alphabetic);
        true
    } else {
        false
    }
}

/// `<`, `==`, `in`, `not in` and the like.
fn parse_operator(cursor: &mut Cursor) -> Result<MarkerOperator, Pep508Error> {
    if eat_keyword(cursor, "in") {
        return Ok(MarkerOperator::In);
    }
    let not = cursor.pos();
    if eat_keyword(cursor, "not") {
        let (_, spaces) = cursor.take_while(char::is_whitespace);
        if spaces == 0 || !eat_keyword(cursor, "in") {
            return Err(cursor.error("Expected `not in`", not, cursor.pos() - not));
        }
        return Ok(MarkerOperator::NotIn);
    }

    let (start, len) = cursor.peek_while(|c| matches!(c, '<' | '=' | '>' | '~' | '!'));
    let symbol = cursor.slice(start, len);
    let Some(operator) = MarkerOperator::COMPARISONS
        .iter()
        .find(|(known, _)| *known == symbol)
        .map(|(_, operator)| *operator)
    else {
        let found = cursor.slice(start, len.max(cursor.peek_char().map_or(0, char::len_utf8)));
        return Err(cursor.error(
            format!("Expected a marker operator such as `>=` or `not in`, found `{found}`"),
            start,
            found.len().max(1),
        ));
    };
    cursor.take_while(|c| matches!(c, '<' | '=' | '>' | '~' | '!'));
    Ok(operator)
}

/// A quoted string or a marker variable.
fn parse_value(cursor: &mut Cursor) -> Result<MarkerValue, Pep508Error> {
    match cursor.peek() {
        Some((open, quote @ ('"' | '\''))) => {
            cursor.next();
            let (start, len) = cursor.take_while(|c| c != quote);
            cursor.next_expect_char(quote, open)?;
            Ok(MarkerValue::QuotedString(cursor.slice(start, len).to_string()))
        }
        Some(_) => {
            let (start, len) = cursor.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '.'));
            let name = cursor.slice(start, len);
            let variable = MarkerVariable::from_str(name).map_err(|_| {
                let message = if name.is_empty() {
                    "Expected a marker variable or a quoted string".to_string()
                } else {
                    format!("Unknown marker variable `{name}`")
                };
                cursor.error(message, start, len.max(1))
            })?;
            Ok(MarkerValue::Variable(variable))
        }
        None => Err(cursor.error(
            "Expected a marker variable or a quoted string, found end of input",
            cursor.pos(),
            1,
        )),
    }
}

/// A parenthesized marker or a single comparison.
fn parse_atom(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    cursor.eat_whitespace();
    if let Some(open) = cursor.eat_char('(') {
        let tree = parse_or(cursor)?;
        cursor.eat_whitespace();
        cursor.next_expect_char(')', open)?;
        return Ok(tree);
    }

    let l_value = parse_value(cursor)?;
    cursor.eat_whitespace();
    let operator = parse_operator(cursor)?;
    cursor.eat_whitespace();
    let r_value = parse_value(cursor)?;
    Ok(MarkerTree::Expression(MarkerExpression {
        l_value,
        operator,
        r_value,
    }))
}

/// `operand (keyword operand)*`, collapsed to the operand itself if it stands alone.
fn parse_chain(
    cursor: &mut Cursor,
    keyword: &str,
    operand: fn(&mut Cursor) -> Result<MarkerTree, Pep508Error>,
    combine: fn(Vec<MarkerTree>) -> MarkerTree,
) -> Result<MarkerTree, Pep508Error> {
    let mut operands = vec![operand(cursor)?];
    loop {
        cursor.eat_whitespace();
        if !eat_keyword(cursor, keyword) {
            break;
        }
        operands.push(operand(cursor)?);
    }
    if operands.len() == 1 {
        Ok(operands.remove(0))
    } else {
        Ok(combine(operands))
    }
}

fn parse_and(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_chain(cursor, "and", parse_atom, MarkerTree::And)
}

fn parse_or(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_chain(cursor, "or", parse_and, MarkerTree::Or)
}

/// Parse a complete marker; `and` binds tighter than `or`.
pub(crate) fn parse_markers_cursor(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    let tree = parse_or(cursor)?;
    cursor.eat_whitespace();
    if let Some((pos, other)) = cursor.peek() {
        return Err(cursor.error(
            format!("Unexpected `{other}` in marker, expected `and`, `or` or the end"),
            pos,
            cursor.remaining(),
        ));
    }
    Ok(tree)
}

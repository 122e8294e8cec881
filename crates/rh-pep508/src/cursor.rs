use crate::{Pep508Error, Pep508ErrorSource};

/// A position in a requirement string, advanced one `char` at a time.
///
/// Positions are byte offsets into the input, for error spans.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Number of bytes not consumed yet.
    pub(crate) fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    pub(crate) fn slice(&self, start: usize, len: usize) -> &'a str {
        &self.input[start..start + len]
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub(crate) fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn peek(&self) -> Option<(usize, char)> {
        self.peek_char().map(|c| (self.pos, c))
    }

    pub(crate) fn next(&mut self) -> Option<(usize, char)> {
        let (pos, c) = self.peek()?;
        self.pos += c.len_utf8();
        Some((pos, c))
    }

    /// Consume `token` if it comes next, returning its position.
    pub(crate) fn eat_char(&mut self, token: char) -> Option<usize> {
        if self.peek_char() == Some(token) {
            self.next().map(|(pos, _)| pos)
        } else {
            None
        }
    }

    pub(crate) fn eat_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    /// The start and byte length of the run of chars matching `condition`, without consuming it.
    pub(crate) fn peek_while(&self, condition: impl Fn(char) -> bool) -> (usize, usize) {
        let len = self
            .rest()
            .find(|c| !condition(c))
            .unwrap_or_else(|| self.remaining());
        (self.pos, len)
    }

    /// Like [`Cursor::peek_while`], but consumes the run.
    pub(crate) fn take_while(&mut self, condition: impl Fn(char) -> bool) -> (usize, usize) {
        let (start, len) = self.peek_while(condition);
        self.pos += len;
        (start, len)
    }

    /// Consume `expected`, or fail with a span at the offending char.
    pub(crate) fn next_expect_char(
        &mut self,
        expected: char,
        span_start: usize,
    ) -> Result<(), Pep508Error> {
        let (message, start, len) = match self.next() {
            Some((_, found)) if found == expected => return Ok(()),
            Some((pos, found)) => (
                format!("Expected '{expected}', found '{found}'"),
                pos,
                found.len_utf8(),
            ),
            None => (
                format!("Expected '{expected}', found end of dependency specification"),
                span_start,
                1,
            ),
        };
        Err(self.error(message, start, len))
    }

    /// An error spanning `len` bytes from `start`, reported against the whole input.
    pub(crate) fn error(
        &self,
        message: impl Into<Pep508ErrorSource>,
        start: usize,
        len: usize,
    ) -> Pep508Error {
        Pep508Error {
            message: message.into(),
            start,
            len,
            input: self.input.to_string(),
        }
    }
}

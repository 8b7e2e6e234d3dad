//! RFC 1960 style filter expressions over attribute maps.
//!
//! Supported grammar: `(&(..)(..))`, `(|(..)..)`, `(!(..))` and the leaf
//! operators `=`, `~=`, `>=`, `<=`, presence `(attr=*)` and substring
//! `(attr=ab*cd*)`. Values may escape `( ) * \` with a backslash.

use std::fmt;

use thiserror::Error;

use crate::value::Attrs;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unexpected end of filter at offset {0}")]
    UnexpectedEnd(usize),

    #[error("unexpected character '{ch}' at offset {at}")]
    Unexpected { ch: char, at: usize },

    #[error("empty attribute name at offset {0}")]
    EmptyAttribute(usize),

    #[error("empty composite filter at offset {0}")]
    EmptyComposite(usize),

    #[error("trailing characters after filter at offset {0}")]
    Trailing(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Eq(String, String),
    Approx(String, String),
    GtEq(String, String),
    LtEq(String, String),
    Present(String),
    /// Substring pattern split on `*`; empty first/last entries mean open
    /// start/end.
    Substring(String, Vec<String>),
}

impl Filter {
    pub fn parse(input: &str) -> Result<Filter, FilterError> {
        let mut parser = Parser {
            bytes: input.as_bytes(),
            pos: 0,
        };
        parser.skip_whitespace();
        let filter = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.bytes.len() {
            return Err(FilterError::Trailing(parser.pos));
        }
        Ok(filter)
    }

    pub fn matches(&self, attrs: &Attrs) -> bool {
        match self {
            Filter::And(subs) => subs.iter().all(|f| f.matches(attrs)),
            Filter::Or(subs) => subs.iter().any(|f| f.matches(attrs)),
            Filter::Not(inner) => !inner.matches(attrs),
            Filter::Eq(attr, literal) => {
                attrs.get(attr).map_or(false, |v| v.matches_eq(literal))
            }
            Filter::Approx(attr, literal) => {
                attrs.get(attr).map_or(false, |v| v.matches_approx(literal))
            }
            Filter::GtEq(attr, literal) => {
                attrs.get(attr).map_or(false, |v| v.matches_cmp(literal, true))
            }
            Filter::LtEq(attr, literal) => {
                attrs.get(attr).map_or(false, |v| v.matches_cmp(literal, false))
            }
            Filter::Present(attr) => attrs.contains_key(attr),
            Filter::Substring(attr, parts) => attrs
                .get(attr)
                .map_or(false, |v| v.matches_substring(parts)),
        }
    }

    /// Conjunction of `self` and `other`, flattening when `self` already is
    /// a conjunction.
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut subs) => {
                subs.push(other);
                Filter::And(subs)
            }
            first => Filter::And(vec![first, other]),
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn skip_whitespace(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .map_or(false, |b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Result<u8, FilterError> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or(FilterError::UnexpectedEnd(self.pos))
    }

    fn expect(&mut self, b: u8) -> Result<(), FilterError> {
        let got = self.peek()?;
        if got != b {
            return Err(FilterError::Unexpected {
                ch: got as char,
                at: self.pos,
            });
        }
        self.pos += 1;
        Ok(())
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(')?;
        self.skip_whitespace();
        let filter = match self.peek()? {
            b'&' => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            b'|' => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            b'!' => {
                self.pos += 1;
                self.skip_whitespace();
                Filter::Not(Box::new(self.parse_filter()?))
            }
            _ => self.parse_item()?,
        };
        self.skip_whitespace();
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut subs = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek()? != b'(' {
                break;
            }
            subs.push(self.parse_filter()?);
        }
        if subs.is_empty() {
            return Err(FilterError::EmptyComposite(self.pos));
        }
        Ok(subs)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        while !matches!(self.peek()?, b'=' | b'~' | b'<' | b'>' | b'(' | b')') {
            self.pos += 1;
        }
        let attr = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| FilterError::Unexpected {
                ch: '?',
                at: start,
            })?
            .trim()
            .to_string();
        if attr.is_empty() {
            return Err(FilterError::EmptyAttribute(self.pos));
        }
        match self.peek()? {
            b'~' => {
                self.pos += 1;
                self.expect(b'=')?;
                let (value, _) = self.parse_value()?;
                Ok(Filter::Approx(attr, value))
            }
            b'>' => {
                self.pos += 1;
                self.expect(b'=')?;
                let (value, _) = self.parse_value()?;
                Ok(Filter::GtEq(attr, value))
            }
            b'<' => {
                self.pos += 1;
                self.expect(b'=')?;
                let (value, _) = self.parse_value()?;
                Ok(Filter::LtEq(attr, value))
            }
            b'=' => {
                self.pos += 1;
                let (value, stars) = self.parse_value()?;
                if stars.is_empty() {
                    return Ok(Filter::Eq(attr, value));
                }
                if value.is_empty() && stars.len() == 1 {
                    return Ok(Filter::Present(attr));
                }
                Ok(Filter::Substring(attr, split_pattern(&value, &stars)))
            }
            other => Err(FilterError::Unexpected {
                ch: other as char,
                at: self.pos,
            }),
        }
    }

    /// Reads a literal up to the closing `)`. Returns the unescaped text
    /// and the positions (within that text) of unescaped `*` markers.
    fn parse_value(&mut self) -> Result<(String, Vec<usize>), FilterError> {
        let mut value = String::new();
        let mut stars = Vec::new();
        loop {
            match self.peek()? {
                b')' => break,
                b'(' => {
                    return Err(FilterError::Unexpected {
                        ch: '(',
                        at: self.pos,
                    })
                }
                b'\\' => {
                    self.pos += 1;
                    self.peek()?;
                    let rest = std::str::from_utf8(&self.bytes[self.pos..]).map_err(|_| {
                        FilterError::Unexpected {
                            ch: '?',
                            at: self.pos,
                        }
                    })?;
                    if let Some(ch) = rest.chars().next() {
                        value.push(ch);
                        self.pos += ch.len_utf8();
                    }
                }
                b'*' => {
                    stars.push(value.len());
                    self.pos += 1;
                }
                _ => {
                    let start = self.pos;
                    while !matches!(self.peek()?, b')' | b'(' | b'\\' | b'*') {
                        self.pos += 1;
                    }
                    value.push_str(
                        std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| {
                            FilterError::Unexpected {
                                ch: '?',
                                at: start,
                            }
                        })?,
                    );
                }
            }
        }
        Ok((value, stars))
    }
}

fn split_pattern(value: &str, stars: &[usize]) -> Vec<String> {
    let mut parts = Vec::with_capacity(stars.len() + 1);
    let mut prev = 0;
    for &at in stars {
        parts.push(value[prev..at].to_string());
        prev = at;
    }
    parts.push(value[prev..].to_string());
    parts
}

fn escape_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for ch in value.chars() {
        if matches!(ch, '(' | ')' | '*' | '\\') {
            write!(f, "\\")?;
        }
        write!(f, "{ch}")?;
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(subs) => {
                write!(f, "(&")?;
                for sub in subs {
                    write!(f, "{sub}")?;
                }
                write!(f, ")")
            }
            Filter::Or(subs) => {
                write!(f, "(|")?;
                for sub in subs {
                    write!(f, "{sub}")?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Eq(attr, value) => {
                write!(f, "({attr}=")?;
                escape_value(f, value)?;
                write!(f, ")")
            }
            Filter::Approx(attr, value) => {
                write!(f, "({attr}~=")?;
                escape_value(f, value)?;
                write!(f, ")")
            }
            Filter::GtEq(attr, value) => {
                write!(f, "({attr}>=")?;
                escape_value(f, value)?;
                write!(f, ")")
            }
            Filter::LtEq(attr, value) => {
                write!(f, "({attr}<=")?;
                escape_value(f, value)?;
                write!(f, ")")
            }
            Filter::Present(attr) => write!(f, "({attr}=*)"),
            Filter::Substring(attr, parts) => {
                write!(f, "({attr}=")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    escape_value(f, part)?;
                }
                write!(f, ")")
            }
        }
    }
}

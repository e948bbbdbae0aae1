//! LDAP-style service filters
//!
//! Filters select registrations by their properties, e.g.
//! `(&(objectClass=Greeter)(|(lang=en)(lang=fr))(service.ranking>=10))`.
//! Keys match case-insensitively; the literal is coerced to the type of the
//! property it is compared with.

use std::fmt;
use std::str::FromStr;

use crate::registry::properties::{Properties, PropertyValue};
use crate::registry::traits::RegistryError;

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal { key: String, value: String },
    Approx { key: String, value: String },
    GreaterEq { key: String, value: String },
    LessEq { key: String, value: String },
    Present { key: String },
    Substring {
        key: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

impl Filter {
    /// Parse a filter string
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let mut parser = Parser::new(input);
        parser.skip_ws();
        let filter = parser.filter()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("trailing characters after filter"));
        }
        Ok(filter)
    }

    /// Shorthand for `(key=value)`
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equal {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Evaluate the filter against a property bag
    pub fn matches(&self, props: &Properties) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(props)),
            Filter::Or(items) => items.iter().any(|f| f.matches(props)),
            Filter::Not(inner) => !inner.matches(props),
            Filter::Present { key } => props.contains_key(key),
            Filter::Equal { key, value } => compare(props.get(key), value, Op::Equal),
            Filter::Approx { key, value } => compare(props.get(key), value, Op::Approx),
            Filter::GreaterEq { key, value } => compare(props.get(key), value, Op::GreaterEq),
            Filter::LessEq { key, value } => compare(props.get(key), value, Op::LessEq),
            Filter::Substring {
                key,
                initial,
                any,
                last,
            } => match props.get(key) {
                Some(PropertyValue::String(s)) => substring_match(s, initial, any, last),
                Some(PropertyValue::StringList(items)) => items
                    .iter()
                    .any(|s| substring_match(s, initial, any, last)),
                _ => false,
            },
        }
    }
}

impl FromStr for Filter {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

fn compare(value: Option<&PropertyValue>, literal: &str, op: Op) -> bool {
    let Some(value) = value else {
        return false;
    };
    match value {
        PropertyValue::String(s) => compare_str(s, literal, op),
        PropertyValue::Long(v) => compare_long(*v, literal, op),
        PropertyValue::Double(v) => compare_double(*v, literal, op),
        PropertyValue::Bool(v) => compare_bool(*v, literal, op),
        PropertyValue::StringList(items) => items.iter().any(|s| compare_str(s, literal, op)),
        PropertyValue::LongList(items) => items.iter().any(|v| compare_long(*v, literal, op)),
    }
}

fn compare_str(actual: &str, literal: &str, op: Op) -> bool {
    match op {
        Op::Equal => actual == literal,
        Op::Approx => normalize_approx(actual) == normalize_approx(literal),
        Op::GreaterEq => actual >= literal,
        Op::LessEq => actual <= literal,
    }
}

fn normalize_approx(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn compare_long(actual: i64, literal: &str, op: Op) -> bool {
    let Ok(expected) = literal.trim().parse::<i64>() else {
        return false;
    };
    match op {
        Op::Equal | Op::Approx => actual == expected,
        Op::GreaterEq => actual >= expected,
        Op::LessEq => actual <= expected,
    }
}

fn compare_double(actual: f64, literal: &str, op: Op) -> bool {
    let Ok(expected) = literal.trim().parse::<f64>() else {
        return false;
    };
    match op {
        Op::Equal | Op::Approx => actual == expected,
        Op::GreaterEq => actual >= expected,
        Op::LessEq => actual <= expected,
    }
}

fn compare_bool(actual: bool, literal: &str, op: Op) -> bool {
    let expected = match literal.trim().to_ascii_lowercase().as_str() {
        "true" => true,
        "false" => false,
        _ => return false,
    };
    match op {
        Op::Equal | Op::Approx => actual == expected,
        Op::GreaterEq | Op::LessEq => false,
    }
}

fn substring_match(
    actual: &str,
    initial: &Option<String>,
    any: &[String],
    last: &Option<String>,
) -> bool {
    let mut rest = actual;
    if let Some(initial) = initial {
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for part in any {
        match rest.find(part.as_str()) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(last.as_str()),
        None => true,
    }
}

/// Composite nesting limit; deeper input is rejected
const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn error(&self, message: &str) -> RegistryError {
        RegistryError::InvalidFilter(format!(
            "{} at position {} in '{}'",
            message, self.pos, self.input
        ))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), RegistryError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn filter(&mut self) -> Result<Filter, RegistryError> {
        self.expect('(')?;
        if self.depth >= MAX_DEPTH {
            return Err(self.error("filter nested too deeply"));
        }
        self.depth += 1;
        self.skip_ws();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_ws();
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.skip_ws();
        self.expect(')')?;
        self.depth -= 1;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, RegistryError> {
        let mut items = Vec::new();
        self.skip_ws();
        while self.peek() == Some('(') {
            items.push(self.filter()?);
            self.skip_ws();
        }
        if items.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(items)
    }

    fn item(&mut self) -> Result<Filter, RegistryError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '>' | '<' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let key: String = self.chars[start..self.pos].iter().collect();
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                Op::Equal
            }
            Some('~') => {
                self.pos += 1;
                self.expect('=')?;
                Op::Approx
            }
            Some('>') => {
                self.pos += 1;
                self.expect('=')?;
                Op::GreaterEq
            }
            Some('<') => {
                self.pos += 1;
                self.expect('=')?;
                Op::LessEq
            }
            _ => return Err(self.error("expected operator")),
        };

        let segments = self.value()?;
        if op != Op::Equal {
            if segments.len() > 1 {
                return Err(self.error("wildcard only allowed with '='"));
            }
            let value = segments.into_iter().next().unwrap_or_default();
            return Ok(match op {
                Op::Approx => Filter::Approx { key, value },
                Op::GreaterEq => Filter::GreaterEq { key, value },
                _ => Filter::LessEq { key, value },
            });
        }

        match segments.len() {
            1 => Ok(Filter::Equal {
                key,
                value: segments.into_iter().next().unwrap_or_default(),
            }),
            _ if segments.iter().all(String::is_empty) => Ok(Filter::Present { key }),
            _ => {
                let mut segments = segments;
                let last = segments.pop().filter(|s| !s.is_empty());
                let mut rest = segments.into_iter();
                let initial = rest.next().filter(|s| !s.is_empty());
                let any = rest.filter(|s| !s.is_empty()).collect();
                Ok(Filter::Substring {
                    key,
                    initial,
                    any,
                    last,
                })
            }
        }
    }

    /// Value split at unescaped `*`
    fn value(&mut self) -> Result<Vec<String>, RegistryError> {
        let mut segments = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('*') => {
                    self.pos += 1;
                    segments.push(String::new());
                }
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    self.pos += 1;
                    if let Some(last) = segments.last_mut() {
                        last.push(escaped);
                    }
                }
                Some(c) => {
                    self.pos += 1;
                    if let Some(last) = segments.last_mut() {
                        last.push(c);
                    }
                }
            }
        }
        Ok(segments)
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => {
                f.write_str("(&")?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            Filter::Or(items) => {
                f.write_str("(|")?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Equal { key, value } => write!(f, "({}={})", key, escape(value)),
            Filter::Approx { key, value } => write!(f, "({}~={})", key, escape(value)),
            Filter::GreaterEq { key, value } => write!(f, "({}>={})", key, escape(value)),
            Filter::LessEq { key, value } => write!(f, "({}<={})", key, escape(value)),
            Filter::Present { key } => write!(f, "({}=*)", key),
            Filter::Substring {
                key,
                initial,
                any,
                last,
            } => {
                write!(f, "({}=", key)?;
                if let Some(initial) = initial {
                    f.write_str(&escape(initial))?;
                }
                f.write_str("*")?;
                for part in any {
                    write!(f, "{}*", escape(part))?;
                }
                if let Some(last) = last {
                    f.write_str(&escape(last))?;
                }
                f.write_str(")")
            }
        }
    }
}

//! SCIM filter syntax parser (RFC 7644 Section 3.4.2.2).
//!
//! A recursive descent parser producing a [`FilterExpr`] tree. Precedence is
//! `not` > `and` > `or`, both binary operators associate to the left, and
//! parentheses override. Keywords and operators are case-insensitive.

use crate::error::{ScimError, ScimResult};
use crate::schema::AttributePath;

use serde_json::Number;
use std::borrow::Cow;
use std::fmt;

/// Nesting limit for groups, `not` and value paths.
const MAX_DEPTH: usize = 64;

/// SCIM filter comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Contains
    Co,
    /// Starts with
    Sw,
    /// Ends with
    Ew,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
}

impl CompareOp {
    fn from_keyword(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "co" => Some(CompareOp::Co),
            "sw" => Some(CompareOp::Sw),
            "ew" => Some(CompareOp::Ew),
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Co => "co",
            CompareOp::Sw => "sw",
            CompareOp::Ew => "ew",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        }
    }
}

/// Literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl FilterValue {
    /// Numeric reading of the literal; numeric strings are coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FilterValue::Number(n) => n.as_f64(),
            FilterValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean reading of the literal; `"true"`/`"false"` strings are coerced.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FilterValue::Bool(b) => Some(*b),
            FilterValue::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            FilterValue::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Textual reading of the literal; numbers and booleans are rendered.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FilterValue::String(s) => Some(Cow::Borrowed(s)),
            FilterValue::Number(n) => Some(Cow::Owned(n.to_string())),
            FilterValue::Bool(b) => Some(Cow::Owned(b.to_string())),
            FilterValue::Null => None,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Null => write!(f, "null"),
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::String(s) => write!(f, "{}", serde_json::Value::String(s.clone())),
        }
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// `attrPath op value`
    Compare {
        path: AttributePath,
        op: CompareOp,
        value: FilterValue,
    },
    /// `attrPath pr`
    Present(AttributePath),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    /// `attrPath[valFilter]`: some element of the attribute satisfies the
    /// inner filter, whose paths name sub-attributes
    ValuePath {
        path: AttributePath,
        filter: Box<FilterExpr>,
    },
}

impl FilterExpr {
    /// Equality clauses that must all hold for the expression to match,
    /// as `(attribute, literal)` pairs. Used to seed new elements when a
    /// filtered PATCH `add` matches nothing.
    pub fn required_equalities(&self) -> Vec<(&str, &FilterValue)> {
        match self {
            FilterExpr::Compare {
                path,
                op: CompareOp::Eq,
                value,
            } if path.sub_attribute.is_none() && *value != FilterValue::Null => {
                vec![(path.attribute.as_str(), value)]
            }
            FilterExpr::And(left, right) => {
                let mut clauses = left.required_equalities();
                clauses.extend(right.required_equalities());
                clauses
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Compare { path, op, value } => {
                write!(f, "{} {} {}", path, op.as_str(), value)
            }
            FilterExpr::Present(path) => write!(f, "{} pr", path),
            FilterExpr::And(left, right) => write!(f, "({} and {})", left, right),
            FilterExpr::Or(left, right) => write!(f, "({} or {})", left, right),
            FilterExpr::Not(inner) => write!(f, "not ({})", inner),
            FilterExpr::ValuePath { path, filter } => write!(f, "{}[{}]", path, filter),
        }
    }
}

/// Parse a SCIM filter string.
pub fn parse_filter(filter: &str) -> ScimResult<FilterExpr> {
    FilterParser::new(filter).parse()
}

/// SCIM filter parser.
pub struct FilterParser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    in_value_path: bool,
}

impl<'a> FilterParser<'a> {
    /// Create a new parser.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            in_value_path: false,
        }
    }

    /// Parse the whole input as one filter expression.
    pub fn parse(&mut self) -> ScimResult<FilterExpr> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return Err(self.error("filter is empty"));
        }
        let expr = self.parse_or()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected characters at position {}: '{}'",
                self.pos,
                &self.input[self.pos..]
            )));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> ScimResult<FilterExpr> {
        let mut left = self.parse_and()?;

        loop {
            self.skip_whitespace();
            if self.try_consume_keyword("or") {
                let right = self.parse_and()?;
                left = FilterExpr::Or(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> ScimResult<FilterExpr> {
        let mut left = self.parse_unary()?;

        loop {
            self.skip_whitespace();
            if self.try_consume_keyword("and") {
                let right = self.parse_unary()?;
                left = FilterExpr::And(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ScimResult<FilterExpr> {
        self.skip_whitespace();

        if self.try_consume_keyword("not") {
            self.skip_whitespace();
            if !self.try_consume_char('(') {
                return Err(self.error("expected '(' after 'not'"));
            }
            let expr = self.nested(|parser| parser.parse_or())?;
            self.expect_char(')', "expected ')' to close 'not' expression")?;
            return Ok(FilterExpr::Not(Box::new(expr)));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ScimResult<FilterExpr> {
        self.skip_whitespace();

        if self.try_consume_char('(') {
            let expr = self.nested(|parser| parser.parse_or())?;
            self.expect_char(')', "expected ')' to close grouped expression")?;
            return Ok(expr);
        }

        self.parse_attr_expr()
    }

    fn parse_attr_expr(&mut self) -> ScimResult<FilterExpr> {
        let path = self.parse_attribute()?;

        if self.try_consume_char('[') {
            if self.in_value_path {
                return Err(self.error("value filters cannot be nested"));
            }
            self.in_value_path = true;
            let inner = self.nested(|parser| parser.parse_or());
            self.in_value_path = false;
            let inner = inner?;
            self.expect_char(']', "expected ']' to close value filter")?;
            if self.current_char() == '.' {
                return Err(self.error("sub-attribute after a value filter is only valid in PATCH paths"));
            }
            return Ok(FilterExpr::ValuePath {
                path,
                filter: Box::new(inner),
            });
        }

        self.skip_whitespace();
        let keyword = self.parse_operator()?;
        if keyword.eq_ignore_ascii_case("pr") {
            return Ok(FilterExpr::Present(path));
        }
        let op = CompareOp::from_keyword(&keyword)
            .ok_or_else(|| self.error(format!("unknown operator '{}'", keyword)))?;

        self.skip_whitespace();
        let value = self.parse_value()?;

        Ok(FilterExpr::Compare { path, op, value })
    }

    fn parse_attribute(&mut self) -> ScimResult<AttributePath> {
        let start = self.pos;

        while self.pos < self.input.len() {
            let c = self.current_char();
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | '$') {
                self.pos += 1;
            } else {
                break;
            }
        }

        if self.pos == start {
            return Err(self.error(format!("expected attribute name at position {}", start)));
        }

        AttributePath::parse(&self.input[start..self.pos]).map_err(|reason| self.error(reason))
    }

    fn parse_operator(&mut self) -> ScimResult<String> {
        let start = self.pos;

        while self.pos < self.input.len() && self.current_char().is_ascii_alphabetic() {
            self.pos += 1;
        }

        if self.pos == start {
            return Err(self.error("expected operator"));
        }

        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_value(&mut self) -> ScimResult<FilterValue> {
        if self.current_char() == '"' {
            let start = self.pos;
            self.pos += 1;
            loop {
                match self.current_char() {
                    '\0' if self.pos >= self.input.len() => {
                        return Err(self.error("unterminated string"));
                    }
                    '\\' => self.pos += 2,
                    '"' => {
                        self.pos += 1;
                        break;
                    }
                    c => self.pos += c.len_utf8(),
                }
            }
            let literal = &self.input[start..self.pos.min(self.input.len())];
            return serde_json::from_str::<String>(literal)
                .map(FilterValue::String)
                .map_err(|e| self.error(format!("invalid string literal {}: {}", literal, e)));
        }

        let start = self.pos;
        while self.pos < self.input.len() {
            let c = self.current_char();
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let token = &self.input[start..self.pos];
        match token {
            "" => Err(self.error("expected value")),
            t if t.eq_ignore_ascii_case("true") => Ok(FilterValue::Bool(true)),
            t if t.eq_ignore_ascii_case("false") => Ok(FilterValue::Bool(false)),
            t if t.eq_ignore_ascii_case("null") => Ok(FilterValue::Null),
            t => serde_json::from_str::<Number>(t)
                .map(FilterValue::Number)
                .map_err(|_| self.error(format!("invalid literal '{}'", t))),
        }
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> ScimResult<T>,
    ) -> ScimResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("filter nests too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expect_char(&mut self, c: char, message: &str) -> ScimResult<()> {
        self.skip_whitespace();
        if self.try_consume_char(c) {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.current_char().is_whitespace() {
            self.pos += self.current_char().len_utf8();
        }
    }

    fn current_char(&self) -> char {
        self.input
            .get(self.pos..)
            .and_then(|rest| rest.chars().next())
            .unwrap_or('\0')
    }

    fn try_consume_char(&mut self, c: char) -> bool {
        if self.pos < self.input.len() && self.current_char() == c {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Consume `keyword` when it stands alone (not a prefix of a longer name).
    fn try_consume_keyword(&mut self, keyword: &str) -> bool {
        let end = self.pos + keyword.len();
        let Some(candidate) = self.input.get(self.pos..end) else {
            return false;
        };
        if !candidate.eq_ignore_ascii_case(keyword) {
            return false;
        }
        let next = self.input.get(end..).and_then(|rest| rest.chars().next());
        if next.is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':')) {
            return false;
        }
        self.pos = end;
        true
    }

    fn error(&self, reason: impl Into<String>) -> ScimError {
        ScimError::malformed_filter(self.input, reason)
    }
}

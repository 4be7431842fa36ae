//! Selection formula reader.
//!
//! Parses the subset of the directory's formula language the query compiler
//! emits (comparisons, `@LowerCase`, `@Contains`, `@Begins`, `@Ends`, `&`,
//! `|`, `!`, text lists joined with `:`) and evaluates it against a
//! [`Record`]. The in-process directories use this to run searches.

use std::cmp::Ordering;

use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{ItemValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Text predicate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFunction {
    Contains,
    Begins,
    Ends,
}

impl TextFunction {
    pub fn name(&self) -> &'static str {
        match self {
            TextFunction::Contains => "@Contains",
            TextFunction::Begins => "@Begins",
            TextFunction::Ends => "@Ends",
        }
    }

    fn matches(&self, haystack: &str, needle: &str) -> bool {
        match self {
            TextFunction::Contains => haystack.contains(needle),
            TextFunction::Begins => haystack.starts_with(needle),
            TextFunction::Ends => haystack.ends_with(needle),
        }
    }
}

/// A scalar formula value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(f64),
}

impl Scalar {
    fn as_text(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            Scalar::Number(n) => n.to_string(),
        }
    }

    fn compare(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            _ => self.as_text().cmp(&other.as_text()),
        }
    }

    fn is_true(&self) -> bool {
        match self {
            Scalar::Number(n) => *n != 0.0,
            Scalar::Text(s) => !s.is_empty(),
        }
    }
}

/// Parsed formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    /// A literal, or a list of literals joined with `:`
    Literal(Vec<Scalar>),
    Field(String),
    LowerCase(Box<Formula>),
    Call(TextFunction, Box<Formula>, Box<Formula>),
    Compare(CompareOp, Box<Formula>, Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Not(Box<Formula>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Amp,
    Pipe,
    Bang,
    Colon,
    Semi,
    Op(CompareOp),
    Str(String),
    Num(f64),
    Func(String),
    Ident(String),
}

fn tokenize(input: &str) -> ConnectorResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' => {
                tokens.push(Token::Amp);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semi);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 1;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Le));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op(CompareOp::Lt));
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Ge));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(CompareOp::Gt));
                i += 1;
            }
            '"' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ConnectorError::FilterParse(
                                "Unterminated string literal".to_string(),
                            ))
                        }
                        Some('\\') => {
                            let escaped = chars.get(i + 1).ok_or_else(|| {
                                ConnectorError::FilterParse("Dangling escape".to_string())
                            })?;
                            text.push(*escaped);
                            i += 2;
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            text.push(*c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal.parse::<f64>().map_err(|_| {
                    ConnectorError::FilterParse(format!("Invalid number: {}", literal))
                })?;
                tokens.push(Token::Num(number));
            }
            c if c == '@' || c == '$' || c.is_alphabetic() || c == '_' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if c == '@' {
                    tokens.push(Token::Func(word));
                } else {
                    tokens.push(Token::Ident(word));
                }
            }
            other => {
                return Err(ConnectorError::FilterParse(format!(
                    "Unexpected character '{}' in formula",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

struct FormulaParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl FormulaParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> ConnectorResult<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            other => Err(ConnectorError::FilterParse(format!(
                "Expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn parse_or(&mut self) -> ConnectorResult<Formula> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            let right = self.parse_and()?;
            left = Formula::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ConnectorResult<Formula> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::Amp) {
            self.advance();
            let right = self.parse_unary()?;
            left = Formula::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ConnectorResult<Formula> {
        if self.peek() == Some(&Token::Bang) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Formula::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ConnectorResult<Formula> {
        let left = self.parse_list()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.advance();
            let right = self.parse_list()?;
            return Ok(Formula::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_list(&mut self) -> ConnectorResult<Formula> {
        let first = self.parse_atom()?;
        if self.peek() != Some(&Token::Colon) {
            return Ok(first);
        }

        let mut scalars = literal_scalars(first)?;
        while self.peek() == Some(&Token::Colon) {
            self.advance();
            scalars.extend(literal_scalars(self.parse_atom()?)?);
        }
        Ok(Formula::Literal(scalars))
    }

    fn parse_atom(&mut self) -> ConnectorResult<Formula> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Str(text)) => Ok(Formula::Literal(vec![Scalar::Text(text)])),
            Some(Token::Num(number)) => Ok(Formula::Literal(vec![Scalar::Number(number)])),
            Some(Token::Ident(name)) => Ok(Formula::Field(name)),
            Some(Token::Func(name)) => self.parse_call(&name),
            other => Err(ConnectorError::FilterParse(format!(
                "Unexpected token {:?}",
                other
            ))),
        }
    }

    fn parse_call(&mut self, name: &str) -> ConnectorResult<Formula> {
        self.expect(Token::LParen)?;
        let formula = match name.to_ascii_lowercase().as_str() {
            "@lowercase" => Formula::LowerCase(Box::new(self.parse_or()?)),
            "@contains" | "@begins" | "@ends" => {
                let function = match name.to_ascii_lowercase().as_str() {
                    "@contains" => TextFunction::Contains,
                    "@begins" => TextFunction::Begins,
                    _ => TextFunction::Ends,
                };
                let haystack = self.parse_or()?;
                self.expect(Token::Semi)?;
                let needle = self.parse_or()?;
                Formula::Call(function, Box::new(haystack), Box::new(needle))
            }
            _ => {
                return Err(ConnectorError::FilterParse(format!(
                    "Unsupported function {}",
                    name
                )))
            }
        };
        self.expect(Token::RParen)?;
        Ok(formula)
    }
}

fn literal_scalars(formula: Formula) -> ConnectorResult<Vec<Scalar>> {
    match formula {
        Formula::Literal(scalars) => Ok(scalars),
        other => Err(ConnectorError::FilterParse(format!(
            "Only literals can be joined into a list: {:?}",
            other
        ))),
    }
}

/// Parse a selection formula
pub fn parse_formula(input: &str) -> ConnectorResult<Formula> {
    let tokens = tokenize(input)?;
    let mut parser = FormulaParser { tokens, pos: 0 };
    let formula = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(ConnectorError::FilterParse(format!(
            "Trailing input in formula: {}",
            input
        )));
    }
    Ok(formula)
}

fn field_values(record: &Record, name: &str) -> Vec<Scalar> {
    if name.eq_ignore_ascii_case("NoteID") {
        return record
            .id
            .iter()
            .map(|id| Scalar::Text(id.clone()))
            .collect();
    }

    match record.item(name) {
        Some(values) if !values.is_empty() => values
            .iter()
            .map(|value| match value {
                ItemValue::Text(s) => Scalar::Text(s.clone()),
                ItemValue::Number(n) => Scalar::Number(*n),
                ItemValue::DateTime(dt) => Scalar::Number(dt.timestamp_millis() as f64),
            })
            .collect(),
        // Missing fields read as empty text
        _ => vec![Scalar::Text(String::new())],
    }
}

impl Formula {
    fn values(&self, record: &Record) -> Vec<Scalar> {
        match self {
            Formula::Literal(scalars) => scalars.clone(),
            Formula::Field(name) => field_values(record, name),
            Formula::LowerCase(inner) => inner
                .values(record)
                .into_iter()
                .map(|scalar| match scalar {
                    Scalar::Text(s) => Scalar::Text(s.to_lowercase()),
                    number => number,
                })
                .collect(),
            predicate => {
                let truth = if predicate.matches(record) { 1.0 } else { 0.0 };
                vec![Scalar::Number(truth)]
            }
        }
    }

    /// Evaluate the formula as a selection predicate
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Formula::And(left, right) => left.matches(record) && right.matches(record),
            Formula::Or(left, right) => left.matches(record) || right.matches(record),
            Formula::Not(inner) => !inner.matches(record),
            Formula::Compare(op, left, right) => {
                let left = left.values(record);
                let right = right.values(record);
                let any = |wanted: &dyn Fn(Ordering) -> bool| {
                    left.iter()
                        .any(|l| right.iter().any(|r| wanted(l.compare(r))))
                };
                match op {
                    CompareOp::Eq => any(&|o| o == Ordering::Equal),
                    CompareOp::Ne => !any(&|o| o == Ordering::Equal),
                    CompareOp::Lt => any(&|o| o == Ordering::Less),
                    CompareOp::Le => any(&|o| o != Ordering::Greater),
                    CompareOp::Gt => any(&|o| o == Ordering::Greater),
                    CompareOp::Ge => any(&|o| o != Ordering::Less),
                }
            }
            Formula::Call(function, haystack, needle) => {
                let haystack = haystack.values(record);
                let needle = needle.values(record);
                haystack.iter().any(|h| {
                    needle
                        .iter()
                        .any(|n| function.matches(&h.as_text(), &n.as_text()))
                })
            }
            value => value.values(record).iter().any(Scalar::is_true),
        }
    }
}

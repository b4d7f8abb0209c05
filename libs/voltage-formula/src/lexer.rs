//! Expression tokenizer
//!
//! Splits formula text into lexemes: numeric, string and date literals,
//! identifiers, operator symbols and punctuation. Every lexeme records the
//! byte offset it starts at so parse failures can point at the culprit.

use crate::error::{FormulaError, Result};
use crate::operand::parse_timestamp;
use chrono::{DateTime, Utc};

/// Operator symbols, longest first so `<=` wins over `<`
const SYMBOLS: &[&str] = &[
    "<=", ">=", "<>", "==", "!=", "+", "-", "*", "/", "=", "<", ">", "!",
];

#[derive(Debug, Clone, PartialEq)]
pub enum LexemeKind {
    Number(f64),
    Text(String),
    Date(DateTime<Utc>),
    Identifier(String),
    Symbol(&'static str),
    OpenParen,
    CloseParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub kind: LexemeKind,
    /// Byte offset into the source text
    pub position: usize,
    /// Source text of the lexeme
    pub text: String,
}

/// Tokenize formula text
pub fn tokenize(source: &str) -> Result<Vec<Lexeme>> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            index: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).map(|(_, c)| *c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).map(|(_, c)| *c)
    }

    /// Byte offset of the current char (source length at the end)
    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|(pos, _)| *pos)
            .unwrap_or(self.source.len())
    }

    fn run(mut self) -> Result<Vec<Lexeme>> {
        let mut lexemes = Vec::new();

        while let Some(c) = self.peek() {
            let start = self.offset();
            let kind = match c {
                c if c.is_whitespace() => {
                    self.index += 1;
                    continue;
                },
                '0'..='9' => self.number(start)?,
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number(start)?,
                '"' | '\'' => self.string(start, c)?,
                '#' => self.date(start)?,
                '(' => {
                    self.index += 1;
                    LexemeKind::OpenParen
                },
                ')' => {
                    self.index += 1;
                    LexemeKind::CloseParen
                },
                ',' => {
                    self.index += 1;
                    LexemeKind::Comma
                },
                c if c.is_alphabetic() || c == '_' => {
                    while self
                        .peek()
                        .is_some_and(|n| n.is_alphanumeric() || n == '_')
                    {
                        self.index += 1;
                    }
                    LexemeKind::Identifier(self.source[start..self.offset()].to_string())
                },
                _ => self.symbol(start)?,
            };
            lexemes.push(Lexeme {
                kind,
                position: start,
                text: self.source[start..self.offset()].to_string(),
            });
        }

        Ok(lexemes)
    }

    fn number(&mut self, start: usize) -> Result<LexemeKind> {
        self.digits();
        if self.peek() == Some('.') {
            self.index += 1;
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let exponent_at = if signed { 2 } else { 1 };
            if self.peek_at(exponent_at).is_some_and(|c| c.is_ascii_digit()) {
                self.index += exponent_at;
                self.digits();
            }
        }

        // `1.2.3`, `2x`
        if self
            .peek()
            .is_some_and(|c| c == '.' || c == '_' || c.is_alphanumeric())
        {
            return Err(FormulaError::syntax(start, "malformed numeric literal"));
        }

        let text = &self.source[start..self.offset()];
        text.parse::<f64>()
            .map(LexemeKind::Number)
            .map_err(|_| FormulaError::syntax(start, format!("malformed numeric literal '{}'", text)))
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.index += 1;
        }
    }

    /// Quoted text; a doubled quote inside is an escaped quote
    fn string(&mut self, start: usize, quote: char) -> Result<LexemeKind> {
        self.index += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(FormulaError::syntax(start, "unterminated string literal")),
                Some(c) if c == quote => {
                    self.index += 1;
                    if self.peek() == Some(quote) {
                        text.push(quote);
                        self.index += 1;
                    } else {
                        return Ok(LexemeKind::Text(text));
                    }
                },
                Some(c) => {
                    text.push(c);
                    self.index += 1;
                },
            }
        }
    }

    /// `#2024-01-02 03:04:05#`
    fn date(&mut self, start: usize) -> Result<LexemeKind> {
        self.index += 1;
        let body_start = self.offset();
        while self.peek().is_some_and(|c| c != '#') {
            self.index += 1;
        }
        if self.peek().is_none() {
            return Err(FormulaError::syntax(start, "unterminated date literal"));
        }
        let body = &self.source[body_start..self.offset()];
        self.index += 1;

        parse_timestamp(body)
            .map(LexemeKind::Date)
            .ok_or_else(|| FormulaError::syntax(start, format!("malformed date literal '{}'", body)))
    }

    fn symbol(&mut self, start: usize) -> Result<LexemeKind> {
        let rest = &self.source[start..];
        let symbol = SYMBOLS
            .iter()
            .copied()
            .find(|s| rest.starts_with(*s))
            .ok_or_else(|| {
                let c = rest.chars().next().unwrap_or_default();
                FormulaError::syntax(start, format!("unexpected character '{}'", c))
            })?;
        // Symbols are ASCII: one char per byte
        self.index += symbol.len();
        Ok(LexemeKind::Symbol(symbol))
    }
}

//! Formula parser
//!
//! Turns infix formula text into an executable (postfix) token sequence
//! using an explicit operator stack (shunting-yard):
//!
//! - literals and input references go straight to the output
//! - an operator first moves every pending operator that binds at least as
//!   tightly (strictly tighter for right-associative ones) to the output
//! - prefix operators are pushed without popping anything
//! - `Name(a, b)` pushes a call frame; each `,` and the closing `)` flush
//!   the current argument, and the function is emitted after its arguments
//!
//! Identifiers are resolved at parse time: unknown names fail here, never
//! during evaluation.

use crate::builtin::operators::{LOGICAL_NOT, NEGATE};
use crate::error::{FormulaError, Result};
use crate::lexer::{tokenize, Lexeme, LexemeKind};
use crate::operand::Operand;
use crate::registry::FunctionRegistry;
use crate::token::{Associativity, Fixity, InputRef, Literal, Token, TokenKind};
use std::collections::HashSet;

/// Result of a successful parse
#[derive(Debug)]
pub struct ParsedFormula {
    /// Tokens in evaluation order
    pub tokens: Vec<Box<dyn Token>>,
    /// Input slots referenced by the formula, in order of first use
    pub inputs: Vec<String>,
}

/// Formula parser bound to a registry and a set of declared input slots
#[derive(Debug)]
pub struct Parser<'r> {
    registry: &'r FunctionRegistry,
    inputs: HashSet<String>,
}

/// Entry on the pending-operator stack
enum Pending {
    Operator {
        token: Box<dyn Token>,
        precedence: u8,
    },
    Call {
        token: Box<dyn Token>,
        position: usize,
        /// Completed arguments so far
        args: usize,
    },
    Group {
        position: usize,
    },
}

impl<'r> Parser<'r> {
    pub fn new(registry: &'r FunctionRegistry) -> Self {
        Self {
            registry,
            inputs: HashSet::new(),
        }
    }

    /// Declare the input slots bare identifiers may refer to
    pub fn with_inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn parse(&self, source: &str) -> Result<ParsedFormula> {
        let lexemes = tokenize(source)?;
        let mut state = ParseState::new();

        for (index, lexeme) in lexemes.iter().enumerate() {
            let previous = index.checked_sub(1).and_then(|i| lexemes.get(i));
            let next = lexemes.get(index + 1);
            self.step(&mut state, lexeme, previous, next)?;
        }

        state.finish(source.len())
    }

    fn step(
        &self,
        state: &mut ParseState,
        lexeme: &Lexeme,
        previous: Option<&Lexeme>,
        next: Option<&Lexeme>,
    ) -> Result<()> {
        let position = lexeme.position;

        match &lexeme.kind {
            LexemeKind::Number(v) => state.operand(position, literal(lexeme, Operand::literal(*v))),
            LexemeKind::Text(s) => {
                state.operand(position, literal(lexeme, Operand::literal(s.as_str())))
            },
            LexemeKind::Date(ts) => state.operand(position, literal(lexeme, Operand::literal(*ts))),
            LexemeKind::Identifier(name) => {
                let is_call = matches!(next, Some(l) if l.kind == LexemeKind::OpenParen);
                self.identifier(state, name, position, is_call)
            },
            LexemeKind::Symbol(symbol) => self.symbol(state, symbol, position),
            LexemeKind::OpenParen => {
                if state.call_opened {
                    // `(` of `Name(` was consumed together with the name
                    state.call_opened = false;
                    return Ok(());
                }
                if !state.expect_operand {
                    return Err(FormulaError::syntax(position, "unexpected '('"));
                }
                state.pending.push(Pending::Group { position });
                Ok(())
            },
            LexemeKind::Comma => state.comma(position),
            LexemeKind::CloseParen => {
                let empty = matches!(previous, Some(l) if l.kind == LexemeKind::OpenParen);
                state.close(position, empty)
            },
        }
    }

    fn identifier(
        &self,
        state: &mut ParseState,
        name: &str,
        position: usize,
        is_call: bool,
    ) -> Result<()> {
        if !state.expect_operand {
            // Only an infix word operator (`MOD`, `AND`, ...) can follow an operand
            return match self.registry.create(name) {
                Ok(token) if is_infix(token.as_ref()) => state.infix(token),
                _ => Err(FormulaError::syntax(
                    position,
                    format!("unexpected identifier '{}'", name),
                )),
            };
        }

        if is_call {
            let token = self.registry.create(name).map_err(|_| {
                FormulaError::syntax(position, format!("unknown function '{}'", name))
            })?;
            state.pending.push(Pending::Call {
                token,
                position,
                args: 0,
            });
            state.call_opened = true;
            return Ok(());
        }

        if self.inputs.contains(name) {
            if !state.inputs.iter().any(|n| n == name) {
                state.inputs.push(name.to_string());
            }
            return state.operand(position, Box::new(InputRef::new(name)));
        }

        let mut token = self.registry.create(name).map_err(|_| {
            FormulaError::syntax(position, format!("unknown identifier '{}'", name))
        })?;
        match token.kind() {
            TokenKind::Operator {
                fixity: Fixity::Prefix,
                precedence,
                ..
            } => {
                state.pending.push(Pending::Operator { token, precedence });
                Ok(())
            },
            TokenKind::Operator { .. } => Err(FormulaError::syntax(
                position,
                format!("operator '{}' is missing its left operand", name),
            )),
            _ if token.arity().accepts(0) => {
                token.bind_arguments(0);
                state.operand(position, token)
            },
            _ => Err(FormulaError::syntax(
                position,
                format!("function '{}' requires {} argument(s)", name, token.arity()),
            )),
        }
    }

    fn symbol(&self, state: &mut ParseState, symbol: &str, position: usize) -> Result<()> {
        if state.expect_operand {
            let name = match symbol {
                // Unary plus is a no-op
                "+" => return Ok(()),
                "-" => NEGATE,
                "!" => LOGICAL_NOT,
                _ => {
                    return Err(FormulaError::syntax(
                        position,
                        format!("operator '{}' is missing its left operand", symbol),
                    ))
                },
            };
            let token = self.registry.create(name).map_err(|_| {
                FormulaError::syntax(position, format!("operator '{}' is not registered", symbol))
            })?;
            let precedence = match token.kind() {
                TokenKind::Operator { precedence, .. } => precedence,
                _ => u8::MAX,
            };
            state.pending.push(Pending::Operator { token, precedence });
            return Ok(());
        }

        match self.registry.create(symbol) {
            Ok(token) if is_infix(token.as_ref()) => state.infix(token),
            Ok(_) => Err(FormulaError::syntax(
                position,
                format!("'{}' is not a binary operator", symbol),
            )),
            Err(_) => Err(FormulaError::syntax(
                position,
                format!("operator '{}' is not registered", symbol),
            )),
        }
    }
}

struct ParseState {
    output: Vec<Box<dyn Token>>,
    pending: Vec<Pending>,
    inputs: Vec<String>,
    /// An operand (or prefix operator / open group) is required next
    expect_operand: bool,
    /// The last identifier opened a call whose `(` is the next lexeme
    call_opened: bool,
}

impl ParseState {
    fn new() -> Self {
        Self {
            output: Vec::new(),
            pending: Vec::new(),
            inputs: Vec::new(),
            expect_operand: true,
            call_opened: false,
        }
    }

    fn operand(&mut self, position: usize, token: Box<dyn Token>) -> Result<()> {
        if !self.expect_operand {
            return Err(FormulaError::syntax(
                position,
                format!("unexpected '{}' after an operand", token.name()),
            ));
        }
        self.output.push(token);
        self.expect_operand = false;
        Ok(())
    }

    fn infix(&mut self, token: Box<dyn Token>) -> Result<()> {
        let (precedence, associativity) = match token.kind() {
            TokenKind::Operator {
                precedence,
                associativity,
                ..
            } => (precedence, associativity),
            _ => (u8::MAX, Associativity::Left),
        };

        while let Some(Pending::Operator { precedence: top, .. }) = self.pending.last() {
            let pops = *top > precedence
                || (*top == precedence && associativity == Associativity::Left);
            if !pops {
                break;
            }
            if let Some(Pending::Operator { token, .. }) = self.pending.pop() {
                self.output.push(token);
            }
        }

        self.pending.push(Pending::Operator { token, precedence });
        self.expect_operand = true;
        Ok(())
    }

    /// Move pending operators to the output down to the innermost group or call
    fn flush_operators(&mut self) {
        while let Some(Pending::Operator { .. }) = self.pending.last() {
            if let Some(Pending::Operator { token, .. }) = self.pending.pop() {
                self.output.push(token);
            }
        }
    }

    fn comma(&mut self, position: usize) -> Result<()> {
        if self.expect_operand {
            return Err(FormulaError::syntax(position, "missing argument before ','"));
        }
        self.flush_operators();
        match self.pending.last_mut() {
            Some(Pending::Call { args, .. }) => {
                *args += 1;
                self.expect_operand = true;
                Ok(())
            },
            _ => Err(FormulaError::syntax(
                position,
                "argument separator outside of a function call",
            )),
        }
    }

    fn close(&mut self, position: usize, empty: bool) -> Result<()> {
        let empty_call =
            empty && matches!(self.pending.last(), Some(Pending::Call { args: 0, .. }));
        if self.expect_operand && !empty_call {
            return Err(FormulaError::syntax(position, "missing operand before ')'"));
        }

        self.flush_operators();
        match self.pending.pop() {
            Some(Pending::Group { .. }) => {},
            Some(Pending::Call {
                mut token,
                position: call_position,
                args,
            }) => {
                let count = if empty_call { 0 } else { args + 1 };
                let arity = token.arity();
                if !arity.accepts(count) {
                    return Err(FormulaError::syntax(
                        call_position,
                        format!(
                            "'{}' expects {} argument(s), got {}",
                            token.name(),
                            arity,
                            count
                        ),
                    ));
                }
                token.bind_arguments(count);
                self.output.push(token);
            },
            Some(Pending::Operator { .. }) | None => {
                return Err(FormulaError::syntax(position, "unbalanced ')'"));
            },
        }
        self.expect_operand = false;
        Ok(())
    }

    fn finish(mut self, end: usize) -> Result<ParsedFormula> {
        if self.expect_operand {
            let message = if self.output.is_empty() && self.pending.is_empty() {
                "empty expression"
            } else {
                "unexpected end of expression"
            };
            return Err(FormulaError::syntax(end, message));
        }

        while let Some(entry) = self.pending.pop() {
            match entry {
                Pending::Operator { token, .. } => self.output.push(token),
                Pending::Group { position } | Pending::Call { position, .. } => {
                    return Err(FormulaError::syntax(position, "unclosed '('"));
                },
            }
        }

        Ok(ParsedFormula {
            tokens: self.output,
            inputs: self.inputs,
        })
    }
}

fn literal(lexeme: &Lexeme, operand: Operand) -> Box<dyn Token> {
    Box::new(Literal::new(lexeme.text.clone(), operand))
}

fn is_infix(token: &dyn Token) -> bool {
    matches!(
        token.kind(),
        TokenKind::Operator {
            fixity: Fixity::Infix,
            ..
        }
    )
}

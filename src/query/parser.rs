//! Recursive-descent parser producing a [`Predicate`].
//!
//! ```text
//! expr    := or
//! or      := and ("OR" and)*
//! and     := unary (["AND"] unary)*
//! unary   := ("NOT" | "-") unary | primary
//! primary := "(" expr ")" | term
//! ```

use chrono::{DateTime, Utc};

use crate::event::Level;
use crate::query::error::QueryError;
use crate::query::lexer::{tokenize, Cmp, Token, TokenKind};
use crate::query::predicate::{LevelTest, Predicate};
use crate::query::time::{parse_duration, parse_range};

/// Parse a query, resolving relative time terms against the current time.
pub fn parse(expr: &str) -> Result<Predicate, QueryError> {
    parse_at(expr, Utc::now())
}

/// Parse a query with relative time terms resolved against `now`.
pub fn parse_at(expr: &str, now: DateTime<Utc>) -> Result<Predicate, QueryError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(QueryError::Empty);
    }

    let mut parser = Parser { tokens, index: 0, now };
    let predicate = parser.or()?;
    match parser.tokens.get(parser.index) {
        None => Ok(predicate),
        Some(token) => Err(QueryError::UnbalancedParens {
            position: token.position,
        }),
    }
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    now: DateTime<Utc>,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.index).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn starts_operand(kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::LParen | TokenKind::Not | TokenKind::Term { .. })
    }

    fn end_position(&self) -> usize {
        self.tokens.last().map_or(0, |t| t.position)
    }

    fn or(&mut self) -> Result<Predicate, QueryError> {
        let mut parts = vec![self.and()?];
        while let Some(TokenKind::Or) = self.peek() {
            let position = self.tokens[self.index].position;
            self.index += 1;
            if !self.peek().is_some_and(Self::starts_operand) {
                return Err(QueryError::DanglingOperator { operator: "OR", position });
            }
            parts.push(self.and()?);
        }
        Ok(collapse(parts, Predicate::Or))
    }

    fn and(&mut self) -> Result<Predicate, QueryError> {
        let mut parts = vec![self.unary()?];
        loop {
            match self.peek() {
                Some(TokenKind::And) => {
                    let position = self.tokens[self.index].position;
                    self.index += 1;
                    if !self.peek().is_some_and(Self::starts_operand) {
                        return Err(QueryError::DanglingOperator { operator: "AND", position });
                    }
                    parts.push(self.unary()?);
                }
                Some(kind) if Self::starts_operand(kind) => parts.push(self.unary()?),
                _ => break,
            }
        }
        Ok(collapse(parts, Predicate::And))
    }

    fn unary(&mut self) -> Result<Predicate, QueryError> {
        if let Some(TokenKind::Not) = self.peek() {
            let position = self.tokens[self.index].position;
            self.index += 1;
            if !self.peek().is_some_and(Self::starts_operand) {
                return Err(QueryError::DanglingOperator { operator: "NOT", position });
            }
            return Ok(Predicate::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Predicate, QueryError> {
        let Some(token) = self.next() else {
            return Err(QueryError::DanglingOperator {
                operator: "end of input",
                position: self.end_position(),
            });
        };
        match token.kind {
            TokenKind::LParen => {
                if let Some(TokenKind::RParen) = self.peek() {
                    return Err(QueryError::Empty);
                }
                let inner = self.or()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    _ => Err(QueryError::UnbalancedParens {
                        position: token.position,
                    }),
                }
            }
            TokenKind::RParen => Err(QueryError::UnbalancedParens {
                position: token.position,
            }),
            TokenKind::And => Err(QueryError::DanglingOperator {
                operator: "AND",
                position: token.position,
            }),
            TokenKind::Or => Err(QueryError::DanglingOperator {
                operator: "OR",
                position: token.position,
            }),
            TokenKind::Not => Err(QueryError::DanglingOperator {
                operator: "NOT",
                position: token.position,
            }),
            TokenKind::Term {
                field,
                cmp,
                value,
                quoted,
            } => match field {
                None => Ok(Predicate::Text(value.to_lowercase())),
                Some(field) => self.field_term(field, cmp, value, quoted),
            },
        }
    }

    fn field_term(&self, field: String, cmp: Option<Cmp>, value: String, quoted: bool) -> Result<Predicate, QueryError> {
        let lowered = field.to_ascii_lowercase();
        let not_comparable = |field: &str| QueryError::NotComparable { field: field.to_string() };

        match lowered.as_str() {
            "level" => {
                let level: Level = value.parse().map_err(|_| QueryError::InvalidLevel(value.clone()))?;
                let test = cmp.map_or(LevelTest::Eq, LevelTest::Cmp);
                Ok(Predicate::Level(test, level))
            }
            "service" => match cmp {
                Some(_) => Err(not_comparable("service")),
                None => Ok(Predicate::Service(value.to_lowercase())),
            },
            "message" | "msg" | "logger" | "trace_id" | "source_host" | "host" => {
                let canonical = match lowered.as_str() {
                    "msg" => "message",
                    "host" => "source_host",
                    other => other,
                };
                if cmp.is_some() {
                    return Err(not_comparable(canonical));
                }
                Ok(text_term(canonical.to_string(), value, quoted))
            }
            "since" => {
                if cmp.is_some() {
                    return Err(not_comparable("since"));
                }
                self.since(&value)
            }
            "time" => {
                if cmp.is_some() {
                    return Err(not_comparable("time"));
                }
                if value.contains("..") {
                    let (start, end) = parse_range(&value)?;
                    Ok(Predicate::TimeWithin { start, end })
                } else {
                    self.since(&value)
                }
            }
            "source_pid" | "pid" => numeric_or_text("source_pid".to_string(), cmp, value, true),
            _ => numeric_or_text(field, cmp, value, quoted),
        }
    }

    fn since(&self, value: &str) -> Result<Predicate, QueryError> {
        let window = parse_duration(value)?;
        let start = self
            .now
            .checked_sub_signed(window)
            .ok_or_else(|| QueryError::InvalidTime(value.to_string()))?;
        Ok(Predicate::TimeWithin {
            start: Some(start),
            end: None,
        })
    }
}

fn text_term(field: String, value: String, quoted: bool) -> Predicate {
    if quoted {
        Predicate::Exact { field, value }
    } else {
        Predicate::Contains {
            field,
            needle: value.to_lowercase(),
        }
    }
}

fn numeric_or_text(field: String, cmp: Option<Cmp>, value: String, exact: bool) -> Result<Predicate, QueryError> {
    match cmp {
        Some(cmp) => {
            let number = value.trim().parse::<f64>().map_err(|_| QueryError::InvalidNumber {
                field: field.clone(),
                value: value.clone(),
            })?;
            Ok(Predicate::Compare {
                field,
                cmp,
                value: number,
            })
        }
        None => Ok(text_term(field, value, exact)),
    }
}

fn collapse(mut parts: Vec<Predicate>, combine: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        combine(parts)
    }
}

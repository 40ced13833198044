//! Tokenizer for the filter expression language.

use crate::query::error::QueryError;

/// Comparison operator on a field term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Cmp {
    pub fn holds<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            Cmp::Gt => left > right,
            Cmp::Ge => left >= right,
            Cmp::Lt => left < right,
            Cmp::Le => left <= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Term {
        field: Option<String>,
        cmp: Option<Cmp>,
        value: String,
        quoted: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    Lexer {
        chars: input.char_indices().collect(),
        index: 0,
    }
    .run()
}

struct Lexer {
    chars: Vec<(usize, char)>,
    index: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).map(|&(_, c)| c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).map(|&(_, c)| c)
    }

    fn position(&self) -> usize {
        self.chars.get(self.index).map_or_else(
            || self.chars.last().map_or(0, |&(i, c)| i + c.len_utf8()),
            |&(i, _)| i,
        )
    }

    fn run(mut self) -> Result<Vec<Token>, QueryError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let position = self.position();
            let kind = match c {
                c if c.is_whitespace() => {
                    self.index += 1;
                    continue;
                }
                '(' => {
                    self.index += 1;
                    TokenKind::LParen
                }
                ')' => {
                    self.index += 1;
                    TokenKind::RParen
                }
                '-' => {
                    self.index += 1;
                    TokenKind::Not
                }
                '"' => {
                    let value = self.quoted()?;
                    TokenKind::Term {
                        field: None,
                        cmp: None,
                        value,
                        quoted: true,
                    }
                }
                _ => self.word(position)?,
            };
            tokens.push(Token { kind, position });
        }
        Ok(tokens)
    }

    fn is_boundary(c: char) -> bool {
        c.is_whitespace() || c == '(' || c == ')'
    }

    /// Consume a double-quoted string starting at the opening quote.
    fn quoted(&mut self) -> Result<String, QueryError> {
        let start = self.position();
        self.index += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(QueryError::UnterminatedQuote { position: start }),
                Some('"') => {
                    self.index += 1;
                    return Ok(out);
                }
                Some('\\') if matches!(self.peek_at(1), Some('"') | Some('\\')) => {
                    if let Some(escaped) = self.peek_at(1) {
                        out.push(escaped);
                    }
                    self.index += 2;
                }
                Some(c) => {
                    out.push(c);
                    self.index += 1;
                }
            }
        }
    }

    fn raw_until_boundary(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if Self::is_boundary(c) {
                break;
            }
            out.push(c);
            self.index += 1;
        }
        out
    }

    fn word(&mut self, position: usize) -> Result<TokenKind, QueryError> {
        let mut head = String::new();
        while let Some(c) = self.peek() {
            if Self::is_boundary(c) || c == ':' || c == '"' {
                break;
            }
            head.push(c);
            self.index += 1;
        }

        if self.peek() != Some(':') {
            if self.peek() == Some('"') {
                // `foo"bar` reads as one bare word including the quote.
                head.push_str(&self.raw_until_boundary());
            }
            return Ok(match head.to_ascii_uppercase().as_str() {
                "AND" => TokenKind::And,
                "OR" => TokenKind::Or,
                "NOT" => TokenKind::Not,
                _ => TokenKind::Term {
                    field: None,
                    cmp: None,
                    value: head,
                    quoted: false,
                },
            });
        }

        if head.is_empty() {
            return Err(QueryError::EmptyField { position });
        }
        self.index += 1;

        let cmp = match (self.peek(), self.peek_at(1)) {
            (Some('>'), Some('=')) => Some((Cmp::Ge, 2)),
            (Some('<'), Some('=')) => Some((Cmp::Le, 2)),
            (Some('>'), _) => Some((Cmp::Gt, 1)),
            (Some('<'), _) => Some((Cmp::Lt, 1)),
            _ => None,
        }
        .map(|(cmp, width)| {
            self.index += width;
            cmp
        });

        let (value, quoted) = if self.peek() == Some('"') {
            (self.quoted()?, true)
        } else {
            (self.raw_until_boundary(), false)
        };
        if value.is_empty() && !quoted {
            return Err(QueryError::EmptyValue { field: head });
        }

        Ok(TokenKind::Term {
            field: Some(head),
            cmp,
            value,
            quoted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn term(field: Option<&str>, cmp: Option<Cmp>, value: &str, quoted: bool) -> TokenKind {
        TokenKind::Term {
            field: field.map(str::to_string),
            cmp,
            value: value.to_string(),
            quoted,
        }
    }

    #[test]
    fn fields_operators_and_groups() {
        assert_eq!(
            kinds("level:ERROR and (service:api OR -msg:\"timed out\")"),
            vec![
                term(Some("level"), None, "ERROR", false),
                TokenKind::And,
                TokenKind::LParen,
                term(Some("service"), None, "api", false),
                TokenKind::Or,
                TokenKind::Not,
                term(Some("msg"), None, "timed out", true),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn comparisons_and_time_ranges() {
        assert_eq!(kinds("latency_ms:>=250"), vec![term(Some("latency_ms"), Some(Cmp::Ge), "250", false)]);
        assert_eq!(kinds("pid:<9"), vec![term(Some("pid"), Some(Cmp::Lt), "9", false)]);
        assert_eq!(
            kinds("time:2024-01-01T00:00:00Z..2024-01-02T00:00:00Z"),
            vec![term(Some("time"), None, "2024-01-01T00:00:00Z..2024-01-02T00:00:00Z", false)]
        );
    }

    #[test]
    fn hyphenated_words_stay_whole() {
        assert_eq!(kinds("re-try"), vec![term(None, None, "re-try", false)]);
        assert_eq!(kinds("\"a \\\"b\\\"\""), vec![term(None, None, "a \"b\"", true)]);
    }

    #[test]
    fn lexical_errors() {
        assert_eq!(tokenize("\"open"), Err(QueryError::UnterminatedQuote { position: 0 }));
        assert_eq!(tokenize("x :y"), Err(QueryError::EmptyField { position: 2 }));
        assert_eq!(tokenize("level:"), Err(QueryError::EmptyValue { field: "level".into() }));
        assert_eq!(
            tokenize("msg:\"unfinished"),
            Err(QueryError::UnterminatedQuote { position: 4 })
        );
    }
}

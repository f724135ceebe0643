//! Tokenizer for the BUILD-file subset of Starlark.

use crate::starlark::ast::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Equals,
    Plus,
    Minus,
    Percent,
    /// Statement separator; only emitted outside brackets.
    Newline,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier `{}`", name),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Int(v) => format!("integer `{}`", v),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::LBracket => "`[`".to_string(),
            TokenKind::RBracket => "`]`".to_string(),
            TokenKind::LBrace => "`{`".to_string(),
            TokenKind::RBrace => "`}`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Colon => "`:`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::Equals => "`=`".to_string(),
            TokenKind::Plus => "`+`".to_string(),
            TokenKind::Minus => "`-`".to_string(),
            TokenKind::Percent => "`%`".to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Lexing failure at a byte range.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            pos: 0,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                ' ' | '\t' | '\r' => self.bump(),
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                }
                '\n' => {
                    self.bump();
                    if self.depth == 0 && !self.last_is_newline() {
                        self.push(TokenKind::Newline, start);
                    }
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '"' | '\'' => {
                    let s = self.string(false)?;
                    self.push(TokenKind::Str(s), start);
                }
                'r' | 'R' if matches!(self.peek_at(1), Some('"') | Some('\'')) => {
                    self.bump();
                    let s = self.string(true)?;
                    self.push(TokenKind::Str(s), start);
                }
                c if c.is_ascii_digit() => {
                    let value = self.integer()?;
                    self.push(TokenKind::Int(value), start);
                }
                c if c.is_alphabetic() || c == '_' => {
                    while let Some(c) = self.peek() {
                        if !(c.is_alphanumeric() || c == '_') {
                            break;
                        }
                        self.bump();
                    }
                    let name = self.src[start..self.pos].to_string();
                    self.push(TokenKind::Ident(name), start);
                }
                _ => {
                    self.bump();
                    let kind = match c {
                        '(' => {
                            self.depth += 1;
                            TokenKind::LParen
                        }
                        '[' => {
                            self.depth += 1;
                            TokenKind::LBracket
                        }
                        '{' => {
                            self.depth += 1;
                            TokenKind::LBrace
                        }
                        ')' => {
                            self.depth = self.depth.saturating_sub(1);
                            TokenKind::RParen
                        }
                        ']' => {
                            self.depth = self.depth.saturating_sub(1);
                            TokenKind::RBracket
                        }
                        '}' => {
                            self.depth = self.depth.saturating_sub(1);
                            TokenKind::RBrace
                        }
                        ',' => TokenKind::Comma,
                        ':' => TokenKind::Colon,
                        '.' => TokenKind::Dot,
                        '=' => TokenKind::Equals,
                        '+' => TokenKind::Plus,
                        '-' => TokenKind::Minus,
                        '%' => TokenKind::Percent,
                        other => {
                            return Err(LexError {
                                message: format!("unexpected character `{}`", other),
                                span: start..self.pos,
                            })
                        }
                    };
                    self.push(kind, start);
                }
            }
        }
        let end = self.src.len();
        if !self.last_is_newline() {
            self.tokens.push(Token {
                kind: TokenKind::Newline,
                span: end..end,
            });
        }
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            span: end..end,
        });
        Ok(self.tokens)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            span: start..self.pos,
        });
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline)
        )
    }

    fn integer(&mut self) -> Result<i64, LexError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            self.bump();
        }
        self.src[start..self.pos].parse().map_err(|_| LexError {
            message: "integer literal out of range".to_string(),
            span: start..self.pos,
        })
    }

    fn string(&mut self, raw: bool) -> Result<String, LexError> {
        let start = self.pos;
        let quote = match self.peek() {
            Some(q) => q,
            None => {
                return Err(LexError {
                    message: "expected string".to_string(),
                    span: start..start,
                })
            }
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".to_string(),
                        span: start..self.pos,
                    })
                }
            };
            if c == quote {
                if !triple {
                    self.bump();
                    return Ok(out);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(out);
                }
            }
            if c == '\n' && !triple {
                return Err(LexError {
                    message: "unterminated string literal".to_string(),
                    span: start..self.pos,
                });
            }
            self.bump();
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escaped = match self.peek() {
                Some(e) => e,
                None => continue,
            };
            self.bump();
            if raw {
                out.push('\\');
                out.push(escaped);
                continue;
            }
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                '\n' => {}
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }
}

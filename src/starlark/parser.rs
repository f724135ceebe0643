//! Recursive-descent parser for BUILD files.

use std::path::Path;

use miette::{Diagnostic as MietteDiagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::starlark::ast::{Argument, BinOp, Expr, ExprKind, Span, Stmt};
use crate::starlark::lexer::{Lexer, Token, TokenKind};

/// Syntax error in a BUILD file.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("{file}:{line}:{column}: {message}")]
#[diagnostic(code(bazel_to_cmake::syntax))]
pub struct SyntaxError {
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("here")]
    pub span: SourceSpan,
}

impl SyntaxError {
    fn new(path: &Path, src: &str, span: Span, message: impl Into<String>) -> Self {
        let (line, column) = line_and_column(src, span.start);
        let file = path.display().to_string();
        SyntaxError {
            message: message.into(),
            file: file.clone(),
            line,
            column,
            src: NamedSource::new(file, src.to_string()),
            span: (span.start, span.end.saturating_sub(span.start)).into(),
        }
    }
}

/// Parse BUILD file contents into statements.
pub fn parse_build_file(path: &Path, src: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = Lexer::new(src)
        .tokenize()
        .map_err(|e| SyntaxError::new(path, src, e.span, e.message))?;
    let mut parser = Parser {
        tokens,
        pos: 0,
    };
    parser
        .file()
        .map_err(|(span, message)| SyntaxError::new(path, src, span, message))
}

fn line_and_column(src: &str, offset: usize) -> (usize, usize) {
    let before = &src[..offset.min(src.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map_or(before.len(), |i| before.len() - i - 1) + 1;
    (line, column)
}

type ParseResult<T> = Result<T, (Span, String)>;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span.clone()
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> (Span, String) {
        (
            self.span(),
            format!("expected {}, found {}", expected, self.peek().describe()),
        )
    }

    fn file(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&TokenKind::Newline) {}
            if *self.peek() == TokenKind::Eof {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
            if !self.eat(&TokenKind::Newline) && *self.peek() != TokenKind::Eof {
                return Err(self.unexpected("end of statement"));
            }
        }
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        let start = self.span().start;
        if let TokenKind::Ident(name) = self.peek().clone() {
            if name == "load" && *self.peek_at(1) == TokenKind::LParen {
                return self.load(start);
            }
            if *self.peek_at(1) == TokenKind::Equals {
                self.advance();
                self.advance();
                let value = self.expression()?;
                let span = start..value.span.end;
                return Ok(Stmt::Assign { name, value, span });
            }
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn load(&mut self, start: usize) -> ParseResult<Stmt> {
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let module = match self.advance().kind {
            TokenKind::Str(s) => s,
            _ => return Err((start..self.span().end, "load() requires a module string".into())),
        };
        let mut symbols = Vec::new();
        while self.eat(&TokenKind::Comma) {
            match self.peek().clone() {
                TokenKind::RParen => break,
                TokenKind::Str(s) => {
                    self.advance();
                    symbols.push((s.clone(), s));
                }
                TokenKind::Ident(local) => {
                    self.advance();
                    self.expect(&TokenKind::Equals)?;
                    match self.advance().kind {
                        TokenKind::Str(exported) => symbols.push((local, exported)),
                        _ => return Err(self.unexpected("string")),
                    }
                }
                _ => return Err(self.unexpected("symbol name")),
            }
        }
        let end = self.expect(&TokenKind::RParen)?.span.end;
        Ok(Stmt::Load {
            module,
            symbols,
            span: start..end,
        })
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.multiplicative()?;
        while *self.peek() == TokenKind::Plus {
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = binary(BinOp::Add, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.unary()?;
        while *self.peek() == TokenKind::Percent {
            self.advance();
            let rhs = self.unary()?;
            lhs = binary(BinOp::Mod, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if *self.peek() == TokenKind::Minus {
            let start = self.advance().span.start;
            let token = self.advance();
            return match token.kind {
                TokenKind::Int(v) => Ok(Expr {
                    kind: ExprKind::Int(-v),
                    span: start..token.span.end,
                }),
                _ => Err((token.span, "unary `-` is only supported on integers".into())),
            };
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.arguments()?;
                    let end = self.expect(&TokenKind::RParen)?.span.end;
                    let span = expr.span.start..end;
                    expr = Expr {
                        kind: ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        span,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let token = self.advance();
                    let name = match token.kind {
                        TokenKind::Ident(name) => name,
                        _ => return Err((token.span, "expected attribute name".into())),
                    };
                    let span = expr.span.start..token.span.end;
                    expr = Expr {
                        kind: ExprKind::Attr {
                            object: Box::new(expr),
                            name,
                        },
                        span,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn arguments(&mut self) -> ParseResult<Vec<Argument>> {
        let mut args = Vec::new();
        while *self.peek() != TokenKind::RParen {
            let keyword = match (self.peek().clone(), self.peek_at(1)) {
                (TokenKind::Ident(name), TokenKind::Equals) => Some(name),
                _ => None,
            };
            if let Some(name) = keyword {
                self.advance();
                self.advance();
                args.push(Argument::Keyword(name, self.expression()?));
            } else {
                args.push(Argument::Positional(self.expression()?));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        let start = token.span.start;
        let kind = match token.kind {
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::Int(v) => ExprKind::Int(v),
            TokenKind::Ident(name) => ExprKind::Ident(name),
            TokenKind::LBracket => {
                let items = self.sequence(&TokenKind::RBracket)?;
                let end = self.expect(&TokenKind::RBracket)?.span.end;
                return Ok(Expr {
                    kind: ExprKind::List(items),
                    span: start..end,
                });
            }
            TokenKind::LParen => {
                if *self.peek() == TokenKind::RParen {
                    let end = self.advance().span.end;
                    return Ok(Expr {
                        kind: ExprKind::Tuple(Vec::new()),
                        span: start..end,
                    });
                }
                let first = self.expression()?;
                if self.eat(&TokenKind::RParen) {
                    return Ok(first);
                }
                self.expect(&TokenKind::Comma)?;
                let mut items = vec![first];
                items.extend(self.sequence(&TokenKind::RParen)?);
                let end = self.expect(&TokenKind::RParen)?.span.end;
                return Ok(Expr {
                    kind: ExprKind::Tuple(items),
                    span: start..end,
                });
            }
            TokenKind::LBrace => {
                let mut entries = Vec::new();
                while *self.peek() != TokenKind::RBrace {
                    let key = self.expression()?;
                    self.expect(&TokenKind::Colon)?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(&TokenKind::RBrace)?.span.end;
                return Ok(Expr {
                    kind: ExprKind::Dict(entries),
                    span: start..end,
                });
            }
            other => {
                return Err((
                    token.span,
                    format!("expected expression, found {}", other.describe()),
                ))
            }
        };
        Ok(Expr {
            kind,
            span: token.span,
        })
    }

    fn sequence(&mut self, close: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        while self.peek() != close {
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.start..rhs.span.end;
    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    }
}

//! The declaration language of BUILD files.
//!
//! Only the declarative subset used by BUILD files is supported: call
//! statements, assignments, `load()` and simple expressions. There is no
//! control flow and no user-defined functions.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{Argument, BinOp, Expr, ExprKind, Span, Stmt};
pub use parser::{parse_build_file, SyntaxError};
pub use value::{SymbolRef, Value};

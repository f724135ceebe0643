//! Statement evaluation for BUILD files.
//!
//! Each file gets its own environment. Names not bound by assignment or
//! `load()` fall back to the native library, so `cc_library(...)` and
//! `native.cc_library(...)` resolve to the same handler.

use std::collections::BTreeMap;
use std::path::Path;

use crate::builder::context::LoadContext;
use crate::builder::error::AnalysisError;
use crate::builder::evaluation::EvaluationState;
use crate::builder::rules::registry::NATIVE_LIBRARY;
use crate::builder::rules::trait_def::CallArgs;
use crate::core::label::{PackageId, TargetId};
use crate::starlark::{Argument, BinOp, Expr, ExprKind, Stmt, SymbolRef, Value};

struct Interpreter<'a> {
    state: &'a mut EvaluationState,
    package_id: &'a PackageId,
    build_file: &'a Path,
    pseudo_target: &'a TargetId,
    env: BTreeMap<String, Value>,
}

/// Evaluate the statements of one BUILD file.
///
/// A failing statement is recorded against `pseudo_target` and evaluation
/// continues with the next one.
pub(crate) fn evaluate_build_file(
    state: &mut EvaluationState,
    package_id: &PackageId,
    build_file: &Path,
    pseudo_target: &TargetId,
    statements: &[Stmt],
) {
    let mut interpreter = Interpreter {
        state,
        package_id,
        build_file,
        pseudo_target,
        env: BTreeMap::new(),
    };
    for statement in statements {
        if let Err(e) = interpreter.exec(statement) {
            interpreter
                .state
                .record_error(pseudo_target.clone(), e);
        }
    }
}

impl<'a> Interpreter<'a> {
    fn exec(&mut self, statement: &Stmt) -> Result<(), AnalysisError> {
        match statement {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Assign { name, value, .. } => {
                let value = self.eval(value)?;
                self.env.insert(name.clone(), value);
            }
            Stmt::Load {
                module, symbols, ..
            } => self.load(module, symbols)?,
        }
        Ok(())
    }

    fn load(&mut self, module: &str, symbols: &[(String, String)]) -> Result<(), AnalysisError> {
        let library = self.state.resolve_target(self.package_id, module)?.as_label();
        let registry = self.state.registry();
        let mut missing = Vec::new();
        for (local, exported) in symbols {
            if registry.contains(&library, exported) {
                self.env.insert(
                    local.clone(),
                    Value::Function(SymbolRef::new(library.clone(), exported.clone())),
                );
            } else {
                // Keep evaluating the file; uses of the symbol become inert.
                self.env.insert(local.clone(), Value::Ignored);
                missing.push(exported.clone());
            }
        }
        for symbol in missing {
            self.state.record_error(
                self.pseudo_target.clone(),
                AnalysisError::UnknownRule {
                    library: library.clone(),
                    symbol,
                },
            );
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Value, AnalysisError> {
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }
        match name {
            "True" => return Ok(Value::Bool(true)),
            "False" => return Ok(Value::Bool(false)),
            "None" => return Ok(Value::None),
            "native" => return Ok(Value::Namespace(NATIVE_LIBRARY.to_string())),
            _ => {}
        }
        if self.state.registry().contains(NATIVE_LIBRARY, name) {
            return Ok(Value::Function(SymbolRef::new(NATIVE_LIBRARY, name)));
        }
        Err(AnalysisError::other(format!("name `{}` is not defined", name)))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, AnalysisError> {
        match &expr.kind {
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Int(v) => Ok(Value::Int(*v)),
            ExprKind::Ident(name) => self.lookup(name),
            ExprKind::List(items) => Ok(Value::List(self.eval_all(items)?)),
            ExprKind::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            ExprKind::Dict(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((self.eval(k)?, self.eval(v)?));
                }
                Ok(Value::Dict(out))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                match op {
                    BinOp::Add => lhs.add(rhs),
                    BinOp::Mod => lhs.format(rhs),
                }
                .map_err(AnalysisError::other)
            }
            ExprKind::Attr { object, name } => match self.eval(object)? {
                Value::Namespace(library) => {
                    if self.state.registry().contains(&library, name) {
                        Ok(Value::Function(SymbolRef::new(library, name.clone())))
                    } else {
                        Err(AnalysisError::UnknownRule {
                            library,
                            symbol: name.clone(),
                        })
                    }
                }
                Value::Ignored => Ok(Value::Ignored),
                other => Err(AnalysisError::other(format!(
                    "'{}' value has no field or method '{}'",
                    other.type_name(),
                    name
                ))),
            },
            ExprKind::Call { func, args } => {
                let callee = self.eval(func)?;
                let args = self.eval_args(args)?;
                self.call(callee, args)
            }
        }
    }

    fn eval_all(&mut self, items: &[Expr]) -> Result<Vec<Value>, AnalysisError> {
        items.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_args(&mut self, args: &[Argument]) -> Result<CallArgs, AnalysisError> {
        let mut call_args = CallArgs::default();
        for arg in args {
            match arg {
                Argument::Positional(e) => call_args.positional.push(self.eval(e)?),
                Argument::Keyword(name, e) => {
                    let value = self.eval(e)?;
                    call_args.keywords.push((name.clone(), value));
                }
            }
        }
        Ok(call_args)
    }

    fn call(&mut self, callee: Value, args: CallArgs) -> Result<Value, AnalysisError> {
        match callee {
            Value::Function(symbol) => {
                let handler = self.state.registry().get(&symbol).ok_or_else(|| {
                    AnalysisError::UnknownRule {
                        library: symbol.library.clone(),
                        symbol: symbol.symbol.clone(),
                    }
                })?;
                let mut ctx = LoadContext::new(
                    self.state,
                    self.package_id.clone(),
                    self.build_file.to_path_buf(),
                    symbol,
                );
                handler.invoke(&mut ctx, args)
            }
            Value::Ignored => Ok(Value::Ignored),
            other => Err(AnalysisError::other(format!(
                "'{}' value is not callable",
                other.type_name()
            ))),
        }
    }
}

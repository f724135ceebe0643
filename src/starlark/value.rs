//! Runtime values produced by evaluating BUILD-file expressions.

use std::fmt;

/// A callable resolved through the rule registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolRef {
    /// Library the symbol was loaded from (`native` for builtins).
    pub library: String,
    pub symbol: String,
}

impl SymbolRef {
    pub fn new(library: impl Into<String>, symbol: impl Into<String>) -> Self {
        SymbolRef {
            library: library.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%{}", self.library, self.symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    /// `select()` branches keyed by condition label as written.
    Select(Vec<(String, Value)>),
    /// Concatenation that involves a `select()`; resolved during analysis.
    Concat(Vec<Value>),
    Function(SymbolRef),
    /// Attribute namespace over a library, e.g. `native`.
    Namespace(String),
    /// Inert placeholder for constructs with no CMake equivalent.
    Ignored,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Select(_) => "select",
            Value::Concat(_) => "select",
            Value::Function(_) => "function",
            Value::Namespace(_) => "namespace",
            Value::Ignored => "ignored",
        }
    }

    /// Whether the value still contains an unresolved `select()`.
    pub fn is_configurable(&self) -> bool {
        match self {
            Value::Select(_) | Value::Concat(_) => true,
            Value::List(items) | Value::Tuple(items) => items.iter().any(Value::is_configurable),
            Value::Dict(entries) => entries.iter().any(|(_, v)| v.is_configurable()),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None | Value::Ignored => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.is_empty(),
            _ => true,
        }
    }

    /// Evaluate `self + other`.
    pub fn add(self, other: Value) -> Result<Value, String> {
        if matches!(self, Value::Select(_) | Value::Concat(_))
            || matches!(other, Value::Select(_) | Value::Concat(_))
        {
            let mut parts = Vec::new();
            for v in [self, other] {
                match v {
                    Value::Concat(inner) => parts.extend(inner),
                    v => parts.push(v),
                }
            }
            return Ok(Value::Concat(parts));
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_string()),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (Value::Tuple(mut a), Value::Tuple(b)) => {
                a.extend(b);
                Ok(Value::Tuple(a))
            }
            (a, b) => Err(format!(
                "unsupported operand types for +: {} and {}",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    /// Evaluate `self % other` (string formatting with `%s`, `%d`, `%r`).
    pub fn format(self, other: Value) -> Result<Value, String> {
        let template = match self {
            Value::Str(s) => s,
            Value::Int(a) => {
                return match other {
                    Value::Int(0) => Err("integer modulo by zero".to_string()),
                    Value::Int(b) => Ok(Value::Int(a.rem_euclid(b))),
                    b => Err(format!("unsupported operand types for %: int and {}", b.type_name())),
                };
            }
            a => return Err(format!("unsupported operand type for %: {}", a.type_name())),
        };
        let args = match other {
            Value::Tuple(items) => items,
            v => vec![v],
        };
        let mut args = args.into_iter();
        let mut out = String::new();
        let mut chars = template.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => out.push('%'),
                Some(spec @ ('s' | 'd' | 'r')) => {
                    let arg = args
                        .next()
                        .ok_or_else(|| "not enough arguments for format string".to_string())?;
                    if spec == 'r' {
                        out.push_str(&arg.repr());
                    } else {
                        out.push_str(&arg.to_string());
                    }
                }
                Some(other) => return Err(format!("unsupported format character `{}`", other)),
                None => return Err("incomplete format".to_string()),
            }
        }
        if args.next().is_some() {
            return Err("not all arguments converted during string formatting".to_string());
        }
        Ok(Value::Str(out))
    }

    /// Starlark `repr()`.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s)),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(&item.repr())?;
            }
            Ok(())
        }
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                join(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                join(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k.repr(), v.repr())?;
                }
                f.write_str("}")
            }
            Value::Select(branches) => {
                f.write_str("select({")?;
                for (i, (k, v)) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", k, v.repr())?;
                }
                f.write_str("})")
            }
            Value::Concat(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" + ")?;
                    }
                    f.write_str(&part.repr())?;
                }
                Ok(())
            }
            Value::Function(symbol) => write!(f, "<function {}>", symbol.symbol),
            Value::Namespace(library) => write!(f, "<namespace {}>", library),
            Value::Ignored => f.write_str("<ignored>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    #[test]
    fn test_add_concrete() {
        assert_eq!(s("a").add(s("b")).unwrap(), s("ab"));
        assert_eq!(
            Value::List(vec![s("x")]).add(Value::List(vec![s("y")])).unwrap(),
            Value::List(vec![s("x"), s("y")])
        );
        assert!(s("a").add(Value::Int(1)).is_err());
    }

    #[test]
    fn test_add_with_select_is_deferred() {
        let select = Value::Select(vec![("//conditions:default".into(), Value::List(vec![]))]);
        let v = Value::List(vec![s("a")]).add(select.clone()).unwrap();
        assert!(v.is_configurable());
        let v = v.add(Value::List(vec![s("b")])).unwrap();
        match v {
            Value::Concat(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected concat, got {:?}", other),
        }
    }

    #[test]
    fn test_percent_format() {
        let v = s("%s-%d%%").format(Value::Tuple(vec![s("lib"), Value::Int(3)])).unwrap();
        assert_eq!(v, s("lib-3%"));
        assert_eq!(s("x%r").format(s("q")).unwrap(), s("x\"q\""));
        assert!(s("%s %s").format(s("one")).is_err());
    }

    #[test]
    fn test_display() {
        let v = Value::List(vec![s("a"), Value::Bool(true), Value::None]);
        assert_eq!(v.to_string(), "[\"a\", True, None]");
    }
}

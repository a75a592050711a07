//! A small evaluator for host expressions at the call site.
//!
//! Used for two things: computing the column names behind dynamic references
//! (`$(cols[1])`) and applying the callables the emitter produced, so that
//! tests and in-memory backends can run rewritten triples. It knows the
//! row-wise and missing-propagation wrappers named in [`RewriteConfig`] plus a
//! registry of builtin and user functions.

use crate::builtins;
use crate::config::RewriteConfig;
use crate::expr::{Expr, Value};
use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Evaluation error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unbound identifier `{0}`")]
    Unbound(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("`{name}` expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("`{op}` cannot be applied to {found}")]
    Type { op: String, found: String },
    #[error("index {index} out of bounds for length {len}")]
    Bounds { index: i64, len: usize },
    #[error("columns have different lengths ({0} and {1})")]
    Length(usize, usize),
    #[error("cannot evaluate `{0}`")]
    Unsupported(String),
}

impl EvalError {
    pub(crate) fn type_error(op: &str, value: &Value) -> Self {
        EvalError::Type {
            op: op.to_string(),
            found: value.type_name().to_string(),
        }
    }

    pub(crate) fn arity(name: &str, expected: usize, found: usize) -> Self {
        EvalError::Arity {
            name: name.to_string(),
            expected,
            found,
        }
    }
}

/// Result type for evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// A function callable from evaluated expressions.
pub type Builtin = Rc<dyn Fn(&[Value]) -> EvalResult<Value>>;

/// Variables visible at the call site.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scope {
    vars: FxHashMap<Rc<str>, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    /// Builder-style binding.
    pub fn with(mut self, name: impl Into<Rc<str>>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<Rc<str>>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

/// Evaluates expressions and applies callables.
#[derive(Clone)]
pub struct Interpreter {
    functions: FxHashMap<Rc<str>, Builtin>,
    by_row: Rc<str>,
    pass_missing: Rc<str>,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(|k| k.as_ref()).collect();
        names.sort_unstable();
        f.debug_struct("Interpreter")
            .field("functions", &names)
            .field("by_row", &self.by_row)
            .field("pass_missing", &self.pass_missing)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    /// An interpreter with the builtins and the default wrapper names.
    pub fn new() -> Self {
        Interpreter::with_config(&RewriteConfig::default())
    }

    pub fn with_config(config: &RewriteConfig) -> Self {
        let mut interp = Interpreter {
            functions: FxHashMap::default(),
            by_row: config.by_row.as_str().into(),
            pass_missing: config.pass_missing.as_str().into(),
        };
        builtins::install(&mut interp);
        interp
    }

    /// Register (or replace) a function.
    pub fn register(
        &mut self,
        name: impl Into<Rc<str>>,
        f: impl Fn(&[Value]) -> EvalResult<Value> + 'static,
    ) {
        self.functions.insert(name.into(), Rc::new(f));
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Call a registered function by name.
    pub fn call_function(&self, name: &str, args: &[Value]) -> EvalResult<Value> {
        match self.functions.get(name) {
            Some(f) => f(args),
            None => Err(EvalError::UnknownFunction(name.to_string())),
        }
    }

    /// Evaluate an expression.
    pub fn eval(&self, expr: &Expr, scope: &Scope) -> EvalResult<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Unbound(name.to_string())),
            Expr::Quote(name) => Ok(Value::Symbol(name.clone())),
            Expr::Call { func, args } => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a, scope))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.call(func, &values, scope)
            }
            Expr::Index { target, indices } => {
                let mut values = Vec::with_capacity(indices.len() + 1);
                values.push(self.eval(target, scope)?);
                for index in indices {
                    values.push(self.eval(index, scope)?);
                }
                self.call_function("getindex", &values)
            }
            Expr::Dot { target, field } => match self.eval(target, scope)? {
                Value::Record(fields) => fields
                    .iter()
                    .find(|(name, _)| name == field)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| EvalError::Unbound(field.to_string())),
                other => Err(EvalError::type_error(".", &other)),
            },
            Expr::Block(items) => {
                let mut local = scope.clone();
                let mut last = None;
                for item in items {
                    let value = match item {
                        Expr::Assign { sink, value } => match sink.as_ref() {
                            Expr::Ident(name) => {
                                let v = self.eval(value, &local)?;
                                local.insert(name.clone(), v.clone());
                                v
                            }
                            _ => return Err(EvalError::Unsupported(item.to_string())),
                        },
                        _ => self.eval(item, &local)?,
                    };
                    last = Some(value);
                }
                last.ok_or_else(|| EvalError::Unsupported(expr.to_string()))
            }
            Expr::Tuple(items) | Expr::Vector(items) => Ok(Value::list(
                items
                    .iter()
                    .map(|e| self.eval(e, scope))
                    .collect::<EvalResult<Vec<_>>>()?,
            )),
            Expr::NamedTuple(fields) => Ok(Value::record(
                fields
                    .iter()
                    .map(|(name, e)| Ok((name.clone(), self.eval(e, scope)?)))
                    .collect::<EvalResult<Vec<_>>>()?,
            )),
            Expr::Interp(_)
            | Expr::Column(_)
            | Expr::Kw { .. }
            | Expr::Assign { .. }
            | Expr::Flagged { .. }
            | Expr::Lambda { .. }
            | Expr::Pair(..) => Err(EvalError::Unsupported(expr.to_string())),
        }
    }

    /// Apply a callable expression to argument values.
    ///
    /// Understands lambdas, the row-wise wrapper (maps over equally long
    /// columns), the missing wrapper and named functions. A row-wise callable
    /// without any column argument runs once; use [`Interpreter::call_rows`]
    /// when the table height is known.
    pub fn call(&self, callable: &Expr, args: &[Value], scope: &Scope) -> EvalResult<Value> {
        self.apply(callable, args, None, scope)
    }

    /// Like [`Interpreter::call`], for a table of `nrow` rows: a row-wise
    /// callable over zero columns runs once per row.
    pub fn call_rows(&self, callable: &Expr, args: &[Value], nrow: usize, scope: &Scope) -> EvalResult<Value> {
        self.apply(callable, args, Some(nrow), scope)
    }

    fn apply(&self, callable: &Expr, args: &[Value], nrow: Option<usize>, scope: &Scope) -> EvalResult<Value> {
        match callable {
            Expr::Lambda { params, body } => {
                if params.len() != args.len() {
                    return Err(EvalError::arity(&callable.to_string(), params.len(), args.len()));
                }
                let mut local = scope.clone();
                for (param, arg) in params.iter().zip(args) {
                    local.insert(param.clone(), arg.clone());
                }
                self.eval(body, &local)
            }
            Expr::Call { func, args: wrapped } => match (func.as_ref(), &wrapped[..]) {
                (Expr::Ident(name), [inner]) if *name == self.by_row => self.by_row(inner, args, nrow, scope),
                (Expr::Ident(name), [inner]) if *name == self.pass_missing => {
                    if args.iter().any(Value::is_missing) {
                        Ok(Value::Missing)
                    } else {
                        self.apply(inner, args, nrow, scope)
                    }
                }
                _ => Err(EvalError::Unsupported(callable.to_string())),
            },
            Expr::Ident(name) => self.call_function(name, args),
            _ => Err(EvalError::Unsupported(callable.to_string())),
        }
    }

    /// Row-wise application. Column arguments must agree in length; scalars
    /// are repeated.
    fn by_row(&self, inner: &Expr, args: &[Value], nrow: Option<usize>, scope: &Scope) -> EvalResult<Value> {
        let rows = match builtins::common_length(args)?.or(nrow) {
            Some(rows) => rows,
            None => return self.apply(inner, args, None, scope),
        };
        let mut out = Vec::with_capacity(rows);
        for i in 0..rows {
            let row = builtins::row(args, i);
            out.push(self.apply(inner, &row, None, scope)?);
        }
        Ok(Value::list(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expr;
    use std::cell::Cell;

    fn eval(src: &str, scope: &Scope) -> EvalResult<Value> {
        Interpreter::new().eval(&parse_expr(src).unwrap(), scope)
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|&n| Value::int(n)).collect())
    }

    #[test]
    fn test_eval_arithmetic() {
        let scope = Scope::new().with("x", Value::int(3));
        assert_eq!(eval("x * 2 + 1", &scope).unwrap(), Value::int(7));
        assert_eq!(eval("x / 2", &scope).unwrap(), Value::float(1.5));
        assert_eq!(eval("x + missing", &scope).unwrap(), Value::Missing);
    }

    #[test]
    fn test_eval_index_and_symbols() {
        let scope = Scope::new().with(
            "cols",
            Value::list(vec![Value::symbol("a"), Value::symbol("b")]),
        );
        assert_eq!(eval("cols[2]", &scope).unwrap(), Value::symbol("b"));
        assert_eq!(eval(":x", &scope).unwrap(), Value::symbol("x"));
        assert!(matches!(eval("cols[3]", &scope), Err(EvalError::Bounds { index: 3, len: 2 })));
    }

    #[test]
    fn test_eval_block_and_records() {
        let scope = Scope::new();
        assert_eq!(eval("begin z = 2; z * z end", &scope).unwrap(), Value::int(4));
        let rec = eval("(a = 1, b = \"s\")", &scope).unwrap();
        assert_eq!(rec.to_string(), "(a = 1, b = \"s\")");
        assert_eq!(eval("(a = 1, b = 2).b", &scope).unwrap(), Value::int(2));
    }

    #[test]
    fn test_unbound_and_unknown() {
        let scope = Scope::new();
        assert_eq!(eval("y + 1", &scope), Err(EvalError::Unbound("y".to_string())));
        assert_eq!(eval("nope(1)", &scope), Err(EvalError::UnknownFunction("nope".to_string())));
    }

    #[test]
    fn test_call_by_row() {
        let interp = Interpreter::new();
        let callable = parse_expr("ByRow((a, b) -> a + b)").unwrap();
        let out = interp
            .call(&callable, &[ints(&[1, 2, 3]), ints(&[10, 20, 30])], &Scope::new())
            .unwrap();
        assert_eq!(out, ints(&[11, 22, 33]));

        let err = interp
            .call(&callable, &[ints(&[1, 2]), ints(&[1])], &Scope::new())
            .unwrap_err();
        assert_eq!(err, EvalError::Length(2, 1));
    }

    #[test]
    fn test_call_by_row_without_columns() {
        let interp = Interpreter::new();
        let callable = Expr::call("ByRow", vec![Expr::lambda(vec![], Expr::int(7))]);
        assert_eq!(interp.call(&callable, &[], &Scope::new()).unwrap(), Value::int(7));
        assert_eq!(
            interp.call_rows(&callable, &[], 3, &Scope::new()).unwrap(),
            ints(&[7, 7, 7])
        );

        let wrapped = Expr::call("ByRow", vec![Expr::call("passmissing", vec![Expr::lambda(vec![], Expr::int(1))])]);
        assert_eq!(interp.call_rows(&wrapped, &[], 2, &Scope::new()).unwrap(), ints(&[1, 1]));
    }

    #[test]
    fn test_call_column_wise() {
        let interp = Interpreter::new();
        let callable = parse_expr("x -> sum(x) / length(x)").unwrap();
        let out = interp.call(&callable, &[ints(&[1, 2, 3])], &Scope::new()).unwrap();
        assert_eq!(out, Value::float(2.0));
    }

    #[test]
    fn test_pass_missing_skips_the_function() {
        let calls = Rc::new(Cell::new(0));
        let mut interp = Interpreter::new();
        let counter = calls.clone();
        interp.register("f", move |args: &[Value]| {
            counter.set(counter.get() + 1);
            Ok(args[0].clone())
        });
        let callable = parse_expr("ByRow(passmissing(x -> f(x)))").unwrap();
        let column = Value::list(vec![Value::int(1), Value::Missing, Value::int(3)]);
        let out = interp.call(&callable, &[column], &Scope::new()).unwrap();
        assert_eq!(
            out,
            Value::list(vec![Value::int(1), Value::Missing, Value::int(3)])
        );
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_string_functions_reject_missing() {
        let interp = Interpreter::new();
        let callable = parse_expr("ByRow(x -> uppercase(x))").unwrap();
        let column = Value::list(vec![Value::str("a"), Value::Missing]);
        let err = interp.call(&callable, &[column], &Scope::new()).unwrap_err();
        assert_eq!(
            err,
            EvalError::Type {
                op: "uppercase".to_string(),
                found: "Missing".to_string()
            }
        );
    }

    #[test]
    fn test_custom_wrapper_names() {
        let config = RewriteConfig::default().with_by_row("Rowwise");
        let interp = Interpreter::with_config(&config);
        let callable = parse_expr("Rowwise(x -> x * 2)").unwrap();
        let out = interp.call(&callable, &[ints(&[1, 2])], &Scope::new()).unwrap();
        assert_eq!(out, ints(&[2, 4]));
    }
}

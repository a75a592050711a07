//! Builtin functions for the evaluator.
//!
//! Arithmetic and comparison follow the host's conventions: integers stay
//! integers except under `/`, booleans count as numbers, and `missing`
//! propagates through arithmetic, comparisons and numeric functions. String
//! functions reject `missing`, which is what the `m` flag is for.
//!
//! Every operator also exists in a dotted broadcast form (`.+`, `.==`, ...)
//! that maps over vectors and repeats scalars.

use crate::eval::{EvalError, EvalResult, Interpreter};
use crate::expr::Value;
use std::cmp::Ordering;

const ARITHMETIC: [&str; 6] = ["+", "-", "*", "/", "^", "%"];
const COMPARISON: [&str; 6] = ["==", "!=", "<", ">", "<=", ">="];
const LOGICAL: [&str; 3] = ["&&", "||", "!"];

pub(crate) fn install(interp: &mut Interpreter) {
    for op in ARITHMETIC.iter().chain(&COMPARISON).chain(&LOGICAL).copied() {
        interp.register(op, move |args: &[Value]| operator(op, args));
        interp.register(format!(".{}", op), move |args: &[Value]| {
            broadcast(args, |row| operator(op, row))
        });
    }

    interp.register("sum", |args: &[Value]| sum(collection("sum", args)?));
    interp.register("mean", |args: &[Value]| {
        let items = collection("mean", args)?;
        if items.is_empty() {
            return Ok(Value::float(f64::NAN));
        }
        arithmetic("/", &sum(items)?, &Value::int(items.len() as i64))
    });
    interp.register("length", |args: &[Value]| match single("length", args)? {
        Value::List(items) => Ok(Value::int(items.len() as i64)),
        Value::Record(fields) => Ok(Value::int(fields.len() as i64)),
        Value::Str(s) => Ok(Value::int(s.chars().count() as i64)),
        other => Err(EvalError::type_error("length", other)),
    });
    interp.register("uppercase", |args: &[Value]| {
        map_str("uppercase", args, |s| s.to_uppercase())
    });
    interp.register("string", |args: &[Value]| {
        Ok(Value::str(args.iter().map(plain).collect::<String>()))
    });
    interp.register("Symbol", |args: &[Value]| {
        Ok(Value::symbol(args.iter().map(plain).collect::<String>()))
    });
    interp.register("split", |args: &[Value]| {
        let (s, sep) = match args {
            [Value::Str(s)] => (s, None),
            [Value::Str(s), Value::Str(sep)] => (s, Some(sep)),
            [other, ..] => return Err(EvalError::type_error("split", other)),
            [] => return Err(EvalError::arity("split", 1, 0)),
        };
        let parts: Vec<Value> = match sep {
            Some(sep) => s.split(sep.as_ref()).map(Value::str).collect(),
            None => s.split_whitespace().map(Value::str).collect(),
        };
        Ok(Value::list(parts))
    });
    interp.register("getindex", |args: &[Value]| match args {
        [coll, index] => getindex(coll, index),
        _ => Err(EvalError::arity("getindex", 2, args.len())),
    });
}

/// Length shared by the vector arguments, `None` if there are none.
pub(crate) fn common_length(args: &[Value]) -> EvalResult<Option<usize>> {
    let mut len = None;
    for arg in args {
        if let Value::List(items) = arg {
            match len {
                None => len = Some(items.len()),
                Some(n) if n != items.len() => return Err(EvalError::Length(n, items.len())),
                Some(_) => {}
            }
        }
    }
    Ok(len)
}

/// Row `i` of the arguments; scalars are repeated.
pub(crate) fn row(args: &[Value], i: usize) -> Vec<Value> {
    args.iter()
        .map(|arg| match arg {
            Value::List(items) => items.get(i).cloned().unwrap_or(Value::Missing),
            other => other.clone(),
        })
        .collect()
}

fn broadcast(args: &[Value], f: impl Fn(&[Value]) -> EvalResult<Value>) -> EvalResult<Value> {
    match common_length(args)? {
        None => f(args),
        Some(n) => (0..n)
            .map(|i| f(&row(args, i)))
            .collect::<EvalResult<Vec<_>>>()
            .map(Value::list),
    }
}

fn operator(op: &str, args: &[Value]) -> EvalResult<Value> {
    match args {
        [x] if op == "-" => match x {
            Value::Missing => Ok(Value::Missing),
            Value::Int(n) => Ok(Value::int(n.wrapping_neg())),
            Value::Float(f) => Ok(Value::float(-f.into_inner())),
            Value::Bool(b) => Ok(Value::int(-(*b as i64))),
            other => Err(EvalError::type_error(op, other)),
        },
        [x] if op == "+" => match x {
            Value::Int(_) | Value::Float(_) | Value::Missing => Ok(x.clone()),
            Value::Bool(b) => Ok(Value::int(*b as i64)),
            other => Err(EvalError::type_error(op, other)),
        },
        [x] if op == "!" => match x {
            Value::Missing => Ok(Value::Missing),
            Value::Bool(b) => Ok(Value::bool(!b)),
            other => Err(EvalError::type_error(op, other)),
        },
        [a, b] if COMPARISON.contains(&op) => compare(op, a, b),
        [a, b] if op == "&&" || op == "||" => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => Ok(Value::bool(if op == "&&" { *x && *y } else { *x || *y })),
            (Value::Bool(_), other) | (other, _) => Err(EvalError::type_error(op, other)),
        },
        [a, b] if ARITHMETIC.contains(&op) => arithmetic(op, a, b),
        _ => Err(EvalError::arity(op, if op == "!" { 1 } else { 2 }, args.len())),
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn number(op: &str, v: &Value) -> EvalResult<Num> {
    match v {
        Value::Int(n) => Ok(Num::Int(*n)),
        Value::Float(x) => Ok(Num::Float(x.into_inner())),
        Value::Bool(b) => Ok(Num::Int(*b as i64)),
        other => Err(EvalError::type_error(op, other)),
    }
}

fn as_f64(op: &str, v: &Value) -> EvalResult<f64> {
    Ok(match number(op, v)? {
        Num::Int(n) => n as f64,
        Num::Float(x) => x,
    })
}

fn arithmetic(op: &str, a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_missing() || b.is_missing() {
        return Ok(Value::Missing);
    }
    if let (Value::Str(x), Value::Str(y), "*") = (a, b, op) {
        return Ok(Value::str(format!("{}{}", x, y)));
    }
    match (number(op, a)?, number(op, b)?) {
        (Num::Int(x), Num::Int(y)) => match op {
            "+" => Ok(Value::int(x.wrapping_add(y))),
            "-" => Ok(Value::int(x.wrapping_sub(y))),
            "*" => Ok(Value::int(x.wrapping_mul(y))),
            "/" => Ok(Value::float(x as f64 / y as f64)),
            "%" if y == 0 => Err(EvalError::Type {
                op: op.to_string(),
                found: "a zero divisor".to_string(),
            }),
            "%" => Ok(Value::int(x.wrapping_rem(y))),
            _ => match u32::try_from(y) {
                Ok(exp) => Ok(Value::int(x.wrapping_pow(exp))),
                Err(_) => Ok(Value::float((x as f64).powf(y as f64))),
            },
        },
        (x, y) => {
            let to_f = |n: Num| match n {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            let (x, y) = (to_f(x), to_f(y));
            Ok(Value::float(match op {
                "+" => x + y,
                "-" => x - y,
                "*" => x * y,
                "/" => x / y,
                "%" => x % y,
                _ => x.powf(y),
            }))
        }
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) | (Value::Symbol(x), Value::Symbol(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        _ => {
            let x = as_f64("", a).ok()?;
            let y = as_f64("", b).ok()?;
            x.partial_cmp(&y)
        }
    }
}

fn compare(op: &str, a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_missing() || b.is_missing() {
        return Ok(Value::Missing);
    }
    let ord = ordering(a, b);
    let result = match op {
        "==" => ord.map_or(a == b, |o| o == Ordering::Equal),
        "!=" => ord.map_or(a != b, |o| o != Ordering::Equal),
        _ => {
            let o = match ord {
                Some(o) => o,
                None => return Err(EvalError::type_error(op, b)),
            };
            match op {
                "<" => o == Ordering::Less,
                ">" => o == Ordering::Greater,
                "<=" => o != Ordering::Greater,
                _ => o != Ordering::Less,
            }
        }
    };
    Ok(Value::bool(result))
}

fn single<'a>(name: &str, args: &'a [Value]) -> EvalResult<&'a Value> {
    match args {
        [x] => Ok(x),
        _ => Err(EvalError::arity(name, 1, args.len())),
    }
}

fn collection<'a>(name: &str, args: &'a [Value]) -> EvalResult<&'a [Value]> {
    match single(name, args)? {
        Value::List(items) => Ok(items),
        other => Err(EvalError::type_error(name, other)),
    }
}

fn sum(items: &[Value]) -> EvalResult<Value> {
    items
        .iter()
        .try_fold(Value::int(0), |acc, v| arithmetic("+", &acc, v))
}

fn map_str(name: &str, args: &[Value], f: impl Fn(&str) -> String) -> EvalResult<Value> {
    match single(name, args)? {
        Value::Str(s) => Ok(Value::str(f(s))),
        other => Err(EvalError::type_error(name, other)),
    }
}

fn getindex(coll: &Value, index: &Value) -> EvalResult<Value> {
    match (coll, index) {
        (Value::Record(fields), Value::Symbol(name)) => fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| EvalError::Unbound(name.to_string())),
        (Value::List(items), Value::Int(i)) => position(*i, items.len())
            .and_then(|p| items.get(p).cloned())
            .ok_or(EvalError::Bounds {
                index: *i,
                len: items.len(),
            }),
        (Value::Str(s), Value::Int(i)) => {
            let len = s.chars().count();
            position(*i, len)
                .and_then(|p| s.chars().nth(p))
                .map(|c| Value::str(c.to_string()))
                .ok_or(EvalError::Bounds { index: *i, len })
        }
        (Value::List(_), other) | (Value::Str(_), other) => Err(EvalError::type_error("getindex", other)),
        (other, _) => Err(EvalError::type_error("getindex", other)),
    }
}

/// 0-based position of a 1-based index.
fn position(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i >= 1 && i <= len)
        .map(|i| i - 1)
}

fn plain(v: &Value) -> String {
    match v {
        Value::Str(s) | Value::Symbol(s) => s.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> EvalResult<Value> {
        Interpreter::new().call_function(name, args)
    }

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(call("+", &[Value::int(1), Value::int(2)]).unwrap(), Value::int(3));
        assert_eq!(call("+", &[Value::int(1), Value::float(0.5)]).unwrap(), Value::float(1.5));
        assert_eq!(call("/", &[Value::int(4), Value::int(2)]).unwrap(), Value::float(2.0));
        assert_eq!(call("^", &[Value::int(2), Value::int(10)]).unwrap(), Value::int(1024));
        assert_eq!(call("-", &[Value::int(5)]).unwrap(), Value::int(-5));
        assert_eq!(call("+", &[Value::bool(true), Value::int(1)]).unwrap(), Value::int(2));
        assert_eq!(call("*", &[Value::str("a"), Value::str("b")]).unwrap(), Value::str("ab"));
    }

    #[test]
    fn test_missing_propagates() {
        assert_eq!(call("*", &[Value::Missing, Value::int(2)]).unwrap(), Value::Missing);
        assert_eq!(call(">", &[Value::Missing, Value::int(2)]).unwrap(), Value::Missing);
        assert_eq!(call("-", &[Value::Missing]).unwrap(), Value::Missing);
        let list = Value::list(vec![Value::int(1), Value::Missing]);
        assert_eq!(call("sum", &[list]).unwrap(), Value::Missing);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call("==", &[Value::int(1), Value::float(1.0)]).unwrap(), Value::bool(true));
        assert_eq!(call("<", &[Value::str("a"), Value::str("b")]).unwrap(), Value::bool(true));
        assert_eq!(call("!=", &[Value::str("a"), Value::int(1)]).unwrap(), Value::bool(true));
        assert!(call("<", &[Value::str("a"), Value::int(1)]).is_err());
    }

    #[test]
    fn test_broadcast() {
        let xs = Value::list(vec![Value::int(1), Value::int(2), Value::int(3)]);
        assert_eq!(
            call(".-", &[xs.clone(), Value::int(2)]).unwrap(),
            Value::list(vec![Value::int(-1), Value::int(0), Value::int(1)])
        );
        assert_eq!(
            call(".>", &[xs.clone(), Value::int(1)]).unwrap(),
            Value::list(vec![Value::bool(false), Value::bool(true), Value::bool(true)])
        );
        let short = Value::list(vec![Value::int(1)]);
        assert_eq!(call(".+", &[xs, short]).unwrap_err(), EvalError::Length(3, 1));
    }

    #[test]
    fn test_reductions() {
        let xs = Value::list(vec![Value::int(1), Value::int(2), Value::int(3), Value::int(6)]);
        assert_eq!(call("sum", &[xs.clone()]).unwrap(), Value::int(12));
        assert_eq!(call("mean", &[xs.clone()]).unwrap(), Value::float(3.0));
        assert_eq!(call("length", &[xs]).unwrap(), Value::int(4));
    }

    #[test]
    fn test_strings() {
        assert_eq!(call("uppercase", &[Value::str("alice")]).unwrap(), Value::str("ALICE"));
        assert_eq!(
            call("split", &[Value::str("a b  c")]).unwrap(),
            Value::list(vec![Value::str("a"), Value::str("b"), Value::str("c")])
        );
        assert_eq!(
            call("string", &[Value::str("x"), Value::int(1)]).unwrap(),
            Value::str("x1")
        );
        assert_eq!(
            call("Symbol", &[Value::str("col_"), Value::int(2)]).unwrap(),
            Value::symbol("col_2")
        );
        assert!(call("uppercase", &[Value::Missing]).is_err());
    }

    #[test]
    fn test_getindex() {
        let xs = Value::list(vec![Value::str("a"), Value::str("b")]);
        assert_eq!(call("getindex", &[xs.clone(), Value::int(1)]).unwrap(), Value::str("a"));
        assert_eq!(
            call("getindex", &[xs, Value::int(0)]).unwrap_err(),
            EvalError::Bounds { index: 0, len: 2 }
        );
        assert_eq!(call("getindex", &[Value::str("hey"), Value::int(2)]).unwrap(), Value::str("e"));
    }
}

//! Column reference resolution.
//!
//! Replaces column mentions in an argument tree with [`Expr::Column`] nodes:
//!
//! - `:x` becomes `Symbol("x")`
//! - `$"x"` becomes `String("x")`, `$2` becomes `Position(2)`
//! - `$e` for any other `e` becomes a `Dynamic` reference, evaluated at the
//!   call site by [`crate::bind`]
//!
//! Field names (`a.b`), local variable assignments (`z = ...`) and the insides
//! of dynamic references are left alone. Resolution is idempotent: an
//! already-resolved tree comes back unchanged.

use crate::config::RewriteConfig;
use crate::error::{ArgPos, RewriteError, RewriteResult};
use crate::expr::{ColumnRef, Expr, Value};
use crate::rewrite::Sink;

/// Resolve every column mention inside a value expression.
pub fn resolve(expr: &Expr, arg: ArgPos) -> RewriteResult<Expr> {
    match expr {
        Expr::Quote(name) => Ok(Expr::Column(ColumnRef::Symbol(name.clone()))),
        Expr::Interp(inner) => Ok(Expr::Column(interpolated(inner, arg)?)),
        Expr::Column(_) => Ok(expr.clone()),
        Expr::Flagged { .. } => Err(RewriteError::malformed(
            arg,
            expr,
            "flags may only wrap a whole argument or its value",
        )),
        Expr::Assign { sink, .. } if is_column_marker(sink) => Err(RewriteError::malformed(
            arg,
            expr,
            "column assignments cannot be nested inside an expression",
        )),
        Expr::Dot { target, field } => Ok(Expr::Dot {
            target: Box::new(resolve(target, arg)?),
            field: field.clone(),
        }),
        _ => expr.try_map_children(|child| resolve(child, arg)),
    }
}

/// Resolve the target of an interpolation marker.
pub fn interpolated(inner: &Expr, arg: ArgPos) -> RewriteResult<ColumnRef> {
    match inner {
        Expr::Literal(Value::Str(s)) => Ok(ColumnRef::String(s.clone())),
        Expr::Literal(Value::Symbol(s)) | Expr::Quote(s) => Ok(ColumnRef::Symbol(s.clone())),
        Expr::Literal(Value::Int(n)) => match usize::try_from(*n) {
            Ok(pos) if pos >= 1 => Ok(ColumnRef::Position(pos)),
            _ => Err(RewriteError::InvalidColumnIdentifierType {
                arg,
                expr: Expr::interp(inner.clone()).to_string(),
                found: "Int (column positions start at 1)".to_string(),
            }),
        },
        Expr::Literal(other) => Err(RewriteError::InvalidColumnIdentifierType {
            arg,
            expr: Expr::interp(inner.clone()).to_string(),
            found: other.type_name().to_string(),
        }),
        Expr::Column(col) => Ok(col.clone()),
        _ => Ok(ColumnRef::Dynamic(Box::new(inner.clone()))),
    }
}

/// Resolve the left-hand side of `sink = value`.
pub fn resolve_sink(sink: &Expr, arg: ArgPos, config: &RewriteConfig) -> RewriteResult<Sink> {
    let col = match sink {
        Expr::Quote(name) => ColumnRef::Symbol(name.clone()),
        Expr::Interp(inner) => interpolated(inner, arg)?,
        Expr::Column(col) => col.clone(),
        Expr::Ident(name) if name.as_ref() == config.as_table => return Ok(Sink::AsTable),
        _ => {
            return Err(RewriteError::malformed(
                arg,
                sink,
                "the target of `=` must be a column identifier",
            ))
        }
    };
    if let ColumnRef::Position(_) = col {
        return Err(RewriteError::InvalidColumnIdentifierType {
            arg,
            expr: col.to_string(),
            found: "Int (a position cannot name a new column)".to_string(),
        });
    }
    Ok(Sink::Column(col))
}

fn is_column_marker(expr: &Expr) -> bool {
    matches!(expr, Expr::Quote(_) | Expr::Interp(_) | Expr::Column(_))
}

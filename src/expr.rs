//! Expression trees for the macro mini-language.
//!
//! Trees come out of the host front end (or [`crate::parser`]) in their raw
//! form: quote markers (`:x`), interpolation holes (`$e`), flag wrappers
//! (`@c e`) and plain host expressions. The resolver replaces column mentions
//! with [`Expr::Column`] nodes and the rewriter finally turns them into closure
//! parameters. Every pass builds new trees; nothing is mutated in place.

use ordered_float::OrderedFloat;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

/// Runtime values: literals in trees and the results of evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(Rc<str>),
    Bool(bool),
    /// A symbol used as data (`Symbol("x")`), never a column marker.
    Symbol(Rc<str>),
    /// The missing-value marker.
    Missing,
    List(Rc<[Value]>),
    Record(Rc<[(Rc<str>, Value)]>),
}

impl Value {
    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    pub fn float(f: f64) -> Self {
        Value::Float(OrderedFloat(f))
    }

    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn symbol(s: impl Into<Rc<str>>) -> Self {
        Value::Symbol(s.into())
    }

    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(values.into())
    }

    pub fn record(fields: Vec<(Rc<str>, Value)>) -> Self {
        Value::Record(fields.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Name of the value's type as reported in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Bool(_) => "Bool",
            Value::Symbol(_) => "Symbol",
            Value::Missing => "Missing",
            Value::List(_) => "Vector",
            Value::Record(_) => "NamedTuple",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => {
                let x = x.into_inner();
                if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Str(s) => write_quoted(f, s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Symbol(s) => write!(f, ":{}", s),
            Value::Missing => write!(f, "missing"),
            Value::List(items) => {
                write!(f, "[")?;
                write_joined(f, items.iter())?;
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "(")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", name, value)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Canonical form of a column mention.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRef {
    /// `:x`
    Symbol(Rc<str>),
    /// `$"x"`
    String(Rc<str>),
    /// `$1`, 1-based.
    Position(usize),
    /// `$e` where `e` is only known when the call site runs.
    Dynamic(Box<Expr>),
}

impl ColumnRef {
    pub fn symbol(name: impl Into<Rc<str>>) -> Self {
        ColumnRef::Symbol(name.into())
    }

    pub fn string(name: impl Into<Rc<str>>) -> Self {
        ColumnRef::String(name.into())
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ColumnRef::Dynamic(_))
    }

    /// Identifier-safe stem used for closure parameters and generated sinks.
    pub fn stem(&self) -> String {
        match self {
            ColumnRef::Symbol(s) | ColumnRef::String(s) => sanitize_ident(s),
            ColumnRef::Position(n) => format!("col{}", n),
            ColumnRef::Dynamic(_) => "col".to_string(),
        }
    }

    /// The expression handed to the engine for this reference.
    pub fn engine_form(&self) -> Expr {
        match self {
            ColumnRef::Symbol(s) => Expr::Literal(Value::Symbol(s.clone())),
            ColumnRef::String(s) => Expr::Literal(Value::Str(s.clone())),
            ColumnRef::Position(n) => Expr::Literal(Value::Int(*n as i64)),
            ColumnRef::Dynamic(e) => (**e).clone(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Symbol(s) => write!(f, ":{}", s),
            ColumnRef::String(s) => {
                write!(f, "$")?;
                write_quoted(f, s)
            }
            ColumnRef::Position(n) => write!(f, "${}", n),
            ColumnRef::Dynamic(e) => write_interp(f, e),
        }
    }
}

/// A node of the expression tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    /// A host identifier (variable or function name, operators included).
    Ident(Rc<str>),
    /// Quote marker on an identifier: `:x`.
    Quote(Rc<str>),
    /// Interpolation marker: `$e`.
    Interp(Box<Expr>),
    /// A resolved column reference.
    Column(ColumnRef),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Named call argument `name = value`; never a sink.
    Kw {
        name: Rc<str>,
        value: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        indices: Vec<Expr>,
    },
    /// Field access `target.field`; the field name is not a column.
    Dot {
        target: Box<Expr>,
        field: Rc<str>,
    },
    Assign {
        sink: Box<Expr>,
        value: Box<Expr>,
    },
    /// Flag wrapper `@flags inner`.
    Flagged {
        flags: Rc<str>,
        inner: Box<Expr>,
    },
    Block(Vec<Expr>),
    Tuple(Vec<Expr>),
    NamedTuple(Vec<(Rc<str>, Expr)>),
    Vector(Vec<Expr>),
    Lambda {
        params: Vec<Rc<str>>,
        body: Box<Expr>,
    },
    /// `lhs => rhs`
    Pair(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn lit(v: Value) -> Self {
        Expr::Literal(v)
    }

    pub fn int(n: i64) -> Self {
        Expr::Literal(Value::Int(n))
    }

    pub fn float(x: f64) -> Self {
        Expr::Literal(Value::float(x))
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Expr::Literal(Value::Str(s.into()))
    }

    pub fn ident(name: impl Into<Rc<str>>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn quote(name: impl Into<Rc<str>>) -> Self {
        Expr::Quote(name.into())
    }

    pub fn interp(inner: Expr) -> Self {
        Expr::Interp(Box::new(inner))
    }

    pub fn column(col: ColumnRef) -> Self {
        Expr::Column(col)
    }

    /// Call of a named function or operator.
    pub fn call(name: impl Into<Rc<str>>, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: Box::new(Expr::Ident(name.into())),
            args,
        }
    }

    pub fn assign(sink: Expr, value: Expr) -> Self {
        Expr::Assign {
            sink: Box::new(sink),
            value: Box::new(value),
        }
    }

    pub fn flagged(flags: impl Into<Rc<str>>, inner: Expr) -> Self {
        Expr::Flagged {
            flags: flags.into(),
            inner: Box::new(inner),
        }
    }

    pub fn lambda(params: Vec<Rc<str>>, body: Expr) -> Self {
        Expr::Lambda {
            params,
            body: Box::new(body),
        }
    }

    pub fn pair(lhs: Expr, rhs: Expr) -> Self {
        Expr::Pair(Box::new(lhs), Box::new(rhs))
    }

    /// Name of the called function if this is a call of an identifier.
    pub fn call_name(&self) -> Option<&str> {
        match self {
            Expr::Call { func, .. } => match func.as_ref() {
                Expr::Ident(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Call `f` on every direct child.
    pub fn for_each_child(&self, mut f: impl FnMut(&Expr)) {
        match self {
            Expr::Literal(_) | Expr::Ident(_) | Expr::Quote(_) | Expr::Column(_) => {}
            Expr::Interp(inner) => f(inner),
            Expr::Call { func, args } => {
                f(func);
                args.iter().for_each(f);
            }
            Expr::Kw { value, .. } => f(value),
            Expr::Index { target, indices } => {
                f(target);
                indices.iter().for_each(f);
            }
            Expr::Dot { target, .. } => f(target),
            Expr::Assign { sink, value } => {
                f(sink);
                f(value);
            }
            Expr::Flagged { inner, .. } => f(inner),
            Expr::Block(items) | Expr::Tuple(items) | Expr::Vector(items) => {
                items.iter().for_each(f)
            }
            Expr::NamedTuple(fields) => fields.iter().for_each(|(_, e)| f(e)),
            Expr::Lambda { body, .. } => f(body),
            Expr::Pair(lhs, rhs) => {
                f(lhs);
                f(rhs);
            }
        }
    }

    /// Rebuild this node with every direct child replaced by `f(child)`.
    pub fn try_map_children<E>(
        &self,
        mut f: impl FnMut(&Expr) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        fn boxed<E>(
            e: &Expr,
            f: &mut dyn FnMut(&Expr) -> Result<Expr, E>,
        ) -> Result<Box<Expr>, E> {
            f(e).map(Box::new)
        }

        Ok(match self {
            Expr::Literal(_) | Expr::Ident(_) | Expr::Quote(_) | Expr::Column(_) => self.clone(),
            Expr::Interp(inner) => Expr::Interp(boxed(inner, &mut f)?),
            Expr::Call { func, args } => Expr::Call {
                func: boxed(func, &mut f)?,
                args: args.iter().map(&mut f).collect::<Result<_, _>>()?,
            },
            Expr::Kw { name, value } => Expr::Kw {
                name: name.clone(),
                value: boxed(value, &mut f)?,
            },
            Expr::Index { target, indices } => Expr::Index {
                target: boxed(target, &mut f)?,
                indices: indices.iter().map(&mut f).collect::<Result<_, _>>()?,
            },
            Expr::Dot { target, field } => Expr::Dot {
                target: boxed(target, &mut f)?,
                field: field.clone(),
            },
            Expr::Assign { sink, value } => Expr::Assign {
                sink: boxed(sink, &mut f)?,
                value: boxed(value, &mut f)?,
            },
            Expr::Flagged { flags, inner } => Expr::Flagged {
                flags: flags.clone(),
                inner: boxed(inner, &mut f)?,
            },
            Expr::Block(items) => Expr::Block(items.iter().map(&mut f).collect::<Result<_, _>>()?),
            Expr::Tuple(items) => Expr::Tuple(items.iter().map(&mut f).collect::<Result<_, _>>()?),
            Expr::Vector(items) => {
                Expr::Vector(items.iter().map(&mut f).collect::<Result<_, _>>()?)
            }
            Expr::NamedTuple(fields) => Expr::NamedTuple(
                fields
                    .iter()
                    .map(|(name, e)| Ok((name.clone(), f(e)?)))
                    .collect::<Result<_, E>>()?,
            ),
            Expr::Lambda { params, body } => Expr::Lambda {
                params: params.clone(),
                body: boxed(body, &mut f)?,
            },
            Expr::Pair(lhs, rhs) => Expr::Pair(boxed(lhs, &mut f)?, boxed(rhs, &mut f)?),
        })
    }

    /// Infallible form of [`Expr::try_map_children`].
    pub fn map_children(&self, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
        match self.try_map_children(|e| Ok::<_, Infallible>(f(e))) {
            Ok(e) => e,
            Err(never) => match never {},
        }
    }

    /// Every identifier name occurring in the tree, lambda parameters included.
    ///
    /// Expressions inside dynamic column references are skipped: they are
    /// evaluated at the call site, outside any synthesized closure.
    pub fn idents(&self) -> FxHashSet<Rc<str>> {
        let mut result = FxHashSet::default();
        self.collect_idents(&mut result);
        result
    }

    fn collect_idents(&self, result: &mut FxHashSet<Rc<str>>) {
        match self {
            Expr::Ident(name) => {
                result.insert(name.clone());
            }
            Expr::Lambda { params, .. } => {
                result.extend(params.iter().cloned());
            }
            _ => {}
        }
        self.for_each_child(|child| child.collect_idents(result));
    }

    /// Resolved column references in order of first occurrence, deduplicated.
    pub fn columns(&self) -> Vec<ColumnRef> {
        let mut seen = FxHashSet::default();
        let mut result = Vec::new();
        self.collect_columns(&mut seen, &mut result);
        result
    }

    fn collect_columns(&self, seen: &mut FxHashSet<ColumnRef>, result: &mut Vec<ColumnRef>) {
        if let Expr::Column(col) = self {
            if seen.insert(col.clone()) {
                result.push(col.clone());
            }
            return;
        }
        self.for_each_child(|child| child.collect_columns(seen, result));
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Quote(name) => write!(f, ":{}", name),
            Expr::Interp(inner) => write_interp(f, inner),
            Expr::Column(col) => write!(f, "{}", col),
            Expr::Call { func, args } => {
                if let Expr::Ident(op) = func.as_ref() {
                    if let (Some((prec, right)), [lhs, rhs]) = (binary_precedence(op), &args[..]) {
                        let (lmin, rmin) = if right { (prec + 1, prec) } else { (prec, prec + 1) };
                        return parenthesize(f, prec < min, |f| {
                            lhs.fmt_prec(f, lmin)?;
                            write!(f, " {} ", op)?;
                            rhs.fmt_prec(f, rmin)
                        });
                    }
                    if let (true, [operand]) = (is_unary_operator(op), &args[..]) {
                        return parenthesize(f, UNARY < min, |f| {
                            write!(f, "{}", op)?;
                            operand.fmt_prec(f, UNARY)
                        });
                    }
                }
                func.fmt_prec(f, ATOM)?;
                write!(f, "(")?;
                write_joined(f, args.iter())?;
                write!(f, ")")
            }
            Expr::Kw { name, value } => {
                write!(f, "{} = ", name)?;
                value.fmt_prec(f, 0)
            }
            Expr::Index { target, indices } => {
                target.fmt_prec(f, ATOM)?;
                write!(f, "[")?;
                write_joined(f, indices.iter())?;
                write!(f, "]")
            }
            Expr::Dot { target, field } => {
                target.fmt_prec(f, ATOM)?;
                write!(f, ".{}", field)
            }
            Expr::Assign { sink, value } => parenthesize(f, min > 0, |f| {
                sink.fmt_prec(f, ATOM)?;
                write!(f, " = ")?;
                value.fmt_prec(f, 0)
            }),
            Expr::Flagged { flags, inner } => parenthesize(f, min > 0, |f| {
                write!(f, "@{} ", flags)?;
                inner.fmt_prec(f, 0)
            }),
            Expr::Block(items) => {
                write!(f, "begin")?;
                for (i, item) in items.iter().enumerate() {
                    write!(f, "{}", if i == 0 { " " } else { "; " })?;
                    item.fmt_prec(f, 0)?;
                }
                write!(f, " end")
            }
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items.iter())?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::NamedTuple(fields) => {
                if fields.is_empty() {
                    return write!(f, "(;)");
                }
                write!(f, "(")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = ", name)?;
                    value.fmt_prec(f, 0)?;
                }
                if fields.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::Vector(items) => {
                write!(f, "[")?;
                write_joined(f, items.iter())?;
                write!(f, "]")
            }
            Expr::Lambda { params, body } => parenthesize(f, min > 0, |f| {
                match &params[..] {
                    [single] => write!(f, "{}", single)?,
                    _ => {
                        write!(f, "(")?;
                        write_joined(f, params.iter())?;
                        write!(f, ")")?;
                    }
                }
                write!(f, " -> ")?;
                body.fmt_prec(f, 0)
            }),
            Expr::Pair(lhs, rhs) => parenthesize(f, PAIR < min, |f| {
                lhs.fmt_prec(f, PAIR + 1)?;
                write!(f, " => ")?;
                rhs.fmt_prec(f, PAIR)
            }),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<ColumnRef> for Expr {
    fn from(col: ColumnRef) -> Self {
        Expr::Column(col)
    }
}

const PAIR: u8 = 5;
const UNARY: u8 = 60;
const ATOM: u8 = 100;

/// Binding strength of an infix operator and whether it is right-associative.
pub(crate) fn binary_precedence(op: &str) -> Option<(u8, bool)> {
    let base = op.strip_prefix('.').filter(|rest| !rest.is_empty()).unwrap_or(op);
    let prec = match base {
        "||" => (10, false),
        "&&" => (20, false),
        "==" | "!=" | "<" | ">" | "<=" | ">=" => (30, false),
        "+" | "-" => (40, false),
        "*" | "/" | "%" => (50, false),
        "^" => (70, true),
        _ => return None,
    };
    Some(prec)
}

pub(crate) fn is_unary_operator(op: &str) -> bool {
    matches!(op, "-" | "!" | "+")
}

/// Replace every character that cannot appear in an identifier.
pub(crate) fn sanitize_ident(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        out.insert(0, 'c');
    }
    out
}

fn parenthesize(
    f: &mut fmt::Formatter<'_>,
    wrap: bool,
    inner: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    if wrap {
        write!(f, "(")?;
        inner(f)?;
        write!(f, ")")
    } else {
        inner(f)
    }
}

fn write_joined<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '$' => write!(f, "\\$")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

fn write_interp(f: &mut fmt::Formatter<'_>, inner: &Expr) -> fmt::Result {
    match inner {
        Expr::Ident(_) | Expr::Literal(_) => write!(f, "${}", inner),
        _ => write!(f, "$({})", inner),
    }
}

//! The argument rewriter.
//!
//! Turns one positional argument into a `source => function => sink` triple:
//!
//! 1. strip flag wrappers around the argument and around its value
//! 2. split `sink = value`
//! 3. resolve column mentions in the value (and a dynamic sink)
//! 4. abstract the distinct columns into closure parameters
//! 5. pick the sink: explicit, synthesized, or none for sink-less constructs
//!
//! Arguments carrying the `t` flag become a [`TableGroup`] instead; the
//! emitter merges those into a single `AsTable` triple. In a `@t` block only
//! the `:field = expression` lines are collected; other lines stay as
//! ordinary code ahead of the resulting named tuple.

use crate::config::RewriteConfig;
use crate::construct::{Construct, SinkPolicy};
use crate::error::{ArgPos, RewriteError, RewriteResult};
use crate::expr::{sanitize_ident, ColumnRef, Expr, Value};
use crate::flags::{self, Flags, Mode};
use crate::resolve::{resolve, resolve_sink};
use crate::subst::{canonicalize, Closure, NameGen};
use rustc_hash::FxHashSet;
use std::fmt;
use std::rc::Rc;

/// Where a triple's result goes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Sink {
    /// Named by the user.
    Column(ColumnRef),
    /// Derived from the value expression.
    Generated(Rc<str>),
    /// The table-collection marker.
    AsTable,
}

impl Sink {
    /// The expression handed to the engine for this sink.
    pub fn engine_form(&self, config: &RewriteConfig) -> Expr {
        match self {
            Sink::Column(col) => col.engine_form(),
            Sink::Generated(name) => Expr::Literal(Value::Symbol(name.clone())),
            Sink::AsTable => Expr::ident(config.as_table.as_str()),
        }
    }

    /// The column name, when it is known before the call site runs.
    pub fn static_name(&self) -> Option<&Rc<str>> {
        match self {
            Sink::Column(ColumnRef::Symbol(name))
            | Sink::Column(ColumnRef::String(name))
            | Sink::Generated(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Column(col) => write!(f, "{}", col),
            Sink::Generated(name) => write!(f, ":{}", name),
            Sink::AsTable => write!(f, "AsTable"),
        }
    }
}

/// A normalized transformation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Triple {
    pub arg: ArgPos,
    /// Distinct sources in first-occurrence order.
    pub sources: Vec<ColumnRef>,
    pub function: Closure,
    pub sink: Option<Sink>,
    pub mode: Mode,
    pub pass_missing: bool,
    /// A bare, unflagged column (possibly renamed) that the engine takes as is.
    pub passthrough: bool,
}

/// One collected field of a `@t` argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableField {
    pub name: Rc<str>,
    /// Mode after the group's and the line's own flags.
    pub mode: Mode,
    pub pass_missing: bool,
}

/// A `@t` argument, still unmerged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableGroup {
    pub arg: ArgPos,
    /// Collected fields in source order.
    pub fields: Vec<TableField>,
    /// Resolved expression producing the named tuple of the fields. Other
    /// lines of a block stay in it as ordinary code.
    pub body: Expr,
}

/// The result of rewriting one argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rewritten {
    Triple(Triple),
    Group(TableGroup),
}

impl Rewritten {
    pub fn arg(&self) -> ArgPos {
        match self {
            Rewritten::Triple(t) => t.arg,
            Rewritten::Group(g) => g.arg,
        }
    }
}

/// Rewrite one positional argument of `construct`.
pub fn rewrite_argument(
    expr: &Expr,
    arg: ArgPos,
    construct: Construct,
    config: &RewriteConfig,
) -> RewriteResult<Rewritten> {
    let policy = construct.policy();
    let mut flags = Flags::default();
    let inner = flags::strip(expr, &mut flags, arg)?;
    let (sink_expr, value) = split_assignment(inner, arg)?;
    let value = flags::strip(value, &mut flags, arg)?;
    if let Some(sink @ Expr::Flagged { .. }) = sink_expr {
        return Err(RewriteError::malformed(arg, sink, "flags cannot wrap an output column"));
    }

    if flags.table {
        if policy.sinks == SinkPolicy::Forbidden {
            return Err(RewriteError::malformed(
                arg,
                expr,
                format!("@{} does not produce columns, so `t` has nothing to collect", construct),
            ));
        }
        let group = table_group(sink_expr, value, &flags, arg, policy.default_mode)?;
        tracing::trace!(arg = arg.0, fields = group.fields.len(), "collected table group");
        return Ok(Rewritten::Group(group));
    }

    let sink = match sink_expr {
        Some(sink) if policy.sinks == SinkPolicy::Forbidden => {
            return Err(RewriteError::malformed(
                arg,
                sink,
                format!("@{} does not take an output column", construct),
            ))
        }
        Some(sink) => Some(resolve_sink(sink, arg, config)?),
        None => None,
    };

    let resolved = resolve(value, arg)?;
    let (sources, function) = canonicalize(&resolved);
    let passthrough = flags.is_empty()
        && function.is_identity()
        && !matches!(sink, Some(Sink::AsTable));
    let sink = match sink {
        None if policy.sinks == SinkPolicy::Optional && !passthrough => Some(Sink::Generated(
            generated_sink_name(&sources, &resolved, config).into(),
        )),
        other => other,
    };

    let triple = Triple {
        arg,
        sources,
        function,
        sink,
        mode: flags.mode_or(policy.default_mode),
        pass_missing: flags.pass_missing,
        passthrough,
    };
    tracing::trace!(
        arg = arg.0,
        sources = triple.sources.len(),
        mode = %triple.mode,
        pass_missing = triple.pass_missing,
        "rewrote argument"
    );
    Ok(Rewritten::Triple(triple))
}

/// Split a top-level `sink = value`.
fn split_assignment(expr: &Expr, arg: ArgPos) -> RewriteResult<(Option<&Expr>, &Expr)> {
    match expr {
        Expr::Assign { sink, value } => Ok((Some(sink), value)),
        Expr::Kw { .. } => Err(RewriteError::malformed(
            arg,
            expr,
            "keyword arguments must follow `;`",
        )),
        Expr::Pair(..) => Err(RewriteError::malformed(
            arg,
            expr,
            "already a `source => function => sink` pair",
        )),
        _ => Ok((None, expr)),
    }
}

/// A line of a `@t` collection.
enum TableLine<'a> {
    /// `:field = value`, with the line's flags merged into the group's.
    Field(Flags, &'a Expr, &'a Expr),
    /// Any other line of a block.
    Statement(&'a Expr),
}

fn table_group(
    sink: Option<&Expr>,
    value: &Expr,
    group_flags: &Flags,
    arg: ArgPos,
    default_mode: Mode,
) -> RewriteResult<TableGroup> {
    let lines = match (sink, value) {
        (Some(sink), _) => vec![TableLine::Field(group_flags.clone(), sink, value)],
        (None, Expr::Block(items)) => items
            .iter()
            .map(|item| table_line(item, group_flags, arg, true))
            .collect::<RewriteResult<Vec<_>>>()?,
        (None, Expr::Tuple(items)) => items
            .iter()
            .map(|item| table_line(item, group_flags, arg, false))
            .collect::<RewriteResult<Vec<_>>>()?,
        (None, other) => vec![table_line(other, group_flags, arg, false)?],
    };

    let mut seen: FxHashSet<Rc<str>> = FxHashSet::default();
    let mut fields = Vec::new();
    let mut entries: Vec<(Option<Rc<str>>, &Expr)> = Vec::with_capacity(lines.len());
    for line in lines {
        let (flags, field, value) = match line {
            TableLine::Field(flags, field, value) => (flags, field, value),
            TableLine::Statement(stmt) => {
                entries.push((None, stmt));
                continue;
            }
        };
        let name = match field {
            Expr::Quote(name) => name.clone(),
            other => {
                return Err(RewriteError::table_sink(
                    arg,
                    other,
                    "table fields must be plain `:symbol` names",
                ))
            }
        };
        if !seen.insert(name.clone()) {
            return Err(RewriteError::table_sink(arg, field, "duplicate field name"));
        }
        fields.push(TableField {
            name: name.clone(),
            mode: flags.mode_or(default_mode),
            pass_missing: flags.pass_missing,
        });
        entries.push((Some(name), value));
    }
    if fields.is_empty() {
        return Err(RewriteError::malformed(
            arg,
            value,
            "table collection without any `:field = expression`",
        ));
    }

    // Without other statements the field values go straight into the tuple;
    // otherwise each field is bound to a fresh local first.
    let inline = entries.iter().all(|(name, _)| name.is_some());
    let mut locals = NameGen::for_identifiers(value.idents());
    let mut statements = Vec::new();
    let mut tuple = Vec::with_capacity(fields.len());
    for (name, expr) in entries {
        let resolved = resolve(expr, arg)?;
        match name {
            Some(name) if inline => tuple.push((name, resolved)),
            Some(name) => {
                let local = locals.fresh(&name);
                statements.push(Expr::assign(Expr::Ident(local.clone()), resolved));
                tuple.push((name, Expr::Ident(local)));
            }
            None => statements.push(resolved),
        }
    }
    let body = if statements.is_empty() {
        Expr::NamedTuple(tuple)
    } else {
        statements.push(Expr::NamedTuple(tuple));
        Expr::Block(statements)
    };
    Ok(TableGroup { arg, fields, body })
}

/// Classify one entry of a `@t` tuple or block.
fn table_line<'a>(
    item: &'a Expr,
    group_flags: &Flags,
    arg: ArgPos,
    allow_statements: bool,
) -> RewriteResult<TableLine<'a>> {
    let mut line_flags = Flags::default();
    let inner = flags::strip(item, &mut line_flags, arg)?;
    let (field, value) = match inner {
        Expr::Assign { sink, value }
            if !allow_statements
                || matches!(sink.as_ref(), Expr::Quote(_) | Expr::Interp(_) | Expr::Column(_)) =>
        {
            (sink.as_ref(), flags::strip(value, &mut line_flags, arg)?)
        }
        other if allow_statements => {
            if !line_flags.is_empty() {
                return Err(RewriteError::malformed(
                    arg,
                    item,
                    "flags in a table collection apply to `:field = expression` lines only",
                ));
            }
            return Ok(TableLine::Statement(other));
        }
        other => {
            return Err(RewriteError::table_sink(
                arg,
                other,
                "every entry of a table tuple must be `:field = expression`",
            ))
        }
    };
    if line_flags.table {
        return Err(RewriteError::malformed(
            arg,
            item,
            "table collections cannot be nested",
        ));
    }
    let mut combined = group_flags.clone();
    if !line_flags.is_empty() {
        combined.add(line_flags.spelled(), arg)?;
    }
    Ok(TableLine::Field(combined, field, value))
}

/// Deterministic output name for an argument without an explicit sink.
///
/// Source stems joined by the separator, followed by a word for the
/// outermost operation: `:a + :b` gives `a_b_plus`.
pub fn generated_sink_name(sources: &[ColumnRef], value: &Expr, config: &RewriteConfig) -> String {
    let op = operation_word(value);
    if sources.is_empty() {
        return op;
    }
    let mut parts: Vec<String> = sources.iter().map(ColumnRef::stem).collect();
    parts.push(op);
    parts.join(config.sink_separator.as_str())
}

fn operation_word(expr: &Expr) -> String {
    match expr {
        Expr::Call { func, .. } => match func.as_ref() {
            Expr::Ident(name) => operator_word(name),
            _ => "value".to_string(),
        },
        Expr::Index { .. } => "getindex".to_string(),
        Expr::Dot { field, .. } => sanitize_ident(field),
        _ => "value".to_string(),
    }
}

fn operator_word(name: &str) -> String {
    let base = name.strip_prefix('.').filter(|rest| !rest.is_empty()).unwrap_or(name);
    let word = match base {
        "+" => "plus",
        "-" => "minus",
        "*" => "times",
        "/" => "divide",
        "%" => "rem",
        "^" => "power",
        ">" => "gt",
        "<" => "lt",
        ">=" => "ge",
        "<=" => "le",
        "==" => "eq",
        "!=" => "ne",
        "&&" => "and",
        "||" => "or",
        "!" => "not",
        other => return sanitize_ident(other),
    };
    word.to_string()
}

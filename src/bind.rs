//! Binding at the call site.
//!
//! Rewriting leaves `$e` references whose target is only known when the call
//! site runs. [`bind`] evaluates them in the caller's scope, checks that each
//! names a column, and re-abstracts the closures so that a dynamic reference
//! to a column also mentioned statically collapses into one parameter. The
//! result is exactly what the static spelling would have rewritten to.

use crate::construct::{Expander, Invocation};
use crate::emit::EngineCall;
use crate::error::{ArgPos, Error, RewriteError};
use crate::eval::{Interpreter, Scope};
use crate::expr::{ColumnRef, Value};
use crate::rewrite::{Sink, Triple};
use crate::subst::canonicalize;
use std::fmt;

/// An engine call with every column reference concrete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundCall(EngineCall);

impl BoundCall {
    pub fn call(&self) -> &EngineCall {
        &self.0
    }

    pub fn into_call(self) -> EngineCall {
        self.0
    }
}

impl fmt::Display for BoundCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The external tabular engine.
pub trait Backend {
    type Output;
    type Error;

    fn execute(&mut self, call: &BoundCall) -> Result<Self::Output, Self::Error>;
}

/// Resolve every dynamic reference of `call` in `scope`.
pub fn bind(call: &EngineCall, interp: &Interpreter, scope: &Scope) -> Result<BoundCall, Error> {
    let mut resolved = 0;
    let mut triples = Vec::with_capacity(call.triples.len());
    for triple in &call.triples {
        let dynamic = triple.sources.iter().filter(|c| c.is_dynamic()).count()
            + matches!(&triple.sink, Some(Sink::Column(c)) if c.is_dynamic()) as usize;
        if dynamic == 0 {
            triples.push(triple.clone());
            continue;
        }
        resolved += dynamic;
        triples.push(bind_triple(triple, interp, scope)?);
    }
    tracing::debug!(
        construct = %call.construct,
        dynamic = resolved,
        "bound call"
    );
    let mut bound = call.clone();
    bound.triples = triples;
    Ok(BoundCall(bound))
}

fn bind_triple(triple: &Triple, interp: &Interpreter, scope: &Scope) -> Result<Triple, Error> {
    let sources = triple
        .sources
        .iter()
        .map(|col| concrete(col, triple.arg, interp, scope))
        .collect::<Result<Vec<_>, _>>()?;
    let body = triple.function.instantiate(&sources);
    let (sources, function) = canonicalize(&body);

    let sink = match &triple.sink {
        Some(Sink::Column(col)) => match concrete(col, triple.arg, interp, scope)? {
            ColumnRef::Position(_) => {
                return Err(RewriteError::InvalidColumnIdentifierType {
                    arg: triple.arg,
                    expr: col.to_string(),
                    found: "Int (a position cannot name a new column)".to_string(),
                }
                .into())
            }
            col => Some(Sink::Column(col)),
        },
        other => other.clone(),
    };

    Ok(Triple {
        sources,
        function,
        sink,
        ..triple.clone()
    })
}

/// Turn a dynamic reference into a concrete one.
fn concrete(col: &ColumnRef, arg: ArgPos, interp: &Interpreter, scope: &Scope) -> Result<ColumnRef, Error> {
    let expr = match col {
        ColumnRef::Dynamic(expr) => expr,
        other => return Ok(other.clone()),
    };
    let found = match interp.eval(expr, scope)? {
        Value::Symbol(name) => return Ok(ColumnRef::Symbol(name)),
        Value::Str(name) => return Ok(ColumnRef::String(name)),
        Value::Int(n) if n >= 1 => return Ok(ColumnRef::Position(n as usize)),
        Value::Int(_) => "Int (column positions start at 1)".to_string(),
        other => other.type_name().to_string(),
    };
    Err(RewriteError::InvalidColumnIdentifierType {
        arg,
        expr: col.to_string(),
        found,
    }
    .into())
}

/// Expand, bind and execute one invocation.
pub fn invoke<B>(
    backend: &mut B,
    expander: &Expander,
    invocation: &Invocation,
    interp: &Interpreter,
    scope: &Scope,
) -> Result<B::Output, B::Error>
where
    B: Backend,
    B::Error: From<Error>,
{
    let call = expander.expand(invocation).map_err(Error::from)?;
    let bound = bind(&call, interp, scope)?;
    backend.execute(&bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::Construct;
    use crate::eval::EvalError;
    use crate::expr::Expr;
    use crate::flags::Mode;
    use crate::parser::parse_invocation;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Columns by name, in insertion order.
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Table {
        columns: Vec<(Rc<str>, Vec<Value>)>,
    }

    impl Table {
        fn with(mut self, name: &str, values: Vec<Value>) -> Self {
            self.set(name.into(), values);
            self
        }

        fn set(&mut self, name: Rc<str>, values: Vec<Value>) {
            match self.columns.iter_mut().find(|(n, _)| *n == name) {
                Some((_, slot)) => *slot = values,
                None => self.columns.push((name, values)),
            }
        }

        fn get(&self, col: &ColumnRef) -> Option<&Vec<Value>> {
            match col {
                ColumnRef::Symbol(name) | ColumnRef::String(name) => {
                    self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
                }
                ColumnRef::Position(p) => self.columns.get(p - 1).map(|(_, v)| v),
                ColumnRef::Dynamic(_) => None,
            }
        }

        fn nrow(&self) -> usize {
            self.columns.first().map_or(0, |(_, v)| v.len())
        }
    }

    /// Runs `transform` and `subset` over an in-memory table.
    struct MemoryBackend {
        table: Table,
        interp: Interpreter,
    }

    impl Backend for MemoryBackend {
        type Output = Table;
        type Error = Error;

        fn execute(&mut self, call: &BoundCall) -> Result<Table, Error> {
            let call = call.call();
            let mut out = self.table.clone();
            let mut keep = vec![true; self.table.nrow()];
            for triple in &call.triples {
                let args: Vec<Value> = triple
                    .sources
                    .iter()
                    .map(|c| Value::list(self.table.get(c).cloned().unwrap_or_default()))
                    .collect();
                let callable = call.callable(triple);
                let result = self.interp.call_rows(&callable, &args, self.table.nrow(), &Scope::new())?;
                let values = match result {
                    Value::List(items) => items.to_vec(),
                    other => vec![other; self.table.nrow()],
                };
                match &triple.sink {
                    None => {
                        for (k, v) in keep.iter_mut().zip(&values) {
                            *k &= *v == Value::Bool(true);
                        }
                    }
                    Some(Sink::AsTable) => {
                        let mut fields: Vec<(Rc<str>, Vec<Value>)> = Vec::new();
                        for record in &values {
                            if let Value::Record(rec) = record {
                                for (i, (name, v)) in rec.iter().enumerate() {
                                    if fields.len() <= i {
                                        fields.push((name.clone(), Vec::new()));
                                    }
                                    fields[i].1.push(v.clone());
                                }
                            }
                        }
                        for (name, column) in fields {
                            out.set(name, column);
                        }
                    }
                    Some(sink) => {
                        let name = sink.static_name().cloned().unwrap_or_else(|| Rc::from("?"));
                        out.set(name, values);
                    }
                }
            }
            if call.construct == Construct::Subset {
                for (_, column) in out.columns.iter_mut() {
                    let mut flags = keep.iter();
                    column.retain(|_| *flags.next().unwrap_or(&false));
                }
            }
            Ok(out)
        }
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&n| Value::int(n)).collect()
    }

    fn run(src: &str, table: Table, interp: Interpreter, scope: &Scope) -> Result<Table, Error> {
        let mut backend = MemoryBackend {
            table,
            interp: interp.clone(),
        };
        let inv = parse_invocation(src).unwrap();
        invoke(&mut backend, &Expander::new(), &inv, &interp, scope)
    }

    fn bound(src: &str, scope: &Scope) -> Result<BoundCall, Error> {
        let call = Expander::new().expand(&parse_invocation(src).unwrap())?;
        bind(&call, &Interpreter::new(), scope)
    }

    #[test]
    fn test_dynamic_reference_binds_like_static() {
        let scope = Scope::new().with("col", Value::symbol("x"));
        let dynamic = bound("@transform(df, :y = $col + 1)", &scope).unwrap();
        let fixed = bound("@transform(df, :y = :x + 1)", &scope).unwrap();
        assert_eq!(dynamic, fixed);
        assert_eq!(dynamic.to_string(), "transform(df, :x => ByRow(x -> x + 1) => :y)");
    }

    #[test]
    fn test_dynamic_and_static_mentions_collapse() {
        let scope = Scope::new().with("col", Value::symbol("x"));
        let call = bound("@transform(df, :z = :x * $col)", &scope).unwrap();
        let triple = &call.call().triples[0];
        assert_eq!(triple.sources, vec![ColumnRef::symbol("x")]);
        assert_eq!(triple.function.to_string(), "x -> x * x");
    }

    #[test]
    fn test_dynamic_expression_and_sink() {
        let scope = Scope::new()
            .with("cols", Value::list(vec![Value::str("a"), Value::str("b c")]))
            .with("name", Value::str("out"));
        let call = bound("@select(df, $name = $(cols[2]) * 2)", &scope).unwrap();
        assert_eq!(
            call.to_string(),
            "select(df, \"b c\" => ByRow(b_c -> b_c * 2) => \"out\")"
        );
        let triple = &call.call().triples[0];
        assert_eq!(triple.mode, Mode::RowWise);
    }

    #[test]
    fn test_invalid_dynamic_identifier() {
        let scope = Scope::new().with("col", Value::float(3.5));
        let err = bound("@transform(df, :a = :b, :y = $col + 1)", &scope).unwrap_err();
        match err {
            Error::Rewrite(RewriteError::InvalidColumnIdentifierType { arg, expr, found }) => {
                assert_eq!(arg, ArgPos(2));
                assert_eq!(expr, "$col");
                assert_eq!(found, "Float");
            }
            other => panic!("expected an identifier error, got {:?}", other),
        }

        let scope = Scope::new().with("pos", Value::int(2));
        let err = bound("@transform(df, $pos = :x)", &scope).unwrap_err();
        assert!(matches!(
            err,
            Error::Rewrite(RewriteError::InvalidColumnIdentifierType { .. })
        ));
    }

    #[test]
    fn test_unbound_dynamic_reference() {
        let err = bound("@transform(df, :y = $nope)", &Scope::new()).unwrap_err();
        assert!(matches!(err, Error::Eval(EvalError::Unbound(_))));
    }

    #[test]
    fn test_missing_propagation_end_to_end() {
        let calls = Rc::new(Cell::new(0));
        let mut interp = Interpreter::new();
        let counter = calls.clone();
        interp.register("f", move |args: &[Value]| {
            counter.set(counter.get() + 1);
            match args {
                [Value::Int(n)] => Ok(Value::int(n * 10)),
                [other] => Err(EvalError::type_error("f", other)),
                _ => Err(EvalError::arity("f", 1, args.len())),
            }
        });
        let table = Table::default().with("x", vec![Value::int(1), Value::Missing, Value::int(3)]);
        let out = run("@transform(df, @m :y = f(:x))", table, interp, &Scope::new()).unwrap();
        assert_eq!(
            out.get(&ColumnRef::symbol("y")).cloned(),
            Some(vec![Value::int(10), Value::Missing, Value::int(30)])
        );
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_table_collection_end_to_end() {
        let table = Table::default().with("x", ints(&[1, 2]));
        let out = run(
            "@transform(df, @t (:a = :x + 1, :b = :x - 1))",
            table,
            Interpreter::new(),
            &Scope::new(),
        )
        .unwrap();
        assert_eq!(out.get(&ColumnRef::symbol("a")).cloned(), Some(ints(&[2, 3])));
        assert_eq!(out.get(&ColumnRef::symbol("b")).cloned(), Some(ints(&[0, 1])));
    }

    #[test]
    fn test_table_block_with_helpers_end_to_end() {
        let table = Table::default().with(
            "name",
            vec![Value::str("Ada Lovelace"), Value::str("Alan Turing")],
        );
        let src = "@transform(df, @t begin\n  s = split(:name)\n  :first = s[1]\n  :last = s[2]\nend)";
        let out = run(src, table, Interpreter::new(), &Scope::new()).unwrap();
        assert_eq!(
            out.get(&ColumnRef::symbol("first")).cloned(),
            Some(vec![Value::str("Ada"), Value::str("Alan")])
        );
        assert_eq!(
            out.get(&ColumnRef::symbol("last")).cloned(),
            Some(vec![Value::str("Lovelace"), Value::str("Turing")])
        );
        assert_eq!(out.get(&ColumnRef::symbol("s")), None);
    }

    #[test]
    fn test_subset_end_to_end() {
        let table = Table::default()
            .with("x", ints(&[-1, 2, 0, 5]))
            .with("name", vec![Value::str("a"), Value::str("b"), Value::str("c"), Value::str("d")]);
        let out = run("@subset(df, :x > 0)", table, Interpreter::new(), &Scope::new()).unwrap();
        assert_eq!(
            out.get(&ColumnRef::symbol("name")).cloned(),
            Some(vec![Value::str("b"), Value::str("d")])
        );
    }

    #[test]
    fn test_column_wise_and_positions() {
        let table = Table::default().with("x", ints(&[1, 2, 3, 6]));
        let out = run(
            "@transform(df, @c :centered = $1 .- mean($1))",
            table,
            Interpreter::new(),
            &Scope::new(),
        )
        .unwrap();
        assert_eq!(
            out.get(&ColumnRef::symbol("centered")).cloned(),
            Some(vec![Value::float(-2.0), Value::float(-1.0), Value::float(0.0), Value::float(3.0)])
        );
    }

    #[test]
    fn test_constant_column_fills_every_row() {
        let table = Table::default().with("x", ints(&[4, 5, 6]));
        let out = run("@transform(df, :one = 1)", table, Interpreter::new(), &Scope::new()).unwrap();
        assert_eq!(out.get(&ColumnRef::symbol("one")).cloned(), Some(ints(&[1, 1, 1])));
    }

    #[test]
    fn test_static_call_is_untouched() {
        let call = Expander::new()
            .expand(&Invocation::new(
                Construct::Sort,
                Expr::ident("df"),
                vec![Expr::quote("x")],
            ))
            .unwrap();
        let bound = bind(&call, &Interpreter::new(), &Scope::new()).unwrap();
        assert_eq!(bound.call(), &call);
    }
}

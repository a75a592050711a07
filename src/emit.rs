//! Triple emission.
//!
//! Assembles the rewritten arguments of one invocation into the call handed
//! to the tabular engine:
//!
//! ```text
//! operation(table, sources => function => sink, ...; kwargs...)
//! ```
//!
//! Table groups are merged into one triple whose function returns a named
//! tuple and whose sink is the `AsTable` marker. Generated sink names are made
//! unique across the invocation here, since only the emitter sees every
//! argument.

use crate::config::RewriteConfig;
use crate::construct::Construct;
use crate::error::{RewriteError, RewriteResult};
use crate::flags::Mode;
use crate::rewrite::{Rewritten, Sink, TableGroup, Triple};
use crate::subst::{canonicalize, NameGen};
use crate::expr::Expr;
use std::fmt;
use std::rc::Rc;

/// The finished call for one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineCall {
    pub construct: Construct,
    pub table: Expr,
    /// One triple per positional argument, in argument order.
    pub triples: Vec<Triple>,
    /// Keyword arguments, passed through untouched.
    pub kwargs: Vec<(Rc<str>, Expr)>,
    config: RewriteConfig,
}

/// Assemble the engine call from rewritten arguments.
pub fn emit(
    construct: Construct,
    table: Expr,
    rewritten: Vec<Rewritten>,
    kwargs: Vec<(Rc<str>, Expr)>,
    config: &RewriteConfig,
) -> RewriteResult<EngineCall> {
    let mut triples = Vec::with_capacity(rewritten.len());
    for item in rewritten {
        match item {
            Rewritten::Triple(triple) => triples.push(triple),
            Rewritten::Group(group) => triples.push(merge_group(group)?),
        }
    }
    assign_generated_sinks(&mut triples);
    Ok(EngineCall {
        construct,
        table,
        triples,
        kwargs,
        config: config.clone(),
    })
}

/// Merge the fields of a table group into one `AsTable` triple.
pub fn merge_group(group: TableGroup) -> RewriteResult<Triple> {
    let arg = group.arg;
    let (first, rest) = match group.fields.split_first() {
        Some(split) => split,
        None => {
            return Err(RewriteError::malformed(
                arg,
                &group.body,
                "empty table collection",
            ))
        }
    };
    for field in rest {
        if field.mode != first.mode || field.pass_missing != first.pass_missing {
            return Err(RewriteError::MixedModeInTableGroup {
                arg,
                field: field.name.to_string(),
                first: first.name.to_string(),
            });
        }
    }

    let (sources, function) = canonicalize(&group.body);
    tracing::trace!(
        arg = arg.0,
        fields = group.fields.len(),
        sources = sources.len(),
        "merged table group"
    );
    Ok(Triple {
        arg,
        sources,
        function,
        sink: Some(Sink::AsTable),
        mode: first.mode,
        pass_missing: first.pass_missing,
        passthrough: false,
    })
}

/// Suffix generated sinks that collide with explicit sinks or with each other.
fn assign_generated_sinks(triples: &mut [Triple]) {
    let mut names = NameGen::with_reserved(triples.iter().filter_map(|t| match &t.sink {
        Some(sink @ Sink::Column(_)) => sink.static_name().cloned(),
        _ => None,
    }));
    for triple in triples.iter_mut() {
        if let Some(Sink::Generated(base)) = &triple.sink {
            let name = names.fresh(base);
            triple.sink = Some(Sink::Generated(name));
        }
    }
}

impl EngineCall {
    /// The engine operation name, e.g. `transform!`.
    pub fn operation(&self) -> &'static str {
        self.construct.operation()
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// The callable for a triple: the closure wrapped per mode and flags.
    pub fn callable(&self, triple: &Triple) -> Expr {
        let mut callable = triple.function.to_expr();
        if triple.pass_missing {
            callable = Expr::call(self.config.pass_missing.as_str(), vec![callable]);
        }
        if triple.mode == Mode::RowWise {
            callable = Expr::call(self.config.by_row.as_str(), vec![callable]);
        }
        callable
    }

    /// A triple in the engine's `sources => function => sink` form.
    pub fn triple_expr(&self, triple: &Triple) -> Expr {
        let sink = triple.sink.as_ref().map(|s| s.engine_form(&self.config));
        if triple.passthrough {
            if let Some(source) = triple.sources.first() {
                let source = source.engine_form();
                return match sink {
                    Some(sink) => Expr::pair(source, sink),
                    None => source,
                };
            }
        }
        let sources = match &triple.sources[..] {
            [single] => single.engine_form(),
            many => Expr::Vector(many.iter().map(|c| c.engine_form()).collect()),
        };
        let callable = self.callable(triple);
        let rhs = match sink {
            Some(sink) => Expr::pair(callable, sink),
            None => callable,
        };
        Expr::pair(sources, rhs)
    }

    /// The whole call as an expression tree; keyword arguments become
    /// [`Expr::Kw`] nodes.
    pub fn to_expr(&self) -> Expr {
        let mut args = Vec::with_capacity(1 + self.triples.len() + self.kwargs.len());
        args.push(self.table.clone());
        args.extend(self.triples.iter().map(|t| self.triple_expr(t)));
        args.extend(self.kwargs.iter().map(|(name, value)| Expr::Kw {
            name: name.clone(),
            value: Box::new(value.clone()),
        }));
        Expr::call(self.operation(), args)
    }
}

impl fmt::Display for EngineCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.operation(), self.table)?;
        for triple in &self.triples {
            write!(f, ", {}", self.triple_expr(triple))?;
        }
        for (i, (name, value)) in self.kwargs.iter().enumerate() {
            write!(f, "{}{} = {}", if i == 0 { "; " } else { ", " }, name, value)?;
        }
        write!(f, ")")
    }
}

//! dfmacros: rewrites DataFrame macro invocations into engine calls.
//!
//! This crate provides:
//! - Expression trees, column references and a small parser for macro syntax
//! - Flag handling (`@r`, `@c`, `@m`, `@t`) and `$` interpolation
//! - Rewriting of each argument into a `source => function => sink` triple
//! - Assembly of the engine call for every construct
//! - Call-site binding of dynamic column references
//! - A reference interpreter for the closures it produces

pub mod bind;
pub(crate) mod builtins;
pub mod config;
pub mod construct;
pub mod emit;
pub mod error;
pub mod eval;
pub mod expr;
pub mod flags;
pub mod parser;
pub mod resolve;
pub mod rewrite;
pub mod subst;

// Re-exports for convenience
pub use bind::{bind, invoke, Backend, BoundCall};
pub use config::RewriteConfig;
pub use construct::{Construct, Expander, Invocation, Policy, SinkPolicy};
pub use emit::EngineCall;
pub use error::{ArgPos, Error, RewriteError, RewriteResult};
pub use eval::{EvalError, Interpreter, Scope};
pub use expr::{ColumnRef, Expr, Value};
pub use flags::{Flags, Mode};
pub use parser::{parse_expr, parse_invocation, ParseError};
pub use rewrite::{Sink, Triple};
pub use subst::Closure;

/// Expand one invocation with the default configuration.
pub fn expand(invocation: &Invocation) -> RewriteResult<EngineCall> {
    Expander::new().expand(invocation)
}

/// Parse and expand macro source such as `@transform(df, :y = :x + 1)`.
pub fn expand_str(source: &str) -> Result<EngineCall, Error> {
    let invocation = parse_invocation(source)?;
    Ok(expand(&invocation)?)
}

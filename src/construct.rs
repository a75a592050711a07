//! Top-level constructs and the expander that drives a whole invocation.
//!
//! Each construct is a small policy record: its engine operation, its default
//! processing mode and whether arguments may name output columns. Everything
//! else is shared.

use crate::config::RewriteConfig;
use crate::emit::{emit, EngineCall};
use crate::error::{ArgPos, RewriteResult};
use crate::expr::Expr;
use crate::flags::Mode;
use crate::parser::ParseError;
use crate::rewrite::rewrite_argument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// One of the top-level macros.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Construct {
    #[serde(rename = "transform")]
    Transform,
    #[serde(rename = "transform!")]
    TransformInPlace,
    #[serde(rename = "select")]
    Select,
    #[serde(rename = "select!")]
    SelectInPlace,
    #[serde(rename = "groupby")]
    GroupBy,
    #[serde(rename = "combine")]
    Combine,
    #[serde(rename = "subset")]
    Subset,
    #[serde(rename = "subset!")]
    SubsetInPlace,
    #[serde(rename = "sort")]
    Sort,
    #[serde(rename = "sort!")]
    SortInPlace,
    #[serde(rename = "unique")]
    Unique,
}

/// Whether arguments of a construct may carry `sink = value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkPolicy {
    /// Explicit sinks allowed; synthesized when absent.
    Optional,
    /// The construct consumes values directly.
    Forbidden,
}

/// Per-construct rewrite policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    pub default_mode: Mode,
    pub sinks: SinkPolicy,
}

impl Construct {
    pub const ALL: [Construct; 11] = [
        Construct::Transform,
        Construct::TransformInPlace,
        Construct::Select,
        Construct::SelectInPlace,
        Construct::GroupBy,
        Construct::Combine,
        Construct::Subset,
        Construct::SubsetInPlace,
        Construct::Sort,
        Construct::SortInPlace,
        Construct::Unique,
    ];

    /// Name of the engine operation this construct calls.
    pub fn operation(&self) -> &'static str {
        match self {
            Construct::Transform => "transform",
            Construct::TransformInPlace => "transform!",
            Construct::Select => "select",
            Construct::SelectInPlace => "select!",
            Construct::GroupBy => "groupby",
            Construct::Combine => "combine",
            Construct::Subset => "subset",
            Construct::SubsetInPlace => "subset!",
            Construct::Sort => "sort",
            Construct::SortInPlace => "sort!",
            Construct::Unique => "unique",
        }
    }

    /// Whether the engine operation mutates the table.
    pub fn is_in_place(&self) -> bool {
        self.operation().ends_with('!')
    }

    pub fn policy(&self) -> Policy {
        match self {
            Construct::Transform
            | Construct::TransformInPlace
            | Construct::Select
            | Construct::SelectInPlace => Policy {
                default_mode: Mode::RowWise,
                sinks: SinkPolicy::Optional,
            },
            Construct::Combine => Policy {
                default_mode: Mode::ColumnWise,
                sinks: SinkPolicy::Optional,
            },
            Construct::GroupBy
            | Construct::Subset
            | Construct::SubsetInPlace
            | Construct::Sort
            | Construct::SortInPlace
            | Construct::Unique => Policy {
                default_mode: Mode::RowWise,
                sinks: SinkPolicy::Forbidden,
            },
        }
    }
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation())
    }
}

impl FromStr for Construct {
    type Err = ParseError;

    /// Accepts the operation name with or without a leading `@`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix('@').unwrap_or(s);
        Construct::ALL
            .iter()
            .copied()
            .find(|c| c.operation() == name)
            .ok_or_else(|| ParseError::UnknownConstruct(s.to_string()))
    }
}

/// One macro call site as delivered by the host front end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub construct: Construct,
    pub table: Expr,
    /// Positional arguments in source order.
    pub args: Vec<Expr>,
    #[serde(default)]
    pub kwargs: Vec<(Rc<str>, Expr)>,
}

impl Invocation {
    pub fn new(construct: Construct, table: Expr, args: Vec<Expr>) -> Self {
        Invocation {
            construct,
            table,
            args,
            kwargs: Vec::new(),
        }
    }

    pub fn with_kwarg(mut self, name: impl Into<Rc<str>>, value: Expr) -> Self {
        self.kwargs.push((name.into(), value));
        self
    }
}

/// Expands invocations with a fixed configuration.
#[derive(Clone, Debug, Default)]
pub struct Expander {
    config: RewriteConfig,
}

impl Expander {
    pub fn new() -> Self {
        Expander::default()
    }

    pub fn with_config(config: RewriteConfig) -> Self {
        Expander { config }
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Rewrite every argument and assemble the engine call.
    ///
    /// The first error aborts the whole invocation.
    pub fn expand(&self, invocation: &Invocation) -> RewriteResult<EngineCall> {
        let construct = invocation.construct;
        let args = self.positional(invocation);
        tracing::debug!(
            construct = %construct,
            args = args.len(),
            kwargs = invocation.kwargs.len(),
            "expanding invocation"
        );

        let result = args
            .iter()
            .map(|(arg, expr)| rewrite_argument(expr, *arg, construct, &self.config))
            .collect::<RewriteResult<Vec<_>>>()
            .and_then(|rewritten| {
                emit(
                    construct,
                    invocation.table.clone(),
                    rewritten,
                    invocation.kwargs.clone(),
                    &self.config,
                )
            });
        if let Err(err) = &result {
            tracing::debug!(construct = %construct, error = %err, "rewrite aborted");
        }
        result
    }

    /// Positional arguments, with top-level blocks split into their lines.
    ///
    /// Lines of a block keep the position of the block itself.
    fn positional<'a>(&self, invocation: &'a Invocation) -> Vec<(ArgPos, &'a Expr)> {
        let mut out = Vec::with_capacity(invocation.args.len());
        for (i, expr) in invocation.args.iter().enumerate() {
            let arg = ArgPos(i + 1);
            match expr {
                Expr::Block(items) if self.config.flatten_blocks => {
                    out.extend(items.iter().map(|item| (arg, item)))
                }
                _ => out.push((arg, expr)),
            }
        }
        out
    }
}

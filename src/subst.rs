//! Column-to-parameter substitution.
//!
//! Turns a resolved value expression into a closure: every distinct column
//! reference becomes one parameter, in order of first occurrence, and every
//! occurrence is replaced by that parameter. Parameter names are derived from
//! the column names and never capture an identifier already used in the body.

use crate::expr::{ColumnRef, Expr};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::rc::Rc;

/// Words that cannot name a closure parameter or a local: reserved words and
/// the spellings of literal constants in emitted code.
pub const RESERVED_WORDS: [&str; 30] = [
    "begin", "end", "if", "elseif", "else", "for", "while", "do", "let", "local", "global",
    "function", "return", "break", "continue", "try", "catch", "finally", "struct", "module",
    "macro", "quote", "const", "using", "import", "export", "true", "false", "missing", "nothing",
];

/// Invocation-scoped generator of unique names.
///
/// The first request for `base` returns `base` itself, later ones `base_2`,
/// `base_3` and so on. No state is shared between generators.
#[derive(Clone, Debug, Default)]
pub struct NameGen {
    taken: FxHashSet<Rc<str>>,
}

impl NameGen {
    pub fn new() -> Self {
        NameGen::default()
    }

    /// Create a generator that never hands out any of `names`.
    pub fn with_reserved(names: impl IntoIterator<Item = Rc<str>>) -> Self {
        NameGen {
            taken: names.into_iter().collect(),
        }
    }

    /// A generator for identifiers in emitted code: never hands out
    /// [`RESERVED_WORDS`] nor any of `names`.
    pub fn for_identifiers(names: impl IntoIterator<Item = Rc<str>>) -> Self {
        NameGen::with_reserved(
            RESERVED_WORDS
                .iter()
                .map(|w| Rc::from(*w))
                .chain(names),
        )
    }

    pub fn reserve(&mut self, name: Rc<str>) {
        self.taken.insert(name);
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// A name derived from `base` that has not been handed out or reserved.
    pub fn fresh(&mut self, base: &str) -> Rc<str> {
        let mut candidate: Rc<str> = base.into();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}_{}", base, n).into();
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// A synthesized function: one parameter per distinct source column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Closure {
    pub params: Vec<Rc<str>>,
    pub body: Expr,
}

impl Closure {
    pub fn new(params: Vec<Rc<str>>, body: Expr) -> Self {
        Closure { params, body }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// The closure as a lambda expression.
    pub fn to_expr(&self) -> Expr {
        Expr::lambda(self.params.clone(), self.body.clone())
    }

    /// Plug `sources` back in for the parameters, giving a resolved value
    /// expression again.
    pub fn instantiate(&self, sources: &[ColumnRef]) -> Expr {
        let map: FxHashMap<&str, &ColumnRef> = self
            .params
            .iter()
            .map(|p| p.as_ref())
            .zip(sources.iter())
            .collect();
        instantiate_impl(&self.body, &map)
    }

    /// Whether the closure just returns its single argument.
    pub fn is_identity(&self) -> bool {
        match (&self.params[..], &self.body) {
            ([param], Expr::Ident(name)) => param == name,
            _ => false,
        }
    }
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

fn instantiate_impl(expr: &Expr, map: &FxHashMap<&str, &ColumnRef>) -> Expr {
    match expr {
        Expr::Ident(name) => match map.get(name.as_ref()) {
            Some(col) => Expr::Column((*col).clone()),
            None => expr.clone(),
        },
        Expr::Lambda { params, body } if params.iter().any(|p| map.contains_key(p.as_ref())) => {
            let mut inner = map.clone();
            for p in params {
                inner.remove(p.as_ref());
            }
            Expr::lambda(params.clone(), instantiate_impl(body, &inner))
        }
        _ => expr.map_children(|child| instantiate_impl(child, map)),
    }
}

/// Mapping from column references to closure parameters.
#[derive(Clone, Debug, Default)]
pub struct Subst {
    bindings: FxHashMap<ColumnRef, Rc<str>>,
    order: Vec<ColumnRef>,
    names: NameGen,
}

impl Subst {
    /// Create a substitution whose parameters avoid every name in `reserved`
    /// and every reserved word.
    pub fn new(reserved: impl IntoIterator<Item = Rc<str>>) -> Self {
        Subst {
            bindings: FxHashMap::default(),
            order: Vec::new(),
            names: NameGen::for_identifiers(reserved),
        }
    }

    /// The parameter bound to `col`, allocating one on first use.
    pub fn param_for(&mut self, col: &ColumnRef) -> Rc<str> {
        if let Some(name) = self.bindings.get(col) {
            return name.clone();
        }
        let name = self.names.fresh(&col.stem());
        self.bindings.insert(col.clone(), name.clone());
        self.order.push(col.clone());
        name
    }

    /// Replace every column reference in `expr` by its parameter.
    pub fn apply(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Column(col) => Expr::Ident(self.param_for(col)),
            _ => expr.map_children(|child| self.apply(child)),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sources in first-occurrence order with their parameters.
    pub fn into_parts(self) -> (Vec<ColumnRef>, Vec<Rc<str>>) {
        let mut bindings = self.bindings;
        let params = self
            .order
            .iter()
            .filter_map(|col| bindings.remove(col))
            .collect();
        (self.order, params)
    }
}

/// Abstract the column references out of a resolved expression.
pub fn canonicalize(body: &Expr) -> (Vec<ColumnRef>, Closure) {
    let mut subst = Subst::new(body.idents());
    let new_body = subst.apply(body);
    let (sources, params) = subst.into_parts();
    (sources, Closure::new(params, new_body))
}

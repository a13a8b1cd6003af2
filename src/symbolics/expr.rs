//! The differentiable expression tree.
//!
//! There is a single expression type. Every constructor below returns a
//! canonical node (flattened, numbers folded, like terms collected, operands
//! sorted) and every node carries [`Meta`] recomputed from its children, so
//! arithmetic never leaves the family and never loses discretization
//! metadata, whatever kind the simplification settles on.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{Dimension, Entity, Function, Grid, Meta, Order, Rational, Symbol};
use crate::error::{Error, Result};
use crate::finite_differences::Derivative;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl RelOp {
    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
        }
    }
}

/// Node kinds. Variant order is the canonical operand order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExprKind {
    Number(Rational),
    Symbol(Symbol),
    Dimension(Dimension),
    /// Symbolic application at physical positions: `u(t, x + h_x, y)`.
    Function {
        function: Function,
        indices: Vec<Expr>,
    },
    /// Array access at integer offsets: `u[t + 1, x - 1, y]`.
    Indexed {
        function: Function,
        indices: Vec<Expr>,
    },
    Pow(Expr, Expr),
    Mul(Vec<Expr>),
    Add(Vec<Expr>),
    Mod(Expr, Expr),
    Floor(Expr),
    Derivative(Arc<Derivative>),
    ListInitializer(Vec<Expr>),
    Relational(RelOp, Expr, Expr),
}

struct ExprNode {
    kind: ExprKind,
    meta: Meta,
}

#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

// ─── Identity ──────────────────────────────────────────────────────

impl PartialEq for Expr {
    /// Structure plus tracked discretization state.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.kind == other.0.kind && self.0.meta.state() == other.0.meta.state())
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.kind.hash(state);
    }
}

impl PartialOrd for Expr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expr {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ordering::Equal;
        }
        self.0.kind.cmp(&other.0.kind)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

// ─── Construction ──────────────────────────────────────────────────

impl Expr {
    /// Attach freshly propagated metadata to an already-simplified shape.
    pub(crate) fn reconcile(kind: ExprKind) -> Expr {
        let meta = Meta::of(&kind);
        Expr(Arc::new(ExprNode { kind, meta }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn meta(&self) -> &Meta {
        &self.0.meta
    }

    pub fn number(value: impl Into<Rational>) -> Expr {
        Expr::reconcile(ExprKind::Number(value.into()))
    }

    pub fn rational(num: i64, den: i64) -> Expr {
        Expr::number(Rational::new(num, den))
    }

    pub fn zero() -> Expr {
        Expr::number(Rational::ZERO)
    }

    pub fn one() -> Expr {
        Expr::number(Rational::ONE)
    }

    pub fn access(function: &Function, indices: Vec<Expr>) -> Expr {
        Expr::reconcile(ExprKind::Function {
            function: function.clone(),
            indices,
        })
    }

    pub fn indexed(function: &Function, indices: Vec<Expr>) -> Expr {
        Expr::reconcile(ExprKind::Indexed {
            function: function.clone(),
            indices,
        })
    }

    pub(crate) fn derivative(d: Derivative) -> Expr {
        Expr::reconcile(ExprKind::Derivative(Arc::new(d)))
    }

    pub fn list(items: Vec<Expr>) -> Expr {
        Expr::reconcile(ExprKind::ListInitializer(items))
    }

    pub fn relational(op: RelOp, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
        Expr::reconcile(ExprKind::Relational(op, lhs.into(), rhs.into()))
    }

    pub fn lt(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::relational(RelOp::Lt, self.clone(), rhs)
    }

    pub fn le(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::relational(RelOp::Le, self.clone(), rhs)
    }

    pub fn gt(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::relational(RelOp::Gt, self.clone(), rhs)
    }

    pub fn ge(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::relational(RelOp::Ge, self.clone(), rhs)
    }

    /// Canonical sum.
    pub fn add(terms: impl IntoIterator<Item = Expr>) -> Expr {
        let mut constant = Rational::ZERO;
        let mut collected: BTreeMap<Expr, Rational> = BTreeMap::new();
        let mut stack: Vec<Expr> = terms.into_iter().collect();
        stack.reverse();
        while let Some(term) = stack.pop() {
            match term.kind() {
                ExprKind::Number(r) => constant = constant + *r,
                ExprKind::Add(inner) => stack.extend(inner.iter().rev().cloned()),
                _ => {
                    let (coeff, rest) = term.as_coeff_mul();
                    let slot = collected.entry(rest).or_insert(Rational::ZERO);
                    *slot = *slot + coeff;
                }
            }
        }

        let mut args = Vec::with_capacity(collected.len() + 1);
        if !constant.is_zero() {
            args.push(Expr::number(constant));
        }
        for (rest, coeff) in collected {
            if !coeff.is_zero() {
                args.push(Expr::scaled(coeff, rest));
            }
        }
        match args.len() {
            0 => Expr::zero(),
            1 => args.remove(0),
            _ => Expr::reconcile(ExprKind::Add(args)),
        }
    }

    /// Canonical product.
    pub fn mul(factors: impl IntoIterator<Item = Expr>) -> Expr {
        let mut coeff = Rational::ONE;
        let mut powers: BTreeMap<Expr, Vec<Expr>> = BTreeMap::new();
        let mut stack: Vec<Expr> = factors.into_iter().collect();
        while let Some(factor) = stack.pop() {
            match factor.kind() {
                ExprKind::Number(r) => coeff = coeff * *r,
                ExprKind::Mul(inner) => stack.extend(inner.iter().cloned()),
                _ => {
                    let (base, exp) = factor.as_base_exp();
                    powers.entry(base).or_default().push(exp);
                }
            }
        }
        if coeff.is_zero() {
            return Expr::zero();
        }

        let mut args = Vec::with_capacity(powers.len());
        for (base, exps) in powers {
            let p = Expr::power(base, Expr::add(exps));
            match p.kind() {
                ExprKind::Number(r) => coeff = coeff * *r,
                ExprKind::Mul(inner) => {
                    for f in inner {
                        match f.kind() {
                            ExprKind::Number(r) => coeff = coeff * *r,
                            _ => args.push(f.clone()),
                        }
                    }
                }
                _ => args.push(p),
            }
        }
        if coeff.is_zero() {
            return Expr::zero();
        }
        args.sort();

        if args.is_empty() {
            return Expr::number(coeff);
        }
        if coeff.is_one() && args.len() == 1 {
            return args.remove(0);
        }
        if args.len() == 1 {
            if let ExprKind::Add(terms) = args[0].kind() {
                return Expr::add(terms.iter().map(|t| Expr::scaled(coeff, t.clone())));
            }
        }
        if !coeff.is_one() {
            args.insert(0, Expr::number(coeff));
        }
        Expr::reconcile(ExprKind::Mul(args))
    }

    /// `coeff * rest` for a `rest` that carries no numeric coefficient and
    /// is not a sum.
    fn scaled(coeff: Rational, rest: Expr) -> Expr {
        if coeff.is_one() {
            return rest;
        }
        match rest.kind() {
            ExprKind::Number(r) => Expr::number(coeff * *r),
            ExprKind::Add(_) => Expr::mul([Expr::number(coeff), rest]),
            ExprKind::Mul(inner) => {
                let mut args = Vec::with_capacity(inner.len() + 1);
                args.push(Expr::number(coeff));
                args.extend(inner.iter().cloned());
                Expr::reconcile(ExprKind::Mul(args))
            }
            _ => Expr::reconcile(ExprKind::Mul(vec![Expr::number(coeff), rest])),
        }
    }

    /// Canonical power.
    pub fn power(base: Expr, exp: Expr) -> Expr {
        let int_exp = exp.as_number().and_then(Rational::to_i64);
        if int_exp == Some(0) {
            return Expr::one();
        }
        if int_exp == Some(1) {
            return base;
        }
        if base.is_one() {
            return Expr::one();
        }
        if let Some(n) = int_exp {
            match base.kind() {
                ExprKind::Number(r) => {
                    if let Some(value) = r.powi(n) {
                        return Expr::number(value);
                    }
                }
                ExprKind::Pow(b, e) => {
                    return Expr::power(b.clone(), Expr::mul([e.clone(), exp]));
                }
                ExprKind::Mul(factors) => {
                    return Expr::mul(factors.iter().map(|f| Expr::power(f.clone(), exp.clone())));
                }
                _ => {}
            }
        }
        if base.is_zero() && exp.as_number().is_some_and(|r| r > Rational::ZERO) {
            return Expr::zero();
        }
        Expr::reconcile(ExprKind::Pow(base, exp))
    }

    pub fn pow(&self, exp: impl Into<Expr>) -> Expr {
        Expr::power(self.clone(), exp.into())
    }

    /// Remainder with the sign of the divisor.
    pub fn modulo(&self, rhs: impl Into<Expr>) -> Expr {
        let rhs = rhs.into();
        if let (Some(a), Some(b)) = (self.as_number(), rhs.as_number()) {
            if let Some(r) = a.modulo(b) {
                return Expr::number(r);
            }
        }
        if *self == rhs || rhs.is_one() && self.is_integer_valued() {
            return Expr::zero();
        }
        Expr::reconcile(ExprKind::Mod(self.clone(), rhs))
    }

    pub fn floor(&self) -> Expr {
        match self.kind() {
            ExprKind::Number(r) => Expr::number(r.floor()),
            ExprKind::Floor(_) => self.clone(),
            _ if self.is_integer_valued() => self.clone(),
            _ => Expr::reconcile(ExprKind::Floor(self.clone())),
        }
    }

    /// `floor(self / rhs)`.
    pub fn floordiv(&self, rhs: impl Into<Expr>) -> Expr {
        (self / rhs.into()).floor()
    }
}

// ─── Queries ───────────────────────────────────────────────────────

impl Expr {
    pub fn as_number(&self) -> Option<Rational> {
        match self.kind() {
            ExprKind::Number(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        self.as_number().is_some()
    }

    pub fn is_zero(&self) -> bool {
        self.as_number().is_some_and(Rational::is_zero)
    }

    pub fn is_one(&self) -> bool {
        self.as_number().is_some_and(Rational::is_one)
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self.kind() {
            ExprKind::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dimension(&self) -> Option<&Dimension> {
        match self.kind() {
            ExprKind::Dimension(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_derivative(&self) -> Option<&Derivative> {
        match self.kind() {
            ExprKind::Derivative(d) => Some(d),
            _ => None,
        }
    }

    /// The function and indices of a `Function` or `Indexed` access.
    pub fn as_access(&self) -> Option<(&Function, &[Expr])> {
        match self.kind() {
            ExprKind::Function { function, indices } | ExprKind::Indexed { function, indices } => {
                Some((function, indices))
            }
            _ => None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.kind(), ExprKind::Indexed { .. })
    }

    /// Integers, dimensions, integer symbols and index arithmetic over them.
    pub fn is_integer_valued(&self) -> bool {
        match self.kind() {
            ExprKind::Number(r) => r.is_integer(),
            ExprKind::Symbol(s) => s.dtype() == super::DataType::Int32,
            ExprKind::Dimension(_) | ExprKind::Floor(_) => true,
            ExprKind::Add(args) | ExprKind::Mul(args) => args.iter().all(Expr::is_integer_valued),
            ExprKind::Mod(a, b) => a.is_integer_valued() && b.is_integer_valued(),
            _ => false,
        }
    }

    /// Split off the numeric coefficient: `-2*h*u` is `(-2, h*u)`.
    pub fn as_coeff_mul(&self) -> (Rational, Expr) {
        match self.kind() {
            ExprKind::Number(r) => (*r, Expr::one()),
            ExprKind::Mul(args) => match args[0].as_number() {
                Some(c) if args.len() == 2 => (c, args[1].clone()),
                Some(c) => (c, Expr::reconcile(ExprKind::Mul(args[1..].to_vec()))),
                None => (Rational::ONE, self.clone()),
            },
            _ => (Rational::ONE, self.clone()),
        }
    }

    pub fn as_base_exp(&self) -> (Expr, Expr) {
        match self.kind() {
            ExprKind::Pow(b, e) => (b.clone(), e.clone()),
            _ => (self.clone(), Expr::one()),
        }
    }

    /// Direct operands.
    pub fn args(&self) -> Vec<&Expr> {
        match self.kind() {
            ExprKind::Number(_) | ExprKind::Symbol(_) | ExprKind::Dimension(_) => Vec::new(),
            ExprKind::Function { indices, .. } | ExprKind::Indexed { indices, .. } => {
                indices.iter().collect()
            }
            ExprKind::Pow(a, b) | ExprKind::Mod(a, b) | ExprKind::Relational(_, a, b) => {
                vec![a, b]
            }
            ExprKind::Floor(a) => vec![a],
            ExprKind::Add(args) | ExprKind::Mul(args) | ExprKind::ListInitializer(args) => {
                args.iter().collect()
            }
            ExprKind::Derivative(d) => vec![d.expr()],
        }
    }

    pub fn space_order(&self) -> Order {
        self.meta().space_order()
    }

    pub fn time_order(&self) -> Order {
        self.meta().time_order()
    }

    /// Grid-backed functions and arrays referenced, first-seen order.
    pub fn functions(&self) -> &[Function] {
        self.meta().functions()
    }

    pub fn indices(&self) -> Vec<Dimension> {
        self.meta().indices()
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        self.meta().dimensions()
    }

    /// The first grid found. See [`Expr::grid_conflict`] for the ambiguous case.
    pub fn grid(&self) -> Option<Grid> {
        let grids = self.meta().grids();
        if grids.len() > 1 {
            tracing::warn!(
                expr = %self,
                grids = grids.len(),
                "expression contains multiple grids, returning first found"
            );
        }
        grids.into_iter().next()
    }

    /// `Some` with every grid's name when more than one grid is referenced.
    pub fn grid_conflict(&self) -> Option<Error> {
        let grids = self.meta().grids();
        (grids.len() > 1).then(|| Error::MultipleGrids {
            grids: grids.iter().map(|g| g.name().to_string()).collect(),
        })
    }

    pub fn is_time_dependent(&self) -> bool {
        self.meta().is_time_dependent()
    }

    pub fn is_staggered(&self) -> bool {
        self.meta().is_staggered()
    }

    pub fn is_vector_valued(&self) -> bool {
        self.meta().is_vector_valued()
    }

    pub fn has_derivative(&self) -> bool {
        self.meta().has_derivative()
    }

    /// Concatenated names of the referenced functions.
    pub fn name(&self) -> String {
        self.functions()
            .iter()
            .map(Function::name)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Every symbol read: scalars, dimensions, and accessed functions.
    pub fn free_symbols(&self) -> BTreeSet<Entity> {
        let mut out = BTreeSet::new();
        self.collect_free_symbols(&mut out);
        out
    }

    fn collect_free_symbols(&self, out: &mut BTreeSet<Entity>) {
        match self.kind() {
            ExprKind::Number(_) => {}
            ExprKind::Symbol(s) => {
                out.insert(Entity::Symbol(s.clone()));
            }
            ExprKind::Dimension(d) => {
                out.insert(Entity::Dimension(d.clone()));
            }
            ExprKind::Function { function, .. } | ExprKind::Indexed { function, .. } => {
                out.insert(Entity::Function(function.clone()));
            }
            ExprKind::Derivative(d) => {
                out.extend(d.dims().iter().cloned().map(Entity::Dimension));
            }
            _ => {}
        }
        for arg in self.args() {
            arg.collect_free_symbols(out);
        }
    }
}

// ─── Traversal ─────────────────────────────────────────────────────

impl Expr {
    /// Rebuild from new operands through the canonical constructors.
    /// Returns `self` untouched when no operand changed.
    pub fn try_map_args<E>(&self, mut f: impl FnMut(&Expr) -> std::result::Result<Expr, E>) -> std::result::Result<Expr, E> {
        let mut changed = false;
        let mut map = |e: &Expr| -> std::result::Result<Expr, E> {
            let out = f(e)?;
            changed |= !Arc::ptr_eq(&out.0, &e.0);
            Ok(out)
        };
        let rebuilt = match self.kind() {
            ExprKind::Number(_) | ExprKind::Symbol(_) | ExprKind::Dimension(_) => {
                return Ok(self.clone())
            }
            ExprKind::Function { function, indices } => {
                let indices = indices.iter().map(&mut map).collect::<std::result::Result<_, E>>()?;
                Expr::access(function, indices)
            }
            ExprKind::Indexed { function, indices } => {
                let indices = indices.iter().map(&mut map).collect::<std::result::Result<_, E>>()?;
                Expr::indexed(function, indices)
            }
            ExprKind::Pow(b, e) => Expr::power(map(b)?, map(e)?),
            ExprKind::Mul(args) => Expr::mul(args.iter().map(&mut map).collect::<std::result::Result<Vec<_>, E>>()?),
            ExprKind::Add(args) => Expr::add(args.iter().map(&mut map).collect::<std::result::Result<Vec<_>, E>>()?),
            ExprKind::Mod(a, b) => map(a)?.modulo(map(b)?),
            ExprKind::Floor(a) => map(a)?.floor(),
            ExprKind::Derivative(d) => Expr::derivative(d.with_expr(map(d.expr())?)),
            ExprKind::ListInitializer(items) => {
                Expr::list(items.iter().map(&mut map).collect::<std::result::Result<_, E>>()?)
            }
            ExprKind::Relational(op, a, b) => Expr::relational(*op, map(a)?, map(b)?),
        };
        Ok(if changed { rebuilt } else { self.clone() })
    }

    pub fn map_args(&self, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
        match self.try_map_args::<Infallible>(|e| Ok(f(e))) {
            Ok(e) => e,
            Err(never) => match never {},
        }
    }

    /// Expand every derivative into its finite-difference stencil.
    pub fn evaluate(&self) -> Result<Expr> {
        if !self.has_derivative() {
            return Ok(self.clone());
        }
        match self.kind() {
            ExprKind::Derivative(d) => d.evaluate(),
            _ => self.try_map_args(Expr::evaluate),
        }
    }

    /// Move the evaluation point of every derivative to where `carrier`
    /// stores its values. No-op unless `carrier` is staggered.
    pub fn eval_at(&self, carrier: &Function) -> Expr {
        if !carrier.is_staggered() || !self.has_derivative() {
            return self.clone();
        }
        match self.kind() {
            ExprKind::Derivative(d) => Expr::derivative(d.eval_at(carrier)),
            _ => self.map_args(|e| e.eval_at(carrier)),
        }
    }

    /// Turn function applications into array accesses: spacing symbols in
    /// indices become unit offsets (`u(t + dt, x - h_x)` to `u[t + 1, x - 1]`).
    pub fn indexify(&self) -> Expr {
        match self.kind() {
            ExprKind::Function { function, indices } => {
                let unit = function
                    .dimensions()
                    .iter()
                    .map(|d| (Expr::from(d.spacing()), Expr::one()))
                    .collect();
                let indices = indices.iter().map(|i| i.indexify().xreplace(&unit)).collect();
                Expr::indexed(function, indices)
            }
            _ => self.map_args(Expr::indexify),
        }
    }

    /// Fully distribute products over sums. Two expressions that agree
    /// after expansion are algebraically equal.
    pub fn expand(&self) -> Expr {
        let expanded = self.map_args(Expr::expand);
        match expanded.kind() {
            ExprKind::Mul(factors) => distribute(factors),
            ExprKind::Pow(b, e) => match (b.kind(), e.as_number()) {
                (ExprKind::Add(_), Some(r)) if r.is_integer() && r.numer() > 1 => {
                    distribute(&vec![b.clone(); r.numer() as usize])
                }
                _ => expanded,
            },
            _ => expanded,
        }
    }
}

/// Multiply out `factors`, distributing over every sum among them.
fn distribute(factors: &[Expr]) -> Expr {
    let mut terms = vec![Expr::one()];
    for f in factors {
        let parts: Vec<Expr> = match f.kind() {
            ExprKind::Add(ts) => ts.clone(),
            _ => vec![f.clone()],
        };
        terms = terms
            .iter()
            .flat_map(|t| parts.iter().map(move |p| Expr::mul([t.clone(), p.clone()])))
            .collect();
    }
    Expr::add(terms)
}

// ─── Conversions ───────────────────────────────────────────────────

impl From<Rational> for Expr {
    fn from(r: Rational) -> Self {
        Expr::number(r)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::number(n)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::number(n)
    }
}

impl From<Symbol> for Expr {
    fn from(s: Symbol) -> Self {
        Expr::reconcile(ExprKind::Symbol(s))
    }
}

impl From<&Symbol> for Expr {
    fn from(s: &Symbol) -> Self {
        Expr::from(s.clone())
    }
}

impl From<Dimension> for Expr {
    fn from(d: Dimension) -> Self {
        Expr::reconcile(ExprKind::Dimension(d))
    }
}

impl From<&Dimension> for Expr {
    fn from(d: &Dimension) -> Self {
        Expr::from(d.clone())
    }
}

impl From<&Function> for Expr {
    fn from(f: &Function) -> Self {
        f.access()
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Self {
        e.clone()
    }
}

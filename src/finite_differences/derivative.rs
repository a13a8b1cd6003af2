//! The unevaluated derivative node.

use std::fmt;

use super::stencil::{cross_derivative, first_derivative, generic_derivative, Origin};
use super::{Side, Transpose};
use crate::error::{Error, Result};
use crate::symbolics::{Dimension, Expr, ExprKind, Function, Substitution};

/// A differentiation request on an expression, expanded into a stencil by
/// [`Derivative::evaluate`]. Every modifier returns a new node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Derivative {
    expr: Expr,
    dims: Vec<Dimension>,
    deriv_orders: Vec<u32>,
    fd_orders: Vec<u32>,
    side: Side,
    transpose: Transpose,
    subs: Vec<Substitution>,
    x0: Origin,
}

/// One dimension to differentiate against, optionally with its order.
#[derive(Clone, Debug)]
pub enum DimSpec {
    Dim(Dimension),
    WithOrder(Dimension, u32),
}

impl From<Dimension> for DimSpec {
    fn from(d: Dimension) -> Self {
        DimSpec::Dim(d)
    }
}

impl From<&Dimension> for DimSpec {
    fn from(d: &Dimension) -> Self {
        DimSpec::Dim(d.clone())
    }
}

impl From<(Dimension, u32)> for DimSpec {
    fn from((d, n): (Dimension, u32)) -> Self {
        DimSpec::WithOrder(d, n)
    }
}

impl From<(&Dimension, u32)> for DimSpec {
    fn from((d, n): (&Dimension, u32)) -> Self {
        DimSpec::WithOrder(d.clone(), n)
    }
}

/// An order given once for all dimensions, or once per dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderSpec {
    Scalar(u32),
    PerDim(Vec<u32>),
}

impl From<u32> for OrderSpec {
    fn from(n: u32) -> Self {
        OrderSpec::Scalar(n)
    }
}

impl From<Vec<u32>> for OrderSpec {
    fn from(v: Vec<u32>) -> Self {
        OrderSpec::PerDim(v)
    }
}

impl OrderSpec {
    fn at(&self, i: usize) -> Option<u32> {
        match self {
            OrderSpec::Scalar(n) => Some(*n),
            OrderSpec::PerDim(v) => v.get(i).copied(),
        }
    }

    fn check_arity(&self, what: &'static str, expected: usize) -> Result<()> {
        match self {
            OrderSpec::PerDim(v) if v.len() != expected => Err(Error::OrderArity {
                what,
                expected,
                got: v.len(),
            }),
            _ => Ok(()),
        }
    }
}

pub struct DerivativeBuilder {
    expr: Expr,
    dims: Vec<DimSpec>,
    deriv_order: Option<OrderSpec>,
    fd_order: Option<OrderSpec>,
    side: Side,
    transpose: Transpose,
    x0: Origin,
}

impl DerivativeBuilder {
    pub fn dim(mut self, spec: impl Into<DimSpec>) -> Self {
        self.dims.push(spec.into());
        self
    }

    pub fn dims<S: Into<DimSpec>>(mut self, specs: impl IntoIterator<Item = S>) -> Self {
        self.dims.extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn deriv_order(mut self, order: impl Into<OrderSpec>) -> Self {
        self.deriv_order = Some(order.into());
        self
    }

    pub fn fd_order(mut self, order: impl Into<OrderSpec>) -> Self {
        self.fd_order = Some(order.into());
        self
    }

    pub fn side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn transpose(mut self, transpose: Transpose) -> Self {
        self.transpose = transpose;
        self
    }

    pub fn x0(mut self, dim: &Dimension, at: impl Into<Expr>) -> Self {
        self.x0.insert(dim.clone(), at.into());
        self
    }

    /// Validate the request and resolve every default.
    pub fn finish(self) -> Result<Derivative> {
        if self.dims.is_empty() {
            return Err(Error::NoDimensions);
        }
        if !self.expr.meta().is_differentiable() {
            return Err(Error::NotDifferentiable {
                expr: self.expr.to_string(),
            });
        }

        // Per-spec orders, before merging repeated dimensions.
        let mut requested: Vec<(Dimension, u32)> = Vec::with_capacity(self.dims.len());
        if let Some(k) = &self.deriv_order {
            k.check_arity("deriv_order", self.dims.len())?;
        }
        for (i, spec) in self.dims.into_iter().enumerate() {
            let keyword = self.deriv_order.as_ref().and_then(|k| k.at(i));
            let entry = match spec {
                DimSpec::WithOrder(d, given) => match keyword {
                    Some(k) if k != given => {
                        return Err(Error::ConflictingDerivOrder { given, keyword: k })
                    }
                    _ => (d, given),
                },
                DimSpec::Dim(d) => (d, keyword.unwrap_or(1)),
            };
            if entry.1 == 0 {
                return Err(Error::ZeroDerivOrder {
                    dim: entry.0.name().to_string(),
                });
            }
            requested.push(entry);
        }

        let mut dims: Vec<Dimension> = Vec::new();
        let mut deriv_orders: Vec<u32> = Vec::new();
        for (d, n) in requested {
            match dims.iter().position(|x| *x == d) {
                Some(i) => deriv_orders[i] += n,
                None => {
                    dims.push(d);
                    deriv_orders.push(n);
                }
            }
        }

        let fd_orders = match &self.fd_order {
            Some(spec) => {
                spec.check_arity("fd_order", dims.len())?;
                (0..dims.len()).filter_map(|i| spec.at(i)).collect()
            }
            None => dims
                .iter()
                .map(|d| {
                    let order = if d.is_time() {
                        self.expr.time_order()
                    } else {
                        self.expr.space_order()
                    };
                    // Nothing restricts the order: take the narrowest centered stencil.
                    order.finite().unwrap_or(2)
                })
                .collect(),
        };

        let mut x0 = self.x0;
        for d in &dims {
            x0.entry(d.clone()).or_insert_with(|| Expr::from(d));
        }

        Ok(Derivative {
            expr: self.expr,
            dims,
            deriv_orders,
            fd_orders,
            side: self.side,
            transpose: self.transpose,
            subs: Vec::new(),
            x0,
        })
    }

    /// [`finish`](Self::finish), wrapped as an expression.
    pub fn build(self) -> Result<Expr> {
        self.finish().map(Expr::derivative)
    }
}

impl Derivative {
    pub fn builder(expr: &Expr) -> DerivativeBuilder {
        DerivativeBuilder {
            expr: expr.clone(),
            dims: Vec::new(),
            deriv_order: None,
            fd_order: None,
            side: Side::Centered,
            transpose: Transpose::Direct,
            x0: Origin::new(),
        }
    }

    /// `Derivative(expr, dims...)` with every other parameter defaulted.
    pub fn new<S: Into<DimSpec>>(expr: &Expr, dims: impl IntoIterator<Item = S>) -> Result<Expr> {
        Derivative::builder(expr).dims(dims).build()
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn deriv_orders(&self) -> &[u32] {
        &self.deriv_orders
    }

    pub fn fd_orders(&self) -> &[u32] {
        &self.fd_orders
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn transpose(&self) -> Transpose {
        self.transpose
    }

    pub fn subs(&self) -> &[Substitution] {
        &self.subs
    }

    pub fn x0(&self) -> &Origin {
        &self.x0
    }

    /// The same request with direct and adjoint swapped.
    pub fn transposed(&self) -> Derivative {
        Derivative {
            transpose: self.transpose.flipped(),
            ..self.clone()
        }
    }

    /// Queue `rule` for application to the expanded stencil.
    pub fn with_subs(&self, rule: Substitution) -> Derivative {
        let mut subs = self.subs.clone();
        subs.push(rule);
        Derivative {
            subs,
            ..self.clone()
        }
    }

    pub(crate) fn with_expr(&self, expr: Expr) -> Derivative {
        Derivative {
            expr,
            ..self.clone()
        }
    }

    /// Evaluate where `carrier` stores its values.
    pub fn eval_at(&self, carrier: &Function) -> Derivative {
        let mut x0 = self.x0.clone();
        for (d, at) in carrier.index_ref() {
            if self.dims.contains(&d) {
                x0.insert(d, at);
            }
        }
        Derivative { x0, ..self.clone() }
    }

    /// Expand into an explicit stencil.
    pub fn evaluate(&self) -> Result<Expr> {
        let expr = self.expr.evaluate()?;
        let expanded = match expr.kind() {
            ExprKind::Add(terms) => Expr::add(
                terms
                    .iter()
                    .map(|t| self.expand(t))
                    .collect::<Result<Vec<_>>>()?,
            ),
            _ => self.expand(&expr)?,
        };
        Ok(self.subs.iter().fold(expanded, |acc, rule| acc.xreplace(rule)))
    }

    fn expand(&self, expr: &Expr) -> Result<Expr> {
        match (self.side, self.dims.as_slice()) {
            (Side::Left | Side::Right, [dim]) if self.deriv_orders[0] == 1 => first_derivative(
                expr,
                dim,
                self.fd_orders[0],
                self.side,
                self.transpose,
                &self.x0,
            ),
            (_, [dim]) => generic_derivative(
                expr,
                dim,
                self.fd_orders[0],
                self.deriv_orders[0],
                self.transpose,
                &self.x0,
            ),
            _ => cross_derivative(
                expr,
                &self.dims,
                &self.fd_orders,
                &self.deriv_orders,
                self.transpose,
                &self.x0,
            ),
        }
    }
}

impl fmt::Display for Derivative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Derivative({}", self.expr)?;
        for (d, n) in self.dims.iter().zip(&self.deriv_orders) {
            if *n == 1 {
                write!(f, ", {}", d)?;
            } else {
                write!(f, ", ({}, {})", d, n)?;
            }
        }
        f.write_str(")")
    }
}

impl Expr {
    /// `Derivative(self, dims...)`.
    pub fn diff<S: Into<DimSpec>>(&self, dims: impl IntoIterator<Item = S>) -> Result<Expr> {
        Derivative::new(self, dims)
    }

    /// Flip an unevaluated derivative between direct and adjoint.
    pub fn transposed(&self) -> Result<Expr> {
        self.as_derivative()
            .map(|d| Expr::derivative(d.transposed()))
            .ok_or_else(|| Error::missing(self, "T"))
    }
}

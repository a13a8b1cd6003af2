//! Discretization metadata carried by every expression node.
//!
//! Metadata is a pure function of the node's kind: it is recomputed by
//! [`Meta::of`] whenever a node is built, so a simplification that changes
//! the operator kind never leaves stale metadata behind.

use std::fmt;

use super::{Dimension, ExprKind, Function, Grid};

/// Discretization order. Nodes without differentiable children impose no
/// restriction and report [`Order::Infinite`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Order {
    Finite(u32),
    Infinite,
}

impl Order {
    pub fn finite(self) -> Option<u32> {
        match self {
            Order::Finite(n) => Some(n),
            Order::Infinite => None,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Finite(n) => write!(f, "{}", n),
            Order::Infinite => f.write_str("inf"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Meta {
    space_order: Order,
    time_order: Order,
    functions: Vec<Function>,
    has_derivative: bool,
}

impl Meta {
    fn leaf() -> Self {
        Meta {
            space_order: Order::Infinite,
            time_order: Order::Infinite,
            functions: Vec::new(),
            has_derivative: false,
        }
    }

    /// An order of 0, or a time order on a function without a time
    /// dimension, imposes no restriction on the composite.
    fn function(f: &Function) -> Self {
        let restrict = |order: u32| match order {
            0 => Order::Infinite,
            n => Order::Finite(n),
        };
        let (space_order, time_order) = if f.is_differentiable() {
            let time_order = match f.time_dim() {
                Some(_) => restrict(f.time_order()),
                None => Order::Infinite,
            };
            (restrict(f.space_order()), time_order)
        } else {
            (Order::Infinite, Order::Infinite)
        };
        Meta {
            space_order,
            time_order,
            functions: vec![f.clone()],
            has_derivative: false,
        }
    }

    fn merge<'a>(mut self, others: impl IntoIterator<Item = &'a Meta>) -> Self {
        for other in others {
            self.space_order = self.space_order.min(other.space_order);
            self.time_order = self.time_order.min(other.time_order);
            self.has_derivative |= other.has_derivative;
            for f in &other.functions {
                if !self.functions.contains(f) {
                    self.functions.push(f.clone());
                }
            }
        }
        self
    }

    /// Propagate metadata from the children of `kind`.
    pub(crate) fn of(kind: &ExprKind) -> Self {
        match kind {
            ExprKind::Number(_)
            | ExprKind::Symbol(_)
            | ExprKind::Dimension(_) => Meta::leaf(),
            ExprKind::Function { function, indices } | ExprKind::Indexed { function, indices } => {
                Meta::function(function).merge(indices.iter().map(|i| i.meta()))
            }
            ExprKind::Derivative(d) => {
                let mut meta = d.expr().meta().clone();
                meta.has_derivative = true;
                meta
            }
            ExprKind::Pow(a, b) | ExprKind::Mod(a, b) | ExprKind::Relational(_, a, b) => {
                Meta::leaf().merge([a.meta(), b.meta()])
            }
            ExprKind::Floor(a) => a.meta().clone(),
            ExprKind::Add(args) | ExprKind::Mul(args) | ExprKind::ListInitializer(args) => {
                Meta::leaf().merge(args.iter().map(|a| a.meta()))
            }
        }
    }

    pub fn space_order(&self) -> Order {
        self.space_order
    }

    pub fn time_order(&self) -> Order {
        self.time_order
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn has_derivative(&self) -> bool {
        self.has_derivative
    }

    pub fn is_differentiable(&self) -> bool {
        self.functions.iter().any(Function::is_differentiable)
    }

    /// Distinct grids in first-seen order.
    pub fn grids(&self) -> Vec<Grid> {
        let mut grids: Vec<Grid> = Vec::new();
        for g in self.functions.iter().filter_map(Function::grid) {
            if !grids.contains(g) {
                grids.push(g.clone());
            }
        }
        grids
    }

    pub fn indices(&self) -> Vec<Dimension> {
        let mut dims: Vec<Dimension> = Vec::new();
        for f in self.functions.iter().filter(|f| f.is_differentiable()) {
            for d in f.dimensions() {
                if !dims.contains(d) {
                    dims.push(d.clone());
                }
            }
        }
        dims
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        let mut dims: Vec<Dimension> = Vec::new();
        for d in self.indices() {
            let root = d.root().clone();
            if !dims.contains(&root) {
                dims.push(root);
            }
        }
        dims
    }

    pub fn staggered(&self) -> Vec<Dimension> {
        let mut dims: Vec<Dimension> = Vec::new();
        for d in self.functions.iter().flat_map(|f| f.staggered()) {
            if !dims.contains(d) {
                dims.push(d.clone());
            }
        }
        dims
    }

    pub fn is_time_dependent(&self) -> bool {
        self.functions.iter().any(Function::is_time_dependent)
    }

    pub fn is_staggered(&self) -> bool {
        self.functions.iter().any(Function::is_staggered)
    }

    pub fn is_vector_valued(&self) -> bool {
        self.functions.iter().any(Function::is_vector_component)
    }

    /// The state that takes part in expression equality besides structure.
    pub(crate) fn state(&self) -> (Order, Order, Vec<Dimension>) {
        (self.space_order, self.time_order, self.indices())
    }
}

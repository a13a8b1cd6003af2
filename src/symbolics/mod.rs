//! Symbolic layer: numbers, dimensions, grid-backed functions and the
//! differentiable expression tree built over them.

pub mod dimension;
pub mod display;
pub mod equation;
pub mod expr;
pub mod function;
pub mod meta;
pub mod ops;
pub mod rational;
pub mod registry;
pub mod subs;
pub mod symbol;

use std::fmt;

pub use dimension::{Dimension, DimensionKind};
pub use equation::Equation;
pub use expr::{Expr, ExprKind, RelOp};
pub use function::{Function, FunctionKind, FunctionSpec, Grid};
pub use meta::{Meta, Order};
pub use rational::Rational;
pub use registry::SymbolRegistry;
pub use subs::Substitution;
pub use symbol::{DataType, Symbol};

/// Anything a node or expression can read or define.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    Symbol(Symbol),
    Dimension(Dimension),
    Function(Function),
}

impl Entity {
    pub fn name(&self) -> &str {
        match self {
            Entity::Symbol(s) => s.name(),
            Entity::Dimension(d) => d.name(),
            Entity::Function(f) => f.name(),
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Entity::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_dimension(&self) -> Option<&Dimension> {
        match self {
            Entity::Dimension(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Symbol> for Entity {
    fn from(s: Symbol) -> Self {
        Entity::Symbol(s)
    }
}

impl From<Dimension> for Entity {
    fn from(d: Dimension) -> Self {
        Entity::Dimension(d)
    }
}

impl From<Function> for Entity {
    fn from(f: Function) -> Self {
        Entity::Function(f)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests;

use std::fmt;

use super::Expr;
use crate::error::Result;

/// A user-level update `lhs = rhs`, or `lhs += rhs` for increments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Equation {
    lhs: Expr,
    rhs: Expr,
    increment: bool,
}

impl Equation {
    pub fn new(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Equation {
            lhs: lhs.into(),
            rhs: rhs.into(),
            increment: false,
        }
    }

    pub fn increment(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Equation {
            increment: true,
            ..Equation::new(lhs, rhs)
        }
    }

    pub fn lhs(&self) -> &Expr {
        &self.lhs
    }

    pub fn rhs(&self) -> &Expr {
        &self.rhs
    }

    pub fn is_increment(&self) -> bool {
        self.increment
    }

    /// Expand the derivatives of both sides. Derivatives on the right are
    /// first moved to where the left-hand side stores its values.
    pub fn evaluate(&self) -> Result<Equation> {
        let rhs = match self.lhs.as_access() {
            Some((carrier, _)) => self.rhs.eval_at(carrier),
            None => self.rhs.clone(),
        };
        Ok(Equation {
            lhs: self.lhs.evaluate()?,
            rhs: rhs.evaluate()?,
            increment: self.increment,
        })
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.increment { "Inc" } else { "Eq" };
        write!(f, "{}({}, {})", name, self.lhs, self.rhs)
    }
}

//! Lowered equations: what an `Expression` node wraps.
//!
//! A lowered equation has no derivative left, and every function
//! application has been turned into an array access.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::symbolics::{DataType, Dimension, Entity, Equation, Expr, ExprKind, Function};

/// Operator of an augmented assignment (`+=`, `-=`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AugOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl AugOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AugOp::Add => "+",
            AugOp::Sub => "-",
            AugOp::Mul => "*",
            AugOp::Div => "/",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoweredEq {
    lhs: Expr,
    rhs: Expr,
    op: Option<AugOp>,
    write: Entity,
}

impl LoweredEq {
    /// `lhs = rhs`. The target must be a scalar symbol or an array access,
    /// and neither side may hold an unevaluated derivative.
    pub fn new(lhs: Expr, rhs: Expr) -> Result<Self> {
        Self::build(lhs, rhs, None)
    }

    /// `lhs op= rhs`.
    pub fn augmented(lhs: Expr, rhs: Expr, op: AugOp) -> Result<Self> {
        Self::build(lhs, rhs, Some(op))
    }

    fn build(lhs: Expr, rhs: Expr, op: Option<AugOp>) -> Result<Self> {
        for side in [&lhs, &rhs] {
            if side.has_derivative() {
                return Err(Error::UnexpandedDerivative {
                    expr: side.to_string(),
                });
            }
        }
        let write = match lhs.kind() {
            ExprKind::Symbol(s) => Entity::Symbol(s.clone()),
            ExprKind::Indexed { function, .. } => Entity::Function(function.clone()),
            _ => {
                return Err(Error::InvalidTarget {
                    target: lhs.to_string(),
                })
            }
        };
        Ok(LoweredEq { lhs, rhs, op, write })
    }

    /// Expand the derivatives of `eq` and turn both sides into array
    /// accesses.
    pub fn lower(eq: &Equation) -> Result<Self> {
        let evaluated = eq.evaluate()?;
        let lhs = evaluated.lhs().indexify();
        let rhs = evaluated.rhs().indexify();
        let op = eq.is_increment().then_some(AugOp::Add);
        Self::build(lhs, rhs, op)
    }

    pub fn lhs(&self) -> &Expr {
        &self.lhs
    }

    pub fn rhs(&self) -> &Expr {
        &self.rhs
    }

    pub fn op(&self) -> Option<AugOp> {
        self.op
    }

    pub fn is_increment(&self) -> bool {
        self.op.is_some()
    }

    pub fn is_scalar(&self) -> bool {
        self.lhs.as_symbol().is_some()
    }

    pub fn is_tensor(&self) -> bool {
        !self.is_scalar()
    }

    /// The symbol or function written.
    pub fn write(&self) -> &Entity {
        &self.write
    }

    /// Functions read, first-seen order. The indices of the target count
    /// as reads; an increment also reads its target.
    pub fn reads(&self) -> Vec<Function> {
        self.accesses()
            .into_iter()
            .filter(|a| a.mode != AccessMode::Write)
            .fold(Vec::new(), |mut acc, a| {
                if !acc.contains(&a.function) {
                    acc.push(a.function);
                }
                acc
            })
    }

    pub fn free_symbols(&self) -> BTreeSet<Entity> {
        let mut out = self.lhs.free_symbols();
        out.extend(self.rhs.free_symbols());
        out
    }

    pub fn dtype(&self) -> DataType {
        match self.lhs.kind() {
            ExprKind::Symbol(s) => s.dtype(),
            _ => self
                .lhs
                .as_access()
                .map_or(DataType::Float32, |(f, _)| f.dtype()),
        }
    }

    /// Every array access, target first.
    pub fn accesses(&self) -> Vec<Access> {
        let mut out = Vec::new();
        if let Some((f, indices)) = self.lhs.as_access() {
            let mode = if self.is_increment() {
                AccessMode::Increment
            } else {
                AccessMode::Write
            };
            out.push(Access {
                function: f.clone(),
                indices: indices.to_vec(),
                mode,
            });
            for i in indices {
                collect_reads(i, &mut out);
            }
        }
        collect_reads(&self.rhs, &mut out);
        out
    }

    /// Rewrite both sides with `f`, keeping the operator.
    pub fn map(&self, mut f: impl FnMut(&Expr) -> Expr) -> Result<Self> {
        Self::build(f(&self.lhs), f(&self.rhs), self.op)
    }
}

fn collect_reads(expr: &Expr, out: &mut Vec<Access>) {
    if let ExprKind::Indexed { function, indices } = expr.kind() {
        out.push(Access {
            function: function.clone(),
            indices: indices.clone(),
            mode: AccessMode::Read,
        });
    }
    for arg in expr.args() {
        collect_reads(arg, out);
    }
}

impl fmt::Display for LoweredEq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Some(op) => write!(f, "{} {}= {}", self.lhs, op.symbol(), self.rhs),
            None => write!(f, "{} = {}", self.lhs, self.rhs),
        }
    }
}

// ─── Accesses ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    /// Read-modify-write of an augmented assignment.
    Increment,
}

impl AccessMode {
    pub fn is_write(self) -> bool {
        self != AccessMode::Read
    }
}

/// Position of an access along one dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offset {
    /// No index of the access varies with the dimension.
    Absent,
    /// `d + k` for a constant `k`.
    Affine(i64),
    /// Anything else (`x*y`, `u[x%2]`, ...).
    Irregular,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Access {
    pub function: Function,
    pub indices: Vec<Expr>,
    pub mode: AccessMode,
}

impl Access {
    /// Where this access sits along `dim`, relative to `dim` itself.
    pub fn offset(&self, dim: &Dimension) -> Offset {
        let root = dim.root();
        let mut found = Offset::Absent;
        for index in &self.indices {
            let depends = index
                .free_symbols()
                .iter()
                .filter_map(Entity::as_dimension)
                .any(|d| d.root() == root);
            if !depends {
                continue;
            }
            let here = match (index - Expr::from(dim)).as_number() {
                Some(r) => r.to_i64().map_or(Offset::Irregular, Offset::Affine),
                _ => Offset::Irregular,
            };
            found = match found {
                Offset::Absent => here,
                _ => Offset::Irregular,
            };
        }
        found
    }
}

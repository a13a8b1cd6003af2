//! Loop/array dimensions.
//!
//! A dimension is the index variable of a grid axis, of the time axis, or
//! of a loop derived from one of those (blocked loops, modulo buffers).
//! Derived dimensions keep a link to their parent; [`Dimension::defines`]
//! exposes the whole chain.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{Expr, Symbol};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DimensionKind {
    Space,
    Time,
    /// Blocked loop stepping by a runtime block size.
    Incr { step: Symbol },
    /// Buffer index `(parent + offset) % modulus`.
    Modulo { offset: i64, modulus: u32 },
    /// Any other dimension iterating a subset of its parent.
    Derived,
}

#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct DimensionData {
    name: String,
    kind: DimensionKind,
    parent: Option<Dimension>,
}

#[derive(Clone)]
pub struct Dimension(Arc<DimensionData>);

impl Dimension {
    fn make(name: impl Into<String>, kind: DimensionKind, parent: Option<Dimension>) -> Self {
        Dimension(Arc::new(DimensionData {
            name: name.into(),
            kind,
            parent,
        }))
    }

    pub fn space(name: impl Into<String>) -> Self {
        Self::make(name, DimensionKind::Space, None)
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::make(name, DimensionKind::Time, None)
    }

    pub fn incr(name: impl Into<String>, parent: &Dimension, step: Symbol) -> Self {
        Self::make(name, DimensionKind::Incr { step }, Some(parent.clone()))
    }

    pub fn modulo(name: impl Into<String>, parent: &Dimension, offset: i64, modulus: u32) -> Self {
        Self::make(
            name,
            DimensionKind::Modulo { offset, modulus },
            Some(parent.clone()),
        )
    }

    pub fn derived(name: impl Into<String>, parent: &Dimension) -> Self {
        Self::make(name, DimensionKind::Derived, Some(parent.clone()))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &DimensionKind {
        &self.0.kind
    }

    pub fn parent(&self) -> Option<&Dimension> {
        self.0.parent.as_ref()
    }

    /// The grid or time dimension this one ultimately iterates.
    pub fn root(&self) -> &Dimension {
        let mut dim = self;
        while let Some(parent) = dim.parent() {
            dim = parent;
        }
        dim
    }

    pub fn is_time(&self) -> bool {
        matches!(self.root().kind(), DimensionKind::Time)
    }

    pub fn is_space(&self) -> bool {
        matches!(self.root().kind(), DimensionKind::Space)
    }

    pub fn is_incr(&self) -> bool {
        matches!(self.kind(), DimensionKind::Incr { .. })
    }

    pub fn is_modulo(&self) -> bool {
        matches!(self.kind(), DimensionKind::Modulo { .. })
    }

    /// Grid spacing along the root dimension (`h_x`, `dt`).
    pub fn spacing(&self) -> Symbol {
        let root = self.root();
        match root.kind() {
            DimensionKind::Time => Symbol::float(format!("d{}", root.name())),
            _ => Symbol::float(format!("h_{}", root.name())),
        }
    }

    pub fn symbolic_min(&self) -> Expr {
        match self.kind() {
            DimensionKind::Modulo { offset, modulus } => self.modulo_index(*offset, *modulus),
            _ => Expr::from(Symbol::int(format!("{}_m", self.name()))),
        }
    }

    pub fn symbolic_max(&self) -> Expr {
        Expr::from(Symbol::int(format!("{}_M", self.name())))
    }

    /// Value a modulo index takes after each iteration of its parent.
    pub fn symbolic_incr(&self) -> Expr {
        match self.kind() {
            DimensionKind::Modulo { offset, modulus } => self.modulo_index(*offset, *modulus),
            _ => self.step(),
        }
    }

    pub fn symbolic_size(&self) -> Expr {
        self.symbolic_max() - self.symbolic_min() + 1
    }

    pub fn step(&self) -> Expr {
        match self.kind() {
            DimensionKind::Incr { step } => Expr::from(step.clone()),
            _ => Expr::one(),
        }
    }

    /// `(parent + offset) % modulus` with the offset brought into
    /// `[0, modulus)`, so the generated index is never negative.
    fn modulo_index(&self, offset: i64, modulus: u32) -> Expr {
        let parent = self.parent().map_or_else(|| Expr::from(self), Expr::from);
        let modulus = i64::from(modulus.max(1));
        (parent + offset.rem_euclid(modulus)).modulo(modulus)
    }

    /// This dimension followed by its ancestors.
    pub fn defines(&self) -> Vec<Dimension> {
        let mut chain = vec![self.clone()];
        let mut dim = self;
        while let Some(parent) = dim.parent() {
            chain.push(parent.clone());
            dim = parent;
        }
        chain
    }
}

impl PartialEq for Dimension {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Dimension {}

impl Hash for Dimension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Dimension {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dimension {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ordering::Equal;
        }
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dimension({})", self.name())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

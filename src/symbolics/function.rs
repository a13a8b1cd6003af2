//! Grids and grid-backed functions.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use super::{DataType, Dimension, Expr, Rational, Symbol};
use crate::error::{Error, Result};

// ─── Grid ──────────────────────────────────────────────────────────

static NEXT_GRID: AtomicU64 = AtomicU64::new(0);

struct GridData {
    /// Creation order, unique per process.
    serial: u64,
    name: String,
    shape: Vec<usize>,
    dimensions: Vec<Dimension>,
    time_dim: Dimension,
    dtype: DataType,
}

/// A structured grid. Two grids are the same grid only if they are the
/// same object.
#[derive(Clone)]
pub struct Grid(Arc<GridData>);

impl Grid {
    /// A grid over `shape`, with space dimensions `x, y, z` (or `x0, x1, ..`
    /// past three axes) and time dimension `t`.
    pub fn new(name: impl Into<String>, shape: &[usize]) -> Self {
        let dimensions = match shape.len() {
            0..=3 => ["x", "y", "z"][..shape.len()]
                .iter()
                .map(|n| Dimension::space(*n))
                .collect(),
            n => (0..n).map(|i| Dimension::space(format!("x{}", i))).collect(),
        };
        Grid(Arc::new(GridData {
            serial: NEXT_GRID.fetch_add(1, AtomicOrdering::Relaxed),
            name: name.into(),
            shape: shape.to_vec(),
            dimensions,
            time_dim: Dimension::time("t"),
            dtype: DataType::Float32,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.0.dimensions
    }

    pub fn time_dim(&self) -> &Dimension {
        &self.0.time_dim
    }

    pub fn ndim(&self) -> usize {
        self.0.dimensions.len()
    }

    pub fn dtype(&self) -> DataType {
        self.0.dtype
    }

    pub fn spacing_symbols(&self) -> Vec<Symbol> {
        self.dimensions().iter().map(Dimension::spacing).collect()
    }

    pub fn ptr_eq(&self, other: &Grid) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Grid {}

impl Hash for Grid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
        self.0.shape.hash(state);
    }
}

impl PartialOrd for Grid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// By name, then shape, then creation order, so equal-looking grids
/// still sort the same way on every run.
impl Ord for Grid {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.name(), self.shape(), self.0.serial).cmp(&(other.name(), other.shape(), other.0.serial))
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid({}, {:?})", self.name(), self.shape())
    }
}

// ─── Functions ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionKind {
    /// Field defined on the grid's space dimensions.
    Function,
    /// Field with a leading, buffered time dimension.
    TimeFunction,
    /// Local scratch buffer; not differentiable.
    Array,
}

/// Every parameter that defines a function. Two specs that compare equal
/// resolve to the same [`Function`] in a [`SymbolRegistry`](super::SymbolRegistry).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionSpec {
    pub name: String,
    pub kind: FunctionKind,
    pub grid: Option<Grid>,
    pub dimensions: Vec<Dimension>,
    pub shape: Vec<Expr>,
    pub space_order: u32,
    pub time_order: u32,
    pub staggered: Vec<Dimension>,
    pub dtype: DataType,
    pub component_of: Option<String>,
}

impl FunctionSpec {
    pub fn function(name: impl Into<String>, grid: &Grid) -> Self {
        FunctionSpec {
            name: name.into(),
            kind: FunctionKind::Function,
            grid: Some(grid.clone()),
            dimensions: grid.dimensions().to_vec(),
            shape: grid.shape().iter().map(|&n| Expr::from(n as i64)).collect(),
            space_order: 1,
            time_order: 0,
            staggered: Vec::new(),
            dtype: grid.dtype(),
            component_of: None,
        }
    }

    pub fn time_function(name: impl Into<String>, grid: &Grid) -> Self {
        let mut spec = Self::function(name, grid);
        spec.kind = FunctionKind::TimeFunction;
        spec.dimensions.insert(0, grid.time_dim().clone());
        spec.time_order = 1;
        spec.shape.insert(0, Expr::from(2i64));
        spec
    }

    pub fn array(name: impl Into<String>, dimensions: &[Dimension], shape: Vec<Expr>) -> Self {
        FunctionSpec {
            name: name.into(),
            kind: FunctionKind::Array,
            grid: None,
            dimensions: dimensions.to_vec(),
            shape,
            space_order: 0,
            time_order: 0,
            staggered: Vec::new(),
            dtype: DataType::Float32,
            component_of: None,
        }
    }

    pub fn space_order(mut self, order: u32) -> Self {
        self.space_order = order;
        self
    }

    /// Also resizes the time buffer to `order + 1` slots.
    pub fn time_order(mut self, order: u32) -> Self {
        self.time_order = order;
        if self.kind == FunctionKind::TimeFunction {
            self.shape[0] = Expr::from(i64::from(order) + 1);
        }
        self
    }

    pub fn staggered(mut self, dims: &[Dimension]) -> Self {
        self.staggered = dims.to_vec();
        self
    }

    pub fn dtype(mut self, dtype: DataType) -> Self {
        self.dtype = dtype;
        self
    }

    pub(crate) fn renamed(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    pub(crate) fn component_of(mut self, parent: &str) -> Self {
        self.component_of = Some(parent.to_string());
        self
    }
}

/// A grid-backed field or a local array.
#[derive(Clone)]
pub struct Function(Arc<FunctionSpec>);

impl Function {
    /// Builds a standalone instance; prefer
    /// [`SymbolRegistry::function`](super::SymbolRegistry::function), which
    /// hands out one canonical instance per parameter set.
    pub fn new(spec: FunctionSpec) -> Self {
        Function(Arc::new(spec))
    }

    pub fn spec(&self) -> &FunctionSpec {
        &self.0
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> FunctionKind {
        self.0.kind
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.0.grid.as_ref()
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.0.dimensions
    }

    pub fn shape(&self) -> &[Expr] {
        &self.0.shape
    }

    pub fn space_order(&self) -> u32 {
        self.0.space_order
    }

    pub fn time_order(&self) -> u32 {
        self.0.time_order
    }

    pub fn dtype(&self) -> DataType {
        self.0.dtype
    }

    pub fn staggered(&self) -> &[Dimension] {
        &self.0.staggered
    }

    pub fn is_array(&self) -> bool {
        self.0.kind == FunctionKind::Array
    }

    /// Grid-backed functions carry discretization metadata; arrays do not.
    pub fn is_differentiable(&self) -> bool {
        !self.is_array() && self.0.grid.is_some()
    }

    pub fn is_time_dependent(&self) -> bool {
        self.0.kind == FunctionKind::TimeFunction
    }

    pub fn is_staggered(&self) -> bool {
        !self.0.staggered.is_empty()
    }

    pub fn is_vector_component(&self) -> bool {
        self.0.component_of.is_some()
    }

    pub fn time_dim(&self) -> Option<&Dimension> {
        self.dimensions().iter().find(|d| d.is_time())
    }

    /// Offset of the stored values from the grid nodes, in grid spacings.
    pub fn stagger_offset(&self, dim: &Dimension) -> Rational {
        if self.0.staggered.iter().any(|d| d == dim.root()) {
            Rational::new(1, 2)
        } else {
            Rational::ZERO
        }
    }

    /// Physical location of the value stored at each dimension's index.
    pub fn index_ref(&self) -> Vec<(Dimension, Expr)> {
        self.dimensions()
            .iter()
            .map(|d| {
                let at = Expr::from(d) + Expr::from(self.stagger_offset(d)) * Expr::from(d.spacing());
                (d.clone(), at)
            })
            .collect()
    }

    /// Name of the handle passed at call sites.
    pub fn c_symbol(&self) -> Symbol {
        Symbol::new(format!("{}_vec", self.name()), self.dtype())
    }

    /// `u(t, x, y)`, the access at the function's own dimensions.
    pub fn access(&self) -> Expr {
        Expr::access(self, self.dimensions().iter().map(Expr::from).collect())
    }

    pub fn at(&self, indices: Vec<Expr>) -> Expr {
        Expr::access(self, indices)
    }

    pub fn indexed(&self, indices: Vec<Expr>) -> Expr {
        Expr::indexed(self, indices)
    }

    /// Access one time step ahead: `u(t + dt, x, y)`.
    pub fn forward(&self) -> Result<Expr> {
        self.shifted_in_time(1, "forward")
    }

    /// Access one time step behind: `u(t - dt, x, y)`.
    pub fn backward(&self) -> Result<Expr> {
        self.shifted_in_time(-1, "backward")
    }

    fn shifted_in_time(&self, steps: i64, attr: &str) -> Result<Expr> {
        let time = self
            .time_dim()
            .ok_or_else(|| Error::missing(self.name(), attr))?;
        let indices = self
            .dimensions()
            .iter()
            .map(|d| {
                if d == time {
                    Expr::from(d) + Expr::from(d.spacing()) * steps
                } else {
                    Expr::from(d)
                }
            })
            .collect();
        Ok(Expr::access(self, indices))
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Function {}

impl Hash for Function {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Function {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Function {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ordering::Equal;
        }
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind(), self.name())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! Data dependences between lowered equations, and the loop properties
//! they imply.
//!
//! Statements become graph nodes; every pair of accesses to the same
//! function with at least one write becomes an edge from the access that
//! runs first to the one that runs second. The distance vector says how
//! many iterations apart, per loop, the two accesses touch the same element.

use std::collections::BTreeSet;
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction as Edges;

use crate::ir::equations::{Access, AccessMode, LoweredEq, Offset};
use crate::ir::iet::Property;
use crate::symbolics::{Dimension, Function};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepKind {
    /// Read after write.
    Flow,
    /// Write after read.
    Anti,
    /// Write after write.
    Output,
}

impl DepKind {
    fn reversed(self) -> DepKind {
        match self {
            DepKind::Flow => DepKind::Anti,
            DepKind::Anti => DepKind::Flow,
            DepKind::Output => DepKind::Output,
        }
    }
}

impl fmt::Display for DepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DepKind::Flow => "flow",
            DepKind::Anti => "anti",
            DepKind::Output => "output",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependence {
    pub kind: DepKind,
    pub function: Function,
    /// Statement positions, source first.
    pub source: usize,
    pub sink: usize,
    /// Per loop, outermost first; `None` where the distance is unknown.
    pub distance: Vec<Option<i64>>,
    /// The loop carrying the dependence, if any.
    pub cause: Option<Dimension>,
    /// Both ends are `+=` updates, so the order between them is irrelevant.
    pub commutative: bool,
}

impl Dependence {
    pub fn is_carried_by(&self, dim: &Dimension) -> bool {
        self.cause.as_ref() == Some(dim)
    }

    pub fn is_loop_independent(&self) -> bool {
        self.cause.is_none()
    }
}

impl fmt::Display for Dependence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let distance: Vec<String> = self
            .distance
            .iter()
            .map(|d| d.map_or_else(|| "*".to_string(), |d| d.to_string()))
            .collect();
        write!(
            f,
            "{} {}: S{} -> S{} ({})",
            self.kind,
            self.function,
            self.source,
            self.sink,
            distance.join(", ")
        )
    }
}

pub struct DependenceGraph {
    graph: DiGraph<usize, Dependence>,
    dims: Vec<Dimension>,
    accesses: Vec<Vec<Access>>,
    scalar_temporaries: bool,
}

impl DependenceGraph {
    /// Analyse `eqs`, executed in order inside a perfect nest over `dims`.
    pub fn build(eqs: &[LoweredEq], dims: &[Dimension]) -> Self {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..eqs.len()).map(|i| graph.add_node(i)).collect();
        let accesses: Vec<Vec<Access>> = eqs.iter().map(LoweredEq::accesses).collect();

        for (i, src) in accesses.iter().enumerate() {
            for (j, dst) in accesses.iter().enumerate().skip(i) {
                for (ai, a) in src.iter().enumerate() {
                    for (bi, b) in dst.iter().enumerate() {
                        if a.function != b.function || !(a.mode.is_write() || b.mode.is_write()) {
                            continue;
                        }
                        // Within one statement, visit each unordered pair once;
                        // a write also pairs with itself across iterations.
                        if i == j && (bi < ai || (bi == ai && !a.mode.is_write())) {
                            continue;
                        }
                        if let Some(dep) = pair(a, b, i, j, dims) {
                            tracing::trace!(dependence = %dep, "found dependence");
                            graph.add_edge(nodes[dep.source], nodes[dep.sink], dep);
                        }
                    }
                }
            }
        }

        let scalar_temporaries = eqs.iter().any(|e| e.is_scalar() && !e.is_increment());
        tracing::debug!(
            statements = eqs.len(),
            dependences = graph.edge_count(),
            "built dependence graph"
        );
        DependenceGraph {
            graph,
            dims: dims.to_vec(),
            accesses,
            scalar_temporaries,
        }
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }

    pub fn dependences(&self) -> impl Iterator<Item = &Dependence> {
        self.graph.edge_weights()
    }

    pub fn carried_by(&self, dim: &Dimension) -> Vec<&Dependence> {
        self.dependences().filter(|d| d.is_carried_by(dim)).collect()
    }

    /// Dependences whose sink is statement `stmt`.
    pub fn incoming(&self, stmt: usize) -> Vec<&Dependence> {
        self.graph
            .node_indices()
            .find(|n| self.graph[*n] == stmt)
            .map(|n| {
                self.graph
                    .edges_directed(n, Edges::Incoming)
                    .map(|e| e.weight())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// What can be said about running the loop over `dim` in any order.
    pub fn properties(&self, dim: &Dimension) -> BTreeSet<Property> {
        let mut props = BTreeSet::new();
        let carried = self.carried_by(dim);
        if carried.is_empty() {
            props.insert(if self.scalar_temporaries {
                Property::ParallelIfPrivate
            } else {
                Property::Parallel
            });
        } else if carried.iter().all(|d| d.commutative) {
            props.insert(Property::ParallelIfAtomic);
        } else {
            props.insert(Property::Sequential);
        }
        let affine = self
            .accesses
            .iter()
            .flatten()
            .all(|a| a.offset(dim) != Offset::Irregular);
        if affine {
            props.insert(Property::Affine);
        }
        props
    }
}

fn distance_along(a: &Access, b: &Access, dim: &Dimension) -> Option<i64> {
    match (a.offset(dim), b.offset(dim)) {
        (Offset::Affine(p), Offset::Affine(q)) => Some(p - q),
        // Every iteration touches the same element.
        _ => None,
    }
}

/// The dependence between `a` in statement `i` and `b` in statement `j`,
/// with `i <= j`.
fn pair(a: &Access, b: &Access, i: usize, j: usize, dims: &[Dimension]) -> Option<Dependence> {
    let kind = match (a.mode.is_write(), b.mode.is_write()) {
        (true, true) => DepKind::Output,
        (true, false) => DepKind::Flow,
        _ => DepKind::Anti,
    };
    let distance: Vec<Option<i64>> = dims.iter().map(|d| distance_along(a, b, d)).collect();
    let lead = dims
        .iter()
        .zip(&distance)
        .find(|(_, d)| **d != Some(0))
        .map(|(dim, d)| (dim.clone(), *d));

    let commutative = a.mode == AccessMode::Increment && b.mode == AccessMode::Increment;
    let dep = |kind, source, sink, distance, cause| Dependence {
        kind,
        function: a.function.clone(),
        source,
        sink,
        distance,
        cause,
        commutative,
    };
    match lead {
        // Same iteration: only ordering across statements matters. Inside a
        // statement, reads happen before the write.
        None if i == j => None,
        None => Some(dep(kind, i, j, distance, None)),
        Some((dim, Some(d))) if d < 0 => {
            let flipped = distance.iter().map(|d| d.map(|d| -d)).collect();
            Some(dep(kind.reversed(), j, i, flipped, Some(dim)))
        }
        Some((dim, _)) => Some(dep(kind, i, j, distance, Some(dim))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::equations::AugOp;
    use crate::symbolics::{Equation, Expr, FunctionSpec, Grid, SymbolRegistry};

    fn setup() -> (SymbolRegistry, Grid) {
        let mut registry = SymbolRegistry::new();
        let grid = registry.grid("grid", &[16]);
        (registry, grid)
    }

    #[test]
    fn test_time_stepping_is_carried_by_time() {
        let (mut registry, grid) = setup();
        let u = registry.function(FunctionSpec::time_function("u", &grid).space_order(2));
        let eq = Equation::new(u.forward().unwrap(), u.access().shortcut("dx2").unwrap());
        let lowered = LoweredEq::lower(&eq).unwrap();
        let t = grid.time_dim().clone();
        let x = grid.dimensions()[0].clone();

        let graph = DependenceGraph::build(&[lowered], &[t.clone(), x.clone()]);
        assert!(!graph.is_empty());
        assert!(graph.dependences().all(|d| d.is_carried_by(&t)));
        assert!(graph
            .dependences()
            .all(|d| d.kind == DepKind::Flow && d.distance[0] == Some(1)));
        assert!(graph.properties(&t).contains(&Property::Sequential));
        let space = graph.properties(&x);
        assert!(space.contains(&Property::Parallel));
        assert!(space.contains(&Property::Affine));
    }

    #[test]
    fn test_in_place_shift_is_sequential() {
        let (mut registry, grid) = setup();
        let f = registry.function(FunctionSpec::function("f", &grid));
        let x = grid.dimensions()[0].clone();
        let xe = Expr::from(&x);
        let eq = LoweredEq::new(f.indexed(vec![xe.clone()]), f.indexed(vec![xe + 1])).unwrap();

        let graph = DependenceGraph::build(&[eq], &[x.clone()]);
        let deps: Vec<&Dependence> = graph.carried_by(&x);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].kind, DepKind::Anti);
        assert_eq!(deps[0].distance, vec![Some(1)]);
        assert!(graph.properties(&x).contains(&Property::Sequential));
    }

    #[test]
    fn test_flow_between_statements() {
        let (mut registry, grid) = setup();
        let f = registry.function(FunctionSpec::function("f", &grid));
        let g = registry.function(FunctionSpec::function("g", &grid));
        let x = grid.dimensions()[0].clone();
        let xe = Expr::from(&x);
        let first = LoweredEq::new(f.indexed(vec![xe.clone()]), Expr::one()).unwrap();
        let second = LoweredEq::new(g.indexed(vec![xe.clone()]), f.indexed(vec![xe]) * 2).unwrap();

        let graph = DependenceGraph::build(&[first, second], &[x.clone()]);
        let incoming = graph.incoming(1);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].kind, DepKind::Flow);
        assert!(incoming[0].is_loop_independent());
        assert!(graph.properties(&x).contains(&Property::Parallel));
    }

    #[test]
    fn test_reduction_is_parallel_if_atomic() {
        let (mut registry, grid) = setup();
        let f = registry.function(FunctionSpec::function("f", &grid));
        let x = grid.dimensions()[0].clone();
        let total = Dimension::space("i");
        let acc = FunctionSpec::array("acc", &[total.clone()], vec![Expr::one()]);
        let acc = registry.function(acc);
        let eq = LoweredEq::augmented(
            acc.indexed(vec![Expr::zero()]),
            f.indexed(vec![Expr::from(&x)]),
            AugOp::Add,
        )
        .unwrap();

        let graph = DependenceGraph::build(&[eq], &[x.clone()]);
        assert!(!graph.carried_by(&x).is_empty());
        assert!(graph.properties(&x).contains(&Property::ParallelIfAtomic));
    }

    #[test]
    fn test_scalar_temporaries_need_privatization() {
        let (mut registry, grid) = setup();
        let f = registry.function(FunctionSpec::function("f", &grid));
        let x = grid.dimensions()[0].clone();
        let r = crate::symbolics::Symbol::float("r0");
        let tmp = LoweredEq::new(Expr::from(&r), f.indexed(vec![Expr::from(&x)])).unwrap();
        let graph = DependenceGraph::build(&[tmp], &[x.clone()]);
        let props = graph.properties(&x);
        assert!(props.contains(&Property::ParallelIfPrivate));
        assert!(!props.contains(&Property::Parallel));
    }

    #[test]
    fn test_irregular_index_is_not_affine() {
        let (mut registry, grid) = setup();
        let f = registry.function(FunctionSpec::function("f", &grid));
        let g = registry.function(FunctionSpec::function("g", &grid));
        let x = grid.dimensions()[0].clone();
        let xe = Expr::from(&x);
        let eq = LoweredEq::new(f.indexed(vec![xe.clone()]), g.indexed(vec![&xe * &xe])).unwrap();
        let graph = DependenceGraph::build(&[eq], &[x.clone()]);
        assert!(!graph.properties(&x).contains(&Property::Affine));
    }
}

//! Equations → `Callable` lowering.
//!
//! grids → derivative expansion → dependence analysis → buffered time
//! indices → loop nest → parallel constructs → halo/section/timers →
//! callable. Each step logs at `debug`.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{GridPolicy, Language, Options};
use crate::diagnostic::Diagnostic;
use crate::error::Error;
use crate::ir::dependence::DependenceGraph;
use crate::ir::equations::{LoweredEq, Offset};
use crate::ir::iet::{
    derive_parameters, Callable, Construct, Direction, Expression, HaloScheme, Iteration, Node,
    ParallelBlock, ParallelIteration, ParallelTree, PointerCast, Property, Schedule, ScheduleKind,
    Section, TimedList,
};
use crate::symbolics::{Dimension, DimensionKind, Equation, Expr, Function, Substitution, Symbol};

use super::LoweredKernel;

type Diagnostics = Vec<Diagnostic>;

/// Lower `eqs`, run in order at every grid point, into one callable.
pub(crate) fn lower(eqs: &[Equation], options: &Options) -> Result<LoweredKernel, Diagnostics> {
    let mut warnings = Vec::new();
    check_grids(eqs, options.grid_policy, &mut warnings)?;

    let lowered = lower_equations(eqs)?;
    let dims = nest_dimensions(&lowered);
    let (time, space): (Vec<Dimension>, Vec<Dimension>) =
        dims.iter().cloned().partition(Dimension::is_time);
    tracing::debug!(
        time = ?time.iter().map(Dimension::name).collect::<Vec<_>>(),
        space = ?space.iter().map(Dimension::name).collect::<Vec<_>>(),
        "nest dimensions"
    );

    let graph = DependenceGraph::build(&lowered, &dims);
    let properties: BTreeMap<Dimension, BTreeSet<Property>> =
        dims.iter().map(|d| (d.clone(), graph.properties(d))).collect();

    let (lowered, buffers) = match time.first() {
        Some(t) => buffer_time_indices(&lowered, t).map_err(|e| vec![Diagnostic::from(e)])?,
        None => (lowered, Vec::new()),
    };

    let statements: Vec<Node> = lowered
        .iter()
        .map(|eq| {
            if eq.is_scalar() && !eq.is_increment() {
                Expression::local(eq.clone()).into()
            } else {
                Expression::new(eq.clone()).into()
            }
        })
        .collect();

    let space_nest = build_space_nest(statements, &space, &properties, options)
        .map_err(|e| vec![Diagnostic::from(e)])?;

    let mut region: Node = Section::new("section0", space_nest).into();
    if options.profiling {
        region = TimedList::new("timers", "section0", vec![region]).into();
    }
    if options.halo_exchange {
        let scheme = HaloScheme::from_equations(&lowered);
        tracing::debug!(scheme = %scheme, "halo exchange");
        if !scheme.is_empty() {
            region = Node::halo_spot(scheme, vec![region]).map_err(|e| vec![Diagnostic::from(e)])?;
        }
    }

    let body = match time.first() {
        Some(t) => {
            let direction = time_direction(&lowered, t);
            let iteration = Iteration::new(
                vec![region],
                t,
                (t.symbolic_min(), t.symbolic_max(), Expr::one()),
            )
            .with_direction(direction)
            .with_properties(properties.get(t).cloned().unwrap_or_default())
            .with_uindices(buffers)
            .map_err(|e| vec![Diagnostic::from(e)])?;
            tracing::debug!(loop = %Node::from(iteration.clone()).repr(), "time loop");
            Node::from(iteration)
        }
        None => region,
    };

    let casts: Vec<Node> = functions_of(&lowered)
        .iter()
        .map(|f| PointerCast::new(f).into())
        .collect();
    let body = Node::list_with(casts, vec![body], vec![Node::statement("return 0")]);
    let parameters = derive_parameters(&body);
    let kernel = LoweredKernel::new(
        Callable::new(options.name.clone(), vec![body], "int", parameters),
        lowered,
        warnings,
    );
    let root = kernel.node();
    tracing::debug!(callable = %root.repr(), signature = %root.signature(), "lowered");
    Ok(kernel)
}

// ─── Grids ─────────────────────────────────────────────────────────

fn check_grids(
    eqs: &[Equation],
    policy: GridPolicy,
    warnings: &mut Diagnostics,
) -> Result<(), Diagnostics> {
    let mut errors = Vec::new();
    for eq in eqs {
        let both = Expr::list(vec![eq.lhs().clone(), eq.rhs().clone()]);
        let Some(conflict) = both.grid_conflict() else {
            continue;
        };
        match policy {
            GridPolicy::Warn => {
                tracing::warn!(equation = %eq, "{}; using the first grid found", conflict);
                warnings.push(
                    Diagnostic::warning(conflict.to_string())
                        .with_origin(eq.to_string())
                        .with_note("the first grid found is used".to_string()),
                );
            }
            GridPolicy::Error => {
                errors.push(Diagnostic::from(conflict).with_origin(eq.to_string()));
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ─── Equations ─────────────────────────────────────────────────────

fn lower_equations(eqs: &[Equation]) -> Result<Vec<LoweredEq>, Diagnostics> {
    let mut lowered = Vec::with_capacity(eqs.len());
    let mut errors = Vec::new();
    for eq in eqs {
        match LoweredEq::lower(eq) {
            Ok(l) => {
                tracing::debug!(equation = %eq, lowered = %l, "expanded");
                lowered.push(l);
            }
            Err(e) => errors.push(Diagnostic::from(e).with_origin(eq.to_string())),
        }
    }
    if errors.is_empty() {
        Ok(lowered)
    } else {
        Err(errors)
    }
}

/// Accessed functions, first-seen order.
fn functions_of(eqs: &[LoweredEq]) -> Vec<Function> {
    let mut out: Vec<Function> = Vec::new();
    for access in eqs.iter().flat_map(LoweredEq::accesses) {
        if !out.contains(&access.function) {
            out.push(access.function);
        }
    }
    out
}

/// Loop dimensions: time first, then space, each in first-seen order.
fn nest_dimensions(eqs: &[LoweredEq]) -> Vec<Dimension> {
    let mut dims: Vec<Dimension> = Vec::new();
    for f in functions_of(eqs) {
        for d in f.dimensions() {
            if !dims.contains(d) {
                dims.push(d.clone());
            }
        }
    }
    dims.sort_by_key(|d| !d.is_time());
    dims
}

// ─── Time buffering ────────────────────────────────────────────────

/// Replace each `t + k` index of a time function with a modulo index
/// `t<i> = (t + k) % n` into a buffer of `n` time slices.
fn buffer_time_indices(
    eqs: &[LoweredEq],
    t: &Dimension,
) -> Result<(Vec<LoweredEq>, Vec<Dimension>), Error> {
    let time_accesses: Vec<_> = eqs
        .iter()
        .flat_map(LoweredEq::accesses)
        .filter(|a| !a.function.is_array() && a.function.time_dim() == Some(t))
        .collect();
    let offsets: BTreeSet<i64> = time_accesses
        .iter()
        .filter_map(|a| match a.offset(t) {
            Offset::Affine(k) => Some(k),
            _ => None,
        })
        .collect();
    let (Some(lo), Some(hi)) = (offsets.first(), offsets.last()) else {
        return Ok((eqs.to_vec(), Vec::new()));
    };
    let span = u32::try_from(hi - lo + 1).unwrap_or(u32::MAX);
    let order = time_accesses
        .iter()
        .map(|a| a.function.time_order() + 1)
        .max()
        .unwrap_or(1);
    let modulus = span.max(order);

    let buffers: BTreeMap<i64, Dimension> = offsets
        .iter()
        .enumerate()
        .map(|(i, k)| (*k, Dimension::modulo(format!("{}{}", t.name(), i), t, *k, modulus)))
        .collect();
    tracing::debug!(buffers = buffers.len(), modulus, "buffered time indices");

    let mut subs = Substitution::new();
    for access in &time_accesses {
        let Offset::Affine(k) = access.offset(t) else {
            continue;
        };
        let indices: Vec<Expr> = access
            .function
            .dimensions()
            .iter()
            .zip(&access.indices)
            .map(|(d, index)| match buffers.get(&k) {
                Some(b) if d == t => Expr::from(b),
                _ => index.clone(),
            })
            .collect();
        subs = subs.with(
            Expr::indexed(&access.function, access.indices.clone()),
            Expr::indexed(&access.function, indices),
        );
    }
    let eqs = eqs
        .iter()
        .map(|eq| eq.map(|e| e.xreplace(&subs)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((eqs, buffers.into_values().collect()))
}

/// Backward when every time-function write looks into the past.
fn time_direction(eqs: &[LoweredEq], t: &Dimension) -> Direction {
    // Indices are buffered by now; read the offset off the modulo index.
    let writes: Vec<i64> = eqs
        .iter()
        .flat_map(LoweredEq::accesses)
        .filter(|a| a.mode.is_write() && a.function.time_dim() == Some(t))
        .filter_map(|a| {
            a.indices.iter().find_map(|i| match i.as_dimension()?.kind() {
                DimensionKind::Modulo { offset, .. } => Some(*offset),
                _ => None,
            })
        })
        .collect();
    if !writes.is_empty() && writes.iter().all(|k| *k < 0) {
        Direction::Backward
    } else {
        Direction::Forward
    }
}

// ─── Loop nest ─────────────────────────────────────────────────────

fn build_space_nest(
    statements: Vec<Node>,
    space: &[Dimension],
    properties: &BTreeMap<Dimension, BTreeSet<Property>>,
    options: &Options,
) -> Result<Vec<Node>, Error> {
    if space.is_empty() {
        return Ok(statements);
    }
    let props = |d: &Dimension| properties.get(d).cloned().unwrap_or_default();
    // Scalar temporaries are declared inside the nest, so they are private
    // to each iteration already.
    let parallel = |d: &Dimension| {
        let p = props(d);
        p.contains(&Property::Parallel) || p.contains(&Property::ParallelIfPrivate)
    };

    let openmp = options.language == Language::OpenMp;
    let leading_parallel = space.iter().take_while(|d| parallel(d)).count();
    let ncollapse = (options.ncollapse as usize).min(leading_parallel);
    let openmp = openmp && ncollapse > 0;
    if options.language == Language::OpenMp && !openmp {
        tracing::debug!("outermost space loop is not parallel; emitting sequential code");
    }

    let innermost = space.len() - 1;
    let mut body = statements;
    for (pos, d) in space.iter().enumerate().rev() {
        let mut iteration = Iteration::new(
            body,
            d,
            (d.symbolic_min(), d.symbolic_max(), Expr::one()),
        )
        .with_properties(props(d));
        let node: Node = if openmp && pos == innermost && pos >= ncollapse && parallel(d) {
            iteration = iteration.with_properties([Property::Vectorized]);
            ParallelIteration::new(iteration, Construct::Simd, 1).into()
        } else if openmp && pos == 0 {
            let chunk = Expr::from(i64::from(options.chunk_size));
            let outer = ParallelIteration::new(iteration, Construct::For, ncollapse as u32)
                .with_schedule(Schedule {
                    kind: ScheduleKind::Dynamic,
                    chunk: Some(chunk),
                });
            let tree = ParallelTree::new(vec![], vec![outer.into()], Some(Symbol::int("nthreads")))?;
            ParallelBlock::new(vec![tree.into()], vec![])?.into()
        } else {
            iteration.into()
        };
        body = vec![node];
    }
    Ok(body)
}

//! Node payloads. Constructors enforce the structural invariants of each
//! construct; everything is immutable afterwards.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;

use super::halo::HaloScheme;
use super::properties::{Direction, Property};
use super::Node;
use crate::error::{Error, Result};
use crate::ir::equations::{AugOp, LoweredEq};
use crate::symbolics::{Dimension, Entity, Expr, Function, Symbol};

// ─── Lists ─────────────────────────────────────────────────────────

/// A sequence of nodes with optional header and footer. Also the payload
/// of `Block`.
#[derive(Clone, Debug, Default)]
pub struct List {
    pub(super) header: Vec<Node>,
    pub(super) body: Vec<Node>,
    pub(super) footer: Vec<Node>,
}

impl List {
    /// Build a list, merging a lone nested list of the same kind into it.
    pub(super) fn denest(
        header: Vec<Node>,
        mut body: Vec<Node>,
        footer: Vec<Node>,
        same_kind: fn(&Node) -> Option<&List>,
    ) -> List {
        if body.len() == 1 {
            if let Some(inner) = same_kind(&body[0]) {
                let inner = inner.clone();
                return List {
                    header: header.into_iter().chain(inner.header).collect(),
                    body: inner.body,
                    footer: footer.into_iter().chain(inner.footer).collect(),
                };
            }
        }
        body.shrink_to_fit();
        List {
            header,
            body,
            footer,
        }
    }

    pub fn header(&self) -> &[Node] {
        &self.header
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }

    pub fn footer(&self) -> &[Node] {
        &self.footer
    }
}

/// A C fragment that has no dedicated node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Element {
    Comment(String),
    Statement(String),
    Pragma(String),
    Line(String),
    Blank,
}

// ─── Expressions ───────────────────────────────────────────────────

/// One lowered equation as a statement.
#[derive(Clone, Debug)]
pub struct Expression {
    pub(super) expr: LoweredEq,
    pub(super) pragmas: Vec<String>,
    pub(super) local: bool,
}

impl Expression {
    pub fn new(expr: LoweredEq) -> Self {
        Expression {
            expr,
            pragmas: Vec::new(),
            local: false,
        }
    }

    /// An expression that also declares its target.
    pub fn local(expr: LoweredEq) -> Self {
        Expression {
            local: true,
            ..Expression::new(expr)
        }
    }

    pub fn with_pragmas(mut self, pragmas: Vec<String>) -> Self {
        self.pragmas = pragmas;
        self
    }

    pub fn expr(&self) -> &LoweredEq {
        &self.expr
    }

    pub fn pragmas(&self) -> &[String] {
        &self.pragmas
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn is_increment(&self) -> bool {
        self.expr.is_increment()
    }

    pub fn is_scalar(&self) -> bool {
        self.expr.is_scalar()
    }

    pub fn is_tensor(&self) -> bool {
        self.expr.is_tensor()
    }

    /// A fresh assignment (not `+=`) to a scalar, or a tensor filled from a
    /// list initializer.
    pub fn is_definition(&self) -> bool {
        let from_list = matches!(
            self.expr.rhs().kind(),
            crate::symbolics::ExprKind::ListInitializer(_)
        );
        (self.is_scalar() && !self.is_increment()) || (self.is_tensor() && from_list)
    }

    pub fn write(&self) -> &Entity {
        self.expr.write()
    }

    pub fn functions(&self) -> Vec<Function> {
        let mut out = self.expr.reads();
        if let Entity::Function(f) = self.write() {
            if !out.contains(f) {
                out.push(f.clone());
            }
        }
        out
    }

    /// Index dimensions of the accessed arrays, first-seen order.
    pub fn dimensions(&self) -> Vec<Dimension> {
        let mut dims: Vec<Dimension> = Vec::new();
        for access in self.expr.accesses() {
            for index in &access.indices {
                for e in index.free_symbols() {
                    if let Entity::Dimension(d) = e {
                        if !dims.contains(&d) {
                            dims.push(d);
                        }
                    }
                }
            }
        }
        dims
    }

    pub fn defines(&self) -> Vec<Entity> {
        if self.local || self.is_definition() {
            vec![self.write().clone()]
        } else {
            Vec::new()
        }
    }
}

// ─── Calls ─────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum CallArg {
    Expr(Expr),
    /// Passed by handle (`u_vec`) unless it is a local array.
    Function(Function),
    /// A nested `Call` or `Lambda`.
    Node(Node),
}

#[derive(Clone, Debug)]
pub struct Call {
    pub(super) name: String,
    pub(super) base: Option<Symbol>,
    pub(super) arguments: Vec<CallArg>,
    pub(super) retobj: Option<Expr>,
    pub(super) is_indirect: bool,
}

impl Call {
    pub fn new(name: impl Into<String>, arguments: Vec<CallArg>) -> Result<Self> {
        for arg in &arguments {
            if let CallArg::Node(n) = arg {
                if !matches!(n, Node::Call(_) | Node::Lambda(_)) {
                    return Err(Error::malformed(
                        "Call",
                        format!("argument {} is neither a call nor a lambda", n.repr()),
                    ));
                }
            }
        }
        Ok(Call {
            name: name.into(),
            base: None,
            arguments,
            retobj: None,
            is_indirect: false,
        })
    }

    /// Call through `base` (`base->name(...)`).
    pub fn with_base(mut self, base: Symbol) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_retobj(mut self, retobj: Expr) -> Self {
        self.retobj = Some(retobj);
        self
    }

    pub fn indirect(mut self) -> Self {
        self.is_indirect = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&Symbol> {
        self.base.as_ref()
    }

    pub fn arguments(&self) -> &[CallArg] {
        &self.arguments
    }

    pub fn retobj(&self) -> Option<&Expr> {
        self.retobj.as_ref()
    }

    pub fn is_indirect(&self) -> bool {
        self.is_indirect
    }

    pub(super) fn nested(&self) -> Vec<&Node> {
        self.arguments
            .iter()
            .filter_map(|a| match a {
                CallArg::Node(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Same call with its nested calls replaced in order.
    pub(super) fn with_nested(&self, nodes: Vec<Node>) -> Result<Self> {
        let expected = self.nested().len();
        if nodes.len() != expected {
            return Err(Error::malformed(
                "Call",
                format!("expected {} nested call(s), got {}", expected, nodes.len()),
            ));
        }
        let mut nodes = nodes.into_iter();
        let arguments = self
            .arguments
            .iter()
            .map(|a| match (a, &mut nodes) {
                (CallArg::Node(_), it) => it.next().map_or_else(|| a.clone(), CallArg::Node),
                _ => a.clone(),
            })
            .collect();
        let call = Call::new(self.name.clone(), arguments)?;
        Ok(Call {
            base: self.base.clone(),
            retobj: self.retobj.clone(),
            is_indirect: self.is_indirect,
            ..call
        })
    }

    pub fn functions(&self) -> Vec<Function> {
        let mut out: Vec<Function> = Vec::new();
        let mut push = |f: &Function| {
            if !out.contains(f) {
                out.push(f.clone());
            }
        };
        for arg in &self.arguments {
            match arg {
                CallArg::Function(f) => push(f),
                CallArg::Expr(e) => e.functions().iter().for_each(&mut push),
                CallArg::Node(_) => {}
            }
        }
        if let Some(r) = &self.retobj {
            r.functions().iter().for_each(&mut push);
        }
        out
    }

    pub fn free_symbols(&self) -> BTreeSet<Entity> {
        let mut out = BTreeSet::new();
        for arg in &self.arguments {
            match arg {
                CallArg::Expr(e) => out.extend(e.free_symbols()),
                CallArg::Function(f) if f.is_array() => {
                    out.insert(Entity::Function(f.clone()));
                }
                CallArg::Function(f) => {
                    out.insert(Entity::Symbol(f.c_symbol()));
                }
                CallArg::Node(n) => out.extend(n.free_symbols()),
            }
        }
        if let Some(b) = &self.base {
            out.insert(Entity::Symbol(b.clone()));
        }
        if let Some(r) = &self.retobj {
            out.extend(r.free_symbols());
        }
        out
    }

    pub fn defines(&self) -> Vec<Entity> {
        let mut out = Vec::new();
        if let Some(b) = &self.base {
            out.push(Entity::Symbol(b.clone()));
        }
        if let Some(r) = &self.retobj {
            match (r.as_symbol(), r.as_access()) {
                (Some(s), _) => out.push(Entity::Symbol(s.clone())),
                (_, Some((f, _))) => out.push(Entity::Function(f.clone())),
                _ => {}
            }
        }
        out
    }
}

// ─── Loops ─────────────────────────────────────────────────────────

/// Loop bounds as given at construction.
#[derive(Clone, Debug)]
pub enum Limits {
    /// Upper bound only; the lower bound and step follow the dimension.
    Max(Expr),
    /// `(min, max, step)`.
    Range(Expr, Expr, Expr),
}

impl From<Expr> for Limits {
    fn from(max: Expr) -> Self {
        Limits::Max(max)
    }
}

impl From<(Expr, Expr, Expr)> for Limits {
    fn from((min, max, step): (Expr, Expr, Expr)) -> Self {
        Limits::Range(min, max, step)
    }
}

#[derive(Clone, Debug)]
pub struct Iteration {
    pub(super) nodes: Vec<Node>,
    pub(super) dim: Dimension,
    pub(super) limits: (Expr, Expr, Expr),
    pub(super) direction: Direction,
    pub(super) properties: BTreeSet<Property>,
    pub(super) pragmas: Vec<String>,
    pub(super) uindices: Vec<Dimension>,
}

impl Iteration {
    pub fn new(nodes: Vec<Node>, dim: &Dimension, limits: impl Into<Limits>) -> Self {
        let limits = match limits.into() {
            Limits::Range(min, max, step) => (min, max, step),
            Limits::Max(max) if dim.is_incr() => (dim.symbolic_min(), max, dim.step()),
            Limits::Max(max) => (Expr::zero(), max, Expr::one()),
        };
        Iteration {
            nodes,
            dim: dim.clone(),
            limits,
            direction: Direction::Forward,
            properties: BTreeSet::new(),
            pragmas: Vec::new(),
            uindices: Vec::new(),
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_properties(mut self, properties: impl IntoIterator<Item = Property>) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn with_pragmas(mut self, pragmas: Vec<String>) -> Self {
        self.pragmas = pragmas;
        self
    }

    /// Attach unbounded indices. Each must have the loop dimension among
    /// its ancestors.
    pub fn with_uindices(mut self, uindices: Vec<Dimension>) -> Result<Self> {
        for u in &uindices {
            if u.parent().is_none() || !u.defines().contains(&self.dim) {
                return Err(Error::UnboundIndex {
                    index: u.name().to_string(),
                    dim: self.dim.name().to_string(),
                });
            }
        }
        self.uindices = uindices;
        Ok(self)
    }

    pub(super) fn with_nodes(&self, nodes: Vec<Node>) -> Self {
        Iteration {
            nodes,
            ..self.clone()
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn dim(&self) -> &Dimension {
        &self.dim
    }

    pub fn index(&self) -> &str {
        self.dim.name()
    }

    pub fn limits(&self) -> (&Expr, &Expr, &Expr) {
        (&self.limits.0, &self.limits.1, &self.limits.2)
    }

    pub fn symbolic_min(&self) -> &Expr {
        &self.limits.0
    }

    pub fn symbolic_max(&self) -> &Expr {
        &self.limits.1
    }

    pub fn step(&self) -> &Expr {
        &self.limits.2
    }

    pub fn symbolic_size(&self) -> Expr {
        &self.limits.1 - &self.limits.0 + 1
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn properties(&self) -> &BTreeSet<Property> {
        &self.properties
    }

    pub fn pragmas(&self) -> &[String] {
        &self.pragmas
    }

    pub fn uindices(&self) -> &[Dimension] {
        &self.uindices
    }

    pub fn is_sequential(&self) -> bool {
        self.properties.contains(&Property::Sequential)
    }

    pub fn is_parallel(&self) -> bool {
        self.properties.contains(&Property::Parallel)
    }

    pub fn is_parallel_atomic(&self) -> bool {
        self.properties.contains(&Property::ParallelIfAtomic)
    }

    pub fn is_parallel_private(&self) -> bool {
        self.properties.contains(&Property::ParallelIfPrivate)
    }

    pub fn is_parallel_relaxed(&self) -> bool {
        self.properties.iter().any(|p| p.is_parallel())
    }

    pub fn is_vectorized(&self) -> bool {
        self.properties.contains(&Property::Vectorized)
    }

    pub fn is_affine(&self) -> bool {
        self.properties.contains(&Property::Affine)
    }

    pub fn ncollapsed(&self) -> u32 {
        self.properties
            .iter()
            .find_map(|p| match p {
                Property::Collapsed(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// The loop dimension with its ancestors, then the unbounded indices.
    pub fn dimensions(&self) -> Vec<Dimension> {
        let mut dims = self.dim.defines();
        dims.extend(self.uindices.iter().cloned());
        dims
    }

    pub fn free_symbols(&self) -> BTreeSet<Entity> {
        let mut out = self.limits.0.free_symbols();
        out.extend(self.limits.1.free_symbols());
        for u in &self.uindices {
            out.insert(Entity::Dimension(u.clone()));
            out.extend(u.symbolic_min().free_symbols());
            out.extend(u.symbolic_incr().free_symbols());
        }
        out
    }

    pub fn defines(&self) -> Vec<Entity> {
        self.dimensions().into_iter().map(Entity::Dimension).collect()
    }
}

#[derive(Clone, Debug)]
pub struct While {
    pub(super) condition: Expr,
    pub(super) body: Vec<Node>,
}

impl While {
    pub fn new(condition: Expr, body: Vec<Node>) -> Self {
        While { condition, body }
    }

    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }
}

// ─── Functions and control ─────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Callable {
    pub(super) name: String,
    pub(super) body: Vec<Node>,
    pub(super) retval: String,
    pub(super) parameters: Vec<Entity>,
    pub(super) prefix: Vec<String>,
}

impl Callable {
    pub fn new(
        name: impl Into<String>,
        body: Vec<Node>,
        retval: impl Into<String>,
        parameters: Vec<Entity>,
    ) -> Self {
        Callable {
            name: name.into(),
            body,
            retval: retval.into(),
            parameters,
            prefix: vec!["static".to_string(), "inline".to_string()],
        }
    }

    pub fn with_prefix(mut self, prefix: Vec<String>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }

    pub fn retval(&self) -> &str {
        &self.retval
    }

    pub fn parameters(&self) -> &[Entity] {
        &self.parameters
    }

    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }
}

#[derive(Clone, Debug)]
pub struct Conditional {
    pub(super) condition: Expr,
    pub(super) then_body: Vec<Node>,
    pub(super) else_body: Vec<Node>,
}

impl Conditional {
    pub fn new(condition: Expr, then_body: Vec<Node>, else_body: Vec<Node>) -> Self {
        Conditional {
            condition,
            then_body,
            else_body,
        }
    }

    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    pub fn then_body(&self) -> &[Node] {
        &self.then_body
    }

    pub fn else_body(&self) -> &[Node] {
        &self.else_body
    }
}

/// Cast of a raw data pointer to a multi-dimensional array view.
#[derive(Clone, Debug)]
pub struct PointerCast {
    pub(super) function: Function,
    pub(super) obj: Option<Symbol>,
    pub(super) alignment: bool,
}

impl PointerCast {
    pub fn new(function: &Function) -> Self {
        PointerCast {
            function: function.clone(),
            obj: None,
            alignment: true,
        }
    }

    /// Cast from `obj` instead of the function's own handle.
    pub fn with_obj(mut self, obj: Symbol) -> Self {
        self.obj = Some(obj);
        self
    }

    pub fn unaligned(mut self) -> Self {
        self.alignment = false;
        self
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn obj(&self) -> Option<&Symbol> {
        self.obj.as_ref()
    }

    pub fn alignment(&self) -> bool {
        self.alignment
    }

    /// Extents of every dimension but the first.
    pub fn castshape(&self) -> Vec<Expr> {
        let f = &self.function;
        if f.is_array() {
            f.shape().iter().skip(1).cloned().collect()
        } else {
            let handle = f.c_symbol();
            (1..f.dimensions().len())
                .map(|i| Expr::from(Symbol::int(format!("{}->size[{}]", handle.name(), i))))
                .collect()
        }
    }

    pub fn free_symbols(&self) -> BTreeSet<Entity> {
        if self.function.is_array() {
            self.castshape().iter().flat_map(Expr::free_symbols).collect()
        } else {
            BTreeSet::new()
        }
    }
}

/// `pointee` viewed through the storage behind `pointer`.
#[derive(Clone, Debug)]
pub struct Dereference {
    pub(super) pointee: Function,
    pub(super) pointer: Function,
}

impl Dereference {
    pub fn new(pointee: &Function, pointer: &Function) -> Self {
        Dereference {
            pointee: pointee.clone(),
            pointer: pointer.clone(),
        }
    }

    pub fn pointee(&self) -> &Function {
        &self.pointee
    }

    pub fn pointer(&self) -> &Function {
        &self.pointer
    }

    pub fn free_symbols(&self) -> BTreeSet<Entity> {
        let mut out = BTreeSet::from([
            Entity::Function(self.pointee.clone()),
            Entity::Function(self.pointer.clone()),
        ]);
        for s in self.pointee.shape().iter().skip(1) {
            out.extend(s.free_symbols());
        }
        for s in self.pointer.shape() {
            out.extend(s.free_symbols());
        }
        out
    }
}

// ─── Regions ───────────────────────────────────────────────────────

/// A body bracketed by start/stop timer macros.
#[derive(Clone, Debug)]
pub struct TimedList {
    pub(super) timer: String,
    pub(super) lname: String,
    pub(super) body: Vec<Node>,
}

impl TimedList {
    pub fn new(timer: impl Into<String>, lname: impl Into<String>, body: Vec<Node>) -> Self {
        TimedList {
            timer: timer.into(),
            lname: lname.into(),
            body,
        }
    }

    pub fn timer(&self) -> &str {
        &self.timer
    }

    pub fn name(&self) -> &str {
        &self.lname
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }
}

/// A named group of statements forming one computational unit.
#[derive(Clone, Debug)]
pub struct Section {
    pub(super) name: String,
    pub(super) body: Vec<Node>,
    pub(super) is_subsection: bool,
}

impl Section {
    pub fn new(name: impl Into<String>, body: Vec<Node>) -> Self {
        Section {
            name: name.into(),
            body,
            is_subsection: false,
        }
    }

    pub fn subsection(name: impl Into<String>, body: Vec<Node>) -> Self {
        Section {
            is_subsection: true,
            ..Section::new(name, body)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }

    pub fn is_subsection(&self) -> bool {
        self.is_subsection
    }
}

/// `[captures](parameters){body}`.
#[derive(Clone, Debug)]
pub struct Lambda {
    pub(super) body: Vec<Node>,
    pub(super) captures: Vec<String>,
    pub(super) parameters: Vec<Entity>,
}

impl Lambda {
    pub fn new(body: Vec<Node>, captures: Vec<String>, parameters: Vec<Entity>) -> Self {
        Lambda {
            body,
            captures,
            parameters,
        }
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }

    pub fn captures(&self) -> &[String] {
        &self.captures
    }

    pub fn parameters(&self) -> &[Entity] {
        &self.parameters
    }
}

// ─── Parallelism ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Construct {
    For,
    ParallelFor,
    Simd,
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Construct::For => "omp for",
            Construct::ParallelFor => "omp parallel for",
            Construct::Simd => "omp simd",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleKind {
    Static,
    Dynamic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub kind: ScheduleKind,
    pub chunk: Option<Expr>,
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ScheduleKind::Static => "static",
            ScheduleKind::Dynamic => "dynamic",
        };
        match &self.chunk {
            Some(c) => write!(f, "schedule({},{})", kind, c),
            None => write!(f, "schedule({})", kind),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reduction {
    pub op: AugOp,
    pub target: Entity,
}

/// A loop carrying a parallel construct. Dereferences to the plain loop.
#[derive(Clone, Debug)]
pub struct ParallelIteration {
    pub(super) iteration: Iteration,
    pub(super) construct: Construct,
    pub(super) schedule: Option<Schedule>,
    pub(super) nthreads: Option<Symbol>,
    pub(super) reductions: Vec<Reduction>,
}

impl ParallelIteration {
    /// Wrap `iteration`, collapsing it with its `ncollapse - 1` directly
    /// nested loops.
    pub fn new(iteration: Iteration, construct: Construct, ncollapse: u32) -> Self {
        let mut iteration = iteration;
        iteration
            .properties
            .retain(|p| !matches!(p, Property::Collapsed(_)));
        iteration.properties.insert(Property::Collapsed(ncollapse.max(1)));
        ParallelIteration {
            iteration,
            construct,
            schedule: None,
            nthreads: None,
            reductions: Vec::new(),
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_nthreads(mut self, nthreads: Symbol) -> Self {
        self.nthreads = Some(nthreads);
        self
    }

    pub fn with_reduction(mut self, op: AugOp, target: Entity) -> Self {
        self.reductions.push(Reduction { op, target });
        self
    }

    pub(super) fn with_nodes(&self, nodes: Vec<Node>) -> Self {
        ParallelIteration {
            iteration: self.iteration.with_nodes(nodes),
            ..self.clone()
        }
    }

    pub fn iteration(&self) -> &Iteration {
        &self.iteration
    }

    pub fn construct(&self) -> Construct {
        self.construct
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    pub fn nthreads(&self) -> Option<&Symbol> {
        self.nthreads.as_ref()
    }

    pub fn reductions(&self) -> &[Reduction] {
        &self.reductions
    }

    /// The pragma text, without `#pragma`.
    pub fn pragma(&self) -> String {
        let mut parts = vec![self.construct.to_string()];
        let n = self.iteration.ncollapsed();
        if n > 1 {
            parts.push(format!("collapse({})", n));
        }
        if let Some(s) = &self.schedule {
            parts.push(s.to_string());
        }
        if let Some(t) = &self.nthreads {
            parts.push(format!("num_threads({})", t.name()));
        }
        for r in &self.reductions {
            parts.push(format!("reduction({}:{})", r.op.symbol(), r.target));
        }
        parts.join(" ")
    }

    /// The loops of the collapsed nest, outermost first.
    pub fn collapsed(&self) -> Result<Vec<&Iteration>> {
        let mut out = vec![&self.iteration];
        for _ in 1..self.iteration.ncollapsed() {
            let last = out[out.len() - 1];
            let next = match last.nodes.first() {
                Some(Node::Iteration(i)) => i,
                Some(Node::ParallelIteration(p)) => &p.iteration,
                _ => {
                    return Err(Error::malformed(
                        "ParallelIteration",
                        format!("loop over `{}` is not perfectly nested", last.index()),
                    ))
                }
            };
            out.push(next);
        }
        Ok(out)
    }
}

impl Deref for ParallelIteration {
    type Target = Iteration;

    fn deref(&self) -> &Iteration {
        &self.iteration
    }
}

/// Setup statements followed by exactly one parallel loop. Dereferences to
/// that loop.
#[derive(Clone, Debug)]
pub struct ParallelTree {
    pub(super) prefix: Vec<Node>,
    pub(super) body: Vec<Node>,
    pub(super) nthreads: Option<Symbol>,
}

impl ParallelTree {
    pub fn new(prefix: Vec<Node>, body: Vec<Node>, nthreads: Option<Symbol>) -> Result<Self> {
        match body.as_slice() {
            [Node::Iteration(_) | Node::ParallelIteration(_)] => Ok(ParallelTree {
                prefix,
                body,
                nthreads,
            }),
            _ => Err(Error::malformed(
                "ParallelTree",
                format!("expected exactly one loop, got {} node(s)", body.len()),
            )),
        }
    }

    pub fn prefix(&self) -> &[Node] {
        &self.prefix
    }

    pub fn nthreads(&self) -> Option<&Symbol> {
        self.nthreads.as_ref()
    }

    /// The wrapped loop node.
    pub fn root_node(&self) -> &Node {
        &self.body[0]
    }

    pub fn root(&self) -> &Iteration {
        self.body[0]
            .as_iteration()
            .expect("ParallelTree body holds a loop")
    }

    pub fn collapsed(&self) -> Result<Vec<&Iteration>> {
        match &self.body[0] {
            Node::ParallelIteration(p) => p.collapsed(),
            _ => Ok(vec![self.root()]),
        }
    }
}

impl Deref for ParallelTree {
    type Target = Iteration;

    fn deref(&self) -> &Iteration {
        self.root()
    }
}

/// A parallel region around one [`ParallelTree`].
#[derive(Clone, Debug)]
pub struct ParallelBlock {
    pub(super) body: Vec<Node>,
    pub(super) private: Vec<Symbol>,
}

impl ParallelBlock {
    /// `body` is a single `ParallelTree`, or a plain list holding one, in
    /// which case the list's header joins the tree's prefix.
    pub fn new(body: Vec<Node>, private: Vec<Symbol>) -> Result<Self> {
        let malformed = |reason: &str| Error::malformed("ParallelBlock", reason);
        let [node] = <[Node; 1]>::try_from(body)
            .map_err(|b| malformed(&format!("expected one node, got {}", b.len())))?;
        let partree = match node {
            Node::ParallelTree(t) => t,
            Node::List(list) => {
                if !list.footer.is_empty() {
                    return Err(malformed("wrapped list has a footer"));
                }
                let [inner] = <[Node; 1]>::try_from(list.body)
                    .map_err(|_| malformed("wrapped list must hold exactly one parallel tree"))?;
                let Node::ParallelTree(t) = inner else {
                    return Err(malformed("wrapped list must hold exactly one parallel tree"));
                };
                let prefix = Node::list_with(list.header, t.prefix, Vec::new());
                ParallelTree::new(vec![prefix], t.body, t.nthreads)?
            }
            other => {
                return Err(malformed(&format!("cannot parallelize {}", other.repr())));
            }
        };
        Ok(ParallelBlock {
            body: vec![Node::ParallelTree(partree)],
            private,
        })
    }

    pub fn partree(&self) -> &ParallelTree {
        self.body[0]
            .as_partree()
            .expect("ParallelBlock body holds a parallel tree")
    }

    pub fn root(&self) -> &Iteration {
        self.partree().root()
    }

    pub fn nthreads(&self) -> Option<&Symbol> {
        self.partree().nthreads()
    }

    pub fn private(&self) -> &[Symbol] {
        &self.private
    }

    pub fn collapsed(&self) -> Result<Vec<&Iteration>> {
        self.partree().collapsed()
    }
}

// ─── Distributed memory ────────────────────────────────────────────

/// A subtree that needs its halos exchanged before running.
#[derive(Clone, Debug)]
pub struct HaloSpot {
    pub(super) scheme: HaloScheme,
    pub(super) body: Vec<Node>,
}

impl HaloSpot {
    /// `body` may hold at most one node; an empty body becomes an empty list.
    pub fn new(scheme: HaloScheme, body: Vec<Node>) -> Result<Self> {
        let body = match body.len() {
            0 => vec![Node::list(Vec::new())],
            1 => body,
            n => {
                return Err(Error::malformed(
                    "HaloSpot",
                    format!("expected a single node, got {}", n),
                ))
            }
        };
        Ok(HaloSpot { scheme, body })
    }

    pub fn halo_scheme(&self) -> &HaloScheme {
        &self.scheme
    }

    pub fn body(&self) -> &Node {
        &self.body[0]
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        self.scheme.dimensions()
    }

    pub fn arguments(&self) -> BTreeSet<Entity> {
        self.scheme.arguments()
    }

    pub fn is_empty(&self) -> bool {
        self.scheme.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOp {
    WaitLock(String),
    WithLock(String),
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOp::WaitLock(l) => write!(f, "wait({})", l),
            SyncOp::WithLock(l) => write!(f, "lock({})", l),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SyncSpot {
    pub(super) sync_ops: Vec<SyncOp>,
    pub(super) body: Vec<Node>,
}

impl SyncSpot {
    pub fn new(sync_ops: Vec<SyncOp>, body: Vec<Node>) -> Self {
        SyncSpot { sync_ops, body }
    }

    pub fn sync_ops(&self) -> &[SyncOp] {
        &self.sync_ops
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }
}

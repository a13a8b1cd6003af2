//! Iteration/Expression Tree: the loop-nest IR printed as C.
//!
//! Every node is immutable. Nodes expose their child-holding fields in a
//! fixed order (`traversable`), so generic passes can walk a tree with
//! [`Node::children`] and put it back together with [`Node::rebuild`]
//! without knowing what each construct means.

pub mod codegen;
pub mod halo;
pub mod nodes;
pub mod properties;
pub mod visitors;

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

pub use halo::{HaloEntry, HaloScheme, HaloWidth};
pub use nodes::{
    Call, CallArg, Callable, Conditional, Construct, Dereference, Element, Expression, HaloSpot,
    Iteration, Lambda, Limits, List, ParallelBlock, ParallelIteration, ParallelTree, PointerCast, Reduction,
    Schedule, ScheduleKind, Section, SyncOp, SyncSpot, TimedList, While,
};
pub use properties::{Direction, Property};
pub use visitors::{
    derive_parameters, find_defines, find_expressions, find_nodes, find_symbols, print_ast,
    retrieve_iteration_trees, transform, IterationTree,
};

use crate::error::{Error, Result};
use crate::ir::equations::LoweredEq;
use crate::symbolics::{Dimension, Entity, Expr, Function, Symbol};

#[derive(Clone, Debug)]
pub enum Node {
    List(List),
    /// A list printed inside its own scope.
    Block(List),
    Element(Element),
    Expression(Expression),
    Call(Call),
    Iteration(Iteration),
    While(While),
    Callable(Callable),
    Conditional(Conditional),
    PointerCast(PointerCast),
    Dereference(Dereference),
    TimedList(TimedList),
    Section(Section),
    Lambda(Lambda),
    ParallelIteration(ParallelIteration),
    ParallelTree(ParallelTree),
    ParallelBlock(ParallelBlock),
    HaloSpot(HaloSpot),
    SyncSpot(SyncSpot),
}

macro_rules! node_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Node {
                fn from(n: $variant) -> Self {
                    Node::$variant(n)
                }
            }
        )*
    };
}

node_from!(
    Element,
    Expression,
    Call,
    Iteration,
    While,
    Callable,
    Conditional,
    PointerCast,
    Dereference,
    TimedList,
    Section,
    Lambda,
    ParallelIteration,
    ParallelTree,
    ParallelBlock,
    HaloSpot,
    SyncSpot,
);

// ─── Construction ──────────────────────────────────────────────────

fn as_list(node: &Node) -> Option<&List> {
    match node {
        Node::List(l) => Some(l),
        _ => None,
    }
}

fn as_block(node: &Node) -> Option<&List> {
    match node {
        Node::Block(l) => Some(l),
        _ => None,
    }
}

impl Node {
    pub fn list(body: Vec<Node>) -> Node {
        Node::list_with(Vec::new(), body, Vec::new())
    }

    /// A lone nested list in `body` is merged into the new one.
    pub fn list_with(header: Vec<Node>, body: Vec<Node>, footer: Vec<Node>) -> Node {
        Node::List(List::denest(header, body, footer, as_list))
    }

    pub fn block(body: Vec<Node>) -> Node {
        Node::block_with(Vec::new(), body, Vec::new())
    }

    /// A lone nested block in `body` is merged into the new one.
    pub fn block_with(header: Vec<Node>, body: Vec<Node>, footer: Vec<Node>) -> Node {
        Node::Block(List::denest(header, body, footer, as_block))
    }

    pub fn comment(text: impl Into<String>) -> Node {
        Node::Element(Element::Comment(text.into()))
    }

    pub fn statement(text: impl Into<String>) -> Node {
        Node::Element(Element::Statement(text.into()))
    }

    pub fn pragma(text: impl Into<String>) -> Node {
        Node::Element(Element::Pragma(text.into()))
    }

    pub fn line(text: impl Into<String>) -> Node {
        Node::Element(Element::Line(text.into()))
    }

    pub fn blank() -> Node {
        Node::Element(Element::Blank)
    }

    pub fn expression(expr: LoweredEq) -> Node {
        Node::Expression(Expression::new(expr))
    }

    pub fn halo_spot(scheme: HaloScheme, body: Vec<Node>) -> Result<Node> {
        HaloSpot::new(scheme, body).map(Node::HaloSpot)
    }
}

// ─── Inspection ────────────────────────────────────────────────────

/// One construction field, typed.
#[derive(Clone, Debug)]
pub enum Arg {
    Nodes(Vec<Node>),
    Expr(Expr),
    OptExpr(Option<Expr>),
    Limits(Expr, Expr, Expr),
    Equation(LoweredEq),
    Dimension(Dimension),
    Dimensions(Vec<Dimension>),
    Function(Function),
    Entities(Vec<Entity>),
    Symbol(Option<Symbol>),
    Symbols(Vec<Symbol>),
    Text(String),
    Texts(Vec<String>),
    Flag(bool),
    Properties(BTreeSet<Property>),
    Direction(Direction),
    Halo(HaloScheme),
    Element(Element),
    Construct(Construct),
    Schedule(Option<Schedule>),
    Reductions(Vec<Reduction>),
    CallArgs(Vec<CallArg>),
    SyncOps(Vec<SyncOp>),
}

impl Arg {
    pub fn as_nodes(&self) -> Option<&[Node]> {
        match self {
            Arg::Nodes(n) => Some(n),
            _ => None,
        }
    }
}

pub type Args = IndexMap<&'static str, Arg>;

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::List(_) => "List",
            Node::Block(_) => "Block",
            Node::Element(_) => "Element",
            Node::Expression(_) => "Expression",
            Node::Call(_) => "Call",
            Node::Iteration(_) => "Iteration",
            Node::While(_) => "While",
            Node::Callable(_) => "Callable",
            Node::Conditional(_) => "Conditional",
            Node::PointerCast(_) => "PointerCast",
            Node::Dereference(_) => "Dereference",
            Node::TimedList(_) => "TimedList",
            Node::Section(_) => "Section",
            Node::Lambda(_) => "Lambda",
            Node::ParallelIteration(_) => "ParallelIteration",
            Node::ParallelTree(_) => "ParallelTree",
            Node::ParallelBlock(_) => "ParallelBlock",
            Node::HaloSpot(_) => "HaloSpot",
            Node::SyncSpot(_) => "SyncSpot",
        }
    }

    /// Names of the child-holding fields, in rebuild order.
    pub fn traversable(&self) -> &'static [&'static str] {
        match self {
            Node::List(_) | Node::Block(_) => &["header", "body", "footer"],
            Node::Element(_)
            | Node::Expression(_)
            | Node::PointerCast(_)
            | Node::Dereference(_) => &[],
            Node::Call(_) => &["arguments"],
            Node::Iteration(_) | Node::ParallelIteration(_) => &["nodes"],
            Node::Conditional(_) => &["then_body", "else_body"],
            Node::ParallelTree(_) => &["prefix", "body"],
            Node::While(_)
            | Node::Callable(_)
            | Node::TimedList(_)
            | Node::Section(_)
            | Node::Lambda(_)
            | Node::ParallelBlock(_)
            | Node::HaloSpot(_)
            | Node::SyncSpot(_) => &["body"],
        }
    }

    /// Child nodes grouped by traversable field.
    pub fn children(&self) -> Vec<Vec<&Node>> {
        fn refs(nodes: &[Node]) -> Vec<&Node> {
            nodes.iter().collect()
        }
        match self {
            Node::List(l) | Node::Block(l) => vec![refs(&l.header), refs(&l.body), refs(&l.footer)],
            Node::Element(_)
            | Node::Expression(_)
            | Node::PointerCast(_)
            | Node::Dereference(_) => Vec::new(),
            Node::Call(c) => vec![c.nested()],
            Node::Iteration(i) => vec![refs(&i.nodes)],
            Node::ParallelIteration(p) => vec![refs(&p.iteration.nodes)],
            Node::While(w) => vec![refs(&w.body)],
            Node::Callable(c) => vec![refs(&c.body)],
            Node::Conditional(c) => vec![refs(&c.then_body), refs(&c.else_body)],
            Node::TimedList(t) => vec![refs(&t.body)],
            Node::Section(s) => vec![refs(&s.body)],
            Node::Lambda(l) => vec![refs(&l.body)],
            Node::ParallelTree(t) => vec![refs(&t.prefix), refs(&t.body)],
            Node::ParallelBlock(b) => vec![refs(&b.body)],
            Node::HaloSpot(h) => vec![refs(&h.body)],
            Node::SyncSpot(s) => vec![refs(&s.body)],
        }
    }

    /// Every construction field by name.
    pub fn args(&self) -> Args {
        let nodes = |n: &[Node]| Arg::Nodes(n.to_vec());
        let fields: Vec<(&'static str, Arg)> = match self {
            Node::List(l) | Node::Block(l) => vec![
                ("header", nodes(&l.header)),
                ("body", nodes(&l.body)),
                ("footer", nodes(&l.footer)),
            ],
            Node::Element(e) => vec![("element", Arg::Element(e.clone()))],
            Node::Expression(e) => vec![
                ("expr", Arg::Equation(e.expr.clone())),
                ("pragmas", Arg::Texts(e.pragmas.clone())),
                ("local", Arg::Flag(e.local)),
            ],
            Node::Call(c) => vec![
                ("name", Arg::Text(c.name.clone())),
                ("arguments", Arg::CallArgs(c.arguments.clone())),
                ("base", Arg::Symbol(c.base.clone())),
                ("retobj", Arg::OptExpr(c.retobj.clone())),
                ("is_indirect", Arg::Flag(c.is_indirect)),
            ],
            Node::Iteration(i) => iteration_args(i),
            Node::ParallelIteration(p) => {
                let mut fields = iteration_args(&p.iteration);
                fields.extend([
                    ("construct", Arg::Construct(p.construct)),
                    ("schedule", Arg::Schedule(p.schedule.clone())),
                    ("nthreads", Arg::Symbol(p.nthreads.clone())),
                    ("reductions", Arg::Reductions(p.reductions.clone())),
                ]);
                fields
            }
            Node::While(w) => vec![
                ("condition", Arg::Expr(w.condition.clone())),
                ("body", nodes(&w.body)),
            ],
            Node::Callable(c) => vec![
                ("name", Arg::Text(c.name.clone())),
                ("body", nodes(&c.body)),
                ("retval", Arg::Text(c.retval.clone())),
                ("parameters", Arg::Entities(c.parameters.clone())),
                ("prefix", Arg::Texts(c.prefix.clone())),
            ],
            Node::Conditional(c) => vec![
                ("condition", Arg::Expr(c.condition.clone())),
                ("then_body", nodes(&c.then_body)),
                ("else_body", nodes(&c.else_body)),
            ],
            Node::PointerCast(p) => vec![
                ("function", Arg::Function(p.function.clone())),
                ("obj", Arg::Symbol(p.obj.clone())),
                ("alignment", Arg::Flag(p.alignment)),
            ],
            Node::Dereference(d) => vec![
                ("pointee", Arg::Function(d.pointee.clone())),
                ("pointer", Arg::Function(d.pointer.clone())),
            ],
            Node::TimedList(t) => vec![
                ("timer", Arg::Text(t.timer.clone())),
                ("lname", Arg::Text(t.lname.clone())),
                ("body", nodes(&t.body)),
            ],
            Node::Section(s) => vec![
                ("name", Arg::Text(s.name.clone())),
                ("body", nodes(&s.body)),
                ("is_subsection", Arg::Flag(s.is_subsection)),
            ],
            Node::Lambda(l) => vec![
                ("body", nodes(&l.body)),
                ("captures", Arg::Texts(l.captures.clone())),
                ("parameters", Arg::Entities(l.parameters.clone())),
            ],
            Node::ParallelTree(t) => vec![
                ("prefix", nodes(&t.prefix)),
                ("body", nodes(&t.body)),
                ("nthreads", Arg::Symbol(t.nthreads.clone())),
            ],
            Node::ParallelBlock(b) => vec![
                ("body", nodes(&b.body)),
                ("private", Arg::Symbols(b.private.clone())),
            ],
            Node::HaloSpot(h) => vec![
                ("halo_scheme", Arg::Halo(h.scheme.clone())),
                ("body", nodes(&h.body)),
            ],
            Node::SyncSpot(s) => vec![
                ("sync_ops", Arg::SyncOps(s.sync_ops.clone())),
                ("body", nodes(&s.body)),
            ],
        };
        fields.into_iter().collect()
    }

    /// Construction fields that are not traversable.
    pub fn args_frozen(&self) -> Args {
        let traversable = self.traversable();
        let mut args = self.args();
        args.retain(|name, _| !traversable.contains(name));
        args
    }

    /// A copy of this node with its traversable fields replaced, positionally.
    /// Constructor checks run again on the new children.
    pub fn rebuild(&self, fields: Vec<Vec<Node>>) -> Result<Node> {
        let expected = self.traversable().len();
        if fields.len() != expected {
            return Err(Error::RebuildArity {
                node: self.kind_name(),
                expected,
                got: fields.len(),
            });
        }
        let mut fields = fields.into_iter();
        let mut next = move || fields.next().unwrap_or_default();
        let node = match self {
            Node::List(_) => Node::list_with(next(), next(), next()),
            Node::Block(_) => Node::block_with(next(), next(), next()),
            Node::Element(_)
            | Node::Expression(_)
            | Node::PointerCast(_)
            | Node::Dereference(_) => self.clone(),
            Node::Call(c) => Node::Call(c.with_nested(next())?),
            Node::Iteration(i) => Node::Iteration(i.with_nodes(next())),
            Node::ParallelIteration(p) => Node::ParallelIteration(p.with_nodes(next())),
            Node::While(w) => Node::While(While {
                body: next(),
                ..w.clone()
            }),
            Node::Callable(c) => Node::Callable(Callable {
                body: next(),
                ..c.clone()
            }),
            Node::Conditional(c) => Node::Conditional(Conditional {
                then_body: next(),
                else_body: next(),
                ..c.clone()
            }),
            Node::TimedList(t) => Node::TimedList(TimedList {
                body: next(),
                ..t.clone()
            }),
            Node::Section(s) => Node::Section(Section {
                body: next(),
                ..s.clone()
            }),
            Node::Lambda(l) => Node::Lambda(Lambda {
                body: next(),
                ..l.clone()
            }),
            Node::ParallelTree(t) => {
                Node::ParallelTree(ParallelTree::new(next(), next(), t.nthreads.clone())?)
            }
            Node::ParallelBlock(b) => {
                Node::ParallelBlock(ParallelBlock::new(next(), b.private.clone())?)
            }
            Node::HaloSpot(h) => Node::HaloSpot(HaloSpot::new(h.scheme.clone(), next())?),
            Node::SyncSpot(s) => Node::SyncSpot(SyncSpot {
                body: next(),
                ..s.clone()
            }),
        };
        Ok(node)
    }

    /// Rebuild with only the traversable field `name` replaced.
    pub fn rebuild_field(&self, name: &str, nodes: Vec<Node>) -> Result<Node> {
        let position = self
            .traversable()
            .iter()
            .position(|f| *f == name)
            .ok_or_else(|| Error::missing(self.kind_name(), name))?;
        let mut fields: Vec<Vec<Node>> = self
            .children()
            .into_iter()
            .map(|field| field.into_iter().cloned().collect())
            .collect();
        fields[position] = nodes;
        self.rebuild(fields)
    }

    /// Look up a construction field by name.
    pub fn arg(&self, name: &str) -> Result<Arg> {
        self.args()
            .swap_remove(name)
            .ok_or_else(|| Error::missing(self.kind_name(), name))
    }
}

fn iteration_args(i: &Iteration) -> Vec<(&'static str, Arg)> {
    vec![
        ("nodes", Arg::Nodes(i.nodes.clone())),
        ("dimension", Arg::Dimension(i.dim.clone())),
        (
            "limits",
            Arg::Limits(i.limits.0.clone(), i.limits.1.clone(), i.limits.2.clone()),
        ),
        ("direction", Arg::Direction(i.direction)),
        ("properties", Arg::Properties(i.properties.clone())),
        ("pragmas", Arg::Texts(i.pragmas.clone())),
        ("uindices", Arg::Dimensions(i.uindices.clone())),
    ]
}

// ─── Analyses ──────────────────────────────────────────────────────

impl Node {
    pub fn is_list(&self) -> bool {
        matches!(self, Node::List(_) | Node::Block(_))
    }

    /// The loop of an `Iteration` or `ParallelIteration`.
    pub fn as_iteration(&self) -> Option<&Iteration> {
        match self {
            Node::Iteration(i) => Some(i),
            Node::ParallelIteration(p) => Some(&p.iteration),
            _ => None,
        }
    }

    pub fn as_expression(&self) -> Option<&Expression> {
        match self {
            Node::Expression(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_partree(&self) -> Option<&ParallelTree> {
        match self {
            Node::ParallelTree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Node::Callable(c) => Some(c),
            _ => None,
        }
    }

    /// Grid-backed functions and arrays this node itself touches.
    pub fn functions(&self) -> Vec<Function> {
        match self {
            Node::Expression(e) => e.functions(),
            Node::Call(c) => c.functions(),
            Node::Callable(c) => c
                .parameters
                .iter()
                .filter_map(Entity::as_function)
                .cloned()
                .collect(),
            Node::PointerCast(p) => vec![p.function.clone()],
            Node::Dereference(d) => vec![d.pointee.clone(), d.pointer.clone()],
            Node::HaloSpot(h) => h.scheme.functions(),
            _ => Vec::new(),
        }
    }

    /// Symbols this node itself reads, excluding those of its children.
    pub fn free_symbols(&self) -> BTreeSet<Entity> {
        match self {
            Node::Expression(e) => e.expr.free_symbols(),
            Node::Call(c) => c.free_symbols(),
            Node::Iteration(i) => i.free_symbols(),
            Node::ParallelIteration(p) => {
                let mut out = p.iteration.free_symbols();
                if let Some(t) = &p.nthreads {
                    out.insert(Entity::Symbol(t.clone()));
                }
                if let Some(c) = p.schedule.as_ref().and_then(|s| s.chunk.as_ref()) {
                    out.extend(c.free_symbols());
                }
                out
            }
            Node::While(w) => w.condition.free_symbols(),
            Node::Conditional(c) => c.condition.free_symbols(),
            Node::PointerCast(p) => p.free_symbols(),
            Node::Dereference(d) => d.free_symbols(),
            Node::ParallelTree(t) => t
                .nthreads
                .iter()
                .cloned()
                .map(Entity::Symbol)
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Symbols this node brings into scope.
    pub fn defines(&self) -> Vec<Entity> {
        match self {
            Node::Expression(e) => e.defines(),
            Node::Call(c) => c.defines(),
            Node::Iteration(i) => i.defines(),
            Node::ParallelIteration(p) => p.iteration.defines(),
            Node::Callable(c) => c.parameters.clone(),
            Node::Lambda(l) => l.parameters.clone(),
            Node::PointerCast(p) => vec![Entity::Function(p.function.clone())],
            Node::Dereference(d) => vec![Entity::Function(d.pointee.clone())],
            _ => Vec::new(),
        }
    }

    /// The node as C.
    pub fn ccode(&self) -> String {
        codegen::ccode(self)
    }

    /// Content hash of the generated code.
    pub fn signature(&self) -> Signature {
        Signature::of(&self.ccode())
    }

    /// Short one-line description.
    pub fn repr(&self) -> String {
        codegen::repr(self)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind_name() == other.kind_name() && self.signature() == other.signature()
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind_name().hash(state);
        self.signature().hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ccode())
    }
}

// ─── Signature ─────────────────────────────────────────────────────

/// BLAKE3 digest of a node's generated code.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(pub [u8; 32]);

impl Signature {
    pub fn of(code: &str) -> Self {
        Signature(*blake3::hash(code.as_bytes()).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First 8 bytes as hex.
    pub fn to_short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_short())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_short())
    }
}

#[cfg(test)]
mod tests;

//! Generic walks over a node tree.

use std::collections::BTreeSet;

use super::nodes::{Expression, Iteration};
use super::Node;
use crate::error::Result;
use crate::symbolics::{Dimension, Entity, Function};

fn walk<'a>(node: &'a Node, visit: &mut impl FnMut(&'a Node)) {
    visit(node);
    for field in node.children() {
        for child in field {
            walk(child, visit);
        }
    }
}

/// Every node matching `pred`, pre-order.
pub fn find_nodes<'a>(root: &'a Node, pred: impl Fn(&Node) -> bool) -> Vec<&'a Node> {
    let mut out = Vec::new();
    walk(root, &mut |n| {
        if pred(n) {
            out.push(n);
        }
    });
    out
}

pub fn find_expressions(root: &Node) -> Vec<&Expression> {
    let mut out = Vec::new();
    walk(root, &mut |n| {
        if let Node::Expression(e) = n {
            out.push(e);
        }
    });
    out
}

/// Free symbols of every node in the tree.
pub fn find_symbols(root: &Node) -> BTreeSet<Entity> {
    let mut out = BTreeSet::new();
    walk(root, &mut |n| out.extend(n.free_symbols()));
    out
}

/// Everything any node in the tree defines.
pub fn find_defines(root: &Node) -> BTreeSet<Entity> {
    let mut out = BTreeSet::new();
    walk(root, &mut |n| out.extend(n.defines()));
    out
}

/// Parameters a callable wrapping `root` needs: the functions it touches,
/// then every other free symbol nothing in the tree defines.
pub fn derive_parameters(root: &Node) -> Vec<Entity> {
    let mut functions: Vec<Function> = Vec::new();
    walk(root, &mut |n| {
        for f in n.functions() {
            if !functions.contains(&f) {
                functions.push(f);
            }
        }
    });
    let defines = find_defines(root);
    // A local dereference defines its pointee; a cast does not count.
    let locals: BTreeSet<Function> = find_nodes(root, |n| matches!(n, Node::Dereference(_)))
        .into_iter()
        .flat_map(Node::defines)
        .filter_map(|e| e.as_function().cloned())
        .collect();
    functions.retain(|f| !locals.contains(f));
    functions.sort_by(|a, b| a.name().cmp(b.name()));

    let handles: BTreeSet<&str> = functions.iter().map(Function::name).collect();
    let mut others: Vec<Entity> = find_symbols(root)
        .into_iter()
        .filter(|e| match e {
            Entity::Function(_) => false,
            Entity::Symbol(s) => !defines.contains(e) && !is_handle(s.name(), &handles),
            Entity::Dimension(_) => !defines.contains(e),
        })
        .collect();
    others.sort_by(|a, b| a.name().cmp(b.name()));

    functions
        .into_iter()
        .map(Entity::Function)
        .chain(others)
        .collect()
}

fn is_handle(name: &str, functions: &BTreeSet<&str>) -> bool {
    name.strip_suffix("_vec")
        .is_some_and(|base| functions.contains(base))
}

// ─── Iteration trees ───────────────────────────────────────────────

/// A chain of nested loops, outermost first.
#[derive(Clone, Debug)]
pub struct IterationTree<'a>(Vec<&'a Iteration>);

impl<'a> IterationTree<'a> {
    pub fn root(&self) -> Option<&'a Iteration> {
        self.0.first().copied()
    }

    pub fn inner(&self) -> Option<&'a Iteration> {
        self.0.last().copied()
    }

    pub fn dimensions(&self) -> Vec<&'a Dimension> {
        self.0.iter().map(|i| i.dim()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Iteration> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Every maximal chain of nested loops.
pub fn retrieve_iteration_trees(root: &Node) -> Vec<IterationTree<'_>> {
    fn dfs<'a>(node: &'a Node, stack: &mut Vec<&'a Iteration>, out: &mut Vec<IterationTree<'a>>) {
        let pushed = match node.as_iteration() {
            Some(i) => {
                stack.push(i);
                true
            }
            None => false,
        };
        let before = out.len();
        for field in node.children() {
            for child in field {
                dfs(child, stack, out);
            }
        }
        if pushed {
            if out.len() == before {
                out.push(IterationTree(stack.clone()));
            }
            stack.pop();
        }
    }
    let mut out = Vec::new();
    dfs(root, &mut Vec::new(), &mut out);
    out
}

// ─── Rewriting ─────────────────────────────────────────────────────

/// Rebuild `root` bottom-up. Wherever `f` returns a node, that node replaces
/// the subtree; elsewhere children are transformed and the parent rebuilt.
pub fn transform(root: &Node, f: &mut dyn FnMut(&Node) -> Option<Node>) -> Result<Node> {
    if let Some(replacement) = f(root) {
        return Ok(replacement);
    }
    let mut fields = Vec::new();
    for field in root.children() {
        let mut nodes = Vec::with_capacity(field.len());
        for child in field {
            nodes.push(transform(child, f)?);
        }
        fields.push(nodes);
    }
    root.rebuild(fields)
}

/// Indented outline of the tree, one node per line.
pub fn print_ast(root: &Node) -> String {
    fn go(node: &Node, depth: usize, out: &mut Vec<String>) {
        let label = match node {
            Node::Expression(e) => format!("<Expression {}>", e.expr()),
            _ => node.repr(),
        };
        out.push(format!("{}{}", "  ".repeat(depth), label));
        for field in node.children() {
            for child in field {
                go(child, depth + 1, out);
            }
        }
    }
    let mut out = Vec::new();
    go(root, 0, &mut out);
    out.join("\n")
}

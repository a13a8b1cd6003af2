//! Simultaneous substitution.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use super::{Expr, ExprKind};

/// An insertion-ordered replacement map.
///
/// Applied simultaneously: replacements are not themselves rewritten.
#[derive(Clone, Debug, Default)]
pub struct Substitution(IndexMap<Expr, Expr>);

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, from: impl Into<Expr>, to: impl Into<Expr>) -> Self {
        self.insert(from, to);
        self
    }

    pub fn insert(&mut self, from: impl Into<Expr>, to: impl Into<Expr>) {
        self.0.insert(from.into(), to.into());
    }

    pub fn get(&self, from: &Expr) -> Option<&Expr> {
        self.0.get(from)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Expr, &Expr)> {
        self.0.iter()
    }
}

impl FromIterator<(Expr, Expr)> for Substitution {
    fn from_iter<I: IntoIterator<Item = (Expr, Expr)>>(iter: I) -> Self {
        Substitution(iter.into_iter().collect())
    }
}

impl PartialEq for Substitution {
    fn eq(&self, other: &Self) -> bool {
        self.0.iter().eq(other.0.iter())
    }
}

impl Eq for Substitution {}

impl Hash for Substitution {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for (k, v) in &self.0 {
            k.hash(state);
            v.hash(state);
        }
    }
}

impl PartialOrd for Substitution {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Substitution {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().cmp(other.0.iter())
    }
}

impl Expr {
    /// Replace every occurrence of a key of `rule`, top-down.
    ///
    /// Unevaluated derivatives do not rewrite their target: the rule is
    /// queued on the derivative and applied to the expanded stencil.
    pub fn xreplace(&self, rule: &Substitution) -> Expr {
        if rule.is_empty() {
            return self.clone();
        }
        if let Some(to) = rule.get(self) {
            return to.clone();
        }
        match self.kind() {
            ExprKind::Derivative(d) => Expr::derivative(d.with_subs(rule.clone())),
            _ => self.map_args(|e| e.xreplace(rule)),
        }
    }

    pub fn subs(&self, from: impl Into<Expr>, to: impl Into<Expr>) -> Expr {
        self.xreplace(&Substitution::new().with(from, to))
    }
}

//! Named derivative shortcuts (`dx`, `dx2`, `dxl`, `dt`, ...).
//!
//! Each function publishes a registry of the derivatives its
//! discretization supports. An expression's registry chains those of its
//! functions; the first function to publish a name wins.

use indexmap::IndexMap;

use super::{Derivative, Side};
use crate::error::{Error, Result};
use crate::symbolics::{Dimension, Expr, Function};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shortcut {
    pub dim: Dimension,
    pub deriv_order: u32,
    pub side: Side,
}

impl Shortcut {
    pub fn apply(&self, expr: &Expr) -> Result<Expr> {
        Derivative::builder(expr)
            .dim((self.dim.clone(), self.deriv_order))
            .side(self.side)
            .build()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Shortcuts(IndexMap<String, Shortcut>);

impl Shortcuts {
    pub fn for_function(f: &Function) -> Self {
        let mut map = IndexMap::new();
        if !f.is_differentiable() {
            return Shortcuts(map);
        }
        for d in f.dimensions() {
            let max_order = if d.is_time() {
                f.time_order()
            } else {
                f.space_order()
            };
            for order in 1..=max_order {
                let name = if order == 1 {
                    format!("d{}", d.name())
                } else {
                    format!("d{}{}", d.name(), order)
                };
                map.insert(
                    name,
                    Shortcut {
                        dim: d.clone(),
                        deriv_order: order,
                        side: Side::Centered,
                    },
                );
            }
            if max_order >= 1 {
                for (suffix, side) in [("l", Side::Left), ("r", Side::Right)] {
                    map.insert(
                        format!("d{}{}", d.name(), suffix),
                        Shortcut {
                            dim: d.clone(),
                            deriv_order: 1,
                            side,
                        },
                    );
                }
            }
        }
        Shortcuts(map)
    }

    pub fn for_expr(expr: &Expr) -> Self {
        let mut map = IndexMap::new();
        for f in expr.functions() {
            for (name, shortcut) in Self::for_function(f).0 {
                map.entry(name).or_insert(shortcut);
            }
        }
        Shortcuts(map)
    }

    pub fn get(&self, name: &str) -> Option<&Shortcut> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Expr {
    pub fn shortcuts(&self) -> Shortcuts {
        Shortcuts::for_expr(self)
    }

    /// Apply the named shortcut; an unknown name is a missing attribute.
    pub fn shortcut(&self, name: &str) -> Result<Expr> {
        match self.shortcuts().get(name) {
            Some(s) => s.apply(self),
            None => Err(Error::missing(self, name)),
        }
    }

    pub fn try_shortcut(&self, name: &str) -> Option<Expr> {
        self.shortcuts().get(name).and_then(|s| s.apply(self).ok())
    }

    fn space_dims(&self) -> Vec<Dimension> {
        self.dimensions().into_iter().filter(Dimension::is_space).collect()
    }

    /// Sum of second derivatives over the space dimensions.
    pub fn laplace(&self) -> Result<Expr> {
        let terms = self
            .space_dims()
            .iter()
            .map(|d| self.shortcut(&format!("d{}2", d.name())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::add(terms))
    }

    /// `sum_d d2/dd2 (weight * laplace(self))`.
    pub fn laplace2(&self, weight: &Expr) -> Result<Expr> {
        let inner = self.laplace()? * weight;
        let terms = self
            .space_dims()
            .iter()
            .map(|d| inner.shortcut(&format!("d{}2", d.name())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::add(terms))
    }

    /// Sum of first derivatives over the space dimensions.
    pub fn div(&self) -> Result<Expr> {
        let terms = self
            .space_dims()
            .iter()
            .map(|d| self.shortcut(&format!("d{}", d.name())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::add(terms))
    }
}

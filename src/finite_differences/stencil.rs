//! Stencil generators.
//!
//! Positions are measured in grid spacings relative to the dimension's
//! index. A target staggered by `σ` stores, at index `k`, the value living
//! at `k + σ`; a stencil point `p` therefore reads index `p - σ`, which is
//! always an integer by construction of the point sets below.

use std::collections::BTreeMap;

use super::{fornberg, Side, Transpose};
use crate::error::{Error, Result};
use crate::symbolics::{Dimension, Expr, Rational, Substitution};

/// Evaluation point per dimension. Missing entries mean the grid node.
pub type Origin = BTreeMap<Dimension, Expr>;

/// First derivative with a one-sided (or centered) stencil.
pub fn first_derivative(
    expr: &Expr,
    dim: &Dimension,
    fd_order: u32,
    side: Side,
    matvec: Transpose,
    x0: &Origin,
) -> Result<Expr> {
    make_derivative(expr, dim, fd_order, 1, side, matvec, x0)
}

/// Centered derivative of any order.
pub fn generic_derivative(
    expr: &Expr,
    dim: &Dimension,
    fd_order: u32,
    deriv_order: u32,
    matvec: Transpose,
    x0: &Origin,
) -> Result<Expr> {
    make_derivative(expr, dim, fd_order, deriv_order, Side::Centered, matvec, x0)
}

/// Mixed derivative: one centered stencil per dimension, applied in turn.
pub fn cross_derivative(
    expr: &Expr,
    dims: &[Dimension],
    fd_orders: &[u32],
    deriv_orders: &[u32],
    matvec: Transpose,
    x0: &Origin,
) -> Result<Expr> {
    if fd_orders.len() != dims.len() {
        return Err(Error::OrderArity {
            what: "fd_order",
            expected: dims.len(),
            got: fd_orders.len(),
        });
    }
    if deriv_orders.len() != dims.len() {
        return Err(Error::OrderArity {
            what: "deriv_order",
            expected: dims.len(),
            got: deriv_orders.len(),
        });
    }
    let mut out = expr.clone();
    for ((dim, &fd), &m) in dims.iter().zip(fd_orders).zip(deriv_orders) {
        out = generic_derivative(&out, dim, fd, m, matvec, x0)?;
    }
    Ok(out)
}

fn make_derivative(
    expr: &Expr,
    dim: &Dimension,
    fd_order: u32,
    deriv_order: u32,
    side: Side,
    matvec: Transpose,
    x0: &Origin,
) -> Result<Expr> {
    let origin = origin_offset(dim, x0)?;
    let stagger = stagger_of(expr, dim);
    let points = stencil_points(dim, fd_order, deriv_order, side, origin, stagger)?;
    let weights = fornberg(deriv_order as usize, &points, origin)?;
    tracing::trace!(
        dim = %dim,
        fd_order,
        deriv_order,
        %side,
        %matvec,
        points = points.len(),
        "expanding stencil"
    );

    let h = Expr::from(dim.spacing());
    let scale = h.pow(-i64::from(deriv_order));
    let terms = points
        .iter()
        .zip(&weights)
        .filter(|(_, w)| !w.is_zero())
        .map(|(p, w)| {
            let mut shift = *p - stagger;
            if matvec == Transpose::Adjoint {
                shift = -shift;
            }
            let rule = Substitution::new().with(dim, Expr::from(dim) + Expr::number(shift) * &h);
            Expr::mul([Expr::number(*w), scale.clone(), expr.xreplace(&rule)])
        })
        .collect::<Vec<_>>();
    Ok(Expr::add(terms))
}

/// Offset of the evaluation point from the grid node, in spacings.
pub(crate) fn origin_offset(dim: &Dimension, x0: &Origin) -> Result<Rational> {
    let Some(at) = x0.get(dim) else {
        return Ok(Rational::ZERO);
    };
    let unit = Substitution::new().with(dim.spacing(), 1);
    (at - Expr::from(dim))
        .xreplace(&unit)
        .as_number()
        .ok_or_else(|| Error::InvalidOrigin {
            dim: dim.name().to_string(),
            origin: at.to_string(),
        })
}

fn stagger_of(expr: &Expr, dim: &Dimension) -> Rational {
    expr.functions()
        .iter()
        .map(|f| f.stagger_offset(dim))
        .find(|s| !s.is_zero())
        .unwrap_or(Rational::ZERO)
}

/// Sample positions of the stencil, relative to the dimension's index.
pub fn stencil_points(
    dim: &Dimension,
    fd_order: u32,
    deriv_order: u32,
    side: Side,
    origin: Rational,
    stagger: Rational,
) -> Result<Vec<Rational>> {
    let misalign = origin - stagger;
    let half = if misalign.is_integer() {
        false
    } else if (misalign * Rational::integer(2)).is_integer() {
        true
    } else {
        return Err(Error::InvalidOrigin {
            dim: dim.name().to_string(),
            origin: origin.to_string(),
        });
    };

    let o = i64::from(fd_order);
    let m = i64::from(deriv_order);
    let at = |offset: Rational| origin + offset;
    let points = match side {
        Side::Centered if half => {
            let r = (o / 2).max((m + 2) / 2);
            (-r..r).map(|k| at(Rational::new(2 * k + 1, 2))).collect()
        }
        Side::Centered if o < 2 && m == 1 => vec![at(Rational::ZERO), at(Rational::ONE)],
        Side::Centered => {
            let r = (o / 2).max((m + 1) / 2);
            (-r..=r).map(|j| at(Rational::integer(j))).collect()
        }
        Side::Left | Side::Right => {
            let sign = if side == Side::Right { 1 } else { -1 };
            let start = if half { Rational::new(-1, 2) } else { Rational::ZERO };
            (0..=o.max(m))
                .map(|j| at(Rational::integer(sign) * (start + Rational::integer(j))))
                .collect()
        }
    };
    Ok(points)
}

//! Finite-difference discretization of derivatives.
//!
//! [`Derivative`] is the unevaluated request; the functions in [`stencil`]
//! turn one into an explicit weighted sum of shifted accesses.

pub mod derivative;
pub mod shortcuts;
pub mod stencil;
pub mod weights;

use std::fmt;

pub use derivative::{DerivativeBuilder, Derivative, DimSpec, OrderSpec};
pub use shortcuts::{Shortcut, Shortcuts};
pub use stencil::{cross_derivative, first_derivative, generic_derivative, Origin};
pub use weights::fornberg;

/// Which neighbours a stencil reaches for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    #[default]
    Centered,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Left => "left",
            Side::Centered => "centered",
            Side::Right => "right",
        })
    }
}

/// Whether a stencil is applied as is or as its adjoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transpose {
    #[default]
    Direct,
    Adjoint,
}

impl Transpose {
    pub fn flipped(self) -> Self {
        match self {
            Transpose::Direct => Transpose::Adjoint,
            Transpose::Adjoint => Transpose::Direct,
        }
    }
}

impl fmt::Display for Transpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transpose::Direct => "direct",
            Transpose::Adjoint => "adjoint",
        })
    }
}

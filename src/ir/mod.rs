//! Intermediate representations below the symbolic layer.
//!
//! [`equations`] holds equations after derivative expansion and
//! indexification, [`dependence`] analyses their accesses, and [`iet`] is the
//! loop-nest tree they are scheduled into.

pub mod dependence;
pub mod equations;
pub mod iet;

pub use equations::{Access, AccessMode, AugOp, LoweredEq, Offset};

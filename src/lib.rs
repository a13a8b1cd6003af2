//! Differentiable symbolic stencil expressions, finite-difference
//! discretization, and an imperative loop-nest IR that prints as C.

pub mod api;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod finite_differences;
pub mod ir;
pub mod symbolics;
pub mod vector;

// Re-exports — the common path from equations to a kernel
pub use api::{LoweredKernel, Session};
pub use config::{GridPolicy, Language, Options};
pub use diagnostic::{render_diagnostics, Diagnostic};
pub use error::{Error, Result};
pub use finite_differences::{Derivative, DimSpec};
pub use ir::iet::{print_ast, Node};
pub use ir::LoweredEq;
pub use symbolics::{
    DataType, Dimension, Entity, Equation, Expr, Function, FunctionSpec, Grid, Symbol,
    SymbolRegistry,
};
pub use vector::VectorFunction;

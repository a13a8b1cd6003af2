//! Typed failures raised while building expressions, derivatives and IET nodes.
//!
//! Construction checks fail fast with one of these variants. The lowering
//! driver attaches the originating equation and turns them into
//! [`Diagnostic`](crate::diagnostic::Diagnostic)s.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ─── Invalid construction requests ───
    #[error("expected at least one dimension to differentiate against")]
    NoDimensions,

    #[error(
        "two different values of `deriv_order`: {given} in the dimension spec and {keyword} as keyword"
    )]
    ConflictingDerivOrder { given: u32, keyword: u32 },

    #[error("`{expr}` is not differentiable: it references no grid-backed function")]
    NotDifferentiable { expr: String },

    #[error("expected {expected} {what} value(s), got {got}")]
    OrderArity {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("derivative order along `{dim}` must be at least 1")]
    ZeroDerivOrder { dim: String },

    #[error("evaluation origin `{origin}` is not an offset of dimension `{dim}`")]
    InvalidOrigin { dim: String, origin: String },

    #[error("finite-difference weights of order {deriv_order} over {points} points overflow exact arithmetic")]
    WeightOverflow { deriv_order: usize, points: usize },

    #[error("`{expr}` still contains an unevaluated derivative")]
    UnexpandedDerivative { expr: String },

    #[error("`{target}` cannot be assigned to")]
    InvalidTarget { target: String },

    // ─── Ambiguous grid resolution (strict policy only) ───
    #[error("expression spans {} distinct grids: {}", grids.len(), grids.join(", "))]
    MultipleGrids { grids: Vec<String> },

    // ─── Structural invariants of the IET ───
    #[error("index `{index}` does not derive from loop dimension `{dim}`")]
    UnboundIndex { index: String, dim: String },

    #[error("malformed {node} body: {reason}")]
    MalformedBody { node: &'static str, reason: String },

    #[error("{node} has {expected} traversable field(s), got {got}")]
    RebuildArity {
        node: &'static str,
        expected: usize,
        got: usize,
    },

    // ─── Lookup misses ───
    #[error("`{owner}` has no attribute `{name}`")]
    MissingAttribute { owner: String, name: String },
}

impl Error {
    /// Lookup misses are recoverable probes, everything else is a caller bug.
    pub fn is_missing_attribute(&self) -> bool {
        matches!(self, Error::MissingAttribute { .. })
    }

    pub(crate) fn missing(owner: impl ToString, name: impl ToString) -> Self {
        Error::MissingAttribute {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn malformed(node: &'static str, reason: impl Into<String>) -> Self {
        Error::MalformedBody {
            node,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_order_reports_both_values() {
        let err = Error::ConflictingDerivOrder {
            given: 2,
            keyword: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains('2'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_missing_attribute_is_distinguishable() {
        assert!(Error::missing("f", "dq").is_missing_attribute());
        assert!(!Error::NoDimensions.is_missing_attribute());
    }

    #[test]
    fn test_multiple_grids_lists_names() {
        let err = Error::MultipleGrids {
            grids: vec!["g0".into(), "g1".into()],
        };
        assert_eq!(err.to_string(), "expression spans 2 distinct grids: g0, g1");
    }
}

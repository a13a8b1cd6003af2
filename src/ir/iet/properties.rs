//! Loop annotations.

use std::fmt;

/// What is known about an iteration space. A set of these decorates every
/// `Iteration`; the derived ordering is the order they print in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    Sequential,
    Parallel,
    /// Parallel provided that updates of shared data are atomic.
    ParallelIfAtomic,
    /// Parallel provided that some temporaries are privatized.
    ParallelIfPrivate,
    Vectorized,
    Affine,
    /// Head of a nest of `n` loops collapsed into one parallel space.
    Collapsed(u32),
}

impl Property {
    pub fn is_parallel(self) -> bool {
        matches!(
            self,
            Property::Parallel | Property::ParallelIfAtomic | Property::ParallelIfPrivate
        )
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Sequential => f.write_str("sequential"),
            Property::Parallel => f.write_str("parallel"),
            Property::ParallelIfAtomic => f.write_str("parallel_if_atomic"),
            Property::ParallelIfPrivate => f.write_str("parallel_if_private"),
            Property::Vectorized => f.write_str("vector-dim"),
            Property::Affine => f.write_str("affine"),
            Property::Collapsed(n) => write!(f, "collapsed[{}]", n),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Forward => "++",
            Direction::Backward => "--",
        })
    }
}

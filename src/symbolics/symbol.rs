use std::fmt;
use std::sync::Arc;

/// Element type of a scalar symbol or a grid-backed buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Int32,
    Float32,
    Float64,
}

impl DataType {
    pub fn ctype(self) -> &'static str {
        match self {
            DataType::Int32 => "int",
            DataType::Float32 => "float",
            DataType::Float64 => "double",
        }
    }

    /// Literal suffix for floating constants (`1.0F`).
    pub fn literal_suffix(self) -> &'static str {
        match self {
            DataType::Float32 => "F",
            DataType::Int32 | DataType::Float64 => "",
        }
    }
}

/// A named scalar: grid spacings, loop bounds, thread counts, temporaries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    name: Arc<str>,
    dtype: DataType,
}

impl Symbol {
    pub fn new(name: impl AsRef<str>, dtype: DataType) -> Self {
        Symbol {
            name: Arc::from(name.as_ref()),
            dtype,
        }
    }

    pub fn int(name: impl AsRef<str>) -> Self {
        Self::new(name, DataType::Int32)
    }

    pub fn float(name: impl AsRef<str>) -> Self {
        Self::new(name, DataType::Float32)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

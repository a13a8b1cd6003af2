//! Session-owned cache of named entities.
//!
//! A request for an entity with the same name and the same defining
//! parameters returns the instance built the first time; a request that
//! differs in any parameter builds a distinct instance. Nothing is evicted:
//! the registry lives exactly as long as the session that owns it.

use std::collections::HashMap;

use super::{Function, FunctionSpec, Grid};

#[derive(Default)]
pub struct SymbolRegistry {
    grids: HashMap<(String, Vec<usize>), Grid>,
    functions: HashMap<FunctionSpec, Function>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(&mut self, name: &str, shape: &[usize]) -> Grid {
        self.grids
            .entry((name.to_string(), shape.to_vec()))
            .or_insert_with(|| {
                tracing::debug!(grid = name, ?shape, "registered grid");
                Grid::new(name, shape)
            })
            .clone()
    }

    pub fn function(&mut self, spec: FunctionSpec) -> Function {
        if let Some(f) = self.functions.get(&spec) {
            return f.clone();
        }
        tracing::debug!(
            function = %spec.name,
            kind = ?spec.kind,
            space_order = spec.space_order,
            time_order = spec.time_order,
            "registered function"
        );
        let f = Function::new(spec.clone());
        self.functions.insert(spec, f.clone());
        f
    }

    /// Every registered function called `name`, in no particular order.
    pub fn functions_named(&self, name: &str) -> Vec<Function> {
        self.functions
            .values()
            .filter(|f| f.name() == name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

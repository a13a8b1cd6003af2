//! Halo-exchange descriptors.
//!
//! A [`HaloScheme`] says which functions need their boundary regions
//! refreshed, how wide those regions are along each dimension, and at which
//! index of the non-halo dimensions (typically time) the exchange happens.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexMap;

use crate::ir::equations::{LoweredEq, Offset};
use crate::symbolics::{Dimension, Entity, Expr, Function};

/// Halo extent on each side of a dimension, in grid points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct HaloWidth {
    pub left: u32,
    pub right: u32,
}

impl HaloWidth {
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0
    }

    fn merge(self, other: HaloWidth) -> HaloWidth {
        HaloWidth {
            left: self.left.max(other.left),
            right: self.right.max(other.right),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HaloEntry {
    pub halos: BTreeMap<Dimension, HaloWidth>,
    pub loc_indices: BTreeMap<Dimension, Expr>,
}

impl HaloEntry {
    fn merge(&mut self, other: &HaloEntry) {
        for (d, w) in &other.halos {
            let slot = self.halos.entry(d.clone()).or_default();
            *slot = slot.merge(*w);
        }
        for (d, at) in &other.loc_indices {
            self.loc_indices.entry(d.clone()).or_insert_with(|| at.clone());
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HaloScheme {
    fmapper: IndexMap<Function, HaloEntry>,
}

impl HaloScheme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, function: Function, entry: HaloEntry) -> Self {
        self.fmapper.entry(function).or_default().merge(&entry);
        self
    }

    /// Halos required by the stencil reads of `eqs`. Local arrays never
    /// need an exchange.
    pub fn from_equations(eqs: &[LoweredEq]) -> Self {
        let mut scheme = HaloScheme::new();
        for eq in eqs {
            for access in eq.accesses() {
                if access.mode.is_write() || access.function.grid().is_none() {
                    continue;
                }
                let mut entry = HaloEntry::default();
                for (d, index) in access.function.dimensions().iter().zip(&access.indices) {
                    if d.is_time() {
                        entry.loc_indices.insert(d.clone(), index.clone());
                        continue;
                    }
                    if let Offset::Affine(k) = access.offset(d) {
                        let width = HaloWidth {
                            left: u32::try_from(-k).unwrap_or(0),
                            right: u32::try_from(k).unwrap_or(0),
                        };
                        if !width.is_empty() {
                            entry.halos.insert(d.clone(), width);
                        }
                    }
                }
                if !entry.halos.is_empty() {
                    scheme = scheme.with(access.function.clone(), entry);
                }
            }
        }
        scheme
    }

    pub fn get(&self, function: &Function) -> Option<&HaloEntry> {
        self.fmapper.get(function)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Function, &HaloEntry)> {
        self.fmapper.iter()
    }

    pub fn functions(&self) -> Vec<Function> {
        self.fmapper.keys().cloned().collect()
    }

    /// Dimensions along which some function has a non-empty halo.
    pub fn dimensions(&self) -> Vec<Dimension> {
        let mut dims: Vec<Dimension> = Vec::new();
        for entry in self.fmapper.values() {
            for d in entry.halos.keys() {
                if !dims.contains(d) {
                    dims.push(d.clone());
                }
            }
        }
        dims
    }

    /// Everything the exchange needs at run time.
    pub fn arguments(&self) -> BTreeSet<Entity> {
        let mut out = BTreeSet::new();
        for (f, entry) in &self.fmapper {
            out.insert(Entity::Function(f.clone()));
            out.extend(entry.halos.keys().cloned().map(Entity::Dimension));
            for at in entry.loc_indices.values() {
                out.extend(at.free_symbols());
            }
        }
        out
    }

    pub fn union(&self, other: &HaloScheme) -> HaloScheme {
        other
            .fmapper
            .iter()
            .fold(self.clone(), |acc, (f, e)| acc.with(f.clone(), e.clone()))
    }

    pub fn len(&self) -> usize {
        self.fmapper.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fmapper.is_empty()
    }
}

impl fmt::Display for HaloScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fmapper
            .iter()
            .map(|(func, entry)| {
                let halos: Vec<String> = entry
                    .halos
                    .iter()
                    .map(|(d, w)| format!("{}:({},{})", d, w.left, w.right))
                    .collect();
                format!("{}[{}]", func, halos.join(", "))
            })
            .collect();
        write!(f, "haloupdate({})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolics::{Equation, FunctionSpec, SymbolRegistry};

    #[test]
    fn test_halo_widths_follow_stencil_reach() {
        let mut registry = SymbolRegistry::new();
        let grid = registry.grid("grid", &[8, 8]);
        let u = registry.function(FunctionSpec::time_function("u", &grid).space_order(4));
        let lap = u.access().laplace().unwrap();
        let eq = Equation::new(u.forward().unwrap(), u.access() + lap);
        let lowered = LoweredEq::lower(&eq).unwrap();

        let scheme = HaloScheme::from_equations(&[lowered]);
        assert_eq!(scheme.len(), 1);
        let entry = scheme.get(&u).unwrap();
        let x = &grid.dimensions()[0];
        assert_eq!(entry.halos[x], HaloWidth { left: 2, right: 2 });
        assert_eq!(scheme.dimensions().len(), 2);
        assert_eq!(entry.loc_indices[grid.time_dim()], Expr::from(grid.time_dim()));
        assert!(scheme.arguments().contains(&Entity::Function(u.clone())));
    }

    #[test]
    fn test_pointwise_reads_need_no_exchange() {
        let mut registry = SymbolRegistry::new();
        let grid = registry.grid("grid", &[8]);
        let u = registry.function(FunctionSpec::function("u", &grid));
        let v = registry.function(FunctionSpec::function("v", &grid));
        let eq = LoweredEq::lower(&Equation::new(u.access(), v.access() * 2)).unwrap();
        assert!(HaloScheme::from_equations(&[eq]).is_empty());
    }

    #[test]
    fn test_union_keeps_the_widest_halo() {
        let mut registry = SymbolRegistry::new();
        let grid = registry.grid("grid", &[8]);
        let x = grid.dimensions()[0].clone();
        let u = registry.function(FunctionSpec::function("u", &grid));
        let narrow = HaloEntry {
            halos: BTreeMap::from([(x.clone(), HaloWidth { left: 1, right: 2 })]),
            loc_indices: BTreeMap::new(),
        };
        let wide = HaloEntry {
            halos: BTreeMap::from([(x.clone(), HaloWidth { left: 3, right: 0 })]),
            loc_indices: BTreeMap::new(),
        };
        let a = HaloScheme::new().with(u.clone(), narrow);
        let b = HaloScheme::new().with(u.clone(), wide);
        let merged = a.union(&b);
        assert_eq!(merged.get(&u).unwrap().halos[&x], HaloWidth { left: 3, right: 2 });
        assert_eq!(merged.to_string(), "haloupdate(u[x:(3,2)])");
    }
}

//! Vector-valued fields: one scalar component per space dimension.

use std::fmt;
use std::ops::Index;

use crate::error::{Error, Result};
use crate::symbolics::{Dimension, Expr, FunctionSpec, Grid, SymbolRegistry};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VectorFunction {
    name: String,
    dims: Vec<Dimension>,
    components: Vec<Expr>,
}

impl VectorFunction {
    /// One component per space dimension of `spec`'s grid, named
    /// `<name>_<dim>`, each sharing the rest of `spec`.
    pub fn new(registry: &mut SymbolRegistry, spec: FunctionSpec) -> Result<Self> {
        let grid = spec.grid.clone().ok_or_else(|| Error::NotDifferentiable {
            expr: spec.name.clone(),
        })?;
        let components = grid
            .dimensions()
            .iter()
            .map(|d| {
                let component = spec
                    .clone()
                    .renamed(format!("{}_{}", spec.name, d.name()))
                    .component_of(&spec.name);
                registry.function(component).access()
            })
            .collect();
        Ok(VectorFunction {
            name: spec.name,
            dims: grid.dimensions().to_vec(),
            components,
        })
    }

    /// Wrap existing components; component `i` pairs with `grid`'s `i`-th
    /// space dimension.
    pub fn from_components(name: impl Into<String>, grid: &Grid, components: Vec<Expr>) -> Result<Self> {
        if components.len() != grid.ndim() {
            return Err(Error::OrderArity {
                what: "vector component",
                expected: grid.ndim(),
                got: components.len(),
            });
        }
        Ok(VectorFunction {
            name: name.into(),
            dims: grid.dimensions().to_vec(),
            components,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> &[Expr] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expr> {
        self.components.iter()
    }

    fn map(&self, f: impl FnMut(&Expr) -> Result<Expr>) -> Result<VectorFunction> {
        Ok(VectorFunction {
            name: self.name.clone(),
            dims: self.dims.clone(),
            components: self.components.iter().map(f).collect::<Result<_>>()?,
        })
    }

    /// Apply a shortcut known to the first component to every component.
    pub fn shortcut(&self, name: &str) -> Result<VectorFunction> {
        let known = self
            .components
            .first()
            .is_some_and(|c| c.shortcuts().get(name).is_some());
        if !known {
            return Err(Error::missing(&self.name, name));
        }
        self.map(|c| c.shortcut(name))
    }

    pub fn try_shortcut(&self, name: &str) -> Option<VectorFunction> {
        self.shortcut(name).ok()
    }

    /// Sum of each component's derivative along its own dimension.
    pub fn div(&self) -> Result<Expr> {
        let terms = self
            .components
            .iter()
            .zip(&self.dims)
            .map(|(c, d)| c.shortcut(&format!("d{}", d.name())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::add(terms))
    }

    /// Component-wise Laplacian.
    pub fn laplace(&self) -> Result<VectorFunction> {
        self.map(Expr::laplace)
    }

    pub fn evaluate(&self) -> Result<VectorFunction> {
        self.map(Expr::evaluate)
    }
}

impl Index<usize> for VectorFunction {
    type Output = Expr;

    fn index(&self, i: usize) -> &Expr {
        &self.components[i]
    }
}

impl fmt::Display for VectorFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector(")?;
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", c)?;
        }
        f.write_str(")")
    }
}

impl Expr {
    /// First derivatives along each space dimension, as a vector.
    pub fn grad(&self) -> Result<VectorFunction> {
        let grid = self.grid().ok_or_else(|| Error::NotDifferentiable {
            expr: self.to_string(),
        })?;
        let components = grid
            .dimensions()
            .iter()
            .map(|d| self.shortcut(&format!("d{}", d.name())))
            .collect::<Result<Vec<_>>>()?;
        VectorFunction::from_components(format!("grad_{}", self.name()), &grid, components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finite_differences::Derivative;

    fn setup() -> (SymbolRegistry, Grid) {
        let mut registry = SymbolRegistry::new();
        let grid = registry.grid("grid", &[11, 11]);
        (registry, grid)
    }

    #[test]
    fn test_components_follow_space_dimensions() {
        let (mut registry, grid) = setup();
        let v = VectorFunction::new(&mut registry, FunctionSpec::function("v", &grid).space_order(2))
            .unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].name(), "v_x");
        assert_eq!(v[1].name(), "v_y");
        assert!(v[0].is_vector_valued());
        assert_eq!(v[1].space_order(), crate::symbolics::Order::Finite(2));
    }

    #[test]
    fn test_components_are_canonical() {
        let (mut registry, grid) = setup();
        let spec = FunctionSpec::function("v", &grid).space_order(2);
        let a = VectorFunction::new(&mut registry, spec.clone()).unwrap();
        let b = VectorFunction::new(&mut registry, spec).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_broadcast_shortcut() {
        let (mut registry, grid) = setup();
        let v = VectorFunction::new(&mut registry, FunctionSpec::function("v", &grid).space_order(2))
            .unwrap();
        let dx = v.shortcut("dx").unwrap();
        assert_eq!(dx.len(), v.len());
        let x = &grid.dimensions()[0];
        for (out, comp) in dx.iter().zip(v.iter()) {
            assert_eq!(*out, Derivative::new(comp, [x]).unwrap());
        }
    }

    #[test]
    fn test_unknown_shortcut_is_missing_attribute() {
        let (mut registry, grid) = setup();
        let v = VectorFunction::new(&mut registry, FunctionSpec::function("v", &grid)).unwrap();
        let err = v.shortcut("dq").unwrap_err();
        assert!(err.is_missing_attribute());
        assert!(v.try_shortcut("dx3").is_none());
    }

    #[test]
    fn test_div_pairs_components_with_dimensions() {
        let (mut registry, grid) = setup();
        let v = VectorFunction::new(&mut registry, FunctionSpec::function("v", &grid).space_order(2))
            .unwrap();
        let (x, y) = (&grid.dimensions()[0], &grid.dimensions()[1]);
        let expected = Derivative::new(&v[0], [x]).unwrap() + Derivative::new(&v[1], [y]).unwrap();
        assert_eq!(v.div().unwrap(), expected);
    }

    #[test]
    fn test_grad_builds_first_derivatives() {
        let (mut registry, grid) = setup();
        let f = registry
            .function(FunctionSpec::function("f", &grid).space_order(2))
            .access();
        let g = f.grad().unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(g[0], f.shortcut("dx").unwrap());
        assert!(g[1].has_derivative());
    }

    #[test]
    fn test_evaluate_expands_every_component() {
        let (mut registry, grid) = setup();
        let v = VectorFunction::new(&mut registry, FunctionSpec::function("v", &grid).space_order(2))
            .unwrap();
        let e = v.shortcut("dx2").unwrap().evaluate().unwrap();
        assert!(e.iter().all(|c| !c.has_derivative()));
    }

    #[test]
    fn test_new_requires_a_grid() {
        let mut registry = SymbolRegistry::new();
        let x = Dimension::space("x");
        let spec = FunctionSpec::array("a", &[x], vec![Expr::from(4)]);
        assert!(VectorFunction::new(&mut registry, spec).is_err());
    }
}

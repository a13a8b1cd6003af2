use super::*;

fn setup(shape: &[usize]) -> (SymbolRegistry, Grid) {
    let mut registry = SymbolRegistry::new();
    let grid = registry.grid("grid", shape);
    (registry, grid)
}

fn field(registry: &mut SymbolRegistry, grid: &Grid, name: &str, so: u32) -> Expr {
    registry
        .function(FunctionSpec::function(name, grid).space_order(so))
        .access()
}

// ─── Metadata propagation ──────────────────────────────────────────

#[test]
fn test_space_order_takes_minimum() {
    let (mut reg, grid) = setup(&[8, 8]);
    let f = field(&mut reg, &grid, "f", 2);
    let g = field(&mut reg, &grid, "g", 4);
    assert_eq!((&f + &g).space_order(), Order::Finite(2));
    assert_eq!((&f * &g).space_order(), Order::Finite(2));
    assert_eq!(g.space_order(), Order::Finite(4));
}

#[test]
fn test_no_differentiable_children_is_infinite() {
    let e: Expr = Expr::from(Symbol::float("a")) * 3 + Expr::from(Symbol::float("b"));
    assert_eq!(e.space_order(), Order::Infinite);
    assert_eq!(e.time_order(), Order::Infinite);
    assert!(e.functions().is_empty());
}

#[test]
fn test_flags_and_indices_propagate() {
    let (mut reg, grid) = setup(&[8, 8]);
    let u = reg
        .function(FunctionSpec::time_function("u", &grid).time_order(2))
        .access();
    let s = reg
        .function(FunctionSpec::function("s", &grid).staggered(&grid.dimensions()[..1]))
        .access();
    let e = &u * &s;
    assert!(e.is_time_dependent());
    assert!(e.is_staggered());
    assert!(!e.is_vector_valued());
    let names: Vec<String> = e.indices().iter().map(|d| d.name().to_string()).collect();
    assert_eq!(names, vec!["t", "x", "y"]);
    assert_eq!(e.time_order(), Order::Finite(2));
}

#[test]
fn test_first_found_grid_and_conflict() {
    let mut reg = SymbolRegistry::new();
    let g0 = reg.grid("g0", &[4]);
    let g1 = reg.grid("g1", &[4]);
    let a = field(&mut reg, &g0, "a", 2);
    let b = field(&mut reg, &g1, "b", 2);
    let e = &a + &b;
    assert_eq!(e.grid(), Some(g0.clone()));
    match e.grid_conflict() {
        Some(crate::error::Error::MultipleGrids { grids }) => assert_eq!(grids, vec!["g0", "g1"]),
        other => panic!("expected a grid conflict, got {:?}", other),
    }
    assert!(a.grid_conflict().is_none());
}

// ─── Family closure and canonical form ─────────────────────────────

#[test]
fn test_sum_collapsing_to_product_keeps_metadata() {
    let (mut reg, grid) = setup(&[8]);
    let f = field(&mut reg, &grid, "f", 4);
    let twice = &f + &f;
    assert!(matches!(twice.kind(), ExprKind::Mul(_)));
    assert_eq!(twice.space_order(), Order::Finite(4));
    assert_eq!(twice.functions().len(), 1);
}

#[test]
fn test_product_collapsing_to_power_keeps_metadata() {
    let (mut reg, grid) = setup(&[8]);
    let f = field(&mut reg, &grid, "f", 4);
    let sq = &f * &f;
    assert!(matches!(sq.kind(), ExprKind::Pow(..)));
    assert_eq!(sq.space_order(), Order::Finite(4));
    assert_eq!(sq, f.pow(2));
}

#[test]
fn test_scaled_sum_distributes() {
    let (mut reg, grid) = setup(&[8]);
    let f = field(&mut reg, &grid, "f", 2);
    let g = field(&mut reg, &grid, "g", 2);
    let e: Expr = (&f + &g) * 2;
    assert!(matches!(e.kind(), ExprKind::Add(_)));
    assert_eq!(e, &f * 2 + &g * 2);
}

#[test]
fn test_every_operator_stays_in_family() {
    let (mut reg, grid) = setup(&[8]);
    let a = field(&mut reg, &grid, "a", 2);
    let b = field(&mut reg, &grid, "b", 4);
    for e in [&a + &b, &a - &b, &a * &b, a.pow(b.clone()), &a % &b, &a / &b, -&a, a.floordiv(&b)] {
        assert_eq!(e.space_order(), Order::Finite(2), "{}", e);
        assert_eq!(e.functions().len(), if e == -&a { 1 } else { 2 });
    }
}

#[test]
fn test_cancellation() {
    let (mut reg, grid) = setup(&[8]);
    let f = field(&mut reg, &grid, "f", 2);
    assert!((&f - &f).is_zero());
    assert!((&f / &f).is_one());
    let h = Expr::from(grid.dimensions()[0].spacing());
    assert!((&h * h.pow(-1)).is_one());
}

#[test]
fn test_commutativity_is_canonical() {
    let (mut reg, grid) = setup(&[8]);
    let a = field(&mut reg, &grid, "a", 2);
    let b = field(&mut reg, &grid, "b", 2);
    assert_eq!(&a + &b, &b + &a);
    assert_eq!(&a * &b, &b * &a);
    assert_eq!((&a + 1) + (&b + 2), Expr::from(3) + &b + &a);
}

#[test]
fn test_equality_includes_discretization_state() {
    let grid = Grid::new("grid", &[8]);
    let lo = Function::new(FunctionSpec::function("f", &grid).space_order(2)).access();
    let hi = Function::new(FunctionSpec::function("f", &grid).space_order(4)).access();
    assert_eq!(lo.to_string(), hi.to_string());
    assert_ne!(lo, hi);
}

#[test]
fn test_grids_order_by_name_shape_then_creation() {
    let wide = Grid::new("g", &[8, 8]);
    let narrow = Grid::new("g", &[4, 8]);
    let first = Grid::new("h", &[4]);
    let second = Grid::new("h", &[4]);
    assert!(narrow < wide);
    assert!(wide < first);
    assert!(first < second);
    assert_eq!(first.cmp(&first.clone()), std::cmp::Ordering::Equal);
    assert_ne!(first, second);

    let mut grids = vec![second.clone(), wide.clone(), first.clone(), narrow.clone()];
    grids.sort();
    assert_eq!(grids, vec![narrow, wide, first, second]);
}

#[test]
fn test_number_folding() {
    assert_eq!(Expr::from(7).modulo(3), Expr::from(1));
    assert_eq!(Expr::from(-7).modulo(3), Expr::from(2));
    assert_eq!(Expr::from(7).floordiv(2), Expr::from(3));
    assert_eq!(Expr::from(2).pow(-2), Expr::rational(1, 4));
    let x = Expr::from(Dimension::space("x"));
    assert!(x.modulo(x.clone()).is_zero());
    assert_eq!(x.floor(), x);
}

#[test]
fn test_large_constants_do_not_wrap() {
    let big = Expr::number(i64::MAX) + 1i64;
    assert_eq!(big.to_string(), "9223372036854775808");
    assert!(big.as_number().is_some_and(|r| r > Rational::integer(i64::MAX)));
    assert!(matches!(Expr::from(10).pow(40).kind(), ExprKind::Pow(..)));
}

#[test]
fn test_expand_distributes() {
    let a = Expr::from(Symbol::float("a"));
    let b = Expr::from(Symbol::float("b"));
    let product = (&a + &b) * (&a - &b);
    assert!(matches!(product.kind(), ExprKind::Mul(_)));
    assert_eq!(product.expand(), a.pow(2) - b.pow(2));
    assert_eq!((&a + &b).pow(2).expand(), a.pow(2) + &a * &b * 2 + b.pow(2));
}

#[test]
fn test_display() {
    let (mut reg, grid) = setup(&[8]);
    let u = field(&mut reg, &grid, "u", 2);
    let v = field(&mut reg, &grid, "v", 2);
    assert_eq!((&u - &v * 2i64).to_string(), "u(x) - 2*v(x)");
    let h = Expr::from(grid.dimensions()[0].spacing());
    assert_eq!((&u * h.pow(-2)).to_string(), "u(x)*h_x**(-2)");
    let x = Expr::from(&grid.dimensions()[0]);
    assert_eq!((x - 1i64).to_string(), "x - 1");
}

// ─── Substitution ──────────────────────────────────────────────────

#[test]
fn test_xreplace_is_simultaneous() {
    let a = Expr::from(Symbol::float("a"));
    let b = Expr::from(Symbol::float("b"));
    let rule = Substitution::new().with(a.clone(), b.clone()).with(b.clone(), a.clone());
    let e: Expr = &a - &b * 2;
    assert_eq!(e.xreplace(&rule), &b - &a * 2);
}

#[test]
fn test_xreplace_shifts_indices() {
    let (mut reg, grid) = setup(&[8]);
    let x = grid.dimensions()[0].clone();
    let f = reg.function(FunctionSpec::function("f", &grid).space_order(2));
    let h = Expr::from(x.spacing());
    let shifted = f.access().subs(&x, Expr::from(&x) + &h);
    assert_eq!(shifted, f.at(vec![Expr::from(&x) + &h]));
}

#[test]
fn test_indexify_turns_spacings_into_offsets() {
    let (mut reg, grid) = setup(&[8]);
    let u = reg.function(FunctionSpec::time_function("u", &grid).space_order(2));
    let x = grid.dimensions()[0].clone();
    let t = grid.time_dim().clone();
    let h = Expr::from(x.spacing());
    let e: Expr = u.at(vec![Expr::from(&t) + Expr::from(t.spacing()), Expr::from(&x) - &h]) * 2;
    let expected = u.indexed(vec![Expr::from(&t) + 1, Expr::from(&x) - 1]) * 2;
    assert_eq!(e.indexify(), expected);
    assert_eq!(expected.to_string(), "2*u[t + 1, x - 1]");
}

#[test]
fn test_free_symbols() {
    let (mut reg, grid) = setup(&[8]);
    let f = reg.function(FunctionSpec::function("f", &grid).space_order(2));
    let x = grid.dimensions()[0].clone();
    let e = f.at(vec![Expr::from(&x) + Expr::from(x.spacing())]) * Expr::from(Symbol::float("c"));
    let names: Vec<String> = e.free_symbols().iter().map(|s| s.name().to_string()).collect();
    assert_eq!(names, vec!["c", "h_x", "x", "f"]);
}

// ─── Registry and functions ────────────────────────────────────────

#[test]
fn test_registry_returns_canonical_instance() {
    let (mut reg, grid) = setup(&[8]);
    let a = reg.function(FunctionSpec::function("f", &grid).space_order(2));
    let b = reg.function(FunctionSpec::function("f", &grid).space_order(2));
    let c = reg.function(FunctionSpec::function("f", &grid).space_order(4));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(reg.len(), 2);
    assert_eq!(reg.functions_named("f").len(), 2);
    assert!(reg.grid("grid", &[8]).ptr_eq(&grid));
}

#[test]
fn test_forward_and_backward() {
    let (mut reg, grid) = setup(&[8]);
    let u = reg.function(FunctionSpec::time_function("u", &grid));
    let t = grid.time_dim().clone();
    let x = grid.dimensions()[0].clone();
    let dt = Expr::from(t.spacing());
    assert_eq!(u.forward().unwrap(), u.at(vec![Expr::from(&t) + &dt, Expr::from(&x)]));
    assert_eq!(u.backward().unwrap(), u.at(vec![Expr::from(&t) - &dt, Expr::from(&x)]));
    let f = reg.function(FunctionSpec::function("f", &grid));
    assert!(f.forward().unwrap_err().is_missing_attribute());
}

#[test]
fn test_index_ref_of_staggered_function() {
    let (mut reg, grid) = setup(&[8, 8]);
    let x = grid.dimensions()[0].clone();
    let y = grid.dimensions()[1].clone();
    let v = reg.function(FunctionSpec::function("v", &grid).staggered(&[x.clone()]));
    let refs = v.index_ref();
    assert_eq!(refs[0].1, Expr::from(&x) + Expr::rational(1, 2) * Expr::from(x.spacing()));
    assert_eq!(refs[1].1, Expr::from(&y));
    assert_eq!(v.c_symbol().name(), "v_vec");
}

#[test]
fn test_dimension_chain() {
    let time = Dimension::time("time");
    let t0 = Dimension::modulo("t0", &time, 0, 2);
    assert_eq!(t0.defines(), vec![t0.clone(), time.clone()]);
    assert!(t0.is_time());
    assert_eq!(t0.spacing().name(), "dtime");
    assert_eq!(t0.symbolic_min(), Expr::from(&time).modulo(2));
    let behind = Dimension::modulo("tb", &time, -1, 3);
    assert_eq!(behind.symbolic_min(), (Expr::from(&time) + 2i64).modulo(3));
    let x = Dimension::space("x");
    let xb = Dimension::incr("x0_blk0", &x, Symbol::int("x0_blk0_size"));
    assert_eq!(xb.step(), Expr::from(Symbol::int("x0_blk0_size")));
    assert_eq!(xb.root(), &x);
}

#[test]
fn test_equation_display_and_evaluate() {
    let (mut reg, grid) = setup(&[8]);
    let u = reg.function(FunctionSpec::function("u", &grid).space_order(2));
    let eq = Equation::new(u.access(), u.access().shortcut("dx2").unwrap());
    assert!(eq.to_string().starts_with("Eq(u(x), Derivative(u(x), (x, 2))"));
    let evaluated = eq.evaluate().unwrap();
    assert!(!evaluated.rhs().has_derivative());
    assert!(Equation::increment(u.access(), 1).to_string().starts_with("Inc("));
}

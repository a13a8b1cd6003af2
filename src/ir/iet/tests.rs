use super::*;
use crate::error::Error;
use crate::ir::equations::{AugOp, LoweredEq};
use crate::symbolics::{Dimension, Entity, Expr, Function, FunctionSpec, Grid, Symbol, SymbolRegistry};

struct Fixture {
    grid: Grid,
    f: Function,
    x: Dimension,
    y: Dimension,
}

fn fixture() -> Fixture {
    let mut registry = SymbolRegistry::new();
    let grid = registry.grid("grid", &[11, 11]);
    let f = registry.function(FunctionSpec::function("f", &grid).space_order(2));
    let x = grid.dimensions()[0].clone();
    let y = grid.dimensions()[1].clone();
    Fixture { grid, f, x, y }
}

impl Fixture {
    /// `f[x][y] = 2*f[x + 1][y]`
    fn update(&self) -> Node {
        let x = Expr::from(&self.x);
        let y = Expr::from(&self.y);
        let eq = LoweredEq::new(
            self.f.indexed(vec![x.clone(), y.clone()]),
            self.f.indexed(vec![x + 1, y]) * 2,
        )
        .unwrap();
        Node::expression(eq)
    }

    fn full(&self, d: &Dimension) -> (Expr, Expr, Expr) {
        (d.symbolic_min(), d.symbolic_max(), Expr::one())
    }

    fn nest(&self, body: Vec<Node>) -> Iteration {
        let inner = Iteration::new(body, &self.y, self.full(&self.y));
        Iteration::new(vec![inner.into()], &self.x, self.full(&self.x))
    }
}

// ─── Lists ─────────────────────────────────────────────────────────

#[test]
fn test_nested_lists_merge_headers_and_footers_in_order() {
    let fx = fixture();
    let innermost = Node::list_with(
        vec![Node::comment("h3")],
        vec![fx.update()],
        vec![Node::comment("f3")],
    );
    let middle = Node::list_with(
        vec![Node::comment("h2")],
        vec![innermost],
        vec![Node::comment("f2")],
    );
    let outer = Node::list_with(
        vec![Node::comment("h1")],
        vec![middle],
        vec![Node::comment("f1")],
    );
    let Node::List(list) = &outer else {
        panic!("expected a list, got {}", outer.repr());
    };
    let text = |nodes: &[Node]| nodes.iter().map(Node::ccode).collect::<Vec<_>>();
    assert_eq!(text(list.header()), ["/* h1 */", "/* h2 */", "/* h3 */"]);
    assert_eq!(text(list.footer()), ["/* f1 */", "/* f2 */", "/* f3 */"]);
    assert_eq!(list.body().len(), 1);
    assert!(matches!(list.body()[0], Node::Expression(_)));
}

#[test]
fn test_block_inside_list_is_kept() {
    let fx = fixture();
    let node = Node::list(vec![Node::block(vec![fx.update()])]);
    let Node::List(list) = &node else {
        panic!("expected a list");
    };
    assert!(matches!(list.body()[0], Node::Block(_)));
    assert_eq!(node.ccode(), "{\n  f[x][y] = 2*f[x + 1][y];\n}");
}

#[test]
fn test_list_with_siblings_is_not_merged() {
    let fx = fixture();
    let inner = Node::list(vec![fx.update()]);
    let node = Node::list(vec![inner, Node::blank()]);
    let Node::List(list) = &node else {
        panic!("expected a list");
    };
    assert_eq!(list.body().len(), 2);
}

// ─── Loops ─────────────────────────────────────────────────────────

#[test]
fn test_loop_nest_ccode() {
    let fx = fixture();
    let nest: Node = fx.nest(vec![fx.update()]).into();
    insta::assert_snapshot!(nest.ccode(), @r"
    for (int x = x_m; x <= x_M; x += 1)
    {
      for (int y = y_m; y <= y_M; y += 1)
      {
        f[x][y] = 2*f[x + 1][y];
      }
    }
    ");
}

#[test]
fn test_backward_loop_header() {
    let fx = fixture();
    let node: Node = Iteration::new(vec![], &fx.x, fx.full(&fx.x))
        .with_direction(Direction::Backward)
        .into();
    assert!(node.ccode().starts_with("for (int x = x_M; x >= x_m; x -= 1)"));
}

#[test]
fn test_upper_bound_only_defaults() {
    let fx = fixture();
    let plain = Iteration::new(vec![], &fx.x, Expr::from(Symbol::int("n")));
    assert!(plain.symbolic_min().is_zero());
    assert!(plain.step().is_one());

    let stride = Symbol::int("xs");
    let xi = Dimension::incr("xi", &fx.x, stride.clone());
    let blocked = Iteration::new(vec![], &xi, Expr::from(Symbol::int("n")));
    assert_eq!(blocked.symbolic_min(), &Expr::from(Symbol::int("xi_m")));
    assert_eq!(blocked.step(), &Expr::from(stride));
}

#[test]
fn test_unbound_index_rejected() {
    let fx = fixture();
    let t = fx.grid.time_dim().clone();
    let t0 = Dimension::modulo("t0", &t, 0, 2);
    let err = Iteration::new(vec![], &fx.x, fx.full(&fx.x))
        .with_uindices(vec![t0.clone()])
        .unwrap_err();
    assert_eq!(
        err,
        Error::UnboundIndex {
            index: "t0".to_string(),
            dim: "x".to_string()
        }
    );
    assert!(Iteration::new(vec![], &t, fx.full(&t))
        .with_uindices(vec![t0])
        .is_ok());
}

#[test]
fn test_modulo_indices_in_loop_header() {
    let fx = fixture();
    let t = fx.grid.time_dim().clone();
    let t0 = Dimension::modulo("t0", &t, 0, 2);
    let t1 = Dimension::modulo("t1", &t, 1, 2);
    let node: Node = Iteration::new(vec![], &t, fx.full(&t))
        .with_uindices(vec![t0.clone(), t1])
        .unwrap()
        .into();
    assert_eq!(
        node.ccode().lines().next().unwrap(),
        "for (int t = t_m, t0 = t%2, t1 = (t + 1)%2; t <= t_M; t += 1, t0 = t%2, t1 = (t + 1)%2)"
    );
    let defines = node.defines();
    assert!(defines.contains(&Entity::Dimension(t.clone())));
    assert!(defines.contains(&Entity::Dimension(t0)));
    assert!(node.free_symbols().contains(&Entity::Symbol(Symbol::int("t_M"))));
}

#[test]
fn test_iteration_properties_queries() {
    let fx = fixture();
    let it = Iteration::new(vec![], &fx.x, fx.full(&fx.x))
        .with_properties([Property::Parallel, Property::Affine]);
    assert!(it.is_parallel());
    assert!(it.is_affine());
    assert!(it.is_parallel_relaxed());
    assert!(!it.is_sequential());
    assert_eq!(it.ncollapsed(), 0);
}

// ─── Rebuild ───────────────────────────────────────────────────────

#[test]
fn test_rebuild_with_own_children_is_identity() {
    let fx = fixture();
    let tree = Node::list_with(
        vec![Node::comment("begin")],
        vec![fx.nest(vec![fx.update()]).into(), Node::blank()],
        vec![Node::statement("return 0")],
    );
    let nodes = find_nodes(&tree, |_| true);
    assert!(nodes.len() >= 6);
    for node in nodes {
        let fields = node
            .children()
            .into_iter()
            .map(|field| field.into_iter().cloned().collect())
            .collect();
        let rebuilt = node.rebuild(fields).unwrap();
        assert_eq!(&rebuilt, node);
        assert_eq!(rebuilt.ccode(), node.ccode());
    }
}

fn children_of(node: &Node) -> Vec<Vec<Node>> {
    node.children()
        .into_iter()
        .map(|field| field.into_iter().cloned().collect())
        .collect()
}

#[test]
fn test_rebuild_identity_for_every_compound_kind() {
    let fx = fixture();
    let t = fx.grid.time_dim().clone();
    let n = Expr::from(Symbol::int("n"));
    let halo = HaloEntry {
        halos: [(fx.x.clone(), HaloWidth { left: 1, right: 1 })].into(),
        loc_indices: Default::default(),
    };
    let lambda = Lambda::new(vec![fx.update()], vec!["&".to_string()], vec![]);
    let inner = Call::new("h", vec![CallArg::Expr(n.clone())]).unwrap();
    let outer = Call::new(
        "g",
        vec![
            CallArg::Function(fx.f.clone()),
            CallArg::Node(inner.into()),
            CallArg::Node(lambda.clone().into()),
        ],
    )
    .unwrap();
    let par = ParallelIteration::new(fx.nest(vec![fx.update()]), Construct::ParallelFor, 2);
    let timed_loop = Iteration::new(vec![fx.nest(vec![fx.update()]).into()], &t, fx.full(&t));

    let cases: Vec<Node> = vec![
        outer.into(),
        Conditional::new(
            Expr::from(&fx.x).lt(n.clone()),
            vec![fx.update()],
            vec![Node::comment("skip")],
        )
        .into(),
        Callable::new("Kernel", vec![fx.nest(vec![fx.update()]).into()], "int", vec![]).into(),
        par.into(),
        partree(&fx),
        ParallelBlock::new(
            vec![Node::list_with(vec![Node::comment("setup")], vec![partree(&fx)], vec![])],
            vec![Symbol::float("r0")],
        )
        .unwrap()
        .into(),
        Node::halo_spot(HaloScheme::new().with(fx.f.clone(), halo), vec![fx.update()]).unwrap(),
        TimedList::new("timers", "section0", vec![timed_loop.into()]).into(),
        Section::new("section0", vec![fx.update(), Node::blank()]).into(),
        Section::subsection("section1", vec![fx.update()]).into(),
        lambda.into(),
        SyncSpot::new(
            vec![SyncOp::WaitLock("lock0".to_string()), SyncOp::WithLock("lock1".to_string())],
            vec![fx.update()],
        )
        .into(),
        While::new(Expr::from(&fx.x).lt(n), vec![fx.update(), Node::statement("x += 1")]).into(),
    ];

    for node in &cases {
        let fields = children_of(node);
        assert!(
            fields.iter().any(|field| !field.is_empty()),
            "{} has no children",
            node.kind_name()
        );
        let rebuilt = node.rebuild(fields).unwrap();
        assert_eq!(rebuilt.kind_name(), node.kind_name());
        assert_eq!(&rebuilt, node, "{} changed on rebuild", node.kind_name());
        assert_eq!(rebuilt.signature(), node.signature());

        // Every descendant rebuilds to itself as well.
        for sub in find_nodes(node, |_| true) {
            assert_eq!(&sub.rebuild(children_of(sub)).unwrap(), sub);
        }
    }
}

#[test]
fn test_rebuild_arity_mismatch() {
    let fx = fixture();
    let node: Node = fx.nest(vec![]).into();
    assert_eq!(
        node.rebuild(Vec::new()).unwrap_err(),
        Error::RebuildArity {
            node: "Iteration",
            expected: 1,
            got: 0
        }
    );
}

#[test]
fn test_rebuild_field_by_name() {
    let fx = fixture();
    let cond: Node = Conditional::new(
        Expr::from(&fx.x).lt(Symbol::int("n")),
        vec![fx.update()],
        vec![],
    )
    .into();
    let swapped = cond
        .rebuild_field("else_body", vec![Node::comment("skip")])
        .unwrap();
    assert!(swapped.ccode().ends_with("else\n{\n  /* skip */\n}"));

    let err = cond.rebuild_field("nodes", vec![]).unwrap_err();
    assert!(err.is_missing_attribute());
}

#[test]
fn test_args_frozen_excludes_children() {
    let fx = fixture();
    let node: Node = fx.nest(vec![fx.update()]).into();
    let args = node.args();
    let frozen = node.args_frozen();
    assert!(args.contains_key("nodes"));
    assert!(!frozen.contains_key("nodes"));
    assert!(frozen.contains_key("dimension"));
    assert_eq!(args.len(), frozen.len() + node.traversable().len());
    assert!(matches!(node.arg("dimension"), Ok(Arg::Dimension(d)) if d == fx.x));
    assert!(node.arg("bogus").unwrap_err().is_missing_attribute());
}

// ─── Structural checks ─────────────────────────────────────────────

fn partree(fx: &Fixture) -> Node {
    let root = ParallelIteration::new(fx.nest(vec![fx.update()]), Construct::For, 2);
    ParallelTree::new(vec![], vec![root.into()], Some(Symbol::int("nthreads")))
        .unwrap()
        .into()
}

#[test]
fn test_parallel_tree_needs_a_single_loop() {
    let fx = fixture();
    let err = ParallelTree::new(vec![], vec![fx.update()], None).unwrap_err();
    assert!(matches!(err, Error::MalformedBody { node: "ParallelTree", .. }));
    let two = vec![fx.nest(vec![]).into(), fx.nest(vec![]).into()];
    assert!(ParallelTree::new(vec![], two, None).is_err());
}

#[test]
fn test_parallel_block_absorbs_list_header() {
    let fx = fixture();
    let wrapped = Node::list_with(vec![Node::comment("setup")], vec![partree(&fx)], vec![]);
    let block = ParallelBlock::new(vec![wrapped], vec![]).unwrap();
    assert_eq!(block.root().index(), "x");
    assert_eq!(block.partree().prefix().len(), 1);
    assert!(block.partree().prefix()[0].ccode().contains("/* setup */"));
}

#[test]
fn test_parallel_block_rejects_other_bodies() {
    let fx = fixture();
    let with_footer = Node::list_with(vec![], vec![partree(&fx)], vec![Node::blank()]);
    for body in [
        vec![fx.update()],
        vec![with_footer],
        vec![partree(&fx), partree(&fx)],
    ] {
        let err = ParallelBlock::new(body, vec![]).unwrap_err();
        assert!(matches!(err, Error::MalformedBody { node: "ParallelBlock", .. }));
    }
}

#[test]
fn test_parallel_iteration_pragma_and_collapse() {
    let fx = fixture();
    let par = ParallelIteration::new(fx.nest(vec![fx.update()]), Construct::ParallelFor, 2)
        .with_schedule(Schedule {
            kind: ScheduleKind::Dynamic,
            chunk: Some(Expr::one()),
        })
        .with_reduction(AugOp::Add, Entity::Symbol(Symbol::float("acc")));
    assert_eq!(
        par.pragma(),
        "omp parallel for collapse(2) schedule(dynamic,1) reduction(+:acc)"
    );
    let dims: Vec<&str> = par.collapsed().unwrap().iter().map(|i| i.index()).collect();
    assert_eq!(dims, ["x", "y"]);

    let too_deep = ParallelIteration::new(fx.nest(vec![]), Construct::For, 3);
    assert!(too_deep.collapsed().is_err());
}

#[test]
fn test_halo_spot_body_shapes() {
    let fx = fixture();
    let empty = Node::halo_spot(HaloScheme::new(), vec![]).unwrap();
    let Node::HaloSpot(h) = &empty else {
        panic!("expected a halo spot");
    };
    assert!(h.body().is_list());
    let err = Node::halo_spot(HaloScheme::new(), vec![fx.update(), fx.update()]).unwrap_err();
    assert!(matches!(err, Error::MalformedBody { node: "HaloSpot", .. }));
}

#[test]
fn test_halo_spot_contributes_functions_only() {
    let fx = fixture();
    let entry = HaloEntry {
        halos: [(fx.x.clone(), HaloWidth { left: 1, right: 1 })].into(),
        loc_indices: Default::default(),
    };
    let spot = Node::halo_spot(
        HaloScheme::new().with(fx.f.clone(), entry),
        vec![fx.update()],
    )
    .unwrap();
    assert_eq!(spot.functions(), vec![fx.f.clone()]);
    assert!(spot.free_symbols().is_empty());
    assert!(spot.defines().is_empty());
    assert!(spot.ccode().starts_with("/* haloupdate(f[x:(1,1)]) */"));
}

#[test]
fn test_call_rejects_statement_arguments() {
    let fx = fixture();
    let err = Call::new("g", vec![CallArg::Node(fx.update())]).unwrap_err();
    assert!(matches!(err, Error::MalformedBody { node: "Call", .. }));
}

#[test]
fn test_call_passes_functions_by_handle() {
    let fx = fixture();
    let inner = Call::new("h", vec![]).unwrap();
    let call: Node = Call::new(
        "g",
        vec![
            CallArg::Function(fx.f.clone()),
            CallArg::Expr(Expr::from(Symbol::int("n")) + 1),
            CallArg::Node(inner.into()),
        ],
    )
    .unwrap()
    .with_retobj(Expr::from(Symbol::int("r")))
    .into();
    assert_eq!(call.ccode(), "r = g(f_vec, n + 1, h());");
    assert!(call.free_symbols().contains(&Entity::Symbol(fx.f.c_symbol())));
    assert_eq!(call.defines(), vec![Entity::Symbol(Symbol::int("r"))]);
    assert_eq!(call.children()[0].len(), 1);
}

// ─── Expressions ───────────────────────────────────────────────────

#[test]
fn test_expression_definitions() {
    let fx = fixture();
    let r = Symbol::float("r0");
    let scalar = Expression::new(LoweredEq::new(Expr::from(&r), Expr::from(&fx.x) * 2).unwrap());
    assert_eq!(scalar.defines(), vec![Entity::Symbol(r.clone())]);

    let inc = Expression::new(
        LoweredEq::augmented(Expr::from(&r), Expr::one(), AugOp::Add).unwrap(),
    );
    assert!(inc.defines().is_empty());

    let Node::Expression(tensor) = fx.update() else {
        panic!("expected an expression");
    };
    assert!(tensor.defines().is_empty());
    assert_eq!(tensor.functions(), vec![fx.f.clone()]);
}

#[test]
fn test_local_expression_declares_its_target() {
    let r = Symbol::float("r0");
    let node: Node = Expression::local(LoweredEq::new(Expr::from(&r), Expr::rational(1, 2)).unwrap()).into();
    assert_eq!(node.ccode(), "float r0 = 0.5F;");
    assert_eq!(node.defines(), vec![Entity::Symbol(r)]);
}

#[test]
fn test_divisions_print_as_denominators() {
    let h = Expr::from(Symbol::float("h_x"));
    let e = Expr::from(Symbol::float("a")) / (&h * &h);
    assert_eq!(codegen::expr_code(&e), "a/(h_x*h_x)");
    assert_eq!(codegen::expr_code(&(-(h.pow(-1)))), "-1.0F/h_x");
}

// ─── Identity ──────────────────────────────────────────────────────

#[test]
fn test_signature_tracks_generated_code() {
    let fx = fixture();
    let a: Node = fx.nest(vec![fx.update()]).into();
    let b: Node = fx.nest(vec![fx.update()]).into();
    let c: Node = fx.nest(vec![]).into();
    assert_eq!(a, b);
    assert_eq!(a.signature(), b.signature());
    assert_ne!(a, c);
    let shown = a.signature().to_string();
    assert!(shown.starts_with('#'));
    assert_eq!(shown.len(), 17);
    assert_eq!(a.signature().to_hex().len(), 64);
}

// ─── Visitors ──────────────────────────────────────────────────────

#[test]
fn test_iteration_trees_are_maximal_chains() {
    let fx = fixture();
    let t = fx.grid.time_dim().clone();
    let first = Iteration::new(vec![fx.update()], &fx.y, fx.full(&fx.y));
    let second = Iteration::new(vec![fx.update()], &fx.y, fx.full(&fx.y));
    let space = Iteration::new(vec![first.into(), second.into()], &fx.x, fx.full(&fx.x));
    let root: Node = Iteration::new(vec![space.into()], &t, fx.full(&t)).into();

    let trees = retrieve_iteration_trees(&root);
    assert_eq!(trees.len(), 2);
    for tree in &trees {
        let dims: Vec<&str> = tree.dimensions().iter().map(|d| d.name()).collect();
        assert_eq!(dims, ["t", "x", "y"]);
        assert_eq!(tree.root().map(Iteration::index), Some("t"));
        assert_eq!(tree.inner().map(Iteration::index), Some("y"));
    }
    assert_eq!(find_expressions(&root).len(), 2);
}

#[test]
fn test_transform_replaces_matching_subtrees() {
    let fx = fixture();
    let root: Node = fx.nest(vec![fx.update(), Node::blank()]).into();
    let out = transform(&root, &mut |n| {
        matches!(n, Node::Expression(_)).then(|| Node::comment("gone"))
    })
    .unwrap();
    assert!(find_expressions(&out).is_empty());
    assert!(out.ccode().contains("/* gone */"));
    assert_eq!(retrieve_iteration_trees(&out).len(), 1);
}

#[test]
fn test_derive_parameters_orders_functions_first() {
    let fx = fixture();
    let call = Call::new("flush", vec![CallArg::Function(fx.f.clone())]).unwrap();
    let body = Node::list(vec![
        PointerCast::new(&fx.f).into(),
        fx.nest(vec![fx.update()]).into(),
        call.into(),
    ]);
    let names: Vec<String> = derive_parameters(&body)
        .iter()
        .map(|e| e.name().to_string())
        .collect();
    assert_eq!(names, ["f", "x_M", "x_m", "y_M", "y_m"]);

    let kernel: Node = Callable::new("Kernel", vec![body.clone()], "int", derive_parameters(&body)).into();
    let header = kernel.ccode().lines().next().unwrap().to_string();
    assert_eq!(
        header,
        "static inline int Kernel(struct dataobj *restrict f_vec, const int x_M, const int x_m, const int y_M, const int y_m)"
    );
    assert_eq!(kernel.functions(), vec![fx.f.clone()]);
}

#[test]
fn test_pointer_cast_ccode() {
    let fx = fixture();
    let cast: Node = PointerCast::new(&fx.f).into();
    assert_eq!(
        cast.ccode(),
        "float (*restrict f)[f_vec->size[1]] __attribute__ ((aligned (64))) = (float (*)[f_vec->size[1]]) f_vec->data;"
    );
    assert!(cast.free_symbols().is_empty());
}

#[test]
fn test_regions_print_markers() {
    let fx = fixture();
    let section: Node = Section::new("section0", vec![fx.update()]).into();
    let timed: Node = TimedList::new("timers", "section0", vec![section]).into();
    let code = timed.ccode();
    let lines: Vec<&str> = code.lines().collect();
    assert_eq!(
        lines,
        [
            "START_TIMER(section0)",
            "/* Begin section0 */",
            "f[x][y] = 2*f[x + 1][y];",
            "/* End section0 */",
            "STOP_TIMER(section0,timers)",
        ]
    );
}

#[test]
fn test_print_ast_outline() {
    let fx = fixture();
    let root: Node = Section::new("section0", vec![fx.nest(vec![fx.update()]).into()]).into();
    let ast = print_ast(&root);
    let lines: Vec<&str> = ast.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "<Section (section0)>");
    assert!(lines[1].starts_with("  <Iteration x; "));
    assert_eq!(lines[3], "      <Expression f[x, y] = 2*f[x + 1, y]>");
}

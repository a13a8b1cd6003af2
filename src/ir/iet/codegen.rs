//! C code generation for nodes and lowered expressions.

use super::nodes::{CallArg, Element, Expression, Iteration, Lambda};
use super::{Direction, Node};
use crate::symbolics::{Entity, Expr, ExprKind, Rational};

const INDENT: &str = "  ";

// ─── Expressions ───────────────────────────────────────────────────

/// Binding strength of a printed expression.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Relational,
    Add,
    Mul,
    Atom,
}

/// An expression as C.
pub fn expr_code(expr: &Expr) -> String {
    print(expr).0
}

fn wrap(e: &Expr, min: Prec) -> String {
    let (code, prec) = print(e);
    if prec < min {
        format!("({})", code)
    } else {
        code
    }
}

fn number(r: Rational) -> String {
    if r.is_integer() {
        r.numer().to_string()
    } else {
        format!("{:?}F", r.to_f64())
    }
}

fn print(e: &Expr) -> (String, Prec) {
    match e.kind() {
        ExprKind::Number(r) => {
            let prec = if r.is_negative() { Prec::Add } else { Prec::Atom };
            (number(*r), prec)
        }
        ExprKind::Symbol(s) => (s.name().to_string(), Prec::Atom),
        ExprKind::Dimension(d) => (d.name().to_string(), Prec::Atom),
        ExprKind::Indexed { function, indices } => {
            let idx: String = indices.iter().map(|i| format!("[{}]", expr_code(i))).collect();
            (format!("{}{}", function.name(), idx), Prec::Atom)
        }
        ExprKind::Function { function, indices } => {
            let args: Vec<String> = indices.iter().map(expr_code).collect();
            (format!("{}({})", function.name(), args.join(", ")), Prec::Atom)
        }
        ExprKind::Add(terms) => print_add(terms),
        ExprKind::Mul(_) | ExprKind::Pow(..) => print_mul(e),
        ExprKind::Mod(a, b) => (
            format!("{}%{}", wrap(a, Prec::Atom), wrap(b, Prec::Atom)),
            Prec::Mul,
        ),
        ExprKind::Floor(a) => (format!("floor({})", expr_code(a)), Prec::Atom),
        ExprKind::Derivative(_) => (e.to_string(), Prec::Atom),
        ExprKind::ListInitializer(items) => {
            let items: Vec<String> = items.iter().map(expr_code).collect();
            (format!("{{{}}}", items.join(", ")), Prec::Atom)
        }
        ExprKind::Relational(op, a, b) => (
            format!("{} {} {}", wrap(a, Prec::Add), op.symbol(), wrap(b, Prec::Add)),
            Prec::Relational,
        ),
    }
}

fn print_add(terms: &[Expr]) -> (String, Prec) {
    // Constants go last: `x + 1`, not `1 + x`.
    let (consts, rest): (Vec<&Expr>, Vec<&Expr>) = terms.iter().partition(|t| t.is_number());
    let mut out = String::new();
    for (i, term) in rest.into_iter().chain(consts).enumerate() {
        let (coeff, _) = term.as_coeff_mul();
        if coeff.is_negative() {
            out.push_str(if i == 0 { "-" } else { " - " });
            out.push_str(&wrap(&-term, Prec::Mul));
        } else {
            if i > 0 {
                out.push_str(" + ");
            }
            out.push_str(&wrap(term, Prec::Mul));
        }
    }
    (out, Prec::Add)
}

fn print_mul(e: &Expr) -> (String, Prec) {
    let (coeff, rest) = e.as_coeff_mul();
    let factors: Vec<Expr> = match rest.kind() {
        ExprKind::Mul(args) => args.clone(),
        _ if rest.is_one() => Vec::new(),
        _ => vec![rest.clone()],
    };
    let mut num = Vec::new();
    let mut den = Vec::new();
    for factor in &factors {
        let (base, exp) = factor.as_base_exp();
        match exp.as_number() {
            Some(n) if n.is_integer() && n.is_negative() => {
                let b = wrap(&base, Prec::Atom);
                for _ in 0..n.numer().unsigned_abs() {
                    den.push(b.clone());
                }
            }
            Some(n) if n.is_integer() && n.numer() > 1 && n.numer() <= 4 => {
                let b = wrap(&base, Prec::Atom);
                for _ in 0..n.numer() {
                    num.push(b.clone());
                }
            }
            Some(n) if n == Rational::new(1, 2) => num.push(format!("sqrt({})", expr_code(&base))),
            Some(n) if n.is_one() => num.push(wrap(factor, Prec::Mul)),
            _ => num.push(format!("pow({}, {})", expr_code(&base), expr_code(&exp))),
        }
    }
    let sign = if coeff.is_negative() { "-" } else { "" };
    let magnitude = coeff.abs();
    if !magnitude.is_one() || num.is_empty() {
        let lead = if num.is_empty() && !den.is_empty() && magnitude.is_integer() {
            format!("{}.0F", magnitude.numer())
        } else {
            number(magnitude)
        };
        num.insert(0, lead);
    }
    let mut code = format!("{}{}", sign, num.join("*"));
    if !den.is_empty() {
        if den.len() == 1 {
            code = format!("{}/{}", code, den[0]);
        } else {
            code = format!("{}/({})", code, den.join("*"));
        }
    }
    let prec = if sign.is_empty() { Prec::Mul } else { Prec::Add };
    (code, prec)
}

// ─── Nodes ─────────────────────────────────────────────────────────

/// The node as C, two spaces per nesting level.
pub fn ccode(node: &Node) -> String {
    let mut gen = CGen::default();
    gen.visit(node);
    gen.lines.join("\n")
}

#[derive(Default)]
struct CGen {
    lines: Vec<String>,
    depth: usize,
}

impl CGen {
    fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", INDENT.repeat(self.depth), text));
        }
    }

    fn scoped(&mut self, f: impl FnOnce(&mut Self)) {
        self.line("{");
        self.depth += 1;
        f(self);
        self.depth -= 1;
        self.line("}");
    }

    fn visit_all(&mut self, nodes: &[Node]) {
        for n in nodes {
            self.visit(n);
        }
    }

    fn visit(&mut self, node: &Node) {
        match node {
            Node::List(l) => {
                self.visit_all(&l.header);
                self.visit_all(&l.body);
                self.visit_all(&l.footer);
            }
            Node::Block(l) => self.scoped(|g| {
                g.visit_all(&l.header);
                g.visit_all(&l.body);
                g.visit_all(&l.footer);
            }),
            Node::Element(e) => self.element(e),
            Node::Expression(e) => self.expression(e),
            Node::Call(c) => {
                let code = call_code(c);
                self.line(format!("{};", code));
            }
            Node::Iteration(i) => self.iteration(i),
            Node::ParallelIteration(p) => {
                self.line(format!("#pragma {}", p.pragma()));
                self.iteration(&p.iteration);
            }
            Node::While(w) => {
                self.line(format!("while ({})", expr_code(&w.condition)));
                self.scoped(|g| g.visit_all(&w.body));
            }
            Node::Callable(c) => {
                let params: Vec<String> = c.parameters.iter().map(parameter).collect();
                let mut head: Vec<&str> = c.prefix.iter().map(String::as_str).collect();
                head.push(&c.retval);
                self.line(format!("{} {}({})", head.join(" "), c.name, params.join(", ")));
                self.scoped(|g| g.visit_all(&c.body));
            }
            Node::Conditional(c) => {
                self.line(format!("if ({})", expr_code(&c.condition)));
                self.scoped(|g| g.visit_all(&c.then_body));
                if !c.else_body.is_empty() {
                    self.line("else");
                    self.scoped(|g| g.visit_all(&c.else_body));
                }
            }
            Node::PointerCast(p) => {
                let f = &p.function;
                let ctype = f.dtype().ctype();
                let shape: String = p
                    .castshape()
                    .iter()
                    .map(|s| format!("[{}]", expr_code(s)))
                    .collect();
                let source = match (&p.obj, f.is_array()) {
                    (Some(obj), _) => obj.name().to_string(),
                    (None, true) => format!("{}_data", f.name()),
                    (None, false) => format!("{}->data", f.c_symbol().name()),
                };
                let align = if p.alignment {
                    " __attribute__ ((aligned (64)))"
                } else {
                    ""
                };
                self.line(format!(
                    "{ctype} (*restrict {name}){shape}{align} = ({ctype} (*){shape}) {source};",
                    name = f.name(),
                ));
            }
            Node::Dereference(d) => {
                let ctype = d.pointee.dtype().ctype();
                let shape: String = d
                    .pointee
                    .shape()
                    .iter()
                    .skip(1)
                    .map(|s| format!("[{}]", expr_code(s)))
                    .collect();
                self.line(format!(
                    "{ctype} (*restrict {pointee}){shape} = ({ctype} (*){shape}) {pointer};",
                    pointee = d.pointee.name(),
                    pointer = d.pointer.name(),
                ));
            }
            Node::TimedList(t) => {
                self.line(format!("START_TIMER({})", t.lname));
                self.visit_all(&t.body);
                self.line(format!("STOP_TIMER({},{})", t.lname, t.timer));
            }
            Node::Section(s) => {
                self.line(format!("/* Begin {} */", s.name));
                self.visit_all(&s.body);
                self.line(format!("/* End {} */", s.name));
            }
            Node::Lambda(l) => {
                self.line(lambda_head(l));
                self.scoped(|g| g.visit_all(&l.body));
            }
            Node::ParallelTree(t) => {
                self.visit_all(&t.prefix);
                self.visit_all(&t.body);
            }
            Node::ParallelBlock(b) => {
                let mut pragma = String::from("#pragma omp parallel");
                if let Some(n) = b.nthreads() {
                    pragma.push_str(&format!(" num_threads({})", n.name()));
                }
                if !b.private.is_empty() {
                    let names: Vec<&str> = b.private.iter().map(|s| s.name()).collect();
                    pragma.push_str(&format!(" private({})", names.join(",")));
                }
                self.line(pragma);
                self.scoped(|g| g.visit_all(&b.body));
            }
            Node::HaloSpot(h) => {
                if !h.scheme.is_empty() {
                    self.line(format!("/* {} */", h.scheme));
                }
                self.visit_all(&h.body);
            }
            Node::SyncSpot(s) => {
                let ops: Vec<String> = s.sync_ops.iter().map(ToString::to_string).collect();
                self.line(format!("/* sync {} */", ops.join(", ")));
                self.visit_all(&s.body);
            }
        }
    }

    fn element(&mut self, e: &Element) {
        match e {
            Element::Comment(t) => self.line(format!("/* {} */", t)),
            Element::Statement(s) => self.line(format!("{};", s)),
            Element::Pragma(p) => self.line(format!("#pragma {}", p)),
            Element::Line(l) => self.line(l),
            Element::Blank => self.line(""),
        }
    }

    fn expression(&mut self, e: &Expression) {
        for p in &e.pragmas {
            self.line(format!("#pragma {}", p));
        }
        let eq = &e.expr;
        let lhs = expr_code(eq.lhs());
        let rhs = expr_code(eq.rhs());
        let code = match eq.op() {
            Some(op) => format!("{} {}= {};", lhs, op.symbol(), rhs),
            None if e.local => format!("{} {} = {};", eq.dtype().ctype(), lhs, rhs),
            None => format!("{} = {};", lhs, rhs),
        };
        self.line(code);
    }

    fn iteration(&mut self, i: &Iteration) {
        for p in &i.pragmas {
            self.line(format!("#pragma {}", p));
        }
        let index = i.index();
        let (min, max, step) = i.limits();
        let (min, max, step) = (expr_code(min), expr_code(max), expr_code(step));
        let (init, cond, incr) = match i.direction {
            Direction::Forward => (
                format!("int {} = {}", index, min),
                format!("{} <= {}", index, max),
                format!("{} += {}", index, step),
            ),
            Direction::Backward => (
                format!("int {} = {}", index, max),
                format!("{} >= {}", index, min),
                format!("{} -= {}", index, step),
            ),
        };
        let mut init = vec![init];
        let mut incr = vec![incr];
        for u in &i.uindices {
            init.push(format!("{} = {}", u.name(), expr_code(&u.symbolic_min())));
            incr.push(format!("{} = {}", u.name(), expr_code(&u.symbolic_incr())));
        }
        self.line(format!(
            "for ({}; {}; {})",
            init.join(", "),
            cond,
            incr.join(", ")
        ));
        self.scoped(|g| g.visit_all(&i.nodes));
    }
}

fn parameter(p: &Entity) -> String {
    match p {
        Entity::Function(f) if f.is_array() => {
            format!("{} *restrict {}_data", f.dtype().ctype(), f.name())
        }
        Entity::Function(f) => format!("struct dataobj *restrict {}", f.c_symbol().name()),
        Entity::Symbol(s) => format!("const {} {}", s.dtype().ctype(), s.name()),
        Entity::Dimension(d) => format!("const int {}", d.name()),
    }
}

fn call_code(c: &super::Call) -> String {
    let args: Vec<String> = c
        .arguments
        .iter()
        .map(|a| match a {
            CallArg::Expr(e) => expr_code(e),
            CallArg::Function(f) if f.is_array() => f.name().to_string(),
            CallArg::Function(f) => f.c_symbol().name().to_string(),
            CallArg::Node(Node::Call(inner)) => call_code(inner),
            CallArg::Node(Node::Lambda(l)) => inline_lambda(l),
            CallArg::Node(other) => other.repr(),
        })
        .collect();
    let target = match &c.base {
        Some(b) => format!("{}->{}", b.name(), c.name),
        None => c.name.clone(),
    };
    let call = if c.is_indirect {
        std::iter::once(target).chain(args).collect::<Vec<_>>().join(", ")
    } else {
        format!("{}({})", target, args.join(", "))
    };
    match &c.retobj {
        Some(r) => format!("{} = {}", expr_code(r), call),
        None => call,
    }
}

fn lambda_head(l: &Lambda) -> String {
    let params: Vec<String> = l.parameters.iter().map(parameter).collect();
    format!("[{}]({})", l.captures.join(", "), params.join(", "))
}

fn inline_lambda(l: &Lambda) -> String {
    let body: Vec<String> = l
        .body
        .iter()
        .map(|n| {
            n.ccode()
                .lines()
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    format!("{}{{ {} }}", lambda_head(l), body.join(" "))
}

// ─── Short descriptions ────────────────────────────────────────────

fn names(entities: impl IntoIterator<Item = String>) -> String {
    entities.into_iter().collect::<Vec<_>>().join(",")
}

fn iteration_repr(kind: &str, i: &Iteration) -> String {
    let props = if i.properties.is_empty() {
        String::new()
    } else {
        format!(
            "WithProperties[{}]::",
            names(i.properties.iter().map(ToString::to_string))
        )
    };
    let uindices = if i.uindices.is_empty() {
        String::new()
    } else {
        format!("[{}]", names(i.uindices.iter().map(|u| u.name().to_string())))
    };
    let (min, max, step) = i.limits();
    format!(
        "<{}{} {}{}; ({}, {}, {})>",
        props, kind, i.index(), uindices, min, max, step
    )
}

/// One-line description of `node`.
pub fn repr(node: &Node) -> String {
    match node {
        Node::List(l) => format!(
            "<List ({}, {}, {})>",
            l.header.len(),
            l.body.len(),
            l.footer.len()
        ),
        Node::Block(l) => format!(
            "<Block ({}, {}, {})>",
            l.header.len(),
            l.body.len(),
            l.footer.len()
        ),
        Node::Element(_) => format!("Element::{}", node.ccode().trim()),
        Node::Expression(e) => {
            let kind = if e.local {
                "LocalExpression"
            } else if e.is_increment() {
                "AugmentedExpression"
            } else {
                "Expression"
            };
            let fs = names(e.functions().iter().map(|f| f.name().to_string()));
            format!("<{}::[{}]>", kind, fs)
        }
        Node::Call(c) => {
            let args = names(c.arguments.iter().map(|a| match a {
                CallArg::Expr(e) => e.to_string(),
                CallArg::Function(f) => f.name().to_string(),
                CallArg::Node(n) => n.repr(),
            }));
            match &c.retobj {
                Some(r) => format!("{} = Call::{}({})", r, c.name, args),
                None => format!("Call::{}({})", c.name, args),
            }
        }
        Node::Iteration(i) => iteration_repr("Iteration", i),
        Node::ParallelIteration(p) => iteration_repr("ParallelIteration", &p.iteration),
        Node::While(w) => format!("<While {}; {}>", w.condition, w.body.len()),
        Node::Callable(c) => format!(
            "Callable[{}]<{}; {}>",
            c.name,
            c.retval,
            names(c.parameters.iter().map(|p| p.name().to_string()))
        ),
        Node::Conditional(c) => format!(
            "<[{}] ? [{}]>",
            c.condition,
            c.then_body.len() + c.else_body.len()
        ),
        Node::PointerCast(p) => format!("<PointerCast({})>", p.function.name()),
        Node::Dereference(d) => format!(
            "<Dereference({},{})>",
            d.pointee.name(),
            d.pointer.name()
        ),
        Node::TimedList(t) => format!("<TimedList ({})>", t.lname),
        Node::Section(s) => format!("<Section ({})>", s.name),
        Node::Lambda(l) => lambda_head(l).replacen('[', "Lambda[", 1),
        Node::ParallelTree(t) => format!("<ParallelTree ({}, {})>", t.prefix.len(), t.body.len()),
        Node::ParallelBlock(b) => format!("<ParallelBlock ({})>", b.body.len()),
        Node::HaloSpot(h) => format!(
            "<HaloSpot({})>",
            names(h.scheme.functions().iter().map(|f| f.name().to_string()))
        ),
        Node::SyncSpot(s) => format!(
            "<SyncSpot ({})>",
            names(s.sync_ops.iter().map(ToString::to_string))
        ),
    }
}

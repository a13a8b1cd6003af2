//! Public entry points: a [`Session`] owns the symbols and options, and
//! lowers equations into a [`LoweredKernel`].

pub(crate) mod pipeline;


use crate::config::Options;
use crate::diagnostic::Diagnostic;
use crate::ir::equations::LoweredEq;
use crate::ir::iet::{find_nodes, Callable, Node};
use crate::symbolics::{Entity, Equation, Function, FunctionSpec, Grid, SymbolRegistry};

/// Symbols plus lowering options.
#[derive(Default)]
pub struct Session {
    registry: SymbolRegistry,
    options: Options,
}

impl Session {
    pub fn new(options: Options) -> Self {
        Self {
            registry: SymbolRegistry::new(),
            options,
        }
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SymbolRegistry {
        &mut self.registry
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Create (or fetch) a grid in this session's registry.
    pub fn grid(&mut self, name: &str, shape: &[usize]) -> Grid {
        self.registry.grid(name, shape)
    }

    pub fn function(&mut self, spec: FunctionSpec) -> Function {
        self.registry.function(spec)
    }

    /// Lower `eqs` into a single callable. Errors come back as one
    /// diagnostic per failing equation.
    pub fn lower(&self, eqs: &[Equation]) -> Result<LoweredKernel, Vec<Diagnostic>> {
        let _span = tracing::debug_span!("lower", kernel = %self.options.name).entered();
        pipeline::lower(eqs, &self.options)
    }
}

/// Output of [`Session::lower`].
#[derive(Clone, Debug)]
pub struct LoweredKernel {
    /// Always a `Node::Callable`; only [`LoweredKernel::new`] builds one.
    root: Node,
    /// Equations as they appear in the kernel: derivatives expanded and
    /// time indices buffered.
    pub equations: Vec<LoweredEq>,
    /// Non-fatal findings, such as a grid conflict under the warn policy.
    pub diagnostics: Vec<Diagnostic>,
}

impl LoweredKernel {
    pub(crate) fn new(callable: Callable, equations: Vec<LoweredEq>, diagnostics: Vec<Diagnostic>) -> Self {
        LoweredKernel {
            root: callable.into(),
            equations,
            diagnostics,
        }
    }

    /// The kernel as a tree, for visitors such as `print_ast`.
    pub fn node(&self) -> &Node {
        &self.root
    }

    pub fn ccode(&self) -> String {
        self.root.ccode()
    }

    pub fn callable(&self) -> &Callable {
        self.root
            .as_callable()
            .expect("lowering always produces a Callable")
    }

    pub fn parameters(&self) -> &[Entity] {
        self.callable().parameters()
    }

    /// Every node of kind `kind` (e.g. `"Iteration"`).
    pub fn nodes_of_kind(&self, kind: &str) -> Vec<&Node> {
        find_nodes(&self.root, |n| n.kind_name() == kind)
    }
}

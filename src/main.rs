use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use stencil_ir::{
    print_ast, render_diagnostics, Diagnostic, Equation, Expr, Function, FunctionSpec, Grid,
    Language, Options, Session,
};

#[derive(Parser)]
#[command(
    name = "stencil",
    version,
    about = "Symbolic finite-difference stencils, lowered to C loop nests"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand a derivative shortcut of a field into its stencil
    Expand {
        /// Shortcut name (dx, dx2, dxl, dy2, ...) or `laplace`
        #[arg(long, default_value = "laplace")]
        shortcut: String,
        /// Number of space dimensions (1-3)
        #[arg(long, default_value_t = 2)]
        ndim: usize,
        /// Space discretization order of the field
        #[arg(long, default_value_t = 2)]
        space_order: u32,
        /// Expand the adjoint of the derivative
        #[arg(long)]
        transpose: bool,
    },
    /// Lower an acoustic wave update into a C kernel
    Kernel {
        /// Number of space dimensions (1-3)
        #[arg(long, default_value_t = 2)]
        ndim: usize,
        /// Space discretization order of the field
        #[arg(long, default_value_t = 2)]
        space_order: u32,
        /// Lowering config file (TOML, `[lowering]` table)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Emit OpenMP pragmas
        #[arg(long)]
        openmp: bool,
        /// Wrap the nest in a halo exchange
        #[arg(long)]
        halo: bool,
        /// Bracket the nest with timers
        #[arg(long)]
        profile: bool,
        /// Print the node tree instead of C
        #[arg(long)]
        ast: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stencil_ir=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Expand {
            shortcut,
            ndim,
            space_order,
            transpose,
        } => cmd_expand(&shortcut, ndim, space_order, transpose),
        Command::Kernel {
            ndim,
            space_order,
            config,
            openmp,
            halo,
            profile,
            ast,
        } => cmd_kernel(ndim, space_order, config, openmp, halo, profile, ast),
    }
}

fn grid_shape(ndim: usize) -> Vec<usize> {
    if !(1..=3).contains(&ndim) {
        eprintln!("error: --ndim must be 1, 2 or 3 (got {})", ndim);
        process::exit(1);
    }
    vec![11; ndim]
}

fn fail(diagnostics: &[Diagnostic]) -> ! {
    render_diagnostics(diagnostics, "<equations>");
    process::exit(1);
}

// --- stencil expand ---

fn cmd_expand(shortcut: &str, ndim: usize, space_order: u32, transpose: bool) {
    let mut session = Session::default();
    let grid = session.grid("grid", &grid_shape(ndim));
    let u = session.function(FunctionSpec::function("u", &grid).space_order(space_order));

    let derivative = match shortcut {
        "laplace" => u.access().laplace(),
        name => u.access().shortcut(name),
    };
    let derivative = derivative.and_then(|d| if transpose { d.transposed() } else { Ok(d) });
    let result = derivative.and_then(|d| d.evaluate().map(|e| (d, e)));
    match result {
        Ok((derivative, stencil)) => {
            println!("{}", derivative);
            println!("  = {}", stencil);
        }
        Err(e) => fail(&[Diagnostic::from(e)]),
    }
}

// --- stencil kernel ---

fn cmd_kernel(
    ndim: usize,
    space_order: u32,
    config: Option<PathBuf>,
    openmp: bool,
    halo: bool,
    profile: bool,
    ast: bool,
) {
    let mut options = match config {
        Some(path) => Options::load(&path).unwrap_or_else(|d| fail(&[d])),
        None => Options::default(),
    };
    if openmp {
        options = options.with_language(Language::OpenMp);
    }
    if halo {
        options = options.with_halo_exchange(true);
    }
    if profile {
        options = options.with_profiling(true);
    }

    let mut session = Session::new(options);
    let grid = session.grid("grid", &grid_shape(ndim));
    let u = session.function(
        FunctionSpec::time_function("u", &grid)
            .space_order(space_order)
            .time_order(2),
    );
    let update = wave_update(&u, &grid).unwrap_or_else(|e| fail(&[Diagnostic::from(e)]));

    let kernel = session.lower(&[update]).unwrap_or_else(|ds| fail(&ds));
    if !kernel.diagnostics.is_empty() {
        render_diagnostics(&kernel.diagnostics, "<equations>");
    }
    if ast {
        println!("{}", print_ast(kernel.node()));
    } else {
        println!("{}", kernel.ccode());
    }
}

/// `u.forward = 2*u - u.backward + dt**2 * laplace(u)`
fn wave_update(u: &Function, grid: &Grid) -> stencil_ir::Result<Equation> {
    let dt = Expr::from(grid.time_dim().spacing());
    let rhs = u.access() * 2 - u.backward()? + dt.pow(2) * u.access().laplace()?;
    Ok(Equation::new(u.forward()?, rhs))
}

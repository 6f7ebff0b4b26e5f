//! `ssa-tool`: a command-line driver over a handful of named in-memory
//! fixtures, for exercising the SSA construction and call-graph crates
//! without a real front end (§1 scopes parsing out of the core).

mod compile;
mod config;
mod fixtures;

use std::io;
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};

use config::CliConfig;

#[derive(Parser)]
#[command(name = "ssa-tool")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SSA construction and whole-program call-graph toolkit", long_about = None)]
struct Cli {
    /// Path to a TOML config file; CLI flags override values it sets.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run the sanity pass after every function build.
    #[arg(long, global = true)]
    sanity_check: bool,

    /// Skip the lifter; leave every local in an `Alloc` cell.
    #[arg(long, global = true)]
    naive_form: bool,

    /// Print every built function's debug-dump text as its package finishes.
    #[arg(long, global = true)]
    print_functions: bool,

    /// Print a line per package as it finishes building.
    #[arg(long, global = true)]
    print_packages: bool,

    /// Log each source file's name as its package is created.
    #[arg(long, global = true)]
    log_source: bool,

    /// Force package builds onto a single thread.
    #[arg(long, global = true)]
    build_serially: bool,

    /// Emit a debug reference instruction at every local binding.
    #[arg(long, global = true)]
    global_debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Algo {
    Static,
    Cha,
    Rta,
    Vta,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the §6.3 debug-dump format for a fixture's functions
    Dump {
        /// Fixture name (see `--list-fixtures`)
        fixture: String,
        /// Only dump the function with this name
        #[arg(long)]
        function: Option<String>,
    },

    /// Build and print a call graph
    Callgraph {
        fixture: String,
        #[arg(long, value_enum, default_value = "rta")]
        algo: Algo,
    },

    /// Run RTA plus the dead-code reporter
    Deadcode {
        fixture: String,
        /// Include declarations from files marked generated
        #[arg(long)]
        include_generated: bool,
        /// Function name(s) to explain reachability for (why-live), instead
        /// of listing dead functions
        #[arg(long = "root")]
        roots: Vec<String>,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<CliConfig> {
    let base = match &cli.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    };
    Ok(base
        .with_sanity_check(cli.sanity_check || base.sanity_check)
        .with_naive_form(cli.naive_form || base.naive_form)
        .with_print_functions(cli.print_functions || base.print_functions)
        .with_print_packages(cli.print_packages || base.print_packages)
        .with_log_source(cli.log_source || base.log_source)
        .with_build_serially(cli.build_serially || base.build_serially)
        .with_global_debug(cli.global_debug || base.global_debug))
}

fn load_fixture(name: &str) -> anyhow::Result<Vec<ssa_ir::input::CheckedPackage>> {
    fixtures::by_name(name).ok_or_else(|| {
        anyhow::anyhow!("unknown fixture {name:?}; available: {}", fixtures::FIXTURE_NAMES.join(", "))
    })
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Dump { fixture, function } => run_dump(fixture, function.as_deref(), &config),
        Commands::Callgraph { fixture, algo } => run_callgraph(fixture, *algo, &config),
        Commands::Deadcode { fixture, include_generated, roots } => {
            run_deadcode(fixture, *include_generated || config.include_generated, roots, &config)
        }
        Commands::Completions { shell } => {
            run_completions(*shell);
            Ok(())
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "ssa-tool", &mut io::stdout());
}

fn run_dump(fixture: &str, function: Option<&str>, config: &CliConfig) -> anyhow::Result<()> {
    let packages = load_fixture(fixture)?;
    let (program, diagnostics) = compile::compile(packages, config.build_mode());
    report_diagnostics(&diagnostics);

    let mut ids = program.all_function_ids();
    ids.sort_by_key(|id| id.0);
    let mut printed = 0;
    for id in ids {
        let Some(f) = program.function(id) else { continue };
        if let Some(want) = function {
            if f.name != want {
                continue;
            }
        }
        drop(f);
        if let Some(text) = ssa_ir::dump::dump_function_by_id(&program, id) {
            print!("{text}");
            println!();
            printed += 1;
        }
    }
    if printed == 0 {
        if let Some(want) = function {
            anyhow::bail!("no function named {want:?} in fixture {fixture:?}");
        }
    }
    Ok(())
}

fn run_callgraph(fixture: &str, algo: Algo, config: &CliConfig) -> anyhow::Result<()> {
    let packages = load_fixture(fixture)?;
    let (program, diagnostics) = compile::compile(packages, config.build_mode());
    report_diagnostics(&diagnostics);

    let graph = match algo {
        Algo::Static => ssa_callgraph::static_cg::build(&program),
        Algo::Cha => ssa_callgraph::cha::build(&program),
        Algo::Rta => ssa_callgraph::rta::build(&program),
        Algo::Vta => ssa_callgraph::vta::build(&program),
    };

    let mut edges: Vec<_> = graph.edges.iter().collect();
    edges.sort_by_key(|e| (e.caller.0, e.callee.0, e.site.0));
    for edge in edges {
        let caller = function_label(&program, edge.caller);
        let callee = function_label(&program, edge.callee);
        let kind = match edge.kind {
            ssa_callgraph::EdgeKind::Static => "static",
            ssa_callgraph::EdgeKind::Dynamic => "dynamic",
        };
        println!("{caller} --> {callee} ({kind})");
    }
    Ok(())
}

fn run_deadcode(fixture: &str, include_generated: bool, roots: &[String], config: &CliConfig) -> anyhow::Result<()> {
    let packages = load_fixture(fixture)?;
    let (program, diagnostics) = compile::compile(packages, config.build_mode());
    report_diagnostics(&diagnostics);

    let graph = ssa_callgraph::rta::build(&program);

    if roots.is_empty() {
        let report = ssa_deadcode::report(&program, &graph, include_generated);
        for pkg in &report.packages {
            for f in &pkg.functions {
                let pos = f.pos.as_ref().map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());
                let generated = program.function(f.id).is_some_and(|func| func.generated);
                println!("{} {} {} generated={generated}", pkg.package, f.name, pos);
            }
        }
        if report.skipped_generated > 0 {
            eprintln!("skipped {} generated declaration(s); pass --include-generated to include them", report.skipped_generated);
        }
        return Ok(());
    }

    for name in roots {
        let Some(id) = program.all_function_ids().into_iter().find(|&id| program.function(id).is_some_and(|f| f.name == *name))
        else {
            eprintln!("{name}: no such function");
            continue;
        };
        match ssa_deadcode::why_live(&program, &graph, id) {
            Some(path) if path.path.is_empty() => println!("{name}: is itself a root"),
            Some(path) => {
                let steps: Vec<String> = path.path.iter().map(|e| function_label(&program, e.caller)).collect();
                println!("{name}: live via {} --> {name}", steps.join(" --> "));
            }
            None => println!("{name}: unreachable"),
        }
    }
    Ok(())
}

fn function_label(program: &ssa_ir::Program, id: ssa_ir::FunctionId) -> String {
    program.function(id).map(|f| f.name.clone()).unwrap_or_else(|| format!("f{}", id.0))
}

fn report_diagnostics(diagnostics: &[ssa_build::Diagnostic]) {
    for d in diagnostics {
        tracing::warn!("{}", d);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("ssa_cli=info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

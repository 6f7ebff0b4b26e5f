//! Assembles a `Program` from a set of type-checked packages: every
//! package's members must exist (Create) before any package's bodies are
//! built (Build), since a cross-package call or a package initializer's
//! call to an imported package's `init` resolves through `Package::member`,
//! which Create alone populates.

use ssa_ir::input::CheckedPackage;
use ssa_ir::{BuildMode, FunctionId, Program};

/// Builds every package in `packages` into a fresh [`Program`], returning it
/// together with every diagnostic collected along the way.
#[tracing::instrument(skip(packages), fields(packages = packages.len()))]
pub fn compile(packages: Vec<CheckedPackage>, mode: BuildMode) -> (Program, Vec<ssa_build::Diagnostic>) {
    let program = Program::new(mode);

    let created: Vec<(CheckedPackage, ssa_ir::CreateResult)> = packages
        .into_iter()
        .map(|pkg| {
            tracing::debug!(package = %pkg.path, "creating package");
            if program.mode.log_source {
                for file in &pkg.files {
                    tracing::info!(package = %pkg.path, file = %file.name, generated = file.generated, "source file");
                }
            }
            let result = ssa_ir::create_package(&program, pkg.clone(), true);
            (pkg, result)
        })
        .collect();

    let mut diagnostics = Vec::new();
    // Package bodies build independently of one another once Create has run
    // for every package (cross-package resolution only ever reads
    // `Package::member`, never another package's build queue), so builds
    // fan out across a bounded thread pool unless `build_serially` asks for
    // the single-threaded, deterministically-ordered fallback.
    if program.mode.build_serially {
        for (pkg, result) in &created {
            tracing::debug!(package = %pkg.path, functions = result.queued.len(), "building package");
            diagnostics.extend(ssa_build::build_package(&program, pkg, &result.queued));
            finish_package(&program, &pkg.path, &result.queued);
        }
    } else {
        let workers = std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1).max(1);
        for chunk in created.chunks(workers) {
            let chunk_diags: Vec<Vec<ssa_build::Diagnostic>> = std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|(pkg, result)| {
                        let program = &program;
                        scope.spawn(move || {
                            tracing::debug!(package = %pkg.path, functions = result.queued.len(), "building package");
                            ssa_build::build_package(program, pkg, &result.queued)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().expect("package build thread panicked")).collect()
            });
            for (diags, (pkg, result)) in chunk_diags.into_iter().zip(chunk.iter()) {
                diagnostics.extend(diags);
                finish_package(&program, &pkg.path, &result.queued);
            }
        }
    }

    (program, diagnostics)
}

fn finish_package(program: &Program, pkg_path: &str, ids: &[FunctionId]) {
    if let Some(mut p) = program.package_mut(pkg_path) {
        p.finish_build();
    }
    if program.mode.print_packages || program.mode.print_functions {
        let _guard = program.print_mutex.lock().unwrap();
        if program.mode.print_packages {
            println!("package {pkg_path}");
        }
        if program.mode.print_functions {
            for &id in ids {
                if let Some(text) = ssa_ir::dump::dump_function_by_id(program, id) {
                    print!("{text}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures;

    use super::*;

    #[test]
    fn greet_and_main_compiles_without_diagnostics() {
        let packages = fixtures::greet_and_main();
        let (program, diagnostics) = compile(packages, BuildMode::new().with_sanity_check_functions(true));
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");

        let main_id = program
            .all_function_ids()
            .into_iter()
            .find(|&id| program.function(id).is_some_and(|f| f.name == "main"))
            .expect("fixture declares a main function");
        assert!(program.function(main_id).is_some());
    }

    #[test]
    fn build_serially_produces_the_same_function_count_as_the_threaded_path() {
        let threaded = {
            let packages = fixtures::greet_and_main();
            let (program, _) = compile(packages, BuildMode::new());
            program.all_function_ids().len()
        };
        let serial = {
            let packages = fixtures::greet_and_main();
            let (program, _) = compile(packages, BuildMode::new().with_build_serially(true));
            program.all_function_ids().len()
        };
        assert_eq!(threaded, serial);
    }

    #[test]
    fn unused_helper_is_reported_dead_by_rta_plus_the_reporter() {
        let packages = fixtures::greet_and_main();
        let (program, diagnostics) = compile(packages, BuildMode::new());
        assert!(diagnostics.is_empty());

        let graph = ssa_callgraph::rta::build(&program);
        let report = ssa_deadcode::report(&program, &graph, false);

        let dead_names: Vec<&str> = report
            .packages
            .iter()
            .flat_map(|p| p.functions.iter().map(|f| f.name.as_str()))
            .collect();
        assert!(dead_names.contains(&"unusedHelper"), "got {dead_names:?}");

        let main_id = program
            .all_function_ids()
            .into_iter()
            .find(|&id| program.function(id).is_some_and(|f| f.name == "main"))
            .expect("fixture declares a main function");
        assert!(graph.nodes.contains(&main_id), "main is reachable from RTA's roots");
    }
}

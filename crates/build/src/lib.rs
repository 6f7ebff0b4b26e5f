//! SSA construction: lowers a type-checked package into `ssa-ir`'s data
//! model (§4 "Build phase").
//!
//! [`build_package`] drains the builder's work queue of synthetic
//! functions discovered mid-build (bound methods, closures, generic
//! instantiations, range-over-func yield closures), runs the lifter unless
//! [`ssa_ir::BuildMode::naive_form`] is set, and runs the sanity pass when
//! [`ssa_ir::BuildMode::sanity_check_functions`] is set.

pub mod builder;
pub mod error;
pub mod lifter;
pub mod lower_expr;
pub mod pkginit;
pub mod range;
pub mod sanity;
pub mod select;
pub mod synth;

use ssa_ir::input::{CheckedPackage, Decl};
use ssa_ir::{Function, FunctionId, Program};

pub use builder::{build_function, BuiltFunction};
pub use error::{BuildError, Diagnostic, Severity};

/// Builds every declared function in `pkg`, then drains the queue of
/// synthetic functions those builds discover, until the queue is empty
/// (§5: all processed on this thread, one package's builds never spawn
/// work for another package's builder to pick up), and finally fills in
/// the synthetic package initializer's body.
///
/// `created` is `ssa_ir::create_package`'s `CreateResult::queued` for this
/// same package: one `FunctionId` per `Decl::Func` in `pkg.decls`, in
/// order, followed by the synthetic `init`'s id last. Reusing those ids
/// (rather than allocating fresh ones) is what lets a package's members —
/// registered once, during Create — keep pointing at the functions this
/// phase actually builds.
pub fn build_package(program: &Program, pkg: &CheckedPackage, created: &[FunctionId]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut queue: Vec<FunctionId> = Vec::new();

    let func_decls: Vec<&ssa_ir::input::FuncDecl> =
        pkg.decls.iter().filter_map(|d| match d { Decl::Func(f) => Some(f), _ => None }).collect();
    debug_assert_eq!(
        func_decls.len() + 1,
        created.len(),
        "build_package's `created` must be exactly create_package's returned queue for {}",
        pkg.path
    );

    for (func_decl, &id) in func_decls.iter().zip(created) {
        let Some(stub) = program.take_function(id) else { continue };
        build_and_finish(program, stub, func_decl, &mut queue, &mut diagnostics);
    }

    while let Some(id) = queue.pop() {
        let Some(func) = program.take_function(id) else { continue };
        // Synthetic functions are built directly by `synth.rs` at
        // discovery time; reaching this point with a `Stub` means the
        // function was queued for lifting/sanity only.
        finish_function(program, func, &mut queue, &mut diagnostics);
    }

    if let Some(&init_id) = created.last() {
        if let Some(stub) = program.take_function(init_id) {
            let mut func = pkginit::build(program, stub, pkg, &pkg.imports);
            if !program.mode.naive_form {
                lifter::lift(&mut func);
            }
            if program.mode.sanity_check_functions {
                if let Err(e) = sanity::check_function(program, &func) {
                    diagnostics.push(Diagnostic::warning(e.to_string()));
                }
            }
            program.insert_function(func);
        }
    }

    diagnostics
}

fn build_and_finish(
    program: &Program,
    stub: Function,
    decl: &ssa_ir::input::FuncDecl,
    queue: &mut Vec<FunctionId>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match build_function(program, stub, decl) {
        Ok(built) => {
            queue.extend(built.queued);
            let mut func = built.func;
            diagnostics.extend(built.diagnostics);
            if !program.mode.naive_form {
                lifter::lift(&mut func);
            }
            if program.mode.sanity_check_functions {
                if let Err(e) = sanity::check_function(program, &func) {
                    diagnostics.push(Diagnostic::warning(e.to_string()));
                }
            }
            program.insert_function(func);
        }
        Err(e) => diagnostics.push(Diagnostic::warning(e.to_string())),
    }
}

fn finish_function(
    program: &Program,
    mut func: Function,
    queue: &mut Vec<FunctionId>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if !program.mode.naive_form {
        lifter::lift(&mut func);
    }
    if program.mode.sanity_check_functions {
        if let Err(e) = sanity::check_function(program, &func) {
            diagnostics.push(Diagnostic::warning(e.to_string()));
        }
    }
    let _ = queue;
    program.insert_function(func);
}

//! Type checking for Quill
//!
//! Fills the type slot of every reachable action, inserts ownership
//! conversions, fixes cold lambdas from their first application and builds
//! the per-class dispatch tables.

mod check;
mod dispatch;
mod error;
pub mod generic;
mod lambda;
mod ownership;

use std::collections::HashSet;

use quill_ast::{Ast, FnId};
use tracing::{debug, instrument};

pub use error::{TypeError, TypeErrorKind, TypeResult};

use check::Typer;

/// Type every class, function and module entry. The first error aborts.
#[instrument(skip_all)]
pub fn check_types(ast: &mut Ast) -> TypeResult<()> {
    let mut typer = Typer::new(ast);
    for class in typer.ast.class_ids() {
        typer.check_class(class)?;
    }
    let mut built = HashSet::new();
    for class in typer.ast.class_ids() {
        typer.build_dispatch(class, &mut built)?;
    }
    let entries: HashSet<FnId> = typer.ast.modules.iter().filter_map(|m| m.entry).collect();
    for function in typer.ast.function_ids() {
        typer.check_function(function, entries.contains(&function))?;
    }
    typer.check_colds()?;
    debug!(
        types = typer.ast.types.len(),
        instances = typer.ast.instances.len(),
        colds = typer.ast.colds.ids().count(),
        "types checked"
    );
    Ok(())
}

//! Name resolution.
//!
//! Binds every identifier placeholder left by the parser to a local, a field,
//! a method, a function, a class or a class parameter, and builds the
//! flattened member table of every class on the way.

mod flatten;
mod resolve;

use quill_ast::{Ast, Location};
use thiserror::Error;
use tracing::instrument;

pub use flatten::flatten;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveErrorKind {
    #[error("unresolved name '{name}'")]
    UnresolvedName { name: String },
    #[error("duplicate member '{name}'")]
    DuplicateMember { name: String },
    #[error("name '{name}' is ambiguous between {candidates}")]
    AmbiguousName { name: String, candidates: String },
    #[error("member '{name}' is reachable through several bases")]
    AmbiguousMember { name: String },
    #[error("class '{class}' composes '{base}' ambiguously")]
    AmbiguousInheritance { class: String, base: String },
    #[error("class '{class}' inherits from itself")]
    SelfInheritance { class: String },
    #[error("class '{class}' has more than one concrete base")]
    MultipleConcreteBases { class: String },
    #[error("interface '{class}' cannot extend class '{base}'")]
    InterfaceExtendsClass { class: String, base: String },
    #[error("class '{class}' cannot inherit from a class parameter")]
    ParamAsBase { class: String },
    #[error("'{name}' is a {role}, expected {expected}")]
    ConflictingRole {
        name: String,
        role: &'static str,
        expected: &'static str,
    },
    #[error("class '{class}' expects {expected} parameters, got {actual}")]
    ArityMismatch {
        class: String,
        expected: usize,
        actual: usize,
    },
    #[error("expected a type name")]
    ExpectedTypeName,
    #[error("class parameters cannot take parameters")]
    ParameterizedParam,
    #[error("bound of '{param}' must be a non-generic class")]
    InvalidBound { param: String },
    #[error("'this' used outside of a class")]
    ThisOutsideClass,
}

#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct ResolveError {
    pub kind: ResolveErrorKind,
    pub loc: Location,
}

impl ResolveError {
    pub fn new(kind: ResolveErrorKind, loc: Location) -> Self {
        Self { kind, loc }
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Resolve all modules loaded into `ast`. The first error aborts.
#[instrument(skip_all)]
pub fn resolve_names(ast: &mut Ast) -> ResolveResult<()> {
    resolve::Resolver::new(ast).run()
}

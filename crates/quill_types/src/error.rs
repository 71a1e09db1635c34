use quill_ast::Location;
use thiserror::Error;

/// What went wrong while typing; types are rendered with [`quill_ast::Ast::type_name`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeErrorKind {
    #[error("expected int or double, found {actual}")]
    ExpectedIntOrDouble { actual: String },
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },
    #[error("incompatible types {first} and {second}")]
    IncompatibleTypes { first: String, second: String },
    #[error("member '{name}' is reachable through several bases")]
    AmbiguousMember { name: String },
    #[error("'{class}' has no member '{name}'")]
    UnknownMember { class: String, name: String },
    #[error("{actual} is not callable")]
    NotCallable { actual: String },
    #[error("expected {expected} arguments, found {actual}")]
    ParamCountMismatch { expected: usize, actual: usize },
    #[error("temporary reference {actual} cannot be stored")]
    TemporaryReference { actual: String },
    #[error("circular dependency while inferring a type")]
    CircularDependency,
    #[error("cannot take ownership: expected {expected}, found {actual}")]
    InvalidOwnershipConversion { expected: String, actual: String },
    #[error("class '{class}' does not implement '{method}'")]
    MissingImplementation { class: String, method: String },
    #[error("unsupported: {what}")]
    Unsupported { what: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct TypeError {
    pub kind: TypeErrorKind,
    pub loc: Location,
}

impl TypeError {
    pub fn new(kind: TypeErrorKind, loc: Location) -> Self {
        Self { kind, loc }
    }
}

pub type TypeResult<T> = Result<T, TypeError>;

/// Attach a location to a location-free result
pub(crate) trait Locate<T> {
    fn at(self, loc: Location) -> TypeResult<T>;
}

impl<T> Locate<T> for Result<T, TypeErrorKind> {
    fn at(self, loc: Location) -> TypeResult<T> {
        self.map_err(|kind| TypeError::new(kind, loc))
    }
}

pub(crate) fn internal(message: impl Into<String>) -> TypeErrorKind {
    TypeErrorKind::Internal { message: message.into() }
}

//! Error types for tool registration, lookup, and invocation.

use voxhook_types::{CacheKey, CacheKind};

/// Boxed error returned by user tool handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building a [`ToolDefinition`](crate::ToolDefinition).
///
/// These are developer errors and surface at registration time, never at
/// call time.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// A parameter declared a type outside the supported primitive kinds.
    #[error("parameter `{param}` of {owner}.{method}() has unsupported type `{type_name}` (expected string, integer or boolean)")]
    UnsupportedParamType {
        owner: String,
        method: String,
        param: String,
        type_name: String,
    },

    /// The same parameter name was declared twice.
    #[error("parameter `{param}` of {owner}.{method}() is declared more than once")]
    DuplicateParam {
        owner: String,
        method: String,
        param: String,
    },

    /// A required identifier was empty.
    #[error("{owner}.{method}(): {field} must not be empty")]
    EmptyField {
        owner: String,
        method: String,
        field: &'static str,
    },

    /// No handler was attached before `build()`.
    #[error("{owner}.{method}() has no handler")]
    MissingHandler { owner: String, method: String },
}

/// Errors raised by [`FunctionCache`](crate::FunctionCache) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// A second target was registered under a name already present for the key.
    #[error("{kind} `{name}` is already declared for {key}")]
    AlreadyDeclared {
        kind: CacheKind,
        key: CacheKey,
        name: String,
    },

    /// No entry exists for the key (never registered, or already purged).
    #[error("{kind} cache entry not found for {key}")]
    NotFound { kind: CacheKind, key: CacheKey },

    /// The entry exists but holds no function with the requested name.
    #[error("{kind} `{name}` not found for {key}")]
    FunctionNotFound {
        kind: CacheKind,
        key: CacheKey,
        name: String,
    },
}

/// Failure to turn a JSON argument into the declared parameter kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    #[error("arguments must be a JSON object")]
    NotAnObject,

    #[error("missing argument `{0}`")]
    Missing(String),

    #[error("argument `{name}` cannot be converted to {expected}: {value}")]
    WrongKind {
        name: String,
        expected: &'static str,
        value: String,
    },
}

/// Why an invocation failed.
#[derive(Debug, thiserror::Error)]
pub enum InvocationCause {
    #[error("{0}")]
    Argument(#[from] ArgumentError),

    #[error("{0}")]
    Handler(BoxError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// A failed tool or function invocation.
///
/// The display form names the owning type and method so the message that
/// reaches the voice platform identifies which target failed.
#[derive(Debug, thiserror::Error)]
#[error("Error invoking method {owner}.{method}(): {cause}")]
pub struct InvocationError {
    pub owner: String,
    pub method: String,
    #[source]
    pub cause: InvocationCause,
}

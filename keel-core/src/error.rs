// Error types for the Keel framework core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Binding registry
    #[error("Binding not found: {0}")]
    BindingNotFound(String),

    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    #[error("Binding '{id}' does not hold a value of type {expected}")]
    BindingTypeMismatch { id: String, expected: &'static str },

    #[error("No module loader configured to autoload '{0}'")]
    LoaderUnavailable(String),

    #[error("Failed to load module {path}: {reason}")]
    ModuleLoad { path: String, reason: String },

    // Route table
    #[error("Duplicate route name: {0}")]
    DuplicateRouteName(String),

    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Missing parameter '{param}' for route '{route}'")]
    MissingRouteParam { route: String, param: String },

    #[error("Cannot register '{0}': router is already committed")]
    RegistrationAfterCommit(String),

    #[error("Router must be committed before {0}")]
    RouterNotCommitted(&'static str),

    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    // Dispatch and ambient
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code a dispatcher should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) => 404,
            _ => 500,
        }
    }

    /// Check if this error belongs to the bootstrap phase.
    ///
    /// Configuration errors are meant to abort startup rather than be
    /// handled per request.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DuplicateRouteName(_)
                | Error::InvalidPattern { .. }
                | Error::CircularDependency { .. }
                | Error::RegistrationAfterCommit(_)
                | Error::Config(_)
        )
    }

    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

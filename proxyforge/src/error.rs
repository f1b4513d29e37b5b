//! Error handling for proxy generation and dispatch.
//!
//! Configuration errors surface while a proxy class is being built and never
//! leave a half-configured class behind. Call-time errors surface from
//! [`ProxyInstance::invoke`](crate::proxy::ProxyInstance::invoke); failures raised by
//! user handlers and wrapped targets are passed through untouched.

use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    /// A function table was configured without any handler.
    #[error("function table must contain at least one handler")]
    EmptyFunctionTable,

    /// A wrapped target cannot satisfy a method its predicate claims.
    #[error("delegate type '{target_type}' has no method compatible with {method}")]
    IncompatibleDelegate { method: String, target_type: String },

    /// Two captured properties resolved to the same field name.
    #[error("duplicate captured property '{0}'")]
    DuplicateProperty(String),

    /// The contract declares the same signature twice.
    #[error("contract '{contract}' declares {method} more than once")]
    DuplicateMethod { contract: String, method: String },

    /// Constructor arguments do not line up with the captured properties.
    #[error("expected {expected} constructor arguments, got {actual}")]
    ConstructorArity { expected: usize, actual: usize },

    #[error("constructor argument for '{property}' must be {expected}, got {actual}")]
    ConstructorArgument {
        property: String,
        expected: String,
        actual: String,
    },

    /// The code emitter rejected a dispatch sequence.
    #[error("invalid dispatch sequence for {method}: {reason}")]
    InvalidSequence { method: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown method {0}")]
    UnknownMethod(String),

    #[error("{method} expects {expected} arguments, got {actual}")]
    ArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("argument {index} of {method} must be {expected}, got {actual}")]
    ArgumentType {
        method: String,
        index: usize,
        expected: String,
        actual: String,
    },

    /// A handler result could not be cast to the declared return type.
    #[error("cannot cast {actual} to {expected}")]
    Coercion { expected: String, actual: String },

    /// No strategy claimed the method and no default handler is installed.
    #[error("no handler for {0}")]
    Unhandled(String),

    /// Failure raised by a function table handler.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Failure raised by a wrapped target or its supplier.
    #[error("target failed: {0}")]
    Target(String),
}

impl ProxyError {
    pub fn handler(message: impl Into<String>) -> Self {
        ProxyError::Handler(message.into())
    }

    pub fn target(message: impl Into<String>) -> Self {
        ProxyError::Target(message.into())
    }

    /// Whether this error belongs to the build-time configuration class.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProxyError::EmptyFunctionTable
                | ProxyError::IncompatibleDelegate { .. }
                | ProxyError::DuplicateProperty(_)
                | ProxyError::DuplicateMethod { .. }
                | ProxyError::ConstructorArity { .. }
                | ProxyError::ConstructorArgument { .. }
                | ProxyError::InvalidSequence { .. }
                | ProxyError::Config(_)
        )
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        ProxyError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(e: serde_json::Error) -> Self {
        ProxyError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for ProxyError {
    fn from(e: toml::de::Error) -> Self {
        ProxyError::Config(e.to_string())
    }
}

use serde_derive::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Result returning Error
/// 包装一个新的错误类型
pub type Result<T> = std::result::Result<T, Error>;

/// relkv errors. All except Internal and Config are considered user-facing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// Invalid configuration
    Config(String),
    /// Unexpected failure in the engine or the store
    Internal(String),
    /// Integrity violation: duplicate key, unique index, foreign key
    Integrity(String),
    /// Not found: zero rows matched, unknown database
    NotFound(String),
    /// Malformed command
    Parse(String),
    /// Missing database selection, unknown table or column, duplicates
    Schema(String),
    /// Value not convertible to the declared column type
    Type(String),
    /// Semantically invalid command
    Value(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(s) => write!(f, "config error: {}", s),
            Error::Internal(s) => write!(f, "internal error: {}", s),
            Error::Integrity(s) => write!(f, "integrity error: {}", s),
            Error::NotFound(s) => write!(f, "not found: {}", s),
            Error::Parse(s) => write!(f, "syntax error: {}", s),
            Error::Schema(s) => write!(f, "schema error: {}", s),
            Error::Type(s) => write!(f, "type error: {}", s),
            Error::Value(s) => write!(f, "invalid command: {}", s),
        }
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(err: std::net::AddrParseError) -> Self {
        Error::Config(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(err.to_string())
    }
}

use std::fmt;
use std::sync::Arc;
use xqdb_core::{LockError, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Static,
    Dynamic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Static => "static",
            ErrorKind::Dynamic => "dynamic",
        })
    }
}

/// Error codes raised by the query engine.
///
/// Standard XQuery codes are used where one applies; `XQDB*` and `LOCK*`
/// are specific to this database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    XPST0003, // syntax error
    XPST0008, // undeclared variable
    XPST0017, // unknown function or wrong arity
    XPDY0002, // context item or variable value absent
    XPTY0004, // type error
    FORG0006, // invalid argument type (effective boolean value)
    FODC0002, // resource retrieval failed
    XQDB0001, // resource uri is not a string literal
    XQDB0002, // query exceeds the expression limit
    LOCK0001, // document lock could not be acquired
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            XPST0003 => "err:XPST0003",
            XPST0008 => "err:XPST0008",
            XPST0017 => "err:XPST0017",
            XPDY0002 => "err:XPDY0002",
            XPTY0004 => "err:XPTY0004",
            FORG0006 => "err:FORG0006",
            FODC0002 => "err:FODC0002",
            XQDB0001 => "err:XQDB0001",
            XQDB0002 => "err:XQDB0002",
            LOCK0001 => "err:LOCK0001",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message} ({code})")]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn static_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Static, code, message: message.into(), source: None }
    }

    pub fn dynamic(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Dynamic, code, message: message.into(), source: None }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn is_static(&self) -> bool {
        self.kind == ErrorKind::Static
    }
}

impl From<LockError> for Error {
    fn from(err: LockError) -> Self {
        let message = format!("could not acquire {} lock on document {}", err.mode(), err.document());
        Error::dynamic(ErrorCode::LOCK0001, message).with_source(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Lock(lock) => lock.into(),
            other => Error::dynamic(ErrorCode::FODC0002, other.to_string()).with_source(other),
        }
    }
}

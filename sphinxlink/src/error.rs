//! `sphinxlink` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::{
    connection::ParseError,
    encoding::EncodingError,
    fetch::ShapeMismatch,
    mysql::{ProtocolError, ServerError, auth::UnsupportedAuth},
    query::Interrupted,
    registry::{CredentialMismatch, DuplicateName, NotFound},
    row::DecodeError,
};

/// A specialized [`Result`] type for `sphinxlink` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `sphinxlink` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns the server error text, if the server rejected a query or a connection.
    pub fn server_error(&self) -> Option<&ServerError> {
        match &self.kind {
            ErrorKind::Query(e) => Some(e),
            ErrorKind::Connect(kind) => match &**kind {
                ErrorKind::Query(e) => Some(e),
                _ => None,
            },
            _ => None,
        }
    }

    /// Prefix the error message with `context`.
    pub(crate) fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub(crate) fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Io(_))
    }

    pub(crate) fn is_server(&self) -> bool {
        matches!(self.kind, ErrorKind::Query(_))
    }

    pub(crate) fn is_protocol(&self) -> bool {
        matches!(self.kind, ErrorKind::Protocol(_))
    }

    /// Classify a failure while establishing a session as [`ErrorKind::Connect`].
    pub(crate) fn into_connect(mut self) -> Self {
        self.kind = match self.kind {
            kind @ (ErrorKind::Config(_) | ErrorKind::Connect(_)) => kind,
            kind => ErrorKind::Connect(Box::new(kind)),
        };
        self
    }
}

/// All possible error kind from `sphinxlink` library.
pub enum ErrorKind {
    /// Invalid configuration.
    Config(ParseError),
    /// Session could not be established, holds the underlying cause.
    Connect(Box<ErrorKind>),
    /// A connection with the same name already exists.
    DuplicateName(DuplicateName),
    /// No connection with the given name.
    NotFound(NotFound),
    /// Implicit connection name exists with another host or port.
    CredentialMismatch(CredentialMismatch),
    /// Server rejected the query.
    Query(ServerError),
    /// Result columns do not match the expected row shape.
    ShapeMismatch(ShapeMismatch),
    /// Text could not be converted between the wire and host encoding.
    Encoding(EncodingError),
    /// Caller requested cancellation.
    Interrupted(Interrupted),
    Protocol(ProtocolError),
    Io(io::Error),
    UnsupportedAuth(UnsupportedAuth),
    Decode(DecodeError),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<DuplicateName>e => ErrorKind::DuplicateName(e));
from!(<NotFound>e => ErrorKind::NotFound(e));
from!(<CredentialMismatch>e => ErrorKind::CredentialMismatch(e));
from!(<ServerError>e => ErrorKind::Query(e));
from!(<ShapeMismatch>e => ErrorKind::ShapeMismatch(e));
from!(<EncodingError>e => ErrorKind::Encoding(e));
from!(<Interrupted>e => ErrorKind::Interrupted(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<std::io::Error>e => ErrorKind::Io(e));
from!(<UnsupportedAuth>e => ErrorKind::UnsupportedAuth(e));

from!(<DecodeError>e => ErrorKind::Decode(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => fmt::Display::fmt(e, f),
            Self::Connect(e) => fmt::Display::fmt(e, f),
            Self::DuplicateName(e) => fmt::Display::fmt(e, f),
            Self::NotFound(e) => fmt::Display::fmt(e, f),
            Self::CredentialMismatch(e) => fmt::Display::fmt(e, f),
            Self::Query(e) => fmt::Display::fmt(e, f),
            Self::ShapeMismatch(e) => fmt::Display::fmt(e, f),
            Self::Encoding(e) => fmt::Display::fmt(e, f),
            Self::Interrupted(e) => fmt::Display::fmt(e, f),
            Self::Protocol(e) => fmt::Display::fmt(e, f),
            Self::Io(e) => fmt::Display::fmt(e, f),
            Self::UnsupportedAuth(e) => fmt::Display::fmt(e, f),
            Self::Decode(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

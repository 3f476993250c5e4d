//! Protocol error
use std::fmt;

/// An error when translating buffer from `searchd`.
pub enum ProtocolError {
    /// Packet header byte not expected in the current phase.
    Unexpected {
        found: u8,
        phase: &'static str,
    },
    /// Packet ended before a field could be read.
    Truncated {
        phase: &'static str,
    },
    /// Sequence id did not follow the previous packet.
    Sequence {
        expect: u8,
        found: u8,
    },
    /// Handshake protocol version other than 10.
    Version(u8),
    /// Server does not speak protocol 4.1.
    Protocol41,
    /// `LOCAL INFILE` requests are refused.
    LocalInfile,
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Unexpected { found, phase } => {
                write!(f, "unexpected packet header `0x{found:02x}` in `{phase}`")
            },
            Self::Truncated { phase } => write!(f, "truncated packet in `{phase}`"),
            Self::Sequence { expect, found } => {
                write!(f, "packet out of order, expected sequence {expect} found {found}")
            },
            Self::Version(v) => write!(f, "unsupported handshake protocol version {v}"),
            Self::Protocol41 => f.write_str("server does not support protocol 4.1"),
            Self::LocalInfile => f.write_str("LOCAL INFILE request is not supported"),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl ProtocolError {
    pub(crate) fn unexpected(found: u8, phase: &'static str) -> ProtocolError {
        Self::Unexpected { found, phase }
    }

    pub(crate) fn truncated(phase: &'static str) -> ProtocolError {
        Self::Truncated { phase }
    }
}

//! MySQL Client/Server Protocol, as spoken by `searchd`
//!
//! Sphinx and Manticore expose their SphinxQL interface over the MySQL wire protocol. Only the
//! subset a text-protocol client needs is implemented here.
//!
//! ## Packets
//!
//! Every message, in both directions, is split into packets. Each packet starts with a 4 bytes
//! header: the payload length as a little-endian 24 bit integer, followed by a sequence id.
//!
//! ```text
//! ┏━━━━━━━━━━━━━━┳━━━━━┳━━━━━━━━━┓
//! ┃    Length    ┃ Seq ┃ Payload ┃
//! ┣━━━━━━━━━━━━━━╋━━━━━╋━━━━━━━━━┫
//! ┃    u24 le    ┃ u8  ┃  [u8]   ┃
//! ┣━━━━━━━━━━━━━━╋━━━━━╋━━━━━━━━━┫
//! ┃ 2c | 00 | 00 ┃ 00  ┃   ..    ┃
//! ┗━━━━━━━━━━━━━━┻━━━━━┻━━━━━━━━━┛
//! ```
//!
//! The sequence id starts at zero for every new command sent by the client and is incremented
//! by each packet of the exchange. A payload of exactly `0xFFFFFF` bytes means the message
//! continues in the next packet.
//!
//! ## Connection Lifecycle
//!
//! The server speaks first with a [`Handshake`][backend::Handshake], the client answers with a
//! [`HandshakeResponse`][frontend::HandshakeResponse], and the server replies with an `OK` or an
//! `ERR` packet. Afterwards the client sends commands such as [`ComQuery`][frontend::ComQuery].
//!
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/PAGE_PROTOCOL.html>

pub mod frontend;
pub mod backend;
pub mod auth;

mod error;

pub use frontend::FrontendProtocol;
pub use backend::{BackendProtocol, ServerError};
pub use error::ProtocolError;

/// Largest payload a single packet can carry.
pub const MAX_PAYLOAD: usize = 0xFF_FF_FF;

/// Packet header size, payload length and sequence id.
pub const HEADER_LEN: usize = 4;

/// `utf8_general_ci`, `searchd` only speaks UTF-8.
pub const UTF8_GENERAL_CI: u8 = 33;

/// Capability flags, exchanged during the handshake.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__capabilities__flags.html>
pub mod capability {
    pub const LONG_PASSWORD: u32 = 0x0000_0001;
    pub const FOUND_ROWS: u32 = 0x0000_0002;
    pub const LONG_FLAG: u32 = 0x0000_0004;
    pub const CONNECT_WITH_DB: u32 = 0x0000_0008;
    pub const PROTOCOL_41: u32 = 0x0000_0200;
    pub const TRANSACTIONS: u32 = 0x0000_2000;
    pub const SECURE_CONNECTION: u32 = 0x0000_8000;
    pub const MULTI_STATEMENTS: u32 = 0x0001_0000;
    pub const MULTI_RESULTS: u32 = 0x0002_0000;
    pub const PLUGIN_AUTH: u32 = 0x0008_0000;
    pub const PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x0020_0000;

    /// Capabilities this client would like to use, intersected with the server ones.
    pub const CLIENT: u32 = LONG_PASSWORD
        | FOUND_ROWS
        | LONG_FLAG
        | PROTOCOL_41
        | TRANSACTIONS
        | SECURE_CONNECTION
        | MULTI_STATEMENTS
        | MULTI_RESULTS
        | PLUGIN_AUTH;
}

/// Server status flags, carried by `OK` and `EOF` packets.
pub mod status {
    pub const IN_TRANS: u16 = 0x0001;
    pub const AUTOCOMMIT: u16 = 0x0002;
    /// Another result set follows the current one.
    pub const MORE_RESULTS_EXISTS: u16 = 0x0008;
}

/// Command bytes.
pub mod command {
    pub const QUIT: u8 = 0x01;
    pub const QUERY: u8 = 0x03;
    pub const PING: u8 = 0x0E;
}

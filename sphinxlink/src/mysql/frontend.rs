//! Client Messages
//!
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_command_phase.html>
use bytes::{BufMut, BytesMut};

use super::{HEADER_LEN, MAX_PAYLOAD, capability, command};
use crate::ext::{BufMutExt, lenenc_int_len};

/// Write a client message to `buf`, splitting it into as many packets as needed.
///
/// `seq` is the sequence id of the first packet, and is advanced past the last one.
pub fn write<F: FrontendProtocol>(msg: F, seq: &mut u8, buf: &mut BytesMut) {
    let size_hint = msg.size_hint();
    buf.reserve(HEADER_LEN + size_hint);

    let offset = buf.len();
    buf.put_bytes(0, HEADER_LEN);
    msg.encode(&mut *buf);

    let len = buf.len() - offset - HEADER_LEN;
    assert_eq!(len, size_hint, "Frontend message body size not equal to size hint");

    if len < MAX_PAYLOAD {
        put_header(&mut buf[offset..], len, *seq);
        *seq = seq.wrapping_add(1);
        return;
    }

    let mut payload = buf.split_off(offset + HEADER_LEN);
    buf.truncate(offset);

    // a payload of exactly `MAX_PAYLOAD` is followed by an empty packet
    loop {
        let chunk = payload.split_to(payload.len().min(MAX_PAYLOAD));
        let mut header = [0u8; HEADER_LEN];
        put_header(&mut header, chunk.len(), *seq);
        *seq = seq.wrapping_add(1);
        buf.put_slice(&header);
        buf.put_slice(&chunk);
        if chunk.len() < MAX_PAYLOAD {
            break;
        }
    }
}

fn put_header(mut dst: &mut [u8], len: usize, seq: u8) {
    dst.put_uint_le(len as u64, 3);
    dst.put_u8(seq);
}

/// A type which can be encoded into a client message.
pub trait FrontendProtocol {
    /// Size of the payload.
    fn size_hint(&self) -> usize;

    /// Write the payload.
    ///
    /// The length of payload written must be equal to the
    /// length returned by [`size_hint`][FrontendProtocol::size_hint].
    fn encode(self, buf: impl BufMut);
}

/// `Protocol::HandshakeResponse41`, the answer to the server [`Handshake`][1].
///
/// [1]: super::backend::Handshake
#[derive(Debug)]
pub struct HandshakeResponse<'a> {
    /// Capability flags of the client, already intersected with the server ones.
    pub capabilities: u32,
    /// Maximum size of a command packet the client wants to send.
    pub max_packet: u32,
    /// Connection character set.
    pub charset: u8,
    pub user: &'a [u8],
    /// Opaque authentication response data generated by the authentication method.
    pub auth_response: &'a [u8],
    /// Initial database, only sent with `CLIENT_CONNECT_WITH_DB`.
    pub database: Option<&'a [u8]>,
    /// Authentication method used to generate `auth_response`.
    pub auth_plugin: Option<&'a [u8]>,
}

impl FrontendProtocol for HandshakeResponse<'_> {
    fn size_hint(&self) -> usize {
        let auth = match self.capabilities & capability::PLUGIN_AUTH_LENENC_CLIENT_DATA {
            0 => 1 + self.auth_response.len(),
            _ => lenenc_int_len(self.auth_response.len() as u64) + self.auth_response.len(),
        };
        4 + 4 + 1 + 23
            + self.user.len() + 1
            + auth
            + self.database.map_or(0, |e| e.len() + 1)
            + self.auth_plugin.map_or(0, |e| e.len() + 1)
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u32_le(self.capabilities);
        buf.put_u32_le(self.max_packet);
        buf.put_u8(self.charset);
        buf.put_bytes(0, 23);
        buf.put_nul_bytes(self.user);

        match self.capabilities & capability::PLUGIN_AUTH_LENENC_CLIENT_DATA {
            0 => {
                buf.put_u8(self.auth_response.len() as u8);
                buf.put(self.auth_response);
            },
            _ => buf.put_lenenc_bytes(self.auth_response),
        }

        if let Some(db) = self.database {
            buf.put_nul_bytes(db);
        }

        if let Some(plugin) = self.auth_plugin {
            buf.put_nul_bytes(plugin);
        }
    }
}

/// Answer to an `AuthSwitchRequest`, carrying only the authentication data.
#[derive(Debug)]
pub struct AuthSwitchResponse<'a> {
    pub data: &'a [u8],
}

impl FrontendProtocol for AuthSwitchResponse<'_> {
    fn size_hint(&self) -> usize {
        self.data.len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put(self.data);
    }
}

/// `COM_QUERY`, run a text based query.
///
/// The response is an `OK`, an `ERR`, or a text result set.
#[derive(Debug)]
pub struct ComQuery<'a> {
    /// Query text, already in the connection character set.
    pub sql: &'a [u8],
}

impl FrontendProtocol for ComQuery<'_> {
    fn size_hint(&self) -> usize {
        1 + self.sql.len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(command::QUERY);
        buf.put(self.sql);
    }
}

/// `COM_PING`, check whether the server is alive.
#[derive(Debug)]
pub struct ComPing;

impl FrontendProtocol for ComPing {
    fn size_hint(&self) -> usize {
        1
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(command::PING);
    }
}

/// `COM_QUIT`, ask the server to close the connection.
///
/// The server either closes the connection or answers with an `ERR`.
#[derive(Debug)]
pub struct ComQuit;

impl FrontendProtocol for ComQuit {
    fn size_hint(&self) -> usize {
        1
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(command::QUIT);
    }
}

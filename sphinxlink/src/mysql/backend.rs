//! Server Messages
//!
//! Unlike postgres, MySQL packets carry no message type. What a packet means depends on the
//! phase of the exchange, and for some phases on its first byte:
//!
//! - `0x00` an `OK` packet
//! - `0xFE` with a payload shorter than 9 bytes, an `EOF` packet
//! - `0xFF` an `ERR` packet, valid in every phase
//!
//! Each type here decodes the payload of one phase.
use bytes::{Buf, Bytes};
use std::fmt;

use super::{ProtocolError, capability};
use crate::{
    common::ByteStr,
    ext::{BytesExt, FmtExt},
};

/// A type that can be decoded from a server packet payload.
pub trait BackendProtocol: Sized {
    fn decode(body: Bytes) -> Result<Self, ProtocolError>;
}

/// Header byte of an `OK` packet.
pub const OK_HEADER: u8 = 0x00;
/// Header byte of an `EOF` packet.
pub const EOF_HEADER: u8 = 0xFE;
/// Header byte of an `ERR` packet.
pub const ERR_HEADER: u8 = 0xFF;
/// Header byte of a `LOCAL INFILE` request.
pub const LOCAL_INFILE_HEADER: u8 = 0xFB;

/// Returns `true` if `body` is an `EOF` packet.
///
/// A text row may also start with `0xFE` (an 8 bytes length prefix),
/// but such row is always at least 9 bytes long.
pub fn is_eof(body: &[u8]) -> bool {
    matches!(body.first(), Some(&EOF_HEADER)) && body.len() < 9
}

/// Returns `true` if `body` is an `ERR` packet.
pub fn is_err(body: &[u8]) -> bool {
    matches!(body.first(), Some(&ERR_HEADER))
}

/// `Protocol::HandshakeV10`, the first packet sent by the server.
#[derive(Debug)]
pub struct Handshake {
    pub protocol_version: u8,
    pub server_version: ByteStr,
    pub connection_id: u32,
    /// Both parts of the authentication plugin data, without the trailing nul.
    pub scramble: Bytes,
    pub capabilities: u32,
    pub charset: u8,
    pub status: u16,
    pub auth_plugin: Option<Bytes>,
}

impl BackendProtocol for Handshake {
    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        const PHASE: &str = "handshake";

        let protocol_version = body.try_u8(PHASE)?;
        if protocol_version != 10 {
            return Err(ProtocolError::Version(protocol_version));
        }

        let server_version = ByteStr::from_utf8_lossy(body.get_nul_bytes());
        let connection_id = body.try_u32_le(PHASE)?;
        let scramble_1 = body.try_split(8, PHASE)?;
        let _filler = body.try_u8(PHASE)?;
        let mut capabilities = body.try_u16_le(PHASE)? as u32;

        let mut me = Self {
            protocol_version,
            server_version,
            connection_id,
            scramble: scramble_1.clone(),
            capabilities,
            charset: 0,
            status: 0,
            auth_plugin: None,
        };

        // old servers stop here
        if !body.has_remaining() {
            return Ok(me);
        }

        me.charset = body.try_u8(PHASE)?;
        me.status = body.try_u16_le(PHASE)?;
        capabilities |= (body.try_u16_le(PHASE)? as u32) << 16;
        me.capabilities = capabilities;

        let auth_data_len = body.try_u8(PHASE)? as usize;
        let _reserved = body.try_split(10, PHASE)?;

        if capabilities & capability::SECURE_CONNECTION != 0 {
            let len = auth_data_len.saturating_sub(8).max(13).min(body.remaining());
            let mut scramble_2 = body.split_to(len);
            if scramble_2.last() == Some(&0) {
                scramble_2.truncate(scramble_2.len() - 1);
            }
            let mut scramble = Vec::with_capacity(scramble_1.len() + scramble_2.len());
            scramble.extend_from_slice(&scramble_1);
            scramble.extend_from_slice(&scramble_2);
            me.scramble = scramble.into();
        }

        if capabilities & capability::PLUGIN_AUTH != 0 && body.has_remaining() {
            me.auth_plugin = Some(body.get_nul_bytes());
        }

        Ok(me)
    }
}

/// `OK` packet, a command completed without a result set.
#[derive(Debug, Default)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status: u16,
    pub warnings: u16,
    pub info: Bytes,
}

impl BackendProtocol for OkPacket {
    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        const PHASE: &str = "ok packet";

        let header = body.try_u8(PHASE)?;
        if header != OK_HEADER && header != EOF_HEADER {
            return Err(ProtocolError::unexpected(header, PHASE));
        }

        Ok(Self {
            affected_rows: body.get_lenenc_int(PHASE)?.unwrap_or_default(),
            last_insert_id: body.get_lenenc_int(PHASE)?.unwrap_or_default(),
            status: body.try_u16_le(PHASE)?,
            warnings: body.try_u16_le(PHASE).unwrap_or_default(),
            info: body,
        })
    }
}

/// `EOF` packet, terminates column definitions and rows.
#[derive(Debug, Default)]
pub struct EofPacket {
    pub warnings: u16,
    pub status: u16,
}

impl BackendProtocol for EofPacket {
    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        const PHASE: &str = "eof packet";

        let header = body.try_u8(PHASE)?;
        if header != EOF_HEADER {
            return Err(ProtocolError::unexpected(header, PHASE));
        }

        // pre 4.1 eof carries nothing
        if !body.has_remaining() {
            return Ok(Self::default());
        }

        Ok(Self {
            warnings: body.try_u16_le(PHASE)?,
            status: body.try_u16_le(PHASE)?,
        })
    }
}

/// `ERR` packet.
///
/// This is the error text `searchd` returns for a rejected query, such as a syntax error or an
/// unknown index.
pub struct ServerError {
    code: u16,
    state: Option<ByteStr>,
    message: ByteStr,
}

impl ServerError {
    /// Error code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Five characters SQLSTATE, if the server sent one.
    pub fn sql_state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    /// Human readable error message, as sent by the server.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl BackendProtocol for ServerError {
    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        const PHASE: &str = "err packet";

        let header = body.try_u8(PHASE)?;
        if header != ERR_HEADER {
            return Err(ProtocolError::unexpected(header, PHASE));
        }

        let code = body.try_u16_le(PHASE)?;
        let state = match body.first() {
            Some(b'#') if body.len() >= 6 => {
                body.advance(1);
                Some(ByteStr::from_utf8_lossy(body.split_to(5)))
            },
            _ => None,
        };

        Ok(Self { code, state, message: ByteStr::from_utf8_lossy(body) })
    }
}

impl std::error::Error for ServerError { }

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            Some(state) => write!(f, "ERROR {} ({state}): {}", self.code, self.message),
            None => write!(f, "ERROR {}: {}", self.code, self.message),
        }
    }
}

impl fmt::Debug for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// `AuthSwitchRequest`, the server asks for another authentication method.
#[derive(Debug)]
pub struct AuthSwitchRequest {
    pub plugin: Bytes,
    /// Plugin data, without the trailing nul.
    pub data: Bytes,
}

impl BackendProtocol for AuthSwitchRequest {
    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        const PHASE: &str = "auth switch";

        let header = body.try_u8(PHASE)?;
        if header != EOF_HEADER {
            return Err(ProtocolError::unexpected(header, PHASE));
        }

        let plugin = body.get_nul_bytes();
        if body.last() == Some(&0) {
            body.truncate(body.len() - 1);
        }

        Ok(Self { plugin, data: body })
    }
}

/// Response to the handshake response.
#[derive(Debug)]
pub enum AuthResponse {
    Ok(OkPacket),
    Switch(AuthSwitchRequest),
}

impl BackendProtocol for AuthResponse {
    fn decode(body: Bytes) -> Result<Self, ProtocolError> {
        match body.first().copied() {
            Some(OK_HEADER) => OkPacket::decode(body).map(Self::Ok),
            Some(EOF_HEADER) => AuthSwitchRequest::decode(body).map(Self::Switch),
            Some(found) => Err(ProtocolError::unexpected(found, "authentication")),
            None => Err(ProtocolError::truncated("authentication")),
        }
    }
}

/// First packet of a `COM_QUERY` response.
#[derive(Debug)]
pub enum QueryResponse {
    /// Statement without result set.
    Ok(OkPacket),
    /// A result set with this many columns follows.
    ResultSet(u64),
}

impl BackendProtocol for QueryResponse {
    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        const PHASE: &str = "query response";

        match body.first().copied() {
            Some(OK_HEADER) => OkPacket::decode(body).map(Self::Ok),
            Some(LOCAL_INFILE_HEADER) => Err(ProtocolError::LocalInfile),
            Some(_) => match body.get_lenenc_int(PHASE)? {
                Some(count) => Ok(Self::ResultSet(count)),
                None => Err(ProtocolError::unexpected(LOCAL_INFILE_HEADER, PHASE)),
            },
            None => Err(ProtocolError::truncated(PHASE)),
        }
    }
}

/// `Protocol::ColumnDefinition41`
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub name: ByteStr,
    pub charset: u16,
    pub column_type: u8,
    pub flags: u16,
}

impl BackendProtocol for ColumnDefinition {
    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        const PHASE: &str = "column definition";

        let _catalog = body.get_lenenc_bytes(PHASE)?;
        let _schema = body.get_lenenc_bytes(PHASE)?;
        let _table = body.get_lenenc_bytes(PHASE)?;
        let _org_table = body.get_lenenc_bytes(PHASE)?;
        let name = body.get_lenenc_bytes(PHASE)?.unwrap_or_default();
        let _org_name = body.get_lenenc_bytes(PHASE)?;
        let _fixed_len = body.get_lenenc_int(PHASE)?;
        let charset = body.try_u16_le(PHASE)?;
        let _column_len = body.try_u32_le(PHASE)?;
        let column_type = body.try_u8(PHASE)?;
        let flags = body.try_u16_le(PHASE)?;

        Ok(Self {
            name: ByteStr::from_utf8_lossy(name),
            charset,
            column_type,
            flags,
        })
    }
}

/// `ProtocolText::ResultsetRow`, every value is sent as a string.
pub struct TextRow {
    fields: Vec<Option<Bytes>>,
}

impl TextRow {
    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at `idx`, [`None`] is `NULL`.
    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.fields.get(idx).and_then(Option::as_deref)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&[u8]>> {
        self.fields.iter().map(Option::as_deref)
    }

    #[cfg(test)]
    pub(crate) fn from_fields(fields: &[Option<&str>]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|e| e.map(|e| Bytes::copy_from_slice(e.as_bytes())))
                .collect(),
        }
    }
}

impl BackendProtocol for TextRow {
    fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let mut fields = Vec::new();
        while body.has_remaining() {
            fields.push(body.get_lenenc_bytes("text row")?);
        }
        Ok(Self { fields })
    }
}

impl fmt::Debug for TextRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_list();
        for field in self.iter() {
            match field {
                Some(value) => dbg.entry(&value.lossy()),
                None => dbg.entry(&format_args!("NULL")),
            };
        }
        dbg.finish()
    }
}

/// A packet in the rows phase of a result set.
#[derive(Debug)]
pub enum RowPacket {
    Row(TextRow),
    Eof(EofPacket),
}

impl BackendProtocol for RowPacket {
    fn decode(body: Bytes) -> Result<Self, ProtocolError> {
        match is_eof(&body) {
            true => EofPacket::decode(body).map(Self::Eof),
            false => TextRow::decode(body).map(Self::Row),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_handshake() {
        let mut body = Vec::new();
        body.push(10);
        body.extend_from_slice(b"2.2.11-id64-release\0");
        body.extend_from_slice(&7u32.to_le_bytes());
        body.extend_from_slice(b"abcdefgh");
        body.push(0);
        body.extend_from_slice(&0xF7FFu16.to_le_bytes());
        body.push(33);
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&0x0008u16.to_le_bytes());
        body.push(21);
        body.extend_from_slice(&[0; 10]);
        body.extend_from_slice(b"ijklmnopqrst\0");
        body.extend_from_slice(b"mysql_native_password\0");

        let hs = Handshake::decode(body.into()).unwrap();
        assert_eq!(hs.server_version, "2.2.11-id64-release");
        assert_eq!(hs.connection_id, 7);
        assert_eq!(&hs.scramble[..], b"abcdefghijklmnopqrst");
        assert_ne!(hs.capabilities & capability::PLUGIN_AUTH, 0);
        assert_eq!(hs.auth_plugin.as_deref(), Some(&b"mysql_native_password"[..]));
    }

    #[test]
    fn decode_err_packet() {
        let body = Bytes::from_static(b"\xff\x28\x04#42000sphinxql: syntax error");
        let err = ServerError::decode(body).unwrap();
        assert_eq!(err.code(), 1064);
        assert_eq!(err.sql_state(), Some("42000"));
        assert_eq!(err.message(), "sphinxql: syntax error");
        assert_eq!(err.to_string(), "ERROR 1064 (42000): sphinxql: syntax error");
    }

    #[test]
    fn eof_and_row_discrimination() {
        let eof = Bytes::from_static(b"\xfe\x00\x00\x08\x00");
        match RowPacket::decode(eof).unwrap() {
            RowPacket::Eof(eof) => assert_eq!(eof.status, 0x0008),
            RowPacket::Row(row) => panic!("eof decoded as row: {row:?}"),
        }

        let row = Bytes::from_static(b"\x011\xfb\x05hello");
        match RowPacket::decode(row).unwrap() {
            RowPacket::Row(row) => {
                assert_eq!(row.len(), 3);
                assert_eq!(row.get(0), Some(&b"1"[..]));
                assert_eq!(row.get(1), None);
                assert_eq!(row.get(2), Some(&b"hello"[..]));
            },
            RowPacket::Eof(_) => panic!("row decoded as eof"),
        }
    }

    #[test]
    fn query_response_header() {
        assert!(matches!(
            QueryResponse::decode(Bytes::from_static(b"\x02")).unwrap(),
            QueryResponse::ResultSet(2)
        ));
        assert!(matches!(
            QueryResponse::decode(Bytes::from_static(b"\x00\x01\x00\x02\x00\x00\x00")).unwrap(),
            QueryResponse::Ok(OkPacket { affected_rows: 1, .. })
        ));
    }
}

//! A single session with `searchd`.
use std::{
    io,
    task::{Context, Poll},
};

use crate::{
    Result,
    common::{ByteStr, debug, verbose, warning},
    mysql::{
        BackendProtocol, FrontendProtocol, MAX_PAYLOAD, ProtocolError, UTF8_GENERAL_CI, auth,
        backend::{AuthResponse, EofPacket, Handshake, OkPacket, QueryResponse, RowPacket},
        capability,
        frontend::{AuthSwitchResponse, ComPing, ComQuery, ComQuit, HandshakeResponse},
        status,
    },
    stream::WireStream,
    transport::{Pending, Transport, TransportExt},
};

mod config;

pub use config::{Config, ParseError, DEFAULT_PORT, MAX_HOST_LEN};

/// Server information received in the handshake.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    version: ByteStr,
    connection_id: u32,
    capabilities: u32,
}

impl ServerInfo {
    /// Server version string, such as `2.2.11-id64-release`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Server side thread id of the session.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Capability flags in use, the intersection of both sides.
    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }
}

/// A single connection to `searchd`.
///
/// Only one command can be in flight at a time. A result left unfinished, for example when
/// a fetch is dropped or interrupted, is skipped before the next command is sent.
#[derive(Debug)]
pub struct Connection {
    stream: WireStream,
    config: Config,
    server: ServerInfo,
    pending: Option<Pending>,
    broken: bool,
    releases: u64,
}

impl Connection {
    /// Perform a startup with config from environment variable.
    ///
    /// See [`Config::from_env`].
    pub async fn connect_env() -> Result<Self> {
        Self::connect_with(Config::from_env()?).await
    }

    /// Perform a startup via url.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Perform a startup with config.
    ///
    /// The wire character set is always `utf8_general_ci`.
    pub async fn connect_with(config: Config) -> Result<Self> {
        let (stream, server) = startup(&config)
            .await
            .map_err(|e| e.into_connect().context("failed to connect to Sphinx"))?;

        debug!(
            "connected to {}:{} (server {}, thread {})",
            config.host, config.port, server.version, server.connection_id,
        );

        Ok(Self {
            stream,
            config,
            server,
            pending: None,
            broken: false,
            releases: 0,
        })
    }

    /// Remote host.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Remote port.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// The config this connection was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Server information.
    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    /// Number of result cursors released so far.
    pub fn releases(&self) -> u64 {
        self.releases
    }

    /// Check whether the server is alive.
    pub async fn ping(&mut self) -> Result<()> {
        self.sync().await?;
        self.stream.command(ComPing);
        let _: OkPacket = self.recv().await?;
        Ok(())
    }

    /// Send `COM_QUIT` and shutdown the socket.
    ///
    /// The server may close the socket before the shutdown is sent, errors after the
    /// `COM_QUIT` is written are ignored.
    pub async fn close(mut self) -> Result<()> {
        self.quit().await
    }

    /// [`close`][Connection::close] through a shared handle.
    ///
    /// The connection is left broken, it reconnects on the next command if enabled.
    pub(crate) async fn quit(&mut self) -> Result<()> {
        if self.broken {
            return Ok(());
        }
        self.broken = true;
        self.pending = None;
        self.stream.command(ComQuit);
        self.flush().await?;
        let _ = std::future::poll_fn(|cx| self.stream.poll_shutdown(cx)).await;
        debug!("disconnected from {}:{}", self.config.host, self.config.port);
        Ok(())
    }

    /// Send a query and receive the first packet of its response.
    ///
    /// Unfinished result of previous command is skipped first. If the connection turns out to
    /// be lost while sending or awaiting the first response packet, it is reestablished once
    /// and the query is sent again.
    pub(crate) async fn dispatch(&mut self, sql: &[u8]) -> Result<QueryResponse> {
        self.sync().await?;

        match self.try_dispatch(sql).await {
            Err(err) if err.is_io() && self.config.reconnect => {
                warning!("connection to {}:{} lost: {err}", self.config.host, self.config.port);
                self.reconnect().await?;
                self.try_dispatch(sql).await
            },
            result => result,
        }
    }

    async fn try_dispatch(&mut self, sql: &[u8]) -> Result<QueryResponse> {
        verbose!(sql = %String::from_utf8_lossy(sql), "COM_QUERY");
        self.stream.command(ComQuery { sql });
        self.recv().await
    }

    /// Make the connection ready for a new command.
    async fn sync(&mut self) -> Result<()> {
        if !self.broken && self.pending.is_some() {
            if let Err(_err) = self.drain().await {
                warning!("failed to skip unfinished result: {_err}");
                self.broken = true;
            }
        }

        if self.broken {
            if !self.config.reconnect {
                return Err(io::Error::from(io::ErrorKind::NotConnected).into());
            }
            self.reconnect().await?;
        }

        Ok(())
    }

    /// Skip the rest of an unfinished result.
    async fn drain(&mut self) -> Result<()> {
        while let Some(pending) = self.pending {
            verbose!(?pending, "skip");

            let next = match pending {
                Pending::Header => match self.stream_recv::<QueryResponse>().await {
                    Ok(QueryResponse::Ok(ok)) => more_results(ok.status),
                    Ok(QueryResponse::ResultSet(count)) => Some(Pending::Columns(count)),
                    Err(err) if err.is_server() => None,
                    Err(err) => return Err(err),
                },
                Pending::Columns(0) => {
                    let _: EofPacket = self.stream_recv().await?;
                    Some(Pending::Rows)
                },
                Pending::Columns(n) => {
                    let _: bytes::Bytes = self.stream_recv().await?;
                    Some(Pending::Columns(n - 1))
                },
                Pending::Rows => match self.stream_recv::<RowPacket>().await {
                    Ok(RowPacket::Row(_)) => Some(Pending::Rows),
                    Ok(RowPacket::Eof(eof)) => more_results(eof.status),
                    Err(err) if err.is_server() => None,
                    Err(err) => return Err(err),
                },
            };

            self.pending = next;
        }

        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        debug!("reconnecting to {}:{}", self.config.host, self.config.port);

        let (stream, server) = startup(&self.config)
            .await
            .map_err(|e| e.into_connect().context("failed to reconnect to Sphinx"))?;

        self.stream = stream;
        self.server = server;
        self.pending = None;
        self.broken = false;
        Ok(())
    }

    fn stream_recv<B: BackendProtocol>(&mut self) -> impl Future<Output = Result<B>> {
        std::future::poll_fn(|cx| self.stream.poll_recv(cx))
    }
}

fn more_results(status: u16) -> Option<Pending> {
    (status & status::MORE_RESULTS_EXISTS != 0).then_some(Pending::Header)
}

impl Transport for Connection {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.stream.poll_flush(cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        let result = std::task::ready!(self.stream.poll_recv(cx));
        if let Err(err) = &result {
            if err.is_io() || err.is_protocol() {
                self.broken = true;
            }
        }
        Poll::Ready(result)
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        self.stream.command(message);
    }

    fn release(&mut self, pending: Option<Pending>) {
        verbose!(?pending, "release result");
        self.releases += 1;
        self.pending = pending;
    }
}

/// Connect and authenticate, within the connect timeout if any.
async fn startup(config: &Config) -> Result<(WireStream, ServerInfo)> {
    let Some(timeout) = config.connect_timeout else {
        return establish(config).await;
    };
    match tokio::time::timeout(timeout, establish(config)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::from(io::ErrorKind::TimedOut).into()),
    }
}

async fn establish(config: &Config) -> Result<(WireStream, ServerInfo)> {
    let mut stream = WireStream::connect(config).await?;

    let handshake: Handshake = recv(&mut stream).await?;
    verbose!(?handshake, "handshake");

    if handshake.capabilities & capability::PROTOCOL_41 == 0 {
        return Err(ProtocolError::Protocol41.into());
    }

    let mut capabilities = capability::CLIENT & handshake.capabilities;
    if !config.dbname.is_empty() && handshake.capabilities & capability::CONNECT_WITH_DB != 0 {
        capabilities |= capability::CONNECT_WITH_DB;
    }

    let plugin = handshake.auth_plugin.as_deref();
    let auth_response = auth::respond(plugin, config.pass.as_bytes(), &handshake.scramble)?;

    stream.send(HandshakeResponse {
        capabilities,
        max_packet: MAX_PAYLOAD as u32,
        charset: UTF8_GENERAL_CI,
        user: config.user.as_bytes(),
        auth_response: &auth_response,
        database: match capabilities & capability::CONNECT_WITH_DB {
            0 => None,
            _ => Some(config.dbname.as_bytes()),
        },
        auth_plugin: match capabilities & capability::PLUGIN_AUTH {
            0 => None,
            _ => Some(plugin.unwrap_or(auth::NATIVE_PASSWORD)),
        },
    });

    loop {
        match recv::<AuthResponse>(&mut stream).await? {
            AuthResponse::Ok(_) => break,
            AuthResponse::Switch(switch) => {
                verbose!(plugin = %String::from_utf8_lossy(&switch.plugin), "auth switch");
                let data = auth::respond(Some(&switch.plugin[..]), config.pass.as_bytes(), &switch.data)?;
                stream.send(AuthSwitchResponse { data: &data });
            },
        }
    }

    let server = ServerInfo {
        version: handshake.server_version,
        connection_id: handshake.connection_id,
        capabilities,
    };

    Ok((stream, server))
}

fn recv<B: BackendProtocol>(stream: &mut WireStream) -> impl Future<Output = Result<B>> {
    std::future::poll_fn(|cx| stream.poll_recv(cx))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::ErrorKind, mock::{MockServer, Script}};

    #[tokio::test]
    async fn connect_and_ping() {
        let server = MockServer::start(vec![Script::ok()]).await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();
        assert_eq!(conn.server().version(), crate::mock::SERVER_VERSION);
        conn.ping().await.unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let config = Config::new("127.0.0.1", 1).unwrap().reconnect(false);
        let err = Connection::connect_with(config).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Connect(_)));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = Config::new("127.0.0.1", port)
            .unwrap()
            .connect_timeout(std::time::Duration::from_millis(200));

        let err = Connection::connect_with(config).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Connect(_)));
        drop(listener);
    }

    #[tokio::test]
    async fn rejected_credentials_is_connect_error() {
        let server = MockServer::reject_auth("Access denied").await;
        let err = Connection::connect_with(server.config()).await.unwrap_err();
        match err.kind() {
            ErrorKind::Connect(e) => assert!(e.to_string().contains("Access denied")),
            _ => panic!("expected connect error, got {err}"),
        }
    }

    #[tokio::test]
    async fn drain_abandoned_result() {
        let server = MockServer::start(vec![
            Script::rows(&["id"], &[&[Some("1")], &[Some("2")], &[Some("3")]]),
            Script::rows(&["n"], &[&[Some("7")]]),
        ])
        .await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();

        match conn.dispatch(b"SELECT id FROM idx").await.unwrap() {
            QueryResponse::ResultSet(1) => { },
            other => panic!("unexpected response {other:?}"),
        }
        conn.release(Some(Pending::Columns(1)));

        match conn.dispatch(b"SELECT 7").await.unwrap() {
            QueryResponse::ResultSet(1) => { },
            other => panic!("unexpected response {other:?}"),
        }
        assert_eq!(conn.releases(), 1);
    }
}

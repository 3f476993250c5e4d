//! The [`SphinxLink`] facade.
use crate::{
    Result,
    connection::{Config, DEFAULT_PORT},
    encoding::Encoding,
    meta::MetaCursor,
    query::{Query, Text, query},
    registry::{ConnectionInfo, Connector, Registry, Route, Target, TcpConnector},
};

/// Result text of successful connect and disconnect.
pub const OK: &str = "OK";

/// Named connections to `searchd` and the queries sent through them.
///
/// # Example
///
/// ```no_run
/// use sphinxlink::{FieldType, RowShape, SphinxLink};
///
/// # async fn app() -> sphinxlink::Result<()> {
/// let link = SphinxLink::new();
/// link.connect("main", "127.0.0.1", 9306, "", "", "").await?;
///
/// let shape = RowShape::from([FieldType::BigInt, FieldType::Int]);
/// let rows = link
///     .query("main", "SELECT id, WEIGHT() FROM idx WHERE MATCH(?)")
///     .matching("hello world")
///     .fetch_all(&shape)
///     .await?;
///
/// for meta in link.meta("main").await?.collect().await? {
///     println!("{meta}");
/// }
///
/// link.disconnect("main").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SphinxLink<C = TcpConnector> {
    registry: Registry<C>,
    encoding: Encoding,
}

impl SphinxLink {
    /// Create link with UTF-8 host encoding.
    pub fn new() -> SphinxLink {
        Self::with_registry(Registry::new())
    }

    /// Create link with host encoding from environment variable.
    ///
    /// See [`Encoding::from_env`].
    pub fn from_env() -> Result<SphinxLink> {
        Ok(Self::new().encoding(Encoding::from_env()?))
    }
}

impl Default for SphinxLink {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> SphinxLink<C> {
    pub fn with_registry(registry: Registry<C>) -> Self {
        Self { registry, encoding: Encoding::utf8() }
    }

    /// Set the host encoding.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    /// Open a connection named `name`.
    ///
    /// `port` of `0` means [`DEFAULT_PORT`], an empty `host` means `127.0.0.1`.
    pub async fn connect(
        &self,
        name: &str,
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        database: &str,
    ) -> Result<&'static str> {
        let port = match port {
            0 => DEFAULT_PORT,
            port => port,
        };
        let config = Config::new(host, port)?
            .user(user)
            .password(password)
            .database(database);
        self.connect_with(name, config).await
    }

    /// Open a connection named `name` using `config` as is.
    pub async fn connect_with(&self, name: &str, config: Config) -> Result<&'static str> {
        self.registry.connect(name, config).await?;
        Ok(OK)
    }

    /// Close the connection named `name`.
    pub async fn disconnect(&self, name: &str) -> Result<&'static str> {
        self.registry.disconnect(name).await?;
        Ok(OK)
    }

    /// List open connections.
    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.list().await
    }

    /// Query through the connection named `name`.
    ///
    /// See [`Text`] for how `sql` is converted.
    pub fn query<'a>(
        &'a self,
        name: &str,
        sql: impl Into<Text<'a>>,
    ) -> Query<'a, Route<'a, Registry<C>>> {
        self.route(Target::Named(name.to_owned()), sql.into())
    }

    /// Query through the implicit connection of `host:port`, opening it if needed.
    pub fn query_at<'a>(
        &'a self,
        host: &str,
        port: u16,
        sql: impl Into<Text<'a>>,
    ) -> Query<'a, Route<'a, Registry<C>>> {
        let target = Target::Implicit { host: host.to_owned(), port };
        self.route(target, sql.into())
    }

    fn route<'a>(&'a self, target: Target, sql: Text<'a>) -> Query<'a, Route<'a, Registry<C>>> {
        query(sql, Route::new(&self.registry, target)).encoding(self.encoding)
    }

    /// `SHOW META` of the last query on the connection named `name`.
    pub async fn meta(&self, name: &str) -> Result<MetaCursor> {
        let session = self.registry.lookup(name).await?;
        Ok(MetaCursor::new(session, self.encoding))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        encoding::Charset,
        error::ErrorKind,
        mock::{MockServer, Script},
        row::{FieldType, RowShape},
    };
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn connect_query_disconnect() {
        let server = MockServer::start(vec![
            Script::rows(
                &["id", "weight"],
                &[&[Some("1"), Some("1500")], &[Some("2"), Some("1200")]],
            ),
            Script::rows(&["Variable_name", "Value"], &[&[Some("total_found"), Some("2")]]),
        ])
        .await;
        let link = SphinxLink::new();

        let ok = link.connect("main", "127.0.0.1", server.port(), "", "", "").await.unwrap();
        assert_eq!(ok, OK);
        assert_eq!(
            link.connections().await,
            [ConnectionInfo { name: "main".into(), host: "127.0.0.1".into(), port: server.port() }]
        );

        let shape = RowShape::from([FieldType::BigInt, FieldType::Int]);
        let rows = link
            .query("main", "SELECT id, WEIGHT() FROM idx WHERE MATCH(?)")
            .matching("hello")
            .fetch::<(i64, i32)>(&shape)
            .await
            .unwrap();
        assert_eq!(rows, [(1, 1500), (2, 1200)]);

        let meta = link.meta("main").await.unwrap().collect().await.unwrap();
        assert_eq!(meta[0].name(), "total_found");
        assert_eq!(meta[0].value(), "2");

        assert_eq!(link.disconnect("main").await.unwrap(), OK);
        assert!(link.connections().await.is_empty());

        let err = link.query("main", "SELECT 1").fetch_all(&RowShape::text(1)).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotFound(_)));
        let err = link.meta("main").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotFound(_)));
        let err = link.disconnect("main").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotFound(_)));

        assert_eq!(
            server.queries().await,
            ["SELECT id, WEIGHT() FROM idx WHERE MATCH('hello')", "SHOW META;"]
        );
    }

    #[tokio::test]
    async fn connect_with_config() {
        let server = MockServer::start(vec![]).await;
        let link = SphinxLink::new();

        assert_eq!(link.connect_with("cfg", server.config()).await.unwrap(), OK);
        let err = link.connect_with("cfg", server.config()).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DuplicateName(_)));
        assert_eq!(link.connections().await[0].port, server.port());
    }

    #[tokio::test]
    async fn implicit_connection() {
        let server = MockServer::start(vec![
            Script::rows(&["id"], &[&[Some("5")]]),
            Script::rows(&["id"], &[&[Some("6")]]),
        ])
        .await;
        let link = SphinxLink::new();

        for expect in [5, 6] {
            let rows = link
                .query_at("127.0.0.1", server.port(), "SELECT id FROM idx")
                .fetch::<(i64,)>(&RowShape::from([FieldType::BigInt]))
                .await
                .unwrap();
            assert_eq!(rows, [(expect,)]);
        }
        assert_eq!(link.connections().await.len(), 1);
        assert_eq!(server.accepted(), 1);
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let link = SphinxLink::new();
        let err = link.connect("down", "127.0.0.1", 1, "", "", "").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Connect(_)));
        assert!(link.connections().await.is_empty());

        let host = "h".repeat(2000);
        let err = link.connect("long", &host, 9306, "", "", "").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config(_)));
    }

    #[tokio::test]
    async fn query_reconnects_after_lost_connection() {
        let server = MockServer::start(vec![
            Script::rows(&["n"], &[&[Some("1")]]),
            Script::hangup(),
            Script::rows(&["n"], &[&[Some("2")]]),
        ])
        .await;
        let link = SphinxLink::new();
        link.connect("main", "127.0.0.1", server.port(), "", "", "").await.unwrap();

        let shape = RowShape::from([FieldType::Int]);
        let first = link.query("main", "SELECT 1").fetch::<(i32,)>(&shape).await.unwrap();
        assert_eq!(first, [(1,)]);

        let second = link.query("main", "SELECT 2").fetch::<(i32,)>(&shape).await.unwrap();
        assert_eq!(second, [(2,)]);
        assert_eq!(server.accepted(), 2);
    }

    #[tokio::test]
    async fn latin1_host_encoding() {
        let server = MockServer::start(vec![
            Script::rows(&["title"], &[&[Some("caf\u{e9}")]]),
            Script::rows(&["title"], &[&[Some("caf\u{e9}")]]),
        ])
        .await;
        let latin1 = Charset::for_label("LATIN1").unwrap();
        let link = SphinxLink::new().encoding(Encoding::new(latin1, Charset::utf8()));
        link.connect("main", "127.0.0.1", server.port(), "", "", "").await.unwrap();

        let set = link
            .query("main", "SELECT title FROM idx WHERE MATCH(?)")
            .matching("caf\u{e9}")
            .fetch_all(&RowShape::text(1))
            .await
            .unwrap();
        let title: bytes::Bytes = set.get(0).unwrap().try_get(0).unwrap();
        assert_eq!(&title[..], b"caf\xe9");

        link.query("main", "SELECT title FROM idx WHERE MATCH(?)")
            .matching(b"caf\xe9")
            .fetch_all(&RowShape::text(1))
            .await
            .unwrap();

        assert_eq!(
            server.queries().await,
            [
                "SELECT title FROM idx WHERE MATCH('caf\u{e9}')",
                "SELECT title FROM idx WHERE MATCH('caf\u{e9}')",
            ]
        );
    }

    #[tokio::test]
    async fn open_meta_cursor_leaves_connection_usable() {
        let server = MockServer::start(vec![
            Script::rows(
                &["Variable_name", "Value"],
                &[&[Some("total"), Some("1")], &[Some("time"), Some("0.000")]],
            ),
            Script::rows(&["n"], &[&[Some("1")]]),
        ])
        .await;
        let link = SphinxLink::new();
        link.connect("main", "127.0.0.1", server.port(), "", "", "").await.unwrap();

        let mut cursor = link.meta("main").await.unwrap();
        cursor.next().await.unwrap().unwrap();

        let shape = RowShape::text(1);
        let query = link.query("main", "SELECT 1").fetch_all(&shape);
        let set = timeout(Duration::from_secs(2), query).await.unwrap().unwrap();
        assert_eq!(set.len(), 1);

        timeout(Duration::from_secs(2), link.disconnect("main")).await.unwrap().unwrap();
        assert_eq!(cursor.next().await.unwrap().unwrap().name(), "time");
        assert!(cursor.next().await.unwrap().is_none());
    }
}

//! Named `searchd` connections.
use std::{collections::HashMap, fmt};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Connection, Result,
    common::{ByteStr, debug},
    connection::Config,
    executor::Executor,
};

mod session;

pub use session::Session;

/// Longest connection name, longer names are truncated.
pub const MAX_NAME_LEN: usize = 63;

/// Normalize a connection name.
///
/// Names are truncated to [`MAX_NAME_LEN`] bytes on a character boundary, and otherwise
/// compared exactly.
pub fn normalize(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// A store of named [`Session`]s.
pub trait SessionStore: Sync {
    /// Find a session by name.
    fn lookup(&self, name: &str) -> impl Future<Output = Result<Session>> + Send;

    /// Find the implicit session for `host:port`, creating it if absent.
    fn ensure_implicit(&self, host: &str, port: u16) -> impl Future<Output = Result<Session>> + Send;
}

/// Create a new [`Connection`].
pub trait Connector: Send + Sync {
    fn connect(&self, config: Config) -> impl Future<Output = Result<Connection>> + Send;
}

/// Connect using [`Connection::connect_with`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    async fn connect(&self, config: Config) -> Result<Connection> {
        Connection::connect_with(config).await
    }
}

/// Registry entry description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// A map of connection name to [`Session`].
///
/// The inner map is created on the first insertion.
pub struct Registry<C = TcpConnector> {
    connector: C,
    defaults: Config,
    sessions: Mutex<Option<HashMap<String, Session>>>,
}

impl Registry {
    /// Create registry that connect via tcp.
    pub fn new() -> Registry {
        Self::with_connector(TcpConnector)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> Registry<C> {
    /// Create registry with custom [`Connector`].
    pub fn with_connector(connector: C) -> Self {
        Self { connector, defaults: Config::default(), sessions: Mutex::new(None) }
    }

    /// Credentials and connect timeout used for implicit connections.
    ///
    /// Host and port of `defaults` are ignored.
    pub fn defaults(mut self, defaults: Config) -> Self {
        self.defaults = defaults;
        self
    }

    /// Returns `true` once any connection has been registered.
    pub async fn is_initialized(&self) -> bool {
        self.sessions.lock().await.is_some()
    }

    /// Open a connection and register it as `name`.
    ///
    /// Returns [`DuplicateName`] if `name` already exists. On failure the registry is left
    /// unchanged.
    pub async fn connect(&self, name: &str, config: Config) -> Result<()> {
        let name = normalize(name);
        let mut sessions = self.sessions.lock().await;

        if sessions.as_ref().is_some_and(|map| map.contains_key(name)) {
            return Err(DuplicateName(name.to_owned()).into());
        }

        let conn = self.connector.connect(config).await?;
        debug!("registered connection \"{name}\" to {}:{}", conn.host(), conn.port());
        sessions
            .get_or_insert_default()
            .insert(name.to_owned(), Session::new(conn));
        Ok(())
    }

    /// Close and remove the connection `name`.
    ///
    /// Returns [`NotFound`] if there is no such connection. Does nothing if no connection has
    /// ever been registered.
    pub async fn disconnect(&self, name: &str) -> Result<()> {
        let name = normalize(name);
        let session = {
            let mut sessions = self.sessions.lock().await;
            let Some(map) = sessions.as_mut() else {
                return Ok(());
            };
            match map.remove(name) {
                Some(session) => session,
                None => return Err(NotFound(name.to_owned()).into()),
            }
        };

        debug!("removed connection \"{name}\"");
        session.lock().await.quit().await
    }

    /// Find a connection by name.
    pub async fn lookup(&self, name: &str) -> Result<Session> {
        let name = normalize(name);
        let sessions = self.sessions.lock().await;
        match sessions.as_ref().and_then(|map| map.get(name)) {
            Some(session) => Ok(session.clone()),
            None => Err(NotFound(name.to_owned()).into()),
        }
    }

    /// Returns `true` if `name` is registered.
    pub async fn contains(&self, name: &str) -> bool {
        let name = normalize(name);
        let sessions = self.sessions.lock().await;
        sessions.as_ref().is_some_and(|map| map.contains_key(name))
    }

    /// Find the connection named after `host`, creating it if absent.
    ///
    /// Returns [`CredentialMismatch`] if the name is taken by a connection to another
    /// host or port.
    pub async fn ensure_implicit(&self, host: &str, port: u16) -> Result<Session> {
        let config = Config::new(host, port)?
            .user(&self.defaults.user)
            .password(&self.defaults.pass)
            .database(&self.defaults.dbname)
            .connect_timeout(self.defaults.connect_timeout);

        let name = normalize(config.host());
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.as_ref().and_then(|map| map.get(name)) {
            if session.host() != config.host() || session.port() != port {
                return Err(CredentialMismatch {
                    name: name.to_owned(),
                    host: ByteStr::copy_from_str(session.host()),
                    port: session.port(),
                }
                .into());
            }
            return Ok(session.clone());
        }

        let conn = self.connector.connect(config.clone()).await?;
        debug!("registered implicit connection \"{name}\"");
        let session = Session::new(conn);
        sessions
            .get_or_insert_default()
            .insert(name.to_owned(), session.clone());
        Ok(session)
    }

    /// Snapshot of registered connections, sorted by name.
    pub async fn list(&self) -> Vec<ConnectionInfo> {
        let sessions = self.sessions.lock().await;
        let Some(map) = sessions.as_ref() else {
            return vec![];
        };

        let mut list = map
            .iter()
            .map(|(name, session)| ConnectionInfo {
                name: name.clone(),
                host: session.host().to_owned(),
                port: session.port(),
            })
            .collect::<Vec<_>>();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }
}

impl<C: Connector> SessionStore for Registry<C> {
    fn lookup(&self, name: &str) -> impl Future<Output = Result<Session>> + Send {
        Registry::lookup(self, name)
    }

    fn ensure_implicit(&self, host: &str, port: u16) -> impl Future<Output = Result<Session>> + Send {
        Registry::ensure_implicit(self, host, port)
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("defaults", &self.defaults).finish_non_exhaustive()
    }
}

/// Where a query is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A registered connection.
    Named(String),
    /// The implicit connection of `host:port`.
    Implicit { host: String, port: u16 },
}

/// A [`Target`] resolved through a [`SessionStore`].
#[derive(Debug)]
pub struct Route<'a, S> {
    store: &'a S,
    target: Target,
}

impl<'a, S> Route<'a, S> {
    pub fn new(store: &'a S, target: Target) -> Self {
        Self { store, target }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}

impl<S: SessionStore> Route<'_, S> {
    /// Find the session of the target.
    pub async fn session(&self) -> Result<Session> {
        match &self.target {
            Target::Named(name) => self.store.lookup(name).await,
            Target::Implicit { host, port } => self.store.ensure_implicit(host, *port).await,
        }
    }
}

impl<S: SessionStore> Executor for Route<'_, S> {
    type Transport = OwnedMutexGuard<Connection>;

    async fn connection(self) -> Result<Self::Transport> {
        Ok(self.session().await?.lock().await)
    }
}

/// A connection with the same name already exists.
pub struct DuplicateName(pub(crate) String);

impl std::error::Error for DuplicateName { }

impl fmt::Display for DuplicateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection \"{}\" already exists", self.0)
    }
}

impl fmt::Debug for DuplicateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// No connection with the given name.
pub struct NotFound(pub(crate) String);

impl std::error::Error for NotFound { }

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection \"{}\" does not exist", self.0)
    }
}

impl fmt::Debug for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// The implicit connection name is taken by a connection to another host or port.
pub struct CredentialMismatch {
    name: String,
    host: ByteStr,
    port: u16,
}

impl std::error::Error for CredentialMismatch { }

impl fmt::Display for CredentialMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connection \"{}\" already exists with different credentials ({}:{})",
            self.name, self.host, self.port,
        )
    }
}

impl fmt::Debug for CredentialMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

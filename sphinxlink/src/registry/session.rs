use std::{fmt, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{Connection, Result, common::ByteStr, executor::Executor};

/// A shared handle to a registered [`Connection`].
///
/// Cloning a session does not open a new connection. Commands on the same session are
/// serialized by an async mutex held for the whole duration of a result.
#[derive(Clone)]
pub struct Session {
    conn: Arc<Mutex<Connection>>,
    host: ByteStr,
    port: u16,
}

impl Session {
    pub(crate) fn new(conn: Connection) -> Self {
        let host = ByteStr::copy_from_str(conn.host());
        let port = conn.port();
        Self { conn: Arc::new(Mutex::new(conn)), host, port }
    }

    /// Remote host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for exclusive access to the connection.
    pub async fn lock(&self) -> OwnedMutexGuard<Connection> {
        self.conn.clone().lock_owned().await
    }

    /// Returns `true` if both handles refer to the same connection.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Executor for Session {
    type Transport = OwnedMutexGuard<Connection>;

    async fn connection(self) -> Result<Self::Transport> {
        Ok(self.conn.lock_owned().await)
    }
}

impl Executor for &Session {
    type Transport = OwnedMutexGuard<Connection>;

    async fn connection(self) -> Result<Self::Transport> {
        Ok(self.lock().await)
    }
}

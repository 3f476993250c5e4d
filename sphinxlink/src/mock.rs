//! Scripted `searchd` for tests.
//!
//! Every `COM_QUERY`, on any accepted connection, is answered by the next [`Script`] in order.
//! `COM_PING` is always answered with `OK`.
use bytes::{BufMut, BytesMut};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    task::JoinHandle,
};

use crate::{
    connection::Config,
    ext::BufMutExt,
    mysql::{UTF8_GENERAL_CI, capability, command, status},
};

pub(crate) const SERVER_VERSION: &str = "2.2.11-id64-release";

const CAPABILITIES: u32 = capability::CLIENT | capability::CONNECT_WITH_DB;

/// Response to one query.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    Ok,
    Rows { columns: Vec<String>, rows: Vec<Vec<Option<String>>> },
    Error { code: u16, message: String },
    Multi(Vec<Script>),
    /// Close the socket without answering.
    Hangup,
}

impl Script {
    pub(crate) fn ok() -> Script {
        Script::Ok
    }

    pub(crate) fn rows(columns: &[&str], rows: &[&[Option<&str>]]) -> Script {
        Script::Rows {
            columns: columns.iter().map(|&e| e.to_owned()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|e| e.map(str::to_owned)).collect())
                .collect(),
        }
    }

    pub(crate) fn error(code: u16, message: &str) -> Script {
        Script::Error { code, message: message.to_owned() }
    }

    pub(crate) fn multi(scripts: Vec<Script>) -> Script {
        Script::Multi(scripts)
    }

    pub(crate) fn hangup() -> Script {
        Script::Hangup
    }
}

#[derive(Clone)]
struct Shared {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    queries: Arc<Mutex<Vec<String>>>,
    accepted: Arc<AtomicUsize>,
    reject: Option<Arc<str>>,
}

/// A fake server listening on a random local port.
pub(crate) struct MockServer {
    port: u16,
    shared: Shared,
    task: JoinHandle<()>,
}

impl MockServer {
    pub(crate) async fn start(scripts: Vec<Script>) -> MockServer {
        Self::spawn(scripts, None).await
    }

    /// Server that refuses every login with `message`.
    pub(crate) async fn reject_auth(message: &str) -> MockServer {
        Self::spawn(vec![], Some(message.into())).await
    }

    async fn spawn(scripts: Vec<Script>, reject: Option<Arc<str>>) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Shared {
            scripts: Arc::new(Mutex::new(scripts.into())),
            queries: Arc::default(),
            accepted: Arc::default(),
            reject,
        };

        let task = tokio::spawn({
            let shared = shared.clone();
            async move {
                let mut id = 0;
                while let Ok((socket, _)) = listener.accept().await {
                    id += 1;
                    shared.accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(socket, id, shared.clone()));
                }
            }
        });

        MockServer { port, shared, task }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn config(&self) -> Config {
        Config::new("127.0.0.1", self.port).unwrap().user("test")
    }

    /// Queries received so far, in order.
    pub(crate) async fn queries(&self) -> Vec<String> {
        self.shared.queries.lock().await.clone()
    }

    /// Number of accepted connections.
    pub(crate) fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut socket: TcpStream, id: u32, shared: Shared) {
    let mut out = Writer::default();
    out.packet(&handshake(id));
    if out.send(&mut socket).await.is_err() {
        return;
    }

    let Some((seq, _login)) = read_packet(&mut socket).await else {
        return;
    };
    out.seq = seq.wrapping_add(1);
    match &shared.reject {
        Some(message) => {
            out.packet(&err_packet(1045, message));
            let _ = out.send(&mut socket).await;
            return;
        },
        None => out.packet(&ok_packet(0)),
    }
    if out.send(&mut socket).await.is_err() {
        return;
    }

    while let Some((seq, body)) = read_packet(&mut socket).await {
        out.seq = seq.wrapping_add(1);
        match body.first().copied() {
            Some(command::QUERY) => {
                let sql = String::from_utf8_lossy(&body[1..]).into_owned();
                shared.queries.lock().await.push(sql);
                let script = shared.scripts.lock().await.pop_front().unwrap_or(Script::Ok);
                if let Script::Hangup = script {
                    return;
                }
                out.script(&script, false);
            },
            Some(command::PING) => out.packet(&ok_packet(0)),
            Some(command::QUIT) | None => return,
            Some(_) => out.packet(&err_packet(1047, "unknown command")),
        }
        if out.send(&mut socket).await.is_err() {
            return;
        }
    }
}

async fn read_packet(socket: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; 4];
    socket.read_exact(&mut header).await.ok()?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).await.ok()?;
    Some((header[3], body))
}

#[derive(Default)]
struct Writer {
    buf: BytesMut,
    seq: u8,
}

impl Writer {
    fn packet(&mut self, payload: &[u8]) {
        self.buf.put_uint_le(payload.len() as u64, 3);
        self.buf.put_u8(self.seq);
        self.buf.put_slice(payload);
        self.seq = self.seq.wrapping_add(1);
    }

    fn script(&mut self, script: &Script, more: bool) {
        let flags = match more {
            true => status::MORE_RESULTS_EXISTS,
            false => 0,
        };
        match script {
            Script::Ok | Script::Hangup => self.packet(&ok_packet(flags)),
            Script::Error { code, message } => self.packet(&err_packet(*code, message)),
            Script::Multi(scripts) => {
                for (i, script) in scripts.iter().enumerate() {
                    self.script(script, more || i + 1 < scripts.len());
                }
            },
            Script::Rows { columns, rows } => {
                let mut body = BytesMut::new();
                body.put_lenenc_int(columns.len() as u64);
                self.packet(&body);

                for column in columns {
                    self.packet(&column_definition(column));
                }
                self.packet(&eof_packet(0));

                for row in rows {
                    let mut body = BytesMut::new();
                    for field in row {
                        match field {
                            Some(value) => body.put_lenenc_bytes(value.as_bytes()),
                            None => body.put_u8(0xFB),
                        }
                    }
                    self.packet(&body);
                }
                self.packet(&eof_packet(flags));
            },
        }
    }

    async fn send(&mut self, socket: &mut TcpStream) -> std::io::Result<()> {
        socket.write_all(&self.buf).await?;
        self.buf.clear();
        Ok(())
    }
}

fn handshake(id: u32) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u8(10);
    body.put_nul_bytes(SERVER_VERSION.as_bytes());
    body.put_u32_le(id);
    body.put_slice(b"abcdefgh");
    body.put_u8(0);
    body.put_u16_le(CAPABILITIES as u16);
    body.put_u8(UTF8_GENERAL_CI);
    body.put_u16_le(status::AUTOCOMMIT);
    body.put_u16_le((CAPABILITIES >> 16) as u16);
    body.put_u8(21);
    body.put_slice(&[0; 10]);
    body.put_nul_bytes(b"ijklmnopqrst");
    body.put_nul_bytes(crate::mysql::auth::NATIVE_PASSWORD);
    body.to_vec()
}

fn ok_packet(status: u16) -> Vec<u8> {
    let mut body = vec![0x00, 0x00, 0x00];
    body.extend_from_slice(&status.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body
}

fn eof_packet(status: u16) -> Vec<u8> {
    let mut body = vec![0xFE, 0x00, 0x00];
    body.extend_from_slice(&status.to_le_bytes());
    body
}

fn err_packet(code: u16, message: &str) -> Vec<u8> {
    let mut body = vec![0xFF];
    body.extend_from_slice(&code.to_le_bytes());
    body.extend_from_slice(b"#42000");
    body.extend_from_slice(message.as_bytes());
    body
}

fn column_definition(name: &str) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_lenenc_bytes(b"def");
    body.put_lenenc_bytes(b"");
    body.put_lenenc_bytes(b"");
    body.put_lenenc_bytes(b"");
    body.put_lenenc_bytes(name.as_bytes());
    body.put_lenenc_bytes(name.as_bytes());
    body.put_lenenc_int(0x0C);
    body.put_u16_le(UTF8_GENERAL_CI as u16);
    body.put_u32_le(255);
    body.put_u8(0xFD);
    body.put_u16_le(0);
    body.put_u16_le(0);
    body.to_vec()
}

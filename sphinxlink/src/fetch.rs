//! Reading a `COM_QUERY` response, and materializing it into a [`RowSet`].
//!
//! A response is one or more results, each either an `OK` packet or a result set:
//!
//! ```text
//! column count
//! column definition * column count
//! EOF
//! text row * n
//! EOF or ERR
//! ```
//!
//! When the terminator of a result carries `SERVER_MORE_RESULTS_EXISTS`, another result
//! follows.
use bytes::BytesMut;
use futures_core::Stream;
use std::{
    fmt,
    ops::{Deref, DerefMut},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use crate::{
    Result,
    common::{ByteStr, verbose},
    encoding::Encoding,
    mysql::{
        status,
        backend::{ColumnDefinition, EofPacket, QueryResponse, RowPacket, TextRow},
    },
    query::{Interrupt, Interrupted},
    row::{Row, RowSet, RowShape, Value},
    transport::{Pending, Transport},
};

/// An item of a [`ResultStream`].
#[derive(Debug)]
pub enum Event {
    /// A result set begins with these columns.
    Columns(Arc<[ByteStr]>),
    /// A row of the current result set.
    Row(TextRow),
    /// A result ended, `more` is `true` if another one follows.
    End { more: bool },
}

/// Stream of a query response.
///
/// The result cursor is released exactly once: when the response is read to its final
/// terminator, when an error ends the exchange, or when the stream is dropped before either.
/// In the last case the rest of the response is skipped before the next command.
#[must_use = "streams do nothing unless polled"]
pub struct ResultStream<IO: Transport> {
    io: IO,
    phase: Phase,
    released: bool,
}

#[derive(Debug)]
enum Phase {
    Header,
    Columns { left: u64, columns: Vec<ByteStr> },
    Rows,
    Ended { more: bool },
    Complete,
}

impl<IO: Transport> ResultStream<IO> {
    /// Continue a response whose first packet is `response`.
    pub fn new(io: IO, response: QueryResponse) -> Self {
        let phase = match response {
            QueryResponse::Ok(ok) => Phase::Ended { more: more_results(ok.status) },
            QueryResponse::ResultSet(count) => Phase::Columns {
                left: count,
                columns: Vec::with_capacity(count.min(64) as usize),
            },
        };
        Self { io, phase, released: false }
    }

    /// Returns `true` if the response is read to its final terminator.
    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Complete)
    }

    pub fn poll_event(&mut self, cx: &mut Context) -> Poll<Result<Option<Event>>> {
        let result = ready!(self.poll_event_inner(cx));
        if result.is_err() {
            self.phase = Phase::Complete;
        }
        if self.is_complete() {
            self.release(None);
        }
        Poll::Ready(result)
    }

    fn poll_event_inner(&mut self, cx: &mut Context) -> Poll<Result<Option<Event>>> {
        loop {
            match &mut self.phase {
                Phase::Header => {
                    match ready!(self.io.poll_recv::<QueryResponse>(cx)?) {
                        QueryResponse::Ok(ok) => {
                            self.phase = Phase::Ended { more: more_results(ok.status) };
                        },
                        QueryResponse::ResultSet(count) => {
                            self.phase = Phase::Columns {
                                left: count,
                                columns: Vec::with_capacity(count.min(64) as usize),
                            };
                        },
                    }
                },
                Phase::Columns { left: 0, columns } => {
                    ready!(self.io.poll_recv::<EofPacket>(cx)?);
                    let columns: Arc<[ByteStr]> = std::mem::take(columns).into();
                    verbose!(?columns, "result set");
                    self.phase = Phase::Rows;
                    return Poll::Ready(Ok(Some(Event::Columns(columns))));
                },
                Phase::Columns { left, columns } => {
                    let column = ready!(self.io.poll_recv::<ColumnDefinition>(cx)?);
                    columns.push(column.name);
                    *left -= 1;
                },
                Phase::Rows => {
                    match ready!(self.io.poll_recv::<RowPacket>(cx)?) {
                        RowPacket::Row(row) => return Poll::Ready(Ok(Some(Event::Row(row)))),
                        RowPacket::Eof(eof) => {
                            self.phase = Phase::Ended { more: more_results(eof.status) };
                        },
                    }
                },
                Phase::Ended { more } => {
                    let more = *more;
                    self.phase = match more {
                        true => Phase::Header,
                        false => Phase::Complete,
                    };
                    return Poll::Ready(Ok(Some(Event::End { more })));
                },
                Phase::Complete => return Poll::Ready(Ok(None)),
            }
        }
    }

    /// Receive the next event.
    pub fn next(&mut self) -> impl Future<Output = Result<Option<Event>>> {
        std::future::poll_fn(|cx| self.poll_event(cx))
    }

    /// Read the rest of the response, discarding it.
    pub async fn drain(&mut self) -> Result<()> {
        while self.next().await?.is_some() { }
        Ok(())
    }

    fn release(&mut self, pending: Option<Pending>) {
        if !self.released {
            self.released = true;
            self.io.release(pending);
        }
    }

    fn pending(&self) -> Option<Pending> {
        match &self.phase {
            Phase::Header => Some(Pending::Header),
            Phase::Columns { left, .. } => Some(Pending::Columns(*left)),
            Phase::Rows => Some(Pending::Rows),
            Phase::Ended { more: true } => Some(Pending::Header),
            Phase::Ended { more: false } | Phase::Complete => None,
        }
    }
}

impl<IO: Transport> Drop for ResultStream<IO> {
    fn drop(&mut self) {
        let pending = self.pending();
        self.release(pending);
    }
}

impl<IO: Transport> Stream for ResultStream<IO> {
    type Item = Result<Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_event(cx).map(Result::transpose)
    }
}

impl<IO: Transport> fmt::Debug for ResultStream<IO> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStream")
            .field("phase", &self.phase)
            .field("released", &self.released)
            .finish()
    }
}

fn more_results(status: u16) -> bool {
    status & status::MORE_RESULTS_EXISTS != 0
}

/// Read a response into a [`RowSet`].
///
/// Every row must have as many fields as `shape`, otherwise the rest of the response is
/// read and [`ShapeMismatch`] returned. A result without rows is returned empty regardless
/// of its column count.
///
/// `interrupt` is checked before each event is fetched. When a response carries multiple
/// results only the last one is returned, and only that one is checked against `shape`.
pub async fn materialize<IO: Transport, I: Interrupt + ?Sized>(
    stream: &mut ResultStream<IO>,
    shape: &RowShape,
    encoding: &Encoding,
    interrupt: &I,
) -> Result<RowSet> {
    let mut scratch = Scratch::new();
    let mut current: Option<RowSet> = None;
    let mut mismatch: Option<ShapeMismatch> = None;

    loop {
        if interrupt.is_interrupted() {
            return Err(Interrupted.into());
        }

        let Some(event) = stream.next().await? else {
            return Ok(RowSet::default());
        };

        match event {
            Event::Columns(columns) => {
                current = Some(RowSet::new(columns));
                mismatch = None;
            },
            Event::Row(wire) => {
                let Some(set) = current.as_mut() else {
                    continue;
                };

                if mismatch.is_some() {
                    continue;
                }
                if wire.len() != shape.len() {
                    mismatch = Some(ShapeMismatch { expected: shape.len(), found: wire.len() });
                    continue;
                }

                let row = build_row(shape, set.columns_arc(), &wire, encoding, &mut scratch)?;
                set.push(row);
            },
            Event::End { more: true } => {
                verbose!("discard result, another follows");
                current = None;
                mismatch = None;
            },
            Event::End { more: false } => {
                if let Some(mismatch) = mismatch {
                    return Err(mismatch.into());
                }
                return Ok(current.take().unwrap_or_default());
            },
        }
    }
}

/// Build a row out of wire text.
///
/// Each field is converted into the host encoding and parsed in `scratch`, which is cleared
/// before returning whether or not building succeeded.
pub(crate) fn build_row(
    shape: &RowShape,
    columns: &Arc<[ByteStr]>,
    wire: &TextRow,
    encoding: &Encoding,
    scratch: &mut Scratch,
) -> Result<Row> {
    let mut buf = scratch.guard();
    let mut values = Vec::with_capacity(shape.len());

    for (field, ty) in wire.iter().zip(shape.fields()) {
        let value = match field {
            None => Value::Null,
            Some(text) => {
                let start = buf.len();
                buf.extend_from_slice(&encoding.to_host(text)?);
                ty.parse(&buf[start..])?
            },
        };
        values.push(value);
    }

    Ok(Row::new(Arc::clone(columns), values))
}

/// Reusable memory for building rows.
///
/// The buffer is only accessible through [`ScratchGuard`], which clears it when dropped
/// while keeping its capacity.
#[derive(Debug, Default)]
pub struct Scratch {
    buf: BytesMut,
}

impl Scratch {
    pub fn new() -> Self {
        Self { buf: BytesMut::with_capacity(256) }
    }

    pub fn guard(&mut self) -> ScratchGuard<'_> {
        ScratchGuard { buf: &mut self.buf }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

/// Access to [`Scratch`] for a single row.
pub struct ScratchGuard<'a> {
    buf: &'a mut BytesMut,
}

impl Deref for ScratchGuard<'_> {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        self.buf
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        self.buf.clear();
    }
}

/// Result field count differs from the expected row shape.
pub struct ShapeMismatch {
    pub expected: usize,
    pub found: usize,
}

impl std::error::Error for ShapeMismatch { }

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "remote query result rowtype does not match the specified FROM clause rowtype, \
            expected {} fields found {}",
            self.expected, self.found,
        )
    }
}

impl fmt::Debug for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        connection::Connection,
        encoding::Charset,
        error::ErrorKind,
        mock::{MockServer, Script},
        row::FieldType,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn run(conn: &mut Connection, sql: &str, shape: &RowShape) -> Result<RowSet> {
        let response = conn.dispatch(sql.as_bytes()).await?;
        let mut stream = ResultStream::new(&mut *conn, response);
        materialize(&mut stream, shape, &Encoding::utf8(), &()).await
    }

    /// Trips on the `n`th check.
    struct TripAt(usize, AtomicUsize);

    impl Interrupt for TripAt {
        fn is_interrupted(&self) -> bool {
            self.1.fetch_add(1, Ordering::Relaxed) + 1 >= self.0
        }
    }

    #[tokio::test]
    async fn materialize_rows() {
        let server = MockServer::start(vec![Script::rows(
            &["id", "title", "weight"],
            &[&[Some("1"), Some("first"), Some("1.5")], &[Some("2"), None, Some("2")]],
        )])
        .await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();
        let shape = RowShape::from([FieldType::BigInt, FieldType::Text, FieldType::Float]);

        let set = run(&mut conn, "SELECT * FROM idx", &shape).await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.columns(), ["id", "title", "weight"]);
        assert_eq!(set.get(0).unwrap().try_get::<_, i64>("id").unwrap(), 1);
        assert_eq!(set.get(1).unwrap().get(1), Some(&Value::Null));
        assert_eq!(set.get(1).unwrap().get(2), Some(&Value::Float(2.0)));
        assert_eq!(conn.releases(), 1);
    }

    #[tokio::test]
    async fn shape_mismatch_with_rows() {
        let server = MockServer::start(vec![
            Script::rows(&["id", "title"], &[&[Some("1"), Some("a")], &[Some("2"), Some("b")]]),
            Script::rows(&["n"], &[&[Some("1")]]),
        ])
        .await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();

        let err = run(&mut conn, "SELECT id, title FROM idx", &RowShape::text(3)).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ShapeMismatch(ShapeMismatch { expected: 3, found: 2 })));

        // rest of the result was read, session is usable
        let set = run(&mut conn, "SELECT 1", &RowShape::text(1)).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(conn.releases(), 2);
    }

    #[tokio::test]
    async fn shape_mismatch_without_rows_is_empty() {
        let server = MockServer::start(vec![Script::rows(&["id", "title"], &[])]).await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();

        let set = run(&mut conn, "SELECT id, title FROM idx WHERE id = 0", &RowShape::text(5))
            .await
            .unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn keep_last_result_set() {
        let server = MockServer::start(vec![Script::multi(vec![
            Script::rows(&["id"], &[&[Some("1")], &[Some("2")]]),
            Script::rows(&["Variable_name", "Value"], &[&[Some("total"), Some("2")]]),
        ])])
        .await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();

        let set = run(&mut conn, "SELECT id FROM idx; SHOW META", &RowShape::text(2)).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.columns(), ["Variable_name", "Value"]);
        assert_eq!(conn.releases(), 1);
    }

    #[tokio::test]
    async fn server_error_is_query_error() {
        let server = MockServer::start(vec![
            Script::error(1064, "sphinxql: syntax error, unexpected IDENT"),
            Script::rows(&["n"], &[&[Some("1")]]),
        ])
        .await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();

        let err = run(&mut conn, "SELEC", &RowShape::text(1)).await.unwrap_err();
        match err.kind() {
            ErrorKind::Query(e) => assert!(e.message().contains("syntax error")),
            _ => panic!("expected query error, got {err}"),
        }

        assert_eq!(run(&mut conn, "SELECT 1", &RowShape::text(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn interrupt_releases_once() {
        let rows: Vec<Vec<Option<&str>>> = (0..10).map(|_| vec![Some("x")]).collect();
        let rows: Vec<&[Option<&str>]> = rows.iter().map(Vec::as_slice).collect();
        let server = MockServer::start(vec![
            Script::rows(&["v"], &rows),
            Script::rows(&["n"], &[&[Some("1")]]),
        ])
        .await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();

        let response = conn.dispatch(b"SELECT v FROM idx").await.unwrap();
        let interrupt = TripAt(5, AtomicUsize::new(0));
        {
            let mut stream = ResultStream::new(&mut conn, response);
            let err = materialize(&mut stream, &RowShape::text(1), &Encoding::utf8(), &interrupt)
                .await
                .unwrap_err();
            assert!(matches!(err.kind(), ErrorKind::Interrupted(_)));
        }
        assert_eq!(conn.releases(), 1);

        // abandoned rows are skipped before the next query
        let set = run(&mut conn, "SELECT 1", &RowShape::text(1)).await.unwrap();
        assert_eq!(set.get(0).unwrap().try_get::<_, String>(0).unwrap(), "1");
        assert_eq!(conn.releases(), 2);
    }

    #[tokio::test]
    async fn decode_error_keeps_session_usable() {
        let server = MockServer::start(vec![
            Script::rows(&["id"], &[&[Some("1")], &[Some("oops")], &[Some("3")]]),
            Script::rows(&["n"], &[&[Some("1")]]),
        ])
        .await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();

        let err = run(&mut conn, "SELECT id FROM idx", &RowShape::from([FieldType::Int]))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Decode(_)));
        assert_eq!(run(&mut conn, "SELECT 1", &RowShape::text(1)).await.unwrap().len(), 1);
    }

    #[test]
    fn scratch_reset_after_row() {
        let mut scratch = Scratch::new();
        let columns: Arc<[ByteStr]> = vec![ByteStr::from("a"), ByteStr::from("b")].into();
        let shape = RowShape::from([FieldType::Text, FieldType::Int]);
        let latin1 = Encoding::new(Charset::for_label("LATIN1").unwrap(), Charset::utf8());

        let wire = TextRow::from_fields(&[Some("caf\u{e9}"), Some("7")]);
        let row = build_row(&shape, &columns, &wire, &latin1, &mut scratch).unwrap();
        assert_eq!(row.get(0), Some(&Value::Text(bytes::Bytes::from_static(b"caf\xe9"))));
        assert!(scratch.is_empty());
        let capacity = scratch.capacity();

        let wire = TextRow::from_fields(&[Some("x"), Some("not a number")]);
        assert!(build_row(&shape, &columns, &wire, &latin1, &mut scratch).is_err());
        assert!(scratch.is_empty());
        assert_eq!(scratch.capacity(), capacity);
    }
}

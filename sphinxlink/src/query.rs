//! Query API types.
use std::{
    borrow::Cow,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    Result,
    common::unit_error,
    encoding::Encoding,
    executor::Executor,
    fetch::{ResultStream, materialize},
    row::{FromRow, RowSet, RowShape},
    sql,
};

/// Entrypoint of the query API.
///
/// `exe` is either a `&mut` [`Connection`][crate::Connection], a [`Session`][crate::Session],
/// or a route resolved through a registry.
///
/// `sql` is either a `&str`, sent as is, or bytes in the host encoding, see [`Text`].
pub fn query<'a, Exe>(sql: impl Into<Text<'a>>, exe: Exe) -> Query<'a, Exe> {
    Query {
        sql: sql.into(),
        exe,
        clause: None,
        encoding: Encoding::default(),
        interrupt: (),
    }
}

/// Query text.
///
/// A `&str` is UTF-8 already, which is what the server speaks, so it is never converted.
/// Bytes are taken to be in the database encoding and converted with
/// [`Encoding::to_wire`] before being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text<'a> {
    Utf8(&'a str),
    Host(&'a [u8]),
}

impl<'a> Text<'a> {
    /// Text as sent to the server.
    pub fn to_wire(self, encoding: &Encoding) -> Result<Cow<'a, [u8]>> {
        match self {
            Text::Utf8(text) => Ok(Cow::Borrowed(text.as_bytes())),
            Text::Host(bytes) => Ok(encoding.to_wire(bytes)?),
        }
    }
}

impl<'a> From<&'a str> for Text<'a> {
    fn from(value: &'a str) -> Self {
        Text::Utf8(value)
    }
}

impl<'a> From<&'a String> for Text<'a> {
    fn from(value: &'a String) -> Self {
        Text::Utf8(value)
    }
}

impl<'a> From<&'a [u8]> for Text<'a> {
    fn from(value: &'a [u8]) -> Self {
        Text::Host(value)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Text<'a> {
    fn from(value: &'a [u8; N]) -> Self {
        Text::Host(value)
    }
}

/// The query API.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Query<'a, Exe, I = ()> {
    sql: Text<'a>,
    exe: Exe,
    clause: Option<Text<'a>>,
    encoding: Encoding,
    interrupt: I,
}

impl<'a, Exe, I> Query<'a, Exe, I> {
    /// Substitute the `MATCH(?)` marker with `clause`, escaped.
    ///
    /// Ignored if the query has no marker.
    pub fn matching(mut self, clause: impl Into<Text<'a>>) -> Self {
        self.clause = Some(clause.into());
        self
    }

    /// Host encoding used to convert query text and result fields.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Stop reading rows once `interrupt` is raised.
    pub fn interrupt<I2: Interrupt>(self, interrupt: I2) -> Query<'a, Exe, I2> {
        Query {
            sql: self.sql,
            exe: self.exe,
            clause: self.clause,
            encoding: self.encoding,
            interrupt,
        }
    }

    /// The query text that will be sent, after conversion and substitution.
    pub fn wire_sql(&self) -> Result<Cow<'a, [u8]>> {
        let sql = self.sql.to_wire(&self.encoding)?;
        let Some(clause) = self.clause else {
            return Ok(sql);
        };
        let clause = clause.to_wire(&self.encoding)?;

        let rewritten = match sql::rewrite(&sql, &clause) {
            Cow::Owned(out) => Some(out),
            Cow::Borrowed(_) => None,
        };
        Ok(rewritten.map_or(sql, Cow::Owned))
    }
}

impl<Exe, I> Query<'_, Exe, I>
where
    Exe: Executor,
    I: Interrupt,
{
    /// Run the query and materialize every row of its result.
    ///
    /// Every row must match `shape`, see [`materialize`] for the details.
    pub async fn fetch_all(self, shape: &RowShape) -> Result<RowSet> {
        let wire = self.wire_sql()?;

        let mut io = self.exe.connection().await?;
        let response = io
            .dispatch(&wire)
            .await
            .map_err(|e| e.context("failed to send query to Sphinx"))?;

        let mut stream = ResultStream::new(&mut io, response);
        materialize(&mut stream, shape, &self.encoding, &self.interrupt).await
    }

    /// Run the query and decode every row using [`FromRow`] implementation.
    pub async fn fetch<R: FromRow>(self, shape: &RowShape) -> Result<Vec<R>> {
        Ok(self.fetch_all(shape).await?.decode()?)
    }
}

/// Cooperative cancellation, checked between row fetches.
pub trait Interrupt {
    /// Returns `true` if the operation should stop.
    fn is_interrupted(&self) -> bool;
}

impl Interrupt for () {
    fn is_interrupted(&self) -> bool {
        false
    }
}

impl Interrupt for AtomicBool {
    fn is_interrupted(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl<T: Interrupt + ?Sized> Interrupt for &T {
    fn is_interrupted(&self) -> bool {
        T::is_interrupted(self)
    }
}

impl<T: Interrupt + ?Sized> Interrupt for Arc<T> {
    fn is_interrupted(&self) -> bool {
        T::is_interrupted(self)
    }
}

unit_error! {
    /// Operation stopped because its [`Interrupt`] was raised.
    pub struct Interrupted("canceling statement due to user request");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        Connection,
        encoding::Charset,
        error::ErrorKind,
        mock::{MockServer, Script},
        row::FieldType,
    };

    #[test]
    fn sql_with_clause() {
        let q = query("SELECT id FROM idx WHERE MATCH(?)", ()).matching("\"quoted\"");
        assert_eq!(&q.wire_sql().unwrap()[..], br#"SELECT id FROM idx WHERE MATCH('\"quoted\"')"#);
        let q = query("SHOW META", ()).matching("ignored");
        assert!(matches!(q.wire_sql().unwrap(), Cow::Borrowed(b"SHOW META")));
    }

    #[test]
    fn host_text_converted_once() {
        let latin1 = Charset::for_label("LATIN1").unwrap();
        let enc = Encoding::new(latin1, Charset::utf8());

        let q = query("SELECT id FROM idx WHERE MATCH(?)", ()).encoding(enc).matching("caf\u{e9}");
        assert_eq!(&q.wire_sql().unwrap()[..], "SELECT id FROM idx WHERE MATCH('caf\u{e9}')".as_bytes());

        let q = query("SELECT id FROM idx WHERE MATCH(?)", ()).encoding(enc).matching(b"caf\xe9'");
        assert_eq!(
            &q.wire_sql().unwrap()[..],
            "SELECT id FROM idx WHERE MATCH('caf\u{e9}\\'')".as_bytes()
        );

        let q = query(b"SELECT '\xe9'", ()).encoding(enc);
        assert_eq!(&q.wire_sql().unwrap()[..], "SELECT '\u{e9}'".as_bytes());
    }

    #[tokio::test]
    async fn query_on_connection() {
        let server = MockServer::start(vec![Script::rows(
            &["id", "weight"],
            &[&[Some("10"), Some("1")], &[Some("11"), Some("0")]],
        )])
        .await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();

        let rows: Vec<(i64, bool)> = query("SELECT id, weight FROM idx WHERE MATCH(?)", &mut conn)
            .matching("it's")
            .fetch(&RowShape::from([FieldType::BigInt, FieldType::Bool]))
            .await
            .unwrap();
        assert_eq!(rows, [(10, true), (11, false)]);
        assert_eq!(server.queries().await, [r"SELECT id, weight FROM idx WHERE MATCH('it\'s')"]);
    }

    #[tokio::test]
    async fn raised_interrupt() {
        let server = MockServer::start(vec![Script::rows(&["id"], &[&[Some("1")]])]).await;
        let mut conn = Connection::connect_with(server.config()).await.unwrap();

        let stop = AtomicBool::new(true);
        let err = query("SELECT id FROM idx", &mut conn)
            .interrupt(&stop)
            .fetch_all(&RowShape::text(1))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Interrupted(_)));
        assert_eq!(conn.releases(), 1);
    }
}

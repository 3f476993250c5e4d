//! Reading `SHOW META` of the last query.
use bytes::Bytes;
use std::{borrow::Cow, collections::VecDeque, fmt};

use crate::{
    Result,
    common::verbose,
    encoding::Encoding,
    ext::FmtExt,
    fetch::{ResultStream, materialize},
    registry::Session,
    row::{RowShape, Value},
};

const SHOW_META: &[u8] = b"SHOW META;";

/// A `SHOW META` variable.
#[derive(Clone, PartialEq, Eq)]
pub struct MetaRow {
    /// Variable name, such as `total_found`.
    pub name: Bytes,
    /// Variable value, in the host encoding.
    pub value: Bytes,
}

impl MetaRow {
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn value(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

impl fmt::Display for MetaRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name.lossy(), self.value.lossy())
    }
}

impl fmt::Debug for MetaRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MetaRow").field(&self.name()).field(&self.value()).finish()
    }
}

/// Cursor over `SHOW META` of a session.
///
/// `SHOW META` is sent on the first [`next`][MetaCursor::next], and its whole result is read
/// before the session is unlocked. Later calls page through the buffered rows, so the session
/// stays usable while the cursor is alive.
pub struct MetaCursor {
    session: Session,
    encoding: Encoding,
    state: State,
}

enum State {
    Idle,
    Buffered(VecDeque<MetaRow>),
    Done,
}

impl MetaCursor {
    pub fn new(session: Session, encoding: Encoding) -> Self {
        Self { session, encoding, state: State::Idle }
    }

    /// Returns `true` once every row has been read.
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Fetch the next variable.
    pub async fn next(&mut self) -> Result<Option<MetaRow>> {
        if let State::Idle = self.state {
            match self.load().await {
                Ok(rows) => self.state = State::Buffered(rows),
                Err(err) => {
                    self.state = State::Done;
                    return Err(err);
                },
            }
        }

        let State::Buffered(rows) = &mut self.state else {
            return Ok(None);
        };

        match rows.pop_front() {
            Some(row) => Ok(Some(row)),
            None => {
                verbose!("SHOW META exhausted");
                self.state = State::Done;
                Ok(None)
            },
        }
    }

    async fn load(&self) -> Result<VecDeque<MetaRow>> {
        let mut conn = self.session.lock().await;
        let response = conn
            .dispatch(SHOW_META)
            .await
            .map_err(|e| e.context("failed to send SHOW META to Sphinx"))?;

        let mut stream = ResultStream::new(&mut *conn, response);
        let set = materialize(&mut stream, &RowShape::text(2), &self.encoding, &()).await?;

        let rows = set
            .into_iter()
            .filter_map(|row| {
                let mut values = row.into_values().into_iter().map(|value| match value {
                    Value::Text(text) => text,
                    _ => Bytes::new(),
                });
                Some(MetaRow { name: values.next()?, value: values.next()? })
            })
            .collect();
        Ok(rows)
    }

    /// Read every remaining variable.
    pub async fn collect(mut self) -> Result<Vec<MetaRow>> {
        let mut rows = vec![];
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl fmt::Debug for MetaCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Idle => "idle",
            State::Buffered(_) => "buffered",
            State::Done => "done",
        };
        f.debug_struct("MetaCursor")
            .field("session", &self.session)
            .field("state", &state)
            .finish()
    }
}

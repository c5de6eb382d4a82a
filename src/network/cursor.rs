//! Pull-based result cursors.
//!
//! A [`Cursor`] is a lazily filled, ordered sequence of rows tied to one
//! token on one connection. The demultiplexer feeds it decoded chunks; the
//! consumer pulls rows with [`next`](Cursor::next), drains with
//! [`each`](Cursor::each) or collects with [`to_vec`](Cursor::to_vec). Rows
//! are delivered in exact server emission order, chunk by chunk, row by row;
//! chunk boundaries are invisible to the consumer.
//!
//! At most one CONTINUE request is in flight per cursor: queued `next` calls
//! coalesce onto the outstanding request instead of issuing their own.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::connection::ConnectionInner;
use crate::error::{Error, Result};
use crate::reql::Datum;

/// The outcome of running a query: either a single decoded value or a
/// paginated sequence.
#[derive(Debug)]
pub enum QueryResult {
    Atom(Datum),
    Cursor(Cursor),
}

impl QueryResult {
    /// Unwrap a single-value result.
    pub fn into_datum(self) -> Result<Datum> {
        match self {
            QueryResult::Atom(datum) => Ok(datum),
            QueryResult::Cursor(_) => Err(Error::Driver(
                "query produced a sequence, not a single value".into(),
            )),
        }
    }

    /// View the result as a cursor. Sequences pass through; a one-shot atom
    /// that is an array becomes a finished cursor over its elements, the
    /// explicit wrapper form of an iterable result.
    pub fn into_cursor(self) -> Result<Cursor> {
        match self {
            QueryResult::Cursor(cursor) => Ok(cursor),
            QueryResult::Atom(Datum::Array(items)) => Ok(Cursor::finished(items)),
            QueryResult::Atom(other) => Err(Error::Driver(format!(
                "result of type {} is not iterable",
                type_name(&other)
            ))),
        }
    }
}

fn type_name(datum: &Datum) -> &'static str {
    match datum {
        Datum::Null => "null",
        Datum::Boolean(_) => "bool",
        Datum::Number(_) => "number",
        Datum::String(_) => "string",
        Datum::Array(_) => "array",
        Datum::Object(_) => "object",
    }
}

/// Shared cursor state, written by the demultiplexer and read by consumers.
#[derive(Debug)]
pub(crate) struct CursorShared {
    state: Mutex<CursorState>,
    notify: Notify,
}

#[derive(Debug)]
struct CursorState {
    chunks: VecDeque<VecDeque<Datum>>,
    ended: bool,
    continue_outstanding: bool,
    failed: Option<String>,
}

impl CursorShared {
    pub(crate) fn new(first_chunk: Vec<Datum>, ended: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CursorState {
                chunks: VecDeque::from(vec![first_chunk.into()]),
                ended,
                continue_outstanding: false,
                failed: None,
            }),
            notify: Notify::new(),
        })
    }

    /// Append one response chunk; `ended` marks the terminal response.
    pub(crate) fn push_chunk(&self, rows: Vec<Datum>, ended: bool) {
        let mut state = self.state.lock();
        state.chunks.push_back(rows.into());
        state.continue_outstanding = false;
        if ended {
            state.ended = true;
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Fail all current and future reads.
    pub(crate) fn fail(&self, message: &str) {
        let mut state = self.state.lock();
        state.failed = Some(message.to_string());
        state.continue_outstanding = false;
        drop(state);
        self.notify.notify_waiters();
    }
}

impl CursorState {
    fn pop_row(&mut self) -> Option<Datum> {
        loop {
            let chunk = self.chunks.front_mut()?;
            match chunk.pop_front() {
                Some(row) => {
                    if chunk.is_empty() {
                        self.chunks.pop_front();
                    }
                    return Some(row);
                }
                None => {
                    self.chunks.pop_front();
                }
            }
        }
    }

    fn has_buffered_row(&self) -> bool {
        self.chunks.iter().any(|chunk| !chunk.is_empty())
    }
}

/// A lazily filled sequence of rows from one query.
pub struct Cursor {
    shared: Arc<CursorShared>,
    conn: Option<Arc<ConnectionInner>>,
    token: u64,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("token", &self.token)
            .field("state", &self.shared.state.lock())
            .finish_non_exhaustive()
    }
}

enum NextStep {
    Row(Datum),
    Failed(String),
    Drained,
    Wait { request_continue: bool },
}

impl Cursor {
    pub(crate) fn attached(
        shared: Arc<CursorShared>,
        conn: Arc<ConnectionInner>,
        token: u64,
    ) -> Self {
        Self {
            shared,
            conn: Some(conn),
            token,
        }
    }

    /// A cursor over rows that are already fully buffered.
    pub(crate) fn finished(rows: Vec<Datum>) -> Self {
        Self {
            shared: CursorShared::new(rows, true),
            conn: None,
            token: 0,
        }
    }

    /// True if another row may still be delivered: the server has not
    /// signaled completion, or rows remain buffered.
    pub fn has_next(&self) -> bool {
        let state = self.shared.state.lock();
        !state.ended || state.has_buffered_row()
    }

    /// Pull the next row, requesting another chunk from the server when the
    /// buffer runs dry. A drained cursor fails with [`Error::NoMoreRows`]
    /// instead of blocking forever.
    pub async fn next(&self) -> Result<Datum> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a chunk arriving in
            // between still wakes this call.
            notified.as_mut().enable();

            let step = {
                let mut state = self.shared.state.lock();
                if let Some(row) = state.pop_row() {
                    NextStep::Row(row)
                } else if let Some(message) = &state.failed {
                    NextStep::Failed(message.clone())
                } else if state.ended {
                    NextStep::Drained
                } else {
                    let request_continue = !state.continue_outstanding;
                    state.continue_outstanding = request_continue;
                    NextStep::Wait { request_continue }
                }
            };

            match step {
                NextStep::Row(row) => return Ok(row),
                NextStep::Failed(message) => return Err(Error::Driver(message)),
                NextStep::Drained => return Err(Error::NoMoreRows),
                NextStep::Wait { request_continue } => {
                    if request_continue {
                        let conn = self.conn.as_ref().ok_or_else(|| {
                            Error::Driver("cursor is not attached to a connection".into())
                        })?;
                        if let Err(e) = conn.send_continue(self.token).await {
                            let mut state = self.shared.state.lock();
                            state.continue_outstanding = false;
                            return Err(e);
                        }
                    }
                    notified.await;
                }
            }
        }
    }

    /// Drain the cursor, invoking `f` once per row in delivery order.
    pub async fn each(&self, mut f: impl FnMut(Datum)) -> Result<()> {
        loop {
            match self.next().await {
                Ok(row) => f(row),
                Err(Error::NoMoreRows) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Drain the cursor into a vector.
    pub async fn to_vec(&self) -> Result<Vec<Datum>> {
        let mut rows = Vec::new();
        self.each(|row| rows.push(row)).await?;
        Ok(rows)
    }

    /// Ask the server to stop producing rows for this cursor. The server's
    /// terminal response ends the cursor and retires its token.
    pub async fn close(&self) -> Result<()> {
        let already_ended = {
            let state = self.shared.state.lock();
            state.ended
        };
        if already_ended {
            return Ok(());
        }
        match &self.conn {
            Some(conn) => conn.send_stop(self.token).await,
            None => Ok(()),
        }
    }
}

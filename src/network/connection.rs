//! Connection management for the client protocol.
//!
//! One [`Connection`] is one logical session to a server: it owns the
//! transport, allocates request tokens, frames outgoing queries, and runs a
//! demultiplexer task that deframes inbound bytes and dispatches each
//! response to the pending request it belongs to.
//!
//! # Architecture
//!
//! ```text
//! Term --run--> Connection --serialize/frame--> transport
//!                    ^                              |
//!                    |                          demux task
//!              pending table <---dispatch--- deframe/decode
//!                    |
//!         oneshot responder or live Cursor
//! ```
//!
//! Many queries may be outstanding at once; responses are matched by token.
//! Frames are processed strictly in arrival order, which is what delivers
//! per-token responses in order and makes cursor chunk assembly correct
//! without extra sequencing metadata.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::cursor::{Cursor, CursorShared, QueryResult};
use super::protocol::{
    decode_response, encode_query, frame, FrameBuffer, Response, VERSION_V0_1,
};
use crate::error::{Error, Result, ServerError};
use crate::reql::{r, Term};
use crate::wire::schema::{QueryType, ResponseType};

/// Any duplex byte stream can carry the protocol.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Connection endpoint and session defaults.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    host: String,
    port: u16,
    db: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 28015,
            db: None,
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Default database for queries run on this connection.
    pub fn db(mut self, db: &str) -> Self {
        self.db = Some(db.to_string());
        self
    }

    /// Connect over TCP.
    pub async fn connect(self) -> Result<Connection> {
        Connection::connect(self).await
    }
}

/// Per-run overrides and flags.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub db: Option<String>,
    pub use_outdated: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Open,
    Closing,
    Closed,
}

enum Handler {
    /// Awaiting the first response.
    Oneshot(oneshot::Sender<Result<QueryResult>>),
    /// A live cursor consuming SUCCESS_PARTIAL chunks.
    Cursor(Arc<CursorShared>),
}

struct PendingQuery {
    /// Originating term, kept for error display.
    term: Term,
    handler: Handler,
}

struct ConnState {
    status: Status,
    next_token: u64,
    default_db: Option<String>,
    pending: HashMap<u64, PendingQuery>,
}

/// One logical session to a server.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    state: Mutex<ConnState>,
    writer: tokio::sync::Mutex<Option<WriteHalf<Box<dyn Transport>>>>,
    demux: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Connect to a server over TCP.
    pub async fn connect(opts: ConnectOptions) -> Result<Self> {
        let addr = format!("{}:{}", opts.host, opts.port);
        debug!(%addr, "connecting");
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        Self::with_stream(stream, opts).await
    }

    /// Open a connection over any duplex byte stream satisfying the
    /// transport contract (a socket, an in-memory duplex pair, a tunnel).
    pub async fn with_stream<S>(stream: S, opts: ConnectOptions) -> Result<Self>
    where
        S: Transport + 'static,
    {
        let (reader, mut writer) = tokio::io::split(Box::new(stream) as Box<dyn Transport>);

        // Version handshake precedes any framed message. A failure here
        // surfaces through the connect future; nothing is registered yet.
        writer.write_all(&VERSION_V0_1.to_le_bytes()).await?;
        writer.flush().await?;

        let inner = Arc::new(ConnectionInner {
            state: Mutex::new(ConnState {
                status: Status::Open,
                next_token: 1,
                default_db: opts.db,
                pending: HashMap::new(),
            }),
            writer: tokio::sync::Mutex::new(Some(writer)),
            demux: Mutex::new(None),
        });

        let handle = tokio::spawn(demux_loop(inner.clone(), reader));
        *inner.demux.lock() = Some(handle);

        debug!("connection open");
        Ok(Self { inner })
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.lock().status == Status::Open
    }

    /// Swap the default database used by subsequent queries.
    pub fn use_db(&self, name: &str) {
        self.inner.state.lock().default_db = Some(name.to_string());
    }

    /// Submit a query and await its result.
    pub async fn run(&self, term: &Term) -> Result<QueryResult> {
        self.run_with(term, RunOptions::default()).await
    }

    /// Submit a query with per-run options.
    pub async fn run_with(&self, term: &Term, opts: RunOptions) -> Result<QueryResult> {
        let optargs = self.global_optargs(&opts, false);

        // Register the responder before transmitting so a same-tick response
        // always finds its handler.
        let (token, rx) = {
            let mut state = self.inner.state.lock();
            if state.status != Status::Open {
                return Err(Error::Driver("connection is not open".into()));
            }
            let token = state.next_token;
            state.next_token += 1;
            let (tx, rx) = oneshot::channel();
            state.pending.insert(
                token,
                PendingQuery {
                    term: term.clone(),
                    handler: Handler::Oneshot(tx),
                },
            );
            (token, rx)
        };
        trace!(token, "start query");

        let payload = match encode_query(QueryType::Start, token, Some(term), &optargs) {
            Ok(payload) => payload,
            Err(e) => {
                self.inner.state.lock().pending.remove(&token);
                return Err(e);
            }
        };
        if let Err(e) = self.inner.write_frame(&payload).await {
            self.inner.state.lock().pending.remove(&token);
            return Err(e);
        }

        rx.await
            .map_err(|_| Error::Driver("connection closed before response".into()))?
    }

    /// Fire-and-forget delivery: the query is sent with the noreply flag,
    /// nothing is registered, and the call resolves once the bytes are
    /// written.
    pub async fn run_noreply(&self, term: &Term) -> Result<()> {
        self.run_noreply_with(term, RunOptions::default()).await
    }

    pub async fn run_noreply_with(&self, term: &Term, opts: RunOptions) -> Result<()> {
        let optargs = self.global_optargs(&opts, true);
        let token = {
            let mut state = self.inner.state.lock();
            if state.status != Status::Open {
                return Err(Error::Driver("connection is not open".into()));
            }
            let token = state.next_token;
            state.next_token += 1;
            token
        };
        trace!(token, "start noreply query");
        let payload = encode_query(QueryType::Start, token, Some(term), &optargs)?;
        self.inner.write_frame(&payload).await
    }

    /// Graceful close: no new queries, in-flight responses still resolve;
    /// retiring the last outstanding token finalizes the close.
    pub async fn close(&self) -> Result<()> {
        let finalize = {
            let mut state = self.inner.state.lock();
            if state.status == Status::Open {
                state.status = Status::Closing;
            }
            if state.pending.is_empty() {
                state.status = Status::Closed;
                true
            } else {
                false
            }
        };
        if finalize {
            self.inner.shutdown_transport().await;
        }
        debug!("connection closing");
        Ok(())
    }

    /// Hard teardown: every outstanding responder fails exactly once with a
    /// connection-closed error and cursors reject further reads.
    pub async fn cancel(&self) -> Result<()> {
        self.inner.fail_all("connection cancelled");
        if let Some(handle) = self.inner.demux.lock().take() {
            handle.abort();
        }
        self.inner.shutdown_transport().await;
        Ok(())
    }

    fn global_optargs(&self, opts: &RunOptions, noreply: bool) -> Vec<(String, Term)> {
        let mut optargs = Vec::new();
        let db = opts
            .db
            .clone()
            .or_else(|| self.inner.state.lock().default_db.clone());
        if let Some(db) = db {
            optargs.push(("db".to_string(), r::db(db.as_str())));
        }
        if let Some(flag) = opts.use_outdated {
            optargs.push(("use_outdated".to_string(), r::expr(flag)));
        }
        if noreply {
            optargs.push(("noreply".to_string(), r::expr(true)));
        }
        optargs
    }

    #[cfg(test)]
    pub(crate) fn outstanding_tokens(&self) -> usize {
        self.inner.state.lock().pending.len()
    }
}

impl Term {
    /// Run this query on a connection.
    pub async fn run(&self, conn: &Connection) -> Result<QueryResult> {
        conn.run(self).await
    }

    /// Run this query on a connection with per-run options.
    pub async fn run_with(&self, conn: &Connection, opts: RunOptions) -> Result<QueryResult> {
        conn.run_with(self, opts).await
    }
}

impl ConnectionInner {
    pub(crate) async fn write_frame(&self, payload: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::Driver("connection is not open".into()))?;
        writer.write_all(&frame(payload)).await?;
        writer.flush().await?;
        Ok(())
    }

    pub(crate) async fn send_continue(&self, token: u64) -> Result<()> {
        trace!(token, "continue query");
        let payload = encode_query(QueryType::Continue, token, None, &[])?;
        self.write_frame(&payload).await
    }

    pub(crate) async fn send_stop(&self, token: u64) -> Result<()> {
        trace!(token, "stop query");
        let payload = encode_query(QueryType::Stop, token, None, &[])?;
        self.write_frame(&payload).await
    }

    async fn shutdown_transport(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            let _ = writer.shutdown().await;
        }
    }

    fn is_closed(&self) -> bool {
        self.state.lock().status == Status::Closed
    }

    /// Fail every outstanding request exactly once and mark the connection
    /// closed. Used by cancel, transport errors, and transport end.
    fn fail_all(&self, reason: &str) {
        let drained: Vec<PendingQuery> = {
            let mut state = self.state.lock();
            state.status = Status::Closed;
            state.pending.drain().map(|(_, p)| p).collect()
        };
        if !drained.is_empty() {
            warn!(count = drained.len(), reason, "failing outstanding requests");
        }
        for pending in drained {
            match pending.handler {
                Handler::Oneshot(tx) => {
                    let _ = tx.send(Err(Error::Driver(format!("connection closed: {}", reason))));
                }
                Handler::Cursor(shared) => {
                    shared.fail(&format!("connection closed: {}", reason));
                }
            }
        }
    }
}

/// Dispatch one decoded response to its token's handler. Returns true when
/// this response retired the last token of a closing connection, meaning the
/// transport should now be shut down.
fn dispatch(inner: &Arc<ConnectionInner>, response: Response) -> bool {
    let token = response.token;
    let mut state = inner.state.lock();

    match response.rtype {
        ResponseType::SuccessPartial => {
            let Some(pending) = state.pending.get_mut(&token) else {
                warn!(token, "partial response for unknown token");
                return false;
            };
            trace!(token, rows = response.results.len(), "partial sequence");
            match &pending.handler {
                Handler::Oneshot(_) => {
                    // First chunk: promote the responder to a live cursor.
                    let shared = CursorShared::new(response.results, false);
                    let previous = std::mem::replace(
                        &mut pending.handler,
                        Handler::Cursor(shared.clone()),
                    );
                    drop(state);
                    let cursor = Cursor::attached(shared, inner.clone(), token);
                    if let Handler::Oneshot(tx) = previous {
                        let _ = tx.send(Ok(QueryResult::Cursor(cursor)));
                    }
                }
                Handler::Cursor(shared) => {
                    let shared = shared.clone();
                    drop(state);
                    shared.push_chunk(response.results, false);
                }
            }
            false
        }
        _ => {
            // Every other response type is terminal and retires the token.
            let Some(pending) = state.pending.remove(&token) else {
                warn!(token, rtype = ?response.rtype, "response for unknown token");
                return false;
            };
            let finalized = retire(&mut state);
            drop(state);
            match response.rtype {
                ResponseType::SuccessAtom => {
                    trace!(token, "atom response");
                    let result = response
                        .results
                        .into_iter()
                        .next()
                        .ok_or_else(|| {
                            Error::Protocol("SUCCESS_ATOM without a result datum".into())
                        })
                        .map(QueryResult::Atom);
                    complete(pending, result, "atom response");
                }
                ResponseType::SuccessSequence => {
                    trace!(token, rows = response.results.len(), "terminal sequence");
                    match pending.handler {
                        Handler::Oneshot(tx) => {
                            let shared = CursorShared::new(response.results, true);
                            let cursor = Cursor::attached(shared, inner.clone(), token);
                            let _ = tx.send(Ok(QueryResult::Cursor(cursor)));
                        }
                        Handler::Cursor(shared) => shared.push_chunk(response.results, true),
                    }
                }
                _ => {
                    let message = response.error_message();
                    debug!(token, rtype = ?response.rtype, %message, "error response");
                    let server_error = ServerError {
                        message,
                        term: pending.term.clone(),
                        backtrace: response.backtrace,
                    };
                    let err = match response.rtype {
                        ResponseType::ClientError => Error::Client(server_error),
                        ResponseType::CompileError => Error::Compile(server_error),
                        _ => Error::Runtime(server_error),
                    };
                    complete(pending, Err(err), "error response");
                }
            }
            finalized
        }
    }
}

fn complete(pending: PendingQuery, result: Result<QueryResult>, what: &str) {
    match pending.handler {
        Handler::Oneshot(tx) => {
            let _ = tx.send(result);
        }
        Handler::Cursor(shared) => match result {
            Ok(_) => shared.fail(&format!("protocol violation: {} for a live cursor", what)),
            Err(e) => shared.fail(&e.to_string()),
        },
    }
}

/// Retiring the last outstanding token on a closing connection finalizes
/// the close. Returns true when this call performed the transition.
fn retire(state: &mut ConnState) -> bool {
    if state.status == Status::Closing && state.pending.is_empty() {
        state.status = Status::Closed;
        return true;
    }
    false
}

/// Demultiplexer: reads transport bytes, reassembles frames, decodes and
/// dispatches responses in strict arrival order.
async fn demux_loop(inner: Arc<ConnectionInner>, mut reader: ReadHalf<Box<dyn Transport>>) {
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("transport closed by peer");
                inner.fail_all("transport closed");
                return;
            }
            Ok(n) => {
                frames.push(&buf[..n]);
                loop {
                    match frames.next_frame() {
                        Ok(Some(payload)) => match decode_response(&payload) {
                            Ok(response) => {
                                if dispatch(&inner, response) {
                                    inner.shutdown_transport().await;
                                }
                            }
                            Err(e) => {
                                // Undecodable frame means protocol desync;
                                // nothing after it can be trusted.
                                error!(error = %e, "malformed response frame");
                                inner.fail_all(&e.to_string());
                                return;
                            }
                        },
                        Ok(None) => break,
                        Err(e) => {
                            error!(error = %e, "framing error");
                            inner.fail_all(&e.to_string());
                            return;
                        }
                    }
                }
                if inner.is_closed() {
                    return;
                }
            }
            Err(e) => {
                debug!(error = %e, "transport read error");
                inner.fail_all(&format!("transport error: {}", e));
                return;
            }
        }
    }
}

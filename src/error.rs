//! Driver error types.
//!
//! Every failure surfaces through [`Result`]; nothing is panicked across an
//! async boundary. The taxonomy mirrors where a fault was detected:
//!
//! - [`Error::Driver`]: malformed API usage caught client-side, before any
//!   bytes are sent (bad arity, write-after-close, bad option value)
//! - [`Error::Client`] / [`Error::Compile`] / [`Error::Runtime`]: reported by
//!   the server, carrying the originating term and a backtrace so the display
//!   can reprint the query with a caret line under the erroring subexpression
//! - [`Error::Io`]: transport-level failures
//! - [`Error::Protocol`]: malformed wire data; fatal, since it indicates
//!   protocol desync that cannot be recovered locally
//! - [`Error::NoMoreRows`]: a read from a drained cursor

use thiserror::Error;

use crate::reql::{print_carets, print_query, Frame, Term};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Client error: {0}")]
    Client(ServerError),

    #[error("Compile error: {0}")]
    Compile(ServerError),

    #[error("Runtime error: {0}")]
    Runtime(ServerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No more rows in the cursor")]
    NoMoreRows,
}

/// A server-reported query failure with enough context to reprint it.
#[derive(Debug)]
pub struct ServerError {
    pub message: String,
    pub term: Term,
    pub backtrace: Vec<Frame>,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        write!(f, "\nin:\n{}", print_query(&self.term))?;
        if !self.backtrace.is_empty() {
            write!(f, "\n{}", print_carets(&self.term, &self.backtrace))?;
        }
        Ok(())
    }
}

impl Error {
    /// True for server-reported query errors (as opposed to local faults).
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Client(_) | Error::Compile(_) | Error::Runtime(_))
    }
}

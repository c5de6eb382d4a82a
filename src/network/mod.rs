//! Client networking: framing, connections, and result cursors.
//!
//! - [`protocol`]: handshake magic, length-prefixed framing, and the typed
//!   query/response layer
//! - [`connection`]: token-multiplexed sessions and the response
//!   demultiplexer
//! - [`cursor`]: pull-based iteration over paginated result sequences

pub mod connection;
pub mod cursor;
pub mod protocol;

pub use connection::{ConnectOptions, Connection, RunOptions};
pub use cursor::{Cursor, QueryResult};

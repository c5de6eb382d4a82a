// PhotonDB client driver
// A query-expression compiler and connection layer for the document database

#![warn(rust_2018_idioms)]

pub mod error;
pub mod network;
pub mod reql;
pub mod wire;

// Re-exports for convenience
pub use error::{Error, Result};
pub use network::{ConnectOptions, Connection, Cursor, QueryResult, RunOptions};
pub use reql::{r, Datum, Frame, Term, TermKind};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        let _version: &str = VERSION;
    }
}

//! The capability a handler uses to answer one request.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use crate::context::ContextHandle;
use crate::http::parser::ParseError;
use crate::http::response::ResponseHead;

/// Identifier of a transaction, unique within its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Egress state reported when a body chunk is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Egress {
    Flowing,
    /// The outbound path is saturated: stop producing until resumed.
    Paused,
}

impl Egress {
    pub fn is_paused(&self) -> bool {
        matches!(self, Egress::Paused)
    }
}

/// Transport-level failure reported to a handler through `on_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("peer closed the connection mid-transaction")]
    PeerClosed,
    #[error("i/o failure: {0}")]
    Io(String),
    #[error("malformed request body: {0}")]
    MalformedBody(#[from] ParseError),
}

/// Commands a handler may issue for its request.
///
/// A transaction is only ever driven from its owning execution context, so
/// implementations need no internal synchronization.
pub trait Transaction {
    fn id(&self) -> TxnId;

    /// Handle of the execution context that owns this transaction.
    fn context(&self) -> ContextHandle;

    /// Sends a response head. Interim (1xx) heads may precede the final one.
    fn send_headers(&mut self, head: ResponseHead);

    /// Queues a body chunk and reports whether egress is now paused.
    fn send_body(&mut self, chunk: Bytes) -> Egress;

    /// Completes the response body.
    fn send_eom(&mut self);

    /// Terminates the exchange immediately, discarding unsent output.
    fn send_abort(&mut self);

    fn is_egress_paused(&self) -> bool;
}

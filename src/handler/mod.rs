//! Request handlers.
//!
//! A handler is created by the router when a request head arrives and is
//! driven by the connection through the lifecycle callbacks below, always from
//! the connection's owning execution context and never concurrently. The
//! connection owns the handler: it calls [`Handler::detach`] exactly once when
//! the transaction is finished and drops the handler right after, so no
//! callback can reach it afterwards.

pub mod continue_handler;
pub mod echo;
pub mod rand_bytes;
pub mod static_content;
pub mod wait_release;

pub use continue_handler::ContinueHandler;
pub use echo::EchoHandler;
pub use rand_bytes::RandBytesGenHandler;
pub use static_content::{DummyHandler, HealthCheckHandler};
pub use wait_release::WaitReleaseHandler;

use bytes::Bytes;

use crate::http::headers::HeaderMap;
use crate::http::request::Request;
use crate::http::response::{ResponseBuilder, StatusCode};
use crate::transaction::{Transaction, TransactionError};

/// Decorative block appended to echo responses for legacy (HTTP/0.9) requests.
pub const LEGACY_FOOTER: &str = include_str!("legacy_footer.txt");

/// Lifecycle callbacks of one transaction.
pub trait Handler: Send {
    fn on_headers_complete(&mut self, txn: &mut dyn Transaction, request: Request);

    fn on_body(&mut self, txn: &mut dyn Transaction, chunk: Bytes);

    fn on_chunk_header(&mut self, _length: usize) {}

    fn on_chunk_complete(&mut self) {}

    fn on_trailers(&mut self, _trailers: HeaderMap) {}

    fn on_upgrade(&mut self, _protocol: &str) {}

    fn on_eom(&mut self, txn: &mut dyn Transaction);

    /// A transport failure. Terminal: the transaction is torn down afterwards.
    fn on_error(&mut self, txn: &mut dyn Transaction, error: &TransactionError);

    fn on_egress_paused(&mut self, _txn: &mut dyn Transaction) {}

    fn on_egress_resumed(&mut self, _txn: &mut dyn Transaction) {}

    /// Last call the handler receives.
    fn detach(&mut self) {}
}

/// State shared by every handler: the protocol version it answers with.
#[derive(Debug, Clone)]
pub struct HandlerBase {
    version: String,
}

impl HandlerBase {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Starts a response head stamped with this handler's version.
    pub fn response(&self, status: StatusCode) -> ResponseBuilder {
        ResponseBuilder::new(status).version(self.version.clone())
    }
}

impl Default for HandlerBase {
    fn default() -> Self {
        Self::new("1.1")
    }
}

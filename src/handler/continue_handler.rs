use bytes::Bytes;
use tracing::debug;

use crate::handler::{EchoHandler, Handler, HandlerBase};
use crate::http::headers::HeaderMap;
use crate::http::request::Request;
use crate::http::response::StatusCode;
use crate::transaction::{Transaction, TransactionError};

/// Answers `Expect: 100-continue` with an interim response, then hands the
/// request to the wrapped handler unchanged.
pub struct ContinueHandler<H = EchoHandler> {
    base: HandlerBase,
    inner: H,
}

impl ContinueHandler<EchoHandler> {
    pub fn echo(base: HandlerBase) -> Self {
        Self::wrap(base.clone(), EchoHandler::new(base))
    }
}

impl<H: Handler> ContinueHandler<H> {
    pub fn wrap(base: HandlerBase, inner: H) -> Self {
        Self { base, inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: Handler> Handler for ContinueHandler<H> {
    fn on_headers_complete(&mut self, txn: &mut dyn Transaction, request: Request) {
        let expects_continue = request
            .header("Expect")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"));
        if expects_continue {
            debug!(txn = %txn.id(), "sending 100 Continue");
            let interim = self.base.response(StatusCode::Continue).build();
            txn.send_headers(interim);
        }
        self.inner.on_headers_complete(txn, request);
    }

    fn on_body(&mut self, txn: &mut dyn Transaction, chunk: Bytes) {
        self.inner.on_body(txn, chunk);
    }

    fn on_chunk_header(&mut self, length: usize) {
        self.inner.on_chunk_header(length);
    }

    fn on_chunk_complete(&mut self) {
        self.inner.on_chunk_complete();
    }

    fn on_trailers(&mut self, trailers: HeaderMap) {
        self.inner.on_trailers(trailers);
    }

    fn on_upgrade(&mut self, protocol: &str) {
        self.inner.on_upgrade(protocol);
    }

    fn on_eom(&mut self, txn: &mut dyn Transaction) {
        self.inner.on_eom(txn);
    }

    fn on_error(&mut self, txn: &mut dyn Transaction, error: &TransactionError) {
        self.inner.on_error(txn, error);
    }

    fn on_egress_paused(&mut self, txn: &mut dyn Transaction) {
        self.inner.on_egress_paused(txn);
    }

    fn on_egress_resumed(&mut self, txn: &mut dyn Transaction) {
        self.inner.on_egress_resumed(txn);
    }

    fn detach(&mut self) {
        self.inner.detach();
    }
}

use bytes::Bytes;
use tracing::debug;

use crate::handler::{Handler, HandlerBase, LEGACY_FOOTER};
use crate::http::request::Request;
use crate::http::response::StatusCode;
use crate::transaction::{Transaction, TransactionError};

/// Mirrors the request back: every request header `name` comes back as
/// `x-echo-name`, the body is forwarded chunk by chunk.
#[derive(Debug, Default)]
pub struct EchoHandler {
    base: HandlerBase,
    send_footer: bool,
}

impl EchoHandler {
    pub fn new(base: HandlerBase) -> Self {
        Self {
            base,
            send_footer: false,
        }
    }
}

impl Handler for EchoHandler {
    fn on_headers_complete(&mut self, txn: &mut dyn Transaction, request: Request) {
        debug!(txn = %txn.id(), version = self.base.version(), "echo: headers complete");
        self.send_footer = request.is_legacy();

        let mut response = self.base.response(StatusCode::Ok).reason("Ok");
        for (name, value) in request.headers.iter() {
            response = response.header(format!("x-echo-{name}"), value);
        }
        let head = response.strip_hop_by_hop().keep_alive(true).build();
        txn.send_headers(head);
    }

    fn on_body(&mut self, txn: &mut dyn Transaction, chunk: Bytes) {
        debug!(txn = %txn.id(), len = chunk.len(), "echo: body");
        txn.send_body(chunk);
    }

    fn on_eom(&mut self, txn: &mut dyn Transaction) {
        debug!(txn = %txn.id(), "echo: eom");
        if self.send_footer {
            txn.send_body(Bytes::from_static(LEGACY_FOOTER.as_bytes()));
        }
        txn.send_eom();
    }

    fn on_error(&mut self, txn: &mut dyn Transaction, error: &TransactionError) {
        debug!(txn = %txn.id(), %error, "echo: aborting");
        txn.send_abort();
    }
}

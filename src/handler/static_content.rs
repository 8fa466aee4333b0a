//! Fixed-content responders.

use bytes::Bytes;
use tracing::{debug, error};

use crate::handler::{Handler, HandlerBase};
use crate::http::request::{Method, Request};
use crate::http::response::StatusCode;
use crate::transaction::{Transaction, TransactionError};

pub const DUMMY_MESSAGE: &str = "you reached flowprobe, \
reach the /echo endpoint for an echo response \
query /<number> endpoints for a variable size response with random bytes";

pub const HEALTHY_BODY: &str = "1-AM-ALIVE";
pub const UNHEALTHY_BODY: &str = "1-AM-NOT-WELL";

/// Answers anything it does not otherwise recognize with an informational message.
#[derive(Debug, Default)]
pub struct DummyHandler {
    base: HandlerBase,
}

impl DummyHandler {
    pub fn new(base: HandlerBase) -> Self {
        Self { base }
    }
}

impl Handler for DummyHandler {
    fn on_headers_complete(&mut self, txn: &mut dyn Transaction, request: Request) {
        debug!(txn = %txn.id(), "dummy: headers complete");
        let head = self
            .base
            .response(StatusCode::Ok)
            .reason("Ok")
            .strip_hop_by_hop()
            .keep_alive(true)
            .build();
        txn.send_headers(head);
        if request.method == Method::GET {
            txn.send_body(Bytes::from_static(DUMMY_MESSAGE.as_bytes()));
        }
    }

    fn on_body(&mut self, txn: &mut dyn Transaction, _chunk: Bytes) {
        txn.send_body(Bytes::from_static(DUMMY_MESSAGE.as_bytes()));
    }

    fn on_eom(&mut self, txn: &mut dyn Transaction) {
        txn.send_eom();
    }

    fn on_error(&mut self, txn: &mut dyn Transaction, _error: &TransactionError) {
        txn.send_abort();
    }
}

/// Reports a fixed health verdict. Only `GET` without a body is a valid request.
#[derive(Debug)]
pub struct HealthCheckHandler {
    base: HandlerBase,
    healthy: bool,
}

impl HealthCheckHandler {
    pub fn new(base: HandlerBase, healthy: bool) -> Self {
        Self { base, healthy }
    }
}

impl Handler for HealthCheckHandler {
    fn on_headers_complete(&mut self, txn: &mut dyn Transaction, request: Request) {
        debug!(txn = %txn.id(), healthy = self.healthy, "health check");
        if request.method != Method::GET {
            error!(txn = %txn.id(), method = ?request.method, "health check only accepts GET");
            txn.send_abort();
            return;
        }

        let (status, reason, body) = if self.healthy {
            (StatusCode::Ok, "Ok", HEALTHY_BODY)
        } else {
            (StatusCode::BadRequest, "Not Found", UNHEALTHY_BODY)
        };
        let head = self
            .base
            .response(status)
            .reason(reason)
            .strip_hop_by_hop()
            .keep_alive(true)
            .build();
        txn.send_headers(head);
        txn.send_body(Bytes::from_static(body.as_bytes()));
    }

    fn on_body(&mut self, txn: &mut dyn Transaction, _chunk: Bytes) {
        error!(txn = %txn.id(), "health check request carried a body");
        txn.send_abort();
    }

    fn on_eom(&mut self, txn: &mut dyn Transaction) {
        txn.send_eom();
    }

    fn on_error(&mut self, txn: &mut dyn Transaction, _error: &TransactionError) {
        txn.send_abort();
    }
}

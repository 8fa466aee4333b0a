//! `/wait?id=N` suspends a response until `/release?id=N` arrives, possibly
//! on another connection served by another thread.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::context::ContextEvent;
use crate::handler::{Handler, HandlerBase};
use crate::http::request::{Method, Request};
use crate::http::response::StatusCode;
use crate::registry::{RegistryError, WaitRegistry, Waiter, RELEASED_BODY};
use crate::transaction::{Transaction, TransactionError};

pub struct WaitReleaseHandler {
    base: HandlerBase,
    registry: Arc<WaitRegistry>,
    waiter: Option<Arc<Waiter>>,
}

impl WaitReleaseHandler {
    pub fn new(base: HandlerBase, registry: Arc<WaitRegistry>) -> Self {
        Self {
            base,
            registry,
            waiter: None,
        }
    }

    fn send_error_response(base: &HandlerBase, txn: &mut dyn Transaction, body: &'static str) {
        let head = base
            .response(StatusCode::BadRequest)
            .reason("ERROR")
            .content_length(body.len())
            .keep_alive(false)
            .build();
        txn.send_headers(head);
        txn.send_body(Bytes::from_static(body.as_bytes()));
        txn.send_eom();
    }

    fn wait(&mut self, txn: &mut dyn Transaction, id: u32) {
        match self.registry.register(id, txn.id(), txn.context()) {
            Ok(waiter) => {
                self.waiter = Some(waiter);
                let head = self.base.response(StatusCode::Ok).reason("OK").build();
                txn.send_headers(head);
                txn.send_body(Bytes::from_static(b"waiting\n"));
            }
            Err(RegistryError::DuplicateId(id)) => {
                warn!(id, "wait id already registered");
                Self::send_error_response(&self.base, txn, "id already exists\n");
            }
        }
    }

    fn release(&mut self, txn: &mut dyn Transaction, id: u32) {
        let Some(completion) = self.registry.release(id) else {
            Self::send_error_response(&self.base, txn, "id does not exist\n");
            return;
        };

        // Answer only after the waiter has been completed on its own context.
        let context = txn.context();
        let target = txn.id();
        let base = self.base.clone();
        tokio::spawn(async move {
            let completed = completion.finished().await;
            debug!(id, completed, "release completed");
            let event = ContextEvent::new(target, move |txn| {
                if !completed {
                    Self::send_error_response(&base, txn, "id does not exist\n");
                    return;
                }
                let head = base.response(StatusCode::Ok).reason("OK").build();
                txn.send_headers(head);
                txn.send_body(Bytes::from_static(RELEASED_BODY.as_bytes()));
                txn.send_eom();
            });
            if context.post(event).is_err() {
                debug!(id, "releasing connection closed before the reply");
            }
        });
    }

    fn unregister(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            self.registry.unregister(&waiter);
        }
    }
}

impl Handler for WaitReleaseHandler {
    fn on_headers_complete(&mut self, txn: &mut dyn Transaction, request: Request) {
        debug!(txn = %txn.id(), path = %request.path, "wait/release: headers complete");
        let path = request.path_only();
        let id = request.query_param("id");
        let (Method::GET, Some(id), "/wait" | "/release") = (request.method, id.as_deref(), path)
        else {
            Self::send_error_response(&self.base, txn, "bad request\n");
            return;
        };

        let id = match id.parse::<u32>() {
            Ok(id) if id != 0 => id,
            _ => {
                Self::send_error_response(&self.base, txn, "invalid id\n");
                return;
            }
        };

        if path == "/wait" {
            self.wait(txn, id);
        } else {
            self.release(txn, id);
        }
    }

    fn on_body(&mut self, txn: &mut dyn Transaction, _chunk: Bytes) {
        debug!(txn = %txn.id(), "wait/release: ignoring body");
    }

    fn on_eom(&mut self, txn: &mut dyn Transaction) {
        debug!(txn = %txn.id(), "wait/release: eom");
    }

    fn on_error(&mut self, txn: &mut dyn Transaction, error: &TransactionError) {
        debug!(txn = %txn.id(), %error, "wait/release: aborting");
        self.unregister();
        txn.send_abort();
    }

    fn detach(&mut self) {
        self.unregister();
    }
}

//! Shared utilities for handler and server tests.

#![allow(dead_code)]

use std::time::Duration;

use bytes::Bytes;
use flowprobe::context::{ContextHandle, ExecutionContext};
use flowprobe::handler::Handler;
use flowprobe::http::request::{Method, Request, RequestBuilder};
use flowprobe::http::response::ResponseHead;
use flowprobe::transaction::{Egress, Transaction, TransactionError, TxnId};
use tokio::io::{AsyncRead, AsyncReadExt};

/// One command a handler issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Headers(ResponseHead),
    Body(Bytes),
    Eom,
    Abort,
}

/// A transaction that records everything sent through it.
///
/// With `pause_every(n)` every `n`-th body chunk since the last resume
/// reports [`Egress::Paused`].
pub struct RecordingTransaction {
    id: TxnId,
    context: ContextHandle,
    pub sent: Vec<Sent>,
    pause_every: Option<usize>,
    chunks_since_resume: usize,
    paused: bool,
}

impl RecordingTransaction {
    pub fn new(id: TxnId, context: ContextHandle) -> Self {
        Self {
            id,
            context,
            sent: Vec::new(),
            pause_every: None,
            chunks_since_resume: 0,
            paused: false,
        }
    }

    /// Final (non-interim) response heads.
    pub fn heads(&self) -> Vec<&ResponseHead> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Headers(head) if !head.status.is_informational() => Some(head),
                _ => None,
            })
            .collect()
    }

    pub fn head(&self) -> &ResponseHead {
        let heads = self.heads();
        assert_eq!(heads.len(), 1, "expected exactly one response head");
        heads[0]
    }

    pub fn chunks(&self) -> Vec<&Bytes> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Body(chunk) => Some(chunk),
                _ => None,
            })
            .collect()
    }

    pub fn body(&self) -> String {
        self.chunks()
            .into_iter()
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect()
    }

    pub fn eom_count(&self) -> usize {
        self.sent.iter().filter(|s| **s == Sent::Eom).count()
    }

    pub fn aborted(&self) -> bool {
        self.sent.contains(&Sent::Abort)
    }
}

impl Transaction for RecordingTransaction {
    fn id(&self) -> TxnId {
        self.id
    }

    fn context(&self) -> ContextHandle {
        self.context.clone()
    }

    fn send_headers(&mut self, head: ResponseHead) {
        self.sent.push(Sent::Headers(head));
    }

    fn send_body(&mut self, chunk: Bytes) -> Egress {
        self.sent.push(Sent::Body(chunk));
        self.chunks_since_resume += 1;
        if self
            .pause_every
            .is_some_and(|n| self.chunks_since_resume >= n)
        {
            self.paused = true;
        }
        if self.paused {
            Egress::Paused
        } else {
            Egress::Flowing
        }
    }

    fn send_eom(&mut self) {
        self.sent.push(Sent::Eom);
    }

    fn send_abort(&mut self) {
        self.sent.push(Sent::Abort);
    }

    fn is_egress_paused(&self) -> bool {
        self.paused
    }
}

/// Drives one handler the way a connection would: every callback runs inside
/// the harness's execution context, and posted events are run between
/// callbacks.
pub struct Harness<H> {
    pub context: ExecutionContext,
    pub txn: RecordingTransaction,
    pub handler: H,
}

impl<H: Handler> Harness<H> {
    pub fn new(handler: H) -> Self {
        Self::with_id(handler, TxnId(1))
    }

    pub fn with_id(handler: H, id: TxnId) -> Self {
        let context = ExecutionContext::new();
        let txn = RecordingTransaction::new(id, context.handle());
        Self {
            context,
            txn,
            handler,
        }
    }

    pub fn pause_every(&mut self, chunks: usize) {
        self.txn.pause_every = Some(chunks);
    }

    pub fn headers(&mut self, request: Request) {
        self.call(|handler, txn| handler.on_headers_complete(txn, request));
    }

    pub fn body(&mut self, chunk: &'static [u8]) {
        self.call(|handler, txn| handler.on_body(txn, Bytes::from_static(chunk)));
    }

    pub fn eom(&mut self) {
        self.call(|handler, txn| handler.on_eom(txn));
    }

    pub fn error(&mut self, error: TransactionError) {
        self.call(|handler, txn| handler.on_error(txn, &error));
    }

    pub fn egress_paused(&mut self) {
        self.txn.paused = true;
        self.call(|handler, txn| handler.on_egress_paused(txn));
    }

    /// Clears the pause and delivers `on_egress_resumed`.
    pub fn egress_resumed(&mut self) {
        self.txn.paused = false;
        self.txn.chunks_since_resume = 0;
        self.call(|handler, txn| handler.on_egress_resumed(txn));
    }

    pub fn detach(&mut self) {
        self.handler.detach();
    }

    /// Full body-less GET.
    pub fn get(&mut self, path: &str) {
        self.headers(request(Method::GET, path));
        self.eom();
    }

    fn call<F>(&mut self, f: F)
    where
        F: FnOnce(&mut H, &mut RecordingTransaction),
    {
        {
            let _entered = self.context.enter();
            f(&mut self.handler, &mut self.txn);
        }
        self.pump();
    }

    /// Runs every event already posted to the context.
    pub fn pump(&mut self) -> usize {
        let mut ran = 0;
        while let Some(event) = self.context.try_next_event() {
            if event.target() == self.txn.id() {
                let _entered = self.context.enter();
                event.run(&mut self.txn);
                ran += 1;
            }
        }
        ran
    }

    /// Waits for the next posted event and runs it.
    pub async fn next_event(&mut self) {
        let event = tokio::time::timeout(Duration::from_secs(5), self.context.next_event())
            .await
            .expect("timed out waiting for a context event")
            .expect("context closed");
        assert_eq!(event.target(), self.txn.id());
        let _entered = self.context.enter();
        event.run(&mut self.txn);
    }
}

pub fn request(method: Method, path: &str) -> Request {
    RequestBuilder::new()
        .method(method)
        .path(path)
        .build()
        .unwrap()
}

/// Reads from `stream` until the bytes read so far contain `needle`.
pub async fn read_until<S: AsyncRead + Unpin>(stream: &mut S, needle: &str) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let deadline = Duration::from_secs(5);
    while !String::from_utf8_lossy(&raw).contains(needle) {
        let n = tokio::time::timeout(deadline, stream.read(&mut buf))
            .await
            .expect("timed out reading")
            .unwrap();
        assert!(n > 0, "connection closed before {needle:?} arrived");
        raw.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(raw).unwrap()
}

pub async fn read_to_close<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw))
        .await
        .expect("timed out reading")
        .unwrap();
    String::from_utf8(raw).unwrap()
}

/// Decodes a chunked body, returning the payload.
pub fn dechunk(mut body: &str) -> String {
    let mut payload = String::new();
    loop {
        let (size, rest) = body.split_once("\r\n").expect("chunk size line");
        let size = usize::from_str_radix(size, 16).expect("hex chunk size");
        if size == 0 {
            return payload;
        }
        payload.push_str(&rest[..size]);
        body = &rest[size + 2..];
    }
}

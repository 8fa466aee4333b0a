use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{debug, warn};

use crate::config::EgressConfig;
use crate::context::{ContextEvent, ContextHandle, ExecutionContext};
use crate::handler::Handler;
use crate::http::egress::OutboundQueue;
use crate::http::parser::{
    parse_request_head, BodyDecoder, BodyEvent, ParseError, MAX_HEAD_BYTES,
};
use crate::http::request::{Method, Request, Version};
use crate::http::response::{ResponseBuilder, ResponseHead, StatusCode};
use crate::http::writer::{self, Framing};
use crate::server::router::Router;
use crate::transaction::{Egress, Transaction, TransactionError, TxnId};

/// Lifecycle of the connection as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Serving requests
    Open,
    /// No further requests; close once pending output is written
    Draining,
    /// Aborted; close without flushing
    Closed,
}

/// Progress of the current request's inbound side.
enum Ingress {
    Head,
    Body(BodyDecoder),
    Complete,
}

/// Per-transaction bookkeeping seen by the handler through [`Exchange`].
struct TxnState {
    id: TxnId,
    context: ContextHandle,
    version: Version,
    request_keep_alive: bool,
    /// Response to `HEAD`: the head goes out, body bytes never do.
    head_only: bool,
    framing: Option<Framing>,
    keep_alive: bool,
    eom_sent: bool,
    aborted: bool,
}

struct ActiveTransaction {
    handler: Box<dyn Handler>,
    txn: TxnState,
}

/// The [`Transaction`] a handler is given during one callback.
struct Exchange<'a> {
    txn: &'a mut TxnState,
    out: &'a mut OutboundQueue,
}

impl Transaction for Exchange<'_> {
    fn id(&self) -> TxnId {
        self.txn.id
    }

    fn context(&self) -> ContextHandle {
        self.txn.context.clone()
    }

    fn send_headers(&mut self, head: ResponseHead) {
        if self.txn.aborted || self.txn.eom_sent {
            warn!(txn = %self.txn.id, "headers after end of response ignored");
            return;
        }
        if head.status.is_informational() {
            if self.txn.version == Version::Http11 && self.txn.framing.is_none() {
                self.out.push(&writer::encode_interim(&head));
            }
            return;
        }
        if self.txn.framing.is_some() {
            warn!(txn = %self.txn.id, "duplicate response head ignored");
            return;
        }

        let framing = match self.txn.version {
            Version::Http09 => Framing::Legacy,
            _ if head.content_length().is_some() => Framing::Length,
            Version::Http11 => Framing::Chunked,
            Version::Http10 => Framing::CloseDelimited,
        };
        let keep_alive = head.keep_alive && self.txn.request_keep_alive && framing.reusable();
        debug!(
            txn = %self.txn.id,
            status = head.status.as_u16(),
            ?framing,
            keep_alive,
            "sending response head"
        );
        self.out.push(&writer::encode_head(&head, framing, keep_alive));
        self.txn.framing = Some(framing);
        self.txn.keep_alive = keep_alive;
    }

    fn send_body(&mut self, chunk: Bytes) -> Egress {
        let Some(framing) = self.txn.framing else {
            warn!(txn = %self.txn.id, "body before response head ignored");
            return self.out.state();
        };
        if self.txn.aborted || self.txn.eom_sent {
            warn!(txn = %self.txn.id, "body after end of response ignored");
            return self.out.state();
        }
        if self.txn.head_only {
            return self.out.state();
        }
        let mut framed = Vec::with_capacity(chunk.len() + 16);
        writer::encode_chunk(&mut framed, framing, &chunk);
        self.out.push(&framed)
    }

    fn send_eom(&mut self) {
        if self.txn.aborted || self.txn.eom_sent {
            warn!(txn = %self.txn.id, "duplicate end of message ignored");
            return;
        }
        let Some(framing) = self.txn.framing else {
            warn!(txn = %self.txn.id, "end of message before response head ignored");
            return;
        };
        if !self.txn.head_only {
            self.out.push(writer::encode_eom(framing));
        }
        self.txn.eom_sent = true;
    }

    fn send_abort(&mut self) {
        if !self.txn.aborted {
            debug!(txn = %self.txn.id, "transaction aborted");
            self.txn.aborted = true;
            self.out.clear();
        }
    }

    fn is_egress_paused(&self) -> bool {
        self.out.is_paused()
    }
}

enum Step {
    Event(ContextEvent),
    Wrote(std::io::Result<usize>),
    Read(std::io::Result<usize>),
}

/// One client connection.
///
/// The connection is the owning execution context of its transactions: it is
/// the only caller of their handlers, and it runs events posted to its
/// [`ContextHandle`] between callbacks. Requests are served one at a time.
pub struct Connection<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    read_buf: BytesMut,
    out: OutboundQueue,
    context: ExecutionContext,
    router: Arc<Router>,
    active: Option<ActiveTransaction>,
    ingress: Ingress,
    state: ConnectionState,
    next_txn: u64,
    peer_closed: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(stream: S, router: Arc<Router>, egress: EgressConfig) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer,
            read_buf: BytesMut::with_capacity(4096),
            out: OutboundQueue::new(egress.high_watermark, egress.low_watermark),
            context: ExecutionContext::new(),
            router,
            active: None,
            ingress: Ingress::Head,
            state: ConnectionState::Open,
            next_txn: 1,
            peer_closed: false,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            self.drive_ingress();
            if self.maybe_detach() {
                // A pipelined request may already be buffered.
                continue;
            }

            if self.should_close() {
                break;
            }

            let reading = self.wants_read();
            let writing = !self.out.is_empty();

            let step = tokio::select! {
                biased;
                Some(event) = self.context.next_event() => Step::Event(event),
                res = self.writer.write(self.out.as_slice()), if writing => Step::Wrote(res),
                res = self.reader.read_buf(&mut self.read_buf), if reading => Step::Read(res),
                else => break,
            };

            match step {
                Step::Event(event) => self.run_event(event),
                Step::Wrote(Ok(0)) => {
                    self.fail(TransactionError::Io("connection closed while writing".into()));
                    self.maybe_detach();
                    return Err(anyhow::anyhow!("connection closed while writing"));
                }
                Step::Wrote(Ok(n)) => {
                    if self.out.consume(n) {
                        self.dispatch(|handler, txn| handler.on_egress_resumed(txn));
                    }
                }
                Step::Wrote(Err(e)) => {
                    self.fail(TransactionError::Io(e.to_string()));
                    self.maybe_detach();
                    return Err(e.into());
                }
                Step::Read(Ok(0)) => {
                    self.peer_closed = true;
                    if self.active.is_some() {
                        self.fail(TransactionError::PeerClosed);
                    }
                }
                Step::Read(Ok(_)) => {}
                Step::Read(Err(e)) => {
                    self.peer_closed = true;
                    self.fail(TransactionError::Io(e.to_string()));
                }
            }
        }

        if let Err(e) = self.writer.shutdown().await {
            debug!(error = %e, "shutdown failed");
        }
        Ok(())
    }

    fn should_close(&self) -> bool {
        match self.state {
            ConnectionState::Closed => true,
            ConnectionState::Draining => self.active.is_none() && self.out.is_empty(),
            ConnectionState::Open => {
                self.peer_closed && self.active.is_none() && self.out.is_empty()
            }
        }
    }

    fn wants_read(&self) -> bool {
        self.state == ConnectionState::Open
            && !self.peer_closed
            && !self.out.is_paused()
            // Read-ahead is bounded by the head limit.
            && self.read_buf.len() < MAX_HEAD_BYTES
    }

    /// Parses buffered input and delivers the resulting callbacks.
    fn drive_ingress(&mut self) {
        while self.state == ConnectionState::Open
            && !self.active.as_ref().is_some_and(|a| a.txn.aborted)
        {
            if matches!(self.ingress, Ingress::Head) {
                if self.active.is_some() || !self.ingest_head() {
                    return;
                }
                continue;
            }

            let Ingress::Body(decoder) = &mut self.ingress else {
                return;
            };
            let decoded = decoder.decode(&mut self.read_buf);

            match decoded {
                Ok(Some(BodyEvent::ChunkHeader(length))) => {
                    self.dispatch(|handler, _| handler.on_chunk_header(length));
                }
                Ok(Some(BodyEvent::Data(chunk))) => {
                    self.dispatch(|handler, txn| handler.on_body(txn, chunk));
                }
                Ok(Some(BodyEvent::ChunkComplete)) => {
                    self.dispatch(|handler, _| handler.on_chunk_complete());
                }
                Ok(Some(BodyEvent::Trailers(trailers))) => {
                    self.dispatch(|handler, _| handler.on_trailers(trailers));
                }
                Ok(Some(BodyEvent::End)) => {
                    self.ingress = Ingress::Complete;
                    self.dispatch(|handler, txn| handler.on_eom(txn));
                }
                Ok(None) => return,
                Err(e) => {
                    self.fail(TransactionError::MalformedBody(e));
                    return;
                }
            }
        }
    }

    /// Tries to start a transaction from buffered input. Returns `false` when
    /// no request could be started.
    fn ingest_head(&mut self) -> bool {
        if self.read_buf.is_empty() {
            return false;
        }
        match parse_request_head(&self.read_buf) {
            Ok((request, consumed)) => {
                self.read_buf.advance(consumed);
                match BodyDecoder::for_request(&request) {
                    Ok(body) => {
                        self.begin(request, body);
                        true
                    }
                    Err(e) => {
                        self.reject(e);
                        false
                    }
                }
            }
            Err(ParseError::Incomplete) => {
                if self.read_buf.len() >= MAX_HEAD_BYTES {
                    self.reject(ParseError::InvalidRequest);
                }
                false
            }
            Err(e) => {
                self.reject(e);
                false
            }
        }
    }

    fn begin(&mut self, request: Request, body: Option<BodyDecoder>) {
        let id = TxnId(self.next_txn);
        self.next_txn += 1;
        debug!(
            txn = %id,
            method = ?request.method,
            path = %request.path,
            version = request.version.as_str(),
            "transaction started"
        );

        let handler = self.router.handler_for(&request);
        self.active = Some(ActiveTransaction {
            handler,
            txn: TxnState {
                id,
                context: self.context.handle(),
                version: request.version,
                request_keep_alive: request.keep_alive(),
                head_only: request.method == Method::HEAD,
                framing: None,
                keep_alive: false,
                eom_sent: false,
                aborted: false,
            },
        });

        let has_body = body.is_some();
        self.ingress = match body {
            Some(decoder) => Ingress::Body(decoder),
            None => Ingress::Complete,
        };
        self.dispatch(|handler, txn| handler.on_headers_complete(txn, request));
        if !has_body {
            self.dispatch(|handler, txn| handler.on_eom(txn));
        }
    }

    /// Answers an unparsable request head directly and stops reading.
    fn reject(&mut self, error: ParseError) {
        warn!(%error, "rejecting malformed request");
        let body = b"bad request\n";
        let head = ResponseBuilder::new(StatusCode::BadRequest)
            .content_length(body.len())
            .keep_alive(false)
            .build();
        self.out.push(&writer::encode_head(&head, Framing::Length, false));
        self.out.push(body);
        self.state = ConnectionState::Draining;
    }

    /// Runs one handler callback with the transaction it may act on.
    fn dispatch<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut dyn Handler, &mut dyn Transaction),
    {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.txn.aborted {
            return;
        }
        let _entered = self.context.enter();

        let mut exchange = Exchange {
            txn: &mut active.txn,
            out: &mut self.out,
        };
        callback(active.handler.as_mut(), &mut exchange);

        if self.out.take_pause_notice() && !active.txn.aborted {
            let mut exchange = Exchange {
                txn: &mut active.txn,
                out: &mut self.out,
            };
            active.handler.on_egress_paused(&mut exchange);
        }
    }

    fn run_event(&mut self, event: ContextEvent) {
        let live = self
            .active
            .as_ref()
            .is_some_and(|a| a.txn.id == event.target() && !a.txn.aborted);
        if !live {
            debug!(txn = %event.target(), "event for finished transaction dropped");
            return;
        }
        self.dispatch(|_, txn| event.run(txn));
    }

    /// Reports a transport error to the live transaction. Errors are terminal.
    fn fail(&mut self, error: TransactionError) {
        debug!(%error, "transaction error");
        self.dispatch(|handler, txn| handler.on_error(txn, &error));
        if let Some(active) = self.active.as_mut() {
            if !active.txn.aborted {
                active.txn.aborted = true;
                self.out.clear();
            }
        }
    }

    /// Tears the transaction down once it is finished in both directions, or aborted.
    fn maybe_detach(&mut self) -> bool {
        let finished = self.active.as_ref().is_some_and(|a| {
            a.txn.aborted || (a.txn.eom_sent && matches!(self.ingress, Ingress::Complete))
        });
        if !finished {
            return false;
        }
        let Some(mut active) = self.active.take() else {
            return false;
        };

        active.handler.detach();
        debug!(txn = %active.txn.id, aborted = active.txn.aborted, "transaction detached");

        if active.txn.aborted {
            self.state = ConnectionState::Closed;
        } else if !active.txn.keep_alive && self.state == ConnectionState::Open {
            self.state = ConnectionState::Draining;
        }
        self.ingress = Ingress::Head;
        true
    }
}

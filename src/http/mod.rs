//! HTTP/1.x transport.
//!
//! This module adapts a byte stream to the handler callbacks. Requests are
//! parsed, bodies decoded and streamed to the handler as they arrive, and
//! responses are framed and queued with backpressure.
//!
//! # Architecture
//!
//! - **`connection`**: per-connection state machine and owning execution context
//! - **`parser`**: request heads (HTTP/0.9 simple requests included) and body decoding
//! - **`request`**: request head representation and accessors
//! - **`response`**: response head representation with builder pattern
//! - **`headers`**: ordered, case-insensitive header map
//! - **`writer`**: serialization of heads, body framing and end of message
//! - **`egress`**: outbound queue with high/low watermarks
//!
//! # Transaction Lifecycle
//!
//! ```text
//!        ┌─────────────┐
//!        │    Head     │ ← Wait for a complete request head
//!        └──────┬──────┘
//!               │ on_headers_complete
//!               ▼
//!        ┌──────────────────┐
//!        │      Body        │ ← on_body / chunk events, then on_eom
//!        └──────┬───────────┘
//!               │ request complete
//!               ▼
//!        ┌──────────────────┐
//!        │    Responding    │ ← handler output, paused/resumed by egress
//!        └──────┬───────────┘
//!               │ response EOM (or abort / error)
//!               ├─ detach, then Keep-Alive → Head (same connection)
//!               └─ detach, then Close
//! ```
//!
//! Context events posted from other threads are run between callbacks, in
//! every state.

pub mod connection;
pub mod egress;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

//! Flow-controlled generator of pseudo-random hex bodies.
//!
//! `GET /<n>` answers with exactly `n` hex characters, emitted in chunks of at
//! most [`MAX_CHUNK_SIZE`]. Emission is a small producer state machine:
//!
//! ```text
//!   emit-chunk   while !paused && remaining > 0
//!   pause        egress saturated (send_body returned Paused, or on_egress_paused)
//!   resume       on_egress_resumed, re-enters emit-chunk
//!   eom          once, when remaining == 0 && !paused
//! ```

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, error};

use crate::handler::{Handler, HandlerBase};
use crate::http::request::{Method, Request};
use crate::http::response::StatusCode;
use crate::transaction::{Transaction, TransactionError};

/// Largest body that may be requested: 10 MiB.
pub const MAX_ALLOWED_LENGTH: u64 = 10 * 1024 * 1024;

/// Largest single body chunk: 100 KiB.
pub const MAX_CHUNK_SIZE: u64 = 100 * 1024;

pub const OVERSIZE_MESSAGE: &str =
    "More than 10 MB of data requested. Please request for smaller size.";

/// Pool of random bytes rendered as hex.
///
/// The pool only ever grows, and only up to the largest request seen, so
/// repeated chunks reuse the same bytes instead of drawing new ones. Output
/// for `n` characters is always the hex of the first `n / 2 + 1` pool bytes
/// truncated to `n`.
pub struct HexSource<R = StdRng> {
    pool: Vec<u8>,
    rng: R,
}

impl HexSource<StdRng> {
    /// A source whose pool is pre-sized for chunks of up to `max_chars` characters.
    pub fn new(max_chars: usize) -> Self {
        Self::with_rng(max_chars, StdRng::from_entropy())
    }
}

impl<R: RngCore> HexSource<R> {
    pub fn with_rng(max_chars: usize, rng: R) -> Self {
        Self {
            pool: Vec::with_capacity(max_chars / 2 + 1),
            rng,
        }
    }

    /// Number of random bytes generated so far.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Returns exactly `n` lowercase hex characters.
    pub fn hex(&mut self, n: usize) -> Bytes {
        let raw = n / 2 + 1;
        self.grow(raw);
        let mut encoded = hex::encode(&self.pool[..raw]);
        encoded.truncate(n);
        Bytes::from(encoded)
    }

    fn grow(&mut self, len: usize) {
        let previous = self.pool.len();
        if previous < len {
            self.pool.resize(len, 0);
            self.rng.fill_bytes(&mut self.pool[previous..]);
        }
    }
}

/// Parses the requested body length out of a `/<decimal>` path.
pub fn parse_length(path: &str) -> Option<u64> {
    let digits = path.strip_prefix('/')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub struct RandBytesGenHandler<R = StdRng> {
    base: HandlerBase,
    source: HexSource<R>,
    remaining: u64,
    paused: bool,
    eom_sent: bool,
}

impl RandBytesGenHandler<StdRng> {
    pub fn new(base: HandlerBase) -> Self {
        Self::with_source(base, HexSource::new(MAX_CHUNK_SIZE as usize))
    }
}

impl<R: RngCore + Send> RandBytesGenHandler<R> {
    pub fn with_source(base: HandlerBase, source: HexSource<R>) -> Self {
        Self {
            base,
            source,
            remaining: 0,
            paused: false,
            eom_sent: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn send_body_in_chunks(&mut self, txn: &mut dyn Transaction) {
        while self.remaining > 0 && !self.paused {
            let chunk_size = self.remaining.min(MAX_CHUNK_SIZE);
            debug!(txn = %txn.id(), chunk_size, "sending random bytes");
            let chunk = self.source.hex(chunk_size as usize);
            self.remaining -= chunk_size;
            if txn.send_body(chunk).is_paused() {
                self.paused = true;
            }
        }
        if self.remaining == 0 && !self.paused && !self.eom_sent {
            debug!(txn = %txn.id(), "sending response EOM");
            txn.send_eom();
            self.eom_sent = true;
        }
    }

    fn send_error(&mut self, txn: &mut dyn Transaction, message: &str) {
        let head = self
            .base
            .response(StatusCode::BadRequest)
            .content_length(message.len())
            .strip_hop_by_hop()
            .keep_alive(true)
            .build();
        txn.send_headers(head);
        txn.send_body(Bytes::copy_from_slice(message.as_bytes()));
        txn.send_eom();
        self.remaining = 0;
        self.eom_sent = true;
    }
}

impl<R: RngCore + Send> Handler for RandBytesGenHandler<R> {
    fn on_headers_complete(&mut self, txn: &mut dyn Transaction, request: Request) {
        debug!(txn = %txn.id(), path = %request.path, "random bytes: headers complete");

        let Some(length) = parse_length(request.path_only()) else {
            let message = format!(
                "Invalid URL: cannot extract requested response-length from url path: {}",
                request.path
            );
            error!(txn = %txn.id(), "{message}");
            self.send_error(txn, &message);
            return;
        };
        if length > MAX_ALLOWED_LENGTH {
            self.send_error(txn, OVERSIZE_MESSAGE);
            return;
        }

        self.remaining = length;
        let head = self.base.response(StatusCode::Ok).reason("Ok").build();
        txn.send_headers(head);
        if request.method == Method::GET {
            self.send_body_in_chunks(txn);
        }
    }

    fn on_body(&mut self, txn: &mut dyn Transaction, _chunk: Bytes) {
        self.send_body_in_chunks(txn);
    }

    fn on_eom(&mut self, txn: &mut dyn Transaction) {
        self.send_body_in_chunks(txn);
    }

    fn on_error(&mut self, txn: &mut dyn Transaction, error: &TransactionError) {
        debug!(txn = %txn.id(), %error, "random bytes: aborting");
        txn.send_abort();
    }

    fn on_egress_paused(&mut self, _txn: &mut dyn Transaction) {
        self.paused = true;
    }

    fn on_egress_resumed(&mut self, txn: &mut dyn Transaction) {
        self.paused = false;
        self.send_body_in_chunks(txn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> HexSource {
        HexSource::with_rng(16, StdRng::seed_from_u64(7))
    }

    #[test]
    fn hex_output_has_exact_length() {
        let mut source = seeded();
        for n in [0usize, 1, 2, 9, 10, 33] {
            let out = source.hex(n);
            assert_eq!(out.len(), n);
            assert!(out.iter().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        }
    }

    #[test]
    fn pool_grows_monotonically_and_output_is_a_stable_prefix() {
        let mut source = seeded();

        let long = source.hex(10);
        assert_eq!(source.pool_len(), 6);

        let short = source.hex(4);
        assert_eq!(source.pool_len(), 6);
        assert_eq!(&long[..4], &short[..]);

        source.hex(21);
        assert_eq!(source.pool_len(), 11);
        assert_eq!(&source.hex(10)[..], &long[..]);
    }

    #[test]
    fn length_parsing_is_strict_decimal() {
        assert_eq!(parse_length("/10"), Some(10));
        assert_eq!(parse_length("/0"), Some(0));
        assert_eq!(parse_length("/99999999999"), Some(99_999_999_999));
        assert_eq!(parse_length("/"), None);
        assert_eq!(parse_length("/+5"), None);
        assert_eq!(parse_length("/12abc"), None);
        assert_eq!(parse_length("/99999999999999999999999"), None);
        assert_eq!(parse_length("10"), None);
    }
}

//! Outbound byte queue with watermark-driven backpressure.

use bytes::{Buf, BytesMut};

use crate::transaction::Egress;

/// Bytes waiting to be written to the peer.
///
/// Crossing `high` pauses egress; draining to `low` or below resumes it.
/// Each pause is reported once through [`OutboundQueue::take_pause_notice`].
#[derive(Debug)]
pub struct OutboundQueue {
    buf: BytesMut,
    high: usize,
    low: usize,
    paused: bool,
    pause_notice: bool,
}

impl OutboundQueue {
    pub fn new(high: usize, low: usize) -> Self {
        debug_assert!(low < high);
        Self {
            buf: BytesMut::with_capacity(high),
            high,
            low,
            paused: false,
            pause_notice: false,
        }
    }

    /// Queues `bytes`, returning the egress state after queueing.
    pub fn push(&mut self, bytes: &[u8]) -> Egress {
        self.buf.extend_from_slice(bytes);
        if !self.paused && self.buf.len() >= self.high {
            self.paused = true;
            self.pause_notice = true;
        }
        self.state()
    }

    /// Marks `n` bytes as written. Returns `true` when this resumes egress.
    pub fn consume(&mut self, n: usize) -> bool {
        self.buf.advance(n.min(self.buf.len()));
        if self.paused && self.buf.len() <= self.low {
            self.paused = false;
            self.pause_notice = false;
            return true;
        }
        false
    }

    /// Drops everything not yet written.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.paused = false;
        self.pause_notice = false;
    }

    pub fn take_pause_notice(&mut self) -> bool {
        std::mem::take(&mut self.pause_notice)
    }

    pub fn state(&self) -> Egress {
        if self.paused {
            Egress::Paused
        } else {
            Egress::Flowing
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

use crate::http::response::ResponseHead;

/// How a response body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Transfer-Encoding: chunked`, terminated by a zero-size chunk
    Chunked,
    /// Exact `Content-Length` declared in the head
    Length,
    /// Body runs until the connection closes (HTTP/1.0 without a length)
    CloseDelimited,
    /// HTTP/0.9: no status line or headers at all, body until close
    Legacy,
}

impl Framing {
    /// Whether the connection can carry another request after this response.
    pub fn reusable(&self) -> bool {
        matches!(self, Framing::Chunked | Framing::Length)
    }
}

/// Serializes an interim (1xx) head. Interim heads never carry framing headers.
pub fn encode_interim(head: &ResponseHead) -> Vec<u8> {
    let mut buf = Vec::new();
    write_status_line(&mut buf, head);
    write_headers(&mut buf, head);
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Serializes the final response head for the chosen framing.
pub fn encode_head(head: &ResponseHead, framing: Framing, keep_alive: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    if framing == Framing::Legacy {
        return buf;
    }

    write_status_line(&mut buf, head);
    write_headers(&mut buf, head);

    if framing == Framing::Chunked {
        buf.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
    }
    if keep_alive {
        buf.extend_from_slice(b"Connection: keep-alive\r\n");
    } else {
        buf.extend_from_slice(b"Connection: close\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Appends one body chunk in the given framing. Empty chunks produce nothing.
pub fn encode_chunk(buf: &mut Vec<u8>, framing: Framing, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    match framing {
        Framing::Chunked => {
            buf.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
            buf.extend_from_slice(data);
            buf.extend_from_slice(b"\r\n");
        }
        Framing::Length | Framing::CloseDelimited | Framing::Legacy => {
            buf.extend_from_slice(data);
        }
    }
}

/// Terminator of a response body, empty for framings delimited otherwise.
pub fn encode_eom(framing: Framing) -> &'static [u8] {
    match framing {
        Framing::Chunked => b"0\r\n\r\n",
        _ => b"",
    }
}

fn write_status_line(buf: &mut Vec<u8>, head: &ResponseHead) {
    let status_line = format!(
        "HTTP/{} {} {}\r\n",
        head.version,
        head.status.as_u16(),
        head.reason
    );
    buf.extend_from_slice(status_line.as_bytes());
}

fn write_headers(buf: &mut Vec<u8>, head: &ResponseHead) {
    for (k, v) in head.headers.iter() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
}

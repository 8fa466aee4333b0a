use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::http::headers::HeaderMap;
use crate::http::request::{Method, Request, Version};

/// Longest chunk-size or trailer line accepted in a chunked body.
const MAX_LINE: usize = 4096;

/// Largest request head accepted. Also bounds the trailer block of a chunked body.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequest,
    #[error("unknown request method")]
    InvalidMethod,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("malformed chunked body")]
    InvalidChunk,
    #[error("incomplete request")]
    Incomplete,
}

/// Parses a request head from the start of `buf`.
///
/// Returns the request and the number of bytes it occupied. A request line
/// without a version (`GET /path`) is a legacy HTTP/0.9 request and has no
/// header block.
pub fn parse_request_head(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let line_end = find(buf, b"\r\n").ok_or(ParseError::Incomplete)?;
    let request_line =
        std::str::from_utf8(&buf[..line_end]).map_err(|_| ParseError::InvalidRequest)?;

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let (method_str, path, version) = match parts.as_slice() {
        [method, path] => (*method, *path, Version::Http09),
        [method, path, version] => (
            *method,
            *path,
            Version::from_str(version).ok_or(ParseError::InvalidVersion)?,
        ),
        _ => return Err(ParseError::InvalidRequest),
    };

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    if version == Version::Http09 {
        if method != Method::GET {
            return Err(ParseError::InvalidMethod);
        }
        let request = Request {
            method,
            path: path.to_string(),
            version,
            headers: HeaderMap::new(),
        };
        return Ok((request, line_end + 2));
    }

    // Look for header/body separator
    let headers_end = find(buf, b"\r\n\r\n").ok_or(ParseError::Incomplete)?;
    let header_bytes: &[u8] = if headers_end > line_end {
        &buf[line_end + 2..headers_end]
    } else {
        &[]
    };
    let headers_str = std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidHeader)?;

    let mut headers = HeaderMap::new();
    for line in headers_str.split("\r\n") {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        headers.append(key.trim(), value.trim());
    }

    let request = Request {
        method,
        path: path.to_string(),
        version,
        headers,
    };

    Ok((request, headers_end + 4))
}

fn find(buf: &[u8], needle: &[u8]) -> Option<usize> {
    buf.windows(needle.len()).position(|w| w == needle)
}

/// One step of request-body decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEvent {
    /// Start of a chunk of the given size (chunked bodies only)
    ChunkHeader(usize),
    Data(Bytes),
    /// End of the current chunk (chunked bodies only)
    ChunkComplete,
    Trailers(HeaderMap),
    /// The body is complete
    End,
}

#[derive(Debug)]
pub enum ChunkedState {
    Size,
    Data { remaining: usize },
    DataEnd,
    Trailers { fields: HeaderMap, size: usize },
    Done,
}

/// Incremental decoder for a request body.
#[derive(Debug)]
pub enum BodyDecoder {
    Length { remaining: u64 },
    Chunked(ChunkedState),
}

impl BodyDecoder {
    /// Chooses the body framing of `request`. `None` means the request has no body.
    pub fn for_request(request: &Request) -> Result<Option<Self>, ParseError> {
        let chunked = request
            .header("Transfer-Encoding")
            .and_then(|v| v.rsplit(',').next())
            .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
        if chunked {
            return Ok(Some(BodyDecoder::Chunked(ChunkedState::Size)));
        }

        match request.header("Content-Length") {
            None => Ok(None),
            Some(value) => {
                let length: u64 = value
                    .trim()
                    .parse()
                    .map_err(|_| ParseError::InvalidContentLength)?;
                if length == 0 {
                    Ok(None)
                } else {
                    Ok(Some(BodyDecoder::Length { remaining: length }))
                }
            }
        }
    }

    /// Consumes bytes from `buf` and yields the next event, or `None` when more
    /// input is needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<BodyEvent>, ParseError> {
        match self {
            BodyDecoder::Length { remaining } => {
                if *remaining == 0 {
                    return Ok(Some(BodyEvent::End));
                }
                if buf.is_empty() {
                    return Ok(None);
                }
                let take = (*remaining).min(buf.len() as u64) as usize;
                *remaining -= take as u64;
                Ok(Some(BodyEvent::Data(buf.split_to(take).freeze())))
            }
            BodyDecoder::Chunked(state) => decode_chunked(state, buf),
        }
    }
}

fn decode_chunked(
    state: &mut ChunkedState,
    buf: &mut BytesMut,
) -> Result<Option<BodyEvent>, ParseError> {
    loop {
        match state {
            ChunkedState::Size => {
                let Some(line) = take_line(buf)? else {
                    return Ok(None);
                };
                let size_str = line.split(';').next().unwrap_or_default().trim();
                let size =
                    usize::from_str_radix(size_str, 16).map_err(|_| ParseError::InvalidChunk)?;
                if size == 0 {
                    *state = ChunkedState::Trailers {
                        fields: HeaderMap::new(),
                        size: 0,
                    };
                    continue;
                }
                *state = ChunkedState::Data { remaining: size };
                return Ok(Some(BodyEvent::ChunkHeader(size)));
            }
            ChunkedState::Data { remaining } => {
                if buf.is_empty() {
                    return Ok(None);
                }
                let take = (*remaining).min(buf.len());
                *remaining -= take;
                if *remaining == 0 {
                    *state = ChunkedState::DataEnd;
                }
                return Ok(Some(BodyEvent::Data(buf.split_to(take).freeze())));
            }
            ChunkedState::DataEnd => {
                if buf.len() < 2 {
                    return Ok(None);
                }
                if &buf[..2] != b"\r\n" {
                    return Err(ParseError::InvalidChunk);
                }
                buf.advance(2);
                *state = ChunkedState::Size;
                return Ok(Some(BodyEvent::ChunkComplete));
            }
            ChunkedState::Trailers { fields, size } => {
                let Some(line) = take_line(buf)? else {
                    return Ok(None);
                };
                *size += line.len() + 2;
                if *size > MAX_HEAD_BYTES {
                    return Err(ParseError::InvalidChunk);
                }
                if line.is_empty() {
                    let fields = std::mem::take(fields);
                    *state = ChunkedState::Done;
                    if !fields.is_empty() {
                        return Ok(Some(BodyEvent::Trailers(fields)));
                    }
                    continue;
                }
                let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
                fields.append(key.trim(), value.trim());
            }
            ChunkedState::Done => return Ok(Some(BodyEvent::End)),
        }
    }
}

/// Splits one CRLF-terminated line off the front of `buf`.
fn take_line(buf: &mut BytesMut) -> Result<Option<String>, ParseError> {
    match find(buf, b"\r\n") {
        Some(pos) => {
            let line = buf.split_to(pos + 2);
            let text = std::str::from_utf8(&line[..pos]).map_err(|_| ParseError::InvalidChunk)?;
            Ok(Some(text.to_string()))
        }
        None if buf.len() > MAX_LINE => Err(ParseError::InvalidChunk),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_request_head(req).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn chunked_body_yields_framing_events() {
        let (request, consumed) = parse_request_head(
            b"POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .unwrap();
        assert_eq!(consumed, 51);

        let mut decoder = BodyDecoder::for_request(&request).unwrap().unwrap();
        let mut buf = BytesMut::from(&b"5\r\nhello\r\n0\r\nX-Sum: 1\r\n\r\n"[..]);

        let mut events = Vec::new();
        while let Some(event) = decoder.decode(&mut buf).unwrap() {
            let end = event == BodyEvent::End;
            events.push(event);
            if end {
                break;
            }
        }

        let trailers: HeaderMap = [("X-Sum", "1")].into_iter().collect();
        assert_eq!(
            events,
            vec![
                BodyEvent::ChunkHeader(5),
                BodyEvent::Data(Bytes::from_static(b"hello")),
                BodyEvent::ChunkComplete,
                BodyEvent::Trailers(trailers),
                BodyEvent::End,
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn chunked_body_waits_for_more_input() {
        let mut decoder = BodyDecoder::Chunked(ChunkedState::Size);
        let mut buf = BytesMut::from(&b"a"[..]);

        assert_eq!(decoder.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\r\n0123");
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(BodyEvent::ChunkHeader(10)));
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(BodyEvent::Data(Bytes::from_static(b"0123")))
        );
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
    }
}

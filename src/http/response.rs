use crate::http::headers::HeaderMap;

/// HTTP status codes produced by the handlers.
///
/// - `Continue` (100): Interim response to `Expect: 100-continue`
/// - `Ok` (200): Request successful
/// - `BadRequest` (400): Malformed or refused request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 100 Continue
    Continue,
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use flowprobe::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
        }
    }

    /// Interim (1xx) statuses precede the final response head.
    pub fn is_informational(&self) -> bool {
        self.as_u16() < 200
    }
}

/// Status line and headers of a response.
///
/// Framing headers (`Transfer-Encoding`, `Connection`) are not part of the head:
/// the transport adds them when the head is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Version string written in the status line, without the `HTTP/` prefix
    pub version: String,
    /// The HTTP status code
    pub status: StatusCode,
    /// Reason phrase, defaults to the standard phrase of `status`
    pub reason: String,
    /// Response headers in emission order
    pub headers: HeaderMap,
    /// Whether the handler wants the connection kept open afterwards
    pub keep_alive: bool,
}

/// Builder for constructing response heads in a fluent style.
///
/// # Example
///
/// ```ignore
/// let head = ResponseBuilder::new(StatusCode::Ok)
///     .reason("Ok")
///     .header("Content-Type", "text/plain")
///     .build();
/// ```
pub struct ResponseBuilder {
    head: ResponseHead,
}

impl ResponseBuilder {
    /// Creates a new builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            head: ResponseHead {
                version: "1.1".to_string(),
                status,
                reason: status.reason_phrase().to_string(),
                headers: HeaderMap::new(),
                keep_alive: true,
            },
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.head.version = version.into();
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.head.reason = reason.into();
        self
    }

    /// Appends a header, keeping earlier ones with the same name.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.head.headers.append(key, value);
        self
    }

    /// Declares the exact body size, switching the response to length framing.
    pub fn content_length(mut self, len: usize) -> Self {
        self.head.headers.insert("Content-Length", len.to_string());
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.head.keep_alive = keep_alive;
        self
    }

    pub fn strip_hop_by_hop(mut self) -> Self {
        self.head.headers.strip_hop_by_hop();
        self
    }

    pub fn build(self) -> ResponseHead {
        self.head
    }
}

impl ResponseHead {
    /// Declared body length, if the head carries one.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }
}

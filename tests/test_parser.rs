use bytes::{Bytes, BytesMut};
use flowprobe::http::parser::{
    parse_request_head, BodyDecoder, BodyEvent, ParseError, MAX_HEAD_BYTES,
};
use flowprobe::http::request::{Method, Version};

fn drain(decoder: &mut BodyDecoder, buf: &mut BytesMut) -> Vec<BodyEvent> {
    let mut events = Vec::new();
    while let Some(event) = decoder.decode(buf).unwrap() {
        let end = event == BodyEvent::End;
        events.push(event);
        if end {
            break;
        }
    }
    events
}

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_request_head(req).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, Version::Http11);
    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_head_leaves_body_in_buffer() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (parsed, consumed) = parse_request_head(req).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(&req[consumed..], b"hello");
}

#[test]
fn test_parse_request_without_headers() {
    let req = b"GET /10 HTTP/1.0\r\n\r\n";
    let (parsed, consumed) = parse_request_head(req).unwrap();

    assert_eq!(parsed.version, Version::Http10);
    assert!(parsed.headers.is_empty());
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_legacy_request_line() {
    let req = b"GET /echo\r\n";
    let (parsed, consumed) = parse_request_head(req).unwrap();

    assert_eq!(parsed.version, Version::Http09);
    assert!(parsed.is_legacy());
    assert_eq!(parsed.path, "/echo");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_legacy_request_only_allows_get() {
    let result = parse_request_head(b"POST /echo\r\n");

    assert_eq!(result.unwrap_err(), ParseError::InvalidMethod);
}

#[test]
fn test_parse_multiple_headers_keep_order() {
    let req = b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n";
    let (parsed, _) = parse_request_head(req).unwrap();

    let names: Vec<&str> = parsed.headers.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["Host", "User-Agent", "Accept"]);
    assert_eq!(parsed.headers.get("user-agent").unwrap(), "test-client");
}

#[test]
fn test_parse_request_with_path_and_query_string() {
    let req = b"GET /wait?id=3 HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, _) = parse_request_head(req).unwrap();

    assert_eq!(parsed.path, "/wait?id=3");
    assert_eq!(parsed.path_only(), "/wait");
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let result = parse_request_head(b"GET / HTTP/1.1\r\nHost: example.com\r\n");

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_invalid_http_method() {
    let result = parse_request_head(b"INVALID / HTTP/1.1\r\n\r\n");

    assert!(matches!(result, Err(ParseError::InvalidMethod)));
}

#[test]
fn test_parse_invalid_version() {
    let result = parse_request_head(b"GET / HTTP/2.0\r\n\r\n");

    assert!(matches!(result, Err(ParseError::InvalidVersion)));
}

#[test]
fn test_parse_malformed_header() {
    let result = parse_request_head(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n");

    assert!(matches!(result, Err(ParseError::InvalidHeader)));
}

#[test]
fn test_parse_various_http_methods() {
    let methods = vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
    ];

    for (method_str, expected_method) in methods {
        let req = format!("{} / HTTP/1.1\r\n\r\n", method_str);
        let (parsed, _) = parse_request_head(req.as_bytes()).unwrap();
        assert_eq!(parsed.method, expected_method);
    }
}

#[test]
fn test_body_decoder_absent_without_framing() {
    let (parsed, _) = parse_request_head(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    assert!(BodyDecoder::for_request(&parsed).unwrap().is_none());

    let (parsed, _) = parse_request_head(b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n").unwrap();
    assert!(BodyDecoder::for_request(&parsed).unwrap().is_none());
}

#[test]
fn test_body_decoder_rejects_bad_content_length() {
    let (parsed, _) =
        parse_request_head(b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n").unwrap();

    assert_eq!(
        BodyDecoder::for_request(&parsed).unwrap_err(),
        ParseError::InvalidContentLength
    );
}

#[test]
fn test_length_body_arrives_in_pieces() {
    let (parsed, _) =
        parse_request_head(b"POST /upload HTTP/1.1\r\nContent-Length: 6\r\n\r\n").unwrap();
    let mut decoder = BodyDecoder::for_request(&parsed).unwrap().unwrap();

    let mut buf = BytesMut::from(&b"\x00\x01\x02"[..]);
    assert_eq!(
        decoder.decode(&mut buf).unwrap(),
        Some(BodyEvent::Data(Bytes::from_static(b"\x00\x01\x02")))
    );
    assert_eq!(decoder.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(b"\x03\x04\x05GET");
    assert_eq!(
        drain(&mut decoder, &mut buf),
        vec![
            BodyEvent::Data(Bytes::from_static(b"\x03\x04\x05")),
            BodyEvent::End
        ]
    );
    assert_eq!(&buf[..], b"GET");
}

#[test]
fn test_chunked_body_without_trailers() {
    let (parsed, _) = parse_request_head(
        b"PUT /echo HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n",
    )
    .unwrap();
    let mut decoder = BodyDecoder::for_request(&parsed).unwrap().unwrap();
    let mut buf = BytesMut::from(&b"3;ext=1\r\nabc\r\n2\r\nde\r\n0\r\n\r\n"[..]);

    assert_eq!(
        drain(&mut decoder, &mut buf),
        vec![
            BodyEvent::ChunkHeader(3),
            BodyEvent::Data(Bytes::from_static(b"abc")),
            BodyEvent::ChunkComplete,
            BodyEvent::ChunkHeader(2),
            BodyEvent::Data(Bytes::from_static(b"de")),
            BodyEvent::ChunkComplete,
            BodyEvent::End,
        ]
    );
}

#[test]
fn test_chunked_body_with_bad_size_line() {
    let (parsed, _) =
        parse_request_head(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap();
    let mut decoder = BodyDecoder::for_request(&parsed).unwrap().unwrap();
    let mut buf = BytesMut::from(&b"zz\r\n"[..]);

    assert_eq!(decoder.decode(&mut buf).unwrap_err(), ParseError::InvalidChunk);
}

#[test]
fn test_chunked_trailer_block_is_bounded() {
    let (parsed, _) =
        parse_request_head(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap();
    let mut decoder = BodyDecoder::for_request(&parsed).unwrap().unwrap();
    let mut buf = BytesMut::from(&b"0\r\n"[..]);

    let line = format!("X-Pad: {}\r\n", "p".repeat(1000));
    let mut fed = 0;
    let error = loop {
        match decoder.decode(&mut buf) {
            Ok(None) => {
                assert!(fed <= MAX_HEAD_BYTES + line.len(), "trailers accepted past the limit");
                buf.extend_from_slice(line.as_bytes());
                fed += line.len();
            }
            Ok(Some(event)) => panic!("unexpected event {event:?}"),
            Err(e) => break e,
        }
    };

    assert_eq!(error, ParseError::InvalidChunk);
    assert!(fed > MAX_HEAD_BYTES);
}

#[test]
fn test_chunked_trailers_under_the_limit_are_delivered() {
    let (parsed, _) =
        parse_request_head(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap();
    let mut decoder = BodyDecoder::for_request(&parsed).unwrap().unwrap();
    let mut buf = BytesMut::from(&b"0\r\n"[..]);
    for i in 0..20 {
        buf.extend_from_slice(format!("X-Field-{i}: {}\r\n", "v".repeat(100)).as_bytes());
    }
    buf.extend_from_slice(b"\r\n");

    let events = drain(&mut decoder, &mut buf);

    let BodyEvent::Trailers(trailers) = &events[0] else {
        panic!("expected trailers, got {events:?}");
    };
    assert_eq!(trailers.len(), 20);
    assert_eq!(events[1], BodyEvent::End);
}

/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::str::FromStr;

use http::{Method, Uri, Version};

use px_types::net::UpstreamAddr;

use super::{
    check_head_size, headers_keep_alive, parse_content_length, transfer_encoding_is_chunked,
    BodyState, HttpDecodeError, HttpMessageDecode, MAX_HEADER_COUNT,
};
use crate::{DecoderEvent, HttpHeaderList};

const DEFAULT_CONNECT_PORT: u16 = 443;
const DEFAULT_HTTP_PORT: u16 = 80;

/// Immutable snapshot of a request at headers-complete.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    /// raw request-target as received
    pub target: String,
    pub version: Version,
    pub headers: HttpHeaderList,
    pub keep_alive: bool,
    /// CONNECT, or an Upgrade header is present
    pub upgrade: bool,
}

impl RequestHead {
    #[inline]
    pub fn is_connect(&self) -> bool {
        self.method == Method::CONNECT
    }

    /// Tunnel target of a CONNECT request: the request-target split on
    /// `:`, the Host header as fallback, port 443 when omitted.
    pub fn connect_addr(&self) -> Result<UpstreamAddr, HttpDecodeError> {
        let target = if self.target.is_empty() {
            self.headers.get_str("host").ok_or(HttpDecodeError::MissingHost)?
        } else {
            &self.target
        };
        UpstreamAddr::from_str_with_default_port(target, DEFAULT_CONNECT_PORT)
            .map_err(|_| HttpDecodeError::InvalidHost)
    }

    /// Relay target of a plain request: the authority of an absolute-form
    /// target, the Host header otherwise, port 80 when omitted.
    pub fn forward_addr(&self) -> Result<UpstreamAddr, HttpDecodeError> {
        if self.target.contains("://") {
            let uri = Uri::from_str(&self.target).map_err(|_| HttpDecodeError::InvalidHost)?;
            let host = uri.host().ok_or(HttpDecodeError::MissingHost)?;
            let port = uri.port_u16().unwrap_or(DEFAULT_HTTP_PORT);
            return Ok(UpstreamAddr::new(host.to_string(), port));
        }
        let host = self.headers.get_str("host").ok_or(HttpDecodeError::MissingHost)?;
        UpstreamAddr::from_str_with_default_port(host.trim(), DEFAULT_HTTP_PORT)
            .map_err(|_| HttpDecodeError::InvalidHost)
    }

    /// Request-target rewritten to origin-form for the upstream request
    /// line: scheme and authority stripped, `/` when the path is empty.
    pub fn origin_form_target(&self) -> String {
        if self.target.starts_with('/') {
            return self.target.clone();
        }
        if let Ok(uri) = Uri::from_str(&self.target) {
            if let Some(pq) = uri.path_and_query() {
                let s = pq.as_str();
                if !s.is_empty() && s.starts_with('/') {
                    return s.to_string();
                }
            }
        }
        "/".to_string()
    }
}

enum ReqState {
    Head,
    Body(BodyState),
    Done,
    Dead,
}

/// Push decoder for the client request direction.
pub struct HttpRequestDecoder {
    max_header_size: usize,
    state: ReqState,
}

impl HttpRequestDecoder {
    pub fn new(max_header_size: usize) -> Self {
        HttpRequestDecoder {
            max_header_size,
            state: ReqState::Head,
        }
    }

    fn decode_head(
        &mut self,
        data: &[u8],
        out: &mut Vec<DecoderEvent<RequestHead>>,
    ) -> Result<usize, HttpDecodeError> {
        let mut parsed_headers = [httparse::EMPTY_HEADER; MAX_HEADER_COUNT];
        let mut req = httparse::Request::new(&mut parsed_headers);
        let head_len = match req.parse(data) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => {
                check_head_size(data.len(), self.max_header_size)?;
                return Ok(0);
            }
            Err(_) => return Err(HttpDecodeError::InvalidHead),
        };
        check_head_size(head_len, self.max_header_size)?;

        let method = req
            .method
            .and_then(|m| Method::from_str(m).ok())
            .ok_or(HttpDecodeError::InvalidHead)?;
        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            _ => return Err(HttpDecodeError::UnsupportedVersion),
        };
        let target = req.path.ok_or(HttpDecodeError::InvalidHead)?.to_string();

        let mut headers = HttpHeaderList::new();
        for h in req.headers.iter() {
            headers.append(h.name, h.value);
        }

        let keep_alive = headers_keep_alive(version, &headers);
        let upgrade = method == Method::CONNECT || headers.get("upgrade").is_some();
        let head = RequestHead {
            method,
            target,
            version,
            headers,
            keep_alive,
            upgrade,
        };

        // CONNECT carries no body of interest, and a request without
        // framing headers has no body at all
        let body_state = if head.is_connect() {
            None
        } else if transfer_encoding_is_chunked(&head.headers) {
            Some(BodyState::ChunkSize)
        } else {
            match parse_content_length(&head.headers)? {
                Some(0) | None => None,
                Some(len) => Some(BodyState::Fixed { left: len }),
            }
        };

        out.push(DecoderEvent::Headers(head));
        match body_state {
            Some(state) => self.state = ReqState::Body(state),
            None => {
                out.push(DecoderEvent::Complete);
                self.state = ReqState::Done;
            }
        }
        Ok(head_len)
    }
}

impl HttpMessageDecode for HttpRequestDecoder {
    type Head = RequestHead;

    fn decode(
        &mut self,
        data: &[u8],
        out: &mut Vec<DecoderEvent<RequestHead>>,
    ) -> Result<usize, HttpDecodeError> {
        let mut consumed = 0usize;
        if matches!(self.state, ReqState::Head) {
            consumed = match self.decode_head(data, out) {
                Ok(0) => return Ok(0),
                Ok(n) => n,
                Err(e) => {
                    self.state = ReqState::Dead;
                    return Err(e);
                }
            };
        }
        match &mut self.state {
            ReqState::Body(body) => match body.decode(&data[consumed..], out) {
                Ok((n, done)) => {
                    consumed += n;
                    if done {
                        self.state = ReqState::Done;
                    }
                    Ok(consumed)
                }
                Err(e) => {
                    self.state = ReqState::Dead;
                    Err(e)
                }
            },
            ReqState::Done => Ok(consumed),
            ReqState::Dead => Err(HttpDecodeError::Dead),
            ReqState::Head => unreachable!(),
        }
    }

    fn finish(&mut self, _out: &mut Vec<DecoderEvent<RequestHead>>) -> Result<(), HttpDecodeError> {
        match self.state {
            ReqState::Done | ReqState::Head => Ok(()),
            ReqState::Dead => Err(HttpDecodeError::Dead),
            ReqState::Body(_) => {
                self.state = ReqState::Dead;
                Err(HttpDecodeError::UnexpectedEnd)
            }
        }
    }

    fn message_done(&self) -> bool {
        matches!(self.state, ReqState::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(
        decoder: &mut HttpRequestDecoder,
        data: &[u8],
    ) -> (usize, Vec<DecoderEvent<RequestHead>>) {
        let mut out = Vec::new();
        let n = decoder.decode(data, &mut out).unwrap();
        (n, out)
    }

    #[test]
    fn get_without_body() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let data = b"GET http://example.com/v/a/x HTTP/1.1\r\n\
            Host: example.com\r\n\
            Connection: Keep-Alive\r\n\
            Accept: */*\r\n\r\n";
        let (n, out) = decode_all(&mut decoder, data);
        assert_eq!(n, data.len());
        assert_eq!(out.len(), 2);
        let DecoderEvent::Headers(head) = &out[0] else {
            panic!("expected headers event");
        };
        assert_eq!(head.method, Method::GET);
        assert!(head.keep_alive);
        assert!(!head.upgrade);
        assert_eq!(head.headers.len(), 3);
        assert_eq!(head.origin_form_target(), "/v/a/x");
        let addr = head.forward_addr().unwrap();
        assert_eq!(addr.host(), "example.com");
        assert_eq!(addr.port(), 80);
        assert_eq!(out[1], DecoderEvent::Complete);
        assert!(decoder.message_done());
    }

    #[test]
    fn head_split_across_feeds() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let part1 = b"POST / HTTP/1.1\r\nHost: example.com\r\nContent-";
        let (n, out) = decode_all(&mut decoder, part1);
        assert_eq!(n, 0);
        assert!(out.is_empty());

        let full = b"POST / HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\nhello";
        let (n, out) = decode_all(&mut decoder, full);
        assert_eq!(n, full.len());
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], DecoderEvent::Body(bytes::Bytes::from_static(b"hello")));
        assert_eq!(out[2], DecoderEvent::Complete);
    }

    #[test]
    fn fixed_body_stops_at_message_end() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let data = b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\n\r\nabcGET /next";
        let (n, out) = decode_all(&mut decoder, data);
        // pipelined bytes after the body are left alone
        assert_eq!(&data[n..], b"GET /next");
        assert_eq!(out.len(), 3);
        assert!(decoder.message_done());
    }

    #[test]
    fn chunked_body_across_boundaries() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let head = b"POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n";
        let (n, out) = decode_all(&mut decoder, head);
        assert_eq!(n, head.len());
        assert_eq!(out.len(), 1);

        let (n, out) = decode_all(&mut decoder, b"5\r\nhel");
        assert_eq!(n, 6);
        assert_eq!(out, [DecoderEvent::Body(bytes::Bytes::from_static(b"hel"))]);

        let (n, out) = decode_all(&mut decoder, b"lo\r\n0\r\n\r\nrest");
        assert_eq!(n, 9);
        assert_eq!(
            out,
            [
                DecoderEvent::Body(bytes::Bytes::from_static(b"lo")),
                DecoderEvent::Complete
            ]
        );
        assert!(decoder.message_done());
    }

    #[test]
    fn connect_completes_without_body() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let data = b"CONNECT example.com:8443 HTTP/1.1\r\nHost: example.com:8443\r\n\r\n\x16\x03\x01";
        let (n, out) = decode_all(&mut decoder, data);
        // TLS bytes after the head are not consumed
        assert_eq!(&data[n..], b"\x16\x03\x01");
        assert_eq!(out.len(), 2);
        let DecoderEvent::Headers(head) = &out[0] else {
            panic!("expected headers event");
        };
        assert!(head.is_connect());
        assert!(head.upgrade);
        let addr = head.connect_addr().unwrap();
        assert_eq!(addr.host(), "example.com");
        assert_eq!(addr.port(), 8443);
        assert!(decoder.message_done());
    }

    #[test]
    fn connect_default_port() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let data = b"CONNECT example.com HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (_, out) = decode_all(&mut decoder, data);
        let DecoderEvent::Headers(head) = &out[0] else {
            panic!("expected headers event");
        };
        assert_eq!(head.connect_addr().unwrap().port(), 443);
    }

    #[test]
    fn proxy_connection_close() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let data = b"GET / HTTP/1.1\r\nHost: h\r\nProxy-Connection: close\r\n\r\n";
        let (_, out) = decode_all(&mut decoder, data);
        let DecoderEvent::Headers(head) = &out[0] else {
            panic!("expected headers event");
        };
        assert!(!head.keep_alive);
    }

    #[test]
    fn upgrade_request_flag() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let data =
            b"GET /chat HTTP/1.1\r\nHost: h\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n";
        let (_, out) = decode_all(&mut decoder, data);
        let DecoderEvent::Headers(head) = &out[0] else {
            panic!("expected headers event");
        };
        assert!(head.upgrade);
        assert!(head.keep_alive);
    }

    #[test]
    fn http_10_defaults_to_close() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let data = b"GET / HTTP/1.0\r\nHost: h\r\n\r\n";
        let (_, out) = decode_all(&mut decoder, data);
        let DecoderEvent::Headers(head) = &out[0] else {
            panic!("expected headers event");
        };
        assert!(!head.keep_alive);
    }

    #[test]
    fn invalid_head_is_fatal() {
        let mut decoder = HttpRequestDecoder::new(4096);
        let mut out = Vec::new();
        let r = decoder.decode(b"GET / HTTP/1.1\r\nbad header\r\n\r\n", &mut out);
        assert!(r.is_err());
        // dead, stays dead
        let r = decoder.decode(b"GET / HTTP/1.1\r\n\r\n", &mut out);
        assert!(matches!(r, Err(HttpDecodeError::Dead)));
    }

    #[test]
    fn too_large_head() {
        let mut decoder = HttpRequestDecoder::new(64);
        let mut data = b"GET / HTTP/1.1\r\n".to_vec();
        data.extend_from_slice(&b"X-Fill: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n".repeat(4));
        let mut out = Vec::new();
        let r = decoder.decode(&data, &mut out);
        assert!(matches!(r, Err(HttpDecodeError::TooLargeHeader(64))));
    }
}

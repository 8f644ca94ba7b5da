/*
 * SPDX-License-Identifier: Apache-2.0
 */

use http::{Method, Version};

use super::{
    check_head_size, headers_keep_alive, parse_content_length, transfer_encoding_is_chunked,
    BodyState, HttpDecodeError, HttpMessageDecode, MAX_HEADER_COUNT,
};
use crate::{DecoderEvent, HttpHeaderList};

/// Immutable snapshot of a response at headers-complete.
#[derive(Debug, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: Version,
    pub code: u16,
    pub reason: String,
    pub headers: HttpHeaderList,
    pub keep_alive: bool,
    chunked: bool,
}

impl ResponseHead {
    /// Fixed for the lifetime of the response, computed once at
    /// headers-complete.
    #[inline]
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }
}

enum RspState {
    Head,
    Body(BodyState),
    Done,
    Dead,
}

/// Push decoder for the upstream response direction. Needs the request
/// method, as responses to HEAD carry no body regardless of their framing
/// headers.
pub struct HttpResponseDecoder {
    max_header_size: usize,
    request_method: Method,
    state: RspState,
}

impl HttpResponseDecoder {
    pub fn new(max_header_size: usize, request_method: Method) -> Self {
        HttpResponseDecoder {
            max_header_size,
            request_method,
            state: RspState::Head,
        }
    }

    fn body_state(&self, head: &ResponseHead) -> Result<Option<BodyState>, HttpDecodeError> {
        if self.request_method == Method::HEAD
            || head.code < 200
            || head.code == 204
            || head.code == 304
        {
            return Ok(None);
        }
        if head.chunked {
            return Ok(Some(BodyState::ChunkSize));
        }
        match parse_content_length(&head.headers)? {
            Some(0) => Ok(None),
            Some(len) => Ok(Some(BodyState::Fixed { left: len })),
            None => Ok(Some(BodyState::UntilEof)),
        }
    }

    fn decode_head(
        &mut self,
        data: &[u8],
        out: &mut Vec<DecoderEvent<ResponseHead>>,
    ) -> Result<usize, HttpDecodeError> {
        let mut parsed_headers = [httparse::EMPTY_HEADER; MAX_HEADER_COUNT];
        let mut rsp = httparse::Response::new(&mut parsed_headers);
        let head_len = match rsp.parse(data) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => {
                check_head_size(data.len(), self.max_header_size)?;
                return Ok(0);
            }
            Err(_) => return Err(HttpDecodeError::InvalidHead),
        };
        check_head_size(head_len, self.max_header_size)?;

        let version = match rsp.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            _ => return Err(HttpDecodeError::UnsupportedVersion),
        };
        let code = rsp.code.ok_or(HttpDecodeError::InvalidHead)?;
        let reason = rsp.reason.unwrap_or_default().to_string();

        let mut headers = HttpHeaderList::new();
        for h in rsp.headers.iter() {
            headers.append(h.name, h.value);
        }

        let keep_alive = headers_keep_alive(version, &headers);
        let chunked = transfer_encoding_is_chunked(&headers);
        let head = ResponseHead {
            version,
            code,
            reason,
            headers,
            keep_alive,
            chunked,
        };

        let body_state = self.body_state(&head)?;
        out.push(DecoderEvent::Headers(head));
        match body_state {
            Some(state) => self.state = RspState::Body(state),
            None => {
                out.push(DecoderEvent::Complete);
                self.state = RspState::Done;
            }
        }
        Ok(head_len)
    }
}

impl HttpMessageDecode for HttpResponseDecoder {
    type Head = ResponseHead;

    fn decode(
        &mut self,
        data: &[u8],
        out: &mut Vec<DecoderEvent<ResponseHead>>,
    ) -> Result<usize, HttpDecodeError> {
        let mut consumed = 0usize;
        if matches!(self.state, RspState::Head) {
            consumed = match self.decode_head(data, out) {
                Ok(0) => return Ok(0),
                Ok(n) => n,
                Err(e) => {
                    self.state = RspState::Dead;
                    return Err(e);
                }
            };
        }
        match &mut self.state {
            RspState::Body(body) => match body.decode(&data[consumed..], out) {
                Ok((n, done)) => {
                    consumed += n;
                    if done {
                        self.state = RspState::Done;
                    }
                    Ok(consumed)
                }
                Err(e) => {
                    self.state = RspState::Dead;
                    Err(e)
                }
            },
            RspState::Done => Ok(consumed),
            RspState::Dead => Err(HttpDecodeError::Dead),
            RspState::Head => unreachable!(),
        }
    }

    fn finish(&mut self, out: &mut Vec<DecoderEvent<ResponseHead>>) -> Result<(), HttpDecodeError> {
        match self.state {
            RspState::Done => Ok(()),
            RspState::Body(BodyState::UntilEof) => {
                // EOF delimits the body
                out.push(DecoderEvent::Complete);
                self.state = RspState::Done;
                Ok(())
            }
            RspState::Dead => Err(HttpDecodeError::Dead),
            RspState::Head | RspState::Body(_) => {
                self.state = RspState::Dead;
                Err(HttpDecodeError::UnexpectedEnd)
            }
        }
    }

    fn message_done(&self) -> bool {
        matches!(self.state, RspState::Done)
    }
}

/*
 * SPDX-License-Identifier: Apache-2.0
 */

use bytes::Bytes;
use thiserror::Error;

use crate::DecoderEvent;

mod request;
pub use request::{HttpRequestDecoder, RequestHead};

mod response;
pub use response::{HttpResponseDecoder, ResponseHead};

pub(crate) const MAX_HEADER_COUNT: usize = 64;

#[derive(Error, Debug)]
pub enum HttpDecodeError {
    #[error("invalid message head")]
    InvalidHead,
    #[error("too large header, limit {0}")]
    TooLargeHeader(usize),
    #[error("unsupported http version")]
    UnsupportedVersion,
    #[error("invalid content-length")]
    InvalidContentLength,
    #[error("invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("missing host")]
    MissingHost,
    #[error("invalid host")]
    InvalidHost,
    #[error("connection closed before message end")]
    UnexpectedEnd,
    #[error("decoder already failed")]
    Dead,
}

/// Incremental push decoder for one message direction.
///
/// `decode` consumes a prefix of `data` and reifies the callbacks it
/// triggered into `out`. It never consumes past the end of the current
/// message, so bytes belonging to a following message or to a tunnel stay
/// in the caller's buffer. After an error the decoder is dead and must not
/// be fed again.
pub trait HttpMessageDecode {
    type Head;

    fn decode(
        &mut self,
        data: &[u8],
        out: &mut Vec<DecoderEvent<Self::Head>>,
    ) -> Result<usize, HttpDecodeError>;

    /// Signal EOF on the underlying stream.
    fn finish(&mut self, out: &mut Vec<DecoderEvent<Self::Head>>) -> Result<(), HttpDecodeError>;

    fn message_done(&self) -> bool;
}

pub(crate) use body::BodyState;

mod body {
    use super::*;

    #[derive(Debug)]
    pub(crate) enum BodyState {
        Fixed { left: u64 },
        ChunkSize,
        ChunkData { left: u64 },
        ChunkDataEnd,
        Trailer,
        UntilEof,
    }

    impl BodyState {
        /// Run the body state machine over `data`, appending events to
        /// `out`. Returns the consumed byte count and whether the message
        /// ended.
        pub(crate) fn decode<H>(
            &mut self,
            data: &[u8],
            out: &mut Vec<DecoderEvent<H>>,
        ) -> Result<(usize, bool), HttpDecodeError> {
            let mut offset = 0usize;
            loop {
                let avail = &data[offset..];
                match self {
                    BodyState::Fixed { left } => {
                        if avail.is_empty() {
                            return Ok((offset, false));
                        }
                        let nr = (*left).min(avail.len() as u64) as usize;
                        out.push(DecoderEvent::Body(Bytes::copy_from_slice(&avail[..nr])));
                        *left -= nr as u64;
                        offset += nr;
                        if *left == 0 {
                            out.push(DecoderEvent::Complete);
                            return Ok((offset, true));
                        }
                    }
                    BodyState::ChunkSize => match httparse::parse_chunk_size(avail) {
                        Ok(httparse::Status::Complete((nr, size))) => {
                            offset += nr;
                            if size == 0 {
                                *self = BodyState::Trailer;
                            } else {
                                *self = BodyState::ChunkData { left: size };
                            }
                        }
                        Ok(httparse::Status::Partial) => return Ok((offset, false)),
                        Err(_) => return Err(HttpDecodeError::InvalidChunkedEncoding),
                    },
                    BodyState::ChunkData { left } => {
                        if avail.is_empty() {
                            return Ok((offset, false));
                        }
                        let nr = (*left).min(avail.len() as u64) as usize;
                        out.push(DecoderEvent::Body(Bytes::copy_from_slice(&avail[..nr])));
                        *left -= nr as u64;
                        offset += nr;
                        if *left == 0 {
                            *self = BodyState::ChunkDataEnd;
                        }
                    }
                    BodyState::ChunkDataEnd => {
                        // CRLF closing the chunk data, bare LF tolerated
                        match avail.first() {
                            None => return Ok((offset, false)),
                            Some(b'\n') => {
                                offset += 1;
                                *self = BodyState::ChunkSize;
                            }
                            Some(b'\r') => {
                                if avail.len() < 2 {
                                    return Ok((offset, false));
                                }
                                if avail[1] != b'\n' {
                                    return Err(HttpDecodeError::InvalidChunkedEncoding);
                                }
                                offset += 2;
                                *self = BodyState::ChunkSize;
                            }
                            Some(_) => return Err(HttpDecodeError::InvalidChunkedEncoding),
                        }
                    }
                    BodyState::Trailer => {
                        // trailer fields are dropped, scan line by line
                        let Some(eol) = memchr::memchr(b'\n', avail) else {
                            return Ok((offset, false));
                        };
                        offset += eol + 1;
                        if eol == 0 || (eol == 1 && avail[0] == b'\r') {
                            out.push(DecoderEvent::Complete);
                            return Ok((offset, true));
                        }
                    }
                    BodyState::UntilEof => {
                        if avail.is_empty() {
                            return Ok((offset, false));
                        }
                        out.push(DecoderEvent::Body(Bytes::copy_from_slice(avail)));
                        return Ok((data.len(), false));
                    }
                }
            }
        }
    }
}

/// Derive the keep-alive flag the way proxies see it: version default,
/// overridden by Connection / Proxy-Connection tokens.
pub(crate) fn headers_keep_alive(version: http::Version, headers: &crate::HttpHeaderList) -> bool {
    let mut keep_alive = version != http::Version::HTTP_10;
    for entry in headers.iter() {
        if entry.name().eq_ignore_ascii_case("connection")
            || entry.name().eq_ignore_ascii_case("proxy-connection")
        {
            if let Ok(value) = std::str::from_utf8(entry.value()) {
                for token in value.split(',') {
                    let token = token.trim();
                    if token.eq_ignore_ascii_case("close") {
                        keep_alive = false;
                    } else if token.eq_ignore_ascii_case("keep-alive") {
                        keep_alive = true;
                    }
                }
            }
        }
    }
    keep_alive
}

/// Case-insensitive substring check of `chunked` against the
/// Transfer-Encoding value.
pub(crate) fn transfer_encoding_is_chunked(headers: &crate::HttpHeaderList) -> bool {
    headers
        .get_str("transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}

pub(crate) fn parse_content_length(
    headers: &crate::HttpHeaderList,
) -> Result<Option<u64>, HttpDecodeError> {
    let Some(value) = headers.get("content-length") else {
        return Ok(None);
    };
    let value = std::str::from_utf8(value).map_err(|_| HttpDecodeError::InvalidContentLength)?;
    let len = value
        .trim()
        .parse::<u64>()
        .map_err(|_| HttpDecodeError::InvalidContentLength)?;
    Ok(Some(len))
}

pub(crate) fn check_head_size(
    buffered: usize,
    max_header_size: usize,
) -> Result<(), HttpDecodeError> {
    if buffered > max_header_size {
        Err(HttpDecodeError::TooLargeHeader(max_header_size))
    } else {
        Ok(())
    }
}

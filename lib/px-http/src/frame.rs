/*
 * SPDX-License-Identifier: Apache-2.0
 */

//! Stateless wire formatting. No validation, no escaping: transparency
//! means every header byte goes out exactly as it came in.

use std::io::Write;

use http::{Method, Version};

use crate::HttpHeaderList;

pub fn request_line(buf: &mut Vec<u8>, method: &Method, target: &str, version: Version) {
    let _ = write!(buf, "{method} {target} {version:?}\r\n");
}

pub fn status_line(buf: &mut Vec<u8>, version: Version, code: u16, reason: &str) {
    let _ = write!(buf, "{version:?} {code} {reason}\r\n");
}

/// Each pair as `Name: Value\r\n` in original order including duplicates,
/// then the blank line.
pub fn header_block(buf: &mut Vec<u8>, headers: &HttpHeaderList) {
    for entry in headers.iter() {
        buf.extend_from_slice(entry.name().as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(entry.value());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
}

pub fn chunk(buf: &mut Vec<u8>, data: &[u8]) {
    let _ = write!(buf, "{:x}\r\n", data.len());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

pub fn last_chunk(buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"0\r\n\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_status_lines() {
        let mut buf = Vec::new();
        request_line(&mut buf, &Method::GET, "/a/b?q=1", Version::HTTP_11);
        assert_eq!(buf, b"GET /a/b?q=1 HTTP/1.1\r\n");

        let mut buf = Vec::new();
        status_line(&mut buf, Version::HTTP_10, 502, "Bad Gateway");
        assert_eq!(buf, b"HTTP/1.0 502 Bad Gateway\r\n");
    }

    #[test]
    fn header_block_verbatim() {
        let mut headers = HttpHeaderList::new();
        headers.append("Set-Cookie", b"a=1");
        headers.append("X-MiXeD-Case", b"v");
        headers.append("Set-Cookie", b"b=2");

        let mut buf = Vec::new();
        header_block(&mut buf, &headers);
        assert_eq!(
            buf,
            b"Set-Cookie: a=1\r\nX-MiXeD-Case: v\r\nSet-Cookie: b=2\r\n\r\n"
        );
    }

    #[test]
    fn chunk_framing() {
        let mut buf = Vec::new();
        chunk(&mut buf, b"hello world, this is 26 b!");
        assert_eq!(buf, b"1a\r\nhello world, this is 26 b!\r\n");

        let mut buf = Vec::new();
        last_chunk(&mut buf);
        assert_eq!(buf, b"0\r\n\r\n");
    }
}

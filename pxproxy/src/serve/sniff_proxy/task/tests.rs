/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf};

use px_types::net::UpstreamAddr;

use crate::config::ProxyConfig;
use crate::connect::{StreamConnection, TcpConnectError, UpstreamConnector};

use super::super::ServerStats;
use super::{CommonTaskContext, SniffAcceptTask};

struct MockConnector {
    conns: Mutex<VecDeque<StreamConnection>>,
    seen: Mutex<Vec<UpstreamAddr>>,
}

impl MockConnector {
    fn new(conns: Vec<StreamConnection>) -> Arc<Self> {
        Arc::new(MockConnector {
            conns: Mutex::new(conns.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|a| a.to_string()).collect()
    }
}

#[async_trait]
impl UpstreamConnector for MockConnector {
    async fn connect(
        &self,
        addr: &UpstreamAddr,
        _timeout: Duration,
    ) -> Result<StreamConnection, TcpConnectError> {
        self.seen.lock().unwrap().push(addr.clone());
        self.conns.lock().unwrap().pop_front().ok_or_else(|| {
            TcpConnectError::ConnectFailed(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))
        })
    }
}

/// An upstream read half that fails on the first poll.
struct ErrorReader;

impl AsyncRead for ErrorReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset",
        )))
    }
}

fn upstream_pair() -> (StreamConnection, DuplexStream) {
    let (local, remote) = tokio::io::duplex(4096);
    let (r, w) = tokio::io::split(local);
    ((Box::new(r), Box::new(w)), remote)
}

fn spawn_task(connector: Arc<dyn UpstreamConnector>) -> DuplexStream {
    let (clt, srv) = tokio::io::duplex(4096);
    let ctx = CommonTaskContext {
        config: Arc::new(ProxyConfig::default()),
        connector,
        stats: Arc::new(ServerStats::default()),
        client_addr: "127.0.0.1:9999".parse().unwrap(),
    };
    let (srv_r, srv_w) = tokio::io::split(srv);
    tokio::spawn(async move {
        SniffAcceptTask::new(ctx).run(srv_r, srv_w).await;
    });
    clt
}

#[tokio::test]
async fn sniff_rejects_non_http() {
    let connector = MockConnector::new(Vec::new());
    let mut clt = spawn_task(connector.clone());

    // a TLS client hello leader, no letter in sight
    clt.write_all(&[0x16, 0x03, 0x01, 0x02, 0x00]).await.unwrap();

    let mut buf = Vec::new();
    clt.read_to_end(&mut buf).await.unwrap();
    assert!(buf.is_empty());
    assert!(connector.seen().is_empty());
}

#[tokio::test]
async fn connect_tunnel() {
    let (conn, mut remote) = upstream_pair();
    let connector = MockConnector::new(vec![conn]);
    let mut clt = spawn_task(connector.clone());

    clt.write_all(b"CONNECT example.com HTTP/1.1\r\nHost: example.com\r\n\r\n")
        .await
        .unwrap();

    let expected = b"HTTP/1.1 200 Connection Established\r\nContent-Length: 0\r\n\r\n";
    let mut rsp = vec![0u8; expected.len()];
    clt.read_exact(&mut rsp).await.unwrap();
    assert_eq!(rsp, expected);
    assert_eq!(connector.seen(), ["example.com:443"]);

    // raw bytes flow both ways
    clt.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    remote.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    remote.write_all(b"pong").await.unwrap();
    clt.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    // upstream end always ends the client side
    drop(remote);
    let mut rest = Vec::new();
    clt.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn connect_tunnel_bytes_after_head() {
    let (conn, mut remote) = upstream_pair();
    let connector = MockConnector::new(vec![conn]);
    let mut clt = spawn_task(connector);

    // the client pushes tunneled bytes together with the CONNECT head
    clt.write_all(b"CONNECT h:8443 HTTP/1.1\r\nHost: h:8443\r\n\r\n\x16\x03\x01")
        .await
        .unwrap();

    let expected = b"HTTP/1.1 200 Connection Established\r\nContent-Length: 0\r\n\r\n";
    let mut rsp = vec![0u8; expected.len()];
    clt.read_exact(&mut rsp).await.unwrap();
    assert_eq!(rsp, expected);

    let mut buf = [0u8; 3];
    remote.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"\x16\x03\x01");
}

#[tokio::test]
async fn connect_failure_gets_502() {
    let connector = MockConnector::new(Vec::new());
    let mut clt = spawn_task(connector.clone());

    clt.write_all(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
        .await
        .unwrap();

    let mut rsp = Vec::new();
    clt.read_to_end(&mut rsp).await.unwrap();
    assert_eq!(rsp, b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(connector.seen(), ["example.com:443"]);
}

#[tokio::test]
async fn connect_upstream_error_spares_keep_alive_client() {
    let conn: StreamConnection = (Box::new(ErrorReader), Box::new(tokio::io::sink()));
    let connector = MockConnector::new(vec![conn]);
    let mut clt = spawn_task(connector);

    clt.write_all(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
        .await
        .unwrap();

    let expected = b"HTTP/1.1 200 Connection Established\r\nContent-Length: 0\r\n\r\n";
    let mut rsp = vec![0u8; expected.len()];
    clt.read_exact(&mut rsp).await.unwrap();
    assert_eq!(rsp, expected);

    // the upstream leg fails right away, but the keep-alive client leg
    // stays up and writable until it ends itself
    clt.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    let r = tokio::time::timeout(Duration::from_millis(100), clt.read(&mut buf)).await;
    assert!(r.is_err());

    clt.shutdown().await.unwrap();
    let mut rest = Vec::new();
    clt.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn forward_unresolvable_target_gets_500() {
    let connector = MockConnector::new(Vec::new());
    let mut clt = spawn_task(connector.clone());

    // relative target and no Host header, nowhere to connect to
    clt.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

    let mut rsp = Vec::new();
    clt.read_to_end(&mut rsp).await.unwrap();
    assert_eq!(
        rsp,
        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n"
    );
    assert!(connector.seen().is_empty());
}

#[tokio::test]
async fn forward_roundtrip() {
    let (conn, mut remote) = upstream_pair();
    let connector = MockConnector::new(vec![conn]);
    let mut clt = spawn_task(connector.clone());

    clt.write_all(
        b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
    )
    .await
    .unwrap();

    // request line rewritten to origin-form, headers untouched
    let expected = b"GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n";
    let mut req = vec![0u8; expected.len()];
    remote.read_exact(&mut req).await.unwrap();
    assert_eq!(req, expected);
    assert_eq!(connector.seen(), ["example.com:80"]);

    // request complete ends the upstream write side
    let mut rest = [0u8; 16];
    assert_eq!(remote.read(&mut rest).await.unwrap(), 0);

    remote
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
        .await
        .unwrap();

    let mut rsp = Vec::new();
    clt.read_to_end(&mut rsp).await.unwrap();
    assert_eq!(rsp, b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
}

#[tokio::test]
async fn forward_request_body() {
    let (conn, mut remote) = upstream_pair();
    let connector = MockConnector::new(vec![conn]);
    let mut clt = spawn_task(connector);

    clt.write_all(
        b"POST /submit HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await
    .unwrap();

    let expected =
        b"POST /submit HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";
    let mut req = vec![0u8; expected.len()];
    remote.read_exact(&mut req).await.unwrap();
    assert_eq!(req, expected.as_slice());

    remote
        .write_all(b"HTTP/1.1 204 No Content\r\n\r\n")
        .await
        .unwrap();

    let mut rsp = Vec::new();
    clt.read_to_end(&mut rsp).await.unwrap();
    assert_eq!(rsp, b"HTTP/1.1 204 No Content\r\n\r\n");
}

#[tokio::test]
async fn forward_chunked_reframe() {
    let (conn, mut remote) = upstream_pair();
    let connector = MockConnector::new(vec![conn]);
    let mut clt = spawn_task(connector);

    clt.write_all(b"GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let expected = b"GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n";
    let mut req = vec![0u8; expected.len()];
    remote.read_exact(&mut req).await.unwrap();

    remote
        .write_all(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .await
        .unwrap();

    let mut rsp = Vec::new();
    clt.read_to_end(&mut rsp).await.unwrap();
    assert_eq!(
        rsp,
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
          5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"
            .as_slice()
    );
}

#[tokio::test]
async fn forward_until_eof_response() {
    let (conn, mut remote) = upstream_pair();
    let connector = MockConnector::new(vec![conn]);
    let mut clt = spawn_task(connector);

    clt.write_all(b"GET / HTTP/1.0\r\nHost: h\r\n\r\n").await.unwrap();

    let expected = b"GET / HTTP/1.0\r\nHost: h\r\n\r\n";
    let mut req = vec![0u8; expected.len()];
    remote.read_exact(&mut req).await.unwrap();

    // no framing headers, the body runs to upstream eof
    remote
        .write_all(b"HTTP/1.0 200 OK\r\nX-Test: 1\r\n\r\nold style body")
        .await
        .unwrap();
    drop(remote);

    let mut rsp = Vec::new();
    clt.read_to_end(&mut rsp).await.unwrap();
    assert_eq!(rsp, b"HTTP/1.0 200 OK\r\nX-Test: 1\r\n\r\nold style body");
}

#[tokio::test]
async fn forward_keep_alive_two_transactions() {
    let (conn1, mut remote1) = upstream_pair();
    let (conn2, mut remote2) = upstream_pair();
    let connector = MockConnector::new(vec![conn1, conn2]);
    let mut clt = spawn_task(connector.clone());

    clt.write_all(b"GET / HTTP/1.1\r\nHost: a.example.com\r\n\r\n")
        .await
        .unwrap();
    let expected = b"GET / HTTP/1.1\r\nHost: a.example.com\r\n\r\n";
    let mut req = vec![0u8; expected.len()];
    remote1.read_exact(&mut req).await.unwrap();
    remote1
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
        .await
        .unwrap();

    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
    let mut rsp = vec![0u8; expected.len()];
    clt.read_exact(&mut rsp).await.unwrap();
    assert_eq!(rsp, expected);

    // the client connection survived, second request goes elsewhere
    clt.write_all(b"GET / HTTP/1.1\r\nHost: b.example.com\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let expected = b"GET / HTTP/1.1\r\nHost: b.example.com\r\nConnection: close\r\n\r\n";
    let mut req = vec![0u8; expected.len()];
    remote2.read_exact(&mut req).await.unwrap();
    remote2
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nbye")
        .await
        .unwrap();

    let mut rsp = Vec::new();
    clt.read_to_end(&mut rsp).await.unwrap();
    assert_eq!(rsp, b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nbye");

    assert_eq!(connector.seen(), ["a.example.com:80", "b.example.com:80"]);
}

#[tokio::test]
async fn forward_connect_failure_drops_body() {
    let connector = MockConnector::new(Vec::new());
    let mut clt = spawn_task(connector.clone());

    // body bytes seen before the failed connect are not replayed anywhere
    clt.write_all(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello")
        .await
        .unwrap();

    let mut rsp = Vec::new();
    clt.read_to_end(&mut rsp).await.unwrap();
    assert_eq!(rsp, b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(connector.seen(), ["h:80"]);
}

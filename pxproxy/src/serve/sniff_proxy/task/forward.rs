/*
 * SPDX-License-Identifier: Apache-2.0
 */

use bytes::{Buf, Bytes, BytesMut};
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use px_http::decode::{HttpRequestDecoder, HttpResponseDecoder, RequestHead, ResponseHead};
use px_http::{frame, DecoderEvent, EventKinds, MessageDecoderBridge};

use crate::connect::{BoxConnWriter, StreamConnection};
use crate::serve::{ServerTaskError, ServerTaskResult};

use super::{CommonTaskContext, RSP_500_INTERNAL_SERVER_ERROR, RSP_502_BAD_GATEWAY};

/// One relayed HTTP transaction: connect upstream while the request body
/// keeps arriving, replay the request with a rewritten request line, then
/// stream the decoded response back with chunked re-framing. Returns
/// whether the client connection may carry another transaction.
pub(crate) struct ForwardTask<'a> {
    ctx: &'a CommonTaskContext,
}

impl<'a> ForwardTask<'a> {
    pub(crate) fn new(ctx: &'a CommonTaskContext) -> Self {
        ForwardTask { ctx }
    }

    pub(crate) async fn run<CDR, CDW>(
        self,
        head: &RequestHead,
        req_bridge: &mut MessageDecoderBridge<HttpRequestDecoder>,
        clt_r: &mut CDR,
        clt_r_buf: &mut BytesMut,
        clt_w: &mut CDW,
    ) -> ServerTaskResult<bool>
    where
        CDR: AsyncRead + Send + Sync + Unpin,
        CDW: AsyncWrite + Send + Sync + Unpin,
    {
        let addr = match head.forward_addr() {
            Ok(addr) => addr,
            Err(_) => {
                let _ = clt_w.write_all(RSP_500_INTERNAL_SERVER_ERROR).await;
                let _ = clt_w.shutdown().await;
                return Err(ServerTaskError::InvalidClientProtocol(
                    "invalid request target",
                ));
            }
        };
        debug!("client {} forward to {addr}", self.ctx.client_addr);

        let req_keep_alive = head.keep_alive;
        let mut clt_eof = false;

        // body bytes that arrived together with the head
        if !clt_r_buf.is_empty() && !req_bridge.message_done() {
            let consumed = req_bridge
                .execute(clt_r_buf, &mut |_ev: DecoderEvent<RequestHead>| {})
                .map_err(|_| ServerTaskError::InvalidClientProtocol("invalid request body"))?;
            clt_r_buf.advance(consumed);
        }

        // keep draining the request while the connect is in flight, the
        // body events queue up in the bridge until an upstream exists
        let connect_fut = self
            .ctx
            .connector
            .connect(&addr, self.ctx.config.connect_timeout);
        tokio::pin!(connect_fut);
        let connect_result = loop {
            tokio::select! {
                biased;
                r = &mut connect_fut => break r,
                r = clt_r.read_buf(clt_r_buf), if !req_bridge.message_done() && !clt_eof => match r {
                    Ok(0) => {
                        clt_eof = true;
                        req_bridge
                            .finish(&mut |_ev: DecoderEvent<RequestHead>| {})
                            .map_err(|_| ServerTaskError::ClosedEarlyByClient)?;
                    }
                    Ok(_) => {
                        let consumed = req_bridge
                            .execute(clt_r_buf, &mut |_ev: DecoderEvent<RequestHead>| {})
                            .map_err(|_| {
                                ServerTaskError::InvalidClientProtocol("invalid request body")
                            })?;
                        clt_r_buf.advance(consumed);
                    }
                    Err(e) => return Err(ServerTaskError::ClientTcpReadFailed(e)),
                },
            }
        };

        let (mut ups_r, mut ups_w): StreamConnection = match connect_result {
            Ok(conn) => conn,
            Err(e) => {
                // queued body events go down with the transaction
                let _ = clt_w.write_all(RSP_502_BAD_GATEWAY).await;
                let _ = clt_w.flush().await;
                let _ = clt_w.shutdown().await;
                return Err(ServerTaskError::UpstreamNotConnected(e));
            }
        };

        // request line in origin-form, header block untouched
        let mut head_buf = Vec::with_capacity(1024);
        frame::request_line(
            &mut head_buf,
            &head.method,
            &head.origin_form_target(),
            head.version,
        );
        frame::header_block(&mut head_buf, &head.headers);
        ups_w
            .write_all(&head_buf)
            .await
            .map_err(ServerTaskError::UpstreamWriteFailed)?;

        // replay whatever the bridge queued while we were connecting
        let mut queued_body: Vec<Bytes> = Vec::new();
        let mut req_complete = false;
        req_bridge.subscribe(
            EventKinds::BODY | EventKinds::COMPLETE,
            &mut |ev: DecoderEvent<RequestHead>| match ev {
                DecoderEvent::Body(data) => queued_body.push(data),
                DecoderEvent::Complete => req_complete = true,
                DecoderEvent::Headers(_) => {}
            },
        );
        for data in queued_body {
            ups_w
                .write_all(&data)
                .await
                .map_err(ServerTaskError::UpstreamWriteFailed)?;
        }
        ups_w
            .flush()
            .await
            .map_err(ServerTaskError::UpstreamWriteFailed)?;
        if req_complete {
            let _ = ups_w.shutdown().await;
        }

        let mut rsp_bridge = MessageDecoderBridge::new(HttpResponseDecoder::new(
            self.ctx.config.max_header_size,
            head.method.clone(),
        ));
        rsp_bridge.subscribe(EventKinds::all(), &mut |_ev: DecoderEvent<ResponseHead>| {});

        let mut ups_r_buf = BytesMut::with_capacity(self.ctx.config.tcp_copy.buffer_size());
        let mut is_chunked = false;
        let mut rsp_done = false;

        loop {
            tokio::select! {
                r = ups_r.read_buf(&mut ups_r_buf) => match r {
                    Ok(0) => {
                        let mut events = Vec::new();
                        rsp_bridge
                            .finish(&mut |ev: DecoderEvent<ResponseHead>| events.push(ev))
                            .map_err(|_| ServerTaskError::ClosedByUpstream)?;
                        send_rsp_events(events, &mut is_chunked, &mut rsp_done, clt_w).await?;
                        if !rsp_done {
                            return Err(ServerTaskError::ClosedByUpstream);
                        }
                        break;
                    }
                    Ok(_) => {
                        let mut events = Vec::new();
                        let consumed = rsp_bridge
                            .execute(&ups_r_buf, &mut |ev: DecoderEvent<ResponseHead>| {
                                events.push(ev)
                            })
                            .map_err(|_| {
                                ServerTaskError::InvalidUpstreamProtocol(
                                    "invalid upstream response",
                                )
                            })?;
                        ups_r_buf.advance(consumed);
                        send_rsp_events(events, &mut is_chunked, &mut rsp_done, clt_w).await?;
                        if rsp_done {
                            break;
                        }
                    }
                    Err(e) => {
                        if req_keep_alive {
                            // the client asked to stay, only its own leg
                            // may take it down
                            debug!(
                                "client {} upstream {addr} read failed: {e}",
                                self.ctx.client_addr
                            );
                            return Ok(req_bridge.message_done());
                        }
                        return Err(ServerTaskError::UpstreamReadFailed(e));
                    }
                },
                r = clt_r.read_buf(clt_r_buf), if !req_bridge.message_done() && !clt_eof => match r {
                    Ok(0) => {
                        clt_eof = true;
                        let mut events = Vec::new();
                        req_bridge
                            .finish(&mut |ev: DecoderEvent<RequestHead>| events.push(ev))
                            .map_err(|_| ServerTaskError::ClosedEarlyByClient)?;
                        send_req_events(events, &mut ups_w).await?;
                    }
                    Ok(_) => {
                        let mut events = Vec::new();
                        let consumed = req_bridge
                            .execute(clt_r_buf, &mut |ev: DecoderEvent<RequestHead>| {
                                events.push(ev)
                            })
                            .map_err(|_| {
                                ServerTaskError::InvalidClientProtocol("invalid request body")
                            })?;
                        clt_r_buf.advance(consumed);
                        send_req_events(events, &mut ups_w).await?;
                    }
                    Err(e) => return Err(ServerTaskError::ClientTcpReadFailed(e)),
                },
            }
        }

        Ok(req_keep_alive && req_bridge.message_done())
    }
}

/// Forward decoded request events to the upstream write side.
async fn send_req_events(
    events: Vec<DecoderEvent<RequestHead>>,
    ups_w: &mut BoxConnWriter,
) -> ServerTaskResult<()> {
    let mut complete = false;
    for ev in events {
        match ev {
            DecoderEvent::Body(data) => {
                ups_w
                    .write_all(&data)
                    .await
                    .map_err(ServerTaskError::UpstreamWriteFailed)?;
            }
            DecoderEvent::Complete => complete = true,
            DecoderEvent::Headers(_) => {}
        }
    }
    ups_w
        .flush()
        .await
        .map_err(ServerTaskError::UpstreamWriteFailed)?;
    if complete {
        let _ = ups_w.shutdown().await;
    }
    Ok(())
}

/// Forward decoded response events to the client, re-framing body chunks
/// when the response is chunked.
async fn send_rsp_events<CDW>(
    events: Vec<DecoderEvent<ResponseHead>>,
    is_chunked: &mut bool,
    rsp_done: &mut bool,
    clt_w: &mut CDW,
) -> ServerTaskResult<()>
where
    CDW: AsyncWrite + Send + Sync + Unpin,
{
    let mut buf = Vec::new();
    for ev in events {
        match ev {
            DecoderEvent::Headers(h) => {
                *is_chunked = h.is_chunked();
                frame::status_line(&mut buf, h.version, h.code, &h.reason);
                frame::header_block(&mut buf, &h.headers);
            }
            DecoderEvent::Body(data) => {
                if *is_chunked {
                    frame::chunk(&mut buf, &data);
                } else {
                    buf.extend_from_slice(&data);
                }
            }
            DecoderEvent::Complete => {
                if *is_chunked {
                    frame::last_chunk(&mut buf);
                }
                *rsp_done = true;
            }
        }
    }
    if !buf.is_empty() {
        clt_w
            .write_all(&buf)
            .await
            .map_err(ServerTaskError::ClientTcpWriteFailed)?;
        clt_w
            .flush()
            .await
            .map_err(ServerTaskError::ClientTcpWriteFailed)?;
    }
    Ok(())
}

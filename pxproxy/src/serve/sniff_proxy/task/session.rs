/*
 * SPDX-License-Identifier: Apache-2.0
 */

use bytes::{Buf, BytesMut};
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use px_http::decode::{HttpRequestDecoder, RequestHead};
use px_http::{DecoderEvent, EventKinds, MessageDecoderBridge};

use crate::serve::{ServerTaskError, ServerTaskResult};

use super::{CommonTaskContext, ConnectTask, ForwardTask};

/// Transaction loop of one accepted HTTP client. Each round decodes one
/// request head out of the client stream and dispatches it: CONNECT turns
/// the connection into a tunnel and is terminal, anything else is relayed
/// to a fresh upstream connection and may loop for keep-alive.
pub(crate) struct HttpSessionTask {
    ctx: CommonTaskContext,
}

impl HttpSessionTask {
    pub(crate) fn new(ctx: CommonTaskContext) -> Self {
        HttpSessionTask { ctx }
    }

    pub(crate) async fn run<CDR, CDW>(
        self,
        mut clt_r: CDR,
        mut clt_r_buf: BytesMut,
        mut clt_w: CDW,
    ) -> ServerTaskResult<()>
    where
        CDR: AsyncRead + Send + Sync + Unpin,
        CDW: AsyncWrite + Send + Sync + Unpin,
    {
        self.ctx.stats.add_task();
        let _alive_guard = self.ctx.stats.alive_guard();
        debug!(
            "client {} task started, {} tasks total",
            self.ctx.client_addr,
            self.ctx.stats.task_total()
        );

        let mut transaction_id = 0usize;
        loop {
            let mut req_bridge = MessageDecoderBridge::new(HttpRequestDecoder::new(
                self.ctx.config.max_header_size,
            ));
            // body and completion stay queued until an upstream exists
            req_bridge.subscribe(EventKinds::HEADERS, &mut |_ev: DecoderEvent<RequestHead>| {});

            let mut recv_head: Option<RequestHead> = None;
            let head = loop {
                if !clt_r_buf.is_empty() {
                    let consumed = req_bridge
                        .execute(&clt_r_buf, &mut |ev: DecoderEvent<RequestHead>| {
                            if let DecoderEvent::Headers(h) = ev {
                                recv_head = Some(h);
                            }
                        })
                        .map_err(|_| {
                            ServerTaskError::InvalidClientProtocol("invalid client request")
                        })?;
                    clt_r_buf.advance(consumed);
                    if let Some(head) = recv_head.take() {
                        break head;
                    }
                }
                match clt_r.read_buf(&mut clt_r_buf).await {
                    Ok(0) => {
                        return if clt_r_buf.is_empty() {
                            // clean close between requests
                            Ok(())
                        } else {
                            Err(ServerTaskError::ClosedEarlyByClient)
                        };
                    }
                    Ok(_) => {}
                    Err(e) => return Err(ServerTaskError::ClientTcpReadFailed(e)),
                }
            };
            transaction_id += 1;
            debug!(
                "client {} transaction {transaction_id}: {} {}",
                self.ctx.client_addr, head.method, head.target
            );

            if head.is_connect() {
                // terminal: the connection never comes back to HTTP
                return ConnectTask::new(&self.ctx)
                    .run(head, clt_r, clt_r_buf, clt_w)
                    .await;
            }

            let keep_alive = ForwardTask::new(&self.ctx)
                .run(
                    &head,
                    &mut req_bridge,
                    &mut clt_r,
                    &mut clt_r_buf,
                    &mut clt_w,
                )
                .await?;
            if !keep_alive {
                let _ = clt_w.shutdown().await;
                return Ok(());
            }
        }
    }
}

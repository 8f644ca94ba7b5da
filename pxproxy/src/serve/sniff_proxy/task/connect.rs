/*
 * SPDX-License-Identifier: Apache-2.0
 */

use bytes::BytesMut;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use px_http::decode::RequestHead;
use px_io_ext::{StreamCopy, StreamCopyError};

use crate::serve::{ServerTaskError, ServerTaskResult};

use super::{CommonTaskContext, RSP_200_ESTABLISHED, RSP_500_INTERNAL_SERVER_ERROR, RSP_502_BAD_GATEWAY};

/// CONNECT handling: open the upstream connection, report 200 or 502 to
/// the client, then relay raw bytes both ways until the streams end.
pub(crate) struct ConnectTask<'a> {
    ctx: &'a CommonTaskContext,
}

impl<'a> ConnectTask<'a> {
    pub(crate) fn new(ctx: &'a CommonTaskContext) -> Self {
        ConnectTask { ctx }
    }

    pub(crate) async fn run<CDR, CDW>(
        self,
        head: RequestHead,
        mut clt_r: CDR,
        clt_r_buf: BytesMut,
        mut clt_w: CDW,
    ) -> ServerTaskResult<()>
    where
        CDR: AsyncRead + Send + Sync + Unpin,
        CDW: AsyncWrite + Send + Sync + Unpin,
    {
        let addr = match head.connect_addr() {
            Ok(addr) => addr,
            Err(_) => {
                let _ = clt_w.write_all(RSP_500_INTERNAL_SERVER_ERROR).await;
                let _ = clt_w.shutdown().await;
                return Err(ServerTaskError::InvalidClientProtocol(
                    "invalid connect target",
                ));
            }
        };
        debug!("client {} connect to {addr}", self.ctx.client_addr);

        let (mut ups_r, mut ups_w) = match self
            .ctx
            .connector
            .connect(&addr, self.ctx.config.connect_timeout)
            .await
        {
            Ok(conn) => conn,
            Err(e) => {
                let _ = clt_w.write_all(RSP_502_BAD_GATEWAY).await;
                let _ = clt_w.flush().await;
                let _ = clt_w.shutdown().await;
                return Err(ServerTaskError::UpstreamNotConnected(e));
            }
        };

        clt_w
            .write_all(RSP_200_ESTABLISHED)
            .await
            .map_err(ServerTaskError::ClientTcpWriteFailed)?;
        clt_w
            .flush()
            .await
            .map_err(ServerTaskError::ClientTcpWriteFailed)?;

        // bytes that arrived after the CONNECT head already belong to the
        // tunneled protocol
        let mut clt_to_ups = StreamCopy::with_data(
            &mut clt_r,
            &mut ups_w,
            &self.ctx.config.tcp_copy,
            clt_r_buf.to_vec(),
        );
        let mut ups_to_clt = StreamCopy::new(&mut ups_r, &mut clt_w, &self.ctx.config.tcp_copy);

        let mut clt_done = false;
        let mut ups_done = false;
        loop {
            tokio::select! {
                r = &mut clt_to_ups, if !clt_done => match r {
                    Ok(_) => {
                        clt_done = true;
                        if !head.keep_alive {
                            let _ = clt_to_ups.writer().shutdown().await;
                        }
                        if ups_done {
                            break;
                        }
                    }
                    Err(e) => {
                        return Err(match e {
                            StreamCopyError::ReadFailed(e) => {
                                ServerTaskError::ClientTcpReadFailed(e)
                            }
                            StreamCopyError::WriteFailed(e) => {
                                ServerTaskError::UpstreamWriteFailed(e)
                            }
                        });
                    }
                },
                r = &mut ups_to_clt, if !ups_done => match r {
                    Ok(_) => {
                        ups_done = true;
                        let _ = ups_to_clt.writer().shutdown().await;
                        if clt_done {
                            break;
                        }
                    }
                    Err(e) => match e {
                        StreamCopyError::ReadFailed(e) => {
                            if head.keep_alive {
                                // keep-alive was requested, the client leg
                                // stays until it ends itself
                                debug!(
                                    "client {} tunnel upstream read failed: {e}",
                                    self.ctx.client_addr
                                );
                                ups_done = true;
                                if clt_done {
                                    break;
                                }
                            } else {
                                return Err(ServerTaskError::UpstreamReadFailed(e));
                            }
                        }
                        StreamCopyError::WriteFailed(e) => {
                            return Err(ServerTaskError::ClientTcpWriteFailed(e));
                        }
                    },
                },
            }
        }

        debug!(
            "client {} tunnel to {addr} closed, {} bytes up, {} bytes down",
            self.ctx.client_addr,
            clt_to_ups.copied_size(),
            ups_to_clt.copied_size()
        );
        Ok(())
    }
}

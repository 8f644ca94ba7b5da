/*
 * SPDX-License-Identifier: Apache-2.0
 */

use bytes::BytesMut;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;

use super::{CommonTaskContext, HttpSessionTask};

const SNIFF_BUFFER_SIZE: usize = 8 * 1024;

/// First stage of every inbound connection: read the initial bytes and
/// classify on the first one. An ASCII letter means an HTTP request line
/// can follow; anything else is closed with zero bytes written.
pub(crate) struct SniffAcceptTask {
    ctx: CommonTaskContext,
}

impl SniffAcceptTask {
    pub(crate) fn new(ctx: CommonTaskContext) -> Self {
        SniffAcceptTask { ctx }
    }

    pub(crate) async fn into_running(self, stream: TcpStream) {
        let (clt_r, clt_w) = stream.into_split();
        self.run(clt_r, clt_w).await;
    }

    pub(crate) async fn run<CDR, CDW>(self, mut clt_r: CDR, clt_w: CDW)
    where
        CDR: AsyncRead + Send + Sync + Unpin,
        CDW: AsyncWrite + Send + Sync + Unpin,
    {
        let client_addr = self.ctx.client_addr;
        let mut clt_r_buf = BytesMut::with_capacity(SNIFF_BUFFER_SIZE);
        match clt_r.read_buf(&mut clt_r_buf).await {
            Ok(0) => {
                debug!("client {client_addr} closed before sending any data");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("failed to read from client {client_addr}: {e}");
                return;
            }
        }

        if !clt_r_buf[0].is_ascii_alphabetic() {
            // not HTTP, drop both halves without writing a byte
            self.ctx.stats.add_sniff_rejected();
            debug!(
                "client {client_addr} rejected by sniff, first byte {:#04x}, {} rejected so far",
                clt_r_buf[0],
                self.ctx.stats.sniff_rejected()
            );
            return;
        }

        match HttpSessionTask::new(self.ctx).run(clt_r, clt_r_buf, clt_w).await {
            Ok(_) => debug!("client {client_addr} session finished"),
            Err(e) => debug!("client {client_addr} session failed: {e} ({})", e.brief()),
        }
    }
}

/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use px_types::net::UpstreamAddr;

use super::{StreamConnection, TcpConnectError, UpstreamConnector};

/// Plain TCP connect through the system resolver.
#[derive(Default)]
pub struct DirectTcpConnector {}

#[async_trait]
impl UpstreamConnector for DirectTcpConnector {
    async fn connect(
        &self,
        addr: &UpstreamAddr,
        timeout: Duration,
    ) -> Result<StreamConnection, TcpConnectError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((addr.host(), addr.port())))
            .await
            .map_err(|_| TcpConnectError::TimedOut)?
            .map_err(TcpConnectError::ConnectFailed)?;
        let _ = stream.set_nodelay(true);
        let (ups_r, ups_w) = stream.into_split();
        Ok((Box::new(ups_r), Box::new(ups_w)))
    }
}

/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::connect::UpstreamConnector;

use super::ServerStats;

mod accept;
pub(crate) use accept::SniffAcceptTask;

mod session;
use session::HttpSessionTask;

mod connect;
use connect::ConnectTask;

mod forward;
use forward::ForwardTask;

#[cfg(test)]
mod tests;

pub(crate) struct CommonTaskContext {
    pub(crate) config: Arc<ProxyConfig>,
    pub(crate) connector: Arc<dyn UpstreamConnector>,
    pub(crate) stats: Arc<ServerStats>,
    pub(crate) client_addr: SocketAddr,
}

pub(crate) const RSP_200_ESTABLISHED: &[u8] =
    b"HTTP/1.1 200 Connection Established\r\nContent-Length: 0\r\n\r\n";
pub(crate) const RSP_502_BAD_GATEWAY: &[u8] =
    b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n";
pub(crate) const RSP_500_INTERNAL_SERVER_ERROR: &[u8] =
    b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n";

/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use px_types::net::UpstreamAddr;

mod direct;
pub use direct::DirectTcpConnector;

pub type BoxConnReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
pub type BoxConnWriter = Box<dyn AsyncWrite + Send + Sync + Unpin>;
pub type StreamConnection = (BoxConnReader, BoxConnWriter);

#[derive(Error, Debug)]
pub enum TcpConnectError {
    #[error("connect failed: {0:?}")]
    ConnectFailed(io::Error),
    #[error("connect timed out")]
    TimedOut,
}

/// How the proxy reaches an upstream. Exactly one outcome per call, the
/// timeout surfacing as its own error. The session controller takes this
/// as a trait object, so an alternative transport can be injected without
/// touching the controller itself.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(
        &self,
        addr: &UpstreamAddr,
        timeout: Duration,
    ) -> Result<StreamConnection, TcpConnectError>;
}

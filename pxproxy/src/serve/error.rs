/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::io;

use thiserror::Error;

use crate::connect::TcpConnectError;

#[derive(Error, Debug)]
pub(crate) enum ServerTaskError {
    #[error("invalid client protocol: {0}")]
    InvalidClientProtocol(&'static str),
    #[error("invalid upstream protocol: {0}")]
    InvalidUpstreamProtocol(&'static str),
    #[error("tcp read from client: {0:?}")]
    ClientTcpReadFailed(io::Error),
    #[error("tcp write to client: {0:?}")]
    ClientTcpWriteFailed(io::Error),
    #[error("upstream not connected: {0}")]
    UpstreamNotConnected(TcpConnectError),
    #[error("read from upstream: {0:?}")]
    UpstreamReadFailed(io::Error),
    #[error("write to upstream: {0:?}")]
    UpstreamWriteFailed(io::Error),
    #[error("closed by upstream")]
    ClosedByUpstream,
    #[error("closed early by client")]
    ClosedEarlyByClient,
}

impl ServerTaskError {
    pub(crate) fn brief(&self) -> &'static str {
        match self {
            ServerTaskError::InvalidClientProtocol(_) => "InvalidClientProtocol",
            ServerTaskError::InvalidUpstreamProtocol(_) => "InvalidUpstreamProtocol",
            ServerTaskError::ClientTcpReadFailed(_) => "ClientTcpReadFailed",
            ServerTaskError::ClientTcpWriteFailed(_) => "ClientTcpWriteFailed",
            ServerTaskError::UpstreamNotConnected(_) => "UpstreamNotConnected",
            ServerTaskError::UpstreamReadFailed(_) => "UpstreamReadFailed",
            ServerTaskError::UpstreamWriteFailed(_) => "UpstreamWriteFailed",
            ServerTaskError::ClosedByUpstream => "ClosedByUpstream",
            ServerTaskError::ClosedEarlyByClient => "ClosedEarlyByClient",
        }
    }
}

impl From<TcpConnectError> for ServerTaskError {
    fn from(e: TcpConnectError) -> Self {
        ServerTaskError::UpstreamNotConnected(e)
    }
}

pub(crate) type ServerTaskResult<T> = Result<T, ServerTaskError>;

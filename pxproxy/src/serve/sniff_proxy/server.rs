/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use anyhow::Context;
use log::{debug, info, warn};
use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::connect::UpstreamConnector;

use super::task::{CommonTaskContext, SniffAcceptTask};
use super::ServerStats;

pub struct SniffProxyServer {
    config: Arc<ProxyConfig>,
    connector: Arc<dyn UpstreamConnector>,
    stats: Arc<ServerStats>,
}

impl SniffProxyServer {
    pub fn new(config: Arc<ProxyConfig>, connector: Arc<dyn UpstreamConnector>) -> Self {
        SniffProxyServer {
            config,
            connector,
            stats: Arc::new(ServerStats::default()),
        }
    }

    pub async fn listen(&self) -> anyhow::Result<TcpListener> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .context(format!("failed to bind to {}", self.config.listen_addr))?;
        info!("listening on {}", self.config.listen_addr);
        Ok(listener)
    }

    pub async fn run(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, client_addr)) => {
                    self.stats.add_conn();
                    debug!(
                        "new client {client_addr}, {} connections so far, {} alive tasks",
                        self.stats.conn_total(),
                        self.stats.alive_count()
                    );
                    let ctx = CommonTaskContext {
                        config: Arc::clone(&self.config),
                        connector: Arc::clone(&self.connector),
                        stats: Arc::clone(&self.stats),
                        client_addr,
                    };
                    tokio::spawn(async move {
                        SniffAcceptTask::new(ctx).into_running(stream).await;
                    });
                }
                Err(e) => {
                    warn!("failed to accept connection: {e}");
                }
            }
        }
    }
}

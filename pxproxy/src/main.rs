/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use anyhow::Context;
use log::info;

use pxproxy::config::ProxyConfig;
use pxproxy::connect::DirectTcpConnector;
use pxproxy::serve::SniffProxyServer;

fn main() -> anyhow::Result<()> {
    let Some(proc_args) = pxproxy::opts::parse_clap().context("failed to parse command line")?
    else {
        return Ok(());
    };

    pxproxy::logging::setup(proc_args.verbose_level)?;

    let config = pxproxy::config::load(proc_args.config_file.as_deref())
        .context("failed to load config")?;
    if proc_args.test_config {
        info!("the format of the config file is ok");
        return Ok(());
    }

    tokio_run(config)
}

fn tokio_run(config: ProxyConfig) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    rt.block_on(async {
        let server = SniffProxyServer::new(
            Arc::new(config),
            Arc::new(DirectTcpConnector::default()),
        );
        let listener = server.listen().await?;
        tokio::spawn(async move {
            server.run(listener).await;
        });

        tokio::signal::ctrl_c()
            .await
            .context("failed to wait for the shutdown signal")?;
        info!("signal received, exiting");
        Ok(())
    })
}

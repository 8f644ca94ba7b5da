/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context};
use yaml_rust::{Yaml, YamlLoader};

use px_io_ext::StreamCopyConfig;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3128";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_HEADER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub connect_timeout: Duration,
    pub tcp_copy: StreamCopyConfig,
    pub max_header_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 3128))),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tcp_copy: StreamCopyConfig::default(),
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
        }
    }
}

/// Load the config file if one was given, otherwise fall back to defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<ProxyConfig> {
    let Some(path) = path else {
        return Ok(ProxyConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .context(format!("failed to read config file {}", path.display()))?;
    let docs = YamlLoader::load_from_str(&content)
        .context(format!("invalid yaml file {}", path.display()))?;
    match docs.first() {
        Some(doc) => parse_yaml_doc(doc),
        None => Ok(ProxyConfig::default()),
    }
}

fn parse_yaml_doc(doc: &Yaml) -> anyhow::Result<ProxyConfig> {
    let Yaml::Hash(map) = doc else {
        return Err(anyhow!("the config root should be a yaml map"));
    };

    let mut config = ProxyConfig::default();
    for (k, v) in map.iter() {
        let key = k.as_str().ok_or_else(|| anyhow!("invalid key {k:?}"))?;
        match key {
            "listen" => {
                let s = v.as_str().ok_or_else(|| anyhow!("invalid value for key listen"))?;
                config.listen_addr = s
                    .parse()
                    .map_err(|e| anyhow!("invalid listen address {s}: {e}"))?;
            }
            "connect_timeout" => {
                let secs = as_u64(v).context("invalid value for key connect_timeout")?;
                config.connect_timeout = Duration::from_secs(secs);
            }
            "tcp_copy_buffer_size" => {
                let size = as_u64(v).context("invalid value for key tcp_copy_buffer_size")?;
                config.tcp_copy.set_buffer_size(size as usize);
            }
            "max_header_size" => {
                let size = as_u64(v).context("invalid value for key max_header_size")?;
                config.max_header_size = size as usize;
            }
            _ => return Err(anyhow!("invalid key {key}")),
        }
    }
    Ok(config)
}

fn as_u64(v: &Yaml) -> anyhow::Result<u64> {
    let n = v.as_i64().ok_or_else(|| anyhow!("not an integer value"))?;
    u64::try_from(n).map_err(|_| anyhow!("negative value"))
}

/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpstreamAddrParseError {
    #[error("empty host")]
    EmptyHost,
    #[error("invalid port")]
    InvalidPort,
}

/// Target address of an upstream connection. The host part is kept as
/// received, domain or IP literal alike, so the connector can hand it to
/// the system resolver unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamAddr {
    host: String,
    port: u16,
}

impl UpstreamAddr {
    pub fn new(host: String, port: u16) -> Self {
        UpstreamAddr { host, port }
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Parse a `host[:port]` string, filling in `default_port` if no port
    /// is present. Bracketed IPv6 literals are accepted; a bare string with
    /// more than one `:` is taken to be an IPv6 host without a port.
    pub fn from_str_with_default_port(
        s: &str,
        default_port: u16,
    ) -> Result<Self, UpstreamAddrParseError> {
        if s.is_empty() {
            return Err(UpstreamAddrParseError::EmptyHost);
        }

        if let Some(s) = s.strip_prefix('[') {
            let Some((host, remaining)) = s.split_once(']') else {
                return Err(UpstreamAddrParseError::EmptyHost);
            };
            if host.is_empty() {
                return Err(UpstreamAddrParseError::EmptyHost);
            }
            let port = match remaining.strip_prefix(':') {
                Some(p) => u16::from_str(p).map_err(|_| UpstreamAddrParseError::InvalidPort)?,
                None if remaining.is_empty() => default_port,
                None => return Err(UpstreamAddrParseError::InvalidPort),
            };
            return Ok(UpstreamAddr {
                host: host.to_string(),
                port,
            });
        }

        match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                if host.is_empty() {
                    return Err(UpstreamAddrParseError::EmptyHost);
                }
                let port = u16::from_str(port).map_err(|_| UpstreamAddrParseError::InvalidPort)?;
                Ok(UpstreamAddr {
                    host: host.to_string(),
                    port,
                })
            }
            _ => Ok(UpstreamAddr {
                host: s.to_string(),
                port: default_port,
            }),
        }
    }
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

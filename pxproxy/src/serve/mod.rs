/*
 * SPDX-License-Identifier: Apache-2.0
 */

mod error;
pub(crate) use error::{ServerTaskError, ServerTaskResult};

mod sniff_proxy;
pub use sniff_proxy::SniffProxyServer;

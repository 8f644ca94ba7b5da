/*
 * SPDX-License-Identifier: Apache-2.0
 */

mod stats;
pub(crate) use stats::ServerStats;

mod server;
pub use server::SniffProxyServer;

mod task;

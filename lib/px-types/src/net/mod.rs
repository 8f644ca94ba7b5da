/*
 * SPDX-License-Identifier: Apache-2.0
 */

mod upstream;
pub use upstream::{UpstreamAddr, UpstreamAddrParseError};

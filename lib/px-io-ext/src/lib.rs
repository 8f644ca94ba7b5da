/*
 * SPDX-License-Identifier: Apache-2.0
 */

mod stream;
pub use stream::{StreamCopy, StreamCopyConfig, StreamCopyError};

/*
 * SPDX-License-Identifier: Apache-2.0
 */

mod copy;
pub use copy::{StreamCopy, StreamCopyConfig, StreamCopyError};

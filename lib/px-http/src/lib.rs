/*
 * SPDX-License-Identifier: Apache-2.0
 */

mod header;
pub use header::{HttpHeaderEntry, HttpHeaderList};

mod event;
pub use event::{DecoderEvent, EventKinds, EventSink, OrderedEventBuffer, Publish};

pub mod decode;

mod bridge;
pub use bridge::MessageDecoderBridge;

pub mod frame;

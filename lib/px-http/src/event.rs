/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::VecDeque;

use bitflags::bitflags;
use bytes::Bytes;

bitflags! {
    /// Event kinds a decoder can emit for one message direction.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EventKinds: u8 {
        const HEADERS = 0b001;
        const BODY = 0b010;
        const COMPLETE = 0b100;
    }
}

/// One decoder callback, reified. `H` is the head type of the direction
/// (request or response).
#[derive(Debug, PartialEq, Eq)]
pub enum DecoderEvent<H> {
    Headers(H),
    Body(Bytes),
    Complete,
}

impl<H> DecoderEvent<H> {
    pub fn kind(&self) -> EventKinds {
        match self {
            DecoderEvent::Headers(_) => EventKinds::HEADERS,
            DecoderEvent::Body(_) => EventKinds::BODY,
            DecoderEvent::Complete => EventKinds::COMPLETE,
        }
    }
}

/// Where delivered events go. Blanket-implemented for closures, so call
/// sites can pass `&mut |ev| ...` without a named type.
pub trait EventSink<H> {
    fn deliver(&mut self, ev: DecoderEvent<H>);
}

impl<H, F> EventSink<H> for F
where
    F: FnMut(DecoderEvent<H>),
{
    fn deliver(&mut self, ev: DecoderEvent<H>) {
        self(ev)
    }
}

/// Outcome of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Delivered,
    Buffered,
}

/// Queue-and-replay event dispatch for a single message direction.
///
/// An event whose kind is currently audible is delivered to the sink right
/// away; anything else is queued in arrival order. When a kind becomes
/// audible, the queue is replayed from the head: delivery stops at the
/// first entry whose kind is still inaudible, so events are never
/// reordered or skipped. There is no interior locking; one instance
/// belongs to one task.
pub struct OrderedEventBuffer<H> {
    audible: EventKinds,
    queue: VecDeque<DecoderEvent<H>>,
}

impl<H> Default for OrderedEventBuffer<H> {
    fn default() -> Self {
        OrderedEventBuffer {
            audible: EventKinds::empty(),
            queue: VecDeque::new(),
        }
    }
}

impl<H> OrderedEventBuffer<H> {
    pub fn new() -> Self {
        OrderedEventBuffer::default()
    }

    #[inline]
    pub fn subscribed(&self) -> EventKinds {
        self.audible
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn publish(&mut self, ev: DecoderEvent<H>, sink: &mut dyn EventSink<H>) -> Publish {
        if self.audible.contains(ev.kind()) {
            sink.deliver(ev);
            Publish::Delivered
        } else {
            self.queue.push_back(ev);
            Publish::Buffered
        }
    }

    /// Make `kinds` audible and drain the maximal run of now-audible
    /// events from the queue head into `sink`.
    pub fn subscribe(&mut self, kinds: EventKinds, sink: &mut dyn EventSink<H>) {
        self.audible |= kinds;
        while let Some(ev) = self.queue.front() {
            if !self.audible.contains(ev.kind()) {
                break;
            }
            if let Some(ev) = self.queue.pop_front() {
                sink.deliver(ev);
            }
        }
    }
}

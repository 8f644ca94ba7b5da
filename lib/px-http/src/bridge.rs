/*
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::decode::{HttpDecodeError, HttpMessageDecode};
use crate::{EventKinds, EventSink, OrderedEventBuffer};

/// Couples one direction's decoder to an [`OrderedEventBuffer`], so that
/// everything the decoder raises flows through the queue-and-replay
/// discipline. A decode failure latches: the transaction must be aborted,
/// there is no resynchronization with the byte stream.
pub struct MessageDecoderBridge<D: HttpMessageDecode> {
    decoder: D,
    buffer: OrderedEventBuffer<D::Head>,
    dead: bool,
}

impl<D: HttpMessageDecode> MessageDecoderBridge<D> {
    pub fn new(decoder: D) -> Self {
        MessageDecoderBridge {
            decoder,
            buffer: OrderedEventBuffer::new(),
            dead: false,
        }
    }

    /// Feed bytes to the decoder and publish whatever it raised. Returns
    /// the number of bytes consumed; the remainder still belongs to the
    /// caller.
    pub fn execute(
        &mut self,
        data: &[u8],
        sink: &mut dyn EventSink<D::Head>,
    ) -> Result<usize, HttpDecodeError> {
        if self.dead {
            return Err(HttpDecodeError::Dead);
        }
        let mut events = Vec::new();
        match self.decoder.decode(data, &mut events) {
            Ok(n) => {
                for ev in events {
                    self.buffer.publish(ev, sink);
                }
                Ok(n)
            }
            Err(e) => {
                self.dead = true;
                Err(e)
            }
        }
    }

    /// Signal EOF to the decoder, publishing a final completion where the
    /// framing is EOF-delimited.
    pub fn finish(&mut self, sink: &mut dyn EventSink<D::Head>) -> Result<(), HttpDecodeError> {
        if self.dead {
            return Err(HttpDecodeError::Dead);
        }
        let mut events = Vec::new();
        match self.decoder.finish(&mut events) {
            Ok(()) => {
                for ev in events {
                    self.buffer.publish(ev, sink);
                }
                Ok(())
            }
            Err(e) => {
                self.dead = true;
                Err(e)
            }
        }
    }

    pub fn subscribe(&mut self, kinds: EventKinds, sink: &mut dyn EventSink<D::Head>) {
        self.buffer.subscribe(kinds, sink);
    }

    #[inline]
    pub fn message_done(&self) -> bool {
        self.decoder.message_done()
    }

    #[inline]
    pub fn pending_events(&self) -> usize {
        self.buffer.pending()
    }
}

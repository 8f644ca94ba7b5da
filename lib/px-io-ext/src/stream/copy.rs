/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const DEFAULT_COPY_BUFFER_SIZE: usize = 16 * 1024;
const MINIMAL_COPY_BUFFER_SIZE: usize = 4 * 1024;
const DEFAULT_COPY_YIELD_SIZE: usize = 1024 * 1024;
const MINIMAL_COPY_YIELD_SIZE: usize = 256 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StreamCopyConfig {
    buffer_size: usize,
    yield_size: usize,
}

impl Default for StreamCopyConfig {
    fn default() -> Self {
        StreamCopyConfig {
            buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            yield_size: DEFAULT_COPY_YIELD_SIZE,
        }
    }
}

impl StreamCopyConfig {
    pub fn set_buffer_size(&mut self, buffer_size: usize) {
        self.buffer_size = buffer_size.max(MINIMAL_COPY_BUFFER_SIZE);
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn set_yield_size(&mut self, yield_size: usize) {
        self.yield_size = yield_size.max(MINIMAL_COPY_YIELD_SIZE);
    }

    #[inline]
    pub fn yield_size(&self) -> usize {
        self.yield_size
    }
}

#[derive(Error, Debug)]
pub enum StreamCopyError {
    #[error("read failed: {0:?}")]
    ReadFailed(io::Error),
    #[error("write failed: {0:?}")]
    WriteFailed(io::Error),
}

struct CopyBuffer {
    buf: Box<[u8]>,
    // unwritten data lives in buf[w_off..r_off]
    r_off: usize,
    w_off: usize,
    read_done: bool,
    need_flush: bool,
    total_read: u64,
    total_write: u64,
    yield_size: usize,
}

impl CopyBuffer {
    fn new(config: &StreamCopyConfig) -> Self {
        CopyBuffer {
            buf: vec![0; config.buffer_size].into_boxed_slice(),
            r_off: 0,
            w_off: 0,
            read_done: false,
            need_flush: false,
            total_read: 0,
            total_write: 0,
            yield_size: config.yield_size,
        }
    }

    fn with_data(config: &StreamCopyConfig, mut data: Vec<u8>) -> Self {
        let r_off = data.len();
        if data.len() < config.buffer_size {
            data.resize(config.buffer_size, 0);
        }
        CopyBuffer {
            buf: data.into_boxed_slice(),
            r_off,
            w_off: 0,
            read_done: false,
            need_flush: false,
            total_read: 0,
            total_write: 0,
            yield_size: config.yield_size,
        }
    }

    fn poll_fill<R>(&mut self, cx: &mut Context<'_>, reader: Pin<&mut R>) -> Poll<io::Result<()>>
    where
        R: AsyncRead + ?Sized,
    {
        let mut read_buf = ReadBuf::new(&mut self.buf[self.r_off..]);
        ready!(reader.poll_read(cx, &mut read_buf))?;
        let nr = read_buf.filled().len();
        if nr == 0 {
            self.read_done = true;
        } else {
            self.r_off += nr;
            self.total_read += nr as u64;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_copy<R, W>(
        &mut self,
        cx: &mut Context<'_>,
        mut reader: Pin<&mut R>,
        mut writer: Pin<&mut W>,
    ) -> Poll<Result<u64, StreamCopyError>>
    where
        R: AsyncRead + ?Sized,
        W: AsyncWrite + ?Sized,
    {
        let mut copy_this_round = 0usize;
        loop {
            // reclaim space first, a fully drained or tail-full buffer must
            // reset before the fill gate below
            if self.w_off == self.r_off {
                self.w_off = 0;
                self.r_off = 0;
            } else if self.r_off == self.buf.len() && self.w_off > 0 {
                self.buf.copy_within(self.w_off..self.r_off, 0);
                self.r_off -= self.w_off;
                self.w_off = 0;
            }

            if !self.read_done && self.r_off < self.buf.len() {
                match self.poll_fill(cx, reader.as_mut()) {
                    Poll::Ready(Ok(_)) => {}
                    Poll::Ready(Err(e)) => {
                        return Poll::Ready(Err(StreamCopyError::ReadFailed(e)));
                    }
                    Poll::Pending => {
                        if self.w_off >= self.r_off {
                            // all written out, safe to flush before parking
                            if self.need_flush {
                                self.need_flush = false;
                                ready!(writer.as_mut().poll_flush(cx))
                                    .map_err(StreamCopyError::WriteFailed)?;
                            }
                            return Poll::Pending;
                        }
                    }
                }
            }

            while self.w_off < self.r_off {
                let nw = ready!(writer.as_mut().poll_write(cx, &self.buf[self.w_off..self.r_off]))
                    .map_err(StreamCopyError::WriteFailed)?;
                if nw == 0 {
                    return Poll::Ready(Err(StreamCopyError::WriteFailed(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write zero byte into writer",
                    ))));
                }
                self.w_off += nw;
                self.total_write += nw as u64;
                self.need_flush = true;
                copy_this_round += nw;
            }

            if self.read_done {
                if self.need_flush {
                    ready!(writer.as_mut().poll_flush(cx)).map_err(StreamCopyError::WriteFailed)?;
                }
                return Poll::Ready(Ok(self.total_write));
            }

            if copy_this_round >= self.yield_size {
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
        }
    }
}

/// Backpressure-aware one-way copy between two borrowed stream halves.
/// Reads ahead at most one buffer of data, so a stalled writer stalls the
/// reader instead of growing memory without bound.
pub struct StreamCopy<'a, R: ?Sized, W: ?Sized> {
    reader: &'a mut R,
    writer: &'a mut W,
    buf: CopyBuffer,
}

impl<'a, R, W> StreamCopy<'a, R, W>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    pub fn new(reader: &'a mut R, writer: &'a mut W, config: &StreamCopyConfig) -> Self {
        StreamCopy {
            reader,
            writer,
            buf: CopyBuffer::new(config),
        }
    }

    /// Start with `data` already pending for the writer, for bytes that
    /// were read from the reader before the copy was set up.
    pub fn with_data(
        reader: &'a mut R,
        writer: &'a mut W,
        config: &StreamCopyConfig,
        data: Vec<u8>,
    ) -> Self {
        StreamCopy {
            reader,
            writer,
            buf: CopyBuffer::with_data(config, data),
        }
    }

    pub fn writer(&mut self) -> &mut W {
        self.writer
    }

    #[inline]
    pub fn read_size(&self) -> u64 {
        self.buf.total_read
    }

    #[inline]
    pub fn copied_size(&self) -> u64 {
        self.buf.total_write
    }
}

impl<R, W> Future for StreamCopy<'_, R, W>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    type Output = Result<u64, StreamCopyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<u64, StreamCopyError>> {
        let me = &mut *self;
        me.buf
            .poll_copy(cx, Pin::new(&mut *me.reader), Pin::new(&mut *me.writer))
    }
}

//! Byte-counting reader
//!
//! Wraps the response body of a transfer so every byte read is added to the
//! shared [`RateMeter`]. Content, errors and end-of-stream pass through
//! untouched.

use crate::engine::rate_meter::RateMeter;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// An `AsyncRead` that reports the size of every read to a meter
pub struct MeteringStream<R> {
    inner: R,
    meter: RateMeter,
    total: u64,
}

impl<R> MeteringStream<R> {
    pub fn new(inner: R, meter: RateMeter) -> Self {
        Self {
            inner,
            meter,
            total: 0,
        }
    }

    /// Bytes read through this stream so far
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for MeteringStream<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let n = buf.filled().len() - before;
            if n > 0 {
                this.total += n as u64;
                this.meter.add(n as i64);
            }
        }
        poll
    }
}

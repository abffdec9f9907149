//! Tie the lifetime of secondary resources to a primary stream.
//!
//! A [`GroupedStream`] forwards every stream operation to its primary
//! stream. Releasing it releases the primary first, then each secondary
//! resource in order. A secondary that fails or panics while releasing is
//! logged and skipped; it neither stops the remaining releases nor replaces the
//! primary's outcome.

use std::io::{self, IoSlice, Read, Seek, SeekFrom, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{error, warn};

/// Something with a fallible, explicit release step.
pub trait Release {
    fn release(&mut self) -> anyhow::Result<()>;
}

impl<T: Release + ?Sized> Release for Box<T> {
    fn release(&mut self) -> anyhow::Result<()> {
        (**self).release()
    }
}

impl<T> Release for io::Cursor<T> {
    fn release(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A secondary resource owned by a [`GroupedStream`].
pub type Resource = Box<dyn Release + Send>;

/// [`Release`] adaptor running a closure once.
pub struct ReleaseFn<F>(Option<F>);

pub fn release_fn<F>(f: F) -> ReleaseFn<F>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    ReleaseFn(Some(f))
}

impl<F> Release for ReleaseFn<F>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    fn release(&mut self) -> anyhow::Result<()> {
        match self.0.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

/// A stream that releases a set of secondary resources along with itself.
pub struct GroupedStream<S: Release> {
    stream: S,
    resources: Vec<Resource>,
    released: bool,
}

/// Wrap `stream` so that releasing it also releases `resources`, in order.
pub fn release_together<S: Release>(stream: S, resources: Vec<Resource>) -> GroupedStream<S> {
    GroupedStream {
        stream,
        resources,
        released: false,
    }
}

impl<S: Release> GroupedStream<S> {
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Release the primary stream and then every secondary resource.
    ///
    /// Returns the primary stream's release outcome. Dropping the wrapper
    /// without calling this performs the same sequence.
    pub fn release(mut self) -> anyhow::Result<()> {
        self.release_all()
    }

    fn release_all(&mut self) -> anyhow::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let primary = self.stream.release();
        for (index, resource) in self.resources.iter_mut().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| resource.release())) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(index, error = %err, "failed to release resource grouped with stream");
                }
                Err(_) => {
                    error!(index, "resource grouped with stream panicked during release");
                }
            }
        }
        primary
    }
}

impl<S: Release> Drop for GroupedStream<S> {
    fn drop(&mut self) {
        if let Err(err) = self.release_all() {
            warn!(error = %err, "grouped stream release failed during drop");
        }
    }
}

// ── Pass-through to the primary stream ─────────────────────────────

impl<S: Release + Read> Read for GroupedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<S: Release + Write> Write for GroupedStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.stream.write_vectored(bufs)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl<S: Release + Seek> Seek for GroupedStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.stream.seek(pos)
    }
}

impl<S: Release + AsyncRead + Unpin> AsyncRead for GroupedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl<S: Release + AsyncWrite + Unpin> AsyncWrite for GroupedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

//! Chunked async copy from a source stream to a destination stream.
//!
//! [`Pump`] is a hand-driven state machine rather than a wrapper around
//! `tokio::io::copy`: one buffer is allocated up front and reused for the
//! whole transfer, and a read is only issued once the previous chunk has
//! been fully written. At no point are a read and a write outstanding
//! together, so the source and destination may share an underlying
//! resource.
//!
//! Each step re-enters the state machine from `poll`, so the depth of the
//! call stack does not grow with the length of the source.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::debug;

use crate::error::PumpError;

/// Size of the buffer reused for every read/write step.
pub const PUMP_BUFFER_SIZE: usize = 4096;

type CancelSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Reading,
    Writing { filled: usize, written: usize },
    Flushing,
    Done,
}

/// Future returned by [`pump`]. Resolves to the number of bytes copied.
pub struct Pump<R, W> {
    source: R,
    destination: W,
    buf: Box<[u8]>,
    state: State,
    transferred: u64,
    cancel: Option<CancelSignal>,
}

/// Copy everything remaining in `source` into `destination`.
///
/// The returned future completes once a read yields zero bytes and the
/// destination has been flushed. A read fault resolves to
/// [`PumpError::Read`]; a write fault resolves to [`PumpError::Write`] and
/// no further read is issued.
pub fn pump<R, W>(source: R, destination: W) -> Pump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    Pump {
        source,
        destination,
        buf: vec![0u8; PUMP_BUFFER_SIZE].into_boxed_slice(),
        state: State::Reading,
        transferred: 0,
        cancel: None,
    }
}

impl<R, W> Pump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Replace the transfer buffer. Only meaningful before the first poll.
    ///
    /// A size of zero is raised to one byte.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buf = vec![0u8; size.max(1)].into_boxed_slice();
        self
    }

    /// Resolve with [`PumpError::Canceled`] once `signal` completes.
    ///
    /// The signal is checked before every read and every write. An
    /// in-flight step is abandoned, never retried.
    pub fn cancel_on<F>(mut self, signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel = Some(Box::pin(signal));
        self
    }

    /// Bytes written to the destination so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    fn finish(&mut self, result: Result<u64, PumpError>) -> Poll<Result<u64, PumpError>> {
        self.state = State::Done;
        self.cancel = None;
        Poll::Ready(result)
    }
}

impl<R, W> Future for Pump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    type Output = Result<u64, PumpError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            if let Some(signal) = this.cancel.as_mut() {
                if signal.as_mut().poll(cx).is_ready() {
                    debug!(bytes = this.transferred, "stream pump canceled");
                    return this.finish(Err(PumpError::Canceled));
                }
            }

            match this.state {
                State::Reading => {
                    let mut read_buf = ReadBuf::new(&mut this.buf);
                    if let Err(e) = ready!(Pin::new(&mut this.source).poll_read(cx, &mut read_buf)) {
                        return this.finish(Err(PumpError::Read(e)));
                    }
                    let filled = read_buf.filled().len();
                    this.state = if filled == 0 {
                        State::Flushing
                    } else {
                        State::Writing { filled, written: 0 }
                    };
                }
                State::Writing { filled, written } => {
                    let chunk = &this.buf[written..filled];
                    let n = match ready!(Pin::new(&mut this.destination).poll_write(cx, chunk)) {
                        Ok(0) => {
                            return this.finish(Err(PumpError::Write(io::Error::new(
                                io::ErrorKind::WriteZero,
                                "destination accepted zero bytes",
                            ))));
                        }
                        Ok(n) => n,
                        Err(e) => return this.finish(Err(PumpError::Write(e))),
                    };
                    this.transferred += n as u64;
                    let written = written + n;
                    this.state = if written == filled {
                        State::Reading
                    } else {
                        State::Writing { filled, written }
                    };
                }
                State::Flushing => {
                    if let Err(e) = ready!(Pin::new(&mut this.destination).poll_flush(cx)) {
                        return this.finish(Err(PumpError::Write(e)));
                    }
                    debug!(bytes = this.transferred, "stream pump finished");
                    let transferred = this.transferred;
                    return this.finish(Ok(transferred));
                }
                State::Done => return Poll::Ready(Ok(this.transferred)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Destination that records the size of every write it receives.
    #[derive(Default)]
    struct RecordingWriter {
        data: Vec<u8>,
        writes: Vec<usize>,
        flushed: bool,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.data.extend_from_slice(buf);
            this.writes.push(buf.len());
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.get_mut().flushed = true;
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Source that counts reads and serves `data`.
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            this.reads.fetch_add(1, Ordering::SeqCst);
            Pin::new(&mut this.inner).poll_read(cx, buf)
        }
    }

    struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn pump_len(len: usize) -> RecordingWriter {
        let source = pattern(len);
        let mut dest = RecordingWriter::default();
        let copied = pump(Cursor::new(source.clone()), &mut dest).await.unwrap();
        assert_eq!(copied, len as u64);
        assert_eq!(dest.data, source);
        assert!(dest.flushed);
        dest
    }

    #[tokio::test]
    async fn copies_exactly_for_boundary_lengths() {
        for len in [
            0,
            1,
            PUMP_BUFFER_SIZE - 1,
            PUMP_BUFFER_SIZE,
            PUMP_BUFFER_SIZE * 3,
            PUMP_BUFFER_SIZE * 2 + 17,
        ] {
            pump_len(len).await;
        }
    }

    #[tokio::test]
    async fn ten_thousand_bytes_take_three_steps() {
        let dest = pump_len(10_000).await;
        assert_eq!(dest.writes, vec![4096, 4096, 1808]);
    }

    #[tokio::test]
    async fn empty_source_reads_once_and_never_writes() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = CountingReader {
            inner: Cursor::new(Vec::new()),
            reads: reads.clone(),
        };
        let mut dest = RecordingWriter::default();

        let copied = pump(source, &mut dest).await.unwrap();

        assert_eq!(copied, 0);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(dest.writes.is_empty());
    }

    #[tokio::test]
    async fn write_fault_stops_further_reads() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = CountingReader {
            inner: Cursor::new(pattern(PUMP_BUFFER_SIZE * 4)),
            reads: reads.clone(),
        };

        let err = pump(source, FailingWriter).await.unwrap_err();

        assert!(matches!(err, PumpError::Write(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_fault_resolves_as_read_error() {
        let mut dest = RecordingWriter::default();
        let err = pump(FailingReader, &mut dest).await.unwrap_err();
        assert!(matches!(err, PumpError::Read(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
        assert!(dest.writes.is_empty());
    }

    #[tokio::test]
    async fn custom_buffer_size_sets_step_size() {
        let mut dest = RecordingWriter::default();
        pump(Cursor::new(pattern(10)), &mut dest)
            .with_buffer_size(4)
            .await
            .unwrap();
        assert_eq!(dest.writes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn zero_buffer_size_still_copies() {
        let mut dest = RecordingWriter::default();
        pump(Cursor::new(pattern(3)), &mut dest)
            .with_buffer_size(0)
            .await
            .unwrap();
        assert_eq!(dest.writes, vec![1, 1, 1]);
        assert_eq!(dest.data, pattern(3));
    }

    /// Destination that never accepts a write.
    struct StalledWriter {
        attempts: Arc<AtomicUsize>,
    }

    impl AsyncWrite for StalledWriter {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn cancel_while_destination_is_pending() {
        let reads = Arc::new(AtomicUsize::new(0));
        let attempts = Arc::new(AtomicUsize::new(0));
        let source = CountingReader {
            inner: Cursor::new(pattern(100)),
            reads: reads.clone(),
        };
        let dest = StalledWriter {
            attempts: attempts.clone(),
        };
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            pump(source, dest)
                .cancel_on(async move {
                    let _ = rx.await;
                })
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        tx.send(()).unwrap();
        let result = task.await.unwrap();

        assert!(matches!(result, Err(PumpError::Canceled)));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(attempts.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn fired_signal_cancels_before_first_read() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = CountingReader {
            inner: Cursor::new(pattern(100)),
            reads: reads.clone(),
        };
        let mut dest = RecordingWriter::default();

        let err = pump(source, &mut dest)
            .cancel_on(std::future::ready(()))
            .await
            .unwrap_err();

        assert!(matches!(err, PumpError::Canceled));
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_while_source_is_pending() {
        let (_writer_half, reader_half) = tokio::io::duplex(64);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut dest = Vec::new();
            let result = pump(reader_half, &mut dest)
                .cancel_on(async move {
                    let _ = rx.await;
                })
                .await;
            (result, dest)
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        tx.send(()).unwrap();
        let (result, dest) = task.await.unwrap();
        assert!(matches!(result, Err(PumpError::Canceled)));
        assert!(dest.is_empty());
    }

    #[tokio::test]
    async fn pumps_through_duplex_pipe() {
        let (mut client, server) = tokio::io::duplex(1024);
        let payload = pattern(50_000);
        let expected = payload.clone();

        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(&payload).await.unwrap();
            client.shutdown().await.unwrap();
        });

        let mut dest = Vec::new();
        let copied = pump(server, &mut dest).await.unwrap();
        writer.await.unwrap();

        assert_eq!(copied, expected.len() as u64);
        assert_eq!(dest, expected);
    }
}

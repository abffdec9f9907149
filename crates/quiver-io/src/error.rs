use std::io;

use thiserror::Error;

/// Result type alias for blocking stream reads.
pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream ended before the requested number of bytes arrived.
    #[error("unexpected end of stream: expected {expected} bytes, got {read}")]
    UnexpectedEof { expected: usize, read: usize },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Why a [`Pump`](crate::Pump) stopped before the source was exhausted.
#[derive(Debug, Error)]
pub enum PumpError {
    #[error("read from source failed: {0}")]
    Read(#[source] io::Error),

    #[error("write to destination failed: {0}")]
    Write(#[source] io::Error),

    #[error("stream pump canceled")]
    Canceled,
}

impl From<PumpError> for io::Error {
    fn from(err: PumpError) -> Self {
        match err {
            PumpError::Read(e) | PumpError::Write(e) => e,
            PumpError::Canceled => io::Error::other("stream pump canceled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_pump_is_not_a_retryable_io_error() {
        let err = io::Error::from(PumpError::Canceled);
        assert_ne!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn read_and_write_faults_keep_their_kind() {
        let err = io::Error::from(PumpError::Write(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "closed",
        )));
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}

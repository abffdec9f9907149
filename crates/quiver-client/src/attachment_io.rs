//! Move attachment bodies between async streams and a client.

use bytes::Bytes;
use quiver_core::{CommandError, CommandResult, Etag, Metadata};
use quiver_io::{PumpError, pump};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::contract::AsyncDatabaseCommands;

/// Drain `source` and store it as the attachment `key`.
///
/// Returns the attachment's new etag.
pub async fn upload_attachment<R>(
    client: &dyn AsyncDatabaseCommands,
    key: &str,
    etag: Option<Etag>,
    source: R,
    metadata: &Metadata,
) -> CommandResult<Etag>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    let bytes = pump(source, &mut body).await.map_err(pump_fault)?;
    debug!(key, bytes, "attachment body buffered for upload");
    client
        .put_attachment(key, etag, Bytes::from(body), metadata)
        .await
}

/// Write the body of attachment `key` to `destination`.
///
/// Returns the number of bytes written, or `None` when there is no such
/// attachment.
pub async fn download_attachment<W>(
    client: &dyn AsyncDatabaseCommands,
    key: &str,
    destination: W,
) -> CommandResult<Option<u64>>
where
    W: AsyncWrite + Unpin,
{
    let Some(attachment) = client.get_attachment(key).await? else {
        return Ok(None);
    };
    let bytes = pump(attachment.data.as_ref(), destination)
        .await
        .map_err(pump_fault)?;
    Ok(Some(bytes))
}

fn pump_fault(err: PumpError) -> CommandError {
    match err {
        PumpError::Canceled => CommandError::Canceled,
        other => CommandError::Io(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use quiver_embedded::EmbeddedDatabase;
    use tokio::io::ReadBuf;

    use crate::embedded::EmbeddedAsyncClient;

    fn client() -> EmbeddedAsyncClient {
        EmbeddedAsyncClient::new(Arc::new(EmbeddedDatabase::open_in_memory().unwrap()))
    }

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "socket closed")))
        }
    }

    #[tokio::test]
    async fn upload_then_download() {
        let client = client();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let etag = upload_attachment(&client, "images/1", None, payload.as_slice(), &Metadata::new())
            .await
            .unwrap();

        let mut out = Vec::new();
        let written = download_attachment(&client, "images/1", &mut out)
            .await
            .unwrap();
        assert_eq!(written, Some(payload.len() as u64));
        assert_eq!(out, payload);

        let stored = client.get_attachment("images/1").await.unwrap().unwrap();
        assert_eq!(stored.etag, etag);
    }

    #[tokio::test]
    async fn download_of_missing_attachment_is_none() {
        let client = client();
        let mut out = Vec::new();
        assert_eq!(
            download_attachment(&client, "images/404", &mut out).await.unwrap(),
            None
        );
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn read_fault_aborts_upload() {
        let client = client();
        let err = upload_attachment(&client, "images/2", None, BrokenReader, &Metadata::new())
            .await
            .unwrap_err();
        match err {
            CommandError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other}"),
        }
        assert!(client.get_attachment("images/2").await.unwrap().is_none());
    }

    #[test]
    fn canceled_pump_maps_to_canceled() {
        assert!(matches!(pump_fault(PumpError::Canceled), CommandError::Canceled));
    }
}

//! Message Transport
//!
//! One request/response exchange per stream: each direction carries a single
//! length-prefixed frame, and the stream is closed after the response.

use bytes::Bytes;
use futures::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use futures::{SinkExt, StreamExt};
use std::io;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::compat::{FuturesAsyncReadCompatExt, FuturesAsyncWriteCompatExt};

/// Default upper bound for a single framed message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

fn codec(max_message_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_message_size)
        .new_codec()
}

/// Write one framed message.
pub async fn write_message<S>(stream: &mut S, payload: &[u8], max_message_size: usize) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut framed = FramedWrite::new((&mut *stream).compat_write(), codec(max_message_size));
    framed.send(Bytes::copy_from_slice(payload)).await
}

/// Read one framed message. A stream that ends before a full frame arrived
/// (including a reset by the remote) is an error.
pub async fn read_message<S>(stream: &mut S, max_message_size: usize) -> io::Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new((&mut *stream).compat(), codec(max_message_size));
    match framed.next().await {
        Some(Ok(frame)) => Ok(frame.freeze()),
        Some(Err(e)) => Err(e),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream closed before a message was received",
        )),
    }
}

/// Client side of a single exchange: write the request, block for the full
/// response, then close the stream.
pub async fn exchange<S>(mut stream: S, request: &[u8], max_message_size: usize) -> io::Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_message(&mut stream, request, max_message_size).await?;
    let response = read_message(&mut stream, max_message_size).await?;
    // The response is complete; a failed close does not invalidate it.
    let _ = stream.close().await;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::compat::TokioAsyncReadCompatExt;

    #[tokio::test]
    async fn test_exchange_roundtrip() {
        let (client, server) = tokio::io::duplex(1024);
        let server = tokio::spawn(async move {
            let mut server = server.compat();
            let request = read_message(&mut server, DEFAULT_MAX_MESSAGE_SIZE).await.unwrap();
            assert_eq!(&request[..], b"web-frontend");
            write_message(&mut server, b"pong", DEFAULT_MAX_MESSAGE_SIZE)
                .await
                .unwrap();
        });

        let response = exchange(client.compat(), b"web-frontend", DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap();
        assert_eq!(&response[..], b"pong");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_message_is_delimited() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = client.compat();
        let mut server = server.compat();

        write_message(&mut client, b"", DEFAULT_MAX_MESSAGE_SIZE).await.unwrap();
        let message = read_message(&mut server, DEFAULT_MAX_MESSAGE_SIZE).await.unwrap();
        assert!(message.is_empty());
    }

    #[tokio::test]
    async fn test_read_fails_when_peer_closes_without_reply() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);

        let err = exchange(client.compat(), b"request", DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe
        ));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (client, _server) = tokio::io::duplex(1024);
        let mut client = client.compat();
        let err = write_message(&mut client, &[0u8; 64], 16).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

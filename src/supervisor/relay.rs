//! Byte-for-byte stream passthrough between the launcher and the server.
//!
//! The server speaks MCP over its stdio, so nothing here may buffer across
//! writes, reorder or touch the bytes: every chunk read is written and
//! flushed before the next read.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;
pub type InputSource = Box<dyn AsyncRead + Send + Unpin>;

const CHUNK_SIZE: usize = 8 * 1024;

/// Copy `reader` into `writer` until EOF. Returns the number of bytes moved.
/// The writer is dropped on return, which closes pipes such as a child stdin.
pub async fn pump<R, W>(mut reader: R, mut writer: W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }
    writer.shutdown().await?;
    Ok(total)
}

/// [`pump`] as a background task body; failures only end the relay.
pub(crate) async fn relay<R, W>(label: &'static str, reader: R, writer: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match pump(reader, writer).await {
        Ok(n) => tracing::debug!("{} relay closed after {} bytes", label, n),
        Err(e) => tracing::debug!("{} relay stopped: {}", label, e),
    }
}

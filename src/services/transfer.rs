//! Chunked file transfer over a connection, independent of command
//! semantics. Bodies are streamed in CHUNK_SIZE pieces; a whole file is
//! never held in memory.

use crate::error::{AppResult, DomainError};
use crate::proto::CHUNK_SIZE;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Stream exactly `size` bytes of the file at `path` to the peer. The size
/// was stat'ed once by the caller; a short read from the filesystem (file
/// shrunk mid-transfer) is a fatal transfer error.
pub async fn send_file<W>(writer: &mut W, path: &Path, size: u64) -> AppResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;

    while sent < size {
        let want = CHUNK_SIZE.min((size - sent) as usize);
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(DomainError::ConnectionBroken(format!(
                "file truncated at {sent} of {size} bytes"
            )));
        }
        writer.write_all(&buf[..n]).await?;
        sent += n as u64;
        tracing::trace!(chunk = n, sent, size, "sent chunk");
    }
    writer.flush().await?;
    Ok(sent)
}

/// Receive exactly `expected` bytes from the peer into the file at `path`.
/// A zero-length read before `expected` bytes arrived means the peer went
/// away; the partial file is NOT complete and the caller must not treat it
/// as such.
pub async fn receive_file<R>(reader: &mut R, path: &Path, expected: u64) -> AppResult<u64>
where
    R: AsyncRead + Unpin,
{
    let mut file = tokio::fs::File::create(path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;

    while received < expected {
        let want = CHUNK_SIZE.min((expected - received) as usize);
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(DomainError::ConnectionBroken(format!(
                "peer closed at {received} of {expected} bytes"
            )));
        }
        file.write_all(&buf[..n]).await?;
        received += n as u64;
        tracing::trace!(chunk = n, received, expected, "received chunk");
    }
    file.flush().await?;
    Ok(received)
}

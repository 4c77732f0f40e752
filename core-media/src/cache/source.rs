//! Cache inputs and the chunked copy loop shared by every strategy.

use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;

use bridge_traits::{ByteReader, FileSystemAccess};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{MediaError, Result};
use crate::progress::Progress;

/// Where the bytes to cache come from. All variants produce the same end
/// state.
pub enum CacheSource {
    /// Bytes already in memory.
    Bytes(Bytes),
    /// An arbitrary async reader. Without `total_len` no progress can be
    /// computed, so none is reported.
    Reader {
        reader: ByteReader,
        total_len: Option<u64>,
    },
    /// A file reachable through the configured [`FileSystemAccess`].
    Path(PathBuf),
}

impl CacheSource {
    pub fn reader(reader: ByteReader, total_len: Option<u64>) -> Self {
        CacheSource::Reader { reader, total_len }
    }

    /// Reject sources that can never succeed before any state changes.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            CacheSource::Path(path) if path.as_os_str().is_empty() => Err(
                MediaError::Validation("cache source path is empty".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Open for reading. Returns the reader and the total length when known.
    pub(crate) async fn open(
        self,
        fs: &dyn FileSystemAccess,
    ) -> Result<(ByteReader, Option<u64>)> {
        match self {
            CacheSource::Bytes(bytes) => {
                let len = bytes.len() as u64;
                Ok((Box::new(Cursor::new(bytes)), Some(len)))
            }
            CacheSource::Reader { reader, total_len } => Ok((reader, total_len)),
            CacheSource::Path(path) => {
                if !fs.exists(&path).await? {
                    return Err(MediaError::Validation(format!(
                        "cache source {} does not exist",
                        path.display()
                    )));
                }
                let meta = fs.metadata(&path).await?;
                if meta.is_directory {
                    return Err(MediaError::Validation(format!(
                        "cache source {} is a directory",
                        path.display()
                    )));
                }
                let reader = fs.open_read_stream(&path).await?;
                Ok((reader, Some(meta.size)))
            }
        }
    }
}

impl fmt::Debug for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheSource::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            CacheSource::Reader { total_len, .. } => f
                .debug_struct("Reader")
                .field("total_len", total_len)
                .finish_non_exhaustive(),
            CacheSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
        }
    }
}

impl From<Bytes> for CacheSource {
    fn from(bytes: Bytes) -> Self {
        CacheSource::Bytes(bytes)
    }
}

impl From<PathBuf> for CacheSource {
    fn from(path: PathBuf) -> Self {
        CacheSource::Path(path)
    }
}

/// Copy `reader` into `writer` in `chunk_size` pieces.
///
/// Progress is advanced after every chunk and cancellation is checked before
/// each read. The writer is flushed and shut down on success only.
pub(crate) async fn copy_chunked<W>(
    reader: &mut ByteReader,
    total_len: Option<u64>,
    writer: &mut W,
    chunk_size: usize,
    progress: &Progress,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut written: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MediaError::Cancelled),
            read = reader.read(&mut buf) => read?,
        };
        if n == 0 {
            break;
        }

        writer.write_all(&buf[..n]).await?;
        written += n as u64;

        if let Some(total) = total_len.filter(|t| *t > 0) {
            progress.advance(written as f64 / total as f64);
        }
    }

    writer.flush().await?;
    writer.shutdown().await?;
    progress.advance(1.0);
    Ok(written)
}

use axum::body::Body as AxumBody;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Bodies up to this size stay in memory; larger uploads spill to disk.
const SPOOL_THRESHOLD_BYTES: usize = 2 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("failed to read request body: {0}")]
    Read(String),

    #[error("request body exceeds limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("failed to spool request body: {0}")]
    Spool(#[from] std::io::Error),
}

/// A fully-received request body that can be replayed once per failover
/// attempt. Large uploads are spooled to a request-scoped temporary file,
/// which the OS reclaims when the buffer drops on any exit path.
#[derive(Debug)]
pub enum BufferedBody {
    Memory(Bytes),
    Spooled { file: NamedTempFile, len: u64 },
}

impl BufferedBody {
    pub async fn buffer(body: AxumBody, limit: u64) -> Result<Self, BufferError> {
        let mut stream = body.into_data_stream();
        let mut in_memory = BytesMut::new();
        let mut spool: Option<(NamedTempFile, tokio::fs::File)> = None;
        let mut total: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| BufferError::Read(err.to_string()))?;
            total += chunk.len() as u64;
            if total > limit {
                return Err(BufferError::TooLarge { limit });
            }
            match &mut spool {
                Some((_, file)) => file.write_all(&chunk).await?,
                None => {
                    in_memory.extend_from_slice(&chunk);
                    if in_memory.len() > SPOOL_THRESHOLD_BYTES {
                        let named = NamedTempFile::new()?;
                        let mut file = tokio::fs::File::from_std(named.reopen()?);
                        file.write_all(&in_memory).await?;
                        in_memory = BytesMut::new();
                        spool = Some((named, file));
                    }
                }
            }
        }

        match spool {
            Some((named, mut file)) => {
                file.flush().await?;
                Ok(BufferedBody::Spooled {
                    file: named,
                    len: total,
                })
            }
            None => Ok(BufferedBody::Memory(in_memory.freeze())),
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            BufferedBody::Memory(bytes) => bytes.len() as u64,
            BufferedBody::Spooled { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A fresh body reading this buffer from the start.
    pub fn to_body(&self) -> Result<AxumBody, BufferError> {
        match self {
            BufferedBody::Memory(bytes) => Ok(AxumBody::from(bytes.clone())),
            BufferedBody::Spooled { file, .. } => {
                let reader = tokio::fs::File::from_std(file.reopen()?);
                Ok(AxumBody::from_stream(ReaderStream::new(reader)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn collect(body: AxumBody) -> Bytes {
        body.collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_small_body_stays_in_memory() {
        let buffered = BufferedBody::buffer(AxumBody::from("hello"), 1024)
            .await
            .unwrap();
        assert!(matches!(buffered, BufferedBody::Memory(_)));
        assert_eq!(buffered.len(), 5);
        assert_eq!(&collect(buffered.to_body().unwrap()).await[..], b"hello");
    }

    #[tokio::test]
    async fn test_empty_body() {
        let buffered = BufferedBody::buffer(AxumBody::empty(), 1024).await.unwrap();
        assert!(buffered.is_empty());
        assert!(collect(buffered.to_body().unwrap()).await.is_empty());
    }

    #[tokio::test]
    async fn test_large_body_spools_to_disk() {
        let payload = vec![0x5a_u8; SPOOL_THRESHOLD_BYTES + 4096];
        let buffered = BufferedBody::buffer(AxumBody::from(payload.clone()), u64::MAX)
            .await
            .unwrap();
        assert!(matches!(buffered, BufferedBody::Spooled { .. }));
        assert_eq!(buffered.len(), payload.len() as u64);
        assert_eq!(&collect(buffered.to_body().unwrap()).await[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_spooled_body_replays_repeatedly() {
        let payload = vec![0xa5_u8; SPOOL_THRESHOLD_BYTES + 1];
        let buffered = BufferedBody::buffer(AxumBody::from(payload.clone()), u64::MAX)
            .await
            .unwrap();
        for _ in 0..3 {
            assert_eq!(
                collect(buffered.to_body().unwrap()).await.len(),
                payload.len()
            );
        }
    }

    #[tokio::test]
    async fn test_limit_enforced() {
        let err = BufferedBody::buffer(AxumBody::from(vec![0_u8; 100]), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, BufferError::TooLarge { limit: 10 }));
    }
}

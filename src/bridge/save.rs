//! Value buffer persistence.

use bytes::{BufMut, Bytes, BytesMut};
use std::path::Path;

use crate::error::AppResult;

/// Encode `values` as consecutive little-endian u32 words.
pub fn encode_u32_le(values: &[u32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * 4);
    for &value in values {
        buf.put_u32_le(value);
    }
    buf.freeze()
}

/// Write `values` to `path`, replacing any existing file.
pub async fn save_buffer(path: impl AsRef<Path>, values: &[u32]) -> AppResult<()> {
    tokio::fs::write(path, encode_u32_le(values)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_are_little_endian() {
        let encoded = encode_u32_le(&[1, 0x0102_0304]);
        assert_eq!(encoded.as_ref(), &[1, 0, 0, 0, 4, 3, 2, 1]);
        assert!(encode_u32_le(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_save_buffer_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.dat");
        save_buffer(&path, &[7, 8]).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![7, 0, 0, 0, 8, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_save_buffer_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("counts.dat");
        assert!(save_buffer(&path, &[1]).await.is_err());
    }
}

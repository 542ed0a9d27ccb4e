//! Newline-delimited JSON framing.
//!
//! # Responsibilities
//! - Read one JSON value per line, bounded by a maximum frame size
//! - Write one JSON value per line and flush
//!
//! # Design Decisions
//! - Oversized frames are rejected before being parsed (early rejection)
//! - Blank lines are ignored
//! - EOF between frames is a clean close; EOF inside a frame is an error
//! - Reading is cancel safe, so a reader can sit in a `select!` loop

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Error type for frame encoding and decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("connection closed mid-frame")]
    Truncated,
}

/// Reads frames from a byte stream.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_frame_bytes: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_frame_bytes,
            buf: Vec::new(),
        }
    }

    /// Read the next frame. `Ok(None)` means the peer closed cleanly.
    ///
    /// Cancel safe: bytes of a partially read frame stay buffered and the
    /// next call continues where the cancelled one stopped.
    pub async fn next_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        loop {
            if self.buf.last() != Some(&b'\n') {
                let limit = (self.max_frame_bytes as u64 + 1).saturating_sub(self.buf.len() as u64);
                let n = (&mut self.inner)
                    .take(limit)
                    .read_until(b'\n', &mut self.buf)
                    .await?;
                if self.buf.last() != Some(&b'\n') {
                    if self.buf.len() > self.max_frame_bytes {
                        return Err(CodecError::FrameTooLarge {
                            limit: self.max_frame_bytes,
                        });
                    }
                    if n == 0 && self.buf.is_empty() {
                        return Ok(None);
                    }
                    if n == 0 {
                        return Err(CodecError::Truncated);
                    }
                    continue;
                }
            }

            let frame = std::mem::take(&mut self.buf);
            let line = trim_line(&frame);
            if line.is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_slice(line)?));
        }
    }
}

/// Writes frames to a byte stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send<T: Serialize>(&mut self, frame: &T) -> Result<(), CodecError> {
        let mut bytes = serde_json::to_vec(frame)?;
        bytes.push(b'\n');
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

fn trim_line(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r' | b' ' | b'\t') {
        end -= 1;
    }
    &buf[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::message::Request;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server, 1024);

        let req = Request {
            id: 1,
            facade: "Ping".into(),
            version: 1,
            method: "Echo".into(),
            params: json!("hello"),
        };
        writer.send(&req).await.unwrap();
        writer.shutdown().await.unwrap();

        let got: Request = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(got, req);
        assert!(reader.next_frame::<Request>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let payload = format!("\"{}\"\n", "x".repeat(64));
        let mut reader = FrameReader::new(payload.as_bytes(), 16);
        let err = reader.next_frame::<Value>().await.unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn test_blank_lines_skipped_and_truncation_detected() {
        let mut reader = FrameReader::new(&b"\n\r\n{\"a\":1}\n{\"b\""[..], 64);
        let first: Value = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(first, json!({"a": 1}));
        assert!(matches!(
            reader.next_frame::<Value>().await.unwrap_err(),
            CodecError::Truncated
        ));
    }
}

use std::str::FromStr;

use anyhow::{anyhow, bail};
use async_compression::tokio::write::{GzipEncoder, ZstdEncoder};
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
  #[default]
  Gzip,
  Zstd,
}

impl Compression {
  pub fn extension(self) -> &'static str {
    match self {
      Compression::Gzip => "tar.gz",
      Compression::Zstd => "tar.zst",
    }
  }
}

impl FromStr for Compression {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "gz" | "gzip" => Ok(Compression::Gzip),
      "zst" | "zstd" => Ok(Compression::Zstd),
      other => bail!("unknown compression codec '{other}', expected 'gz' or 'zst'"),
    }
  }
}

/// Either compression encoder, erased behind a trait object so the
/// archive writer doesn't need to be generic over the codec.
pub enum Encoder<W> {
  Gzip(GzipEncoder<W>),
  Zstd(ZstdEncoder<W>),
}

impl<W: AsyncWrite + Unpin> Encoder<W> {
  pub fn new(compression: Compression, inner: W) -> Self {
    match compression {
      Compression::Gzip => Encoder::Gzip(GzipEncoder::new(inner)),
      Compression::Zstd => Encoder::Zstd(ZstdEncoder::new(inner)),
    }
  }

  pub async fn shutdown(&mut self) -> anyhow::Result<()> {
    match self {
      Encoder::Gzip(e) => e.shutdown().await,
      Encoder::Zstd(e) => e.shutdown().await,
    }
    .map_err(|e| anyhow!("failed to finalize compressed stream: {e}"))
  }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for Encoder<W> {
  fn poll_write(
    self: std::pin::Pin<&mut Self>,
    cx: &mut std::task::Context<'_>,
    buf: &[u8],
  ) -> std::task::Poll<std::io::Result<usize>> {
    match self.get_mut() {
      Encoder::Gzip(e) => std::pin::Pin::new(e).poll_write(cx, buf),
      Encoder::Zstd(e) => std::pin::Pin::new(e).poll_write(cx, buf),
    }
  }

  fn poll_flush(
    self: std::pin::Pin<&mut Self>,
    cx: &mut std::task::Context<'_>,
  ) -> std::task::Poll<std::io::Result<()>> {
    match self.get_mut() {
      Encoder::Gzip(e) => std::pin::Pin::new(e).poll_flush(cx),
      Encoder::Zstd(e) => std::pin::Pin::new(e).poll_flush(cx),
    }
  }

  fn poll_shutdown(
    self: std::pin::Pin<&mut Self>,
    cx: &mut std::task::Context<'_>,
  ) -> std::task::Poll<std::io::Result<()>> {
    match self.get_mut() {
      Encoder::Gzip(e) => std::pin::Pin::new(e).poll_shutdown(cx),
      Encoder::Zstd(e) => std::pin::Pin::new(e).poll_shutdown(cx),
    }
  }
}

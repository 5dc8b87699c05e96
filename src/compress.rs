//! Gzip encoding for served bundles

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Write};

/// Gzip `data` at the default compression level
pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 3), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Gzip on the blocking pool; large bundles take long enough to stall a worker
pub async fn gzip_blocking(data: Bytes) -> io::Result<Bytes> {
    tokio::task::spawn_blocking(move || gzip(&data).map(Bytes::from))
        .await
        .map_err(io::Error::other)?
}

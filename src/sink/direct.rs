//! Direct-handle sink strategy.
//!
//! Obtains a writable handle to the destination file and copies the stream
//! chunk-by-chunk. Each awaited write is the destination's readiness
//! signal, so backpressure is native and no pacing is needed.

use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::ProgressFn;
use crate::http::ByteStream;
use crate::{Error, Result};

pub(crate) async fn write(
    path: &Path,
    mut stream: ByteStream,
    progress: ProgressFn,
    cancel: CancellationToken,
) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::SinkInvalid(format!("cannot create '{}': {e}", path.display())))?;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                // Keep whatever is already durable; no further writes.
                let _ = file.flush().await;
                log::info!("direct write of '{}' cancelled", path.display());
                return Err(Error::Cancelled);
            }
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                file.write_all(&bytes).await?;
                progress(bytes.len() as u64);
            }
            Some(Err(e)) => {
                let _ = file.flush().await;
                return Err(e);
            }
            None => break,
        }
    }

    file.flush().await?;
    Ok(())
}

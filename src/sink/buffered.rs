//! Best-effort buffered sink strategy.
//!
//! Used when neither a direct handle nor a relay context is available. A
//! bounded queue (depth 1 by default) sits between the stream reader and a
//! writer task, so at most one chunk is ever buffered beyond the write in
//! flight. An optional rate cap paces the reader for destinations whose
//! internal backpressure is known to be broken; the pacing math compares
//! bytes sent against an elapsed-time budget and sleeps off any lead. The
//! throttle is a documented workaround, disabled by default, and its
//! thresholds are tunables rather than semantics.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ProgressFn;
use crate::http::ByteStream;
use crate::{Error, Result};

/// Minimum pause worth sleeping for; shorter leads are ignored.
const MIN_THROTTLE_WAIT: Duration = Duration::from_millis(10);

/// Computes how long the reader should pause to stay at or under `rate`
/// bytes per second, given `sent` bytes after `elapsed`.
pub(crate) fn throttle_wait(elapsed: Duration, sent: u64, rate: u64) -> Option<Duration> {
    if rate == 0 {
        return None;
    }
    let expected = elapsed.as_secs_f64() * rate as f64;
    let ahead = sent as f64 - expected;
    if ahead <= 0.0 {
        return None;
    }
    let wait = Duration::from_secs_f64(ahead / rate as f64);
    (wait >= MIN_THROTTLE_WAIT).then_some(wait)
}

pub(crate) async fn write(
    path: &Path,
    queue_depth: usize,
    throttle_bytes_per_sec: u64,
    mut stream: ByteStream,
    progress: ProgressFn,
    cancel: CancellationToken,
) -> Result<()> {
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::SinkInvalid(format!("cannot create '{}': {e}", path.display())))?;

    let (tx, mut rx) = mpsc::channel::<Bytes>(queue_depth.max(1));

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        let mut file = file;
        while let Some(chunk) = rx.recv().await {
            if writer_cancel.is_cancelled() {
                let _ = file.flush().await;
                return Err(Error::Cancelled);
            }
            file.write_all(&chunk).await?;
            progress(chunk.len() as u64);
        }
        file.flush().await?;
        Ok(())
    });

    if throttle_bytes_per_sec > 0 {
        log::info!(
            "buffered sink pacing enabled: {} bytes/s",
            throttle_bytes_per_sec
        );
    }

    let start = Instant::now();
    let mut sent: u64 = 0;
    let feed: Result<()> = loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break Err(Error::Cancelled),
            item = stream.next() => item,
        };
        match item {
            Some(Ok(bytes)) => {
                sent += bytes.len() as u64;
                if let Some(wait) = throttle_wait(start.elapsed(), sent, throttle_bytes_per_sec) {
                    tokio::time::sleep(wait).await;
                }
                if tx.send(bytes).await.is_err() {
                    // Writer stopped early; its result carries the cause.
                    break Ok(());
                }
            }
            Some(Err(e)) => break Err(e),
            None => break Ok(()),
        }
    };
    drop(tx);

    let written = match writer.await {
        Ok(result) => result,
        Err(join_error) => Err(Error::SinkInvalid(format!(
            "buffered writer panicked: {join_error}"
        ))),
    };
    match (feed, written) {
        (Err(e), _) => Err(e),
        (Ok(()), result) => result,
    }
}

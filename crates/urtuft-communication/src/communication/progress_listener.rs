//! Progress listener
//!
//! Long-lived TCP server the running program connects back to. Each
//! connection streams newline-delimited status lines; every line that parses
//! is applied to the [`ProgressStore`]. A bad line is logged and skipped and
//! never ends the connection.

use crate::telemetry::parse_status_line;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use urtuft_core::{ConnectionError, KeyValueStore, ProgressEntry, ProgressStore};

/// Default port the program reports progress to.
pub const DEFAULT_TELEMETRY_PORT: u16 = 30010;

/// Upper bound on a single status line.
const MAX_LINE_BYTES: usize = 4096;

/// A bound, not yet running, progress listener.
pub struct ProgressListener<S> {
    listener: TcpListener,
    progress: Arc<ProgressStore<S>>,
}

impl<S> ProgressListener<S>
where
    S: KeyValueStore<ProgressEntry> + 'static,
{
    /// Bind `address` (e.g. `0.0.0.0:30010`).
    pub async fn bind(address: &str, progress: Arc<ProgressStore<S>>) -> Result<Self, ConnectionError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ConnectionError::BindFailed {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { listener, progress })
    }

    /// Bound address; useful after binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve connections on a background task until shut down.
    pub fn spawn(self) -> std::io::Result<ListenerHandle> {
        let local_addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.serve(shutdown_rx));
        tracing::info!(%local_addr, "Progress listener started");
        Ok(ListenerHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    async fn serve(self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Progress listener stopped");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        tracing::debug!(%peer, "Progress connection opened");
                        let progress = Arc::clone(&self.progress);
                        tokio::spawn(async move {
                            let applied = ingest(socket, &progress).await;
                            tracing::debug!(%peer, applied, "Progress connection closed");
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept progress connection: {}", e);
                    }
                },
            }
        }
    }
}

/// Running listener.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// Connections already open keep being served until the peer closes.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!("Progress listener task failed: {}", e);
        }
    }
}

/// Outcome of reading one status line.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// A complete line is in the buffer.
    Line,
    /// The line exceeded the limit and was skipped up to its newline.
    Overlong,
    /// The peer closed the connection.
    Eof,
}

/// Read one line into `buffer`, never holding more than the line limit.
async fn read_status_line<R>(reader: &mut R, buffer: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_LINE_BYTES as u64 + 1;
    buffer.clear();
    let read = (&mut *reader).take(limit).read_until(b'\n', buffer).await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if read as u64 == limit && buffer.last() != Some(&b'\n') {
        buffer.clear();
        skip_line(reader).await?;
        return Ok(LineRead::Overlong);
    }
    Ok(LineRead::Line)
}

/// Discard input up to and including the next newline.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        let (used, found) = match available.iter().position(|byte| *byte == b'\n') {
            Some(position) => (position + 1, true),
            None => (available.len(), false),
        };
        reader.consume(used);
        if found {
            return Ok(());
        }
    }
}

/// Apply every status line read from `reader`; returns how many were applied.
///
/// Invalid UTF-8 is decoded lossily and overlong lines are dropped without
/// being buffered.
pub async fn ingest<R, S>(reader: R, progress: &ProgressStore<S>) -> usize
where
    R: AsyncRead + Unpin,
    S: KeyValueStore<ProgressEntry>,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::with_capacity(256);
    let mut applied = 0;

    loop {
        match read_status_line(&mut reader, &mut buffer).await {
            Ok(LineRead::Eof) => break,
            Ok(LineRead::Overlong) => {
                tracing::warn!(limit = MAX_LINE_BYTES, "Dropping overlong progress line");
                continue;
            }
            Ok(LineRead::Line) => {}
            Err(e) => {
                tracing::warn!("Progress connection read failed: {}", e);
                break;
            }
        }

        let line = String::from_utf8_lossy(&buffer);
        if line.trim().is_empty() {
            continue;
        }
        match parse_status_line(&line) {
            Ok(record) => {
                let entry = progress.record_progress(&record.job_id, record.current, record.total);
                tracing::debug!(
                    job_id = %entry.job_id,
                    current = entry.current,
                    total = entry.total,
                    "Progress update"
                );
                applied += 1;
            }
            Err(e) => tracing::warn!("Skipping progress line: {}", e),
        }
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ingest_skips_bad_lines() {
        let progress = ProgressStore::in_memory();
        let input: &[u8] =
            b"{jobId:\"a\",current:1,total:4}\n\xff\xfe garbage\n\n{jobId:\"a\",current:9,total:4}";
        let applied = ingest(input, &progress).await;

        assert_eq!(applied, 2);
        assert_eq!(progress.get("a").unwrap().current, 4);
    }

    #[tokio::test]
    async fn test_ingest_drops_overlong_line() {
        let progress = ProgressStore::in_memory();
        let mut input = vec![b'x'; MAX_LINE_BYTES + 10];
        input.extend_from_slice(b"\n{jobId:\"b\",current:2,total:4}\n");
        assert_eq!(ingest(input.as_slice(), &progress).await, 1);
        assert_eq!(progress.get("b").unwrap().current, 2);
    }

    #[tokio::test]
    async fn test_line_buffer_stays_bounded() {
        let flood = tokio::io::repeat(b'x').take(8 * 1024 * 1024);
        let tail: &[u8] = b"\n{jobId:\"c\",current:3,total:4}\n";
        let mut reader = BufReader::new(flood.chain(tail));
        let mut buffer = Vec::new();

        assert_eq!(
            read_status_line(&mut reader, &mut buffer).await.unwrap(),
            LineRead::Overlong
        );
        assert!(buffer.capacity() <= 2 * (MAX_LINE_BYTES + 1));

        assert_eq!(
            read_status_line(&mut reader, &mut buffer).await.unwrap(),
            LineRead::Line
        );
        assert_eq!(buffer, b"{jobId:\"c\",current:3,total:4}\n");
        assert_eq!(
            read_status_line(&mut reader, &mut buffer).await.unwrap(),
            LineRead::Eof
        );
    }

    #[tokio::test]
    async fn test_ingest_survives_flood_without_newline() {
        let progress = ProgressStore::in_memory();
        let flood = tokio::io::repeat(b'{').take(4 * 1024 * 1024);
        let tail: &[u8] = b"\n{jobId:\"d\",current:1,total:2}\n";
        assert_eq!(ingest(flood.chain(tail), &progress).await, 1);
        assert_eq!(progress.get("d").unwrap().current, 1);
    }

    #[tokio::test]
    async fn test_line_at_limit_is_kept() {
        let mut line = b"{jobId:\"e\",current:1,total:2}".to_vec();
        line.resize(MAX_LINE_BYTES, b' ');
        line.push(b'\n');
        let mut reader = BufReader::new(line.as_slice());
        let mut buffer = Vec::new();
        assert_eq!(
            read_status_line(&mut reader, &mut buffer).await.unwrap(),
            LineRead::Line
        );
        assert_eq!(buffer.len(), MAX_LINE_BYTES + 1);
    }
}

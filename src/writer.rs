//! Dedicated writer task for outbound messages.
//!
//! Every outbound message (requests, replies, notifications) is framed by
//! the sender and handed to a single task over an mpsc channel. The task
//! owns the write half of the transport, so framed messages never
//! interleave on the wire.
//!
//! ```text
//! Correlator ──┐
//! Session::send┼─► mpsc::Sender<Bytes> ─► Writer Task ─► transport
//! close()     ─┘
//! ```
//!
//! Ready messages are batched into one vectored write.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::XmlCodec;
use crate::error::{NetconfError, Result};
use crate::protocol::{encode_message, FramingMode, DEFAULT_OUTBOUND_CHUNK_SIZE};
use crate::tree::Node;

/// Default maximum pending messages before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum messages to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending messages before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for the message queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
    /// Chunk size for chunked framing.
    pub outbound_chunk_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
            outbound_chunk_size: DEFAULT_OUTBOUND_CHUNK_SIZE,
        }
    }
}

/// Handle for sending messages to the writer task.
///
/// Cheaply cloneable. Messages are framed with the session's negotiated
/// framing mode before they enter the queue.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
    mode: FramingMode,
    chunk_size: usize,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<Bytes>,
        pending: Arc<AtomicUsize>,
        config: &WriterConfig,
        mode: FramingMode,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending: config.max_pending_frames,
            timeout: config.backpressure_timeout,
            mode,
            chunk_size: config.outbound_chunk_size,
        }
    }

    /// Framing applied to outbound messages.
    #[inline]
    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Encode and frame a message.
    pub fn frame(&self, message: &Node) -> Result<Bytes> {
        let payload = XmlCodec::encode(message);
        Ok(encode_message(&payload, self.mode, self.chunk_size)?)
    }

    /// Encode, frame and queue a message, waiting while backpressure is
    /// active.
    pub async fn send_node(&self, message: &Node) -> Result<()> {
        let framed = self.frame(message)?;
        self.send(framed).await
    }

    /// Encode, frame and queue a message without waiting.
    pub fn try_send_node(&self, message: &Node) -> Result<()> {
        let framed = self.frame(message)?;
        self.try_send(framed)
    }

    /// Queue an already framed message.
    ///
    /// Waits if backpressure is active, timing out after the configured
    /// duration.
    pub async fn send(&self, framed: Bytes) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(framed).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            NetconfError::ConnectionClosed
        })
    }

    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }
            if self.tx.is_closed() {
                return Err(NetconfError::ConnectionClosed);
            }
            if start.elapsed() > self.timeout {
                return Err(NetconfError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Messages queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Queue an already framed message without waiting.
    ///
    /// Returns `Err(QueueFull)` immediately if at capacity.
    pub fn try_send(&self, framed: Bytes) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(NetconfError::QueueFull);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(framed).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => NetconfError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => NetconfError::ConnectionClosed,
            }
        })
    }
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("mode", &self.mode)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Spawn the writer task and return a handle for sending messages.
///
/// The task ends, shutting down the write half, once every handle is
/// dropped.
pub fn spawn_writer_task<W>(
    writer: W,
    mode: FramingMode,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), &config, mode);
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(framed) => batch.push(framed),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        let written = write_batch(&mut writer, &batch).await;
        batch.clear();
        pending.fetch_sub(batch_size, Ordering::Release);

        if let Err(e) = written {
            tracing::error!("Writer task failed: {}", e);
            rx.close();
            return Err(e);
        }
    }

    tracing::trace!("Writer channel closed, shutting down transport");
    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of framed messages with vectored I/O, resuming after
/// partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(Bytes::len).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(NetconfError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices for the bytes of `batch` after the first `skip_bytes`.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut start = 0;

    for framed in batch {
        let end = start + framed.len();
        if skip_bytes < end && !framed.is_empty() {
            slices.push(IoSlice::new(&framed[skip_bytes.saturating_sub(start)..]));
        }
        start = end;
    }

    slices
}

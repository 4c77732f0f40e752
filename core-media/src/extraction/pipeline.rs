//! # Stream Extraction Pipeline
//!
//! Two stages joined by a bounded queue:
//!
//! ```text
//! ┌──────────────────────────┐   bounded mpsc    ┌──────────────────────────┐
//! │ Decode stage             │  (capacity 256)   │ Encode stage             │
//! │  read_packet()           │ ────────────────> │  write_packet() (remux)  │
//! │  drop other streams      │      Unit         │  encode_frame() (trans.) │
//! │  decode() when transcode │                   │  finish()                │
//! └──────────────────────────┘                   └────────────┬─────────────┘
//!                                                             │ latest pts
//!                                                  ┌──────────▼──────────┐
//!                                                  │ Progress sampler    │
//!                                                  └─────────────────────┘
//! ```
//!
//! The decode stage waits when the queue is full, so nothing is dropped and
//! memory stays bounded by the queue capacity. Each unit moves across the
//! queue by value. The sampler only reads an atomic, so neither stage ever
//! waits on it.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{MediaFrame, MediaPacket, OutputMode, PacketReader, PacketWriter};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::config::ExtractionConfig;
use crate::error::{MediaError, Result};
use crate::progress::{spawn_sampler, Progress, Sample};

// ============================================================================
// Units and Statistics
// ============================================================================

/// What travels between the stages.
#[derive(Debug)]
enum Unit {
    Packet(MediaPacket),
    Frame(MediaFrame),
}

impl Unit {
    fn pts_us(&self) -> i64 {
        match self {
            Unit::Packet(p) => p.pts_us,
            Unit::Frame(f) => f.pts_us,
        }
    }
}

/// Counters reported after a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Packets read from the source, all streams
    pub packets_read: u64,
    /// Units pushed onto the queue
    pub units_queued: u64,
    /// Units accepted by the writer
    pub units_written: u64,
    /// Packets belonging to other streams
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    packets_read: AtomicU64,
    units_queued: AtomicU64,
    units_written: AtomicU64,
    discarded: AtomicU64,
    latest_pts_us: AtomicI64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            packets_read: self.packets_read.load(Ordering::Acquire),
            units_queued: self.units_queued.load(Ordering::Acquire),
            units_written: self.units_written.load(Ordering::Acquire),
            discarded: self.discarded.load(Ordering::Acquire),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Demuxes one elementary stream into a standalone artifact.
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    queue_capacity: usize,
    progress_interval: Duration,
}

impl ExtractionPipeline {
    pub fn new(queue_capacity: usize, progress_interval: Duration) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            progress_interval,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.queue_capacity, config.progress_interval)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Run both stages to completion.
    ///
    /// `progress` is advanced from the latest written timestamp relative to
    /// the source duration and every change is passed to `on_progress`. When
    /// the source reports a duration of zero or less no progress is reported
    /// at all.
    ///
    /// # Errors
    ///
    /// The first stage failure, [`MediaError::Cancelled`] when `cancel` fires,
    /// or [`MediaError::Internal`] if a stage task dies. The writer is only
    /// finished on success.
    #[instrument(skip_all, fields(stream = stream_index, capacity = self.queue_capacity))]
    pub async fn run<F>(
        &self,
        reader: Box<dyn PacketReader>,
        writer: Box<dyn PacketWriter>,
        stream_index: usize,
        mode: &OutputMode,
        progress: Progress,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<PipelineStats>
    where
        F: FnMut(f64) + Send + 'static,
    {
        let duration_us = reader.info().duration_us;
        let transcode = matches!(mode, OutputMode::Transcode { .. });
        let counters = Arc::new(Counters::default());

        // Stops both stages on caller cancel or when either stage fails.
        let abort = cancel.child_token();
        let (tx, rx) = mpsc::channel::<Unit>(self.queue_capacity);

        let decode = tokio::spawn(decode_stage(
            reader,
            stream_index,
            transcode,
            tx,
            abort.clone(),
            Arc::clone(&counters),
        ));
        let encode = tokio::spawn(encode_stage(
            writer,
            rx,
            abort.clone(),
            Arc::clone(&counters),
        ));

        let stop_sampling = CancellationToken::new();
        let sampler = {
            let counters = Arc::clone(&counters);
            let progress = progress.clone();
            spawn_sampler(
                self.progress_interval,
                stop_sampling.clone(),
                move || {
                    if duration_us <= 0 {
                        return Sample::Unknown;
                    }
                    let latest = counters.latest_pts_us.load(Ordering::Acquire);
                    progress.advance(latest as f64 / duration_us as f64);
                    Sample::Value(progress.value())
                },
                on_progress,
            )
        };

        let decoded = flatten(decode.await, "decode");
        if decoded.is_err() {
            abort.cancel();
        }
        let encoded = flatten(encode.await, "encode");

        if decoded.is_ok() && encoded.is_ok() && duration_us > 0 {
            progress.advance(1.0);
        }
        stop_sampling.cancel();
        let _ = sampler.await;

        let stats = counters.snapshot();
        match (decoded, encoded) {
            (Ok(()), Ok(())) => {
                info!(
                    packets = stats.packets_read,
                    written = stats.units_written,
                    discarded = stats.discarded,
                    "Extraction pipeline finished"
                );
                Ok(stats)
            }
            // The encode side holds the root cause when the decoder only saw
            // a closed queue.
            (_, Err(e)) if !e.is_cancelled() => Err(e),
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) => Err(e),
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>, stage: &str) -> Result<()> {
    joined.unwrap_or_else(|e| Err(MediaError::Internal(format!("{stage} stage failed: {e}"))))
}

// ============================================================================
// Stages
// ============================================================================

async fn decode_stage(
    mut reader: Box<dyn PacketReader>,
    stream_index: usize,
    transcode: bool,
    tx: mpsc::Sender<Unit>,
    abort: CancellationToken,
    counters: Arc<Counters>,
) -> Result<()> {
    let result = async {
        loop {
            if abort.is_cancelled() {
                return Err(MediaError::Cancelled);
            }

            let packet = match reader.read_packet().await? {
                Some(packet) => packet,
                None => break,
            };
            counters.packets_read.fetch_add(1, Ordering::AcqRel);

            if packet.stream_index != stream_index {
                counters.discarded.fetch_add(1, Ordering::AcqRel);
                continue;
            }

            if transcode {
                for frame in reader.decode(packet).await? {
                    enqueue(&tx, Unit::Frame(frame), &abort, &counters).await?;
                }
            } else {
                enqueue(&tx, Unit::Packet(packet), &abort, &counters).await?;
            }
        }

        if transcode {
            for frame in reader.flush(stream_index).await? {
                enqueue(&tx, Unit::Frame(frame), &abort, &counters).await?;
            }
        }

        debug!("Decode stage reached end of input");
        Ok(())
    }
    .await;

    if let Err(e) = &result {
        if !e.is_cancelled() {
            warn!(error = %e, "Decode stage failed");
        }
        abort.cancel();
    }
    result
}

/// Push one unit, waiting while the queue is full.
async fn enqueue(
    tx: &mpsc::Sender<Unit>,
    unit: Unit,
    abort: &CancellationToken,
    counters: &Counters,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = abort.cancelled() => Err(MediaError::Cancelled),
        sent = tx.send(unit) => {
            sent.map_err(|_| MediaError::Internal("encode stage stopped".into()))?;
            counters.units_queued.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }
    }
}

async fn encode_stage(
    mut writer: Box<dyn PacketWriter>,
    mut rx: mpsc::Receiver<Unit>,
    abort: CancellationToken,
    counters: Arc<Counters>,
) -> Result<()> {
    let result = async {
        loop {
            let unit = tokio::select! {
                biased;
                _ = abort.cancelled() => return Err(MediaError::Cancelled),
                unit = rx.recv() => unit,
            };
            let Some(unit) = unit else { break };

            let pts = unit.pts_us();
            let written = tokio::select! {
                biased;
                _ = abort.cancelled() => return Err(MediaError::Cancelled),
                written = async {
                    match unit {
                        Unit::Packet(packet) => writer.write_packet(packet).await,
                        Unit::Frame(frame) => writer.encode_frame(frame).await,
                    }
                } => written,
            };
            written?;
            counters.latest_pts_us.fetch_max(pts, Ordering::AcqRel);
            counters.units_written.fetch_add(1, Ordering::AcqRel);
        }

        if abort.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        writer.finish().await?;
        Ok(())
    }
    .await;

    if let Err(e) = &result {
        if !e.is_cancelled() {
            warn!(error = %e, "Encode stage failed");
        }
        abort.cancel();
    }
    result
}

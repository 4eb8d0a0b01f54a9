// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::aggregate::Aggregator;
use super::events::{decode_log, PairEvent, PAIR_EVENT_SIGNATURES};
use super::points::{DataPoint, PointBuilder};
use super::range::BlockRanges;
use super::retry::retry_call;
use super::sink::{BatchWriter, PointSink};
use super::source::{HeaderSource, LogFilter, LogSource};
use super::tags::TagSet;
use super::timestamps::TimestampResolver;
use super::{PairIndexerConfig, RunStage, ServiceError};
use crate::db::DbObj;

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Block ranges processed.
    pub batches: u64,
    /// Data points written to the sink.
    pub points: u64,
    /// Last block covered by the run.
    pub last_height: u64,
}

// Points of one block range, queued for the writer task.
struct PendingWrite {
    from: u64,
    to: u64,
    points: Vec<DataPoint>,
}

/// Scans a pair contract's Swap and Sync events block range by block range and writes
/// one data point per block with events.
pub struct PairIndexerService {
    logs: Arc<dyn LogSource>,
    headers: Arc<dyn HeaderSource>,
    resolver: TimestampResolver,
    writer: BatchWriter,
    builder: PointBuilder,
    config: PairIndexerConfig,
    cancel: CancellationToken,
}

impl PairIndexerService {
    pub fn new(
        logs: Arc<dyn LogSource>,
        headers: Arc<dyn HeaderSource>,
        cache: Option<DbObj>,
        sink: Arc<dyn PointSink>,
        tags: &TagSet,
        config: PairIndexerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let resolver = TimestampResolver::new(
            headers.clone(),
            cache,
            config.timestamp_concurrency,
            config.retry.clone(),
            cancel.clone(),
        );
        let writer = BatchWriter::new(
            sink,
            config.sink_batch_size,
            config.retry.clone(),
            cancel.clone(),
        );
        let builder = PointBuilder::new(config.measurement.clone(), tags, config.encoding);

        Self { logs, headers, resolver, writer, builder, config, cancel }
    }

    /// Indexes blocks `start_height..=end_height`. Without an end height the run stops at
    /// the chain head observed at start.
    ///
    /// Batches are written in block order while the following ones are scanned. On
    /// failure, batches built before the failing one are still written; nothing of the
    /// failing batch is.
    pub async fn run(
        &self,
        start_height: u64,
        end_height: Option<u64>,
    ) -> Result<RunSummary, ServiceError> {
        let res = self.run_inner(start_height, end_height).await;
        match &res {
            Ok(summary) => tracing::info!(
                "Indexed {} batches up to block {}, wrote {} points",
                summary.batches,
                summary.last_height,
                summary.points
            ),
            Err(err) => tracing::error!("Run terminated while {}: {}", err.stage(), err),
        }
        res
    }

    async fn run_inner(
        &self,
        start_height: u64,
        end_height: Option<u64>,
    ) -> Result<RunSummary, ServiceError> {
        let last_height = match end_height {
            Some(end) if end < start_height => {
                return Err(ServiceError::InvalidRange { start: start_height, end });
            }
            Some(end) => end,
            None => self.chain_head().await?,
        };
        tracing::info!(
            "Starting pair indexer for {} at block {} (will stop at block {})",
            self.config.pair_address,
            start_height,
            last_height
        );

        let (tx, rx) = mpsc::channel(self.config.write_queue_size.max(1));
        let writer_task = tokio::spawn(write_batches(self.writer.clone(), rx));

        let scanned = self.scan(start_height, last_height, &tx).await;
        drop(tx);

        tracing::debug!("Stage: {}", RunStage::Draining);
        let written = writer_task
            .await
            .map_err(|e| ServiceError::Error(anyhow!("Point writer task failed: {}", e)))?;

        // Writer failures concern earlier batches than scan failures.
        let points = written?;
        let batches = scanned?;
        Ok(RunSummary { batches, points, last_height })
    }

    async fn chain_head(&self) -> Result<u64, ServiceError> {
        retry_call(&self.config.retry, &self.cancel, "Fetching chain head", || {
            self.headers.latest_height()
        })
        .await
        .map_err(|source| {
            if self.cancel.is_cancelled() {
                ServiceError::Cancelled(RunStage::Scanning)
            } else {
                ServiceError::ChainHead(source)
            }
        })
    }

    async fn scan(
        &self,
        start_height: u64,
        last_height: u64,
        tx: &mpsc::Sender<PendingWrite>,
    ) -> Result<u64, ServiceError> {
        let mut batches = 0;
        for range in BlockRanges::new(start_height, last_height, self.config.batch_size) {
            if self.cancel.is_cancelled() {
                return Err(ServiceError::Cancelled(RunStage::Scanning));
            }
            if tx.is_closed() {
                return Err(ServiceError::Error(anyhow!("Point writer stopped")));
            }

            let (from, to) = (*range.start(), *range.end());
            let started = Instant::now();
            let span = tracing::info_span!("batch", from, to);
            let points = self.process_batch(from, to).instrument(span).await?;
            let count = points.len();

            if !points.is_empty() {
                if tx.send(PendingWrite { from, to, points }).await.is_err() {
                    return Err(ServiceError::Error(anyhow!("Point writer stopped")));
                }
                // Lets the writer pick the batch up before the next range is scanned.
                tokio::task::yield_now().await;
            }
            batches += 1;
            tracing::info!(
                "Processed blocks {} to {} ({} points) in {:?}",
                from,
                to,
                count,
                started.elapsed()
            );
        }
        Ok(batches)
    }

    async fn process_batch(&self, from: u64, to: u64) -> Result<Vec<DataPoint>, ServiceError> {
        let filter = LogFilter {
            from,
            to,
            address: self.config.pair_address,
            topics: PAIR_EVENT_SIGNATURES.to_vec(),
        };
        let entries = retry_call(
            &self.config.retry,
            &self.cancel,
            format!("Fetching logs for blocks {} to {}", from, to),
            || self.logs.get_logs(&filter),
        )
        .await
        .map_err(|source| {
            if self.cancel.is_cancelled() {
                ServiceError::Cancelled(RunStage::Scanning)
            } else {
                ServiceError::LogFetch { from, to, source }
            }
        })?;

        tracing::debug!("Stage: {} ({} entries)", RunStage::Decoding, entries.len());
        let mut aggregator = Aggregator::new(self.config.reserve_policy);
        for entry in &entries {
            let Some(event) = decode_log(entry)? else {
                continue;
            };
            log_event(entry.height, &event);
            aggregator.fold(entry.height, &event);
        }
        if aggregator.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(
            "Stage: {} ({} events over {} blocks)",
            RunStage::Aggregating,
            aggregator.event_count(),
            aggregator.len()
        );

        tracing::debug!("Stage: {}", RunStage::ResolvingTimestamps);
        let timestamps = self.resolver.resolve(&aggregator.heights()).await?;

        tracing::debug!("Stage: {}", RunStage::Building);
        self.builder.build_all(&aggregator.into_accumulators(), &timestamps)
    }
}

fn log_event(height: u64, event: &PairEvent) {
    match event {
        PairEvent::Sync(sync) => tracing::debug!(
            "Sync at block {}: reserve0 {}, reserve1 {}",
            height,
            sync.reserve0,
            sync.reserve1
        ),
        PairEvent::Swap(swap) => tracing::debug!(
            "Swap at block {}: in {}/{}, out {}/{}",
            height,
            swap.amount0_in,
            swap.amount1_in,
            swap.amount0_out,
            swap.amount1_out
        ),
    }
}

async fn write_batches(
    writer: BatchWriter,
    mut rx: mpsc::Receiver<PendingWrite>,
) -> Result<u64, ServiceError> {
    let mut written = 0;
    while let Some(batch) = rx.recv().await {
        let started = Instant::now();
        let count = writer
            .flush(&batch.points)
            .await
            .map_err(|source| ServiceError::Sink { from: batch.from, to: batch.to, source })?;
        tracing::debug!(
            "Stage: {} ({} points for blocks {} to {} in {:?})",
            RunStage::Writing,
            count,
            batch.from,
            batch.to,
            started.elapsed()
        );
        written += count as u64;
    }
    Ok(written)
}

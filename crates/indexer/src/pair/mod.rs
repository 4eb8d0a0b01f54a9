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

mod aggregate;
mod core;
mod events;
mod points;
mod range;
pub mod retry;
mod sink;
mod source;
mod tags;
mod timestamps;

pub use aggregate::{Accumulator, Aggregator, ReservePolicy};
pub use self::core::{PairIndexerService, RunSummary};
pub use events::{
    decode_log, DecodeError, IUniswapV2Pair, PairEvent, RawLogEntry, SwapEvent, SyncEvent,
    PAIR_EVENT_SIGNATURES,
};
pub use points::{
    DataPoint, FieldEncoding, PointBuilder, RESERVE0_FIELD, RESERVE1_FIELD, VOLUME0_FIELD,
    VOLUME1_FIELD,
};
pub use range::BlockRanges;
pub use retry::{retry_call, CallTimeout, RetryPolicy, Transient};
pub use sink::{BatchWriter, InfluxSink, PointSink, SinkError};
pub use source::{HeaderSource, LogFilter, LogSource, RpcSource, SourceError};
pub use tags::{named_chain, TagSet, CHAIN_TAG, PAIR_TAG};
pub use timestamps::TimestampResolver;

use std::{fmt, num::NonZeroU64};

use alloy::primitives::{address, Address};
use thiserror::Error;

use crate::db::DbError;

/// Default pair: WETH/USDC on Ethereum mainnet.
pub const DEFAULT_PAIR_ADDRESS: Address = address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc");
pub const DEFAULT_MEASUREMENT: &str = "ethereum";

/// Stage of a run, used for log context and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    Scanning,
    Decoding,
    Aggregating,
    ResolvingTimestamps,
    Building,
    Writing,
    Draining,
    Terminated,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Idle => "idle",
            RunStage::Scanning => "scanning",
            RunStage::Decoding => "decoding",
            RunStage::Aggregating => "aggregating",
            RunStage::ResolvingTimestamps => "resolving timestamps",
            RunStage::Building => "building",
            RunStage::Writing => "writing",
            RunStage::Draining => "draining",
            RunStage::Terminated => "terminated",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Failed to fetch logs for blocks {from}..={to}: {source}")]
    LogFetch { from: u64, to: u64, source: SourceError },

    #[error("Failed to fetch header of block {height}: {source}")]
    HeaderFetch { height: u64, source: SourceError },

    #[error("Failed to fetch chain head: {0}")]
    ChainHead(#[source] SourceError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Timestamp cache error at block {height}: {source}")]
    Cache { height: u64, source: DbError },

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbError),

    #[error("Failed to write points for blocks {from}..={to}: {source}")]
    Sink { from: u64, to: u64, source: SinkError },

    #[error("Block {height} has out of range timestamp {timestamp}")]
    InvalidTimestamp { height: u64, timestamp: u64 },

    #[error("No timestamp resolved for block {0}")]
    MissingTimestamp(u64),

    #[error("End block {end} is less than starting block {start}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Cancelled while {0}")]
    Cancelled(RunStage),

    #[error("Error: {0}")]
    Error(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stage the run was in when the error occurred.
    pub fn stage(&self) -> RunStage {
        match self {
            ServiceError::LogFetch { .. } | ServiceError::ChainHead(_) => RunStage::Scanning,
            ServiceError::InvalidRange { .. } => RunStage::Idle,
            ServiceError::Decode(_) => RunStage::Decoding,
            ServiceError::HeaderFetch { .. }
            | ServiceError::Cache { .. }
            | ServiceError::DatabaseError(_) => RunStage::ResolvingTimestamps,
            ServiceError::InvalidTimestamp { .. } | ServiceError::MissingTimestamp(_) => {
                RunStage::Building
            }
            ServiceError::Sink { .. } => RunStage::Writing,
            ServiceError::Cancelled(stage) => *stage,
            ServiceError::Error(_) => RunStage::Terminated,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PairIndexerConfig {
    pub pair_address: Address,
    /// Blocks covered by one log request.
    pub batch_size: NonZeroU64,
    pub measurement: String,
    pub encoding: FieldEncoding,
    pub reserve_policy: ReservePolicy,
    /// Maximum number of heights resolved at the same time.
    pub timestamp_concurrency: usize,
    /// Maximum number of points per sink write.
    pub sink_batch_size: usize,
    /// Built batches that may wait for the writer before scanning blocks.
    pub write_queue_size: usize,
    pub retry: RetryPolicy,
}

impl Default for PairIndexerConfig {
    fn default() -> Self {
        Self {
            pair_address: DEFAULT_PAIR_ADDRESS,
            batch_size: NonZeroU64::new(100).unwrap_or(NonZeroU64::MIN),
            measurement: DEFAULT_MEASUREMENT.to_string(),
            encoding: FieldEncoding::default(),
            reserve_policy: ReservePolicy::default(),
            timestamp_concurrency: 16,
            sink_batch_size: 5000,
            write_queue_size: 4,
            retry: RetryPolicy::default(),
        }
    }
}

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

//! Chain data sources: event logs and block headers.

use alloy::eips::BlockNumberOrTag;
use alloy::network::Ethereum;
use alloy::primitives::{Address, B256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use thiserror::Error;

use super::events::RawLogEntry;
use super::retry::{CallTimeout, Transient};

// JSON-RPC error codes used by providers to signal rate limiting.
const RATE_LIMIT_CODES: &[i64] = &[429, -32005];

/// Log query for one block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub from: u64,
    pub to: u64,
    pub address: Address,
    /// Accepted values for topic0.
    pub topics: Vec<B256>,
}

#[derive(Error, Debug)]
pub enum SourceError {
    /// Rate limiting or temporary unavailability.
    #[error("Transient source error: {0}")]
    Transient(String),

    #[error("Source error: {0}")]
    Fatal(String),

    #[error("Block {0} not found")]
    MissingBlock(u64),

    #[error("Source call error: {0}")]
    Timeout(#[from] CallTimeout),
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_) | SourceError::Timeout(_))
    }
}

impl From<RpcError<TransportErrorKind>> for SourceError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        let transient = match &err {
            RpcError::Transport(TransportErrorKind::HttpError(http)) => {
                http.status == 429 || http.status >= 500
            }
            RpcError::Transport(TransportErrorKind::Custom(_)) => true,
            RpcError::Transport(kind) => kind.is_retry_err(),
            RpcError::ErrorResp(payload) => {
                RATE_LIMIT_CODES.contains(&payload.code)
                    || payload.message.to_lowercase().contains("rate limit")
            }
            _ => false,
        };
        if transient {
            SourceError::Transient(err.to_string())
        } else {
            SourceError::Fatal(err.to_string())
        }
    }
}

#[async_trait]
pub trait LogSource: Send + Sync {
    /// Logs matching the filter, ordered by block and log index.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLogEntry>, SourceError>;
}

#[async_trait]
pub trait HeaderSource: Send + Sync {
    /// Timestamp of the block in Unix seconds.
    async fn block_timestamp(&self, height: u64) -> Result<u64, SourceError>;

    /// Height of the chain head.
    async fn latest_height(&self) -> Result<u64, SourceError>;
}

/// Log and header source backed by an Ethereum JSON-RPC provider.
#[derive(Clone, Debug)]
pub struct RpcSource<P> {
    provider: P,
}

impl<P> RpcSource<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

fn raw_log_entry(log: &Log) -> Result<RawLogEntry, SourceError> {
    let height = log.block_number.ok_or_else(|| {
        SourceError::Fatal(format!(
            "Log without block number in transaction {:?}",
            log.transaction_hash
        ))
    })?;
    Ok(RawLogEntry { height, topics: log.topics().to_vec(), data: log.data().data.clone() })
}

#[async_trait]
impl<P> LogSource for RpcSource<P>
where
    P: Provider<Ethereum> + Clone + 'static,
{
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLogEntry>, SourceError> {
        let rpc_filter = Filter::new()
            .address(filter.address)
            .from_block(filter.from)
            .to_block(filter.to)
            .event_signature(filter.topics.clone());

        tracing::debug!("Fetching logs from RPC: block {} to block {}", filter.from, filter.to);
        let logs = self.provider.get_logs(&rpc_filter).await?;
        logs.iter().map(raw_log_entry).collect()
    }
}

#[async_trait]
impl<P> HeaderSource for RpcSource<P>
where
    P: Provider<Ethereum> + Clone + 'static,
{
    async fn block_timestamp(&self, height: u64) -> Result<u64, SourceError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(height))
            .await?
            .ok_or(SourceError::MissingBlock(height))?;
        Ok(block.header.timestamp)
    }

    async fn latest_height(&self) -> Result<u64, SourceError> {
        Ok(self.provider.get_block_number().await?)
    }
}

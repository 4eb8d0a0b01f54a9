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

use std::{collections::HashMap, sync::Arc};

use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::retry::{retry_call, RetryPolicy};
use super::source::HeaderSource;
use super::{RunStage, ServiceError};
use crate::db::{DbObj, UpsertOutcome};

/// Maps block heights to timestamps, reading through the timestamp cache and falling
/// back to block headers on a miss.
#[derive(Clone)]
pub struct TimestampResolver {
    headers: Arc<dyn HeaderSource>,
    cache: Option<DbObj>,
    concurrency: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl TimestampResolver {
    /// Without a cache every height is fetched from the header source.
    pub fn new(
        headers: Arc<dyn HeaderSource>,
        cache: Option<DbObj>,
        concurrency: usize,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self { headers, cache, concurrency: concurrency.max(1), retry, cancel }
    }

    /// Resolves all heights with at most `concurrency` lookups in flight.
    ///
    /// Every lookup runs to completion before returning. If any fail, the error of the
    /// lowest failing height is returned.
    pub async fn resolve(&self, heights: &[u64]) -> Result<HashMap<u64, u64>, ServiceError> {
        let mut unique = heights.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let results: Vec<(u64, Result<u64, ServiceError>)> = stream::iter(unique)
            .map(|height| async move { (height, self.resolve_one(height).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut timestamps = HashMap::with_capacity(results.len());
        let mut failure: Option<(u64, ServiceError)> = None;
        for (height, res) in results {
            match res {
                Ok(timestamp) => {
                    timestamps.insert(height, timestamp);
                }
                Err(err) => {
                    if failure.as_ref().map_or(true, |(lowest, _)| height < *lowest) {
                        failure = Some((height, err));
                    }
                }
            }
        }

        match failure {
            Some((_, err)) => Err(err),
            None => Ok(timestamps),
        }
    }

    async fn resolve_one(&self, height: u64) -> Result<u64, ServiceError> {
        if self.cancel.is_cancelled() {
            return Err(ServiceError::Cancelled(RunStage::ResolvingTimestamps));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(ServiceError::Cancelled(RunStage::ResolvingTimestamps))
            }
            res = self.lookup(height) => res,
        }
    }

    async fn lookup(&self, height: u64) -> Result<u64, ServiceError> {
        if let Some(db) = &self.cache {
            let cached = retry_call(
                &self.retry,
                &self.cancel,
                format!("Reading timestamp of block {height}"),
                || db.get_block_timestamp(height),
            )
            .await
            .map_err(|source| ServiceError::Cache { height, source })?;
            if let Some(timestamp) = cached {
                tracing::trace!("Timestamp of block {} served from cache", height);
                return Ok(timestamp);
            }
        }

        let timestamp = retry_call(
            &self.retry,
            &self.cancel,
            format!("Fetching header of block {height}"),
            || self.headers.block_timestamp(height),
        )
        .await
        .map_err(|source| ServiceError::HeaderFetch { height, source })?;

        if let Some(db) = &self.cache {
            let outcome = retry_call(
                &self.retry,
                &self.cancel,
                format!("Storing timestamp of block {height}"),
                || db.add_block(height, timestamp),
            )
            .await
            .map_err(|source| ServiceError::Cache { height, source })?;
            if outcome == UpsertOutcome::AlreadyPresent {
                tracing::debug!("Timestamp of block {} was stored concurrently", height);
            }
        }

        Ok(timestamp)
    }
}

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

use std::{num::NonZeroU64, sync::Arc, time::Duration};

use klangbaach_indexer::db::DbObj;
use klangbaach_indexer::pair::{
    DataPoint, PairIndexerConfig, PairIndexerService, RetryPolicy, TagSet,
};
use klangbaach_indexer::test_utils::{MemorySink, MockChain};
use tokio_util::sync::CancellationToken;

pub const PAIR_NAME: &str = "WETH/USDC";

/// Timestamp of `height` on the mock chain.
pub fn block_time(height: u64) -> u64 {
    1_600_000_000 + 12 * height
}

pub fn config(batch_size: u64) -> PairIndexerConfig {
    PairIndexerConfig {
        batch_size: NonZeroU64::new(batch_size).unwrap(),
        timestamp_concurrency: 4,
        retry: RetryPolicy {
            retries: 3,
            delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            call_timeout: Duration::from_secs(5),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub sink: Arc<MemorySink>,
    pub cancel: CancellationToken,
}

impl Harness {
    /// Chain with headers for blocks `0..=head`.
    pub fn new(head: u64) -> Self {
        let chain = Arc::new(MockChain::new());
        chain.set_timestamps((0..=head).map(|h| (h, block_time(h))));
        Self { chain, sink: Arc::new(MemorySink::default()), cancel: CancellationToken::new() }
    }

    pub fn service(&self, cache: Option<DbObj>, config: PairIndexerConfig) -> PairIndexerService {
        self.service_with_tags(cache, config, &TagSet::new(PAIR_NAME, None))
    }

    pub fn service_with_tags(
        &self,
        cache: Option<DbObj>,
        config: PairIndexerConfig,
        tags: &TagSet,
    ) -> PairIndexerService {
        PairIndexerService::new(
            self.chain.clone(),
            self.chain.clone(),
            cache,
            self.sink.clone(),
            tags,
            config,
            self.cancel.clone(),
        )
    }
}

/// Field values of a point, in reserve0, reserve1, volume0, volume1 order.
pub fn fields(point: &DataPoint) -> [&str; 4] {
    ["reserve0", "reserve1", "volume0", "volume1"].map(|name| point.fields[name].as_str())
}

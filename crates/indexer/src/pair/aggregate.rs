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

use std::collections::BTreeMap;

use num_bigint::BigUint;

use super::events::PairEvent;

/// How Sync events within one block combine into the block's reserves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReservePolicy {
    /// Sum the reserves of every Sync event in the block.
    #[default]
    Additive,
    /// Keep the reserves of the last Sync event in the block.
    LastValue,
}

/// Per-block reserves and incoming volumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulator {
    pub reserve0: BigUint,
    pub reserve1: BigUint,
    pub volume0: BigUint,
    pub volume1: BigUint,
}

impl Accumulator {
    fn apply(&mut self, event: &PairEvent, policy: ReservePolicy) {
        match event {
            PairEvent::Sync(sync) => match policy {
                ReservePolicy::Additive => {
                    self.reserve0 += &sync.reserve0;
                    self.reserve1 += &sync.reserve1;
                }
                ReservePolicy::LastValue => {
                    self.reserve0.clone_from(&sync.reserve0);
                    self.reserve1.clone_from(&sync.reserve1);
                }
            },
            // Volume only counts the incoming side of a swap.
            PairEvent::Swap(swap) => {
                self.volume0 += &swap.amount0_in;
                self.volume1 += &swap.amount1_in;
            }
        }
    }
}

/// Folds the decoded events of one batch into one [Accumulator] per block.
#[derive(Debug, Default)]
pub struct Aggregator {
    policy: ReservePolicy,
    accumulators: BTreeMap<u64, Accumulator>,
    events: usize,
}

impl Aggregator {
    pub fn new(policy: ReservePolicy) -> Self {
        Self { policy, ..Default::default() }
    }

    pub fn fold(&mut self, height: u64, event: &PairEvent) {
        self.accumulators.entry(height).or_default().apply(event, self.policy);
        self.events += 1;
    }

    pub fn get(&self, height: u64) -> Option<&Accumulator> {
        self.accumulators.get(&height)
    }

    /// Blocks with at least one folded event, ascending.
    pub fn heights(&self) -> Vec<u64> {
        self.accumulators.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.events
    }

    pub fn into_accumulators(self) -> BTreeMap<u64, Accumulator> {
        self.accumulators
    }
}

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

use std::num::NonZeroU64;
use std::ops::RangeInclusive;

/// Splits `[start, last]` into contiguous, non-overlapping block ranges of at most
/// `batch_size` blocks. The last range always ends at `last`.
///
/// The iterator is lazy and can be cloned to restart the scan from its current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRanges {
    next: Option<u64>,
    last: u64,
    batch_size: NonZeroU64,
}

impl BlockRanges {
    pub fn new(start: u64, last: u64, batch_size: NonZeroU64) -> Self {
        let next = (start <= last).then_some(start);
        Self { next, last, batch_size }
    }

    /// Number of ranges left to yield.
    pub fn remaining(&self) -> u64 {
        match self.next {
            Some(from) => (self.last - from) / self.batch_size.get() + 1,
            None => 0,
        }
    }
}

impl Iterator for BlockRanges {
    type Item = RangeInclusive<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        let from = self.next?;
        let to = from.saturating_add(self.batch_size.get() - 1).min(self.last);
        self.next = if to == self.last { None } else { Some(to + 1) };
        Some(from..=to)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).ok();
        (remaining.unwrap_or(usize::MAX), remaining)
    }
}

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

//! Classification and decoding of Uniswap v2 pair log entries.

use alloy::primitives::{Bytes, LogData, Uint, B256};
use alloy::sol_types::SolEvent;
use num_bigint::BigUint;
use thiserror::Error;

alloy::sol! {
    interface IUniswapV2Pair {
        event Swap(
            address indexed sender,
            uint256 amount0In,
            uint256 amount1In,
            uint256 amount0Out,
            uint256 amount1Out,
            address indexed to
        );
        event Sync(uint112 reserve0, uint112 reserve1);
    }
}

/// Event signatures requested from the log source.
pub const PAIR_EVENT_SIGNATURES: &[B256] =
    &[IUniswapV2Pair::Swap::SIGNATURE_HASH, IUniswapV2Pair::Sync::SIGNATURE_HASH];

/// A log entry as returned by the log source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogEntry {
    pub height: u64,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl RawLogEntry {
    pub fn from_log_data(height: u64, log: LogData) -> Self {
        let topics = log.topics().to_vec();
        Self { height, topics, data: log.data }
    }

    /// Event signature hash of the entry, if any.
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapEvent {
    pub amount0_in: BigUint,
    pub amount1_in: BigUint,
    pub amount0_out: BigUint,
    pub amount1_out: BigUint,
}

/// Absolute pool reserves right after the emitting transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncEvent {
    pub reserve0: BigUint,
    pub reserve1: BigUint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairEvent {
    Swap(SwapEvent),
    Sync(SyncEvent),
}

/// Payload of a known event did not match its ABI.
#[derive(Error, Debug)]
#[error("Failed to decode {event} log at block {height} (topic0 0x{topic:x}): {source}")]
pub struct DecodeError {
    pub height: u64,
    pub event: &'static str,
    pub topic: B256,
    #[source]
    pub source: alloy::sol_types::Error,
}

fn to_biguint<const BITS: usize, const LIMBS: usize>(value: Uint<BITS, LIMBS>) -> BigUint {
    BigUint::from_bytes_be(&value.to_be_bytes_vec())
}

/// Decodes a Swap or Sync entry. Entries with any other topic0, or without topics,
/// yield `Ok(None)`.
pub fn decode_log(entry: &RawLogEntry) -> Result<Option<PairEvent>, DecodeError> {
    let Some(topic) = entry.topic0().copied() else {
        return Ok(None);
    };
    let decode_error = |event: &'static str, source: alloy::sol_types::Error| DecodeError {
        height: entry.height,
        event,
        topic,
        source,
    };

    if topic == IUniswapV2Pair::Sync::SIGNATURE_HASH {
        let sync =
            IUniswapV2Pair::Sync::decode_raw_log(entry.topics.iter().copied(), &entry.data)
                .map_err(|e| decode_error("Sync", e))?;
        return Ok(Some(PairEvent::Sync(SyncEvent {
            reserve0: to_biguint(sync.reserve0),
            reserve1: to_biguint(sync.reserve1),
        })));
    }

    if topic == IUniswapV2Pair::Swap::SIGNATURE_HASH {
        let swap =
            IUniswapV2Pair::Swap::decode_raw_log(entry.topics.iter().copied(), &entry.data)
                .map_err(|e| decode_error("Swap", e))?;
        return Ok(Some(PairEvent::Swap(SwapEvent {
            amount0_in: to_biguint(swap.amount0In),
            amount1_in: to_biguint(swap.amount1In),
            amount0_out: to_biguint(swap.amount0Out),
            amount1_out: to_biguint(swap.amount1Out),
        })));
    }

    Ok(None)
}

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

use alloy::primitives::U256;
use klangbaach_indexer::pair::{
    FieldEncoding, PairIndexerConfig, RawLogEntry, ReservePolicy, TagSet, PAIR_EVENT_SIGNATURES,
};
use klangbaach_indexer::test_utils::{swap_log, sync_log, TestDb};

use super::common::{block_time, config, fields, Harness, PAIR_NAME};

fn swap_in(height: u64, amount0_in: u64, amount1_in: u64) -> RawLogEntry {
    swap_log(height, U256::from(amount0_in), U256::from(amount1_in), U256::from(3), U256::from(4))
}

#[tokio::test]
async fn aggregates_one_batch() {
    let harness = Harness::new(2000);
    harness.chain.add_logs([
        sync_log(1010, 100u64, 200u64),
        swap_in(1010, 5, 0),
        sync_log(1020, 10u64, 10u64),
        sync_log(1020, 10u64, 10u64),
    ]);

    let summary = harness.service(None, config(100)).run(1000, Some(1050)).await.unwrap();
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.points, 2);
    assert_eq!(summary.last_height, 1050);

    let requests = harness.chain.log_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!((requests[0].from, requests[0].to), (1000, 1050));
    assert_eq!(requests[0].topics, PAIR_EVENT_SIGNATURES.to_vec());

    let points = harness.sink.points();
    assert_eq!(points.len(), 2);
    assert_eq!(fields(&points[0]), ["100", "200", "5", "0"]);
    assert_eq!(fields(&points[1]), ["20", "20", "0", "0"]);
    assert_eq!(points[0].timestamp.timestamp() as u64, block_time(1010));
    assert_eq!(points[1].timestamp.timestamp() as u64, block_time(1020));
    for point in &points {
        assert_eq!(point.measurement, "ethereum");
        assert_eq!(point.tags.get("pair").map(String::as_str), Some(PAIR_NAME));
    }
}

#[tokio::test]
async fn last_value_reserves() {
    let harness = Harness::new(2000);
    harness.chain.add_logs([sync_log(1020, 10u64, 10u64), sync_log(1020, 12u64, 8u64)]);

    let config = PairIndexerConfig {
        reserve_policy: ReservePolicy::LastValue,
        ..config(100)
    };
    harness.service(None, config).run(1000, Some(1099)).await.unwrap();

    let points = harness.sink.points();
    assert_eq!(points.len(), 1);
    assert_eq!(fields(&points[0]), ["12", "8", "0", "0"]);
}

#[tokio::test]
async fn blocks_without_events_emit_nothing() {
    let harness = Harness::new(2000);

    let summary = harness.service(None, config(100)).run(1000, Some(1299)).await.unwrap();
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.points, 0);
    assert!(harness.sink.batches().is_empty());
    assert!(harness.chain.header_calls().is_empty());
}

#[tokio::test]
async fn points_are_written_in_block_order() {
    let harness = Harness::new(2000);
    harness.chain.add_logs((1000..1500).step_by(7).map(|h| sync_log(h, h, 1u64)));

    let config = PairIndexerConfig {
        sink_batch_size: 3,
        write_queue_size: 1,
        ..config(50)
    };
    let summary = harness.service(None, config).run(1000, Some(1499)).await.unwrap();
    assert_eq!(summary.batches, 10);

    let heights: Vec<u64> = harness
        .sink
        .points()
        .iter()
        .map(|p| (p.timestamp.timestamp() as u64 - 1_600_000_000) / 12)
        .collect();
    let expected: Vec<u64> = (1000..1500).step_by(7).collect();
    assert_eq!(heights, expected);
    assert_eq!(summary.points, expected.len() as u64);
    assert!(harness.sink.batches().iter().all(|batch| batch.len() <= 3));
}

#[tokio::test]
async fn runs_to_chain_head_by_default() {
    let harness = Harness::new(1250);
    harness.chain.add_logs([sync_log(1249, 1u64, 2u64)]);

    let summary = harness.service(None, config(100)).run(1000, None).await.unwrap();
    assert_eq!(summary.last_height, 1250);
    assert_eq!(summary.batches, 3);
    assert_eq!(harness.chain.head_calls(), 1);

    let ranges: Vec<(u64, u64)> =
        harness.chain.log_requests().iter().map(|f| (f.from, f.to)).collect();
    assert_eq!(ranges, vec![(1000, 1099), (1100, 1199), (1200, 1250)]);
    assert_eq!(harness.sink.points().len(), 1);
}

#[tokio::test]
async fn second_run_reads_cached_timestamps() {
    let test_db = TestDb::new().await.unwrap();
    let harness = Harness::new(2000);
    harness.chain.add_logs([sync_log(1030, 7u64, 9u64), swap_in(1031, 1, 2)]);

    harness.service(Some(test_db.get_db()), config(100)).run(1000, Some(1099)).await.unwrap();
    assert_eq!(harness.chain.header_calls_for(1030), 1);
    assert_eq!(harness.chain.header_calls_for(1031), 1);

    harness.service(Some(test_db.get_db()), config(100)).run(1000, Some(1099)).await.unwrap();
    assert_eq!(harness.chain.header_calls_for(1030), 1);
    assert_eq!(harness.chain.header_calls_for(1031), 1);

    // Both runs emit identical points; the store deduplicates them.
    let batches = harness.sink.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], batches[1]);
}

#[tokio::test]
async fn hex_fields_and_chain_tag() {
    let harness = Harness::new(2000);
    let big = (U256::from(1) << 100) + U256::from(1);
    harness.chain.add_logs([swap_log(1010, big, U256::ZERO, U256::ZERO, U256::from(9))]);

    let config = PairIndexerConfig { encoding: FieldEncoding::Hex, ..config(100) };
    let tags = TagSet::new(PAIR_NAME, Some("mainnet".to_string()));
    harness.service_with_tags(None, config, &tags).run(1000, Some(1099)).await.unwrap();

    let points = harness.sink.points();
    assert_eq!(fields(&points[0]), ["0x00", "0x00", "0x10000000000000000000000001", "0x00"]);
    assert_eq!(points[0].tags.get("chain").map(String::as_str), Some("mainnet"));
    assert_eq!(
        FieldEncoding::Hex.decode(fields(&points[0])[2]).unwrap().to_string(),
        "1267650600228229401496703205377"
    );
}

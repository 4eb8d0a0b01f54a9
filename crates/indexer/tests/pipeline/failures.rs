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

use alloy::primitives::{Bytes, U256};
use async_trait::async_trait;
use klangbaach_indexer::pair::{
    LogFilter, LogSource, PairIndexerService, RawLogEntry, RunStage, ServiceError, SinkError,
    SourceError, TagSet,
};
use klangbaach_indexer::test_utils::{swap_log, sync_log, MockChain};
use tokio_util::sync::CancellationToken;

use super::common::{block_time, config, Harness, PAIR_NAME};

/// Serves logs from the mock chain and cancels the run once the range starting at
/// `cancel_from` has been fetched.
struct CancellingSource {
    chain: Arc<MockChain>,
    cancel_from: u64,
    cancel: CancellationToken,
}

#[async_trait]
impl LogSource for CancellingSource {
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLogEntry>, SourceError> {
        let logs = self.chain.get_logs(filter).await;
        if filter.from == self.cancel_from {
            self.cancel.cancel();
        }
        logs
    }
}

#[tokio::test]
async fn transient_log_errors_retry_the_same_range() {
    let harness = Harness::new(2000);
    harness.chain.add_logs([sync_log(1010, 1u64, 1u64)]);
    harness.chain.fail_next_logs(SourceError::Transient("429 Too Many Requests".into()));
    harness.chain.fail_next_logs(SourceError::Transient("503 Service Unavailable".into()));

    let summary = harness.service(None, config(100)).run(1000, Some(1099)).await.unwrap();
    assert_eq!(summary.points, 1);

    let ranges: Vec<(u64, u64)> =
        harness.chain.log_requests().iter().map(|f| (f.from, f.to)).collect();
    assert_eq!(ranges, vec![(1000, 1099); 3]);
}

#[tokio::test]
async fn exhausted_retries_abort_with_range() {
    let harness = Harness::new(2000);
    for _ in 0..4 {
        harness.chain.fail_next_logs(SourceError::Transient("rate limited".into()));
    }

    let err = harness.service(None, config(100)).run(1000, Some(1299)).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::LogFetch { from: 1000, to: 1099, source: SourceError::Transient(_) }
    ));
    assert_eq!(err.stage(), RunStage::Scanning);
    assert_eq!(harness.chain.log_requests().len(), 4);
}

#[tokio::test]
async fn fatal_log_error_is_not_retried() {
    let harness = Harness::new(2000);
    harness.chain.add_logs([sync_log(1010, 1u64, 1u64)]);
    harness.chain.fail_next_logs(SourceError::Transient("busy".into()));

    // First batch succeeds after a retry, second fails for good.
    let service = harness.service(None, config(100));
    let summary = service.run(1000, Some(1099)).await.unwrap();
    assert_eq!(summary.points, 1);

    harness.chain.fail_next_logs(SourceError::Fatal("invalid params".into()));
    let err = service.run(1100, Some(1199)).await.unwrap_err();
    assert!(matches!(err, ServiceError::LogFetch { from: 1100, to: 1199, .. }));
    assert_eq!(harness.chain.log_requests().len(), 3);
}

#[tokio::test]
async fn decode_failure_drops_the_whole_batch() {
    let harness = Harness::new(2000);
    let mut truncated = sync_log(1150, 10u64, 10u64);
    truncated.data = Bytes::from(truncated.data[..40].to_vec());
    harness.chain.add_logs([
        sync_log(1010, 1u64, 1u64),
        sync_log(1120, 2u64, 2u64),
        swap_log(1130, U256::from(1), U256::ZERO, U256::ZERO, U256::from(1)),
        truncated,
        sync_log(1210, 3u64, 3u64),
    ]);

    let err = harness.service(None, config(100)).run(1000, Some(1299)).await.unwrap_err();
    let ServiceError::Decode(decode) = &err else {
        panic!("expected decode error, got {err}");
    };
    assert_eq!(decode.height, 1150);
    assert_eq!(err.stage(), RunStage::Decoding);

    // Only the batch before the failing one reaches the sink.
    let points = harness.sink.points();
    assert_eq!(points.len(), 1);
    assert_eq!(harness.chain.log_requests().len(), 2);
    assert!(harness.chain.header_calls().iter().all(|h| *h < 1100));
}

#[tokio::test]
async fn missing_header_is_fatal() {
    let harness = Harness::new(1050);
    harness.chain.add_logs([sync_log(1040, 1u64, 1u64), sync_log(1080, 1u64, 1u64)]);

    let err = harness.service(None, config(100)).run(1000, Some(1099)).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::HeaderFetch { height: 1080, source: SourceError::MissingBlock(1080) }
    ));
    assert!(harness.sink.points().is_empty());
}

#[tokio::test]
async fn rejected_write_aborts_the_run() {
    let harness = Harness::new(2000);
    harness.chain.add_logs([sync_log(1010, 1u64, 1u64), sync_log(1110, 1u64, 1u64)]);
    harness.sink.fail_next(SinkError::Status { status: 400, body: "unable to parse".into() });

    let err = harness.service(None, config(100)).run(1000, Some(1199)).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Sink { from: 1000, to: 1099, source: SinkError::Status { status: 400, .. } }
    ));
    assert_eq!(err.stage(), RunStage::Writing);
    assert_eq!(harness.sink.write_calls(), 1);
}

#[tokio::test]
async fn rejected_write_stops_scanning() {
    let harness = Harness::new(2000);
    harness.chain.add_logs([sync_log(1010, 1u64, 1u64)]);
    harness.sink.fail_next(SinkError::Status { status: 400, body: "unable to parse".into() });

    let err = harness.service(None, config(10)).run(1000, Some(1999)).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Sink { from: 1010, to: 1019, source: SinkError::Status { status: 400, .. } }
    ));
    // The remaining 98 ranges are empty and are never fetched.
    let requests = harness.chain.log_requests().len();
    assert!(requests <= 3, "scanned {requests} ranges after the writer stopped");
}

#[tokio::test]
async fn unavailable_sink_is_retried() {
    let harness = Harness::new(2000);
    harness.chain.add_logs([sync_log(1010, 1u64, 1u64)]);
    harness.sink.fail_next(SinkError::Status { status: 503, body: "unavailable".into() });

    let summary = harness.service(None, config(100)).run(1000, Some(1099)).await.unwrap();
    assert_eq!(summary.points, 1);
    assert_eq!(harness.sink.write_calls(), 2);
    assert_eq!(harness.sink.points().len(), 1);
}

#[tokio::test]
async fn cancelled_run_stops_between_batches() {
    let harness = Harness::new(2000);
    harness.cancel.cancel();

    let err = harness.service(None, config(100)).run(1000, Some(1999)).await.unwrap_err();
    assert!(matches!(err, ServiceError::Cancelled(RunStage::Scanning)));
    assert!(harness.chain.log_requests().is_empty());
}

#[tokio::test]
async fn cancelled_run_drains_earlier_batches() {
    let harness = Harness::new(2000);
    harness.chain.add_logs([
        sync_log(1010, 1u64, 1u64),
        sync_log(1110, 2u64, 2u64),
        sync_log(1210, 3u64, 3u64),
    ]);
    let source = Arc::new(CancellingSource {
        chain: harness.chain.clone(),
        cancel_from: 1300,
        cancel: harness.cancel.clone(),
    });
    let service = PairIndexerService::new(
        source,
        harness.chain.clone(),
        None,
        harness.sink.clone(),
        &TagSet::new(PAIR_NAME, None),
        config(100),
        harness.cancel.clone(),
    );

    let err = service.run(1000, Some(1999)).await.unwrap_err();
    assert!(matches!(err, ServiceError::Cancelled(RunStage::Scanning)));
    assert_eq!(harness.chain.log_requests().len(), 4);

    let times: Vec<u64> =
        harness.sink.points().iter().map(|p| p.timestamp.timestamp() as u64).collect();
    assert_eq!(times, vec![block_time(1010), block_time(1110), block_time(1210)]);
}

#[tokio::test]
async fn end_before_start_is_rejected() {
    let harness = Harness::new(2000);

    let err = harness.service(None, config(100)).run(1000, Some(999)).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRange { start: 1000, end: 999 }));
    assert!(harness.chain.log_requests().is_empty());
}

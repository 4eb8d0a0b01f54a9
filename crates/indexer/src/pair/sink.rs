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

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::points::DataPoint;
use super::retry::{retry_call, CallTimeout, RetryPolicy, Transient};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Write rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid sink URL: {0}")]
    InvalidUrl(String),

    #[error("Sink call error: {0}")]
    Timeout(#[from] CallTimeout),

    #[error("Sink error: {0}")]
    Error(#[from] anyhow::Error),
}

impl Transient for SinkError {
    fn is_transient(&self) -> bool {
        match self {
            SinkError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            SinkError::Status { status, .. } => *status == 429 || *status >= 500,
            SinkError::Timeout(_) => true,
            SinkError::InvalidUrl(_) | SinkError::Error(_) => false,
        }
    }
}

/// Destination of data points.
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Writes all points or fails; there is no partial success.
    async fn write(&self, points: &[DataPoint]) -> Result<(), SinkError>;
}

/// InfluxDB v2 write API client using line protocol with second precision.
#[derive(Clone, Debug)]
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: Url,
    ready_url: Url,
    token: String,
}

fn endpoint(base_url: &Url, segments: &[&str]) -> Result<Url, SinkError> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| SinkError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl InfluxSink {
    pub fn new(base_url: &Url, token: &str, org: &str, bucket: &str) -> Result<Self, SinkError> {
        let mut write_url = endpoint(base_url, &["api", "v2", "write"])?;
        write_url
            .query_pairs_mut()
            .append_pair("org", org)
            .append_pair("bucket", bucket)
            .append_pair("precision", "s");
        let ready_url = endpoint(base_url, &["ready"])?;

        Ok(Self { client: reqwest::Client::new(), write_url, ready_url, token: token.to_string() })
    }

    /// Whether the InfluxDB instance accepts requests.
    pub async fn ready(&self) -> Result<bool, SinkError> {
        let res = self.client.get(self.ready_url.clone()).send().await?;
        Ok(res.status().is_success())
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write(&self, points: &[DataPoint]) -> Result<(), SinkError> {
        if points.is_empty() {
            return Ok(());
        }

        let body = points.iter().map(DataPoint::to_line_protocol).collect::<Vec<_>>().join("\n");
        let res = self
            .client
            .post(self.write_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SinkError::Status { status: status.as_u16(), body });
        }
        Ok(())
    }
}

/// Splits points into write batches and writes them in order, retrying transient
/// failures.
#[derive(Clone)]
pub struct BatchWriter {
    sink: Arc<dyn PointSink>,
    batch_size: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl BatchWriter {
    pub fn new(
        sink: Arc<dyn PointSink>,
        batch_size: usize,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self { sink, batch_size: batch_size.max(1), retry, cancel }
    }

    /// Returns the number of points written.
    pub async fn flush(&self, points: &[DataPoint]) -> Result<usize, SinkError> {
        for chunk in points.chunks(self.batch_size) {
            let what = format!("Writing {} points", chunk.len());
            retry_call(&self.retry, &self.cancel, what, || self.sink.write(chunk)).await?;
        }
        Ok(points.len())
    }
}

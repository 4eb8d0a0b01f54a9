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

//! Time-series data points and their InfluxDB line protocol rendering.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use num_traits::Num;

use super::aggregate::Accumulator;
use super::tags::TagSet;
use super::ServiceError;

pub const RESERVE0_FIELD: &str = "reserve0";
pub const RESERVE1_FIELD: &str = "reserve1";
pub const VOLUME0_FIELD: &str = "volume0";
pub const VOLUME1_FIELD: &str = "volume1";

/// Text encoding of reserve and volume fields. Values are unbounded integers, so they
/// are stored as strings rather than floats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FieldEncoding {
    /// Base-10 digits.
    #[default]
    Decimal,
    /// `0x` followed by the big-endian bytes in lowercase hex.
    Hex,
}

impl FieldEncoding {
    pub fn encode(&self, value: &BigUint) -> String {
        match self {
            FieldEncoding::Decimal => value.to_str_radix(10),
            FieldEncoding::Hex => format!("0x{}", hex::encode(value.to_bytes_be())),
        }
    }

    pub fn decode(&self, text: &str) -> Option<BigUint> {
        match self {
            FieldEncoding::Decimal => BigUint::from_str_radix(text, 10).ok(),
            FieldEncoding::Hex => {
                let bytes = hex::decode(text.strip_prefix("0x")?).ok()?;
                (!bytes.is_empty()).then(|| BigUint::from_bytes_be(&bytes))
            }
        }
    }
}

/// One time-series sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

// Characters escaped in line protocol keys and tag values.
const TAG_SPECIAL: &[char] = &[',', '=', ' '];

fn escape(text: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl DataPoint {
    /// Renders the point as one line of InfluxDB line protocol with second precision.
    /// Fields are written as string values.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            let (key, value) = (escape(key, TAG_SPECIAL), escape(value, TAG_SPECIAL));
            let _ = write!(line, ",{}={}", key, value);
        }
        for (idx, (key, value)) in self.fields.iter().enumerate() {
            let separator = if idx == 0 { ' ' } else { ',' };
            let _ = write!(
                line,
                "{separator}{}=\"{}\"",
                escape(key, TAG_SPECIAL),
                escape(value, &['"', '\\'])
            );
        }
        let _ = write!(line, " {}", self.timestamp.timestamp());
        line
    }
}

/// Turns per-block accumulators into data points.
#[derive(Debug, Clone)]
pub struct PointBuilder {
    measurement: String,
    tags: BTreeMap<String, String>,
    encoding: FieldEncoding,
}

impl PointBuilder {
    pub fn new(measurement: impl Into<String>, tags: &TagSet, encoding: FieldEncoding) -> Self {
        Self { measurement: measurement.into(), tags: tags.to_map(), encoding }
    }

    pub fn build(
        &self,
        height: u64,
        accumulator: &Accumulator,
        timestamp: u64,
    ) -> Result<DataPoint, ServiceError> {
        let timestamp = i64::try_from(timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(ServiceError::InvalidTimestamp { height, timestamp })?;

        let fields = BTreeMap::from([
            (RESERVE0_FIELD.to_string(), self.encoding.encode(&accumulator.reserve0)),
            (RESERVE1_FIELD.to_string(), self.encoding.encode(&accumulator.reserve1)),
            (VOLUME0_FIELD.to_string(), self.encoding.encode(&accumulator.volume0)),
            (VOLUME1_FIELD.to_string(), self.encoding.encode(&accumulator.volume1)),
        ]);

        Ok(DataPoint {
            measurement: self.measurement.clone(),
            tags: self.tags.clone(),
            fields,
            timestamp,
        })
    }

    /// One point per accumulator, in ascending block order.
    pub fn build_all(
        &self,
        accumulators: &BTreeMap<u64, Accumulator>,
        timestamps: &HashMap<u64, u64>,
    ) -> Result<Vec<DataPoint>, ServiceError> {
        accumulators
            .iter()
            .map(|(&height, accumulator)| {
                let Some(&timestamp) = timestamps.get(&height) else {
                    return Err(ServiceError::MissingTimestamp(height));
                };
                let point = self.build(height, accumulator, timestamp)?;
                tracing::debug!(
                    "Creating datapoint for block {} at {}: reserves {}/{}, volumes {}/{}",
                    height,
                    point.timestamp,
                    accumulator.reserve0,
                    accumulator.reserve1,
                    accumulator.volume0,
                    accumulator.volume1
                );
                Ok(point)
            })
            .collect()
    }
}

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

//! Persistent mapping from block number to block timestamp.

use std::{path::Path, str::FromStr, sync::Arc};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{
    any::{install_default_drivers, AnyConnectOptions, AnyPoolOptions},
    AnyPool, Row,
};

use super::DbError;

// Rows per multi-row insert. Each row binds two parameters.
const BLOCK_INSERT_BATCH_SIZE: usize = 1000;

/// Result of an insert-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The block was already stored with the same timestamp.
    AlreadyPresent,
}

#[async_trait]
pub trait BlockTimestampDb {
    async fn get_block_timestamp(&self, block_numb: u64) -> Result<Option<u64>, DbError>;

    /// Stores the timestamp of a block unless the block is already known.
    ///
    /// Storing a block twice with the same timestamp is a no-op. Storing a different
    /// timestamp for a known block fails with [DbError::TimestampConflict].
    async fn add_block(
        &self,
        block_numb: u64,
        block_timestamp: u64,
    ) -> Result<UpsertOutcome, DbError>;

    /// Bulk variant of [BlockTimestampDb::add_block] that skips known blocks without
    /// comparing timestamps. Returns the number of rows inserted.
    async fn add_blocks(&self, blocks: &[(u64, u64)]) -> Result<u64, DbError>;
}

pub type DbObj = Arc<dyn BlockTimestampDb + Send + Sync>;

#[derive(Debug, Clone)]
pub struct TimestampsDb {
    pool: AnyPool,
}

impl TimestampsDb {
    /// For SQLite use a `sqlite:file_path` URL; for Postgres `postgres://`.
    pub async fn new(conn_str: &str, max_connections: Option<u32>) -> Result<Self, DbError> {
        install_default_drivers();
        let opts = AnyConnectOptions::from_str(conn_str)?;

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.unwrap_or(8))
            .connect_with(opts)
            .await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl BlockTimestampDb for TimestampsDb {
    async fn get_block_timestamp(&self, block_numb: u64) -> Result<Option<u64>, DbError> {
        let result = sqlx::query("SELECT block_timestamp FROM blocks WHERE block_number = $1")
            .bind(block_numb as i64)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = result else {
            return Ok(None);
        };
        let block_timestamp: i64 = row.try_get(0)?;
        Ok(Some(block_timestamp as u64))
    }

    async fn add_block(
        &self,
        block_numb: u64,
        block_timestamp: u64,
    ) -> Result<UpsertOutcome, DbError> {
        let res = sqlx::query(
            "INSERT INTO blocks (block_number, block_timestamp) VALUES ($1, $2)
         ON CONFLICT (block_number) DO NOTHING",
        )
        .bind(block_numb as i64)
        .bind(block_timestamp as i64)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() > 0 {
            return Ok(UpsertOutcome::Inserted);
        }

        match self.get_block_timestamp(block_numb).await? {
            Some(existing) if existing == block_timestamp => Ok(UpsertOutcome::AlreadyPresent),
            Some(existing) => Err(DbError::TimestampConflict {
                height: block_numb,
                existing,
                new: block_timestamp,
            }),
            None => Err(DbError::Error(anyhow!(
                "Block {} neither inserted nor found after conflicting insert",
                block_numb
            ))),
        }
    }

    async fn add_blocks(&self, blocks: &[(u64, u64)]) -> Result<u64, DbError> {
        if blocks.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;
        for chunk in blocks.chunks(BLOCK_INSERT_BATCH_SIZE) {
            let values_clauses: Vec<String> = (0..chunk.len())
                .map(|i| format!("(${}, ${})", 2 * i + 1, 2 * i + 2))
                .collect();
            let query = format!(
                "INSERT INTO blocks (block_number, block_timestamp) VALUES {}
                 ON CONFLICT (block_number) DO NOTHING",
                values_clauses.join(",")
            );

            let mut q = sqlx::query(&query);
            for (block_numb, block_timestamp) in chunk {
                q = q.bind(*block_numb as i64).bind(*block_timestamp as i64);
            }
            inserted += q.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(inserted)
    }
}

#[derive(Debug, Deserialize)]
struct TimestampRow {
    height: u64,
    timestamp: u64,
}

/// Loads a `height,timestamp` CSV export (Unix seconds, with header row) into the
/// timestamp cache. Blocks already present are left untouched.
///
/// Returns the number of newly inserted blocks.
pub async fn seed_from_csv(db: &DbObj, path: impl AsRef<Path>) -> Result<u64, DbError> {
    let path = path.as_ref();
    let start = std::time::Instant::now();

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: TimestampRow = record?;
        rows.push((row.height, row.timestamp));
    }

    let inserted = db.add_blocks(&rows).await?;
    tracing::info!(
        "Seeded {} of {} block timestamps from {} in {:?}",
        inserted,
        rows.len(),
        path.display(),
        start.elapsed()
    );
    Ok(inserted)
}

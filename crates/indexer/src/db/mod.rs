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

pub mod timestamps;

use thiserror::Error;

use crate::pair::retry::{CallTimeout, Transient};

pub use timestamps::{seed_from_csv, BlockTimestampDb, DbObj, TimestampsDb, UpsertOutcome};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQL error {0:?}")]
    SqlErr(#[from] sqlx::Error),

    #[error("SQL Migration error {0:?}")]
    MigrateErr(#[from] sqlx::migrate::MigrateError),

    #[error("Block {height} already has timestamp {existing}, refusing to store {new}")]
    TimestampConflict { height: u64, existing: u64, new: u64 },

    #[error("CSV error: {0}")]
    CsvErr(#[from] csv::Error),

    #[error("Database call error: {0}")]
    Timeout(#[from] CallTimeout),

    #[error("Error: {0}")]
    Error(#[from] anyhow::Error),
}

impl Transient for DbError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::SqlErr(sqlx::Error::Io(_))
                | DbError::SqlErr(sqlx::Error::PoolTimedOut)
                | DbError::SqlErr(sqlx::Error::Tls(_))
                | DbError::Timeout(_)
        )
    }
}

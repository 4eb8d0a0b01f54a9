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

use std::{num::NonZeroU64, path::PathBuf, sync::Arc, time::Duration};

use alloy::{primitives::Address, providers::ProviderBuilder};
use anyhow::{bail, Context, Result};
use clap::Parser;
use klangbaach_indexer::db::{seed_from_csv, DbObj, TimestampsDb};
use klangbaach_indexer::pair::{
    FieldEncoding, InfluxSink, PairIndexerConfig, PairIndexerService, ReservePolicy, RetryPolicy,
    RpcSource, TagSet, DEFAULT_MEASUREMENT,
};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Indexes reserves and volumes of a Uniswap v2 pair into InfluxDB.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MainArgs {
    /// URL of the Ethereum RPC endpoint.
    #[clap(short, long, env)]
    rpc_url: Url,
    /// Address of the Uniswap v2 pair contract.
    #[clap(short, long, env, default_value = "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc")]
    pair_address: Address,
    /// Value of the `pair` tag. Resolved from the token symbols when not set.
    #[clap(short = 'n', long, env)]
    pair_name: Option<String>,
    /// Value of the `chain` tag. Derived from the chain id when not set.
    #[clap(long, env)]
    chain_name: Option<String>,
    /// Starting block number.
    #[clap(short, long, env, default_value = "10019997")]
    start_block: u64,
    /// Ending block number. Defaults to the chain head at start-up.
    #[clap(short, long, env)]
    end_block: Option<u64>,
    /// Number of blocks covered by each log request.
    #[clap(short, long, default_value = "100")]
    batch_size: NonZeroU64,
    /// Optional DB connection string of the block timestamp cache.
    #[clap(long, env = "DATABASE_URL")]
    db: Option<String>,
    /// Optional CSV file of `height,timestamp` rows loaded into the cache before the run.
    #[clap(short = 'm', long, env)]
    height_timestamps: Option<PathBuf>,
    /// URL of the InfluxDB API.
    #[clap(short, long, env)]
    influx_url: Url,
    /// InfluxDB authentication token.
    #[clap(short = 't', long, env, hide_env_values = true)]
    influx_token: String,
    /// InfluxDB organization name.
    #[clap(short = 'o', long, env, default_value = "optakt")]
    influx_org: String,
    /// InfluxDB bucket name.
    #[clap(short = 'u', long, env, default_value = "uniswap")]
    influx_bucket: String,
    /// Measurement name of the data points.
    #[clap(long, env, default_value = DEFAULT_MEASUREMENT)]
    measurement: String,
    /// Text encoding of reserve and volume fields.
    #[clap(long, env, value_enum, default_value_t = FieldEncoding::Decimal)]
    field_encoding: FieldEncoding,
    /// How multiple Sync events in one block combine.
    #[clap(long, env, value_enum, default_value_t = ReservePolicy::Additive)]
    reserve_policy: ReservePolicy,
    /// Maximum number of block timestamps resolved concurrently.
    #[clap(long, default_value = "16")]
    timestamp_concurrency: usize,
    /// Maximum number of points per InfluxDB write.
    #[clap(long, default_value = "5000")]
    sink_batch_size: usize,
    /// Number of retries of a failed external call before quitting.
    #[clap(long, default_value = "10")]
    retries: u32,
    /// Delay in milliseconds before the first retry; doubles after each retry.
    #[clap(long, default_value = "1000")]
    retry_delay_ms: u64,
    /// Timeout in seconds of a single external call.
    #[clap(long, default_value = "30")]
    call_timeout: u64,
    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = MainArgs::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let retry = RetryPolicy {
        retries: args.retries,
        delay: Duration::from_millis(args.retry_delay_ms),
        call_timeout: Duration::from_secs(args.call_timeout),
        ..Default::default()
    };
    let config = PairIndexerConfig {
        pair_address: args.pair_address,
        batch_size: args.batch_size,
        measurement: args.measurement.clone(),
        encoding: args.field_encoding,
        reserve_policy: args.reserve_policy,
        timestamp_concurrency: args.timestamp_concurrency,
        sink_batch_size: args.sink_batch_size,
        retry,
        ..Default::default()
    };

    let cache: Option<DbObj> = match &args.db {
        Some(db_url) => {
            let db: DbObj = Arc::new(TimestampsDb::new(db_url, None).await?);
            if let Some(path) = &args.height_timestamps {
                seed_from_csv(&db, path)
                    .await
                    .with_context(|| format!("Failed to seed timestamps from {}", path.display()))?;
            }
            Some(db)
        }
        None => {
            if args.height_timestamps.is_some() {
                bail!("--height-timestamps requires a timestamp cache (--db)");
            }
            tracing::info!("No timestamp cache configured, fetching every block header");
            None
        }
    };

    let sink = Arc::new(InfluxSink::new(
        &args.influx_url,
        &args.influx_token,
        &args.influx_org,
        &args.influx_bucket,
    )?);
    if !sink.ready().await.context("Failed to reach InfluxDB")? {
        bail!("InfluxDB at {} is not ready", args.influx_url);
    }

    let provider = ProviderBuilder::new()
        .disable_recommended_fillers()
        .connect_http(args.rpc_url.clone());
    let tags = TagSet::resolve(
        &provider,
        args.pair_address,
        args.pair_name.clone(),
        args.chain_name.clone(),
    )
    .await
    .context("Failed to resolve pair tags")?;
    tracing::info!("Tagging points with {:?}", tags.to_map());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Received Ctrl-C, stopping after the current batch");
        shutdown.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received second Ctrl-C, exiting without draining");
            std::process::exit(130);
        }
    });

    let source = Arc::new(RpcSource::new(provider));
    let service =
        PairIndexerService::new(source.clone(), source, cache, sink, &tags, config, cancel);

    if let Err(err) = service.run(args.start_block, args.end_block).await {
        bail!("FATAL: Error running the pair indexer: {err}");
    }
    tracing::info!("Pair indexer completed successfully");

    Ok(())
}

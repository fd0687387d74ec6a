use chrono::NaiveDate;
use clap::Parser;
use db::BlockRange;
use serde::{Deserialize, Serialize};
use std::{env, fs};
use tracing::warn;

use crate::error::{IndexerError, IndexerResult};

#[derive(Parser, Debug, Default)]
#[clap(about = "Ingests raw Ethereum blocks and decodes them into relational tables")]
pub struct CLIArguments {
    #[clap(long, value_parser)]
    pub config_path: Option<String>,

    /// First block to process (inclusive).
    #[clap(long, value_parser)]
    pub start_block: Option<u64>,

    /// Last block to process (inclusive).
    #[clap(long, value_parser)]
    pub end_block: Option<u64>,

    /// Process every block of a UTC day, as YYYY-MM-DD.
    #[clap(long, value_parser)]
    pub date: Option<String>,

    #[clap(long, value_parser)]
    pub batch_size: Option<usize>,

    #[clap(long, value_parser)]
    pub max_workers: Option<usize>,

    #[clap(long, value_parser)]
    pub decode_batch_size: Option<usize>,

    #[clap(long, action)]
    pub skip_ingest: bool,

    #[clap(long, action)]
    pub skip_decode: bool,

    #[clap(long, action)]
    pub debug: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct IndexerConfig {
    pub rpc_endpoint: Option<String>,
    pub batch_size: usize,
    pub max_workers: usize,
    pub decode_batch_size: usize,
    pub token_memory_cache: bool,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    pub date: Option<String>,
    pub skip_ingest: bool,
    pub skip_decode: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            rpc_endpoint: None,
            batch_size: 20,
            max_workers: 1,
            decode_batch_size: 5,
            token_memory_cache: true,
            start_block: None,
            end_block: None,
            date: None,
            skip_ingest: false,
            skip_decode: false,
        }
    }
}

/// What a run covers: an explicit block range or one calendar day.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RunTarget {
    Range(BlockRange),
    Date(NaiveDate),
}

impl IndexerConfig {
    /// Command line flags win over the file.
    pub fn apply_cli(&mut self, cli: &CLIArguments) {
        if cli.start_block.is_some() || cli.end_block.is_some() || cli.date.is_some() {
            self.start_block = cli.start_block;
            self.end_block = cli.end_block;
            self.date = cli.date.clone();
        }
        if let Some(batch_size) = cli.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(max_workers) = cli.max_workers {
            self.max_workers = max_workers;
        }
        if let Some(decode_batch_size) = cli.decode_batch_size {
            self.decode_batch_size = decode_batch_size;
        }
        self.skip_ingest |= cli.skip_ingest;
        self.skip_decode |= cli.skip_decode;
    }

    /// `RPC_URL` overrides the configured endpoint.
    pub fn apply_env(&mut self) {
        if let Ok(url) = env::var("RPC_URL") {
            if !url.trim().is_empty() {
                self.rpc_endpoint = Some(url);
            }
        }
    }

    pub fn rpc_endpoint(&self) -> IndexerResult<&str> {
        self.rpc_endpoint
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                IndexerError::ConfigError("no RPC endpoint: set RPC_URL or rpc_endpoint".to_string())
            })
    }

    pub fn target(&self) -> IndexerResult<RunTarget> {
        match (self.start_block, self.end_block, self.date.as_deref()) {
            (None, None, Some(date)) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(RunTarget::Date)
                .map_err(|e| IndexerError::ConfigError(format!("invalid date {}: {}", date, e))),
            (Some(start), Some(end), None) if start <= end => {
                Ok(RunTarget::Range(BlockRange::new(start, end)))
            }
            (Some(start), Some(end), None) => Err(IndexerError::ConfigError(format!(
                "start block {} is after end block {}",
                start, end
            ))),
            (_, _, Some(_)) => Err(IndexerError::ConfigError(
                "a date cannot be combined with a block range".to_string(),
            )),
            _ => Err(IndexerError::ConfigError(
                "give both --start-block and --end-block, or --date".to_string(),
            )),
        }
    }
}

pub(crate) fn load_config(config_path: &str) -> IndexerConfig {
    if config_path.is_empty() {
        return IndexerConfig::default();
    }
    match fs::read_to_string(config_path) {
        Ok(file_str) => match toml::from_str(&file_str) {
            Ok(config) => config,
            Err(e) => {
                warn!("error...loading default config {}", e);
                IndexerConfig::default()
            }
        },
        Err(e) => {
            warn!("cannot read {}: {}, loading default config", config_path, e);
            IndexerConfig::default()
        }
    }
}

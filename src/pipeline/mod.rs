//! Batch settlement pipeline
//!
//! This module runs a complete batch: it opens the seeded accounts, builds
//! the rate provider chain, streams the operations file through the
//! settlement engine in batches, waits for outstanding compensations and
//! writes the final account states.
//!
//! # Architecture
//!
//! ```text
//! SettlementPipeline
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── SettlementConfig (rates, amounts, compensation channel)
//!     ├── RateSources → Vec<Arc<dyn RateProvider>>
//!     ├── SyncReader (accounts.csv, rates.csv)
//!     ├── AsyncReader (operations.csv, batch reading)
//!     ├── BatchProcessor (key partitioning + tokio tasks)
//!     └── SettlementEngine (ledger, orchestrator, payments, compensation)
//! ```
//!
//! # Ordering
//!
//! Batches run one after another. Within a batch, operations sharing a
//! partition key run in input order and partitions run in parallel.

pub mod batch_processor;

pub use batch_processor::{BatchProcessor, BatchReport, OperationOutcome, ProcessingResult};

use crate::config::SettlementConfig;
use crate::core::SettlementEngine;
use crate::io::csv_format::write_accounts_csv;
use crate::io::{AsyncReader, SyncReader};
use crate::rates::{LocalBankRateProvider, OpenRatesProvider, RateProvider, StaticRateProvider};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Configuration for batch processing
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of operations per batch
    pub batch_size: usize,
    /// Worker threads of the processing runtime
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a BatchConfig with custom values
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = default.batch_size,
                "Invalid batch_size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "Invalid max_concurrent_batches, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Where exchange rates come from, in priority order
#[derive(Clone, Debug, Default)]
pub struct RateSources {
    /// Local bank endpoint and API key; consulted first
    pub local_bank: Option<(String, String)>,
    /// Open rates API base URL; consulted second
    pub open_rates_url: Option<String>,
    /// Static rate table file; consulted last
    pub rates_file: Option<PathBuf>,
}

impl RateSources {
    /// Build the provider chain
    ///
    /// # Errors
    ///
    /// Returns an error if the rates file cannot be opened. Invalid rows in
    /// it are logged and skipped.
    pub fn providers(&self) -> Result<Vec<Arc<dyn RateProvider>>, String> {
        let mut providers: Vec<Arc<dyn RateProvider>> = Vec::new();

        if let Some((url, key)) = &self.local_bank {
            providers.push(Arc::new(LocalBankRateProvider::new(url.clone(), key.clone())));
        }
        if let Some(url) = &self.open_rates_url {
            providers.push(Arc::new(OpenRatesProvider::new(url.clone())));
        }
        if let Some(path) = &self.rates_file {
            let mut table = StaticRateProvider::new("rates-file");
            for row in SyncReader::rates(path)? {
                match row {
                    Ok((base, quote, rate)) => table.insert(base, quote, rate),
                    Err(e) => warn!(file = %path.display(), error = %e, "Skipping rate row"),
                }
            }
            info!(file = %path.display(), pairs = table.len(), "Loaded rate table");
            providers.push(Arc::new(table));
        }

        Ok(providers)
    }
}

/// Counters for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub accounts_opened: usize,
    pub operations_applied: usize,
    pub operations_rejected: usize,
    pub rows_skipped: u64,
    pub compensations: usize,
}

/// Batch settlement over CSV inputs
#[derive(Debug, Clone)]
pub struct SettlementPipeline {
    batch: BatchConfig,
    settlement: SettlementConfig,
    sources: RateSources,
}

impl SettlementPipeline {
    pub fn new(batch: BatchConfig, settlement: SettlementConfig, sources: RateSources) -> Self {
        Self {
            batch,
            settlement,
            sources,
        }
    }

    /// Process an operations file and write final account states to `output`
    ///
    /// # Arguments
    ///
    /// * `accounts_path` - Accounts to open before processing
    /// * `operations_path` - Operations to apply
    /// * `output` - Receives the final accounts CSV
    ///
    /// # Errors
    ///
    /// Fatal errors (missing files, runtime creation, output failures) are
    /// returned. Rejected operations and invalid rows are logged and counted
    /// in the summary instead.
    pub fn process(
        &self,
        accounts_path: &Path,
        operations_path: &Path,
        output: &mut dyn Write,
    ) -> Result<RunSummary, String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.batch.max_concurrent_batches)
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let mut summary = RunSummary::default();
            let providers = self.sources.providers()?;
            let engine = SettlementEngine::start(providers, self.settlement.clone());

            for seed in SyncReader::accounts(accounts_path)? {
                let opened = seed.and_then(|seed| {
                    engine
                        .ledger()
                        .open_account(
                            seed.user,
                            &seed.number,
                            seed.currency,
                            &seed.name,
                            &seed.password,
                            seed.balance,
                        )
                        .map_err(|e| e.to_string())
                });
                match opened {
                    Ok(_) => summary.accounts_opened += 1,
                    Err(e) => warn!(file = %accounts_path.display(), error = %e, "Skipping account row"),
                }
            }

            let processor = BatchProcessor::new(
                Arc::clone(engine.ledger()),
                Arc::clone(engine.orchestrator()),
                Arc::clone(engine.payments()),
            );

            let file = tokio::fs::File::open(operations_path).await.map_err(|e| {
                format!("Failed to open file '{}': {}", operations_path.display(), e)
            })?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.batch.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                let report = processor.process_batch(batch).await;
                for result in &report.results {
                    if result.result.is_ok() {
                        summary.operations_applied += 1;
                    } else {
                        summary.operations_rejected += 1;
                    }
                }
                summary.operations_rejected += report.aborted.len();
            }
            summary.rows_skipped = reader.rejected();

            let ledger = Arc::clone(engine.ledger());
            summary.compensations = engine.shutdown().await;
            let accounts = ledger.all_accounts().await;

            write_accounts_csv(&accounts, self.settlement.amount_scale, output)?;

            info!(
                accounts = summary.accounts_opened,
                applied = summary.operations_applied,
                rejected = summary.operations_rejected,
                skipped = summary.rows_skipped,
                compensations = summary.compensations,
                "Batch settled"
            );
            Ok(summary)
        })
    }
}

use crate::config::SettlementConfig;
use crate::pipeline::{BatchConfig, RateSources};
use clap::Parser;
use std::path::PathBuf;

/// Settle transfers, payments and refunds between accounts
#[derive(Parser, Debug)]
#[command(name = "settlement-engine")]
#[command(about = "Settle transfers, payments and refunds between accounts", long_about = None)]
pub struct CliArgs {
    /// Operations CSV file path
    #[arg(value_name = "OPERATIONS", help = "Path to the operations CSV file")]
    pub operations_file: PathBuf,

    /// Accounts to open before processing
    #[arg(long = "accounts", value_name = "FILE", help = "Path to the accounts CSV file")]
    pub accounts_file: PathBuf,

    /// Static rate table, consulted after any HTTP provider
    #[arg(long = "rates", value_name = "FILE", help = "Path to a base,quote,rate CSV file")]
    pub rates_file: Option<PathBuf>,

    /// Local bank rate endpoint, consulted first
    #[arg(long = "local-bank-url", value_name = "URL", requires = "local_bank_key")]
    pub local_bank_url: Option<String>,

    /// API key for the local bank endpoint
    #[arg(long = "local-bank-key", value_name = "KEY", env = "LOCAL_BANK_API_KEY")]
    pub local_bank_key: Option<String>,

    /// Open rates API base URL
    #[arg(long = "open-rates-url", value_name = "URL")]
    pub open_rates_url: Option<String>,

    /// Number of operations per batch
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of operations per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Worker threads for batch processing
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Worker threads for batch processing (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// Seconds a fetched rate stays fresh
    #[arg(long = "rate-ttl", value_name = "SECONDS", default_value_t = 60)]
    pub rate_ttl_secs: u64,

    /// Per-call rate provider timeout
    #[arg(long = "provider-timeout-ms", value_name = "MILLIS", default_value_t = 3000)]
    pub provider_timeout_ms: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long = "log-level", value_name = "FILTER", default_value = "warn")]
    pub log_level: String,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values fall back to the defaults; zero values are replaced by
    /// `BatchConfig::new` with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    pub fn to_settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            rate_ttl_secs: self.rate_ttl_secs,
            provider_timeout_ms: self.provider_timeout_ms,
            ..SettlementConfig::default()
        }
    }

    pub fn to_rate_sources(&self) -> RateSources {
        RateSources {
            local_bank: self
                .local_bank_url
                .clone()
                .zip(self.local_bank_key.clone()),
            open_rates_url: self.open_rates_url.clone(),
            rates_file: self.rates_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::batch_size(&["program", "--accounts", "a.csv", "--batch-size", "2000", "ops.csv"], Some(2000), None)]
    #[case::max_concurrent(&["program", "--accounts", "a.csv", "--max-concurrent", "8", "ops.csv"], None, Some(8))]
    #[case::no_options(&["program", "--accounts", "a.csv", "ops.csv"], None, None)]
    fn test_config_options(
        #[case] args: &[&str],
        #[case] batch_size: Option<usize>,
        #[case] max_concurrent: Option<usize>,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.batch_size, batch_size);
        assert_eq!(parsed.max_concurrent_batches, max_concurrent);
    }

    #[rstest]
    #[case::all_defaults(&["program", "--accounts", "a.csv", "ops.csv"], 1000, num_cpus::get())]
    #[case::all_custom(
        &["program", "--accounts", "a.csv", "--batch-size", "2000", "--max-concurrent", "8", "ops.csv"],
        2000,
        8
    )]
    #[case::zero_batch_size(&["program", "--accounts", "a.csv", "--batch-size", "0", "ops.csv"], 1000, num_cpus::get())]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_batch_config();
        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_max_concurrent);
    }

    #[test]
    fn test_settlement_config_from_flags() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--accounts",
            "a.csv",
            "--rate-ttl",
            "5",
            "--provider-timeout-ms",
            "250",
            "ops.csv",
        ])
        .unwrap();

        let config = parsed.to_settlement_config();
        assert_eq!(config.rate_ttl_secs, 5);
        assert_eq!(config.provider_timeout_ms, 250);
        assert_eq!(config.amount_scale, SettlementConfig::default().amount_scale);
    }

    #[test]
    fn test_rate_sources_from_flags() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--accounts",
            "a.csv",
            "--rates",
            "rates.csv",
            "--local-bank-url",
            "https://bank.example/rates",
            "--local-bank-key",
            "secret",
            "ops.csv",
        ])
        .unwrap();

        let sources = parsed.to_rate_sources();
        assert_eq!(
            sources.local_bank,
            Some(("https://bank.example/rates".to_string(), "secret".to_string()))
        );
        assert_eq!(sources.open_rates_url, None);
        assert_eq!(sources.rates_file, Some(PathBuf::from("rates.csv")));
    }

    #[rstest]
    #[case::missing_operations(&["program", "--accounts", "a.csv"])]
    #[case::missing_accounts(&["program", "ops.csv"])]
    #[case::bad_batch_size(&["program", "--accounts", "a.csv", "--batch-size", "many", "ops.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}

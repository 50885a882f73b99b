//! End-to-end integration tests
//!
//! These tests validate the complete settlement pipeline using predefined CSV
//! fixtures. Each test:
//! 1. Opens the accounts in accounts.csv
//! 2. Loads rates.csv as the rate table when the fixture has one
//! 3. Processes operations.csv through the engine
//! 4. Compares the accounts output with expected.csv
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Same-currency and cross-currency transfers
//! - Payments and refunds, including repeated and unauthorized refunds
//! - Rejections (funds, credentials, ownership, lookups, rates, malformed rows)
//! - Opposite-direction transfers between the same two accounts
//!
//! Each fixture is run with a batch size of one and with a single large batch.

#[cfg(test)]
mod tests {
    use funds_settlement_engine::pipeline::{BatchConfig, RateSources, SettlementPipeline};
    use funds_settlement_engine::SettlementConfig;
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::NamedTempFile;

    /// Run a fixture and compare its output with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if fixture files are missing or the output differs.
    fn run_test_fixture(fixture_name: &str, batch_size: usize) {
        let fixture_dir = PathBuf::from(format!("tests/fixtures/{}", fixture_name));
        let accounts_path = fixture_dir.join("accounts.csv");
        let operations_path = fixture_dir.join("operations.csv");
        let rates_path = fixture_dir.join("rates.csv");
        let expected_path = fixture_dir.join("expected.csv");

        for path in [&accounts_path, &operations_path, &expected_path] {
            assert!(path.exists(), "Fixture file not found: {}", path.display());
        }

        let sources = RateSources {
            rates_file: rates_path.exists().then_some(rates_path),
            ..RateSources::default()
        };
        let pipeline = SettlementPipeline::new(
            BatchConfig::new(batch_size, 4),
            SettlementConfig::default(),
            sources,
        );

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");
        pipeline
            .process(&accounts_path, &operations_path, &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to process operations: {}", e));
        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path).unwrap_or_else(|e| {
            panic!(
                "Failed to read expected file {}: {}",
                expected_path.display(),
                e
            )
        });

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (batch size: {})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, batch_size, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("same_currency_transfer")]
    #[case("cross_currency_transfer")]
    #[case("payment_refund")]
    #[case("rejections")]
    #[case("opposite_directions")]
    fn test_fixtures(#[case] fixture: &str, #[values(1, 1000)] batch_size: usize) {
        run_test_fixture(fixture, batch_size);
    }

    #[test]
    fn test_missing_accounts_file_is_fatal() {
        let pipeline = SettlementPipeline::new(
            BatchConfig::default(),
            SettlementConfig::default(),
            RateSources::default(),
        );
        let mut output = Vec::new();
        let err = pipeline
            .process(
                Path::new("tests/fixtures/does_not_exist.csv"),
                Path::new("tests/fixtures/same_currency_transfer/operations.csv"),
                &mut output,
            )
            .unwrap_err();
        assert!(err.contains("Failed to open file"));
        assert!(output.is_empty());
    }
}

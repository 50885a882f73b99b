//! Synchronous CSV reader for seed files
//!
//! Provides a streaming iterator over the rows of the accounts and rates
//! files, which are loaded once before any operation runs.
//! Delegates CSV format concerns to the csv_format module.
//!
//! # Iterator Interface
//!
//! SyncReader implements the Iterator trait, yielding `Result<T, String>` for
//! each CSV row:
//!
//! ```no_run
//! use funds_settlement_engine::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::accounts(Path::new("accounts.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(seed) => println!("Opening account {}", seed.number),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from the constructors
//! - Individual record parsing errors are yielded as Err variants in the iterator
//! - Line numbers are included in error messages for debugging

use crate::io::csv_format::{convert_account_record, convert_rate_record, AccountCsv, RateCsv};
use crate::types::{AccountSeed, Currency};
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;

/// Synchronous CSV reader
///
/// Deserializes each row as `Raw` and converts it into `T`.
#[derive(Debug)]
pub struct SyncReader<Raw, T> {
    reader: csv::Reader<File>,
    line_num: usize,
    convert: fn(Raw) -> Result<T, String>,
}

impl SyncReader<AccountCsv, AccountSeed> {
    /// Open an accounts file
    pub fn accounts(path: &Path) -> Result<Self, String> {
        Self::open(path, convert_account_record)
    }
}

impl SyncReader<RateCsv, (Currency, Currency, Decimal)> {
    /// Open a rates file
    pub fn rates(path: &Path) -> Result<Self, String> {
        Self::open(path, convert_rate_record)
    }
}

impl<Raw: DeserializeOwned, T> SyncReader<Raw, T> {
    /// Open a CSV file for streaming iteration
    ///
    /// The CSV reader is configured to:
    /// - Trim whitespace from all fields
    /// - Allow flexible field counts (for optional trailing columns)
    /// - Use an 8KB buffer for efficient I/O
    pub fn open(path: &Path, convert: fn(Raw) -> Result<T, String>) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
            convert,
        })
    }
}

impl<Raw: DeserializeOwned, T> Iterator for SyncReader<Raw, T> {
    type Item = Result<T, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<Raw>();
        let next = deserializer.next()?;
        self.line_num += 1;

        // +1 for the header row
        let line = self.line_num + 1;
        Some(match next {
            Ok(raw) => (self.convert)(raw).map_err(|e| format!("Line {}: {}", line, e)),
            Err(e) => Err(format!("Line {}: CSV parse error: {}", line, e)),
        })
    }
}

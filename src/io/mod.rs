//! I/O module
//!
//! Handles CSV parsing and output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, output serialization)
//! - `sync_reader` - Synchronous reader for the accounts and rates seed files
//! - `async_reader` - Asynchronous batch reader for the operations file

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::{AsyncReader, NumberedOperation};
pub use csv_format::write_accounts_csv;
pub use sync_reader::SyncReader;

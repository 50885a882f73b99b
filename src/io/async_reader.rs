//! Asynchronous CSV reader for the operations file
//!
//! Provides batch reading over operation records so that large operation
//! files are processed with constant memory.
//!
//! # Design
//!
//! The AsyncReader uses:
//! - csv-async for streaming CSV parsing
//! - tokio (through the futures compat layer) for file I/O
//! - Batch reading for efficient processing
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of (line, Operation)
//!                  ↓
//!           csv_format module
//!           (OperationCsv, convert_operation_record)
//! ```

use crate::io::csv_format::{convert_operation_record, OperationCsv};
use crate::types::Operation;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// An operation together with the input line it came from
#[derive(Debug, Clone, PartialEq)]
pub struct NumberedOperation {
    pub line: u64,
    pub operation: Operation,
}

/// Asynchronous CSV reader
///
/// Invalid rows are logged and skipped; they never end a batch early.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    /// Data rows consumed so far, valid or not
    rows_read: u64,
    /// Rows rejected so far
    rejected: u64,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            rows_read: 0,
            rejected: 0,
        }
    }

    /// Read up to `batch_size` valid operations
    ///
    /// # Returns
    ///
    /// Operations in input order. An empty vector means end of input.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<NumberedOperation> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<OperationCsv>();

        while batch.len() < batch_size {
            let Some(next) = records.next().await else {
                break;
            };
            self.rows_read += 1;
            // +1 for the header row
            let line = self.rows_read + 1;

            match next.map_err(|e| e.to_string()).and_then(convert_operation_record) {
                Ok(operation) => batch.push(NumberedOperation { line, operation }),
                Err(e) => {
                    self.rejected += 1;
                    warn!(line, error = %e, "Skipping invalid operation row");
                }
            }
        }

        batch
    }

    /// Number of rows skipped as invalid
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;
    use rust_decimal::Decimal;

    const HEADER: &str = "op,user,from,password,to,amount,reference\n";

    #[tokio::test]
    async fn test_read_batch_in_order() {
        let csv_content = format!(
            "{}transfer,1,A,pw,B,100,\npayment,1,A,pw,B,50,order-1\nrefund,2,,pw-b,,,order-1\n",
            HEADER
        );
        let mut reader = AsyncReader::new(Cursor::new(csv_content.into_bytes()));

        let batch = reader.read_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].line, 2);
        assert_eq!(batch[0].operation.name(), "transfer");
        assert_eq!(batch[1].operation.name(), "payment");

        let batch = reader.read_batch(2).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].line, 4);
        assert_eq!(
            batch[0].operation,
            Operation::Refund {
                user: 2,
                reference: "order-1".to_string(),
                password: "pw-b".to_string(),
            }
        );

        assert!(reader.read_batch(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_rows_are_skipped_and_counted() {
        let csv_content = format!(
            "{}transfer,1,A,pw,B,abc,\nbogus,1,A,pw,B,1,\nnot-a-user,x\ntransfer,1,A,pw,B,7,\n",
            HEADER
        );
        let mut reader = AsyncReader::new(Cursor::new(csv_content.into_bytes()));

        let batch = reader.read_batch(10).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].line, 5);
        match &batch[0].operation {
            Operation::Transfer { amount, .. } => assert_eq!(*amount, Decimal::new(7, 0)),
            other => panic!("unexpected operation {:?}", other),
        }
        assert_eq!(reader.rejected(), 3);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut reader = AsyncReader::new(Cursor::new(HEADER.as_bytes().to_vec()));
        assert!(reader.read_batch(10).await.is_empty());
    }
}

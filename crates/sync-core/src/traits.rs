//! Extractor and Loader capability traits.
//!
//! Each store implements one or both sides. The pipeline drives any
//! `Extractor` into any `Loader`, so adding a store does not touch the
//! pipeline.
//!
//! # Usage Pattern
//!
//! ```ignore
//! pub async fn run<E: Extractor, L: Loader>(extractor: &mut E, loader: &mut L) -> Result<()> {
//!     let batch = extractor.extract(100, &Offset::None).await?;
//!     loader.load(&batch.records).await?;
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use std::fmt;

use crate::offset::Offset;
use crate::values::Record;

/// One page of records pulled from a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub records: Vec<Record>,

    /// Position after this batch. Equal to the input offset when `records`
    /// is empty.
    pub next_offset: Offset,
}

impl Batch {
    pub fn new(records: Vec<Record>, offset: &Offset) -> Self {
        let next_offset = if records.is_empty() {
            offset.clone()
        } else {
            offset.advance(records.len())
        };
        Self {
            records,
            next_offset,
        }
    }

    /// An empty batch marks the end of the source.
    pub fn is_end(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of loading one batch.
///
/// Not every loader fills every counter: the document loader reports
/// `matched`/`updated`/`inserted` from the bulk write result, the
/// relational loader reports `inserted`/`updated` rows and
/// `relation_failures`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Records written to the target
    pub written: usize,
    /// Records dropped (missing id, conversion failure)
    pub skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub matched: usize,
    /// Relation syncs that failed and were rolled back individually
    pub relation_failures: usize,
}

impl LoadSummary {
    pub fn merge(&mut self, other: &LoadSummary) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.matched += other.matched;
        self.relation_failures += other.relation_failures;
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "written={} skipped={} inserted={} updated={} matched={} relation_failures={}",
            self.written,
            self.skipped,
            self.inserted,
            self.updated,
            self.matched,
            self.relation_failures
        )
    }
}

/// Pulls bounded, ordered batches of records out of a store.
///
/// Records come back in the store's own shape (columns for a relational
/// source, fields for a document source), with relation children attached.
#[async_trait::async_trait]
pub trait Extractor: Send {
    /// Table or collection name, used in logs and error context.
    fn source_name(&self) -> &str;

    /// Read up to `batch_size` records starting at `offset`.
    ///
    /// Every record of a static dataset is returned exactly once across
    /// successive calls. An empty batch signals the end of the source.
    async fn extract(&mut self, batch_size: usize, offset: &Offset) -> Result<Batch>;
}

/// Writes batches of records into a store, reshaping them on the way in.
#[async_trait::async_trait]
pub trait Loader: Send {
    /// Table or collection name, used in logs and error context.
    fn target_name(&self) -> &str;

    /// Write one batch. Records that fail conversion are skipped and
    /// counted; store-level failures are returned as errors.
    async fn load(&mut self, records: &[Record]) -> Result<LoadSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Value;

    fn record(id: i64) -> Record {
        Record::from([("id".to_string(), Value::Int(id))])
    }

    #[test]
    fn test_batch_next_offset() {
        let batch = Batch::new(vec![record(1), record(2)], &Offset::Int(10));
        assert_eq!(batch.next_offset, Offset::Int(12));
        assert!(!batch.is_end());

        let empty = Batch::new(vec![], &Offset::Int(12));
        assert_eq!(empty.next_offset, Offset::Int(12));
        assert!(empty.is_end());
    }

    #[test]
    fn test_load_summary_merge() {
        let mut total = LoadSummary::default();
        total.merge(&LoadSummary {
            written: 3,
            skipped: 1,
            inserted: 2,
            updated: 1,
            ..Default::default()
        });
        total.merge(&LoadSummary {
            written: 2,
            relation_failures: 1,
            ..Default::default()
        });
        assert_eq!(total.written, 5);
        assert_eq!(total.skipped, 1);
        assert_eq!(total.relation_failures, 1);
    }
}

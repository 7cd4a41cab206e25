//! Test record repositories
//!
//! The pipeline reads records only through [`TestRecordRepository`]. Two
//! implementations ship with the crate: an in-memory store for embedding and
//! tests, and a file-backed store over a JSON array or NDJSON export of the
//! session database.

use crate::error::QualityError;
use crate::schema::{RawRecordAdapter, RawTestRecord};
use crate::types::{LabeledRecord, TestRecord};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read access to stored test sessions
pub trait TestRecordRepository {
    /// Fetch one record by store id
    fn get_test_record(&self, id: &str) -> Result<TestRecord, QualityError>;

    /// All records carrying a clinician label
    fn list_labeled_corpus(&self) -> Result<Vec<LabeledRecord>, QualityError>;
}

/// Repository over records already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    records: Vec<RawTestRecord>,
    by_id: HashMap<String, usize>,
}

impl InMemoryRepository {
    pub fn new(records: Vec<RawTestRecord>) -> Self {
        let by_id = records
            .iter()
            .enumerate()
            .filter_map(|(idx, r)| r.id.clone().map(|id| (id, idx)))
            .collect();
        Self { records, by_id }
    }

    /// Load a JSON array (`.json`) or NDJSON (any other extension) export
    pub fn from_file(path: &Path) -> Result<Self, QualityError> {
        let content = fs::read_to_string(path)?;
        let records = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            RawRecordAdapter::parse_array(&content)?
        } else {
            RawRecordAdapter::parse_ndjson(&content)?
        };
        debug!(path = %path.display(), records = records.len(), "loaded record export");
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn raw_records(&self) -> &[RawTestRecord] {
        &self.records
    }
}

impl TestRecordRepository for InMemoryRepository {
    fn get_test_record(&self, id: &str) -> Result<TestRecord, QualityError> {
        let idx = self
            .by_id
            .get(id)
            .ok_or_else(|| QualityError::RecordNotFound(id.to_string()))?;
        RawRecordAdapter::to_test_record(&self.records[*idx])
    }

    fn list_labeled_corpus(&self) -> Result<Vec<LabeledRecord>, QualityError> {
        let mut corpus = Vec::new();
        for raw in &self.records {
            if let Some(labeled) = RawRecordAdapter::to_labeled(raw)? {
                corpus.push(labeled);
            }
        }
        Ok(corpus)
    }
}

// Training Data Source Port (export of annotated conversations)

use crate::domain::FilterSpec;
use crate::error::Result;
use async_trait::async_trait;

/// Serialized training examples ready for upload
#[derive(Debug, Clone)]
pub struct ExportPayload {
    pub bytes: Vec<u8>,
    pub example_count: i64,
    pub filename: String,
}

/// Data-export collaborator; the example format is its concern, not ours
#[async_trait]
pub trait TrainingDataSource: Send + Sync {
    /// Build the export for a filter
    async fn export(&self, filter: &FilterSpec) -> Result<ExportPayload>;

    /// Latest mutation of any training-relevant record (epoch ms)
    async fn latest_mutation_at(&self) -> Result<Option<i64>>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

    /// Data source returning a fixed number of examples
    pub struct FixedDataSource {
        example_count: AtomicI64,
        latest_mutation: AtomicI64, // 0 = never mutated
        exports: AtomicUsize,
        failing: AtomicBool,
    }

    impl FixedDataSource {
        pub fn new(example_count: i64) -> Self {
            Self {
                example_count: AtomicI64::new(example_count),
                latest_mutation: AtomicI64::new(0),
                exports: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            }
        }

        pub fn set_example_count(&self, n: i64) {
            self.example_count.store(n, Ordering::SeqCst);
        }

        /// Record a data mutation at `at_millis`
        pub fn touch(&self, at_millis: i64) {
            self.latest_mutation.store(at_millis, Ordering::SeqCst);
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn export_count(&self) -> usize {
            self.exports.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TrainingDataSource for FixedDataSource {
        async fn export(&self, filter: &FilterSpec) -> Result<ExportPayload> {
            self.exports.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::ExternalService("export service down".to_string()));
            }
            let n = self.example_count.load(Ordering::SeqCst);
            let line = format!("{}\n", filter.canonical_json()?);
            Ok(ExportPayload {
                bytes: line.repeat(n.max(0) as usize).into_bytes(),
                example_count: n,
                filename: "training.jsonl".to_string(),
            })
        }

        async fn latest_mutation_at(&self) -> Result<Option<i64>> {
            let at = self.latest_mutation.load(Ordering::SeqCst);
            Ok((at > 0).then_some(at))
        }
    }
}

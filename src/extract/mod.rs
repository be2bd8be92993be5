//! Concurrent extraction pipeline
//!
//! This module bulk-extracts the records matching a filter:
//! - A single page producer drives the remote cursor and publishes raw records
//! - A fixed pool of decode workers turns raw records into typed records
//! - An aggregator collects decoded records until every stage has finished
//! - The first failure anywhere cancels every other stage
//!
//! # Architecture
//!
//! ```text
//! CursorSource -> producer -> [record channel] -> N workers -> [results channel] -> aggregator -> sink
//! ```
//!
//! 1. **CursorSource**: counts and pages through matching records
//! 2. **ProgressReporter**: observes decoded records
//! 3. **PersistenceSink**: receives the finalized result set on success
//!
//! These are orchestrated by the **ExtractionCoordinator**.
//!
//! # Example
//!
//! ```no_run
//! // Example usage (requires MongoDB connection)
//!
//! // let source = Arc::new(MongoCursorSource::new(collection));
//! // let filter = ExtractionFilter::new("code", "no_matching");
//! // let reporter = Arc::new(ProgressTracker::new(true));
//! // let sink = Box::new(JsonFileSink::new("data.json", false)?);
//! // let mut coordinator = ExtractionCoordinator::new(source, filter, reporter, sink)
//! //     .with_options(PipelineOptions::new(100, 10));
//! // let summary = coordinator.execute().await?;
//! ```

pub mod context;
pub mod coordinator;
pub mod producer;
pub mod progress;
pub mod record;
pub mod sink;
pub mod source;
pub mod worker;

pub use context::{PipelineContext, StageGroup};
pub use coordinator::{ExtractionCoordinator, ExtractionSummary, PipelineOptions};
pub use progress::{ProgressReporter, ProgressTracker};
pub use record::{DecodedRecord, ExtractionFilter, RawRecord, ResultSet};
pub use sink::{JsonFileSink, PersistenceSink};
pub use source::{CursorHandle, CursorSource, MongoCursorSource};

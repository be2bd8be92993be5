//! Extraction coordinator for orchestrating a run
//!
//! Wires the cursor source, the page producer, the decode worker pool, the
//! result aggregator and the persistence sink together, and enforces the
//! all-or-nothing outcome of a run.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ExtractionConfig, MAX_CHANNEL_CAPACITY, MAX_PAGE_SIZE, MAX_WORKER_COUNT};
use crate::error::{ConfigError, ExtractError, Result};

use super::context::{PipelineContext, StageGroup};
use super::producer::run_producer;
use super::progress::ProgressReporter;
use super::record::{DecodedRecord, ExtractionFilter, ResultSet};
use super::sink::PersistenceSink;
use super::source::CursorSource;
use super::worker::spawn_workers;

/// Tuning knobs of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Records requested per cursor page
    pub page_size: u32,
    /// Number of concurrent decode workers
    pub worker_count: usize,
    /// Capacity of the record and result channels
    pub channel_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            worker_count: 10,
            channel_capacity: 100,
        }
    }
}

impl PipelineOptions {
    pub fn new(page_size: u32, worker_count: usize) -> Self {
        Self {
            page_size,
            worker_count,
            channel_capacity: page_size as usize,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(invalid_option("page_size", self.page_size));
        }
        if self.worker_count == 0 || self.worker_count > MAX_WORKER_COUNT {
            return Err(invalid_option("worker_count", self.worker_count));
        }
        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(invalid_option("channel_capacity", self.channel_capacity));
        }
        Ok(())
    }
}

fn invalid_option(field: &str, value: impl ToString) -> ExtractError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl From<&ExtractionConfig> for PipelineOptions {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            page_size: config.page_size,
            worker_count: config.worker_count,
            channel_capacity: config.effective_channel_capacity(),
        }
    }
}

/// Result of a successful extraction run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Matching records reported by the source before the run
    pub total_reported: u64,
    /// Records decoded and persisted
    pub records_extracted: u64,
    /// Bytes written by the sink
    pub bytes_written: u64,
    /// Wall time of the run
    pub elapsed_ms: u64,
}

/// Coordinator for extraction runs
///
/// A run is all or nothing: the sink is called exactly once when every
/// stage succeeded, and never otherwise.
pub struct ExtractionCoordinator {
    /// Remote source of raw records
    source: Arc<dyn CursorSource>,
    /// Filter selecting the records to extract
    filter: ExtractionFilter,
    /// Progress reporter for user feedback
    reporter: Arc<dyn ProgressReporter>,
    /// Destination of the finalized result set
    sink: Box<dyn PersistenceSink>,
    /// Pipeline tuning
    options: PipelineOptions,
    /// Parent token; cancelling it aborts the run
    cancel_token: CancellationToken,
}

impl ExtractionCoordinator {
    /// Create a new extraction coordinator
    pub fn new(
        source: Arc<dyn CursorSource>,
        filter: ExtractionFilter,
        reporter: Arc<dyn ProgressReporter>,
        sink: Box<dyn PersistenceSink>,
    ) -> Self {
        Self {
            source,
            filter,
            reporter,
            sink,
            options: PipelineOptions::default(),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Set a parent cancellation token for this run
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Execute the extraction
    ///
    /// 1. Count matching records and size the progress reporter
    /// 2. Start the decode workers and the page producer
    /// 3. Aggregate decoded records until the results channel closes
    /// 4. Join every stage; on any failure return the first error
    /// 5. Otherwise persist the result set once and finish progress
    pub async fn execute(&mut self) -> Result<ExtractionSummary> {
        self.options.validate()?;
        let start_time = Instant::now();

        info!("Starting extraction of records where {}", self.filter);
        let total = self.count_matching().await?;
        self.reporter.start(total);
        info!("{} matching records reported by source", total);

        let ctx = PipelineContext::with_parent(&self.cancel_token);
        let (records_tx, records_rx) = mpsc::channel(self.options.channel_capacity);
        let (results_tx, results_rx) = mpsc::channel(self.options.channel_capacity);

        let mut group = StageGroup::new(ctx.clone());
        spawn_workers(
            &mut group,
            Arc::new(Mutex::new(records_rx)),
            &results_tx,
            self.reporter.clone(),
            self.options.worker_count,
        );
        group.spawn(
            "page-producer",
            run_producer(
                ctx.clone(),
                self.source.clone(),
                self.filter.clone(),
                self.options.page_size,
                records_tx,
            ),
        );
        debug!(
            "Spawned producer and {} decode workers",
            self.options.worker_count
        );

        // Join barrier: the last results sender is only dropped once every
        // stage has finished, which is what closes the results channel.
        let barrier = tokio::spawn(async move {
            let outcome = group.join().await;
            drop(results_tx);
            outcome
        });

        let result_set = aggregate(results_rx).await;

        let joined = match barrier.await {
            Ok(outcome) => outcome,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = joined {
            warn!(
                "Extraction aborted after {} of {} records: {}",
                ctx.processed(),
                total,
                e
            );
            self.reporter.abandon();
            return Err(e);
        }

        if result_set.len() as u64 != total {
            // Documents inserted or removed while the cursor was open
            warn!(
                "Source reported {} matching records but {} were extracted",
                total,
                result_set.len()
            );
        }

        debug!("Persisting {} records", result_set.len());
        let bytes_written = match self.sink.write(&result_set).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.reporter.abandon();
                return Err(e);
            }
        };

        self.reporter.finish("Done");
        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Extraction completed: {} records, {} bytes, {} ms",
            result_set.len(),
            bytes_written,
            elapsed_ms
        );

        Ok(ExtractionSummary {
            total_reported: total,
            records_extracted: result_set.len() as u64,
            bytes_written,
            elapsed_ms,
        })
    }

    /// Count matching records, giving up as soon as the run is cancelled
    async fn count_matching(&self) -> Result<u64> {
        if self.cancel_token.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(ExtractError::Cancelled),
            counted = self.source.count(&self.filter) => counted,
        }
    }
}

/// Single consumer of the results channel.
///
/// Returns once the channel is closed, in arrival order.
async fn aggregate(mut results: mpsc::Receiver<DecodedRecord>) -> ResultSet {
    let mut result_set = ResultSet::new();
    while let Some(record) = results.recv().await {
        result_set.push(record);
    }
    result_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::record::RawRecord;
    use crate::extract::source::CursorHandle;
    use async_trait::async_trait;
    use bson::doc;

    struct TwoPageSource;

    struct TwoPageCursor {
        pages: Vec<Vec<RawRecord>>,
    }

    fn raw(id: &str) -> RawRecord {
        RawRecord::from_document(&doc! { "_id": id, "code": "c" }).unwrap()
    }

    #[async_trait]
    impl CursorSource for TwoPageSource {
        async fn count(&self, _filter: &ExtractionFilter) -> Result<u64> {
            Ok(3)
        }

        async fn open_cursor(
            &self,
            _filter: &ExtractionFilter,
            _page_size: u32,
        ) -> Result<Box<dyn CursorHandle>> {
            Ok(Box::new(TwoPageCursor {
                pages: vec![vec![raw("3")], vec![raw("1"), raw("2")]],
            }))
        }
    }

    #[async_trait]
    impl CursorHandle for TwoPageCursor {
        async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>> {
            Ok(self.pages.pop())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct NullReporter;

    impl ProgressReporter for NullReporter {
        fn start(&self, _total: u64) {}
        fn increment(&self) {}
        fn finish(&self, _message: &str) {}
        fn abandon(&self) {}
    }

    struct VecSink {
        written: Arc<std::sync::Mutex<Vec<ResultSet>>>,
    }

    #[async_trait]
    impl PersistenceSink for VecSink {
        async fn write(&mut self, records: &[DecodedRecord]) -> Result<u64> {
            self.written.lock().unwrap().push(records.to_vec());
            Ok(records.len() as u64)
        }
    }

    fn coordinator(written: Arc<std::sync::Mutex<Vec<ResultSet>>>) -> ExtractionCoordinator {
        ExtractionCoordinator::new(
            Arc::new(TwoPageSource),
            ExtractionFilter::new("code", "c"),
            Arc::new(NullReporter),
            Box::new(VecSink { written }),
        )
    }

    #[tokio::test]
    async fn test_coordinator_basic() {
        let written = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut coordinator = coordinator(written.clone()).with_options(PipelineOptions::new(2, 2));

        let summary = coordinator.execute().await.unwrap();
        assert_eq!(summary.total_reported, 3);
        assert_eq!(summary.records_extracted, 3);

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        let mut ids: Vec<_> = written[0].iter().map(|r| r.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_coordinator_rejects_zero_workers() {
        let written = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut coordinator = coordinator(written.clone()).with_options(PipelineOptions::new(2, 0));

        let err = coordinator.execute().await.unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_coordinator_cancelled_before_start() {
        let written = Arc::new(std::sync::Mutex::new(Vec::new()));
        let token = CancellationToken::new();
        token.cancel();
        let mut coordinator = coordinator(written.clone()).with_cancellation(token);

        let err = coordinator.execute().await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_coordinator_rejects_oversized_channel() {
        let written = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut coordinator = coordinator(written.clone())
            .with_options(PipelineOptions::new(100, 2).with_channel_capacity(usize::MAX));

        let err = coordinator.execute().await.unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_options_upper_bounds() {
        assert!(PipelineOptions::new(100, 2).validate().is_ok());
        assert!(PipelineOptions::new(u32::MAX, 2).validate().is_err());
        assert!(PipelineOptions::new(100, usize::MAX).validate().is_err());
        assert!(matches!(
            PipelineOptions::new(100, 2)
                .with_channel_capacity(usize::MAX)
                .validate(),
            Err(ExtractError::Config(_))
        ));
    }

    struct StuckCountSource;

    #[async_trait]
    impl CursorSource for StuckCountSource {
        async fn count(&self, _filter: &ExtractionFilter) -> Result<u64> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(0)
        }

        async fn open_cursor(
            &self,
            _filter: &ExtractionFilter,
            _page_size: u32,
        ) -> Result<Box<dyn CursorHandle>> {
            Err(ExtractError::Task("cursor must not be opened".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_slow_count() {
        let written = Arc::new(std::sync::Mutex::new(Vec::new()));
        let token = CancellationToken::new();
        let mut coordinator = ExtractionCoordinator::new(
            Arc::new(StuckCountSource),
            ExtractionFilter::new("code", "c"),
            Arc::new(NullReporter),
            Box::new(VecSink {
                written: written.clone(),
            }),
        )
        .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = tokio::time::timeout(std::time::Duration::from_secs(5), coordinator.execute())
            .await
            .expect("count was not interrupted")
            .unwrap_err();
        assert!(err.is_cancellation());
        assert!(written.lock().unwrap().is_empty());
        canceller.await.unwrap();
    }

    #[test]
    fn test_options_from_config() {
        let mut config = ExtractionConfig::default();
        config.page_size = 50;
        config.worker_count = 3;
        let options = PipelineOptions::from(&config);
        assert_eq!(options, PipelineOptions::new(50, 3));

        config.channel_capacity = Some(7);
        assert_eq!(PipelineOptions::from(&config).channel_capacity, 7);
    }
}

//! The page producer: the only stage that touches the cursor.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{ExtractError, Result};

use super::context::PipelineContext;
use super::record::{ExtractionFilter, RawRecord};
use super::source::{CursorHandle, CursorSource};

/// Drive a cursor over `filter` to completion, publishing every record
/// onto `records`.
///
/// Cancellation is polled before each page fetch and raced against each
/// publish; a fetch already in flight is allowed to complete. The cursor is
/// closed and `records` dropped (closing the channel) on every exit path.
pub async fn run_producer(
    ctx: PipelineContext,
    source: Arc<dyn CursorSource>,
    filter: ExtractionFilter,
    page_size: u32,
    records: mpsc::Sender<RawRecord>,
) -> Result<()> {
    ctx.check()?;
    let mut cursor = source.open_cursor(&filter, page_size).await?;

    let outcome = drain_cursor(&ctx, cursor.as_mut(), &records).await;
    drop(records);

    if let Err(e) = cursor.close().await {
        debug!("Failed to close cursor: {}", e);
    }

    match &outcome {
        Ok(published) => info!("Producer finished: {} records published", published),
        Err(e) => debug!("Producer stopped: {}", e),
    }
    outcome.map(|_| ())
}

async fn drain_cursor(
    ctx: &PipelineContext,
    cursor: &mut dyn CursorHandle,
    records: &mpsc::Sender<RawRecord>,
) -> Result<u64> {
    let mut published = 0u64;
    let mut pages = 0u64;

    loop {
        ctx.check()?;

        let page = match cursor.next_page().await? {
            Some(page) => page,
            None => {
                debug!("End of data after {} pages", pages);
                return Ok(published);
            }
        };
        pages += 1;
        debug!("Publishing page {} ({} records)", pages, page.len());

        for record in page {
            publish(ctx, records, record).await?;
            published += 1;
        }
    }
}

async fn publish(
    ctx: &PipelineContext,
    records: &mpsc::Sender<RawRecord>,
    record: RawRecord,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(ExtractError::Cancelled),
        sent = records.send(record) => sent.map_err(|_| ExtractError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedSource {
        pages: Mutex<Option<Vec<Result<Vec<RawRecord>>>>>,
        closed: Arc<AtomicBool>,
    }

    struct ScriptedCursor {
        pages: std::vec::IntoIter<Result<Vec<RawRecord>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl CursorSource for ScriptedSource {
        async fn count(&self, _filter: &ExtractionFilter) -> Result<u64> {
            Ok(0)
        }

        async fn open_cursor(
            &self,
            _filter: &ExtractionFilter,
            _page_size: u32,
        ) -> Result<Box<dyn CursorHandle>> {
            let pages = self.pages.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(ScriptedCursor {
                pages: pages.into_iter(),
                closed: self.closed.clone(),
            }))
        }
    }

    #[async_trait]
    impl CursorHandle for ScriptedCursor {
        async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>> {
            self.pages.next().transpose()
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn source(pages: Vec<Result<Vec<RawRecord>>>) -> (Arc<dyn CursorSource>, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource {
            pages: Mutex::new(Some(pages)),
            closed: closed.clone(),
        };
        (Arc::new(source), closed)
    }

    fn page(ids: &[&str]) -> Result<Vec<RawRecord>> {
        Ok(ids.iter().map(|id| RawRecord::new(*id, Vec::new())).collect())
    }

    fn filter() -> ExtractionFilter {
        ExtractionFilter::new("code", "x")
    }

    #[tokio::test]
    async fn test_producer_flattens_pages_and_closes_channel() {
        let (source, closed) = source(vec![page(&["1", "2"]), page(&["3"])]);
        let (tx, mut rx) = mpsc::channel(8);

        run_producer(PipelineContext::new(), source, filter(), 2, tx)
            .await
            .unwrap();

        let mut ids = Vec::new();
        while let Some(record) = rx.recv().await {
            ids.push(record.id().to_string());
        }
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_producer_surfaces_source_error() {
        let failure = Err(SourceError::FetchFailed {
            page: 2,
            reason: "reset".to_string(),
        }
        .into());
        let (source, closed) = source(vec![page(&["1"]), failure, page(&["9"])]);
        let (tx, mut rx) = mpsc::channel(8);

        let err = run_producer(PipelineContext::new(), source, filter(), 1, tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Source(_)));
        assert!(closed.load(Ordering::SeqCst));

        assert_eq!(rx.recv().await.map(|r| r.id().to_string()).as_deref(), Some("1"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_producer_unblocks_on_cancellation() {
        let (source, closed) = source(vec![page(&["1", "2", "3"])]);
        // Capacity 1 and nobody receiving: the second publish blocks
        let (tx, _rx) = mpsc::channel(1);
        let ctx = PipelineContext::new();

        let handle = tokio::spawn(run_producer(ctx.clone(), source, filter(), 3, tx));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        ctx.fail(ExtractError::Task("stop".to_string()));

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancellation());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_producer_does_not_open_cursor_when_cancelled() {
        let (source, closed) = source(vec![page(&["1"])]);
        let (tx, _rx) = mpsc::channel(1);
        let ctx = PipelineContext::new();
        ctx.fail(ExtractError::Task("stop".to_string()));

        let err = run_producer(ctx, source, filter(), 1, tx).await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(!closed.load(Ordering::SeqCst));
    }
}

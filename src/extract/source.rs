//! Cursor source abstractions for extraction runs
//!
//! A cursor source counts the records matching a filter and hands out a
//! stateful cursor that yields them page by page. The MongoDB implementation
//! streams raw BSON documents so that decoding stays with the workers.

use async_trait::async_trait;
use bson::RawDocumentBuf;
use futures::TryStreamExt;
use mongodb::{Collection, Cursor};
use tracing::{debug, info};

use crate::error::{Result, SourceError, describe_mongodb_error, mongo::extract_error_info};

use super::record::{ExtractionFilter, RawRecord};

/// A remote source that can count and page through filtered records.
#[async_trait]
pub trait CursorSource: Send + Sync {
    /// Total number of records matching `filter`.
    ///
    /// Only used to size progress reporting.
    async fn count(&self, filter: &ExtractionFilter) -> Result<u64>;

    /// Open a server-side cursor returning pages of at most `page_size`
    /// records.
    async fn open_cursor(
        &self,
        filter: &ExtractionFilter,
        page_size: u32,
    ) -> Result<Box<dyn CursorHandle>>;
}

/// A stateful cursor over one filtered result set.
#[async_trait]
pub trait CursorHandle: Send {
    /// Fetch the next page of records
    ///
    /// # Returns
    /// * `Result<Option<Vec<RawRecord>>>` - Next page, or None at end of data
    async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>>;

    /// Close the cursor and release server resources
    async fn close(&mut self) -> Result<()>;
}

/// Cursor source over a MongoDB collection.
///
/// Documents are read as [`RawDocumentBuf`] so their bytes reach the decode
/// workers untouched.
#[derive(Clone)]
pub struct MongoCursorSource {
    collection: Collection<RawDocumentBuf>,
}

impl MongoCursorSource {
    pub fn new(collection: Collection<RawDocumentBuf>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl CursorSource for MongoCursorSource {
    async fn count(&self, filter: &ExtractionFilter) -> Result<u64> {
        let total = self
            .collection
            .count_documents(filter.to_document())
            .await
            .map_err(|e| SourceError::CountFailed(describe_mongodb_error(&e)))?;
        debug!(
            "{} documents in {} match {}",
            total,
            self.collection.namespace(),
            filter
        );
        Ok(total)
    }

    async fn open_cursor(
        &self,
        filter: &ExtractionFilter,
        page_size: u32,
    ) -> Result<Box<dyn CursorHandle>> {
        let cursor = self
            .collection
            .find(filter.to_document())
            .batch_size(page_size)
            .await
            .map_err(|e| SourceError::OpenFailed(describe_mongodb_error(&e)))?;
        info!(
            "Opened cursor on {} (page size {})",
            self.collection.namespace(),
            page_size
        );
        Ok(Box::new(MongoCursorHandle::new(cursor, page_size)))
    }
}

/// Upper bound on the records reserved up front for one page
const PREALLOCATED_PAGE: u32 = 1024;

/// Page-at-a-time view over a MongoDB cursor.
pub struct MongoCursorHandle {
    cursor: Option<Cursor<RawDocumentBuf>>,
    page_size: u32,
    pages_fetched: u64,
    total_fetched: u64,
    closed: bool,
}

impl MongoCursorHandle {
    fn new(cursor: Cursor<RawDocumentBuf>, page_size: u32) -> Self {
        Self {
            cursor: Some(cursor),
            page_size,
            pages_fetched: 0,
            total_fetched: 0,
            closed: false,
        }
    }

    fn release(&mut self) {
        self.cursor = None;
        self.closed = true;
    }
}

#[async_trait]
impl CursorHandle for MongoCursorHandle {
    async fn next_page(&mut self) -> Result<Option<Vec<RawRecord>>> {
        if self.closed {
            return Ok(None);
        }

        let cursor = match self.cursor.as_mut() {
            Some(c) => c,
            None => return Ok(None),
        };

        let page = self.pages_fetched + 1;
        let mut records = Vec::with_capacity(self.page_size.min(PREALLOCATED_PAGE) as usize);

        for _ in 0..self.page_size {
            match cursor.try_next().await {
                Ok(Some(doc)) => match RawRecord::from_raw_document(doc) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        self.release();
                        return Err(e.into());
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    // On error, drop the cursor so the server can reap it
                    self.release();
                    if let Ok(json) = extract_error_info(&e).to_json_compact() {
                        debug!("Cursor error on page {}: {}", page, json);
                    }
                    return Err(SourceError::FetchFailed {
                        page,
                        reason: describe_mongodb_error(&e),
                    }
                    .into());
                }
            }
        }

        if records.is_empty() {
            debug!(
                "Cursor exhausted after {} pages, {} documents",
                self.pages_fetched, self.total_fetched
            );
            self.release();
            Ok(None)
        } else {
            self.pages_fetched = page;
            self.total_fetched += records.len() as u64;
            debug!(
                "Fetched page {} with {} documents (total: {})",
                page,
                records.len(),
                self.total_fetched
            );
            Ok(Some(records))
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.release();
            info!(
                "Closed cursor after {} pages, {} documents",
                self.pages_fetched, self.total_fetched
            );
        }
        Ok(())
    }
}

impl Drop for MongoCursorHandle {
    fn drop(&mut self) {
        if !self.closed {
            debug!("MongoCursorHandle dropped without explicit close");
            self.cursor = None;
        }
    }
}

//! Per-run coordination state shared by every pipeline stage.
//!
//! [`PipelineContext`] carries the cancellation token, the slot holding the
//! first failure of the run and the processed-record counter. [`StageGroup`]
//! spawns stages against a context and joins them: the first stage to fail
//! records its error and cancels everything else.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ExtractError, Result};

/// Shared state of one extraction run.
///
/// Cheap to clone; clones observe the same cancellation, error slot and
/// counter.
#[derive(Clone)]
pub struct PipelineContext {
    cancel: CancellationToken,
    first_error: Arc<Mutex<Option<ExtractError>>>,
    processed: Arc<AtomicU64>,
}

impl PipelineContext {
    /// Context with its own root token.
    pub fn new() -> Self {
        Self::with_parent(&CancellationToken::new())
    }

    /// Context whose token is a child of `parent`.
    ///
    /// Cancelling the parent (for example on Ctrl+C) cancels the run, while
    /// a failing run never cancels the parent.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            cancel: parent.child_token(),
            first_error: Arc::new(Mutex::new(None)),
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a stage failure and cancel the run.
    ///
    /// Only the first error is kept. The error is stored before the token is
    /// cancelled, so any stage that observes the cancellation and fails with
    /// [`ExtractError::Cancelled`] can never displace the root cause.
    pub fn fail(&self, err: ExtractError) {
        {
            let mut slot = match self.first_error.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if slot.is_none() {
                if !err.is_cancellation() {
                    warn!("Extraction failed: {}", err);
                }
                *slot = Some(err);
            } else {
                debug!("Discarding later failure: {}", err);
            }
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Returns `Err(Cancelled)` when the run has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ExtractError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Take the first recorded failure, if any.
    ///
    /// A run cancelled from outside without any stage failing reports
    /// [`ExtractError::Cancelled`].
    pub fn take_error(&self) -> Option<ExtractError> {
        let taken = match self.first_error.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match taken {
            Some(err) => Some(err),
            None if self.is_cancelled() => Some(ExtractError::Cancelled),
            None => None,
        }
    }

    /// Bump the processed counter, returning the new value.
    pub fn record_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A set of pipeline stages sharing one [`PipelineContext`].
///
/// Every stage returns a `Result`; an `Err` is recorded through
/// [`PipelineContext::fail`], which cancels the remaining stages.
pub struct StageGroup {
    ctx: PipelineContext,
    tasks: JoinSet<()>,
}

impl StageGroup {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            tasks: JoinSet::new(),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Spawn a stage onto the runtime.
    pub fn spawn<F>(&mut self, stage: &'static str, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let ctx = self.ctx.clone();
        self.tasks.spawn(async move {
            match fut.await {
                Ok(()) => debug!("Stage {} finished", stage),
                Err(e) => {
                    debug!("Stage {} failed: {}", stage, e);
                    ctx.fail(e);
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every stage to finish.
    ///
    /// A panicking stage counts as a failure of the run. Returns the first
    /// recorded error, or `Ok(())` when every stage succeeded.
    pub async fn join(mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                self.ctx.fail(e.into());
            }
        }
        match self.ctx.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// src/crawl/orchestrator.rs

//! The crawl state machine.
//!
//! One orchestrator instance drives the whole crawl in a single cooperative
//! control flow: fetch a page, persist the new cursor, process items in page
//! order, and dispatch errors by kind. There is no fan-out; the remote rate
//! limit is the bottleneck and parallel fetching would only amplify it.
//!
//! ## States
//!
//! ```text
//! IDLE → RUNNING ⇄ BACKOFF
//!        RUNNING → AWAITING_TOKEN → (RUNNING | STOPPED)
//!        RUNNING | BACKOFF → STOPPED
//! ```
//!
//! Cursor persistence is ordered for at-least-once export: the cursor is
//! saved after a successful page fetch but before any item of that page is
//! processed, so a crash mid-page refetches the page on resume. Duplicated
//! rows are acceptable; lost rows are not.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::api::{FetchError, TokenProvider, Transport};
use crate::crawl::backoff::{BackoffPolicy, BackoffState};
use crate::error::{AppError, Result};
use crate::mapping;
use crate::models::ProjectSummary;
use crate::storage::{CursorStore, SessionExporter};

/// Fixed delay before moving on after a skipped item.
const ITEM_SKIP_DELAY: Duration = Duration::from_secs(2);

/// Fixed delay before retrying a failed page fetch.
const PAGE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Granularity of cancellable sleeps; `stop()` takes effect within one tick.
const SLEEP_TICK: Duration = Duration::from_secs(1);

/// Observable crawl lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    Backoff,
    AwaitingToken,
    Stopped,
}

impl CrawlState {
    fn is_active(self) -> bool {
        matches!(
            self,
            CrawlState::Running | CrawlState::Backoff | CrawlState::AwaitingToken
        )
    }
}

/// Parameters for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Projects requested per page; must be positive.
    pub batch_size: usize,
    /// Stop after this many exported projects; 0 means unbounded.
    pub max_records: usize,
    /// Base delay between per-project detail fetches; must be positive.
    pub base_delay: Duration,
}

/// Cloneable handle for requesting a cooperative stop.
///
/// The flag is checked at the page loop head, the item loop head, and every
/// sleep tick; an in-flight network call is never aborted.
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        log::info!("Stop requested");
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Result of a finished crawl run.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub processed: usize,
}

enum ItemOutcome {
    Exported,
    Skipped,
    /// Token escalation was refused or the run was cancelled mid-item.
    Stopped,
}

/// Drives the crawl: pagination, per-item processing, error dispatch,
/// backoff, and cancellation.
pub struct CrawlOrchestrator<T: Transport> {
    transport: T,
    cursor_store: CursorStore,
    exporter: SessionExporter,
    policy: BackoffPolicy,
    backoff: BackoffState,
    state: CrawlState,
    cancel: Arc<AtomicBool>,
    item_skip_delay: Duration,
    page_retry_delay: Duration,
}

impl<T: Transport> CrawlOrchestrator<T> {
    pub fn new(transport: T, cursor_store: CursorStore, exporter: SessionExporter) -> Self {
        Self {
            transport,
            cursor_store,
            exporter,
            policy: BackoffPolicy::default(),
            backoff: BackoffState::default(),
            state: CrawlState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            item_skip_delay: ITEM_SKIP_DELAY,
            page_retry_delay: PAGE_RETRY_DELAY,
        }
    }

    /// Replace the backoff policy (shorter delays in tests).
    pub fn with_backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the fixed retry delays (shorter delays in tests).
    pub fn with_retry_delays(mut self, item_skip: Duration, page_retry: Duration) -> Self {
        self.item_skip_delay = item_skip;
        self.page_retry_delay = page_retry;
        self
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn exporter(&self) -> &SessionExporter {
        &self.exporter
    }

    pub fn cursor_store(&self) -> &CursorStore {
        &self.cursor_store
    }

    /// Handle for stopping the crawl from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.cancel),
        }
    }

    /// Run the crawl loop until the pagination is exhausted, the record goal
    /// is reached, a stop is requested, or token escalation is refused.
    pub async fn start<P: TokenProvider>(
        &mut self,
        options: &CrawlOptions,
        provider: &P,
    ) -> Result<CrawlSummary> {
        if self.state.is_active() {
            log::warn!("Crawl is already running");
            return Ok(CrawlSummary { processed: 0 });
        }
        if options.batch_size == 0 {
            return Err(AppError::validation("batch_size must be > 0"));
        }
        if options.base_delay.is_zero() {
            return Err(AppError::validation("base_delay must be > 0"));
        }

        self.cancel.store(false, Ordering::SeqCst);
        self.backoff = BackoffState::default();
        self.state = CrawlState::Running;

        // Every exit path, including a storage error, must leave the
        // orchestrator inactive or the next start/reset is refused forever.
        let result = self.run(options, provider).await;
        self.state = CrawlState::Stopped;
        if let Ok(summary) = &result {
            log::info!("Crawl finished; processed {} projects", summary.processed);
        }
        result
    }

    async fn run<P: TokenProvider>(
        &mut self,
        options: &CrawlOptions,
        provider: &P,
    ) -> Result<CrawlSummary> {
        let mut processed = 0usize;

        'crawl: while self.cursor_store.has_more().await?
            && (options.max_records == 0 || processed < options.max_records)
        {
            if self.cancelled() {
                break;
            }

            let remaining = if options.max_records == 0 {
                options.batch_size
            } else {
                options.batch_size.min(options.max_records - processed)
            };
            if remaining == 0 {
                break;
            }

            let cursor = self.cursor_store.load().await?;
            log::info!(
                "Fetching page of up to {} projects (processed: {})",
                remaining,
                processed
            );

            let page = match self.transport.fetch_page(cursor.as_deref(), remaining).await {
                Ok(page) => page,
                Err(error) => {
                    // The cursor is untouched; the same page is retried.
                    if !self.handle_page_error(error, provider).await {
                        break 'crawl;
                    }
                    continue 'crawl;
                }
            };

            self.backoff.record_success();

            // Persist before processing: a crash mid-page refetches this page
            // on resume instead of skipping it.
            self.cursor_store.save(page.next_cursor.as_deref()).await?;
            log::info!(
                "Fetched {} projects; cursor persisted (has_more: {})",
                page.items.len(),
                page.has_next
            );

            for item in &page.items {
                if self.cancelled() {
                    break 'crawl;
                }

                match self.process_item(item, provider).await? {
                    ItemOutcome::Exported => {
                        processed += 1;
                        log::info!("Processed project #{}: {}", processed, item.name);

                        if options.max_records > 0 && processed >= options.max_records {
                            log::info!("Reached maximum records: {}", options.max_records);
                            break 'crawl;
                        }

                        let delay = self.backoff.dynamic_delay(options.base_delay);
                        if delay > options.base_delay {
                            log::info!(
                                "Applying extended delay of {:?} after recent rate limits",
                                delay
                            );
                        }
                        if !self.sleep_cancellable(delay).await {
                            break 'crawl;
                        }
                    }
                    ItemOutcome::Skipped => {
                        if !self.sleep_cancellable(self.item_skip_delay).await {
                            break 'crawl;
                        }
                    }
                    ItemOutcome::Stopped => {
                        log::info!("Crawl stopped; processed {} projects", processed);
                        return Ok(CrawlSummary { processed });
                    }
                }
            }
        }

        Ok(CrawlSummary { processed })
    }

    /// Reset pagination to the start of the sequence and clear the failure
    /// streak. Refused while a crawl is active.
    pub async fn reset_pagination(&mut self) -> Result<()> {
        if self.state.is_active() {
            return Err(AppError::crawl(
                "reset_pagination",
                "refused: crawl is running",
            ));
        }
        self.cursor_store.reset().await?;
        self.backoff = BackoffState::default();
        log::info!("Pagination reset; next crawl starts from the beginning");
        Ok(())
    }

    /// Fetch, map, and export one item, retrying in place on auth and
    /// rate-limit errors. A single bad record never aborts the batch.
    async fn process_item<P: TokenProvider>(
        &mut self,
        item: &ProjectSummary,
        provider: &P,
    ) -> Result<ItemOutcome> {
        loop {
            if self.cancelled() {
                return Ok(ItemOutcome::Stopped);
            }

            match self.transport.fetch_details(&item.slug).await {
                Ok(details) => {
                    // The streak is cleared by a page fetch success only, so
                    // items after a rate-limited retry stay throttled.
                    let row = mapping::map_record(&details);
                    return match self.exporter.add_record(&row).await {
                        Ok(()) => Ok(ItemOutcome::Exported),
                        Err(error) => {
                            log::error!("Failed to export {}: {}; skipping", item.slug, error);
                            Ok(ItemOutcome::Skipped)
                        }
                    };
                }
                Err(FetchError::Auth(message)) => {
                    log::warn!("Authentication error for {}: {}", item.slug, message);
                    if !self.await_token(provider).await {
                        return Ok(ItemOutcome::Stopped);
                    }
                    // Retry the same item with the fresh token.
                }
                Err(FetchError::RateLimit(message)) => {
                    log::warn!("Rate limited fetching {}: {}", item.slug, message);
                    if !self.enter_backoff().await {
                        return Ok(ItemOutcome::Stopped);
                    }
                    // Retry the same item after the cooldown.
                }
                Err(FetchError::Other(message)) => {
                    log::error!(
                        "Error fetching details for {}: {}; skipping item",
                        item.slug,
                        message
                    );
                    return Ok(ItemOutcome::Skipped);
                }
            }
        }
    }

    /// Dispatch a page-level fetch failure. Returns false when the crawl
    /// should stop (token refused or stop requested).
    async fn handle_page_error<P: TokenProvider>(
        &mut self,
        error: FetchError,
        provider: &P,
    ) -> bool {
        match error {
            FetchError::Auth(message) => {
                log::warn!("Authentication error fetching page: {}", message);
                self.await_token(provider).await
            }
            FetchError::RateLimit(message) => {
                log::warn!("Rate limited fetching page: {}", message);
                self.enter_backoff().await
            }
            FetchError::Other(message) => {
                log::error!("Failed to fetch page: {}; retrying", message);
                self.sleep_cancellable(self.page_retry_delay).await
            }
        }
    }

    /// Suspend until the token provider resolves. Returns false on refusal.
    async fn await_token<P: TokenProvider>(&mut self, provider: &P) -> bool {
        self.state = CrawlState::AwaitingToken;
        log::info!("Requesting a new token...");

        match provider.request_token().await {
            Some(_) => {
                log::info!("Received new token; resuming");
                self.state = CrawlState::Running;
                true
            }
            None => {
                log::error!("No new token provided; stopping crawl");
                false
            }
        }
    }

    /// Sleep out the policy cooldown for the current failure streak.
    /// Returns false if a stop was requested during the countdown.
    async fn enter_backoff(&mut self) -> bool {
        self.state = CrawlState::Backoff;
        let failures = self.backoff.record_failure();
        let delay = self.policy.delay(failures);

        log::warn!(
            "Rate limit #{}; cooling down for {:.0?}",
            failures,
            delay
        );

        let resumed = self.sleep_cancellable(delay).await;
        if resumed {
            log::info!("Cooldown complete; resuming");
            self.state = CrawlState::Running;
        }
        resumed
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Sleep in ticks, checking the stop flag between them. Returns false if
    /// cancelled before the duration elapsed.
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.cancelled() {
                return false;
            }
            let step = remaining.min(SLEEP_TICK);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
        !self.cancelled()
    }
}

//! Bounded fetch pool
//!
//! Runs a fallible worker over a list of items with a small, fixed number of
//! threads and a pause before every call, so upstream rate limits are
//! respected. Results come back in input order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable holding the worker count
pub const CONCURRENCY_ENV: &str = "FETCH_CONCURRENCY";

/// Environment variable holding the per-call delay in milliseconds
pub const DELAY_ENV: &str = "FETCH_DELAY_MS";

const DEFAULT_CONCURRENCY: i64 = 2;
const MIN_CONCURRENCY: i64 = 1;
const MAX_CONCURRENCY: i64 = 6;

const DEFAULT_DELAY_MS: i64 = 250;
const MIN_DELAY_MS: i64 = 0;
const MAX_DELAY_MS: i64 = 2000;

/// Width of the pool and the pause before each call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    pub concurrency: usize,
    pub delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY, DEFAULT_DELAY_MS)
    }
}

fn clamp_raw(raw: Option<&str>, default: i64, min: i64, max: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

impl FetchConfig {
    /// Creates a config, clamping both values into their allowed ranges
    /// (1..=6 workers, 0..=2000 ms)
    pub fn new(concurrency: i64, delay_ms: i64) -> Self {
        let concurrency = concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        let delay_ms = delay_ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS);
        Self {
            concurrency: concurrency as usize,
            delay: Duration::from_millis(delay_ms as u64),
        }
    }

    /// Resolves a config from raw setting strings
    ///
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_raw(concurrency: Option<&str>, delay_ms: Option<&str>) -> Self {
        Self::new(
            clamp_raw(concurrency, DEFAULT_CONCURRENCY, MIN_CONCURRENCY, MAX_CONCURRENCY),
            clamp_raw(delay_ms, DEFAULT_DELAY_MS, MIN_DELAY_MS, MAX_DELAY_MS),
        )
    }

    /// Resolves a config from `FETCH_CONCURRENCY` and `FETCH_DELAY_MS`
    pub fn from_env() -> Self {
        let concurrency = std::env::var(CONCURRENCY_ENV).ok();
        let delay = std::env::var(DELAY_ENV).ok();
        Self::from_raw(concurrency.as_deref(), delay.as_deref())
    }
}

/// Worker pool over a shared claim cursor
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchScheduler {
    config: FetchConfig,
}

impl FetchScheduler {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }

    /// Runs `worker` over every item and returns the results in input order
    ///
    /// `min(concurrency, items.len())` threads claim indices from one atomic
    /// cursor, sleep for the configured delay, then call `worker(item, index)`.
    /// `on_progress(completed, total)` is called on the calling thread after
    /// every successful call.
    ///
    /// # Errors
    ///
    /// The first worker error fails the whole batch. No new items are claimed
    /// once a call has failed; calls already in flight run to completion but
    /// their results are discarded.
    pub fn run<T, R, E, F>(
        &self,
        items: &[T],
        worker: F,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<Vec<R>, E>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T, usize) -> Result<R, E> + Sync,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let width = self.config.concurrency.min(total);
        let delay = self.config.delay;
        let cursor = AtomicUsize::new(0);
        let aborted = AtomicBool::new(false);

        debug!(total, width, delay_ms = delay.as_millis() as u64, "dispatching fetch batch");

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(usize, Result<R, E>)>();

            for _ in 0..width {
                let tx = tx.clone();
                let (cursor, aborted, worker) = (&cursor, &aborted, &worker);
                scope.spawn(move || {
                    while !aborted.load(Ordering::SeqCst) {
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        if index >= total {
                            break;
                        }
                        if !delay.is_zero() {
                            thread::sleep(delay);
                        }
                        if aborted.load(Ordering::SeqCst) {
                            break;
                        }

                        let result = worker(&items[index], index);
                        let failed = result.is_err();
                        if failed {
                            aborted.store(true, Ordering::SeqCst);
                        }
                        if tx.send((index, result)).is_err() || failed {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
            let mut first_error = None;
            let mut completed = 0;

            for (index, result) in rx {
                match result {
                    Ok(value) if first_error.is_none() => {
                        slots[index] = Some(value);
                        completed += 1;
                        on_progress(completed, total);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        if first_error.is_none() {
                            warn!(index, "fetch failed, aborting batch");
                            first_error = Some(err);
                        }
                    }
                }
            }

            match first_error {
                Some(err) => Err(err),
                None => Ok(slots.into_iter().flatten().collect()),
            }
        })
    }
}

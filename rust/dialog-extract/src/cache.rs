//! Process-wide cache of compiled classification rules.
//!
//! The cache is a small state machine:
//!
//! ```text
//! Unloaded ──ready()──▶ Loading ──ok──▶ Ready ──reload()──▶ Loading ─┐
//!                          │                                         │
//!                          └──err──▶ Failed ──reload()──▶ Loading    │
//!                                                                    ▼
//!                                          Ready (new book, or the old one on error)
//! ```
//!
//! A load is a single [`Shared`] future. Every caller that finds the cache
//! loading awaits a clone of that same future, so concurrent first callers
//! trigger exactly one call into the [`RuleSource`]. The state lock is only
//! held to read or swap the state, never across an `.await`.
//!
//! Readers get an `Arc<RuleBook>` snapshot. A reload builds a complete new
//! book and swaps it in whole; until then, and if it fails, readers keep
//! getting the previous one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::error::CacheLoadError;
use crate::rules::{RuleBook, RuleSource};

type LoadResult = Result<Arc<RuleBook>, CacheLoadError>;
type LoadFuture = Shared<BoxFuture<'static, LoadResult>>;

enum CacheState {
    Unloaded,
    Loading {
        generation: u64,
        load: LoadFuture,
        /// The book being replaced, served while the reload runs.
        previous: Option<Arc<RuleBook>>,
    },
    Ready(Arc<RuleBook>),
    Failed(CacheLoadError),
}

/// A coarse view of the cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

pub struct RuleCache {
    source: Arc<dyn RuleSource>,
    state: Mutex<CacheState>,
    generation: AtomicU64,
    loads: AtomicUsize,
}

impl RuleCache {
    pub fn new(source: Arc<dyn RuleSource>) -> Self {
        RuleCache {
            source,
            state: Mutex::new(CacheState::Unloaded),
            generation: AtomicU64::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn status(&self) -> CacheStatus {
        match &*self.state.lock() {
            CacheState::Unloaded => CacheStatus::Unloaded,
            CacheState::Loading { .. } => CacheStatus::Loading,
            CacheState::Ready(_) => CacheStatus::Ready,
            CacheState::Failed(_) => CacheStatus::Failed,
        }
    }

    /// How many loads have been started over the cache's lifetime.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// The current book, without waiting.
    pub fn snapshot(&self) -> Option<Arc<RuleBook>> {
        match &*self.state.lock() {
            CacheState::Ready(book) => Some(Arc::clone(book)),
            CacheState::Loading { previous, .. } => previous.clone(),
            CacheState::Unloaded | CacheState::Failed(_) => None,
        }
    }

    /// The loaded book, starting or joining a load when there is none yet.
    ///
    /// A failed load is remembered: later calls return the same error until
    /// [`RuleCache::reload`] succeeds.
    #[instrument(skip_all)]
    pub async fn ready(&self) -> LoadResult {
        let (generation, load) = {
            let mut state = self.state.lock();
            match &*state {
                CacheState::Ready(book) => return Ok(Arc::clone(book)),
                CacheState::Failed(error) => return Err(error.clone()),
                CacheState::Loading {
                    previous: Some(book),
                    ..
                } => return Ok(Arc::clone(book)),
                CacheState::Loading {
                    generation, load, ..
                } => (*generation, load.clone()),
                CacheState::Unloaded => self.begin_load(&mut state, None),
            }
        };
        let outcome = load.await;
        self.finish(generation, outcome)
    }

    /// Load a fresh book and swap it in. Joins a load already in flight
    /// instead of starting a second one.
    #[instrument(skip_all)]
    pub async fn reload(&self) -> LoadResult {
        let (generation, load) = {
            let mut state = self.state.lock();
            if let CacheState::Loading {
                generation, load, ..
            } = &*state
            {
                (*generation, load.clone())
            } else {
                let previous = match &*state {
                    CacheState::Ready(book) => Some(Arc::clone(book)),
                    _ => None,
                };
                self.begin_load(&mut state, previous)
            }
        };
        let outcome = load.await;
        self.finish(generation, outcome)
    }

    fn begin_load(
        &self,
        state: &mut CacheState,
        previous: Option<Arc<RuleBook>>,
    ) -> (u64, LoadFuture) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.loads.fetch_add(1, Ordering::SeqCst);

        let source = Arc::clone(&self.source);
        let load = async move {
            let started = Instant::now();
            let rules = source.load().await?;
            let book = RuleBook::compile(&rules)?;
            info!(
                languages = book.len(),
                elapsed = ?started.elapsed(),
                "classification rules loaded"
            );
            Ok::<_, CacheLoadError>(Arc::new(book))
        }
        .boxed()
        .shared();

        *state = CacheState::Loading {
            generation,
            load: load.clone(),
            previous,
        };
        (generation, load)
    }

    /// Record the outcome of load `generation`, unless a newer load has
    /// already taken its place.
    fn finish(&self, generation: u64, outcome: LoadResult) -> LoadResult {
        let mut state = self.state.lock();
        if let CacheState::Loading {
            generation: current,
            previous,
            ..
        } = &mut *state
        {
            if *current == generation {
                let previous = previous.take();
                *state = match (&outcome, previous) {
                    (Ok(book), _) => CacheState::Ready(Arc::clone(book)),
                    (Err(error), Some(previous)) => {
                        warn!(%error, "rule reload failed, keeping the previous rules");
                        CacheState::Ready(previous)
                    }
                    (Err(error), None) => {
                        warn!(%error, "rule load failed");
                        CacheState::Failed(error.clone())
                    }
                };
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleSet, StaticRuleSource};
    use async_trait::async_trait;
    use testresult::TestResult;

    struct Broken;

    #[async_trait]
    impl RuleSource for Broken {
        async fn load(&self) -> Result<RuleSet, CacheLoadError> {
            Err(CacheLoadError::Source("rule service unreachable".into()))
        }
    }

    #[tokio::test]
    async fn first_ready_loads_once() -> TestResult {
        let cache = RuleCache::new(Arc::new(StaticRuleSource::builtin()));
        assert_eq!(cache.status(), CacheStatus::Unloaded);

        let first = cache.ready().await?;
        let second = cache.ready().await?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.load_count(), 1);
        assert_eq!(cache.status(), CacheStatus::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn failure_is_sticky_until_reload() {
        let cache = RuleCache::new(Arc::new(Broken));
        assert!(cache.ready().await.is_err());
        assert!(cache.ready().await.is_err());
        assert_eq!(cache.status(), CacheStatus::Failed);
        assert_eq!(cache.load_count(), 1);
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn reload_swaps_in_a_new_book() -> TestResult {
        let cache = RuleCache::new(Arc::new(StaticRuleSource::builtin()));
        let before = cache.ready().await?;
        let after = cache.reload().await?;
        assert!(!Arc::ptr_eq(&before, &after));
        let current = cache.snapshot().ok_or("no snapshot")?;
        assert!(Arc::ptr_eq(&after, &current));
        assert_eq!(cache.load_count(), 2);
        Ok(())
    }
}

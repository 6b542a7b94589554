use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::trace;

use crate::api::Timings;
use crate::core::SelectorStrategy;
use crate::driver::{ElementHandle, Page, WaitState};

/// Outcome of resolving a strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found {
        handle: ElementHandle,
        strategy_index: usize,
    },
    NotFound,
}

impl Resolution {
    #[must_use]
    pub fn handle(&self) -> Option<&ElementHandle> {
        match self {
            Self::Found { handle, .. } => Some(handle),
            Self::NotFound => None,
        }
    }

    #[must_use]
    pub fn strategy_index(&self) -> Option<usize> {
        match self {
            Self::Found { strategy_index, .. } => Some(*strategy_index),
            Self::NotFound => None,
        }
    }

    #[must_use]
    pub fn into_handle(self) -> Option<ElementHandle> {
        match self {
            Self::Found { handle, .. } => Some(handle),
            Self::NotFound => None,
        }
    }
}

/// Resolves ordered selector strategies against a page.
pub struct LocatorResolver<'p, P: Page> {
    page: &'p P,
    per_strategy: Duration,
    poll: Duration,
}

impl<P: Page> Clone for LocatorResolver<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Page> Copy for LocatorResolver<'_, P> {}

impl<'p, P: Page> LocatorResolver<'p, P> {
    #[must_use]
    pub fn new(page: &'p P, timings: &Timings) -> Self {
        Self {
            page,
            per_strategy: timings.per_strategy_timeout(),
            poll: timings.poll_interval(),
        }
    }

    /// Tries candidates in order, each for at most the per-strategy timeout
    /// clamped to what is left of `budget`. First match wins; exhaustion is
    /// [`Resolution::NotFound`], never an error.
    pub async fn resolve(
        &self,
        strategy: &SelectorStrategy,
        budget: Duration,
        state: WaitState,
    ) -> Resolution {
        let deadline = Instant::now() + budget;
        for (strategy_index, candidate) in strategy.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let wait = self.per_strategy.min(remaining);
            if let Ok(handle) = timeout(wait, self.wait_for(candidate, state)).await {
                trace!(strategy = %strategy.name, strategy_index, candidate, "resolved");
                return Resolution::Found {
                    handle,
                    strategy_index,
                };
            }
        }
        trace!(strategy = %strategy.name, "no candidate resolved");
        Resolution::NotFound
    }

    /// Single pass over the candidates without waiting.
    pub async fn resolve_now(&self, strategy: &SelectorStrategy, state: WaitState) -> Resolution {
        for (strategy_index, candidate) in strategy.iter().enumerate() {
            if let Some(handle) = self.first_ready(candidate, state).await {
                return Resolution::Found {
                    handle,
                    strategy_index,
                };
            }
        }
        Resolution::NotFound
    }

    /// Every visible element of the first candidate that matches anything,
    /// polling until `budget` runs out.
    pub async fn resolve_all(
        &self,
        strategy: &SelectorStrategy,
        budget: Duration,
    ) -> Vec<ElementHandle> {
        let deadline = Instant::now() + budget;
        loop {
            let found = self.resolve_all_now(strategy).await;
            if !found.is_empty() || Instant::now() + self.poll > deadline {
                return found;
            }
            sleep(self.poll).await;
        }
    }

    pub async fn resolve_all_now(&self, strategy: &SelectorStrategy) -> Vec<ElementHandle> {
        for candidate in strategy.iter() {
            let visible: Vec<ElementHandle> = self
                .query(candidate)
                .await
                .into_iter()
                .filter(|e| e.visible)
                .collect();
            if !visible.is_empty() {
                return visible;
            }
        }
        Vec::new()
    }

    /// Waits until no candidate has a visible match; `false` on timeout.
    pub async fn wait_gone(&self, strategy: &SelectorStrategy, budget: Duration) -> bool {
        timeout(budget, async {
            while !self.resolve_all_now(strategy).await.is_empty() {
                sleep(self.poll).await;
            }
        })
        .await
        .is_ok()
    }

    async fn wait_for(&self, candidate: &str, state: WaitState) -> ElementHandle {
        loop {
            if let Some(handle) = self.first_ready(candidate, state).await {
                return handle;
            }
            sleep(self.poll).await;
        }
    }

    async fn first_ready(&self, candidate: &str, state: WaitState) -> Option<ElementHandle> {
        self.query(candidate)
            .await
            .into_iter()
            .find(|e| state.satisfied_by(e))
    }

    async fn query(&self, candidate: &str) -> Vec<ElementHandle> {
        match self.page.query_all(candidate).await {
            Ok(found) => found,
            Err(err) => {
                trace!(candidate, error = %err, "query failed");
                Vec::new()
            }
        }
    }
}

use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, trace, warn};

use crate::api::{LocatorResolver, OverlaySuppression, PopupProfile, Timings};
use crate::core::SelectorStrategy;
use crate::driver::{ElementHandle, MouseButton, Page, WaitState};
use crate::error::DriverResult;

const OBSERVER_JS: &str = include_str!("js/interstitial_observer.js");

/// How aggressive one reactive pass may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuppressionMode {
    Full,
    /// No cancel-key burst; used right after drawing, where cancel input
    /// would discard the fresh overlay.
    Gentle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tactic {
    PreferredButton,
    CloseIcon,
    CancelKeys,
}

/// Bookkeeping for one reactive race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupBudget {
    pub deadline: Instant,
    pub tasks_in_flight: usize,
    pub resolved: bool,
}

impl PopupBudget {
    #[must_use]
    pub fn new(budget: Duration, tasks: usize) -> Self {
        Self {
            deadline: Instant::now() + budget,
            tasks_in_flight: tasks,
            resolved: false,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Summary of one [`InterstitialSuppressor::suppress`] call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuppressionReport {
    pub skipped: bool,
    pub dialogs_seen: usize,
    pub dismissed: bool,
    pub winner: Option<Tactic>,
    pub budget_expired: bool,
    /// Tactics still pending when the race ended; they were cancelled.
    pub cancelled_tactics: usize,
    pub navigated_back: bool,
    /// Advisory: plot surface visible right after the race.
    pub healthy: bool,
    pub elapsed_ms: u64,
}

/// Keeps promotional interstitials out of the way.
///
/// Ambient tactics (request block, observer script) are installed once
/// before the first navigation. Reactive passes race three dismissal tactics
/// against a time budget and never fail.
pub struct InterstitialSuppressor<'p, P: Page> {
    page: &'p P,
    profile: &'p PopupProfile,
    plot_surface: &'p SelectorStrategy,
    resolver: LocatorResolver<'p, P>,
    timings: Timings,
    mode: OverlaySuppression,
}

impl<'p, P: Page> InterstitialSuppressor<'p, P> {
    #[must_use]
    pub fn new(
        page: &'p P,
        profile: &'p PopupProfile,
        plot_surface: &'p SelectorStrategy,
        timings: &Timings,
        mode: OverlaySuppression,
    ) -> Self {
        Self {
            page,
            profile,
            plot_surface,
            resolver: LocatorResolver::new(page, timings),
            timings: *timings,
            mode,
        }
    }

    /// Observer script with the profile's labels baked in.
    #[must_use]
    pub fn observer_script(&self) -> String {
        let json = |values: &[String]| {
            serde_json::to_string(values).unwrap_or_else(|_| "[]".to_owned())
        };
        OBSERVER_JS
            .replace("__PREFERRED__", &json(&self.profile.preferred_labels))
            .replace("__AVOID__", &json(&self.profile.avoided_labels))
            .replace("__DIALOGS__", &json(&self.profile.dialogs.candidates))
    }

    /// Installs the request block and the observer script. Must run before
    /// the first navigation to cover the initial page load.
    pub async fn install_ambient(&self) -> DriverResult<()> {
        if !self.mode.ambient() {
            debug!("ambient suppression disabled");
            return Ok(());
        }
        self.page
            .block_requests(&self.profile.blocked_fragments)
            .await?;
        self.page.add_init_script(&self.observer_script()).await?;
        debug!(
            fragments = self.profile.blocked_fragments.len(),
            "ambient suppression installed"
        );
        Ok(())
    }

    /// Injects a stylesheet hiding dialog containers.
    pub async fn hide_dialogs(&self) -> DriverResult<()> {
        if !self.mode.ambient() {
            return Ok(());
        }
        self.page.add_style(&self.profile.hide_css).await
    }

    /// One reactive pass within the configured budget.
    pub async fn suppress(&self, mode: SuppressionMode) -> SuppressionReport {
        self.suppress_within(mode, self.timings.suppress_budget())
            .await
    }

    pub async fn suppress_within(&self, mode: SuppressionMode, budget: Duration) -> SuppressionReport {
        if !self.mode.reactive() {
            return SuppressionReport {
                skipped: true,
                healthy: true,
                ..SuppressionReport::default()
            };
        }

        let started = Instant::now();
        let deadline = started + budget;
        // URL recovery and the health check run inside the same budget.
        let reserve = (self.timings.health_probe_timeout() * 2).min(budget / 2);
        let mut report = SuppressionReport::default();
        let mut popup_budget = PopupBudget::new(budget.saturating_sub(reserve), 0);
        let race_deadline = popup_budget.deadline;

        let race = async {
            let dialogs = self.resolver.resolve_all_now(&self.profile.dialogs).await.len();
            report.dialogs_seen = dialogs;
            if dialogs == 0 {
                return None;
            }

            let mut tactics: FuturesUnordered<BoxFuture<'_, (Tactic, bool)>> =
                FuturesUnordered::new();
            tactics.push(Box::pin(async {
                (Tactic::PreferredButton, self.click_preferred_button().await)
            }));
            tactics.push(Box::pin(async {
                (Tactic::CloseIcon, self.click_close_icon().await)
            }));
            if mode == SuppressionMode::Full {
                tactics.push(Box::pin(async move {
                    (Tactic::CancelKeys, self.cancel_burst(dialogs).await)
                }));
            }
            popup_budget.tasks_in_flight = tactics.len();

            while let Some((tactic, dismissed)) = tactics.next().await {
                popup_budget.tasks_in_flight -= 1;
                trace!(?tactic, dismissed, "tactic finished");
                if dismissed {
                    popup_budget.resolved = true;
                    return Some(tactic);
                }
            }
            None
        };

        let finished = timeout_at(race_deadline, race).await;
        match finished {
            Ok(winner) => report.winner = winner,
            Err(_) => report.budget_expired = true,
        }
        report.dismissed = popup_budget.resolved;
        report.cancelled_tactics = popup_budget.tasks_in_flight;

        report.navigated_back = timeout_at(deadline, self.recover_url())
            .await
            .unwrap_or(false);
        report.healthy = timeout_at(deadline, self.health_probe())
            .await
            .unwrap_or(false);
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if report.budget_expired {
            debug!(
                budget_ms = budget.as_millis() as u64,
                pending = report.cancelled_tactics,
                "suppression budget expired"
            );
        }
        if !report.healthy {
            debug!("plot surface not visible after suppression");
        }
        report
    }

    async fn click_preferred_button(&self) -> bool {
        let buttons = self
            .resolver
            .resolve_all_now(&self.profile.dialog_buttons)
            .await;
        let best = buttons
            .into_iter()
            .filter_map(|b| self.profile.preference_rank(&b.text).map(|rank| (rank, b)))
            .min_by_key(|(rank, _)| *rank);
        let Some((_, button)) = best else {
            return false;
        };
        trace!(label = %button.text, "clicking preferred dismissal button");
        self.click_any_way(&button).await
    }

    async fn click_close_icon(&self) -> bool {
        match self
            .resolver
            .resolve_now(&self.profile.close_icons, WaitState::Visible)
            .await
            .into_handle()
        {
            Some(icon) => self.click_any_way(&icon).await,
            None => false,
        }
    }

    async fn cancel_burst(&self, dialogs_before: usize) -> bool {
        for _ in 0..self.profile.cancel_presses {
            if let Err(err) = self.page.press_key(&self.profile.cancel_key).await {
                trace!(error = %err, "cancel key failed");
                return false;
            }
            sleep(self.timings.poll_interval()).await;
        }
        let after = self.resolver.resolve_all_now(&self.profile.dialogs).await.len();
        after < dialogs_before
    }

    async fn click_any_way(&self, element: &ElementHandle) -> bool {
        match self.page.click(element, MouseButton::Left).await {
            Ok(()) => true,
            Err(err) => {
                trace!(error = %err, "pointer dismissal failed; dispatching");
                self.page.dispatch_click(element).await.is_ok()
            }
        }
    }

    // A dismissal click can land on a promotional link; step back once.
    async fn recover_url(&self) -> bool {
        let probe = self.timings.health_probe_timeout();
        let Ok(Ok(url)) = timeout(probe, self.page.current_url()).await else {
            return false;
        };
        if !self.profile.is_promotional_url(&url) {
            return false;
        }
        match timeout(probe, self.page.go_back()).await {
            Ok(Ok(())) => {
                debug!(%url, "navigated back from promotional page");
                true
            }
            Ok(Err(err)) => {
                warn!(%url, error = %err, "failed to leave promotional page");
                false
            }
            Err(_) => false,
        }
    }

    async fn health_probe(&self) -> bool {
        let probe = self.timings.health_probe_timeout();
        timeout(
            probe,
            self.resolver
                .resolve(self.plot_surface, probe, WaitState::Visible),
        )
        .await
        .is_ok_and(|resolution| resolution.handle().is_some())
    }
}

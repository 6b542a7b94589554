use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::api::{
    ActionExecutor, ActionOutcome, ActionRequest, InterstitialSuppressor, LocatorResolver,
    PilotConfig, UiProfile,
};
use crate::core::SelectorStrategy;
use crate::driver::{Page, WaitState};
use crate::error::{DriverResult, PilotError, PilotResult};

/// How the symbol was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolTier {
    /// Search hotkey, then the search input.
    SearchInput,
    /// Search hotkey, then typing blind.
    DirectTyping,
    SearchButton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeframeTier {
    Button,
    Hotkey,
}

/// Symbol, timeframe and plot focus.
pub struct ChartContext<'p, P: Page> {
    page: &'p P,
    profile: &'p UiProfile,
    config: &'p PilotConfig,
    executor: ActionExecutor<'p, P>,
    resolver: LocatorResolver<'p, P>,
}

impl<'p, P: Page> ChartContext<'p, P> {
    #[must_use]
    pub fn new(page: &'p P, profile: &'p UiProfile, config: &'p PilotConfig) -> Self {
        Self {
            page,
            profile,
            config,
            executor: ActionExecutor::new(page, &config.timings, config.capabilities),
            resolver: LocatorResolver::new(page, &config.timings),
        }
    }

    #[must_use]
    pub fn with_suppressor(mut self, suppressor: &'p InterstitialSuppressor<'p, P>) -> Self {
        self.executor = self.executor.with_suppressor(suppressor);
        self
    }

    /// Waits for the plot surface after navigation.
    pub async fn wait_for_plot_surface(&self) -> PilotResult<()> {
        let timeout = self.config.timings.plot_surface_timeout();
        let found = self
            .resolver
            .resolve(&self.profile.plot_surface, timeout, WaitState::Visible)
            .await;
        if found.handle().is_none() {
            return Err(PilotError::PlotSurfaceUnavailable { timeout });
        }
        sleep(self.config.timings.settle()).await;
        Ok(())
    }

    /// Clicks the plot so chart hotkeys reach it. Failing here aborts the run.
    pub async fn focus_plot(&self) -> PilotResult<ActionOutcome> {
        let request = ActionRequest::click(self.profile.plot_surface.clone()).critical();
        self.executor.perform_critical(&request).await
    }

    /// Switches the chart symbol; `None` when every tier failed.
    pub async fn set_symbol(&self, symbol: &str) -> Option<SymbolTier> {
        let tier = match self.symbol_via_input(symbol).await {
            Ok(true) => Some(SymbolTier::SearchInput),
            Ok(false) => None,
            Err(err) => {
                trace!(error = %err, "symbol search hotkey failed");
                None
            }
        };
        let tier = match tier {
            Some(tier) => Some(tier),
            None => self.symbol_by_typing(symbol).await,
        };
        let tier = match tier {
            Some(tier) => Some(tier),
            None => self.symbol_via_button(symbol).await,
        };

        match tier {
            Some(tier) => debug!(symbol, ?tier, "symbol set"),
            None => warn!(symbol, "symbol search failed"),
        }
        sleep(self.config.timings.chart_settle()).await;
        tier
    }

    async fn symbol_via_input(&self, symbol: &str) -> DriverResult<bool> {
        self.page.press_key(&self.profile.symbol_search_hotkey).await?;
        let input = &self.profile.symbol_search_input;
        let found = self
            .resolver
            .resolve(input, self.config.timings.per_strategy_timeout() * 3, WaitState::Visible)
            .await;
        let Some(handle) = found.into_handle() else {
            return Ok(false);
        };
        self.page.fill(&handle, symbol).await?;
        self.page.press_key("Enter").await?;
        Ok(true)
    }

    async fn symbol_by_typing(&self, symbol: &str) -> Option<SymbolTier> {
        let typed = async {
            self.page.press_key(&self.profile.symbol_search_hotkey).await?;
            sleep(self.config.timings.per_strategy_timeout()).await;
            self.page.type_text(symbol).await?;
            self.page.press_key("Enter").await
        };
        if let Err(err) = typed.await {
            trace!(error = %err, "typing symbol failed");
            return None;
        }
        if self.confirmed(&self.profile.symbol_legend.render(symbol)).await {
            Some(SymbolTier::DirectTyping)
        } else {
            debug!(symbol, "typed symbol never reached the legend");
            None
        }
    }

    async fn symbol_via_button(&self, symbol: &str) -> Option<SymbolTier> {
        let open = ActionRequest::click(self.profile.symbol_search_button.clone())
            .with_post_condition(self.profile.symbol_search_input.clone());
        if !self.executor.perform(&open).await.succeeded {
            return None;
        }
        let fill = ActionRequest::fill(self.profile.symbol_search_input.clone(), symbol);
        if !self.executor.perform(&fill).await.succeeded {
            return None;
        }
        self.page.press_key("Enter").await.ok()?;
        Some(SymbolTier::SearchButton)
    }

    /// Timeframe button, else the numeric hotkey typed on the chart.
    pub async fn set_timeframe(&self, timeframe: &str) -> Option<TimeframeTier> {
        let button = ActionRequest::click(self.profile.timeframe_button.render(timeframe))
            .with_retries(0);
        let tier = if self.executor.perform(&button).await.succeeded {
            Some(TimeframeTier::Button)
        } else {
            let key = self.profile.timeframe_hotkey(timeframe);
            let typed = async {
                self.page.type_text(key).await?;
                self.page.press_key("Enter").await
            };
            // The legend may show either the label or the typed interval.
            let legend = self
                .profile
                .timeframe_legend
                .render(timeframe)
                .chain(&self.profile.timeframe_legend.render(key));
            match typed.await {
                Ok(()) if self.confirmed(&legend).await => Some(TimeframeTier::Hotkey),
                Ok(()) => {
                    warn!(timeframe, key, "typed interval never reached the legend");
                    None
                }
                Err(err) => {
                    warn!(timeframe, error = %err, "timeframe hotkey failed");
                    None
                }
            }
        };
        debug!(timeframe, ?tier, "timeframe set");
        sleep(self.config.timings.settle()).await;
        tier
    }

    async fn confirmed(&self, legend: &SelectorStrategy) -> bool {
        let candidates = u32::try_from(legend.len().max(1)).unwrap_or(u32::MAX);
        let budget = self.config.timings.per_strategy_timeout().saturating_mul(candidates);
        self.resolver
            .resolve(legend, budget, WaitState::Visible)
            .await
            .handle()
            .is_some()
    }
}

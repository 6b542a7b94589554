use std::io;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::api::{
    ActionExecutor, ActionRequest, FailureStage, InterstitialSuppressor, LocatorResolver,
    PilotConfig, RecoverableFailure, UiProfile,
};
use crate::core::{IndicatorPreset, ParamValue, PresetCatalog, SelectorStrategy};
use crate::driver::{Page, WaitState};
use crate::error::{PilotError, PilotResult};

/// Reads `path` and returns the preset called `name`.
pub async fn load_preset(path: &Path, name: &str) -> PilotResult<IndicatorPreset> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => PilotError::PresetFileNotFound {
                path: path.to_path_buf(),
            },
            _ => PilotError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
    PresetCatalog::from_json_str(path, &text)?.get(name)
}

/// Per-indicator parameter work.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParamsReport {
    /// Whether any tier opened the settings dialog.
    pub opened: bool,
    pub applied: IndexMap<String, bool>,
    /// Read back after reopening; `None` when a value could not be read.
    pub verified: IndexMap<String, Option<bool>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetReport {
    pub preset: String,
    /// Present on the chart afterwards, including items that already were.
    pub added: Vec<String>,
    pub requested: Vec<String>,
    pub already_present: Vec<String>,
    pub cleared: usize,
    pub failures: Vec<RecoverableFailure>,
    pub params: IndexMap<String, ParamsReport>,
}

/// Applies indicator presets through the indicator dialog.
pub struct PresetApplier<'p, P: Page> {
    page: &'p P,
    profile: &'p UiProfile,
    config: &'p PilotConfig,
    executor: ActionExecutor<'p, P>,
    resolver: LocatorResolver<'p, P>,
}

impl<'p, P: Page> PresetApplier<'p, P> {
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

    /// Loads preset `name` and applies it in file order.
    ///
    /// Loading errors are fatal and happen before the page is touched.
    /// Everything after that degrades into [`PresetReport::failures`].
    pub async fn apply(
        &self,
        name: &str,
        clear_existing: bool,
        skip_params: bool,
    ) -> PilotResult<PresetReport> {
        let preset = load_preset(&self.config.preset_path, name).await?;
        Ok(self.apply_loaded(&preset, clear_existing, skip_params).await)
    }

    /// Applies an already loaded preset. Never fails.
    pub async fn apply_loaded(
        &self,
        preset: &IndicatorPreset,
        clear_existing: bool,
        skip_params: bool,
    ) -> PresetReport {
        info!(preset = %preset.name, items = preset.indicators.len(), "applying preset");

        let focus = ActionRequest::click(self.profile.plot_surface.clone()).with_retries(0);
        self.executor.perform(&focus).await;

        let mut report = PresetReport {
            preset: preset.name.clone(),
            added: Vec::new(),
            requested: preset.requested(),
            already_present: Vec::new(),
            cleared: 0,
            failures: Vec::new(),
            params: IndexMap::new(),
        };

        if clear_existing {
            match self.clear_existing().await {
                Ok(removed) => report.cleared = removed,
                Err(detail) => {
                    warn!(%detail, "clearing indicators failed");
                    report.failures.push(RecoverableFailure::new(
                        FailureStage::IndicatorClear,
                        "on_chart_items",
                        detail,
                    ));
                }
            }
        }

        for entry in &preset.indicators {
            let indicator = entry.name();
            match self.ensure_indicator(indicator).await {
                Ok(true) => report.already_present.push(indicator.to_owned()),
                Ok(false) => {}
                Err(detail) => {
                    warn!(indicator, %detail, "indicator add failed");
                    report.failures.push(RecoverableFailure::new(
                        FailureStage::IndicatorAdd,
                        indicator,
                        detail,
                    ));
                    continue;
                }
            }
            report.added.push(indicator.to_owned());

            let Some(params) = entry.params() else {
                continue;
            };
            if skip_params {
                debug!(indicator, count = params.len(), "parameter tuning skipped");
                continue;
            }
            let params_report = self.apply_params(indicator, params).await;
            if !params_report.opened {
                report.failures.push(RecoverableFailure::new(
                    FailureStage::IndicatorParams,
                    indicator,
                    "settings dialog did not open",
                ));
            }
            for (label, _) in params_report.applied.iter().filter(|(_, ok)| !**ok) {
                report.failures.push(RecoverableFailure::new(
                    FailureStage::IndicatorParams,
                    format!("{indicator}/{label}"),
                    "no control accepted the value",
                ));
            }
            report.params.insert(indicator.to_owned(), params_report);
        }

        if report.added.len() > 2 {
            sleep(self.config.timings.chart_settle()).await;
        }
        info!(
            preset = %report.preset,
            added = report.added.len(),
            failed = report.failures.len(),
            "preset applied"
        );
        report
    }

    /// Adds `indicator` unless the chart already lists it.
    ///
    /// `Ok(true)` when it was already present, `Ok(false)` when it was added.
    pub async fn ensure_indicator(&self, indicator: &str) -> Result<bool, String> {
        if self.is_present(indicator).await {
            debug!(indicator, "already on chart");
            return Ok(true);
        }
        self.add_indicator(indicator).await.map(|()| false)
    }

    /// Opens the indicator dialog, falling back to its hotkey.
    pub async fn open_dialog(&self) -> bool {
        let request = ActionRequest::click(self.profile.indicator_dialog_button.clone())
            .with_hotkey(self.profile.indicator_dialog_hotkey.clone())
            .with_post_condition(self.profile.dialog.clone());
        self.executor.perform(&request).await.succeeded
    }

    /// Case-insensitive lookup in the "on chart" listing.
    pub async fn is_present(&self, indicator: &str) -> bool {
        if !self.open_dialog().await {
            trace!(indicator, "dialog unavailable for existence check");
            return false;
        }
        self.show_on_chart_tab().await;
        let needle = indicator.to_lowercase();
        let present = self
            .resolver
            .resolve_all(&self.profile.on_chart_items, self.config.timings.per_strategy_timeout())
            .await
            .iter()
            .any(|item| item.text.to_lowercase().contains(&needle));
        self.close_dialog().await;
        present
    }

    async fn add_indicator(&self, indicator: &str) -> Result<(), String> {
        if !self.open_dialog().await {
            return Err("indicator dialog did not open".to_owned());
        }

        let search = ActionRequest::fill(self.profile.indicator_search.clone(), indicator).in_dialog();
        if !self.executor.perform(&search).await.succeeded {
            self.close_dialog().await;
            return Err("search field not usable".to_owned());
        }

        let row = self.profile.indicator_search_result.render(indicator);
        let listed = self
            .resolver
            .resolve(&row, self.budget_for(&row), WaitState::Visible)
            .await;
        if listed.handle().is_none() {
            self.close_dialog().await;
            return Err("no search result row appeared".to_owned());
        }

        self.page
            .press_key("Enter")
            .await
            .map_err(|e| format!("confirming search result: {e}"))?;
        sleep(self.config.timings.settle()).await;
        self.close_dialog().await;
        debug!(indicator, "indicator added");
        Ok(())
    }

    /// Removes configured items until none is left or the iteration cap is hit.
    pub async fn clear_existing(&self) -> Result<usize, String> {
        if !self.open_dialog().await {
            return Err("indicator dialog did not open".to_owned());
        }
        self.show_on_chart_tab().await;

        let mut removed = 0;
        for _ in 0..self.config.clear_iteration_cap {
            let remove = ActionRequest::click(self.profile.remove_item.clone())
                .with_retries(1)
                .in_dialog();
            if !self.executor.perform(&remove).await.succeeded {
                break;
            }
            removed += 1;
            sleep(self.config.timings.settle()).await;
        }
        self.close_dialog().await;
        debug!(removed, "cleared indicators");
        Ok(removed)
    }

    /// Opens settings, applies every param, confirms, then reopens once to
    /// read the values back.
    pub async fn apply_params(
        &self,
        indicator: &str,
        params: &IndexMap<String, ParamValue>,
    ) -> ParamsReport {
        let mut report = ParamsReport::default();
        if !self.open_settings(indicator).await {
            return report;
        }
        report.opened = true;

        for (label, value) in params {
            let text = value.to_string();
            let ok = if value.prefers_numeric() {
                self.set_numeric(label, &text).await || self.set_select(label, &text).await
            } else {
                self.set_select(label, &text).await || self.set_numeric(label, &text).await
            };
            trace!(indicator, label = %label, value = %text, ok, "param applied");
            report.applied.insert(label.clone(), ok);
        }
        self.confirm_settings().await;
        sleep(self.config.timings.settle()).await;

        if self.open_settings(indicator).await {
            for (label, value) in params {
                let read = self.read_value(label).await;
                report
                    .verified
                    .insert(label.clone(), read.map(|v| value.matches_readback(&v)));
            }
            self.confirm_settings().await;
        } else {
            debug!(indicator, "settings did not reopen for readback");
            for label in params.keys() {
                report.verified.insert(label.clone(), None);
            }
        }
        report
    }

    /// Legend gear, then legend context menu, then the dialog row gear.
    pub async fn open_settings(&self, indicator: &str) -> bool {
        let legend_row = self.profile.legend_item.render(indicator);
        let row = self
            .resolver
            .resolve(&legend_row, self.budget_for(&legend_row), WaitState::Visible)
            .await;

        if let Some(row) = row.handle() {
            if let Err(err) = self.page.hover(row).await {
                trace!(error = %err, "legend hover failed");
            }
            let gear = ActionRequest::click(self.profile.legend_settings.render(indicator))
                .with_retries(1)
                .with_post_condition(self.profile.dialog.clone());
            if self.executor.perform(&gear).await.succeeded {
                return true;
            }

            let menu = ActionRequest::context_click(legend_row.clone()).with_retries(0);
            if self.executor.perform(&menu).await.succeeded {
                let entry = ActionRequest::click(self.profile.context_menu_settings.clone())
                    .with_retries(1)
                    .with_post_condition(self.profile.dialog.clone());
                if self.executor.perform(&entry).await.succeeded {
                    return true;
                }
            }
        }

        if !self.open_dialog().await {
            return false;
        }
        self.show_on_chart_tab().await;
        let row_gear = ActionRequest::click(self.profile.dialog_row_settings.render(indicator))
            .with_retries(1)
            .with_post_condition(self.profile.dialog.clone())
            .in_dialog();
        let opened = self.executor.perform(&row_gear).await.succeeded;
        if !opened {
            self.close_dialog().await;
        }
        opened
    }

    async fn set_numeric(&self, label: &str, value: &str) -> bool {
        for alias in self.profile.label_candidates(label) {
            for template in [&self.profile.param_numeric, &self.profile.param_text] {
                let field = template.render(&alias);
                if self.resolver.resolve_now(&field, WaitState::Visible).await.handle().is_none() {
                    continue;
                }
                let fill = ActionRequest::fill(field, value).with_retries(1).in_dialog();
                if self.executor.perform(&fill).await.succeeded {
                    return true;
                }
            }
        }
        false
    }

    async fn set_select(&self, label: &str, option: &str) -> bool {
        let option = self.profile.combo_option.render(option);
        for alias in self.profile.label_candidates(label) {
            let combo = self.profile.param_combo.render(&alias);
            if self.resolver.resolve_now(&combo, WaitState::Visible).await.handle().is_none() {
                continue;
            }
            let select = ActionRequest::select(combo, option.clone())
                .with_retries(1)
                .in_dialog();
            if self.executor.perform(&select).await.succeeded {
                return true;
            }
        }
        false
    }

    async fn read_value(&self, label: &str) -> Option<String> {
        for alias in self.profile.label_candidates(label) {
            for template in [&self.profile.param_numeric, &self.profile.param_text] {
                let field = template.render(&alias);
                let Some(handle) = self
                    .resolver
                    .resolve_now(&field, WaitState::Visible)
                    .await
                    .into_handle()
                else {
                    continue;
                };
                match self.page.input_value(&handle).await {
                    Ok(value) => return Some(value),
                    Err(err) => trace!(label, error = %err, "readback failed"),
                }
            }
        }
        None
    }

    async fn confirm_settings(&self) {
        let ok = ActionRequest::click(self.profile.settings_ok.clone())
            .with_retries(1)
            .in_dialog();
        if !self.executor.perform(&ok).await.succeeded {
            self.close_dialog().await;
        }
    }

    async fn show_on_chart_tab(&self) {
        let tab = ActionRequest::click(self.profile.indicators_on_chart_tab.clone())
            .with_retries(0)
            .in_dialog();
        if self.executor.perform(&tab).await.succeeded {
            sleep(self.config.timings.settle()).await;
        }
    }

    async fn close_dialog(&self) {
        if let Err(err) = self.page.press_key(&self.profile.popup.cancel_key).await {
            trace!(error = %err, "closing dialog failed");
        }
    }

    fn budget_for(&self, strategy: &SelectorStrategy) -> Duration {
        let count = u32::try_from(strategy.len().max(1)).unwrap_or(u32::MAX);
        self.config.timings.per_strategy_timeout().saturating_mul(count)
    }
}

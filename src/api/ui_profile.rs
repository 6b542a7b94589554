use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::{SelectorStrategy, StrategyTemplate};
use crate::error::{PilotError, PilotResult};

/// Interstitial handling data for one UI version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupProfile {
    /// Containers that count as an obstructive dialog.
    pub dialogs: SelectorStrategy,
    /// Buttons inside dialogs, matched against the label lists below.
    pub dialog_buttons: SelectorStrategy,
    pub close_icons: SelectorStrategy,
    /// Lower-case substrings in priority order.
    pub preferred_labels: Vec<String>,
    /// Lower-case substrings that must never be clicked.
    pub avoided_labels: Vec<String>,
    pub cancel_key: String,
    pub cancel_presses: u32,
    /// URL fragments of promotional navigations.
    pub blocked_fragments: Vec<String>,
    pub hide_css: String,
}

impl PopupProfile {
    /// Priority of a dialog button label; `None` for avoided or unknown labels.
    #[must_use]
    pub fn preference_rank(&self, label: &str) -> Option<usize> {
        let label = label.trim().to_lowercase();
        if label.is_empty() || self.avoided_labels.iter().any(|a| label.contains(a.as_str())) {
            return None;
        }
        self.preferred_labels
            .iter()
            .position(|p| label.contains(p.as_str()))
    }

    #[must_use]
    pub fn is_promotional_url(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.blocked_fragments
            .iter()
            .any(|f| url.contains(f.as_str()))
    }
}

/// Everything that ties the engine to one version/locale of the target UI.
///
/// Strategies are ordered by priority; templates take one argument such as
/// an indicator name or a settings label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiProfile {
    pub name: String,
    pub version: u32,

    pub plot_surface: SelectorStrategy,
    pub price_axis_labels: SelectorStrategy,

    pub symbol_search_hotkey: String,
    pub symbol_search_input: SelectorStrategy,
    pub symbol_search_button: SelectorStrategy,
    pub timeframe_button: StrategyTemplate,
    pub timeframe_hotkeys: IndexMap<String, String>,
    pub default_timeframe_hotkey: String,
    /// Main-series legend showing the active symbol; confirms blind typing.
    pub symbol_legend: StrategyTemplate,
    /// Main-series legend showing the active interval.
    pub timeframe_legend: StrategyTemplate,

    pub dialog: SelectorStrategy,
    pub indicator_dialog_button: SelectorStrategy,
    pub indicator_dialog_hotkey: String,
    pub indicator_search: SelectorStrategy,
    pub indicator_search_result: StrategyTemplate,
    pub indicators_on_chart_tab: SelectorStrategy,
    pub on_chart_items: SelectorStrategy,
    pub remove_item: SelectorStrategy,

    pub legend_item: StrategyTemplate,
    pub legend_settings: StrategyTemplate,
    pub context_menu_settings: SelectorStrategy,
    pub dialog_row_settings: StrategyTemplate,

    pub param_numeric: StrategyTemplate,
    pub param_text: StrategyTemplate,
    pub param_combo: StrategyTemplate,
    pub combo_option: StrategyTemplate,
    pub settings_ok: SelectorStrategy,
    pub label_aliases: IndexMap<String, Vec<String>>,

    pub drawing_toolbar_reveal: SelectorStrategy,
    pub fib_tool: SelectorStrategy,
    pub fib_tool_group: SelectorStrategy,
    pub fib_tool_menu_entry: SelectorStrategy,
    pub fib_tool_hotkey: String,
    /// Level labels rendered next to a finished retracement.
    pub fib_result_labels: Vec<String>,

    pub popup: PopupProfile,
}

impl Default for UiProfile {
    fn default() -> Self {
        Self::en_ja()
    }
}

impl UiProfile {
    pub fn from_json_str(input: &str) -> PilotResult<Self> {
        let profile: Self = serde_json::from_str(input)
            .map_err(|e| PilotError::InvalidConfig(format!("ui profile: {e}")))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Rejects profiles with empty strategies the engine cannot do without.
    pub fn validate(&self) -> PilotResult<()> {
        let required = [
            &self.plot_surface,
            &self.price_axis_labels,
            &self.dialog,
            &self.indicator_dialog_button,
            &self.indicator_search,
            &self.fib_tool,
            &self.popup.dialogs,
        ];
        if let Some(empty) = required.iter().find(|s| s.is_empty()) {
            return Err(PilotError::InvalidConfig(format!(
                "ui profile `{}` has no candidates for `{}`",
                self.name, empty.name
            )));
        }
        Ok(())
    }

    /// Localized spellings of a settings label, the canonical one first.
    #[must_use]
    pub fn label_candidates(&self, label: &str) -> Vec<String> {
        match self.label_aliases.get(label) {
            Some(aliases) if !aliases.is_empty() => aliases.clone(),
            _ => vec![label.to_owned()],
        }
    }

    #[must_use]
    pub fn timeframe_hotkey(&self, timeframe: &str) -> &str {
        self.timeframe_hotkeys
            .get(timeframe)
            .map_or(self.default_timeframe_hotkey.as_str(), String::as_str)
    }

    /// English/Japanese profile for the current chart UI.
    #[must_use]
    pub fn en_ja() -> Self {
        const DIALOG: &str = "div[role='dialog']";
        let in_dialog = |rest: &str| format!("{DIALOG} {rest}");

        Self {
            name: "en-ja".to_owned(),
            version: 1,

            plot_surface: SelectorStrategy::new(
                "plot_surface",
                ["div[data-name='pane'] canvas", "canvas"],
            ),
            price_axis_labels: SelectorStrategy::new(
                "price_axis_labels",
                [
                    "div[data-name='price-axis'] span",
                    "div[data-name='price-axis'] div",
                ],
            ),

            symbol_search_hotkey: "/".to_owned(),
            symbol_search_input: SelectorStrategy::new(
                "symbol_search_input",
                [
                    "input[data-name='symbol-search-input']",
                    "input[aria-label='Symbol Search']",
                    "input[placeholder*='Symbol']",
                ],
            ),
            symbol_search_button: SelectorStrategy::new(
                "symbol_search_button",
                [
                    "button[aria-label*='Symbol']",
                    "button[aria-label*='銘柄検索']",
                    "button[data-tooltip*='Symbol']",
                    "[data-name='symbol-search-button']",
                ],
            ),
            timeframe_button: StrategyTemplate::new(
                "timeframe_button",
                [
                    "button[aria-label='{}']",
                    "button[data-value='{}']",
                    "button:has-text('{}')",
                ],
            ),
            timeframe_hotkeys: [
                ("1m", "1"),
                ("5m", "5"),
                ("15m", "15"),
                ("1h", "60"),
                ("4h", "240"),
                ("D", "D"),
            ]
            .into_iter()
            .map(|(tf, key)| (tf.to_owned(), key.to_owned()))
            .collect(),
            default_timeframe_hotkey: "60".to_owned(),
            symbol_legend: StrategyTemplate::new(
                "symbol_legend",
                [
                    "div[data-name='legend-series-item'] [data-name='legend-source-title']:has-text('{}')",
                    "div[data-name='legend-series-item']:has-text('{}')",
                ],
            ),
            timeframe_legend: StrategyTemplate::new(
                "timeframe_legend",
                [
                    "div[data-name='legend-series-item'] [data-name='legend-source-interval']:has-text('{}')",
                    "#header-toolbar-intervals button[aria-checked='true']:has-text('{}')",
                ],
            ),

            dialog: SelectorStrategy::single("dialog", DIALOG),
            indicator_dialog_button: SelectorStrategy::new(
                "indicator_dialog_button",
                [
                    "button[aria-label*='Indicators']",
                    "button[aria-label*='Indicators & Strategies']",
                    "button:has-text('Indicators')",
                    "button:has-text('Indicators & Metrics')",
                    "button:has-text('インジケーター')",
                    "[data-name='open-indicators-dialog'] button",
                ],
            ),
            indicator_dialog_hotkey: "Control+K".to_owned(),
            indicator_search: SelectorStrategy::new(
                "indicator_search",
                [
                    in_dialog("input[placeholder*='Search']"),
                    in_dialog("input[data-role='search']"),
                    in_dialog("input[type='search']"),
                ],
            ),
            indicator_search_result: StrategyTemplate::new(
                "indicator_search_result",
                [
                    in_dialog("div[data-role='list-item']:has-text('{}')"),
                    in_dialog("div[role='listitem']:has-text('{}')"),
                    in_dialog("div[class*='item']:has-text('{}')"),
                ],
            ),
            indicators_on_chart_tab: SelectorStrategy::new(
                "indicators_on_chart_tab",
                [
                    in_dialog("button:has-text('Indicators on chart')"),
                    in_dialog("button:has-text('インジケーター（チャート）')"),
                ],
            ),
            on_chart_items: SelectorStrategy::new(
                "on_chart_items",
                [
                    in_dialog("div[role='listitem']"),
                    in_dialog("div[class*='item']"),
                ],
            ),
            remove_item: SelectorStrategy::new(
                "remove_item",
                [
                    in_dialog("[data-name='remove']"),
                    in_dialog("button[aria-label*='Remove']"),
                ],
            ),

            legend_item: StrategyTemplate::new(
                "legend_item",
                ["div[data-name='legend-source-item']:has-text('{}')"],
            ),
            legend_settings: StrategyTemplate::new(
                "legend_settings",
                [
                    "div[data-name='legend-source-item']:has-text('{}') button[aria-label*='Settings']",
                    "div[data-name='legend-source-item']:has-text('{}') [data-name='legend-settings-action']",
                ],
            ),
            context_menu_settings: SelectorStrategy::new(
                "context_menu_settings",
                [
                    "div[role='menu'] div:has-text('Settings')",
                    "div[role='menu'] div:has-text('設定')",
                ],
            ),
            dialog_row_settings: StrategyTemplate::new(
                "dialog_row_settings",
                [
                    in_dialog(":is(div,li):has-text('{}') button[aria-label*='Settings']"),
                    in_dialog(":is(div,li):has-text('{}') [data-name='settings']"),
                ],
            ),

            param_numeric: StrategyTemplate::new(
                "param_numeric",
                [
                    in_dialog("label:has-text('{}') ~ input[type='number']"),
                    in_dialog("label:has-text('{}') ~ * [role='spinbutton']"),
                    in_dialog("label:has-text('{}') ~ input[inputmode='numeric']"),
                ],
            ),
            param_text: StrategyTemplate::new(
                "param_text",
                [
                    in_dialog("label:has-text('{}') ~ input[type='text']"),
                    in_dialog("label:has-text('{}') ~ [contenteditable='true']"),
                ],
            ),
            param_combo: StrategyTemplate::new(
                "param_combo",
                [
                    in_dialog("label:has-text('{}') ~ * [role='combobox']"),
                    in_dialog("label:has-text('{}') ~ select"),
                ],
            ),
            combo_option: StrategyTemplate::new(
                "combo_option",
                [
                    "[role='listbox'] div:has-text('{}')",
                    "option:has-text('{}')",
                ],
            ),
            settings_ok: SelectorStrategy::new(
                "settings_ok",
                [
                    in_dialog("button:has-text('OK')"),
                    in_dialog("button:has-text('Apply')"),
                    in_dialog("button:has-text('適用')"),
                ],
            ),
            label_aliases: [
                ("Length", &["Length", "期間"][..]),
                ("Source", &["Source", "ソース", "ソース/値", "ソース/価格"][..]),
                ("Fast Length", &["Fast Length", "短期"][..]),
                ("Slow Length", &["Slow Length", "長期"][..]),
                ("Signal Smoothing", &["Signal Smoothing", "シグナル平滑"][..]),
            ]
            .into_iter()
            .map(|(label, aliases)| {
                (
                    label.to_owned(),
                    aliases.iter().map(|a| (*a).to_owned()).collect(),
                )
            })
            .collect(),

            drawing_toolbar_reveal: SelectorStrategy::new(
                "drawing_toolbar_reveal",
                [
                    "button[aria-label*='Drawing']",
                    "button[aria-label*='Tools']",
                    "button[data-name*='drawing']",
                    "[data-name='drawing-toolbar-button']",
                ],
            ),
            fib_tool: SelectorStrategy::new(
                "fib_tool",
                [
                    "button[data-name='linetool-fib-retracement']",
                    "button[aria-label='Fib Retracement']",
                    "button[aria-label*='Fibonacci Retracement']",
                    "button[title*='Fib']",
                    "button[title*='Fibonacci']",
                    "[data-name*='linetool-group'] button[aria-label*='Fib']",
                    "[data-name*='drawing-toolbar'] button[aria-label*='Fib']",
                    "button[aria-label*='Fib']",
                    "button:has-text('Fib')",
                    "button[aria-label*='Retracement']",
                    "button:has-text('リトレースメント')",
                    "[data-name*='linetool-fib']",
                    "[data-name*='fib']",
                    "[data-name*='fibonacci']",
                ],
            ),
            fib_tool_group: SelectorStrategy::new(
                "fib_tool_group",
                [
                    "[data-name='linetool-group-gann-and-fibonacci'] [data-name='dropdown-button']",
                    "[data-name*='linetool-group'][data-name*='fib'] button",
                    "button[aria-label*='Gann and Fibonacci']",
                ],
            ),
            fib_tool_menu_entry: SelectorStrategy::new(
                "fib_tool_menu_entry",
                [
                    "div[role='menu'] div:has-text('Fib Retracement')",
                    "div[data-name='menu-inner'] div:has-text('Fib Retracement')",
                    "div[role='menu'] div:has-text('フィボナッチ・リトレースメント')",
                ],
            ),
            fib_tool_hotkey: "Alt+F".to_owned(),
            fib_result_labels: ["0", "0.236", "0.382", "0.5", "0.618", "0.786", "1"]
                .into_iter()
                .map(str::to_owned)
                .collect(),

            popup: PopupProfile {
                dialogs: SelectorStrategy::new(
                    "popup_dialogs",
                    [DIALOG, "div[class*='dialog']", "div[class*='modal']"],
                ),
                dialog_buttons: SelectorStrategy::new(
                    "popup_dialog_buttons",
                    [
                        in_dialog("button"),
                        "div[class*='dialog'] button".to_owned(),
                        "div[class*='modal'] button".to_owned(),
                    ],
                ),
                close_icons: SelectorStrategy::new(
                    "popup_close_icons",
                    [
                        in_dialog("button[aria-label='Close']"),
                        in_dialog("button:has-text('×')"),
                        in_dialog("[data-name='close']"),
                        "div[class*='modal'] [class*='close']".to_owned(),
                    ],
                ),
                preferred_labels: [
                    "don't need",
                    "don't",
                    "no thanks",
                    "not now",
                    "got it",
                    "skip",
                    "dismiss",
                    "close",
                    "cancel",
                    "閉じる",
                    "キャンセル",
                    "不要",
                    "無視",
                ]
                .into_iter()
                .map(str::to_owned)
                .collect(),
                avoided_labels: ["show my options", "upgrade", "start free trial", "see plans"]
                    .into_iter()
                    .map(str::to_owned)
                    .collect(),
                cancel_key: "Escape".to_owned(),
                cancel_presses: 3,
                blocked_fragments: [
                    "/checkout",
                    "/pricing",
                    "/upgrade",
                    "/plus",
                    "#order",
                    "/subscription",
                    "/plans",
                ]
                .into_iter()
                .map(str::to_owned)
                .collect(),
                hide_css:
                    "[class*='modal'], [class*='Dialog'], [role='dialog'] { display:none !important; }"
                        .to_owned(),
            },
        }
    }
}

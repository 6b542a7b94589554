#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chart_pilot::api::{ChartPilot, PilotConfig, Timings, UiProfile};
use chart_pilot::core::{LabelHit, Rect, Viewport};
use chart_pilot::driver::{SimDom, SimElement, SimPage};

pub const CHART_URL: &str = "https://charts.example/chart/";

pub const PLOT: &str = "div[data-name='pane'] canvas";
pub const AXIS_LABEL: &str = "div[data-name='price-axis'] span";
pub const DIALOG: &str = "div[role='dialog']";
pub const INDICATOR_BUTTON: &str = "button[aria-label*='Indicators']";
pub const SEARCH_INPUT: &str = "div[role='dialog'] input[placeholder*='Search']";
pub const ON_CHART_TAB: &str = "div[role='dialog'] button:has-text('Indicators on chart')";
pub const ON_CHART_ITEM: &str = "div[role='dialog'] div[role='listitem']";
pub const REMOVE_ITEM: &str = "div[role='dialog'] [data-name='remove']";
pub const SETTINGS_OK: &str = "div[role='dialog'] button:has-text('OK')";
pub const DIALOG_BUTTON: &str = "div[role='dialog'] button";
pub const SYMBOL_INPUT: &str = "input[data-name='symbol-search-input']";
pub const FIB_TOOL: &str = "button[data-name='linetool-fib-retracement']";
pub const FIB_GROUP: &str =
    "[data-name='linetool-group-gann-and-fibonacci'] [data-name='dropdown-button']";
pub const FIB_MENU_ENTRY: &str = "div[role='menu'] div:has-text('Fib Retracement')";

pub fn plot_rect() -> Rect {
    Rect::new(100.0, 50.0, 1200.0, 700.0)
}

/// Axis layout of the simulated chart: 35 px per price unit, 160 at the top.
pub fn price_to_y(price: f64) -> f64 {
    50.0 + (160.0 - price) * 35.0
}

pub fn fast_timings() -> Timings {
    Timings {
        per_strategy_timeout_ms: 100,
        action_attempt_timeout_ms: 200,
        action_retries: 2,
        suppress_budget_ms: 800,
        health_probe_timeout_ms: 150,
        press_move_delay_ms: 150,
        drag_steps: 4,
        drawing_stabilization_ms: 200,
        poll_interval_ms: 10,
        settle_ms: 10,
        chart_settle_ms: 20,
        plot_surface_timeout_ms: 1_000,
    }
}

pub fn test_config() -> PilotConfig {
    PilotConfig::new(CHART_URL).with_timings(fast_timings())
}

pub fn button(selector: &str, text: &str) -> SimElement {
    SimElement::new(selector, Rect::new(10.0, 10.0, 80.0, 24.0)).with_text(text)
}

/// Page with a visible plot surface and nothing else.
pub fn chart_page() -> SimPage {
    SimPage::new(Viewport::new(1600, 900)).with_element(SimElement::new(PLOT, plot_rect()))
}

pub fn seed_price_axis(page: &SimPage, prices: &[f64]) {
    for &price in prices {
        let y = price_to_y(price);
        page.insert(
            SimElement::new(AXIS_LABEL, Rect::new(1310.0, y - 8.0, 60.0, 16.0))
                .with_text(format!("{price:.2}")),
        );
    }
}

pub fn pilot(page: SimPage, preset_path: &Path) -> ChartPilot<SimPage> {
    ChartPilot::new(
        page,
        test_config().with_preset_path(preset_path),
        UiProfile::en_ja(),
    )
    .expect("valid pilot")
}

pub fn legend_row(name: &str) -> String {
    format!("div[data-name='legend-source-item']:has-text('{name}')")
}

pub fn legend_gear(name: &str) -> String {
    format!("{} button[aria-label*='Settings']", legend_row(name))
}

pub fn numeric_field(label: &str) -> String {
    format!("div[role='dialog'] label:has-text('{label}') ~ input[type='number']")
}

pub fn search_row(name: &str) -> String {
    format!("div[role='dialog'] div[data-role='list-item']:has-text('{name}')")
}

#[derive(Default)]
struct ChartInner {
    on_chart: Vec<String>,
    pending: Option<String>,
    settings_for: Option<String>,
    params: HashMap<(String, String), String>,
}

/// Indicator state behind a simulated indicator dialog.
#[derive(Clone, Default)]
pub struct ChartState {
    inner: Arc<Mutex<ChartInner>>,
    settings_labels: Arc<Vec<String>>,
}

impl ChartState {
    fn lock(&self) -> MutexGuard<'_, ChartInner> {
        self.inner.lock().expect("chart state")
    }

    pub fn on_chart(&self) -> Vec<String> {
        self.lock().on_chart.clone()
    }

    pub fn param(&self, indicator: &str, label: &str) -> Option<String> {
        self.lock()
            .params
            .get(&(indicator.to_owned(), label.to_owned()))
            .cloned()
    }

    /// Puts `name` on the chart before the run starts.
    pub fn seed(&self, page: &SimPage, name: &str) {
        self.lock().on_chart.push(name.to_owned());
        page.with_dom(|dom| insert_legend(dom, name));
    }

    fn close_all(&self, dom: &mut SimDom) {
        for selector in [DIALOG, SEARCH_INPUT, ON_CHART_TAB, ON_CHART_ITEM, REMOVE_ITEM, SETTINGS_OK] {
            dom.remove(selector);
        }
        for label in self.settings_labels.iter() {
            dom.remove(&numeric_field(label));
        }
        let mut inner = self.lock();
        if let Some(pending) = inner.pending.take() {
            dom.remove(&search_row(&pending));
        }
        inner.settings_for = None;
    }
}

fn insert_legend(dom: &mut SimDom, name: &str) {
    dom.insert(
        SimElement::new(legend_row(name), Rect::new(110.0, 60.0, 160.0, 18.0)).with_text(name),
    );
    dom.insert(SimElement::new(legend_gear(name), Rect::new(280.0, 60.0, 18.0, 18.0)));
}

/// Wires the indicator dialog, its search, the on-chart listing and the
/// legend settings dialogs for `known` indicators.
pub fn install_indicator_dialog(page: &SimPage, known: &[&str], settings_labels: &[&str]) -> ChartState {
    let state = ChartState {
        inner: Arc::default(),
        settings_labels: Arc::new(settings_labels.iter().map(|l| (*l).to_owned()).collect()),
    };
    page.insert(button(INDICATOR_BUTTON, "Indicators"));

    page.on_click(INDICATOR_BUTTON, |dom| {
        if !dom.contains(DIALOG) {
            dom.insert(SimElement::new(DIALOG, Rect::new(400.0, 150.0, 800.0, 600.0)));
            dom.insert(SimElement::new(SEARCH_INPUT, Rect::new(420.0, 170.0, 400.0, 30.0)));
            dom.insert(button(ON_CHART_TAB, "Indicators on chart"));
        }
    });

    let listing = state.clone();
    page.on_click(ON_CHART_TAB, move |dom| {
        dom.remove(ON_CHART_ITEM);
        dom.remove(REMOVE_ITEM);
        for name in listing.on_chart() {
            dom.insert(
                SimElement::new(ON_CHART_ITEM, Rect::new(420.0, 220.0, 400.0, 30.0)).with_text(name),
            );
            dom.insert(SimElement::new(REMOVE_ITEM, Rect::new(830.0, 220.0, 20.0, 20.0)));
        }
    });

    let remover = state.clone();
    page.on_click(REMOVE_ITEM, move |dom| {
        let removed = {
            let mut inner = remover.lock();
            if inner.on_chart.is_empty() {
                None
            } else {
                Some(inner.on_chart.remove(0))
            }
        };
        if let Some(name) = removed {
            dom.remove_first(ON_CHART_ITEM);
            dom.remove_first(REMOVE_ITEM);
            dom.remove(&legend_row(&name));
            dom.remove(&legend_gear(&name));
        }
    });

    let catalogue: Vec<String> = known.iter().map(|k| (*k).to_owned()).collect();
    let search = state.clone();
    page.on_fill(SEARCH_INPUT, move |dom, value| {
        let mut inner = search.lock();
        if let Some(previous) = inner.pending.take() {
            dom.remove(&search_row(&previous));
        }
        if let Some(found) = catalogue.iter().find(|k| k.eq_ignore_ascii_case(value)) {
            dom.insert(
                SimElement::new(search_row(found), Rect::new(420.0, 220.0, 400.0, 30.0))
                    .with_text(found.as_str()),
            );
            inner.pending = Some(found.clone());
        }
    });

    let confirm = state.clone();
    page.on_key("Enter", move |dom| {
        let mut inner = confirm.lock();
        if let Some(name) = inner.pending.take() {
            dom.remove(&search_row(&name));
            if !inner.on_chart.contains(&name) {
                inner.on_chart.push(name.clone());
                insert_legend(dom, &name);
            }
        }
    });

    let closer = state.clone();
    page.on_key("Escape", move |dom| closer.close_all(dom));

    for name in known {
        let settings = state.clone();
        let indicator = (*name).to_owned();
        page.on_click(&legend_gear(name), move |dom| {
            dom.insert(SimElement::new(DIALOG, Rect::new(400.0, 150.0, 800.0, 600.0)));
            dom.insert(button(SETTINGS_OK, "OK"));
            let mut inner = settings.lock();
            for label in settings.settings_labels.iter() {
                let value = inner
                    .params
                    .get(&(indicator.clone(), label.clone()))
                    .cloned()
                    .unwrap_or_else(|| "9".to_owned());
                dom.insert(
                    SimElement::new(numeric_field(label), Rect::new(600.0, 300.0, 80.0, 24.0))
                        .with_value(value),
                );
            }
            inner.settings_for = Some(indicator.clone());
        });
    }

    let saver = state.clone();
    page.on_click(SETTINGS_OK, move |dom| {
        let indicator = saver.lock().settings_for.take();
        if let Some(indicator) = indicator {
            for label in saver.settings_labels.iter() {
                if let Some(value) = dom.value_of(&numeric_field(label)) {
                    let value = value.to_owned();
                    saver
                        .lock()
                        .params
                        .insert((indicator.clone(), label.clone()), value);
                }
            }
        }
        saver.close_all(dom);
    });

    state
}

/// Symbol search opened by `/` and closed by Enter.
pub fn install_symbol_search(page: &SimPage) {
    page.on_key("/", |dom| {
        if !dom.contains(SYMBOL_INPUT) {
            dom.insert(SimElement::new(SYMBOL_INPUT, Rect::new(600.0, 100.0, 300.0, 30.0)));
        }
    });
    page.on_key("Enter", |dom| {
        dom.remove(SYMBOL_INPUT);
    });
}

/// Main-series legend that follows whatever was entered before Enter, typed
/// blind or filled into the symbol search.
pub fn install_chart_legend(page: &SimPage) {
    let entered = Arc::new(Mutex::new(String::new()));
    let typed = Arc::clone(&entered);
    page.on_text(move |_, text| typed.lock().expect("legend text").push_str(text));
    let filled = Arc::clone(&entered);
    page.on_fill(SYMBOL_INPUT, move |_, value| {
        *filled.lock().expect("legend text") = value.to_owned();
    });
    page.on_key("Enter", move |dom| {
        let text = std::mem::take(&mut *entered.lock().expect("legend text"));
        if text.is_empty() {
            return;
        }
        let profile = UiProfile::en_ja();
        for legend in [
            profile.symbol_legend.render(&text),
            profile.timeframe_legend.render(&text),
        ] {
            dom.insert(SimElement::new(
                legend.candidates[0].clone(),
                Rect::new(110.0, 55.0, 200.0, 18.0),
            ));
        }
    });
}

/// Renders retracement level labels along every completed drag from the
/// `first_rendering`-th gesture on. Returns the gesture counter.
pub fn render_levels_on_drag(page: &SimPage, first_rendering: usize) -> Arc<AtomicUsize> {
    let drags = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&drags);
    page.on_drag(move |dom, from, to| {
        let gesture = counter.fetch_add(1, Ordering::SeqCst) + 1;
        dom.clear_labels();
        if gesture < first_rendering {
            return;
        }
        for (level, t) in [("0", 0.0), ("0.382", 0.382), ("0.618", 0.618), ("1", 1.0)] {
            let at = from.lerp(to, t);
            dom.add_label(LabelHit::new(
                format!("{level} (150.00)"),
                Rect::new(at.x - 15.0, at.y - 6.0, 30.0, 12.0),
            ));
        }
    });
    drags
}

mod support;

use std::path::Path;

use chart_pilot::api::{FailureStage, PresetApplier, UiProfile};
use chart_pilot::core::{IndicatorPreset, PresetCatalog};
use chart_pilot::driver::SimPage;

use support::{
    ChartState, SEARCH_INPUT, chart_page, install_indicator_dialog, legend_gear, numeric_field,
    test_config,
};

const KNOWN: [&str; 4] = ["Volume", "RSI", "MACD", "VWAP"];

fn preset(json: &str, name: &str) -> IndicatorPreset {
    PresetCatalog::from_json_str(Path::new("inline.json"), json)
        .and_then(|catalog| catalog.get(name))
        .expect("inline preset")
}

fn sim_chart(settings_labels: &[&str]) -> (SimPage, ChartState) {
    let page = chart_page();
    let state = install_indicator_dialog(&page, &KNOWN, settings_labels);
    (page, state)
}

#[tokio::test(start_paused = true)]
async fn missing_indicators_are_added_in_order() {
    let (page, state) = sim_chart(&[]);
    let profile = UiProfile::en_ja();
    let config = test_config();
    let preset = preset(r#"{ "basic": { "indicators": ["Volume", "RSI"] } }"#, "basic");

    let report = PresetApplier::new(&page, &profile, &config)
        .apply_loaded(&preset, false, false)
        .await;

    assert_eq!(report.added, ["Volume", "RSI"]);
    assert!(report.already_present.is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(state.on_chart(), ["Volume", "RSI"]);
}

#[tokio::test(start_paused = true)]
async fn applying_twice_adds_nothing_new() {
    let (page, state) = sim_chart(&[]);
    let profile = UiProfile::en_ja();
    let config = test_config();
    let preset = preset(r#"{ "basic": { "indicators": ["Volume", "MACD"] } }"#, "basic");
    let applier = PresetApplier::new(&page, &profile, &config);

    let first = applier.apply_loaded(&preset, false, false).await;
    let searches_after_first = page.fills().len();
    let second = applier.apply_loaded(&preset, false, false).await;

    assert_eq!(first.added, second.added);
    assert_eq!(second.already_present, ["Volume", "MACD"]);
    assert_eq!(page.fills().len(), searches_after_first);
    assert_eq!(state.on_chart(), ["Volume", "MACD"]);
}

#[tokio::test(start_paused = true)]
async fn unknown_indicator_degrades_to_failure() {
    let (page, state) = sim_chart(&[]);
    let profile = UiProfile::en_ja();
    let config = test_config();
    let preset = preset(r#"{ "ab": { "indicators": ["Volume", "Bogus"] } }"#, "ab");

    let report = PresetApplier::new(&page, &profile, &config)
        .apply_loaded(&preset, false, false)
        .await;

    assert_eq!(report.added, ["Volume"]);
    assert_eq!(report.requested, ["Volume", "Bogus"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::IndicatorAdd);
    assert_eq!(report.failures[0].target, "Bogus");
    assert_eq!(state.on_chart(), ["Volume"]);
}

#[tokio::test(start_paused = true)]
async fn skip_params_never_touches_settings() {
    let (page, _state) = sim_chart(&["Length"]);
    let profile = UiProfile::en_ja();
    let config = test_config();
    let preset = preset(
        r#"{ "tuned": { "indicators": [{ "name": "RSI", "params": { "Length": 14 } }] } }"#,
        "tuned",
    );

    let report = PresetApplier::new(&page, &profile, &config)
        .apply_loaded(&preset, false, true)
        .await;

    assert_eq!(report.added, ["RSI"]);
    assert!(report.params.is_empty());
    assert!(!page.clicked().contains(&legend_gear("RSI")));
    assert!(page.fills().iter().all(|(selector, _)| selector == SEARCH_INPUT));
}

#[tokio::test(start_paused = true)]
async fn params_are_applied_and_read_back() {
    let (page, state) = sim_chart(&["Length"]);
    let profile = UiProfile::en_ja();
    let config = test_config();
    let preset = preset(
        r#"{ "tuned": { "indicators": [{ "name": "RSI", "params": { "Length": 14, "Smoothing": 3 } }] } }"#,
        "tuned",
    );

    let report = PresetApplier::new(&page, &profile, &config)
        .apply_loaded(&preset, false, false)
        .await;

    let rsi = &report.params["RSI"];
    assert!(rsi.opened);
    assert_eq!(rsi.applied["Length"], true);
    assert_eq!(rsi.applied["Smoothing"], false);
    assert_eq!(rsi.verified["Length"], Some(true));
    assert_eq!(rsi.verified["Smoothing"], None);
    assert_eq!(state.param("RSI", "Length").as_deref(), Some("14"));

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::IndicatorParams);
    assert_eq!(report.failures[0].target, "RSI/Smoothing");
    assert!(page
        .fills()
        .contains(&(numeric_field("Length"), "14".to_owned())));
}

#[tokio::test(start_paused = true)]
async fn already_present_indicator_still_gets_params() {
    let (page, state) = sim_chart(&["Length"]);
    state.seed(&page, "RSI");
    let profile = UiProfile::en_ja();
    let config = test_config();
    let preset = preset(
        r#"{ "tuned": { "indicators": [{ "name": "RSI", "params": { "Length": 21 } }] } }"#,
        "tuned",
    );

    let report = PresetApplier::new(&page, &profile, &config)
        .apply_loaded(&preset, false, false)
        .await;

    assert_eq!(report.already_present, ["RSI"]);
    assert_eq!(report.added, ["RSI"]);
    assert_eq!(state.param("RSI", "Length").as_deref(), Some("21"));
}

#[tokio::test(start_paused = true)]
async fn clear_existing_removes_everything_first() {
    let (page, state) = sim_chart(&[]);
    state.seed(&page, "VWAP");
    state.seed(&page, "MACD");
    let profile = UiProfile::en_ja();
    let config = test_config();
    let preset = preset(r#"{ "basic": { "indicators": ["Volume"] } }"#, "basic");

    let report = PresetApplier::new(&page, &profile, &config)
        .apply_loaded(&preset, true, false)
        .await;

    assert_eq!(report.cleared, 2);
    assert_eq!(state.on_chart(), ["Volume"]);
}

#[tokio::test(start_paused = true)]
async fn cleared_chart_reports_partial_add() {
    let (page, state) = sim_chart(&[]);
    state.seed(&page, "VWAP");
    let profile = UiProfile::en_ja();
    let config = test_config();
    let preset = preset(r#"{ "ab": { "indicators": ["Volume", "Bogus"] } }"#, "ab");

    let report = PresetApplier::new(&page, &profile, &config)
        .apply_loaded(&preset, true, false)
        .await;

    assert_eq!(report.cleared, 1);
    assert_eq!(report.added, ["Volume"]);
    assert_eq!(report.requested, ["Volume", "Bogus"]);
    assert!(report.already_present.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::IndicatorAdd);
    assert_eq!(report.failures[0].target, "Bogus");
    assert_eq!(state.on_chart(), ["Volume"]);
}

#[tokio::test(start_paused = true)]
async fn apply_reads_preset_file_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("indicators.json");
    std::fs::write(&path, r#"{ "basic": { "indicators": ["VWAP"] } }"#).expect("write presets");

    let (page, state) = sim_chart(&[]);
    let profile = UiProfile::en_ja();
    let config = test_config().with_preset_path(&path);
    let applier = PresetApplier::new(&page, &profile, &config);

    let err = applier.apply("missing", false, false).await.expect_err("unknown preset");
    assert!(err.to_string().contains("missing"));
    assert!(page.journal().is_empty());

    let report = applier.apply("basic", false, false).await.expect("apply basic");
    assert_eq!(report.added, ["VWAP"]);
    assert_eq!(state.on_chart(), ["VWAP"]);
}

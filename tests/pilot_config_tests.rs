use std::collections::HashMap;
use std::path::PathBuf;

use chart_pilot::api::{
    ENV_HEADLESS, ENV_PRESET_PATH, ENV_STORAGE_STATE, ENV_SUPPRESS_BUDGET_MS, OverlaySuppression,
    PilotConfig, Timings, UiProfile,
};
use chart_pilot::core::{SelectorStrategy, StrategyTemplate, Viewport};
use chart_pilot::error::PilotError;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn defaults_are_valid() {
    let config = PilotConfig::default();
    config.validate().expect("defaults validate");

    assert_eq!(config.viewport, Viewport::new(1600, 900));
    assert!(config.headless);
    assert_eq!(config.preset_path, PathBuf::from("indicators.json"));
    assert_eq!(config.timings.suppress_budget_ms, 800);
    assert_eq!(config.timings.health_probe_timeout_ms, 150);
    assert_eq!(config.timings.press_move_delay_ms, 150);
    assert_eq!(config.overlay_suppression, OverlaySuppression::Full);
    assert_eq!(config.fallback_domain.min, 140.0);
    assert_eq!(config.fallback_domain.max, 160.0);
}

#[test]
fn environment_overrides_apply() {
    let config = PilotConfig::default().with_env_overrides(env(&[
        (ENV_STORAGE_STATE, "/tmp/state.json"),
        (ENV_PRESET_PATH, "/etc/presets.json"),
        (ENV_SUPPRESS_BUDGET_MS, "1500"),
        (ENV_HEADLESS, "off"),
    ]));

    assert_eq!(config.storage_state_path, Some(PathBuf::from("/tmp/state.json")));
    assert_eq!(config.preset_path, PathBuf::from("/etc/presets.json"));
    assert_eq!(config.timings.suppress_budget_ms, 1500);
    assert!(!config.headless);
}

#[test]
fn malformed_environment_values_are_ignored() {
    let config = PilotConfig::default().with_env_overrides(env(&[
        (ENV_SUPPRESS_BUDGET_MS, "soon"),
        (ENV_HEADLESS, "maybe"),
        (ENV_STORAGE_STATE, "  "),
    ]));
    assert_eq!(config, PilotConfig::default());

    let zero = PilotConfig::default().with_env_overrides(env(&[(ENV_SUPPRESS_BUDGET_MS, "0")]));
    assert_eq!(zero.timings.suppress_budget_ms, 800);
}

#[test]
fn validate_rejects_zero_budgets_and_bad_domains() {
    let timings = Timings {
        suppress_budget_ms: 0,
        ..Timings::default()
    };
    let err = PilotConfig::default()
        .with_timings(timings)
        .validate()
        .expect_err("zero budget");
    assert!(matches!(err, PilotError::InvalidConfig(ref msg) if msg.contains("suppress_budget_ms")));

    assert!(PilotConfig::default()
        .with_fallback_domain(160.0, 140.0)
        .validate()
        .is_err());
    assert!(PilotConfig::default()
        .with_viewport(Viewport::new(0, 900))
        .validate()
        .is_err());
    assert!(PilotConfig::new(" ").validate().is_err());
}

#[test]
fn config_round_trips_through_json_with_defaults() {
    let config: PilotConfig =
        serde_json::from_str(r#"{ "chart_url": "https://charts.example/c/" }"#).expect("minimal json");
    assert_eq!(config, PilotConfig::new("https://charts.example/c/"));

    let json = serde_json::to_string(&config.clone().with_headless(false)).expect("serialize");
    let back: PilotConfig = serde_json::from_str(&json).expect("deserialize");
    assert!(!back.headless);
}

#[test]
fn partial_timings_block_keeps_remaining_defaults() {
    let config: PilotConfig = serde_json::from_str(
        r#"{ "chart_url": "https://charts.example/c/", "timings": { "action_retries": 4 } }"#,
    )
    .expect("partial timings");

    assert_eq!(config.timings.action_retries, 4);
    assert_eq!(
        config.timings,
        Timings {
            action_retries: 4,
            ..Timings::default()
        }
    );
    config.validate().expect("partial timings validate");
}

#[test]
fn profile_survives_json_and_validates() {
    let profile = UiProfile::en_ja();
    profile.validate().expect("built-in profile");

    let json = serde_json::to_string(&profile).expect("serialize profile");
    let back = UiProfile::from_json_str(&json).expect("parse profile");
    assert_eq!(back, profile);
}

#[test]
fn profile_without_plot_surface_is_rejected() {
    let mut profile = UiProfile::en_ja();
    profile.plot_surface = SelectorStrategy::new("plot_surface", Vec::<String>::new());
    let err = profile.validate().expect_err("empty strategy");
    assert!(matches!(err, PilotError::InvalidConfig(ref msg) if msg.contains("plot_surface")));

    let json = serde_json::to_string(&profile).expect("serialize");
    assert!(UiProfile::from_json_str(&json).is_err());
    assert!(UiProfile::from_json_str("not json").is_err());
}

#[test]
fn label_aliases_and_timeframe_hotkeys() {
    let profile = UiProfile::en_ja();
    assert_eq!(profile.label_candidates("Length"), ["Length", "期間"]);
    assert_eq!(profile.label_candidates("Multiplier"), ["Multiplier"]);
    assert_eq!(profile.timeframe_hotkey("4h"), "240");
    assert_eq!(profile.timeframe_hotkey("3w"), "60");
}

#[test]
fn popup_labels_rank_and_avoid() {
    let popup = UiProfile::en_ja().popup;
    assert_eq!(popup.preference_rank("Don't need"), Some(0));
    assert_eq!(popup.preference_rank("  NO THANKS "), Some(2));
    assert_eq!(popup.preference_rank("Show my options"), None);
    assert_eq!(popup.preference_rank("Upgrade now"), None);
    assert_eq!(popup.preference_rank("Continue"), None);
    assert_eq!(popup.preference_rank(""), None);

    assert!(popup.is_promotional_url("https://www.tradingview.com/pricing/?source=x"));
    assert!(!popup.is_promotional_url("https://www.tradingview.com/chart/abc"));
}

#[test]
fn templates_render_and_escape_quotes() {
    let template = StrategyTemplate::new("row", ["div:has-text('{}')", "li[title='{}']"]);
    let rendered = template.render("Williams %R");
    assert_eq!(rendered.name, "row[Williams %R]");
    assert_eq!(
        rendered.candidates,
        ["div:has-text('Williams %R')", "li[title='Williams %R']"]
    );

    let quoted = template.render("Bull's Eye");
    assert_eq!(quoted.candidates[0], "div:has-text('Bull\\'s Eye')");
}

#[test]
fn strategies_chain_in_priority_order() {
    let primary = SelectorStrategy::new("a", ["#one"]);
    let chained = primary.chain(&SelectorStrategy::new("b", ["#two", "#three"]));
    assert_eq!(chained.name, "a");
    assert_eq!(chained.iter().collect::<Vec<_>>(), ["#one", "#two", "#three"]);
}

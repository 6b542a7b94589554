mod support;

use std::time::Duration;

use chart_pilot::api::{
    InterstitialSuppressor, OverlaySuppression, SuppressionMode, Tactic, Timings, UiProfile,
};
use chart_pilot::core::Rect;
use chart_pilot::driver::{SimElement, SimEvent, SimPage};
use tokio::time::Instant;

use support::{CHART_URL, DIALOG, DIALOG_BUTTON, button, chart_page, fast_timings};

fn popup_dialog() -> SimElement {
    SimElement::new(DIALOG, Rect::new(500.0, 200.0, 600.0, 400.0))
}

fn suppressor<'p>(
    page: &'p SimPage,
    profile: &'p UiProfile,
    timings: &Timings,
    mode: OverlaySuppression,
) -> InterstitialSuppressor<'p, SimPage> {
    InterstitialSuppressor::new(page, &profile.popup, &profile.plot_surface, timings, mode)
}

#[tokio::test(start_paused = true)]
async fn clean_page_needs_no_race() {
    let page = chart_page();
    let profile = UiProfile::en_ja();
    let report = suppressor(&page, &profile, &fast_timings(), OverlaySuppression::Full)
        .suppress(SuppressionMode::Full)
        .await;

    assert!(!report.skipped);
    assert_eq!(report.dialogs_seen, 0);
    assert!(!report.dismissed);
    assert!(report.healthy);
    assert!(page.keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn preferred_button_dismisses_dialog() {
    let page = chart_page()
        .with_element(popup_dialog())
        .with_element(button(DIALOG_BUTTON, "No thanks"));
    page.on_click(DIALOG_BUTTON, |dom| {
        dom.remove(DIALOG);
        dom.remove(DIALOG_BUTTON);
    });
    let profile = UiProfile::en_ja();

    let report = suppressor(&page, &profile, &fast_timings(), OverlaySuppression::Full)
        .suppress(SuppressionMode::Full)
        .await;

    assert!(report.dismissed);
    assert_eq!(report.winner, Some(Tactic::PreferredButton));
    assert_eq!(report.dialogs_seen, 1);
    assert!(!report.budget_expired);
    assert_eq!(page.with_dom(|dom| dom.count(DIALOG)), 0);
}

#[tokio::test(start_paused = true)]
async fn avoided_label_is_never_clicked_and_cancel_keys_win() {
    let page = chart_page()
        .with_element(popup_dialog())
        .with_element(button(DIALOG_BUTTON, "Show my options"));
    page.on_key("Escape", |dom| {
        dom.remove(DIALOG);
        dom.remove(DIALOG_BUTTON);
    });
    let profile = UiProfile::en_ja();

    let report = suppressor(&page, &profile, &fast_timings(), OverlaySuppression::Full)
        .suppress(SuppressionMode::Full)
        .await;

    assert!(report.dismissed);
    assert_eq!(report.winner, Some(Tactic::CancelKeys));
    assert!(page.clicked().is_empty());
    assert_eq!(page.keys(), ["Escape", "Escape", "Escape"]);
}

#[tokio::test(start_paused = true)]
async fn gentle_mode_never_sends_cancel_keys() {
    let page = chart_page().with_element(popup_dialog());
    let profile = UiProfile::en_ja();

    let report = suppressor(&page, &profile, &fast_timings(), OverlaySuppression::Full)
        .suppress(SuppressionMode::Gentle)
        .await;

    assert!(!report.dismissed);
    assert_eq!(report.winner, None);
    assert!(page.keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_page_returns_within_budget() {
    let page = SimPage::default()
        .with_latency(Duration::from_millis(300))
        .with_element(popup_dialog())
        .with_element(button(DIALOG_BUTTON, "Later"));
    let profile = UiProfile::en_ja();
    let timings = fast_timings();

    let started = Instant::now();
    let report = suppressor(&page, &profile, &timings, OverlaySuppression::Full)
        .suppress(SuppressionMode::Full)
        .await;
    let elapsed = started.elapsed();

    assert!(report.budget_expired);
    assert!(!report.dismissed);
    assert!(report.cancelled_tactics > 0);
    assert!(
        elapsed <= timings.suppress_budget(),
        "took {elapsed:?}, budget {:?}",
        timings.suppress_budget()
    );
    assert!(!report.navigated_back);
    assert!(!report.healthy);
}

#[tokio::test(start_paused = true)]
async fn promotional_navigation_is_undone() {
    let page = chart_page()
        .with_element(popup_dialog())
        .with_element(button(DIALOG_BUTTON, "Close"));
    page.with_dom(|dom| dom.set_url(CHART_URL));
    page.on_click(DIALOG_BUTTON, |dom| {
        dom.remove(DIALOG);
        dom.remove(DIALOG_BUTTON);
        dom.set_url("https://charts.example/pricing/?utm=popup");
    });
    let profile = UiProfile::en_ja();

    let report = suppressor(&page, &profile, &fast_timings(), OverlaySuppression::Full)
        .suppress(SuppressionMode::Full)
        .await;

    assert!(report.dismissed);
    assert!(report.navigated_back);
    assert_eq!(page.with_dom(|dom| dom.url().to_owned()), CHART_URL);
    assert!(page.journal().contains(&SimEvent::GoBack));
}

#[tokio::test(start_paused = true)]
async fn disabled_and_ambient_only_skip_reactive_passes() {
    let profile = UiProfile::en_ja();
    for mode in [OverlaySuppression::Disabled, OverlaySuppression::AmbientOnly] {
        let page = chart_page().with_element(popup_dialog());
        let report = suppressor(&page, &profile, &fast_timings(), mode)
            .suppress(SuppressionMode::Full)
            .await;
        assert!(report.skipped);
        assert!(page.journal().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn ambient_install_blocks_fragments_and_adds_observer() {
    let page = chart_page();
    let profile = UiProfile::en_ja();
    let ambient = suppressor(&page, &profile, &fast_timings(), OverlaySuppression::AmbientOnly);
    ambient.install_ambient().await.expect("install");
    ambient.hide_dialogs().await.expect("hide");

    page.with_dom(|dom| {
        assert_eq!(dom.blocked_fragments(), profile.popup.blocked_fragments.as_slice());
        assert_eq!(dom.init_scripts().len(), 1);
        assert_eq!(dom.styles(), [profile.popup.hide_css.clone()]);
    });

    let disabled = chart_page();
    suppressor(&disabled, &profile, &fast_timings(), OverlaySuppression::Disabled)
        .install_ambient()
        .await
        .expect("no-op install");
    assert!(disabled.journal().is_empty());
}

#[test]
fn observer_script_embeds_profile_labels() {
    let page = chart_page();
    let profile = UiProfile::en_ja();
    let script = suppressor(&page, &profile, &fast_timings(), OverlaySuppression::Full)
        .observer_script();

    assert!(!script.contains("__PREFERRED__"));
    assert!(!script.contains("__AVOID__"));
    assert!(!script.contains("__DIALOGS__"));
    assert!(script.contains("\"no thanks\""));
    assert!(script.contains("\"show my options\""));
}

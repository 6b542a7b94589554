mod support;

use chart_pilot::api::{ChartContext, SymbolTier, TimeframeTier, UiProfile};
use chart_pilot::driver::SimEvent;

use support::{chart_page, install_chart_legend, install_symbol_search, test_config};

#[tokio::test(start_paused = true)]
async fn symbol_goes_through_search_input() {
    let page = chart_page();
    install_symbol_search(&page);
    let profile = UiProfile::en_ja();
    let config = test_config();

    let tier = ChartContext::new(&page, &profile, &config)
        .set_symbol("USDJPY")
        .await;

    assert_eq!(tier, Some(SymbolTier::SearchInput));
    assert_eq!(page.fills().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn blind_symbol_typing_needs_the_legend_to_follow() {
    let page = chart_page();
    install_chart_legend(&page);
    let profile = UiProfile::en_ja();
    let config = test_config();

    let tier = ChartContext::new(&page, &profile, &config)
        .set_symbol("EURUSD")
        .await;

    assert_eq!(tier, Some(SymbolTier::DirectTyping));
    assert!(page.journal().contains(&SimEvent::Text("EURUSD".to_owned())));
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_symbol_typing_is_not_reported() {
    let page = chart_page();
    let profile = UiProfile::en_ja();
    let config = test_config();

    let tier = ChartContext::new(&page, &profile, &config)
        .set_symbol("EURUSD")
        .await;

    assert_eq!(tier, None);
    assert!(page.journal().contains(&SimEvent::Text("EURUSD".to_owned())));
}

#[tokio::test(start_paused = true)]
async fn typed_interval_is_confirmed_by_the_legend() {
    let page = chart_page();
    install_chart_legend(&page);
    let profile = UiProfile::en_ja();
    let config = test_config();

    let tier = ChartContext::new(&page, &profile, &config)
        .set_timeframe("4h")
        .await;

    assert_eq!(tier, Some(TimeframeTier::Hotkey));
    assert!(page.journal().contains(&SimEvent::Text("240".to_owned())));
}

#[tokio::test(start_paused = true)]
async fn typed_interval_without_legend_change_fails() {
    let page = chart_page();
    let profile = UiProfile::en_ja();
    let config = test_config();

    let tier = ChartContext::new(&page, &profile, &config)
        .set_timeframe("4h")
        .await;

    assert_eq!(tier, None);
    assert_eq!(page.keys(), ["Enter"]);
}

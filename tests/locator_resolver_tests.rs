mod support;

use std::time::Duration;

use chart_pilot::api::{LocatorResolver, Resolution};
use chart_pilot::core::{Rect, SelectorStrategy};
use chart_pilot::driver::{SimElement, SimPage, WaitState};
use proptest::prelude::*;
use tokio::time::Instant;

use support::fast_timings;

fn element(selector: &str) -> SimElement {
    SimElement::new(selector, Rect::new(0.0, 0.0, 10.0, 10.0))
}

fn strategy(count: usize) -> SelectorStrategy {
    SelectorStrategy::new("target", (0..count).map(|i| format!("#c{i}")))
}

#[tokio::test(start_paused = true)]
async fn first_visible_candidate_wins() {
    let page = SimPage::default()
        .with_element(element("#c1").hidden())
        .with_element(element("#c2").with_text("third"))
        .with_element(element("#c3").with_text("fourth"));
    let resolver = LocatorResolver::new(&page, &fast_timings());

    let resolution = resolver
        .resolve(&strategy(4), Duration::from_secs(1), WaitState::Visible)
        .await;
    assert_eq!(resolution.strategy_index(), Some(2));
    assert_eq!(resolution.handle().map(|h| h.text.as_str()), Some("third"));
}

#[tokio::test(start_paused = true)]
async fn attached_state_accepts_hidden_elements() {
    let page = SimPage::default().with_element(element("#c0").hidden());
    let resolver = LocatorResolver::new(&page, &fast_timings());

    let resolution = resolver
        .resolve(&strategy(1), Duration::from_secs(1), WaitState::Attached)
        .await;
    assert_eq!(resolution.strategy_index(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_is_not_found_within_budget() {
    let page = SimPage::default();
    let resolver = LocatorResolver::new(&page, &fast_timings());
    let budget = Duration::from_millis(250);

    let started = Instant::now();
    let resolution = resolver.resolve(&strategy(5), budget, WaitState::Visible).await;

    assert_eq!(resolution, Resolution::NotFound);
    assert!(started.elapsed() <= budget + Duration::from_millis(20));
}

#[tokio::test(start_paused = true)]
async fn late_element_is_picked_up_by_polling() {
    let page = SimPage::default();
    let resolver = LocatorResolver::new(&page, &fast_timings());
    let target = strategy(1);

    let (resolution, ()) = tokio::join!(
        resolver.resolve(&target, Duration::from_secs(1), WaitState::Visible),
        async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            page.insert(element("#c0"));
        }
    );
    assert_eq!(resolution.strategy_index(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn resolve_all_returns_every_visible_match_of_first_candidate() {
    let page = SimPage::default()
        .with_element(element("#c1").with_text("a"))
        .with_element(element("#c1").hidden())
        .with_element(element("#c1").with_text("b"))
        .with_element(element("#c2").with_text("c"));
    let resolver = LocatorResolver::new(&page, &fast_timings());

    let found = resolver
        .resolve_all(&strategy(3), Duration::from_millis(200))
        .await;
    let texts: Vec<&str> = found.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(texts, ["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn wait_gone_reports_disappearance() {
    let page = SimPage::default().with_element(element("#c0"));
    let resolver = LocatorResolver::new(&page, &fast_timings());
    let target = strategy(1);

    assert!(!resolver.wait_gone(&target, Duration::from_millis(100)).await);

    let (gone, ()) = tokio::join!(
        resolver.wait_gone(&target, Duration::from_millis(500)),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            page.with_dom(|dom| {
                dom.remove("#c0");
            });
        }
    );
    assert!(gone);
}

proptest! {
    #[test]
    fn resolution_picks_lowest_visible_index(visibility in prop::collection::vec(0u8..3, 1..6)) {
        // 0 = absent, 1 = hidden, 2 = visible
        let page = SimPage::default();
        for (i, state) in visibility.iter().enumerate() {
            match state {
                1 => page.insert(element(&format!("#c{i}")).hidden()),
                2 => page.insert(element(&format!("#c{i}"))),
                _ => {}
            }
        }
        let expected = visibility.iter().position(|state| *state == 2);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("runtime");
        let resolution = runtime.block_on(async {
            LocatorResolver::new(&page, &fast_timings())
                .resolve(&strategy(visibility.len()), Duration::from_secs(5), WaitState::Visible)
                .await
        });
        prop_assert_eq!(resolution.strategy_index(), expected);
    }
}

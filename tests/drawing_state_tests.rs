use chart_pilot::error::PilotError;
use chart_pilot::interaction::{DrawingPhase, DrawingState};

fn verifying() -> DrawingState {
    let mut state = DrawingState::default();
    state.begin_tool_selection().expect("select");
    state.tool_selected().expect("selected");
    state.begin_drag().expect("drag");
    state.begin_verification().expect("verify");
    state
}

#[test]
fn happy_path_reaches_done_without_retry() {
    let mut state = verifying();
    assert!(state.can_retry());
    state.finish().expect("finish");

    assert!(state.is_done());
    assert_eq!(state.retries_used(), 0);
}

#[test]
fn single_retry_round_is_allowed() {
    let mut state = verifying();
    state.retry().expect("first retry");
    assert_eq!(state.phase(), DrawingPhase::Retrying);
    state.begin_drag().expect("re-drag");
    state.begin_verification().expect("re-verify");

    assert_eq!(state.retries_used(), 1);
    assert!(!state.can_retry());
    let err = state.retry().expect_err("second retry");
    assert!(matches!(
        err,
        PilotError::InvalidTransition {
            from: "verifying",
            to: "retrying"
        }
    ));
    state.finish().expect("finish after retry");
}

#[test]
fn skipping_phases_is_rejected() {
    let mut state = DrawingState::default();
    assert!(state.begin_drag().is_err());
    assert!(state.finish().is_err());
    assert_eq!(state.phase(), DrawingPhase::Idle);

    state.begin_tool_selection().expect("select");
    assert!(state.begin_verification().is_err());
}

#[test]
fn done_is_terminal() {
    let mut state = verifying();
    state.finish().expect("finish");
    for next in [
        DrawingPhase::Idle,
        DrawingPhase::ToolSelecting,
        DrawingPhase::Dragging,
        DrawingPhase::Retrying,
    ] {
        assert!(state.transition(next).is_err(), "{} accepted", next.name());
    }
}

#[test]
fn zero_retry_budget_never_retries() {
    let mut state = DrawingState::new(0);
    state.begin_tool_selection().expect("select");
    state.tool_selected().expect("selected");
    state.begin_drag().expect("drag");
    state.begin_verification().expect("verify");
    assert!(!state.can_retry());
    assert!(state.retry().is_err());
}

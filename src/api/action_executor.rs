use std::time::Duration;

use smallvec::SmallVec;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, trace};

use crate::api::{
    ActionOutcome, ErrorKind, ExecutorCapabilities, InterstitialSuppressor, LocatorResolver,
    Modality, Resolution, SuppressionMode, Timings,
};
use crate::core::{Point, SelectorStrategy};
use crate::driver::{ElementHandle, MouseButton, Page, PointerPhase, WaitState};
use crate::error::{DriverError, DriverResult, PilotError, PilotResult};

/// What to do with the resolved element.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEffect {
    Click,
    ContextClick,
    Fill(String),
    /// Opens a combo box, then clicks the option resolved from the strategy.
    Select(SelectorStrategy),
    /// Press on the element, move to the point, release.
    Drag(Point),
}

/// One logical UI action with its fallback options.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub target: SelectorStrategy,
    pub effect: ActionEffect,
    pub hotkey: Option<String>,
    pub retries: Option<u32>,
    pub post_condition: Option<SelectorStrategy>,
    pub critical: bool,
    pub wait_state: WaitState,
    /// Allows suppression passes between attempts. Off for actions inside
    /// the engine's own dialogs, where a dismissal tactic would close them.
    pub suppress_between: bool,
}

impl ActionRequest {
    #[must_use]
    pub fn new(target: SelectorStrategy, effect: ActionEffect) -> Self {
        Self {
            target,
            effect,
            hotkey: None,
            retries: None,
            post_condition: None,
            critical: false,
            wait_state: WaitState::Visible,
            suppress_between: true,
        }
    }

    #[must_use]
    pub fn click(target: SelectorStrategy) -> Self {
        Self::new(target, ActionEffect::Click)
    }

    #[must_use]
    pub fn context_click(target: SelectorStrategy) -> Self {
        Self::new(target, ActionEffect::ContextClick)
    }

    #[must_use]
    pub fn fill(target: SelectorStrategy, value: impl Into<String>) -> Self {
        Self::new(target, ActionEffect::Fill(value.into()))
    }

    #[must_use]
    pub fn select(target: SelectorStrategy, option: SelectorStrategy) -> Self {
        Self::new(target, ActionEffect::Select(option))
    }

    #[must_use]
    pub fn drag(target: SelectorStrategy, to: Point) -> Self {
        Self::new(target, ActionEffect::Drag(to))
    }

    #[must_use]
    pub fn with_hotkey(mut self, hotkey: impl Into<String>) -> Self {
        self.hotkey = Some(hotkey.into());
        self
    }

    /// Overrides the configured retry count.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    #[must_use]
    pub fn with_post_condition(mut self, post_condition: SelectorStrategy) -> Self {
        self.post_condition = Some(post_condition);
        self
    }

    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    #[must_use]
    pub fn attached(mut self) -> Self {
        self.wait_state = WaitState::Attached;
        self
    }

    #[must_use]
    pub fn in_dialog(mut self) -> Self {
        self.suppress_between = false;
        self
    }
}

impl Modality {
    /// Performs `effect` through this modality.
    ///
    /// Pointer and synthetic attempts need a resolved `element`; the hotkey
    /// attempt ignores it and needs `hotkey`.
    pub async fn apply<P: Page>(
        self,
        page: &P,
        element: Option<&ElementHandle>,
        effect: &ActionEffect,
        hotkey: Option<&str>,
        drag_steps: u32,
    ) -> DriverResult<()> {
        if self == Self::Hotkey {
            let key = hotkey.ok_or(DriverError::Unsupported {
                operation: "hotkey without key",
            })?;
            page.press_key(key).await?;
            if let ActionEffect::Fill(value) = effect {
                page.type_text(value).await?;
            }
            return Ok(());
        }

        let element = element.ok_or(DriverError::Unsupported {
            operation: "element action without element",
        })?;
        match (self, effect) {
            (Self::Pointer, ActionEffect::Click | ActionEffect::Select(_)) => {
                page.click(element, MouseButton::Left).await
            }
            (Self::Pointer, ActionEffect::ContextClick) => {
                page.click(element, MouseButton::Right).await
            }
            (Self::Pointer, ActionEffect::Fill(value)) => {
                page.click(element, MouseButton::Left).await?;
                page.fill(element, value).await
            }
            (Self::Pointer, ActionEffect::Drag(to)) => {
                let from = element_center(element)?;
                page.mouse_move(from, 1).await?;
                page.mouse_down().await?;
                page.mouse_move(*to, drag_steps).await?;
                page.mouse_up().await
            }
            (Self::SyntheticEvent, ActionEffect::Click | ActionEffect::Select(_)) => {
                page.dispatch_click(element).await
            }
            (Self::SyntheticEvent, ActionEffect::ContextClick) => Err(DriverError::Unsupported {
                operation: "synthetic context click",
            }),
            (Self::SyntheticEvent, ActionEffect::Fill(value)) => page.fill(element, value).await,
            (Self::SyntheticEvent, ActionEffect::Drag(to)) => {
                let from = element_center(element)?;
                page.dispatch_pointer(PointerPhase::Down, from).await?;
                page.dispatch_pointer(PointerPhase::Move, *to).await?;
                page.dispatch_pointer(PointerPhase::Up, *to).await
            }
            (Self::Hotkey, _) => Ok(()),
        }
    }
}

fn element_center(element: &ElementHandle) -> DriverResult<Point> {
    element.center().ok_or_else(|| DriverError::NotInteractable {
        selector: element.selector.clone(),
        reason: "element has no layout box".to_owned(),
    })
}

/// Runs [`ActionRequest`]s through the pointer → synthetic → hotkey ladder.
pub struct ActionExecutor<'p, P: Page> {
    page: &'p P,
    resolver: LocatorResolver<'p, P>,
    timings: Timings,
    capabilities: ExecutorCapabilities,
    suppressor: Option<&'p InterstitialSuppressor<'p, P>>,
}

impl<'p, P: Page> ActionExecutor<'p, P> {
    #[must_use]
    pub fn new(page: &'p P, timings: &Timings, capabilities: ExecutorCapabilities) -> Self {
        Self {
            page,
            resolver: LocatorResolver::new(page, timings),
            timings: *timings,
            capabilities,
            suppressor: None,
        }
    }

    /// Enables brief suppression passes between attempts.
    #[must_use]
    pub fn with_suppressor(mut self, suppressor: &'p InterstitialSuppressor<'p, P>) -> Self {
        self.suppressor = Some(suppressor);
        self
    }

    #[must_use]
    pub fn resolver(&self) -> LocatorResolver<'p, P> {
        self.resolver
    }

    fn ladder(&self, request: &ActionRequest) -> SmallVec<[Modality; 3]> {
        let mut ladder = SmallVec::new();
        ladder.push(Modality::Pointer);
        if self.capabilities.use_synthetic_events
            && !matches!(request.effect, ActionEffect::ContextClick)
        {
            ladder.push(Modality::SyntheticEvent);
        }
        if self.hotkey_usable(request) {
            ladder.push(Modality::Hotkey);
        }
        ladder
    }

    fn hotkey_usable(&self, request: &ActionRequest) -> bool {
        self.capabilities.hotkey_fallback
            && request.hotkey.is_some()
            && matches!(request.effect, ActionEffect::Click | ActionEffect::Fill(_))
    }

    fn resolve_budget(&self, strategy: &SelectorStrategy) -> Duration {
        let count = u32::try_from(strategy.len().max(1)).unwrap_or(u32::MAX);
        self.timings.per_strategy_timeout().saturating_mul(count)
    }

    /// Performs the request. Never fails: exhaustion is reported in the
    /// returned [`ActionOutcome`].
    ///
    /// The whole ladder, resolution and post-condition waits included, is
    /// bounded by one attempt timeout per allowed attempt.
    pub async fn perform(&self, request: &ActionRequest) -> ActionOutcome {
        let total = request.retries.unwrap_or(self.timings.action_retries) + 1;
        let bound = self.timings.action_attempt_timeout().saturating_mul(total);
        let deadline = Instant::now() + bound;
        let mut progress = Progress::default();

        let finished = timeout_at(deadline, self.run_ladder(request, total, &mut progress)).await;
        match finished {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(
                    action = %request.target.name,
                    attempts = progress.attempts,
                    "action ran out of time"
                );
                progress.failure(&request.target.name)
            }
        }
    }

    async fn run_ladder(
        &self,
        request: &ActionRequest,
        total: u32,
        progress: &mut Progress,
    ) -> ActionOutcome {
        let ladder = self.ladder(request);
        let target = request.target.name.as_str();

        for attempt in 0..total {
            let rung = usize::try_from(attempt).unwrap_or(usize::MAX);
            let modality = ladder[rung.min(ladder.len() - 1)];

            if attempt > 0 {
                self.between_attempts(request).await;
            }
            progress.attempts = attempt + 1;

            let element = if modality == Modality::Hotkey {
                None
            } else {
                let resolution = self
                    .resolver
                    .resolve(
                        &request.target,
                        self.resolve_budget(&request.target),
                        request.wait_state,
                    )
                    .await;
                match resolution {
                    Resolution::Found {
                        handle,
                        strategy_index,
                    } => {
                        progress.strategy_index = Some(strategy_index);
                        Some(handle)
                    }
                    Resolution::NotFound => {
                        debug!(action = target, attempt, "target unresolved");
                        return self.hotkey_only(request, progress).await;
                    }
                }
            };

            progress.modality = modality;
            match self.attempt(request, modality, element.as_ref(), progress).await {
                AttemptResult::Done => {
                    debug!(action = target, attempt, ?modality, "action succeeded");
                    return ActionOutcome::success(
                        target,
                        progress.strategy_index,
                        modality,
                        attempt + 1,
                    );
                }
                AttemptResult::PostConditionMissing => {
                    debug!(action = target, attempt, ?modality, "post-condition not observed");
                }
                AttemptResult::Failed(reason) => {
                    debug!(action = target, attempt, ?modality, %reason, "action attempt failed");
                    progress.error = ErrorKind::ActionExhausted;
                }
            }
        }

        progress.failure(target)
    }

    /// Like [`Self::perform`], but a failed `critical` request aborts the run.
    pub async fn perform_critical(&self, request: &ActionRequest) -> PilotResult<ActionOutcome> {
        let outcome = self.perform(request).await;
        if request.critical && !outcome.succeeded {
            return Err(PilotError::CriticalActionFailed {
                target: outcome.target.clone(),
                reason: format!("{:?} after {} attempt(s)", outcome.error, outcome.attempts),
            });
        }
        Ok(outcome)
    }

    /// Last resort once the target stops resolving. A target that resolved
    /// on an earlier attempt and then vanished counts as exhausted, not
    /// missing.
    async fn hotkey_only(&self, request: &ActionRequest, progress: &mut Progress) -> ActionOutcome {
        let target = request.target.name.as_str();
        let unresolved = if progress.strategy_index.is_some() {
            ErrorKind::ActionExhausted
        } else {
            ErrorKind::NotFound
        };
        progress.error = unresolved;
        if !self.hotkey_usable(request) {
            return progress.failure(target);
        }

        progress.attempts += 1;
        progress.modality = Modality::Hotkey;
        match self.attempt(request, Modality::Hotkey, None, progress).await {
            AttemptResult::Done => {
                debug!(action = target, "action reached through hotkey");
                ActionOutcome::success(
                    target,
                    progress.strategy_index,
                    Modality::Hotkey,
                    progress.attempts,
                )
            }
            AttemptResult::PostConditionMissing => progress.failure(target),
            AttemptResult::Failed(_) => {
                progress.error = unresolved;
                progress.failure(target)
            }
        }
    }

    async fn between_attempts(&self, request: &ActionRequest) {
        if !(self.capabilities.suppress_between_attempts && request.suppress_between) {
            return;
        }
        if let Some(suppressor) = self.suppressor {
            let report = suppressor.suppress(SuppressionMode::Gentle).await;
            trace!(dismissed = report.dismissed, "between-attempt suppression");
        }
    }

    async fn attempt(
        &self,
        request: &ActionRequest,
        modality: Modality,
        element: Option<&ElementHandle>,
        progress: &mut Progress,
    ) -> AttemptResult {
        let attempt_timeout = self.timings.action_attempt_timeout();
        let applied = timeout(attempt_timeout, async {
            modality
                .apply(
                    self.page,
                    element,
                    &request.effect,
                    request.hotkey.as_deref(),
                    self.timings.drag_steps,
                )
                .await?;
            if let ActionEffect::Select(option) = &request.effect {
                self.pick_option(option, modality).await?;
            }
            Ok::<(), DriverError>(())
        })
        .await;

        match applied {
            Err(_) => {
                return AttemptResult::Failed(format!("timed out after {attempt_timeout:?}"));
            }
            Ok(Err(err)) => return AttemptResult::Failed(err.to_string()),
            Ok(Ok(())) => {}
        }

        let Some(post) = &request.post_condition else {
            return AttemptResult::Done;
        };
        progress.error = ErrorKind::PostConditionFailed;
        let observed = self
            .resolver
            .resolve(post, attempt_timeout, WaitState::Visible)
            .await;
        if observed.handle().is_some() {
            AttemptResult::Done
        } else {
            AttemptResult::PostConditionMissing
        }
    }

    async fn pick_option(&self, option: &SelectorStrategy, modality: Modality) -> DriverResult<()> {
        let found = self
            .resolver
            .resolve(option, self.resolve_budget(option), WaitState::Visible)
            .await
            .into_handle()
            .ok_or_else(|| DriverError::NotInteractable {
                selector: option.name.clone(),
                reason: "option not listed".to_owned(),
            })?;
        sleep(Duration::from_millis(self.timings.poll_interval_ms)).await;
        modality
            .apply(self.page, Some(&found), &ActionEffect::Click, None, 1)
            .await
    }
}

/// How far [`ActionExecutor::perform`] got, kept outside the attempt future
/// so a timed-out ladder can still report it.
struct Progress {
    strategy_index: Option<usize>,
    modality: Modality,
    attempts: u32,
    error: ErrorKind,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            strategy_index: None,
            modality: Modality::Pointer,
            attempts: 0,
            error: ErrorKind::ActionExhausted,
        }
    }
}

impl Progress {
    fn failure(&self, target: &str) -> ActionOutcome {
        ActionOutcome::failure(target, self.error, self.strategy_index, self.modality, self.attempts)
    }
}

enum AttemptResult {
    Done,
    PostConditionMissing,
    Failed(String),
}

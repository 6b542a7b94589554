use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{LabelHit, Point, Rect, Viewport};
use crate::driver::{ElementHandle, MouseButton, Page, PointerPhase};
use crate::error::{DriverError, DriverResult};

type DomReaction = Arc<dyn Fn(&mut SimDom) + Send + Sync>;
type FillReaction = Arc<dyn Fn(&mut SimDom, &str) + Send + Sync>;
type DragReaction = Arc<dyn Fn(&mut SimDom, Point, Point) + Send + Sync>;

// Minimal PNG signature so written files are recognisable as images.
const PLACEHOLDER_PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

/// One element of the simulated document.
///
/// Elements are matched by exact selector text: a query for `s` returns every
/// element whose `selector` equals `s`, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct SimElement {
    pub selector: String,
    pub text: String,
    pub bounds: Rect,
    pub visible: bool,
    /// Pointer clicks land on an overlay instead.
    pub intercepted: bool,
    /// Ignores synthetic dispatch as well as pointer input.
    pub inert: bool,
    pub value: String,
}

impl SimElement {
    #[must_use]
    pub fn new(selector: impl Into<String>, bounds: Rect) -> Self {
        Self {
            selector: selector.into(),
            text: String::new(),
            bounds,
            visible: true,
            intercepted: false,
            inert: false,
            value: String::new(),
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    #[must_use]
    pub fn intercepted(mut self) -> Self {
        self.intercepted = true;
        self
    }

    #[must_use]
    pub fn inert(mut self) -> Self {
        self.intercepted = true;
        self.inert = true;
        self
    }
}

/// Mutable document state handed to reactions.
#[derive(Debug, Clone, Default)]
pub struct SimDom {
    elements: Vec<SimElement>,
    labels: Vec<LabelHit>,
    url: String,
    history: Vec<String>,
    styles: Vec<String>,
    init_scripts: Vec<String>,
    blocked: Vec<String>,
}

impl SimDom {
    pub fn insert(&mut self, element: SimElement) {
        self.elements.push(element);
    }

    /// Removes every element with `selector`; returns how many were removed.
    pub fn remove(&mut self, selector: &str) -> usize {
        let before = self.elements.len();
        self.elements.retain(|e| e.selector != selector);
        before - self.elements.len()
    }

    /// Removes the first element with `selector`.
    pub fn remove_first(&mut self, selector: &str) -> bool {
        match self.elements.iter().position(|e| e.selector == selector) {
            Some(index) => {
                self.elements.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn count(&self, selector: &str) -> usize {
        self.elements
            .iter()
            .filter(|e| e.selector == selector)
            .count()
    }

    #[must_use]
    pub fn contains(&self, selector: &str) -> bool {
        self.count(selector) > 0
    }

    /// Value of the first element with `selector`.
    #[must_use]
    pub fn value_of(&self, selector: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|e| e.selector == selector)
            .map(|e| e.value.as_str())
    }

    pub fn set_value(&mut self, selector: &str, value: impl Into<String>) {
        if let Some(element) = self.elements.iter_mut().find(|e| e.selector == selector) {
            element.value = value.into();
        }
    }

    pub fn add_label(&mut self, hit: LabelHit) {
        self.labels.push(hit);
    }

    pub fn clear_labels(&mut self) {
        self.labels.clear();
    }

    /// Navigates, keeping the previous URL in history.
    pub fn set_url(&mut self, url: impl Into<String>) {
        let previous = std::mem::replace(&mut self.url, url.into());
        if !previous.is_empty() {
            self.history.push(previous);
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn styles(&self) -> &[String] {
        &self.styles
    }

    #[must_use]
    pub fn init_scripts(&self) -> &[String] {
        &self.init_scripts
    }

    #[must_use]
    pub fn blocked_fragments(&self) -> &[String] {
        &self.blocked
    }

    fn nth(&self, selector: &str, index: usize) -> Option<&SimElement> {
        self.elements
            .iter()
            .filter(|e| e.selector == selector)
            .nth(index)
    }

    fn nth_mut(&mut self, selector: &str, index: usize) -> Option<&mut SimElement> {
        self.elements
            .iter_mut()
            .filter(|e| e.selector == selector)
            .nth(index)
    }
}

/// Everything the simulated page was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Goto(String),
    GoBack,
    Click { selector: String, button: MouseButton },
    DispatchClick { selector: String },
    Hover { selector: String },
    Fill { selector: String, value: String },
    Key(String),
    Text(String),
    MouseMove { to: Point, steps: u32 },
    MouseDown(Point),
    MouseUp(Point),
    Pointer { phase: PointerPhase, at: Point },
    BlockRequests(Vec<String>),
    InitScript,
    Style(String),
    Screenshot(PathBuf),
}

#[derive(Default)]
struct SimState {
    dom: SimDom,
    journal: Vec<SimEvent>,
    click_reactions: HashMap<(String, MouseButton), Vec<DomReaction>>,
    key_reactions: HashMap<String, Vec<DomReaction>>,
    fill_reactions: HashMap<String, Vec<FillReaction>>,
    drag_reactions: Vec<DragReaction>,
    text_reactions: Vec<FillReaction>,
    rejected_keys: HashSet<String>,
    mouse_rejected: bool,
    pointer: Point,
    pressed_at: Option<Point>,
}

impl SimState {
    fn run_click(&mut self, selector: &str, button: MouseButton) {
        let key = (selector.to_owned(), button);
        if let Some(reactions) = self.click_reactions.get(&key) {
            for reaction in reactions {
                reaction(&mut self.dom);
            }
        }
    }

    fn run_drag(&mut self, from: Point, to: Point) {
        for reaction in &self.drag_reactions {
            reaction(&mut self.dom, from, to);
        }
    }
}

/// Deterministic in-memory page used by tests and dry runs.
///
/// Reactions registered with [`SimPage::on_click`], [`SimPage::on_key`],
/// [`SimPage::on_fill`], [`SimPage::on_text`] and [`SimPage::on_drag`]
/// script how the document responds to input. The lock is never held across a suspension point.
pub struct SimPage {
    state: Mutex<SimState>,
    viewport: Viewport,
    latency: Duration,
    synthetic_pointer: bool,
}

impl fmt::Debug for SimPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SimPage")
            .field("viewport", &self.viewport)
            .field("latency", &self.latency)
            .field("synthetic_pointer", &self.synthetic_pointer)
            .field("elements", &state.dom.elements.len())
            .field("events", &state.journal.len())
            .finish()
    }
}

impl Default for SimPage {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

impl SimPage {
    #[must_use]
    pub fn new(viewport: Viewport) -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            viewport,
            latency: Duration::ZERO,
            synthetic_pointer: true,
        }
    }

    /// Every operation sleeps for `latency` before taking effect.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes [`Page::dispatch_pointer`] report `Unsupported`.
    #[must_use]
    pub fn without_synthetic_pointer(mut self) -> Self {
        self.synthetic_pointer = false;
        self
    }

    #[must_use]
    pub fn with_element(self, element: SimElement) -> Self {
        self.insert(element);
        self
    }

    pub fn insert(&self, element: SimElement) {
        self.lock().dom.insert(element);
    }

    /// Direct access to the document, e.g. to seed labels or inspect values.
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut SimDom) -> R) -> R {
        f(&mut self.lock().dom)
    }

    pub fn on_click(&self, selector: &str, reaction: impl Fn(&mut SimDom) + Send + Sync + 'static) {
        self.add_click_reaction(selector, MouseButton::Left, Arc::new(reaction));
    }

    pub fn on_right_click(
        &self,
        selector: &str,
        reaction: impl Fn(&mut SimDom) + Send + Sync + 'static,
    ) {
        self.add_click_reaction(selector, MouseButton::Right, Arc::new(reaction));
    }

    pub fn on_key(&self, key: &str, reaction: impl Fn(&mut SimDom) + Send + Sync + 'static) {
        self.lock()
            .key_reactions
            .entry(key.to_owned())
            .or_default()
            .push(Arc::new(reaction));
    }

    pub fn on_fill(
        &self,
        selector: &str,
        reaction: impl Fn(&mut SimDom, &str) + Send + Sync + 'static,
    ) {
        self.lock()
            .fill_reactions
            .entry(selector.to_owned())
            .or_default()
            .push(Arc::new(reaction));
    }

    /// Runs with the text of every [`Page::type_text`] call.
    pub fn on_text(&self, reaction: impl Fn(&mut SimDom, &str) + Send + Sync + 'static) {
        self.lock().text_reactions.push(Arc::new(reaction));
    }

    /// Runs after every completed press-move-release gesture.
    pub fn on_drag(&self, reaction: impl Fn(&mut SimDom, Point, Point) + Send + Sync + 'static) {
        self.lock().drag_reactions.push(Arc::new(reaction));
    }

    /// Makes [`Page::press_key`] fail for `key`.
    pub fn reject_key(&self, key: &str) {
        self.lock().rejected_keys.insert(key.to_owned());
    }

    /// Makes [`Page::mouse_down`] fail.
    pub fn reject_mouse(&self) {
        self.lock().mouse_rejected = true;
    }

    #[must_use]
    pub fn journal(&self) -> Vec<SimEvent> {
        self.lock().journal.clone()
    }

    /// Selectors clicked by pointer or synthetic dispatch, in order.
    #[must_use]
    pub fn clicked(&self) -> Vec<String> {
        self.lock()
            .journal
            .iter()
            .filter_map(|event| match event {
                SimEvent::Click { selector, .. } | SimEvent::DispatchClick { selector } => {
                    Some(selector.clone())
                }
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .journal
            .iter()
            .filter_map(|event| match event {
                SimEvent::Key(key) => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn fills(&self) -> Vec<(String, String)> {
        self.lock()
            .journal
            .iter()
            .filter_map(|event| match event {
                SimEvent::Fill { selector, value } => Some((selector.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.lock()
            .journal
            .iter()
            .filter_map(|event| match event {
                SimEvent::Screenshot(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    fn add_click_reaction(&self, selector: &str, button: MouseButton, reaction: DomReaction) {
        self.lock()
            .click_reactions
            .entry((selector.to_owned(), button))
            .or_default()
            .push(reaction);
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn detached(element: &ElementHandle) -> DriverError {
    DriverError::Detached {
        selector: element.selector.clone(),
    }
}

#[async_trait]
impl Page for SimPage {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        state.dom.set_url(url);
        state.journal.push(SimEvent::Goto(url.to_owned()));
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.pause().await;
        Ok(self.lock().dom.url.clone())
    }

    async fn go_back(&self) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if let Some(previous) = state.dom.history.pop() {
            state.dom.url = previous;
        }
        state.journal.push(SimEvent::GoBack);
        Ok(())
    }

    async fn query_all(&self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        self.pause().await;
        let state = self.lock();
        Ok(state
            .dom
            .elements
            .iter()
            .filter(|e| e.selector == selector)
            .enumerate()
            .map(|(index, e)| ElementHandle {
                selector: e.selector.clone(),
                index,
                text: e.text.clone(),
                bounds: Some(e.bounds),
                visible: e.visible,
            })
            .collect())
    }

    async fn click(&self, element: &ElementHandle, button: MouseButton) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        let target = state
            .dom
            .nth(&element.selector, element.index)
            .ok_or_else(|| detached(element))?;
        if !target.visible {
            return Err(DriverError::NotInteractable {
                selector: element.selector.clone(),
                reason: "element is hidden".to_owned(),
            });
        }
        if target.intercepted {
            return Err(DriverError::Intercepted {
                selector: element.selector.clone(),
            });
        }
        state.journal.push(SimEvent::Click {
            selector: element.selector.clone(),
            button,
        });
        state.run_click(&element.selector, button);
        Ok(())
    }

    async fn dispatch_click(&self, element: &ElementHandle) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        let target = state
            .dom
            .nth(&element.selector, element.index)
            .ok_or_else(|| detached(element))?;
        if target.inert {
            return Err(DriverError::NotInteractable {
                selector: element.selector.clone(),
                reason: "element ignores dispatched events".to_owned(),
            });
        }
        state.journal.push(SimEvent::DispatchClick {
            selector: element.selector.clone(),
        });
        state.run_click(&element.selector, MouseButton::Left);
        Ok(())
    }

    async fn hover(&self, element: &ElementHandle) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if state.dom.nth(&element.selector, element.index).is_none() {
            return Err(detached(element));
        }
        state.journal.push(SimEvent::Hover {
            selector: element.selector.clone(),
        });
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        let target = state
            .dom
            .nth_mut(&element.selector, element.index)
            .ok_or_else(|| detached(element))?;
        if !target.visible || target.inert {
            return Err(DriverError::NotInteractable {
                selector: element.selector.clone(),
                reason: "element does not accept input".to_owned(),
            });
        }
        target.value = value.to_owned();
        state.journal.push(SimEvent::Fill {
            selector: element.selector.clone(),
            value: value.to_owned(),
        });
        let SimState {
            dom,
            fill_reactions,
            ..
        } = &mut *state;
        if let Some(reactions) = fill_reactions.get(&element.selector) {
            for reaction in reactions {
                reaction(dom, value);
            }
        }
        Ok(())
    }

    async fn input_value(&self, element: &ElementHandle) -> DriverResult<String> {
        self.pause().await;
        let state = self.lock();
        state
            .dom
            .nth(&element.selector, element.index)
            .map(|e| e.value.clone())
            .ok_or_else(|| detached(element))
    }

    async fn press_key(&self, key: &str) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if state.rejected_keys.contains(key) {
            return Err(DriverError::Protocol(format!("key {key} was rejected")));
        }
        state.journal.push(SimEvent::Key(key.to_owned()));
        let SimState {
            dom, key_reactions, ..
        } = &mut *state;
        if let Some(reactions) = key_reactions.get(key) {
            for reaction in reactions {
                reaction(dom);
            }
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        state.journal.push(SimEvent::Text(text.to_owned()));
        let SimState {
            dom, text_reactions, ..
        } = &mut *state;
        for reaction in text_reactions.iter() {
            reaction(dom, text);
        }
        Ok(())
    }

    async fn mouse_move(&self, to: Point, steps: u32) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        state.pointer = to;
        state.journal.push(SimEvent::MouseMove { to, steps });
        Ok(())
    }

    async fn mouse_down(&self) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if state.mouse_rejected {
            return Err(DriverError::Protocol("mouse press was rejected".to_owned()));
        }
        let at = state.pointer;
        state.pressed_at = Some(at);
        state.journal.push(SimEvent::MouseDown(at));
        Ok(())
    }

    async fn mouse_up(&self) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        let at = state.pointer;
        state.journal.push(SimEvent::MouseUp(at));
        if let Some(from) = state.pressed_at.take() {
            state.run_drag(from, at);
        }
        Ok(())
    }

    async fn dispatch_pointer(&self, phase: PointerPhase, at: Point) -> DriverResult<()> {
        self.pause().await;
        if !self.synthetic_pointer {
            return Err(DriverError::Unsupported {
                operation: "dispatch_pointer",
            });
        }
        let mut state = self.lock();
        state.journal.push(SimEvent::Pointer { phase, at });
        match phase {
            PointerPhase::Down => state.pressed_at = Some(at),
            PointerPhase::Move => state.pointer = at,
            PointerPhase::Up => {
                if let Some(from) = state.pressed_at.take() {
                    state.run_drag(from, at);
                }
            }
        }
        Ok(())
    }

    async fn block_requests(&self, fragments: &[String]) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        state.dom.blocked.extend(fragments.iter().cloned());
        state
            .journal
            .push(SimEvent::BlockRequests(fragments.to_vec()));
        Ok(())
    }

    async fn add_init_script(&self, script: &str) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        state.dom.init_scripts.push(script.to_owned());
        state.journal.push(SimEvent::InitScript);
        Ok(())
    }

    async fn add_style(&self, css: &str) -> DriverResult<()> {
        self.pause().await;
        let mut state = self.lock();
        state.dom.styles.push(css.to_owned());
        state.journal.push(SimEvent::Style(css.to_owned()));
        Ok(())
    }

    async fn find_text(&self, labels: &[String]) -> DriverResult<Vec<LabelHit>> {
        self.pause().await;
        let state = self.lock();
        Ok(state
            .dom
            .labels
            .iter()
            .filter(|hit| labels.iter().any(|l| hit.text.trim().starts_with(l.as_str())))
            .cloned()
            .collect())
    }

    async fn viewport(&self) -> DriverResult<Viewport> {
        Ok(self.viewport)
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        self.pause().await;
        tokio::fs::write(path, PLACEHOLDER_PNG)
            .await
            .map_err(|e| DriverError::Protocol(format!("writing {}: {e}", path.display())))?;
        self.lock()
            .journal
            .push(SimEvent::Screenshot(path.to_path_buf()));
        Ok(())
    }
}

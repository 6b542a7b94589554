use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton as CdpMouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, ErrorReason};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::{LabelHit, Point, Rect, Viewport};
use crate::driver::{ElementHandle, MouseButton, Page, PointerPhase};
use crate::error::{DriverError, DriverResult};

const QUERY_JS: &str = include_str!("js/query.js");

/// Launch settings for [`CdpPage::launch`].
#[derive(Debug, Clone, PartialEq)]
pub struct CdpLaunchOptions {
    pub headless: bool,
    pub viewport: Viewport,
    /// Session snapshot whose cookies are restored before navigation.
    pub storage_state: Option<PathBuf>,
    pub executable: Option<PathBuf>,
}

impl Default for CdpLaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            storage_state: None,
            executable: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StorageState {
    #[serde(default)]
    cookies: Vec<StoredCookie>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    http_only: bool,
}

#[derive(Debug, Deserialize)]
struct DescribedElement {
    text: String,
    visible: bool,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct PointerState {
    at: Point,
    pressed: bool,
}

/// Chrome DevTools Protocol page backend.
pub struct CdpPage {
    page: chromiumoxide::Page,
    _browser: Browser,
    handler: JoinHandle<()>,
    interceptor: Mutex<Option<JoinHandle<()>>>,
    blocked: Arc<RwLock<Vec<String>>>,
    pointer: Mutex<PointerState>,
    viewport: Viewport,
}

impl std::fmt::Debug for CdpPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpPage")
            .field("viewport", &self.viewport)
            .finish_non_exhaustive()
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(task) = self
            .interceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

fn protocol(err: impl std::fmt::Display) -> DriverError {
    DriverError::Protocol(err.to_string())
}

impl CdpPage {
    /// Launches a browser, opens a blank page and restores the session
    /// snapshot if one is configured.
    pub async fn launch(options: CdpLaunchOptions) -> DriverResult<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.viewport.width, options.viewport.height)
            .viewport(CdpViewport {
                width: options.viewport.width,
                height: options.viewport.height,
                device_scale_factor: Some(1.0),
                ..Default::default()
            })
            .arg("--disable-dev-shm-usage");
        builder = if options.headless {
            builder.with_head().arg("--headless=new")
        } else {
            builder.with_head()
        };
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(DriverError::Navigation)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(protocol)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "browser handler event error");
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(protocol)?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(QUERY_JS))
            .await
            .map_err(protocol)?;

        let cdp = Self {
            page,
            _browser: browser,
            handler,
            interceptor: Mutex::new(None),
            blocked: Arc::new(RwLock::new(Vec::new())),
            pointer: Mutex::new(PointerState::default()),
            viewport: options.viewport,
        };
        if let Some(path) = &options.storage_state {
            cdp.restore_cookies(path).await;
        }
        Ok(cdp)
    }

    async fn restore_cookies(&self, path: &Path) {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "storage state unreadable; continuing without session");
                return;
            }
        };
        let state: StorageState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "storage state malformed; continuing without session");
                return;
            }
        };
        let cookies: Vec<CookieParam> = state
            .cookies
            .into_iter()
            .filter_map(|c| {
                let mut builder = CookieParam::builder()
                    .name(c.name)
                    .value(c.value)
                    .secure(c.secure)
                    .http_only(c.http_only);
                if let Some(domain) = c.domain {
                    builder = builder.domain(domain);
                }
                if let Some(path) = c.path {
                    builder = builder.path(path);
                }
                builder.build().ok()
            })
            .collect();
        let count = cookies.len();
        match self.page.set_cookies(cookies).await {
            Ok(_) => debug!(count, "restored session cookies"),
            Err(err) => warn!(error = %err, "failed to restore session cookies"),
        }
    }

    async fn eval<T: DeserializeOwned>(&self, call: String) -> DriverResult<T> {
        let script = format!("(() => {{ {QUERY_JS}; return window.__chartPilot.{call}; }})()");
        self.page
            .evaluate(script)
            .await
            .map_err(protocol)?
            .into_value::<T>()
            .map_err(protocol)
    }

    fn pointer_state(&self) -> PointerState {
        *self.pointer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_pointer_state(&self, state: PointerState) {
        *self.pointer.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    async fn mouse_event(
        &self,
        kind: DispatchMouseEventType,
        at: Point,
        button: CdpMouseButton,
        pressed: bool,
    ) -> DriverResult<()> {
        let mut builder = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(at.x)
            .y(at.y)
            .button(button);
        if matches!(
            kind,
            DispatchMouseEventType::MousePressed | DispatchMouseEventType::MouseReleased
        ) {
            builder = builder.click_count(1);
        }
        if pressed {
            builder = builder.buttons(1_i64);
        }
        let params = builder.build().map_err(DriverError::Protocol)?;
        self.page.execute(params).await.map_err(protocol)?;
        Ok(())
    }

    async fn ensure_interception(&self) -> DriverResult<()> {
        let running = self
            .interceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if running {
            return Ok(());
        }

        let mut events = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(protocol)?;
        let page = self.page.clone();
        let blocked = Arc::clone(&self.blocked);
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let url = event.request.url.as_str();
                let block = blocked
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .any(|fragment| url.contains(fragment.as_str()));
                let outcome = if block {
                    debug!(url, "aborting promotional request");
                    page.execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                };
                if let Err(err) = outcome {
                    debug!(url, error = %err, "request interception reply failed");
                }
            }
        });

        let pattern = RequestPattern::builder().url_pattern("*").build();
        self.page
            .execute(FetchEnableParams::builder().patterns(vec![pattern]).build())
            .await
            .map_err(protocol)?;
        *self
            .interceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    async fn dispatch_chord(&self, chord: KeyChord) -> DriverResult<()> {
        let mut down = DispatchKeyEventParams::builder()
            .r#type(if chord.text.is_some() {
                DispatchKeyEventType::KeyDown
            } else {
                DispatchKeyEventType::RawKeyDown
            })
            .key(chord.key.clone())
            .code(chord.code.clone())
            .modifiers(chord.modifiers);
        if let Some(text) = &chord.text {
            down = down.text(text.clone());
        }
        if let Some(code) = chord.key_code {
            down = down
                .windows_virtual_key_code(code)
                .native_virtual_key_code(code);
        }
        self.page
            .execute(down.build().map_err(DriverError::Protocol)?)
            .await
            .map_err(protocol)?;

        let mut up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(chord.key)
            .code(chord.code)
            .modifiers(chord.modifiers);
        if let Some(code) = chord.key_code {
            up = up.windows_virtual_key_code(code).native_virtual_key_code(code);
        }
        self.page
            .execute(up.build().map_err(DriverError::Protocol)?)
            .await
            .map_err(protocol)?;
        Ok(())
    }
}

struct KeyChord {
    key: String,
    code: String,
    text: Option<String>,
    key_code: Option<i64>,
    modifiers: i64,
}

// "Control+K" -> modifiers Control, key "k".
fn parse_chord(chord: &str) -> KeyChord {
    let mut modifiers = 0_i64;
    let mut parts: Vec<&str> = chord.split('+').collect();
    let key = parts.pop().unwrap_or_default();
    for part in parts {
        modifiers |= match part {
            "Alt" => 1,
            "Control" | "Ctrl" => 2,
            "Meta" | "Command" => 4,
            "Shift" => 8,
            _ => 0,
        };
    }

    let (key, code, text, key_code) = match key {
        "Escape" => ("Escape".to_owned(), "Escape".to_owned(), None, Some(27)),
        "Enter" => ("Enter".to_owned(), "Enter".to_owned(), Some("\r".to_owned()), Some(13)),
        "Tab" => ("Tab".to_owned(), "Tab".to_owned(), None, Some(9)),
        "Backspace" => ("Backspace".to_owned(), "Backspace".to_owned(), None, Some(8)),
        "Delete" => ("Delete".to_owned(), "Delete".to_owned(), None, Some(46)),
        "Slash" | "/" => ("/".to_owned(), "Slash".to_owned(), Some("/".to_owned()), Some(191)),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => {
                    let upper = c.to_ascii_uppercase();
                    (
                        c.to_ascii_lowercase().to_string(),
                        format!("Key{upper}"),
                        Some(c.to_ascii_lowercase().to_string()),
                        Some(i64::from(u32::from(upper))),
                    )
                }
                (Some(c), None) if c.is_ascii_digit() => (
                    c.to_string(),
                    format!("Digit{c}"),
                    Some(c.to_string()),
                    Some(i64::from(u32::from(c))),
                ),
                _ => (other.to_owned(), other.to_owned(), None, None),
            }
        }
    };

    // Chords with Control/Alt/Meta do not produce text.
    let text = if modifiers & 0b111 != 0 { None } else { text };
    KeyChord {
        key,
        code,
        text,
        key_code,
        modifiers,
    }
}

// One typed character: letters and digits carry their physical key,
// everything else is sent as text only.
fn keystroke(c: char) -> KeyChord {
    let text = Some(c.to_string());
    if c.is_ascii_alphabetic() {
        let upper = c.to_ascii_uppercase();
        return KeyChord {
            key: c.to_string(),
            code: format!("Key{upper}"),
            text,
            key_code: Some(i64::from(u32::from(upper))),
            modifiers: if c.is_ascii_uppercase() { 8 } else { 0 },
        };
    }
    if c.is_ascii_digit() {
        return KeyChord {
            key: c.to_string(),
            code: format!("Digit{c}"),
            text,
            key_code: Some(i64::from(u32::from(c))),
            modifiers: 0,
        };
    }
    KeyChord {
        key: c.to_string(),
        code: String::new(),
        text,
        key_code: None,
        modifiers: 0,
    }
}

fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_owned())
}

#[async_trait]
impl Page for CdpPage {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.page.url().await.map_err(protocol)?.unwrap_or_default())
    }

    async fn go_back(&self) -> DriverResult<()> {
        self.page
            .evaluate("history.back()")
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn query_all(&self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        let described: Vec<DescribedElement> =
            self.eval(format!("describe({})", js_str(selector))).await?;
        Ok(described
            .into_iter()
            .enumerate()
            .map(|(index, d)| ElementHandle {
                selector: selector.to_owned(),
                index,
                text: d.text,
                bounds: Some(Rect::new(d.x, d.y, d.width, d.height)),
                visible: d.visible,
            })
            .collect())
    }

    async fn click(&self, element: &ElementHandle, button: MouseButton) -> DriverResult<()> {
        let verdict: String = self
            .eval(format!(
                "hitTest({}, {})",
                js_str(&element.selector),
                element.index
            ))
            .await?;
        match verdict.as_str() {
            "ok" => {}
            "detached" => {
                return Err(DriverError::Detached {
                    selector: element.selector.clone(),
                });
            }
            "hidden" => {
                return Err(DriverError::NotInteractable {
                    selector: element.selector.clone(),
                    reason: "element is hidden".to_owned(),
                });
            }
            _ => {
                return Err(DriverError::Intercepted {
                    selector: element.selector.clone(),
                });
            }
        }

        // Bounds may have moved after scrolling into view.
        let fresh = self.query_all(&element.selector).await?;
        let center = fresh
            .get(element.index)
            .and_then(ElementHandle::center)
            .ok_or_else(|| DriverError::Detached {
                selector: element.selector.clone(),
            })?;
        let cdp_button = match button {
            MouseButton::Left => CdpMouseButton::Left,
            MouseButton::Right => CdpMouseButton::Right,
        };
        self.mouse_event(DispatchMouseEventType::MouseMoved, center, CdpMouseButton::None, false)
            .await?;
        self.mouse_event(DispatchMouseEventType::MousePressed, center, cdp_button.clone(), true)
            .await?;
        self.mouse_event(DispatchMouseEventType::MouseReleased, center, cdp_button, false)
            .await?;
        self.set_pointer_state(PointerState {
            at: center,
            pressed: false,
        });
        Ok(())
    }

    async fn dispatch_click(&self, element: &ElementHandle) -> DriverResult<()> {
        let clicked: bool = self
            .eval(format!(
                "click({}, {})",
                js_str(&element.selector),
                element.index
            ))
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(DriverError::Detached {
                selector: element.selector.clone(),
            })
        }
    }

    async fn hover(&self, element: &ElementHandle) -> DriverResult<()> {
        let center = element.center().ok_or_else(|| DriverError::NotInteractable {
            selector: element.selector.clone(),
            reason: "element has no layout box".to_owned(),
        })?;
        self.mouse_move(center, 1).await
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> DriverResult<()> {
        let filled: bool = self
            .eval(format!(
                "setValue({}, {}, {})",
                js_str(&element.selector),
                element.index,
                js_str(value)
            ))
            .await?;
        if filled {
            Ok(())
        } else {
            Err(DriverError::Detached {
                selector: element.selector.clone(),
            })
        }
    }

    async fn input_value(&self, element: &ElementHandle) -> DriverResult<String> {
        let value: Option<String> = self
            .eval(format!(
                "readValue({}, {})",
                js_str(&element.selector),
                element.index
            ))
            .await?;
        value.ok_or_else(|| DriverError::Detached {
            selector: element.selector.clone(),
        })
    }

    async fn press_key(&self, key: &str) -> DriverResult<()> {
        self.dispatch_chord(parse_chord(key)).await
    }

    // Real keystrokes so key handlers on the page see the typing.
    async fn type_text(&self, text: &str) -> DriverResult<()> {
        for c in text.chars() {
            self.dispatch_chord(keystroke(c)).await?;
        }
        Ok(())
    }

    async fn mouse_move(&self, to: Point, steps: u32) -> DriverResult<()> {
        let state = self.pointer_state();
        let steps = steps.max(1);
        let button = if state.pressed {
            CdpMouseButton::Left
        } else {
            CdpMouseButton::None
        };
        for step in 1..=steps {
            let at = state.at.lerp(to, f64::from(step) / f64::from(steps));
            self.mouse_event(DispatchMouseEventType::MouseMoved, at, button.clone(), state.pressed)
                .await?;
        }
        self.set_pointer_state(PointerState { at: to, ..state });
        Ok(())
    }

    async fn mouse_down(&self) -> DriverResult<()> {
        let state = self.pointer_state();
        self.mouse_event(DispatchMouseEventType::MousePressed, state.at, CdpMouseButton::Left, true)
            .await?;
        self.set_pointer_state(PointerState {
            pressed: true,
            ..state
        });
        Ok(())
    }

    async fn mouse_up(&self) -> DriverResult<()> {
        let state = self.pointer_state();
        self.mouse_event(
            DispatchMouseEventType::MouseReleased,
            state.at,
            CdpMouseButton::Left,
            false,
        )
        .await?;
        self.set_pointer_state(PointerState {
            pressed: false,
            ..state
        });
        Ok(())
    }

    async fn dispatch_pointer(&self, phase: PointerPhase, at: Point) -> DriverResult<()> {
        let phase_name = match phase {
            PointerPhase::Down => "down",
            PointerPhase::Move => "move",
            PointerPhase::Up => "up",
        };
        let dispatched: bool = self
            .eval(format!("pointer('{phase_name}', {}, {})", at.x, at.y))
            .await?;
        if dispatched {
            Ok(())
        } else {
            Err(DriverError::NotInteractable {
                selector: format!("point({}, {})", at.x, at.y),
                reason: "no element at point".to_owned(),
            })
        }
    }

    async fn block_requests(&self, fragments: &[String]) -> DriverResult<()> {
        self.blocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(fragments.iter().cloned());
        self.ensure_interception().await
    }

    async fn add_init_script(&self, script: &str) -> DriverResult<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn add_style(&self, css: &str) -> DriverResult<()> {
        let _: bool = self.eval(format!("addStyle({})", js_str(css))).await?;
        Ok(())
    }

    async fn find_text(&self, labels: &[String]) -> DriverResult<Vec<LabelHit>> {
        let labels = serde_json::to_string(labels).map_err(protocol)?;
        self.eval(format!("findText({labels})")).await
    }

    async fn viewport(&self) -> DriverResult<Viewport> {
        Ok(self.viewport)
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
                path,
            )
            .await
            .map_err(protocol)?;
        Ok(())
    }
}

//! Android driver: shell-injected input over the wire protocol.
//!
//! Every action becomes one or more `input` shell commands executed
//! through the [`ProtocolEngine`]; screenshots use the engine's
//! binary-safe capture path. The engine sits behind a mutex — the
//! protocol carries one command at a time, so concurrent callers
//! queue here (and at the dispatch layer's per-device lock).

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::action::{ActionData, ActionResult, DeviceAction};
use crate::adb::engine::ProtocolEngine;
use crate::adb::transport::Transport;
use crate::device::{DeviceCapabilities, DevicePlatform, ScreenSize};
use crate::driver::{keymap, DeviceDriver};
use crate::error::DroverError;

/// Hold time for a long press, in milliseconds (`input swipe` with
/// identical endpoints).
const LONG_PRESS_MS: u32 = 500;

/// Gesture time for a scroll rendered as a swipe.
const SCROLL_MS: u32 = 300;

/// Gesture time for a drag rendered as a swipe.
const DRAG_MS: u32 = 800;

// ── AndroidDriver ────────────────────────────────────────────────

/// Maps uniform actions onto `input` shell commands.
pub struct AndroidDriver<T: Transport> {
    device_id: String,
    device_name: String,
    engine: Mutex<ProtocolEngine<T>>,
    screen: std::sync::Mutex<Option<ScreenSize>>,
}

impl<T: Transport> AndroidDriver<T> {
    pub fn new(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        engine: ProtocolEngine<T>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            engine: Mutex::new(engine),
            screen: std::sync::Mutex::new(None),
        }
    }

    async fn shell(&self, cmd: &str) -> Result<String, DroverError> {
        self.engine.lock().await.run_shell(cmd).await
    }

    async fn run(&self, action: DeviceAction) -> Result<Option<ActionData>, DroverError> {
        match action {
            DeviceAction::Tap { x, y } => {
                self.shell(&format!("input tap {x} {y}")).await?;
                Ok(None)
            }
            DeviceAction::DoubleTap { x, y } => {
                self.shell(&format!("input tap {x} {y}")).await?;
                self.shell(&format!("input tap {x} {y}")).await?;
                Ok(None)
            }
            DeviceAction::LongPress { x, y } => {
                self.shell(&format!("input swipe {x} {y} {x} {y} {LONG_PRESS_MS}"))
                    .await?;
                Ok(None)
            }
            DeviceAction::Type { text } => {
                self.shell(&format!("input text {}", shell_text_arg(&text)))
                    .await?;
                Ok(None)
            }
            DeviceAction::Key { key, modifiers } => {
                if !modifiers.is_empty() {
                    return Err(DroverError::NotSupported(
                        "key modifiers are not supported on the android backend".to_string(),
                    ));
                }
                let code = keymap::android_keycode(&key).ok_or(DroverError::UnknownKey {
                    key,
                    backend: "android",
                })?;
                self.shell(&format!("input keyevent {code}")).await?;
                Ok(None)
            }
            DeviceAction::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => {
                let mut cmd = format!("input swipe {x1} {y1} {x2} {y2}");
                if let Some(ms) = duration_ms {
                    cmd.push_str(&format!(" {ms}"));
                }
                self.shell(&cmd).await?;
                Ok(None)
            }
            DeviceAction::Scroll { x, y, dx, dy } => {
                // a scroll is a swipe along the delta
                let (x2, y2) = (x + dx, y + dy);
                self.shell(&format!("input swipe {x} {y} {x2} {y2} {SCROLL_MS}"))
                    .await?;
                Ok(None)
            }
            DeviceAction::Drag { path } => {
                if path.len() < 2 {
                    return Err(DroverError::InvalidPayload(
                        "drag requires at least two path points",
                    ));
                }
                // `input swipe` takes only endpoints; intermediate
                // waypoints are collapsed into one slow gesture
                let (a, b) = (path[0], path[path.len() - 1]);
                self.shell(&format!(
                    "input swipe {} {} {} {} {DRAG_MS}",
                    a.x, a.y, b.x, b.y
                ))
                .await?;
                Ok(None)
            }
            DeviceAction::Screenshot => {
                let png = self.engine.lock().await.screenshot().await?;
                Ok(Some(ActionData::png(png)))
            }
            DeviceAction::GetUiTree => {
                let dump = self.shell("uiautomator dump /dev/tty").await?;
                let xml = extract_hierarchy_xml(&dump).ok_or_else(|| {
                    DroverError::Other(format!(
                        "uiautomator produced no hierarchy (got {} bytes)",
                        dump.len()
                    ))
                })?;
                Ok(Some(ActionData::UiTree { xml }))
            }
        }
    }

    /// Ask the device for its display size, caching the answer.
    async fn probe_screen_size(&self) {
        match self.shell("wm size").await {
            Ok(output) => {
                if let Some(size) = parse_wm_size(&output) {
                    *self.screen.lock().unwrap_or_else(|e| e.into_inner()) = Some(size);
                } else {
                    tracing::debug!(output = %output.trim(), "could not parse wm size output");
                }
            }
            Err(e) => tracing::debug!(error = %e, "screen size probe failed"),
        }
    }
}

#[async_trait]
impl<T: Transport> DeviceDriver for AndroidDriver<T> {
    async fn execute(&self, action: DeviceAction) -> ActionResult {
        self.run(action).await.into()
    }

    async fn capabilities(&self) -> DeviceCapabilities {
        // served from the cached probe; a phone-shaped default keeps
        // the snapshot useful when the probe never ran
        let screen = self
            .screen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(ScreenSize::new(1080, 1920));
        DeviceCapabilities::new(DevicePlatform::Android, &self.device_id, &self.device_name)
            .with_screen_size(screen)
    }

    async fn connect(&self) -> Result<(), DroverError> {
        self.engine.lock().await.connect().await?;
        self.probe_screen_size().await;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DroverError> {
        self.engine.lock().await.close().await
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Quote text for `input text`: spaces become `%s`, everything the
/// shell could interpret is backslash-escaped.
fn shell_text_arg(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            ' ' => out.push_str("%s"),
            c if c.is_alphanumeric() || matches!(c, '.' | ',' | ':' | '/' | '@' | '-' | '_' | '+' | '=') =>
            {
                out.push(c)
            }
            c => {
                out.push('\\');
                out.push(c);
            }
        }
    }
    out
}

/// Pull the XML document out of a `uiautomator dump /dev/tty` dump,
/// which appends a status line after the hierarchy.
fn extract_hierarchy_xml(dump: &str) -> Option<String> {
    let start = dump.find("<?xml")?;
    let end_tag = "</hierarchy>";
    let end = dump.rfind(end_tag)? + end_tag.len();
    (end > start).then(|| dump[start..end].to_string())
}

/// Parse `wm size` output, preferring an override size when present.
fn parse_wm_size(output: &str) -> Option<ScreenSize> {
    let line = output
        .lines()
        .filter(|l| l.contains("size:"))
        .last()?;
    let dims = line.rsplit(':').next()?.trim();
    let (w, h) = dims.split_once('x')?;
    Some(ScreenSize::new(
        w.trim().parse().ok()?,
        h.trim().parse().ok()?,
    ))
}

// ── Tests ────────────────────────────────────────────────────────

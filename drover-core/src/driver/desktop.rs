//! Desktop driver: local input injection.
//!
//! The driver is generic over an [`InputBackend`] so the action
//! mapping can be exercised against a recording fake; the shipped
//! backend is [`NativeInput`], Win32 `SendInput` on Windows and a stub
//! elsewhere.
//!
//! # Platform
//!
//! Native injection is Windows-only. On other platforms every
//! `NativeInput` method reports the backend as unsupported.

use async_trait::async_trait;
use std::time::Duration;

use crate::action::{ActionData, ActionResult, ActionType, DeviceAction, Point};
use crate::device::{DeviceCapabilities, DevicePlatform, ScreenSize};
use crate::driver::{keymap, DeviceDriver};
use crate::error::DroverError;

/// How long a `long_press` holds the button down.
const LONG_PRESS_HOLD: Duration = Duration::from_millis(500);

/// Gap between the two taps of a `double_tap`.
const DOUBLE_TAP_GAP: Duration = Duration::from_millis(60);

/// Waypoints synthesized for a two-point swipe.
const SWIPE_STEPS: i32 = 12;

// ── InputBackend ─────────────────────────────────────────────────

/// Pointer button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

/// Local input-injection primitives.
///
/// The native binding behind these is an external collaborator; this
/// trait is the whole surface the driver relies on.
pub trait InputBackend: Send + Sync {
    fn pointer_move(&self, x: i32, y: i32) -> Result<(), DroverError>;
    fn button_down(&self, button: PointerButton) -> Result<(), DroverError>;
    fn button_up(&self, button: PointerButton) -> Result<(), DroverError>;
    fn key_down(&self, vk: u16) -> Result<(), DroverError>;
    fn key_up(&self, vk: u16) -> Result<(), DroverError>;
    /// Scroll by wheel deltas; positive `dy` scrolls up.
    fn wheel(&self, dx: i32, dy: i32) -> Result<(), DroverError>;
    /// Type a string as character events.
    fn text(&self, text: &str) -> Result<(), DroverError>;
    fn screen_size(&self) -> Result<ScreenSize, DroverError>;

    /// Whether [`capture`](Self::capture) can produce an image.
    fn can_capture(&self) -> bool {
        false
    }

    /// Capture the screen as PNG bytes.
    fn capture(&self) -> Result<Vec<u8>, DroverError> {
        Err(DroverError::NotSupported(
            "screen capture is not available on this backend".to_string(),
        ))
    }
}

// ── DesktopDriver ────────────────────────────────────────────────

/// Maps uniform actions onto local input injection.
pub struct DesktopDriver<B: InputBackend> {
    device_id: String,
    device_name: String,
    backend: B,
}

impl<B: InputBackend> DesktopDriver<B> {
    pub fn new(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        backend: B,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            backend,
        }
    }

    async fn run(&self, action: DeviceAction) -> Result<Option<ActionData>, DroverError> {
        match action {
            DeviceAction::Tap { x, y } => {
                self.tap(x, y)?;
                Ok(None)
            }
            DeviceAction::DoubleTap { x, y } => {
                self.tap(x, y)?;
                tokio::time::sleep(DOUBLE_TAP_GAP).await;
                self.tap(x, y)?;
                Ok(None)
            }
            DeviceAction::LongPress { x, y } => {
                self.backend.pointer_move(x, y)?;
                self.backend.button_down(PointerButton::Left)?;
                tokio::time::sleep(LONG_PRESS_HOLD).await;
                self.backend.button_up(PointerButton::Left)?;
                Ok(None)
            }
            DeviceAction::Type { text } => {
                self.backend.text(&text)?;
                Ok(None)
            }
            DeviceAction::Key { key, modifiers } => {
                let vk = keymap::windows_vk(&key).ok_or(DroverError::UnknownKey {
                    key,
                    backend: "desktop",
                })?;
                let held = keymap::windows_modifier_vks(modifiers);
                for m in &held {
                    self.backend.key_down(*m)?;
                }
                let result = self
                    .backend
                    .key_down(vk)
                    .and_then(|()| self.backend.key_up(vk));
                // release modifiers in reverse order even when the key
                // itself failed, so none are left stuck down
                for m in held.iter().rev() {
                    self.backend.key_up(*m)?;
                }
                result?;
                Ok(None)
            }
            DeviceAction::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms: _,
            } => {
                self.drag_path(&line_path(x1, y1, x2, y2, SWIPE_STEPS))?;
                Ok(None)
            }
            DeviceAction::Scroll { x, y, dx, dy } => {
                self.backend.pointer_move(x, y)?;
                self.backend.wheel(dx, dy)?;
                Ok(None)
            }
            DeviceAction::Drag { path } => {
                if path.len() < 2 {
                    return Err(DroverError::InvalidPayload(
                        "drag requires at least two path points",
                    ));
                }
                self.drag_path(&path)?;
                Ok(None)
            }
            DeviceAction::Screenshot => Ok(Some(ActionData::png(self.backend.capture()?))),
            DeviceAction::GetUiTree => Err(DroverError::NotSupported(
                "get_ui_tree is not available on the desktop backend".to_string(),
            )),
        }
    }

    fn tap(&self, x: i32, y: i32) -> Result<(), DroverError> {
        self.backend.pointer_move(x, y)?;
        self.backend.button_down(PointerButton::Left)?;
        self.backend.button_up(PointerButton::Left)
    }

    fn drag_path(&self, path: &[Point]) -> Result<(), DroverError> {
        let first = path[0];
        let last = path[path.len() - 1];
        self.backend.pointer_move(first.x, first.y)?;
        self.backend.button_down(PointerButton::Left)?;
        for p in &path[1..] {
            self.backend.pointer_move(p.x, p.y)?;
        }
        let result = self.backend.button_up(PointerButton::Left);
        tracing::trace!(
            from = ?(first.x, first.y),
            to = ?(last.x, last.y),
            points = path.len(),
            "drag complete"
        );
        result
    }
}

#[async_trait]
impl<B: InputBackend> DeviceDriver for DesktopDriver<B> {
    async fn execute(&self, action: DeviceAction) -> ActionResult {
        self.run(action).await.into()
    }

    async fn capabilities(&self) -> DeviceCapabilities {
        let screen = self
            .backend
            .screen_size()
            .unwrap_or(ScreenSize::new(1920, 1080));
        let mut caps =
            DeviceCapabilities::new(DevicePlatform::Desktop, &self.device_id, &self.device_name)
                .with_screen_size(screen)
                .without_action(ActionType::GetUiTree);
        if !self.backend.can_capture() {
            caps = caps.without_action(ActionType::Screenshot);
        }
        caps
    }
}

// ── NativeInput ──────────────────────────────────────────────────

/// OS-level input injection.
///
/// On Windows this uses `SendInput`, which requires the process to run
/// in the interactive desktop session.
pub struct NativeInput;

impl NativeInput {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeInput {
    fn default() -> Self {
        Self::new()
    }
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use windows::Win32::UI::Input::KeyboardAndMouse::*;

    const WHEEL_DELTA: i32 = 120;

    fn send(input: INPUT) -> Result<(), DroverError> {
        let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
        if sent == 0 {
            return Err(DroverError::Other("SendInput returned 0".to_string()));
        }
        Ok(())
    }

    fn mouse_input(
        dx: i32,
        dy: i32,
        mouse_data: u32,
        flags: MOUSE_EVENT_FLAGS,
    ) -> INPUT {
        INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    mouseData: mouse_data,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    fn key_input(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(vk),
                    wScan: scan,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    fn button_flag(button: PointerButton, down: bool) -> MOUSE_EVENT_FLAGS {
        match (button, down) {
            (PointerButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
            (PointerButton::Left, false) => MOUSEEVENTF_LEFTUP,
            (PointerButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
            (PointerButton::Right, false) => MOUSEEVENTF_RIGHTUP,
            (PointerButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
            (PointerButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
        }
    }

    impl NativeInput {
        fn metrics() -> Result<(i32, i32), DroverError> {
            let (w, h) = unsafe {
                use windows::Win32::UI::WindowsAndMessaging::*;
                (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN))
            };
            if w == 0 || h == 0 {
                return Err(DroverError::Other("GetSystemMetrics returned 0".to_string()));
            }
            Ok((w, h))
        }
    }

    impl InputBackend for NativeInput {
        fn pointer_move(&self, x: i32, y: i32) -> Result<(), DroverError> {
            // SendInput absolute coordinates span 0..65535.
            let (w, h) = Self::metrics()?;
            let abs_x = (x as i64 * 65535 / w as i64) as i32;
            let abs_y = (y as i64 * 65535 / h as i64) as i32;
            send(mouse_input(
                abs_x,
                abs_y,
                0,
                MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE,
            ))
        }

        fn button_down(&self, button: PointerButton) -> Result<(), DroverError> {
            send(mouse_input(0, 0, 0, button_flag(button, true)))
        }

        fn button_up(&self, button: PointerButton) -> Result<(), DroverError> {
            send(mouse_input(0, 0, 0, button_flag(button, false)))
        }

        fn key_down(&self, vk: u16) -> Result<(), DroverError> {
            send(key_input(vk, 0, KEYBD_EVENT_FLAGS(0)))
        }

        fn key_up(&self, vk: u16) -> Result<(), DroverError> {
            send(key_input(vk, 0, KEYEVENTF_KEYUP))
        }

        fn wheel(&self, dx: i32, dy: i32) -> Result<(), DroverError> {
            if dy != 0 {
                send(mouse_input(
                    0,
                    0,
                    (dy * WHEEL_DELTA) as u32,
                    MOUSEEVENTF_WHEEL,
                ))?;
            }
            if dx != 0 {
                send(mouse_input(
                    0,
                    0,
                    (dx * WHEEL_DELTA) as u32,
                    MOUSEEVENTF_HWHEEL,
                ))?;
            }
            Ok(())
        }

        fn text(&self, text: &str) -> Result<(), DroverError> {
            // Unicode injection: one press/release pair per UTF-16 unit.
            for unit in text.encode_utf16() {
                send(key_input(0, unit, KEYEVENTF_UNICODE))?;
                send(key_input(0, unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP))?;
            }
            Ok(())
        }

        fn screen_size(&self) -> Result<ScreenSize, DroverError> {
            let (w, h) = Self::metrics()?;
            Ok(ScreenSize::new(w as u32, h as u32))
        }
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
mod platform {
    use super::*;

    fn unsupported<T>() -> Result<T, DroverError> {
        Err(DroverError::NotSupported(
            "native input injection is only available on Windows".to_string(),
        ))
    }

    impl InputBackend for NativeInput {
        fn pointer_move(&self, _x: i32, _y: i32) -> Result<(), DroverError> {
            unsupported()
        }
        fn button_down(&self, _button: PointerButton) -> Result<(), DroverError> {
            unsupported()
        }
        fn button_up(&self, _button: PointerButton) -> Result<(), DroverError> {
            unsupported()
        }
        fn key_down(&self, _vk: u16) -> Result<(), DroverError> {
            unsupported()
        }
        fn key_up(&self, _vk: u16) -> Result<(), DroverError> {
            unsupported()
        }
        fn wheel(&self, _dx: i32, _dy: i32) -> Result<(), DroverError> {
            unsupported()
        }
        fn text(&self, _text: &str) -> Result<(), DroverError> {
            unsupported()
        }
        fn screen_size(&self) -> Result<ScreenSize, DroverError> {
            unsupported()
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Evenly spaced waypoints from `(x1, y1)` to `(x2, y2)`, inclusive.
fn line_path(x1: i32, y1: i32, x2: i32, y2: i32, steps: i32) -> Vec<Point> {
    (0..=steps)
        .map(|i| Point {
            x: x1 + (x2 - x1) * i / steps,
            y: y1 + (y2 - y1) * i / steps,
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────

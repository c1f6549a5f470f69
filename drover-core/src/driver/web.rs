//! Web driver: actions against a controlled browser session.
//!
//! The browser automation binding itself is an external collaborator;
//! the driver only speaks to the [`BrowserSession`] trait and turns
//! uniform actions into its primitives. The DOM snapshot doubles as
//! the UI tree.

use async_trait::async_trait;
use std::time::Duration;

use crate::action::{ActionData, ActionResult, DeviceAction, Modifiers, Point};
use crate::device::{DeviceCapabilities, DevicePlatform, ScreenSize};
use crate::driver::{keymap, DeviceDriver};
use crate::error::DroverError;

const LONG_PRESS_HOLD: Duration = Duration::from_millis(500);

// ── BrowserSession ───────────────────────────────────────────────

/// Primitives a controlled browser session must provide.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn click(&self, x: i32, y: i32) -> Result<(), DroverError>;
    async fn mouse_move(&self, x: i32, y: i32) -> Result<(), DroverError>;
    async fn mouse_down(&self, x: i32, y: i32) -> Result<(), DroverError>;
    async fn mouse_up(&self, x: i32, y: i32) -> Result<(), DroverError>;
    /// Type into the focused element.
    async fn type_text(&self, text: &str) -> Result<(), DroverError>;
    /// Press a key given as a DOM `KeyboardEvent.key` value.
    async fn press_key(&self, key: &str, modifiers: Modifiers) -> Result<(), DroverError>;
    async fn scroll_by(&self, x: i32, y: i32, dx: i32, dy: i32) -> Result<(), DroverError>;
    async fn screenshot(&self) -> Result<Vec<u8>, DroverError>;
    /// Serialized DOM of the current page.
    async fn dom_snapshot(&self) -> Result<String, DroverError>;
    async fn viewport(&self) -> Result<ScreenSize, DroverError>;

    /// Tear the session down. Safe to call more than once.
    async fn close(&self) -> Result<(), DroverError> {
        Ok(())
    }
}

// ── WebDriver ────────────────────────────────────────────────────

/// Maps uniform actions onto browser session primitives.
pub struct WebDriver<S: BrowserSession> {
    device_id: String,
    device_name: String,
    session: S,
}

impl<S: BrowserSession> WebDriver<S> {
    pub fn new(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        session: S,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            session,
        }
    }

    async fn run(&self, action: DeviceAction) -> Result<Option<ActionData>, DroverError> {
        match action {
            DeviceAction::Tap { x, y } => {
                self.session.click(x, y).await?;
                Ok(None)
            }
            DeviceAction::DoubleTap { x, y } => {
                self.session.click(x, y).await?;
                self.session.click(x, y).await?;
                Ok(None)
            }
            DeviceAction::LongPress { x, y } => {
                self.session.mouse_down(x, y).await?;
                tokio::time::sleep(LONG_PRESS_HOLD).await;
                self.session.mouse_up(x, y).await?;
                Ok(None)
            }
            DeviceAction::Type { text } => {
                self.session.type_text(&text).await?;
                Ok(None)
            }
            DeviceAction::Key { key, modifiers } => {
                let dom = keymap::dom_key(&key).ok_or(DroverError::UnknownKey {
                    key,
                    backend: "web",
                })?;
                self.session.press_key(&dom, modifiers).await?;
                Ok(None)
            }
            DeviceAction::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms: _,
            } => {
                self.pointer_path(&[Point { x: x1, y: y1 }, Point { x: x2, y: y2 }])
                    .await?;
                Ok(None)
            }
            DeviceAction::Scroll { x, y, dx, dy } => {
                self.session.scroll_by(x, y, dx, dy).await?;
                Ok(None)
            }
            DeviceAction::Drag { path } => {
                if path.len() < 2 {
                    return Err(DroverError::InvalidPayload(
                        "drag requires at least two path points",
                    ));
                }
                self.pointer_path(&path).await?;
                Ok(None)
            }
            DeviceAction::Screenshot => {
                Ok(Some(ActionData::png(self.session.screenshot().await?)))
            }
            DeviceAction::GetUiTree => Ok(Some(ActionData::UiTree {
                xml: self.session.dom_snapshot().await?,
            })),
        }
    }

    async fn pointer_path(&self, path: &[Point]) -> Result<(), DroverError> {
        let first = path[0];
        let last = path[path.len() - 1];
        self.session.mouse_down(first.x, first.y).await?;
        for p in &path[1..] {
            self.session.mouse_move(p.x, p.y).await?;
        }
        self.session.mouse_up(last.x, last.y).await
    }
}

#[async_trait]
impl<S: BrowserSession> DeviceDriver for WebDriver<S> {
    async fn execute(&self, action: DeviceAction) -> ActionResult {
        self.run(action).await.into()
    }

    async fn capabilities(&self) -> DeviceCapabilities {
        let screen = self
            .session
            .viewport()
            .await
            .unwrap_or(ScreenSize::new(1280, 720));
        DeviceCapabilities::new(DevicePlatform::Web, &self.device_id, &self.device_name)
            .with_screen_size(screen)
    }

    async fn disconnect(&self) -> Result<(), DroverError> {
        self.session.close().await
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionErrorCode;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Click(i32, i32),
        Move(i32, i32),
        Down(i32, i32),
        Up(i32, i32),
        Text(String),
        Key(String, Modifiers),
        Scroll(i32, i32, i32, i32),
    }

    #[derive(Default)]
    struct FakeSession {
        calls: Mutex<Vec<Call>>,
        closed: Mutex<bool>,
    }

    impl FakeSession {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
        fn record(&self, call: Call) -> Result<(), DroverError> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl BrowserSession for &FakeSession {
        async fn click(&self, x: i32, y: i32) -> Result<(), DroverError> {
            self.record(Call::Click(x, y))
        }
        async fn mouse_move(&self, x: i32, y: i32) -> Result<(), DroverError> {
            self.record(Call::Move(x, y))
        }
        async fn mouse_down(&self, x: i32, y: i32) -> Result<(), DroverError> {
            self.record(Call::Down(x, y))
        }
        async fn mouse_up(&self, x: i32, y: i32) -> Result<(), DroverError> {
            self.record(Call::Up(x, y))
        }
        async fn type_text(&self, text: &str) -> Result<(), DroverError> {
            self.record(Call::Text(text.to_string()))
        }
        async fn press_key(&self, key: &str, modifiers: Modifiers) -> Result<(), DroverError> {
            self.record(Call::Key(key.to_string(), modifiers))
        }
        async fn scroll_by(&self, x: i32, y: i32, dx: i32, dy: i32) -> Result<(), DroverError> {
            self.record(Call::Scroll(x, y, dx, dy))
        }
        async fn screenshot(&self) -> Result<Vec<u8>, DroverError> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
        async fn dom_snapshot(&self) -> Result<String, DroverError> {
            Ok("<html><body/></html>".to_string())
        }
        async fn viewport(&self) -> Result<ScreenSize, DroverError> {
            Ok(ScreenSize::new(1440, 900))
        }
        async fn close(&self) -> Result<(), DroverError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn driver(session: &FakeSession) -> WebDriver<&FakeSession> {
        WebDriver::new("tab:1", "Browser Tab", session)
    }

    #[tokio::test]
    async fn tap_is_one_click() {
        let session = FakeSession::default();
        let result = driver(&session)
            .execute(DeviceAction::Tap { x: 10, y: 20 })
            .await;
        assert!(result.is_success());
        assert_eq!(session.calls(), vec![Call::Click(10, 20)]);
    }

    #[tokio::test]
    async fn key_is_translated_to_dom_vocabulary() {
        let session = FakeSession::default();
        driver(&session)
            .execute(DeviceAction::Key {
                key: "arrow_down".into(),
                modifiers: Modifiers::SHIFT,
            })
            .await;
        assert_eq!(
            session.calls(),
            vec![Call::Key("ArrowDown".into(), Modifiers::SHIFT)]
        );
    }

    #[tokio::test]
    async fn unknown_key_fails_without_session_calls() {
        let session = FakeSession::default();
        let result = driver(&session)
            .execute(DeviceAction::Key {
                key: "volume_up".into(),
                modifiers: Modifiers::empty(),
            })
            .await;
        match result {
            ActionResult::Failure { code, .. } => assert_eq!(code, ActionErrorCode::NotSupported),
            _ => panic!("expected failure"),
        }
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn ui_tree_is_the_dom() {
        let session = FakeSession::default();
        let result = driver(&session).execute(DeviceAction::GetUiTree).await;
        match result {
            ActionResult::Success {
                data: Some(ActionData::UiTree { xml }),
            } => assert!(xml.contains("<html>")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn swipe_is_down_move_up() {
        let session = FakeSession::default();
        driver(&session)
            .execute(DeviceAction::Swipe {
                x1: 0,
                y1: 0,
                x2: 30,
                y2: 40,
                duration_ms: None,
            })
            .await;
        assert_eq!(
            session.calls(),
            vec![Call::Down(0, 0), Call::Move(30, 40), Call::Up(30, 40)]
        );
    }

    #[tokio::test]
    async fn capabilities_use_viewport() {
        let session = FakeSession::default();
        let caps = driver(&session).capabilities().await;
        assert_eq!(caps.platform, DevicePlatform::Web);
        assert_eq!(caps.screen_size, ScreenSize::new(1440, 900));
        assert!(caps.has_ui_tree);
    }

    #[tokio::test]
    async fn disconnect_closes_session() {
        let session = FakeSession::default();
        driver(&session).disconnect().await.unwrap();
        assert!(*session.closed.lock().unwrap());
    }
}

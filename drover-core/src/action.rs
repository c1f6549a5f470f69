//! Device action vocabulary and structured results.
//!
//! A `DeviceAction` is the single request shape every backend understands;
//! an `ActionResult` is the single reply shape. On the wire (the dispatch
//! contract is JSON) an action is `{ "type": ..., "payload": {...} }` and a
//! result carries exactly one of the `success` / `failure` tags — consumers
//! switch on the tag, never probe both.

use bitflags::bitflags;
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ActionErrorCode, DroverError};

// ── ActionType ───────────────────────────────────────────────────

/// Discriminant-only view of [`DeviceAction`], used in capability sets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Tap,
    DoubleTap,
    LongPress,
    Type,
    Key,
    Swipe,
    Scroll,
    Drag,
    Screenshot,
    GetUiTree,
}

impl ActionType {
    /// Every action type, in declaration order.
    pub const ALL: [ActionType; 10] = [
        ActionType::Tap,
        ActionType::DoubleTap,
        ActionType::LongPress,
        ActionType::Type,
        ActionType::Key,
        ActionType::Swipe,
        ActionType::Scroll,
        ActionType::Drag,
        ActionType::Screenshot,
        ActionType::GetUiTree,
    ];
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Tap => "tap",
            Self::DoubleTap => "double_tap",
            Self::LongPress => "long_press",
            Self::Type => "type",
            Self::Key => "key",
            Self::Swipe => "swipe",
            Self::Scroll => "scroll",
            Self::Drag => "drag",
            Self::Screenshot => "screenshot",
            Self::GetUiTree => "get_ui_tree",
        };
        write!(f, "{s}")
    }
}

// ── Modifiers ────────────────────────────────────────────────────

bitflags! {
    /// Modifier keys held during a `key` action.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const SHIFT   = 0b0001;
        const CONTROL = 0b0010;
        const ALT     = 0b0100;
        const META    = 0b1000;
    }
}

impl Modifiers {
    const NAMES: [(Modifiers, &'static str); 4] = [
        (Modifiers::SHIFT, "shift"),
        (Modifiers::CONTROL, "control"),
        (Modifiers::ALT, "alt"),
        (Modifiers::META, "meta"),
    ];
}

// JSON shape: a list of lowercase names, e.g. ["control", "shift"].
impl Serialize for Modifiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let count = Self::NAMES.iter().filter(|(m, _)| self.contains(*m)).count();
        let mut seq = serializer.serialize_seq(Some(count))?;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                seq.serialize_element(name)?;
            }
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Modifiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ModVisitor;

        impl<'de> Visitor<'de> for ModVisitor {
            type Value = Modifiers;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a list of modifier names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Modifiers, A::Error> {
                let mut mods = Modifiers::empty();
                while let Some(name) = seq.next_element::<String>()? {
                    let flag = Modifiers::NAMES
                        .iter()
                        .find(|(_, n)| *n == name.as_str())
                        .map(|(m, _)| *m)
                        .ok_or_else(|| {
                            serde::de::Error::custom(format!("unknown modifier {name:?}"))
                        })?;
                    mods |= flag;
                }
                Ok(mods)
            }
        }

        deserializer.deserialize_seq(ModVisitor)
    }
}

// ── DeviceAction ─────────────────────────────────────────────────

/// A point on the device screen, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A uniform input/capture request, independent of the target backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DeviceAction {
    /// Single tap / left click at screen coordinates.
    Tap { x: i32, y: i32 },
    /// Two taps in quick succession.
    DoubleTap { x: i32, y: i32 },
    /// Press, hold ~500 ms, release.
    LongPress { x: i32, y: i32 },
    /// Type a text string into the focused element.
    Type { text: String },
    /// Press a named key, optionally with modifiers held.
    Key {
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
    },
    /// Straight-line gesture from one point to another.
    Swipe {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        #[serde(default)]
        duration_ms: Option<u32>,
    },
    /// Scroll by a delta at a position.
    Scroll { x: i32, y: i32, dx: i32, dy: i32 },
    /// Press-move-release along an explicit path (at least two points).
    Drag { path: Vec<Point> },
    /// Capture the screen.
    Screenshot,
    /// Dump the accessibility / DOM tree.
    GetUiTree,
}

impl DeviceAction {
    /// The discriminant of this action, for capability checks.
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Tap { .. } => ActionType::Tap,
            Self::DoubleTap { .. } => ActionType::DoubleTap,
            Self::LongPress { .. } => ActionType::LongPress,
            Self::Type { .. } => ActionType::Type,
            Self::Key { .. } => ActionType::Key,
            Self::Swipe { .. } => ActionType::Swipe,
            Self::Scroll { .. } => ActionType::Scroll,
            Self::Drag { .. } => ActionType::Drag,
            Self::Screenshot => ActionType::Screenshot,
            Self::GetUiTree => ActionType::GetUiTree,
        }
    }
}

// ── ActionData ───────────────────────────────────────────────────

/// Optional payload carried by a successful action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionData {
    /// A captured screen image.
    Screenshot {
        /// Image container format; currently always `"png"`.
        format: String,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
    /// An accessibility / DOM tree dump.
    UiTree { xml: String },
    /// Free-form textual output (e.g. raw shell output).
    Text { text: String },
}

impl ActionData {
    /// PNG screenshot payload.
    pub fn png(bytes: Vec<u8>) -> Self {
        Self::Screenshot {
            format: "png".to_string(),
            bytes,
        }
    }
}

/// Byte payloads travel base64-encoded inside the JSON contract.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

// ── ActionResult ─────────────────────────────────────────────────

/// The reply to a dispatched action. Exactly one tag is ever populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ActionData>,
    },
    Failure {
        error: String,
        code: ActionErrorCode,
    },
}

impl ActionResult {
    /// A success with no payload.
    pub fn ok() -> Self {
        Self::Success { data: None }
    }

    /// A success carrying a payload.
    pub fn ok_with(data: ActionData) -> Self {
        Self::Success { data: Some(data) }
    }

    /// A failure with an explicit code.
    pub fn fail(code: ActionErrorCode, error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            code,
        }
    }

    /// Returns `true` for the `Success` tag.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<DroverError> for ActionResult {
    fn from(e: DroverError) -> Self {
        Self::Failure {
            code: e.code(),
            error: e.to_string(),
        }
    }
}

impl From<Result<Option<ActionData>, DroverError>> for ActionResult {
    fn from(r: Result<Option<ActionData>, DroverError>) -> Self {
        match r {
            Ok(None) => Self::ok(),
            Ok(Some(data)) => Self::ok_with(data),
            Err(e) => e.into(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

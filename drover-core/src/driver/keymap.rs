//! Neutral key vocabulary and per-backend translation tables.
//!
//! Callers name keys in one vocabulary (`"enter"`, `"arrow_up"`,
//! `"volume_down"`, single characters); each backend owns exactly one
//! table mapping that vocabulary to its native codes. Adding a backend
//! means adding a table here, not touching any caller.
//!
//! A key with no entry in a backend's table is simply not supported
//! there — e.g. `"volume_up"` maps on Android but not on desktop.

use crate::action::Modifiers;

// ── Desktop (Win32 virtual-key codes) ────────────────────────────

/// Translate a neutral key name to a Win32 virtual-key code.
pub fn windows_vk(key: &str) -> Option<u16> {
    let vk = match key {
        "enter" => 0x0D,
        "tab" => 0x09,
        "escape" => 0x1B,
        "backspace" => 0x08,
        "delete" => 0x2E,
        "insert" => 0x2D,
        "space" => 0x20,
        "home" => 0x24,
        "end" => 0x23,
        "page_up" => 0x21,
        "page_down" => 0x22,
        "arrow_left" => 0x25,
        "arrow_up" => 0x26,
        "arrow_right" => 0x27,
        "arrow_down" => 0x28,
        _ => return windows_vk_char(key),
    };
    Some(vk)
}

fn windows_vk_char(key: &str) -> Option<u16> {
    if let Some(n) = function_key_number(key) {
        return Some(0x70 + n as u16 - 1); // VK_F1..VK_F12
    }
    let mut chars = key.chars();
    let (c, rest) = (chars.next()?, chars.next());
    if rest.is_some() {
        return None;
    }
    match c {
        'a'..='z' => Some(c as u16 - 'a' as u16 + 0x41),
        'A'..='Z' => Some(c as u16 - 'A' as u16 + 0x41),
        '0'..='9' => Some(c as u16 - '0' as u16 + 0x30),
        _ => None,
    }
}

/// Virtual-key codes for the modifiers in `mods`, in press order.
pub fn windows_modifier_vks(mods: Modifiers) -> Vec<u16> {
    let mut vks = Vec::new();
    if mods.contains(Modifiers::SHIFT) {
        vks.push(0x10); // VK_SHIFT
    }
    if mods.contains(Modifiers::CONTROL) {
        vks.push(0x11); // VK_CONTROL
    }
    if mods.contains(Modifiers::ALT) {
        vks.push(0x12); // VK_MENU
    }
    if mods.contains(Modifiers::META) {
        vks.push(0x5B); // VK_LWIN
    }
    vks
}

// ── Android (input keyevent codes) ───────────────────────────────

/// Translate a neutral key name to an Android keycode.
pub fn android_keycode(key: &str) -> Option<u16> {
    let code = match key {
        "enter" => 66,
        "tab" => 61,
        "escape" => 111,
        "backspace" => 67,
        "delete" => 112,
        "space" => 62,
        "home" => 122,
        "end" => 123,
        "page_up" => 92,
        "page_down" => 93,
        "arrow_up" => 19,
        "arrow_down" => 20,
        "arrow_left" => 21,
        "arrow_right" => 22,
        // device navigation, Android-only vocabulary
        "back" => 4,
        "home_screen" => 3,
        "app_switch" => 187,
        "menu" => 82,
        "power" => 26,
        "volume_up" => 24,
        "volume_down" => 25,
        _ => return android_keycode_char(key),
    };
    Some(code)
}

fn android_keycode_char(key: &str) -> Option<u16> {
    if let Some(n) = function_key_number(key) {
        return Some(131 + n as u16 - 1); // KEYCODE_F1..F12
    }
    let mut chars = key.chars();
    let (c, rest) = (chars.next()?, chars.next());
    if rest.is_some() {
        return None;
    }
    match c {
        'a'..='z' => Some(c as u16 - 'a' as u16 + 29),
        'A'..='Z' => Some(c as u16 - 'A' as u16 + 29),
        '0'..='9' => Some(c as u16 - '0' as u16 + 7),
        _ => None,
    }
}

// ── Web (DOM KeyboardEvent.key values) ───────────────────────────

/// Translate a neutral key name to a DOM `KeyboardEvent.key` value.
pub fn dom_key(key: &str) -> Option<String> {
    let named = match key {
        "enter" => "Enter",
        "tab" => "Tab",
        "escape" => "Escape",
        "backspace" => "Backspace",
        "delete" => "Delete",
        "insert" => "Insert",
        "space" => " ",
        "home" => "Home",
        "end" => "End",
        "page_up" => "PageUp",
        "page_down" => "PageDown",
        "arrow_left" => "ArrowLeft",
        "arrow_up" => "ArrowUp",
        "arrow_right" => "ArrowRight",
        "arrow_down" => "ArrowDown",
        _ => {
            if let Some(n) = function_key_number(key) {
                return Some(format!("F{n}"));
            }
            // single characters pass through unchanged
            let mut chars = key.chars();
            let (c, rest) = (chars.next()?, chars.next());
            return rest.is_none().then(|| c.to_string());
        }
    };
    Some(named.to_string())
}

// ── Shared helpers ───────────────────────────────────────────────

/// Parse `"f1"`..`"f12"` into its number.
fn function_key_number(key: &str) -> Option<u8> {
    let n: u8 = key.strip_prefix('f')?.parse().ok()?;
    (1..=12).contains(&n).then_some(n)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_resolve_everywhere() {
        for key in ["enter", "tab", "escape", "arrow_up", "home", "space"] {
            assert!(windows_vk(key).is_some(), "windows: {key}");
            assert!(android_keycode(key).is_some(), "android: {key}");
            assert!(dom_key(key).is_some(), "dom: {key}");
        }
    }

    #[test]
    fn character_keys() {
        assert_eq!(windows_vk("a"), Some(0x41));
        assert_eq!(windows_vk("Z"), Some(0x5A));
        assert_eq!(windows_vk("7"), Some(0x37));
        assert_eq!(android_keycode("a"), Some(29));
        assert_eq!(android_keycode("0"), Some(7));
        assert_eq!(dom_key("a").as_deref(), Some("a"));
    }

    #[test]
    fn function_keys() {
        assert_eq!(windows_vk("f1"), Some(0x70));
        assert_eq!(windows_vk("f12"), Some(0x7B));
        assert_eq!(android_keycode("f5"), Some(135));
        assert_eq!(dom_key("f10").as_deref(), Some("F10"));
        assert_eq!(windows_vk("f13"), None);
    }

    #[test]
    fn android_only_keys_do_not_map_on_desktop() {
        for key in ["back", "volume_up", "app_switch", "power"] {
            assert!(android_keycode(key).is_some(), "android: {key}");
            assert!(windows_vk(key).is_none(), "windows: {key}");
        }
    }

    #[test]
    fn unknown_keys_are_none() {
        assert_eq!(windows_vk("hyper"), None);
        assert_eq!(android_keycode("hyper"), None);
        assert_eq!(dom_key("hyper"), None);
        assert_eq!(windows_vk(""), None);
    }

    #[test]
    fn modifier_vks_in_press_order() {
        let vks = windows_modifier_vks(Modifiers::CONTROL | Modifiers::SHIFT);
        assert_eq!(vks, vec![0x10, 0x11]);
        assert!(windows_modifier_vks(Modifiers::empty()).is_empty());
    }
}

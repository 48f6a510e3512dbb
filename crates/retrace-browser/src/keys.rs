//! Keyboard descriptors for `Input.dispatchKeyEvent`.
//!
//! Only two shapes of key ever reach dispatch: the special keys the recorder
//! captures (Enter, Escape, Tab, arrows) and single printable characters
//! from delayed typing.

use retrace_core::model::InputModifier;

/// Everything CDP needs to synthesize one key event.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec {
    pub dom_key: String,
    pub dom_code: String,
    pub windows_keycode: u32,
    pub text: Option<String>,
}

/// (DOM key name, Windows virtual keycode, generated text).
const SPECIAL_KEYS: &[(&str, u32, Option<&str>)] = &[
    ("Enter", 13, Some("\r")),
    ("Tab", 9, Some("\t")),
    ("Escape", 27, None),
    ("ArrowUp", 38, None),
    ("ArrowDown", 40, None),
    ("ArrowLeft", 37, None),
    ("ArrowRight", 39, None),
];

pub fn key_spec(key: &str) -> KeySpec {
    let trimmed = key.trim();
    if let Some((name, keycode, text)) = SPECIAL_KEYS
        .iter()
        .find(|(name, ..)| name.eq_ignore_ascii_case(trimmed))
    {
        return KeySpec {
            dom_key: name.to_string(),
            dom_code: name.to_string(),
            windows_keycode: *keycode,
            text: text.map(str::to_string),
        };
    }

    let mut chars = key.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        return char_spec(ch);
    }

    // Unknown multi-character name; let the browser make sense of it.
    KeySpec {
        dom_key: key.to_string(),
        dom_code: key.to_string(),
        windows_keycode: 0,
        text: None,
    }
}

fn char_spec(ch: char) -> KeySpec {
    let dom_code = if ch.is_ascii_alphabetic() {
        format!("Key{}", ch.to_ascii_uppercase())
    } else if ch.is_ascii_digit() {
        format!("Digit{}", ch)
    } else {
        "Unidentified".to_string()
    };

    KeySpec {
        dom_key: ch.to_string(),
        dom_code,
        windows_keycode: if ch.is_ascii_alphanumeric() {
            ch.to_ascii_uppercase() as u32
        } else {
            0
        },
        text: (!ch.is_control()).then(|| ch.to_string()),
    }
}

/// CDP modifier bitfield: Alt 1, Control 2, Meta 4, Shift 8.
pub fn modifier_bits(modifiers: &[InputModifier]) -> u8 {
    let mut bits = 0;
    for modifier in modifiers {
        bits |= match modifier {
            InputModifier::Alt => 1,
            InputModifier::Control => 2,
            InputModifier::Meta => 4,
            InputModifier::Shift => 8,
        };
    }
    bits
}

//! Filename escaping.
//!
//! Placeholder values are escaped as single path components; the rendered template is
//! then escaped as a relative path. Characters that are illegal on common filesystems
//! are mapped to their full-width look-alikes so the name stays readable.

use unicode_normalization::UnicodeNormalization;

const ILLEGAL: &[char] = &[':', '*', '?', '"', '<', '>', '|'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Full-width form of a printable ASCII character
fn fullwidth(c: char) -> char {
    match c {
        '!'..='~' => char::from_u32(c as u32 + 0xFEE0).unwrap_or('_'),
        _ => c,
    }
}

/// Escape a value that must not introduce path structure.
///
/// Separators become full-width, illegal characters become full-width, control
/// characters are dropped.
pub fn escape_variable(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c == '/' || c == '\\' || ILLEGAL.contains(&c) {
                fullwidth(c)
            } else {
                c
            }
        })
        .collect()
}

/// Escape a rendered filename as a relative path.
///
/// `/` and `\` in the input act as separators. Empty, `.` and `..` components are
/// removed, so the result never leaves the download directory and is never absolute.
/// Leading spaces and trailing dots/spaces are trimmed per component, reserved device
/// names get a `_` suffix.
pub fn escape_path(path: &str) -> String {
    let normalized: String = path.nfc().collect();
    normalized
        .split(|c: char| c == '/' || c == '\\')
        .filter_map(escape_component)
        .collect::<Vec<_>>()
        .join("/")
}

fn escape_component(component: &str) -> Option<String> {
    let cleaned: String = component
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if ILLEGAL.contains(&c) { fullwidth(c) } else { c })
        .collect();
    let trimmed = cleaned
        .trim_start_matches(' ')
        .trim_end_matches(|c: char| c == '.' || c == ' ');
    if trimmed.is_empty() {
        return None;
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed);
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        let rest = &trimmed[stem.len()..];
        return Some(format!("{}_{}", stem, rest));
    }
    Some(trimmed.to_string())
}

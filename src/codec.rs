//! Per-version escaping/unescaping of STOMP header names and values. Bodies
//! are never escaped; only header text passes through here.

use crate::error::StompError;
use crate::spec::{self, StompVersion};

/// Escape `text` for use as a header name or value under `version`, given the
/// frame's `command` (CONNECT/CONNECTED are exempt, and STOMP 1.0 exempts
/// every command).
pub fn escape(version: StompVersion, command: &str, text: &str) -> String {
    if spec::escape_excluded(version, command) {
        return text.to_string();
    }
    let table = spec::escape_table(version);
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match table.iter().find(|(c, _)| *c == ch) {
            Some((_, letter)) => {
                out.push(spec::ESCAPE_CHARACTER as char);
                out.push(*letter);
            }
            None => out.push(ch),
        }
    }
    out
}

/// Reverse of [`escape`]. Fails with [`StompError::Frame`] if `text` contains
/// an escape sequence not defined for `version`.
pub fn unescape(version: StompVersion, command: &str, text: &str) -> Result<String, StompError> {
    if spec::escape_excluded(version, command) {
        return Ok(text.to_string());
    }
    let table = spec::escape_table(version);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch as u8 != spec::ESCAPE_CHARACTER {
            out.push(ch);
            continue;
        }
        let letter = chars.next().ok_or_else(|| {
            StompError::frame(format!("no escape sequence defined for this character: end-of-input [text={text:?}]"))
        })?;
        match table.iter().find(|(_, l)| *l == letter) {
            Some((escaped, _)) => out.push(*escaped),
            None => {
                return Err(StompError::frame(format!(
                    "no escape sequence defined for this character: {letter:?} [text={text:?}]"
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_all_four_characters_in_1_2() {
        let escaped = escape(StompVersion::V1_2, "SEND", "a:b\\c\nd\re");
        assert_eq!(escaped, "a\\cb\\\\c\\nd\\re");
    }

    #[test]
    fn unescape_roundtrips() {
        let text = "a:b\\c\nd\re";
        let escaped = escape(StompVersion::V1_2, "SEND", text);
        let back = unescape(StompVersion::V1_2, "SEND", &escaped).unwrap();
        assert_eq!(back, text);
    }

    #[test]
    fn one_point_zero_never_escapes() {
        let text = "a:b\\c\nd";
        assert_eq!(escape(StompVersion::V1_0, "SEND", text), text);
    }

    #[test]
    fn connect_is_always_exempt() {
        let text = "a:b\\c\nd\re";
        assert_eq!(escape(StompVersion::V1_2, "CONNECT", text), text);
        assert_eq!(escape(StompVersion::V1_2, "CONNECTED", text), text);
    }

    #[test]
    fn unescape_rejects_cr_escape_before_1_2() {
        assert!(unescape(StompVersion::V1_1, "SEND", "\\r").is_err());
        assert!(unescape(StompVersion::V1_2, "SEND", "\\r").is_ok());
    }

    #[test]
    fn unescape_rejects_unknown_sequence() {
        assert!(unescape(StompVersion::V1_1, "SEND", "\\t").is_err());
    }
}

//! Helpers for turning user supplied text (message bodies, user agents) into
//! single-line strings fit for log records and status views.

use std::fmt::Write;

/// Longest escaped string emitted into a log record.
const MAX_LOG_CHARS: usize = 300;

/// Escape control characters so a log record stays on one line.
///
/// Newlines, carriage returns, tabs and backslashes get their familiar
/// backslash escapes; any other control character becomes `\xNN`. Input
/// longer than 300 characters is cut and ends with an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_LOG_CHARS) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count == MAX_LOG_CHARS {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Flatten line breaks to spaces and shorten to at most `max_chars`.
///
/// Text longer than `max_chars` keeps its first `max_chars - 3` characters
/// followed by `...`. Counts characters, never splits a code point.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace("\r\n", " ").replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_line_breaks_and_controls() {
        assert_eq!(escape_log("a\nb\r\tc"), "a\\nb\\r\\tc");
        assert_eq!(escape_log("x\u{1A}y"), "x\\x1Ay");
        assert_eq!(escape_log("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn long_log_text_is_capped() {
        let long = "z".repeat(400);
        let out = escape_log(&long);
        assert_eq!(out.chars().count(), 301);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn preview_flattens_both_line_endings() {
        assert_eq!(preview("one\r\ntwo\nthree", 60), "one two three");
    }

    #[test]
    fn preview_truncates_with_ellipsis() {
        let body = "a".repeat(61);
        let out = preview(&body, 60);
        assert_eq!(out.len(), 60);
        assert!(out.ends_with("..."));
        assert_eq!(preview(&"b".repeat(60), 60), "b".repeat(60));
    }

    #[test]
    fn preview_respects_multibyte_characters() {
        let out = preview("ééééééé", 5);
        assert_eq!(out, "éé...");
    }
}

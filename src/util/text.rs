use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

/// Ellipsis appended when a title is cut
const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Truncates a string to fit within `max_width` terminal columns.
///
/// Wide characters (CJK, emoji) count as two columns. When the string does not
/// fit and there is room, the cut text ends in "..."; at widths of three
/// columns or fewer the text is cut without an ellipsis.
///
/// ```
/// use bulletin::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("Test", 2), "Te");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    let budget = if max_width > ELLIPSIS_WIDTH {
        max_width - ELLIPSIS_WIDTH
    } else {
        max_width
    };

    let mut width = 0;
    let mut cut = None;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if cut.is_none() && width + w > budget {
            cut = Some(idx);
        }
        width += w;
        if width > max_width {
            let end = cut.unwrap_or(idx);
            return if max_width > ELLIPSIS_WIDTH {
                Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
            } else {
                Cow::Owned(s[..end].to_string())
            };
        }
    }

    Cow::Borrowed(s)
}

/// Strip terminal control characters and ANSI escape sequences from text.
///
/// Feed titles are remote input and end up on the terminal, so CSI sequences
/// (`ESC [ ... final`), OSC sequences (`ESC ] ... BEL` or `ESC ] ... ESC \`),
/// bare ESC, DEL and C0 controls other than tab, newline and carriage return
/// are removed. Clean input is returned borrowed.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    fn is_control(c: char) -> bool {
        c == '\x1b' || c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'))
    }

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_control(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            Some('[') => {
                chars.next();
                // Parameter and intermediate bytes run until a final byte in 0x40..=0x7E
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

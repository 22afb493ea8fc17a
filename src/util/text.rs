use std::borrow::Cow;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const DEL: u8 = 0x7f;

fn is_stripped_control(b: u8) -> bool {
    b == ESC || b == DEL || (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
}

/// Strips terminal control characters and ANSI escape sequences from feed text.
///
/// Removes C0 controls other than tab/newline/CR, DEL, CSI sequences (`ESC [` up to the
/// final byte), OSC sequences (`ESC ]` up to BEL or `ESC \`), and bare ESC bytes.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    if !bytes.iter().copied().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            ESC => i = skip_escape(bytes, i),
            b if is_stripped_control(b) => i += 1,
            _ => {
                let start = i;
                while i < bytes.len() && !is_stripped_control(bytes[i]) {
                    i += 1;
                }
                // Only ASCII bytes end a run, so the slice stays on char boundaries.
                out.push_str(&s[start..i]);
            }
        }
    }

    Cow::Owned(out)
}

/// Returns the index just past the escape sequence starting at `start`.
fn skip_escape(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    match bytes.get(i) {
        Some(b'[') => {
            i += 1;
            while let Some(&c) = bytes.get(i) {
                i += 1;
                if (0x40..=0x7e).contains(&c) {
                    break;
                }
            }
        }
        Some(b']') => {
            i += 1;
            while let Some(&c) = bytes.get(i) {
                if c == BEL {
                    return i + 1;
                }
                if c == ESC && bytes.get(i + 1) == Some(&b'\\') {
                    return i + 2;
                }
                i += 1;
            }
        }
        _ => {}
    }
    i
}

/// Collapses every run of whitespace into a single space and trims the ends.
///
/// Publishers pad date strings ("Thu, 13 May       2010") and titles with
/// arbitrary whitespace; the strict parsers downstream expect single spaces.
pub fn collapse_whitespace(s: &str) -> Cow<'_, str> {
    let trimmed = s.trim();
    let needs_collapse = trimmed
        .as_bytes()
        .windows(2)
        .any(|w| w[0].is_ascii_whitespace() && w[1].is_ascii_whitespace())
        || trimmed.chars().any(|c| c.is_whitespace() && c != ' ');

    if !needs_collapse {
        return Cow::Borrowed(trimmed);
    }

    Cow::Owned(trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
}

//! Encode text for use as HTML character data or a quoted attribute value.
//!
//! Contract:
//! - Exactly five characters are replaced: `&` → `&amp;`, `<` → `&lt;`,
//!   `>` → `&gt;`, `"` → `&quot;`, `'` → `&#39;`.
//! - Everything else, including non-ASCII text, passes through unchanged.
//! - Escaping is not idempotent: `&amp;` becomes `&amp;amp;`. Callers that hold
//!   already-safe markup must use [`crate::HtmlString`] instead.

use std::borrow::Cow;

use memchr::{memchr2, memchr3};

/// Escape `text`, borrowing it unchanged when nothing needs replacing.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    let mut specials = Specials::new(text.as_bytes());
    let Some(first) = specials.next_from(0) else {
        return Cow::Borrowed(text);
    };
    let mut out = Vec::with_capacity(text.len() + 16);
    out.extend_from_slice(&text.as_bytes()[..first]);
    escape_from(&mut out, &mut specials, first);
    // Only ASCII bytes were replaced by ASCII sequences; the rest was copied
    // on char boundaries, so the buffer is still valid UTF-8.
    match String::from_utf8(out) {
        Ok(escaped) => Cow::Owned(escaped),
        Err(err) => Cow::Owned(String::from_utf8_lossy(err.as_bytes()).into_owned()),
    }
}

/// Append the escaped form of `text` to a byte buffer.
pub fn escape_html_into(out: &mut Vec<u8>, text: &str) {
    let bytes = text.as_bytes();
    let mut specials = Specials::new(bytes);
    match specials.next_from(0) {
        None => out.extend_from_slice(bytes),
        Some(first) => {
            out.reserve(bytes.len() + 8);
            out.extend_from_slice(&bytes[..first]);
            escape_from(out, &mut specials, first);
        }
    }
}

fn escape_from(out: &mut Vec<u8>, specials: &mut Specials<'_>, mut at: usize) {
    let bytes = specials.bytes;
    loop {
        out.extend_from_slice(entity(bytes[at]));
        let start = at + 1;
        match specials.next_from(start) {
            Some(next) => {
                out.extend_from_slice(&bytes[start..next]);
                at = next;
            }
            None => {
                out.extend_from_slice(&bytes[start..]);
                return;
            }
        }
    }
}

/// Finds escapable bytes with two scanners, one for `& < >` and one for
/// quotes. Each keeps its last hit and only rescans once the walk has moved
/// past it, so no byte is scanned twice by the same scanner.
struct Specials<'a> {
    bytes: &'a [u8],
    markup: Hit,
    quote: Hit,
}

#[derive(Clone, Copy)]
enum Hit {
    Unknown,
    At(usize),
    Exhausted,
}

impl Hit {
    fn next(&mut self, bytes: &[u8], from: usize, scan: fn(&[u8]) -> Option<usize>) -> Option<usize> {
        match *self {
            Hit::At(pos) if pos >= from => return Some(pos),
            Hit::Exhausted => return None,
            Hit::At(_) | Hit::Unknown => {}
        }
        match bytes.get(from..).and_then(scan) {
            Some(rel) => {
                *self = Hit::At(from + rel);
                Some(from + rel)
            }
            None => {
                *self = Hit::Exhausted;
                None
            }
        }
    }
}

impl<'a> Specials<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            markup: Hit::Unknown,
            quote: Hit::Unknown,
        }
    }

    fn next_from(&mut self, from: usize) -> Option<usize> {
        let markup = self
            .markup
            .next(self.bytes, from, |rest| memchr3(b'&', b'<', b'>', rest));
        let quote = self
            .quote
            .next(self.bytes, from, |rest| memchr2(b'"', b'\'', rest));
        match (markup, quote) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

fn entity(b: u8) -> &'static [u8] {
    match b {
        b'&' => b"&amp;",
        b'<' => b"&lt;",
        b'>' => b"&gt;",
        b'"' => b"&quot;",
        b'\'' => b"&#39;",
        _ => unreachable!("the scanners only stop on escapable bytes"),
    }
}

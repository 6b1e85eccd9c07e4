#![no_main]

use html::{escape_html, escape_html_into};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let escaped = escape_html(&text);
    assert!(!escaped.contains(['<', '>', '"', '\'']));

    let mut into = Vec::new();
    escape_html_into(&mut into, &text);
    assert_eq!(into, escaped.as_bytes());

    let unescaped = escaped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    assert_eq!(unescaped, text);
});

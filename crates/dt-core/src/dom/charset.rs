//! Character set detection for response bodies.

use std::borrow::Cow;
use std::sync::OnceLock;

use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;

const SNIFF_LIMIT: usize = 1024;

/// Extract the `charset=` parameter of a Content-Type value.
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches(|c| c == '"' || c == '\''))
        } else {
            None
        }
    })
}

fn meta_charset_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i-u)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#).ok())
        .as_ref()
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(SNIFF_LIMIT)];
    let caps = meta_charset_re()?.captures(head)?;
    Encoding::for_label(caps.get(1)?.as_bytes())
}

/// Decode an HTML body. A byte-order mark wins, then the Content-Type
/// charset, then a `<meta>` declaration, then UTF-8.
pub fn decode_html<'a>(bytes: &'a [u8], content_type: Option<&str>) -> (Cow<'a, str>, &'static Encoding) {
    let declared = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()));
    let encoding = declared
        .or_else(|| sniff_meta_charset(bytes))
        .unwrap_or(UTF_8);
    let (text, used, _) = encoding.decode(bytes);
    (text, used)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(charset_from_content_type("text/html; charset=UTF-8"), Some("UTF-8"));
        assert_eq!(charset_from_content_type("text/html;charset=\"latin1\""), Some("latin1"));
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn test_decode_from_meta() {
        let body = b"<html><head><meta charset=\"windows-1252\"></head><body>\x93q\x94</body></html>";
        let (text, enc) = decode_html(body, None);
        assert_eq!(enc.name(), "windows-1252");
        assert!(text.contains("\u{201c}q\u{201d}"));
    }

    #[test]
    fn test_decode_defaults_to_utf8() {
        let (text, enc) = decode_html("héllo".as_bytes(), Some("text/html"));
        assert_eq!(enc, UTF_8);
        assert_eq!(text, "héllo");
    }
}

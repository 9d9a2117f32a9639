/// Decodes key material into one owned UTF-8 form, whatever the input type.
///
/// Invalid UTF-8 sequences become U+FFFD, so this never fails.
pub(crate) fn normalize_key(value: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(value.as_ref()).into_owned()
}

#[cfg_attr(not(feature = "http"), allow(dead_code))]
pub(crate) fn truncate_snippet(body: &str, max_len: usize) -> String {
    if body.len() <= max_len {
        return body.to_string();
    }

    let cut = if body.is_char_boundary(max_len) {
        max_len
    } else {
        body.char_indices()
            .take_while(|(idx, _)| *idx < max_len)
            .last()
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    };

    let mut out = body[..cut].to_string();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_text_and_bytes_to_the_same_string() {
        let text = "foo\u{2019}";
        assert_eq!(normalize_key(text), text);
        assert_eq!(normalize_key(text.as_bytes()), text);
        assert_eq!(normalize_key(text.as_bytes().to_vec()), text);
        assert_eq!(normalize_key(String::from(text)), text);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        assert_eq!(normalize_key([b'a', 0xff, b'b']), "a\u{fffd}b");
    }

    #[test]
    fn truncates_utf8_safely() {
        let body = "你好，世界".repeat(10);
        let out = truncate_snippet(&body, 5);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 5 + 3);
        assert_eq!(truncate_snippet("short", 10), "short");
    }
}
